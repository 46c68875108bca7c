use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};

use super::mbox::PhysBuf;
use super::{RegBlock, Rpi, PAGE_SIZE};

// Register words within a DMA channel's block.
const DMA_CS: usize = 0;
const DMA_CONBLK_AD: usize = 1;
const DMA_TXFR_LEN: usize = 5;
const DMA_DEBUG: usize = 8;

pub(crate) const DMA_CS_RESET: u32 = 1 << 31;
pub(crate) const DMA_CS_WAIT_OUTSTANDING_WRITES: u32 = 1 << 28;
pub(crate) const DMA_CS_ERROR: u32 = 1 << 8;
pub(crate) const DMA_CS_INT: u32 = 1 << 2;
pub(crate) const DMA_CS_END: u32 = 1 << 1;
pub(crate) const DMA_CS_ACTIVE: u32 = 1 << 0;

pub(crate) const DMA_TI_NO_WIDE_BURSTS: u32 = 1 << 26;
pub(crate) const DMA_TI_SRC_INC: u32 = 1 << 8;
pub(crate) const DMA_TI_DEST_DREQ: u32 = 1 << 6;
pub(crate) const DMA_TI_WAIT_RESP: u32 = 1 << 3;

fn dma_cs_panic_priority(val: u32) -> u32 {
    (val & 0xf) << 20
}

fn dma_cs_priority(val: u32) -> u32 {
    (val & 0xf) << 16
}

pub(crate) fn dma_ti_per_map(val: u32) -> u32 {
    (val & 0x1f) << 16
}

fn channel_offset(channel: usize) -> Option<usize> {
    match channel {
        0..=14 => Some(0x7000 + 0x100 * channel),
        15 => Some(0x00e0_5000),
        _ => None,
    }
}

pub(crate) struct DmaRegs(RegBlock);

impl DmaRegs {
    pub(crate) fn map(periph_base: usize, channel: usize) -> Result<DmaRegs> {
        let offset = channel_offset(channel)
            .ok_or_else(|| anyhow!("no offset found for DMA {}", channel))?;
        let block = RegBlock::map(periph_base + offset, 9 * 4)
            .with_context(|| format!("couldn't map DMA registers at {:08X}", periph_base + offset))?;
        Ok(DmaRegs(block))
    }
}

/// In-memory descriptor the DMA engine reads to run one transfer.
#[repr(C)]
pub(crate) struct DmaControl {
    pub(crate) ti: u32,
    pub(crate) source_ad: u32,
    pub(crate) dest_ad: u32,
    pub(crate) tx_len: u32,
    pub(crate) stride: u32,
    pub(crate) nextconbk: u32,
    resvd1: u32,
    resvd2: u32,
}

pub(crate) const DMA_CONTROL_SIZE: usize = std::mem::size_of::<DmaControl>();

/// VideoCore-allocated buffer with a `DmaControl` header followed by the
/// transfer payload.
pub struct DmaBuf {
    pb: PhysBuf,
}

impl DmaBuf {
    pub(crate) fn bus_addr(&self) -> u32 {
        self.pb.bus_addr
    }

    pub(crate) fn control_mut(&mut self) -> &mut DmaControl {
        let map = self.pb.map.as_ref().expect("DMA buffer already freed");
        unsafe { &mut *((map.as_mut_ptr() as *mut u8).add(self.pb.offs) as *mut DmaControl) }
    }

    /// The payload as 32-bit words, starting right after the header.
    pub(crate) fn words(&mut self) -> &mut [u32] {
        let map = self.pb.map.as_ref().expect("DMA buffer already freed");
        let start = self.pb.offs + DMA_CONTROL_SIZE;
        let len = (self.pb.len - DMA_CONTROL_SIZE) / 4;
        unsafe {
            std::slice::from_raw_parts_mut(
                (map.as_mut_ptr() as *mut u8).add(start) as *mut u32,
                len,
            )
        }
    }
}

/// Bytes to allocate for a DMA payload of the given size, once the control
/// header is prepended and the total is rounded up to a page.
fn calc_dma_buf_size(bytes: u32) -> u32 {
    let bytes = bytes as usize + DMA_CONTROL_SIZE;
    (((bytes / PAGE_SIZE) + 1) * PAGE_SIZE) as u32
}

impl Rpi {
    pub fn get_dma_buf(&self, bytes: u32) -> Result<DmaBuf> {
        let pb = self
            .get_phys_buf(calc_dma_buf_size(bytes))
            .with_context(|| format!("couldn't get {} byte physical buffer for DMA", bytes))?;
        log::debug!("dmabuf size {}, calc {}", bytes, calc_dma_buf_size(bytes));
        Ok(DmaBuf { pb })
    }

    pub fn free_dma_buf(&self, d: &mut DmaBuf) -> Result<()> {
        self.free_phys_buf(&mut d.pb)
    }

    pub(crate) fn zero_dma(&self) {
        self.dma.0.write(DMA_CS, 0);
        self.dma.0.write(DMA_TXFR_LEN, 0);
    }

    pub(crate) fn start_dma(&self, d: &DmaBuf) {
        self.dma.0.write(DMA_CS, DMA_CS_RESET);
        thread::sleep(Duration::from_micros(10));

        self.dma.0.write(DMA_CS, DMA_CS_INT | DMA_CS_END);
        thread::sleep(Duration::from_micros(10));

        self.dma.0.write(DMA_CONBLK_AD, d.bus_addr());
        self.dma.0.write(DMA_DEBUG, 7); // clear debug error flags
        self.dma.0.write(
            DMA_CS,
            DMA_CS_WAIT_OUTSTANDING_WRITES
                | dma_cs_panic_priority(15)
                | dma_cs_priority(15)
                | DMA_CS_ACTIVE,
        );
    }

    /// Poll until the previous transfer finishes. ~1s at 10us per poll.
    pub(crate) fn wait_dma_end(&self) -> Result<()> {
        let mut cs = 0;
        for i in 0.. {
            cs = self.dma.0.read(DMA_CS);
            if cs & DMA_CS_ACTIVE == 0 {
                break;
            }
            if cs & DMA_CS_ERROR != 0 {
                break;
            }
            if i == 100_000 {
                bail!("wait failed, cs {:08X}", cs);
            }
            thread::sleep(Duration::from_micros(10));
        }
        if cs & DMA_CS_ERROR != 0 {
            bail!("DMA error, cs {:08X}, debug {:08X}", cs, self.dma.0.read(DMA_DEBUG));
        }
        Ok(())
    }
}
