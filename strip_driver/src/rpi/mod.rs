//! Raspberry Pi peripheral access for the WS281x output path: hardware
//! detection, VideoCore mailbox memory, and the DMA / PWM / GPIO / clock
//! register blocks mapped from `/dev/mem`.
//!
//! Register layouts follow the BCM2835 ARM peripherals datasheet; the
//! mailbox protocol follows the firmware wiki's property interface.

use std::fs::File;

use anyhow::{anyhow, Context, Result};
use memmap2::MmapRaw;

mod clk;
mod dma;
mod gpio;
mod ioctl;
mod mbox;
mod pwm;

pub use dma::DmaBuf;

pub(crate) const PAGE_SIZE: usize = 4096;

const OSC_FREQ: u32 = 19_200_000; // crystal frequency
const OSC_FREQ_PI4: u32 = 54_000_000; // Pi 4 crystal frequency

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HwType {
    Pi1,
    Pi2,
    Pi4,
}

#[derive(Debug, Clone, Copy)]
struct Hw {
    hw_type: HwType,
    periph_base: usize,
    vc_base: u32,
    name: &'static str,
}

const PERIPH_BASE_RPI: usize = 0x2000_0000;
const PERIPH_BASE_RPI2: usize = 0x3f00_0000;
const PERIPH_BASE_RPI4: usize = 0xfe00_0000;

const VIDEOCORE_BASE_RPI: u32 = 0x4000_0000;
const VIDEOCORE_BASE_RPI2: u32 = 0xc000_0000;

const fn pi1(name: &'static str) -> Hw {
    Hw {
        hw_type: HwType::Pi1,
        periph_base: PERIPH_BASE_RPI,
        vc_base: VIDEOCORE_BASE_RPI,
        name,
    }
}

const fn pi2(name: &'static str) -> Hw {
    Hw {
        hw_type: HwType::Pi2,
        periph_base: PERIPH_BASE_RPI2,
        vc_base: VIDEOCORE_BASE_RPI2,
        name,
    }
}

const fn pi4(name: &'static str) -> Hw {
    Hw {
        hw_type: HwType::Pi4,
        periph_base: PERIPH_BASE_RPI4,
        vc_base: VIDEOCORE_BASE_RPI2,
        name,
    }
}

fn variant(rev: u32) -> Option<Hw> {
    Some(match rev {
        // Model B rev 1.0 / 2.0
        0x02 | 0x03 | 0x04 | 0x05 | 0x06 | 0x0d | 0x0e | 0x0f => pi1("Model B"),
        0x07 | 0x08 | 0x09 => pi1("Model A"),
        0x10 | 0x13 | 0x900032 => pi1("Model B+"),
        0x12 | 0x15 | 0x900021 => pi1("Model A+"),
        0x11 | 0x14 => pi1("Compute Module 1"),
        0x900092 => pi1("Pi Zero v1.2"),
        0x900093 | 0x920093 => pi1("Pi Zero v1.3"),
        0x9200c1 | 0x9000c1 => pi1("Pi Zero W v1.1"),

        0xa01040 | 0xa01041 | 0xa21041 | 0xa22042 => pi2("Pi 2"),
        0xa02082 | 0xa02083 | 0xa22082 | 0xa22083 => pi2("Pi 3"),
        0xa020d3 => pi2("Pi 3 B+"),
        0x9020e0 => pi2("Model 3 A+"),
        0xa020a0 => pi2("Compute Module 3/L3"),
        0xa02100 => pi2("Compute Module 3+"),

        0xa03111 => pi4("Pi 4 Model B - 1GB v1.1"),
        0xb03111 => pi4("Pi 4 Model B - 2GB v1.1"),
        0xc03111 => pi4("Pi 4 Model B - 4GB v1.1"),
        0xa03112 => pi4("Pi 4 Model B - 1GB v1.2"),
        0xb03112 => pi4("Pi 4 Model B - 2GB v1.2"),
        0xc03112 => pi4("Pi 4 Model B - 4GB v1.2"),
        0xd03114 => pi4("Pi 4 Model B - 8GB v1.2"),
        0xb03114 => pi4("Pi 4 Model B - 2GB v1.4"),
        0xc03130 => pi4("Pi 400 - 4GB v1.0"),

        _ => return None,
    })
}

/// Identify the Pi we're running on from the device tree's revision word.
fn detect_hardware() -> Result<Hw> {
    let b = std::fs::read("/proc/device-tree/system/linux,revision")
        .context("couldn't read linux revision file")?;
    let b: [u8; 4] = b
        .as_slice()
        .try_into()
        .map_err(|_| anyhow!("revision file held {} bytes instead of 4", b.len()))?;
    let rev = u32::from_be_bytes(b);
    variant(rev).ok_or_else(|| anyhow!("couldn't identify hardware revision {:X}", rev))
}

/// One page-aligned `/dev/mem` mapping holding a peripheral's registers.
/// All accesses go through 32-bit volatile reads and writes; the raw
/// pointer never leaves this module tree.
pub(crate) struct RegBlock {
    _map: MmapRaw,
    base: *mut u32,
}

impl RegBlock {
    fn map(phys: usize, bytes: usize) -> Result<RegBlock> {
        let (map, offs) = mbox::map_mem(phys, bytes)?;
        let base = unsafe { (map.as_mut_ptr() as *mut u8).add(offs) } as *mut u32;
        Ok(RegBlock { _map: map, base })
    }

    pub(crate) fn read(&self, word: usize) -> u32 {
        unsafe { self.base.add(word).read_volatile() }
    }

    pub(crate) fn write(&self, word: usize, v: u32) {
        unsafe { self.base.add(word).write_volatile(v) }
    }
}

/// Handle on the Pi's mailbox and the four register blocks the WS281x
/// path programs. Mapped once at construction, held for process lifetime.
pub struct Rpi {
    mbox: File,
    hw: Hw,
    dma: dma::DmaRegs,
    pwm: pwm::PwmRegs,
    gpio: gpio::GpioRegs,
    cm_clk: clk::CmClkRegs,
}

impl Rpi {
    pub fn new(dma_channel: usize) -> Result<Rpi> {
        let hw = detect_hardware()?;
        log::info!("detected {}", hw.name);
        let mbox = mbox::open()?;
        let dma = dma::DmaRegs::map(hw.periph_base, dma_channel)?;
        let pwm = pwm::PwmRegs::map(hw.periph_base)?;
        let gpio = gpio::GpioRegs::map(hw.periph_base)?;
        let cm_clk = clk::CmClkRegs::map(hw.periph_base)?;
        Ok(Rpi { mbox, hw, dma, pwm, gpio, cm_clk })
    }

    fn osc_freq(&self) -> u32 {
        if self.hw.hw_type == HwType::Pi4 {
            OSC_FREQ_PI4
        } else {
            OSC_FREQ
        }
    }
}
