use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use super::clk::{
    cm_clk_div_i, CM_CLK_CTL_BUSY, CM_CLK_CTL_ENAB, CM_CLK_CTL_KILL, CM_CLK_CTL_PASSWD,
    CM_CLK_CTL_SRC_OSC, CM_CLK_DIV_PASSWD,
};
use super::dma::{
    dma_ti_per_map, DmaBuf, DMA_CONTROL_SIZE, DMA_TI_DEST_DREQ, DMA_TI_NO_WIDE_BURSTS,
    DMA_TI_SRC_INC, DMA_TI_WAIT_RESP,
};
use super::{RegBlock, Rpi};

const PWM_OFFSET: usize = 0x0020_c000;
const PWM_PERIPH_PHYS: u32 = 0x7e20_c000;

// Register words within the PWM block.
const PWM_CTL: usize = 0;
const PWM_DMAC: usize = 2;
const PWM_RNG1: usize = 4;
const PWM_FIF1: usize = 6;
const PWM_REG_WORDS: usize = 10;

const PWM_CTL_USEF2: u32 = 1 << 13;
const PWM_CTL_MODE2: u32 = 1 << 9;
const PWM_CTL_PWEN2: u32 = 1 << 8;
const PWM_CTL_CLRF1: u32 = 1 << 6;
const PWM_CTL_USEF1: u32 = 1 << 5;
const PWM_CTL_MODE1: u32 = 1 << 1;
const PWM_CTL_PWEN1: u32 = 1 << 0;
const PWM_DMAC_ENAB: u32 = 1 << 31;

fn pwm_dmac_panic(val: u32) -> u32 {
    (val & 0xff) << 8
}

fn pwm_dmac_dreq(val: u32) -> u32 {
    val & 0xff
}

/// Which "alt" function selects PWM output for a (channel, pin) pair.
/// See p102 of the datasheet.
fn pwm_pin_alt(channel: usize, pin: usize) -> Option<usize> {
    match (channel, pin) {
        (0, 12) => Some(0),
        (0, 18) => Some(5),
        (0, 40) => Some(0),
        (1, 13) => Some(0),
        (1, 19) => Some(0),
        (1, 41) => Some(0),
        (1, 45) => Some(0),
        _ => None,
    }
}

pub(crate) struct PwmRegs(RegBlock);

impl PwmRegs {
    pub(crate) fn map(periph_base: usize) -> Result<PwmRegs> {
        let block = RegBlock::map(periph_base + PWM_OFFSET, PWM_REG_WORDS * 4)
            .with_context(|| format!("couldn't map PWM registers at {:08X}", periph_base + PWM_OFFSET))?;
        Ok(PwmRegs(block))
    }
}

impl Rpi {
    /// Configure GPIO, the PWM clock, the PWM serializer and the DMA
    /// control block for clocking `bytes` out of the FIFO at 3 PWM bits
    /// per LED bit.
    pub fn init_pwm(&self, freq: u32, buf: &mut DmaBuf, bytes: u32, pins: &[usize]) -> Result<()> {
        for (channel, &pin) in pins.iter().enumerate() {
            let alt = pwm_pin_alt(channel, pin)
                .ok_or_else(|| anyhow!("invalid pin {} for PWM channel {}", pin, channel))?;
            self.gpio_set_alt_function(pin, alt)?;
        }

        self.stop_pwm();

        // Set up the clock - use OSC w/ 3 clocks/tick
        self.set_cm_clk_div(CM_CLK_DIV_PASSWD | cm_clk_div_i(self.osc_freq() / (3 * freq)));
        self.set_cm_clk_ctl(CM_CLK_CTL_PASSWD | CM_CLK_CTL_SRC_OSC);
        self.set_cm_clk_ctl(CM_CLK_CTL_PASSWD | CM_CLK_CTL_SRC_OSC | CM_CLK_CTL_ENAB);
        thread::sleep(Duration::from_micros(10));
        log::debug!("waiting for cmClk busy");
        while self.cm_clk_ctl() & CM_CLK_CTL_BUSY == 0 {
            std::hint::spin_loop();
        }

        // Set up the PWM, with delays as the block is rumored to lock up
        // without them. Use a high enough priority to avoid FIFO underruns
        // when the CPU is busy doing lots of memory accesses or another
        // DMA controller is busy. The FIFO clocks out data at a much
        // slower rate (2.6MHz max), so the odds of a DMA priority boost
        // are extremely low.

        self.pwm.0.write(PWM_RNG1, 32); // 32-bits per word to serialize
        thread::sleep(Duration::from_micros(10));
        self.pwm.0.write(PWM_CTL, PWM_CTL_CLRF1);
        thread::sleep(Duration::from_micros(10));
        self.pwm.0.write(PWM_DMAC, PWM_DMAC_ENAB | pwm_dmac_panic(7) | pwm_dmac_dreq(3));
        thread::sleep(Duration::from_micros(10));
        self.pwm
            .0
            .write(PWM_CTL, PWM_CTL_USEF1 | PWM_CTL_MODE1 | PWM_CTL_USEF2 | PWM_CTL_MODE2);
        thread::sleep(Duration::from_micros(10));
        let ctl = self.pwm.0.read(PWM_CTL);
        self.pwm.0.write(PWM_CTL, ctl | PWM_CTL_PWEN1 | PWM_CTL_PWEN2);

        // Initialize the DMA control block
        let bus_addr = buf.bus_addr();
        let c = buf.control_mut();
        c.ti = DMA_TI_NO_WIDE_BURSTS // 32-bit transfers
            | DMA_TI_WAIT_RESP // wait for write complete
            | DMA_TI_DEST_DREQ // peripheral flow control
            | dma_ti_per_map(5) // PWM peripheral
            | DMA_TI_SRC_INC; // increment src addr
        c.source_ad = bus_addr + DMA_CONTROL_SIZE as u32;
        c.dest_ad = PWM_PERIPH_PHYS + (PWM_FIF1 * 4) as u32;
        c.tx_len = bytes;
        c.stride = 0;
        c.nextconbk = 0;
        log::debug!("DMA sourceAd {:08X}, txLen {}", c.source_ad, c.tx_len);

        self.zero_dma();
        Ok(())
    }

    pub(crate) fn stop_pwm(&self) {
        // Turn off the PWM in case already running
        self.pwm.0.write(PWM_CTL, 0);
        thread::sleep(Duration::from_micros(10));

        // Kill the clock if it was already running
        self.set_cm_clk_ctl(CM_CLK_CTL_PASSWD | CM_CLK_CTL_KILL);
        thread::sleep(Duration::from_micros(10));
        log::debug!("waiting for cmClk not-busy");
        while self.cm_clk_ctl() & CM_CLK_CTL_BUSY != 0 {
            std::hint::spin_loop();
        }
    }
}
