use anyhow::{bail, Context, Result};

use super::{RegBlock, Rpi};

const GPIO_OFFSET: usize = 0x0020_0000;

// The block runs from FSEL0 through the test register, 0xb4 bytes.
const GPIO_REG_WORDS: usize = 45;

const GPIO_FSEL0: usize = 0;

pub(crate) struct GpioRegs(RegBlock);

impl GpioRegs {
    pub(crate) fn map(periph_base: usize) -> Result<GpioRegs> {
        let block = RegBlock::map(periph_base + GPIO_OFFSET, GPIO_REG_WORDS * 4)
            .with_context(|| format!("couldn't map GPIO registers at {:08X}", periph_base + GPIO_OFFSET))?;
        Ok(GpioRegs(block))
    }
}

impl Rpi {
    fn gpio_set_pin_function(&self, pin: usize, func: u32) -> Result<()> {
        if pin > 53 {
            // p94
            bail!("pin {} not supported", pin);
        }
        let reg = GPIO_FSEL0 + pin / 10;
        let offset = (pin % 10) * 3;
        let mut fsel = self.gpio.0.read(reg);
        fsel &= !(0x7 << offset);
        fsel |= func << offset;
        self.gpio.0.write(reg, fsel);
        Ok(())
    }

    /// Route a pin to one of its alternate functions.
    pub(crate) fn gpio_set_alt_function(&self, pin: usize, alt: usize) -> Result<()> {
        // p92: function-select encodings for alt0..alt5, in that order
        let funcs = [4, 5, 6, 7, 3, 2];
        if alt >= funcs.len() {
            bail!("{} is an invalid alt function", alt);
        }
        self.gpio_set_pin_function(pin, funcs[alt])
    }
}
