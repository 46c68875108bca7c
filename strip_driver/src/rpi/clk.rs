use anyhow::{Context, Result};

use super::{RegBlock, Rpi};

const CM_PWM_OFFSET: usize = 0x0010_10a0;

const CM_CLK_CTL: usize = 0;
const CM_CLK_DIV: usize = 1;

pub(crate) const CM_CLK_CTL_PASSWD: u32 = 0x5a << 24;
pub(crate) const CM_CLK_CTL_BUSY: u32 = 1 << 7;
pub(crate) const CM_CLK_CTL_KILL: u32 = 1 << 5;
pub(crate) const CM_CLK_CTL_ENAB: u32 = 1 << 4;
pub(crate) const CM_CLK_CTL_SRC_OSC: u32 = 1 << 0;
pub(crate) const CM_CLK_DIV_PASSWD: u32 = 0x5a << 24;

pub(crate) fn cm_clk_div_i(val: u32) -> u32 {
    (val & 0xfff) << 12
}

pub(crate) struct CmClkRegs(RegBlock);

impl CmClkRegs {
    pub(crate) fn map(periph_base: usize) -> Result<CmClkRegs> {
        let block = RegBlock::map(periph_base + CM_PWM_OFFSET, 2 * 4).with_context(|| {
            format!("couldn't map PWM clock registers at {:08X}", periph_base + CM_PWM_OFFSET)
        })?;
        Ok(CmClkRegs(block))
    }
}

impl Rpi {
    pub(crate) fn cm_clk_ctl(&self) -> u32 {
        self.cm_clk.0.read(CM_CLK_CTL)
    }

    pub(crate) fn set_cm_clk_ctl(&self, v: u32) {
        self.cm_clk.0.write(CM_CLK_CTL, v);
    }

    pub(crate) fn set_cm_clk_div(&self, v: u32) {
        self.cm_clk.0.write(CM_CLK_DIV, v);
    }
}
