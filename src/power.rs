use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use rppal::gpio::{Gpio, InputPin, OutputPin};

/// Optional supply-rail switching for the strip: a control pin raised
/// before the first frame, and an optional status pin that reports the
/// rail is healthy.
pub struct PowerControl {
    ctrl: Option<OutputPin>,
    status: Option<InputPin>,
    status_wait: Duration,
}

impl PowerControl {
    pub fn new(
        ctrl_pin: Option<u8>,
        status_pin: Option<u8>,
        status_wait: Duration,
    ) -> Result<Self> {
        let Some(ctrl_pin) = ctrl_pin else {
            return Ok(Self::disabled());
        };
        let gpio = Gpio::new().context("couldn't open GPIO")?;
        let ctrl = gpio
            .get(ctrl_pin)
            .with_context(|| format!("couldn't claim power control pin {}", ctrl_pin))?
            .into_output();
        let status = match status_pin {
            Some(pin) => Some(
                gpio.get(pin)
                    .with_context(|| format!("couldn't claim power status pin {}", pin))?
                    .into_input(),
            ),
            None => None,
        };
        Ok(PowerControl { ctrl: Some(ctrl), status, status_wait })
    }

    pub fn disabled() -> Self {
        PowerControl { ctrl: None, status: None, status_wait: Duration::ZERO }
    }

    /// Raise the control pin, then poll the status pin until the rail
    /// reports healthy or the configured wait runs out.
    pub fn on(&mut self) -> Result<()> {
        let Some(ctrl) = self.ctrl.as_mut() else {
            return Ok(());
        };
        log::info!("power on");
        ctrl.set_high();
        let Some(status) = self.status.as_ref() else {
            return Ok(());
        };
        let start = Instant::now();
        loop {
            if status.is_high() {
                log::info!("power stabilized after {:?}", start.elapsed());
                return Ok(());
            }
            if start.elapsed() > self.status_wait {
                bail!("timed out waiting for power to be healthy after {:?}", self.status_wait);
            }
            // No point overdoing it - we're not in _that_ much of a rush
            thread::sleep(Duration::from_millis(50));
        }
    }

    /// Drop the control pin. The status pin takes a while to follow and
    /// waiting for it brings nothing.
    pub fn off(&mut self) -> Result<()> {
        let Some(ctrl) = self.ctrl.as_mut() else {
            return Ok(());
        };
        log::info!("power off");
        ctrl.set_low();
        Ok(())
    }
}
