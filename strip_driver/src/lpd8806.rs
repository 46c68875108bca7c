use anyhow::{anyhow, bail, Context, Result};
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};

use crate::{ChannelOrder, LedStrip, Pixel};

/// LPD8806 chain on the SPI bus. Every data byte carries the value in its
/// low 7 bits with the high bit set; a run of zero bytes latches the frame,
/// one zero byte per 32 pixels.
pub struct Lpd8806Strip {
    num_pixels: usize,
    g: usize,
    r: usize,
    b: usize,
    buf: Vec<u8>,
    spi: Spi,
}

/// Translate a `/dev/spidevB.S` path to rppal's bus/slave-select pair.
fn parse_spi_dev(dev: &str) -> Result<(Bus, SlaveSelect)> {
    let suffix = dev
        .strip_prefix("/dev/spidev")
        .ok_or_else(|| anyhow!("'{}' is not a spidev path", dev))?;
    let (bus, ss) = suffix
        .split_once('.')
        .ok_or_else(|| anyhow!("'{}' is missing a bus.cs suffix", dev))?;
    let bus = match bus {
        "0" => Bus::Spi0,
        "1" => Bus::Spi1,
        "2" => Bus::Spi2,
        _ => bail!("unsupported SPI bus in '{}'", dev),
    };
    let ss = match ss {
        "0" => SlaveSelect::Ss0,
        "1" => SlaveSelect::Ss1,
        "2" => SlaveSelect::Ss2,
        _ => bail!("unsupported SPI slave select in '{}'", dev),
    };
    Ok((bus, ss))
}

impl Lpd8806Strip {
    pub fn new(
        dev: &str,
        num_pixels: usize,
        num_colors: usize,
        spi_speed: u32,
        order: ChannelOrder,
    ) -> Result<Self> {
        if num_colors != 3 {
            bail!("LPD8806 strips carry 3 channels, not {}", num_colors);
        }
        let (bus, ss) = parse_spi_dev(dev)?;
        let spi = Spi::new(bus, ss, spi_speed, Mode::Mode0)
            .with_context(|| format!("couldn't open {}", dev))?;
        log::debug!("opened {} at {} Hz", dev, spi_speed);

        let num_reset = (num_pixels + 31) / 32;
        let (g, r, b) = order.offsets();
        let mut strip = Lpd8806Strip {
            num_pixels,
            g,
            r,
            b,
            buf: vec![0u8; num_pixels * 3 + num_reset],
            spi,
        };

        // Latch whatever a previous run left mid-frame.
        strip
            .spi
            .write(&vec![0u8; num_reset])
            .context("couldn't reset strip")?;
        Ok(strip)
    }
}

impl LedStrip for Lpd8806Strip {
    fn max_per_channel(&self) -> i32 {
        127
    }

    fn get_pixel(&self, i: usize) -> Pixel {
        Pixel {
            r: (self.buf[i * 3 + self.r] & 0x7f) as i32,
            g: (self.buf[i * 3 + self.g] & 0x7f) as i32,
            b: (self.buf[i * 3 + self.b] & 0x7f) as i32,
            w: -1,
        }
    }

    fn set_pixel(&mut self, i: usize, p: Pixel) {
        self.buf[i * 3 + self.g] = 0x80 | p.g as u8;
        self.buf[i * 3 + self.r] = 0x80 | p.r as u8;
        self.buf[i * 3 + self.b] = 0x80 | p.b as u8;
    }

    fn write(&mut self) -> Result<()> {
        let n = self.spi.write(&self.buf).context("SPI write failed")?;
        if n != self.buf.len() {
            bail!("short SPI write: {} of {} bytes", n, self.buf.len());
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn spi_dev_paths_parse() {
        assert!(matches!(parse_spi_dev("/dev/spidev0.0"), Ok((Bus::Spi0, SlaveSelect::Ss0))));
        assert!(matches!(parse_spi_dev("/dev/spidev1.2"), Ok((Bus::Spi1, SlaveSelect::Ss2))));
        assert!(parse_spi_dev("/dev/spidev9.0").is_err());
        assert!(parse_spi_dev("/dev/ttyUSB0").is_err());
        assert!(parse_spi_dev("/dev/spidev00").is_err());
    }
}
