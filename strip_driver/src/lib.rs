//! Drivers for addressable LED strips hanging off a Raspberry Pi.
//!
//! Two hardware paths are supported: LPD8806 chains on the SPI bus, and
//! WS281x chains clocked out of a GPIO pin by the PWM peripheral, fed via
//! DMA from a VideoCore-allocated buffer.

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};

mod lpd8806;
mod pixarray;
pub mod rpi;
mod ws281x;

pub use lpd8806::Lpd8806Strip;
pub use pixarray::PixelArray;
pub use ws281x::Ws281xStrip;

/// One color sample. `w` is -1 on strips without a white channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pixel {
    pub r: i32,
    pub g: i32,
    pub b: i32,
    pub w: i32,
}

impl Pixel {
    /// All channels off, with `w` absent or zero to match the strip.
    pub fn black(num_colors: usize) -> Self {
        Pixel {
            r: 0,
            g: 0,
            b: 0,
            w: if num_colors == 4 { 0 } else { -1 },
        }
    }
}

impl fmt::Display for Pixel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.w != -1 {
            write!(f, "{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.w)
        } else {
            write!(f, "{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        }
    }
}

/// Wire ordering of the color channels within one pixel's byte triple.
/// The white byte, where present, always follows at offset 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Grb,
    Brg,
    Bgr,
    Gbr,
    Rgb,
    Rbg,
}

impl ChannelOrder {
    /// Byte offsets of (g, r, b) within a wire-order triple.
    pub fn offsets(self) -> (usize, usize, usize) {
        match self {
            ChannelOrder::Grb => (0, 1, 2),
            ChannelOrder::Brg => (2, 1, 0),
            ChannelOrder::Bgr => (1, 2, 0),
            ChannelOrder::Gbr => (0, 2, 1),
            ChannelOrder::Rgb => (1, 0, 2),
            ChannelOrder::Rbg => (2, 0, 1),
        }
    }
}

impl FromStr for ChannelOrder {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "GRB" => ChannelOrder::Grb,
            "BRG" => ChannelOrder::Brg,
            "BGR" => ChannelOrder::Bgr,
            "GBR" => ChannelOrder::Gbr,
            "RGB" => ChannelOrder::Rgb,
            "RBG" => ChannelOrder::Rbg,
            _ => bail!("unrecognized channel order '{}'", s),
        })
    }
}

/// The seam between the logical pixel canvas and a concrete strip chip.
/// `write` is the only operation that actuates the physical output.
pub trait LedStrip {
    fn max_per_channel(&self) -> i32;
    fn get_pixel(&self, i: usize) -> Pixel;
    fn set_pixel(&mut self, i: usize, p: Pixel);
    fn write(&mut self) -> Result<()>;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pixel_formats_three_or_four_pairs() {
        let p3 = Pixel { r: 0x10, g: 0x0a, b: 0x7f, w: -1 };
        assert_eq!(p3.to_string(), "100a7f");
        let p4 = Pixel { r: 0x10, g: 0x0a, b: 0x7f, w: 0x05 };
        assert_eq!(p4.to_string(), "100a7f05");
    }

    #[test]
    fn order_round_trips_from_str() {
        for (s, o) in [
            ("GRB", ChannelOrder::Grb),
            ("BRG", ChannelOrder::Brg),
            ("BGR", ChannelOrder::Bgr),
            ("GBR", ChannelOrder::Gbr),
            ("RGB", ChannelOrder::Rgb),
            ("RBG", ChannelOrder::Rbg),
        ] {
            assert_eq!(s.parse::<ChannelOrder>().unwrap(), o);
            assert_eq!(s.to_lowercase().parse::<ChannelOrder>().unwrap(), o);
        }
        assert!("GBRW".parse::<ChannelOrder>().is_err());
    }

    #[test]
    fn offsets_cover_the_triple() {
        for s in ["GRB", "BRG", "BGR", "GBR", "RGB", "RBG"] {
            let (g, r, b) = s.parse::<ChannelOrder>().unwrap().offsets();
            let mut seen = [false; 3];
            seen[g] = true;
            seen[r] = true;
            seen[b] = true;
            assert!(seen.iter().all(|&x| x), "{} doesn't permute 0..3", s);
        }
    }
}
