use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Everything needed to construct the strip and the server. Loaded from an
/// optional YAML file, then overridden field by field from the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The type of LED strip to drive: one of ws281x, lpd8806
    pub ledchip: String,
    /// The number of pixels to be controlled
    pub pixels: usize,
    /// Channels per pixel: 3, or 4 for RGBW strips
    pub colors: usize,
    /// The color ordering of the pixels
    pub order: String,
    /// The port that the server should listen to
    pub port: u16,
    /// The SPI device on which LPD8806 LEDs are connected
    pub dev: String,
    /// The speed to send data via SPI to LPD8806s, in Hz
    pub spispeed: u32,
    /// The frequency to send data to WS281x devices, in Hz
    pub ws281xfreq: u32,
    /// The DMA channel to use for sending data to WS281x devices
    pub ws281xdma: usize,
    /// The pin on which channel 0 should be output for WS281x devices
    pub ws281xpin0: usize,
    /// The pin on which channel 1 should be output for WS281x devices
    pub ws281xpin1: usize,
    /// A GPIO pin which, when set high, turns on power for the LEDs
    pub power_ctrl_pin: Option<u8>,
    /// A GPIO pin which indicates healthy power to the LEDs
    pub power_status_pin: Option<u8>,
    /// How long to wait for a healthy power signal, in seconds
    pub power_status_wait: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ledchip: "ws281x".to_string(),
            pixels: 5 * 32,
            colors: 3,
            order: "GRB".to_string(),
            port: 24601,
            dev: "/dev/spidev0.0".to_string(),
            spispeed: 1_000_000,
            ws281xfreq: 800_000,
            ws281xdma: 10,
            ws281xpin0: 18,
            ws281xpin1: 13,
            power_ctrl_pin: None,
            power_status_pin: None,
            power_status_wait: 2.0,
        }
    }
}

/// Read the config file if one was given; otherwise defaults.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let f = std::fs::File::open(path)
        .with_context(|| format!("couldn't open config {}", path.display()))?;
    serde_yaml::from_reader(f).with_context(|| format!("couldn't parse {}", path.display()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_survive_a_round_trip() {
        let c = Config::default();
        let s = serde_yaml::to_string(&c).unwrap();
        let back: Config = serde_yaml::from_str(&s).unwrap();
        assert_eq!(back.port, 24601);
        assert_eq!(back.ledchip, "ws281x");
        assert_eq!(back.pixels, 160);
    }

    #[test]
    fn partial_files_fall_back_to_defaults() {
        let c: Config = serde_yaml::from_str("pixels: 50\nledchip: lpd8806\n").unwrap();
        assert_eq!(c.pixels, 50);
        assert_eq!(c.ledchip, "lpd8806");
        assert_eq!(c.order, "GRB");
        assert_eq!(c.spispeed, 1_000_000);
        assert_eq!(c.power_ctrl_pin, None);
    }
}
