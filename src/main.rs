use std::path::PathBuf;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use clap::Parser;
use strip_driver::{ChannelOrder, LedStrip, Lpd8806Strip, PixelArray, Ws281xStrip};

mod config;
mod effects;
mod power;
mod renderer;
mod server;

use config::Config;
use effects::Effect;
use power::PowerControl;
use renderer::{Shared, SharedStatus};
use server::Server;

/// TCP-controlled effect server for WS281x/LPD8806 LED strips
#[derive(Parser)]
#[command(version)]
struct Opts {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// The type of LED strip to drive: one of ws281x, lpd8806
    #[arg(long)]
    ledchip: Option<String>,

    /// The number of pixels to be controlled
    #[arg(long)]
    pixels: Option<usize>,

    /// Channels per pixel: 3, or 4 for RGBW strips
    #[arg(long)]
    colors: Option<usize>,

    /// The color ordering of the pixels
    #[arg(long)]
    order: Option<String>,

    /// The port that the server should listen to
    #[arg(long)]
    port: Option<u16>,

    /// The SPI device on which LPD8806 LEDs are connected
    #[arg(long)]
    dev: Option<String>,

    /// The speed to send data via SPI to LPD8806s, in Hz
    #[arg(long)]
    spispeed: Option<u32>,

    /// The frequency to send data to WS281x devices, in Hz
    #[arg(long)]
    ws281xfreq: Option<u32>,

    /// The DMA channel to use for sending data to WS281x devices
    #[arg(long)]
    ws281xdma: Option<usize>,

    /// The pin on which channel 0 should be output for WS281x devices
    #[arg(long)]
    ws281xpin0: Option<usize>,

    /// The pin on which channel 1 should be output for WS281x devices
    #[arg(long)]
    ws281xpin1: Option<usize>,

    /// A GPIO pin which, when set high, turns on power for the LEDs
    #[arg(long)]
    power_ctrl_pin: Option<u8>,

    /// A GPIO pin which indicates healthy power to the LEDs
    #[arg(long)]
    power_status_pin: Option<u8>,

    /// How long to wait for a healthy power signal, in seconds
    #[arg(long)]
    power_status_wait: Option<f64>,
}

impl Opts {
    fn apply(&self, mut c: Config) -> Config {
        macro_rules! merge {
            ($field:ident) => {
                if let Some(v) = &self.$field {
                    c.$field = v.clone();
                }
            };
        }
        merge!(ledchip);
        merge!(pixels);
        merge!(colors);
        merge!(order);
        merge!(port);
        merge!(dev);
        merge!(spispeed);
        merge!(ws281xfreq);
        merge!(ws281xdma);
        merge!(ws281xpin0);
        merge!(ws281xpin1);
        merge!(power_status_wait);
        if self.power_ctrl_pin.is_some() {
            c.power_ctrl_pin = self.power_ctrl_pin;
        }
        if self.power_status_pin.is_some() {
            c.power_status_pin = self.power_status_pin;
        }
        c
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let opts = Opts::parse();
    let config = opts.apply(config::load(opts.config.as_deref())?);
    log::debug!("{:?}", config);

    let order: ChannelOrder = config.order.parse()?;
    let status_wait = Duration::try_from_secs_f64(config.power_status_wait)
        .map_err(|e| anyhow!("bad power-status-wait: {}", e))?;
    let power = PowerControl::new(config.power_ctrl_pin, config.power_status_pin, status_wait)?;
    let (tx, rx) = sync_channel::<Effect>(1);
    let shared: Shared = Arc::new(Mutex::new(SharedStatus::new()));

    match config.ledchip.as_str() {
        "lpd8806" => {
            let strip = Lpd8806Strip::new(
                &config.dev,
                config.pixels,
                config.colors,
                config.spispeed,
                order,
            )?;
            let pa = PixelArray::new(config.pixels, config.colors, strip);
            serve(pa, &config, tx, rx, shared, power)
        }
        "ws281x" => {
            let strip = Ws281xStrip::new(
                config.pixels,
                config.colors,
                order,
                config.ws281xfreq,
                config.ws281xdma,
                &[config.ws281xpin0, config.ws281xpin1],
            )?;
            let pa = PixelArray::new(config.pixels, config.colors, strip);
            serve(pa, &config, tx, rx, shared, power)
        }
        other => bail!("unrecognized LED type: {}", other),
    }
}

/// Accept connections on a background thread; the renderer owns this
/// thread so a hardware failure takes the process down with it.
fn serve<S: LedStrip>(
    pa: PixelArray<S>,
    config: &Config,
    tx: SyncSender<Effect>,
    rx: Receiver<Effect>,
    shared: Shared,
    power: PowerControl,
) -> Result<()> {
    shared.lock().unwrap().pixels = pa.get_pixels();
    let server = Arc::new(Server::new(
        config.port,
        tx,
        shared.clone(),
        pa.num_pixels(),
        pa.num_colors(),
        pa.max_per_channel(),
    )?);
    thread::spawn(move || server.run());
    renderer::run(pa, rx, shared, power)
}
