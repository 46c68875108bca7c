use std::time::{Duration, Instant};

use strip_driver::{LedStrip, Pixel, PixelArray};

use super::round;

/// A color wheel wrapped around the strip, rotating once per `cycle_time`.
#[derive(Debug, Clone)]
pub struct Rainbow {
    cycle_time: Duration,
    start: Instant,
}

/// Triangle-wave color wheel: full on for a sixth of the wheel, ramping
/// down over the next sixth, off through the middle, ramping back up over
/// the last sixth.
fn f_to_pix(f: f64, offset: f64) -> i32 {
    let mut f = f - offset;
    if f < 0.0 {
        f += 1.0;
    }
    if f < 0.166667 {
        127
    } else if f < 0.333334 {
        127 - round(127.0 * ((f - 0.166667) / 0.166667))
    } else if f > 0.833333 {
        round(127.0 * ((f - 0.833333) / 0.166667))
    } else {
        0
    }
}

impl Rainbow {
    pub fn new(cycle_time: Duration) -> Self {
        Rainbow { cycle_time, start: Instant::now() }
    }

    pub fn start<S: LedStrip>(&mut self, _pa: &mut PixelArray<S>, now: Instant) {
        log::info!("starting rainbow");
        self.start = now;
    }

    pub fn next_step<S: LedStrip>(&mut self, pa: &mut PixelArray<S>, now: Instant) -> Duration {
        let np = pa.num_pixels();
        let elapsed = now.saturating_duration_since(self.start);
        let mut pos = elapsed.as_nanos() as f64 / self.cycle_time.as_nanos() as f64;
        pos -= pos.floor();
        let offs = round(np as f64 * pos) as usize;

        for i in 0..np {
            let f = i as f64 / np as f64;
            let p = Pixel {
                r: f_to_pix(f, 0.0),
                g: f_to_pix(f, 0.333334),
                b: f_to_pix(f, 0.666667),
                w: 0,
            };
            pa.set_one((i + offs) % np, p);
        }
        self.cycle_time / 768
    }
}
