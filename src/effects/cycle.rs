use std::time::{Duration, Instant};

use strip_driver::{LedStrip, Pixel, PixelArray};

use super::{max_channel, Fade};

/// Walks the hexagonal color wheel R -> R+G -> G -> G+B -> B -> B+R -> R.
/// A full cycle is 128*6=768 steps, each of the six edges covering the 128
/// increments between 127 and 0 of the rising or falling channel. Each
/// step is handed to an inner single-unit fade.
#[derive(Debug, Clone)]
pub struct Cycle {
    cycle_time: Duration,
    fade_time: Duration,
    start: Instant,
    last: Pixel,
    fade: Option<Fade>,
}

impl Cycle {
    pub fn new(cycle_time: Duration) -> Self {
        Cycle {
            cycle_time,
            fade_time: cycle_time / 768,
            start: Instant::now(),
            last: Pixel::default(),
            fade: None,
        }
    }

    pub fn start<S: LedStrip>(&mut self, pa: &mut PixelArray<S>, now: Instant) {
        log::info!("starting cycle");
        self.start = now;
        let p = pa.get_pixel(0);
        self.last = p;
        let m = max_channel(self.last);
        if m == 0 {
            // Black, let's fade to red
            log::debug!("black->red");
            self.last.r = 127;
        } else if m == self.last.r {
            self.last.r = 127;
            if self.last.g > self.last.b {
                log::debug!("red->red+green");
                self.last.b = 0;
            } else {
                log::debug!("blue+red->red");
                self.last.g = 0;
            }
        } else if m == self.last.g {
            self.last.g = 127;
            if self.last.b > self.last.r {
                log::debug!("green->green+blue");
                self.last.r = 0;
            } else {
                log::debug!("red+green->green");
                self.last.b = 0;
            }
        } else if m == self.last.b {
            self.last.b = 127;
            if self.last.g > self.last.r {
                log::debug!("green+blue->blue");
                self.last.r = 0;
            } else {
                log::debug!("blue->blue+red");
                self.last.g = 0;
            }
        } else {
            unreachable!("one of the three colors must equal the max");
        }

        if self.last != p {
            let mut d = p;
            d.r = (d.r - self.last.r).abs();
            d.g = (d.g - self.last.g).abs();
            d.b = (d.b - self.last.b).abs();
            let m = max_channel(d);
            let t = self.fade_time * m as u32;
            log::debug!("first fade to {}, max dist {} -> time {:?}", self.last, m, t);
            let mut fade = Fade::new(t, self.last);
            fade.start(pa, now);
            self.fade = Some(fade);
        } else {
            log::debug!("already in-cycle, no initial fade needed");
            self.next_step(pa, now);
        }
    }

    pub fn next_step<S: LedStrip>(&mut self, pa: &mut PixelArray<S>, now: Instant) -> Duration {
        if let Some(fade) = self.fade.as_mut() {
            let t = fade.next_step(pa, now);
            if t != Duration::ZERO {
                // This fade will continue
                return t;
            }
        }
        // Time for a new fade, one unit along the current edge
        if self.last.r == 127 {
            if self.last.b > 0 {
                self.last.b -= 1;
            } else if self.last.g == 127 {
                self.last.r -= 1;
            } else {
                self.last.g += 1;
            }
        } else if self.last.g == 127 {
            if self.last.r > 0 {
                self.last.r -= 1;
            } else if self.last.b == 127 {
                self.last.g -= 1;
            } else {
                self.last.b += 1;
            }
        } else if self.last.b == 127 {
            if self.last.g > 0 {
                self.last.g -= 1;
            } else if self.last.r == 127 {
                self.last.b -= 1;
            } else {
                self.last.r += 1;
            }
        } else {
            unreachable!("broken color {:?}", self.last);
        }
        let mut fade = Fade::new(self.fade_time, self.last);
        fade.start(pa, now);
        self.fade = Some(fade);
        self.cycle_time / (768 * pa.num_pixels() as u32)
    }
}
