use std::time::{Duration, Instant};

use strip_driver::{LedStrip, Pixel, PixelArray};

use super::lcm_rgb;

/// Linear interpolation of every pixel toward `dest`, arriving exactly at
/// the end of `fade_time`. When the whole strip moves together, integer
/// rollovers are dithered across the strip so the average brightness
/// tracks the ideal line at sub-unit resolution.
#[derive(Debug, Clone)]
pub struct Fade {
    fade_time: Duration,
    dest: Pixel,
    start_pix: Vec<Pixel>,
    diffs: Vec<Pixel>,
    all_same: bool,
    time_step: Duration,
    start: Instant,
}

impl Fade {
    pub fn new(fade_time: Duration, dest: Pixel) -> Self {
        Fade {
            fade_time,
            dest,
            start_pix: Vec::new(),
            diffs: Vec::new(),
            all_same: false,
            time_step: Duration::ZERO,
            start: Instant::now(),
        }
    }

    pub fn start<S: LedStrip>(&mut self, pa: &mut PixelArray<S>, now: Instant) {
        log::info!("starting fade, dest {}", self.dest);
        self.all_same = true;
        self.start_pix = pa.get_pixels();
        self.diffs = Vec::with_capacity(pa.num_pixels());
        let mut maxdiff = Pixel::default();
        let mut lastp = Pixel::default();
        for (i, v) in self.start_pix.iter().enumerate() {
            let d = Pixel {
                r: self.dest.r - v.r,
                g: self.dest.g - v.g,
                b: self.dest.b - v.b,
                w: self.dest.w - v.w,
            };
            maxdiff.r = maxdiff.r.max(d.r.abs());
            maxdiff.g = maxdiff.g.max(d.g.abs());
            maxdiff.b = maxdiff.b.max(d.b.abs());
            maxdiff.w = maxdiff.w.max(d.w.abs());
            self.diffs.push(d);
            if i > 0 && lastp != *v {
                self.all_same = false;
            }
            lastp = *v;
        }
        if maxdiff.r == 0 && maxdiff.g == 0 && maxdiff.b == 0 && maxdiff.w == 0 {
            // Nothing moves; one step covers the whole fade.
            self.time_step = self.fade_time;
        } else {
            // The shortest interval in which any channel can move by one
            // whole unit.
            let mut ns_step = self.fade_time.as_nanos() as i64 / lcm_rgb(maxdiff) as i64;
            if self.all_same {
                log::debug!("starting all-same");
                ns_step /= pa.num_pixels() as i64;
            }
            self.time_step = Duration::from_nanos(ns_step as u64);
        }
        log::debug!("fade maxdiff {:?}, timestep {:?}", maxdiff, self.time_step);
        self.start = now;
    }

    pub fn next_step<S: LedStrip>(&mut self, pa: &mut PixelArray<S>, now: Instant) -> Duration {
        let td = now.saturating_duration_since(self.start);
        let pct = td.as_nanos() as f64 / self.fade_time.as_nanos() as f64;
        if pct >= 1.0 {
            pa.set_all(self.dest);
            return Duration::ZERO;
        }
        if self.all_same {
            return self.dithered_step(pa, pct);
        }

        let mut all_same = true;
        let mut lastp = Pixel::default();
        for (i, v) in self.start_pix.iter().enumerate() {
            let p = Pixel {
                r: v.r + (self.diffs[i].r as f64 * pct) as i32,
                g: v.g + (self.diffs[i].g as f64 * pct) as i32,
                b: v.b + (self.diffs[i].b as f64 * pct) as i32,
                w: v.w + (self.diffs[i].w as f64 * pct) as i32,
            };
            pa.set_one(i, p);
            if i > 0 && lastp != p {
                all_same = false;
            }
            lastp = p;
        }
        if all_same {
            // The frame just became uniform; from here on sub-unit
            // progress happens num_pixels times per integer step.
            log::debug!("setting all-same");
            self.all_same = true;
            self.time_step =
                Duration::from_nanos(self.time_step.as_nanos() as u64 / pa.num_pixels() as u64);
        }
        self.time_step
    }

    /// All pixels share one trajectory: compute the two neighboring
    /// integer colors and interleave them per channel so roughly
    /// `pct_through_step * num_pixels` pixels already show the next value.
    fn dithered_step<S: LedStrip>(&mut self, pa: &mut PixelArray<S>, pct: f64) -> Duration {
        let s0 = self.start_pix[0];
        let d0 = self.diffs[0];
        let this = Pixel {
            r: s0.r + (d0.r as f64 * pct) as i32,
            g: s0.g + (d0.g as f64 * pct) as i32,
            b: s0.b + (d0.b as f64 * pct) as i32,
            w: s0.w + (d0.w as f64 * pct) as i32,
        };

        // Fraction of the fade at which the current and the next integer
        // boundary are reached, per channel.
        fn reached(this_c: i32, start_c: i32, diff_c: i32) -> f64 {
            if diff_c != 0 {
                (this_c - start_c) as f64 / diff_c as f64
            } else {
                0.0
            }
        }
        fn next_reached(this_c: i32, start_c: i32, diff_c: i32) -> f64 {
            if diff_c > 0 {
                (this_c + 1 - start_c) as f64 / diff_c as f64
            } else if diff_c < 0 {
                (this_c - 1 - start_c) as f64 / diff_c as f64
            } else {
                1.1
            }
        }
        let trp = reached(this.r, s0.r, d0.r);
        let tgp = reached(this.g, s0.g, d0.g);
        let tbp = reached(this.b, s0.b, d0.b);
        let twp = reached(this.w, s0.w, d0.w);
        let nrp = next_reached(this.r, s0.r, d0.r);
        let ngp = next_reached(this.g, s0.g, d0.g);
        let nbp = next_reached(this.b, s0.b, d0.b);
        let nwp = next_reached(this.w, s0.w, d0.w);
        if nrp + ngp + nbp + nwp > 4.35 {
            log::debug!("weird, no diffs for r,g,b,w");
            return self.time_step;
        }

        let mut next = this;
        if d0.r != 0 {
            next.r += d0.r.signum();
        }
        if d0.g != 0 {
            next.g += d0.g.signum();
        }
        if d0.b != 0 {
            next.b += d0.b.signum();
        }
        if d0.w != 0 {
            next.w += d0.w.signum();
        }

        let np = pa.num_pixels() as f64;
        let num = Pixel {
            r: (np * ((pct - trp) / (nrp - trp))) as i32,
            g: (np * ((pct - tgp) / (ngp - tgp))) as i32,
            b: (np * ((pct - tbp) / (nbp - tbp))) as i32,
            w: (np * ((pct - twp) / (nwp - twp))) as i32,
        };
        let div = pa.num_pixels() as i32;
        pa.set_per_chan_alternate(num, div, this, next);
        self.time_step
    }
}
