use std::time::{Duration, Instant};

use strip_driver::{LedStrip, Pixel, PixelArray};

/// Overwrites the strip with `dest` one pixel at a time, front to back,
/// finishing when `zip_time` is up.
#[derive(Debug, Clone)]
pub struct Zip {
    zip_time: Duration,
    dest: Pixel,
    start: Instant,
    last_set: i32,
}

impl Zip {
    pub fn new(zip_time: Duration, dest: Pixel) -> Self {
        Zip { zip_time, dest, start: Instant::now(), last_set: -1 }
    }

    pub fn start<S: LedStrip>(&mut self, _pa: &mut PixelArray<S>, now: Instant) {
        log::info!("starting zip, dest {}", self.dest);
        self.start = now;
        self.last_set = -1;
    }

    pub fn next_step<S: LedStrip>(&mut self, pa: &mut PixelArray<S>, now: Instant) -> Duration {
        let np = pa.num_pixels();
        let elapsed = now.saturating_duration_since(self.start);
        let frac = elapsed.as_nanos() as f64 / self.zip_time.as_nanos() as f64;
        let p = (frac * np as f64) as i32;
        let mut i = self.last_set + 1;
        while (i as usize) < np && i <= p {
            pa.set_one(i as usize, self.dest);
            i += 1;
        }
        self.last_set = p.min(np as i32 - 1);
        if p >= np as i32 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.zip_time.as_nanos() as u64 / np as u64)
    }
}

#[cfg(test)]
mod test {
    use super::super::testutil::fake_array;
    use super::*;

    #[test]
    fn prefix_grows_and_finishes() {
        let mut pa = fake_array(100, 3);
        let before = Pixel { r: 1, g: 2, b: 3, w: -1 };
        pa.set_all(before);
        let dest = Pixel { r: 90, g: 0, b: 0, w: -1 };
        let mut z = Zip::new(Duration::from_secs(10), dest);
        let t0 = Instant::now();
        z.start(&mut pa, t0);

        let d = z.next_step(&mut pa, t0 + Duration::from_secs(3));
        assert_eq!(d, Duration::from_millis(100));
        let py = pa.get_pixels();
        for (i, p) in py.iter().enumerate() {
            if i <= 29 {
                assert_eq!(*p, dest, "pixel {} should be zipped", i);
            } else {
                assert_eq!(*p, before, "pixel {} should be untouched", i);
            }
        }

        // earlier pixels stay set, the prefix only grows
        z.next_step(&mut pa, t0 + Duration::from_secs(7));
        assert_eq!(pa.get_pixel(69), dest);
        assert_eq!(pa.get_pixel(70), before);

        let d = z.next_step(&mut pa, t0 + Duration::from_secs(10));
        assert_eq!(d, Duration::ZERO);
        assert!(pa.get_pixels().iter().all(|p| *p == dest));
    }
}
