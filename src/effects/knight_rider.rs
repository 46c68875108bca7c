use std::time::{Duration, Instant};

use strip_driver::{LedStrip, Pixel, PixelArray};

/// A red pulse of `pulse_len` pixels sweeping the strip, reversing
/// direction every `pulse_time`.
#[derive(Debug, Clone)]
pub struct KnightRider {
    pulse_time: Duration,
    pulse_len: usize,
    start: Instant,
}

impl KnightRider {
    pub fn new(pulse_time: Duration, pulse_len: usize) -> Self {
        KnightRider { pulse_time, pulse_len, start: Instant::now() }
    }

    pub fn start<S: LedStrip>(&mut self, pa: &mut PixelArray<S>, now: Instant) {
        log::info!("starting knight rider");
        self.start = now;
        pa.set_all(Pixel { r: 0, g: 0, b: 0, w: 0 });
    }

    pub fn next_step<S: LedStrip>(&mut self, pa: &mut PixelArray<S>, now: Instant) -> Duration {
        let elapsed = now.saturating_duration_since(self.start).as_nanos() as i64;
        let pt = self.pulse_time.as_nanos() as i64;
        let pulse = elapsed / pt;
        let progress = (elapsed - pulse * pt) as f64 / pt as f64;

        let np = pa.num_pixels() as i32;
        let len = self.pulse_len as i32;
        let mut head = ((np + len) as f64 * progress) as i32;
        let dir = if pulse % 2 == 0 {
            1
        } else {
            head = np - head;
            -1
        };
        let tail = (head - dir * len).clamp(0, np - 1);
        let range_head = head.clamp(0, np - 1);

        let mut i = tail;
        while i != range_head {
            let v = ((len - (head - i).abs()) as f64 / len as f64 * 126.0) as i32 + 1;
            pa.set_one(i as usize, Pixel { r: v, g: 0, b: 0, w: 0 });
            i += dir;
        }
        Duration::from_millis(1)
    }
}

#[cfg(test)]
mod test {
    use super::super::testutil::fake_array;
    use super::*;

    #[test]
    fn start_blanks_the_strip() {
        let mut pa = fake_array(100, 3);
        pa.set_all(Pixel { r: 50, g: 50, b: 50, w: -1 });
        let mut kr = KnightRider::new(Duration::from_secs(2), 25);
        kr.start(&mut pa, Instant::now());
        assert!(pa.get_pixels().iter().all(|p| p.r == 0 && p.g == 0 && p.b == 0));
    }

    #[test]
    fn pulse_moves_right_then_left() {
        let mut pa = fake_array(100, 3);
        let mut kr = KnightRider::new(Duration::from_secs(2), 25);
        let t0 = Instant::now();
        kr.start(&mut pa, t0);

        // halfway through the first pulse: head at (100+25)/2, red only
        let d = kr.next_step(&mut pa, t0 + Duration::from_secs(1));
        assert_eq!(d, Duration::from_millis(1));
        let py = pa.get_pixels();
        let head = 62;
        for (i, p) in py.iter().enumerate() {
            assert_eq!(p.g, 0);
            assert_eq!(p.b, 0);
            if i >= (head - 25) as usize && i < head as usize {
                assert!(p.r > 0, "pixel {} inside the pulse should be lit", i);
            }
        }
        // brightness falls away from the head; the head itself is unwritten
        assert_eq!(py[head as usize].r, 0);
        assert!(py[61].r > py[45].r);

        // second pulse travels the other way
        kr.start(&mut pa, t0);
        kr.next_step(&mut pa, t0 + Duration::from_millis(2500));
        let py = pa.get_pixels();
        let head = 100 - 31; // 125 * 0.25 = 31, mirrored
        assert!(py[head as usize + 1].r > 0);
        assert_eq!(py[head as usize].r, 0);
    }

    #[test]
    fn edges_of_the_strip_are_clamped() {
        let mut pa = fake_array(100, 3);
        let mut kr = KnightRider::new(Duration::from_secs(10), 25);
        let t0 = Instant::now();
        kr.start(&mut pa, t0);
        // just after the start: head inside the first few pixels
        kr.next_step(&mut pa, t0 + Duration::from_millis(200));
        // head = 125 * 0.02 = 2: pixels 0 and 1 lit
        let py = pa.get_pixels();
        assert!(py[0].r > 0);
        assert!(py[1].r > 0);
        assert_eq!(py[2].r, 0);
        assert!(py[3..].iter().all(|p| p.r == 0));
    }
}
