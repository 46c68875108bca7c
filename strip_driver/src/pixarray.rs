use anyhow::Result;

use crate::{LedStrip, Pixel};

/// Logical canvas of `num_pixels` pixels in front of a concrete strip.
/// Mutations are visible to reads immediately; only `write` touches hardware.
pub struct PixelArray<S: LedStrip> {
    num_pixels: usize,
    num_colors: usize,
    strip: S,
}

impl<S: LedStrip> PixelArray<S> {
    pub fn new(num_pixels: usize, num_colors: usize, strip: S) -> Self {
        PixelArray { num_pixels, num_colors, strip }
    }

    pub fn num_pixels(&self) -> usize {
        self.num_pixels
    }

    pub fn num_colors(&self) -> usize {
        self.num_colors
    }

    pub fn max_per_channel(&self) -> i32 {
        self.strip.max_per_channel()
    }

    pub fn write(&mut self) -> Result<()> {
        self.strip.write()
    }

    pub fn get_pixel(&self, i: usize) -> Pixel {
        self.strip.get_pixel(i)
    }

    pub fn get_pixels(&self) -> Vec<Pixel> {
        (0..self.num_pixels).map(|i| self.strip.get_pixel(i)).collect()
    }

    pub fn set_one(&mut self, i: usize, p: Pixel) {
        self.strip.set_pixel(i, p);
    }

    pub fn set_all(&mut self, p: Pixel) {
        for i in 0..self.num_pixels {
            self.strip.set_pixel(i, p);
        }
    }

    /// Fill the strip with an interleaved mix of `p1` and `p2` so that
    /// `num/div` of the positions (within one pixel) carry `p2`. Error
    /// diffusion keeps the two colors spread out rather than clustered.
    pub fn set_alternate(&mut self, num: i32, div: i32, p1: Pixel, p2: Pixel) {
        let mut tot_set = 0;
        let mut should_set = 0;
        for i in 0..self.num_pixels {
            should_set += num;
            let e1 = (tot_set + div - should_set).abs();
            let e2 = (tot_set - should_set).abs();
            if e1 < e2 {
                tot_set += div;
                self.strip.set_pixel(i, p2);
            } else {
                self.strip.set_pixel(i, p1);
            }
        }
    }

    /// Like `set_alternate`, but each channel runs its own error diffusion,
    /// so a single pixel can mix p1-channels and p2-channels.
    pub fn set_per_chan_alternate(&mut self, num: Pixel, div: i32, p1: Pixel, p2: Pixel) {
        let mut tot_set = Pixel::default();
        let mut should_set = Pixel::default();
        let mut p = Pixel::default();
        for i in 0..self.num_pixels {
            should_set.r += num.r;
            let e1 = (tot_set.r + div - should_set.r).abs();
            let e2 = (tot_set.r - should_set.r).abs();
            if e1 < e2 {
                tot_set.r += div;
                p.r = p2.r;
            } else {
                p.r = p1.r;
            }
            should_set.g += num.g;
            let e1 = (tot_set.g + div - should_set.g).abs();
            let e2 = (tot_set.g - should_set.g).abs();
            if e1 < e2 {
                tot_set.g += div;
                p.g = p2.g;
            } else {
                p.g = p1.g;
            }
            should_set.b += num.b;
            let e1 = (tot_set.b + div - should_set.b).abs();
            let e2 = (tot_set.b - should_set.b).abs();
            if e1 < e2 {
                tot_set.b += div;
                p.b = p2.b;
            } else {
                p.b = p1.b;
            }
            if self.num_colors == 4 {
                should_set.w += num.w;
                let e1 = (tot_set.w + div - should_set.w).abs();
                let e2 = (tot_set.w - should_set.w).abs();
                if e1 < e2 {
                    tot_set.w += div;
                    p.w = p2.w;
                } else {
                    p.w = p1.w;
                }
            } else {
                p.w = -1;
            }
            self.strip.set_pixel(i, p);
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    /// In-memory strip for exercising the canvas without hardware.
    pub struct TestStrip {
        pixels: Vec<Pixel>,
    }

    impl TestStrip {
        pub fn new(num_pixels: usize) -> Self {
            TestStrip { pixels: vec![Pixel { r: 0, g: 0, b: 0, w: -1 }; num_pixels] }
        }
    }

    impl LedStrip for TestStrip {
        fn max_per_channel(&self) -> i32 {
            127
        }

        fn get_pixel(&self, i: usize) -> Pixel {
            self.pixels[i]
        }

        fn set_pixel(&mut self, i: usize, p: Pixel) {
            self.pixels[i] = p;
        }

        fn write(&mut self) -> Result<()> {
            Ok(())
        }
    }

    pub fn test_array(num_pixels: usize) -> PixelArray<TestStrip> {
        PixelArray::new(num_pixels, 3, TestStrip::new(num_pixels))
    }

    #[test]
    fn set_one_then_get_one_by_one() {
        let mut pa = test_array(100);
        let ps = Pixel { r: 10, g: 25, b: 45, w: -1 };
        let pb = Pixel { r: 0, g: 0, b: 0, w: -1 };
        pa.set_one(20, ps);
        for i in 0..100 {
            let pg = pa.get_pixel(i);
            if i == 20 {
                assert_eq!(pg, ps, "set pixel incorrect at {}", i);
            } else {
                assert_eq!(pg, pb, "unset pixel incorrect at {}", i);
            }
        }
    }

    #[test]
    fn set_one_then_get_all() {
        let mut pa = test_array(100);
        let ps = Pixel { r: 10, g: 25, b: 45, w: -1 };
        let pb = Pixel { r: 0, g: 0, b: 0, w: -1 };
        pa.set_one(20, ps);
        let py = pa.get_pixels();
        assert_eq!(py.len(), 100);
        for (i, p) in py.iter().enumerate() {
            assert_eq!(*p, if i == 20 { ps } else { pb }, "pixel {} wrong", i);
        }
    }

    #[test]
    fn set_alternate_counts_and_runs() {
        let mut pa = test_array(100);
        let p1 = Pixel { r: 10, g: 25, b: 45, w: -1 };
        let p2 = Pixel { r: 9, g: 7, b: 5, w: -1 };

        // (num, div, expected p1 count, p2 count, max p1 run, max p2 run)
        let tests = [
            (9, 10, 10, 90, 1, 9),
            (5, 10, 50, 50, 1, 1),
            (51, 100, 49, 51, 1, 2),
            (52, 100, 48, 52, 1, 2),
            (5, 7, 29, 71, 1, 3),
        ];

        for (num, div, want1, want2, want_cons1, want_cons2) in tests {
            pa.set_alternate(num, div, p1, p2);
            let py = pa.get_pixels();
            let mut n1 = 0;
            let mut n2 = 0;
            let mut cons = 0;
            let mut cons1 = 0;
            let mut cons2 = 0;
            let mut lp = Pixel::default();
            for p in &py {
                if *p == lp {
                    cons += 1;
                } else {
                    cons = 1;
                }
                if *p == p1 {
                    n1 += 1;
                    cons1 = cons1.max(cons);
                } else if *p == p2 {
                    n2 += 1;
                    cons2 = cons2.max(cons);
                } else {
                    panic!("({}/{}): unexpected pixel {:?}", num, div, p);
                }
                lp = *p;
            }
            assert_eq!(n1, want1, "({}/{}): p1 count", num, div);
            assert_eq!(n2, want2, "({}/{}): p2 count", num, div);
            assert_eq!(cons1, want_cons1, "({}/{}): p1 max run", num, div);
            assert_eq!(cons2, want_cons2, "({}/{}): p2 max run", num, div);
        }
    }

    #[test]
    fn set_per_chan_alternate_counts_per_channel() {
        let mut pa = test_array(100);
        let p1 = Pixel { r: 10, g: 25, b: 45, w: -1 };
        let p2 = Pixel { r: 9, g: 7, b: 5, w: -1 };

        let tests = [
            (
                Pixel { r: 9, g: 5, b: 1, w: 0 },
                10,
                [10, 50, 90], // p1 counts per channel
                [90, 50, 10], // p2 counts
                [1, 1, 9],    // max p1 runs
                [9, 1, 1],    // max p2 runs
            ),
            (
                Pixel { r: 51, g: 52, b: 99, w: 0 },
                100,
                [49, 48, 1],
                [51, 52, 99],
                [1, 1, 1],
                [2, 2, 50],
            ),
        ];

        for (num, div, want1, want2, want_cons1, want_cons2) in tests {
            pa.set_per_chan_alternate(num, div, p1, p2);
            let py = pa.get_pixels();
            let chans = |p: &Pixel| [p.r, p.g, p.b];
            let mut n1 = [0; 3];
            let mut n2 = [0; 3];
            let mut cons = [0; 3];
            let mut cons1 = [0; 3];
            let mut cons2 = [0; 3];
            let mut lp = Pixel::default();
            for p in &py {
                for c in 0..3 {
                    if chans(p)[c] == chans(&lp)[c] {
                        cons[c] += 1;
                    } else {
                        cons[c] = 1;
                    }
                    if chans(p)[c] == chans(&p1)[c] {
                        n1[c] += 1;
                        cons1[c] = cons1[c].max(cons[c]);
                    } else if chans(p)[c] == chans(&p2)[c] {
                        n2[c] += 1;
                        cons2[c] = cons2[c].max(cons[c]);
                    } else {
                        panic!("chan {} unexpected value {:?}", c, p);
                    }
                }
                lp = *p;
            }
            assert_eq!(n1, want1, "num {:?}: p1 counts", num);
            assert_eq!(n2, want2, "num {:?}: p2 counts", num);
            assert_eq!(cons1, want_cons1, "num {:?}: p1 max runs", num);
            assert_eq!(cons2, want_cons2, "num {:?}: p2 max runs", num);
        }
    }

    #[test]
    fn per_chan_count_stays_within_one_of_target() {
        let mut pa = test_array(100);
        let p1 = Pixel { r: 0, g: 0, b: 0, w: -1 };
        let p2 = Pixel { r: 1, g: 1, b: 1, w: -1 };
        for num in 0..=37 {
            pa.set_per_chan_alternate(Pixel { r: num, g: 0, b: 37, w: 0 }, 37, p1, p2);
            let py = pa.get_pixels();
            let got: i32 = py.iter().map(|p| p.r).sum();
            let target = (num as f64 * 100.0 / 37.0).round() as i32;
            assert!((got - target).abs() <= 1, "num {}: got {}, target {}", num, got, target);
            assert!(py.iter().all(|p| p.b == 1), "num {}: full channel not saturated", num);
        }
    }
}
