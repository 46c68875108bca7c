//! The effect catalog: time-parameterized pixel generators. Each effect is
//! started once, then stepped until it returns a zero duration.

use std::time::{Duration, Instant};

use strip_driver::{LedStrip, Pixel, PixelArray};

mod cycle;
mod fade;
mod knight_rider;
mod rainbow;
mod zip;

pub use cycle::Cycle;
pub use fade::Fade;
pub use knight_rider::KnightRider;
pub use rainbow::Rainbow;
pub use zip::Zip;

/// The closed set of effects, dispatched by match rather than through a
/// trait object so the renderer loop stays allocation-free.
#[derive(Debug, Clone)]
pub enum Effect {
    Fade(Fade),
    Zip(Zip),
    Rainbow(Rainbow),
    Cycle(Cycle),
    KnightRider(KnightRider),
}

impl Effect {
    pub fn start<S: LedStrip>(&mut self, pa: &mut PixelArray<S>, now: Instant) {
        match self {
            Effect::Fade(e) => e.start(pa, now),
            Effect::Zip(e) => e.start(pa, now),
            Effect::Rainbow(e) => e.start(pa, now),
            Effect::Cycle(e) => e.start(pa, now),
            Effect::KnightRider(e) => e.start(pa, now),
        }
    }

    /// Advance to `now` and return how long the caller should sleep before
    /// the next step. Zero means the effect is complete.
    pub fn next_step<S: LedStrip>(&mut self, pa: &mut PixelArray<S>, now: Instant) -> Duration {
        match self {
            Effect::Fade(e) => e.next_step(pa, now),
            Effect::Zip(e) => e.next_step(pa, now),
            Effect::Rainbow(e) => e.next_step(pa, now),
            Effect::Cycle(e) => e.next_step(pa, now),
            Effect::KnightRider(e) => e.next_step(pa, now),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Effect::Fade(_) => "FADE",
            Effect::Zip(_) => "ZIP",
            Effect::Rainbow(_) => "RAINBOW",
            Effect::Cycle(_) => "CYCLE",
            Effect::KnightRider(_) => "KNIGHTRIDER",
        }
    }
}

/// Round half away from zero.
pub(crate) fn round(f: f64) -> i32 {
    if f < 0.0 {
        (f - 0.5) as i32
    } else {
        (f + 0.5) as i32
    }
}

pub(crate) fn max_channel(p: Pixel) -> i32 {
    p.r.max(p.g).max(p.b).max(p.w)
}

fn gcd(mut a: i32, mut b: i32) -> i32 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Least common multiple of the R, G and B channels, zeroes counting as 1.
// TODO: no white support
pub(crate) fn lcm_rgb(p: Pixel) -> i32 {
    let r = p.r.max(1);
    let g = p.g.max(1);
    let b = p.b.max(1);
    let rg = r * g / gcd(r, g);
    rg * b / gcd(rg, b)
}

#[cfg(test)]
pub(crate) mod testutil {
    use anyhow::Result;
    use strip_driver::{LedStrip, Pixel, PixelArray};

    pub struct FakeStrip {
        pixels: Vec<Pixel>,
        num_colors: usize,
    }

    impl LedStrip for FakeStrip {
        fn max_per_channel(&self) -> i32 {
            127
        }

        fn get_pixel(&self, i: usize) -> Pixel {
            let mut p = self.pixels[i];
            if self.num_colors == 3 {
                p.w = -1;
            }
            p
        }

        fn set_pixel(&mut self, i: usize, p: Pixel) {
            self.pixels[i] = p;
        }

        fn write(&mut self) -> Result<()> {
            Ok(())
        }
    }

    pub fn fake_array(num_pixels: usize, num_colors: usize) -> PixelArray<FakeStrip> {
        let strip = FakeStrip {
            pixels: vec![Pixel::default(); num_pixels],
            num_colors,
        };
        PixelArray::new(num_pixels, num_colors, strip)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn names_match_the_protocol() {
        let e = Effect::Fade(Fade::new(Duration::from_secs(1), Pixel::black(3)));
        assert_eq!(e.name(), "FADE");
        let e = Effect::Zip(Zip::new(Duration::from_secs(1), Pixel::black(3)));
        assert_eq!(e.name(), "ZIP");
        let e = Effect::Rainbow(Rainbow::new(Duration::from_secs(1)));
        assert_eq!(e.name(), "RAINBOW");
        let e = Effect::Cycle(Cycle::new(Duration::from_secs(1)));
        assert_eq!(e.name(), "CYCLE");
        let e = Effect::KnightRider(KnightRider::new(Duration::from_secs(1), 10));
        assert_eq!(e.name(), "KNIGHTRIDER");
    }

    #[test]
    fn lcm_treats_zero_as_one() {
        assert_eq!(lcm_rgb(Pixel { r: 0, g: 0, b: 0, w: 0 }), 1);
        assert_eq!(lcm_rgb(Pixel { r: 127, g: 0, b: 0, w: 0 }), 127);
        assert_eq!(lcm_rgb(Pixel { r: 4, g: 6, b: 0, w: 0 }), 12);
        assert_eq!(lcm_rgb(Pixel { r: 120, g: 10, b: 1, w: 0 }), 120);
        // white never contributes
        assert_eq!(lcm_rgb(Pixel { r: 2, g: 3, b: 5, w: 7 }), 30);
    }

    #[test]
    fn round_goes_away_from_zero() {
        assert_eq!(round(0.4), 0);
        assert_eq!(round(0.5), 1);
        assert_eq!(round(-0.5), -1);
        assert_eq!(round(126.6), 127);
    }
}
