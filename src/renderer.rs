use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use strip_driver::{LedStrip, Pixel, PixelArray};

use crate::effects::Effect;
use crate::power::PowerControl;

/// Status visible to connection threads: a copy of the last written frame
/// plus what the renderer is currently up to. Refreshed after every write,
/// so status queries never race the canvas itself.
pub struct SharedStatus {
    pub pixels: Vec<Pixel>,
    pub running: bool,
    pub off: bool,
    pub last_effect: Option<Effect>,
}

impl SharedStatus {
    pub fn new() -> Self {
        SharedStatus { pixels: Vec::new(), running: false, off: true, last_effect: None }
    }
}

pub type Shared = Arc<Mutex<SharedStatus>>;

/// The single task that owns the canvas and the hardware. Sleeps for
/// whatever the current effect last returned, or indefinitely when idle;
/// an incoming effect always preempts and is treated as fresh.
pub fn run<S: LedStrip>(
    mut pa: PixelArray<S>,
    rx: Receiver<Effect>,
    shared: Shared,
    mut power: PowerControl,
) -> Result<()> {
    let mut current: Option<Effect> = None;
    let mut d = Duration::ZERO;
    let mut steps: u32 = 0;
    let mut started = Instant::now();
    loop {
        let incoming = if current.is_none() {
            match rx.recv() {
                Ok(e) => Some(e),
                Err(_) => return Ok(()), // all senders gone, shutting down
            }
        } else {
            match rx.recv_timeout(d) {
                Ok(e) => Some(e),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => return Ok(()),
            }
        };

        if let Some(mut e) = incoming {
            power.on().context("failed power-on")?;
            started = Instant::now();
            e.start(&mut pa, started);
            steps = 0;
            shared.lock().unwrap().running = true;
            current = Some(e);
        }
        let e = match current.as_mut() {
            Some(e) => e,
            None => continue,
        };

        d = e.next_step(&mut pa, Instant::now());
        steps += 1;
        pa.write()?;
        {
            let mut st = shared.lock().unwrap();
            st.pixels.clear();
            st.pixels.extend((0..pa.num_pixels()).map(|i| pa.get_pixel(i)));
        }

        if d == Duration::ZERO {
            let total = started.elapsed();
            log::info!(
                "finished effect, {} steps, {:?} total, {:?}/step",
                steps,
                total,
                total / steps.max(1)
            );
            shared.lock().unwrap().running = false;
            let p = pa.get_pixel(0);
            log::debug!("seeing post-effect pix {}", p);
            if p.r <= 0 && p.g <= 0 && p.b <= 0 && p.w <= 0 {
                power.off().context("failed power-off")?;
            }
            current = None;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::effects::{Fade, Zip};
    use anyhow::Result;
    use std::sync::mpsc::sync_channel;
    use std::thread;

    struct CountingStrip {
        pixels: Vec<Pixel>,
        writes: Arc<Mutex<u32>>,
    }

    impl LedStrip for CountingStrip {
        fn max_per_channel(&self) -> i32 {
            127
        }

        fn get_pixel(&self, i: usize) -> Pixel {
            let mut p = self.pixels[i];
            p.w = -1;
            p
        }

        fn set_pixel(&mut self, i: usize, p: Pixel) {
            self.pixels[i] = p;
        }

        fn write(&mut self) -> Result<()> {
            *self.writes.lock().unwrap() += 1;
            Ok(())
        }
    }

    #[test]
    fn runs_an_effect_to_completion_and_goes_idle() {
        let writes = Arc::new(Mutex::new(0));
        let strip = CountingStrip { pixels: vec![Pixel::default(); 10], writes: writes.clone() };
        let pa = PixelArray::new(10, 3, strip);
        let (tx, rx) = sync_channel(1);
        let shared: Shared = Arc::new(Mutex::new(SharedStatus::new()));
        let power = PowerControl::disabled();

        let dest = Pixel { r: 10, g: 0, b: 0, w: -1 };
        tx.send(Effect::Zip(Zip::new(Duration::from_millis(20), dest))).unwrap();

        let handle = {
            let shared = shared.clone();
            thread::spawn(move || run(pa, rx, shared, power))
        };

        thread::sleep(Duration::from_millis(200));
        {
            let st = shared.lock().unwrap();
            assert!(!st.running, "zip should have finished");
            assert_eq!(st.pixels.len(), 10);
            assert!(st.pixels.iter().all(|p| *p == dest));
        }
        assert!(*writes.lock().unwrap() > 0);

        // a second effect preempts idle blocking
        tx.send(Effect::Fade(Fade::new(Duration::from_millis(10), Pixel::black(3)))).unwrap();
        thread::sleep(Duration::from_millis(200));
        assert!(shared.lock().unwrap().pixels.iter().all(|p| p.r == 0));

        drop(tx);
        handle.join().unwrap().unwrap();
    }
}
