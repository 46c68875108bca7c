use anyhow::{bail, Context, Result};

use crate::rpi::{DmaBuf, Rpi};
use crate::{ChannelOrder, LedStrip, Pixel};

const LED_RESET_US: u32 = 55;
const RPI_PWM_CHANNELS: usize = 2;

// Each LED bit is serialized as 3 PWM bits: ‾‾|_ for a 1, ‾|__ for a 0.
const SYMBOL_HIGH: u8 = 0b110;
const SYMBOL_LOW: u8 = 0b100;

/// Bytes the PWM FIFO has to clock out per frame: data bits plus the reset
/// gap, 3 PWM bits each, rounded up to whole words, for both channels.
fn pwm_byte_count(num_pixels: usize, num_colors: usize, freq: u32) -> u32 {
    let mut bits = (num_pixels * num_colors * 8 * 3) as u32;

    // freq is typically 800kHz, so LED_RESET_US=55 gives 132 PWM bits of
    // gap: 44 LED-bit times at 1/800000s each = 55us of idle line.
    bits += (LED_RESET_US * freq * 3) / 1_000_000;

    let mut bytes = bits / 8;
    bytes -= bytes % 8;
    bytes += 8; // round up to a whole uint32
    bytes += 4; // idle low/high time

    bytes * RPI_PWM_CHANNELS as u32
}

/// Expand each data byte into 3-bit symbols and pack them MSB first into
/// 32-bit words. The two PWM channels interleave word by word, so each
/// stream advances its word position by 2.
// TODO: both channels currently carry the same pixels
fn encode(pixels: &[u8], words: &mut [u32]) {
    for channel in 0..RPI_PWM_CHANNELS {
        let mut word_pos = channel;
        let mut bit_pos = 31i32;
        for &byte in pixels {
            for bit in (0..8).rev() {
                let symbol = if byte & (1 << bit) != 0 { SYMBOL_HIGH } else { SYMBOL_LOW };
                for s in (0..3).rev() {
                    if symbol & (1 << s) != 0 {
                        words[word_pos] |= 1 << bit_pos;
                    } else {
                        words[word_pos] &= !(1 << bit_pos);
                    }
                    bit_pos -= 1;
                    if bit_pos < 0 {
                        word_pos += 2;
                        bit_pos = 31;
                    }
                }
            }
        }
    }
}

/// WS281x chain driven by PWM channel serialization, fed over DMA from a
/// VideoCore-allocated buffer.
pub struct Ws281xStrip {
    num_pixels: usize,
    num_colors: usize,
    g: usize,
    r: usize,
    b: usize,
    pixels: Vec<u8>,
    rpi: Rpi,
    dma_buf: DmaBuf,
}

impl Ws281xStrip {
    pub fn new(
        num_pixels: usize,
        num_colors: usize,
        order: ChannelOrder,
        freq: u32,
        dma_channel: usize,
        pins: &[usize],
    ) -> Result<Self> {
        if num_colors != 3 && num_colors != 4 {
            bail!("WS281x strips carry 3 or 4 channels, not {}", num_colors);
        }
        let rpi = Rpi::new(dma_channel).context("couldn't set up RPi peripherals")?;
        let byte_count = pwm_byte_count(num_pixels, num_colors, freq);
        let mut dma_buf = rpi.get_dma_buf(byte_count)?;
        for w in dma_buf.words() {
            *w = 0;
        }
        rpi.init_pwm(freq, &mut dma_buf, byte_count, pins)?;

        let (g, r, b) = order.offsets();
        Ok(Ws281xStrip {
            num_pixels,
            num_colors,
            g,
            r,
            b,
            pixels: vec![0u8; num_pixels * num_colors],
            rpi,
            dma_buf,
        })
    }
}

impl LedStrip for Ws281xStrip {
    fn max_per_channel(&self) -> i32 {
        255
    }

    fn get_pixel(&self, i: usize) -> Pixel {
        let base = i * self.num_colors;
        Pixel {
            r: self.pixels[base + self.r] as i32,
            g: self.pixels[base + self.g] as i32,
            b: self.pixels[base + self.b] as i32,
            w: if self.num_colors == 4 { self.pixels[base + 3] as i32 } else { -1 },
        }
    }

    fn set_pixel(&mut self, i: usize, p: Pixel) {
        let base = i * self.num_colors;
        self.pixels[base + self.g] = p.g as u8;
        self.pixels[base + self.r] = p.r as u8;
        self.pixels[base + self.b] = p.b as u8;
        if self.num_colors == 4 {
            self.pixels[base + 3] = p.w.max(0) as u8;
        }
    }

    fn write(&mut self) -> Result<()> {
        self.rpi.wait_dma_end().context("previous DMA transfer")?;
        encode(&self.pixels, self.dma_buf.words());
        self.rpi.start_dma(&self.dma_buf);
        Ok(())
    }
}

impl Drop for Ws281xStrip {
    fn drop(&mut self) {
        if let Err(e) = self.rpi.free_dma_buf(&mut self.dma_buf) {
            log::error!("couldn't free DMA buffer: {}", e);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    // Independently expand bytes to the expected PWM bit stream, one
    // 0/1 per PWM bit, MSB first.
    fn expected_stream(pixels: &[u8]) -> Vec<u8> {
        let mut stream = Vec::new();
        for &byte in pixels {
            for bit in (0..8).rev() {
                if byte & (1 << bit) != 0 {
                    stream.extend([1, 1, 0]);
                } else {
                    stream.extend([1, 0, 0]);
                }
            }
        }
        stream
    }

    fn pack(chunk: &[u8]) -> u32 {
        let mut w = 0u32;
        for (j, b) in chunk.iter().enumerate() {
            w |= (*b as u32) << (31 - j);
        }
        w
    }

    #[test]
    fn encodes_symbols_msb_first_into_interleaved_words() {
        let pixels = [0xff, 0x00, 0xa5];
        let words_per_chan = (pixels.len() * 8 * 3 + 31) / 32;
        let mut words = vec![0u32; words_per_chan * 2];
        encode(&pixels, &mut words);

        for (i, chunk) in expected_stream(&pixels).chunks(32).enumerate() {
            let want = pack(chunk);
            assert_eq!(words[2 * i], want, "channel 0 word {}", i);
            assert_eq!(words[2 * i + 1], want, "channel 1 word {}", i);
        }
    }

    #[test]
    fn encode_overwrites_stale_bits() {
        let mut words = vec![0u32; 4];
        encode(&[0xff, 0xff], &mut words);
        encode(&[0x00, 0x00], &mut words);
        for (i, chunk) in expected_stream(&[0x00, 0x00]).chunks(32).enumerate() {
            assert_eq!(words[2 * i], pack(chunk), "word {}", i);
        }
    }

    #[test]
    fn single_set_bit_lands_at_the_right_position() {
        // 0x80: first symbol is 110, the remaining seven are 100.
        let mut words = vec![0u32; 2];
        encode(&[0x80], &mut words);
        let want = pack(&expected_stream(&[0x80]));
        assert_eq!(words[0], want);
        assert_eq!(words[0] & 0xe000_0000, 0xc000_0000);
    }

    #[test]
    fn byte_count_includes_reset_gap_and_both_channels() {
        // 100 RGB pixels at 800kHz: 7200 data bits + 132 reset bits
        // -> 916 bytes, rounded to 920, +4 idle, doubled.
        assert_eq!(pwm_byte_count(100, 3, 800_000), 1848);
        // must stay word-aligned per channel
        assert_eq!(pwm_byte_count(100, 3, 800_000) % 8, 0);
        assert_eq!(pwm_byte_count(1, 4, 800_000) % 8, 0);
    }
}
