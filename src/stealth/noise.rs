//! Seeded Noise
//!
//! Rust mirror of the deterministic noise generator embedded in the override
//! program. The injected JavaScript and this module implement the same
//! xoshiro128** generator, the same seeding and the same sample-selection rule, so
//! the perturbation a page observes can be reproduced and tested here without a
//! JavaScript engine.
//!
//! Every read re-seeds the generator from the fingerprint's noise seed, which makes
//! repeated reads of the same data produce identical output.

use crate::fingerprint::NoiseSeed;

/// Stream id for canvas pixel perturbation.
pub const CANVAS_STREAM: u32 = 1;
/// Stream id for audio sample perturbation.
pub const AUDIO_STREAM: u32 = 2;
/// Stream id for text-metric jitter.
pub const FONT_STREAM: u32 = 3;

/// A sample is perturbed when `next & SELECTION_MASK == 0` (1 in 32).
pub const SELECTION_MASK: u32 = 0x1F;

const GOLDEN_GAMMA: u32 = 0x9E37_79B9;

/// Integer finalizer used to spread seed words across the generator state.
pub fn mix32(mut h: u32) -> u32 {
    h = (h ^ (h >> 16)).wrapping_mul(0x045d_9f3b);
    h = (h ^ (h >> 13)).wrapping_mul(0x045d_9f3b);
    h ^ (h >> 16)
}

/// 32-bit FNV-1a over UTF-16 code units, matching `String.prototype.charCodeAt`.
pub fn fnv1a_utf16(text: &str) -> u32 {
    text.encode_utf16().fold(0x811c_9dc5, |h, unit| {
        (h ^ u32::from(unit)).wrapping_mul(0x0100_0193)
    })
}

/// xoshiro128** generator seeded from a [`NoiseSeed`] and a stream id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoiseRng {
    s: [u32; 4],
}

impl NoiseRng {
    pub fn new(seed: NoiseSeed, stream: u32) -> Self {
        let words = seed.words();
        let salt = stream.wrapping_mul(GOLDEN_GAMMA);
        let mut s = [0u32; 4];
        for (i, word) in words.iter().enumerate() {
            s[i] = mix32(word ^ salt ^ i as u32);
        }
        // xoshiro must not start from the all-zero state
        if s.iter().all(|&w| w == 0) {
            s[0] = 1;
        }
        Self { s }
    }

    pub fn next_u32(&mut self) -> u32 {
        let s = &mut self.s;
        let result = s[1].wrapping_mul(5).rotate_left(7).wrapping_mul(9);
        let t = s[1] << 9;

        s[2] ^= s[0];
        s[3] ^= s[1];
        s[1] ^= s[2];
        s[0] ^= s[3];
        s[2] ^= t;
        s[3] = s[3].rotate_left(11);

        result
    }

    /// Uniform value in [0, 1) built from the top 27 bits of one output.
    pub fn next_unit(&mut self) -> f64 {
        f64::from(self.next_u32() >> 5) / f64::from(1u32 << 27)
    }
}

/// Whether a draw selects its sample for perturbation.
#[inline]
pub fn is_selected(draw: u32) -> bool {
    draw & SELECTION_MASK == 0
}

/// Indices (out of `len`) that a read of `len` samples perturbs on `stream`.
pub fn perturbation_pattern(seed: NoiseSeed, stream: u32, len: usize) -> Vec<usize> {
    let mut rng = NoiseRng::new(seed, stream);
    (0..len).filter(|_| is_selected(rng.next_u32())).collect()
}

/// Applies the canvas rule to RGBA pixel data in place.
///
/// One draw per pixel; a selected pixel gets one of its R/G/B channels nudged by
/// one step, flipping direction at the 0/255 boundary. Alpha is never touched.
pub fn apply_to_rgba(seed: NoiseSeed, data: &mut [u8]) {
    let mut rng = NoiseRng::new(seed, CANVAS_STREAM);
    for pixel in data.chunks_exact_mut(4) {
        let draw = rng.next_u32();
        if !is_selected(draw) {
            continue;
        }
        let channel = ((draw >> 8) % 3) as usize;
        let value = pixel[channel];
        pixel[channel] = if (draw >> 5) & 1 == 1 {
            if value == u8::MAX {
                value - 1
            } else {
                value + 1
            }
        } else if value == 0 {
            1
        } else {
            value - 1
        };
    }
}

/// Applies the audio rule to float samples in place.
///
/// A selected sample moves by at most `amplitude` in either direction.
pub fn perturb_samples(seed: NoiseSeed, amplitude: f64, samples: &mut [f32]) {
    let mut rng = NoiseRng::new(seed, AUDIO_STREAM);
    for sample in samples.iter_mut() {
        let draw = rng.next_u32();
        if !is_selected(draw) {
            continue;
        }
        let unit = f64::from(draw >> 5) / f64::from(1u32 << 27);
        *sample = (f64::from(*sample) + (unit * 2.0 - 1.0) * amplitude) as f32;
    }
}

/// Multiplier applied to `TextMetrics.width` for `text`.
pub fn font_width_factor(seed: NoiseSeed, amplitude: f64, text: &str) -> f64 {
    let mut rng = NoiseRng::new(seed, FONT_STREAM ^ fnv1a_utf16(text));
    1.0 + (rng.next_unit() * 2.0 - 1.0) * amplitude
}
