//! Microphone loudness scoring.
//!
//! Mirrors the browser analyser-node pipeline: Blackman window, radix-2 FFT,
//! per-bin decibels mapped onto a byte range, averaged, then converted back to
//! a decibel-like integer score.

use std::f32::consts::PI;

/// Lower bound of the byte mapping range.
pub const ANALYSER_MIN_DB: f32 = -100.0;
/// Upper bound of the byte mapping range.
pub const ANALYSER_MAX_DB: f32 = -30.0;
/// Largest analysis window.
pub const MAX_WINDOW: usize = 2048;

/// Computes the loudness score for one block of time-domain samples.
///
/// Samples are expected in `[-1.0, 1.0]`. Blocks shorter than two samples
/// score `0`. Only the largest power-of-two prefix (capped at
/// [`MAX_WINDOW`]) is analysed.
pub fn loudness_score(samples: &[f32]) -> i32 {
    let window = analysis_window(samples.len());
    if window < 2 {
        return 0;
    }

    let mut re: Vec<f32> = samples[..window]
        .iter()
        .enumerate()
        .map(|(index, sample)| sample * blackman(index, window))
        .collect();
    let mut im = vec![0.0_f32; window];
    fft_in_place(&mut re, &mut im);

    let bins = window / 2;
    let total: f32 = (0..bins)
        .map(|bin| {
            let magnitude = (re[bin] * re[bin] + im[bin] * im[bin]).sqrt() / window as f32;
            magnitude_to_byte(magnitude)
        })
        .sum();
    let average = total / bins as f32;

    if average < 1.0 {
        0
    } else {
        (20.0 * average.log10()).round() as i32
    }
}

fn analysis_window(len: usize) -> usize {
    let capped = len.min(MAX_WINDOW);
    if capped == 0 {
        return 0;
    }
    1 << (usize::BITS - 1 - capped.leading_zeros())
}

fn blackman(index: usize, len: usize) -> f32 {
    let phase = 2.0 * PI * index as f32 / len as f32;
    0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos()
}

fn magnitude_to_byte(magnitude: f32) -> f32 {
    if magnitude <= 0.0 {
        return 0.0;
    }
    let db = 20.0 * magnitude.log10();
    let scaled = (db - ANALYSER_MIN_DB) / (ANALYSER_MAX_DB - ANALYSER_MIN_DB) * 255.0;
    scaled.clamp(0.0, 255.0).floor()
}

/// In-place iterative radix-2 FFT. `re.len()` must be a power of two.
pub(crate) fn fft_in_place(re: &mut [f32], im: &mut [f32]) {
    let n = re.len();
    debug_assert_eq!(n, im.len());
    debug_assert!(n.is_power_of_two());

    let mut j = 0;
    for i in 1..n {
        let mut bit = n >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j |= bit;
        if i < j {
            re.swap(i, j);
            im.swap(i, j);
        }
    }

    let mut len = 2;
    while len <= n {
        let angle = -2.0 * PI / len as f32;
        let half = len / 2;
        for start in (0..n).step_by(len) {
            for k in 0..half {
                let (sin, cos) = (angle * k as f32).sin_cos();
                let a = start + k;
                let b = a + half;
                let tr = re[b] * cos - im[b] * sin;
                let ti = re[b] * sin + im[b] * cos;
                re[b] = re[a] - tr;
                im[b] = im[a] - ti;
                re[a] += tr;
                im[a] += ti;
            }
        }
        len <<= 1;
    }
}

/// Deterministic pseudo-random noise block, used by the synthetic backend.
pub fn synthetic_noise(amplitude: f32, len: usize, seed: u64) -> Vec<f32> {
    let mut state = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            let unit = (state >> 40) as f32 / (1_u64 << 24) as f32;
            (unit * 2.0 - 1.0) * amplitude
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn impulse_has_flat_spectrum() {
        let mut re = vec![0.0_f32; 8];
        let mut im = vec![0.0_f32; 8];
        re[0] = 1.0;
        fft_in_place(&mut re, &mut im);
        for (real, imag) in re.iter().zip(im.iter()) {
            assert!((real - 1.0).abs() < 1e-5);
            assert!(imag.abs() < 1e-5);
        }
    }

    #[test]
    fn silence_scores_zero() {
        assert_eq!(loudness_score(&[0.0; 1024]), 0);
        assert_eq!(loudness_score(&[]), 0);
        assert_eq!(loudness_score(&synthetic_noise(1e-4, 2048, 7)), 0);
    }

    #[test]
    fn loud_noise_scores_above_quiet_noise() {
        let loud = loudness_score(&synthetic_noise(0.8, 2048, 11));
        let quiet = loudness_score(&synthetic_noise(0.001, 2048, 11));
        assert!(loud >= 40, "loud noise scored {loud}");
        assert!(quiet < 40, "quiet noise scored {quiet}");
        assert!(loud > quiet);
    }

    #[test]
    fn window_rounds_down_to_power_of_two() {
        assert_eq!(analysis_window(3000), 2048);
        assert_eq!(analysis_window(1500), 1024);
        assert_eq!(analysis_window(1), 1);
        assert_eq!(analysis_window(0), 0);
    }
}
