//! Seeded random sources and the bounded Zipf sampler used by every workload.
//!
//! The Zipf sampler follows the rejection-inversion method of Hörmann and Derflinger
//! for `P(k) ∝ (v + k)^-s` on `k ∈ [0, imax]`. The user-facing knobs are the exponent
//! `s` and a *ratio* `r ∈ (0, 1]`, the probability of the least likely value relative
//! to the most likely one. The offset `v` is derived from it, so a ratio of `1.0`
//! degenerates into a uniform draw.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{DxError, DxResult};

/// Deterministic source for `seed`.
pub fn seeded(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Seed for the `stream`-th independent generator derived from `seed`.
pub fn derive_seed(seed: u64, stream: u64) -> u64 {
    seed.wrapping_add(stream)
}

/// Uniform integer in `[lo, hi]`.
pub fn uniform<R: Rng + ?Sized>(rng: &mut R, lo: u64, hi: u64) -> u64 {
    if lo >= hi {
        return lo;
    }
    rng.gen_range(lo..=hi)
}

#[derive(Debug, Clone)]
pub struct Zipf {
    min: u64,
    imax: f64,
    kind: ZipfKind,
}

#[derive(Debug, Clone)]
enum ZipfKind {
    Uniform,
    Skewed {
        v: f64,
        q: f64,
        one_minus_q: f64,
        one_minus_q_inv: f64,
        hxm: f64,
        hx0_minus_hxm: f64,
        s: f64,
    },
}

impl Zipf {
    /// Sampler over `[min, max]` with exponent `exponent > 1` and `ratio ∈ (0, 1]`.
    pub fn new(exponent: f64, ratio: f64, min: u64, max: u64) -> DxResult<Self> {
        if !(exponent > 1.0) || !exponent.is_finite() {
            return Err(DxError::Config(format!(
                "zipf exponent must be greater than 1, got {}",
                exponent
            )));
        }
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(DxError::Config(format!(
                "zipf ratio must be in (0, 1], got {}",
                ratio
            )));
        }
        if min > max {
            return Err(DxError::Config(format!(
                "zipf range is empty: min {} > max {}",
                min, max
            )));
        }

        let imax = (max - min) as f64;
        let root = ratio.powf(1.0 / exponent);
        if imax == 0.0 || root >= 1.0 {
            return Ok(Self {
                min,
                imax,
                kind: ZipfKind::Uniform,
            });
        }
        // ratio = (v / (v + imax))^s  =>  v = imax * r^(1/s) / (1 - r^(1/s))
        let v = (imax * root / (1.0 - root)).max(1.0);

        let q = exponent;
        let one_minus_q = 1.0 - q;
        let one_minus_q_inv = 1.0 / one_minus_q;
        let h = |x: f64| ((v + x).ln() * one_minus_q).exp() * one_minus_q_inv;
        let hinv = |x: f64| ((one_minus_q * x).ln() * one_minus_q_inv).exp() - v;

        let hxm = h(imax + 0.5);
        let hx0_minus_hxm = h(0.5) - (v.ln() * -q).exp() - hxm;
        let s = 1.0 - hinv(h(1.5) - (-q * (v + 1.0).ln()).exp());

        Ok(Self {
            min,
            imax,
            kind: ZipfKind::Skewed {
                v,
                q,
                one_minus_q,
                one_minus_q_inv,
                hxm,
                hx0_minus_hxm,
                s,
            },
        })
    }

    pub fn min(&self) -> u64 {
        self.min
    }

    pub fn max(&self) -> u64 {
        self.min + self.imax as u64
    }

    /// Draw one value in `[min, max]`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u64 {
        match &self.kind {
            ZipfKind::Uniform => uniform(rng, self.min, self.max()),
            ZipfKind::Skewed {
                v,
                q,
                one_minus_q,
                one_minus_q_inv,
                hxm,
                hx0_minus_hxm,
                s,
            } => {
                let h = |x: f64| ((v + x).ln() * one_minus_q).exp() * one_minus_q_inv;
                let hinv = |x: f64| ((one_minus_q * x).ln() * one_minus_q_inv).exp() - v;
                let k = loop {
                    let r: f64 = rng.gen();
                    let ur = hxm + r * hx0_minus_hxm;
                    let x = hinv(ur);
                    let k = (x + 0.5).floor();
                    if k - x <= *s {
                        break k;
                    }
                    if ur >= h(k + 0.5) - (-(k + v).ln() * q).exp() {
                        break k;
                    }
                };
                self.min + (k.clamp(0.0, self.imax) as u64)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_determinism() {
        let zipf = Zipf::new(1.01, 0.25, 0, 99_999).unwrap();
        let mut a = seeded(42);
        let mut b = seeded(42);
        let first: Vec<u64> = (0..1000).map(|_| zipf.sample(&mut a)).collect();
        let second: Vec<u64> = (0..1000).map(|_| zipf.sample(&mut b)).collect();
        assert_eq!(first, second);

        let mut c = seeded(43);
        let third: Vec<u64> = (0..1000).map(|_| zipf.sample(&mut c)).collect();
        assert_ne!(first, third);
    }

    #[test]
    fn test_samples_stay_in_range() {
        let zipf = Zipf::new(2.0, 0.1, 100, 199).unwrap();
        let mut rng = seeded(7);
        for _ in 0..10_000 {
            let x = zipf.sample(&mut rng);
            assert!((100..=199).contains(&x), "{} out of range", x);
        }
    }

    #[test]
    fn test_head_is_heavier_than_tail() {
        let zipf = Zipf::new(1.5, 0.01, 0, 999).unwrap();
        let mut rng = seeded(1);
        let mut head = 0;
        let mut tail = 0;
        for _ in 0..20_000 {
            match zipf.sample(&mut rng) {
                0..=99 => head += 1,
                900..=999 => tail += 1,
                _ => {}
            }
        }
        assert!(head > tail * 3, "head {} tail {}", head, tail);
    }

    #[test]
    fn test_ratio_one_is_uniform() {
        let zipf = Zipf::new(1.01, 1.0, 10, 19).unwrap();
        let mut rng = seeded(9);
        let mut seen = [0u32; 10];
        for _ in 0..10_000 {
            seen[(zipf.sample(&mut rng) - 10) as usize] += 1;
        }
        assert!(seen.iter().all(|&n| n > 800 && n < 1200), "{:?}", seen);
    }

    #[test]
    fn test_degenerate_range() {
        let zipf = Zipf::new(1.5, 0.25, 5, 5).unwrap();
        let mut rng = seeded(3);
        assert_eq!(zipf.sample(&mut rng), 5);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(matches!(Zipf::new(1.0, 0.5, 0, 10), Err(DxError::Config(_))));
        assert!(matches!(Zipf::new(f64::NAN, 0.5, 0, 10), Err(DxError::Config(_))));
        assert!(matches!(Zipf::new(1.5, 0.0, 0, 10), Err(DxError::Config(_))));
        assert!(matches!(Zipf::new(1.5, 1.5, 0, 10), Err(DxError::Config(_))));
        assert!(matches!(Zipf::new(1.5, 0.5, 10, 0), Err(DxError::Config(_))));
    }

    #[test]
    fn test_uniform_bounds() {
        let mut rng = seeded(11);
        for _ in 0..1000 {
            let x = uniform(&mut rng, 0, 3);
            assert!(x <= 3);
        }
        assert_eq!(uniform(&mut rng, 8, 8), 8);
    }
}
