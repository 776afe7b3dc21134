//! Fixed-point encoder for the approximate scheme.
//!
//! Slot k of a plaintext m(X) is m(ζ^{2k+1}) with ζ = e^{iπ/n}, the
//! canonical embedding restricted to one root of each conjugate pair. Both
//! directions are a twisted length-n DFT.

use std::f64::consts::PI;
use std::sync::Arc;
use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::error::{EncnumError, Result};
use crate::params::SchemeType;
use crate::primitive::context::Context;
use crate::primitive::plaintext::Plaintext;

/// Largest |coefficient| bit length accepted by `encode`.
const MAX_COEFF_BITS: u64 = 126;

/// Precomputed twist factors and twiddles for a length-n radix-2 FFT.
#[derive(Debug, Clone)]
struct FftTables {
    n: usize,
    twist_re: Vec<f64>,
    twist_im: Vec<f64>,
    bit_rev: Vec<usize>,
    /// Per stage s: e^{-2πik/2^{s+1}} for k < 2^s.
    twiddle_re: Vec<Vec<f64>>,
    twiddle_im: Vec<Vec<f64>>,
}

impl FftTables {
    fn new(n: usize) -> Self {
        let log_n = n.trailing_zeros() as usize;

        let (twist_re, twist_im) = (0..n)
            .map(|j| {
                let angle = PI * j as f64 / n as f64;
                (angle.cos(), angle.sin())
            })
            .unzip();

        let bit_rev = (0..n)
            .map(|i| if log_n == 0 { 0 } else { i.reverse_bits() >> (usize::BITS as usize - log_n) })
            .collect();

        let mut twiddle_re = Vec::with_capacity(log_n);
        let mut twiddle_im = Vec::with_capacity(log_n);
        for s in 0..log_n {
            let half_len = 1usize << s;
            let (re, im): (Vec<f64>, Vec<f64>) = (0..half_len)
                .map(|k| {
                    let angle = -PI * k as f64 / half_len as f64;
                    (angle.cos(), angle.sin())
                })
                .unzip();
            twiddle_re.push(re);
            twiddle_im.push(im);
        }

        Self { n, twist_re, twist_im, bit_rev, twiddle_re, twiddle_im }
    }

    /// In-place forward DFT, X[k] = Σ_j x[j]·e^{-2πijk/n}.
    fn fft(&self, re: &mut [f64], im: &mut [f64]) {
        let n = self.n;
        for i in 0..n {
            let j = self.bit_rev[i];
            if i < j {
                re.swap(i, j);
                im.swap(i, j);
            }
        }

        for (s, (tw_re, tw_im)) in self.twiddle_re.iter().zip(&self.twiddle_im).enumerate() {
            let half_len = 1usize << s;
            for start in (0..n).step_by(2 * half_len) {
                for k in 0..half_len {
                    let (i0, i1) = (start + k, start + k + half_len);
                    let v_re = tw_re[k] * re[i1] - tw_im[k] * im[i1];
                    let v_im = tw_re[k] * im[i1] + tw_im[k] * re[i1];
                    let (u_re, u_im) = (re[i0], im[i0]);
                    re[i0] = u_re + v_re;
                    im[i0] = u_im + v_im;
                    re[i1] = u_re - v_re;
                    im[i1] = u_im - v_im;
                }
            }
        }
    }
}

/// Encodes real vectors into CKKS plaintexts and back.
#[derive(Debug, Clone)]
pub struct CkksEncoder {
    n: usize,
    max_coeff_bits: u64,
    fft: FftTables,
}

impl CkksEncoder {
    pub fn new(context: &Arc<Context>) -> Result<Self> {
        if context.scheme() != SchemeType::Ckks {
            return Err(EncnumError::Unsupported("the fixed-point encoder requires CKKS parameters".into()));
        }
        let n = context.poly_modulus_degree();
        let max_coeff_bits = (context.total_coeff_modulus_bit_count() - 1).min(MAX_COEFF_BITS);
        Ok(Self { n, max_coeff_bits, fft: FftTables::new(n) })
    }

    /// Number of real slots, n/2.
    pub fn slot_count(&self) -> usize {
        self.n / 2
    }

    /// Constant polynomial `round(value · scale)`; every slot decodes to `value`.
    pub fn encode_scalar(&self, value: f64, scale: f64) -> Result<Plaintext> {
        let scaled = self.check_scaled(value * scale, value)?;
        let mut coeffs = vec![BigInt::from(0); self.n];
        coeffs[0] = BigInt::from(scaled.round() as i128);
        Ok(Plaintext::Ckks { coeffs, scale })
    }

    /// Encode up to n/2 real values; missing slots are zero.
    pub fn encode(&self, values: &[f64], scale: f64) -> Result<Plaintext> {
        let slots = self.slot_count();
        if values.len() > slots {
            return Err(EncnumError::DimensionMismatch { expected: slots, got: values.len() });
        }
        if !(scale.is_finite() && scale > 0.0) {
            return Err(EncnumError::Encoding(format!("invalid scale {scale}")));
        }
        if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(EncnumError::Encoding(format!("cannot encode non-finite value {bad}")));
        }

        // Conjugate-symmetric extension: slot n-1-k carries the conjugate root.
        let n = self.n;
        let mut re = vec![0.0f64; n];
        let mut im = vec![0.0f64; n];
        for (k, &v) in values.iter().enumerate() {
            re[k] = v;
            re[n - 1 - k] = v;
        }

        // a[j] = (1/n)·FFT(z)[j], then m[j] = Re(a[j]·ζ^{-j}).
        self.fft.fft(&mut re, &mut im);
        let inv_n = 1.0 / n as f64;
        let coeffs = (0..n)
            .map(|j| {
                let m = (re[j] * self.fft.twist_re[j] + im[j] * self.fft.twist_im[j]) * inv_n;
                let scaled = self.check_scaled(m * scale, m)?;
                Ok(BigInt::from(scaled.round() as i128))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Plaintext::Ckks { coeffs, scale })
    }

    /// Evaluate the plaintext at every slot root, divided by its scale.
    pub fn decode(&self, plaintext: &Plaintext) -> Result<Vec<f64>> {
        let Plaintext::Ckks { coeffs, scale } = plaintext else {
            return Err(EncnumError::Decoding("expected a CKKS plaintext".into()));
        };
        if coeffs.len() != self.n {
            return Err(EncnumError::DimensionMismatch { expected: self.n, got: coeffs.len() });
        }

        // z[k] = Σ_j m[j]ζ^j·e^{2πijk/n} = conj(FFT(m[j]ζ^{-j}))[k]; the real part is all we keep.
        let mut re = Vec::with_capacity(self.n);
        let mut im = Vec::with_capacity(self.n);
        for (j, c) in coeffs.iter().enumerate() {
            let m = c
                .to_f64()
                .ok_or_else(|| EncnumError::Decoding("coefficient out of floating-point range".into()))?
                / scale;
            re.push(m * self.fft.twist_re[j]);
            im.push(-m * self.fft.twist_im[j]);
        }
        self.fft.fft(&mut re, &mut im);
        re.truncate(self.slot_count());
        Ok(re)
    }

    fn check_scaled(&self, scaled: f64, original: f64) -> Result<f64> {
        if !scaled.is_finite() {
            return Err(EncnumError::Encoding(format!("cannot encode non-finite value {original}")));
        }
        if scaled.abs() >= 2f64.powi(self.max_coeff_bits as i32) {
            return Err(EncnumError::Encoding(format!(
                "value {original} overflows the coefficient modulus at this scale"
            )));
        }
        Ok(scaled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{CoeffModulus, EncryptionParameters};

    fn encoder(n: usize) -> CkksEncoder {
        let parms = EncryptionParameters::builder(SchemeType::Ckks)
            .poly_modulus_degree(n)
            .coeff_modulus(CoeffModulus::ckks_chain(n, 2).unwrap())
            .build()
            .unwrap();
        CkksEncoder::new(&Context::new(parms).unwrap()).unwrap()
    }

    #[test]
    fn test_scalar_fills_every_slot() {
        let enc = encoder(64);
        let pt = enc.encode_scalar(-2.75, 2f64.powi(40)).unwrap();
        let slots = enc.decode(&pt).unwrap();
        assert_eq!(slots.len(), 32);
        assert!(slots.iter().all(|s| (s + 2.75).abs() < 1e-9));
    }

    #[test]
    fn test_vector_encode_decode() {
        let enc = encoder(64);
        let values: Vec<f64> = (0..32).map(|i| i as f64 * 0.5 - 7.0).collect();
        let pt = enc.encode(&values, 2f64.powi(30)).unwrap();
        let decoded = enc.decode(&pt).unwrap();
        for (a, b) in values.iter().zip(&decoded) {
            assert!((a - b).abs() < 1e-6, "{a} vs {b}");
        }
    }

    #[test]
    fn test_uniform_slots_encode_to_constant() {
        let enc = encoder(16);
        let a = enc.encode(&[1.5; 8], 1024.0).unwrap();
        let Plaintext::Ckks { coeffs, .. } = &a else { unreachable!() };
        assert!(coeffs[1..].iter().all(|c| *c == BigInt::from(0)));
        assert_eq!(coeffs[0], BigInt::from(1536));
    }

    #[test]
    fn test_rejects_bad_input() {
        let enc = encoder(64);
        assert!(matches!(enc.encode_scalar(f64::NAN, 1e12), Err(EncnumError::Encoding(_))));
        assert!(matches!(enc.encode_scalar(f64::INFINITY, 1e12), Err(EncnumError::Encoding(_))));
        assert!(matches!(enc.encode_scalar(1e300, 1e12), Err(EncnumError::Encoding(_))));
        assert!(matches!(enc.encode(&[0.0; 33], 1e12), Err(EncnumError::DimensionMismatch { .. })));
        assert!(matches!(enc.decode(&Plaintext::constant(3)), Err(EncnumError::Decoding(_))));
    }
}
