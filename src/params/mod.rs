pub mod presets;

use std::fmt;
use std::sync::Arc;
use serde::{Deserialize, Serialize};

use crate::error::{EncnumError, Result};
use crate::sampling::ERROR_SIGMA;

pub use presets::CoeffModulus;

/// Which lattice scheme a parameter set drives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchemeType {
    /// Exact arithmetic modulo a plaintext modulus.
    Bfv,
    /// Approximate fixed-point arithmetic.
    Ckks,
}

impl fmt::Display for SchemeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemeType::Bfv => write!(f, "BFV"),
            SchemeType::Ckks => write!(f, "CKKS"),
        }
    }
}

/// Fingerprint of a parameter set; ciphertexts and keys carry it so that
/// material from a different parameter set is refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParmsId(pub u64);

impl fmt::Display for ParmsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Encryption parameters for either scheme.
#[derive(Clone, Debug)]
pub struct EncryptionParameters {
    pub scheme: SchemeType,
    /// Ring degree n (power of 2).
    pub poly_modulus_degree: usize,
    /// Primes q_0, ..., q_k. For CKKS the last primes are consumed by rescaling.
    pub coeff_modulus: Vec<u64>,
    /// Plaintext modulus t (BFV only).
    pub plain_modulus: Option<u64>,
    /// Error standard deviation.
    pub sigma: f64,
}

impl EncryptionParameters {
    pub fn builder(scheme: SchemeType) -> EncryptionParametersBuilder {
        EncryptionParametersBuilder::new(scheme)
    }

    /// FNV-1a over every field that changes the meaning of a ciphertext.
    pub fn parms_id(&self) -> ParmsId {
        const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0000_0100_0000_01b3;

        let mut words = vec![
            match self.scheme {
                SchemeType::Bfv => 1u64,
                SchemeType::Ckks => 2u64,
            },
            self.poly_modulus_degree as u64,
            self.plain_modulus.unwrap_or(0),
        ];
        words.extend_from_slice(&self.coeff_modulus);

        let mut hash = OFFSET;
        for word in words {
            for byte in word.to_le_bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(PRIME);
            }
        }
        ParmsId(hash)
    }
}

/// Builder for [`EncryptionParameters`].
pub struct EncryptionParametersBuilder {
    scheme: SchemeType,
    poly_modulus_degree: usize,
    coeff_modulus: Vec<u64>,
    plain_modulus: Option<u64>,
    sigma: f64,
}

impl EncryptionParametersBuilder {
    pub fn new(scheme: SchemeType) -> Self {
        Self {
            scheme,
            poly_modulus_degree: 8192,
            coeff_modulus: Vec::new(),
            plain_modulus: None,
            sigma: ERROR_SIGMA,
        }
    }

    pub fn poly_modulus_degree(mut self, n: usize) -> Self {
        self.poly_modulus_degree = n;
        self
    }

    pub fn coeff_modulus(mut self, moduli: Vec<u64>) -> Self {
        self.coeff_modulus = moduli;
        self
    }

    pub fn plain_modulus(mut self, t: u64) -> Self {
        self.plain_modulus = Some(t);
        self
    }

    pub fn sigma(mut self, sigma: f64) -> Self {
        self.sigma = sigma;
        self
    }

    pub fn build(self) -> Result<Arc<EncryptionParameters>> {
        let n = self.poly_modulus_degree;
        if !n.is_power_of_two() || n < 16 {
            return Err(EncnumError::InvalidRingDegree(n));
        }
        if self.coeff_modulus.is_empty() {
            return Err(EncnumError::InvalidParam("must specify at least one coefficient modulus".into()));
        }
        for (i, q) in self.coeff_modulus.iter().enumerate() {
            if (q - 1) % (2 * n as u64) != 0 {
                return Err(EncnumError::InvalidParam(format!("modulus {q} is not ≡ 1 mod {}", 2 * n)));
            }
            if self.coeff_modulus[..i].contains(q) {
                return Err(EncnumError::InvalidParam(format!("modulus {q} appears twice")));
            }
        }
        match (self.scheme, self.plain_modulus) {
            (SchemeType::Bfv, None) => {
                return Err(EncnumError::InvalidParam("BFV requires a plaintext modulus".into()));
            }
            (SchemeType::Bfv, Some(t)) if t < 2 => {
                return Err(EncnumError::InvalidParam("plaintext modulus must be >= 2".into()));
            }
            (SchemeType::Ckks, Some(_)) => {
                return Err(EncnumError::InvalidParam("CKKS does not use a plaintext modulus".into()));
            }
            _ => {}
        }
        if self.scheme == SchemeType::Ckks && self.coeff_modulus.len() < 2 {
            return Err(EncnumError::InvalidParam("CKKS needs at least one rescaling prime".into()));
        }
        if !(self.sigma > 0.0) {
            return Err(EncnumError::InvalidParam("sigma must be positive".into()));
        }

        Ok(Arc::new(EncryptionParameters {
            scheme: self.scheme,
            poly_modulus_degree: n,
            coeff_modulus: self.coeff_modulus,
            plain_modulus: self.plain_modulus,
            sigma: self.sigma,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const Q0: u64 = 1099509805057;
    const Q1: u64 = 562949953443841;

    #[test]
    fn test_builder_bfv() {
        let parms = EncryptionParameters::builder(SchemeType::Bfv)
            .poly_modulus_degree(16)
            .coeff_modulus(vec![Q0, Q1])
            .plain_modulus(257)
            .build()
            .unwrap();
        assert_eq!(parms.plain_modulus, Some(257));
        assert_eq!(parms.sigma, ERROR_SIGMA);
    }

    #[test]
    fn test_builder_rejects_missing_plain_modulus() {
        let err = EncryptionParameters::builder(SchemeType::Bfv)
            .poly_modulus_degree(16)
            .coeff_modulus(vec![Q0])
            .build()
            .unwrap_err();
        assert!(matches!(err, EncnumError::InvalidParam(_)));
    }

    #[test]
    fn test_builder_rejects_non_ntt_prime() {
        let err = EncryptionParameters::builder(SchemeType::Ckks)
            .poly_modulus_degree(16)
            .coeff_modulus(vec![Q0, 65539])
            .build()
            .unwrap_err();
        assert!(matches!(err, EncnumError::InvalidParam(_)));
    }

    #[test]
    fn test_parms_id_tracks_every_field() {
        let base = EncryptionParameters::builder(SchemeType::Bfv)
            .poly_modulus_degree(16)
            .coeff_modulus(vec![Q0, Q1])
            .plain_modulus(257)
            .build()
            .unwrap();
        let other_t = EncryptionParameters::builder(SchemeType::Bfv)
            .poly_modulus_degree(16)
            .coeff_modulus(vec![Q0, Q1])
            .plain_modulus(256)
            .build()
            .unwrap();
        let ckks = EncryptionParameters::builder(SchemeType::Ckks)
            .poly_modulus_degree(16)
            .coeff_modulus(vec![Q0, Q1])
            .build()
            .unwrap();
        assert_eq!(base.parms_id(), base.clone().parms_id());
        assert_ne!(base.parms_id(), other_t.parms_id());
        assert_ne!(base.parms_id(), ckks.parms_id());
    }
}
