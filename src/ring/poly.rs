use crate::error::{EncnumError, Result};
use crate::ring::modular::{barrett_constant, center, mod_add, mod_mul, mod_neg, mod_sub, reduce_i128};

/// Polynomial in coefficient form over Z_q[X]/(X^n + 1).
#[derive(Clone, Debug)]
pub struct CoeffPoly {
    pub coeffs: Vec<u64>,
    pub modulus: u64,
}

impl CoeffPoly {
    pub fn zero(n: usize, modulus: u64) -> Self {
        Self { coeffs: vec![0u64; n], modulus }
    }

    /// Build from arbitrary words, reducing each modulo `modulus`.
    pub fn from_coeffs(coeffs: Vec<u64>, modulus: u64) -> Self {
        let coeffs = coeffs.into_iter().map(|c| c % modulus).collect();
        Self { coeffs, modulus }
    }

    /// Build from signed integers, mapping negatives to `q - |c|`.
    pub fn from_signed(values: &[i128], modulus: u64) -> Self {
        let coeffs = values.iter().map(|&v| reduce_i128(v, modulus)).collect();
        Self { coeffs, modulus }
    }

    pub fn len(&self) -> usize {
        self.coeffs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coeffs.is_empty()
    }

    fn check_compatible(&self, other: &Self) -> Result<()> {
        if self.len() != other.len() {
            return Err(EncnumError::DimensionMismatch { expected: self.len(), got: other.len() });
        }
        if self.modulus != other.modulus {
            return Err(EncnumError::ModulusMismatch);
        }
        Ok(())
    }

    pub fn add(&self, other: &Self) -> Result<Self> {
        self.check_compatible(other)?;
        let q = self.modulus;
        let coeffs = self.coeffs.iter().zip(&other.coeffs).map(|(&a, &b)| mod_add(a, b, q)).collect();
        Ok(Self { coeffs, modulus: q })
    }

    pub fn sub(&self, other: &Self) -> Result<Self> {
        self.check_compatible(other)?;
        let q = self.modulus;
        let coeffs = self.coeffs.iter().zip(&other.coeffs).map(|(&a, &b)| mod_sub(a, b, q)).collect();
        Ok(Self { coeffs, modulus: q })
    }

    pub fn neg(&self) -> Self {
        let q = self.modulus;
        Self { coeffs: self.coeffs.iter().map(|&a| mod_neg(a, q)).collect(), modulus: q }
    }

    /// Schoolbook negacyclic product. Quadratic; used to cross-check the NTT.
    pub fn mul_naive(&self, other: &Self) -> Result<Self> {
        self.check_compatible(other)?;
        let n = self.len();
        let q = self.modulus;
        let bk = barrett_constant(q);
        let mut result = vec![0u64; n];

        for (i, &a) in self.coeffs.iter().enumerate() {
            if a == 0 {
                continue;
            }
            for (j, &b) in other.coeffs.iter().enumerate() {
                let prod = mod_mul(a, b, q, bk);
                let idx = i + j;
                if idx < n {
                    result[idx] = mod_add(result[idx], prod, q);
                } else {
                    // X^n = -1
                    result[idx - n] = mod_sub(result[idx - n], prod, q);
                }
            }
        }
        Ok(Self { coeffs: result, modulus: q })
    }

    /// Centered representatives in `(-q/2, q/2]`.
    pub fn centered_coeffs(&self) -> Vec<i128> {
        self.coeffs.iter().map(|&c| center(c, self.modulus)).collect()
    }
}

impl PartialEq for CoeffPoly {
    fn eq(&self, other: &Self) -> bool {
        self.modulus == other.modulus && self.coeffs == other.coeffs
    }
}
