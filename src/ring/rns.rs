use std::sync::Arc;
use concrete_ntt::prime64::Plan;
use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{ToPrimitive, Zero};
use rand::Rng;
use rayon::prelude::*;

use crate::error::{EncnumError, Result};
use crate::ring::modular::{barrett_constant, mod_inv, mod_mul, mod_neg, reduce_i128};
use crate::ring::ntt::{make_plan, NttPoly};
use crate::ring::poly::CoeffPoly;

/// Polynomial in RNS form: one NTT-domain limb per prime of the basis.
///
/// The represented polynomial lives in Z_Q[X]/(X^n+1) with Q = ∏ q_i.
#[derive(Clone, Debug)]
pub struct RnsPoly {
    pub components: Vec<NttPoly>,
    pub ring_degree: usize,
}

/// Precomputed data for a set of pairwise coprime NTT-friendly primes.
#[derive(Clone, Debug)]
pub struct RnsBasis {
    pub moduli: Vec<u64>,
    pub plans: Vec<Arc<Plan>>,
    pub ring_degree: usize,
    pub barrett_ks: Vec<u64>,
    /// (Q/q_i)^{-1} mod q_i.
    pub q_star_inv: Vec<u64>,
    /// Q = ∏ q_i.
    pub product: BigUint,
    /// (Q/q_i) · [(Q/q_i)^{-1}]_{q_i}; Σ r_i · crt_terms[i] ≡ x (mod Q).
    crt_terms: Vec<BigUint>,
}

impl RnsBasis {
    pub fn new(moduli: Vec<u64>, ring_degree: usize) -> Result<Self> {
        let plans = moduli
            .iter()
            .map(|&q| make_plan(ring_degree, q))
            .collect::<Result<Vec<_>>>()?;
        Self::with_plans(moduli, plans, ring_degree)
    }

    fn with_plans(moduli: Vec<u64>, plans: Vec<Arc<Plan>>, ring_degree: usize) -> Result<Self> {
        if moduli.is_empty() {
            return Err(EncnumError::InvalidParam("RNS basis needs at least one prime".into()));
        }
        let barrett_ks: Vec<u64> = moduli.iter().map(|&q| barrett_constant(q)).collect();

        let mut q_star_inv = Vec::with_capacity(moduli.len());
        for (i, &qi) in moduli.iter().enumerate() {
            let mut prod = 1u64;
            for (j, &qj) in moduli.iter().enumerate() {
                if i != j {
                    prod = mod_mul(prod, qj % qi, qi, barrett_ks[i]);
                }
            }
            let inv = mod_inv(prod, qi)
                .ok_or_else(|| EncnumError::InvalidParam("RNS moduli must be pairwise coprime".into()))?;
            q_star_inv.push(inv);
        }

        let product: BigUint = moduli.iter().map(|&q| BigUint::from(q)).product();
        let crt_terms = moduli
            .iter()
            .zip(&q_star_inv)
            .map(|(&qi, &inv)| (&product / BigUint::from(qi)) * BigUint::from(inv))
            .collect();

        Ok(Self { moduli, plans, ring_degree, barrett_ks, q_star_inv, product, crt_terms })
    }

    /// Basis made of the first `len` primes, sharing this basis' NTT plans.
    pub fn prefix(&self, len: usize) -> Result<Self> {
        if len == 0 || len > self.moduli.len() {
            return Err(EncnumError::InvalidParam(format!(
                "cannot take {len} of {} primes",
                self.moduli.len()
            )));
        }
        Self::with_plans(self.moduli[..len].to_vec(), self.plans[..len].to_vec(), self.ring_degree)
    }

    /// Concatenation of two bases with disjoint primes.
    pub fn extend(&self, other: &RnsBasis) -> Result<Self> {
        if self.ring_degree != other.ring_degree {
            return Err(EncnumError::DimensionMismatch { expected: self.ring_degree, got: other.ring_degree });
        }
        let moduli = self.moduli.iter().chain(&other.moduli).copied().collect();
        let plans = self.plans.iter().chain(&other.plans).cloned().collect();
        Self::with_plans(moduli, plans, self.ring_degree)
    }

    pub fn num_moduli(&self) -> usize {
        self.moduli.len()
    }

    /// Bit length of Q.
    pub fn bit_count(&self) -> u64 {
        self.product.bits()
    }

    /// CRT-reconstruct one coefficient into its centered representative in `(-Q/2, Q/2]`.
    fn lift_one(&self, residues: &[&CoeffPoly], idx: usize) -> BigInt {
        let mut acc = BigUint::zero();
        for (term, limb) in self.crt_terms.iter().zip(residues) {
            acc += term * limb.coeffs[idx];
        }
        acc %= &self.product;
        if &acc + &acc > self.product {
            BigInt::from_biguint(Sign::Minus, &self.product - acc)
        } else {
            BigInt::from_biguint(Sign::Plus, acc)
        }
    }
}

/// `v mod q` in `[0, q)` for a signed big integer.
pub fn bigint_residue(v: &BigInt, q: u64) -> u64 {
    let r = (v.magnitude() % q).to_u64().unwrap_or_default();
    if v.sign() == Sign::Minus { mod_neg(r, q) } else { r }
}

impl RnsPoly {
    /// Small signed coefficients (secrets, errors, plaintexts) into every limb.
    pub fn from_signed(values: &[i128], basis: &RnsBasis) -> Result<Self> {
        if values.len() != basis.ring_degree {
            return Err(EncnumError::DimensionMismatch { expected: basis.ring_degree, got: values.len() });
        }
        let components = basis
            .moduli
            .iter()
            .zip(&basis.plans)
            .map(|(&q, plan)| {
                let coeffs = values.iter().map(|&v| reduce_i128(v, q)).collect();
                NttPoly::from_coeffs(coeffs, q, plan.clone())
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { components, ring_degree: basis.ring_degree })
    }

    /// Independent uniform limbs, i.e. a uniform element of Z_Q[X]/(X^n+1).
    pub fn sample_uniform<R: Rng>(basis: &RnsBasis, rng: &mut R) -> Result<Self> {
        let components = basis
            .moduli
            .iter()
            .zip(&basis.plans)
            .map(|(&q, plan)| {
                let limb = crate::sampling::sample_uniform_poly(basis.ring_degree, q, rng);
                NttPoly::from_coeff_poly(&limb, plan.clone())
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { components, ring_degree: basis.ring_degree })
    }

    /// Exact big-integer coefficients, centered modulo Q.
    pub fn to_bigints(&self, basis: &RnsBasis) -> Result<Vec<BigInt>> {
        self.check_basis(basis)?;
        let limbs: Vec<CoeffPoly> = self.components.iter().map(|c| c.to_coeff_poly()).collect();
        let refs: Vec<&CoeffPoly> = limbs.iter().collect();
        Ok((0..self.ring_degree).into_par_iter().map(|j| basis.lift_one(&refs, j)).collect())
    }

    /// Reduce big-integer coefficients into `basis`.
    pub fn from_bigints(values: &[BigInt], basis: &RnsBasis) -> Result<Self> {
        if values.len() != basis.ring_degree {
            return Err(EncnumError::DimensionMismatch { expected: basis.ring_degree, got: values.len() });
        }
        let components = basis
            .moduli
            .par_iter()
            .zip(basis.plans.par_iter())
            .map(|(&q, plan)| {
                let coeffs = values.iter().map(|v| bigint_residue(v, q)).collect();
                NttPoly::from_coeffs(coeffs, q, plan.clone())
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { components, ring_degree: basis.ring_degree })
    }

    /// Limbs in coefficient form.
    pub fn coeff_limbs(&self) -> Vec<CoeffPoly> {
        self.components.iter().map(|c| c.to_coeff_poly()).collect()
    }

    pub fn num_components(&self) -> usize {
        self.components.len()
    }

    /// Keep only the first `len` limbs (the polynomial reduced modulo a divisor of Q).
    pub fn truncated(&self, len: usize) -> Result<Self> {
        if len == 0 || len > self.components.len() {
            return Err(EncnumError::DimensionMismatch { expected: self.components.len(), got: len });
        }
        Ok(Self { components: self.components[..len].to_vec(), ring_degree: self.ring_degree })
    }

    fn check_basis(&self, basis: &RnsBasis) -> Result<()> {
        if self.components.len() != basis.num_moduli() {
            return Err(EncnumError::DimensionMismatch {
                expected: basis.num_moduli(),
                got: self.components.len(),
            });
        }
        Ok(())
    }

    fn check_same_shape(&self, other: &Self) -> Result<()> {
        if self.components.len() != other.components.len() {
            return Err(EncnumError::DimensionMismatch {
                expected: self.components.len(),
                got: other.components.len(),
            });
        }
        Ok(())
    }

    pub fn add(&self, other: &Self) -> Result<Self> {
        self.check_same_shape(other)?;
        let components = self
            .components
            .iter()
            .zip(&other.components)
            .map(|(a, b)| a.add(b))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { components, ring_degree: self.ring_degree })
    }

    pub fn sub(&self, other: &Self) -> Result<Self> {
        self.check_same_shape(other)?;
        let components = self
            .components
            .iter()
            .zip(&other.components)
            .map(|(a, b)| a.sub(b))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { components, ring_degree: self.ring_degree })
    }

    pub fn neg(&self) -> Self {
        Self { components: self.components.iter().map(|a| a.neg()).collect(), ring_degree: self.ring_degree }
    }

    pub fn mul(&self, other: &Self) -> Result<Self> {
        self.check_same_shape(other)?;
        let components = self
            .components
            .iter()
            .zip(&other.components)
            .map(|(a, b)| a.mul(b))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { components, ring_degree: self.ring_degree })
    }

    /// `self += a * b` limb by limb.
    pub fn mul_acc(&mut self, a: &Self, b: &Self) -> Result<()> {
        self.check_same_shape(a)?;
        self.check_same_shape(b)?;
        for ((acc, x), y) in self.components.iter_mut().zip(&a.components).zip(&b.components) {
            acc.mul_acc(x, y)?;
        }
        Ok(())
    }

    /// Multiply limb `i` by `scalars[i]`.
    pub fn scalar_mul_rns(&self, scalars: &[u64]) -> Result<Self> {
        if scalars.len() != self.components.len() {
            return Err(EncnumError::DimensionMismatch { expected: self.components.len(), got: scalars.len() });
        }
        let components = self.components.iter().zip(scalars).map(|(c, &s)| c.scalar_mul(s)).collect();
        Ok(Self { components, ring_degree: self.ring_degree })
    }

    pub fn is_zero(&self) -> bool {
        self.components.iter().all(|c| c.is_zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    const N: usize = 16;
    // Both ≡ 1 (mod 32).
    const Q0: u64 = 1099509805057;
    const Q1: u64 = 562949953443841;

    fn two_prime_basis() -> RnsBasis {
        RnsBasis::new(vec![Q0, Q1], N).unwrap()
    }

    #[test]
    fn test_signed_roundtrip_through_bigints() {
        let basis = two_prime_basis();
        let mut values = vec![0i128; N];
        values[0] = -1;
        values[1] = 42;
        values[5] = -123_456_789_012;
        let poly = RnsPoly::from_signed(&values, &basis).unwrap();
        let lifted = poly.to_bigints(&basis).unwrap();
        let expected: Vec<BigInt> = values.iter().map(|&v| BigInt::from(v)).collect();
        assert_eq!(lifted, expected);
    }

    #[test]
    fn test_from_bigints_wide_values() {
        let basis = two_prime_basis();
        // A value wider than either prime, still below Q/2.
        let big = BigInt::from(Q0) * BigInt::from(1u64 << 40) + BigInt::from(7);
        let mut values = vec![BigInt::zero(); N];
        values[3] = big.clone();
        values[4] = -big.clone();
        let poly = RnsPoly::from_bigints(&values, &basis).unwrap();
        assert_eq!(poly.to_bigints(&basis).unwrap(), values);
    }

    #[test]
    fn test_mul_matches_signed_product() {
        let basis = two_prime_basis();
        let mut a = vec![0i128; N];
        let mut b = vec![0i128; N];
        a[1] = -3;
        b[N - 1] = 5;
        // (-3X) * (5X^15) = -15 X^16 = 15
        let pa = RnsPoly::from_signed(&a, &basis).unwrap();
        let pb = RnsPoly::from_signed(&b, &basis).unwrap();
        let prod = pa.mul(&pb).unwrap().to_bigints(&basis).unwrap();
        assert_eq!(prod[0], BigInt::from(15));
        assert!(prod[1..].iter().all(|c| c.is_zero()));
    }

    #[test]
    fn test_prefix_and_truncate_agree() {
        let basis = two_prime_basis();
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let poly = RnsPoly::sample_uniform(&basis, &mut rng).unwrap();
        let low = basis.prefix(1).unwrap();
        let truncated = poly.truncated(1).unwrap();
        let direct = truncated.to_bigints(&low).unwrap();
        let full = poly.to_bigints(&basis).unwrap();
        for (d, f) in direct.iter().zip(&full) {
            assert_eq!(bigint_residue(d, Q0), bigint_residue(f, Q0));
        }
    }

    #[test]
    fn test_bigint_residue_negative() {
        assert_eq!(bigint_residue(&BigInt::from(-1), 17), 16);
        assert_eq!(bigint_residue(&BigInt::from(-34), 17), 0);
        assert_eq!(bigint_residue(&BigInt::from(35), 17), 1);
    }
}
