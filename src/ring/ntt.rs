use std::sync::Arc;
use concrete_ntt::prime64::Plan;

use crate::error::{EncnumError, Result};
use crate::ring::modular::{barrett_constant, mod_add, mod_mul, mod_neg, mod_sub};
use crate::ring::poly::CoeffPoly;

/// Polynomial over Z_q[X]/(X^n + 1) in NTT (evaluation) form.
///
/// Pointwise operations in this form are the ring operations; the plan is
/// shared between every polynomial living under the same prime.
#[derive(Clone, Debug)]
pub struct NttPoly {
    pub evals: Vec<u64>,
    pub modulus: u64,
    pub plan: Arc<Plan>,
}

/// Build an NTT plan for ring degree `n` and prime `modulus ≡ 1 (mod 2n)`.
pub fn make_plan(n: usize, modulus: u64) -> Result<Arc<Plan>> {
    if !n.is_power_of_two() || n < 16 {
        return Err(EncnumError::InvalidRingDegree(n));
    }
    let plan = Plan::try_new(n, modulus).ok_or_else(|| {
        EncnumError::InvalidParam(format!(
            "cannot create NTT plan for n={n}, q={modulus} (need prime q ≡ 1 mod {})",
            2 * n
        ))
    })?;
    Ok(Arc::new(plan))
}

impl NttPoly {
    /// Forward transform of a coefficient polynomial.
    pub fn from_coeff_poly(poly: &CoeffPoly, plan: Arc<Plan>) -> Result<Self> {
        Self::from_coeffs(poly.coeffs.clone(), poly.modulus, plan)
    }

    /// Forward transform of residues already reduced modulo `modulus`.
    pub fn from_coeffs(mut coeffs: Vec<u64>, modulus: u64, plan: Arc<Plan>) -> Result<Self> {
        if modulus != plan.modulus() {
            return Err(EncnumError::ModulusMismatch);
        }
        if coeffs.len() != plan.ntt_size() {
            return Err(EncnumError::DimensionMismatch { expected: plan.ntt_size(), got: coeffs.len() });
        }
        plan.fwd(&mut coeffs);
        Ok(Self { evals: coeffs, modulus, plan })
    }

    /// Inverse transform back to coefficients in `[0, q)`.
    pub fn to_coeff_poly(&self) -> CoeffPoly {
        let mut coeffs = self.evals.clone();
        self.plan.inv(&mut coeffs);
        self.plan.normalize(&mut coeffs);
        CoeffPoly { coeffs, modulus: self.modulus }
    }

    pub fn len(&self) -> usize {
        self.evals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.evals.is_empty()
    }

    fn check_compatible(&self, other: &Self) -> Result<()> {
        if self.modulus != other.modulus {
            return Err(EncnumError::ModulusMismatch);
        }
        if self.len() != other.len() {
            return Err(EncnumError::DimensionMismatch { expected: self.len(), got: other.len() });
        }
        Ok(())
    }

    pub fn add(&self, other: &Self) -> Result<Self> {
        self.check_compatible(other)?;
        let q = self.modulus;
        let evals = self.evals.iter().zip(&other.evals).map(|(&a, &b)| mod_add(a, b, q)).collect();
        Ok(Self { evals, modulus: q, plan: self.plan.clone() })
    }

    pub fn sub(&self, other: &Self) -> Result<Self> {
        self.check_compatible(other)?;
        let q = self.modulus;
        let evals = self.evals.iter().zip(&other.evals).map(|(&a, &b)| mod_sub(a, b, q)).collect();
        Ok(Self { evals, modulus: q, plan: self.plan.clone() })
    }

    pub fn neg(&self) -> Self {
        let q = self.modulus;
        let evals = self.evals.iter().map(|&a| mod_neg(a, q)).collect();
        Self { evals, modulus: q, plan: self.plan.clone() }
    }

    /// Pointwise product, i.e. negacyclic polynomial multiplication.
    pub fn mul(&self, other: &Self) -> Result<Self> {
        self.check_compatible(other)?;
        let q = self.modulus;
        let bk = barrett_constant(q);
        let evals = self.evals.iter().zip(&other.evals).map(|(&a, &b)| mod_mul(a, b, q, bk)).collect();
        Ok(Self { evals, modulus: q, plan: self.plan.clone() })
    }

    /// `self += a * b`, the inner step of key switching.
    pub fn mul_acc(&mut self, a: &Self, b: &Self) -> Result<()> {
        self.check_compatible(a)?;
        self.check_compatible(b)?;
        let q = self.modulus;
        let bk = barrett_constant(q);
        for ((acc, &x), &y) in self.evals.iter_mut().zip(&a.evals).zip(&b.evals) {
            *acc = mod_add(*acc, mod_mul(x, y, q, bk), q);
        }
        Ok(())
    }

    pub fn scalar_mul(&self, scalar: u64) -> Self {
        let q = self.modulus;
        let s = scalar % q;
        let bk = barrett_constant(q);
        let evals = self.evals.iter().map(|&a| mod_mul(a, s, q, bk)).collect();
        Self { evals, modulus: q, plan: self.plan.clone() }
    }

    pub fn is_zero(&self) -> bool {
        self.evals.iter().all(|&e| e == 0)
    }
}

impl PartialEq for NttPoly {
    fn eq(&self, other: &Self) -> bool {
        self.modulus == other.modulus && self.evals == other.evals
    }
}
