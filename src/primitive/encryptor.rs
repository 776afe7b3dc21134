use std::sync::Arc;
use num_bigint::{BigInt, BigUint};
use num_traits::ToPrimitive;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;

use crate::error::{EncnumError, Result};
use crate::params::SchemeType;
use crate::primitive::ciphertext::Ciphertext;
use crate::primitive::context::Context;
use crate::primitive::keys::{PublicKey, SecretKey};
use crate::primitive::plaintext::Plaintext;
use crate::ring::modular::mod_mul;
use crate::ring::ntt::NttPoly;
use crate::ring::rns::{RnsBasis, RnsPoly};
use crate::sampling::{sample_gaussian_vec, sample_ternary_vec};

/// Public-key encryption.
#[derive(Clone, Debug)]
pub struct Encryptor {
    context: Arc<Context>,
    public_key: PublicKey,
}

impl Encryptor {
    pub fn new(context: &Arc<Context>, public_key: PublicKey) -> Result<Self> {
        context.check_parms_id(public_key.parms_id)?;
        Ok(Self { context: context.clone(), public_key })
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn encrypt(&self, plaintext: &Plaintext) -> Result<Ciphertext> {
        let mut rng = ChaCha20Rng::from_os_rng();
        self.encrypt_with_rng(plaintext, &mut rng)
    }

    /// ct = (p0·u + e1 + M, p1·u + e2) with ternary u, where M is Δ·m for
    /// BFV and the scaled message itself for CKKS.
    pub fn encrypt_with_rng<R: Rng>(&self, plaintext: &Plaintext, rng: &mut R) -> Result<Ciphertext> {
        let basis = self.context.key_basis();
        let n = basis.ring_degree;
        let sigma = self.context.parms().sigma;

        let (message, scale) = match (self.context.scheme(), plaintext) {
            (SchemeType::Bfv, Plaintext::Bfv { coeffs }) => (scale_by_delta(coeffs, &self.context)?, 1.0),
            (SchemeType::Ckks, Plaintext::Ckks { coeffs, scale }) => (RnsPoly::from_bigints(coeffs, basis)?, *scale),
            (scheme, _) => {
                return Err(EncnumError::Encoding(format!("plaintext does not belong to a {scheme} context")));
            }
        };

        let u = RnsPoly::from_signed(&sample_ternary_vec(n, rng), basis)?;
        let e1 = RnsPoly::from_signed(&sample_gaussian_vec(n, sigma, rng), basis)?;
        let e2 = RnsPoly::from_signed(&sample_gaussian_vec(n, sigma, rng), basis)?;

        let c0 = self.public_key.p0.mul(&u)?.add(&e1)?.add(&message)?;
        let c1 = self.public_key.p1.mul(&u)?.add(&e2)?;

        Ok(Ciphertext {
            c: vec![c0, c1],
            level: 0,
            scale,
            parms_id: self.context.parms_id(),
            scheme: self.context.scheme(),
        })
    }
}

/// Δ·m in every limb of the key basis.
pub(crate) fn scale_by_delta(coeffs: &[u64], context: &Context) -> Result<RnsPoly> {
    let basis = context.key_basis();
    let tables = context.bfv_tables()?;
    check_plain_coeffs(coeffs, tables.plain_modulus, basis.ring_degree)?;

    let components = basis
        .moduli
        .iter()
        .zip(&basis.plans)
        .enumerate()
        .map(|(i, (&q, plan))| {
            let mut limb = vec![0u64; basis.ring_degree];
            for (dst, &m) in limb.iter_mut().zip(coeffs) {
                *dst = mod_mul(m % q, tables.delta[i], q, basis.barrett_ks[i]);
            }
            NttPoly::from_coeffs(limb, q, plan.clone())
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(RnsPoly { components, ring_degree: basis.ring_degree })
}

pub(crate) fn check_plain_coeffs(coeffs: &[u64], t: u64, n: usize) -> Result<()> {
    if coeffs.len() > n {
        return Err(EncnumError::DimensionMismatch { expected: n, got: coeffs.len() });
    }
    if let Some(&c) = coeffs.iter().find(|&&c| c >= t) {
        return Err(EncnumError::Encoding(format!("plaintext coefficient {c} >= plain modulus {t}")));
    }
    Ok(())
}

/// Secret-key decryption and noise introspection.
#[derive(Clone, Debug)]
pub struct Decryptor {
    context: Arc<Context>,
    secret_key: SecretKey,
}

impl Decryptor {
    pub fn new(context: &Arc<Context>, secret_key: SecretKey) -> Result<Self> {
        context.check_parms_id(secret_key.parms_id)?;
        Ok(Self { context: context.clone(), secret_key })
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }

    /// BFV: m = ⌊t·φ/Q⌉ mod t. CKKS: the phase itself at the ciphertext's scale.
    pub fn decrypt(&self, ct: &Ciphertext) -> Result<Plaintext> {
        let (phase, basis) = self.phase(ct)?;
        match ct.scheme {
            SchemeType::Bfv => {
                let t = self.context.bfv_tables()?.plain_modulus;
                let t_big = BigInt::from(t);
                let q_big = BigInt::from(basis.product.clone());
                let coeffs = phase
                    .par_iter()
                    .map(|x| {
                        let m = round_div(&(x * &t_big), &q_big) % &t_big;
                        let m = if m.sign() == num_bigint::Sign::Minus { m + &t_big } else { m };
                        m.to_u64().ok_or_else(|| EncnumError::Decoding("plaintext coefficient out of range".into()))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Plaintext::bfv(coeffs))
            }
            SchemeType::Ckks => Ok(Plaintext::Ckks { coeffs: phase, scale: ct.scale }),
        }
    }

    /// Bits of headroom left before BFV decryption fails; 0 means the
    /// ciphertext no longer decrypts correctly.
    pub fn invariant_noise_budget(&self, ct: &Ciphertext) -> Result<u32> {
        if ct.scheme != SchemeType::Bfv {
            return Err(EncnumError::Unsupported("noise budget is only defined for BFV".into()));
        }
        let (phase, basis) = self.phase(ct)?;
        let t = BigUint::from(self.context.bfv_tables()?.plain_modulus);
        let q = &basis.product;
        let half_q = q >> 1;

        // t·φ mod Q, centered, is Q times the invariant noise.
        let max_noise = phase
            .par_iter()
            .map(|x| {
                let w = (x.magnitude() * &t) % q;
                let w = if w > half_q { q - w } else { w };
                w.bits()
            })
            .max()
            .unwrap_or(0);

        let budget = basis.bit_count() as i64 - max_noise as i64 - 1;
        Ok(budget.max(0) as u32)
    }

    /// Centered coefficients of c0 + c1·s + c2·s² + ... at the ciphertext's level.
    fn phase(&self, ct: &Ciphertext) -> Result<(Vec<BigInt>, &RnsBasis)> {
        self.context.check_parms_id(ct.parms_id)?;
        let basis = self.context.basis_at(ct.level)?;
        let s = self.secret_key.poly.truncated(basis.num_moduli())?;

        let mut acc = ct
            .c
            .first()
            .cloned()
            .ok_or_else(|| EncnumError::Decoding("empty ciphertext".into()))?;
        let mut s_power = s.clone();
        for (i, ci) in ct.c.iter().enumerate().skip(1) {
            acc.mul_acc(ci, &s_power)?;
            if i + 1 < ct.c.len() {
                s_power = s_power.mul(&s)?;
            }
        }
        Ok((acc.to_bigints(basis)?, basis))
    }
}

/// ⌊a/b⌉ for b > 0, halves rounded away from zero.
pub(crate) fn round_div(a: &BigInt, b: &BigInt) -> BigInt {
    let q = a / b;
    let r = a - &q * b;
    let twice = &r + &r;
    if twice >= *b {
        q + 1
    } else if -twice >= *b {
        q - 1
    } else {
        q
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{CoeffModulus, EncryptionParameters};
    use crate::primitive::keys::KeyGenerator;

    fn bfv_context(n: usize, t: u64) -> Arc<Context> {
        let parms = EncryptionParameters::builder(SchemeType::Bfv)
            .poly_modulus_degree(n)
            .coeff_modulus(CoeffModulus::bfv_default(n).unwrap())
            .plain_modulus(t)
            .build()
            .unwrap();
        Context::new(parms).unwrap()
    }

    #[test]
    fn test_round_div() {
        let b = BigInt::from(10);
        assert_eq!(round_div(&BigInt::from(14), &b), BigInt::from(1));
        assert_eq!(round_div(&BigInt::from(15), &b), BigInt::from(2));
        assert_eq!(round_div(&BigInt::from(-14), &b), BigInt::from(-1));
        assert_eq!(round_div(&BigInt::from(-15), &b), BigInt::from(-2));
        assert_eq!(round_div(&BigInt::from(-16), &b), BigInt::from(-2));
    }

    #[test]
    fn test_bfv_encrypt_decrypt() {
        let ctx = bfv_context(2048, 2000);
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let keygen = KeyGenerator::with_rng(&ctx, &mut rng).unwrap();
        let encryptor = Encryptor::new(&ctx, keygen.create_public_key_with_rng(&mut rng).unwrap()).unwrap();
        let decryptor = Decryptor::new(&ctx, keygen.secret_key().clone()).unwrap();

        for pt in ["0", "1", "7CF", "3E8x^5 + 1", "1x^2047 + 2"] {
            let pt = Plaintext::from_hex_poly(pt).unwrap();
            let ct = encryptor.encrypt_with_rng(&pt, &mut rng).unwrap();
            assert_eq!(ct.size(), 2);
            assert_eq!(decryptor.decrypt(&ct).unwrap(), pt);
        }
    }

    #[test]
    fn test_fresh_noise_budget() {
        let ctx = bfv_context(4096, 2000);
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let keygen = KeyGenerator::with_rng(&ctx, &mut rng).unwrap();
        let encryptor = Encryptor::new(&ctx, keygen.create_public_key_with_rng(&mut rng).unwrap()).unwrap();
        let decryptor = Decryptor::new(&ctx, keygen.secret_key().clone()).unwrap();

        let ct = encryptor.encrypt_with_rng(&Plaintext::constant(5), &mut rng).unwrap();
        let budget = decryptor.invariant_noise_budget(&ct).unwrap();
        // 109-bit Q, 11-bit t, and roughly 12 bits of fresh noise.
        assert!(budget > 70 && budget < 100, "budget = {budget}");
    }

    #[test]
    fn test_rejects_out_of_range_plaintext() {
        let ctx = bfv_context(1024, 100);
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let keygen = KeyGenerator::with_rng(&ctx, &mut rng).unwrap();
        let encryptor = Encryptor::new(&ctx, keygen.create_public_key_with_rng(&mut rng).unwrap()).unwrap();
        let err = encryptor.encrypt_with_rng(&Plaintext::constant(100), &mut rng).unwrap_err();
        assert!(matches!(err, EncnumError::Encoding(_)));
    }

    #[test]
    fn test_key_from_other_context_is_refused() {
        let a = bfv_context(1024, 100);
        let b = bfv_context(1024, 102);
        let keygen = KeyGenerator::new(&a).unwrap();
        let err = Encryptor::new(&b, keygen.create_public_key().unwrap()).unwrap_err();
        assert!(matches!(err, EncnumError::ContextMismatch));
    }
}
