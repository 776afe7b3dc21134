use std::sync::Arc;
use num_bigint::BigInt;
use rayon::prelude::*;

use crate::error::{EncnumError, Result};
use crate::params::SchemeType;
use crate::primitive::ciphertext::Ciphertext;
use crate::primitive::context::Context;
use crate::primitive::encryptor::{check_plain_coeffs, round_div, scale_by_delta};
use crate::primitive::keys::{RelinKeys, RELIN_DIGIT_BITS};
use crate::primitive::plaintext::Plaintext;
use crate::ring::modular::{center, mod_inv};
use crate::ring::rns::{RnsBasis, RnsPoly};

/// Relative tolerance when comparing CKKS scales.
const SCALE_EPSILON: f64 = 1e-9;

fn scales_match(a: f64, b: f64) -> bool {
    (a - b).abs() <= SCALE_EPSILON * a.abs().max(b.abs())
}

/// Homomorphic operations over one context.
///
/// Every method leaves its inputs untouched and returns a new ciphertext.
#[derive(Clone, Debug)]
pub struct Evaluator {
    context: Arc<Context>,
}

impl Evaluator {
    pub fn new(context: &Arc<Context>) -> Self {
        Self { context: context.clone() }
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    fn basis_of(&self, ct: &Ciphertext) -> Result<&RnsBasis> {
        self.context.check_parms_id(ct.parms_id)?;
        let basis = self.context.basis_at(ct.level)?;
        if let Some(bad) = ct.c.iter().find(|c| c.num_components() != basis.num_moduli()) {
            return Err(EncnumError::DimensionMismatch { expected: basis.num_moduli(), got: bad.num_components() });
        }
        if ct.c.len() < 2 {
            return Err(EncnumError::InvalidParam("ciphertext needs at least two components".into()));
        }
        Ok(basis)
    }

    fn check_pair(&self, a: &Ciphertext, b: &Ciphertext) -> Result<()> {
        self.basis_of(a)?;
        self.basis_of(b)?;
        if a.level != b.level {
            return Err(EncnumError::LevelMismatch(a.level, b.level));
        }
        Ok(())
    }

    fn check_additive_scales(a: f64, b: f64) -> Result<()> {
        if !scales_match(a, b) {
            return Err(EncnumError::ScaleMismatch(a, b));
        }
        Ok(())
    }

    fn wrap(&self, like: &Ciphertext, c: Vec<RnsPoly>, level: usize, scale: f64) -> Ciphertext {
        Ciphertext { c, level, scale, parms_id: like.parms_id, scheme: like.scheme }
    }

    /// Componentwise combination; the shorter ciphertext is padded with zeros.
    fn combine(
        &self,
        a: &Ciphertext,
        b: &Ciphertext,
        op: impl Fn(&RnsPoly, &RnsPoly) -> Result<RnsPoly>,
        lone_b: impl Fn(&RnsPoly) -> RnsPoly,
    ) -> Result<Vec<RnsPoly>> {
        (0..a.c.len().max(b.c.len()))
            .map(|i| match (a.c.get(i), b.c.get(i)) {
                (Some(x), Some(y)) => op(x, y),
                (Some(x), None) => Ok(x.clone()),
                (None, Some(y)) => Ok(lone_b(y)),
                (None, None) => Err(EncnumError::InvalidParam("empty ciphertext".into())),
            })
            .collect()
    }

    pub fn add(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        self.check_pair(a, b)?;
        Self::check_additive_scales(a.scale, b.scale)?;
        let c = self.combine(a, b, |x, y| x.add(y), |y| y.clone())?;
        Ok(self.wrap(a, c, a.level, a.scale))
    }

    pub fn sub(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        self.check_pair(a, b)?;
        Self::check_additive_scales(a.scale, b.scale)?;
        let c = self.combine(a, b, |x, y| x.sub(y), |y| y.neg())?;
        Ok(self.wrap(a, c, a.level, a.scale))
    }

    pub fn negate(&self, ct: &Ciphertext) -> Result<Ciphertext> {
        self.basis_of(ct)?;
        let c = ct.c.iter().map(RnsPoly::neg).collect();
        Ok(self.wrap(ct, c, ct.level, ct.scale))
    }

    /// The message term a plaintext contributes to c0 under addition.
    fn additive_term(&self, ct: &Ciphertext, pt: &Plaintext) -> Result<RnsPoly> {
        match (ct.scheme, pt) {
            (SchemeType::Bfv, Plaintext::Bfv { coeffs }) => scale_by_delta(coeffs, &self.context),
            (SchemeType::Ckks, Plaintext::Ckks { coeffs, scale }) => {
                Self::check_additive_scales(ct.scale, *scale)?;
                RnsPoly::from_bigints(coeffs, self.basis_of(ct)?)
            }
            (scheme, _) => Err(EncnumError::Encoding(format!("plaintext does not belong to a {scheme} context"))),
        }
    }

    pub fn add_plain(&self, ct: &Ciphertext, pt: &Plaintext) -> Result<Ciphertext> {
        self.basis_of(ct)?;
        let term = self.additive_term(ct, pt)?;
        let mut c = ct.c.clone();
        c[0] = c[0].add(&term)?;
        Ok(self.wrap(ct, c, ct.level, ct.scale))
    }

    pub fn sub_plain(&self, ct: &Ciphertext, pt: &Plaintext) -> Result<Ciphertext> {
        self.basis_of(ct)?;
        let term = self.additive_term(ct, pt)?;
        let mut c = ct.c.clone();
        c[0] = c[0].sub(&term)?;
        Ok(self.wrap(ct, c, ct.level, ct.scale))
    }

    /// Multiply every component by the plaintext polynomial. BFV messages
    /// are taken centered modulo t to keep the noise growth small.
    pub fn multiply_plain(&self, ct: &Ciphertext, pt: &Plaintext) -> Result<Ciphertext> {
        let basis = self.basis_of(ct)?;
        let (factor, scale) = match (ct.scheme, pt) {
            (SchemeType::Bfv, Plaintext::Bfv { coeffs }) => {
                let t = self.context.bfv_tables()?.plain_modulus;
                check_plain_coeffs(coeffs, t, basis.ring_degree)?;
                let mut signed = vec![0i128; basis.ring_degree];
                for (dst, &m) in signed.iter_mut().zip(coeffs) {
                    *dst = center(m, t);
                }
                (RnsPoly::from_signed(&signed, basis)?, ct.scale)
            }
            (SchemeType::Ckks, Plaintext::Ckks { coeffs, scale }) => {
                let product = ct.scale * scale;
                self.check_scale_fits(product, basis)?;
                (RnsPoly::from_bigints(coeffs, basis)?, product)
            }
            (scheme, _) => {
                return Err(EncnumError::Encoding(format!("plaintext does not belong to a {scheme} context")));
            }
        };
        let c = ct.c.iter().map(|ci| ci.mul(&factor)).collect::<Result<Vec<_>>>()?;
        Ok(self.wrap(ct, c, ct.level, scale))
    }

    fn check_scale_fits(&self, scale: f64, basis: &RnsBasis) -> Result<()> {
        if scale.log2() >= basis.bit_count() as f64 - 1.0 {
            return Err(EncnumError::InvalidParam(format!(
                "scale 2^{:.1} exceeds the remaining coefficient modulus",
                scale.log2()
            )));
        }
        Ok(())
    }

    /// Tensor product of two size-2 ciphertexts; the result has size 3.
    pub fn multiply(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        self.check_pair(a, b)?;
        if a.c.len() != 2 || b.c.len() != 2 {
            return Err(EncnumError::InvalidParam("multiplication requires size-2 ciphertexts".into()));
        }
        match a.scheme {
            SchemeType::Bfv => self.bfv_multiply(a, b),
            SchemeType::Ckks => {
                let scale = a.scale * b.scale;
                self.check_scale_fits(scale, self.basis_of(a)?)?;
                let c = tensor(&a.c, &b.c)?;
                Ok(self.wrap(a, c, a.level, scale))
            }
        }
    }

    pub fn square(&self, ct: &Ciphertext) -> Result<Ciphertext> {
        self.multiply(ct, ct)
    }

    /// ⌊t/Q · (a ⊗ b)⌉ computed exactly in the extended basis Q ∪ P.
    fn bfv_multiply(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        let tables = self.context.bfv_tables()?;
        let q_basis = self.context.key_basis();
        let ext = &tables.extended;

        let lift = |p: &RnsPoly| -> Result<RnsPoly> { RnsPoly::from_bigints(&p.to_bigints(q_basis)?, ext) };
        let a_ext = a.c.iter().map(&lift).collect::<Result<Vec<_>>>()?;
        let b_ext = b.c.iter().map(&lift).collect::<Result<Vec<_>>>()?;
        let product = tensor(&a_ext, &b_ext)?;

        let t = BigInt::from(tables.plain_modulus);
        let q = BigInt::from(q_basis.product.clone());
        let c = product
            .iter()
            .map(|d| {
                let scaled: Vec<BigInt> = d.to_bigints(ext)?.par_iter().map(|x| round_div(&(x * &t), &q)).collect();
                RnsPoly::from_bigints(&scaled, q_basis)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(self.wrap(a, c, a.level, a.scale))
    }

    /// Fold c2 back into (c0, c1) with the digit keys. Size-2 input is returned as is.
    pub fn relinearize(&self, ct: &Ciphertext, rlk: &RelinKeys) -> Result<Ciphertext> {
        let basis = self.basis_of(ct)?;
        match ct.c.len() {
            2 => return Ok(ct.clone()),
            3 => {}
            n => {
                return Err(EncnumError::InvalidParam(format!("cannot relinearize a size-{n} ciphertext")));
            }
        }
        self.context.check_parms_id(rlk.parms_id)?;
        let m = basis.num_moduli();
        if rlk.keys.len() < m {
            return Err(EncnumError::DimensionMismatch { expected: m, got: rlk.keys.len() });
        }

        let c2_limbs = ct.c[2].coeff_limbs();
        let mut c0 = ct.c[0].clone();
        let mut c1 = ct.c[1].clone();
        let mask = (1u64 << RELIN_DIGIT_BITS) - 1;

        for (limb, row) in c2_limbs.iter().zip(&rlk.keys) {
            for (j, (k0, k1)) in row.iter().enumerate() {
                let shift = RELIN_DIGIT_BITS as usize * j;
                let digit: Vec<i128> = limb.coeffs.iter().map(|&c| ((c >> shift) & mask) as i128).collect();
                let d = RnsPoly::from_signed(&digit, basis)?;
                c0.mul_acc(&d, &k0.truncated(m)?)?;
                c1.mul_acc(&d, &k1.truncated(m)?)?;
            }
        }
        Ok(self.wrap(ct, vec![c0, c1], ct.level, ct.scale))
    }

    /// Divide by the last prime of the current level and drop it (CKKS).
    pub fn rescale_to_next(&self, ct: &Ciphertext) -> Result<Ciphertext> {
        if ct.scheme != SchemeType::Ckks {
            return Err(EncnumError::Unsupported("rescaling requires the CKKS scheme".into()));
        }
        let basis = self.basis_of(ct)?;
        if ct.level >= self.context.max_level() {
            return Err(EncnumError::InvalidModSwitch { from: ct.level, to: ct.level + 1 });
        }
        let next = self.context.basis_at(ct.level + 1)?;
        let last = basis.num_moduli() - 1;
        let q_last = basis.moduli[last];
        let inverses = next
            .moduli
            .iter()
            .map(|&q| mod_inv(q_last % q, q))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| EncnumError::InvalidParam("chain primes must be coprime".into()))?;

        let c = ct
            .c
            .iter()
            .map(|ci| {
                let tail = ci.components[last].to_coeff_poly().centered_coeffs();
                let correction = RnsPoly::from_signed(&tail, next)?;
                ci.truncated(last)?.sub(&correction)?.scalar_mul_rns(&inverses)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(self.wrap(ct, c, ct.level + 1, ct.scale / q_last as f64))
    }

    /// Drop primes until the ciphertext sits at `level`, without dividing.
    pub fn mod_switch_to(&self, ct: &Ciphertext, level: usize) -> Result<Ciphertext> {
        self.basis_of(ct)?;
        if level < ct.level || level > self.context.max_level() {
            return Err(EncnumError::InvalidModSwitch { from: ct.level, to: level });
        }
        if level == ct.level {
            return Ok(ct.clone());
        }
        let len = self.context.basis_at(level)?.num_moduli();
        let c = ct.c.iter().map(|ci| ci.truncated(len)).collect::<Result<Vec<_>>>()?;
        Ok(self.wrap(ct, c, level, ct.scale))
    }

    pub fn mod_switch_to_next(&self, ct: &Ciphertext) -> Result<Ciphertext> {
        self.mod_switch_to(ct, ct.level + 1)
    }
}

/// (a0·b0, a0·b1 + a1·b0, a1·b1).
fn tensor(a: &[RnsPoly], b: &[RnsPoly]) -> Result<Vec<RnsPoly>> {
    let d0 = a[0].mul(&b[0])?;
    let mut d1 = a[0].mul(&b[1])?;
    d1.mul_acc(&a[1], &b[0])?;
    let d2 = a[1].mul(&b[1])?;
    Ok(vec![d0, d1, d2])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{CoeffModulus, EncryptionParameters};
    use crate::primitive::encoder::CkksEncoder;
    use crate::primitive::encryptor::{Decryptor, Encryptor};
    use crate::primitive::keys::KeyGenerator;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    struct Fixture {
        encryptor: Encryptor,
        decryptor: Decryptor,
        evaluator: Evaluator,
        rlk: RelinKeys,
        rng: ChaCha20Rng,
    }

    fn fixture(parms: std::sync::Arc<EncryptionParameters>, seed: u64) -> Fixture {
        let ctx = Context::new(parms).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let keygen = KeyGenerator::with_rng(&ctx, &mut rng).unwrap();
        let pk = keygen.create_public_key_with_rng(&mut rng).unwrap();
        let rlk = keygen.create_relin_keys_with_rng(&mut rng).unwrap();
        Fixture {
            encryptor: Encryptor::new(&ctx, pk).unwrap(),
            decryptor: Decryptor::new(&ctx, keygen.secret_key().clone()).unwrap(),
            evaluator: Evaluator::new(&ctx),
            rlk,
            rng,
        }
    }

    fn bfv(n: usize, t: u64) -> std::sync::Arc<EncryptionParameters> {
        EncryptionParameters::builder(SchemeType::Bfv)
            .poly_modulus_degree(n)
            .coeff_modulus(CoeffModulus::bfv_default(n).unwrap())
            .plain_modulus(t)
            .build()
            .unwrap()
    }

    fn ckks(n: usize, levels: usize) -> std::sync::Arc<EncryptionParameters> {
        EncryptionParameters::builder(SchemeType::Ckks)
            .poly_modulus_degree(n)
            .coeff_modulus(CoeffModulus::ckks_chain(n, levels).unwrap())
            .build()
            .unwrap()
    }

    #[test]
    fn test_bfv_add_sub_negate() {
        let mut f = fixture(bfv(2048, 1000), 1);
        let a = f.encryptor.encrypt_with_rng(&Plaintext::constant(990), &mut f.rng).unwrap();
        let b = f.encryptor.encrypt_with_rng(&Plaintext::constant(25), &mut f.rng).unwrap();

        let sum = f.evaluator.add(&a, &b).unwrap();
        assert_eq!(f.decryptor.decrypt(&sum).unwrap(), Plaintext::constant(15));
        let diff = f.evaluator.sub(&b, &a).unwrap();
        assert_eq!(f.decryptor.decrypt(&diff).unwrap(), Plaintext::constant(35));
        let neg = f.evaluator.negate(&b).unwrap();
        assert_eq!(f.decryptor.decrypt(&neg).unwrap(), Plaintext::constant(975));
    }

    #[test]
    fn test_bfv_multiply_relinearize() {
        let mut f = fixture(bfv(4096, 2000), 2);
        let a = f.encryptor.encrypt_with_rng(&Plaintext::constant(7), &mut f.rng).unwrap();
        let b = f.encryptor.encrypt_with_rng(&Plaintext::constant(1997), &mut f.rng).unwrap();

        let prod = f.evaluator.multiply(&a, &b).unwrap();
        assert_eq!(prod.size(), 3);
        // 7 · (-3) = -21 ≡ 1979
        assert_eq!(f.decryptor.decrypt(&prod).unwrap(), Plaintext::constant(1979));

        let relin = f.evaluator.relinearize(&prod, &f.rlk).unwrap();
        assert_eq!(relin.size(), 2);
        assert_eq!(f.decryptor.decrypt(&relin).unwrap(), Plaintext::constant(1979));
        assert!(f.decryptor.invariant_noise_budget(&relin).unwrap() > 0);
        assert!(
            f.decryptor.invariant_noise_budget(&relin).unwrap()
                < f.decryptor.invariant_noise_budget(&a).unwrap()
        );
    }

    #[test]
    fn test_bfv_plain_ops() {
        let mut f = fixture(bfv(2048, 256), 3);
        let a = f.encryptor.encrypt_with_rng(&Plaintext::from_hex_poly("2x + 3").unwrap(), &mut f.rng).unwrap();
        let added = f.evaluator.add_plain(&a, &Plaintext::constant(0xFF)).unwrap();
        assert_eq!(f.decryptor.decrypt(&added).unwrap(), Plaintext::from_hex_poly("2x + 2").unwrap());
        let subbed = f.evaluator.sub_plain(&a, &Plaintext::constant(4)).unwrap();
        assert_eq!(f.decryptor.decrypt(&subbed).unwrap(), Plaintext::from_hex_poly("2x + FF").unwrap());
        let scaled = f.evaluator.multiply_plain(&a, &Plaintext::constant(0xFE)).unwrap();
        assert_eq!(f.decryptor.decrypt(&scaled).unwrap(), Plaintext::from_hex_poly("FCx + FA").unwrap());
    }

    #[test]
    fn test_ckks_multiply_rescale() {
        let parms = ckks(4096, 2);
        let mut f = fixture(parms, 4);
        let encoder = CkksEncoder::new(f.evaluator.context()).unwrap();
        let scale = 2f64.powi(40);

        let a = f.encryptor.encrypt_with_rng(&encoder.encode_scalar(1.5, scale).unwrap(), &mut f.rng).unwrap();
        let b = f.encryptor.encrypt_with_rng(&encoder.encode_scalar(-2.25, scale).unwrap(), &mut f.rng).unwrap();
        let prod = f.evaluator.multiply(&a, &b).unwrap();
        let relin = f.evaluator.relinearize(&prod, &f.rlk).unwrap();
        let rescaled = f.evaluator.rescale_to_next(&relin).unwrap();
        assert_eq!(rescaled.level(), 1);
        assert!((rescaled.scale().log2() - 40.0).abs() < 0.01);

        let decoded = encoder.decode(&f.decryptor.decrypt(&rescaled).unwrap()).unwrap();
        assert!((decoded[0] + 3.375).abs() < 1e-6, "{}", decoded[0]);
    }

    #[test]
    fn test_ckks_level_and_scale_checks() {
        let mut f = fixture(ckks(2048, 1), 5);
        let encoder = CkksEncoder::new(f.evaluator.context()).unwrap();
        let scale = 2f64.powi(40);
        let a = f.encryptor.encrypt_with_rng(&encoder.encode_scalar(1.0, scale).unwrap(), &mut f.rng).unwrap();
        let b = f.evaluator.mod_switch_to_next(&a).unwrap();

        assert!(matches!(f.evaluator.add(&a, &b), Err(EncnumError::LevelMismatch(0, 1))));
        assert!(matches!(f.evaluator.mod_switch_to(&b, 0), Err(EncnumError::InvalidModSwitch { from: 1, to: 0 })));
        assert!(matches!(f.evaluator.rescale_to_next(&b), Err(EncnumError::InvalidModSwitch { from: 1, to: 2 })));

        let mut c = a.clone();
        c.set_scale(scale * 2.0);
        assert!(matches!(f.evaluator.add(&a, &c), Err(EncnumError::ScaleMismatch(_, _))));

        let sum = f.evaluator.add(&a, &f.evaluator.mod_switch_to(&a, 0).unwrap()).unwrap();
        let decoded = encoder.decode(&f.decryptor.decrypt(&sum).unwrap()).unwrap();
        assert!((decoded[0] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_relinearize_is_noop_on_size_two() {
        let mut f = fixture(bfv(1024, 100), 6);
        let a = f.encryptor.encrypt_with_rng(&Plaintext::constant(3), &mut f.rng).unwrap();
        let r = f.evaluator.relinearize(&a, &f.rlk).unwrap();
        assert_eq!(r.size(), 2);
        assert_eq!(f.decryptor.decrypt(&r).unwrap(), Plaintext::constant(3));
    }
}
