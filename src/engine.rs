//! Arithmetic on encrypted values.
//!
//! Every operation resolves its right operand once, brings both sides to a
//! common scale and level where the scheme needs it, runs the primitive
//! operation, and after a multiplication relinearizes and (in float mode)
//! rescales. Inputs are never modified.

use log::{debug, trace};
use rayon::prelude::*;

use crate::codec::Scalar;
use crate::error::{EncnumError, Result};
use crate::keys::KeyClass;
use crate::mode::Mode;
use crate::primitive::{Ciphertext, RelinKeys};
use crate::session::Session;
use crate::value::{EncryptedValue, Operand};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
}

impl Session {
    pub fn add<'a>(&self, lhs: &EncryptedValue, rhs: impl Into<Operand<'a>>) -> Result<EncryptedValue> {
        self.binary(lhs, rhs.into(), BinaryOp::Add)
    }

    pub fn sub<'a>(&self, lhs: &EncryptedValue, rhs: impl Into<Operand<'a>>) -> Result<EncryptedValue> {
        self.binary(lhs, rhs.into(), BinaryOp::Sub)
    }

    pub fn mul<'a>(&self, lhs: &EncryptedValue, rhs: impl Into<Operand<'a>>) -> Result<EncryptedValue> {
        self.binary(lhs, rhs.into(), BinaryOp::Mul)
    }

    pub fn radd(&self, lhs: impl Into<Scalar>, rhs: &EncryptedValue) -> Result<EncryptedValue> {
        self.add(rhs, lhs.into())
    }

    pub fn rmul(&self, lhs: impl Into<Scalar>, rhs: &EncryptedValue) -> Result<EncryptedValue> {
        self.mul(rhs, lhs.into())
    }

    /// `lhs - rhs` with a plain left-hand side.
    pub fn rsub(&self, lhs: impl Into<Scalar>, rhs: &EncryptedValue) -> Result<EncryptedValue> {
        let negated = self.neg(rhs)?;
        self.add(&negated, lhs.into())
    }

    /// Float mode only, by a plain nonzero scalar: multiplication by its reciprocal.
    pub fn div<'a>(&self, lhs: &EncryptedValue, rhs: impl Into<Operand<'a>>) -> Result<EncryptedValue> {
        if let Mode::Integer { .. } = self.mode {
            return Err(EncnumError::Unsupported("division is not supported in integer mode".into()));
        }
        match rhs.into() {
            Operand::Encrypted(_) => {
                Err(EncnumError::Unsupported("division by an encrypted value is not supported".into()))
            }
            Operand::Plain(divisor) => {
                let divisor = divisor.as_f64();
                if divisor == 0.0 {
                    return Err(EncnumError::Unsupported("division by zero".into()));
                }
                self.mul(lhs, 1.0 / divisor)
            }
        }
    }

    /// `0 - value`.
    pub fn neg(&self, value: &EncryptedValue) -> Result<EncryptedValue> {
        self.check_value(value)?;
        Ok(self.wrap(self.evaluator.negate(&value.ciphertext)?))
    }

    pub fn square(&self, value: &EncryptedValue) -> Result<EncryptedValue> {
        self.check_value(value)?;
        Ok(self.wrap(self.square_ct(&value.ciphertext)?))
    }

    /// `base^k` for a non-negative integer `k`.
    ///
    /// The base is squared once per bit of `k` below the top one, each set
    /// bit contributes the running power as a factor, and the factors are
    /// multiplied in a balanced tree. The depth is
    /// `⌊log2 k⌋ + ⌈log2 popcount(k)⌉` rather than `k - 1`.
    pub fn pow(&self, base: &EncryptedValue, exponent: impl Into<Scalar>) -> Result<EncryptedValue> {
        self.check_value(base)?;
        let k = self.exponent(exponent.into())?;
        if k == 0 {
            return self.encrypt(1);
        }

        let top = u64::BITS - 1 - k.leading_zeros();
        debug!("pow {k}: {top} squarings, {} factors", k.count_ones());
        let mut running = base.ciphertext.clone();
        let mut factors = Vec::with_capacity(k.count_ones() as usize);
        for bit in 0..=top {
            if (k >> bit) & 1 == 1 {
                factors.push(running.clone());
            }
            if bit < top {
                running = self.square_ct(&running)?;
            }
        }
        let result = tree_reduce(factors, |a, b| self.mul_ct(a, b))?;
        match result {
            Some(ct) => Ok(self.wrap(ct)),
            None => self.encrypt(1),
        }
    }

    fn exponent(&self, exponent: Scalar) -> Result<u64> {
        let non_negative = || EncnumError::Unsupported("only non-negative integer exponents supported".into());
        match (self.mode, exponent) {
            (_, Scalar::Int(k)) => u64::try_from(k).map_err(|_| non_negative()),
            (Mode::Integer { .. }, Scalar::Float(_)) => Err(non_negative()),
            (Mode::Float { .. }, Scalar::Float(e)) if !e.is_finite() || e.fract() != 0.0 => {
                Err(EncnumError::Unsupported("fractional powers not supported".into()))
            }
            (Mode::Float { .. }, Scalar::Float(e)) if e < 0.0 => Err(non_negative()),
            (Mode::Float { .. }, Scalar::Float(e)) => Ok(e as u64),
        }
    }

    /// Sum of all values; the empty sum is an encryption of 0.
    pub fn sum(&self, values: &[EncryptedValue]) -> Result<EncryptedValue> {
        let Some((first, rest)) = values.split_first() else {
            return self.encrypt(0);
        };
        self.check_value(first)?;
        rest.iter().try_fold(first.clone(), |acc, v| self.add(&acc, v))
    }

    /// Product of all values in a balanced tree; the empty product is an encryption of 1.
    pub fn product(&self, values: &[EncryptedValue]) -> Result<EncryptedValue> {
        for v in values {
            self.check_value(v)?;
        }
        let factors = values.iter().map(|v| v.ciphertext.clone()).collect();
        match tree_reduce(factors, |a, b| self.mul_ct(a, b))? {
            Some(ct) => Ok(self.wrap(ct)),
            None => self.encrypt(1),
        }
    }

    fn binary(&self, lhs: &EncryptedValue, rhs: Operand<'_>, op: BinaryOp) -> Result<EncryptedValue> {
        self.check_value(lhs)?;
        let a = &lhs.ciphertext;
        let ct = match rhs {
            Operand::Encrypted(rhs) => {
                self.check_value(rhs)?;
                let b = &rhs.ciphertext;
                match op {
                    BinaryOp::Mul => self.mul_ct(a, b)?,
                    BinaryOp::Add | BinaryOp::Sub => {
                        let (a, b) = self.normalize_pair(a, b)?;
                        if op == BinaryOp::Add {
                            self.evaluator.add(&a, &b)?
                        } else {
                            self.evaluator.sub(&a, &b)?
                        }
                    }
                }
            }
            Operand::Plain(value) => {
                let plaintext = self.encode(value)?;
                match op {
                    BinaryOp::Mul => {
                        let rlk = self.relin_keys()?;
                        let product = self.evaluator.multiply_plain(a, &plaintext)?;
                        self.renormalize(product, rlk)?
                    }
                    BinaryOp::Add | BinaryOp::Sub => {
                        // The plaintext sits at the default scale and is reduced
                        // into whatever level `a` is at.
                        let a = self.normalize_scale(a);
                        if op == BinaryOp::Add {
                            self.evaluator.add_plain(&a, &plaintext)?
                        } else {
                            self.evaluator.sub_plain(&a, &plaintext)?
                        }
                    }
                }
            }
        };
        Ok(self.wrap(ct))
    }

    fn relin_keys(&self) -> Result<&RelinKeys> {
        self.relin_keys.as_ref().ok_or(EncnumError::KeyNotSet(KeyClass::Relinearization))
    }

    /// Relinearize, then rescale in float mode.
    fn renormalize(&self, ct: Ciphertext, rlk: &RelinKeys) -> Result<Ciphertext> {
        let ct = self.evaluator.relinearize(&ct, rlk)?;
        match self.mode {
            Mode::Float { .. } => {
                let rescaled = self.evaluator.rescale_to_next(&ct)?;
                trace!(
                    "rescaled level {} -> {}, scale 2^{:.3}",
                    ct.level(),
                    rescaled.level(),
                    rescaled.scale().log2()
                );
                Ok(rescaled)
            }
            Mode::Integer { .. } => Ok(ct),
        }
    }

    fn mul_ct(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        let rlk = self.relin_keys()?;
        let product = match self.mode {
            Mode::Float { .. } if a.level() != b.level() => {
                let (a, b) = self.align_levels(a, b)?;
                self.evaluator.multiply(&a, &b)?
            }
            _ => self.evaluator.multiply(a, b)?,
        };
        self.renormalize(product, rlk)
    }

    fn square_ct(&self, ct: &Ciphertext) -> Result<Ciphertext> {
        let rlk = self.relin_keys()?;
        let squared = self.evaluator.square(ct)?;
        self.renormalize(squared, rlk)
    }

    /// Float mode: both operands at the default scale and on one level.
    /// Integer ciphertexts are returned as they are.
    fn normalize_pair(&self, a: &Ciphertext, b: &Ciphertext) -> Result<(Ciphertext, Ciphertext)> {
        match self.mode {
            Mode::Float { .. } => self.align_levels(&self.normalize_scale(a), &self.normalize_scale(b)),
            Mode::Integer { .. } => Ok((a.clone(), b.clone())),
        }
    }

    fn normalize_scale(&self, ct: &Ciphertext) -> Ciphertext {
        let mut ct = ct.clone();
        if let Mode::Float { default_scale } = self.mode {
            if ct.scale() != default_scale {
                trace!("scale 2^{:.6} snapped to 2^{:.1}", ct.scale().log2(), default_scale.log2());
                ct.set_scale(default_scale);
            }
        }
        ct
    }

    /// Switch `b` down to `a`'s level; if `b` is already lower, switch `a`
    /// down to `b`'s level instead.
    fn align_levels(&self, a: &Ciphertext, b: &Ciphertext) -> Result<(Ciphertext, Ciphertext)> {
        match self.evaluator.mod_switch_to(b, a.level()) {
            Ok(b) => Ok((a.clone(), b)),
            Err(EncnumError::InvalidModSwitch { .. }) => {
                debug!("level fallback: switching left operand {} -> {}", a.level(), b.level());
                Ok((self.evaluator.mod_switch_to(a, b.level())?, b.clone()))
            }
            Err(e) => Err(e),
        }
    }
}

/// Multiply neighbours pairwise, carrying an odd last item into the next
/// round, until one item is left. Pairs within a round run in parallel.
fn tree_reduce<T, F>(mut layer: Vec<T>, combine: F) -> Result<Option<T>>
where
    T: Clone + Send + Sync,
    F: Fn(&T, &T) -> Result<T> + Sync,
{
    while layer.len() > 1 {
        layer = layer
            .par_chunks(2)
            .map(|pair| match pair {
                [a, b] => combine(a, b),
                [a] => Ok(a.clone()),
                _ => unreachable!("chunks of two"),
            })
            .collect::<Result<Vec<_>>>()?;
    }
    Ok(layer.pop())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::mode::ModeKind;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn keyed(config: SessionConfig, seed: u64) -> (Session, ChaCha20Rng) {
        let mut session = Session::new(config).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let keys = session.generate_keypair_with_rng(&mut rng).unwrap();
        session.install(keys).unwrap();
        (session, rng)
    }

    fn int_session(seed: u64) -> (Session, ChaCha20Rng) {
        let config = SessionConfig::builder().mode(ModeKind::Int).max_int(1000).poly_modulus_degree(8192).build().unwrap();
        keyed(config, seed)
    }

    fn float_session(n: usize, seed: u64) -> (Session, ChaCha20Rng) {
        keyed(SessionConfig::builder().poly_modulus_degree(n).build().unwrap(), seed)
    }

    fn float(session: &Session, v: &EncryptedValue) -> f64 {
        session.decrypt(v).unwrap().as_f64()
    }

    #[test]
    fn test_tree_reduce_depth() {
        // (value, depth) pairs; the depth of a product is one more than its deeper factor.
        let items: Vec<(u64, u32)> = (1..=5).map(|i| (i, 0)).collect();
        let (value, depth) = tree_reduce(items, |a, b| Ok((a.0 * b.0, a.1.max(b.1) + 1))).unwrap().unwrap();
        assert_eq!(value, 120);
        assert_eq!(depth, 3);

        assert!(tree_reduce(Vec::<(u64, u32)>::new(), |a, _| Ok(*a)).unwrap().is_none());
        assert_eq!(tree_reduce(vec![(7u64, 0u32)], |a, _| Ok(*a)).unwrap(), Some((7, 0)));
    }

    #[test]
    fn test_integer_plain_operands() {
        let (s, mut rng) = int_session(1);
        let x = s.encrypt_with_rng(12, &mut rng).unwrap();
        assert_eq!(s.decrypt(&s.add(&x, -20).unwrap()).unwrap(), Scalar::Int(-8));
        assert_eq!(s.decrypt(&s.sub(&x, 2).unwrap()).unwrap(), Scalar::Int(10));
        assert_eq!(s.decrypt(&s.mul(&x, -3).unwrap()).unwrap(), Scalar::Int(-36));
        assert_eq!(s.decrypt(&s.rsub(100, &x).unwrap()).unwrap(), Scalar::Int(88));
        assert_eq!(s.decrypt(&s.radd(5, &x).unwrap()).unwrap(), Scalar::Int(17));
        assert_eq!(s.decrypt(&s.rmul(2, &x).unwrap()).unwrap(), Scalar::Int(24));
        assert_eq!(s.decrypt(&s.neg(&x).unwrap()).unwrap(), Scalar::Int(-12));
    }

    #[test]
    fn test_integer_pow_small_exponents() {
        let (s, mut rng) = int_session(2);
        let x = s.encrypt_with_rng(-2, &mut rng).unwrap();
        for (k, expected) in [(0i64, 1i64), (1, -2), (2, 4), (3, -8), (6, 64)] {
            assert_eq!(s.decrypt(&s.pow(&x, k).unwrap()).unwrap(), Scalar::Int(expected), "k = {k}");
        }
    }

    #[test]
    fn test_exponent_validation() {
        let (s, mut rng) = int_session(3);
        let x = s.encrypt_with_rng(2, &mut rng).unwrap();
        let msg = |r: Result<EncryptedValue>| match r {
            Err(EncnumError::Unsupported(m)) => m,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(msg(s.pow(&x, -1)), "only non-negative integer exponents supported");
        assert_eq!(msg(s.pow(&x, 2.0)), "only non-negative integer exponents supported");

        let (f, mut rng) = float_session(2048, 3);
        let y = f.encrypt_with_rng(2.0, &mut rng).unwrap();
        assert_eq!(msg(f.pow(&y, 0.5)), "fractional powers not supported");
        assert_eq!(msg(f.pow(&y, -2.0)), "only non-negative integer exponents supported");
        assert_eq!(msg(f.pow(&y, -1)), "only non-negative integer exponents supported");
    }

    #[test]
    fn test_division_rules() {
        let (s, mut rng) = int_session(4);
        let x = s.encrypt_with_rng(8, &mut rng).unwrap();
        assert!(matches!(s.div(&x, 2), Err(EncnumError::Unsupported(_))));

        let (f, mut rng) = float_session(2048, 4);
        let y = f.encrypt_with_rng(10.0, &mut rng).unwrap();
        assert!(matches!(f.div(&y, &y), Err(EncnumError::Unsupported(_))));
        assert!(matches!(f.div(&y, 0.0), Err(EncnumError::Unsupported(_))));
        assert!((float(&f, &f.div(&y, 4.0).unwrap()) - 2.5).abs() < 1e-3);
    }

    #[test]
    fn test_float_level_fallback() {
        let (f, mut rng) = float_session(4096, 5);
        let x = f.encrypt_with_rng(1.5, &mut rng).unwrap();
        let y = f.encrypt_with_rng(2.0, &mut rng).unwrap();
        let xy = f.mul(&x, &y).unwrap();
        assert_eq!(xy.ciphertext().level(), 1);

        // Right operand deeper: the left one is switched down to it.
        let a = f.add(&x, &xy).unwrap();
        assert_eq!(a.ciphertext().level(), 1);
        assert!((float(&f, &a) - 4.5).abs() < 1e-3);

        // Left operand deeper: the right one is switched down.
        let b = f.sub(&xy, &y).unwrap();
        assert_eq!(b.ciphertext().level(), 1);
        assert!((float(&f, &b) - 1.0).abs() < 1e-3);

        // Products of factors on different levels.
        let c = f.mul(&x, &xy).unwrap();
        assert_eq!(c.ciphertext().level(), 2);
        assert!((float(&f, &c) - 4.5).abs() < 1e-3);
    }

    #[test]
    fn test_multiplication_needs_relin_key() {
        let (mut s, mut rng) = int_session(6);
        let x = s.encrypt_with_rng(3, &mut rng).unwrap();
        s.set_relinearization_key(None).unwrap();
        let missing = |r: Result<EncryptedValue>| matches!(r, Err(EncnumError::KeyNotSet(KeyClass::Relinearization)));
        assert!(missing(s.mul(&x, &x)));
        assert!(missing(s.mul(&x, 2)));
        assert!(missing(s.square(&x)));
        assert!(missing(s.pow(&x, 3)));
        assert!(missing(s.product(&[x.clone(), x.clone()])));
        // Additive operations do not need it.
        assert_eq!(s.decrypt(&s.add(&x, &x).unwrap()).unwrap(), Scalar::Int(6));
    }

    #[test]
    fn test_sum_and_product() {
        let (s, mut rng) = int_session(7);
        let values: Vec<_> = [3i64, -1, 4, -1, 5].iter().map(|&v| s.encrypt_with_rng(v, &mut rng).unwrap()).collect();
        assert_eq!(s.decrypt(&s.sum(&values).unwrap()).unwrap(), Scalar::Int(10));
        assert_eq!(s.decrypt(&s.product(&values).unwrap()).unwrap(), Scalar::Int(60));
        assert_eq!(s.decrypt(&s.sum(&[]).unwrap()).unwrap(), Scalar::Int(0));
        assert_eq!(s.decrypt(&s.product(&[]).unwrap()).unwrap(), Scalar::Int(1));
    }

    #[test]
    fn test_stale_values_are_refused() {
        let (mut s, mut rng) = int_session(8);
        let x = s.encrypt_with_rng(3, &mut rng).unwrap();
        s.initialize("int", 1000, 8192).unwrap();
        let keys = s.generate_keypair_with_rng(&mut rng).unwrap();
        s.install(keys).unwrap();
        let y = s.encrypt_with_rng(1, &mut rng).unwrap();
        assert!(matches!(s.add(&y, &x), Err(EncnumError::ContextMismatch)));
        assert!(matches!(s.add(&x, &y), Err(EncnumError::ContextMismatch)));
        assert!(matches!(s.decrypt(&x), Err(EncnumError::ContextMismatch)));
    }
}
