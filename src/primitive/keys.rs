use std::sync::Arc;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use zeroize::Zeroize;

use crate::error::Result;
use crate::params::ParmsId;
use crate::primitive::context::Context;
use crate::ring::modular::mod_pow;
use crate::ring::rns::RnsPoly;
use crate::sampling::{sample_gaussian_vec, sample_ternary_vec};

/// Width of one relinearization digit.
pub const RELIN_DIGIT_BITS: u32 = 16;

/// Secret key s: ternary polynomial in NTT form over the full key basis.
#[derive(Clone)]
pub struct SecretKey {
    pub(crate) poly: RnsPoly,
    pub(crate) parms_id: ParmsId,
}

impl SecretKey {
    pub fn parms_id(&self) -> ParmsId {
        self.parms_id
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        for comp in &mut self.poly.components {
            comp.evals.zeroize();
        }
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretKey").field("parms_id", &self.parms_id).finish_non_exhaustive()
    }
}

/// Public key (p0, p1) = (-(a·s + e), a).
#[derive(Clone, Debug)]
pub struct PublicKey {
    pub(crate) p0: RnsPoly,
    pub(crate) p1: RnsPoly,
    pub(crate) parms_id: ParmsId,
}

impl PublicKey {
    pub fn parms_id(&self) -> ParmsId {
        self.parms_id
    }
}

/// Relinearization keys, one row per prime q_i of the key basis and one
/// entry per 16-bit digit of a residue modulo q_i.
///
/// Entry (i, j) encrypts `s² · g_i · 2^{16j}` where `g_i` is the CRT basis
/// element that is 1 modulo q_i and 0 modulo every other prime. Because `g_i`
/// keeps that property modulo any prefix of the primes, the same keys serve
/// every level once their limbs are truncated.
#[derive(Clone, Debug)]
pub struct RelinKeys {
    pub(crate) keys: Vec<Vec<(RnsPoly, RnsPoly)>>,
    pub(crate) parms_id: ParmsId,
}

impl RelinKeys {
    pub fn parms_id(&self) -> ParmsId {
        self.parms_id
    }

    /// Total number of key-switching pairs.
    pub fn len(&self) -> usize {
        self.keys.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Number of relinearization digits needed for residues modulo `q`.
pub fn digit_count(q: u64) -> usize {
    (64 - q.leading_zeros()).div_ceil(RELIN_DIGIT_BITS) as usize
}

/// Generates a secret key and derives public and relinearization keys from it.
pub struct KeyGenerator {
    context: Arc<Context>,
    secret_key: SecretKey,
}

impl KeyGenerator {
    pub fn new(context: &Arc<Context>) -> Result<Self> {
        let mut rng = ChaCha20Rng::from_os_rng();
        Self::with_rng(context, &mut rng)
    }

    /// Sample the secret key from `rng` (for deterministic testing).
    pub fn with_rng<R: Rng>(context: &Arc<Context>, rng: &mut R) -> Result<Self> {
        let basis = context.key_basis();
        let mut s = sample_ternary_vec(basis.ring_degree, rng);
        let poly = RnsPoly::from_signed(&s, basis)?;
        s.zeroize();
        Ok(Self {
            context: context.clone(),
            secret_key: SecretKey { poly, parms_id: context.parms_id() },
        })
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }

    pub fn create_public_key(&self) -> Result<PublicKey> {
        let mut rng = ChaCha20Rng::from_os_rng();
        self.create_public_key_with_rng(&mut rng)
    }

    pub fn create_public_key_with_rng<R: Rng>(&self, rng: &mut R) -> Result<PublicKey> {
        let (p0, p1) = self.rlwe_sample(rng)?;
        Ok(PublicKey { p0, p1, parms_id: self.context.parms_id() })
    }

    pub fn create_relin_keys(&self) -> Result<RelinKeys> {
        let mut rng = ChaCha20Rng::from_os_rng();
        self.create_relin_keys_with_rng(&mut rng)
    }

    pub fn create_relin_keys_with_rng<R: Rng>(&self, rng: &mut R) -> Result<RelinKeys> {
        let basis = self.context.key_basis();
        let s = &self.secret_key.poly;
        let s_sq = s.mul(s)?;
        let k = basis.num_moduli();

        let mut keys = Vec::with_capacity(k);
        for i in 0..k {
            let qi = basis.moduli[i];
            let mut row = Vec::with_capacity(digit_count(qi));
            for j in 0..digit_count(qi) {
                // g_i · 2^{16j} is 2^{16j} mod q_i and 0 elsewhere.
                let factors: Vec<u64> = basis
                    .moduli
                    .iter()
                    .enumerate()
                    .map(|(l, &q)| if l == i { mod_pow(2, RELIN_DIGIT_BITS as u64 * j as u64, q) } else { 0 })
                    .collect();
                let target = s_sq.scalar_mul_rns(&factors)?;
                let (b, a) = self.rlwe_sample(rng)?;
                row.push((b.add(&target)?, a));
            }
            keys.push(row);
        }

        Ok(RelinKeys { keys, parms_id: self.context.parms_id() })
    }

    /// Fresh RLWE pair (-(a·s + e), a).
    fn rlwe_sample<R: Rng>(&self, rng: &mut R) -> Result<(RnsPoly, RnsPoly)> {
        let basis = self.context.key_basis();
        let a = RnsPoly::sample_uniform(basis, rng)?;
        let e = sample_gaussian_vec(basis.ring_degree, self.context.parms().sigma, rng);
        let e = RnsPoly::from_signed(&e, basis)?;
        let b = a.mul(&self.secret_key.poly)?.add(&e)?.neg();
        Ok((b, a))
    }
}
