use std::sync::Arc;
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};

use crate::error::{EncnumError, Result};
use crate::params::{CoeffModulus, EncryptionParameters, ParmsId, SchemeType};
use crate::ring::rns::RnsBasis;

/// Precomputed state for one parameter set.
///
/// `levels[l]` is the RNS basis of a ciphertext at level `l`: level 0 holds
/// every prime, each rescale drops the last remaining one. BFV has a single
/// level.
#[derive(Debug)]
pub struct Context {
    parms: Arc<EncryptionParameters>,
    parms_id: ParmsId,
    levels: Vec<RnsBasis>,
    bfv: Option<BfvTables>,
}

/// Constants for exact BFV arithmetic.
#[derive(Debug)]
pub(crate) struct BfvTables {
    pub plain_modulus: u64,
    /// ⌊Q/t⌋ modulo each q_i.
    pub delta: Vec<u64>,
    /// Q ∪ P, wide enough to hold a tensor product without wrapping.
    pub extended: RnsBasis,
}

impl Context {
    pub fn new(parms: Arc<EncryptionParameters>) -> Result<Arc<Self>> {
        let n = parms.poly_modulus_degree;
        let top = RnsBasis::new(parms.coeff_modulus.clone(), n)?;

        let (levels, bfv) = match parms.scheme {
            SchemeType::Bfv => {
                let t = parms
                    .plain_modulus
                    .ok_or_else(|| EncnumError::InvalidParam("BFV requires a plaintext modulus".into()))?;
                let delta_big = &top.product / BigUint::from(t);
                if delta_big.is_zero() {
                    return Err(EncnumError::InvalidParam(
                        "coefficient modulus must exceed the plaintext modulus".into(),
                    ));
                }
                let delta = top
                    .moduli
                    .iter()
                    .map(|&q| {
                        (&delta_big % q)
                            .to_u64()
                            .ok_or_else(|| EncnumError::InvalidParam("failed to reduce Δ modulo q_i".into()))
                    })
                    .collect::<Result<Vec<_>>>()?;
                let aux = CoeffModulus::auxiliary(n, top.bit_count(), &top.moduli)?;
                let extended = top.extend(&RnsBasis::new(aux, n)?)?;
                (vec![top], Some(BfvTables { plain_modulus: t, delta, extended }))
            }
            SchemeType::Ckks => {
                let levels = (1..=top.num_moduli())
                    .rev()
                    .map(|len| top.prefix(len))
                    .collect::<Result<Vec<_>>>()?;
                (levels, None)
            }
        };

        Ok(Arc::new(Self { parms_id: parms.parms_id(), parms, levels, bfv }))
    }

    pub fn parms(&self) -> &EncryptionParameters {
        &self.parms
    }

    pub fn parms_id(&self) -> ParmsId {
        self.parms_id
    }

    pub fn scheme(&self) -> SchemeType {
        self.parms.scheme
    }

    pub fn poly_modulus_degree(&self) -> usize {
        self.parms.poly_modulus_degree
    }

    /// Plaintext modulus t (BFV only).
    pub fn plain_modulus(&self) -> Option<u64> {
        self.parms.plain_modulus
    }

    /// Deepest level a ciphertext can reach.
    pub fn max_level(&self) -> usize {
        self.levels.len() - 1
    }

    pub fn basis_at(&self, level: usize) -> Result<&RnsBasis> {
        self.levels.get(level).ok_or(EncnumError::InvalidModSwitch { from: 0, to: level })
    }

    /// Basis holding every prime, the one keys live in.
    pub fn key_basis(&self) -> &RnsBasis {
        &self.levels[0]
    }

    /// Total bit length of the coefficient modulus.
    pub fn total_coeff_modulus_bit_count(&self) -> u64 {
        self.key_basis().bit_count()
    }

    pub(crate) fn bfv_tables(&self) -> Result<&BfvTables> {
        self.bfv
            .as_ref()
            .ok_or_else(|| EncnumError::Unsupported("operation requires the BFV scheme".into()))
    }

    pub(crate) fn check_parms_id(&self, parms_id: ParmsId) -> Result<()> {
        if parms_id != self.parms_id {
            return Err(EncnumError::ContextMismatch);
        }
        Ok(())
    }
}
