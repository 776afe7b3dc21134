//! Byte-level persistence of ciphertexts and keys.
//!
//! Polynomials are stored in NTT form, one vector of residues per prime.
//! Loading re-attaches the context's NTT plans, so every record is tied to
//! the parameter set it was produced under and refused by any other.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use serde::{Deserialize, Serialize};

use crate::error::{EncnumError, Result};
use crate::params::{ParmsId, SchemeType};
use crate::primitive::ciphertext::Ciphertext;
use crate::primitive::context::Context;
use crate::primitive::keys::{digit_count, PublicKey, RelinKeys, SecretKey};
use crate::ring::ntt::NttPoly;
use crate::ring::rns::{RnsBasis, RnsPoly};

/// Types that can be written to and read back from bytes.
pub trait Serializable: Sized {
    fn to_bytes(&self) -> Result<Vec<u8>>;

    fn from_bytes(context: &Arc<Context>, bytes: &[u8]) -> Result<Self>;

    fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    fn load(context: &Arc<Context>, path: impl AsRef<Path>) -> Result<Self> {
        Self::from_bytes(context, &fs::read(path)?)
    }
}

#[derive(Serialize, Deserialize)]
struct PolyRecord {
    limbs: Vec<Vec<u64>>,
}

impl PolyRecord {
    fn from_poly(poly: &RnsPoly) -> Self {
        Self { limbs: poly.components.iter().map(|c| c.evals.clone()).collect() }
    }

    fn into_poly(self, basis: &RnsBasis) -> Result<RnsPoly> {
        if self.limbs.len() != basis.num_moduli() {
            return Err(EncnumError::DimensionMismatch { expected: basis.num_moduli(), got: self.limbs.len() });
        }
        let components = self
            .limbs
            .into_iter()
            .zip(basis.moduli.iter().zip(&basis.plans))
            .map(|(evals, (&q, plan))| {
                if evals.len() != basis.ring_degree {
                    return Err(EncnumError::DimensionMismatch { expected: basis.ring_degree, got: evals.len() });
                }
                if evals.iter().any(|&e| e >= q) {
                    return Err(EncnumError::Decoding(format!("residue out of range for modulus {q}")));
                }
                Ok(NttPoly { evals, modulus: q, plan: plan.clone() })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(RnsPoly { components, ring_degree: basis.ring_degree })
    }
}

#[derive(Serialize, Deserialize)]
struct CiphertextRecord {
    parms_id: ParmsId,
    scheme: SchemeType,
    level: usize,
    scale: f64,
    polys: Vec<PolyRecord>,
}

#[derive(Serialize, Deserialize)]
struct PublicKeyRecord {
    parms_id: ParmsId,
    p0: PolyRecord,
    p1: PolyRecord,
}

#[derive(Serialize, Deserialize)]
struct SecretKeyRecord {
    parms_id: ParmsId,
    s: PolyRecord,
}

#[derive(Serialize, Deserialize)]
struct RelinKeysRecord {
    parms_id: ParmsId,
    rows: Vec<Vec<(PolyRecord, PolyRecord)>>,
}

impl Serializable for Ciphertext {
    fn to_bytes(&self) -> Result<Vec<u8>> {
        let record = CiphertextRecord {
            parms_id: self.parms_id,
            scheme: self.scheme,
            level: self.level,
            scale: self.scale,
            polys: self.c.iter().map(PolyRecord::from_poly).collect(),
        };
        Ok(bincode::serialize(&record)?)
    }

    fn from_bytes(context: &Arc<Context>, bytes: &[u8]) -> Result<Self> {
        let record: CiphertextRecord = bincode::deserialize(bytes)?;
        context.check_parms_id(record.parms_id)?;
        if record.polys.len() < 2 {
            return Err(EncnumError::Decoding("ciphertext needs at least two components".into()));
        }
        if !(record.scale.is_finite() && record.scale > 0.0) {
            return Err(EncnumError::Decoding(format!("invalid ciphertext scale {}", record.scale)));
        }
        let basis = context.basis_at(record.level)?;
        let c = record
            .polys
            .into_iter()
            .map(|p| p.into_poly(basis))
            .collect::<Result<Vec<_>>>()?;
        Ok(Ciphertext {
            c,
            level: record.level,
            scale: record.scale,
            parms_id: record.parms_id,
            scheme: context.scheme(),
        })
    }
}

impl Serializable for PublicKey {
    fn to_bytes(&self) -> Result<Vec<u8>> {
        let record = PublicKeyRecord {
            parms_id: self.parms_id,
            p0: PolyRecord::from_poly(&self.p0),
            p1: PolyRecord::from_poly(&self.p1),
        };
        Ok(bincode::serialize(&record)?)
    }

    fn from_bytes(context: &Arc<Context>, bytes: &[u8]) -> Result<Self> {
        let record: PublicKeyRecord = bincode::deserialize(bytes)?;
        context.check_parms_id(record.parms_id)?;
        let basis = context.key_basis();
        Ok(PublicKey {
            p0: record.p0.into_poly(basis)?,
            p1: record.p1.into_poly(basis)?,
            parms_id: record.parms_id,
        })
    }
}

impl Serializable for SecretKey {
    fn to_bytes(&self) -> Result<Vec<u8>> {
        let record = SecretKeyRecord { parms_id: self.parms_id, s: PolyRecord::from_poly(&self.poly) };
        Ok(bincode::serialize(&record)?)
    }

    fn from_bytes(context: &Arc<Context>, bytes: &[u8]) -> Result<Self> {
        let record: SecretKeyRecord = bincode::deserialize(bytes)?;
        context.check_parms_id(record.parms_id)?;
        Ok(SecretKey { poly: record.s.into_poly(context.key_basis())?, parms_id: record.parms_id })
    }
}

impl Serializable for RelinKeys {
    fn to_bytes(&self) -> Result<Vec<u8>> {
        let rows = self
            .keys
            .iter()
            .map(|row| row.iter().map(|(a, b)| (PolyRecord::from_poly(a), PolyRecord::from_poly(b))).collect())
            .collect();
        Ok(bincode::serialize(&RelinKeysRecord { parms_id: self.parms_id, rows })?)
    }

    fn from_bytes(context: &Arc<Context>, bytes: &[u8]) -> Result<Self> {
        let record: RelinKeysRecord = bincode::deserialize(bytes)?;
        context.check_parms_id(record.parms_id)?;
        let basis = context.key_basis();
        if record.rows.len() != basis.num_moduli() {
            return Err(EncnumError::DimensionMismatch { expected: basis.num_moduli(), got: record.rows.len() });
        }
        let keys = record
            .rows
            .into_iter()
            .zip(&basis.moduli)
            .map(|(row, &q)| {
                if row.len() != digit_count(q) {
                    return Err(EncnumError::DimensionMismatch { expected: digit_count(q), got: row.len() });
                }
                row.into_iter()
                    .map(|(a, b)| Ok((a.into_poly(basis)?, b.into_poly(basis)?)))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(RelinKeys { keys, parms_id: record.parms_id })
    }
}
