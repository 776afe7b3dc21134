use crate::params::{ParmsId, SchemeType};
use crate::ring::rns::RnsPoly;

/// Ciphertext (c_0, ..., c_k), each component over the basis of its level.
///
/// A fresh or relinearized ciphertext has two components; a product has
/// three until it is relinearized.
#[derive(Clone, Debug)]
pub struct Ciphertext {
    pub(crate) c: Vec<RnsPoly>,
    pub(crate) level: usize,
    pub(crate) scale: f64,
    pub(crate) parms_id: ParmsId,
    pub(crate) scheme: SchemeType,
}

impl Ciphertext {
    /// Number of polynomial components.
    pub fn size(&self) -> usize {
        self.c.len()
    }

    /// Rescales or modulus switches applied so far.
    pub fn level(&self) -> usize {
        self.level
    }

    /// Fixed-point scale (CKKS). BFV ciphertexts report 1.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Overwrite the recorded scale without touching the data.
    ///
    /// The decrypted value is then interpreted at the new scale; callers use
    /// this to snap a scale that drifted by a rescale back to the default.
    pub fn set_scale(&mut self, scale: f64) {
        self.scale = scale;
    }

    pub fn parms_id(&self) -> ParmsId {
        self.parms_id
    }

    pub fn scheme(&self) -> SchemeType {
        self.scheme
    }
}
