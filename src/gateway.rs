//! Key-checked encryption and decryption.

use log::warn;
use rand::Rng;

use crate::codec::Scalar;
use crate::error::{EncnumError, Result};
use crate::keys::KeyClass;
use crate::mode::Mode;
use crate::primitive::{Decryptor, Encryptor};
use crate::session::Session;
use crate::value::EncryptedValue;

/// Budget at or below which a successful decrypt logs a warning.
const LOW_BUDGET_BITS: u32 = 5;

impl Session {
    fn encryptor(&self) -> Result<&Encryptor> {
        self.encryptor.as_ref().ok_or(EncnumError::KeyNotSet(KeyClass::Public))
    }

    fn decryptor(&self) -> Result<&Decryptor> {
        self.decryptor.as_ref().ok_or(EncnumError::KeyNotSet(KeyClass::Private))
    }

    pub fn encrypt(&self, value: impl Into<Scalar>) -> Result<EncryptedValue> {
        let encryptor = self.encryptor()?;
        let plaintext = self.encode(value)?;
        Ok(self.wrap(encryptor.encrypt(&plaintext)?))
    }

    pub fn encrypt_with_rng<R: Rng>(&self, value: impl Into<Scalar>, rng: &mut R) -> Result<EncryptedValue> {
        let encryptor = self.encryptor()?;
        let plaintext = self.encode(value)?;
        Ok(self.wrap(encryptor.encrypt_with_rng(&plaintext, rng)?))
    }

    /// Decrypt and decode. In integer mode a ciphertext whose noise budget is
    /// spent fails with [`EncnumError::NoiseBudgetExhausted`] instead of
    /// returning garbage.
    pub fn decrypt(&self, value: &EncryptedValue) -> Result<Scalar> {
        let decryptor = self.decryptor()?;
        self.check_value(value)?;
        if let Mode::Integer { .. } = self.mode {
            match decryptor.invariant_noise_budget(&value.ciphertext)? {
                0 => return Err(EncnumError::NoiseBudgetExhausted),
                bits if bits <= LOW_BUDGET_BITS => warn!("only {bits} bits of noise budget left"),
                _ => {}
            }
        }
        let plaintext = decryptor.decrypt(&value.ciphertext)?;
        self.decode(&plaintext)
    }

    /// Remaining noise budget in bits (integer mode only).
    pub fn noise_budget(&self, value: &EncryptedValue) -> Result<u32> {
        let decryptor = self.decryptor()?;
        self.check_value(value)?;
        match self.mode {
            Mode::Integer { .. } => decryptor.invariant_noise_budget(&value.ciphertext),
            Mode::Float { .. } => Err(EncnumError::Unsupported("noise budget is only tracked in integer mode".into())),
        }
    }
}
