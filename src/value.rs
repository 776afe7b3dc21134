//! The opaque encrypted number.

use std::fmt;
use std::path::Path;

use crate::codec::Scalar;
use crate::error::{EncnumError, Result};
use crate::mode::ModeKind;
use crate::primitive::{Ciphertext, Serializable};
use crate::session::Session;

/// One ciphertext plus the mode and context generation it was produced under.
///
/// Not comparable. The formatters only reveal the mode.
#[derive(Clone)]
pub struct EncryptedValue {
    pub(crate) ciphertext: Ciphertext,
    pub(crate) kind: ModeKind,
    pub(crate) generation: u64,
}

impl EncryptedValue {
    pub fn mode(&self) -> ModeKind {
        self.kind
    }

    pub fn ciphertext(&self) -> &Ciphertext {
        &self.ciphertext
    }

    /// Write the ciphertext bytes to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.ciphertext.save(path)
    }
}

impl fmt::Display for EncryptedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<encrypted {}>", self.kind)
    }
}

impl fmt::Debug for EncryptedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Right-hand side of a binary operation.
#[derive(Clone, Copy, Debug)]
pub enum Operand<'a> {
    Encrypted(&'a EncryptedValue),
    Plain(Scalar),
}

impl<'a> From<&'a EncryptedValue> for Operand<'a> {
    fn from(v: &'a EncryptedValue) -> Self {
        Operand::Encrypted(v)
    }
}

impl From<Scalar> for Operand<'_> {
    fn from(v: Scalar) -> Self {
        Operand::Plain(v)
    }
}

impl From<i64> for Operand<'_> {
    fn from(v: i64) -> Self {
        Operand::Plain(v.into())
    }
}

impl From<i32> for Operand<'_> {
    fn from(v: i32) -> Self {
        Operand::Plain(v.into())
    }
}

impl From<f64> for Operand<'_> {
    fn from(v: f64) -> Self {
        Operand::Plain(v.into())
    }
}

impl Session {
    /// Wrap a ciphertext under the current context.
    pub(crate) fn wrap(&self, ciphertext: Ciphertext) -> EncryptedValue {
        EncryptedValue { ciphertext, kind: self.mode.kind(), generation: self.generation }
    }

    /// Refuse values created before the last `initialize`.
    pub(crate) fn check_value(&self, value: &EncryptedValue) -> Result<()> {
        if value.generation != self.generation {
            return Err(EncnumError::ContextMismatch);
        }
        Ok(())
    }

    /// Read a ciphertext saved under the current parameters.
    pub fn load_encrypted_value(&self, path: impl AsRef<Path>) -> Result<EncryptedValue> {
        let ciphertext = Ciphertext::load(&self.context, path)?;
        Ok(self.wrap(ciphertext))
    }
}
