//! Key classes and the bundle returned by key generation.

use std::fmt;
use std::path::Path;

use crate::error::Result;
use crate::primitive::{PublicKey, RelinKeys, SecretKey, Serializable};

/// File names used by [`KeySet::save`].
pub const PUBLIC_KEY_FILE: &str = "public.key";
pub const PRIVATE_KEY_FILE: &str = "private.key";
pub const RELIN_KEY_FILE: &str = "relin.key";

/// The three key slots of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeyClass {
    Public,
    Private,
    Relinearization,
}

impl fmt::Display for KeyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyClass::Public => write!(f, "public"),
            KeyClass::Private => write!(f, "private"),
            KeyClass::Relinearization => write!(f, "relinearization"),
        }
    }
}

/// A key of any class, for the slot setters that check the class at run time.
#[derive(Clone, Debug)]
pub enum Key {
    Public(PublicKey),
    Private(SecretKey),
    Relinearization(RelinKeys),
}

impl Key {
    pub fn class(&self) -> KeyClass {
        match self {
            Key::Public(_) => KeyClass::Public,
            Key::Private(_) => KeyClass::Private,
            Key::Relinearization(_) => KeyClass::Relinearization,
        }
    }
}

impl From<PublicKey> for Key {
    fn from(key: PublicKey) -> Self {
        Key::Public(key)
    }
}

impl From<SecretKey> for Key {
    fn from(key: SecretKey) -> Self {
        Key::Private(key)
    }
}

impl From<RelinKeys> for Key {
    fn from(key: RelinKeys) -> Self {
        Key::Relinearization(key)
    }
}

/// Freshly generated keys for one context.
#[derive(Clone, Debug)]
pub struct KeySet {
    pub public: PublicKey,
    pub private: SecretKey,
    pub relinearization: RelinKeys,
}

impl KeySet {
    /// Write the three keys into `dir` as `public.key`, `private.key` and `relin.key`.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        self.public.save(dir.join(PUBLIC_KEY_FILE))?;
        self.private.save(dir.join(PRIVATE_KEY_FILE))?;
        self.relinearization.save(dir.join(RELIN_KEY_FILE))?;
        Ok(())
    }
}
