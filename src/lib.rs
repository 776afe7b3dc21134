//! # encnum: arithmetic on encrypted numbers
//!
//! A [`Session`](session::Session) holds one encryption context in either
//! exact integer mode (BFV) or approximate float mode (CKKS) together with
//! its keys. Values encrypted through it can be added, subtracted,
//! multiplied, divided by plain scalars and raised to integer powers; the
//! session keeps scales and modulus levels aligned and relinearizes and
//! rescales after every multiplication.
//!
//! ## Quick Start
//!
//! ```no_run
//! use encnum::prelude::*;
//!
//! let config = SessionConfig::builder().mode(ModeKind::Int).max_int(1000).build().unwrap();
//! let mut session = Session::new(config).unwrap();
//! let keys = session.generate_keypair().unwrap();
//! session.install(keys).unwrap();
//!
//! let a = session.encrypt(7).unwrap();
//! let b = session.encrypt(-3).unwrap();
//! let product = session.mul(&a, &b).unwrap();
//! assert_eq!(session.decrypt(&product).unwrap(), Scalar::Int(-21));
//!
//! let cube = session.pow(&a, 3).unwrap();
//! assert_eq!(session.decrypt(&cube).unwrap(), Scalar::Int(343));
//! ```

pub mod error;
pub mod params;
pub mod ring;
pub mod sampling;
pub mod primitive;
pub mod mode;
pub mod config;
pub mod keys;
pub mod session;
pub mod codec;
pub mod gateway;
pub mod value;
pub mod engine;

/// Convenient re-exports for common types.
pub mod prelude {
    pub use crate::codec::Scalar;
    pub use crate::config::{SessionConfig, SessionConfigBuilder};
    pub use crate::error::{EncnumError, Result};
    pub use crate::keys::{Key, KeyClass, KeySet};
    pub use crate::mode::{Mode, ModeKind, DEFAULT_SCALE};
    pub use crate::primitive::{Ciphertext, Plaintext, PublicKey, RelinKeys, SecretKey, Serializable};
    pub use crate::session::{ConfigReport, Session};
    pub use crate::value::{EncryptedValue, Operand};
}
