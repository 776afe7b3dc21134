//! The homomorphic-encryption primitives the orchestration layer is built on.
//!
//! Two schemes share one set of types: exact integer arithmetic modulo a
//! plain modulus (BFV) and approximate fixed-point arithmetic (CKKS).

pub mod ciphertext;
pub mod context;
pub mod encoder;
pub mod encryptor;
pub mod evaluator;
pub mod keys;
pub mod plaintext;
pub mod serialize;

pub use ciphertext::Ciphertext;
pub use context::Context;
pub use encoder::CkksEncoder;
pub use encryptor::{Decryptor, Encryptor};
pub use evaluator::Evaluator;
pub use keys::{KeyGenerator, PublicKey, RelinKeys, SecretKey};
pub use plaintext::Plaintext;
pub use serialize::Serializable;
