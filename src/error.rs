use thiserror::Error;

use crate::keys::KeyClass;

#[derive(Debug, Error)]
pub enum EncnumError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("key type error: expected a {slot} key, got a {found} key")]
    KeyType { slot: KeyClass, found: KeyClass },

    #[error("{slot} key was generated under a different encryption context")]
    KeyContextMismatch { slot: KeyClass },

    #[error("{0} key has not been set")]
    KeyNotSet(KeyClass),

    #[error("integer {value} is too large to be represented (range {min}..={max}); try increasing `max_int`")]
    Range { value: i64, min: i64, max: i64 },

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error(
        "noise budget exhausted: increase `poly_modulus_degree` or decrease `max_int` during initialization"
    )]
    NoiseBudgetExhausted,

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("encrypted value belongs to a previous encryption context")]
    ContextMismatch,

    #[error("scale mismatch: {0} vs {1}")]
    ScaleMismatch(f64, f64),

    #[error("level mismatch: {0} vs {1}")]
    LevelMismatch(usize, usize),

    #[error("cannot switch ciphertext at level {from} to level {to}")]
    InvalidModSwitch { from: usize, to: usize },

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("decoding error: {0}")]
    Decoding(String),

    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("modulus mismatch")]
    ModulusMismatch,

    #[error("ring degree must be a power of 2, got {0}")]
    InvalidRingDegree(usize),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, EncnumError>;
