pub mod gaussian;
pub mod uniform;

pub use gaussian::sample_gaussian_vec;
pub use uniform::{sample_ternary_vec, sample_uniform_poly};

/// Error standard deviation used by every key and encryption.
pub const ERROR_SIGMA: f64 = 3.2;
