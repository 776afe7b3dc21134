use std::sync::Arc;

use crate::error::{EncnumError, Result};
use crate::mode::{Mode, ModeKind, DEFAULT_SCALE};
use crate::params::{CoeffModulus, EncryptionParameters};

pub const DEFAULT_MAX_INT: u64 = 262_144;
pub const DEFAULT_POLY_MODULUS_DEGREE: usize = 8192;

/// Smallest ring degree with at least one rescaling level.
const MIN_FLOAT_DEGREE: usize = 2048;

/// Validated session settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    mode: ModeKind,
    max_int: u64,
    poly_modulus_degree: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { mode: ModeKind::Float, max_int: DEFAULT_MAX_INT, poly_modulus_degree: DEFAULT_POLY_MODULUS_DEGREE }
    }
}

impl SessionConfig {
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    pub fn mode_kind(&self) -> ModeKind {
        self.mode
    }

    /// Ignored in float mode.
    pub fn max_int(&self) -> u64 {
        self.max_int
    }

    pub fn poly_modulus_degree(&self) -> usize {
        self.poly_modulus_degree
    }

    /// Mode constants derived from the settings.
    pub fn mode(&self) -> Mode {
        match self.mode {
            ModeKind::Int => Mode::Integer { modulus: 2 * self.max_int },
            ModeKind::Float => Mode::Float { default_scale: DEFAULT_SCALE },
        }
    }

    /// Scheme parameters: the default BFV modulus with `t = 2·max_int`, or the
    /// full CKKS chain for the ring degree.
    pub fn encryption_parameters(&self) -> Result<Arc<EncryptionParameters>> {
        let n = self.poly_modulus_degree;
        let builder = EncryptionParameters::builder(self.mode.scheme()).poly_modulus_degree(n);
        match self.mode() {
            Mode::Integer { modulus } => builder
                .coeff_modulus(CoeffModulus::bfv_default(n)?)
                .plain_modulus(modulus)
                .build(),
            Mode::Float { .. } => {
                let levels = CoeffModulus::ckks_levels(n)
                    .ok_or_else(|| EncnumError::Configuration(format!("no float-mode chain for degree {n}")))?;
                builder.coeff_modulus(CoeffModulus::ckks_chain(n, levels)?).build()
            }
        }
    }
}

/// Builder for [`SessionConfig`].
#[derive(Clone, Debug, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    pub fn mode(mut self, mode: ModeKind) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn max_int(mut self, max_int: u64) -> Self {
        self.config.max_int = max_int;
        self
    }

    pub fn poly_modulus_degree(mut self, n: usize) -> Self {
        self.config.poly_modulus_degree = n;
        self
    }

    pub fn build(self) -> Result<SessionConfig> {
        let SessionConfig { mode, max_int, poly_modulus_degree: n } = self.config;

        let total_bits = CoeffModulus::max_bit_count(n).ok_or_else(|| {
            EncnumError::Configuration(format!("poly_modulus_degree must be a power of two in 1024..=32768, got {n}"))
        })?;
        match mode {
            ModeKind::Float if n < MIN_FLOAT_DEGREE => {
                return Err(EncnumError::Configuration(format!(
                    "float mode needs poly_modulus_degree >= {MIN_FLOAT_DEGREE}, got {n}"
                )));
            }
            ModeKind::Int => {
                if max_int == 0 {
                    return Err(EncnumError::Configuration("max_int must be positive".into()));
                }
                // t = 2·max_int has to leave room for Δ = ⌊Q/t⌋.
                let t_bits = max_int.checked_mul(2).map(|t| u64::BITS - t.leading_zeros());
                if t_bits.is_none_or(|bits| bits >= total_bits) {
                    return Err(EncnumError::Configuration(format!(
                        "max_int {max_int} is too large for poly_modulus_degree {n}"
                    )));
                }
            }
            ModeKind::Float => {}
        }
        Ok(self.config)
    }
}
