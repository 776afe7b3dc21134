//! Arithmetic modes a session can run in.

use std::fmt;
use std::str::FromStr;

use crate::error::EncnumError;
use crate::params::SchemeType;

/// Scale every float-mode ciphertext is normalized to before add/sub.
pub const DEFAULT_SCALE: f64 = (1u64 << 40) as f64;

/// Which kind of arithmetic a session performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModeKind {
    /// Exact integers over `(-max_int, max_int]`.
    Int,
    /// Approximate fixed-point reals.
    Float,
}

impl ModeKind {
    pub fn scheme(self) -> SchemeType {
        match self {
            ModeKind::Int => SchemeType::Bfv,
            ModeKind::Float => SchemeType::Ckks,
        }
    }
}

impl FromStr for ModeKind {
    type Err = EncnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "int" => Ok(ModeKind::Int),
            "float" => Ok(ModeKind::Float),
            other => Err(EncnumError::Configuration(format!("mode must be 'int' or 'float', got {other:?}"))),
        }
    }
}

impl fmt::Display for ModeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModeKind::Int => write!(f, "int"),
            ModeKind::Float => write!(f, "float"),
        }
    }
}

/// The active mode with the constants only that mode uses.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Mode {
    /// Residues modulo `modulus = 2 · max_int`.
    Integer { modulus: u64 },
    Float { default_scale: f64 },
}

impl Mode {
    pub fn kind(&self) -> ModeKind {
        match self {
            Mode::Integer { .. } => ModeKind::Int,
            Mode::Float { .. } => ModeKind::Float,
        }
    }

    /// Smallest and largest representable integer, `(-max_int + 1, max_int)`.
    pub fn int_bounds(&self) -> Option<(i64, i64)> {
        match *self {
            Mode::Integer { modulus } => {
                let half = (modulus / 2) as i64;
                Some((-half + 1, half))
            }
            Mode::Float { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mode_kind() {
        assert_eq!("int".parse::<ModeKind>().unwrap(), ModeKind::Int);
        assert_eq!("float".parse::<ModeKind>().unwrap(), ModeKind::Float);
        assert!(matches!("Float".parse::<ModeKind>(), Err(EncnumError::Configuration(_))));
        assert!(matches!("".parse::<ModeKind>(), Err(EncnumError::Configuration(_))));
    }

    #[test]
    fn test_int_bounds() {
        let mode = Mode::Integer { modulus: 2000 };
        assert_eq!(mode.int_bounds(), Some((-999, 1000)));
        assert_eq!(mode.kind(), ModeKind::Int);
        assert_eq!(Mode::Float { default_scale: DEFAULT_SCALE }.int_bounds(), None);
    }
}
