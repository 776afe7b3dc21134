//! Native numbers to plaintexts and back, per mode.

use std::fmt;

use crate::error::{EncnumError, Result};
use crate::mode::Mode;
use crate::primitive::{CkksEncoder, Plaintext};
use crate::session::Session;

/// A native number, as passed to `encrypt` or returned by `decrypt`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Scalar {
    Int(i64),
    Float(f64),
}

impl Scalar {
    pub fn as_f64(self) -> f64 {
        match self {
            Scalar::Int(v) => v as f64,
            Scalar::Float(v) => v,
        }
    }

    pub fn as_int(self) -> Option<i64> {
        match self {
            Scalar::Int(v) => Some(v),
            Scalar::Float(_) => None,
        }
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int(v)
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Scalar::Int(v.into())
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(v) => write!(f, "{v}"),
            Scalar::Float(v) => write!(f, "{v}"),
        }
    }
}

/// Residue of `value` modulo `modulus`, as a hex constant plaintext.
///
/// Representable values are `(-modulus/2, modulus/2]`.
pub fn encode_integer(value: Scalar, modulus: u64) -> Result<Plaintext> {
    let value = match value {
        Scalar::Int(v) => v,
        Scalar::Float(v) => {
            return Err(EncnumError::TypeMismatch(format!(
                "cannot encode {v} in integer mode; float computations require float mode"
            )));
        }
    };
    let half = i128::from(modulus / 2);
    let wide = i128::from(value);
    if wide <= -half || wide > half {
        return Err(EncnumError::Range { value, min: (1 - half) as i64, max: half as i64 });
    }
    let residue = wide.rem_euclid(i128::from(modulus));
    Plaintext::from_hex_poly(&format!("{residue:X}"))
}

/// Inverse of [`encode_integer`]: residues above `modulus/2` wrap to negatives.
pub fn decode_integer(plaintext: &Plaintext, modulus: u64) -> Result<i64> {
    let text = plaintext.to_string();
    let residue = u64::from_str_radix(&text, 16)
        .map_err(|_| EncnumError::Decoding(format!("expected a constant plaintext, got {text:?}")))?;
    if residue >= modulus {
        return Err(EncnumError::Decoding(format!("residue {residue} exceeds modulus {modulus}")));
    }
    let value = if residue > modulus / 2 { residue as i128 - modulus as i128 } else { residue as i128 };
    Ok(value as i64)
}

pub fn encode_float(value: Scalar, encoder: &CkksEncoder, scale: f64) -> Result<Plaintext> {
    encoder.encode_scalar(value.as_f64(), scale)
}

pub fn decode_float(plaintext: &Plaintext, encoder: &CkksEncoder) -> Result<f64> {
    encoder
        .decode(plaintext)?
        .first()
        .copied()
        .ok_or_else(|| EncnumError::Decoding("decoded an empty slot vector".into()))
}

impl Session {
    fn float_encoder(&self) -> Result<&CkksEncoder> {
        self.encoder
            .as_ref()
            .ok_or_else(|| EncnumError::Unsupported("float mode has no encoder".into()))
    }

    /// Encode under the session's mode.
    pub fn encode(&self, value: impl Into<Scalar>) -> Result<Plaintext> {
        match self.mode {
            Mode::Integer { modulus } => encode_integer(value.into(), modulus),
            Mode::Float { default_scale } => encode_float(value.into(), self.float_encoder()?, default_scale),
        }
    }

    pub fn decode(&self, plaintext: &Plaintext) -> Result<Scalar> {
        match self.mode {
            Mode::Integer { modulus } => decode_integer(plaintext, modulus).map(Scalar::Int),
            Mode::Float { .. } => decode_float(plaintext, self.float_encoder()?).map(Scalar::Float),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::mode::ModeKind;

    #[test]
    fn test_integer_boundaries() {
        assert!(encode_integer(Scalar::Int(1000), 2000).is_ok());
        assert!(encode_integer(Scalar::Int(-999), 2000).is_ok());
        assert!(matches!(
            encode_integer(Scalar::Int(1001), 2000),
            Err(EncnumError::Range { value: 1001, min: -999, max: 1000 })
        ));
        assert!(matches!(encode_integer(Scalar::Int(-1000), 2000), Err(EncnumError::Range { .. })));
        assert!(matches!(encode_integer(Scalar::Int(i64::MIN), 2000), Err(EncnumError::Range { .. })));
    }

    #[test]
    fn test_integer_residues() {
        assert_eq!(encode_integer(Scalar::Int(-3), 2000).unwrap().to_string(), "7CD");
        assert_eq!(encode_integer(Scalar::Int(0), 2000).unwrap().to_string(), "0");
        assert_eq!(decode_integer(&Plaintext::constant(0x7CD), 2000).unwrap(), -3);
        assert_eq!(decode_integer(&Plaintext::constant(1000), 2000).unwrap(), 1000);
        assert_eq!(decode_integer(&Plaintext::constant(1001), 2000).unwrap(), -999);
    }

    #[test]
    fn test_integer_rejects_floats_and_polynomials() {
        assert!(matches!(encode_integer(Scalar::Float(2.0), 2000), Err(EncnumError::TypeMismatch(_))));
        let poly = Plaintext::from_hex_poly("1x + 1").unwrap();
        assert!(matches!(decode_integer(&poly, 2000), Err(EncnumError::Decoding(_))));
    }

    #[test]
    fn test_session_float_codec() {
        let session = Session::new(SessionConfig::builder().poly_modulus_degree(2048).build().unwrap()).unwrap();
        let pt = session.encode(-1.25).unwrap();
        assert_eq!(pt.scale(), Some(crate::mode::DEFAULT_SCALE));
        let Scalar::Float(v) = session.decode(&pt).unwrap() else { panic!("expected a float") };
        assert!((v + 1.25).abs() < 1e-9);
        // Integers are widened in float mode.
        assert!(session.encode(7).is_ok());
    }

    #[test]
    fn test_session_integer_codec() {
        let config = SessionConfig::builder().mode(ModeKind::Int).max_int(50).poly_modulus_degree(1024).build().unwrap();
        let session = Session::new(config).unwrap();
        let pt = session.encode(-50 + 1).unwrap();
        assert_eq!(session.decode(&pt).unwrap(), Scalar::Int(-49));
        assert!(matches!(session.encode(0.5), Err(EncnumError::TypeMismatch(_))));
    }
}
