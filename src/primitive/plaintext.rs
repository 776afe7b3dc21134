use std::fmt;
use std::str::FromStr;
use num_bigint::BigInt;

use crate::error::{EncnumError, Result};

/// Unencrypted polynomial in the form the active scheme consumes.
#[derive(Clone, Debug, PartialEq)]
pub enum Plaintext {
    /// BFV message: coefficient `i` of X^i, each in `[0, t)`.
    /// Trailing zero coefficients are not stored.
    Bfv { coeffs: Vec<u64> },
    /// CKKS message: integer coefficients of `round(Δ · σ⁻¹(z))` with the
    /// scale Δ they were produced at.
    Ckks { coeffs: Vec<BigInt>, scale: f64 },
}

impl Plaintext {
    /// BFV plaintext from a hex polynomial such as `"1Fx^2 + 3"`.
    pub fn from_hex_poly(text: &str) -> Result<Self> {
        text.parse()
    }

    /// BFV constant polynomial.
    pub fn constant(value: u64) -> Self {
        Self::bfv(vec![value])
    }

    pub(crate) fn bfv(mut coeffs: Vec<u64>) -> Self {
        while coeffs.last() == Some(&0) {
            coeffs.pop();
        }
        Plaintext::Bfv { coeffs }
    }

    /// Number of stored coefficients.
    pub fn coeff_count(&self) -> usize {
        match self {
            Plaintext::Bfv { coeffs } => coeffs.len(),
            Plaintext::Ckks { coeffs, .. } => coeffs.len(),
        }
    }

    pub fn scale(&self) -> Option<f64> {
        match self {
            Plaintext::Bfv { .. } => None,
            Plaintext::Ckks { scale, .. } => Some(*scale),
        }
    }
}

impl FromStr for Plaintext {
    type Err = EncnumError;

    /// Parses terms `<hex>x^<dec>`, `<hex>x` or `<hex>` joined by `+`.
    fn from_str(text: &str) -> Result<Self> {
        let bad = |why: &str| EncnumError::Encoding(format!("invalid polynomial string {text:?}: {why}"));
        let mut coeffs: Vec<u64> = Vec::new();
        let mut last_degree: Option<usize> = None;

        for term in text.split('+').map(str::trim) {
            if term.is_empty() {
                return Err(bad("empty term"));
            }
            let (coeff, degree) = match term.split_once(['x', 'X']) {
                Some((c, rest)) => {
                    let degree = match rest.strip_prefix('^') {
                        Some(d) => d.parse::<usize>().map_err(|_| bad("bad exponent"))?,
                        None if rest.is_empty() => 1,
                        None => return Err(bad("bad exponent")),
                    };
                    (c, degree)
                }
                None => (term, 0),
            };
            let coeff = u64::from_str_radix(coeff, 16).map_err(|_| bad("bad hex coefficient"))?;
            if last_degree.is_some_and(|d| degree >= d) {
                return Err(bad("terms must be in decreasing degree"));
            }
            last_degree = Some(degree);
            if coeffs.len() <= degree {
                coeffs.resize(degree + 1, 0);
            }
            coeffs[degree] = coeff;
        }
        Ok(Self::bfv(coeffs))
    }
}

impl fmt::Display for Plaintext {
    /// BFV plaintexts print as hex polynomials, highest degree first.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Plaintext::Bfv { coeffs } => {
                let mut first = true;
                for (degree, &c) in coeffs.iter().enumerate().rev() {
                    if c == 0 {
                        continue;
                    }
                    if !first {
                        write!(f, " + ")?;
                    }
                    first = false;
                    match degree {
                        0 => write!(f, "{c:X}")?,
                        1 => write!(f, "{c:X}x")?,
                        _ => write!(f, "{c:X}x^{degree}")?,
                    }
                }
                if first {
                    write!(f, "0")?;
                }
                Ok(())
            }
            Plaintext::Ckks { coeffs, scale } => {
                write!(f, "<ckks plaintext: {} coefficients, scale 2^{:.2}>", coeffs.len(), scale.log2())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_print_hex_poly() {
        let pt = Plaintext::from_hex_poly("1Fx^2 + 3").unwrap();
        assert_eq!(pt, Plaintext::Bfv { coeffs: vec![3, 0, 0x1F] });
        assert_eq!(pt.to_string(), "1Fx^2 + 3");
    }

    #[test]
    fn test_linear_term_and_zero() {
        let pt: Plaintext = "Ax + 1".parse().unwrap();
        assert_eq!(pt, Plaintext::Bfv { coeffs: vec![1, 10] });
        assert_eq!(pt.to_string(), "Ax + 1");
        assert_eq!(Plaintext::constant(0).to_string(), "0");
        assert_eq!(Plaintext::from_hex_poly("0").unwrap(), Plaintext::Bfv { coeffs: vec![] });
    }

    #[test]
    fn test_constant_prints_bare_hex() {
        assert_eq!(Plaintext::constant(0x3E8).to_string(), "3E8");
    }

    #[test]
    fn test_rejects_garbage() {
        for text in ["", "zz", "3x^a", "1 + 2x", "5 +"] {
            assert!(matches!(Plaintext::from_hex_poly(text), Err(EncnumError::Encoding(_))), "{text:?}");
        }
    }
}
