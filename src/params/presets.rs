use crate::error::{EncnumError, Result};
use crate::ring::modular::is_prime;

/// Bit width of the first CKKS prime; it bounds the precision left after the
/// last rescale.
pub const CKKS_FIRST_PRIME_BITS: u32 = 60;

/// Bit width of the CKKS rescaling primes, matching a default scale of 2^40.
pub const CKKS_SCALE_BITS: u32 = 40;

/// Largest prime width the ring layer is tuned for.
const MAX_PRIME_BITS: u32 = 60;

/// Coefficient-modulus presets.
pub struct CoeffModulus;

impl CoeffModulus {
    /// Total coefficient-modulus bits for 128-bit classical security.
    pub fn max_bit_count(poly_modulus_degree: usize) -> Option<u32> {
        match poly_modulus_degree {
            1024 => Some(27),
            2048 => Some(54),
            4096 => Some(109),
            8192 => Some(218),
            16384 => Some(438),
            32768 => Some(881),
            _ => None,
        }
    }

    /// Default BFV modulus: the full bit allowance split into near-equal primes.
    pub fn bfv_default(poly_modulus_degree: usize) -> Result<Vec<u64>> {
        let total = Self::max_bit_count(poly_modulus_degree)
            .ok_or(EncnumError::InvalidRingDegree(poly_modulus_degree))?;
        let count = total.div_ceil(MAX_PRIME_BITS);
        let bit_sizes: Vec<u32> = (0..count)
            .map(|i| total / count + u32::from(i < total % count))
            .collect();
        Self::create(poly_modulus_degree, &bit_sizes)
    }

    /// One prime per entry of `bit_sizes`, each the largest unused prime
    /// ≡ 1 (mod 2n) with exactly that many bits.
    pub fn create(poly_modulus_degree: usize, bit_sizes: &[u32]) -> Result<Vec<u64>> {
        let mut primes: Vec<u64> = Vec::with_capacity(bit_sizes.len());
        for &bits in bit_sizes {
            let found = primes_below(bits, poly_modulus_degree, 1, &primes)?;
            primes.extend(found);
        }
        Ok(primes)
    }

    /// CKKS chain: a 60-bit first prime followed by `levels` primes as close
    /// to 2^40 as the ring allows, alternating above and below so that the
    /// scale drift of successive rescales cancels out.
    pub fn ckks_chain(poly_modulus_degree: usize, levels: usize) -> Result<Vec<u64>> {
        let mut chain = primes_below(CKKS_FIRST_PRIME_BITS, poly_modulus_degree, 1, &[])?;
        let step = 2 * poly_modulus_degree as u64;
        let center = 1u64 << CKKS_SCALE_BITS;
        let mut above = center + 1;
        let mut below = center + 1 - step;

        while chain.len() < levels + 1 {
            let take_above = chain.len() % 2 == 1;
            let cursor = if take_above { &mut above } else { &mut below };
            loop {
                let candidate = *cursor;
                *cursor = if take_above { candidate + step } else { candidate - step };
                if is_prime(candidate) && !chain.contains(&candidate) {
                    chain.push(candidate);
                    break;
                }
            }
        }
        Ok(chain)
    }

    /// Rescaling levels shipped for each ring degree.
    pub fn ckks_levels(poly_modulus_degree: usize) -> Option<usize> {
        match poly_modulus_degree {
            2048 => Some(1),
            4096 => Some(2),
            8192 => Some(4),
            16384 => Some(8),
            32768 => Some(16),
            _ => None,
        }
    }

    /// Auxiliary primes whose product exceeds every tensor-product coefficient
    /// of two ciphertexts modulo `q_bits`-bit Q.
    pub fn auxiliary(poly_modulus_degree: usize, q_bits: u64, exclude: &[u64]) -> Result<Vec<u64>> {
        let log_n = poly_modulus_degree.trailing_zeros() as u64;
        let needed = q_bits + log_n + 4;
        let count = needed.div_ceil(MAX_PRIME_BITS as u64) as usize;
        primes_below(MAX_PRIME_BITS, poly_modulus_degree, count, exclude)
    }
}

/// The `count` largest primes ≡ 1 (mod 2n) with exactly `bits` bits that are
/// not in `exclude`.
pub fn primes_below(bits: u32, n: usize, count: usize, exclude: &[u64]) -> Result<Vec<u64>> {
    if !(2..=MAX_PRIME_BITS + 2).contains(&bits) {
        return Err(EncnumError::InvalidParam(format!("unsupported prime width {bits}")));
    }
    let step = 2 * n as u64;
    let lower = 1u64 << (bits - 1);
    let upper = 1u64 << bits;

    let mut found = Vec::with_capacity(count);
    // Largest value ≡ 1 (mod 2n) below 2^bits.
    let mut candidate = (upper - 1) / step * step + 1;
    while found.len() < count {
        if candidate < lower || candidate <= step {
            return Err(EncnumError::InvalidParam(format!(
                "not enough {bits}-bit primes ≡ 1 mod {step}"
            )));
        }
        if is_prime(candidate) && !exclude.contains(&candidate) {
            found.push(candidate);
        }
        candidate -= step;
    }
    Ok(found)
}
