use rand::Rng;
use crate::ring::poly::CoeffPoly;

/// Uniform coefficients in `[0, modulus)` by masked rejection sampling.
pub fn sample_uniform_poly<R: Rng>(n: usize, modulus: u64, rng: &mut R) -> CoeffPoly {
    let mask = if modulus.is_power_of_two() {
        modulus - 1
    } else {
        u64::MAX >> modulus.leading_zeros()
    };

    let coeffs: Vec<u64> = (0..n)
        .map(|_| loop {
            let val = rng.random::<u64>() & mask;
            if val < modulus {
                break val;
            }
        })
        .collect();
    CoeffPoly { coeffs, modulus }
}

/// Ternary coefficients, each of -1, 0, 1 with probability 1/3.
pub fn sample_ternary_vec<R: Rng>(n: usize, rng: &mut R) -> Vec<i128> {
    (0..n)
        .map(|_| loop {
            let r = rng.random::<u8>() & 0x03;
            if r < 3 {
                break r as i128 - 1;
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_uniform() {
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let poly = sample_uniform_poly(1024, 65537, &mut rng);
        assert_eq!(poly.len(), 1024);
        assert!(poly.coeffs.iter().all(|&c| c < 65537));
    }

    #[test]
    fn test_uniform_wide_modulus() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let q = 1152921504606830593u64;
        let poly = sample_uniform_poly(256, q, &mut rng);
        assert!(poly.coeffs.iter().all(|&c| c < q));
        // Top bits should actually be exercised.
        assert!(poly.coeffs.iter().any(|&c| c > q / 2));
    }

    #[test]
    fn test_ternary() {
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let v = sample_ternary_vec(1024, &mut rng);
        assert!(v.iter().all(|&c| (-1..=1).contains(&c)));
        for target in -1..=1 {
            let count = v.iter().filter(|&&c| c == target).count();
            assert!(count > 200 && count < 500, "{target}: {count}");
        }
    }
}
