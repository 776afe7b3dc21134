use rand::Rng;

/// Sample `n` signed integers from a discrete Gaussian of width `sigma`.
///
/// Values are returned centered so the caller can lift them into any RNS
/// basis without going through a single modulus first.
pub fn sample_gaussian_vec<R: Rng>(n: usize, sigma: f64, rng: &mut R) -> Vec<i128> {
    let table = CdtTable::new(sigma);
    (0..n).map(|_| table.sample(rng) as i128).collect()
}

/// Cumulative distribution table over `[-tail, tail]`, `tail = ceil(6σ)`.
struct CdtTable {
    tail: i64,
    cdf: Vec<f64>,
}

impl CdtTable {
    fn new(sigma: f64) -> Self {
        let tail = (6.0 * sigma).ceil() as i64;
        let two_sigma_sq = 2.0 * sigma * sigma;
        let mut cumulative = 0.0f64;
        let cdf = (-tail..=tail)
            .map(|x| {
                cumulative += (-((x * x) as f64) / two_sigma_sq).exp();
                cumulative
            })
            .collect();
        Self { tail, cdf }
    }

    /// Branchless scan: every entry is visited and selected through an
    /// integer mask, so the loop does not depend on the sampled value.
    fn sample<R: Rng>(&self, rng: &mut R) -> i64 {
        let total = self.cdf.last().copied().unwrap_or(1.0);
        let u: f64 = rng.random::<f64>() * total;

        let mut result = self.tail;
        for i in (0..self.cdf.len()).rev() {
            let mask = ((u < self.cdf[i]) as i64).wrapping_neg();
            let candidate = -self.tail + i as i64;
            result = (candidate & mask) | (result & !mask);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_gaussian_distribution() {
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let sigma = 3.2;
        let n = 10000;
        let samples = sample_gaussian_vec(n, sigma, &mut rng);

        let mean: f64 = samples.iter().map(|&x| x as f64).sum::<f64>() / n as f64;
        assert!(mean.abs() < 0.5, "mean = {mean}");

        let var: f64 = samples.iter().map(|&x| (x as f64 - mean).powi(2)).sum::<f64>() / n as f64;
        assert!((var - sigma * sigma).abs() < 2.0, "var = {var}");

        let tail = (6.0 * sigma).ceil() as i128;
        assert!(samples.iter().all(|s| s.abs() <= tail));
    }

    #[test]
    fn test_gaussian_is_seeded() {
        let a = sample_gaussian_vec(64, 3.2, &mut ChaCha20Rng::seed_from_u64(1));
        let b = sample_gaussian_vec(64, 3.2, &mut ChaCha20Rng::seed_from_u64(1));
        assert_eq!(a, b);
    }
}
