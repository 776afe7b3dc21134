//! Word-sized modular arithmetic used by every RNS limb.

/// Barrett reduction of `a` modulo `m` with `barrett_k = floor(2^64 / m)`.
///
/// The single-word trick is exact for `m <= 2^32` and `a < m^2`; wider moduli
/// go through a `u128` remainder.
#[inline(always)]
pub fn barrett_reduce(a: u128, m: u64, barrett_k: u64) -> u64 {
    if m > (1u64 << 32) {
        (a % m as u128) as u64
    } else {
        let q_hat = ((a * barrett_k as u128) >> 64) as u64;
        let r = (a as u64).wrapping_sub(q_hat.wrapping_mul(m));
        if r >= m { r.wrapping_sub(m) } else { r }
    }
}

#[inline]
pub fn barrett_constant(m: u64) -> u64 {
    assert!(m > 1, "modulus must be > 1");
    ((1u128 << 64) / m as u128) as u64
}

#[inline(always)]
pub fn mod_add(a: u64, b: u64, m: u64) -> u64 {
    let sum = a as u128 + b as u128;
    if sum >= m as u128 { (sum - m as u128) as u64 } else { sum as u64 }
}

#[inline(always)]
pub fn mod_sub(a: u64, b: u64, m: u64) -> u64 {
    if a >= b { a - b } else { m - b + a }
}

#[inline(always)]
pub fn mod_neg(a: u64, m: u64) -> u64 {
    if a == 0 { 0 } else { m - a }
}

#[inline(always)]
pub fn mod_mul(a: u64, b: u64, m: u64, barrett_k: u64) -> u64 {
    barrett_reduce(a as u128 * b as u128, m, barrett_k)
}

pub fn mod_pow(mut base: u64, mut exp: u64, m: u64) -> u64 {
    let bk = barrett_constant(m);
    let mut result = 1u64 % m;
    base %= m;
    while exp > 0 {
        if exp & 1 == 1 {
            result = mod_mul(result, base, m, bk);
        }
        exp >>= 1;
        base = mod_mul(base, base, m, bk);
    }
    result
}

/// Inverse of `a` modulo `m` by the extended Euclidean algorithm.
pub fn mod_inv(a: u64, m: u64) -> Option<u64> {
    let (mut old_r, mut r) = (a as i128, m as i128);
    let (mut old_s, mut s) = (1i128, 0i128);

    while r != 0 {
        let q = old_r / r;
        (old_r, r) = (r, old_r - q * r);
        (old_s, s) = (s, old_s - q * s);
    }

    if old_r != 1 {
        return None;
    }
    Some(old_s.rem_euclid(m as i128) as u64)
}

/// Reduce a signed value into `[0, m)`.
#[inline(always)]
pub fn reduce_i128(v: i128, m: u64) -> u64 {
    v.rem_euclid(m as i128) as u64
}

/// Map a residue in `[0, m)` to its centered representative in `(-m/2, m/2]`.
#[inline(always)]
pub fn center(v: u64, m: u64) -> i128 {
    if v > m / 2 { v as i128 - m as i128 } else { v as i128 }
}

/// Deterministic Miller-Rabin for 64-bit inputs.
pub fn is_prime(n: u64) -> bool {
    const WITNESSES: [u64; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];
    if n < 2 {
        return false;
    }
    for &p in &WITNESSES {
        if n % p == 0 {
            return n == p;
        }
    }

    let mut d = n - 1;
    let mut r = 0u32;
    while d % 2 == 0 {
        d /= 2;
        r += 1;
    }

    let bk = barrett_constant(n);
    'witness: for &a in &WITNESSES {
        let mut x = mod_pow(a, d, n);
        if x == 1 || x == n - 1 {
            continue;
        }
        for _ in 1..r {
            x = mod_mul(x, x, n, bk);
            if x == n - 1 {
                continue 'witness;
            }
        }
        return false;
    }
    true
}
