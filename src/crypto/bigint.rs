//! Arbitrary-precision arithmetic for the Diffie-Hellman layer.
//!
//! This module provides:
//! - Modular exponentiation with modulus validation
//! - Miller-Rabin probable-prime testing
//! - Random prime and safe-prime generation
//! - Primitive-root search modulo a prime
//!
//! None of this is constant-time. It is correct arithmetic, not a hardened
//! cryptographic library.

use num_bigint::{BigUint, RandBigInt};
use num_integer::Integer;
use num_traits::{One, Zero};
use thiserror::Error;

/// Default number of Miller-Rabin rounds (error probability <= 4^-40).
pub const DEFAULT_PRIMALITY_ROUNDS: usize = 40;

/// Upper bound for trial division when factoring `p - 1`.
const TRIAL_DIVISION_BOUND: u32 = 1 << 16;

/// Small primes used to reject candidates before running Miller-Rabin.
const SMALL_PRIMES: [u32; 24] = [
    3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79, 83, 89, 97,
];

/// Errors raised by invalid arithmetic requests.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArithmeticError {
    #[error("Modulus must be at least 2")]
    ModulusTooSmall,

    #[error("Bit length must be at least 2, got {0}")]
    BitLengthTooSmall(u64),

    #[error("Cannot factor the group order p - 1")]
    UnfactorableOrder,

    #[error("No primitive root found")]
    NoPrimitiveRoot,
}

/// Computes `base^exponent mod modulus`.
pub fn mod_pow(
    base: &BigUint,
    exponent: &BigUint,
    modulus: &BigUint,
) -> Result<BigUint, ArithmeticError> {
    if modulus < &BigUint::from(2u32) {
        return Err(ArithmeticError::ModulusTooSmall);
    }
    Ok(base.modpow(exponent, modulus))
}

/// Returns a uniformly random integer of at most `bits` bits.
pub fn random_integer(bits: u64) -> Result<BigUint, ArithmeticError> {
    check_bits(bits)?;
    Ok(rand::thread_rng().gen_biguint(bits))
}

/// Returns a random probable prime of exactly `bits` bits.
pub fn random_prime(bits: u64, rounds: usize) -> Result<BigUint, ArithmeticError> {
    check_bits(bits)?;
    if bits == 2 {
        // Only 2 and 3 have two bits; 2 is even and never a candidate.
        return Ok(BigUint::from(3u32));
    }

    loop {
        let candidate = random_odd_candidate(bits);
        if is_probable_prime(&candidate, rounds) {
            return Ok(candidate);
        }
    }
}

/// Returns a random safe prime `p = 2q + 1` of exactly `bits` bits.
///
/// Safe primes let [`primitive_root`] factor `p - 1` without trial division.
pub fn random_safe_prime(bits: u64, rounds: usize) -> Result<BigUint, ArithmeticError> {
    check_bits(bits)?;
    if bits < 4 {
        return Ok(if bits == 2 {
            BigUint::from(3u32)
        } else {
            BigUint::from(7u32)
        });
    }

    loop {
        let q = random_odd_candidate(bits - 1);
        let p: BigUint = (&q << 1u32) + 1u32;

        // Cheap sieve on both numbers before paying for Miller-Rabin.
        if has_small_factor(&q) || has_small_factor(&p) {
            continue;
        }
        if is_probable_prime(&q, rounds) && is_probable_prime(&p, rounds) {
            return Ok(p);
        }
    }
}

/// Miller-Rabin probable-prime test with `rounds` random bases.
pub fn is_probable_prime(n: &BigUint, rounds: usize) -> bool {
    let two = BigUint::from(2u32);
    if n < &two {
        return false;
    }
    if n == &two {
        return true;
    }
    if n.is_even() {
        return false;
    }
    for &small in SMALL_PRIMES.iter() {
        let small = BigUint::from(small);
        if n == &small {
            return true;
        }
        if (n % &small).is_zero() {
            return false;
        }
    }

    // n - 1 = 2^s * d with d odd
    let n_minus_one = n - 1u32;
    let s = n_minus_one.trailing_zeros().unwrap_or(0);
    let d = &n_minus_one >> s;

    let mut rng = rand::thread_rng();
    'witness: for _ in 0..rounds {
        let a = rng.gen_biguint_range(&two, &n_minus_one);
        let mut x = a.modpow(&d, n);
        if x.is_one() || x == n_minus_one {
            continue;
        }
        for _ in 1..s {
            x = x.modpow(&two, n);
            if x == n_minus_one {
                continue 'witness;
            }
        }
        return false;
    }

    true
}

/// Finds the smallest generator of the multiplicative group modulo prime `p`.
pub fn primitive_root(p: &BigUint) -> Result<BigUint, ArithmeticError> {
    let two = BigUint::from(2u32);
    if p < &two {
        return Err(ArithmeticError::ModulusTooSmall);
    }
    if p == &two {
        return Ok(BigUint::one());
    }

    let order = p - 1u32;
    let factors = distinct_prime_factors(&order)?;
    let exponents: Vec<BigUint> = factors.iter().map(|f| &order / f).collect();

    let mut g = two;
    while &g < p {
        if exponents.iter().all(|e| !g.modpow(e, p).is_one()) {
            return Ok(g);
        }
        g += 1u32;
    }

    Err(ArithmeticError::NoPrimitiveRoot)
}

/// Distinct prime factors of `n`, found by trial division up to a fixed bound.
///
/// The cofactor left after trial division must be 1 or a probable prime.
fn distinct_prime_factors(n: &BigUint) -> Result<Vec<BigUint>, ArithmeticError> {
    let mut rest = n.clone();
    let mut factors = Vec::new();

    let mut divisor = 2u32;
    while divisor < TRIAL_DIVISION_BOUND {
        let d = BigUint::from(divisor);
        if &d * &d > rest {
            break;
        }
        if (&rest % &d).is_zero() {
            factors.push(d.clone());
            while (&rest % &d).is_zero() {
                rest /= &d;
            }
        }
        divisor += if divisor == 2 { 1 } else { 2 };
    }

    if !rest.is_one() {
        if !is_probable_prime(&rest, DEFAULT_PRIMALITY_ROUNDS) {
            return Err(ArithmeticError::UnfactorableOrder);
        }
        factors.push(rest);
    }

    Ok(factors)
}

fn random_odd_candidate(bits: u64) -> BigUint {
    let mut candidate = rand::thread_rng().gen_biguint(bits);
    candidate.set_bit(bits - 1, true);
    candidate.set_bit(0, true);
    candidate
}

fn has_small_factor(n: &BigUint) -> bool {
    SMALL_PRIMES.iter().any(|&small| {
        let small = BigUint::from(small);
        n != &small && (n % &small).is_zero()
    })
}

fn check_bits(bits: u64) -> Result<(), ArithmeticError> {
    if bits < 2 {
        return Err(ArithmeticError::BitLengthTooSmall(bits));
    }
    Ok(())
}
