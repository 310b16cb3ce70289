//! Two-party Diffie-Hellman key material.
//!
//! A [`DhKey`] holds `(p, g, a)` and the derived value `v = g^a mod p`.
//! When built from fresh parameters `v` is the public contribution; after
//! [`DhKey::derive_from_public`] it is a shared value. The ring protocol in
//! `chat::ring` is a chain of these single exponentiation steps.

use std::fmt;

use num_bigint::BigUint;
use num_traits::Zero;

use super::bigint::{
    mod_pow, primitive_root, random_integer, random_safe_prime, ArithmeticError,
    DEFAULT_PRIMALITY_ROUNDS,
};
use super::symmetric::{decrypt_symmetric, encrypt_symmetric, SymmetricError};

/// Default prime size for freshly generated parameters.
pub const KEY_LENGTH_BITS: u64 = 128;

/// Immutable Diffie-Hellman key material.
#[derive(Clone, PartialEq, Eq)]
pub struct DhKey {
    p: BigUint,
    g: BigUint,
    a: BigUint,
    value: BigUint,
}

impl DhKey {
    fn new(p: BigUint, g: BigUint, a: BigUint) -> Result<Self, ArithmeticError> {
        let value = mod_pow(&g, &a, &p)?;
        Ok(Self { p, g, a, value })
    }

    /// Generates fresh parameters and a private exponent with default sizes.
    pub fn create() -> Result<Self, ArithmeticError> {
        Self::create_with_bits(KEY_LENGTH_BITS, DEFAULT_PRIMALITY_ROUNDS)
    }

    /// Generates a `bits`-bit safe prime, its primitive root, and a private exponent.
    pub fn create_with_bits(bits: u64, rounds: usize) -> Result<Self, ArithmeticError> {
        let p = random_safe_prime(bits, rounds)?;
        let g = primitive_root(&p)?;
        let a = nonzero_exponent(bits)?;
        Self::new(p, g, a)
    }

    /// Reuses known `(p, g)` with a fresh private exponent sized to `p`.
    pub fn create_from_known_parameters(p: BigUint, g: BigUint) -> Result<Self, ArithmeticError> {
        let bits = 8 * ((p.bits() + 7) / 8);
        let a = nonzero_exponent(bits)?;
        Self::new(p, g, a)
    }

    /// Raises another party's value to our private exponent.
    ///
    /// The result shares `p` and `a` with `self`; its derived value is
    /// `their_value^a mod p`.
    pub fn derive_from_public(&self, their_value: &BigUint) -> Result<Self, ArithmeticError> {
        Self::new(self.p.clone(), their_value.clone(), self.a.clone())
    }

    /// The prime modulus.
    pub fn prime(&self) -> &BigUint {
        &self.p
    }

    /// The group generator this key was created with.
    pub fn generator(&self) -> &BigUint {
        &self.g
    }

    /// The derived value `g^a mod p`.
    pub fn value(&self) -> &BigUint {
        &self.value
    }

    /// True when this key was built on the given group parameters.
    pub fn shares_parameters(&self, p: &BigUint, g: &BigUint) -> bool {
        &self.p == p && &self.g == g
    }

    /// Encrypts `plaintext` under a key derived from the derived value.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, SymmetricError> {
        encrypt_symmetric(plaintext, &self.value.to_bytes_be())
    }

    /// Decrypts data produced by [`DhKey::encrypt`] with the same derived value.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, SymmetricError> {
        decrypt_symmetric(ciphertext, &self.value.to_bytes_be())
    }
}

impl fmt::Debug for DhKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The private exponent stays out of logs.
        f.debug_struct("DhKey")
            .field("p", &self.p)
            .field("g", &self.g)
            .field("value", &self.value)
            .finish_non_exhaustive()
    }
}

fn nonzero_exponent(bits: u64) -> Result<BigUint, ArithmeticError> {
    loop {
        let a = random_integer(bits)?;
        if !a.is_zero() {
            return Ok(a);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_key() -> DhKey {
        DhKey::create_with_bits(64, 20).unwrap()
    }

    #[test]
    fn test_create_produces_consistent_value() {
        let key = small_key();
        assert_eq!(key.prime().bits(), 64);
        assert_eq!(
            key.value(),
            &key.generator().modpow(&key.a, key.prime())
        );
    }

    #[test]
    fn test_default_create_uses_128_bit_prime() {
        let key = DhKey::create().unwrap();
        assert_eq!(key.prime().bits(), KEY_LENGTH_BITS);
    }

    #[test]
    fn test_two_party_agreement() {
        let alice = small_key();
        let bob =
            DhKey::create_from_known_parameters(alice.prime().clone(), alice.generator().clone())
                .unwrap();

        let alice_shared = alice.derive_from_public(bob.value()).unwrap();
        let bob_shared = bob.derive_from_public(alice.value()).unwrap();

        assert_eq!(alice_shared.value(), bob_shared.value());
    }

    #[test]
    fn test_chain_is_order_independent() {
        let first = small_key();
        let p = first.prime().clone();
        let g = first.generator().clone();
        let second = DhKey::create_from_known_parameters(p.clone(), g.clone()).unwrap();
        let third = DhKey::create_from_known_parameters(p, g).unwrap();

        // ((g^a1)^a2)^a3
        let forward = third
            .derive_from_public(second.derive_from_public(first.value()).unwrap().value())
            .unwrap();
        // ((g^a3)^a1)^a2
        let rotated = second
            .derive_from_public(first.derive_from_public(third.value()).unwrap().value())
            .unwrap();

        assert_eq!(forward.value(), rotated.value());
    }

    #[test]
    fn test_known_parameters_are_kept() {
        let key = small_key();
        let other =
            DhKey::create_from_known_parameters(key.prime().clone(), key.generator().clone())
                .unwrap();
        assert!(other.shares_parameters(key.prime(), key.generator()));
        assert!(!other.shares_parameters(key.prime(), key.value()));
    }

    #[test]
    fn test_encrypt_decrypt_with_shared_value() {
        let alice = small_key();
        let bob =
            DhKey::create_from_known_parameters(alice.prime().clone(), alice.generator().clone())
                .unwrap();
        let alice_shared = alice.derive_from_public(bob.value()).unwrap();
        let bob_shared = bob.derive_from_public(alice.value()).unwrap();

        for message in [&b""[..], b"hi", &[0xffu8; 1000][..]] {
            let ciphertext = alice_shared.encrypt(message).unwrap();
            assert_eq!(bob_shared.decrypt(&ciphertext).unwrap(), message);
        }
    }

    #[test]
    fn test_debug_hides_private_exponent() {
        let key = small_key();
        let rendered = format!("{:?}", key);
        assert!(!rendered.contains(" a:"));
    }
}
