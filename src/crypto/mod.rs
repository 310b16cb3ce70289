//! Cryptographic operations for ringchat.
//!
//! This module provides:
//! - Arbitrary-precision modular arithmetic and prime generation
//! - Two-party Diffie-Hellman key material (the ring protocol's building block)
//! - Symmetric encryption keyed by a derived group value (HKDF + ChaCha20Poly1305)

pub mod bigint;
pub mod dh;
pub mod symmetric;

pub use bigint::{
    is_probable_prime, mod_pow, primitive_root, random_integer, random_prime, random_safe_prime,
    ArithmeticError, DEFAULT_PRIMALITY_ROUNDS,
};
pub use dh::{DhKey, KEY_LENGTH_BITS};
pub use symmetric::{decrypt_symmetric, encrypt_symmetric, GroupCipher, SymmetricError};
