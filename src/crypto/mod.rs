//! Cryptographic utilities for the node
//!
//! This module provides SHA-512 hashing for block digests.

pub mod hash;

pub use hash::sha512_hex_parts;
