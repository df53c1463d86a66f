//! Running-key XOR encryption filters.
//!
//! The classic retro-game "encryption": each byte is XOR'd with a key
//! derived from its offset. Two variants ship here:
//!
//! - `xor-inc`: key is `seed + offset`, every byte crypted.
//! - `xor-blood`: key is `seed + (offset >> 1)` (it advances every second
//!   byte) and only the first 256 bytes are crypted, as used by Blood's
//!   RFF archives.
//!
//! XOR is self-inverse, so the same transform serves both directions.

use std::io;

use super::{FilterType, Transform};

/// Number of bytes crypted at the start of a Blood RFF member file.
const RFF_FILE_CRYPT_LEN: u64 = 256;

/// How the running key advances with the byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyStep {
    /// Key advances every byte.
    EveryByte,
    /// Key advances every second byte.
    EveryOtherByte,
}

/// XOR-by-running-key transform.
///
/// Parameterised by the key seed, the key step and an optional crypt
/// length: when `crypt_len` is nonzero only that many leading bytes are
/// crypted and the remainder is copied through unchanged.
#[derive(Debug, Clone)]
pub struct XorTransform {
    seed: u8,
    step: KeyStep,
    crypt_len: u64,
    offset: u64,
}

impl XorTransform {
    /// Creates the `xor-inc` transform: key `seed + offset`, whole stream.
    pub fn incremental(seed: u8) -> Self {
        Self {
            seed,
            step: KeyStep::EveryByte,
            crypt_len: 0,
            offset: 0,
        }
    }

    /// Creates the Blood RFF transform: key advances every second byte,
    /// first `crypt_len` bytes only (zero means the whole stream).
    pub fn blood(seed: u8, crypt_len: u64) -> Self {
        Self {
            seed,
            step: KeyStep::EveryOtherByte,
            crypt_len,
            offset: 0,
        }
    }

    fn key(&self) -> u8 {
        let advance = match self.step {
            KeyStep::EveryByte => self.offset,
            KeyStep::EveryOtherByte => self.offset >> 1,
        };
        (self.seed as u64).wrapping_add(advance) as u8
    }
}

impl Transform for XorTransform {
    fn reset(&mut self, _expected_input_len: u64) {
        self.offset = 0;
    }

    fn transform(&mut self, input: &[u8], output: &mut [u8]) -> io::Result<(usize, usize)> {
        let n = input.len().min(output.len());
        let mut w = 0usize;

        // Crypted portion.
        while w < n && (self.crypt_len == 0 || self.offset < self.crypt_len) {
            output[w] = input[w] ^ self.key();
            // The offset feeds the key, so it must advance per byte.
            self.offset += 1;
            w += 1;
        }

        // Plaintext remainder.
        if w < n {
            output[w..n].copy_from_slice(&input[w..n]);
            self.offset += (n - w) as u64;
            w = n;
        }

        Ok((w, w))
    }
}

/// Incremental XOR encryption (`xor-inc`).
pub struct FilterTypeXorInc;

impl FilterType for FilterTypeXorInc {
    fn code(&self) -> &'static str {
        "xor-inc"
    }

    fn name(&self) -> &'static str {
        "Incremental XOR encryption"
    }

    fn reverse(&self) -> Box<dyn Transform> {
        Box::new(XorTransform::incremental(0))
    }

    fn forward(&self) -> Box<dyn Transform> {
        Box::new(XorTransform::incremental(0))
    }
}

/// Blood RFF encryption (`xor-blood`).
pub struct FilterTypeXorBlood;

impl FilterType for FilterTypeXorBlood {
    fn code(&self) -> &'static str {
        "xor-blood"
    }

    fn name(&self) -> &'static str {
        "Blood RFF encryption"
    }

    fn games(&self) -> &'static [&'static str] {
        &["Blood"]
    }

    fn reverse(&self) -> Box<dyn Transform> {
        Box::new(XorTransform::blood(0, RFF_FILE_CRYPT_LEN))
    }

    fn forward(&self) -> Box<dyn Transform> {
        Box::new(XorTransform::blood(0, RFF_FILE_CRYPT_LEN))
    }
}
