//! Reversible byte-transform filters and their registry.
//!
//! Several archive formats run member files through a transform before
//! storing them — XOR-style obfuscation, compression, or an envelope such
//! as a decompressed-length prefix. This module provides:
//!
//! - the [`Transform`] trait: an incremental byte-to-byte transform,
//! - [`FilterRead`] / [`FilterWrite`]: stream adapters that reverse a
//!   transform on read and apply it on write,
//! - the [`FilterType`] driver contract and the [`FilterRegistry`] that
//!   resolves an entry's stored filter code to a driver at open time.
//!
//! A filter is always a *pair* of transforms (forward for writing, reverse
//! for reading). The pair need not be strict inverses in general, but must
//! round-trip every byte sequence the library actually stores.
//!
//! # Size accounting
//!
//! When a filtered writer is finished it reports how many pre-filter bytes
//! it consumed and how many post-filter bytes it produced
//! ([`FilterSizes`]). The archive engine uses the pair to keep an entry's
//! `real_size` and `stored_size` in sync.

pub mod bitswap;
pub mod prefix;
pub mod xor;

pub use bitswap::FilterTypeBitswap;
pub use prefix::{PrefixAdd, PrefixStrip};
pub use xor::{FilterTypeXorBlood, FilterTypeXorInc, XorTransform};

use std::io::{self, Read, Write};

/// Buffer size for pumping data through a transform.
const PUMP_BUFFER_SIZE: usize = 8192;

/// An incremental byte transform.
///
/// `transform` consumes up to `input.len()` bytes and produces up to
/// `output.len()` bytes, returning how many of each it actually used. A
/// transform may produce more or fewer bytes than it consumes. An empty
/// `input` slice signals end of input: the transform should drain any
/// pending output, and report `(0, 0)` once it has nothing left.
pub trait Transform {
    /// Prepares for a fresh stream. `expected_input_len` is the number of
    /// pre-transform bytes about to be fed in, for transforms that must
    /// know it up front (e.g. a length-prefix writer).
    fn reset(&mut self, expected_input_len: u64);

    /// Transforms bytes from `input` into `output`. Returns
    /// `(consumed, produced)`.
    fn transform(&mut self, input: &[u8], output: &mut [u8]) -> io::Result<(usize, usize)>;
}

impl<T: Transform + ?Sized> Transform for Box<T> {
    fn reset(&mut self, expected_input_len: u64) {
        (**self).reset(expected_input_len)
    }

    fn transform(&mut self, input: &[u8], output: &mut [u8]) -> io::Result<(usize, usize)> {
        (**self).transform(input, output)
    }
}

/// A transform that passes bytes through unchanged.
///
/// Useful as the child of an envelope transform such as
/// [`PrefixStrip`]/[`PrefixAdd`] when the payload itself is not encoded.
#[derive(Debug, Default, Clone)]
pub struct Identity;

impl Transform for Identity {
    fn reset(&mut self, _expected_input_len: u64) {}

    fn transform(&mut self, input: &[u8], output: &mut [u8]) -> io::Result<(usize, usize)> {
        let n = input.len().min(output.len());
        output[..n].copy_from_slice(&input[..n]);
        Ok((n, n))
    }
}

/// Byte counts reported by a finished filtered writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterSizes {
    /// Pre-filter bytes consumed (the member's real size).
    pub real: u64,
    /// Post-filter bytes produced (the member's stored size).
    pub stored: u64,
}

/// Reads from a parent stream through a reverse transform.
pub struct FilterRead<R, T> {
    inner: R,
    transform: T,
    buf: Box<[u8]>,
    buf_start: usize,
    buf_end: usize,
    eof: bool,
    done: bool,
}

impl<R: Read, T: Transform> FilterRead<R, T> {
    /// Wraps `inner`, resetting the transform for a stream of
    /// `expected_input_len` stored bytes.
    pub fn new(inner: R, mut transform: T, expected_input_len: u64) -> Self {
        transform.reset(expected_input_len);
        Self {
            inner,
            transform,
            buf: vec![0u8; PUMP_BUFFER_SIZE].into_boxed_slice(),
            buf_start: 0,
            buf_end: 0,
            eof: false,
            done: false,
        }
    }
}

impl<R: Read, T: Transform> Read for FilterRead<R, T> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.done || out.is_empty() {
            return Ok(0);
        }
        loop {
            if self.buf_start == self.buf_end && !self.eof {
                self.buf_start = 0;
                self.buf_end = self.inner.read(&mut self.buf)?;
                if self.buf_end == 0 {
                    self.eof = true;
                }
            }
            let input = &self.buf[self.buf_start..self.buf_end];
            let (consumed, produced) = self.transform.transform(input, out)?;
            self.buf_start += consumed;
            if produced > 0 {
                return Ok(produced);
            }
            if input.is_empty() && self.eof {
                // Drained: nothing consumed, nothing produced.
                self.done = true;
                return Ok(0);
            }
            if consumed == 0 && produced == 0 && !input.is_empty() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "filter transform stalled",
                ));
            }
        }
    }
}

/// Writes through a forward transform into a parent stream.
///
/// Call [`finish`](FilterWrite::finish) to drain the transform and obtain
/// the [`FilterSizes`]; dropping the writer without finishing loses any
/// buffered tail.
pub struct FilterWrite<W, T> {
    inner: W,
    transform: T,
    stage: Box<[u8]>,
    total_in: u64,
    total_out: u64,
}

impl<W: Write, T: Transform> FilterWrite<W, T> {
    /// Wraps `inner`, resetting the transform for `expected_input_len`
    /// pre-filter bytes.
    pub fn new(inner: W, mut transform: T, expected_input_len: u64) -> Self {
        transform.reset(expected_input_len);
        Self {
            inner,
            transform,
            stage: vec![0u8; PUMP_BUFFER_SIZE].into_boxed_slice(),
            total_in: 0,
            total_out: 0,
        }
    }

    /// Drains the transform, flushes the parent and reports the byte
    /// counts, returning the parent stream.
    pub fn finish(mut self) -> io::Result<(FilterSizes, W)> {
        loop {
            let (_, produced) = self.transform.transform(&[], &mut self.stage)?;
            if produced == 0 {
                break;
            }
            self.inner.write_all(&self.stage[..produced])?;
            self.total_out += produced as u64;
        }
        self.inner.flush()?;
        Ok((
            FilterSizes {
                real: self.total_in,
                stored: self.total_out,
            },
            self.inner,
        ))
    }
}

impl<W: Write, T: Transform> Write for FilterWrite<W, T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut consumed_total = 0usize;
        // Consume at least one byte so callers' write_all loops make
        // progress even when the transform is buffering.
        while consumed_total == 0 {
            let (consumed, produced) = self
                .transform
                .transform(&buf[consumed_total..], &mut self.stage)?;
            if produced > 0 {
                self.inner.write_all(&self.stage[..produced])?;
                self.total_out += produced as u64;
            }
            consumed_total += consumed;
            if consumed == 0 && produced == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "filter transform stalled",
                ));
            }
        }
        self.total_in += consumed_total as u64;
        Ok(consumed_total)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// The contract a filter driver satisfies.
///
/// A driver supplies a stable short code (the persistent identifier stored
/// in archive directories), display metadata, and fresh forward/reverse
/// transforms. Separate transform instances are handed out for reading and
/// writing so interleaved use of one direction cannot disturb the other's
/// running state.
pub trait FilterType {
    /// Stable short code, e.g. `"xor-inc"`.
    fn code(&self) -> &'static str;

    /// Human-readable name.
    fn name(&self) -> &'static str;

    /// Games known to use this filter.
    fn games(&self) -> &'static [&'static str] {
        &[]
    }

    /// A fresh reverse (decode) transform.
    fn reverse(&self) -> Box<dyn Transform>;

    /// A fresh forward (encode) transform.
    fn forward(&self) -> Box<dyn Transform>;

    /// Applies the reverse transform to a read-only parent.
    fn reader<'a>(&self, inner: Box<dyn Read + 'a>, stored_len: u64) -> Box<dyn Read + 'a> {
        Box::new(FilterRead::new(inner, self.reverse(), stored_len))
    }

    /// Decodes a complete stored byte sequence.
    fn decode(&self, stored: &[u8]) -> io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(stored.len());
        self.reader(Box::new(stored), stored.len() as u64)
            .read_to_end(&mut out)?;
        Ok(out)
    }

    /// Encodes a complete pre-filter byte sequence, returning the stored
    /// form and the size pair.
    fn encode(&self, real: &[u8]) -> io::Result<(Vec<u8>, FilterSizes)> {
        let mut w = FilterWrite::new(Vec::new(), self.forward(), real.len() as u64);
        w.write_all(real)?;
        let (sizes, stored) = w.finish()?;
        Ok((stored, sizes))
    }
}

/// Resolves filter codes to drivers.
///
/// A registry is a plain value constructed by the caller; there is no
/// global registry. [`FilterRegistry::builtin`] returns one preloaded with
/// every filter this crate ships.
pub struct FilterRegistry {
    filters: Vec<Box<dyn FilterType>>,
}

impl FilterRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
        }
    }

    /// Creates a registry preloaded with the built-in filters.
    pub fn builtin() -> Self {
        let mut reg = Self::new();
        reg.register(Box::new(FilterTypeXorInc));
        reg.register(Box::new(FilterTypeXorBlood));
        reg.register(Box::new(FilterTypeBitswap));
        reg
    }

    /// Adds a filter driver. A later registration with the same code
    /// shadows the earlier one.
    pub fn register(&mut self, filter: Box<dyn FilterType>) {
        self.filters.push(filter);
    }

    /// Looks up a driver by its persistent code.
    pub fn get(&self, code: &str) -> Option<&dyn FilterType> {
        self.filters
            .iter()
            .rev()
            .find(|f| f.code() == code)
            .map(|f| f.as_ref())
    }

    /// Iterates over the registered drivers.
    pub fn iter(&self) -> impl Iterator<Item = &dyn FilterType> {
        self.filters.iter().map(|f| f.as_ref())
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
