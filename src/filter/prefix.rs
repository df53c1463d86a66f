//! Length-prefix envelope transforms.
//!
//! Several formats store filtered data with the decompressed length as a
//! u32-LE field in front of the payload. These two transforms handle that
//! envelope by *wrapping* a child transform, so the child codec never has
//! to know about it:
//!
//! - [`PrefixStrip`] (decode direction): reads the length field, runs the
//!   child over the payload, clamps the output to the declared length and
//!   zero-pads if the child runs dry early.
//! - [`PrefixAdd`] (encode direction): writes the expected input length
//!   first, then feeds everything through the child.
//!
//! Wrap [`Identity`](super::Identity) to get the bare envelope with an
//! unencoded payload.

use std::io;

use super::Transform;

/// Strips a u32-LE decompressed-length prefix around a child transform.
#[derive(Debug, Clone)]
pub struct PrefixStrip<T> {
    child: T,
    header: [u8; 4],
    header_have: usize,
    /// Bytes of post-child output still owed; `None` until the header has
    /// been read.
    remaining: Option<u64>,
}

impl<T: Transform> PrefixStrip<T> {
    /// Wraps `child` as the payload decoder.
    pub fn new(child: T) -> Self {
        Self {
            child,
            header: [0; 4],
            header_have: 0,
            remaining: None,
        }
    }
}

impl<T: Transform> Transform for PrefixStrip<T> {
    fn reset(&mut self, expected_input_len: u64) {
        self.header_have = 0;
        self.remaining = None;
        self.child.reset(expected_input_len.saturating_sub(4));
    }

    fn transform(&mut self, input: &[u8], output: &mut [u8]) -> io::Result<(usize, usize)> {
        let mut consumed = 0usize;

        if self.remaining.is_none() {
            let want = 4 - self.header_have;
            let take = want.min(input.len());
            self.header[self.header_have..self.header_have + take]
                .copy_from_slice(&input[..take]);
            self.header_have += take;
            consumed += take;
            if self.header_have < 4 {
                return Ok((consumed, 0));
            }
            self.remaining = Some(u32::from_le_bytes(self.header) as u64);
        }

        let remaining = self.remaining.unwrap();
        if remaining == 0 {
            // Declared length reached; swallow any trailing payload.
            return Ok((consumed + (input.len() - consumed), 0));
        }

        let out_max = (output.len() as u64).min(remaining) as usize;
        let (c, p) = self
            .child
            .transform(&input[consumed..], &mut output[..out_max])?;
        consumed += c;
        let mut produced = p;
        self.remaining = Some(remaining - p as u64);

        if input[consumed..].is_empty() && p == 0 {
            // Child is done but the declared length has not been reached
            // yet, so zero-pad.
            let pad = (output.len() - produced).min((remaining - p as u64) as usize);
            output[produced..produced + pad].fill(0);
            produced += pad;
            self.remaining = Some(remaining - p as u64 - pad as u64);
        }

        Ok((consumed, produced))
    }
}

/// Prepends a u32-LE decompressed-length prefix around a child transform.
///
/// The length written is the `expected_input_len` passed to
/// [`reset`](Transform::reset), so callers must reset with the true
/// pre-filter length before feeding data.
#[derive(Debug, Clone)]
pub struct PrefixAdd<T> {
    child: T,
    header: [u8; 4],
    header_sent: usize,
}

impl<T: Transform> PrefixAdd<T> {
    /// Wraps `child` as the payload encoder.
    pub fn new(child: T) -> Self {
        Self {
            child,
            header: [0; 4],
            header_sent: 4,
        }
    }
}

impl<T: Transform> Transform for PrefixAdd<T> {
    fn reset(&mut self, expected_input_len: u64) {
        self.header = (expected_input_len as u32).to_le_bytes();
        self.header_sent = 0;
        self.child.reset(expected_input_len);
    }

    fn transform(&mut self, input: &[u8], output: &mut [u8]) -> io::Result<(usize, usize)> {
        if self.header_sent < 4 {
            let take = (4 - self.header_sent).min(output.len());
            output[..take].copy_from_slice(&self.header[self.header_sent..self.header_sent + take]);
            self.header_sent += take;
            return Ok((0, take));
        }
        self.child.transform(input, output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FilterRead, FilterWrite, Identity};
    use std::io::{Read, Write};

    #[test]
    fn test_add_writes_length_prefix() {
        let mut w = FilterWrite::new(Vec::new(), PrefixAdd::new(Identity), 5);
        w.write_all(b"hello").unwrap();
        let (sizes, stored) = w.finish().unwrap();
        assert_eq!(stored, b"\x05\x00\x00\x00hello");
        assert_eq!(sizes.real, 5);
        assert_eq!(sizes.stored, 9);
    }

    #[test]
    fn test_strip_reads_length_prefix() {
        let stored = b"\x05\x00\x00\x00hello";
        let mut r = FilterRead::new(&stored[..], PrefixStrip::new(Identity), stored.len() as u64);
        let mut out = Vec::new();
        r.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn test_strip_zero_pads_short_payload() {
        // Declared length 6, but only 4 payload bytes present.
        let stored = b"\x06\x00\x00\x00abcd";
        let mut r = FilterRead::new(&stored[..], PrefixStrip::new(Identity), stored.len() as u64);
        let mut out = Vec::new();
        r.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"abcd\x00\x00");
    }

    #[test]
    fn test_strip_clamps_long_payload() {
        // Declared length 3, payload longer; excess is discarded.
        let stored = b"\x03\x00\x00\x00abcdef";
        let mut r = FilterRead::new(&stored[..], PrefixStrip::new(Identity), stored.len() as u64);
        let mut out = Vec::new();
        r.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"abc");
    }

    #[test]
    fn test_envelope_roundtrip() {
        let data = b"payload bytes of arbitrary length";
        let mut w = FilterWrite::new(Vec::new(), PrefixAdd::new(Identity), data.len() as u64);
        w.write_all(data).unwrap();
        let (_, stored) = w.finish().unwrap();
        let mut r = FilterRead::new(&stored[..], PrefixStrip::new(Identity), stored.len() as u64);
        let mut out = Vec::new();
        r.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
    }
}
