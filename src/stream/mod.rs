//! Stream adapters and the backing-stream contract.
//!
//! The core expects its backing storage to be a seekable random-access byte
//! stream supporting truncation — the [`Stream`] trait. Two adapters are
//! layered on top of it:
//!
//! - [`SegStream`]: records pending inserts and removals as a segment list
//!   so many structural edits cost O(1) until a single commit pass shifts
//!   the bytes once.
//! - [`Window`]: a relocatable, resizable view of a byte range, used to keep
//!   open member-file handles valid while the archive shifts data
//!   underneath them.
//!
//! The module also provides the little-endian and padded-string helpers the
//! format drivers use to read and write directory records.

pub mod seg;
pub mod window;

pub use seg::SegStream;
pub use window::Window;

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

/// Truncate-to-length support, the one operation `std::io` has no trait for.
pub trait Truncate {
    /// Sets the stream length to `new_len`, discarding any bytes beyond it.
    /// Extending past the current end is permitted and zero-fills.
    fn truncate(&mut self, new_len: u64) -> io::Result<()>;
}

impl Truncate for File {
    fn truncate(&mut self, new_len: u64) -> io::Result<()> {
        self.set_len(new_len)
    }
}

impl Truncate for Cursor<Vec<u8>> {
    fn truncate(&mut self, new_len: u64) -> io::Result<()> {
        self.get_mut().resize(new_len as usize, 0);
        Ok(())
    }
}

impl<T: Truncate + ?Sized> Truncate for Box<T> {
    fn truncate(&mut self, new_len: u64) -> io::Result<()> {
        (**self).truncate(new_len)
    }
}

impl<T: Truncate + ?Sized> Truncate for &mut T {
    fn truncate(&mut self, new_len: u64) -> io::Result<()> {
        (**self).truncate(new_len)
    }
}

/// The backing-stream contract: random-access seek, short-read semantics
/// only at EOF, full writes, size query, truncation and flush.
///
/// Blanket-implemented for anything with the right `std::io` traits plus
/// [`Truncate`], including `Cursor<Vec<u8>>`, [`File`] and boxed trait
/// objects.
pub trait Stream: Read + Write + Seek + Truncate {
    /// Returns the current stream length without disturbing the position.
    fn len(&mut self) -> io::Result<u64> {
        let pos = self.stream_position()?;
        let end = self.seek(SeekFrom::End(0))?;
        self.seek(SeekFrom::Start(pos))?;
        Ok(end)
    }

    /// Returns true if the stream is empty.
    fn is_empty(&mut self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl<T: Read + Write + Seek + Truncate + ?Sized> Stream for T {}

/// A boxed backing stream, the form the format registry works with.
pub type DynStream = Box<dyn Stream>;

/// Reads a single byte.
pub fn read_u8<R: Read + ?Sized>(r: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

/// Reads a little-endian u16.
pub fn read_u16_le<R: Read + ?Sized>(r: &mut R) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

/// Reads a little-endian u32.
pub fn read_u32_le<R: Read + ?Sized>(r: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Writes a single byte.
pub fn write_u8<W: Write + ?Sized>(w: &mut W, v: u8) -> io::Result<()> {
    w.write_all(&[v])
}

/// Writes a little-endian u16.
pub fn write_u16_le<W: Write + ?Sized>(w: &mut W, v: u16) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

/// Writes a little-endian u32.
pub fn write_u32_le<W: Write + ?Sized>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

/// Reads a fixed-length NUL-padded name field, stopping at the first NUL.
///
/// Bytes past the terminator are read and discarded so the stream ends up
/// positioned immediately after the field. Non-UTF-8 bytes are replaced.
pub fn read_name_padded<R: Read + ?Sized>(r: &mut R, field_len: usize) -> io::Result<String> {
    let mut buf = vec![0u8; field_len];
    r.read_exact(&mut buf)?;
    let end = buf.iter().position(|&b| b == 0).unwrap_or(field_len);
    Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
}

/// Writes a name into a fixed-length field, NUL-padding the remainder.
///
/// The name must already fit the field; callers are expected to have
/// validated the length against the format's limit.
pub fn write_name_padded<W: Write + ?Sized>(w: &mut W, name: &str, field_len: usize) -> io::Result<()> {
    debug_assert!(name.len() <= field_len);
    let mut buf = vec![0u8; field_len];
    let n = name.len().min(field_len);
    buf[..n].copy_from_slice(&name.as_bytes()[..n]);
    w.write_all(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_truncate() {
        let mut c = Cursor::new(vec![1, 2, 3, 4, 5]);
        c.truncate(3).unwrap();
        assert_eq!(c.get_ref(), &vec![1, 2, 3]);
        c.truncate(5).unwrap();
        assert_eq!(c.get_ref(), &vec![1, 2, 3, 0, 0]);
    }

    #[test]
    fn test_stream_len_preserves_position() {
        let mut c = Cursor::new(vec![0u8; 10]);
        c.seek(SeekFrom::Start(4)).unwrap();
        assert_eq!(Stream::len(&mut c).unwrap(), 10);
        assert_eq!(c.stream_position().unwrap(), 4);
    }

    #[test]
    fn test_name_padded_roundtrip() {
        let mut buf = Vec::new();
        write_name_padded(&mut buf, "HELLO.TXT", 12).unwrap();
        assert_eq!(buf.len(), 12);
        let name = read_name_padded(&mut Cursor::new(buf), 12).unwrap();
        assert_eq!(name, "HELLO.TXT");
    }

    #[test]
    fn test_name_padded_full_width() {
        let mut buf = Vec::new();
        write_name_padded(&mut buf, "TWELVECHARSS", 12).unwrap();
        let name = read_name_padded(&mut Cursor::new(buf), 12).unwrap();
        assert_eq!(name, "TWELVECHARSS");
    }

    #[test]
    fn test_u32_le_roundtrip() {
        let mut buf = Vec::new();
        write_u32_le(&mut buf, 0xDEAD_BEEF).unwrap();
        assert_eq!(buf, vec![0xEF, 0xBE, 0xAD, 0xDE]);
        assert_eq!(read_u32_le(&mut Cursor::new(buf)).unwrap(), 0xDEAD_BEEF);
    }
}
