//! Blood .RFF archives.
//!
//! A 32-byte header (`RFF\x1A`, u16-LE version, u32-LE directory offset,
//! u32-LE file count), the member bodies, then the directory: 48-byte
//! records holding offset, size, a flags byte and an 8.3 name split into
//! extension and base fields. From version 3.0.1 the directory itself is
//! encrypted with the running-key XOR cipher, seeded from the low byte of
//! its own offset, and members flagged `0x10` are stored with the first
//! 256 bytes encrypted (the `xor-blood` filter).
//!
//! The decrypted directory is held in an in-memory segmented stream while
//! the archive is open; flush rewrites it after the last member body and
//! fixes up the header.

use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use crate::archive::Archive;
use crate::entry::{Attributes, Entry, EntryId};
use crate::error::{Error, Result};
use crate::fat::{FatArchive, FatDriver, FatOptions, FatState};
use crate::filter::{Transform, XorTransform};
use crate::format::{ArchiveFormat, Certainty, SuppData};
use crate::stream::{
    DynStream, SegStream, Stream, read_u16_le, read_u32_le, write_name_padded, write_u8,
    write_u16_le, write_u32_le,
};

const RFF_SIGNATURE: &[u8; 4] = b"RFF\x1a";
const RFF_FATOFFSET_OFFSET: u64 = 8;
const RFF_FILECOUNT_OFFSET: u64 = 12;
const RFF_HEADER_LEN: u64 = 32;
const RFF_FIRST_FILE_OFFSET: u64 = RFF_HEADER_LEN;
const RFF_MAX_FILENAME_LEN: usize = 12; // 8.3 plus the dot

const RFF_FAT_ENTRY_LEN: u64 = 48;
const RFF_FILEOFFSET_OFFSET: u64 = 16;
const RFF_FILESIZE_OFFSET: u64 = 20;
const RFF_FLAGS_OFFSET: u64 = 32;
const RFF_FILENAME_OFFSET: u64 = 33; // ext(3) then base(8)

/// First version with directory and member encryption.
const RFF_VERSION_CRYPT: u16 = 0x301;

const RFF_FILE_ENCRYPTED: u8 = 0x10;

/// Maximum file count we will load.
const RFF_SAFETY_MAX_FILECOUNT: u32 = 8192;

/// An RFF archive over any backing stream.
pub type RffArchive<S> = FatArchive<S, RffDriver>;

fn fat_entry_offset(index: u32) -> u64 {
    index as u64 * RFF_FAT_ENTRY_LEN
}

/// XORs a whole buffer with the directory cipher for the given directory
/// offset. Self-inverse, so one pass serves both directions.
fn crypt_fat(buf: &mut [u8], off_fat: u64) -> std::io::Result<()> {
    let mut t = XorTransform::blood((off_fat & 0xFF) as u8, 0);
    t.reset(buf.len() as u64);
    let mut out = vec![0u8; buf.len()];
    t.transform(buf, &mut out)?;
    buf.copy_from_slice(&out);
    Ok(())
}

/// Validates and splits an 8.3 filename into base and extension.
fn split_filename(full: &str) -> Result<(String, String)> {
    let pos_dot = full.rfind('.');
    let too_long = match pos_dot {
        // Without a dot the whole name is the base.
        None => full.len() > 8,
        // '.' + up to 3 chars of extension, up to 8 of base.
        Some(p) => full.len() - p > 4 || p > 8,
    };
    if too_long {
        return Err(Error::InvalidName(
            "maximum filename length is 8.3 chars".into(),
        ));
    }
    Ok(match pos_dot {
        Some(p) => (full[..p].to_string(), full[p + 1..].to_string()),
        None => (full.to_string(), String::new()),
    })
}

/// Opens an existing RFF archive.
pub fn open<S: Stream>(stream: S) -> Result<RffArchive<S>> {
    let mut content = SegStream::new(stream)?;

    content.seek(SeekFrom::Start(4))?;
    let truncated = || Error::Truncated("file too short".into());
    let version = read_u16_le(&mut content).map_err(|_| truncated())?;
    let _ = read_u16_le(&mut content).map_err(|_| truncated())?;
    let off_fat = read_u32_le(&mut content).map_err(|_| truncated())? as u64;
    let num_files = read_u32_le(&mut content).map_err(|_| truncated())?;

    if num_files >= RFF_SAFETY_MAX_FILECOUNT {
        return Err(Error::FormatMismatch(
            "too many files or corrupted archive".into(),
        ));
    }

    // Pull the directory into memory, decrypting if this version calls
    // for it.
    let mut fat_raw = vec![0u8; num_files as usize * RFF_FAT_ENTRY_LEN as usize];
    content.seek(SeekFrom::Start(off_fat))?;
    content
        .read_exact(&mut fat_raw)
        .map_err(|_| Error::Truncated("stream ends inside directory".into()))?;
    if version >= RFF_VERSION_CRYPT {
        crypt_fat(&mut fat_raw, off_fat)?;
    }

    let mut entries = Vec::with_capacity(num_files as usize);
    for i in 0..num_files as usize {
        let rec = &fat_raw[i * RFF_FAT_ENTRY_LEN as usize..(i + 1) * RFF_FAT_ENTRY_LEN as usize];
        let offset = u32::from_le_bytes(rec[16..20].try_into().unwrap());
        let size = u32::from_le_bytes(rec[20..24].try_into().unwrap());
        let flags = rec[RFF_FLAGS_OFFSET as usize];
        let ext = trim_name(&rec[33..36]);
        let base = trim_name(&rec[36..44]);
        let name = if ext.is_empty() {
            base
        } else {
            format!("{}.{}", base, ext)
        };

        let mut e = Entry::new(name, size as u64);
        e.index = i as u32;
        e.offset = offset as u64;
        if flags & RFF_FILE_ENCRYPTED != 0 {
            e.attrs |= Attributes::ENCRYPTED;
            e.filter = "xor-blood".to_string();
        }
        entries.push(e);
    }

    let fat = SegStream::new(Cursor::new(fat_raw))?;
    Ok(FatArchive::assemble(
        content,
        RffDriver {
            fat,
            version,
            modified_fat: false,
        },
        FatOptions {
            first_file_offset: RFF_FIRST_FILE_OFFSET,
            max_name_len: RFF_MAX_FILENAME_LEN,
        },
        entries,
    ))
}

fn trim_name(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Writes out a blank RFF header and opens it.
pub fn create<S: Stream>(mut stream: S) -> Result<RffArchive<S>> {
    stream.seek(SeekFrom::Start(0))?;
    stream.write_all(RFF_SIGNATURE)?;
    write_u16_le(&mut stream, 0x200)?; // default version, no encryption
    write_u16_le(&mut stream, 0)?;
    write_u32_le(&mut stream, RFF_HEADER_LEN as u32)?; // FAT offset
    write_u32_le(&mut stream, 0)?; // file count
    stream.write_all(&[0u8; 16])?;
    open(stream)
}

/// The per-format hooks for RFF. Directory edits land in the in-memory
/// copy; `flush` writes it back out behind the member data.
pub struct RffDriver {
    fat: SegStream<Cursor<Vec<u8>>>,
    version: u16,
    modified_fat: bool,
}

impl RffDriver {
    /// The archive version (0x200 plain, 0x301 encrypted).
    pub fn version(&self) -> u16 {
        self.version
    }

    fn update_file_count<S: Stream>(&self, state: &mut FatState<S>, count: u32) -> Result<()> {
        state.content.seek(SeekFrom::Start(RFF_FILECOUNT_OFFSET))?;
        write_u32_le(&mut state.content, count)?;
        Ok(())
    }
}

impl<S: Stream> FatDriver<S> for RffDriver {
    fn update_file_name(
        &mut self,
        state: &mut FatState<S>,
        id: EntryId,
        new_name: &str,
    ) -> Result<()> {
        let (base, ext) = split_filename(new_name)?;
        let index = state.entry(id)?.index;
        self.fat
            .seek(SeekFrom::Start(fat_entry_offset(index) + RFF_FILENAME_OFFSET))?;
        write_name_padded(&mut self.fat, &ext, 3)?;
        write_name_padded(&mut self.fat, &base, 8)?;
        self.modified_fat = true;
        Ok(())
    }

    fn update_file_offset(
        &mut self,
        state: &mut FatState<S>,
        id: EntryId,
        _delta: i64,
    ) -> Result<()> {
        let e = state.entry(id)?;
        let (index, offset) = (e.index, e.offset);
        self.fat
            .seek(SeekFrom::Start(fat_entry_offset(index) + RFF_FILEOFFSET_OFFSET))?;
        write_u32_le(&mut self.fat, offset as u32)?;
        self.modified_fat = true;
        Ok(())
    }

    fn update_file_size(&mut self, state: &mut FatState<S>, id: EntryId, _delta: i64) -> Result<()> {
        let e = state.entry(id)?;
        let (index, size) = (e.index, e.stored_size);
        self.fat
            .seek(SeekFrom::Start(fat_entry_offset(index) + RFF_FILESIZE_OFFSET))?;
        write_u32_le(&mut self.fat, size as u32)?;
        self.modified_fat = true;
        Ok(())
    }

    fn pre_insert(
        &mut self,
        _state: &mut FatState<S>,
        _before: Option<EntryId>,
        new_entry: &mut Entry,
    ) -> Result<()> {
        new_entry.header_len = 0;

        let mut flags = 0u8;
        if new_entry.attrs.contains(Attributes::ENCRYPTED) {
            if self.version >= RFF_VERSION_CRYPT {
                new_entry.filter = "xor-blood".to_string();
                flags |= RFF_FILE_ENCRYPTED;
            } else {
                // This version doesn't support encryption; drop the
                // attribute.
                new_entry.attrs &= !Attributes::ENCRYPTED;
            }
        }

        new_entry.name.make_ascii_uppercase();
        let (base, ext) = split_filename(&new_entry.name)?;

        // The record has to exist before the engine rewrites the offsets
        // of every following entry, or those updates land in the wrong
        // slots.
        self.fat
            .seek(SeekFrom::Start(fat_entry_offset(new_entry.index)))?;
        self.fat.insert(RFF_FAT_ENTRY_LEN)?;
        self.fat.write_all(&[0u8; 16])?; // unknown
        write_u32_le(&mut self.fat, new_entry.offset as u32)?;
        write_u32_le(&mut self.fat, new_entry.stored_size as u32)?;
        write_u32_le(&mut self.fat, 0)?; // unknown
        write_u32_le(&mut self.fat, 0)?; // last modified time
        write_u8(&mut self.fat, flags)?;
        write_name_padded(&mut self.fat, &ext, 3)?;
        write_name_padded(&mut self.fat, &base, 8)?;
        write_u32_le(&mut self.fat, 0)?; // unknown

        self.modified_fat = true;
        Ok(())
    }

    fn post_insert(&mut self, state: &mut FatState<S>, _id: EntryId) -> Result<()> {
        let count = state.entries().len() as u32;
        self.update_file_count(state, count)
    }

    fn pre_remove(&mut self, state: &mut FatState<S>, id: EntryId) -> Result<()> {
        let index = state.entry(id)?.index;
        self.fat.seek(SeekFrom::Start(fat_entry_offset(index)))?;
        self.fat.remove(RFF_FAT_ENTRY_LEN)?;
        self.modified_fat = true;
        Ok(())
    }

    fn post_remove(&mut self, state: &mut FatState<S>, _entry: &Entry) -> Result<()> {
        let count = state.entries().len() as u32;
        self.update_file_count(state, count)
    }

    fn flush(&mut self, state: &mut FatState<S>) -> Result<()> {
        if !self.modified_fat {
            return Ok(());
        }

        // The directory goes immediately after the last member body.
        let off_fat = match state.entries().last() {
            Some(last) => last.offset + last.total_len(),
            None => RFF_FIRST_FILE_OFFSET,
        };

        state.content.seek(SeekFrom::Start(RFF_FATOFFSET_OFFSET))?;
        write_u32_le(&mut state.content, off_fat as u32)?;

        // Grow or shrink the archive so it ends exactly at the end of the
        // directory. Stale directory bytes past the data region are fair
        // game; the in-memory copy is authoritative.
        let len_archive = state.content.len();
        let end_fat = off_fat + state.entries().len() as u64 * RFF_FAT_ENTRY_LEN;
        state.content.seek(SeekFrom::Start(off_fat))?;
        if end_fat > len_archive {
            state.content.insert(end_fat - len_archive)?;
        } else if end_fat < len_archive {
            state.content.remove(len_archive - end_fat)?;
        }

        let mut fat_bytes = vec![0u8; self.fat.len() as usize];
        self.fat.seek(SeekFrom::Start(0))?;
        self.fat.read_exact(&mut fat_bytes)?;
        if self.version >= RFF_VERSION_CRYPT {
            crypt_fat(&mut fat_bytes, off_fat)?;
        }
        state.content.seek(SeekFrom::Start(off_fat))?;
        state.content.write_all(&fat_bytes)?;

        self.modified_fat = false;
        Ok(())
    }
}

/// Format front-end for RFF (`rff-blood`).
pub struct RffBloodFormat;

impl ArchiveFormat for RffBloodFormat {
    fn code(&self) -> &'static str {
        "rff-blood"
    }

    fn name(&self) -> &'static str {
        "Monolith Resource File Format"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["rff"]
    }

    fn games(&self) -> &'static [&'static str] {
        &["Blood"]
    }

    fn probe(&self, content: &mut dyn Stream) -> Result<Certainty> {
        if content.len()? < RFF_HEADER_LEN {
            return Ok(Certainty::DefinitelyNo); // too short
        }
        let mut sig = [0u8; 4];
        content.seek(SeekFrom::Start(0))?;
        content.read_exact(&mut sig)?;
        if &sig == RFF_SIGNATURE {
            Ok(Certainty::DefinitelyYes)
        } else {
            Ok(Certainty::DefinitelyNo)
        }
    }

    fn create(&self, content: DynStream, _supps: SuppData) -> Result<Box<dyn Archive>> {
        Ok(Box::new(create(content)?))
    }

    fn open(&self, content: DynStream, _supps: SuppData) -> Result<Box<dyn Archive>> {
        Ok(Box::new(open(content)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_filename() {
        assert_eq!(
            split_filename("FILE.TXT").unwrap(),
            ("FILE".to_string(), "TXT".to_string())
        );
        assert_eq!(
            split_filename("NOEXT").unwrap(),
            ("NOEXT".to_string(), String::new())
        );
        assert!(split_filename("WAYTOOLONGBASE").is_err());
        assert!(split_filename("FILE.LONG").is_err());
        assert!(split_filename("TOOLONGBASE.X").is_err());
    }

    #[test]
    fn test_crypt_fat_is_self_inverse() {
        let original: Vec<u8> = (0u8..96).collect();
        let mut buf = original.clone();
        crypt_fat(&mut buf, 0x1234).unwrap();
        assert_ne!(buf, original);
        crypt_fat(&mut buf, 0x1234).unwrap();
        assert_eq!(buf, original);
    }

    #[test]
    fn test_probe_signature() {
        use std::io::Cursor;
        let mut raw = RFF_SIGNATURE.to_vec();
        raw.extend_from_slice(&[0u8; 28]);
        let mut s = Cursor::new(raw);
        assert_eq!(
            RffBloodFormat.probe(&mut s).unwrap(),
            Certainty::DefinitelyYes
        );
        let mut s = Cursor::new(vec![0u8; 32]);
        assert_eq!(
            RffBloodFormat.probe(&mut s).unwrap(),
            Certainty::DefinitelyNo
        );
    }
}
