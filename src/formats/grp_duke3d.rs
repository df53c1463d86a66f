//! Duke Nukem 3D .GRP archives.
//!
//! A 12-byte `KenSilverman` signature and a u32-LE file count, then one
//! 16-byte directory record per file (12-byte name + u32-LE size), then the
//! file bodies in directory order. Offsets are implicit, so the driver
//! never has to write any.

use std::io::{Read, Seek, SeekFrom, Write};

use crate::archive::Archive;
use crate::entry::{Entry, EntryId};
use crate::error::{Error, Result};
use crate::fat::{FatArchive, FatDriver, FatOptions, FatState, shift_entries};
use crate::format::{ArchiveFormat, Certainty, SuppData};
use crate::stream::{
    DynStream, SegStream, Stream, read_name_padded, read_u32_le, write_name_padded, write_u32_le,
};

const GRP_SIGNATURE: &[u8; 12] = b"KenSilverman";
const GRP_FILECOUNT_OFFSET: u64 = 12;
const GRP_HEADER_LEN: u64 = 16; // signature + u32le file count
const GRP_FAT_OFFSET: u64 = GRP_HEADER_LEN;
const GRP_FILENAME_FIELD_LEN: usize = 12;
const GRP_MAX_FILENAME_LEN: usize = GRP_FILENAME_FIELD_LEN;
const GRP_FAT_ENTRY_LEN: u64 = 16; // filename + u32le size
const GRP_FIRST_FILE_OFFSET: u64 = GRP_FAT_OFFSET; // empty archive only

/// Maximum file count we will load.
const GRP_SAFETY_MAX_FILECOUNT: u32 = 8192;

/// A GRP archive over any backing stream.
pub type GrpArchive<S> = FatArchive<S, GrpDriver>;

fn fat_entry_offset(index: u32) -> u64 {
    GRP_HEADER_LEN + index as u64 * GRP_FAT_ENTRY_LEN
}

/// Opens an existing GRP archive.
pub fn open<S: Stream>(stream: S) -> Result<GrpArchive<S>> {
    let mut content = SegStream::new(stream)?;

    // Sanity checks still run in case the caller forced an archive open
    // after a failed signature check.
    content.seek(SeekFrom::Start(GRP_FILECOUNT_OFFSET))?;
    let num_files =
        read_u32_le(&mut content).map_err(|_| Error::Truncated("file too short".into()))?;
    if num_files >= GRP_SAFETY_MAX_FILECOUNT {
        return Err(Error::FormatMismatch(
            "too many files or corrupted archive".into(),
        ));
    }

    let mut entries = Vec::with_capacity(num_files as usize);
    let mut off_next = GRP_HEADER_LEN + num_files as u64 * GRP_FAT_ENTRY_LEN;
    for i in 0..num_files {
        let name = read_name_padded(&mut content, GRP_FILENAME_FIELD_LEN)
            .map_err(|_| Error::Truncated("stream ends inside directory".into()))?;
        let size = read_u32_le(&mut content)
            .map_err(|_| Error::Truncated("stream ends inside directory".into()))?;

        let mut e = Entry::new(name, size as u64);
        e.index = i;
        e.offset = off_next;
        off_next += size as u64;
        entries.push(e);
    }

    Ok(FatArchive::assemble(
        content,
        GrpDriver,
        FatOptions {
            first_file_offset: GRP_FIRST_FILE_OFFSET,
            max_name_len: GRP_MAX_FILENAME_LEN,
        },
        entries,
    ))
}

/// Writes out a blank GRP archive and opens it.
pub fn create<S: Stream>(mut stream: S) -> Result<GrpArchive<S>> {
    stream.seek(SeekFrom::Start(0))?;
    stream.write_all(b"KenSilverman\0\0\0\0")?;
    open(stream)
}

/// The per-format hooks for GRP.
pub struct GrpDriver;

impl GrpDriver {
    fn update_file_count<S: Stream>(&self, state: &mut FatState<S>, count: u32) -> Result<()> {
        state.content.seek(SeekFrom::Start(GRP_FILECOUNT_OFFSET))?;
        write_u32_le(&mut state.content, count)?;
        Ok(())
    }
}

impl<S: Stream> FatDriver<S> for GrpDriver {
    fn update_file_name(
        &mut self,
        state: &mut FatState<S>,
        id: EntryId,
        new_name: &str,
    ) -> Result<()> {
        let off = fat_entry_offset(state.entry(id)?.index);
        state.content.seek(SeekFrom::Start(off))?;
        write_name_padded(&mut state.content, new_name, GRP_FILENAME_FIELD_LEN)?;
        Ok(())
    }

    // No offsets are stored in this format, so update_file_offset stays a
    // no-op.

    fn update_file_size(&mut self, state: &mut FatState<S>, id: EntryId, _delta: i64) -> Result<()> {
        let e = state.entry(id)?;
        let (off, size) = (fat_entry_offset(e.index) + GRP_FILENAME_FIELD_LEN as u64, e.stored_size);
        state.content.seek(SeekFrom::Start(off))?;
        write_u32_le(&mut state.content, size as u32)?;
        Ok(())
    }

    fn pre_insert(
        &mut self,
        state: &mut FatState<S>,
        _before: Option<EntryId>,
        new_entry: &mut Entry,
    ) -> Result<()> {
        new_entry.header_len = 0;

        // The new directory record isn't accounted for in the entry list
        // yet, so shift the new file past it manually.
        new_entry.offset += GRP_FAT_ENTRY_LEN;

        state
            .content
            .seek(SeekFrom::Start(fat_entry_offset(new_entry.index)))?;
        state.content.insert(GRP_FAT_ENTRY_LEN)?;
        new_entry.name.make_ascii_uppercase();
        write_name_padded(&mut state.content, &new_entry.name, GRP_FILENAME_FIELD_LEN)?;
        write_u32_le(&mut state.content, new_entry.stored_size as u32)?;

        // Everything after the directory moves down one record.
        let fat_end = GRP_FAT_OFFSET + state.entries().len() as u64 * GRP_FAT_ENTRY_LEN;
        shift_entries(self, state, None, fat_end, GRP_FAT_ENTRY_LEN as i64, 0)?;

        let count = state.entries().len() as u32 + 1;
        self.update_file_count(state, count)
    }

    fn pre_remove(&mut self, state: &mut FatState<S>, id: EntryId) -> Result<()> {
        // One fewer directory record: pull everything back before the
        // record is dropped, so the offsets land in the right slots.
        let fat_end = GRP_FAT_OFFSET + state.entries().len() as u64 * GRP_FAT_ENTRY_LEN;
        shift_entries(self, state, None, fat_end, -(GRP_FAT_ENTRY_LEN as i64), 0)?;

        let off = fat_entry_offset(state.entry(id)?.index);
        state.content.seek(SeekFrom::Start(off))?;
        state.content.remove(GRP_FAT_ENTRY_LEN)?;

        let count = state.entries().len() as u32 - 1;
        self.update_file_count(state, count)
    }
}

/// Format front-end for GRP (`grp-duke3d`).
pub struct GrpDuke3dFormat;

impl ArchiveFormat for GrpDuke3dFormat {
    fn code(&self) -> &'static str {
        "grp-duke3d"
    }

    fn name(&self) -> &'static str {
        "Duke Nukem 3D Group File"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["grp"]
    }

    fn games(&self) -> &'static [&'static str] {
        &["Duke Nukem 3D", "Redneck Rampage", "Shadow Warrior"]
    }

    fn probe(&self, content: &mut dyn Stream) -> Result<Certainty> {
        if content.len()? < GRP_FAT_ENTRY_LEN {
            return Ok(Certainty::DefinitelyNo); // too short
        }
        let mut sig = [0u8; 12];
        content.seek(SeekFrom::Start(0))?;
        content.read_exact(&mut sig)?;
        if &sig == GRP_SIGNATURE {
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
    use std::io::Cursor;

    #[test]
    fn test_probe_rejects_short_stream() {
        let f = GrpDuke3dFormat;
        let mut s = Cursor::new(b"KenS".to_vec());
        assert_eq!(f.probe(&mut s).unwrap(), Certainty::DefinitelyNo);
    }

    #[test]
    fn test_probe_rejects_bad_signature() {
        let f = GrpDuke3dFormat;
        let mut s = Cursor::new(b"NotSilverman\0\0\0\0".to_vec());
        assert_eq!(f.probe(&mut s).unwrap(), Certainty::DefinitelyNo);
    }

    #[test]
    fn test_probe_accepts_signature() {
        let f = GrpDuke3dFormat;
        let mut s = Cursor::new(b"KenSilverman\0\0\0\0".to_vec());
        assert_eq!(f.probe(&mut s).unwrap(), Certainty::DefinitelyYes);
    }

    #[test]
    fn test_open_rejects_absurd_file_count() {
        let mut raw = b"KenSilverman".to_vec();
        raw.extend_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            open(Cursor::new(raw)),
            Err(Error::FormatMismatch(_))
        ));
    }
}
