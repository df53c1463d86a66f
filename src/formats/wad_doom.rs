//! Doom .WAD archives.
//!
//! A 4-byte `IWAD`/`PWAD` signature, u32-LE lump count and u32-LE directory
//! offset, then 16-byte directory records (u32-LE offset, u32-LE size,
//! 8-byte name). Archives written by this driver keep the directory
//! immediately after the header, before the lump bodies.

use std::io::{Read, Seek, SeekFrom, Write};

use crate::archive::Archive;
use crate::entry::{Entry, EntryId};
use crate::error::{Error, Result};
use crate::fat::{FatArchive, FatDriver, FatOptions, FatState, shift_entries};
use crate::format::{ArchiveFormat, Certainty, SuppData};
use crate::stream::{
    DynStream, SegStream, Stream, read_name_padded, read_u32_le, write_name_padded, write_u32_le,
};

const WAD_FILECOUNT_OFFSET: u64 = 4;
const WAD_HEADER_LEN: u64 = 12;
const WAD_FAT_OFFSET: u64 = WAD_HEADER_LEN; // assuming no extra data after header
const WAD_FILENAME_FIELD_LEN: usize = 8;
const WAD_MAX_FILENAME_LEN: usize = WAD_FILENAME_FIELD_LEN;
const WAD_FAT_ENTRY_LEN: u64 = 16;
const WAD_FIRST_FILE_OFFSET: u64 = WAD_HEADER_LEN; // empty archive only

/// Maximum lump count we will load.
const WAD_SAFETY_MAX_FILECOUNT: u32 = 8192;

/// A WAD archive over any backing stream.
pub type WadArchive<S> = FatArchive<S, WadDriver>;

fn fat_entry_offset(index: u32) -> u64 {
    WAD_HEADER_LEN + index as u64 * WAD_FAT_ENTRY_LEN
}

/// Opens an existing WAD archive.
pub fn open<S: Stream>(stream: S) -> Result<WadArchive<S>> {
    let mut content = SegStream::new(stream)?;

    content.seek(SeekFrom::Start(WAD_FILECOUNT_OFFSET))?;
    let num_files =
        read_u32_le(&mut content).map_err(|_| Error::Truncated("file too short".into()))?;
    let off_fat =
        read_u32_le(&mut content).map_err(|_| Error::Truncated("file too short".into()))?;
    if num_files >= WAD_SAFETY_MAX_FILECOUNT {
        return Err(Error::FormatMismatch(
            "too many files or corrupted archive".into(),
        ));
    }

    content.seek(SeekFrom::Start(off_fat as u64))?;
    let mut entries = Vec::with_capacity(num_files as usize);
    for i in 0..num_files {
        let truncated = || Error::Truncated("stream ends inside directory".into());
        let offset = read_u32_le(&mut content).map_err(|_| truncated())?;
        let size = read_u32_le(&mut content).map_err(|_| truncated())?;
        let name =
            read_name_padded(&mut content, WAD_FILENAME_FIELD_LEN).map_err(|_| truncated())?;

        let mut e = Entry::new(name, size as u64);
        e.index = i;
        e.offset = offset as u64;
        entries.push(e);
    }

    Ok(FatArchive::assemble(
        content,
        WadDriver,
        FatOptions {
            first_file_offset: WAD_FIRST_FILE_OFFSET,
            max_name_len: WAD_MAX_FILENAME_LEN,
        },
        entries,
    ))
}

/// Writes out a blank IWAD and opens it.
pub fn create<S: Stream>(mut stream: S) -> Result<WadArchive<S>> {
    stream.seek(SeekFrom::Start(0))?;
    stream.write_all(b"IWAD\x00\x00\x00\x00\x0c\x00\x00\x00")?;
    open(stream)
}

/// The per-format hooks for WAD.
pub struct WadDriver;

impl WadDriver {
    fn update_file_count<S: Stream>(&self, state: &mut FatState<S>, count: u32) -> Result<()> {
        state.content.seek(SeekFrom::Start(WAD_FILECOUNT_OFFSET))?;
        write_u32_le(&mut state.content, count)?;
        Ok(())
    }
}

impl<S: Stream> FatDriver<S> for WadDriver {
    fn update_file_name(
        &mut self,
        state: &mut FatState<S>,
        id: EntryId,
        new_name: &str,
    ) -> Result<()> {
        let off = fat_entry_offset(state.entry(id)?.index) + 8;
        state.content.seek(SeekFrom::Start(off))?;
        write_name_padded(&mut state.content, new_name, WAD_FILENAME_FIELD_LEN)?;
        Ok(())
    }

    fn update_file_offset(
        &mut self,
        state: &mut FatState<S>,
        id: EntryId,
        _delta: i64,
    ) -> Result<()> {
        let e = state.entry(id)?;
        let (at, offset) = (fat_entry_offset(e.index), e.offset);
        state.content.seek(SeekFrom::Start(at))?;
        write_u32_le(&mut state.content, offset as u32)?;
        Ok(())
    }

    fn update_file_size(&mut self, state: &mut FatState<S>, id: EntryId, _delta: i64) -> Result<()> {
        let e = state.entry(id)?;
        let (at, size) = (fat_entry_offset(e.index) + 4, e.stored_size);
        state.content.seek(SeekFrom::Start(at))?;
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

        // The new entry isn't in the list yet, so account for its own
        // directory record manually.
        new_entry.offset += WAD_FAT_ENTRY_LEN;

        state
            .content
            .seek(SeekFrom::Start(fat_entry_offset(new_entry.index)))?;
        state.content.insert(WAD_FAT_ENTRY_LEN)?;
        new_entry.name.make_ascii_uppercase();
        write_u32_le(&mut state.content, new_entry.offset as u32)?;
        write_u32_le(&mut state.content, new_entry.stored_size as u32)?;
        write_name_padded(&mut state.content, &new_entry.name, WAD_FILENAME_FIELD_LEN)?;

        let fat_end = WAD_FAT_OFFSET + state.entries().len() as u64 * WAD_FAT_ENTRY_LEN;
        shift_entries(self, state, None, fat_end, WAD_FAT_ENTRY_LEN as i64, 0)?;

        let count = state.entries().len() as u32 + 1;
        self.update_file_count(state, count)
    }

    fn pre_remove(&mut self, state: &mut FatState<S>, id: EntryId) -> Result<()> {
        // Must run before the record is dropped so the rewritten offsets
        // land in the right directory slots.
        let fat_end = WAD_FAT_OFFSET + state.entries().len() as u64 * WAD_FAT_ENTRY_LEN;
        shift_entries(self, state, None, fat_end, -(WAD_FAT_ENTRY_LEN as i64), 0)?;

        let off = fat_entry_offset(state.entry(id)?.index);
        state.content.seek(SeekFrom::Start(off))?;
        state.content.remove(WAD_FAT_ENTRY_LEN)?;

        let count = state.entries().len() as u32 - 1;
        self.update_file_count(state, count)
    }
}

/// Format front-end for WAD (`wad-doom`).
pub struct WadDoomFormat;

impl ArchiveFormat for WadDoomFormat {
    fn code(&self) -> &'static str {
        "wad-doom"
    }

    fn name(&self) -> &'static str {
        "Doom WAD File"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["wad", "rts"]
    }

    fn games(&self) -> &'static [&'static str] {
        &[
            "Doom",
            "Heretic",
            "Hexen",
            "Rise of the Triad",
            "Shadow Warrior",
        ]
    }

    fn probe(&self, content: &mut dyn Stream) -> Result<Certainty> {
        if content.len()? < WAD_HEADER_LEN {
            return Ok(Certainty::DefinitelyNo); // too short
        }
        let mut sig = [0u8; 4];
        content.seek(SeekFrom::Start(0))?;
        content.read_exact(&mut sig)?;
        if &sig == b"IWAD" || &sig == b"PWAD" {
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
    fn test_probe_both_signatures() {
        let f = WadDoomFormat;
        for sig in [&b"IWAD"[..], b"PWAD"] {
            let mut raw = sig.to_vec();
            raw.extend_from_slice(&[0u8; 8]);
            let mut s = Cursor::new(raw);
            assert_eq!(f.probe(&mut s).unwrap(), Certainty::DefinitelyYes);
        }
        let mut s = Cursor::new(b"WAD2\0\0\0\0\0\0\0\0".to_vec());
        assert_eq!(f.probe(&mut s).unwrap(), Certainty::DefinitelyNo);
    }

    #[test]
    fn test_create_yields_empty_archive() {
        let arc = create(Cursor::new(Vec::new())).unwrap();
        assert!(arc.files().is_empty());
    }
}
