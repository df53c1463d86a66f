//! Cosmo's Cosmic Adventure .VOL archives.
//!
//! A fixed 200-slot directory of 20-byte records (12-byte name, u32-LE
//! offset, u32-LE size) fills the first 4000 bytes; unused slots are
//! zeroed, and a slot with offset 0 means "no file here". Because the
//! directory never changes size, inserting a record means removing a blank
//! slot from the tail to compensate (and vice versa on remove).
//!
//! The original games tolerate directories that aren't exactly 4000 bytes;
//! this driver accepts any multiple of 20 on read but always writes the
//! full 4000 on create.

use std::io::{Read, Seek, SeekFrom, Write};

use crate::archive::Archive;
use crate::entry::{Entry, EntryId};
use crate::error::{Error, Result};
use crate::fat::{FatArchive, FatDriver, FatOptions, FatState};
use crate::format::{ArchiveFormat, Certainty, SuppData};
use crate::stream::{
    DynStream, SegStream, Stream, read_name_padded, read_u32_le, write_name_padded, write_u32_le,
};

const VOL_MAX_FILES: usize = 200;
const VOL_FAT_ENTRY_LEN: u64 = 20; // filename + u32le offset + u32le size
const VOL_FAT_LENGTH: u64 = VOL_MAX_FILES as u64 * VOL_FAT_ENTRY_LEN;
const VOL_FILENAME_FIELD_LEN: usize = 12;
const VOL_MAX_FILENAME_LEN: usize = VOL_FILENAME_FIELD_LEN;
const VOL_FIRST_FILE_OFFSET: u64 = VOL_FAT_LENGTH;

/// A VOL archive over any backing stream.
pub type VolArchive<S> = FatArchive<S, VolDriver>;

fn fat_entry_offset(index: u32) -> u64 {
    index as u64 * VOL_FAT_ENTRY_LEN
}

/// Opens an existing VOL archive.
pub fn open<S: Stream>(stream: S) -> Result<VolArchive<S>> {
    let mut content = SegStream::new(stream)?;
    let mut entries = Vec::new();

    if !content.is_empty() {
        content.seek(SeekFrom::Start(12))?; // first record's size field
        let len_fat =
            read_u32_le(&mut content).map_err(|_| Error::Truncated("file too short".into()))?;

        let num_slots = len_fat as u64 / VOL_FAT_ENTRY_LEN;
        content.seek(SeekFrom::Start(0))?;
        for i in 0..num_slots {
            let truncated = || Error::Truncated("stream ends inside directory".into());
            let name = read_name_padded(&mut content, VOL_FILENAME_FIELD_LEN)
                .map_err(|_| truncated())?;
            let offset = read_u32_le(&mut content).map_err(|_| truncated())?;
            let size = read_u32_le(&mut content).map_err(|_| truncated())?;

            // Blank slots have an offset of zero.
            if offset == 0 {
                continue;
            }
            let mut e = Entry::new(name, size as u64);
            e.index = i as u32;
            e.offset = offset as u64;
            entries.push(e);
        }
    } // else empty archive

    Ok(FatArchive::assemble(
        content,
        VolDriver,
        FatOptions {
            first_file_offset: VOL_FIRST_FILE_OFFSET,
            max_name_len: VOL_MAX_FILENAME_LEN,
        },
        entries,
    ))
}

/// Writes out a blank 4000-byte directory and opens it.
pub fn create<S: Stream>(mut stream: S) -> Result<VolArchive<S>> {
    stream.seek(SeekFrom::Start(0))?;
    stream.write_all(&vec![0u8; VOL_FAT_LENGTH as usize])?;
    open(stream)
}

/// The per-format hooks for VOL.
pub struct VolDriver;

impl<S: Stream> FatDriver<S> for VolDriver {
    fn update_file_name(
        &mut self,
        state: &mut FatState<S>,
        id: EntryId,
        new_name: &str,
    ) -> Result<()> {
        let off = fat_entry_offset(state.entry(id)?.index);
        state.content.seek(SeekFrom::Start(off))?;
        write_name_padded(&mut state.content, new_name, VOL_FILENAME_FIELD_LEN)?;
        Ok(())
    }

    fn update_file_offset(
        &mut self,
        state: &mut FatState<S>,
        id: EntryId,
        _delta: i64,
    ) -> Result<()> {
        let e = state.entry(id)?;
        let (at, offset) = (fat_entry_offset(e.index) + 12, e.offset);
        state.content.seek(SeekFrom::Start(at))?;
        write_u32_le(&mut state.content, offset as u32)?;
        Ok(())
    }

    fn update_file_size(&mut self, state: &mut FatState<S>, id: EntryId, _delta: i64) -> Result<()> {
        let e = state.entry(id)?;
        let (at, size) = (fat_entry_offset(e.index) + 16, e.stored_size);
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

        if state.entries().len() >= VOL_MAX_FILES {
            return Err(Error::TooMany {
                max: VOL_MAX_FILES,
            });
        }

        state
            .content
            .seek(SeekFrom::Start(fat_entry_offset(new_entry.index)))?;
        state.content.insert(VOL_FAT_ENTRY_LEN)?;
        new_entry.name.make_ascii_uppercase();
        write_name_padded(&mut state.content, &new_entry.name, VOL_FILENAME_FIELD_LEN)?;
        write_u32_le(&mut state.content, new_entry.offset as u32)?;
        write_u32_le(&mut state.content, new_entry.stored_size as u32)?;

        // The directory is a fixed size, so compensate for the record we
        // just added by removing a blank slot from the tail end.
        if !state.entries().is_empty() {
            let mut last_slot = VOL_MAX_FILES as i64 - 1;
            for e in state.entries().iter().rev() {
                if e.index as i64 != last_slot {
                    // The slot after this entry is free; drop it.
                    break;
                }
                last_slot = e.index as i64 - 1;
            }
            debug_assert!(last_slot >= 0);
            state
                .content
                .seek(SeekFrom::Start(fat_entry_offset(last_slot as u32)))?;
            state.content.remove(VOL_FAT_ENTRY_LEN)?;
        } else {
            // No files, so just remove the following (blank) slot.
            state
                .content
                .seek(SeekFrom::Start(fat_entry_offset(1)))?;
            state.content.remove(VOL_FAT_ENTRY_LEN)?;
        }

        Ok(())
    }

    fn pre_remove(&mut self, state: &mut FatState<S>, id: EntryId) -> Result<()> {
        // Drop the record...
        let off = fat_entry_offset(state.entry(id)?.index);
        state.content.seek(SeekFrom::Start(off))?;
        state.content.remove(VOL_FAT_ENTRY_LEN)?;

        // ...and pad a blank one onto the tail to keep the directory size
        // unchanged.
        let last_index = state
            .entries()
            .last()
            .map(|e| e.index)
            .expect("pre_remove called on an archive with no entries");
        state
            .content
            .seek(SeekFrom::Start(fat_entry_offset(last_index + 1)))?;
        state.content.insert(VOL_FAT_ENTRY_LEN)?;

        Ok(())
    }
}

/// Format front-end for VOL (`vol-cosmo`).
pub struct VolCosmoFormat;

impl ArchiveFormat for VolCosmoFormat {
    fn code(&self) -> &'static str {
        "vol-cosmo"
    }

    fn name(&self) -> &'static str {
        "Cosmo Volume File"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["vol", "stn", "cmp", "ms1", "ms2", "ms3"]
    }

    fn games(&self) -> &'static [&'static str] {
        &[
            "Cosmo's Cosmic Adventure",
            "Duke Nukem II",
            "Major Stryker",
        ]
    }

    fn probe(&self, content: &mut dyn Stream) -> Result<Certainty> {
        let len_archive = content.len()?;
        if len_archive < VOL_FAT_ENTRY_LEN {
            return Ok(Certainty::DefinitelyNo); // too short
        }

        content.seek(SeekFrom::Start(12))?;
        let len_fat = read_u32_le(content)? as u64;

        // A directory larger than the whole archive is out.
        if len_fat > len_archive {
            return Ok(Certainty::DefinitelyNo);
        }
        // Smaller than one record is out too, except a zero-length
        // directory for an empty archive.
        if len_fat > 0 && len_fat < VOL_FAT_ENTRY_LEN {
            return Ok(Certainty::DefinitelyNo);
        }

        // Check each record for sane names and in-bounds extents.
        content.seek(SeekFrom::Start(0))?;
        for _ in 0..(len_fat / VOL_FAT_ENTRY_LEN) {
            let mut name = [0u8; VOL_FILENAME_FIELD_LEN];
            content.read_exact(&mut name)?;
            for &b in &name {
                if b == 0 {
                    break;
                }
                if b < 32 {
                    return Ok(Certainty::DefinitelyNo);
                }
            }
            let off_entry = read_u32_le(content)? as u64;
            let len_entry = read_u32_le(content)? as u64;
            if off_entry + len_entry > len_archive {
                return Ok(Certainty::DefinitelyNo);
            }
        }

        // Almost certainly a VOL file from here.
        if len_archive < VOL_FAT_LENGTH {
            return Ok(Certainty::PossiblyYes); // too short though
        }
        // Directories other than the usual 4000 bytes exist in the wild.
        if len_fat != 0 && len_fat != VOL_FAT_LENGTH {
            return Ok(Certainty::PossiblyYes);
        }

        Ok(Certainty::DefinitelyYes)
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
    fn test_probe_empty_directory() {
        // 4000 zero bytes: a freshly created empty VOL.
        let mut s = Cursor::new(vec![0u8; VOL_FAT_LENGTH as usize]);
        assert_eq!(
            VolCosmoFormat.probe(&mut s).unwrap(),
            Certainty::DefinitelyYes
        );
    }

    #[test]
    fn test_probe_rejects_fat_larger_than_archive() {
        let mut raw = vec![0u8; 40];
        raw[12..16].copy_from_slice(&10_000u32.to_le_bytes());
        let mut s = Cursor::new(raw);
        assert_eq!(
            VolCosmoFormat.probe(&mut s).unwrap(),
            Certainty::DefinitelyNo
        );
    }

    #[test]
    fn test_probe_rejects_control_chars_in_name() {
        let mut raw = vec![0u8; VOL_FAT_LENGTH as usize];
        raw[12..16].copy_from_slice(&20u32.to_le_bytes()); // one-record FAT
        raw[0] = 0x01; // control character in filename
        let mut s = Cursor::new(raw);
        assert_eq!(
            VolCosmoFormat.probe(&mut s).unwrap(),
            Certainty::DefinitelyNo
        );
    }
}
