//! Terminal Velocity .POD archives.
//!
//! A u32-LE file count and an 80-byte description header, then 40-byte
//! directory records (32-byte name, u32-LE size, u32-LE offset) and the
//! file bodies. The description is preserved untouched across edits.

use std::io::{Read, Seek, SeekFrom};

use crate::archive::Archive;
use crate::entry::{Entry, EntryId};
use crate::error::{Error, Result};
use crate::fat::{FatArchive, FatDriver, FatOptions, FatState, shift_entries};
use crate::format::{ArchiveFormat, Certainty, SuppData};
use crate::stream::{
    DynStream, SegStream, Stream, read_name_padded, read_u32_le, write_name_padded, write_u32_le,
};

const POD_DESCRIPTION_LEN: usize = 80;
const POD_FAT_OFFSET: u64 = 84;
const POD_FAT_ENTRY_LEN: u64 = 40; // filename + u32le size + u32le offset
const POD_FILENAME_FIELD_LEN: usize = 32;
const POD_MAX_FILENAME_LEN: usize = POD_FILENAME_FIELD_LEN;
const POD_FIRST_FILE_OFFSET: u64 = POD_FAT_OFFSET;

/// A POD archive over any backing stream.
pub type PodArchive<S> = FatArchive<S, PodDriver>;

fn fat_entry_offset(index: u32) -> u64 {
    POD_FAT_OFFSET + index as u64 * POD_FAT_ENTRY_LEN
}

/// Opens an existing POD archive.
pub fn open<S: Stream>(stream: S) -> Result<PodArchive<S>> {
    let mut content = SegStream::new(stream)?;

    content.seek(SeekFrom::Start(0))?;
    let num_files =
        read_u32_le(&mut content).map_err(|_| Error::Truncated("file too short".into()))?;

    content.seek(SeekFrom::Start(POD_FAT_OFFSET))?;
    let mut entries = Vec::with_capacity(num_files as usize);
    for i in 0..num_files {
        let truncated = || Error::Truncated("stream ends inside directory".into());
        let name =
            read_name_padded(&mut content, POD_FILENAME_FIELD_LEN).map_err(|_| truncated())?;
        let size = read_u32_le(&mut content).map_err(|_| truncated())?;
        let offset = read_u32_le(&mut content).map_err(|_| truncated())?;

        let mut e = Entry::new(name, size as u64);
        e.index = i;
        e.offset = offset as u64;
        entries.push(e);
    }

    Ok(FatArchive::assemble(
        content,
        PodDriver,
        FatOptions {
            first_file_offset: POD_FIRST_FILE_OFFSET,
            max_name_len: POD_MAX_FILENAME_LEN,
        },
        entries,
    ))
}

/// Writes out a blank POD archive and opens it.
pub fn create<S: Stream>(mut stream: S) -> Result<PodArchive<S>> {
    stream.seek(SeekFrom::Start(0))?;
    write_u32_le(&mut stream, 0)?;
    write_name_padded(&mut stream, "Empty POD file", POD_DESCRIPTION_LEN)?;
    open(stream)
}

/// The per-format hooks for POD.
pub struct PodDriver;

impl PodDriver {
    fn update_file_count<S: Stream>(&self, state: &mut FatState<S>, count: u32) -> Result<()> {
        state.content.seek(SeekFrom::Start(0))?;
        write_u32_le(&mut state.content, count)?;
        Ok(())
    }
}

impl<S: Stream> FatDriver<S> for PodDriver {
    fn update_file_name(
        &mut self,
        state: &mut FatState<S>,
        id: EntryId,
        new_name: &str,
    ) -> Result<()> {
        let off = fat_entry_offset(state.entry(id)?.index);
        state.content.seek(SeekFrom::Start(off))?;
        write_name_padded(&mut state.content, new_name, POD_FILENAME_FIELD_LEN)?;
        Ok(())
    }

    fn update_file_offset(
        &mut self,
        state: &mut FatState<S>,
        id: EntryId,
        _delta: i64,
    ) -> Result<()> {
        let e = state.entry(id)?;
        let (at, offset) = (
            fat_entry_offset(e.index) + POD_FILENAME_FIELD_LEN as u64 + 4,
            e.offset,
        );
        state.content.seek(SeekFrom::Start(at))?;
        write_u32_le(&mut state.content, offset as u32)?;
        Ok(())
    }

    fn update_file_size(&mut self, state: &mut FatState<S>, id: EntryId, _delta: i64) -> Result<()> {
        let e = state.entry(id)?;
        let (at, size) = (
            fat_entry_offset(e.index) + POD_FILENAME_FIELD_LEN as u64,
            e.stored_size,
        );
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

        // Account for the new directory record before the entry joins the
        // list.
        new_entry.offset += POD_FAT_ENTRY_LEN;

        state
            .content
            .seek(SeekFrom::Start(fat_entry_offset(new_entry.index)))?;
        state.content.insert(POD_FAT_ENTRY_LEN)?;
        write_name_padded(&mut state.content, &new_entry.name, POD_FILENAME_FIELD_LEN)?;
        write_u32_le(&mut state.content, new_entry.stored_size as u32)?;
        write_u32_le(&mut state.content, new_entry.offset as u32)?;

        let fat_end = POD_FAT_OFFSET + state.entries().len() as u64 * POD_FAT_ENTRY_LEN;
        shift_entries(self, state, None, fat_end, POD_FAT_ENTRY_LEN as i64, 0)?;

        let count = state.entries().len() as u32 + 1;
        self.update_file_count(state, count)
    }

    fn pre_remove(&mut self, state: &mut FatState<S>, id: EntryId) -> Result<()> {
        let fat_end = POD_FAT_OFFSET + state.entries().len() as u64 * POD_FAT_ENTRY_LEN;
        shift_entries(self, state, None, fat_end, -(POD_FAT_ENTRY_LEN as i64), 0)?;

        let off = fat_entry_offset(state.entry(id)?.index);
        state.content.seek(SeekFrom::Start(off))?;
        state.content.remove(POD_FAT_ENTRY_LEN)?;

        let count = state.entries().len() as u32 - 1;
        self.update_file_count(state, count)
    }
}

/// Format front-end for POD (`pod-tv`).
pub struct PodTvFormat;

impl ArchiveFormat for PodTvFormat {
    fn code(&self) -> &'static str {
        "pod-tv"
    }

    fn name(&self) -> &'static str {
        "Terminal Velocity POD File"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["pod"]
    }

    fn games(&self) -> &'static [&'static str] {
        &["Terminal Velocity"]
    }

    fn probe(&self, content: &mut dyn Stream) -> Result<Certainty> {
        let len_archive = content.len()?;

        // Must hold the file count and description.
        if len_archive < POD_FAT_OFFSET {
            return Ok(Certainty::DefinitelyNo);
        }

        content.seek(SeekFrom::Start(0))?;
        let num_files = read_u32_le(content)? as u64;

        let mut description = [0u8; POD_DESCRIPTION_LEN];
        content.read_exact(&mut description)?;
        for &b in &description {
            if b != 0 && b < 32 {
                return Ok(Certainty::DefinitelyNo);
            }
        }

        // The directory has to fit inside the archive.
        if POD_FAT_OFFSET + num_files * POD_FAT_ENTRY_LEN > len_archive {
            return Ok(Certainty::DefinitelyNo);
        }

        content.seek(SeekFrom::Start(POD_FAT_OFFSET))?;
        for _ in 0..num_files {
            let mut name = [0u8; POD_FILENAME_FIELD_LEN];
            content.read_exact(&mut name)?;
            for &b in &name {
                if b == 0 {
                    break;
                }
                if b < 32 {
                    return Ok(Certainty::DefinitelyNo);
                }
            }
            let len_entry = read_u32_le(content)? as u64;
            let off_entry = read_u32_le(content)? as u64;
            if off_entry + len_entry > len_archive {
                return Ok(Certainty::DefinitelyNo);
            }
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
    fn test_probe_blank_archive() {
        let mut arc = Cursor::new(Vec::new());
        create(&mut arc).unwrap();
        assert_eq!(
            PodTvFormat.probe(&mut arc).unwrap(),
            Certainty::DefinitelyYes
        );
    }

    #[test]
    fn test_probe_rejects_control_chars_in_description() {
        let mut raw = vec![0u8; POD_FAT_OFFSET as usize];
        raw[10] = 0x07;
        let mut s = Cursor::new(raw);
        assert_eq!(PodTvFormat.probe(&mut s).unwrap(), Certainty::DefinitelyNo);
    }

    #[test]
    fn test_probe_rejects_oversized_directory() {
        let mut raw = vec![0u8; POD_FAT_OFFSET as usize];
        raw[0..4].copy_from_slice(&100u32.to_le_bytes());
        let mut s = Cursor::new(raw);
        assert_eq!(PodTvFormat.probe(&mut s).unwrap(), Certainty::DefinitelyNo);
    }

    #[test]
    fn test_description_survives_insert() {
        let mut arc = create(Cursor::new(Vec::new())).unwrap();
        use crate::archive::NewFile;
        let id = arc.insert(None, NewFile::new("a.dat", 3)).unwrap();
        let h = arc.open(id, false).unwrap();
        arc.write_handle_all(h, b"abc").unwrap();
        arc.close(h).unwrap();
        arc.flush().unwrap();

        // Description field still reads back.
        let e = arc.entry(id).unwrap();
        assert_eq!(e.offset, POD_FAT_OFFSET + POD_FAT_ENTRY_LEN);
        assert_eq!(arc.read_to_vec(id, false).unwrap(), b"abc");
    }
}
