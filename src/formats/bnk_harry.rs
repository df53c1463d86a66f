//! Halloween Harry .BNK archives.
//!
//! Two streams make up one archive: the `.bnk` file holds the member
//! bodies, each preceded by a 22-byte inline header (`\x04-ID-` signature,
//! name-length byte, 12-byte name, u32-LE size), while a `.fat` file next
//! to it holds 21-byte directory records (name-length byte, 12-byte name,
//! u32-LE offset, u32-LE size). The offsets in the external directory
//! point at the member *data*, past the inline header.
//!
//! The external directory is requested through
//! [`required_supps`](crate::format::ArchiveFormat::required_supps) and is
//! committed alongside the main stream on flush.

use std::io::{Read, Seek, SeekFrom, Write};

use crate::archive::Archive;
use crate::entry::{Attributes, Entry, EntryId};
use crate::error::{Error, Result};
use crate::fat::{FatArchive, FatDriver, FatOptions, FatState, shift_entries};
use crate::format::{ArchiveFormat, Certainty, SuppData, SuppFilenames, SuppItem};
use crate::stream::{
    DynStream, SegStream, Stream, read_u8, read_u32_le, write_name_padded, write_u8, write_u32_le,
};

const BNK_FIRST_FILE_OFFSET: u64 = 0;
const BNK_MAX_FILENAME_LEN: usize = 12;

// Inline header before each member (has signature, no offset).
const BNK_EFAT_SIG: &[u8; 5] = b"\x04-ID-";
const BNK_EFAT_FILENAME_OFFSET: u64 = 5; // name-length byte comes first
const BNK_EFAT_FILESIZE_OFFSET: u64 = BNK_EFAT_FILENAME_OFFSET + 1 + BNK_MAX_FILENAME_LEN as u64;
const BNK_EFAT_ENTRY_LEN: u64 = 22; // sig + filename + u32le size

// External directory record (no signature, has offset).
const BNK_FAT_FILEOFFSET_OFFSET: u64 = 1 + BNK_MAX_FILENAME_LEN as u64;
const BNK_FAT_FILESIZE_OFFSET: u64 = BNK_FAT_FILEOFFSET_OFFSET + 4;
const BNK_FAT_ENTRY_LEN: u64 = 21; // filename + u32le offset + u32le size

/// A BNK archive over any backing stream.
pub type BnkArchive<S> = FatArchive<S, BnkDriver>;

fn fat_entry_offset(index: u32) -> u64 {
    index as u64 * BNK_FAT_ENTRY_LEN
}

/// Reads a BNK name field: length byte plus 12 padded bytes.
fn read_bnk_name<R: Read>(r: &mut R) -> std::io::Result<String> {
    let len = read_u8(r)? as usize;
    let mut buf = [0u8; BNK_MAX_FILENAME_LEN];
    r.read_exact(&mut buf)?;
    let len = len.min(BNK_MAX_FILENAME_LEN);
    Ok(String::from_utf8_lossy(&buf[..len]).into_owned())
}

fn write_bnk_name<W: Write>(w: &mut W, name: &str) -> std::io::Result<()> {
    write_u8(w, name.len() as u8)?;
    write_name_padded(w, name, BNK_MAX_FILENAME_LEN)
}

/// Opens an existing BNK archive given the main stream and its external
/// directory stream.
pub fn open<S: Stream>(stream: S, fat_stream: DynStream) -> Result<BnkArchive<S>> {
    let content = SegStream::new(stream)?;
    let mut fat = SegStream::new(fat_stream)?;

    let num_files = fat.len() / BNK_FAT_ENTRY_LEN;
    let mut entries = Vec::with_capacity(num_files as usize);
    fat.seek(SeekFrom::Start(0))?;
    for i in 0..num_files {
        let truncated = || Error::Truncated("stream ends inside directory".into());
        let name = read_bnk_name(&mut fat).map_err(|_| truncated())?;
        let offset = read_u32_le(&mut fat).map_err(|_| truncated())?;
        let size = read_u32_le(&mut fat).map_err(|_| truncated())?;

        let mut e = Entry::new(name, size as u64);
        // Stored offsets point at the data; ours include the inline
        // header.
        e.offset = (offset as u64).saturating_sub(BNK_EFAT_ENTRY_LEN);
        e.header_len = BNK_EFAT_ENTRY_LEN;
        e.index = i as u32;
        if e.name.is_empty() {
            e.attrs = Attributes::EMPTY;
        }
        entries.push(e);
    }

    Ok(FatArchive::assemble(
        content,
        BnkDriver { fat },
        FatOptions {
            first_file_offset: BNK_FIRST_FILE_OFFSET,
            max_name_len: BNK_MAX_FILENAME_LEN,
        },
        entries,
    ))
}

/// Opens a blank BNK archive; the format has no header, so this is the
/// same as opening empty streams.
pub fn create<S: Stream>(stream: S, fat_stream: DynStream) -> Result<BnkArchive<S>> {
    open(stream, fat_stream)
}

/// The per-format hooks for BNK: every change lands in both the inline
/// header and the external directory.
pub struct BnkDriver {
    fat: SegStream<DynStream>,
}

impl<S: Stream> FatDriver<S> for BnkDriver {
    fn update_file_name(
        &mut self,
        state: &mut FatState<S>,
        id: EntryId,
        new_name: &str,
    ) -> Result<()> {
        let (index, offset) = {
            let e = state.entry(id)?;
            (e.index, e.offset)
        };

        self.fat.seek(SeekFrom::Start(fat_entry_offset(index)))?;
        write_bnk_name(&mut self.fat, new_name)?;

        state
            .content
            .seek(SeekFrom::Start(offset + BNK_EFAT_FILENAME_OFFSET))?;
        write_bnk_name(&mut state.content, new_name)?;

        Ok(())
    }

    fn update_file_offset(
        &mut self,
        state: &mut FatState<S>,
        id: EntryId,
        _delta: i64,
    ) -> Result<()> {
        // Only the external directory stores offsets, not the inline
        // header.
        let e = state.entry(id)?;
        let (index, offset) = (e.index, e.offset);
        self.fat
            .seek(SeekFrom::Start(fat_entry_offset(index) + BNK_FAT_FILEOFFSET_OFFSET))?;
        write_u32_le(&mut self.fat, (offset + BNK_EFAT_ENTRY_LEN) as u32)?;
        Ok(())
    }

    fn update_file_size(&mut self, state: &mut FatState<S>, id: EntryId, _delta: i64) -> Result<()> {
        let (index, offset, size) = {
            let e = state.entry(id)?;
            (e.index, e.offset, e.stored_size)
        };

        self.fat
            .seek(SeekFrom::Start(fat_entry_offset(index) + BNK_FAT_FILESIZE_OFFSET))?;
        write_u32_le(&mut self.fat, size as u32)?;

        state
            .content
            .seek(SeekFrom::Start(offset + BNK_EFAT_FILESIZE_OFFSET))?;
        write_u32_le(&mut state.content, size as u32)?;

        Ok(())
    }

    fn pre_insert(
        &mut self,
        state: &mut FatState<S>,
        _before: Option<EntryId>,
        new_entry: &mut Entry,
    ) -> Result<()> {
        new_entry.header_len = BNK_EFAT_ENTRY_LEN;
        new_entry.name.make_ascii_uppercase();

        // Write the inline header.
        state.content.seek(SeekFrom::Start(new_entry.offset))?;
        state.content.insert(BNK_EFAT_ENTRY_LEN)?;
        state.content.write_all(BNK_EFAT_SIG)?;
        write_bnk_name(&mut state.content, &new_entry.name)?;
        write_u32_le(&mut state.content, new_entry.stored_size as u32)?;

        // The inline header pushed every following file down; their new
        // offsets must be on disk before the external record is written.
        shift_entries(
            self,
            state,
            None,
            new_entry.offset,
            BNK_EFAT_ENTRY_LEN as i64,
            0,
        )?;

        // Same data again, into the external directory.
        self.fat
            .seek(SeekFrom::Start(fat_entry_offset(new_entry.index)))?;
        self.fat.insert(BNK_FAT_ENTRY_LEN)?;
        write_bnk_name(&mut self.fat, &new_entry.name)?;
        write_u32_le(&mut self.fat, (new_entry.offset + BNK_EFAT_ENTRY_LEN) as u32)?;
        write_u32_le(&mut self.fat, new_entry.stored_size as u32)?;

        Ok(())
    }

    fn pre_remove(&mut self, state: &mut FatState<S>, id: EntryId) -> Result<()> {
        let index = state.entry(id)?.index;
        self.fat.seek(SeekFrom::Start(fat_entry_offset(index)))?;
        self.fat.remove(BNK_FAT_ENTRY_LEN)?;
        Ok(())
    }

    fn flush(&mut self, _state: &mut FatState<S>) -> Result<()> {
        // The engine commits the main stream; the external directory is
        // ours to commit.
        self.fat.commit()?;
        Ok(())
    }
}

/// Format front-end for BNK (`bnk-harry`).
pub struct BnkHarryFormat;

impl ArchiveFormat for BnkHarryFormat {
    fn code(&self) -> &'static str {
        "bnk-harry"
    }

    fn name(&self) -> &'static str {
        "Halloween Harry BNK File"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["bnk", "-0"]
    }

    fn games(&self) -> &'static [&'static str] {
        &["Halloween Harry"]
    }

    fn probe(&self, content: &mut dyn Stream) -> Result<Certainty> {
        let len_archive = content.len()?;
        if len_archive == 0 {
            return Ok(Certainty::DefinitelyYes); // empty archive
        }
        if len_archive < BNK_EFAT_ENTRY_LEN {
            return Ok(Certainty::DefinitelyNo); // too short
        }
        let mut sig = [0u8; 5];
        content.seek(SeekFrom::Start(0))?;
        content.read_exact(&mut sig)?;
        if &sig == BNK_EFAT_SIG {
            Ok(Certainty::DefinitelyYes)
        } else {
            Ok(Certainty::DefinitelyNo)
        }
    }

    fn create(&self, content: DynStream, mut supps: SuppData) -> Result<Box<dyn Archive>> {
        let fat = supps
            .remove(&SuppItem::Fat)
            .ok_or_else(|| Error::FormatMismatch("missing external FAT stream".into()))?;
        Ok(Box::new(create(content, fat)?))
    }

    fn open(&self, content: DynStream, mut supps: SuppData) -> Result<Box<dyn Archive>> {
        let fat = supps
            .remove(&SuppItem::Fat)
            .ok_or_else(|| Error::FormatMismatch("missing external FAT stream".into()))?;
        Ok(Box::new(open(content, fat)?))
    }

    fn required_supps(
        &self,
        _content: &mut dyn Stream,
        primary_name: &str,
    ) -> Result<SuppFilenames> {
        let base = match primary_name.rfind('.') {
            Some(dot) => &primary_name[..dot],
            None => primary_name,
        };
        let mut supps = SuppFilenames::new();
        supps.insert(SuppItem::Fat, format!("{}.fat", base));
        Ok(supps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn empty_fat() -> DynStream {
        Box::new(Cursor::new(Vec::new()))
    }

    #[test]
    fn test_probe_empty_is_definitely_yes() {
        let mut s = Cursor::new(Vec::new());
        assert_eq!(
            BnkHarryFormat.probe(&mut s).unwrap(),
            Certainty::DefinitelyYes
        );
    }

    #[test]
    fn test_probe_signature() {
        let mut raw = BNK_EFAT_SIG.to_vec();
        raw.extend_from_slice(&[0u8; 17]);
        let mut s = Cursor::new(raw);
        assert_eq!(
            BnkHarryFormat.probe(&mut s).unwrap(),
            Certainty::DefinitelyYes
        );
    }

    #[test]
    fn test_required_supps_derives_fat_name() {
        let mut s = Cursor::new(Vec::new());
        let supps = BnkHarryFormat
            .required_supps(&mut s, "harry.bnk")
            .unwrap();
        assert_eq!(supps.get(&SuppItem::Fat).unwrap(), "harry.fat");
    }

    #[test]
    fn test_inline_header_written_on_insert() {
        use crate::archive::NewFile;
        let mut arc = create(Cursor::new(Vec::new()), empty_fat()).unwrap();
        let id = arc.insert(None, NewFile::new("hello.dat", 4)).unwrap();
        let h = arc.open(id, false).unwrap();
        arc.write_handle_all(h, b"data").unwrap();
        arc.close(h).unwrap();

        let e = arc.entry(id).unwrap();
        assert_eq!(e.offset, 0);
        assert_eq!(e.header_len, BNK_EFAT_ENTRY_LEN);
        assert_eq!(e.name, "HELLO.DAT");
    }
}
