//! Read-only archives with a compile-time file list.
//!
//! Some "archives" are really just known byte ranges inside a host file —
//! game levels embedded in an executable, for instance. [`FixedArchive`]
//! presents the same [`Archive`] interface as the FAT engine over such a
//! construction-time list: members can be read and overwritten in place,
//! but inserting, removing, renaming and moving all fail, and resizing is
//! only possible when the describing [`FixedFile`] supplies a callback that
//! knows how to grow the region inside the host file.

use std::io::{Read, Seek, SeekFrom, Write};

use crate::archive::{Archive, NewFile};
use crate::entry::{Entry, EntryId};
use crate::error::{Error, Result};
use crate::filter::FilterRegistry;
use crate::handle::{FileHandle, HandleTable, OpenFile, SlotKind};
use crate::stream::{Stream, Window};

/// Callback invoked to resize a fixed member inside its host file.
///
/// Receives the host stream, the entry (sizes already updated) and the new
/// stored/real lengths; it is expected to rearrange the host file and
/// return, or fail leaving the host untouched.
pub type FixedResizeFn<S> = Box<dyn FnMut(&mut S, &mut Entry, u64, u64) -> Result<()>>;

/// One hard-coded member of a fixed archive.
pub struct FixedFile<S> {
    /// Offset of the member in the host file.
    pub offset: u64,
    /// Length of the member in bytes.
    pub size: u64,
    /// Synthesised filename.
    pub name: String,
    /// Filter code, or empty for none.
    pub filter: String,
    /// Resize handler; `None` makes the member fixed-size.
    pub resize: Option<FixedResizeFn<S>>,
}

impl<S> FixedFile<S> {
    /// A fixed-size member with no filter.
    pub fn new(offset: u64, size: u64, name: impl Into<String>) -> Self {
        Self {
            offset,
            size,
            name: name.into(),
            filter: String::new(),
            resize: None,
        }
    }
}

/// An archive whose directory is a fixed construction-time list.
pub struct FixedArchive<S: Stream> {
    content: S,
    entries: Vec<Entry>,
    resizers: Vec<Option<FixedResizeFn<S>>>,
    handles: HandleTable,
    filters: FilterRegistry,
}

impl<S: Stream> FixedArchive<S> {
    /// Builds a fixed archive over `content` from a member list.
    pub fn new(content: S, files: Vec<FixedFile<S>>) -> Self {
        let mut entries = Vec::with_capacity(files.len());
        let mut resizers = Vec::with_capacity(files.len());
        for (i, f) in files.into_iter().enumerate() {
            let mut e = Entry::new(f.name, f.size);
            e.id = EntryId(i as u64);
            e.filter = f.filter;
            e.offset = f.offset;
            e.index = i as u32;
            e.valid = true;
            entries.push(e);
            resizers.push(f.resize);
        }
        Self {
            content,
            entries,
            resizers,
            handles: HandleTable::new(),
            filters: FilterRegistry::builtin(),
        }
    }

    /// Replaces the filter registry consulted by filtered opens.
    pub fn with_filters(mut self, filters: FilterRegistry) -> Self {
        self.filters = filters;
        self
    }

    fn entry_checked(&self, id: EntryId) -> Result<&Entry> {
        let e = self
            .entries
            .iter()
            .find(|e| e.id == id)
            .ok_or(Error::FileRemoved)?;
        if !e.valid {
            return Err(Error::FileRemoved);
        }
        Ok(e)
    }
}

impl<S: Stream> Archive for FixedArchive<S> {
    fn files(&self) -> &[Entry] {
        &self.entries
    }

    fn open(&mut self, id: EntryId, use_filter: bool) -> Result<FileHandle> {
        let (code, off, len) = {
            let e = self.entry_checked(id)?;
            (e.filter.clone(), e.offset, e.stored_size)
        };
        let kind = if use_filter && !code.is_empty() {
            let mut stored = vec![0u8; len as usize];
            self.content.seek(SeekFrom::Start(off))?;
            self.content.read_exact(&mut stored)?;
            let filter = self
                .filters
                .get(&code)
                .ok_or(Error::FilterMissing { code })?;
            SlotKind::Filtered {
                plain: filter.decode(&stored)?,
                dirty: false,
            }
        } else {
            SlotKind::Raw(Window::new(off, len))
        };
        Ok(self.handles.open(OpenFile {
            entry: id,
            pos: 0,
            kind,
        }))
    }

    fn read_handle(&mut self, h: FileHandle, buf: &mut [u8]) -> Result<usize> {
        let of = self.handles.get_mut(h)?;
        let pos = of.pos;
        let n = match &mut of.kind {
            SlotKind::Raw(w) => w.read_at(&mut self.content, pos, buf)?,
            SlotKind::Filtered { plain, .. } => {
                if pos >= plain.len() as u64 {
                    0
                } else {
                    let at = pos as usize;
                    let n = (plain.len() - at).min(buf.len());
                    buf[..n].copy_from_slice(&plain[at..at + n]);
                    n
                }
            }
        };
        of.pos += n as u64;
        Ok(n)
    }

    fn write_handle(&mut self, h: FileHandle, buf: &[u8]) -> Result<usize> {
        let of = self.handles.get_mut(h)?;
        let pos = of.pos;
        let n = match &mut of.kind {
            SlotKind::Raw(w) => w.write_at(&mut self.content, pos, buf)?,
            SlotKind::Filtered { plain, dirty } => {
                let end = pos as usize + buf.len();
                if end > plain.len() {
                    plain.resize(end, 0);
                }
                plain[pos as usize..end].copy_from_slice(buf);
                *dirty = true;
                buf.len()
            }
        };
        of.pos += n as u64;
        Ok(n)
    }

    fn seek_handle(&mut self, h: FileHandle, pos: u64) -> Result<u64> {
        self.handles.get_mut(h)?.pos = pos;
        Ok(pos)
    }

    fn handle_len(&self, h: FileHandle) -> Result<u64> {
        Ok(match &self.handles.get(h)?.kind {
            SlotKind::Raw(w) => w.len(),
            SlotKind::Filtered { plain, .. } => plain.len() as u64,
        })
    }

    fn truncate_handle(&mut self, h: FileHandle, new_len: u64) -> Result<()> {
        let eid = self.handles.get(h)?.entry;
        match &self.handles.get(h)?.kind {
            SlotKind::Raw(_) => {
                let new_real = {
                    let e = self.entry_checked(eid)?;
                    if e.filter.is_empty() { new_len } else { e.real_size }
                };
                self.resize(eid, new_len, new_real)
            }
            SlotKind::Filtered { .. } => {
                if let SlotKind::Filtered { plain, dirty } = &mut self.handles.get_mut(h)?.kind {
                    plain.resize(new_len as usize, 0);
                    *dirty = true;
                }
                Ok(())
            }
        }
    }

    fn close(&mut self, h: FileHandle) -> Result<()> {
        let of = self.handles.close(h)?;
        if let SlotKind::Filtered { plain, dirty: true } = of.kind {
            let e = self.entry_checked(of.entry)?;
            let code = e.filter.clone();
            let off = e.offset;
            let stored_len = e.stored_size;
            let filter = self
                .filters
                .get(&code)
                .ok_or(Error::FilterMissing { code })?;
            let (stored, sizes) = filter.encode(&plain)?;
            if sizes.stored != stored_len {
                // The slot in the host file cannot move; a resize callback
                // is the only way to change a member's length.
                self.resize(of.entry, sizes.stored, sizes.real)?;
            }
            self.content.seek(SeekFrom::Start(off))?;
            self.content.write_all(&stored)?;
        }
        Ok(())
    }

    fn insert(&mut self, _before: Option<EntryId>, _file: NewFile) -> Result<EntryId> {
        Err(Error::ReadOnly)
    }

    fn remove(&mut self, _id: EntryId) -> Result<()> {
        Err(Error::ReadOnly)
    }

    fn rename(&mut self, _id: EntryId, _new_name: &str) -> Result<()> {
        Err(Error::ReadOnly)
    }

    fn move_entry(&mut self, _before: Option<EntryId>, _id: EntryId) -> Result<()> {
        Err(Error::ReadOnly)
    }

    fn resize(&mut self, id: EntryId, new_stored: u64, new_real: u64) -> Result<()> {
        let pos = self
            .entries
            .iter()
            .position(|e| e.id == id)
            .ok_or(Error::FileRemoved)?;
        let Some(resizer) = self.resizers[pos].as_mut() else {
            return Err(Error::ReadOnly);
        };
        let entry = &mut self.entries[pos];
        let (old_stored, old_real) = (entry.stored_size, entry.real_size);
        entry.stored_size = new_stored;
        entry.real_size = new_real;
        if let Err(err) = resizer(&mut self.content, entry, new_stored, new_real) {
            entry.stored_size = old_stored;
            entry.real_size = old_real;
            return Err(err);
        }
        // Follow the entry with any open windows on it.
        for of in self.handles.iter_mut() {
            if of.entry == id {
                if let SlotKind::Raw(w) = &mut of.kind {
                    w.resize(new_stored);
                }
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.content.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn host() -> Cursor<Vec<u8>> {
        Cursor::new(b"....AAAA....BBBBBB..".to_vec())
    }

    fn fixed() -> FixedArchive<Cursor<Vec<u8>>> {
        FixedArchive::new(
            host(),
            vec![
                FixedFile::new(4, 4, "first.dat"),
                FixedFile::new(12, 6, "second.dat"),
            ],
        )
    }

    #[test]
    fn test_read_members() {
        let mut arc = fixed();
        let id = arc.find("FIRST.DAT").unwrap();
        assert_eq!(arc.read_to_vec(id, false).unwrap(), b"AAAA");
        let id = arc.find("second.dat").unwrap();
        assert_eq!(arc.read_to_vec(id, false).unwrap(), b"BBBBBB");
    }

    #[test]
    fn test_write_in_place() {
        let mut arc = fixed();
        let id = arc.find("first.dat").unwrap();
        let h = arc.open(id, false).unwrap();
        arc.write_handle_all(h, b"XY").unwrap();
        arc.close(h).unwrap();
        assert_eq!(arc.read_to_vec(id, false).unwrap(), b"XYAA");
    }

    #[test]
    fn test_mutations_fail_read_only() {
        let mut arc = fixed();
        let id = arc.find("first.dat").unwrap();
        assert!(matches!(
            arc.insert(None, NewFile::new("x", 1)),
            Err(Error::ReadOnly)
        ));
        assert!(matches!(arc.remove(id), Err(Error::ReadOnly)));
        assert!(matches!(arc.rename(id, "y"), Err(Error::ReadOnly)));
        assert!(matches!(arc.resize(id, 8, 8), Err(Error::ReadOnly)));
        assert!(matches!(arc.open_folder(id), Err(Error::NotAFolder)));
    }
}
