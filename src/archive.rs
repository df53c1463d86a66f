//! The primary interface to an archive file.
//!
//! [`Archive`] is the object-safe trait every archive engine implements —
//! the FAT engine for editable formats, the fixed engine for read-only
//! regions of host files, and any nested folder archives. Member-file I/O
//! goes through [`FileHandle`]s issued by [`open`](Archive::open); the
//! archive relocates and resizes the byte ranges behind live handles as
//! neighbouring edits happen, so a handle stays usable across inserts,
//! removes and resizes of *other* entries.
//!
//! Only call one method at a time per archive; operations seek around the
//! underlying stream and are linearised in call order.

use crate::entry::{Attributes, Entry, EntryId, FILETYPE_GENERIC};
use crate::error::{Error, Result};
use crate::handle::FileHandle;

/// Parameters for inserting a new member file.
#[derive(Debug, Clone)]
pub struct NewFile {
    /// Filename. Must be non-empty and within the format's length limit.
    pub name: String,
    /// Initial stored (in-archive) size. For compressed entries this is
    /// the compressed size — the space to allocate inside the archive.
    pub stored_size: u64,
    /// MIME-like file type, or empty for generic.
    pub file_type: String,
    /// Attribute flags.
    pub attrs: Attributes,
}

impl NewFile {
    /// A generic file with no attributes.
    pub fn new(name: impl Into<String>, stored_size: u64) -> Self {
        Self {
            name: name.into(),
            stored_size,
            file_type: FILETYPE_GENERIC.to_string(),
            attrs: Attributes::empty(),
        }
    }

    /// Sets the file type.
    pub fn file_type(mut self, t: impl Into<String>) -> Self {
        self.file_type = t.into();
        self
    }

    /// Sets the attribute flags.
    pub fn attrs(mut self, attrs: Attributes) -> Self {
        self.attrs = attrs;
        self
    }
}

/// Primary interface to an archive file.
pub trait Archive {
    /// Returns the ordered entry list. The slice is valid until the next
    /// mutating call; the order is the on-disk order for formats that
    /// require one.
    fn files(&self) -> &[Entry];

    /// Finds a file by name, comparing case-insensitively against the full
    /// stored name.
    ///
    /// Duplicate names are permitted; any matching entry may be returned.
    /// Callers needing a specific duplicate must walk [`files`](Self::files)
    /// themselves.
    fn find(&self, name: &str) -> Option<EntryId> {
        self.files()
            .iter()
            .find(|e| e.valid && e.name.eq_ignore_ascii_case(name))
            .map(|e| e.id)
    }

    /// Looks up an entry by id. Fails with [`Error::FileRemoved`] if the
    /// entry has been removed (or the id never belonged to this archive).
    fn entry(&self, id: EntryId) -> Result<&Entry> {
        self.files()
            .iter()
            .find(|e| e.id == id)
            .ok_or(Error::FileRemoved)
    }

    /// Opens a member file, returning a handle over its data region.
    ///
    /// With `use_filter` set and a filter recorded on the entry, the handle
    /// reads and writes pre-filter (decoded) bytes; closing a written
    /// handle re-encodes the data and updates the entry's sizes. Without
    /// `use_filter` the handle exposes the stored bytes exactly as they sit
    /// in the archive.
    fn open(&mut self, id: EntryId, use_filter: bool) -> Result<FileHandle>;

    /// Reads from an open member at its current position. Returns 0 at the
    /// member's end.
    fn read_handle(&mut self, h: FileHandle, buf: &mut [u8]) -> Result<usize>;

    /// Writes to an open member at its current position. Raw handles are
    /// clamped to the member's allocation (use
    /// [`resize`](Self::resize)/[`truncate_handle`](Self::truncate_handle)
    /// to grow a file); filtered handles grow freely in memory.
    fn write_handle(&mut self, h: FileHandle, buf: &[u8]) -> Result<usize>;

    /// Sets an open member's position (absolute, member-relative).
    fn seek_handle(&mut self, h: FileHandle, pos: u64) -> Result<u64>;

    /// Current length of an open member: stored bytes for raw handles,
    /// decoded bytes for filtered ones.
    fn handle_len(&self, h: FileHandle) -> Result<u64>;

    /// Changes an open member's length. For raw handles this routes through
    /// the owning archive's [`resize`](Self::resize) so following files are
    /// shifted; it never silently extends the window past the archive's
    /// allocation.
    fn truncate_handle(&mut self, h: FileHandle, new_len: u64) -> Result<()>;

    /// Closes a handle. For a filtered handle that was written to, this is
    /// the point where the data is re-encoded and the entry's sizes update.
    fn close(&mut self, h: FileHandle) -> Result<()>;

    /// Opens a folder entry as a nested archive.
    ///
    /// The default implementation fails; only formats with an independent
    /// per-folder directory override it.
    fn open_folder(&mut self, id: EntryId) -> Result<Box<dyn Archive>> {
        let _ = id;
        Err(Error::NotAFolder)
    }

    /// Inserts a new file immediately before `before`, or at the end of the
    /// archive when `before` is `None` (or no longer valid).
    ///
    /// The insert is atomic in memory: on error the archive is left as
    /// though it had not been attempted.
    fn insert(&mut self, before: Option<EntryId>, file: NewFile) -> Result<EntryId>;

    /// Removes a file. Fails with [`Error::FileInUse`] while any handle on
    /// it is still open; lingering ids observe [`Error::FileRemoved`]
    /// afterwards.
    fn remove(&mut self, id: EntryId) -> Result<()>;

    /// Renames a file, subject to the format's name length limit.
    fn rename(&mut self, id: EntryId, new_name: &str) -> Result<()>;

    /// Moves a file before `before` (or to the end). Implemented as
    /// insert + copy + remove; fails with [`Error::FilterMismatch`] when
    /// the source and destination positions would carry different filters.
    fn move_entry(&mut self, before: Option<EntryId>, id: EntryId) -> Result<()>;

    /// Changes a file's stored and real sizes, shifting all following
    /// entries and any open handles on them.
    fn resize(&mut self, id: EntryId, new_stored: u64, new_real: u64) -> Result<()>;

    /// Commits all cached changes to the backing stream.
    ///
    /// Changes are *not* written on drop (a destructor has no way to report
    /// failure), so an archive abandoned without a flush simply loses its
    /// in-memory edits.
    fn flush(&mut self) -> Result<()>;

    /// Reads an entire member into memory, opening and closing a handle.
    fn read_to_vec(&mut self, id: EntryId, use_filter: bool) -> Result<Vec<u8>> {
        let h = self.open(id, use_filter)?;
        let result = (|| {
            let mut out = Vec::new();
            let mut buf = [0u8; 8192];
            loop {
                let n = self.read_handle(h, &mut buf)?;
                if n == 0 {
                    break;
                }
                out.extend_from_slice(&buf[..n]);
            }
            Ok(out)
        })();
        self.close(h)?;
        result
    }

    /// Writes a complete buffer through a handle, erroring if the member
    /// cannot take all of it.
    fn write_handle_all(&mut self, h: FileHandle, data: &[u8]) -> Result<()> {
        let mut written = 0usize;
        while written < data.len() {
            let n = self.write_handle(h, &data[written..])?;
            if n == 0 {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "member file is full",
                )));
            }
            written += n;
        }
        Ok(())
    }
}
