//! The generic FAT-style archive engine.
//!
//! Most retro-game archives share one shape: an ordered table of (name,
//! offset, size) records plus a run of file bodies. This module implements
//! everything that shape has in common — keeping the in-memory entry list
//! in sync with a segmented backing stream through insert / remove / rename
//! / move / resize, tracking open member handles across shifts, and
//! delegating the per-format directory encoding to a [`FatDriver`].
//!
//! A driver only has to answer "how is *your* directory written?": the
//! engine computes offsets, shifts neighbours, relocates open windows, and
//! calls the driver's hooks at the right moments. Hooks receive the mutable
//! [`FatState`] so they can write directory bytes themselves and invoke the
//! shared [`shift_entries`] pass (for example when the directory itself
//! grows by one record).

use std::io::{Read, Seek, SeekFrom, Write};

use crate::archive::{Archive, NewFile};
use crate::entry::{Entry, EntryId};
use crate::error::{Error, Result};
use crate::filter::FilterRegistry;
use crate::handle::{FileHandle, HandleTable, OpenFile, SlotKind};
use crate::stream::{SegStream, Stream, Window};

/// Per-format configuration for the engine.
#[derive(Debug, Clone, Copy)]
pub struct FatOptions {
    /// Offset where the first file's data goes in an otherwise empty
    /// archive (i.e. the size of any fixed header/directory area).
    pub first_file_offset: u64,
    /// Maximum filename length; zero means unlimited.
    pub max_name_len: usize,
}

/// The engine's mutable core: the segmented backing stream, the entry
/// list, and the table of open member handles.
///
/// Driver hooks receive `&mut FatState` so they can seek and write
/// directory bytes directly and run [`shift_entries`] when their edits move
/// file data around.
pub struct FatState<S: Stream> {
    /// The backing stream, wrapped for O(1) structural edits. Committed by
    /// the engine's `flush`.
    pub content: SegStream<S>,
    entries: Vec<Entry>,
    next_id: u64,
    handles: HandleTable,
    opts: FatOptions,
}

impl<S: Stream> FatState<S> {
    /// The ordered entry list.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Looks up an entry by id.
    pub fn entry(&self, id: EntryId) -> Result<&Entry> {
        self.entries
            .iter()
            .find(|e| e.id == id)
            .ok_or(Error::FileRemoved)
    }

    /// The configured first-file offset for an empty archive.
    pub fn first_file_offset(&self) -> u64 {
        self.opts.first_file_offset
    }

    /// The configured maximum filename length (zero = unlimited).
    pub fn max_name_len(&self) -> usize {
        self.opts.max_name_len
    }

    fn entry_mut(&mut self, id: EntryId) -> Result<&mut Entry> {
        self.entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(Error::FileRemoved)
    }

    fn position_of(&self, id: EntryId) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }

    fn alloc_id(&mut self) -> EntryId {
        let id = EntryId(self.next_id);
        self.next_id += 1;
        id
    }

    fn check_live(&self, id: EntryId) -> Result<()> {
        if self.entry(id)?.valid {
            Ok(())
        } else {
            Err(Error::FileRemoved)
        }
    }

    /// Reads an entry's stored bytes (past any inline header).
    fn read_stored(&mut self, id: EntryId) -> Result<Vec<u8>> {
        let e = self.entry(id)?;
        let (off, len) = (e.data_offset(), e.stored_size);
        let mut buf = vec![0u8; len as usize];
        self.content.seek(SeekFrom::Start(off))?;
        self.content.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn handle_read(&mut self, h: FileHandle, buf: &mut [u8]) -> Result<usize> {
        let eid = self.handles.get(h)?.entry;
        self.check_live(eid)?;
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

    fn handle_write(&mut self, h: FileHandle, buf: &[u8]) -> Result<usize> {
        let eid = self.handles.get(h)?.entry;
        self.check_live(eid)?;
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
}

/// The per-format hooks a FAT driver supplies.
///
/// Every hook except [`update_file_name`](Self::update_file_name) has a
/// no-op default, so a driver for a format with no stored offsets (say)
/// simply leaves [`update_file_offset`](Self::update_file_offset) alone.
pub trait FatDriver<S: Stream> {
    /// Writes a new name into the on-disk directory. Called on rename with
    /// the length already validated; the in-memory entry is updated only
    /// if this returns `Ok`.
    fn update_file_name(
        &mut self,
        state: &mut FatState<S>,
        id: EntryId,
        new_name: &str,
    ) -> Result<()>;

    /// Writes an entry's new offset into the directory after a shift. The
    /// entry already carries the new offset; `delta` is how far it moved.
    fn update_file_offset(
        &mut self,
        _state: &mut FatState<S>,
        _id: EntryId,
        _delta: i64,
    ) -> Result<()> {
        Ok(())
    }

    /// Writes an entry's new stored size into the directory after a
    /// resize. The entry already carries the new sizes.
    fn update_file_size(
        &mut self,
        _state: &mut FatState<S>,
        _id: EntryId,
        _delta: i64,
    ) -> Result<()> {
        Ok(())
    }

    /// Allocates the directory slot (and any per-entry inline header) for
    /// a new file. The entry is not yet in the list; this hook must set
    /// `header_len` if the format has inline headers, and must account for
    /// any bytes the directory itself grows by (typically via
    /// [`shift_entries`]).
    fn pre_insert(
        &mut self,
        _state: &mut FatState<S>,
        _before: Option<EntryId>,
        _new_entry: &mut Entry,
    ) -> Result<()> {
        Ok(())
    }

    /// Final fix-ups after the new file's data region has been allocated.
    fn post_insert(&mut self, _state: &mut FatState<S>, _id: EntryId) -> Result<()> {
        Ok(())
    }

    /// Deletes the directory slot for a file about to be removed. The file
    /// data and the entry itself are still in place.
    fn pre_remove(&mut self, _state: &mut FatState<S>, _id: EntryId) -> Result<()> {
        Ok(())
    }

    /// Final fix-ups after the file data has been removed. The entry has
    /// left the list; a detached copy (already marked invalid) is passed
    /// for reference.
    fn post_remove(&mut self, _state: &mut FatState<S>, _entry: &Entry) -> Result<()> {
        Ok(())
    }

    /// Produces a blank entry for insert. Drivers can prefill
    /// format-specific defaults (e.g. a filter implied by an attribute).
    fn make_new_entry(&self) -> Entry {
        Entry::default()
    }

    /// Opens a folder entry as a nested archive. The default fails; only
    /// formats with an independent per-folder directory override this.
    fn open_folder(
        &mut self,
        _state: &mut FatState<S>,
        _id: EntryId,
    ) -> Result<Box<dyn Archive>> {
        Err(Error::NotAFolder)
    }

    /// Extra work at flush time, before the backing stream is committed —
    /// e.g. writing back a directory kept in a secondary stream.
    fn flush(&mut self, _state: &mut FatState<S>) -> Result<()> {
        Ok(())
    }
}

/// Shifts entries starting at or after `off_start` by `delta` bytes and
/// `delta_index` positions, writing each new offset through the driver's
/// [`update_file_offset`](FatDriver::update_file_offset) hook and
/// relocating open member windows to match.
///
/// `skip` names an entry that must not move even if it sits in the range —
/// the one being inserted or resized. A zero-length entry at exactly the
/// skip entry's offset but with a lower index is also left alone; without
/// that rule, empty files sitting just before the reference entry would be
/// mis-ordered after a neighbour grows.
pub fn shift_entries<S: Stream, D: FatDriver<S> + ?Sized>(
    driver: &mut D,
    state: &mut FatState<S>,
    skip: Option<&Entry>,
    off_start: u64,
    delta: i64,
    delta_index: i32,
) -> Result<()> {
    // Decide who moves before mutating anything.
    let moving: Vec<EntryId> = state
        .entries
        .iter()
        .filter(|e| entry_in_range(e, off_start, skip))
        .map(|e| e.id)
        .collect();

    for id in &moving {
        {
            let e = state.entry_mut(*id)?;
            e.offset = e
                .offset
                .checked_add_signed(delta)
                .expect("shift moved an entry before the start of the archive");
            // The index must change before the on-disk update so the hook
            // writes to the right directory slot.
            e.index = e
                .index
                .checked_add_signed(delta_index)
                .expect("shift produced a negative index");
        }
        driver.update_file_offset(state, *id, delta)?;
    }

    // Relocate the windows of open files on shifted entries.
    for of in state.handles.iter_mut() {
        if moving.contains(&of.entry) {
            if let SlotKind::Raw(w) = &mut of.kind {
                w.relocate(delta);
            }
        }
    }

    Ok(())
}

/// Should this entry move in a shift starting at `off_start`?
fn entry_in_range(e: &Entry, off_start: u64, skip: Option<&Entry>) -> bool {
    // Never move files before the start of the shift block.
    if e.offset < off_start {
        return false;
    }
    if let Some(skip) = skip {
        if skip.valid {
            if e.id == skip.id {
                return false;
            }
            // A zero-length file sharing the skip entry's offset but coming
            // earlier in index order stays put.
            if e.stored_size == 0 && e.offset == skip.offset && e.index < skip.index {
                return false;
            }
        }
    }
    true
}

/// A FAT-style archive: the engine plus a format driver.
pub struct FatArchive<S: Stream, D: FatDriver<S>> {
    state: FatState<S>,
    driver: D,
    filters: FilterRegistry,
}

impl<S: Stream, D: FatDriver<S>> FatArchive<S, D> {
    /// Assembles an archive from a parsed entry list.
    ///
    /// Drivers call this at the end of their `open`/`create` after reading
    /// the directory. Entries are given ids and marked valid in list order;
    /// the list order must be the on-disk order.
    pub fn assemble(
        content: SegStream<S>,
        driver: D,
        opts: FatOptions,
        entries: Vec<Entry>,
    ) -> Self {
        let mut state = FatState {
            content,
            entries,
            next_id: 0,
            handles: HandleTable::new(),
            opts,
        };
        for e in &mut state.entries {
            e.id = EntryId(state.next_id);
            state.next_id += 1;
            e.valid = true;
        }
        log::debug!(
            "archive assembled with {} entries, first file offset {}",
            state.entries.len(),
            opts.first_file_offset
        );
        Self {
            state,
            driver,
            filters: FilterRegistry::builtin(),
        }
    }

    /// Replaces the filter registry consulted by filtered opens.
    pub fn with_filters(mut self, filters: FilterRegistry) -> Self {
        self.filters = filters;
        self
    }

    /// The engine state (mainly useful to tests and tools).
    pub fn state(&self) -> &FatState<S> {
        &self.state
    }

    /// The format driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    fn check_name(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidName("empty filename".into()));
        }
        let max = self.state.opts.max_name_len;
        if max > 0 && name.len() > max {
            return Err(Error::NameTooLong { max });
        }
        Ok(())
    }
}

impl<S: Stream, D: FatDriver<S>> Archive for FatArchive<S, D> {
    fn files(&self) -> &[Entry] {
        &self.state.entries
    }

    fn open(&mut self, id: EntryId, use_filter: bool) -> Result<FileHandle> {
        self.state.check_live(id)?;
        let e = self.state.entry(id)?;
        let kind = if use_filter && !e.filter.is_empty() {
            let code = e.filter.clone();
            // Pull the stored bytes and decode them up front; writes
            // re-encode on close.
            let stored = self.state.read_stored(id)?;
            let filter = self
                .filters
                .get(&code)
                .ok_or(Error::FilterMissing { code })?;
            let plain = filter.decode(&stored)?;
            SlotKind::Filtered {
                plain,
                dirty: false,
            }
        } else {
            SlotKind::Raw(Window::new(e.data_offset(), e.stored_size))
        };
        Ok(self.state.handles.open(OpenFile {
            entry: id,
            pos: 0,
            kind,
        }))
    }

    fn read_handle(&mut self, h: FileHandle, buf: &mut [u8]) -> Result<usize> {
        self.state.handle_read(h, buf)
    }

    fn write_handle(&mut self, h: FileHandle, buf: &[u8]) -> Result<usize> {
        self.state.handle_write(h, buf)
    }

    fn seek_handle(&mut self, h: FileHandle, pos: u64) -> Result<u64> {
        let of = self.state.handles.get_mut(h)?;
        of.pos = pos;
        Ok(pos)
    }

    fn handle_len(&self, h: FileHandle) -> Result<u64> {
        let of = self.state.handles.get(h)?;
        Ok(match &of.kind {
            SlotKind::Raw(w) => w.len(),
            SlotKind::Filtered { plain, .. } => plain.len() as u64,
        })
    }

    fn truncate_handle(&mut self, h: FileHandle, new_len: u64) -> Result<()> {
        let of = self.state.handles.get(h)?;
        let eid = of.entry;
        self.state.check_live(eid)?;
        match &of.kind {
            SlotKind::Raw(_) => {
                // Route through the archive so following files shift. When
                // the entry is filtered the stored size changes but the
                // real size is owned by whoever encodes the data.
                let e = self.state.entry(eid)?;
                let new_real = if e.filter.is_empty() { new_len } else { e.real_size };
                self.resize(eid, new_len, new_real)
            }
            SlotKind::Filtered { .. } => {
                let of = self.state.handles.get_mut(h)?;
                if let SlotKind::Filtered { plain, dirty } = &mut of.kind {
                    plain.resize(new_len as usize, 0);
                    *dirty = true;
                }
                Ok(())
            }
        }
    }

    fn close(&mut self, h: FileHandle) -> Result<()> {
        let of = self.state.handles.close(h)?;
        if let SlotKind::Filtered { plain, dirty: true } = of.kind {
            // Re-encode and push the stored form back into the archive.
            let eid = of.entry;
            self.state.check_live(eid)?;
            let e = self.state.entry(eid)?;
            let filter = self
                .filters
                .get(&e.filter)
                .ok_or_else(|| Error::FilterMissing {
                    code: e.filter.clone(),
                })?;
            let (stored, sizes) = filter.encode(&plain)?;
            self.resize(eid, sizes.stored, sizes.real)?;
            let e = self.state.entry(eid)?;
            let off = e.data_offset();
            self.state.content.seek(SeekFrom::Start(off))?;
            self.state.content.write_all(&stored)?;
        }
        Ok(())
    }

    fn open_folder(&mut self, id: EntryId) -> Result<Box<dyn Archive>> {
        self.state.check_live(id)?;
        if !self.state.entry(id)?.is_folder() {
            return Err(Error::NotAFolder);
        }
        self.driver.open_folder(&mut self.state, id)
    }

    fn insert(&mut self, before: Option<EntryId>, file: NewFile) -> Result<EntryId> {
        self.check_name(&file.name)?;

        let mut new_e = self.driver.make_new_entry();
        new_e.name = file.name;
        new_e.stored_size = file.stored_size;
        new_e.real_size = file.stored_size; // default to no filter
        new_e.file_type = file.file_type;
        new_e.attrs = file.attrs;
        new_e.header_len = 0;
        new_e.valid = false; // not yet; shifts run from pre_insert skip it
        new_e.id = self.state.alloc_id();

        // Figure out where the new file is going to go.
        let before_live = before.is_some_and(|id| self.state.check_live(id).is_ok());
        let list_pos = if before_live {
            let b = self.state.entry(before.unwrap())?;
            new_e.offset = b.offset;
            new_e.index = b.index;
            self.state.position_of(b.id).unwrap()
        } else if let Some(last) = self.state.entries.last() {
            new_e.offset = last.offset + last.total_len();
            new_e.index = last.index + 1;
            self.state.entries.len()
        } else {
            new_e.offset = self.state.opts.first_file_offset;
            new_e.index = 0;
            0
        };

        // Let the driver allocate the directory slot. May fail, in which
        // case the archive is left untouched.
        self.driver
            .pre_insert(&mut self.state, before.filter(|_| before_live), &mut new_e)?;

        // Valid from here on so the upcoming shift can skip it by identity.
        new_e.valid = true;

        if before_live {
            // Everything at or after the new file's data region moves
            // forward to make room. The bytes themselves move at commit.
            shift_entries(
                &mut self.driver,
                &mut self.state,
                Some(&new_e),
                new_e.offset + new_e.header_len,
                new_e.stored_size as i64,
                1,
            )?;
        }

        let id = new_e.id;
        let data_off = new_e.data_offset();
        let stored = new_e.stored_size;
        self.state.entries.insert(list_pos, new_e);

        // Allocate the data region. pre_insert already inserted and wrote
        // any inline header, so this starts just past it.
        self.state.content.seek(SeekFrom::Start(data_off))?;
        self.state.content.insert(stored)?;

        self.driver.post_insert(&mut self.state, id)?;
        log::debug!("inserted entry {} ({} bytes)", id, stored);
        Ok(id)
    }

    fn remove(&mut self, id: EntryId) -> Result<()> {
        self.state.check_live(id)?;
        if self.state.handles.any_on_entry(id) {
            return Err(Error::FileInUse);
        }

        self.driver.pre_remove(&mut self.state, id)?;

        let pos = self.state.position_of(id).ok_or(Error::FileRemoved)?;
        let mut gone = self.state.entries.remove(pos);

        // Close the gap: files after this one slide back.
        shift_entries(
            &mut self.driver,
            &mut self.state,
            Some(&gone),
            gone.offset,
            -(gone.total_len() as i64),
            -1,
        )?;

        self.state.content.seek(SeekFrom::Start(gone.offset))?;
        self.state.content.remove(gone.total_len())?;

        // Anything still holding the id sees a removed file from now on.
        gone.valid = false;

        self.driver.post_remove(&mut self.state, &gone)?;
        log::debug!("removed entry {} ({})", id, gone.name);
        Ok(())
    }

    fn rename(&mut self, id: EntryId, new_name: &str) -> Result<()> {
        self.state.check_live(id)?;
        self.check_name(new_name)?;
        self.driver.update_file_name(&mut self.state, id, new_name)?;
        self.state.entry_mut(id)?.name = new_name.to_string();
        Ok(())
    }

    fn move_entry(&mut self, before: Option<EntryId>, id: EntryId) -> Result<()> {
        self.state.check_live(id)?;
        let src = self.state.entry(id)?.clone();

        let src_h = self.open(id, false)?;
        let new_id = match self.insert(
            before,
            NewFile {
                name: src.name.clone(),
                stored_size: src.stored_size,
                file_type: src.file_type.clone(),
                attrs: src.attrs,
            },
        ) {
            Ok(new_id) => new_id,
            Err(e) => {
                self.close(src_h)?;
                return Err(e);
            }
        };

        // Filters are not transparently converted.
        if self.state.entry(new_id)?.filter != src.filter {
            self.close(src_h)?;
            self.remove(new_id)?;
            return Err(Error::FilterMismatch);
        }

        let dst_h = self.open(new_id, false)?;
        let mut buf = [0u8; 8192];
        loop {
            let n = self.read_handle(src_h, &mut buf)?;
            if n == 0 {
                break;
            }
            self.write_handle_all(dst_h, &buf[..n])?;
        }

        // Bring the unfiltered size across when a filter is set.
        if !src.filter.is_empty() {
            let stored = self.state.entry(new_id)?.stored_size;
            self.resize(new_id, stored, src.real_size)?;
        }

        self.close(src_h)?;
        self.close(dst_h)?;
        self.remove(id)
    }

    fn resize(&mut self, id: EntryId, new_stored: u64, new_real: u64) -> Result<()> {
        self.state.check_live(id)?;

        let (old_stored, old_real) = {
            let e = self.state.entry(id)?;
            (e.stored_size, e.real_size)
        };
        let delta = new_stored as i64 - old_stored as i64;

        {
            let e = self.state.entry_mut(id)?;
            e.stored_size = new_stored;
            e.real_size = new_real;
        }

        // Update the on-disk directory; undo and abort if that fails.
        if let Err(err) = self.driver.update_file_size(&mut self.state, id, delta) {
            let e = self.state.entry_mut(id)?;
            e.stored_size = old_stored;
            e.real_size = old_real;
            return Err(err);
        }

        if delta == 0 {
            // Only the real size changed (or nothing did).
            return Ok(());
        }

        let e = self.state.entry(id)?.clone();
        let start = if delta > 0 {
            let start = e.offset + e.header_len + old_stored;
            self.state.content.seek(SeekFrom::Start(start))?;
            self.state.content.insert(delta as u64)?;
            start
        } else {
            let start = e.offset + e.header_len + new_stored;
            self.state.content.seek(SeekFrom::Start(start))?;
            self.state.content.remove((-delta) as u64)?;
            start
        };

        shift_entries(&mut self.driver, &mut self.state, Some(&e), start, delta, 0)?;

        // Tell any open windows on this entry about the new length. There
        // can be several opens of the same file.
        for of in self.state.handles.iter_mut() {
            if of.entry == id {
                if let SlotKind::Raw(w) = &mut of.kind {
                    w.resize(new_stored);
                }
            }
        }

        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.driver.flush(&mut self.state)?;
        self.state.content.commit()?;
        log::debug!("archive flushed ({} bytes)", self.state.content.len());
        Ok(())
    }
}
