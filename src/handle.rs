//! Generation-tagged handles for open member files.
//!
//! The archive keeps every open member file in a slot table and hands out
//! small `Copy` handles instead of stream objects. Every operation through
//! a handle revalidates it against the table (and the entry behind it), so
//! a handle held across a `remove` degrades into an error instead of a
//! dangling pointer. This replaces the shared/weak-pointer graph a
//! garbage-collected design would use.

use crate::entry::EntryId;
use crate::error::{Error, Result};
use crate::stream::Window;

/// A handle to an open member file.
///
/// Obtained from an archive's `open`; pass it back to the same archive for
/// reads, writes and seeks, and `close` it when done. Handles are cheap to
/// copy; a closed or otherwise dead handle fails with
/// [`Error::StaleHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileHandle {
    pub(crate) slot: u32,
    pub(crate) generation: u32,
}

/// How an open slot serves its bytes.
pub(crate) enum SlotKind {
    /// A window straight onto the stored bytes in the backing stream. The
    /// engine relocates/resizes the window as neighbouring edits happen.
    Raw(Window),
    /// A decoded in-memory copy for filtered access; re-encoded into the
    /// archive when the handle is closed dirty.
    Filtered { plain: Vec<u8>, dirty: bool },
}

/// State of one open member file.
pub(crate) struct OpenFile {
    pub entry: EntryId,
    pub pos: u64,
    pub kind: SlotKind,
}

/// Slot table mapping [`FileHandle`]s to [`OpenFile`] state.
#[derive(Default)]
pub(crate) struct HandleTable {
    slots: Vec<(u32, Option<OpenFile>)>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an open file, reusing a free slot if one exists.
    pub fn open(&mut self, file: OpenFile) -> FileHandle {
        for (i, (generation, state)) in self.slots.iter_mut().enumerate() {
            if state.is_none() {
                *generation = generation.wrapping_add(1);
                *state = Some(file);
                return FileHandle {
                    slot: i as u32,
                    generation: *generation,
                };
            }
        }
        self.slots.push((0, Some(file)));
        FileHandle {
            slot: (self.slots.len() - 1) as u32,
            generation: 0,
        }
    }

    pub fn get(&self, h: FileHandle) -> Result<&OpenFile> {
        self.slots
            .get(h.slot as usize)
            .filter(|(generation, _)| *generation == h.generation)
            .and_then(|(_, state)| state.as_ref())
            .ok_or(Error::StaleHandle)
    }

    pub fn get_mut(&mut self, h: FileHandle) -> Result<&mut OpenFile> {
        self.slots
            .get_mut(h.slot as usize)
            .filter(|(generation, _)| *generation == h.generation)
            .and_then(|(_, state)| state.as_mut())
            .ok_or(Error::StaleHandle)
    }

    /// Frees the slot, returning its state.
    pub fn close(&mut self, h: FileHandle) -> Result<OpenFile> {
        let slot = self
            .slots
            .get_mut(h.slot as usize)
            .filter(|(generation, _)| *generation == h.generation)
            .ok_or(Error::StaleHandle)?;
        slot.1.take().ok_or(Error::StaleHandle)
    }

    /// True if any live handle points at the given entry.
    pub fn any_on_entry(&self, id: EntryId) -> bool {
        self.slots
            .iter()
            .any(|(_, state)| state.as_ref().is_some_and(|of| of.entry == id))
    }

    /// Iterates over live open files, mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut OpenFile> {
        self.slots.iter_mut().filter_map(|(_, state)| state.as_mut())
    }
}
