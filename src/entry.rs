//! The in-memory directory model: entries, attributes and entry ids.

use bitflags::bitflags;

/// File type tag for generic files (no special handling).
pub const FILETYPE_GENERIC: &str = "";

/// Filter code for unfiltered files.
pub const FILTER_NONE: &str = "";

/// Common maximum filename length for DOS-era formats (8.3 plus the dot).
pub const STD_DOS_FILENAME_LEN: usize = 12;

bitflags! {
    /// File attribute flags. Can be OR'd together.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Attributes: u8 {
        /// There is currently no file at this location.
        const EMPTY = 0x01;
        /// File is hidden between two directory entries.
        const HIDDEN = 0x02;
        /// File is compressed.
        const COMPRESSED = 0x04;
        /// File is encrypted.
        const ENCRYPTED = 0x08;
        /// This entry is a folder, not a file.
        const FOLDER = 0x80;
    }
}

/// A stable identifier for an archive entry.
///
/// Ids are allocated monotonically by the owning archive and are never
/// reused, so an id held across a `remove` simply stops resolving — that is
/// the signal that the entry is gone. Ids from one archive instance are
/// meaningless in another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(pub(crate) u64);

impl EntryId {
    /// Placeholder id used while parsing, before the archive assigns real
    /// ids. Never resolves.
    pub const UNASSIGNED: EntryId = EntryId(u64::MAX);
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One record in an archive directory.
///
/// The first group of fields is valid for every archive type; the `index`,
/// `offset` and `header_len` fields are maintained by the FAT engine
/// (fixed archives keep `header_len` at zero).
#[derive(Debug, Clone)]
pub struct Entry {
    /// Stable id assigned by the owning archive.
    pub id: EntryId,
    /// Display name. May be empty for formats that store no filenames.
    pub name: String,
    /// Size of the file as stored in the archive (post-filter).
    pub stored_size: u64,
    /// Size before filtering/compression. Equal to `stored_size` when the
    /// entry has no filter.
    pub real_size: u64,
    /// MIME-like file type, or empty for generic files.
    pub file_type: String,
    /// Code of the filter to apply, or empty for none.
    pub filter: String,
    /// Attribute flags.
    pub attrs: Attributes,
    /// False once the entry has been removed from the archive. Any lingering
    /// handle must observe this and fail.
    pub valid: bool,

    /// Ordinal position in the archive (the on-disk order, which may differ
    /// from the in-memory list order).
    pub index: u32,
    /// Absolute byte position of the entry's data region, including any
    /// inline header.
    pub offset: u64,
    /// Bytes of per-entry inline header preceding the data region. Zero for
    /// most formats.
    pub header_len: u64,
}

impl Entry {
    /// Creates a blank entry with the given name and stored size, no filter
    /// and generic type. The id is assigned when the entry joins an archive.
    pub fn new(name: impl Into<String>, stored_size: u64) -> Self {
        Self {
            id: EntryId::UNASSIGNED,
            name: name.into(),
            stored_size,
            real_size: stored_size,
            file_type: FILETYPE_GENERIC.to_string(),
            filter: FILTER_NONE.to_string(),
            attrs: Attributes::empty(),
            valid: false,
            index: 0,
            offset: 0,
            header_len: 0,
        }
    }

    /// Returns the absolute byte position of the first data byte, past any
    /// inline header.
    #[inline]
    pub fn data_offset(&self) -> u64 {
        self.offset + self.header_len
    }

    /// Total bytes this entry occupies in the backing stream.
    #[inline]
    pub fn total_len(&self) -> u64 {
        self.header_len + self.stored_size
    }

    /// Returns true if this entry is a folder.
    #[inline]
    pub fn is_folder(&self) -> bool {
        self.attrs.contains(Attributes::FOLDER)
    }
}

impl Default for Entry {
    fn default() -> Self {
        Self::new(String::new(), 0)
    }
}
