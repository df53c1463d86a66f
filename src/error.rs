//! Error types for archive operations.
//!
//! This module provides the [`Error`] enum which represents all possible
//! failure modes when working with game archives, along with a convenient
//! [`Result<T>`] type alias.
//!
//! # Error Handling
//!
//! All fallible operations in this crate return `Result<T, Error>`. You can
//! handle errors using pattern matching or the `?` operator:
//!
//! ```rust,no_run
//! use retropak::Error;
//!
//! fn describe(err: &Error) {
//!     match err {
//!         Error::Io(e) => println!("File error: {}", e),
//!         Error::FormatMismatch(_) => println!("Not an archive in this format."),
//!         Error::FileInUse => println!("Close the file first."),
//!         Error::NameTooLong { max } => println!("Names are limited to {} chars.", max),
//!         _ => println!("Error: {}", err),
//!     }
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants | Typical cause |
//! |----------|----------|---------------|
//! | I/O | [`Io`][Error::Io] | Backing stream read/write/seek/truncate |
//! | Format | [`FormatMismatch`][Error::FormatMismatch], [`Truncated`][Error::Truncated] | Invalid archive data |
//! | Naming | [`NameTooLong`][Error::NameTooLong], [`InvalidName`][Error::InvalidName], [`NameConflict`][Error::NameConflict] | Filename rules |
//! | Lifecycle | [`FileRemoved`][Error::FileRemoved], [`FileInUse`][Error::FileInUse], [`StaleHandle`][Error::StaleHandle] | Handle revalidation |
//! | Filters | [`FilterMissing`][Error::FilterMissing], [`FilterMismatch`][Error::FilterMismatch] | Filter registry lookups |

use std::io;

/// The main error type for archive operations.
///
/// Each variant carries enough context to tell the user what went wrong
/// without having to re-inspect the archive.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error on the backing stream or a supplementary stream.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The stream is not in the expected archive format, or structural
    /// checks failed during an explicit open.
    #[error("invalid archive format: {0}")]
    FormatMismatch(String),

    /// The stream ended inside a directory entry or before a declared
    /// file body.
    #[error("archive truncated: {0}")]
    Truncated(String),

    /// The directory holds a fixed maximum number of entries and an insert
    /// would exceed it.
    #[error("too many files, maximum is {max}")]
    TooMany {
        /// The format's fixed directory capacity.
        max: usize,
    },

    /// A proposed filename exceeds the format's maximum length.
    #[error("maximum filename length is {max} chars")]
    NameTooLong {
        /// Maximum name length for this format.
        max: usize,
    },

    /// A proposed filename is not acceptable for reasons other than length
    /// (e.g. empty, or missing a required extension).
    #[error("invalid filename: {0}")]
    InvalidName(String),

    /// A file with this name already exists.
    ///
    /// The core permits duplicates; this is raised only by drivers whose
    /// format forbids them.
    #[error("a file named '{name}' already exists")]
    NameConflict {
        /// The conflicting name.
        name: String,
    },

    /// No file with the given name (or index) exists in the archive.
    #[error("file not found: {name}")]
    FileNotFound {
        /// The name or index spec that failed to resolve.
        name: String,
    },

    /// The entry behind a handle has been removed from the archive.
    #[error("access to removed file")]
    FileRemoved,

    /// `remove` was called while a stream on the entry is still open.
    #[error("cannot remove an open file; close the file then try again")]
    FileInUse,

    /// A handle does not refer to a currently open file.
    #[error("stale file handle")]
    StaleHandle,

    /// An entry's filter code is not present in the filter registry.
    #[error("no filter registered with code '{code}'")]
    FilterMissing {
        /// The unresolved filter code.
        code: String,
    },

    /// `move` across positions whose resulting filters would differ.
    #[error("cannot move file to this position (filter change); remove and re-add it instead")]
    FilterMismatch,

    /// `open_folder` was called on an entry without the folder attribute,
    /// or on a format without subfolder support.
    #[error("entry is not a folder")]
    NotAFolder,

    /// A path resolved to a folder where a file was required.
    #[error("path addresses a folder: {path}")]
    IsAFolder {
        /// The offending path.
        path: String,
    },

    /// A mutating operation was attempted on a fixed (read-only) archive.
    #[error("this archive cannot be modified")]
    ReadOnly,
}

/// A specialized `Result` type for archive operations.
pub type Result<T> = std::result::Result<T, Error>;
