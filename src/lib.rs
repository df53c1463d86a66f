//! # retropak
//!
//! A pure-Rust library for reading, writing and editing retro-game archive
//! files — the `.GRP`/`.WAD`/`.VOL`-style containers that bundle a game's
//! data files behind a per-format directory ("FAT").
//!
//! The crate is built around one generic engine: format drivers only
//! describe how their directory is encoded, and the [`fat`] engine handles
//! everything the formats share — in-place inserts, removals, renames,
//! moves and resizes over a segmented backing stream, with open member
//! handles staying valid while data shifts underneath them. Obfuscated or
//! enveloped member data is handled by stackable [`filter`] transforms.
//!
//! ## Quick Start
//!
//! ### Reading an archive
//!
//! ```rust
//! use retropak::{Archive, formats::grp_duke3d};
//! use std::io::Cursor;
//!
//! fn main() -> retropak::Result<()> {
//!     // A blank GRP: signature plus zero file count.
//!     let mut archive = grp_duke3d::create(Cursor::new(Vec::new()))?;
//!
//!     for entry in archive.files() {
//!         println!("{}: {} bytes", entry.name, entry.stored_size);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ### Editing in place
//!
//! ```rust
//! use retropak::{Archive, NewFile, formats::grp_duke3d};
//! use std::io::Cursor;
//!
//! fn main() -> retropak::Result<()> {
//!     let mut archive = grp_duke3d::create(Cursor::new(Vec::new()))?;
//!
//!     // Insert a member and write its content through a handle.
//!     let id = archive.insert(None, NewFile::new("HELLO.TXT", 5))?;
//!     let h = archive.open(id, false)?;
//!     archive.write_handle_all(h, b"hello")?;
//!     archive.close(h)?;
//!
//!     // Nothing touches the backing stream in bulk until flush.
//!     archive.flush()?;
//!     Ok(())
//! }
//! ```
//!
//! ### Detecting a format
//!
//! ```rust,no_run
//! use retropak::FormatRegistry;
//! use std::fs::File;
//!
//! fn main() -> retropak::Result<()> {
//!     let registry = FormatRegistry::builtin();
//!     let mut file = File::open("duke3d.grp")?;
//!     let found = registry.autodetect(&mut file, "duke3d.grp", &|name| {
//!         std::path::Path::new(name).exists()
//!     })?;
//!     if let Some(format) = found {
//!         println!("looks like {}", format.name());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Safety notes
//!
//! The "encryption" used by these formats is obfuscation, not security.
//! Archives are mutated in memory and through a segment list; call
//! [`Archive::flush`] before dropping an archive or the edits are lost
//! (nothing is written from a destructor, which would have no way to
//! report failure).
//!
//! Archives are single-threaded: call one method at a time per archive
//! and serialise externally if you must share one across threads.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod archive;
pub mod entry;
pub mod error;
pub mod fat;
pub mod filter;
pub mod fixed;
pub mod format;
pub mod formats;
pub mod handle;
pub mod resolve;
pub mod stream;

pub use archive::{Archive, NewFile};
pub use entry::{Attributes, Entry, EntryId, FILETYPE_GENERIC, FILTER_NONE};
pub use error::{Error, Result};
pub use handle::FileHandle;

// Re-export the engines at crate root for convenience
pub use fat::{FatArchive, FatDriver, FatOptions, FatState};
pub use fixed::{FixedArchive, FixedFile};

// Re-export the registries and contracts
pub use filter::{FilterRegistry, FilterType, Transform};
pub use format::{ArchiveFormat, Certainty, FormatRegistry, SuppData, SuppFilenames, SuppItem};

// Re-export the resolver
pub use resolve::{Located, resolve};

// Re-export the stream layer
pub use stream::{SegStream, Stream, Truncate, Window};
