//! Shared test utilities for integration tests.
//!
//! Note: `#![allow(dead_code)]` is required because each integration test
//! file compiles as a separate crate and may only use a subset of these
//! helpers.

#![allow(dead_code)]

use std::io::Cursor;

use retropak::formats::grp_duke3d::{self, GrpArchive};
use retropak::{Archive, NewFile};

/// An in-memory GRP archive.
pub type MemGrp = GrpArchive<Cursor<Vec<u8>>>;

/// Creates an in-memory GRP archive with the given members.
pub fn grp_with(entries: &[(&str, &[u8])]) -> MemGrp {
    let mut arc = grp_duke3d::create(Cursor::new(Vec::new())).unwrap();
    for (name, data) in entries {
        let id = arc
            .insert(None, NewFile::new(*name, data.len() as u64))
            .unwrap();
        let h = arc.open(id, false).unwrap();
        arc.write_handle_all(h, data).unwrap();
        arc.close(h).unwrap();
    }
    arc
}

/// Flushes the archive and returns the committed backing bytes.
pub fn committed(arc: &mut MemGrp) -> Vec<u8> {
    arc.flush().unwrap();
    arc.state().content.get_ref().get_ref().clone()
}

/// Builds the raw bytes of a GRP archive directly, for byte-level
/// comparisons against what the engine produces.
pub fn raw_grp(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut raw = Vec::new();
    raw.extend_from_slice(b"KenSilverman");
    raw.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    for (name, data) in entries {
        let mut field = [0u8; 12];
        field[..name.len()].copy_from_slice(name.as_bytes());
        raw.extend_from_slice(&field);
        raw.extend_from_slice(&(data.len() as u32).to_le_bytes());
    }
    for (_, data) in entries {
        raw.extend_from_slice(data);
    }
    raw
}
