//! Tests for name, path and `@index` resolution, including descent into
//! folder entries.
//!
//! None of the shipped formats carries an independent per-folder
//! directory, so folder traversal is exercised with a small test driver
//! whose folder entries hold a complete nested GRP archive.

mod common;

use std::io::Cursor;

use common::raw_grp;
use retropak::fat::{FatArchive, FatDriver, FatOptions, FatState};
use retropak::formats::grp_duke3d;
use retropak::stream::SegStream;
use retropak::{Archive, Attributes, EntryId, Error, Located, NewFile, Stream, resolve};

/// A directoryless test format where a FOLDER-flagged entry's data region
/// is a nested GRP archive.
struct FolderTestDriver;

impl<S: Stream> FatDriver<S> for FolderTestDriver {
    fn update_file_name(
        &mut self,
        _state: &mut FatState<S>,
        _id: EntryId,
        _new_name: &str,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn open_folder(
        &mut self,
        state: &mut FatState<S>,
        id: EntryId,
    ) -> Result<Box<dyn Archive>, Error> {
        // Materialise the folder's bytes and open them as a GRP.
        let e = state.entry(id)?.clone();
        let mut buf = vec![0u8; e.stored_size as usize];
        use std::io::{Read, Seek, SeekFrom};
        state.content.seek(SeekFrom::Start(e.data_offset()))?;
        state.content.read_exact(&mut buf)?;
        Ok(Box::new(grp_duke3d::open(Cursor::new(buf))?))
    }
}

/// Builds a root archive holding `README.TXT`, a `DATA` folder (a nested
/// GRP with `HELLO.TXT` and `WORLD.BIN`) and a trailing `LAST.DAT`.
fn sample_tree() -> FatArchive<Cursor<Vec<u8>>, FolderTestDriver> {
    let nested = raw_grp(&[("HELLO.TXT", b"hi there"), ("WORLD.BIN", b"\x01\x02")]);

    let mut arc = FatArchive::assemble(
        SegStream::new(Cursor::new(Vec::new())).unwrap(),
        FolderTestDriver,
        FatOptions {
            first_file_offset: 0,
            max_name_len: 0,
        },
        Vec::new(),
    );

    let readme = arc.insert(None, NewFile::new("README.TXT", 6)).unwrap();
    let h = arc.open(readme, false).unwrap();
    arc.write_handle_all(h, b"readme").unwrap();
    arc.close(h).unwrap();

    let folder = arc
        .insert(
            None,
            NewFile::new("DATA", nested.len() as u64).attrs(Attributes::FOLDER),
        )
        .unwrap();
    let h = arc.open(folder, false).unwrap();
    arc.write_handle_all(h, &nested).unwrap();
    arc.close(h).unwrap();

    let last = arc.insert(None, NewFile::new("LAST.DAT", 4)).unwrap();
    let h = arc.open(last, false).unwrap();
    arc.write_handle_all(h, b"tail").unwrap();
    arc.close(h).unwrap();

    arc
}

fn read_located(root: &mut dyn Archive, loc: Located) -> Vec<u8> {
    match loc {
        Located::Root(id) => root.read_to_vec(id, false).unwrap(),
        Located::Nested { mut archive, entry } => archive.read_to_vec(entry, false).unwrap(),
    }
}

#[test]
fn test_resolve_plain_name() {
    let mut arc = sample_tree();
    let loc = resolve(&mut arc, "readme.txt").unwrap();
    assert!(matches!(loc, Located::Root(_)));
    assert_eq!(read_located(&mut arc, loc), b"readme");
}

#[test]
fn test_resolve_missing_name() {
    let mut arc = sample_tree();
    match resolve(&mut arc, "nothere.txt") {
        Err(Error::FileNotFound { name }) => assert_eq!(name, "nothere.txt"),
        other => panic!("expected FileNotFound, got {:?}", other.is_ok()),
    }
}

#[test]
fn test_resolve_by_index() {
    let mut arc = sample_tree();
    let loc = resolve(&mut arc, "@0").unwrap();
    assert_eq!(read_located(&mut arc, loc), b"readme");

    let loc = resolve(&mut arc, "@2").unwrap();
    assert_eq!(read_located(&mut arc, loc), b"tail");
}

#[test]
fn test_resolve_index_too_large() {
    let mut arc = sample_tree();
    assert!(matches!(
        resolve(&mut arc, "@9"),
        Err(Error::FileNotFound { .. })
    ));
}

#[test]
fn test_resolve_index_with_junk_falls_back_to_name() {
    let mut arc = sample_tree();
    // "@2x" is not a valid index, and no file has that name either.
    assert!(matches!(
        resolve(&mut arc, "@2x"),
        Err(Error::FileNotFound { .. })
    ));
}

#[test]
fn test_resolve_dotted_index_descends_folders() {
    let mut arc = sample_tree();
    // Entry 1 is the DATA folder; 1.1 is its second file.
    let loc = resolve(&mut arc, "@1.1").unwrap();
    assert!(matches!(loc, Located::Nested { .. }));
    assert_eq!(read_located(&mut arc, loc), b"\x01\x02");
}

#[test]
fn test_resolve_path_through_folder() {
    let mut arc = sample_tree();
    let loc = resolve(&mut arc, "DATA/hello.txt").unwrap();
    assert!(matches!(loc, Located::Nested { .. }));
    assert_eq!(read_located(&mut arc, loc), b"hi there");
}

#[test]
fn test_resolve_folder_as_final_component_fails() {
    let mut arc = sample_tree();
    assert!(matches!(
        resolve(&mut arc, "DATA"),
        Err(Error::IsAFolder { .. })
    ));
    assert!(matches!(
        resolve(&mut arc, "@1"),
        Err(Error::IsAFolder { .. })
    ));
}

#[test]
fn test_resolve_file_used_as_folder_fails() {
    let mut arc = sample_tree();
    assert!(matches!(
        resolve(&mut arc, "README.TXT/inner"),
        Err(Error::FileNotFound { .. })
    ));
}

#[test]
fn test_open_folder_requires_folder_attribute() {
    let mut arc = sample_tree();
    let readme = arc.find("README.TXT").unwrap();
    assert!(matches!(arc.open_folder(readme), Err(Error::NotAFolder)));
}

#[test]
fn test_default_open_folder_fails() {
    // Formats without subfolder support refuse even for FOLDER-flagged
    // entries, via the default driver hook.
    let mut arc = grp_duke3d::create(Cursor::new(Vec::new())).unwrap();
    let id = arc.insert(None, NewFile::new("SUB", 4)).unwrap();
    assert!(matches!(arc.open_folder(id), Err(Error::NotAFolder)));
}
