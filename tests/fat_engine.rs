//! Integration tests for the FAT archive engine, run against the GRP
//! driver (the simplest format with an on-disk directory) and a couple of
//! purpose-built test drivers for filter behaviour.

mod common;

use std::io::Cursor;

use common::{committed, grp_with, raw_grp};
use retropak::fat::{FatArchive, FatDriver, FatOptions, FatState};
use retropak::formats::grp_duke3d;
use retropak::stream::SegStream;
use retropak::{Archive, Entry, EntryId, Error, NewFile, Stream};

// ============================================================================
// Concrete byte-level scenarios
// ============================================================================

#[test]
fn test_open_empty() {
    // A 16-byte archive with just the signature yields zero entries.
    let raw = b"KenSilverman\0\0\0\0".to_vec();
    let arc = grp_duke3d::open(Cursor::new(raw)).unwrap();
    assert!(arc.files().is_empty());
}

#[test]
fn test_insert_into_empty() {
    let mut arc = grp_with(&[("A", b"\x01\x02\x03\x04")]);
    let bytes = committed(&mut arc);

    // Signature, one FAT entry, then the 4 data bytes: 36 bytes total.
    assert_eq!(bytes.len(), 36);
    assert_eq!(&bytes[..12], b"KenSilverman");
    assert_eq!(u32::from_le_bytes(bytes[12..16].try_into().unwrap()), 1);
    assert_eq!(&bytes[16..17], b"A");
    assert_eq!(u32::from_le_bytes(bytes[28..32].try_into().unwrap()), 4);
    assert_eq!(&bytes[32..], b"\x01\x02\x03\x04");

    let id = arc.find("A").unwrap();
    let e = arc.entry(id).unwrap();
    assert_eq!(e.offset, 32);
    assert_eq!(e.stored_size, 4);
    let h = arc.open(id, false).unwrap();
    assert_eq!(arc.handle_len(h).unwrap(), 4);
    arc.close(h).unwrap();
}

#[test]
fn test_insert_mid_archive() {
    let mut arc = grp_with(&[("X", &[0xAA; 8]), ("Y", &[0xBB; 8])]);

    let y_before = {
        let id = arc.find("Y").unwrap();
        arc.entry(id).unwrap().offset
    };

    let before = arc.find("Y");
    let id = arc.insert(before, NewFile::new("M", 4)).unwrap();
    let h = arc.open(id, false).unwrap();
    arc.write_handle_all(h, &[0xCC; 4]).unwrap();
    arc.close(h).unwrap();

    // Directory order is X, M, Y.
    let names: Vec<&str> = arc.files().iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["X", "M", "Y"]);

    // Y shifted by the new FAT record plus the new data bytes.
    let y_after = {
        let id = arc.find("Y").unwrap();
        arc.entry(id).unwrap().offset
    };
    assert_eq!(y_after, y_before + 16 + 4);

    // The committed bytes equal an archive built that way from scratch.
    let bytes = committed(&mut arc);
    assert_eq!(
        bytes,
        raw_grp(&[("X", &[0xAA; 8]), ("M", &[0xCC; 4]), ("Y", &[0xBB; 8])])
    );
}

#[test]
fn test_remove_restores_previous_bytes() {
    let mut arc = grp_with(&[("X", &[0xAA; 8]), ("Y", &[0xBB; 8])]);
    let original = committed(&mut arc);

    let before = arc.find("Y");
    let id = arc.insert(before, NewFile::new("M", 4)).unwrap();
    arc.remove(id).unwrap();

    assert_eq!(committed(&mut arc), original);
}

#[test]
fn test_resize_larger() {
    let mut arc = grp_with(&[("X", &[0xAA; 8]), ("Y", &[0xBB; 8])]);

    let x = arc.find("X").unwrap();
    let y = arc.find("Y").unwrap();
    let y_before = arc.entry(y).unwrap().offset;

    arc.resize(x, 12, 12).unwrap();

    let xe = arc.entry(x).unwrap();
    assert_eq!(xe.stored_size, 12);
    assert_eq!(arc.entry(y).unwrap().offset, y_before + 4);

    // First 8 bytes preserved, the new 4 read back as zero.
    let data = arc.read_to_vec(x, false).unwrap();
    assert_eq!(&data[..8], &[0xAA; 8]);
    assert_eq!(&data[8..], &[0u8; 4]);

    // Data written into the expanded region round-trips.
    let h = arc.open(x, false).unwrap();
    assert_eq!(arc.handle_len(h).unwrap(), 12);
    arc.seek_handle(h, 8).unwrap();
    arc.write_handle_all(h, b"TAIL").unwrap();
    arc.close(h).unwrap();
    let data = arc.read_to_vec(x, false).unwrap();
    assert_eq!(&data[8..], b"TAIL");

    // Y's content is untouched.
    assert_eq!(arc.read_to_vec(y, false).unwrap(), vec![0xBB; 8]);
}

#[test]
fn test_resize_smaller() {
    let mut arc = grp_with(&[("X", b"ABCDEFGH"), ("Y", &[0xBB; 8])]);
    let x = arc.find("X").unwrap();
    let y = arc.find("Y").unwrap();

    arc.resize(x, 3, 3).unwrap();
    assert_eq!(arc.read_to_vec(x, false).unwrap(), b"ABC");
    assert_eq!(arc.read_to_vec(y, false).unwrap(), vec![0xBB; 8]);

    let bytes = committed(&mut arc);
    assert_eq!(bytes, raw_grp(&[("X", b"ABC"), ("Y", &[0xBB; 8])]));
}

// ============================================================================
// Universal edit properties
// ============================================================================

#[test]
fn test_remove_then_insert_same_position_roundtrips() {
    let mut arc = grp_with(&[("X", b"xxxxxxxx"), ("M", b"mmmm"), ("Y", b"yyyyyyyy")]);
    let original = committed(&mut arc);

    let m = arc.find("M").unwrap();
    arc.remove(m).unwrap();

    let y = arc.find("Y");
    let id = arc.insert(y, NewFile::new("M", 4)).unwrap();
    let h = arc.open(id, false).unwrap();
    arc.write_handle_all(h, b"mmmm").unwrap();
    arc.close(h).unwrap();

    assert_eq!(committed(&mut arc), original);
}

#[test]
fn test_rename_idempotence() {
    let mut arc = grp_with(&[("SONG.MID", b"data"), ("OTHER", b"d2")]);
    let original = committed(&mut arc);

    let id = arc.find("song.mid").unwrap();
    arc.rename(id, "SONG.MID").unwrap();

    assert_eq!(committed(&mut arc), original);
}

#[test]
fn test_rename_too_long_fails() {
    let mut arc = grp_with(&[("A", b"data")]);
    let id = arc.find("A").unwrap();
    let err = arc.rename(id, "THIRTEENCHARS").unwrap_err();
    assert!(matches!(err, Error::NameTooLong { max: 12 }));
    assert_eq!(arc.entry(id).unwrap().name, "A");
}

#[test]
fn test_insert_empty_name_rejected() {
    let mut arc = grp_with(&[]);
    assert!(matches!(
        arc.insert(None, NewFile::new("", 4)),
        Err(Error::InvalidName(_))
    ));
    assert!(arc.files().is_empty());
}

#[test]
fn test_handle_survival_across_edits() {
    let mut arc = grp_with(&[
        ("A", b"aaaaaaaa"),
        ("E", b"EDITEDFILE"),
        ("Z", b"zzzzzzzz"),
    ]);

    let e = arc.find("E").unwrap();
    let h = arc.open(e, false).unwrap();

    // Mutate everything around E: grow A, insert before A, remove Z.
    let a = arc.find("A").unwrap();
    arc.resize(a, 12, 12).unwrap();
    let id = arc.insert(Some(a), NewFile::new("NEW", 6)).unwrap();
    let hw = arc.open(id, false).unwrap();
    arc.write_handle_all(hw, b"newnew").unwrap();
    arc.close(hw).unwrap();
    let z = arc.find("Z").unwrap();
    arc.remove(z).unwrap();

    // The open handle still reads E's bytes at every offset.
    for k in 0..b"EDITEDFILE".len() {
        arc.seek_handle(h, k as u64).unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(arc.read_handle(h, &mut buf).unwrap(), 1);
        assert_eq!(buf[0], b"EDITEDFILE"[k], "mismatch at offset {}", k);
    }
    arc.close(h).unwrap();
}

#[test]
fn test_open_file_pins_entry() {
    let mut arc = grp_with(&[("A", b"aaaa"), ("B", b"bbbb")]);
    let a = arc.find("A").unwrap();

    let h = arc.open(a, false).unwrap();
    assert!(matches!(arc.remove(a), Err(Error::FileInUse)));

    arc.close(h).unwrap();
    arc.remove(a).unwrap();
    assert!(arc.find("A").is_none());
}

#[test]
fn test_removed_entry_id_observes_invalidity() {
    let mut arc = grp_with(&[("A", b"aaaa")]);
    let a = arc.find("A").unwrap();
    arc.remove(a).unwrap();

    assert!(matches!(arc.open(a, false), Err(Error::FileRemoved)));
    assert!(matches!(arc.resize(a, 2, 2), Err(Error::FileRemoved)));
    assert!(matches!(arc.entry(a), Err(Error::FileRemoved)));
}

#[test]
fn test_directory_order_matches_disk_order_after_flush() {
    let mut arc = grp_with(&[("ONE", b"1"), ("TWO", b"22"), ("THREE", b"333")]);
    let m = arc.find("THREE").unwrap();
    arc.move_entry(arc.find("ONE"), m).unwrap();

    let in_memory: Vec<String> = arc.files().iter().map(|e| e.name.clone()).collect();
    let bytes = committed(&mut arc);

    let reopened = grp_duke3d::open(Cursor::new(bytes)).unwrap();
    let on_disk: Vec<String> = reopened.files().iter().map(|e| e.name.clone()).collect();
    assert_eq!(in_memory, on_disk);
    assert_eq!(on_disk, ["THREE", "ONE", "TWO"]);
}

#[test]
fn test_move_preserves_content() {
    let mut arc = grp_with(&[("A", b"aaaa"), ("B", b"bbbbbb"), ("C", b"cc")]);
    let c = arc.find("C").unwrap();
    arc.move_entry(arc.find("A"), c).unwrap();

    let bytes = committed(&mut arc);
    assert_eq!(
        bytes,
        raw_grp(&[("C", b"cc"), ("A", b"aaaa"), ("B", b"bbbbbb")])
    );
}

#[test]
fn test_find_is_case_insensitive_and_duplicates_allowed() {
    let mut arc = grp_with(&[("SEB3.MOD", b"one"), ("seb3.mod", b"two")]);
    // Any of the duplicates may come back; it must be one of them.
    let id = arc.find("Seb3.Mod").unwrap();
    let name = arc.entry(id).unwrap().name.clone();
    assert!(name.eq_ignore_ascii_case("seb3.mod"));
    // Callers wanting a specific duplicate walk the list directly.
    let dupes = arc
        .files()
        .iter()
        .filter(|e| e.name.eq_ignore_ascii_case("seb3.mod"))
        .count();
    assert_eq!(dupes, 2);
}

// ============================================================================
// Filter behaviour driven through the engine
// ============================================================================

/// A minimal directoryless format whose files are all stored through the
/// incremental-XOR filter. Stands in for the formats that flag members as
/// encrypted.
struct XorTestDriver;

impl<S: Stream> FatDriver<S> for XorTestDriver {
    fn update_file_name(
        &mut self,
        _state: &mut FatState<S>,
        _id: EntryId,
        _new_name: &str,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn make_new_entry(&self) -> Entry {
        let mut e = Entry::default();
        e.filter = "xor-inc".to_string();
        e
    }
}

fn xor_archive() -> FatArchive<Cursor<Vec<u8>>, XorTestDriver> {
    FatArchive::assemble(
        SegStream::new(Cursor::new(Vec::new())).unwrap(),
        XorTestDriver,
        FatOptions {
            first_file_offset: 0,
            max_name_len: 0,
        },
        Vec::new(),
    )
}

#[test]
fn test_filtered_insert_stores_xored_bytes() {
    let mut arc = xor_archive();
    let cleartext = b"SECRET";

    let id = arc.insert(None, NewFile::new("A", 6)).unwrap();
    let h = arc.open(id, true).unwrap();
    arc.seek_handle(h, 0).unwrap();
    arc.write_handle_all(h, cleartext).unwrap();
    arc.truncate_handle(h, 6).unwrap();
    arc.close(h).unwrap();

    let e = arc.entry(id).unwrap();
    assert_eq!(e.real_size, 6);
    assert_eq!(e.stored_size, 6);

    // Stored bytes are the cleartext XOR'd with 0,1,2,3,4,5.
    let stored = arc.read_to_vec(id, false).unwrap();
    let expected: Vec<u8> = cleartext
        .iter()
        .enumerate()
        .map(|(i, b)| b ^ i as u8)
        .collect();
    assert_eq!(stored, expected);

    // And the filtered view round-trips.
    assert_eq!(arc.read_to_vec(id, true).unwrap(), cleartext);
}

#[test]
fn test_filtered_write_changing_length_updates_sizes() {
    let mut arc = xor_archive();
    let id = arc.insert(None, NewFile::new("A", 4)).unwrap();

    let h = arc.open(id, true).unwrap();
    arc.truncate_handle(h, 0).unwrap();
    arc.write_handle_all(h, b"much longer than four").unwrap();
    arc.close(h).unwrap();

    let e = arc.entry(id).unwrap();
    assert_eq!(e.real_size, 21);
    assert_eq!(e.stored_size, 21);
    assert_eq!(arc.read_to_vec(id, true).unwrap(), b"much longer than four");
}

#[test]
fn test_open_with_unknown_filter_fails_cleanly() {
    struct BogusFilterDriver;
    impl<S: Stream> FatDriver<S> for BogusFilterDriver {
        fn update_file_name(
            &mut self,
            _state: &mut FatState<S>,
            _id: EntryId,
            _new_name: &str,
        ) -> Result<(), Error> {
            Ok(())
        }
        fn make_new_entry(&self) -> Entry {
            let mut e = Entry::default();
            e.filter = "lzw-nonesuch".to_string();
            e
        }
    }

    let mut arc = FatArchive::assemble(
        SegStream::new(Cursor::new(Vec::new())).unwrap(),
        BogusFilterDriver,
        FatOptions {
            first_file_offset: 0,
            max_name_len: 0,
        },
        Vec::new(),
    );
    let id = arc.insert(None, NewFile::new("A", 4)).unwrap();

    match arc.open(id, true) {
        Err(Error::FilterMissing { code }) => assert_eq!(code, "lzw-nonesuch"),
        other => panic!("expected FilterMissing, got {:?}", other.map(|_| ())),
    }
    // Bypassing the filter still works.
    let h = arc.open(id, false).unwrap();
    arc.close(h).unwrap();
}

/// A driver where the filter depends on the *position*: the first file is
/// always stored encrypted. Moving an unfiltered file to the front must
/// fail rather than silently convert it.
struct PositionalFilterDriver;

impl<S: Stream> FatDriver<S> for PositionalFilterDriver {
    fn update_file_name(
        &mut self,
        _state: &mut FatState<S>,
        _id: EntryId,
        _new_name: &str,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn pre_insert(
        &mut self,
        _state: &mut FatState<S>,
        _before: Option<EntryId>,
        new_entry: &mut Entry,
    ) -> Result<(), Error> {
        if new_entry.index == 0 {
            new_entry.filter = "xor-inc".to_string();
        }
        Ok(())
    }
}

#[test]
fn test_move_across_filter_boundary_fails() {
    let mut arc = FatArchive::assemble(
        SegStream::new(Cursor::new(Vec::new())).unwrap(),
        PositionalFilterDriver,
        FatOptions {
            first_file_offset: 0,
            max_name_len: 0,
        },
        Vec::new(),
    );

    let first = arc.insert(None, NewFile::new("FRONT", 4)).unwrap();
    let second = arc.insert(None, NewFile::new("PLAIN", 4)).unwrap();
    assert_eq!(arc.entry(first).unwrap().filter, "xor-inc");
    assert!(arc.entry(second).unwrap().filter.is_empty());

    let err = arc.move_entry(Some(first), second).unwrap_err();
    assert!(matches!(err, Error::FilterMismatch));

    // The failed move left both files in place.
    assert_eq!(arc.files().len(), 2);
    assert!(arc.entry(second).is_ok());
}
