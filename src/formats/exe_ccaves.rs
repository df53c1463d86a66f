//! Crystal Caves level data embedded in the game executable.
//!
//! Not a real archive: the episode-one level maps live at fixed offsets
//! inside `cc1.exe`, so this driver presents them through the fixed
//! archive engine. Levels can be edited in place but never resized,
//! renamed or rearranged.

use std::io::{Read, Seek, SeekFrom};

use crate::archive::Archive;
use crate::error::{Error, Result};
use crate::fixed::{FixedArchive, FixedFile};
use crate::format::{ArchiveFormat, Certainty, SuppData};
use crate::stream::{DynStream, Stream};

/// Exact length of the supported executable.
const CCAVES_EXE_LEN: u64 = 191_984;

/// Offset of code bytes checked by the probe (no version string exists).
const CCAVES_CHECK_OFFSET: u64 = 0x1E00;
const CCAVES_CHECK_BYTES: &[u8; 8] = b"\x55\x89\xE5\x8B\x46\x06\xBA\xA0";

/// Offset of the first byte of map data.
const CCAVES_MAPDATA_START: u64 = 0x8CE0;

// Map sizes in bytes (41 columns per row).
const SZ_INT: u64 = 41 * 5;
const SZ_FIN: u64 = 41 * 6;
const SZ_MAP: u64 = 41 * 25;
const SZ_NORMAL: u64 = 41 * 24;
const SZ_SMALL: u64 = 41 * 23;

/// (name, size) of every embedded file, in on-disk order.
const CCAVES_FILES: &[(&str, u64)] = &[
    ("e1int.ccl", SZ_INT),
    ("e1fin.ccl", SZ_FIN),
    ("e1map.ccl", SZ_MAP),
    ("e1l01.ccl", SZ_NORMAL),
    ("e1l02.ccl", SZ_NORMAL),
    ("e1l03.ccl", SZ_NORMAL),
    ("e1l04.ccl", SZ_NORMAL),
    ("e1l05.ccl", SZ_NORMAL),
    ("e1l06.ccl", SZ_NORMAL),
    ("e1l07.ccl", SZ_SMALL),
    ("e1l08.ccl", SZ_SMALL),
    ("e1l09.ccl", SZ_NORMAL),
    ("e1l10.ccl", SZ_NORMAL),
    ("e1l11.ccl", SZ_NORMAL),
    ("e1l12.ccl", SZ_NORMAL),
    ("e1l13.ccl", SZ_NORMAL),
    ("e1l14.ccl", SZ_SMALL),
    ("e1l15.ccl", SZ_NORMAL),
    ("e1l16.ccl", SZ_NORMAL),
];

/// Opens the fixed archive over a Crystal Caves executable.
pub fn open<S: Stream>(stream: S) -> Result<FixedArchive<S>> {
    let mut files = Vec::with_capacity(CCAVES_FILES.len());
    let mut offset = CCAVES_MAPDATA_START;
    for (name, size) in CCAVES_FILES {
        files.push(FixedFile::new(offset, *size, *name));
        offset += size;
    }
    Ok(FixedArchive::new(stream, files))
}

/// Format front-end for the Crystal Caves executable (`exe-ccaves`).
pub struct ExeCcavesFormat;

impl ArchiveFormat for ExeCcavesFormat {
    fn code(&self) -> &'static str {
        "exe-ccaves"
    }

    fn name(&self) -> &'static str {
        "Crystal Caves Executable"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["exe"]
    }

    fn games(&self) -> &'static [&'static str] {
        &["Crystal Caves"]
    }

    fn probe(&self, content: &mut dyn Stream) -> Result<Certainty> {
        if content.len()? != CCAVES_EXE_LEN {
            return Ok(Certainty::DefinitelyNo);
        }
        let mut buf = [0u8; 8];
        content.seek(SeekFrom::Start(CCAVES_CHECK_OFFSET))?;
        content.read_exact(&mut buf)?;
        if &buf == CCAVES_CHECK_BYTES {
            Ok(Certainty::DefinitelyYes)
        } else {
            Ok(Certainty::DefinitelyNo)
        }
    }

    fn create(&self, _content: DynStream, _supps: SuppData) -> Result<Box<dyn Archive>> {
        // Not a true archive, so new ones can't be created.
        Err(Error::ReadOnly)
    }

    fn open(&self, content: DynStream, _supps: SuppData) -> Result<Box<dyn Archive>> {
        Ok(Box::new(open(content)?))
    }
}
