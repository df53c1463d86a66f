//! Format driver contract, probing and the format registry.
//!
//! Each supported archive variant is represented by an [`ArchiveFormat`]
//! implementation: a small object that can identify its wire format in a
//! byte stream ([`probe`](ArchiveFormat::probe)), open or create archives
//! in it, and declare any supplementary files it needs (an external
//! directory kept next to the archive, a host executable, and so on).
//!
//! The [`FormatRegistry`] is a plain value the caller constructs — there is
//! no global registry. [`FormatRegistry::builtin`] returns one preloaded
//! with every format this crate ships.

use std::collections::HashMap;

use crate::archive::Archive;
use crate::error::Result;
use crate::stream::DynStream;

/// Confidence level when guessing a file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Certainty {
    /// Definitely not in this format.
    DefinitelyNo,
    /// The checks were inconclusive; it could go either way.
    Unsure,
    /// Everything checked out OK, but there's no signature.
    PossiblyYes,
    /// This format has a signature and it matched.
    DefinitelyYes,
}

/// Role of a supplementary file a format needs besides the primary stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SuppItem {
    /// An external directory kept in a separate file.
    Fat,
    /// A host executable from which offsets or data are pulled.
    HostExecutable,
}

/// Opened supplementary streams, keyed by role.
pub type SuppData = HashMap<SuppItem, DynStream>;

/// Filenames of required supplementary files, keyed by role.
pub type SuppFilenames = HashMap<SuppItem, String>;

/// Interface to a particular archive format.
pub trait ArchiveFormat {
    /// Short code identifying the format, e.g. `"grp-duke3d"`. Useful for
    /// command-line arguments.
    fn code(&self) -> &'static str;

    /// Human-readable format name, e.g. `"Duke Nukem 3D Group File"`.
    fn name(&self) -> &'static str;

    /// Known file extensions for this format.
    fn extensions(&self) -> &'static [&'static str];

    /// Games known to use this format.
    fn games(&self) -> &'static [&'static str];

    /// Checks whether a stream is in this format.
    ///
    /// Must not read past the format's declared structure, and must not
    /// claim [`Certainty::DefinitelyYes`] for an empty stream unless the
    /// format's empty archive is legitimately zero-length.
    fn probe(&self, content: &mut dyn crate::stream::Stream) -> Result<Certainty>;

    /// Writes out the signatures and headers for a blank archive and opens
    /// it.
    fn create(&self, content: DynStream, supps: SuppData) -> Result<Box<dyn Archive>>;

    /// Opens an existing archive.
    ///
    /// The stream should have probed better than
    /// [`Certainty::DefinitelyNo`], but open tries its best anyway so a
    /// caller can force a format handler onto a stream.
    fn open(&self, content: DynStream, supps: SuppData) -> Result<Box<dyn Archive>>;

    /// Names any supplementary files this format needs, derived from the
    /// primary archive's filename. The caller opens them and passes the
    /// streams to [`open`](Self::open)/[`create`](Self::create).
    fn required_supps(
        &self,
        content: &mut dyn crate::stream::Stream,
        primary_name: &str,
    ) -> Result<SuppFilenames> {
        let _ = (content, primary_name);
        Ok(SuppFilenames::new())
    }
}

/// A caller-constructed collection of format drivers.
pub struct FormatRegistry {
    formats: Vec<Box<dyn ArchiveFormat>>,
}

impl FormatRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            formats: Vec::new(),
        }
    }

    /// Creates a registry preloaded with every built-in format.
    pub fn builtin() -> Self {
        let mut reg = Self::new();
        reg.register(Box::new(crate::formats::grp_duke3d::GrpDuke3dFormat));
        reg.register(Box::new(crate::formats::vol_cosmo::VolCosmoFormat));
        reg.register(Box::new(crate::formats::wad_doom::WadDoomFormat));
        reg.register(Box::new(crate::formats::pod_tv::PodTvFormat));
        reg.register(Box::new(crate::formats::bnk_harry::BnkHarryFormat));
        reg.register(Box::new(crate::formats::rff_blood::RffBloodFormat));
        reg.register(Box::new(crate::formats::exe_ccaves::ExeCcavesFormat));
        reg
    }

    /// Adds a format driver.
    pub fn register(&mut self, format: Box<dyn ArchiveFormat>) {
        self.formats.push(format);
    }

    /// Looks up a driver by its short code.
    pub fn by_code(&self, code: &str) -> Option<&dyn ArchiveFormat> {
        self.formats
            .iter()
            .find(|f| f.code() == code)
            .map(|f| f.as_ref())
    }

    /// Iterates over the registered drivers.
    pub fn iter(&self) -> impl Iterator<Item = &dyn ArchiveFormat> {
        self.formats.iter().map(|f| f.as_ref())
    }

    /// Probes every driver against the stream and picks the strongest
    /// match.
    ///
    /// A [`Certainty::DefinitelyYes`] ends the search immediately. Several
    /// [`Certainty::PossiblyYes`] candidates are resolved by checking which
    /// one's supplementary files are actually present, via `supp_exists`
    /// (typically a filesystem existence check on the named file).
    pub fn autodetect(
        &self,
        content: &mut dyn crate::stream::Stream,
        primary_name: &str,
        supp_exists: &dyn Fn(&str) -> bool,
    ) -> Result<Option<&dyn ArchiveFormat>> {
        let mut possible: Vec<&dyn ArchiveFormat> = Vec::new();
        for format in self.iter() {
            match format.probe(content)? {
                Certainty::DefinitelyYes => return Ok(Some(format)),
                Certainty::PossiblyYes => possible.push(format),
                Certainty::Unsure | Certainty::DefinitelyNo => {}
            }
        }
        match possible.len() {
            0 => Ok(None),
            1 => Ok(Some(possible[0])),
            _ => {
                // Tie-break on whose supplementary files exist on disk.
                for format in &possible {
                    let supps = format.required_supps(content, primary_name)?;
                    if !supps.is_empty() && supps.values().all(|name| supp_exists(name)) {
                        return Ok(Some(*format));
                    }
                }
                Ok(Some(possible[0]))
            }
        }
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
