//! Resolving name and index specs against (possibly nested) archives.
//!
//! User-facing tools address members three ways:
//!
//! - `"music.mid"` — a plain name, matched case-insensitively;
//! - `"@4"` — a position in the entry list, so files are reachable even
//!   when their stored name is empty or duplicated (dotted forms like
//!   `"@2.5"` descend into folders component-wise);
//! - `"sub/dir/file"` — a path walked through folder entries.
//!
//! Index addressing is tried first, so a file that happens to be *named*
//! `@5` can still be reached by quoting it differently — junk after the
//! digits makes the spec fall back to name lookup.

use crate::archive::Archive;
use crate::entry::EntryId;
use crate::error::{Error, Result};

/// Where a spec landed: in the root archive itself, or in a nested folder
/// archive (returned along with the entry so the caller can operate on
/// it).
pub enum Located {
    /// The entry lives in the archive the spec was resolved against.
    Root(EntryId),
    /// The entry lives in a nested folder archive.
    Nested {
        /// The folder archive holding the entry.
        archive: Box<dyn Archive>,
        /// The entry within that archive.
        entry: EntryId,
    },
}

/// Resolves a name, path or `@index` spec to an entry.
///
/// Fails with [`Error::FileNotFound`] when nothing matches and
/// [`Error::IsAFolder`] when the spec addresses a folder where a file was
/// required.
pub fn resolve(root: &mut dyn Archive, spec: &str) -> Result<Located> {
    // Index specs are checked first so extraction by number always works,
    // whatever the stored names look like.
    if let Some(digits) = spec.strip_prefix('@') {
        if !digits.is_empty() {
            let indices: Option<Vec<usize>> = digits
                .split('.')
                .map(|part| part.parse::<usize>().ok())
                .collect();
            if let Some(indices) = indices {
                return resolve_indices(root, spec, &indices);
            }
            // Junk after the digits: fall through to name lookup.
        }
    }

    // A whole-name match beats path splitting, so names containing
    // slashes still resolve.
    if let Some(id) = root.find(spec) {
        if root.entry(id)?.is_folder() {
            return Err(Error::IsAFolder { path: spec.into() });
        }
        return Ok(Located::Root(id));
    }

    walk_path(root, spec)
}

fn resolve_indices(root: &mut dyn Archive, spec: &str, indices: &[usize]) -> Result<Located> {
    let mut owned: Option<Box<dyn Archive>> = None;
    for (depth, &n) in indices.iter().enumerate() {
        let cur: &mut dyn Archive = match owned.as_deref_mut() {
            Some(a) => a,
            None => &mut *root,
        };
        let files = cur.files();
        if n >= files.len() {
            return Err(Error::FileNotFound { name: spec.into() });
        }
        let id = files[n].id;

        if depth == indices.len() - 1 {
            if cur.entry(id)?.is_folder() {
                return Err(Error::IsAFolder { path: spec.into() });
            }
            return Ok(match owned {
                Some(archive) => Located::Nested { archive, entry: id },
                None => Located::Root(id),
            });
        }
        owned = Some(cur.open_folder(id)?);
    }
    unreachable!("resolve_indices called with no indices")
}

fn walk_path(root: &mut dyn Archive, spec: &str) -> Result<Located> {
    let mut owned: Option<Box<dyn Archive>> = None;
    let mut parts = spec.split('/').peekable();
    loop {
        let Some(component) = parts.next() else {
            return Err(Error::FileNotFound { name: spec.into() });
        };
        let last = parts.peek().is_none();
        let cur: &mut dyn Archive = match owned.as_deref_mut() {
            Some(a) => a,
            None => &mut *root,
        };
        let Some(id) = cur.find(component) else {
            return Err(Error::FileNotFound { name: spec.into() });
        };

        if last {
            if cur.entry(id)?.is_folder() {
                return Err(Error::IsAFolder { path: spec.into() });
            }
            return Ok(match owned {
                Some(archive) => Located::Nested { archive, entry: id },
                None => Located::Root(id),
            });
        }

        // A mid-path component has to be a folder; a file specified like
        // a folder is a dead end.
        if !cur.entry(id)?.is_folder() {
            return Err(Error::FileNotFound { name: spec.into() });
        }
        owned = Some(cur.open_folder(id)?);
    }
}
