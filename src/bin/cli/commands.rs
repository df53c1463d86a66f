//! Command implementations for the CLI tool.
//!
//! Per-file operations print one line each, with a `[failed; <reason>]`
//! suffix on failure; the returned exit code is the most severe category
//! touched across the batch.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use retropak::{
    Archive, Error, FormatRegistry, Located, NewFile, SuppData, resolve,
};

use crate::exit_codes::{self, merge};

/// Opens the archive file and wraps it in the right format driver.
///
/// On failure, prints a message and returns the process exit code.
pub fn open_archive(
    path: &Path,
    format_code: Option<&str>,
) -> Result<Box<dyn Archive>, i32> {
    let registry = FormatRegistry::builtin();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut file = match OpenOptions::new().read(true).write(true).open(path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("error opening {}: {}", path.display(), e);
            return Err(exit_codes::SHOWSTOPPER);
        }
    };

    let format = match format_code {
        Some(code) => match registry.by_code(code) {
            Some(f) => f,
            None => {
                eprintln!("unknown format code: {}", code);
                return Err(exit_codes::BAD_ARGS);
            }
        },
        None => {
            let dir = path.parent().map(PathBuf::from).unwrap_or_default();
            let exists = move |name: &str| dir.join(name).exists();
            match registry.autodetect(&mut file, &file_name, &exists) {
                Ok(Some(f)) => f,
                Ok(None) => {
                    eprintln!(
                        "unable to automatically determine the file type, use --format"
                    );
                    return Err(exit_codes::BE_MORE_SPECIFIC);
                }
                Err(e) => {
                    eprintln!("error probing {}: {}", path.display(), e);
                    return Err(exit_codes::SHOWSTOPPER);
                }
            }
        }
    };

    // Open any supplementary files next to the archive.
    let mut supps = SuppData::new();
    let supp_names = match format.required_supps(&mut file, &file_name) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error reading {}: {}", path.display(), e);
            return Err(exit_codes::SHOWSTOPPER);
        }
    };
    let dir = path.parent().unwrap_or_else(|| Path::new(""));
    for (item, name) in supp_names {
        let supp_path = dir.join(&name);
        let supp = match OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&supp_path)
        {
            Ok(f) => f,
            Err(e) => {
                eprintln!("error opening supplementary file {}: {}", supp_path.display(), e);
                return Err(exit_codes::SHOWSTOPPER);
            }
        };
        supps.insert(item, Box::new(supp));
    }

    match format.open(Box::new(file), supps) {
        Ok(archive) => Ok(archive),
        Err(e) => {
            eprintln!("error opening {} as {}: {}", path.display(), format.code(), e);
            Err(exit_codes::SHOWSTOPPER)
        }
    }
}

/// Lists the archive contents.
pub fn list(archive: &dyn Archive) -> i32 {
    for (i, entry) in archive.files().iter().enumerate() {
        let name = if entry.name.is_empty() {
            format!("@{}", i)
        } else {
            entry.name.clone()
        };
        let filter = if entry.filter.is_empty() {
            String::new()
        } else {
            format!(" [{}]", entry.filter)
        };
        println!("{:>4}  {:<16} {:>10}{}", i, name, entry.stored_size, filter);
    }
    exit_codes::SUCCESS
}

/// Extracts the named files (all files when none are named).
pub fn extract(archive: &mut dyn Archive, specs: &[String], raw: bool) -> i32 {
    let mut code = exit_codes::SUCCESS;

    let specs: Vec<String> = if specs.is_empty() {
        archive
            .files()
            .iter()
            .enumerate()
            .map(|(i, e)| {
                if e.name.is_empty() {
                    format!("@{}", i)
                } else {
                    e.name.clone()
                }
            })
            .collect()
    } else {
        specs.to_vec()
    };

    for spec in &specs {
        print!(" extracting: {}", spec);
        match extract_one(archive, spec, raw) {
            Ok(()) => println!(),
            Err((reason, c)) => {
                println!(" [failed; {}]", reason);
                code = merge(code, c);
            }
        }
    }
    code
}

fn extract_one(
    archive: &mut dyn Archive,
    spec: &str,
    raw: bool,
) -> Result<(), (String, i32)> {
    let not_found = |e: Error| match e {
        Error::FileNotFound { .. } => (e.to_string(), exit_codes::NONCRITICAL_FAILURE),
        other => (other.to_string(), exit_codes::UNCOMMON_FAILURE),
    };
    let data = match resolve(archive, spec).map_err(not_found)? {
        Located::Root(id) => archive.read_to_vec(id, !raw),
        Located::Nested { mut archive, entry } => archive.read_to_vec(entry, !raw),
    }
    .map_err(|e| (e.to_string(), exit_codes::UNCOMMON_FAILURE))?;

    // Index specs make poor local filenames.
    let local = spec.replace(['@', '/'], "_");
    let mut out = File::create(&local)
        .map_err(|e| (e.to_string(), exit_codes::UNCOMMON_FAILURE))?;
    out.write_all(&data)
        .map_err(|e| (e.to_string(), exit_codes::UNCOMMON_FAILURE))?;
    Ok(())
}

/// Inserts local files at the end of the archive.
pub fn insert(archive: &mut dyn Archive, files: &[PathBuf]) -> i32 {
    let mut code = exit_codes::SUCCESS;
    for path in files {
        print!("   adding: {}", path.display());
        match insert_one(archive, path) {
            Ok(()) => println!(),
            Err(reason) => {
                println!(" [failed; {}]", reason);
                code = merge(code, exit_codes::UNCOMMON_FAILURE);
            }
        }
    }
    code
}

fn insert_one(archive: &mut dyn Archive, path: &Path) -> Result<(), String> {
    let data = std::fs::read(path).map_err(|e| e.to_string())?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| "bad filename".to_string())?;

    let id = archive
        .insert(None, NewFile::new(name, data.len() as u64))
        .map_err(|e| e.to_string())?;
    let h = archive.open(id, true).map_err(|e| e.to_string())?;
    let result = archive.write_handle_all(h, &data).map_err(|e| e.to_string());
    archive.close(h).map_err(|e| e.to_string())?;
    result
}

/// Deletes the named files.
pub fn delete(archive: &mut dyn Archive, specs: &[String]) -> i32 {
    let mut code = exit_codes::SUCCESS;
    for spec in specs {
        print!("  deleting: {}", spec);
        let outcome = match resolve(archive, spec) {
            Ok(Located::Root(id)) => archive
                .remove(id)
                .map_err(|e| (e.to_string(), exit_codes::UNCOMMON_FAILURE)),
            Ok(Located::Nested { .. }) => Err((
                "cannot modify files inside a subfolder".to_string(),
                exit_codes::UNCOMMON_FAILURE,
            )),
            Err(e @ Error::FileNotFound { .. }) => {
                Err((e.to_string(), exit_codes::NONCRITICAL_FAILURE))
            }
            Err(e) => Err((e.to_string(), exit_codes::UNCOMMON_FAILURE)),
        };
        match outcome {
            Ok(()) => println!(),
            Err((reason, c)) => {
                println!(" [failed; {}]", reason);
                code = merge(code, c);
            }
        }
    }
    code
}

/// Renames one file.
pub fn rename(archive: &mut dyn Archive, from: &str, to: &str) -> i32 {
    print!("  renaming: {} -> {}", from, to);
    let outcome = match archive.find(from) {
        Some(id) => archive.rename(id, to).map_err(|e| {
            (e.to_string(), exit_codes::UNCOMMON_FAILURE)
        }),
        None => Err((
            Error::FileNotFound { name: from.into() }.to_string(),
            exit_codes::NONCRITICAL_FAILURE,
        )),
    };
    match outcome {
        Ok(()) => {
            println!();
            exit_codes::SUCCESS
        }
        Err((reason, code)) => {
            println!(" [failed; {}]", reason);
            code
        }
    }
}

/// Commits pending changes; a failure here is a showstopper.
pub fn commit(archive: &mut dyn Archive) -> i32 {
    match archive.flush() {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => {
            eprintln!("error writing archive: {}", e);
            exit_codes::SHOWSTOPPER
        }
    }
}
