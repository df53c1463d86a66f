//! CLI tool for manipulating retro-game archives.

mod commands;
mod exit_codes;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use exit_codes::merge;

/// Retro-game archive manipulation tool
#[derive(Parser)]
#[command(name = "retropak")]
#[command(author, version, about = "Retro-game archive manipulation tool", long_about = None)]
struct Cli {
    /// Archive format code (e.g. grp-duke3d); autodetected when omitted
    #[arg(long, short = 't', global = true)]
    format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the files inside an archive (alias: l)
    #[command(alias = "l")]
    List {
        /// Archive file
        archive: PathBuf,
    },

    /// Extract files into the current directory (alias: x); all files
    /// when none are named
    #[command(alias = "x")]
    Extract {
        /// Archive file
        archive: PathBuf,
        /// Names, paths or @indices of the files to extract
        files: Vec<String>,
        /// Extract the stored bytes without applying any filter
        #[arg(long)]
        raw: bool,
    },

    /// Add local files to the end of an archive (alias: a)
    #[command(alias = "a")]
    Insert {
        /// Archive file
        archive: PathBuf,
        /// Local files to add
        files: Vec<PathBuf>,
    },

    /// Delete files from an archive (alias: d)
    #[command(alias = "d")]
    Delete {
        /// Archive file
        archive: PathBuf,
        /// Names, paths or @indices of the files to delete
        files: Vec<String>,
    },

    /// Rename a file inside an archive (alias: r)
    #[command(alias = "r")]
    Rename {
        /// Archive file
        archive: PathBuf,
        /// Current name
        from: String,
        /// New name
        to: String,
    },
}

fn main() {
    let cli = Cli::parse();
    std::process::exit(run(cli));
}

fn run(cli: Cli) -> i32 {
    let format = cli.format.as_deref();
    match cli.command {
        Commands::List { archive } => {
            let arc = match commands::open_archive(&archive, format) {
                Ok(a) => a,
                Err(code) => return code,
            };
            commands::list(arc.as_ref())
        }
        Commands::Extract {
            archive,
            files,
            raw,
        } => {
            let mut arc = match commands::open_archive(&archive, format) {
                Ok(a) => a,
                Err(code) => return code,
            };
            commands::extract(arc.as_mut(), &files, raw)
        }
        Commands::Insert { archive, files } => {
            let mut arc = match commands::open_archive(&archive, format) {
                Ok(a) => a,
                Err(code) => return code,
            };
            let code = commands::insert(arc.as_mut(), &files);
            merge(code, commands::commit(arc.as_mut()))
        }
        Commands::Delete { archive, files } => {
            let mut arc = match commands::open_archive(&archive, format) {
                Ok(a) => a,
                Err(code) => return code,
            };
            let code = commands::delete(arc.as_mut(), &files);
            merge(code, commands::commit(arc.as_mut()))
        }
        Commands::Rename { archive, from, to } => {
            let mut arc = match commands::open_archive(&archive, format) {
                Ok(a) => a,
                Err(code) => return code,
            };
            let code = commands::rename(arc.as_mut(), &from, &to);
            merge(code, commands::commit(arc.as_mut()))
        }
    }
}
