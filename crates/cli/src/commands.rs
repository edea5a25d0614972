use clap::{Subcommand, ValueEnum};
use engine_core::state::models::SessionKind;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Drive an export session
    Export {
        #[command(subcommand)]
        command: ExportCommand,
    },
    /// Drive an import session
    Import {
        #[command(subcommand)]
        command: ImportCommand,
    },
    Status {
        #[arg(value_enum)]
        kind: KindArg,

        #[arg(long, help = "Print the status snapshot as JSON instead of a table")]
        json: bool,
    },
    /// Split an archive into parts plus a parts manifest
    Split {
        file: PathBuf,

        #[arg(long, help = "Maximum part size in MB")]
        size_mb: u64,
    },
    /// Join parts back into one archive
    Combine {
        #[arg(required = true)]
        parts: Vec<PathBuf>,

        #[arg(long, help = "Path of the combined archive")]
        output: PathBuf,
    },
    /// Check parts against their parts manifest
    Verify {
        #[arg(required = true)]
        parts: Vec<PathBuf>,
    },
    /// Read one JSON polling request from stdin and answer on stdout
    ServeTick,
}

#[derive(Subcommand)]
pub enum ExportCommand {
    Start {
        #[arg(long, help = "Export options as a JSON object")]
        options: Option<String>,
    },
    Tick {
        #[arg(long, help = "Session token returned by start")]
        token: Option<String>,
    },
    /// Tick until the session completes or fails
    Run {
        #[arg(long, default_value_t = 0, help = "Pause between ticks in milliseconds")]
        delay_ms: u64,
    },
}

#[derive(Subcommand)]
pub enum ImportCommand {
    Start {
        #[arg(long, required = true, num_args = 1.., help = "Archive, or all parts of a split archive")]
        archive: Vec<PathBuf>,

        #[arg(long, help = "Do not back up the current database first")]
        skip_backup: bool,

        #[arg(long, help = "Target site URL, overriding the configured one")]
        site_url: Option<String>,
    },
    Tick {
        #[arg(long, help = "Session token returned by start")]
        token: Option<String>,
    },
    Run {
        #[arg(long, default_value_t = 0, help = "Pause between ticks in milliseconds")]
        delay_ms: u64,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Export,
    Import,
}

impl From<KindArg> for SessionKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Export => SessionKind::Export,
            KindArg::Import => SessionKind::Import,
        }
    }
}
