use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "objmig",
    about = "Import a legacy node repository into pack containers, repack it with bounded memory and check the round trip",
    version,
)]
pub struct Cli {
    /// Folder of the pack repository to create or reuse
    #[arg(short, long)]
    pub path: Option<PathBuf>,

    /// Clear the repository before loading the legacy one
    #[arg(short, long)]
    pub clear: bool,

    /// Legacy repository to import (read only; must contain a `node` folder)
    #[arg(short, long)]
    pub repository_folder: Option<PathBuf>,

    /// Where exports are written. Must not exist unless -C is given
    #[arg(short = 'x', long)]
    pub extract_to: Option<PathBuf>,

    /// Delete the extract-to folder before starting
    #[arg(short = 'C', long)]
    pub clear_extract_to: bool,

    /// Compress objects when packing
    #[arg(short = 'z', long)]
    pub compress: bool,

    /// Target size of pack files, in bytes
    #[arg(short = 's', long)]
    pub pack_size_target: Option<u64>,

    /// Memory budget of the repack cache, in bytes
    #[arg(short = 'm', long)]
    pub max_memory_usage: Option<u64>,

    /// Number of node groups the export is split into
    #[arg(short = 'g', long)]
    pub groups: Option<NonZeroUsize>,

    /// Groups repacked concurrently
    #[arg(short = 'j', long)]
    pub jobs: Option<NonZeroUsize>,

    /// Run only this stage. All stages run when omitted
    #[arg(short = 'o', long, value_enum)]
    pub only: Option<Stage>,

    /// TOML file with default settings; flags take precedence
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(short, long)]
    pub verbose: bool,
}

/// Stages of a run, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum Stage {
    /// Import the legacy repository into the pack repository
    LoadLegacy,
    /// Repack every object into a fresh container and verify sizes
    ExportNew,
    /// Recreate the legacy layout and compare it with the original
    ExportNewToLegacy,
    /// Time rsync of the legacy repository
    RsyncLegacy,
    /// Time rsync of the pack repository
    RsyncNew,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::LoadLegacy,
        Stage::ExportNew,
        Stage::ExportNewToLegacy,
        Stage::RsyncLegacy,
        Stage::RsyncNew,
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_defaults() {
        let cli = Cli::try_parse_from(["objmig"]).unwrap();
        assert!(cli.path.is_none());
        assert!(!cli.clear);
        assert!(!cli.compress);
        assert!(cli.only.is_none());
        assert!(cli.groups.is_none());
    }

    #[test]
    fn parse_short_flags() {
        let cli = Cli::try_parse_from([
            "objmig", "-p", "/tmp/c", "-c", "-r", "/data/repo", "-x", "/tmp/x", "-C", "-z",
            "-s", "1024", "-m", "4096", "-g", "3", "-j", "2",
        ])
        .unwrap();
        assert_eq!(cli.path, Some(PathBuf::from("/tmp/c")));
        assert!(cli.clear);
        assert_eq!(cli.repository_folder, Some(PathBuf::from("/data/repo")));
        assert_eq!(cli.extract_to, Some(PathBuf::from("/tmp/x")));
        assert!(cli.clear_extract_to);
        assert!(cli.compress);
        assert_eq!(cli.pack_size_target, Some(1024));
        assert_eq!(cli.max_memory_usage, Some(4096));
        assert_eq!(cli.groups.map(NonZeroUsize::get), Some(3));
        assert_eq!(cli.jobs.map(NonZeroUsize::get), Some(2));
    }

    #[test]
    fn parse_long_flags() {
        let cli = Cli::try_parse_from([
            "objmig",
            "--repository-folder",
            "/data/repo",
            "--clear-extract-to",
            "--max-memory-usage",
            "100",
            "--config",
            "objmig.toml",
            "--verbose",
        ])
        .unwrap();
        assert!(cli.clear_extract_to);
        assert_eq!(cli.max_memory_usage, Some(100));
        assert_eq!(cli.config, Some(PathBuf::from("objmig.toml")));
        assert!(cli.verbose);
    }

    #[test]
    fn parse_only_stages() {
        for (arg, stage) in [
            ("load-legacy", Stage::LoadLegacy),
            ("export-new", Stage::ExportNew),
            ("export-new-to-legacy", Stage::ExportNewToLegacy),
            ("rsync-legacy", Stage::RsyncLegacy),
            ("rsync-new", Stage::RsyncNew),
        ] {
            let cli = Cli::try_parse_from(["objmig", "-o", arg]).unwrap();
            assert_eq!(cli.only, Some(stage));
        }
    }

    #[test]
    fn reject_unknown_stage() {
        assert!(Cli::try_parse_from(["objmig", "--only", "everything"]).is_err());
    }

    #[test]
    fn reject_zero_groups() {
        assert!(Cli::try_parse_from(["objmig", "-g", "0"]).is_err());
        assert!(Cli::try_parse_from(["objmig", "-j", "0"]).is_err());
    }

    #[test]
    fn stages_are_ordered() {
        let mut sorted = Stage::ALL;
        sorted.sort();
        assert_eq!(sorted, Stage::ALL);
    }
}
