use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use objmig_repack::MigrationConfig;
use objmig_store::ContainerConfig;
use serde::{Deserialize, Serialize};

use crate::cli::{Cli, Stage};

/// Settings readable from a TOML file.
///
/// ```toml
/// path = "/scratch/objmig"
/// repository_folder = "/data/legacy-repository"
/// groups = 4
///
/// [container]
/// pack_size_target = 4294967296
///
/// [migration]
/// memory_budget = 1048576000
/// compress = true
/// parallelism = 2
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub path: PathBuf,
    pub repository_folder: Option<PathBuf>,
    pub extract_to: PathBuf,
    /// Number of node groups the export is split into.
    pub groups: usize,
    pub container: ContainerConfig,
    pub migration: MigrationConfig,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/tmp/test-container"),
            repository_folder: None,
            extract_to: PathBuf::from("/tmp/test-repository-extract-to"),
            groups: 2,
            container: ContainerConfig::default(),
            migration: MigrationConfig::default(),
        }
    }
}

impl FileConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    /// Override file values with the flags given on the command line.
    fn apply(&mut self, cli: &Cli) {
        if let Some(path) = &cli.path {
            self.path.clone_from(path);
        }
        if let Some(folder) = &cli.repository_folder {
            self.repository_folder = Some(folder.clone());
        }
        if let Some(extract_to) = &cli.extract_to {
            self.extract_to.clone_from(extract_to);
        }
        if let Some(groups) = cli.groups {
            self.groups = groups.get();
        }
        if let Some(target) = cli.pack_size_target {
            self.container.pack_size_target = target;
        }
        if let Some(budget) = cli.max_memory_usage {
            self.migration.repack.memory_budget = budget;
        }
        if let Some(jobs) = cli.jobs {
            self.migration.parallelism = jobs.get();
        }
        if cli.compress {
            self.migration.repack.compress = true;
        }
    }
}

/// Fully resolved settings of one run.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub path: PathBuf,
    pub repository_folder: PathBuf,
    pub extract_to: PathBuf,
    pub clear: bool,
    pub clear_extract_to: bool,
    /// Print the output container's sizes after each repacked group.
    pub verbose: bool,
    pub groups: usize,
    pub container: ContainerConfig,
    pub migration: MigrationConfig,
    pub stages: Vec<Stage>,
}

impl Settings {
    pub fn from_cli(cli: &Cli) -> anyhow::Result<Self> {
        let file = match &cli.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(file, cli)
    }

    fn resolve(mut file: FileConfig, cli: &Cli) -> anyhow::Result<Self> {
        file.apply(cli);
        let Some(repository_folder) = file.repository_folder else {
            bail!("a legacy repository folder is required (--repository-folder or `repository_folder`)");
        };
        if file.groups == 0 {
            bail!("groups must be at least 1");
        }
        if file.migration.parallelism == 0 {
            bail!("parallelism must be at least 1");
        }
        if file.migration.repack.memory_budget == 0 {
            bail!("the memory budget must be at least 1 byte");
        }
        let stages = match cli.only {
            Some(stage) => vec![stage],
            None => Stage::ALL.to_vec(),
        };
        Ok(Self {
            path: file.path,
            repository_folder,
            extract_to: file.extract_to,
            clear: cli.clear,
            clear_extract_to: cli.clear_extract_to,
            verbose: cli.verbose,
            groups: file.groups,
            container: file.container,
            migration: file.migration,
            stages,
        })
    }

    /// The `node` folder of the legacy repository.
    pub fn node_folder(&self) -> PathBuf {
        self.repository_folder.join("node")
    }

    pub fn compress(&self) -> bool {
        self.migration.repack.compress
    }
}
