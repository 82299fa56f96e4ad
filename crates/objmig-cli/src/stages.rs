use std::ffi::OsString;
use std::fs;
use std::path::Path;
use std::process::Command;
use std::time::Instant;

use anyhow::{bail, Context};
use colored::Colorize;
use objmig_repack::{verify_sizes, BatchPlanner, GroupReport, Migration};
use objmig_repo::{compare_trees, export_to_legacy, list_legacy_nodes, Repository};
use objmig_store::Container;
use objmig_types::OldHashkey;
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::cli::Stage;
use crate::config::Settings;
use crate::report::{format_table, megabytes, print_elapsed, print_stage, print_table};

/// Subfolders of the extract-to folder.
const EXPORT_CONTAINER: &str = "export-container";
const LEGACY_EXTRACT: &str = "legacy";
const LEGACY_RSYNC: &str = "legacy-export";
const NEW_RSYNC: &str = "rsync-new";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    /// A check failed; the reason has already been printed.
    Failed,
}

pub fn run(settings: &Settings) -> anyhow::Result<Outcome> {
    let repo = Repository::open(&settings.path, settings.container.clone())
        .with_context(|| format!("opening repository in {}", settings.path.display()))?;
    let target = repo.container().config().pack_size_target;
    println!("Using a pack_size_target of {} ({} MB)", target, target / 1024 / 1024);

    if !prepare_extract_to(settings)? {
        return Ok(Outcome::Failed);
    }

    let mut runner = Runner { settings, repo };
    for &stage in &settings.stages {
        info!(?stage, "starting stage");
        let outcome = match stage {
            Stage::LoadLegacy => runner.load_legacy()?,
            Stage::ExportNew => runner.export_new()?,
            Stage::ExportNewToLegacy => runner.export_new_to_legacy()?,
            Stage::RsyncLegacy => runner.rsync_legacy()?,
            Stage::RsyncNew => runner.rsync_new()?,
        };
        if outcome == Outcome::Failed {
            return Ok(Outcome::Failed);
        }
    }
    Ok(Outcome::Passed)
}

/// Returns `false` if the extract-to folder is still in the way.
fn prepare_extract_to(settings: &Settings) -> anyhow::Result<bool> {
    let extract_to = &settings.extract_to;
    if settings.clear_extract_to && extract_to.exists() {
        fs::remove_dir_all(extract_to)
            .with_context(|| format!("removing {}", extract_to.display()))?;
    }
    if extract_to.exists() {
        println!(
            "The folder '{}' exists - either delete it, or specify the -C option",
            extract_to.display()
        );
        return Ok(false);
    }
    fs::create_dir_all(extract_to).with_context(|| format!("creating {}", extract_to.display()))?;
    Ok(true)
}

struct Runner<'s> {
    settings: &'s Settings,
    repo: Repository,
}

impl Runner<'_> {
    fn load_legacy(&mut self) -> anyhow::Result<Outcome> {
        if self.settings.clear {
            self.repo
                .clear(self.settings.container.clone())
                .context("clearing repository")?;
        }
        let node_folder = self.settings.node_folder();
        if !node_folder.is_dir() {
            bail!(
                "no 'node' folder in {}, is this a legacy repository?",
                self.settings.repository_folder.display()
            );
        }

        print_stage("* IMPORTING FROM LEGACY REPO");
        let size = folder_size(&node_folder)?;
        println!("{size} bytes ({:.1} MB)\t{}", megabytes(size), node_folder.display());

        let nodes = list_legacy_nodes(&node_folder)?;
        let import = self
            .repo
            .create_repo_for_nodes(&nodes, self.settings.compress())
            .context("importing legacy nodes")?;
        print_elapsed(
            &format!("to import {} files of {} nodes", import.files, import.nodes),
            import.list_time + import.store_time + import.commit_time,
        );

        let container = self.repo.container();
        print_table("Object store size info:", &container.get_total_size()?.rows());
        print_table("Object store objects info:", &container.count_objects()?.rows());
        Ok(Outcome::Passed)
    }

    fn export_new(&mut self) -> anyhow::Result<Outcome> {
        let node_uuids = self.shuffled_node_uuids()?;

        print_stage("* REEXPORTING FROM NEW-STYLE REPO DIRECTLY TO NEW-STYLE PACKED REPO, IN A FEW CHUNKS");
        let mut planner = BatchPlanner::new();
        for chunk in split_nodes(&node_uuids, self.settings.groups) {
            let ids = self.repo.object_ids_for_nodes(chunk)?;
            planner.push_group(ids.into_iter().map(OldHashkey::new));
        }
        if planner.dropped() > 0 {
            debug!(dropped = planner.dropped(), "objects referenced more than once are written once");
        }
        let groups = planner.finish();

        let output_folder = self.settings.extract_to.join(EXPORT_CONTAINER);
        let output = Container::init(&output_folder, self.settings.container.clone())
            .with_context(|| format!("creating output container in {}", output_folder.display()))?;
        let migration = Migration::new(self.repo.container(), &output, self.settings.migration.clone());
        let sizes_of = self.settings.verbose.then_some(&output);
        let report = migration.run_with(&groups, |group| print!("{}", group_text(group, sizes_of)))?;
        println!(
            "Time to store all objects (from packed to packed) in {} steps: {:.3} s (of which write-time: {:.3} s)",
            groups.len(),
            report.elapsed.as_secs_f64(),
            report.write_time().as_secs_f64()
        );

        match verify_sizes(self.repo.container(), &output, &report.mapping) {
            Ok(verified) => println!(
                "Sizes of {} objects ({} bytes) match after repacking",
                verified.checked, verified.bytes
            ),
            Err(err) => {
                println!("{} {err}", "ERROR! SIZE CHECK FAILED:".red().bold());
                return Ok(Outcome::Failed);
            }
        }

        print_table("OUTPUT object store size info:", &output.get_total_size()?.rows());
        print_table("OUTPUT object store objects info:", &output.count_objects()?.rows());
        Ok(Outcome::Passed)
    }

    fn export_new_to_legacy(&mut self) -> anyhow::Result<Outcome> {
        let node_uuids = self.shuffled_node_uuids()?;
        println!("Extracting (shuffled) again in '{}'...", self.settings.extract_to.display());

        let start = Instant::now();
        let node_repos = self.repo.get_node_repositories(&node_uuids)?;
        print_elapsed(
            &format!("to get back all folder metas for {} shuffled nodes", node_repos.len()),
            start.elapsed(),
        );

        let legacy = self.settings.extract_to.join(LEGACY_EXTRACT);
        let start = Instant::now();
        let extracted = export_to_legacy(&node_repos, &legacy)?;
        print_elapsed(
            &format!(
                "to recreate {} files in the legacy layout in '{}'",
                extracted.files,
                legacy.display()
            ),
            start.elapsed(),
        );

        let differences = compare_trees(&self.settings.node_folder(), &legacy)?;
        if !differences.is_empty() {
            println!("{}", "ERROR! FOLDERS DIFFER:".red().bold());
            for difference in &differences {
                println!("{difference}");
            }
            return Ok(Outcome::Failed);
        }
        println!("{}", "ALL OK! THE TWO FOLDERS ARE IDENTICAL!!".green().bold());
        Ok(Outcome::Passed)
    }

    fn rsync_legacy(&mut self) -> anyhow::Result<Outcome> {
        let from = self.settings.node_folder();
        let to = self.settings.extract_to.join(LEGACY_RSYNC);
        timed_rsync(&from, &to, "for the rsync of the legacy repo")?;
        timed_rsync(&from, &to, "for the 2nd rsync of the legacy repo")?;
        Ok(Outcome::Passed)
    }

    fn rsync_new(&mut self) -> anyhow::Result<Outcome> {
        let from = self.repo.container().folder().to_path_buf();
        let to = self.settings.extract_to.join(NEW_RSYNC);
        timed_rsync(&from, &to, "for the rsync of the new-style repo")?;

        let one_kb = [b'a'; 1024];
        self.repo.container().add_objects_to_pack(&[&one_kb], false)?;
        timed_rsync(
            &from,
            &to,
            "for the 2nd rsync of the new-style repo after adding a 1kb file",
        )?;
        Ok(Outcome::Passed)
    }

    fn shuffled_node_uuids(&self) -> anyhow::Result<Vec<String>> {
        let start = Instant::now();
        let mut node_uuids = self.repo.get_all_node_uuids()?;
        print_elapsed(
            &format!("to get back all node UUIDs ({} received) from the catalog", node_uuids.len()),
            start.elapsed(),
        );
        node_uuids.shuffle(&mut rand::thread_rng());
        Ok(node_uuids)
    }
}

/// Summary of a finished group, followed by the size table of `output` if
/// one is given. Groups may finish concurrently, so the text is printed at
/// once.
fn group_text(report: &GroupReport, output: Option<&Container>) -> String {
    let mut text = format!(
        "- phase {}: {} objects, {} direct writes, {} flushes, peak {} bytes buffered ({:.3} s)\n",
        report.group,
        report.objects,
        report.direct_writes,
        report.flushes,
        report.peak_buffered,
        report.elapsed.as_secs_f64()
    );
    if let Some(output) = output {
        match output.get_total_size() {
            Ok(size) => text.push_str(&format_table(
                &format!("Output object store size info after phase {}:", report.group),
                &size.rows(),
            )),
            Err(err) => warn!(group = report.group, %err, "cannot read output container size"),
        }
    }
    text
}

/// `groups` consecutive chunks whose lengths differ by at most one, the
/// longer ones last. Never more chunks than nodes, and at least one.
fn split_nodes(node_uuids: &[String], groups: usize) -> Vec<&[String]> {
    let count = groups.clamp(1, node_uuids.len().max(1));
    let base = node_uuids.len() / count;
    let remainder = node_uuids.len() % count;
    let mut start = 0;
    (0..count)
        .map(|i| {
            let len = base + usize::from(i >= count - remainder);
            let chunk = &node_uuids[start..start + len];
            start += len;
            chunk
        })
        .collect()
}

fn folder_size(folder: &Path) -> anyhow::Result<u64> {
    let mut total = 0;
    for entry in WalkDir::new(folder) {
        let entry = entry?;
        if entry.file_type().is_file() {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}

fn timed_rsync(from: &Path, to: &Path, what: &str) -> anyhow::Result<()> {
    let start = Instant::now();
    let output = Command::new("rsync")
        .arg("-aHx")
        .arg(with_trailing_slash(from))
        .arg(with_trailing_slash(to))
        .output()
        .context("running rsync")?;
    if !output.status.success() {
        bail!(
            "rsync of {} failed ({}): {}",
            from.display(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    print!("{}", String::from_utf8_lossy(&output.stdout));
    print_elapsed(what, start.elapsed());
    Ok(())
}

/// rsync copies the contents of a folder, not the folder, when its path
/// ends with a slash.
fn with_trailing_slash(path: &Path) -> OsString {
    let mut arg = path.as_os_str().to_owned();
    arg.push("/");
    arg
}

#[cfg(test)]
mod tests {
    use super::*;
    use objmig_repack::{MigrationConfig, RepackConfig};
    use objmig_repo::legacy_node_folder;
    use objmig_store::ContainerConfig;

    fn uuids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{i:08x}-0000-4000-8000-000000000000")).collect()
    }

    fn legacy_repository(root: &Path) {
        for (i, uuid) in uuids(5).iter().enumerate() {
            let folder = legacy_node_folder(&root.join("node"), uuid).unwrap();
            fs::create_dir_all(folder.join("path/nested")).unwrap();
            fs::create_dir_all(folder.join("raw_input")).unwrap();
            fs::write(folder.join("path/small.txt"), format!("node {i}")).unwrap();
            fs::write(folder.join("path/nested/large.bin"), vec![i as u8; 300]).unwrap();
            // Same content in every node.
            fs::write(folder.join("raw_input/shared"), b"shared input").unwrap();
        }
    }

    fn test_settings(root: &Path, stages: Vec<Stage>) -> Settings {
        Settings {
            path: root.join("repo"),
            repository_folder: root.join("legacy"),
            extract_to: root.join("extract"),
            clear: false,
            clear_extract_to: false,
            verbose: false,
            groups: 2,
            container: ContainerConfig::with_pack_size_target(1024),
            migration: MigrationConfig {
                repack: RepackConfig::new(128, true),
                parallelism: 2,
            },
            stages,
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    #[test]
    fn split_nodes_even_and_remainder() {
        let nodes = uuids(5);
        let chunks = split_nodes(&nodes, 2);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 2);
        assert_eq!(chunks[1].len(), 3);
        assert_eq!(chunks.concat(), nodes);
    }

    #[test]
    fn split_nodes_never_more_chunks_than_nodes() {
        let nodes = uuids(2);
        assert_eq!(split_nodes(&nodes, 8).len(), 2);
        let chunks = split_nodes(&[], 3);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_empty());
    }

    #[test]
    fn trailing_slash_added() {
        assert_eq!(with_trailing_slash(Path::new("/data/node")), OsString::from("/data/node/"));
    }

    #[test]
    fn group_text_with_output_sizes() {
        let dir = tempfile::tempdir().unwrap();
        let config = ContainerConfig::with_pack_size_target(1024);
        let output = Container::init(&dir.path().join("out"), config).unwrap();
        output.add_objects_to_pack(&[b"abc"], false).unwrap();
        let report = GroupReport {
            group: 1,
            objects: 4,
            ..GroupReport::default()
        };

        let quiet = group_text(&report, None);
        assert_eq!(quiet.lines().count(), 1);
        assert!(quiet.starts_with("- phase 1: 4 objects"));

        let verbose = group_text(&report, Some(&output));
        assert!(verbose.starts_with(&quiet));
        assert!(verbose.contains("Output object store size info after phase 1:"));
        assert!(verbose.contains(&format!("- {:30}: 3", "total_size_packed")));
    }

    #[test]
    fn folder_size_sums_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::write(dir.path().join("a/one"), [0u8; 10]).unwrap();
        fs::write(dir.path().join("a/b/two"), [0u8; 32]).unwrap();
        assert_eq!(folder_size(dir.path()).unwrap(), 42);
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    #[test]
    fn load_export_and_extract_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        legacy_repository(&dir.path().join("legacy"));
        let settings = test_settings(
            dir.path(),
            vec![Stage::LoadLegacy, Stage::ExportNew, Stage::ExportNewToLegacy],
        );

        assert_eq!(run(&settings).unwrap(), Outcome::Passed);

        let repo = Repository::open(&settings.path, ContainerConfig::default()).unwrap();
        assert_eq!(repo.get_all_node_uuids().unwrap().len(), 5);
        let output = Container::open(&settings.extract_to.join(EXPORT_CONTAINER)).unwrap();
        // 5 small files, 5 large ones, and the shared input written once.
        assert_eq!(output.count_objects().unwrap().packed, 11);
        assert!(settings.extract_to.join(LEGACY_EXTRACT).is_dir());
    }

    #[test]
    fn existing_extract_to_fails_without_clear() {
        let dir = tempfile::tempdir().unwrap();
        let settings = test_settings(dir.path(), Vec::new());
        fs::create_dir_all(&settings.extract_to).unwrap();
        assert_eq!(run(&settings).unwrap(), Outcome::Failed);
    }

    #[test]
    fn clear_extract_to_removes_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = test_settings(dir.path(), Vec::new());
        settings.clear_extract_to = true;
        fs::create_dir_all(settings.extract_to.join("stale")).unwrap();
        assert_eq!(run(&settings).unwrap(), Outcome::Passed);
        assert!(!settings.extract_to.join("stale").exists());
    }

    #[test]
    fn missing_node_folder_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = test_settings(dir.path(), vec![Stage::LoadLegacy]);
        settings.repository_folder = dir.path().join("not-a-repository");
        assert!(run(&settings).is_err());
    }

    #[test]
    fn clear_reinitialises_with_new_pack_size_target() {
        let dir = tempfile::tempdir().unwrap();
        legacy_repository(&dir.path().join("legacy"));
        let mut settings = test_settings(dir.path(), vec![Stage::LoadLegacy]);
        assert_eq!(run(&settings).unwrap(), Outcome::Passed);

        settings.clear = true;
        settings.clear_extract_to = true;
        settings.verbose = true;
        settings.container = ContainerConfig::with_pack_size_target(2048);
        settings.stages = vec![Stage::LoadLegacy, Stage::ExportNew];
        assert_eq!(run(&settings).unwrap(), Outcome::Passed);

        let repo = Repository::open(&settings.path, ContainerConfig::default()).unwrap();
        assert_eq!(repo.container().config().pack_size_target, 2048);
        assert_eq!(repo.get_all_node_uuids().unwrap().len(), 5);
    }

    #[test]
    fn modified_extract_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        legacy_repository(&dir.path().join("legacy"));
        let settings = test_settings(dir.path(), vec![Stage::LoadLegacy]);
        assert_eq!(run(&settings).unwrap(), Outcome::Passed);

        // A file added after the import is missing from the extract.
        let node = legacy_node_folder(&settings.node_folder(), &uuids(1)[0]).unwrap();
        fs::write(node.join("path/late.txt"), b"late").unwrap();

        let mut settings = settings;
        settings.clear_extract_to = true;
        settings.stages = vec![Stage::ExportNewToLegacy];
        assert_eq!(run(&settings).unwrap(), Outcome::Failed);
    }
}
