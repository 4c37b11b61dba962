//! Ephemeral source trees holding staged and committed repository content.
//!
//! A [`SourceTree`] owns a unique temporary directory that is removed when the
//! tree is dropped, whatever path the run takes out of its scope. Paths inside
//! a tree can only be handed out once it has been marked available.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;
use tracing::{debug, info, instrument};

use super::git::Git;

/// Temporary directory holding one snapshot of repository content.
#[derive(Debug)]
pub struct SourceTree {
    label: &'static str,
    dir: TempDir,
    available: bool,
}

impl SourceTree {
    /// Create an empty, unavailable tree in a fresh temporary directory.
    pub fn create(label: &'static str) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("gatecheck-{label}-"))
            .tempdir()
            .with_context(|| format!("create {label} source tree"))?;
        debug!(label, dir = %dir.path().display(), "source tree created");
        Ok(Self {
            label,
            dir,
            available: false,
        })
    }

    /// Directory to populate. Only meant for snapshotters.
    pub fn staging_dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn mark_available(&mut self) {
        self.available = true;
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    /// Absolute path of `rel` inside the tree.
    pub fn full_path(&self, rel: &str) -> Result<PathBuf> {
        if !self.available {
            return Err(anyhow!(
                "{} source tree read before it was populated: {}",
                self.label,
                rel
            ));
        }
        Ok(self.dir.path().join(rel))
    }

    /// True if `rel` exists in the snapshot.
    pub fn contains(&self, rel: &str) -> Result<bool> {
        let path = self.full_path(rel)?;
        Ok(path.symlink_metadata().is_ok())
    }
}

/// Producer of the two snapshots a run may need.
pub trait Snapshotter {
    /// Exact staged content of the pending commit.
    fn snapshot_staged(&self) -> Result<SourceTree>;
    /// Last committed content (`HEAD`); empty when there is no commit yet.
    fn snapshot_committed(&self) -> Result<SourceTree>;
}

/// Snapshotter backed by git plumbing.
#[derive(Debug, Clone)]
pub struct GitSnapshotter {
    git: Git,
}

impl GitSnapshotter {
    pub fn new(git: Git) -> Self {
        Self { git }
    }
}

impl Snapshotter for GitSnapshotter {
    #[instrument(skip_all)]
    fn snapshot_staged(&self) -> Result<SourceTree> {
        let mut tree = SourceTree::create("new")?;
        self.git
            .export_index(tree.staging_dir())
            .context("export staged content")?;
        tree.mark_available();
        info!(dir = %tree.staging_dir().display(), "staged snapshot ready");
        Ok(tree)
    }

    #[instrument(skip_all)]
    fn snapshot_committed(&self) -> Result<SourceTree> {
        let mut tree = SourceTree::create("old")?;
        if self.git.has_head()? {
            let scratch = tempfile::Builder::new()
                .prefix("gatecheck-index-")
                .tempdir()
                .context("create scratch index dir")?;
            self.git
                .export_revision("HEAD", tree.staging_dir(), &scratch.path().join("index"))
                .context("export committed content")?;
        } else {
            debug!("no HEAD commit, old snapshot stays empty");
        }
        tree.mark_available();
        info!(dir = %tree.staging_dir().display(), "committed snapshot ready");
        Ok(tree)
    }
}

/// The snapshots owned by one run. Dropping this removes both directories.
#[derive(Debug)]
pub struct Snapshots {
    pub new: SourceTree,
    pub old: Option<SourceTree>,
}

impl Snapshots {
    /// Materialize the staged tree and, when `need_old`, the committed one.
    pub fn materialize<S: Snapshotter>(snapshotter: &S, need_old: bool) -> Result<Self> {
        let new = snapshotter
            .snapshot_staged()
            .context("materialize staged snapshot")?;
        let old = if need_old {
            Some(
                snapshotter
                    .snapshot_committed()
                    .context("materialize committed snapshot")?,
            )
        } else {
            None
        };
        Ok(Self { new, old })
    }

    /// Old-content path for `rel`, if the run has an old tree containing it.
    pub fn old_path(&self, rel: &str) -> Result<Option<PathBuf>> {
        match &self.old {
            Some(tree) if tree.contains(rel)? => Ok(Some(tree.full_path(rel)?)),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestRepo;

    #[test]
    fn unavailable_tree_refuses_reads() {
        let tree = SourceTree::create("new").expect("tree");
        let err = tree.full_path("a.py").expect_err("not available");
        assert!(err.to_string().contains("before it was populated"));
    }

    #[test]
    fn available_tree_resolves_paths() {
        let mut tree = SourceTree::create("new").expect("tree");
        std::fs::write(tree.staging_dir().join("a.py"), "x").expect("write");
        tree.mark_available();
        assert!(tree.contains("a.py").expect("contains"));
        assert!(!tree.contains("b.py").expect("contains"));
        assert_eq!(
            tree.full_path("a.py").expect("path"),
            tree.staging_dir().join("a.py")
        );
    }

    #[test]
    fn drop_removes_directory() {
        let tree = SourceTree::create("old").expect("tree");
        let dir = tree.staging_dir().to_path_buf();
        assert!(dir.is_dir());
        drop(tree);
        assert!(!dir.exists());
    }

    #[test]
    fn git_snapshots_hold_staged_and_committed_content() {
        let repo = TestRepo::new().expect("repo");
        repo.write_staged("pkg/a.py", "old\n").expect("stage");
        repo.commit("init").expect("commit");
        repo.write_staged("pkg/a.py", "new\n").expect("stage");
        repo.write_staged("b.py", "added\n").expect("stage");

        let snapshotter = GitSnapshotter::new(Git::new(repo.path()));
        let snapshots = Snapshots::materialize(&snapshotter, true).expect("materialize");
        let read = |path: PathBuf| std::fs::read_to_string(path).expect("read");

        assert_eq!(read(snapshots.new.full_path("pkg/a.py").expect("path")), "new\n");
        let old = snapshots.old_path("pkg/a.py").expect("old").expect("present");
        assert_eq!(read(old), "old\n");
        assert!(snapshots.old_path("b.py").expect("old").is_none());
    }

    #[test]
    fn committed_snapshot_is_empty_without_head() {
        let repo = TestRepo::new().expect("repo");
        repo.write_staged("a.py", "x\n").expect("stage");
        let snapshotter = GitSnapshotter::new(Git::new(repo.path()));
        let snapshots = Snapshots::materialize(&snapshotter, true).expect("materialize");
        assert!(snapshots.old.as_ref().expect("old tree").is_available());
        assert!(snapshots.old_path("a.py").expect("old").is_none());
    }

    #[test]
    fn old_tree_is_skipped_when_not_needed() {
        let repo = TestRepo::new().expect("repo");
        repo.write_staged("a.py", "x\n").expect("stage");
        let snapshotter = GitSnapshotter::new(Git::new(repo.path()));
        let snapshots = Snapshots::materialize(&snapshotter, false).expect("materialize");
        assert!(snapshots.old.is_none());
        assert!(snapshots.old_path("a.py").expect("old").is_none());
    }

    #[test]
    fn trees_get_unique_directories() {
        let a = SourceTree::create("new").expect("tree");
        let b = SourceTree::create("new").expect("tree");
        assert_ne!(a.staging_dir(), b.staging_dir());
    }
}
