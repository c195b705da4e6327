//! Per-request local staging area.
//!
//! Each request gets its own temporary directory with `input/` and `output/`
//! inside it. The directory is removed when the [`Staging`] value is dropped,
//! whichever step the request ended on. [`Staging::open`] and
//! [`Staging::release`] do the directory work on the blocking pool.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

#[derive(Debug)]
pub struct Staging {
    dir: TempDir,
    input: PathBuf,
    output: PathBuf,
}

impl Staging {
    /// Create a fresh staging directory under `parent`, or under the system
    /// temp directory when `parent` is `None`.
    pub fn create(parent: Option<&Path>) -> io::Result<Self> {
        let builder = {
            let mut b = tempfile::Builder::new();
            b.prefix("gis-convert-");
            b
        };
        let dir = match parent {
            Some(parent) => builder.tempdir_in(parent)?,
            None => builder.tempdir()?,
        };
        let input = dir.path().join("input");
        let output = dir.path().join("output");
        std::fs::create_dir(&input)?;
        std::fs::create_dir(&output)?;
        debug!(path = %dir.path().display(), "created staging area");
        Ok(Self { dir, input, output })
    }

    /// [`Staging::create`] on the blocking pool.
    pub async fn open(parent: Option<PathBuf>) -> io::Result<Self> {
        tokio::task::spawn_blocking(move || Self::create(parent.as_deref()))
            .await
            .map_err(io::Error::other)?
    }

    /// Remove the directory tree on the blocking pool.
    pub async fn release(self) {
        if let Err(e) = tokio::task::spawn_blocking(move || drop(self)).await {
            warn!(error = %e, "staging cleanup task failed");
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Path a staged source file with the given extension is written to.
    pub fn input_file(&self, extension: &str) -> PathBuf {
        self.input.join(format!("source.{extension}"))
    }

    pub fn output_dir(&self) -> &Path {
        &self.output
    }
}

impl Drop for Staging {
    fn drop(&mut self) {
        debug!(path = %self.dir.path().display(), "releasing staging area");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_is_removed_on_drop() {
        let parent = tempfile::tempdir().unwrap();
        let staging = Staging::create(Some(parent.path())).unwrap();
        let root = staging.root().to_path_buf();
        std::fs::write(staging.input_file("geojson"), b"{}").unwrap();
        std::fs::write(staging.output_dir().join("abc.shp"), b"").unwrap();
        assert!(root.exists());

        drop(staging);
        assert!(!root.exists());
        assert_eq!(std::fs::read_dir(parent.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn open_and_release_run_off_the_runtime() {
        let parent = tempfile::tempdir().unwrap();
        let staging = Staging::open(Some(parent.path().to_path_buf())).await.unwrap();
        let root = staging.root().to_path_buf();
        assert!(staging.output_dir().is_dir());
        assert!(staging.input_file("csv").parent().unwrap().is_dir());

        staging.release().await;
        assert!(!root.exists());
    }

    #[test]
    fn concurrent_areas_do_not_collide() {
        let a = Staging::create(None).unwrap();
        let b = Staging::create(None).unwrap();
        assert_ne!(a.root(), b.root());
        assert_ne!(a.input_file("shp"), b.input_file("shp"));
    }
}
