//! Discovery of the bindings available in a folder of artifacts.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::artifact::ArtifactManifest;
use crate::composite::CompositeIdentifier;
use crate::error::{Cob2RowError, Result};

pub const DEFAULT_ARTIFACT_EXTENSION: &str = "jar";

#[derive(Debug, Clone)]
pub struct ArtifactScanner {
    extension: String,
}

impl Default for ArtifactScanner {
    fn default() -> Self {
        Self::new(DEFAULT_ARTIFACT_EXTENSION)
    }
}

impl ArtifactScanner {
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
        }
    }

    /// Artifact files directly under `folder`, in path order. A missing
    /// folder holds no artifacts.
    pub fn find_artifacts(&self, folder: &Path) -> Result<Vec<PathBuf>> {
        let pattern = format!(
            "{}{}*.{}",
            glob::Pattern::escape(&folder.to_string_lossy()),
            std::path::MAIN_SEPARATOR,
            glob::Pattern::escape(&self.extension)
        );
        let entries = glob::glob(&pattern).map_err(|err| {
            Cob2RowError::configuration(format!("bad artifact pattern {pattern}: {err}"))
        })?;

        let mut artifacts = Vec::new();
        for entry in entries {
            let path = entry.map_err(|err| Cob2RowError::scan(err.path().to_path_buf(), err.error()))?;
            if path.is_file() {
                artifacts.push(path);
            }
        }
        Ok(artifacts)
    }

    /// Lists every marked binding in `folder` as `identifier[artifact]`.
    ///
    /// An unreadable artifact, or one holding a marked type that cannot be
    /// loaded, aborts the whole scan.
    pub fn scan(&self, folder: &Path) -> Result<Vec<CompositeIdentifier>> {
        let artifacts = self.find_artifacts(folder)?;
        if artifacts.is_empty() {
            tracing::warn!(folder = %folder.display(), "no binding artifacts found");
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        for path in &artifacts {
            let manifest =
                ArtifactManifest::read(path).map_err(|reason| Cob2RowError::scan(path, reason))?;
            let artifact_name = base_name(path)?;
            let mut names = BTreeSet::new();
            for entry in &manifest.types {
                if entry
                    .to_binding()
                    .map_err(|reason| Cob2RowError::scan(path, reason))?
                    .is_some()
                {
                    names.insert(entry.name.as_str());
                }
            }
            tracing::debug!(artifact = %artifact_name, bindings = names.len(), "scanned artifact");
            found.extend(
                names
                    .into_iter()
                    .map(|name| CompositeIdentifier::new(name, artifact_name.clone())),
            );
        }
        tracing::info!(
            folder = %folder.display(),
            artifacts = artifacts.len(),
            bindings = found.len(),
            "binding scan complete"
        );
        Ok(found)
    }

    /// Joins every artifact path under `folder` with the platform path
    /// separator.
    pub fn classpath(&self, folder: &Path) -> Result<String> {
        let artifacts = self.find_artifacts(folder)?;
        let joined = std::env::join_paths(&artifacts).map_err(|err| {
            Cob2RowError::configuration(format!("cannot build classpath for {}: {err}", folder.display()))
        })?;
        Ok(joined.to_string_lossy().into_owned())
    }
}

/// Scans `folder` for `.jar` artifacts.
pub fn scan(folder: &Path) -> Result<Vec<CompositeIdentifier>> {
    ArtifactScanner::default().scan(folder)
}

fn base_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| Cob2RowError::scan(path, "artifact path has no file name"))
}
