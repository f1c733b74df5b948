use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::convert::{HostCharset, SimpleConverters};
use crate::error::{Cob2RowError, Result};
use crate::scan::{ArtifactScanner, DEFAULT_ARTIFACT_EXTENSION};

/// Install location relative to the working directory when nothing else is
/// configured.
pub const DEFAULT_PLUGIN_FOLDER: &str = "plugins/cob2row";

/// Environment variable holding an alternate install location.
pub const PLUGIN_FOLDER_ENV: &str = "COB2ROW_PLUGIN_FOLDER";

pub const USER_FOLDER: &str = "user";
pub const LIB_FOLDER: &str = "lib";
pub const CONF_FOLDER: &str = "conf";
pub const CONF_FILE_NAME: &str = "cob2row.toml";

/// Root of a cob2row installation and its well-known subfolders.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PluginLocation {
    root: PathBuf,
}

impl PluginLocation {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolves the install root: `explicit`, then [`PLUGIN_FOLDER_ENV`],
    /// then [`DEFAULT_PLUGIN_FOLDER`] under the working directory.
    pub fn resolve(explicit: Option<PathBuf>) -> Result<Self> {
        let cwd = std::env::current_dir().map_err(|err| {
            Cob2RowError::configuration(format!("cannot read working directory: {err}"))
        })?;
        Ok(Self::resolve_from(
            explicit,
            std::env::var_os(PLUGIN_FOLDER_ENV).map(PathBuf::from),
            &cwd,
        ))
    }

    pub fn resolve_from(explicit: Option<PathBuf>, from_env: Option<PathBuf>, cwd: &Path) -> Self {
        let root = explicit
            .or(from_env.filter(|p| !p.as_os_str().is_empty()))
            .unwrap_or_else(|| cwd.join(DEFAULT_PLUGIN_FOLDER));
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Generated binding artifacts.
    pub fn user_folder(&self) -> PathBuf {
        self.root.join(USER_FOLDER)
    }

    /// Shared dependency archives.
    pub fn lib_folder(&self) -> PathBuf {
        self.root.join(LIB_FOLDER)
    }

    pub fn conf_folder(&self) -> PathBuf {
        self.root.join(CONF_FOLDER)
    }

    pub fn conf_file(&self) -> PathBuf {
        self.conf_folder().join(CONF_FILE_NAME)
    }
}

/// Settings read from `conf/cob2row.toml`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Cob2RowConfig {
    pub host_charset: String,
    pub artifact_extension: String,
    /// Reject bindings that can produce more values than the row holds.
    pub check_target_width: bool,
}

impl Default for Cob2RowConfig {
    fn default() -> Self {
        Self {
            host_charset: HostCharset::default().to_string(),
            artifact_extension: DEFAULT_ARTIFACT_EXTENSION.to_string(),
            check_target_width: true,
        }
    }
}

impl Cob2RowConfig {
    /// Loads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no configuration file, using defaults");
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path).map_err(|err| {
            Cob2RowError::configuration(format!("read {} failed: {err}", path.display()))
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)
            .map_err(|err| Cob2RowError::configuration(format!("bad configuration: {err}")))?;
        config.charset()?;
        Ok(config)
    }

    pub fn charset(&self) -> Result<HostCharset> {
        self.host_charset.parse()
    }

    pub fn converters(&self) -> Result<SimpleConverters> {
        Ok(SimpleConverters::new(self.charset()?))
    }

    pub fn scanner(&self) -> ArtifactScanner {
        ArtifactScanner::new(self.artifact_extension.clone())
    }
}
