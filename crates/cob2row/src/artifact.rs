//! On-disk binding artifacts.
//!
//! An artifact is a JSON manifest listing the types a generated binding
//! module provides. Types carrying [`BINDING_MARKER`] are binding roots; any
//! other type is private to the artifact.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::Cob2RowError;
use crate::layout::{Binding, FieldLayout};

/// Marker applied to generated binding-root types.
pub const BINDING_MARKER: &str = "cob2row.CobolElement/1";

/// Manifest format version this crate reads and writes.
pub const MANIFEST_FORMAT: u32 = 1;

/// Failure reading, writing or interpreting one artifact.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed manifest: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported manifest format {0}")]
    UnsupportedFormat(u32),
    #[error("binding name {0:?} must be non-empty and free of '[' and ']'")]
    InvalidName(String),
    #[error("binding {0} has no layout")]
    MissingLayout(String),
    #[error("binding {name} has an invalid layout: {source}")]
    InvalidLayout {
        name: String,
        #[source]
        source: Cob2RowError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub format: u32,
    #[serde(default)]
    pub types: Vec<TypeEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub markers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<FieldLayout>,
}

impl TypeEntry {
    /// A marked binding root with its record layout.
    pub fn binding(name: impl Into<String>, layout: FieldLayout) -> Self {
        Self {
            name: name.into(),
            markers: vec![BINDING_MARKER.to_string()],
            layout: Some(layout),
        }
    }

    pub fn is_binding(&self) -> bool {
        self.markers.iter().any(|m| m == BINDING_MARKER)
    }

    /// Builds the binding for a marked type. Unmarked types yield `None`.
    pub fn to_binding(&self) -> Result<Option<Binding>, ArtifactError> {
        if !self.is_binding() {
            return Ok(None);
        }
        if self.name.is_empty() || self.name.contains(['[', ']']) {
            return Err(ArtifactError::InvalidName(self.name.clone()));
        }
        let layout = self
            .layout
            .clone()
            .ok_or_else(|| ArtifactError::MissingLayout(self.name.clone()))?;
        Binding::new(self.name.clone(), layout)
            .map(Some)
            .map_err(|source| ArtifactError::InvalidLayout {
                name: self.name.clone(),
                source,
            })
    }
}

impl Default for ArtifactManifest {
    fn default() -> Self {
        Self {
            format: MANIFEST_FORMAT,
            types: Vec::new(),
        }
    }
}

impl ArtifactManifest {
    pub fn new(types: Vec<TypeEntry>) -> Self {
        Self {
            format: MANIFEST_FORMAT,
            types,
        }
    }

    /// Reads and checks a manifest.
    pub fn read(path: &Path) -> Result<Self, ArtifactError> {
        let raw = fs::read(path)?;
        let manifest: ArtifactManifest = serde_json::from_slice(&raw)?;
        if manifest.format != MANIFEST_FORMAT {
            return Err(ArtifactError::UnsupportedFormat(manifest.format));
        }
        Ok(manifest)
    }

    /// Writes the manifest through a temporary file so readers never see a
    /// partial artifact.
    pub fn save(&self, path: &Path) -> Result<(), ArtifactError> {
        let raw = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, raw)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Names of the marked binding roots.
    pub fn binding_names(&self) -> impl Iterator<Item = &str> {
        self.types
            .iter()
            .filter(|t| t.is_binding())
            .map(|t| t.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::order_layout;

    #[test]
    fn manifest_save_then_read() {
        let tmp = tempfile::tempdir().expect("tempdir should be created");
        let path = tmp.path().join("orders.jar");
        let manifest = ArtifactManifest::new(vec![
            TypeEntry::binding("com.example.Order", order_layout()),
            TypeEntry {
                name: "com.example.ObjectFactory".to_string(),
                markers: Vec::new(),
                layout: None,
            },
        ]);
        manifest.save(&path).expect("save should succeed");

        let read = ArtifactManifest::read(&path).expect("read should succeed");
        assert_eq!(read, manifest);
        assert_eq!(
            read.binding_names().collect::<Vec<_>>(),
            vec!["com.example.Order"]
        );
        assert!(!tmp.path().join("orders.tmp").exists());
    }

    #[test]
    fn unknown_format_is_rejected() {
        let tmp = tempfile::tempdir().expect("tempdir should be created");
        let path = tmp.path().join("future.jar");
        fs::write(&path, br#"{"format": 2, "types": []}"#).unwrap();
        let err = ArtifactManifest::read(&path).unwrap_err();
        assert!(matches!(err, ArtifactError::UnsupportedFormat(2)), "{err}");
    }

    #[test]
    fn read_keeps_error_kind() {
        let tmp = tempfile::tempdir().expect("tempdir should be created");
        assert!(matches!(
            ArtifactManifest::read(&tmp.path().join("absent.jar")),
            Err(ArtifactError::Io(_))
        ));
        let path = tmp.path().join("garbage.jar");
        fs::write(&path, b"PK\x03\x04").unwrap();
        assert!(matches!(
            ArtifactManifest::read(&path),
            Err(ArtifactError::Json(_))
        ));
    }

    #[test]
    fn marked_types_must_be_loadable() {
        let unmarked = TypeEntry {
            name: "com.example.Helper".to_string(),
            markers: Vec::new(),
            layout: None,
        };
        assert!(unmarked.to_binding().unwrap().is_none());

        let good = TypeEntry::binding("com.example.Order", order_layout());
        assert_eq!(good.to_binding().unwrap().unwrap().byte_length(), 44);

        let no_layout = TypeEntry {
            layout: None,
            ..TypeEntry::binding("com.example.Broken", order_layout())
        };
        assert!(matches!(
            no_layout.to_binding(),
            Err(ArtifactError::MissingLayout(name)) if name == "com.example.Broken"
        ));

        let bad_name = TypeEntry::binding("com.example.Order[x]", order_layout());
        assert!(matches!(
            bad_name.to_binding(),
            Err(ArtifactError::InvalidName(_))
        ));

        let bad_layout =
            TypeEntry::binding("com.example.Empty", FieldLayout::group("Empty", Vec::new()));
        assert!(matches!(
            bad_layout.to_binding(),
            Err(ArtifactError::InvalidLayout { .. })
        ));
    }
}
