//! Isolated loading of binding artifacts.
//!
//! Each artifact is loaded into its own [`ArtifactContext`]: a private scope
//! of type definitions layered over a shared parent scope. Names resolve in
//! the artifact's own scope first, so two artifacts defining the same type
//! name never see each other's definition.
//!
//! Building a context parses and validates the whole artifact, so the
//! [`LoaderManager`] keeps the context it installed for the current thread
//! and reuses it while the same artifact is requested.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::artifact::ArtifactManifest;
use crate::composite::CompositeIdentifier;
use crate::error::{Cob2RowError, Result};
use crate::layout::Binding;

static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static ACTIVE: RefCell<Option<ActiveContext>> = const { RefCell::new(None) };
}

struct ActiveContext {
    manager_id: u64,
    context: Arc<ArtifactContext>,
}

/// A named scope of type definitions.
#[derive(Debug, Default)]
pub struct BindingRegistry {
    name: String,
    types: HashMap<String, RegisteredType>,
}

#[derive(Debug)]
struct RegisteredType {
    binding: Option<Binding>,
}

impl BindingRegistry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            types: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers a binding root compiled into the host.
    pub fn register(&mut self, binding: Binding) -> Option<Binding> {
        self.types
            .insert(
                binding.name().to_string(),
                RegisteredType {
                    binding: Some(binding),
                },
            )
            .and_then(|previous| previous.binding)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    fn from_manifest(name: &str, manifest: ArtifactManifest) -> Result<Self> {
        let mut registry = Self::new(name);
        for entry in manifest.types {
            let binding = entry
                .to_binding()
                .map_err(|err| Cob2RowError::loader_install(name, err))?;
            registry.types.insert(entry.name, RegisteredType { binding });
        }
        Ok(registry)
    }
}

/// The loaded form of one artifact.
#[derive(Debug)]
pub struct ArtifactContext {
    artifact: String,
    scope: BindingRegistry,
    parent: Arc<BindingRegistry>,
}

impl ArtifactContext {
    pub fn artifact(&self) -> &str {
        &self.artifact
    }

    /// Whether `name` resolves in this context, own scope first.
    pub fn resolves(&self, name: &str) -> bool {
        self.scope.contains(name) || self.parent.contains(name)
    }

    /// Whether `name` is defined by the artifact itself rather than the
    /// parent scope.
    pub fn defines(&self, name: &str) -> bool {
        self.scope.contains(name)
    }

    /// Instantiates the binding registered under `name`.
    pub fn new_binding(&self, name: &str) -> Result<Binding> {
        resolve_binding(name, [&self.scope, self.parent.as_ref()])
    }
}

fn resolve_binding<'a>(
    name: &str,
    scopes: impl IntoIterator<Item = &'a BindingRegistry>,
) -> Result<Binding> {
    for scope in scopes {
        if let Some(entry) = scope.types.get(name) {
            return entry.binding.clone().ok_or_else(|| {
                Cob2RowError::configuration(format!(
                    "type {name} in {} is not a COBOL binding",
                    scope.name()
                ))
            });
        }
    }
    Err(Cob2RowError::configuration(format!(
        "no binding named {name} is available"
    )))
}

/// Thread state of a [`LoaderManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextState {
    Unset,
    Installed(String),
}

/// Loads artifacts from the user folder and tracks which one is installed
/// on each thread.
#[derive(Debug)]
pub struct LoaderManager {
    id: u64,
    user_folder: PathBuf,
    parent: Arc<BindingRegistry>,
    installs: AtomicUsize,
}

impl LoaderManager {
    pub fn new(user_folder: impl Into<PathBuf>, parent: Arc<BindingRegistry>) -> Self {
        Self {
            id: NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed),
            user_folder: user_folder.into(),
            parent,
            installs: AtomicUsize::new(0),
        }
    }

    pub fn user_folder(&self) -> &Path {
        &self.user_folder
    }

    pub fn parent(&self) -> &Arc<BindingRegistry> {
        &self.parent
    }

    /// Builds a fresh context for `artifact` without installing it.
    pub fn load_context(&self, artifact: &str) -> Result<Arc<ArtifactContext>> {
        if Path::new(artifact).file_name() != Some(OsStr::new(artifact)) {
            return Err(Cob2RowError::loader_install(
                artifact,
                "artifact must be named by a plain file name in the user folder",
            ));
        }
        let path = self.user_folder.join(artifact);
        if !path.is_file() {
            return Err(Cob2RowError::loader_install(
                artifact,
                format!("{} not found", path.display()),
            ));
        }
        let manifest = ArtifactManifest::read(&path)
            .map_err(|reason| Cob2RowError::loader_install(artifact, reason))?;
        let scope = BindingRegistry::from_manifest(&format!("cob2row.lib.{artifact}"), manifest)?;
        tracing::debug!(artifact, types = scope.len(), "loaded artifact context");
        Ok(Arc::new(ArtifactContext {
            artifact: artifact.to_string(),
            scope,
            parent: Arc::clone(&self.parent),
        }))
    }

    /// Makes `artifact`'s context the current one for this thread.
    ///
    /// Does nothing when `artifact` is absent or empty, or when the same
    /// artifact is already installed by this manager.
    pub fn ensure_context(&self, artifact: Option<&str>) -> Result<()> {
        let Some(artifact) = artifact.filter(|a| !a.is_empty()) else {
            return Ok(());
        };
        if self.state() == ContextState::Installed(artifact.to_string()) {
            return Ok(());
        }

        let context = self.load_context(artifact)?;
        self.installs.fetch_add(1, Ordering::Relaxed);
        ACTIVE.with(|active| {
            *active.borrow_mut() = Some(ActiveContext {
                manager_id: self.id,
                context,
            });
        });
        tracing::debug!(artifact, "installed artifact context on current thread");
        Ok(())
    }

    pub fn state(&self) -> ContextState {
        match self.active_context() {
            Some(context) => ContextState::Installed(context.artifact.clone()),
            None => ContextState::Unset,
        }
    }

    /// The context this manager installed on the current thread, if any.
    pub fn active_context(&self) -> Option<Arc<ArtifactContext>> {
        ACTIVE.with(|active| {
            active
                .borrow()
                .as_ref()
                .filter(|a| a.manager_id == self.id)
                .map(|a| Arc::clone(&a.context))
        })
    }

    /// Removes this manager's context from the current thread.
    pub fn clear_context(&self) {
        ACTIVE.with(|active| {
            let mut active = active.borrow_mut();
            if active.as_ref().is_some_and(|a| a.manager_id == self.id) {
                *active = None;
            }
        });
    }

    /// Number of contexts this manager has built and installed.
    pub fn install_count(&self) -> usize {
        self.installs.load(Ordering::Relaxed)
    }

    /// Installs the artifact named by `id` on this thread and instantiates
    /// its binding. Bare identifiers resolve in the parent scope.
    pub fn new_binding(&self, id: &CompositeIdentifier) -> Result<Binding> {
        match id.artifact().filter(|a| !a.is_empty()) {
            Some(artifact) => {
                self.ensure_context(Some(artifact))?;
                let context = self.active_context().ok_or_else(|| {
                    Cob2RowError::loader_install(artifact, "context was not installed")
                })?;
                context.new_binding(id.identifier())
            }
            None => resolve_binding(id.identifier(), [self.parent.as_ref()]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::TypeEntry;
    use crate::layout::{FieldLayout, Picture};
    use crate::test_util::order_layout;

    fn write_artifact(dir: &Path, name: &str, types: Vec<TypeEntry>) {
        ArtifactManifest::new(types)
            .save(&dir.join(name))
            .expect("artifact should be written");
    }

    fn text_layout(length: usize) -> FieldLayout {
        FieldLayout::group(
            "Rec",
            vec![FieldLayout::leaf("text", Picture::Alphanumeric { length })],
        )
    }

    #[test]
    fn ensure_context_installs_once_per_artifact() {
        let tmp = tempfile::tempdir().expect("tempdir should be created");
        write_artifact(
            tmp.path(),
            "orders.jar",
            vec![TypeEntry::binding("com.example.Order", order_layout())],
        );
        let manager = LoaderManager::new(tmp.path(), Arc::new(BindingRegistry::new("host")));
        assert_eq!(manager.state(), ContextState::Unset);

        manager.ensure_context(Some("orders.jar")).unwrap();
        manager.ensure_context(Some("orders.jar")).unwrap();
        assert_eq!(manager.install_count(), 1);
        assert_eq!(
            manager.state(),
            ContextState::Installed("orders.jar".to_string())
        );

        manager.clear_context();
        assert_eq!(manager.state(), ContextState::Unset);
    }

    #[test]
    fn absent_artifact_is_a_no_op() {
        let tmp = tempfile::tempdir().expect("tempdir should be created");
        let manager = LoaderManager::new(tmp.path(), Arc::new(BindingRegistry::new("host")));
        manager.ensure_context(None).unwrap();
        manager.ensure_context(Some("")).unwrap();
        assert_eq!(manager.install_count(), 0);
        assert_eq!(manager.state(), ContextState::Unset);
    }

    #[test]
    fn missing_or_corrupt_artifact_fails_install() {
        let tmp = tempfile::tempdir().expect("tempdir should be created");
        std::fs::write(tmp.path().join("broken.jar"), b"not json").unwrap();
        let manager = LoaderManager::new(tmp.path(), Arc::new(BindingRegistry::new("host")));

        assert!(matches!(
            manager.ensure_context(Some("absent.jar")),
            Err(Cob2RowError::LoaderInstall { .. })
        ));
        assert!(matches!(
            manager.ensure_context(Some("broken.jar")),
            Err(Cob2RowError::LoaderInstall { .. })
        ));
        assert_eq!(manager.state(), ContextState::Unset);
    }

    #[test]
    fn artifact_outside_user_folder_is_refused() {
        let user = tempfile::tempdir().expect("tempdir should be created");
        let elsewhere = tempfile::tempdir().expect("tempdir should be created");
        write_artifact(
            elsewhere.path(),
            "evil.jar",
            vec![TypeEntry::binding("com.example.Order", order_layout())],
        );
        let manager = LoaderManager::new(
            user.path().join("user"),
            Arc::new(BindingRegistry::new("host")),
        );
        std::fs::create_dir_all(manager.user_folder()).unwrap();
        write_artifact(
            user.path(),
            "sibling.jar",
            vec![TypeEntry::binding("com.example.Order", order_layout())],
        );

        let absolute = elsewhere.path().join("evil.jar");
        for name in [
            absolute.to_string_lossy().into_owned(),
            "../sibling.jar".to_string(),
            "nested/evil.jar".to_string(),
            "..".to_string(),
        ] {
            assert!(
                matches!(
                    manager.ensure_context(Some(name.as_str())),
                    Err(Cob2RowError::LoaderInstall { .. })
                ),
                "{name} should be refused"
            );
        }
        assert_eq!(manager.state(), ContextState::Unset);
        assert_eq!(manager.install_count(), 0);
    }

    #[test]
    fn one_broken_binding_fails_the_artifact() {
        let tmp = tempfile::tempdir().expect("tempdir should be created");
        write_artifact(
            tmp.path(),
            "mixed.jar",
            vec![
                TypeEntry::binding("com.example.Good", order_layout()),
                TypeEntry {
                    layout: None,
                    ..TypeEntry::binding("com.example.Broken", order_layout())
                },
            ],
        );
        let manager = LoaderManager::new(tmp.path(), Arc::new(BindingRegistry::new("host")));
        let err = manager
            .new_binding(&CompositeIdentifier::new("com.example.Good", "mixed.jar"))
            .unwrap_err();
        assert!(matches!(err, Cob2RowError::LoaderInstall { .. }));
        assert!(err.to_string().contains("com.example.Broken has no layout"), "{err}");
    }

    #[test]
    fn same_name_resolves_to_own_artifact() {
        let tmp = tempfile::tempdir().expect("tempdir should be created");
        write_artifact(
            tmp.path(),
            "a.jar",
            vec![TypeEntry::binding("com.example.Rec", text_layout(3))],
        );
        write_artifact(
            tmp.path(),
            "b.jar",
            vec![TypeEntry::binding("com.example.Rec", text_layout(7))],
        );
        let manager = LoaderManager::new(tmp.path(), Arc::new(BindingRegistry::new("host")));

        let a = manager
            .new_binding(&CompositeIdentifier::new("com.example.Rec", "a.jar"))
            .unwrap();
        let b = manager
            .new_binding(&CompositeIdentifier::new("com.example.Rec", "b.jar"))
            .unwrap();
        let a_again = manager
            .new_binding(&CompositeIdentifier::new("com.example.Rec", "a.jar"))
            .unwrap();
        assert_eq!(a.byte_length(), 3);
        assert_eq!(b.byte_length(), 7);
        assert_eq!(a_again.byte_length(), 3);
        assert_eq!(manager.install_count(), 3);
    }

    #[test]
    fn artifact_scope_shadows_parent_and_falls_back() {
        let tmp = tempfile::tempdir().expect("tempdir should be created");
        write_artifact(
            tmp.path(),
            "a.jar",
            vec![
                TypeEntry::binding("com.example.Rec", text_layout(3)),
                TypeEntry {
                    name: "com.example.Helper".to_string(),
                    markers: Vec::new(),
                    layout: None,
                },
            ],
        );
        let mut host = BindingRegistry::new("host");
        host.register(Binding::new("com.example.Rec", text_layout(9)).unwrap());
        host.register(Binding::new("com.example.Shared", text_layout(5)).unwrap());
        let manager = LoaderManager::new(tmp.path(), Arc::new(host));

        let context = manager.load_context("a.jar").unwrap();
        assert_eq!(context.new_binding("com.example.Rec").unwrap().byte_length(), 3);
        assert_eq!(context.new_binding("com.example.Shared").unwrap().byte_length(), 5);
        assert!(context.defines("com.example.Helper"));
        assert!(matches!(
            context.new_binding("com.example.Helper"),
            Err(Cob2RowError::Configuration(_))
        ));
        // Loading explicitly never touches thread state.
        assert_eq!(manager.state(), ContextState::Unset);

        let bare = manager
            .new_binding(&CompositeIdentifier::bare("com.example.Rec"))
            .unwrap();
        assert_eq!(bare.byte_length(), 9);
    }

    #[test]
    fn threads_keep_independent_contexts() {
        let tmp = tempfile::tempdir().expect("tempdir should be created");
        write_artifact(
            tmp.path(),
            "a.jar",
            vec![TypeEntry::binding("com.example.Rec", text_layout(3))],
        );
        write_artifact(
            tmp.path(),
            "b.jar",
            vec![TypeEntry::binding("com.example.Rec", text_layout(7))],
        );
        let manager = Arc::new(LoaderManager::new(
            tmp.path(),
            Arc::new(BindingRegistry::new("host")),
        ));
        manager.ensure_context(Some("a.jar")).unwrap();

        let worker = Arc::clone(&manager);
        let other = std::thread::spawn(move || {
            assert_eq!(worker.state(), ContextState::Unset);
            worker.ensure_context(Some("b.jar")).unwrap();
            worker.state()
        })
        .join()
        .expect("worker thread should finish");

        assert_eq!(other, ContextState::Installed("b.jar".to_string()));
        assert_eq!(manager.state(), ContextState::Installed("a.jar".to_string()));
        assert_eq!(manager.install_count(), 2);
    }
}
