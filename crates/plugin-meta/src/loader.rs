use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;

use crate::JsonObject;

/// Descriptor and resolved location reported by a module probe.
#[derive(Clone, Debug)]
pub struct ProbedModule {
    pub metadata: JsonObject,
    pub resolved_path: PathBuf,
}

/// A plugin compiled into the host binary, discoverable through the loader's
/// registry rather than a filesystem scan. Carries its own descriptor and
/// the file name it advertises for diagnostics and id derivation.
#[derive(Clone, Debug)]
pub struct StaticPlugin {
    file_name: PathBuf,
    metadata: Arc<JsonObject>,
}

impl StaticPlugin {
    pub fn new(file_name: impl Into<PathBuf>, metadata: JsonObject) -> Self {
        Self {
            file_name: file_name.into(),
            metadata: Arc::new(metadata),
        }
    }

    pub fn metadata(&self) -> &JsonObject {
        &self.metadata
    }

    pub fn file_name(&self) -> &Path {
        &self.file_name
    }
}

/// Boundary to the ambient module loader. Probing extracts the embedded
/// descriptor without ever executing module code.
pub trait PluginLoader {
    /// Whether `path` names something this loader could load as a module.
    fn is_loadable_module(&self, path: &Path) -> bool;

    /// Extract the embedded descriptor. `None` when the file is missing, is
    /// not a module, or carries no descriptor. Implementations may resolve
    /// platform decorations (extensions, library prefixes) along the way.
    fn probe(&self, path: &Path) -> Option<ProbedModule>;

    /// Statically linked plugins registered under `namespace`.
    fn static_plugins(&self, namespace: &str) -> Vec<StaticPlugin>;

    /// The host's library search path.
    fn library_paths(&self) -> Vec<PathBuf>;

    /// The directory of the running application; it takes precedence over
    /// every entry of [`library_paths`](Self::library_paths).
    fn application_dir(&self) -> PathBuf;
}

/// Loader over on-disk `.json` descriptor manifests.
///
/// Each manifest stands in for a loadable module: the file itself is the
/// descriptor blob. Static plugins are registered programmatically per
/// namespace.
#[derive(Clone, Debug, Default)]
pub struct ManifestLoader {
    application_dir: PathBuf,
    library_paths: Vec<PathBuf>,
    static_plugins: HashMap<String, Vec<StaticPlugin>>,
}

impl ManifestLoader {
    pub fn new(application_dir: impl Into<PathBuf>) -> Self {
        Self {
            application_dir: application_dir.into(),
            ..Self::default()
        }
    }

    pub fn add_library_path(&mut self, path: impl Into<PathBuf>) {
        self.library_paths.push(path.into());
    }

    pub fn register_static_plugin(&mut self, namespace: &str, plugin: StaticPlugin) {
        self.static_plugins
            .entry(namespace.to_string())
            .or_default()
            .push(plugin);
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.extension().is_some() {
            path.to_path_buf()
        } else {
            path.with_extension("json")
        }
    }
}

impl PluginLoader for ManifestLoader {
    fn is_loadable_module(&self, path: &Path) -> bool {
        path.extension().is_some_and(|ext| ext == "json")
    }

    fn probe(&self, path: &Path) -> Option<ProbedModule> {
        let resolved = self.resolve(path);
        let text = match std::fs::read_to_string(&resolved) {
            Ok(text) => text,
            Err(err) => {
                tracing::debug!(path = %resolved.display(), %err, "couldn't read manifest");
                return None;
            }
        };
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(metadata)) => Some(ProbedModule {
                metadata,
                resolved_path: resolved,
            }),
            Ok(_) => {
                tracing::debug!(path = %resolved.display(), "manifest top level is not an object");
                None
            }
            Err(err) => {
                tracing::debug!(path = %resolved.display(), %err, "manifest is not valid JSON");
                None
            }
        }
    }

    fn static_plugins(&self, namespace: &str) -> Vec<StaticPlugin> {
        self.static_plugins
            .get(namespace)
            .cloned()
            .unwrap_or_default()
    }

    fn library_paths(&self) -> Vec<PathBuf> {
        self.library_paths.clone()
    }

    fn application_dir(&self) -> PathBuf {
        self.application_dir.clone()
    }
}
