use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::loader::PluginLoader;
use crate::metadata::{MetaDataOption, PluginMetaData};

/// Caller-supplied predicate narrowing discovery results.
pub type PluginFilter<'a> = &'a dyn Fn(&PluginMetaData) -> bool;

/// Discover every plugin under `directory`.
///
/// Static plugins registered under `directory` as a namespace come first and
/// are exempt from deduplication. The dynamic pass then walks the search
/// path (see [`search_dirs`]); within it the first module carrying a given
/// plugin id wins and later ones are dropped, which lets an entry earlier in
/// the search path shadow a stale copy further down.
pub fn find_plugins(
    loader: &dyn PluginLoader,
    directory: &str,
    option: MetaDataOption,
    filter: Option<PluginFilter<'_>>,
) -> Vec<PluginMetaData> {
    let accepts = |md: &PluginMetaData| filter.map_or(true, |f| f(md));
    let mut plugins = Vec::new();

    for plugin in loader.static_plugins(directory) {
        let md = PluginMetaData::from_static_plugin(plugin, Default::default(), option);
        if md.is_valid() && accepts(&md) {
            plugins.push(md);
        }
    }

    let mut seen_ids: HashSet<String> = HashSet::new();
    for dir in search_dirs(loader, directory) {
        for path in files_in(&dir) {
            if !loader.is_loadable_module(&path) {
                continue;
            }
            let md = PluginMetaData::from_module(loader, &path, option);
            if !md.is_valid() {
                tracing::debug!(
                    path = %path.display(),
                    "skipping module without usable metadata"
                );
                continue;
            }
            if seen_ids.contains(&md.plugin_id()) {
                continue;
            }
            if accepts(&md) {
                seen_ids.insert(md.plugin_id());
                plugins.push(md);
            }
        }
    }

    plugins
}

/// Locate one plugin by id without scanning whole directories: the id is
/// tried as a file name in each search dir, then against the static
/// registry. Only descriptors whose `Id` field matches count; a basename
/// coincidence is not a hit. Returns an invalid value when nothing matches.
pub fn find_plugin_by_id(loader: &dyn PluginLoader, directory: &str, plugin_id: &str) -> PluginMetaData {
    for dir in search_dirs(loader, directory) {
        let md = PluginMetaData::from_module(
            loader,
            dir.join(plugin_id),
            MetaDataOption::DoNotAllowEmptyMetaData,
        );
        if md.is_valid() && md.plugin_id() == plugin_id {
            return md;
        }
    }
    for plugin in loader.static_plugins(directory) {
        let md = PluginMetaData::from_static_plugin(
            plugin,
            Default::default(),
            MetaDataOption::DoNotAllowEmptyMetaData,
        );
        if md.is_valid() && md.plugin_id() == plugin_id {
            return md;
        }
    }
    PluginMetaData::default()
}

/// The directories a dynamic scan visits, in priority order. An absolute
/// `directory` is searched as-is; a relative one is joined onto each library
/// path, with the application's own directory promoted to the front.
fn search_dirs(loader: &dyn PluginLoader, directory: &str) -> Vec<PathBuf> {
    let requested = Path::new(directory);
    if requested.is_absolute() {
        return vec![requested.to_path_buf()];
    }
    let app_dir = loader.application_dir();
    let mut paths = loader.library_paths();
    paths.retain(|path| *path != app_dir);
    paths.insert(0, app_dir);
    paths
        .into_iter()
        .map(|path| path.join(requested))
        .collect()
}

/// Regular files in `dir`, sorted by name for deterministic scan order.
fn files_in(dir: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    files.sort();
    files
}
