//! Plugin metadata: typed access over JSON descriptor dictionaries plus
//! discovery across a search path.
//!
//! A [`PluginMetaData`] wraps the descriptor embedded in (or shipped next
//! to) a loadable module, or carried by a statically linked plugin. Parse
//! failures never propagate as errors out of discovery; they produce values
//! for which [`PluginMetaData::is_valid`] is false, with diagnostics on the
//! log.

use std::path::PathBuf;

use thiserror::Error;

mod finder;
mod loader;
mod locale;
mod metadata;
mod mime;

pub use finder::{find_plugin_by_id, find_plugins, PluginFilter};
pub use loader::{ManifestLoader, PluginLoader, ProbedModule, StaticPlugin};
pub use locale::{read_translated_string, LocaleChain};
pub use metadata::{Contributor, MetaDataOption, PluginMetaData};
pub use mime::{MimeDatabase, StaticMimeDatabase};

/// The descriptor dictionary type.
pub type JsonObject = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Error)]
pub enum MetaDataError {
    #[error("couldn't open {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("error parsing {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
