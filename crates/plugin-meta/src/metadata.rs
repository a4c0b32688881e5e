use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::loader::{PluginLoader, StaticPlugin};
use crate::locale::{read_translated_string, LocaleChain};
use crate::mime::MimeDatabase;
use crate::{JsonObject, MetaDataError};

/// Reserved descriptor subobject holding the application-facing fields.
const ROOT_KEY: &str = "KPlugin";

/// Whether a descriptor-less module still yields a valid value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MetaDataOption {
    #[default]
    DoNotAllowEmptyMetaData,
    AllowEmptyMetaData,
}

/// One entry from the `Authors`/`Translators`/`OtherContributors` lists.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    pub name: String,
    pub email: String,
    pub website: String,
}

#[derive(Debug, Default)]
struct Inner {
    metadata: JsonObject,
    file_name: PathBuf,
    // Preserved for diagnostics when the requested file doesn't resolve.
    requested_file_name: PathBuf,
    option: MetaDataOption,
    static_plugin: Option<StaticPlugin>,
}

/// Descriptor wrapper for one plugin, dynamic or static.
///
/// Cheap to clone: the descriptor is immutable after construction and shared
/// between copies. Equality covers the file name and the descriptor only.
#[derive(Clone, Debug, Default)]
pub struct PluginMetaData {
    inner: Arc<Inner>,
}

impl PartialEq for PluginMetaData {
    fn eq(&self, other: &Self) -> bool {
        self.inner.file_name == other.inner.file_name
            && self.inner.metadata == other.inner.metadata
    }
}

impl Eq for PluginMetaData {}

fn absolute(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

impl PluginMetaData {
    /// Probe the module at `path` and wrap its embedded descriptor. Relative
    /// paths resolve against the loader's application directory. A missing
    /// descriptor yields an invalid value (diagnostic only).
    pub fn from_module(
        loader: &dyn PluginLoader,
        path: impl AsRef<Path>,
        option: MetaDataOption,
    ) -> Self {
        let requested = path.as_ref().to_path_buf();
        let candidate = if requested.is_absolute() {
            requested.clone()
        } else {
            loader.application_dir().join(&requested)
        };
        match loader.probe(&candidate) {
            Some(probed) => {
                if probed.metadata.is_empty()
                    && option == MetaDataOption::DoNotAllowEmptyMetaData
                {
                    tracing::debug!(
                        path = %requested.display(),
                        "module does not carry a descriptor object"
                    );
                }
                Self {
                    inner: Arc::new(Inner {
                        metadata: probed.metadata,
                        file_name: absolute(&probed.resolved_path),
                        requested_file_name: requested,
                        option,
                        static_plugin: None,
                    }),
                }
            }
            None => {
                tracing::debug!(path = %requested.display(), "no descriptor found in module");
                Self {
                    inner: Arc::new(Inner {
                        metadata: JsonObject::new(),
                        file_name: candidate,
                        requested_file_name: requested,
                        option,
                        static_plugin: None,
                    }),
                }
            }
        }
    }

    /// Wrap an in-memory descriptor.
    pub fn from_object(metadata: JsonObject, file_name: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Inner {
                metadata,
                file_name: file_name.into(),
                ..Inner::default()
            }),
        }
    }

    /// Wrap a statically linked plugin. The plugin's own descriptor wins;
    /// `fallback` is used when it carries none.
    pub fn from_static_plugin(
        plugin: StaticPlugin,
        fallback: JsonObject,
        option: MetaDataOption,
    ) -> Self {
        let metadata = if plugin.metadata().is_empty() {
            fallback
        } else {
            plugin.metadata().clone()
        };
        Self {
            inner: Arc::new(Inner {
                metadata,
                file_name: plugin.file_name().to_path_buf(),
                requested_file_name: PathBuf::new(),
                option,
                static_plugin: Some(plugin),
            }),
        }
    }

    /// Read a descriptor straight from a JSON file. Unreadable or malformed
    /// files yield an invalid value; the typed failure is available through
    /// [`try_from_json_file`](Self::try_from_json_file).
    pub fn from_json_file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::try_from_json_file(path) {
            Ok(metadata) => metadata,
            Err(err) => {
                tracing::warn!(%err, "couldn't load plugin metadata");
                Self {
                    inner: Arc::new(Inner {
                        metadata: JsonObject::new(),
                        file_name: absolute(path),
                        requested_file_name: path.to_path_buf(),
                        ..Inner::default()
                    }),
                }
            }
        }
    }

    pub fn try_from_json_file(path: impl AsRef<Path>) -> Result<Self, MetaDataError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| MetaDataError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let value: Value =
            serde_json::from_str(&text).map_err(|source| MetaDataError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        let metadata = match value {
            Value::Object(map) => map,
            _ => {
                tracing::warn!(path = %path.display(), "top-level JSON value is not an object");
                JsonObject::new()
            }
        };
        Ok(Self {
            inner: Arc::new(Inner {
                metadata,
                file_name: absolute(path),
                requested_file_name: path.to_path_buf(),
                ..Inner::default()
            }),
        })
    }

    // --- identity and validity ---

    /// The raw descriptor dictionary.
    pub fn raw_data(&self) -> &JsonObject {
        &self.inner.metadata
    }

    pub fn file_name(&self) -> &Path {
        &self.inner.file_name
    }

    pub fn requested_file_name(&self) -> &Path {
        &self.inner.requested_file_name
    }

    pub fn option(&self) -> MetaDataOption {
        self.inner.option
    }

    pub fn is_static_plugin(&self) -> bool {
        self.inner.static_plugin.is_some()
    }

    pub fn static_plugin(&self) -> Option<&StaticPlugin> {
        self.inner.static_plugin.as_ref()
    }

    /// A value is valid with an empty file name as long as the plugin id is
    /// set; an empty descriptor is only acceptable when the option allows it.
    pub fn is_valid(&self) -> bool {
        !self.plugin_id().is_empty()
            && (!self.inner.metadata.is_empty()
                || self.inner.option == MetaDataOption::AllowEmptyMetaData)
    }

    /// The dedup key for discovery: the descriptor's `Id` field, or failing
    /// that the file basename without extensions.
    pub fn plugin_id(&self) -> String {
        if let Some(id) = self.root_value("Id").and_then(Value::as_str) {
            if !id.is_empty() {
                return id.to_string();
            }
        }
        self.inner
            .file_name
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn is_hidden(&self) -> bool {
        self.root_bool("Hidden")
    }

    // --- typed accessors over the reserved subobject ---

    pub fn name(&self) -> String {
        self.name_with_locale(&LocaleChain::system())
    }

    pub fn name_with_locale(&self, locale: &LocaleChain) -> String {
        self.root_translated("Name", locale)
    }

    pub fn description(&self) -> String {
        self.description_with_locale(&LocaleChain::system())
    }

    pub fn description_with_locale(&self, locale: &LocaleChain) -> String {
        self.root_translated("Description", locale)
    }

    pub fn copyright_text(&self) -> String {
        self.copyright_text_with_locale(&LocaleChain::system())
    }

    pub fn copyright_text_with_locale(&self, locale: &LocaleChain) -> String {
        self.root_translated("Copyright", locale)
    }

    pub fn category(&self) -> String {
        self.root_string("Category")
    }

    pub fn icon_name(&self) -> String {
        self.root_string("Icon")
    }

    pub fn license(&self) -> String {
        self.root_string("License")
    }

    pub fn version(&self) -> String {
        self.root_string("Version")
    }

    pub fn website(&self) -> String {
        self.root_string("Website")
    }

    pub fn bug_report_url(&self) -> String {
        self.root_string("BugReportUrl")
    }

    pub fn authors(&self) -> Vec<Contributor> {
        contributors_from(self.root_value("Authors"))
    }

    pub fn translators(&self) -> Vec<Contributor> {
        contributors_from(self.root_value("Translators"))
    }

    pub fn other_contributors(&self) -> Vec<Contributor> {
        contributors_from(self.root_value("OtherContributors"))
    }

    pub fn mime_types(&self) -> Vec<String> {
        string_list(self.root_value("MimeTypes"))
    }

    pub fn form_factors(&self) -> Vec<String> {
        string_list(self.root_value("FormFactors"))
    }

    /// Literal match only; use
    /// [`supports_mime_type_with`](Self::supports_mime_type_with) when a
    /// MIME database is available.
    pub fn supports_mime_type(&self, mime_type: &str) -> bool {
        self.mime_types().iter().any(|m| m == mime_type)
    }

    pub fn supports_mime_type_with(&self, db: &dyn MimeDatabase, mime_type: &str) -> bool {
        let mimes = self.mime_types();
        // Exact matches first: skips the inheritance walk (and the database
        // initialization behind it) in the common case.
        if mimes.iter().any(|m| m == mime_type) {
            return true;
        }
        mimes.iter().any(|m| db.inherits(mime_type, m))
    }

    pub fn is_enabled_by_default(&self) -> bool {
        match self.root_value("EnabledByDefault") {
            Some(Value::Bool(enabled)) => *enabled,
            Some(Value::String(text)) => text == "true",
            _ => false,
        }
    }

    pub fn initial_preference(&self) -> i64 {
        self.root_value("InitialPreference")
            .and_then(Value::as_i64)
            .unwrap_or(0)
    }

    // --- untyped access to the outer dictionary ---

    pub fn value_string(&self, key: &str, default: &str) -> String {
        match self.inner.metadata.get(key) {
            Some(Value::String(text)) => text.clone(),
            Some(Value::Array(values)) => {
                tracing::warn!(
                    key,
                    "expected JSON property to be a single string, but it is a list"
                );
                values
                    .iter()
                    .map(scalar_to_string)
                    .collect::<Vec<_>>()
                    .join(",")
            }
            Some(Value::Bool(flag)) => {
                tracing::warn!(
                    key,
                    "expected JSON property to be a single string, but it is a bool"
                );
                flag.to_string()
            }
            _ => default.to_string(),
        }
    }

    pub fn value_bool(&self, key: &str, default: bool) -> bool {
        match self.inner.metadata.get(key) {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::String(text)) => text == "true",
            None | Some(Value::Null) => default,
            Some(_) => {
                tracing::warn!(key, "expected JSON property to be a bool");
                default
            }
        }
    }

    pub fn value_int(&self, key: &str, default: i64) -> i64 {
        match self.inner.metadata.get(key) {
            Some(Value::Number(number)) => number.as_i64().unwrap_or(default),
            Some(Value::String(text)) => match text.parse() {
                Ok(parsed) => parsed,
                Err(_) => {
                    tracing::warn!(
                        key,
                        value = %text,
                        "expected JSON property to be an int"
                    );
                    default
                }
            },
            None | Some(Value::Null) => default,
            Some(_) => {
                tracing::warn!(key, "expected JSON property to be an int");
                default
            }
        }
    }

    pub fn value_string_list(&self, key: &str, default: &[String]) -> Vec<String> {
        match self.inner.metadata.get(key) {
            None | Some(Value::Null) => default.to_vec(),
            Some(Value::Object(_)) => {
                tracing::warn!(
                    key,
                    "expected JSON property to be a string list, found an object"
                );
                default.to_vec()
            }
            Some(Value::Array(values)) => values.iter().map(scalar_to_string).collect(),
            Some(other) => {
                let text = scalar_to_string(other);
                if text.is_empty() {
                    return default.to_vec();
                }
                tracing::debug!(
                    key,
                    "expected JSON property to be a string list, treating it as a single entry"
                );
                vec![text]
            }
        }
    }

    // --- helpers ---

    fn root_object(&self) -> Option<&JsonObject> {
        self.inner.metadata.get(ROOT_KEY).and_then(Value::as_object)
    }

    fn root_value(&self, key: &str) -> Option<&Value> {
        self.root_object().and_then(|object| object.get(key))
    }

    fn root_string(&self, key: &str) -> String {
        self.root_value(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    fn root_bool(&self, key: &str) -> bool {
        self.root_value(key).and_then(Value::as_bool).unwrap_or(false)
    }

    fn root_translated(&self, key: &str, locale: &LocaleChain) -> String {
        self.root_object()
            .map(|object| read_translated_string(object, key, locale))
            .unwrap_or_default()
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        _ => String::new(),
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(values)) => values
            .iter()
            .map(scalar_to_string)
            .filter(|text| !text.is_empty())
            .collect(),
        Some(Value::String(text)) if !text.is_empty() => vec![text.clone()],
        _ => Vec::new(),
    }
}

fn contributor_from_object(object: &JsonObject) -> Option<Contributor> {
    let name = read_translated_string(object, "Name", &LocaleChain::system());
    if name.is_empty() {
        tracing::warn!("dropping contributor entry without a 'Name' property");
        return None;
    }
    let field = |key: &str| {
        object
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    Some(Contributor {
        name,
        email: field("Email"),
        website: field("Website"),
    })
}

fn contributors_from(value: Option<&Value>) -> Vec<Contributor> {
    match value {
        // A single person may appear without the enclosing array.
        Some(Value::Object(object)) => contributor_from_object(object).into_iter().collect(),
        Some(Value::Array(values)) => values
            .iter()
            .filter_map(Value::as_object)
            .filter_map(contributor_from_object)
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StaticMimeDatabase;
    use serde_json::json;

    fn object(value: Value) -> JsonObject {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected a JSON object"),
        }
    }

    fn sample() -> PluginMetaData {
        PluginMetaData::from_object(
            object(json!({
                "KPlugin": {
                    "Id": "markdownpreview",
                    "Name": "Markdown Preview",
                    "Name[de]": "Markdown-Vorschau",
                    "Description": "Renders Markdown documents",
                    "Category": "Viewers",
                    "Icon": "text-markdown",
                    "License": "MIT",
                    "Version": "1.2.0",
                    "Website": "https://example.org",
                    "BugReportUrl": "https://example.org/bugs",
                    "EnabledByDefault": true,
                    "InitialPreference": 7,
                    "MimeTypes": ["text/markdown"],
                    "FormFactors": ["desktop", "tablet"],
                    "Authors": [
                        { "Name": "Jo Doe", "Email": "jo@example.org" },
                        { "Email": "anonymous@example.org" }
                    ],
                    "Translators": { "Name": "Solo Translator" }
                },
                "X-Custom-Key": "custom",
                "X-Custom-List": ["a", "b"],
                "X-Custom-Flag": true,
                "X-Custom-Number": 3,
                "X-Custom-NumberString": "17",
                "X-Custom-BadNumber": "not a number"
            })),
            "/usr/lib/plugins/markdownpreview.so",
        )
    }

    #[test]
    fn test_typed_accessors() {
        let md = sample();
        assert!(md.is_valid());
        assert_eq!(md.plugin_id(), "markdownpreview");
        assert_eq!(md.name_with_locale(&LocaleChain::new("fr")), "Markdown Preview");
        assert_eq!(
            md.name_with_locale(&LocaleChain::new("de_DE")),
            "Markdown-Vorschau"
        );
        assert_eq!(md.description_with_locale(&LocaleChain::default()), "Renders Markdown documents");
        assert_eq!(md.category(), "Viewers");
        assert_eq!(md.icon_name(), "text-markdown");
        assert_eq!(md.license(), "MIT");
        assert_eq!(md.version(), "1.2.0");
        assert_eq!(md.website(), "https://example.org");
        assert_eq!(md.bug_report_url(), "https://example.org/bugs");
        assert!(md.is_enabled_by_default());
        assert_eq!(md.initial_preference(), 7);
        assert_eq!(md.form_factors(), ["desktop", "tablet"]);
        assert!(!md.is_hidden());
        assert!(!md.is_static_plugin());
    }

    #[test]
    fn test_plugin_id_falls_back_to_basename() {
        let md = PluginMetaData::from_object(
            object(json!({ "KPlugin": { "Name": "No id" } })),
            "/opt/plugins/fancy.plugin.so",
        );
        assert_eq!(md.plugin_id(), "fancy.plugin");

        // No id and no file name: invalid.
        let md = PluginMetaData::from_object(object(json!({ "KPlugin": {} })), "");
        assert_eq!(md.plugin_id(), "");
        assert!(!md.is_valid());
    }

    #[test]
    fn test_validity_depends_on_option() {
        let empty_allowed = PluginMetaData::from_static_plugin(
            StaticPlugin::new("builtin", JsonObject::new()),
            JsonObject::new(),
            MetaDataOption::AllowEmptyMetaData,
        );
        assert!(empty_allowed.is_valid()); // id derived from the file name

        let empty_denied = PluginMetaData::from_static_plugin(
            StaticPlugin::new("builtin", JsonObject::new()),
            JsonObject::new(),
            MetaDataOption::DoNotAllowEmptyMetaData,
        );
        assert!(!empty_denied.is_valid());
    }

    #[test]
    fn test_static_plugin_descriptor_wins_over_fallback() {
        let carried = object(json!({ "KPlugin": { "Id": "carried" } }));
        let fallback = object(json!({ "KPlugin": { "Id": "fallback" } }));
        let md = PluginMetaData::from_static_plugin(
            StaticPlugin::new("builtin", carried),
            fallback.clone(),
            MetaDataOption::DoNotAllowEmptyMetaData,
        );
        assert!(md.is_static_plugin());
        assert_eq!(md.plugin_id(), "carried");

        let md = PluginMetaData::from_static_plugin(
            StaticPlugin::new("builtin", JsonObject::new()),
            fallback,
            MetaDataOption::DoNotAllowEmptyMetaData,
        );
        assert_eq!(md.plugin_id(), "fallback");
    }

    #[test]
    fn test_enabled_by_default_accepts_string_form() {
        for (value, expected) in [
            (json!(true), true),
            (json!(false), false),
            (json!("true"), true),
            (json!("false"), false),
            (json!(1), false),
        ] {
            let md = PluginMetaData::from_object(
                object(json!({ "KPlugin": { "Id": "x", "EnabledByDefault": value } })),
                "",
            );
            assert_eq!(md.is_enabled_by_default(), expected);
        }
    }

    #[test]
    fn test_contributors_drop_nameless_entries() {
        let md = sample();
        let authors = md.authors();
        assert_eq!(authors.len(), 1);
        assert_eq!(authors[0].name, "Jo Doe");
        assert_eq!(authors[0].email, "jo@example.org");

        // Single object is promoted to a one-element list.
        let translators = md.translators();
        assert_eq!(translators.len(), 1);
        assert_eq!(translators[0].name, "Solo Translator");

        assert!(md.other_contributors().is_empty());
    }

    #[test]
    fn test_mime_matching() {
        let md = sample();
        assert!(md.supports_mime_type("text/markdown"));
        assert!(!md.supports_mime_type("text/x-commonmark"));

        let mut db = StaticMimeDatabase::new();
        db.add_parent("text/x-commonmark", "text/markdown");
        assert!(md.supports_mime_type_with(&db, "text/x-commonmark"));
        assert!(md.supports_mime_type_with(&db, "text/markdown"));
        assert!(!md.supports_mime_type_with(&db, "image/png"));
    }

    #[test]
    fn test_value_family_coercions() {
        let md = sample();
        assert_eq!(md.value_string("X-Custom-Key", "fallback"), "custom");
        assert_eq!(md.value_string("X-Missing", "fallback"), "fallback");
        assert_eq!(md.value_string("X-Custom-List", ""), "a,b");
        assert_eq!(md.value_string("X-Custom-Flag", ""), "true");

        assert!(md.value_bool("X-Custom-Flag", false));
        assert!(!md.value_bool("X-Custom-Key", false)); // "custom" != "true"
        assert!(md.value_bool("X-Missing", true));
        // Shape mismatches fall back to the default.
        assert!(!md.value_bool("X-Custom-List", false));
        assert!(md.value_bool("X-Custom-Number", true));

        assert_eq!(md.value_int("X-Custom-Number", 0), 3);
        assert_eq!(md.value_int("X-Custom-NumberString", 0), 17);
        assert_eq!(md.value_int("X-Custom-BadNumber", 9), 9);
        assert_eq!(md.value_int("X-Missing", -1), -1);
        assert_eq!(md.value_int("X-Custom-Flag", 5), 5);
        assert_eq!(md.value_int("X-Custom-List", 5), 5);

        assert_eq!(
            md.value_string_list("X-Custom-List", &[]),
            vec!["a".to_string(), "b".to_string()]
        );
        // A lone string is treated as a single-entry list.
        assert_eq!(
            md.value_string_list("X-Custom-Key", &[]),
            vec!["custom".to_string()]
        );
        let default = vec!["d".to_string()];
        assert_eq!(md.value_string_list("X-Missing", &default), default);
    }

    #[test]
    fn test_equality_ignores_option_and_static_handle() {
        let dict = object(json!({ "KPlugin": { "Id": "same" } }));
        let a = PluginMetaData::from_object(dict.clone(), "/p/same.so");
        let b = PluginMetaData::from_object(dict.clone(), "/p/same.so");
        let c = PluginMetaData::from_object(dict.clone(), "/p/other.so");
        assert_eq!(a, a); // reflexive
        assert_eq!(a, b);
        assert_eq!(b, a); // symmetric
        assert_ne!(a, c);

        let d = PluginMetaData::from_static_plugin(
            StaticPlugin::new("/p/same.so", dict),
            JsonObject::new(),
            MetaDataOption::AllowEmptyMetaData,
        );
        assert_eq!(a, d); // static handle and option don't participate
    }
}
