use serde_json::Value;

use crate::JsonObject;

/// Locale tag fallback chain for translated descriptor fields.
///
/// `"de_DE"` looks up `Key[de_DE]`, then `Key[de]`, then the untagged `Key`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LocaleChain {
    tags: Vec<String>,
}

impl LocaleChain {
    /// Build the chain for one tag. Codeset suffixes (`de_DE.UTF-8`) are
    /// stripped; the `C` and `POSIX` locales yield the untagged-only chain.
    pub fn new(tag: &str) -> Self {
        let tag = tag.split('.').next().unwrap_or_default();
        if tag.is_empty() || tag == "C" || tag == "POSIX" {
            return Self::default();
        }
        let mut tags = Vec::new();
        let mut current = tag;
        loop {
            tags.push(current.to_string());
            match current.rfind(['_', '-']) {
                Some(pos) => current = &current[..pos],
                None => break,
            }
        }
        Self { tags }
    }

    /// The chain for the host environment (`LC_ALL`, `LC_MESSAGES`, `LANG`).
    pub fn system() -> Self {
        for var in ["LC_ALL", "LC_MESSAGES", "LANG"] {
            if let Ok(value) = std::env::var(var) {
                if !value.is_empty() {
                    return Self::new(&value);
                }
            }
        }
        Self::default()
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }
}

/// Read `key` from `object`, preferring localized variants (`Key[de]`) per
/// the chain and falling back to the untagged value.
pub fn read_translated_string(object: &JsonObject, key: &str, locale: &LocaleChain) -> String {
    for tag in locale.tags() {
        let tagged = format!("{key}[{tag}]");
        if let Some(value) = object.get(&tagged).and_then(Value::as_str) {
            return value.to_string();
        }
    }
    object
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
