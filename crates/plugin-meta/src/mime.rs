use std::collections::{HashMap, HashSet, VecDeque};

/// Boundary to the host MIME-inheritance facility.
///
/// When no database is available, callers degrade to literal matching (see
/// [`PluginMetaData::supports_mime_type`](crate::PluginMetaData::supports_mime_type)).
pub trait MimeDatabase {
    /// Whether `mime` is `ancestor` or a subtype of it.
    fn inherits(&self, mime: &str, ancestor: &str) -> bool;
}

/// Map-backed database where every type lists its direct parents. Unknown
/// types inherit nothing.
#[derive(Clone, Debug, Default)]
pub struct StaticMimeDatabase {
    parents: HashMap<String, Vec<String>>,
}

impl StaticMimeDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_parent(&mut self, mime: &str, parent: &str) {
        self.parents
            .entry(mime.to_string())
            .or_default()
            .push(parent.to_string());
    }
}

impl MimeDatabase for StaticMimeDatabase {
    fn inherits(&self, mime: &str, ancestor: &str) -> bool {
        let mut queue = VecDeque::from([mime]);
        let mut visited = HashSet::new();
        while let Some(current) = queue.pop_front() {
            if current == ancestor {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(parents) = self.parents.get(current) {
                queue.extend(parents.iter().map(String::as_str));
            }
        }
        false
    }
}
