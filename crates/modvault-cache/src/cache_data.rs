use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A flat `string -> any` map used to record per-memo bookkeeping
/// (`"<prefix>.files"`, `"<prefix>.params"`) across process runs.
///
/// Keys are namespaced by the caller-chosen prefix passed to [`crate::memo`],
/// so unrelated memos never collide.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheData(BTreeMap<String, Value>);

impl CacheData {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Merge a memo's `cache_overwrites` into this map.
    pub fn merge(&mut self, overwrites: impl IntoIterator<Item = (String, Value)>) {
        for (key, value) in overwrites {
            self.0.insert(key, value);
        }
    }

    pub fn files_key(prefix: &str) -> String {
        format!("{prefix}.files")
    }

    pub fn params_key(prefix: &str) -> String {
        format!("{prefix}.params")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_overwrites_existing_keys() {
        let mut data = CacheData::new();
        data.set("a.params", json!({"x": 1}));
        data.merge([("a.params".to_string(), json!({"x": 2}))]);
        assert_eq!(data.get("a.params"), Some(&json!({"x": 2})));
    }
}
