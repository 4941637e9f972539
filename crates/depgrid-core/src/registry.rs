use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::keys::{normalize_path, validate_key};
use crate::GridError;

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct KeyInfo {
    pub key_string: String,
    pub norm_path: String,
    #[serde(default)]
    pub parent_path: String,
    #[serde(default)]
    pub is_directory: bool,
}

/// Read-only index over the global key namespace.
///
/// Built once per operation; lookups by key string and by path never scan.
#[derive(Debug, Clone, Default)]
pub struct KeyRegistry {
    by_key: BTreeMap<String, KeyInfo>,
    key_by_path: BTreeMap<String, String>,
}

impl KeyRegistry {
    /// Index registry entries, normalizing paths.
    ///
    /// # Errors
    /// Returns [`GridError::Validation`] when a key string is malformed or when the
    /// key/path mapping is not bijective.
    pub fn new<I>(entries: I) -> Result<Self, GridError>
    where
        I: IntoIterator<Item = KeyInfo>,
    {
        let mut registry = Self::default();
        for mut info in entries {
            if !validate_key(&info.key_string) {
                return Err(GridError::Validation(format!(
                    "registry key {:?} MUST be alphanumeric",
                    info.key_string
                )));
            }
            info.norm_path = normalize_path(&info.norm_path);
            info.parent_path = normalize_path(&info.parent_path);

            if let Some(existing) = registry.key_by_path.get(&info.norm_path) {
                return Err(GridError::Validation(format!(
                    "path {} is registered under both {existing} and {}",
                    info.norm_path, info.key_string
                )));
            }
            if registry.by_key.contains_key(&info.key_string) {
                return Err(GridError::Validation(format!(
                    "key {} is registered more than once",
                    info.key_string
                )));
            }

            registry.key_by_path.insert(info.norm_path.clone(), info.key_string.clone());
            registry.by_key.insert(info.key_string.clone(), info);
        }
        Ok(registry)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&KeyInfo> {
        self.by_key.get(key)
    }

    #[must_use]
    pub fn by_path(&self, path: &str) -> Option<&KeyInfo> {
        let key = self.key_by_path.get(&normalize_path(path))?;
        self.by_key.get(key)
    }

    #[must_use]
    pub fn key_for_path(&self, path: &str) -> Option<&str> {
        self.key_by_path.get(&normalize_path(path)).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeyInfo> {
        self.by_key.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(key: &str, path: &str, parent: &str, is_directory: bool) -> KeyInfo {
        KeyInfo {
            key_string: key.to_string(),
            norm_path: path.to_string(),
            parent_path: parent.to_string(),
            is_directory,
        }
    }

    #[test]
    fn lookups_use_normalized_paths() -> Result<(), GridError> {
        let registry = KeyRegistry::new(vec![
            info("1A", "/src", "/", true),
            info("1A1", "\\src\\main.py", "/src", false),
        ])?;
        assert_eq!(registry.key_for_path("/src/main.py"), Some("1A1"));
        assert_eq!(registry.by_path("/src/").map(|entry| entry.key_string.as_str()), Some("1A"));
        assert_eq!(registry.get("1A1").map(|entry| entry.norm_path.as_str()), Some("/src/main.py"));
        assert_eq!(registry.len(), 2);
        Ok(())
    }

    #[test]
    fn duplicate_path_is_rejected() {
        let result = KeyRegistry::new(vec![
            info("1A", "/src", "/", true),
            info("1B", "/src", "/", true),
        ]);
        assert!(matches!(result, Err(GridError::Validation(message)) if message.contains("/src")));
    }

    #[test]
    fn duplicate_key_is_rejected() {
        let result = KeyRegistry::new(vec![
            info("1A", "/src", "/", true),
            info("1A", "/lib", "/", true),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn malformed_key_is_rejected() {
        let result = KeyRegistry::new(vec![info("1-A", "/src", "/", true)]);
        assert!(result.is_err());
    }
}
