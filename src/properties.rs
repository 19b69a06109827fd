use std::collections::{BTreeMap, HashMap};

/// Unique id assigned by the registry to every registration.
pub const SERVICE_ID: &str = "service.id";
/// Declared type name of a registered service.
pub const OBJECT_CLASS: &str = "objectClass";
/// Optional integer used to pick the default service of a type.
pub const SERVICE_RANKING: &str = "service.ranking";

/// Service properties.
///
/// Keys compare case-insensitively, the way LDAP attribute names do, but keep
/// the spelling they were last inserted with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    // lowercased key -> (original key, value)
    entries: BTreeMap<String, (String, String)>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert a property, returning the previous value stored under a key
    /// that matches case-insensitively.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        self.entries
            .insert(key.to_ascii_lowercase(), (key, value.into()))
            .map(|(_, previous)| previous)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(&key.to_ascii_lowercase())
            .map(|(_, value)| value.as_str())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries
            .remove(&key.to_ascii_lowercase())
            .map(|(_, value)| value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&key.to_ascii_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(|(key, _)| key.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `service.ranking` as an integer; missing or unparsable rankings are 0.
    pub fn ranking(&self) -> i32 {
        self.get(SERVICE_RANKING)
            .and_then(|ranking| ranking.trim().parse().ok())
            .unwrap_or(0)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut properties = Properties::new();
        for (key, value) in iter {
            properties.insert(key, value);
        }
        properties
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for Properties {
    fn from(entries: [(K, V); N]) -> Self {
        entries.into_iter().collect()
    }
}

impl From<HashMap<String, String>> for Properties {
    fn from(map: HashMap<String, String>) -> Self {
        map.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_keys() {
        let mut props = Properties::new().with("Lang", "en");
        assert_eq!(props.get("lang"), Some("en"));
        assert_eq!(props.get("LANG"), Some("en"));
        assert!(props.contains_key("lAnG"));

        // 同じキー（大文字小文字違い）は上書き
        let previous = props.insert("LANG", "fr");
        assert_eq!(previous, Some("en".to_string()));
        assert_eq!(props.len(), 1);
        assert_eq!(props.keys().collect::<Vec<_>>(), vec!["LANG"]);
    }

    #[test]
    fn test_ranking() {
        assert_eq!(Properties::new().ranking(), 0);
        assert_eq!(Properties::from([(SERVICE_RANKING, "10")]).ranking(), 10);
        assert_eq!(Properties::from([(SERVICE_RANKING, " -3 ")]).ranking(), -3);
        assert_eq!(Properties::from([(SERVICE_RANKING, "high")]).ranking(), 0);
    }

    #[test]
    fn test_from_hash_map() {
        let mut map = HashMap::new();
        map.insert("a".to_string(), "1".to_string());
        map.insert("b".to_string(), "2".to_string());
        let mut props = Properties::from(map);
        assert_eq!(props.len(), 2);
        assert_eq!(props.remove("A"), Some("1".to_string()));
        assert!(!props.is_empty());
    }
}
