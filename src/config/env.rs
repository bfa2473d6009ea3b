use dashmap::DashMap;
use std::env;
use std::sync::Arc;

/// Read-only snapshot of named configuration values.
///
/// A value counts as present only when it is set and non-empty, so
/// `DATABASE_HOST=` behaves the same as an unset `DATABASE_HOST`.
#[derive(Clone, Default)]
pub struct EnvSource {
    values: Arc<DashMap<String, String>>,
}

impl EnvSource {
    /// Snapshot the process environment.
    pub fn from_process() -> Self {
        Self::from_pairs(env::vars())
    }

    /// Build a source from explicit pairs. Tests use this instead of touching the real environment.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let values = DashMap::new();
        for (key, value) in pairs {
            values.insert(key.into(), value.into());
        }
        Self {
            values: Arc::new(values),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values
            .get(key)
            .map(|v| v.clone())
            .filter(|v| !v.is_empty())
    }

    pub fn exists(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// True only when every key is present.
    pub fn all_exist(&self, keys: &[&str]) -> bool {
        keys.iter().all(|key| self.exists(key))
    }

    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    /// Parse a boolean flag. Unset or unparsable values read as `false`.
    pub fn flag(&self, key: &str) -> bool {
        match self.get(key) {
            Some(value) => parse_bool(&value).unwrap_or_else(|| {
                tracing::warn!("Ignoring non-boolean value {:?} for {}", value, key);
                false
            }),
            None => false,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "yes" | "on" => Some(true),
        "0" | "f" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_value_is_absent() {
        let env = EnvSource::from_pairs([("SET", "value"), ("EMPTY", "")]);
        assert!(env.exists("SET"));
        assert!(!env.exists("EMPTY"));
        assert!(!env.exists("MISSING"));
        assert_eq!(env.get_or("EMPTY", "fallback"), "fallback");
    }

    #[test]
    fn test_all_exist() {
        let env = EnvSource::from_pairs([("A", "1"), ("B", "2")]);
        assert!(env.all_exist(&["A", "B"]));
        assert!(!env.all_exist(&["A", "B", "C"]));
    }

    #[test]
    fn test_flag_parsing() {
        let env = EnvSource::from_pairs([("ON", "TRUE"), ("OFF", "0"), ("JUNK", "maybe")]);
        assert!(env.flag("ON"));
        assert!(!env.flag("OFF"));
        assert!(!env.flag("JUNK"));
        assert!(!env.flag("MISSING"));
    }
}
