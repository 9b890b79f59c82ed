//! Per-region server settings

use serde::{Deserialize, Serialize};

/// Settings for one regional deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Whether this region is processed by default
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Path prefixes to fetch; empty means everything
    #[serde(default, deserialize_with = "deserialize_whitelist")]
    pub path_whitelist: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

/// Accepts a missing, `null` or list whitelist, normalizing separators.
fn deserialize_whitelist<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<Vec<String>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|p| p.replace('\\', "/"))
        .collect())
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            path_whitelist: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Whether `path` should be fetched.
    ///
    /// A path matches when it starts with a whitelisted prefix, or when it is
    /// itself a prefix of one (a directory above a whitelisted entry).
    pub fn is_whitelisted(&self, path: &str) -> bool {
        if self.path_whitelist.is_empty() {
            return true;
        }
        let path = path.replace('\\', "/");
        self.path_whitelist
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()) || prefix.starts_with(path.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_whitelist_allows_everything() {
        assert!(ServerConfig::default().is_whitelisted("anything/at/all.ab"));
    }

    #[test]
    fn test_prefix_match_both_ways() {
        let server = ServerConfig {
            enabled: true,
            path_whitelist: vec!["gamedata/excel".to_string()],
        };
        assert!(server.is_whitelisted("gamedata/excel/skill_table.bytes"));
        assert!(server.is_whitelisted("gamedata"));
        assert!(server.is_whitelisted("gamedata\\excel\\item_table.bytes"));
        assert!(!server.is_whitelisted("arts/charportraits/x.png"));
    }

    #[test]
    fn test_null_whitelist_deserializes_empty() {
        let server: ServerConfig =
            serde_json::from_str(r#"{"enabled": false, "path_whitelist": null}"#).unwrap();
        assert!(!server.enabled);
        assert!(server.path_whitelist.is_empty());
    }
}
