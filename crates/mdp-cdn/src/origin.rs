//! Origin settings
//!
//! Overrides merge shallowly: each field given replaces the default
//! wholesale, lists included. Unknown keys are carried in `extra`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Default edge TTL: one day
pub const DEFAULT_CACHE_TTL_SECS: u64 = 86_400;

/// Content types compressed at the edge by default
pub const DEFAULT_COMPRESSION_TYPES: [&str; 4] = [
    "text/html",
    "text/css",
    "application/javascript",
    "image/svg+xml",
];

/// Effective origin settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OriginSettings {
    /// Edge TTL in seconds
    pub cache_ttl_secs: u64,
    /// Whether the edge compresses responses
    pub enable_compression: bool,
    /// Content types to compress
    pub compression_types: Vec<String>,
    /// Whether CORS headers are added
    pub enable_cors: bool,
    /// Provider-specific keys passed through untouched
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for OriginSettings {
    fn default() -> Self {
        Self {
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            enable_compression: true,
            compression_types: DEFAULT_COMPRESSION_TYPES
                .iter()
                .map(ToString::to_string)
                .collect(),
            enable_cors: true,
            extra: BTreeMap::new(),
        }
    }
}

impl OriginSettings {
    /// Apply `overrides` on top of `self`
    #[must_use]
    pub fn merged(mut self, overrides: OriginOverrides) -> Self {
        if let Some(ttl) = overrides.cache_ttl_secs {
            self.cache_ttl_secs = ttl;
        }
        if let Some(enabled) = overrides.enable_compression {
            self.enable_compression = enabled;
        }
        if let Some(types) = overrides.compression_types {
            self.compression_types = types;
        }
        if let Some(enabled) = overrides.enable_cors {
            self.enable_cors = enabled;
        }
        self.extra.extend(overrides.extra);
        self
    }
}

/// Partial settings supplied by the caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OriginOverrides {
    /// Edge TTL in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_ttl_secs: Option<u64>,
    /// Whether the edge compresses responses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_compression: Option<bool>,
    /// Content types to compress
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression_types: Option<Vec<String>>,
    /// Whether CORS headers are added
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_cors: Option<bool>,
    /// Any other provider key
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl OriginOverrides {
    /// Empty overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set edge TTL
    #[inline]
    #[must_use]
    pub fn with_cache_ttl_secs(mut self, secs: u64) -> Self {
        self.cache_ttl_secs = Some(secs);
        self
    }

    /// Toggle compression
    #[inline]
    #[must_use]
    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.enable_compression = Some(enabled);
        self
    }

    /// Replace compressed content types
    #[inline]
    #[must_use]
    pub fn with_compression_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.compression_types = Some(types.into_iter().map(Into::into).collect());
        self
    }

    /// Toggle CORS
    #[inline]
    #[must_use]
    pub fn with_cors(mut self, enabled: bool) -> Self {
        self.enable_cors = Some(enabled);
        self
    }

    /// Add a provider-specific key
    #[inline]
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Origin configuration pushed to the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OriginConfig {
    /// Origin base URL (usually the object store endpoint)
    pub origin_url: String,
    /// Effective settings
    pub settings: OriginSettings,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults() {
        let s = OriginSettings::default();
        assert_eq!(s.cache_ttl_secs, 86_400);
        assert!(s.enable_compression);
        assert!(s.enable_cors);
        assert_eq!(s.compression_types.len(), 4);
    }

    #[test]
    fn unspecified_keys_keep_defaults() {
        let merged = OriginSettings::default().merged(OriginOverrides::new().with_cache_ttl_secs(60));
        assert_eq!(merged.cache_ttl_secs, 60);
        assert!(merged.enable_compression);
        assert!(merged.enable_cors);
        assert_eq!(merged.compression_types, OriginSettings::default().compression_types);
    }

    #[test]
    fn lists_replace_wholesale_and_extras_carry() {
        let merged = OriginSettings::default().merged(
            OriginOverrides::new()
                .with_compression_types(["text/plain"])
                .with_cors(false)
                .with_extra("shield_region", "ap-northeast-2"),
        );
        assert_eq!(merged.compression_types, vec!["text/plain".to_string()]);
        assert!(!merged.enable_cors);
        assert_eq!(
            merged.extra.get("shield_region"),
            Some(&Value::from("ap-northeast-2"))
        );
    }

    #[test]
    fn overrides_from_json_collect_extras() {
        let overrides: OriginOverrides =
            serde_json::from_str(r#"{"enable_compression": false, "gzip_level": 6}"#).unwrap();
        assert_eq!(overrides.enable_compression, Some(false));
        assert_eq!(overrides.extra.get("gzip_level"), Some(&Value::from(6)));
    }
}
