use crate::error::{DiagError, Result};
use std::env;

/// Retry count handed to every API call unless overridden.
pub const DEFAULT_API_RETRIES: u32 = 10;
pub const DEFAULT_PROVIDER: &str = "gcp";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub api_retries: u32,
    pub provider: String,
    pub project_id: Option<String>,
    pub mock_fixture: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_retries: DEFAULT_API_RETRIES,
            provider: DEFAULT_PROVIDER.to_string(),
            project_id: None,
            mock_fixture: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source.
    ///
    /// - Values are trimmed, empty values count as unset
    /// - `WBDIAG_API_RETRIES` must be a non-negative integer
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };

        let api_retries = match get("WBDIAG_API_RETRIES") {
            Some(raw) => raw.parse::<u32>().map_err(|_| {
                DiagError::Config(format!(
                    "WBDIAG_API_RETRIES must be a non-negative integer, got {:?}",
                    raw
                ))
            })?,
            None => DEFAULT_API_RETRIES,
        };
        let provider = get("WBDIAG_PROVIDER")
            .map(|s| s.to_lowercase())
            .unwrap_or_else(|| DEFAULT_PROVIDER.to_string());

        Ok(Self {
            api_retries,
            provider,
            project_id: get("WBDIAG_PROJECT_ID"),
            mock_fixture: get("WBDIAG_MOCK_FIXTURE"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn reads_and_trims_values() {
        let cfg = Config::from_lookup(lookup(&[
            ("WBDIAG_API_RETRIES", " 3 "),
            ("WBDIAG_PROVIDER", "MOCK"),
            ("WBDIAG_PROJECT_ID", "gcpdiag-notebooks1-aaaa"),
            ("WBDIAG_MOCK_FIXTURE", ""),
        ]))
        .unwrap();
        assert_eq!(cfg.api_retries, 3);
        assert_eq!(cfg.provider, "mock");
        assert_eq!(cfg.project_id.as_deref(), Some("gcpdiag-notebooks1-aaaa"));
        assert_eq!(cfg.mock_fixture, None);
    }

    #[test]
    fn rejects_bad_retry_count() {
        let err = Config::from_lookup(lookup(&[("WBDIAG_API_RETRIES", "-1")])).unwrap_err();
        assert!(matches!(err, DiagError::Config(_)));
    }
}
