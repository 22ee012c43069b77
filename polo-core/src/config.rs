//! Parse a configuration file into a [`Configuration`] snapshot.
//!
//! Files ending in `.json` are parsed as JSON, everything else as YAML. A
//! snapshot is only ever produced from a file that parsed and validated
//! completely.

use std::collections::HashSet;
use std::path::Path;

use chrono::Utc;
use serde::Deserialize;

use crate::error::{io_err, ConfigError};
use crate::fingerprint::fingerprint_bytes;
use crate::types::{Configuration, Settings, SourceDescriptor};

/// On-disk shape of the configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    settings: Settings,
    sources: Vec<SourceDescriptor>,
}

/// Read and parse the file at `path`.
///
/// The snapshot's fingerprint is computed over exactly the bytes that were
/// parsed.
pub fn load_at(path: &Path) -> Result<Configuration, ConfigError> {
    let bytes = std::fs::read(path).map_err(|e| io_err(path, e))?;
    parse_bytes(path, &bytes)
}

/// Parse `bytes` as though they were read from `path`.
pub fn parse_bytes(path: &Path, bytes: &[u8]) -> Result<Configuration, ConfigError> {
    let file = if bytes.iter().all(u8::is_ascii_whitespace) {
        ConfigFile::default()
    } else if is_json(path) {
        serde_json::from_slice(bytes).map_err(|source| ConfigError::ParseJson {
            path: path.to_path_buf(),
            source,
        })?
    } else {
        serde_yaml::from_slice(bytes).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?
    };

    validate(path, &file)?;

    Ok(Configuration {
        fingerprint: Some(fingerprint_bytes(bytes)),
        origin: Some(path.to_path_buf()),
        loaded_at: Utc::now(),
        settings: file.settings,
        sources: file.sources,
    })
}

fn validate(path: &Path, file: &ConfigFile) -> Result<(), ConfigError> {
    if let Some(field) = file.settings.first_invalid_field() {
        return Err(ConfigError::Invalid {
            path: path.to_path_buf(),
            reason: format!("settings.{field} must be greater than zero"),
        });
    }

    let mut seen = HashSet::new();
    for source in &file.sources {
        if source.id.0.trim().is_empty() {
            return Err(ConfigError::Invalid {
                path: path.to_path_buf(),
                reason: "source id must not be empty".to_string(),
            });
        }
        if !seen.insert(&source.id) {
            return Err(ConfigError::Invalid {
                path: path.to_path_buf(),
                reason: format!("duplicate source id '{}'", source.id),
            });
        }
    }
    Ok(())
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SourceId, DEFAULT_MAX_ENTRIES};
    use std::path::PathBuf;

    fn yaml_path() -> PathBuf {
        PathBuf::from("/virtual/polo.yaml")
    }

    #[test]
    fn empty_file_yields_defaults() {
        let config = parse_bytes(&yaml_path(), b"\n  \n").unwrap();
        assert!(config.sources.is_empty());
        assert_eq!(config.settings, Settings::default());
        assert!(config.fingerprint.is_some());
    }

    #[test]
    fn params_other_than_id_are_kept_opaque() {
        let yaml = b"sources:\n  - id: hosts\n    path: /etc/hosts\n    weight: 3\n";
        let config = parse_bytes(&yaml_path(), yaml).unwrap();
        let hosts = config.source(&SourceId::from("hosts")).expect("hosts source");
        assert_eq!(hosts.param_str("path"), Some("/etc/hosts"));
        assert_eq!(hosts.params["weight"], serde_json::json!(3));
        assert_eq!(config.settings.max_entries, DEFAULT_MAX_ENTRIES);
    }

    #[test]
    fn json_extension_parses_as_json() {
        let path = PathBuf::from("/virtual/polo.json");
        let json = br#"{"settings":{"poll_interval_secs":5},"sources":[{"id":"a"}]}"#;
        let config = parse_bytes(&path, json).unwrap();
        assert_eq!(config.settings.poll_interval_secs, 5);
        assert_eq!(config.sources.len(), 1);
    }

    #[test]
    fn unknown_settings_key_is_a_parse_error() {
        let err = parse_bytes(&yaml_path(), b"settings:\n  poll_interval: 5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
        assert!(err.is_parse_error());
    }
}
