//! Configuration structures for the refix tool.
//!
//! The configuration is read from a JSON file (`appsettings.json` by default)
//! whose keys are PascalCase:
//!
//! ```json
//! {
//!   "AssetTypes": ["*.prefab", "*.unity"],
//!   "PrefabsPath": "/project/Assets",
//!   "AssemblyBindings": [["/decompiled/Gameplay", "9b1c7d2e4f..."]],
//!   "GuidReplacements": [["oldguid", "newguid"]],
//!   "ScriptReplacements": [["oldguid", "newguid", "11500000"]]
//! }
//! ```
//!
//! The three tables are kept as raw string rows here; [`RuleSet`](crate::RuleSet)
//! validates and indexes them. A field written as a JSON integer (a bare
//! `11500000` file ID, say) is read as its decimal text.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ConfigError;

/// Default configuration file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "appsettings.json";

/// Root configuration for the refix tool.
///
/// Every key is optional. Missing tables are empty and therefore no-ops.
///
/// # Examples
///
/// ```
/// use refix_core::Config;
///
/// let config: Config = serde_json::from_str(r#"{"PrefabsPath": "Assets"}"#).unwrap();
/// assert_eq!(config.prefabs_path.as_str(), "Assets");
/// assert_eq!(config.asset_types, vec!["*.prefab", "*.unity", "*.asset"]);
/// assert!(config.script_replacements.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Config {
    /// Filename globs selecting which documents under [`prefabs_path`](Self::prefabs_path)
    /// are rewritten (e.g. `*.prefab`).
    pub asset_types: Vec<String>,

    /// Root directory scanned for documents.
    pub prefabs_path: Utf8PathBuf,

    /// `[directory, replacementGuid]` rows. Each directory is scanned for
    /// `.meta` descriptors, all bound to the row's replacement guid.
    #[serde(deserialize_with = "rows")]
    pub assembly_bindings: Vec<Vec<String>>,

    /// `[oldGuid, newGuid]` rows applied as plain substring replacements
    /// to every line of every document.
    #[serde(deserialize_with = "rows")]
    pub guid_replacements: Vec<Vec<String>>,

    /// `[oldGuid, newGuid, newFileId]` rows overriding a script reference
    /// without any hash computation.
    #[serde(deserialize_with = "rows")]
    pub script_replacements: Vec<Vec<String>>,

    /// Maximum number of documents rewritten concurrently.
    /// `None` means use all available CPU cores.
    pub max_parallel_jobs: Option<usize>,

    /// Whether directory walks follow symbolic links.
    pub follow_links: bool,
}

/// A table cell: text, or an integer taken as its decimal text.
#[derive(Deserialize)]
#[serde(untagged)]
enum Field {
    Text(String),
    Integer(i64),
}

impl From<Field> for String {
    fn from(field: Field) -> Self {
        match field {
            Field::Text(text) => text,
            Field::Integer(n) => n.to_string(),
        }
    }
}

fn rows<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Vec<String>>, D::Error> {
    let rows = Vec::<Vec<Field>>::deserialize(deserializer)?;
    Ok(rows
        .into_iter()
        .map(|row| row.into_iter().map(String::from).collect())
        .collect())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            asset_types: vec![
                "*.prefab".to_owned(),
                "*.unity".to_owned(),
                "*.asset".to_owned(),
            ],
            prefabs_path: Utf8PathBuf::new(),
            assembly_bindings: Vec::new(),
            guid_replacements: Vec::new(),
            script_replacements: Vec::new(),
            max_parallel_jobs: None,
            follow_links: false,
        }
    }
}

impl Config {
    /// Loads a configuration file from disk.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read and
    /// [`ConfigError::Parse`] if it is not valid JSON for this schema.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_std_path()).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;

        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    /// Checks the scalar options.
    ///
    /// Directory existence is checked later, by the walkers, so that every
    /// missing directory is reported with its own path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPath`] if `PrefabsPath` is empty and
    /// [`ConfigError::InvalidOption`] for an empty `AssetTypes` list or a
    /// zero `MaxParallelJobs`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prefabs_path.as_str().is_empty() {
            return Err(ConfigError::InvalidPath {
                path: self.prefabs_path.clone(),
                reason: "PrefabsPath must be set".to_owned(),
            });
        }

        if self.asset_types.is_empty() {
            return Err(ConfigError::invalid_option(
                "AssetTypes",
                "at least one filter is required",
            ));
        }

        if self.max_parallel_jobs == Some(0) {
            return Err(ConfigError::invalid_option(
                "MaxParallelJobs",
                "must be positive",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "AssetTypes": ["*.prefab", "*.asset"],
        "PrefabsPath": "/project/Assets",
        "AssemblyBindings": [["/decompiled/Gameplay", "9b1c7d2e4f0a4b6c8d1e2f3a4b5c6d7e"]],
        "GuidReplacements": [["zzz", "yyy"]],
        "ScriptReplacements": [["abc", "def", "42"]]
    }"#;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.asset_types, vec!["*.prefab", "*.unity", "*.asset"]);
        assert!(config.prefabs_path.as_str().is_empty());
        assert!(config.assembly_bindings.is_empty());
        assert!(config.max_parallel_jobs.is_none());
        assert!(!config.follow_links);
    }

    #[test]
    fn test_config_deserialize_pascal_case() {
        let config: Config = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(config.asset_types, vec!["*.prefab", "*.asset"]);
        assert_eq!(config.prefabs_path.as_str(), "/project/Assets");
        assert_eq!(config.assembly_bindings.len(), 1);
        assert_eq!(config.guid_replacements, vec![vec!["zzz", "yyy"]]);
        assert_eq!(config.script_replacements, vec![vec!["abc", "def", "42"]]);
    }

    #[test]
    fn test_config_deserialize_with_missing_fields() {
        let config: Config = serde_json::from_str(r#"{"PrefabsPath": "Assets"}"#).unwrap();
        assert_eq!(config.prefabs_path.as_str(), "Assets");
        assert_eq!(config.asset_types, Config::default().asset_types);
        assert!(config.guid_replacements.is_empty());
        assert!(config.script_replacements.is_empty());
    }

    #[test]
    fn test_config_integer_cells_read_as_text() {
        let config: Config = serde_json::from_str(
            r#"{"ScriptReplacements": [["abc", "def", 42], ["ghi", "jkl", -765806418]]}"#,
        )
        .unwrap();
        assert_eq!(
            config.script_replacements,
            vec![vec!["abc", "def", "42"], vec!["ghi", "jkl", "-765806418"]]
        );

        let result = serde_json::from_str::<Config>(r#"{"GuidReplacements": [["abc", true]]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config: Config = serde_json::from_str(SAMPLE).unwrap();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"PrefabsPath\""));
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_validate() {
        let mut config: Config = serde_json::from_str(SAMPLE).unwrap();
        assert!(config.validate().is_ok());

        config.max_parallel_jobs = Some(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidOption { option, .. }) if option == "MaxParallelJobs"
        ));

        config.max_parallel_jobs = Some(4);
        config.asset_types.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidOption { option, .. }) if option == "AssetTypes"
        ));

        let config = Config::default();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidPath { .. })));
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Utf8Path::new("/nonexistent/appsettings.json"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
