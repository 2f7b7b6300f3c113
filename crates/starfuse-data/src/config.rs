//! Cross-match and merge configuration, loadable from JSON

use crate::crossmatch::Criteria;
use crate::error::StarResult;
use crate::merge::{MergeRules, OverwritePolicy, PropertyMask};
use crate::schema::{fields, PropertySchema};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use starfuse_core::coordinates::arcsec_to_deg;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Match criteria as (property id, tolerance) pairs, coordinates in degrees
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    pub criteria: Vec<(String, f64)>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        let radius = arcsec_to_deg(1.0);
        Self {
            criteria: vec![(fields::RA.to_string(), radius), (fields::DEC.to_string(), radius)],
        }
    }
}

impl MatchConfig {
    pub fn compile(&self, schema: &Arc<PropertySchema>) -> StarResult<Criteria> {
        Criteria::compile(schema, &self.criteria)
    }

    pub fn load(path: &Path) -> Result<Self> {
        load_json(path)
    }
}

/// How matched records are folded together
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeSettings {
    pub policy: OverwritePolicy,
    /// Fields a `Partial` merge may overwrite or clear
    pub mask_fields: Vec<String>,
    pub rules: MergeRules,
    /// Append records that match nothing
    pub append_unmatched: bool,
    pub show_progress: bool,
}

impl Default for MergeSettings {
    fn default() -> Self {
        Self {
            policy: OverwritePolicy::None,
            mask_fields: Vec::new(),
            rules: MergeRules::default(),
            append_unmatched: true,
            show_progress: false,
        }
    }
}

impl MergeSettings {
    /// Resolve `mask_fields` against a schema; no fields means no mask
    pub fn mask(&self, schema: &PropertySchema) -> StarResult<Option<PropertyMask>> {
        if self.mask_fields.is_empty() {
            return Ok(None);
        }
        PropertyMask::from_ids(schema, &self.mask_fields).map(Some)
    }

    pub fn load(path: &Path) -> Result<Self> {
        load_json(path)
    }
}

/// Read a JSON configuration file
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse config JSON: {}", path.display()))?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crossmatch::CriterionKind;
    use crate::error::StarError;
    use crate::origin::Origin;

    #[test]
    fn test_default_match_config() {
        let criteria = MatchConfig::default().compile(&PropertySchema::standard()).unwrap();
        assert_eq!(criteria.len(), 1);
        let spatial = criteria.iter().next().unwrap();
        assert_eq!(spatial.kind, CriterionKind::Spatial);
        assert!(spatial.is_radius);
    }

    #[test]
    fn test_parse_settings_with_defaults() {
        let json = r#"{
            "policy": "partial",
            "mask_fields": ["MAG_V", "SP_TYPE"],
            "rules": { "protected_origins": ["simbad", "hipparcos"] }
        }"#;
        let settings: MergeSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.policy, OverwritePolicy::Partial);
        assert_eq!(settings.rules.protected_origins, vec![Origin::Simbad, Origin::Hipparcos]);
        assert_eq!(settings.rules.override_origin, Some(Origin::Gaia));
        assert!(settings.append_unmatched);

        let mask = settings.mask(&PropertySchema::standard()).unwrap().unwrap();
        assert_eq!(mask.enabled().count(), 2);
    }

    #[test]
    fn test_mask_errors() {
        let schema = PropertySchema::standard();
        assert_eq!(MergeSettings::default().mask(&schema).unwrap(), None);

        let settings = MergeSettings { mask_fields: vec!["NOPE".into()], ..MergeSettings::default() };
        assert!(matches!(settings.mask(&schema), Err(StarError::Configuration(_))));
    }

    #[test]
    fn test_load_files() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("starfuse-match-{}.json", std::process::id()));
        fs::write(&path, r#"{ "criteria": [["RA", 0.001], ["DEC", 0.002], ["MAG_V", 0.3]] }"#).unwrap();

        let config = MatchConfig::load(&path).unwrap();
        assert_eq!(config.criteria.len(), 3);
        let criteria = config.compile(&PropertySchema::standard()).unwrap();
        assert!(!criteria.iter().next().unwrap().is_radius);
        fs::remove_file(&path).unwrap();

        let missing = dir.join("starfuse-does-not-exist.json");
        let err = MergeSettings::load(&missing).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
