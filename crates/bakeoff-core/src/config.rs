use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::warn;

use crate::error::InputError;

pub const PRODUCT_CONTEXT_KEYS: [&str; 4] = [
    "price_assumption",
    "subscription_years",
    "currency",
    "time_horizon_years",
];

/// Contents of `config_session.yaml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionConfig {
    #[serde(default, deserialize_with = "null_as_default")]
    pub models_to_test: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub product_context: ProductContext,
    #[serde(default, deserialize_with = "null_as_default")]
    pub generation: GenerationSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ProductContext {
    #[serde(default)]
    pub price_assumption: Option<serde_yaml::Value>,
    #[serde(default)]
    pub subscription_years: Option<serde_yaml::Value>,
    #[serde(default)]
    pub currency: Option<serde_yaml::Value>,
    #[serde(default)]
    pub time_horizon_years: Option<serde_yaml::Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl ProductContext {
    pub fn missing_keys(&self) -> Vec<&'static str> {
        let present = [
            self.price_assumption.is_some(),
            self.subscription_years.is_some(),
            self.currency.is_some(),
            self.time_horizon_years.is_some(),
        ];
        PRODUCT_CONTEXT_KEYS
            .iter()
            .zip(present)
            .filter(|(_, present)| !present)
            .map(|(key, _)| *key)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.missing_keys().len() == PRODUCT_CONTEXT_KEYS.len() && self.extra.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GenerationSettings {
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    1000
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl SessionConfig {
    /// Non-fatal problems: absent models list, absent product context keys.
    pub fn warnings(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.models_to_test.is_empty() {
            out.push("no models defined under 'models_to_test'".to_string());
        }
        for key in self.product_context.missing_keys() {
            out.push(format!("missing product_context key: {}", key));
        }
        out
    }
}

pub fn load_config(path: &Path) -> Result<SessionConfig, InputError> {
    const WHAT: &str = "session config";
    if !path.exists() {
        return Err(InputError::Missing {
            what: WHAT,
            path: path.to_path_buf(),
        });
    }
    let raw = fs::read_to_string(path).map_err(|source| InputError::Io {
        what: WHAT,
        path: path.to_path_buf(),
        source,
    })?;
    let config = if raw.trim().is_empty() {
        SessionConfig::default()
    } else {
        serde_yaml::from_str(&raw).map_err(|e| InputError::Parse {
            what: WHAT,
            path: path.to_path_buf(),
            message: e.to_string(),
        })?
    };
    for warning in config.warnings() {
        warn!(config = %path.display(), "{}", warning);
    }
    Ok(config)
}

/// Turn label to prompt text, iterated in prompt-file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptSet {
    turns: Vec<(String, String)>,
}

impl PromptSet {
    /// Keeps the first occurrence of each label, in iteration order.
    pub fn new(turns: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut set = Self::default();
        for (turn, prompt) in turns {
            if set.get(&turn).is_none() {
                set.turns.push((turn, prompt));
            }
        }
        set
    }

    pub fn get(&self, turn: &str) -> Option<&str> {
        self.turns
            .iter()
            .find(|(k, _)| k == turn)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.turns.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn subset(&self, turns: &[&str]) -> PromptSet {
        let turns = self
            .turns
            .iter()
            .filter(|(k, _)| turns.contains(&k.as_str()))
            .cloned()
            .collect();
        PromptSet { turns }
    }

    pub fn missing_turns<'a>(&self, expected: &[&'a str]) -> Vec<&'a str> {
        expected
            .iter()
            .filter(|t| self.get(t).is_none())
            .copied()
            .collect()
    }
}

pub fn load_prompts(path: &Path) -> Result<PromptSet, InputError> {
    const WHAT: &str = "prompt file";
    if !path.exists() {
        return Err(InputError::Missing {
            what: WHAT,
            path: path.to_path_buf(),
        });
    }
    let raw = fs::read_to_string(path).map_err(|source| InputError::Io {
        what: WHAT,
        path: path.to_path_buf(),
        source,
    })?;
    let parse_error = |message: String| InputError::Parse {
        what: WHAT,
        path: path.to_path_buf(),
        message,
    };
    let map: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(&raw).map_err(|e| parse_error(e.to_string()))?;
    let mut turns = Vec::with_capacity(map.len());
    for (turn, value) in map {
        match value {
            serde_json::Value::String(prompt) => turns.push((turn, prompt)),
            other => {
                return Err(parse_error(format!(
                    "prompt for '{}' must be a string, got {}",
                    turn, other
                )))
            }
        }
    }
    Ok(PromptSet::new(turns))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::path::PathBuf;

    fn scratch(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "bakeoff_config_{}_{}_{}",
            label,
            std::process::id(),
            Utc::now().timestamp_micros()
        ));
        fs::create_dir_all(&dir).expect("scratch dir");
        dir
    }

    #[test]
    fn load_config_reads_models_and_context() {
        let dir = scratch("full");
        let path = dir.join("config_session.yaml");
        fs::write(
            &path,
            "\
models_to_test:
  - gpt-4o-mini
  - llama3:8b
product_context:
  price_assumption: 40
  subscription_years: 3
  currency: USD
  time_horizon_years: 5
  segment: smb
",
        )
        .expect("write config");
        let cfg = load_config(&path).expect("config should load");
        assert_eq!(cfg.models_to_test, vec!["gpt-4o-mini", "llama3:8b"]);
        assert!(cfg.product_context.missing_keys().is_empty());
        assert!(cfg.product_context.extra.contains_key("segment"));
        assert_eq!(cfg.generation, GenerationSettings::default());
        assert!(cfg.warnings().is_empty(), "{:?}", cfg.warnings());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn missing_context_keys_are_warnings_not_errors() {
        let dir = scratch("partial");
        let path = dir.join("config_session.yaml");
        fs::write(
            &path,
            "models_to_test: [m1]\nproduct_context:\n  currency: EUR\ngeneration:\n  max_tokens: 200\n",
        )
        .expect("write config");
        let cfg = load_config(&path).expect("config should load");
        assert_eq!(
            cfg.product_context.missing_keys(),
            vec!["price_assumption", "subscription_years", "time_horizon_years"]
        );
        assert_eq!(cfg.generation.max_tokens, 200);
        assert!((cfg.generation.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(cfg.warnings().len(), 3);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn null_sections_fall_back_to_defaults() {
        let dir = scratch("null");
        let path = dir.join("config_session.yaml");
        fs::write(&path, "models_to_test:\nproduct_context:\n").expect("write config");
        let cfg = load_config(&path).expect("config should load");
        assert!(cfg.models_to_test.is_empty());
        assert!(cfg.product_context.is_empty());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn absent_files_are_missing_input_errors() {
        let dir = scratch("absent");
        let err = load_config(&dir.join("config_session.yaml")).expect_err("must fail");
        assert!(matches!(err, InputError::Missing { .. }), "{}", err);
        let err = load_prompts(&dir.join("prompts_pm.json")).expect_err("must fail");
        assert!(err.to_string().contains("missing prompt file"), "{}", err);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn prompts_subset_and_missing_turns() {
        let dir = scratch("prompts");
        let path = dir.join("prompts_pm.json");
        fs::write(
            &path,
            r#"{"T1_intro": "hi", "T6_sam": "sam?", "T5_tam": "tam?"}"#,
        )
        .expect("write prompts");
        let prompts = load_prompts(&path).expect("prompts should load");
        let order: Vec<&str> = prompts.iter().map(|(k, _)| k).collect();
        assert_eq!(order, vec!["T1_intro", "T6_sam", "T5_tam"], "file order kept");

        let subset = prompts.subset(&["T5_tam", "T6_sam", "T7_som"]);
        assert_eq!(subset.len(), 2);
        let subset_order: Vec<&str> = subset.iter().map(|(k, _)| k).collect();
        assert_eq!(subset_order, vec!["T6_sam", "T5_tam"]);
        assert_eq!(subset.get("T5_tam"), Some("tam?"));
        assert_eq!(
            prompts.missing_turns(&["T5_tam", "T6_sam", "T7_som"]),
            vec!["T7_som"]
        );
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn non_string_prompt_is_a_parse_error() {
        let dir = scratch("badprompts");
        let path = dir.join("prompts_pm.json");
        fs::write(&path, r#"{"T5_tam": 5}"#).expect("write prompts");
        let err = load_prompts(&path).expect_err("must fail");
        assert!(matches!(err, InputError::Parse { .. }), "{}", err);
        let _ = fs::remove_dir_all(dir);
    }
}
