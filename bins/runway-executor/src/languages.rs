// Per-language sandbox settings for the Runway executor
use anyhow::{bail, Context, Result};
use runway_common::Language;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Optional override for one language in `languages.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageOverride {
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub memory_limit_mb: Option<u32>,
    #[serde(default)]
    pub cpu_shares: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct LanguagesJson {
    languages: Vec<LanguageOverride>,
}

/// Everything the sandbox needs to run one language
#[derive(Debug, Clone, PartialEq)]
pub struct LanguageSpec {
    pub image: String,
    pub file_name: String,
    pub command: String,
    pub memory_limit_mb: u32,
    pub cpu_shares: i64,
}

/// Language table plus file overrides.
///
/// Memory resolves as: file override, then `memory_mb` when the operator set
/// one for every language, then the language's own default.
#[derive(Clone, Debug)]
pub struct LanguageConfigManager {
    overrides: HashMap<Language, LanguageOverride>,
    memory_mb: Option<u32>,
    default_cpu_shares: i64,
}

impl LanguageConfigManager {
    pub fn new(memory_mb: Option<u32>, default_cpu_shares: i64) -> Self {
        Self {
            overrides: HashMap::new(),
            memory_mb,
            default_cpu_shares,
        }
    }

    /// Load overrides from a languages.json file. Names must be known languages.
    pub fn load(path: &Path, memory_mb: Option<u32>, default_cpu_shares: i64) -> Result<Self> {
        if !path.exists() {
            bail!("Language config file not found: {}", path.display());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_json(&content, memory_mb, default_cpu_shares)
    }

    /// Like `load`, but a missing file means "no overrides"
    pub fn load_optional(
        path: &Path,
        memory_mb: Option<u32>,
        default_cpu_shares: i64,
    ) -> Result<Self> {
        if path.exists() {
            Self::load(path, memory_mb, default_cpu_shares)
        } else {
            Ok(Self::new(memory_mb, default_cpu_shares))
        }
    }

    pub fn from_json(content: &str, memory_mb: Option<u32>, default_cpu_shares: i64) -> Result<Self> {
        let languages_json: LanguagesJson =
            serde_json::from_str(content).context("Failed to parse languages.json")?;

        let mut manager = Self::new(memory_mb, default_cpu_shares);
        for entry in languages_json.languages {
            let language: Language = entry
                .name
                .parse()
                .with_context(|| format!("Unknown language in languages.json: {}", entry.name))?;
            manager.overrides.insert(language, entry);
        }
        Ok(manager)
    }

    pub fn resolve(&self, language: Language) -> LanguageSpec {
        let entry = self.overrides.get(&language);
        LanguageSpec {
            image: entry
                .and_then(|o| o.image.clone())
                .unwrap_or_else(|| language.default_image().to_string()),
            file_name: language.file_name(),
            command: language.command(),
            memory_limit_mb: entry
                .and_then(|o| o.memory_limit_mb)
                .or(self.memory_mb)
                .unwrap_or_else(|| language.default_memory_mb()),
            cpu_shares: entry
                .and_then(|o| o.cpu_shares)
                .unwrap_or(self.default_cpu_shares),
        }
    }

    pub fn overridden(&self) -> Vec<Language> {
        let mut langs: Vec<Language> = self.overrides.keys().copied().collect();
        langs.sort_by_key(|l| l.as_str());
        langs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_come_from_language_table() {
        let manager = LanguageConfigManager::new(None, 512);
        let spec = manager.resolve(Language::Java);
        assert_eq!(spec.image, Language::Java.default_image());
        assert_eq!(spec.file_name, "Main.java");
        assert_eq!(spec.memory_limit_mb, 256);
        assert_eq!(spec.cpu_shares, 512);
        assert_eq!(manager.resolve(Language::Python).memory_limit_mb, 64);
    }

    #[test]
    fn test_operator_memory_applies_to_every_language() {
        let json = r#"{"languages":[{"name":"java","memory_limit_mb":512}]}"#;
        let manager = LanguageConfigManager::from_json(json, Some(96), 512).unwrap();
        assert_eq!(manager.resolve(Language::Python).memory_limit_mb, 96);
        assert_eq!(manager.resolve(Language::Cpp).memory_limit_mb, 96);
        assert_eq!(manager.resolve(Language::Java).memory_limit_mb, 512);
    }

    #[test]
    fn test_override_applies_to_one_language() {
        let json = r#"{"languages":[{"name":"python","image":"my-python:3.12","memory_limit_mb":128}]}"#;
        let manager = LanguageConfigManager::from_json(json, None, 512).unwrap();

        let python = manager.resolve(Language::Python);
        assert_eq!(python.image, "my-python:3.12");
        assert_eq!(python.memory_limit_mb, 128);
        assert_eq!(python.cpu_shares, 512);

        let node = manager.resolve(Language::JavaScript);
        assert_eq!(node.image, Language::JavaScript.default_image());
        assert_eq!(manager.overridden(), vec![Language::Python]);
    }

    #[test]
    fn test_unknown_language_is_a_config_error() {
        let json = r#"{"languages":[{"name":"cobol"}]}"#;
        let err = LanguageConfigManager::from_json(json, None, 512).unwrap_err();
        assert!(err.to_string().contains("cobol"));
    }

    #[test]
    fn test_missing_optional_file() {
        let manager =
            LanguageConfigManager::load_optional(Path::new("does/not/exist.json"), None, 512).unwrap();
        assert!(manager.overridden().is_empty());
        assert!(LanguageConfigManager::load(Path::new("does/not/exist.json"), None, 512).is_err());
    }
}
