use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
///
/// The API key is deliberately absent: it is only read from the environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub model: Option<ModelConfig>,
    pub export: Option<ExportConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    pub name: Option<String>,
    pub base_url: Option<String>,
    pub api_version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportConfig {
    pub output_dir: Option<String>,
    /// One of `xlsx`, `csv`, `json`.
    pub format: Option<String>,
}

/// Platform config directory path: `<config_dir>/trialex/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("trialex").join("config.toml"))
}

/// Load config by cascading CWD `.trialex.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".trialex.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparseable config file");
            None
        }
    }
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    let bm = base.model.unwrap_or_default();
    let om = overlay.model.unwrap_or_default();
    let be = base.export.unwrap_or_default();
    let oe = overlay.export.unwrap_or_default();

    ConfigFile {
        model: Some(ModelConfig {
            name: om.name.or(bm.name),
            base_url: om.base_url.or(bm.base_url),
            api_version: om.api_version.or(bm.api_version),
        }),
        export: Some(ExportConfig {
            output_dir: oe.output_dir.or(be.output_dir),
            format: oe.format.or(be.format),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_section_round_trip_toml() {
        let config = ConfigFile {
            model: Some(ModelConfig {
                name: Some("claude-test".to_string()),
                base_url: Some("http://localhost:8080".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: ConfigFile = toml::from_str(&toml_str).unwrap();
        let model = parsed.model.unwrap();
        assert_eq!(model.name.unwrap(), "claude-test");
        assert_eq!(model.base_url.as_deref(), Some("http://localhost:8080"));
    }

    #[test]
    fn absent_fields_deserialize_as_none() {
        let toml_str = "[export]\nformat = \"csv\"\n";
        let parsed: ConfigFile = toml::from_str(toml_str).unwrap();
        assert!(parsed.model.is_none());
        let export = parsed.export.unwrap();
        assert_eq!(export.format.as_deref(), Some("csv"));
        assert!(export.output_dir.is_none());
    }

    #[test]
    fn api_key_in_file_is_ignored() {
        let toml_str = "api_key = \"sk-should-not-load\"\n[model]\nname = \"m\"\n";
        let parsed: ConfigFile = toml::from_str(toml_str).unwrap();
        assert_eq!(parsed.model.unwrap().name.as_deref(), Some("m"));
    }

    #[test]
    fn merge_overlay_wins() {
        let base = ConfigFile {
            model: Some(ModelConfig {
                name: Some("base-model".to_string()),
                api_version: Some("2024-01-01".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let overlay = ConfigFile {
            model: Some(ModelConfig {
                name: Some("overlay-model".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let merged = merge(base, overlay).model.unwrap();
        assert_eq!(merged.name.unwrap(), "overlay-model");
        assert_eq!(merged.api_version.as_deref(), Some("2024-01-01"));
    }

    #[test]
    fn merge_base_preserved_when_overlay_absent() {
        let base = ConfigFile {
            export: Some(ExportConfig {
                output_dir: Some("/base/out".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let merged = merge(base, ConfigFile::default());
        assert_eq!(merged.export.unwrap().output_dir.unwrap(), "/base/out");
    }

    #[test]
    fn load_from_missing_path_is_none() {
        assert!(load_from_path(Path::new("/nonexistent/trialex/config.toml")).is_none());
    }
}
