//! Configuration for sdtree.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (SDTREE_URL, SDTREE_API_KEY, SDTREE_DEFINITIONS)
//! 2. Config file (.sdtree/config.yaml)
//! 3. Defaults (local service, ~/.config/sdtree/definitions)
//!
//! Config file discovery:
//! - Searches current directory and parents for .sdtree/config.yaml
//! - The definitions directory is relative to the config file's .sdtree/ directory

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::wire::WireShape;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

const DEFAULT_BASE_URL: &str = "http://localhost:8080";
const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub definitions: DefinitionsConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_seconds: Option<u64>,
    /// Node-list shape used when writing payloads locally
    pub shape: Option<WireShape>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DefinitionsConfig {
    /// Directory of definition files (relative to .sdtree/)
    pub dir: Option<String>,
}

/// Resolved connection settings for the content service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
    pub shape: WireShape,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            shape: WireShape::default(),
        }
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub service: ServiceSettings,
    /// Directory holding definition files
    pub definitions_dir: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

/// Find config file by searching `start` and its parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(".sdtree").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to `base`
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

fn default_definitions_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .context("Failed to determine config directory")?
        .join("sdtree")
        .join("definitions"))
}

/// Resolve settings from a config file (if any) and the environment
fn resolve(config_file: Option<PathBuf>, env: impl Fn(&str) -> Option<String>) -> Result<ResolvedConfig> {
    let file = config_file.as_deref().map(load_config_file).transpose()?;

    let service_file = file.as_ref().map(|f| f.service.clone()).unwrap_or_default();
    let defaults = ServiceSettings::default();
    let service = ServiceSettings {
        base_url: env("SDTREE_URL")
            .or(service_file.base_url)
            .unwrap_or(defaults.base_url),
        api_key: env("SDTREE_API_KEY").or(service_file.api_key),
        timeout_seconds: service_file.timeout_seconds.unwrap_or(defaults.timeout_seconds),
        shape: service_file.shape.unwrap_or(defaults.shape),
    };

    let definitions_dir = if let Some(dir) = env("SDTREE_DEFINITIONS") {
        PathBuf::from(dir)
    } else if let (Some(config_path), Some(dir)) = (
        config_file.as_deref(),
        file.as_ref().and_then(|f| f.definitions.dir.as_deref()),
    ) {
        let sdtree_dir = config_path.parent().unwrap_or(Path::new("."));
        resolve_path(sdtree_dir, dir)
    } else if let Some(config_path) = config_file.as_deref() {
        config_path
            .parent()
            .unwrap_or(Path::new("."))
            .join("definitions")
    } else {
        default_definitions_dir()?
    };

    Ok(ResolvedConfig {
        service,
        definitions_dir,
        config_file,
    })
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    resolve(find_config_file(&cwd), |key| std::env::var(key).ok())
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn write_config(root: &Path, body: &str) -> PathBuf {
        let sdtree_dir = root.join(".sdtree");
        std::fs::create_dir_all(&sdtree_dir).unwrap();
        let config_path = sdtree_dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "{}", body).unwrap();
        config_path
    }

    #[test]
    fn test_defaults_without_file() {
        let config = resolve(None, no_env).unwrap();
        assert_eq!(config.service, ServiceSettings::default());
        assert!(config.definitions_dir.ends_with("sdtree/definitions"));
        assert!(config.config_file.is_none());
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let config_path = write_config(
            temp.path(),
            r#"
version: "1.0"
service:
  base_url: https://cms.example.edu
  api_key: secret
  timeout_seconds: 5
  shape: object-or-array
definitions:
  dir: ./defs
"#,
        );

        let config = resolve(Some(config_path.clone()), no_env).unwrap();
        assert_eq!(config.service.base_url, "https://cms.example.edu");
        assert_eq!(config.service.api_key.as_deref(), Some("secret"));
        assert_eq!(config.service.timeout_seconds, 5);
        assert_eq!(config.service.shape, WireShape::ObjectOrArray);
        assert!(config.definitions_dir.ends_with(".sdtree/defs"));
        assert_eq!(config.config_file, Some(config_path));
    }

    #[test]
    fn test_env_overrides_file() {
        let temp = TempDir::new().unwrap();
        let config_path = write_config(
            temp.path(),
            "version: \"1.0\"\nservice:\n  base_url: https://file.example.edu\n",
        );
        let env: HashMap<&str, &str> = [
            ("SDTREE_URL", "https://env.example.edu"),
            ("SDTREE_DEFINITIONS", "/srv/definitions"),
        ]
        .into_iter()
        .collect();

        let config = resolve(Some(config_path), |key| {
            env.get(key).map(|value| value.to_string())
        })
        .unwrap();
        assert_eq!(config.service.base_url, "https://env.example.edu");
        assert_eq!(config.definitions_dir, PathBuf::from("/srv/definitions"));
    }

    #[test]
    fn test_find_config_file_walks_up() {
        let temp = TempDir::new().unwrap();
        let config_path = write_config(temp.path(), "version: \"1.0\"");
        let nested = temp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_config_file(&nested), Some(config_path));
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/subdir")
        );
    }
}
