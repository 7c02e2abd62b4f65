//! Configuration resolution for forge.
//!
//! The config file is taken from the first source that names one:
//! 1. `--config <path>`
//! 2. `FORGE_CONFIG`
//! 3. `config.toml` in the user config directory, if it exists
//! 4. Built-in defaults

use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use forge_sdk::ForgeConfig;
use std::fmt;
use std::path::{Path, PathBuf};

/// Environment variable naming a config file
pub const CONFIG_ENV: &str = "FORGE_CONFIG";

/// Where the active configuration came from
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    Flag(PathBuf),
    Env(PathBuf),
    UserDir(PathBuf),
    Defaults,
}

impl ConfigSource {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Flag(p) | Self::Env(p) | Self::UserDir(p) => Some(p),
            Self::Defaults => None,
        }
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(p) => write!(f, "{} (--config)", p.display()),
            Self::Env(p) => write!(f, "{} ({CONFIG_ENV})", p.display()),
            Self::UserDir(p) => write!(f, "{}", p.display()),
            Self::Defaults => write!(f, "built-in defaults"),
        }
    }
}

/// A resolved configuration and its origin
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: ForgeConfig,
    pub source: ConfigSource,
}

/// Resolve the configuration from the flag, the environment and the user
/// config directory.
pub fn resolve(flag: Option<&Path>) -> Result<LoadedConfig> {
    let env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
    resolve_from(flag, env, user_config_path())
}

/// Resolution with every input explicit.
///
/// A path named by the flag or the environment must exist; the user config
/// file is optional.
pub fn resolve_from(flag: Option<&Path>, env: Option<PathBuf>, user: Option<PathBuf>) -> Result<LoadedConfig> {
    let source = match (flag, env, user) {
        (Some(path), _, _) => ConfigSource::Flag(path.to_path_buf()),
        (None, Some(path), _) => ConfigSource::Env(path),
        (None, None, Some(path)) if path.exists() => ConfigSource::UserDir(path),
        _ => ConfigSource::Defaults,
    };

    let config = match source.path() {
        Some(path) => {
            if !path.exists() {
                bail!("config file not found: {}", path.display());
            }
            ForgeConfig::load(path).with_context(|| format!("Failed to load config from {}", path.display()))?
        }
        None => ForgeConfig::default(),
    };

    Ok(LoadedConfig { config, source })
}

/// `config.toml` in the platform config directory
pub fn user_config_path() -> Option<PathBuf> {
    ProjectDirs::from("dev", "forge", "forge")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .or_else(|| dirs::home_dir().map(|home| home.join(".forge").join("config.toml")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_flag_wins() {
        let dir = TempDir::new().unwrap();
        let flag = write(&dir, "flag.toml", "[memory]\nshort_term_capacity = 4\n");
        let env = write(&dir, "env.toml", "[memory]\nshort_term_capacity = 6\n");

        let loaded = resolve_from(Some(&flag), Some(env), None).unwrap();
        assert_eq!(loaded.source, ConfigSource::Flag(flag));
        assert_eq!(loaded.config.memory.short_term_capacity, 4);
    }

    #[test]
    fn test_env_then_user_dir() {
        let dir = TempDir::new().unwrap();
        let env = write(&dir, "env.toml", "[jobs]\nmax_retries = 5\n");
        let user = write(&dir, "user.toml", "[jobs]\nmax_retries = 1\n");

        let loaded = resolve_from(None, Some(env.clone()), Some(user.clone())).unwrap();
        assert_eq!(loaded.source, ConfigSource::Env(env));
        assert_eq!(loaded.config.jobs.max_retries, 5);

        let loaded = resolve_from(None, None, Some(user.clone())).unwrap();
        assert_eq!(loaded.source, ConfigSource::UserDir(user));
        assert_eq!(loaded.config.jobs.max_retries, 1);
    }

    #[test]
    fn test_missing_user_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let loaded = resolve_from(None, None, Some(dir.path().join("absent.toml"))).unwrap();
        assert_eq!(loaded.source, ConfigSource::Defaults);
        assert_eq!(loaded.config, ForgeConfig::default());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = resolve_from(Some(&dir.path().join("absent.toml")), None, None).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let dir = TempDir::new().unwrap();
        let bad = write(&dir, "bad.toml", "[memory]\ndecay_rate = 2.0\n");
        assert!(resolve_from(Some(&bad), None, None).is_err());
    }
}
