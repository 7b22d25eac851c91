//! # FitMirror configuration module
//!
//! This module provides configuration management for FitMirror, including:
//! - Loading configuration from YAML files
//! - Merging with the embedded default configuration
//! - Environment variable overrides
//! - Typed getters and setters for configuration values
//! - Thread-safe singleton access
//!
//! ## Usage
//!
//! ```no_run
//! use fitconfig::get_config;
//!
//! let config = get_config();
//!
//! let interval = config.get_sync_min_interval_seconds();
//! let storage_dir = config.get_storage_dir()?;
//!
//! config.set_sync_min_interval_seconds(600)?;
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! Any value can be overridden from the environment with the
//! `FITMIRROR_CONFIG__` prefix, path segments separated by `__`:
//!
//! ```text
//! FITMIRROR_CONFIG__STORAGE__BACKEND=remote
//! FITMIRROR_CONFIG__APPRAISAL__API_KEY=...
//! ```

use anyhow::{anyhow, Result};
use dirs::home_dir;
use lazy_static::lazy_static;
use serde_yaml::{Mapping, Number, Value};
use std::{
    env, fmt, fs,
    path::Path,
    str::FromStr,
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::{info, warn};

const DEFAULT_CONFIG: &str = include_str!("fitmirror.yaml");

lazy_static! {
    static ref CONFIG: Arc<Config> =
        Arc::new(Config::load_config("").expect("Failed to load FitMirror configuration"));
}

const ENV_CONFIG_DIR: &str = "FITMIRROR_CONFIG";
const ENV_PREFIX: &str = "FITMIRROR_CONFIG__";
const DEFAULT_CONFIG_DIR: &str = ".fitmirror";

const DEFAULT_LOG_MIN_LEVEL: &str = "INFO";
const DEFAULT_STORAGE_DIR: &str = "fits";
const DEFAULT_REMOTE_PREFIX: &str = "fits";
const DEFAULT_BLOB_CACHE_TTL_SECONDS: u64 = 30;
const DEFAULT_BLOB_CACHE_MAX_ENTRIES: u64 = 500;
const DEFAULT_ESI_BASE_URL: &str = "https://esi.evetech.net/latest";
const DEFAULT_ESI_SSO_TOKEN_URL: &str = "https://login.eveonline.com/v2/oauth/token";
const DEFAULT_ESI_USER_AGENT: &str = "fitmirror/0.1 (+https://localhost)";
const DEFAULT_ESI_MAX_RETRIES: u64 = 1;
const DEFAULT_ESI_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_REFDATA_BASE_URL: &str = "https://ref-data.everef.net";
const DEFAULT_REFDATA_TTL_DAYS: u64 = 30;
const DEFAULT_REFDATA_TABLE_MEMORY_TTL_SECONDS: u64 = 3600;
const DEFAULT_APPRAISAL_BASE_URL: &str = "https://janice.e-351.com";
const DEFAULT_APPRAISAL_MARKET: u64 = 2;
const DEFAULT_APPRAISAL_PRICING: &str = "split";
const DEFAULT_APPRAISAL_VARIANT: &str = "immediate";
const DEFAULT_APPRAISAL_TTL_DAYS: u64 = 7;
const DEFAULT_SYNC_MIN_INTERVAL_SECONDS: u64 = 300;

/// Generates a getter/setter pair for an unsigned integer value with a default
macro_rules! impl_u64_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> u64 {
            match self.get_value($path) {
                Ok(Value::Number(n)) if n.is_u64() => n.as_u64().unwrap_or($default),
                Ok(Value::String(s)) => s.trim().parse::<u64>().unwrap_or_else(|_| {
                    warn!(path = %$path.join("."), value = %s, "Invalid number, using default");
                    $default
                }),
                _ => $default,
            }
        }

        pub fn $setter(&self, value: u64) -> Result<()> {
            self.set_value($path, Value::Number(Number::from(value)))
        }
    };
}

/// Generates a getter/setter pair for a bool value with a default
macro_rules! impl_bool_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> bool {
            match self.get_value($path) {
                Ok(Value::Bool(b)) => b,
                _ => $default,
            }
        }

        pub fn $setter(&self, value: bool) -> Result<()> {
            self.set_value($path, Value::Bool(value))
        }
    };
}

/// Generates a getter/setter pair for a string value with a default
macro_rules! impl_string_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> String {
            match self.get_value($path) {
                Ok(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
                _ => $default.to_string(),
            }
        }

        pub fn $setter(&self, value: &str) -> Result<()> {
            self.set_value($path, Value::String(value.to_string()))
        }
    };
}

/// Generates a getter/setter pair for an optional secret (empty means unset)
macro_rules! impl_secret_config {
    ($getter:ident, $setter:ident, $path:expr) => {
        pub fn $getter(&self) -> Option<String> {
            match self.get_value($path) {
                Ok(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
                _ => None,
            }
        }

        pub fn $setter(&self, value: &str) -> Result<()> {
            self.set_value($path, Value::String(value.to_string()))
        }
    };
}

/// Which persistence backend holds the fitting archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackendKind {
    /// Files under a local directory
    Local,
    /// Named blobs in a remote object store
    Remote,
}

impl FromStr for StorageBackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "local" | "fs" | "filesystem" => Ok(Self::Local),
            "remote" | "blob" => Ok(Self::Remote),
            other => Err(anyhow!("Unknown storage backend '{}'", other)),
        }
    }
}

impl fmt::Display for StorageBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// Configuration manager for FitMirror
///
/// Holds the merged YAML tree (embedded defaults, user file, environment
/// overrides) and writes every change back to `config.yaml`.
#[derive(Debug)]
pub struct Config {
    config_dir: String,
    path: String,
    data: Mutex<Value>,
}

impl Clone for Config {
    fn clone(&self) -> Self {
        let data = self.data().clone();
        Self {
            config_dir: self.config_dir.clone(),
            path: self.path.clone(),
            data: Mutex::new(data),
        }
    }
}

impl Config {
    /// Finds a config directory by trying different locations in order
    fn find_config_dir(directory: &str) -> String {
        if !directory.is_empty() {
            return directory.to_string();
        }

        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Trying to load config from env");
            return env_path;
        }

        if Path::new(DEFAULT_CONFIG_DIR).exists() {
            return DEFAULT_CONFIG_DIR.to_string();
        }

        if let Some(home) = home_dir() {
            let home_config = home.join(DEFAULT_CONFIG_DIR);
            if home_config.exists() {
                return home_config.to_string_lossy().to_string();
            }
        }

        DEFAULT_CONFIG_DIR.to_string()
    }

    /// Creates the directory if needed and checks it is readable and writable
    fn validate_config_dir(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        if !path.is_dir() {
            return Err(anyhow!("{} is not a directory", path.display()));
        }

        let test_file = path.join(".write_test");
        fs::write(&test_file, b"test")?;
        fs::remove_file(&test_file)?;

        fs::read_dir(path)?;

        Ok(())
    }

    /// Determines and validates the configuration directory
    ///
    /// The directory is searched in the following order:
    /// 1. The provided `directory` parameter if not empty
    /// 2. The `FITMIRROR_CONFIG` environment variable
    /// 3. `.fitmirror` in the current directory
    /// 4. `.fitmirror` in the user's home directory
    pub fn config_dir(directory: &str) -> Result<String> {
        let dir_path = Self::find_config_dir(directory);
        Self::validate_config_dir(Path::new(&dir_path))?;
        Ok(dir_path)
    }

    /// Loads the configuration from the specified directory
    ///
    /// The embedded defaults are merged with `config.yaml` when present,
    /// keys are lowercased, environment overrides are applied and the
    /// merged tree is saved back.
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::config_dir(directory)?;
        info!(config_dir = %config_dir, "Using config directory");

        let config_file_path = Path::new(&config_dir).join("config.yaml");
        let path = config_file_path.to_string_lossy().to_string();

        let mut default_value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;

        let yaml_data = if let Ok(data) = fs::read(&path) {
            info!(config_file = %path, "Loaded config file");
            data
        } else {
            info!(config_file = %path, "Config file not found, using default embedded config");
            DEFAULT_CONFIG.as_bytes().to_vec()
        };

        let external_value: Value = serde_yaml::from_slice(&yaml_data)?;
        merge_yaml(&mut default_value, &external_value);
        let mut config_value = Self::lower_keys_value(default_value);

        Self::apply_env_overrides(&mut config_value);

        let config = Config {
            config_dir,
            path,
            data: Mutex::new(config_value),
        };

        config.save()?;
        Ok(config)
    }

    fn data(&self) -> MutexGuard<'_, Value> {
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the directory holding `config.yaml`
    pub fn directory(&self) -> &str {
        &self.config_dir
    }

    /// Saves the current configuration to the config.yaml file
    pub fn save(&self) -> Result<()> {
        let yaml = serde_yaml::to_string(&*self.data())?;
        fs::write(&self.path, yaml)?;
        Ok(())
    }

    /// Sets a configuration value at the specified path and saves it
    ///
    /// `path` is the list of keys (e.g. `&["sync", "min_interval_seconds"]`).
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        {
            let mut data = self.data();
            Self::set_value_internal(&mut data, path, value)?;
        }
        self.save()
    }

    fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
        if path.is_empty() {
            *data = value;
            return Ok(());
        }
        if let Value::Mapping(map) = data {
            let key_value = Value::String(path[0].to_lowercase());
            if path.len() == 1 {
                map.insert(key_value, value);
            } else {
                let entry = map
                    .entry(key_value)
                    .or_insert(Value::Mapping(Mapping::new()));
                Self::set_value_internal(entry, &path[1..], value)?;
            }
            Ok(())
        } else {
            Err(anyhow!("Current node is not a map"))
        }
    }

    /// Gets a configuration value at the specified path
    ///
    /// Returns an error if the path doesn't exist.
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self.data();
        Self::get_value_internal(&data, path)
    }

    fn get_value_internal(data: &Value, path: &[&str]) -> Result<Value> {
        let mut current = data;
        for (i, key) in path.iter().enumerate() {
            if let Value::Mapping(map) = current {
                match map.get(&Value::String(key.to_lowercase())) {
                    Some(next) => current = next,
                    None => {
                        return Err(anyhow!("Path {} does not exist", path[..=i].join(".")));
                    }
                }
            } else {
                return Err(anyhow!("Path {} is not a mapping", path[..i].join(".")));
            }
        }
        Ok(current.clone())
    }

    fn apply_env_overrides(config: &mut Value) {
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                let key_path = stripped.split("__").collect::<Vec<_>>();
                let yaml_value = Self::convert_env_value(&value);
                if let Err(err) = Self::set_value_internal(config, &key_path, yaml_value) {
                    warn!(env_var = %key, error = %err, "Ignoring environment override");
                }
            }
        }
    }

    fn convert_env_value(value: &str) -> Value {
        if let Ok(parsed) = serde_yaml::from_str::<Value>(value) {
            return parsed;
        }
        Value::String(value.to_string())
    }

    fn lower_keys_value(value: Value) -> Value {
        match value {
            Value::Mapping(map) => {
                let mut new_map = Mapping::new();
                for (k, v) in map {
                    let key = match k {
                        Value::String(s) => Value::String(s.to_lowercase()),
                        other => other,
                    };
                    new_map.insert(key, Self::lower_keys_value(v));
                }
                Value::Mapping(new_map)
            }
            Value::Sequence(seq) => {
                Value::Sequence(seq.into_iter().map(Self::lower_keys_value).collect())
            }
            _ => value,
        }
    }

    /// Resolves a path relative to the config directory and creates it
    fn resolve_and_create_dir(&self, dir_path: &str) -> Result<String> {
        let path = Path::new(dir_path);

        let absolute_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.config_dir).join(path)
        };

        if !absolute_path.exists() {
            fs::create_dir_all(&absolute_path)?;
            info!(directory = %absolute_path.display(), "Created managed directory");
        }

        Ok(absolute_path.to_string_lossy().to_string())
    }

    /// Gets a directory managed by the configuration
    ///
    /// The value may be absolute or relative to the config directory; it is
    /// created when missing. An unset value is replaced by `default`.
    pub fn get_managed_dir(&self, path: &[&str], default: &str) -> Result<String> {
        let dir_path = match self.get_value(path) {
            Ok(Value::String(s)) if !s.trim().is_empty() => s,
            _ => {
                self.set_managed_dir(path, default.to_string())?;
                default.to_string()
            }
        };
        self.resolve_and_create_dir(&dir_path)
    }

    /// Sets a directory managed by the configuration
    pub fn set_managed_dir(&self, path: &[&str], directory: String) -> Result<()> {
        self.set_value(path, Value::String(directory))
    }

    // ============ Storage ============

    /// Returns the configured storage backend
    pub fn get_storage_backend(&self) -> Result<StorageBackendKind> {
        match self.get_value(&["storage", "backend"]) {
            Ok(Value::String(s)) => s.parse(),
            Ok(_) | Err(_) => Ok(StorageBackendKind::Local),
        }
    }

    /// Sets the storage backend
    pub fn set_storage_backend(&self, kind: StorageBackendKind) -> Result<()> {
        self.set_value(&["storage", "backend"], Value::String(kind.to_string()))
    }

    /// Root directory of the local archive (also hosts the reference caches)
    pub fn get_storage_dir(&self) -> Result<String> {
        self.get_managed_dir(&["storage", "directory"], DEFAULT_STORAGE_DIR)
    }

    impl_string_config!(
        get_remote_base_url,
        set_remote_base_url,
        &["storage", "remote", "base_url"],
        ""
    );

    impl_secret_config!(
        get_remote_token,
        set_remote_token,
        &["storage", "remote", "token"]
    );

    impl_string_config!(
        get_remote_prefix,
        set_remote_prefix,
        &["storage", "remote", "prefix"],
        DEFAULT_REMOTE_PREFIX
    );

    impl_u64_config!(
        get_blob_cache_ttl_seconds,
        set_blob_cache_ttl_seconds,
        &["storage", "blob_cache", "ttl_seconds"],
        DEFAULT_BLOB_CACHE_TTL_SECONDS
    );

    impl_u64_config!(
        get_blob_cache_max_entries,
        set_blob_cache_max_entries,
        &["storage", "blob_cache", "max_entries"],
        DEFAULT_BLOB_CACHE_MAX_ENTRIES
    );

    // ============ ESI ============

    impl_string_config!(
        get_esi_base_url,
        set_esi_base_url,
        &["esi", "base_url"],
        DEFAULT_ESI_BASE_URL
    );

    impl_string_config!(
        get_esi_sso_token_url,
        set_esi_sso_token_url,
        &["esi", "sso_token_url"],
        DEFAULT_ESI_SSO_TOKEN_URL
    );

    impl_secret_config!(get_esi_client_id, set_esi_client_id, &["esi", "client_id"]);

    impl_secret_config!(
        get_esi_client_secret,
        set_esi_client_secret,
        &["esi", "client_secret"]
    );

    impl_string_config!(
        get_esi_user_agent,
        set_esi_user_agent,
        &["esi", "user_agent"],
        DEFAULT_ESI_USER_AGENT
    );

    impl_u64_config!(
        get_esi_max_retries,
        set_esi_max_retries,
        &["esi", "max_retries"],
        DEFAULT_ESI_MAX_RETRIES
    );

    impl_u64_config!(
        get_esi_timeout_seconds,
        set_esi_timeout_seconds,
        &["esi", "timeout_seconds"],
        DEFAULT_ESI_TIMEOUT_SECONDS
    );

    // ============ Reference data ============

    impl_string_config!(
        get_refdata_base_url,
        set_refdata_base_url,
        &["refdata", "base_url"],
        DEFAULT_REFDATA_BASE_URL
    );

    impl_u64_config!(
        get_refdata_ttl_days,
        set_refdata_ttl_days,
        &["refdata", "ttl_days"],
        DEFAULT_REFDATA_TTL_DAYS
    );

    impl_u64_config!(
        get_refdata_table_memory_ttl_seconds,
        set_refdata_table_memory_ttl_seconds,
        &["refdata", "table_memory_ttl_seconds"],
        DEFAULT_REFDATA_TABLE_MEMORY_TTL_SECONDS
    );

    // ============ Appraisal ============

    impl_string_config!(
        get_appraisal_base_url,
        set_appraisal_base_url,
        &["appraisal", "base_url"],
        DEFAULT_APPRAISAL_BASE_URL
    );

    impl_secret_config!(
        get_appraisal_api_key,
        set_appraisal_api_key,
        &["appraisal", "api_key"]
    );

    impl_u64_config!(
        get_appraisal_market,
        set_appraisal_market,
        &["appraisal", "market"],
        DEFAULT_APPRAISAL_MARKET
    );

    impl_string_config!(
        get_appraisal_pricing,
        set_appraisal_pricing,
        &["appraisal", "pricing"],
        DEFAULT_APPRAISAL_PRICING
    );

    impl_string_config!(
        get_appraisal_variant,
        set_appraisal_variant,
        &["appraisal", "variant"],
        DEFAULT_APPRAISAL_VARIANT
    );

    impl_u64_config!(
        get_appraisal_ttl_days,
        set_appraisal_ttl_days,
        &["appraisal", "ttl_days"],
        DEFAULT_APPRAISAL_TTL_DAYS
    );

    // ============ Sync ============

    impl_u64_config!(
        get_sync_min_interval_seconds,
        set_sync_min_interval_seconds,
        &["sync", "min_interval_seconds"],
        DEFAULT_SYNC_MIN_INTERVAL_SECONDS
    );

    // ============ Logging ============

    impl_bool_config!(
        get_log_enable_console,
        set_log_enable_console,
        &["host", "logger", "enable_console"],
        true
    );

    impl_string_config!(
        get_log_min_level,
        set_log_min_level,
        &["host", "logger", "min_level"],
        DEFAULT_LOG_MIN_LEVEL
    );
}

/// Returns the global configuration instance, loaded on first access
pub fn get_config() -> Arc<Config> {
    CONFIG.clone()
}

/// Merges an external YAML tree into the default tree
///
/// Mappings are merged key by key; scalars and sequences from `external`
/// replace the default.
fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config() -> (tempfile::TempDir, Config) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();
        (dir, config)
    }

    #[test]
    fn test_defaults_are_loaded() {
        let (_dir, config) = temp_config();
        assert_eq!(config.get_storage_backend().unwrap(), StorageBackendKind::Local);
        assert_eq!(config.get_blob_cache_max_entries(), 500);
        assert_eq!(config.get_esi_max_retries(), 1);
        assert_eq!(config.get_appraisal_pricing(), "split");
        assert!(config.get_appraisal_api_key().is_none());
    }

    #[test]
    fn test_user_file_is_merged() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("config.yaml"),
            "storage:\n  backend: remote\nsync:\n  min_interval_seconds: 60\n",
        )
        .unwrap();

        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(config.get_storage_backend().unwrap(), StorageBackendKind::Remote);
        assert_eq!(config.get_sync_min_interval_seconds(), 60);
        // untouched defaults survive the merge
        assert_eq!(config.get_refdata_ttl_days(), 30);
    }

    #[test]
    fn test_set_value_persists() {
        let (dir, config) = temp_config();
        config.set_appraisal_ttl_days(14).unwrap();

        let reloaded = Config::load_config(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(reloaded.get_appraisal_ttl_days(), 14);
    }

    #[test]
    fn test_managed_dir_is_created_relative_to_config() {
        let (dir, config) = temp_config();
        let storage = config.get_storage_dir().unwrap();
        assert!(Path::new(&storage).is_dir());
        assert!(Path::new(&storage).starts_with(dir.path()));
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        assert!("tape".parse::<StorageBackendKind>().is_err());
        assert_eq!(
            "Remote".parse::<StorageBackendKind>().unwrap(),
            StorageBackendKind::Remote
        );
    }

    #[test]
    fn test_merge_yaml_replaces_scalars() {
        let mut base: Value = serde_yaml::from_str("a:\n  b: 1\n  c: 2\n").unwrap();
        let ext: Value = serde_yaml::from_str("a:\n  b: 5\n").unwrap();
        merge_yaml(&mut base, &ext);
        let b = Config::get_value_internal(&base, &["a", "b"]).unwrap();
        let c = Config::get_value_internal(&base, &["a", "c"]).unwrap();
        assert_eq!(b, Value::Number(Number::from(5)));
        assert_eq!(c, Value::Number(Number::from(2)));
    }
}
