use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::time::Duration;

use crate::errors::{AppError, AppResult};
use crate::security::InputValidator;
use crate::uploader::{Credentials, DispatchOptions, UploadTarget};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub domain: String,
    pub uses_basic_auth: bool,
    pub basic_auth_username: String,
    pub basic_auth_password: String,
    pub max_concurrent_uploads: usize, // 0 = unbounded
    pub request_timeout_secs: u64,
    pub retry_failed_rounds: u32,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            domain: "http://localhost:8080".to_string(),
            uses_basic_auth: false,
            basic_auth_username: String::new(),
            basic_auth_password: String::new(),
            max_concurrent_uploads: 0,
            request_timeout_secs: 120,
            retry_failed_rounds: 0,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn credentials(&self) -> Option<Credentials> {
        self.uses_basic_auth.then(|| {
            Credentials::new(
                self.basic_auth_username.clone(),
                self.basic_auth_password.clone(),
            )
        })
    }

    pub fn upload_target(&self) -> AppResult<UploadTarget> {
        UploadTarget::new(&self.domain, self.credentials())
    }

    pub fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            max_concurrent: self.max_concurrent_uploads,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    pub fn log_filter(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

pub fn get_config_path() -> AppResult<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| AppError::Config("Could not find config directory".to_string()))?
        .join("AndTransfer");

    Ok(config_dir.join("config.json"))
}

pub fn load_config() -> AppResult<Config> {
    load_config_from(&get_config_path()?)
}

pub fn load_config_from(config_path: &Path) -> AppResult<Config> {
    let config = read_config_from(config_path)?;
    validate_config(&config)?;
    Ok(config)
}

/// Read the stored config without validating it, creating the default file
/// when none exists. Callers that apply overrides validate afterwards.
pub fn read_config_from(config_path: &Path) -> AppResult<Config> {
    if config_path.exists() {
        let config_str = fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&config_str).unwrap_or_else(|e| {
            log::warn!("Failed to parse config file: {}. Using defaults.", e);
            Config::default()
        });

        Ok(config)
    } else {
        let default_config = Config::default();
        save_config_internal(config_path, &default_config)?;
        Ok(default_config)
    }
}

pub fn save_config(config: &Config) -> AppResult<()> {
    save_config_to(&get_config_path()?, config)
}

pub fn save_config_to(config_path: &Path, config: &Config) -> AppResult<()> {
    validate_config(config)?;
    save_config_internal(config_path, config)
}

fn save_config_internal(config_path: &Path, config: &Config) -> AppResult<()> {
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }

    // Create backup of existing config
    if config_path.exists() {
        let backup_path = config_path.with_extension("json.bak");
        if let Err(e) = fs::copy(config_path, &backup_path) {
            log::warn!("Failed to create config backup: {}", e);
        }
    }

    let config_str = serde_json::to_string_pretty(config)?;
    fs::write(config_path, config_str)?;

    log::info!("Configuration saved to {}", config_path.display());
    Ok(())
}

pub fn validate_config(config: &Config) -> AppResult<()> {
    InputValidator::validate_domain(&config.domain)?;

    if config.uses_basic_auth {
        InputValidator::validate_username(&config.basic_auth_username)?;
        InputValidator::validate_password(&config.basic_auth_password)?;
    }

    if config.request_timeout_secs == 0 || config.request_timeout_secs > 3600 {
        return Err(AppError::validation(
            "request_timeout_secs",
            "Must be between 1 and 3600",
        ));
    }

    if config.retry_failed_rounds > 10 {
        return Err(AppError::validation(
            "retry_failed_rounds",
            "Must be 10 or fewer",
        ));
    }

    let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
    if !valid_log_levels.contains(&config.log_level.as_str()) {
        return Err(AppError::validation("log_level", "Must be a valid log level"));
    }

    Ok(())
}

pub fn reset_config() -> AppResult<()> {
    reset_config_at(&get_config_path()?)
}

pub fn reset_config_at(config_path: &Path) -> AppResult<()> {
    if config_path.exists() {
        let backup_path = config_path.with_extension("json.reset_backup");
        fs::copy(config_path, &backup_path)?;
        log::info!("Existing config backed up to {}", backup_path.display());
    }

    save_config_internal(config_path, &Config::default())?;

    log::info!("Configuration reset to defaults");
    Ok(())
}
