use reqwest::Url;

use crate::errors::{AppError, AppResult};

pub struct InputValidator;

impl InputValidator {
    pub fn validate_domain(domain: &str) -> AppResult<()> {
        let trimmed = domain.trim();

        if trimmed.is_empty() {
            return Err(AppError::validation("domain", "Server domain cannot be empty"));
        }

        if trimmed.len() > 2048 {
            return Err(AppError::validation("domain", "Server domain too long"));
        }

        let url = Url::parse(trimmed).map_err(|_| AppError::invalid_domain(trimmed))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(AppError::invalid_domain(trimmed));
        }

        if url.host_str().map_or(true, str::is_empty) {
            return Err(AppError::invalid_domain(trimmed));
        }

        // Item names are appended as path segments
        if url.query().is_some() || url.fragment().is_some() {
            return Err(AppError::validation(
                "domain",
                "Server domain cannot contain a query or fragment",
            ));
        }

        Ok(())
    }

    /// RFC 7617: the user-id of basic auth cannot contain a colon.
    pub fn validate_username(username: &str) -> AppResult<()> {
        if username.is_empty() {
            return Err(AppError::validation("username", "Username cannot be empty"));
        }

        if username.contains(':') {
            return Err(AppError::validation("username", "Username cannot contain ':'"));
        }

        if username.chars().any(char::is_control) {
            return Err(AppError::validation(
                "username",
                "Username contains control characters",
            ));
        }

        Ok(())
    }

    pub fn validate_password(password: &str) -> AppResult<()> {
        if password.chars().any(char::is_control) {
            return Err(AppError::validation(
                "password",
                "Password contains control characters",
            ));
        }

        Ok(())
    }
}
