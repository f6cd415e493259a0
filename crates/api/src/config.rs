//! Application configuration

use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,
    pub public_url: String,

    // Database
    pub database_url: String,
    pub database_direct_url: Option<String>,

    // Hosted auth provider (Supabase-compatible)
    pub auth_url: String,
    pub auth_anon_key: String,
    pub auth_jwt_secret: String,

    // Feature flags
    pub enable_billing: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Server
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            public_url: env::var("PUBLIC_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),

            // Database
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
            database_direct_url: env::var("DATABASE_DIRECT_URL").ok(),

            // Hosted auth provider
            auth_url: env::var("AUTH_URL").map_err(|_| ConfigError::Missing("AUTH_URL"))?,
            auth_anon_key: env::var("AUTH_ANON_KEY").unwrap_or_else(|_| "".to_string()),
            auth_jwt_secret: {
                let secret = env::var("AUTH_JWT_SECRET")
                    .map_err(|_| ConfigError::Missing("AUTH_JWT_SECRET"))?;
                // JWT signing keys below 32 characters are brute-forceable
                if secret.len() < 32 {
                    return Err(ConfigError::WeakSecret(
                        "AUTH_JWT_SECRET must be at least 32 characters",
                    ));
                }
                secret
            },

            // Feature flags
            enable_billing: env::var("ENABLE_BILLING")
                .map(|v| v.to_lowercase() != "false")
                .unwrap_or(true),
        })
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Weak secret: {0}")]
    WeakSecret(&'static str),
}
