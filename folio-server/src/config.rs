use anyhow::{Context, Result};
use std::env;

#[derive(Clone)]
pub struct Config {
    pub github_token: String,
    pub github_owner: String,
    pub github_repo: String,
    /// Secret used to seal verification codes before they reach the issue
    /// tracker.
    pub verification_secret: String,
    /// Lifetime of a verification code, in seconds.
    pub verification_ttl_secs: u64,
    pub port: u16,
    /// Optional bearer token for admin/ban mutation endpoints.
    /// If not set, those endpoints are disabled (they return 403 Forbidden).
    pub admin_auth_token: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let github_token =
            env::var("GITHUB_TOKEN").context("GITHUB_TOKEN environment variable is required")?;

        let github_owner =
            env::var("GITHUB_OWNER").context("GITHUB_OWNER environment variable is required")?;

        let github_repo =
            env::var("GITHUB_REPO").context("GITHUB_REPO environment variable is required")?;

        let verification_secret = env::var("VERIFICATION_SECRET")
            .context("VERIFICATION_SECRET environment variable is required")?;

        let verification_ttl_secs = env::var("VERIFICATION_TTL_SECS")
            .unwrap_or_else(|_| "900".to_string())
            .parse::<u64>()
            .context("VERIFICATION_TTL_SECS must be a valid number")?;

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .context("PORT must be a valid number")?;

        let admin_auth_token = parse_admin_auth_token(env::var("ADMIN_AUTH_TOKEN").ok());

        Ok(Config {
            github_token,
            github_owner,
            github_repo,
            verification_secret,
            verification_ttl_secs,
            port,
            admin_auth_token,
        })
    }
}

/// Parse ADMIN_AUTH_TOKEN from an optional string value.
///
/// Returns None if the value is missing, empty, or contains only whitespace.
/// An empty token must not be treated as configured, or every request with an
/// empty Authorization header would be allowed through.
pub fn parse_admin_auth_token(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
