use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_CURRENCY: &str = "gbp";
const DEFAULT_WEBHOOK_TOLERANCE_SECS: u64 = 300;
const DEFAULT_SANITY_API_VERSION: &str = "2021-10-21";

/// Secrets that must be present before the server starts. Routes that
/// move money or mutate documents all depend on at least one of these.
const REQUIRED_SECRETS: &[(&str, &str)] = &[
    ("stripe_secret_key", "APP__STRIPE_SECRET_KEY"),
    ("stripe_webhook_secret", "APP__STRIPE_WEBHOOK_SECRET"),
    ("admin_api_secret", "APP__ADMIN_API_SECRET"),
    ("sanity_token", "APP__SANITY_TOKEN"),
    ("sanity_webhook_secret", "APP__SANITY_WEBHOOK_SECRET"),
    ("resend_api_key", "APP__RESEND_API_KEY"),
];

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Public base URL of the storefront, used for checkout redirect URLs
    #[validate(length(min = 1))]
    pub site_url: String,

    /// Payment provider secret API key
    #[validate(length(min = 1))]
    pub stripe_secret_key: String,

    /// Signing secret for inbound payment-provider webhooks
    #[validate(length(min = 1))]
    pub stripe_webhook_secret: String,

    /// Signature timestamp tolerance for both webhook receivers (seconds)
    #[serde(default = "default_webhook_tolerance_secs")]
    pub webhook_tolerance_secs: u64,

    /// Shared secret presented by the CMS studio's admin action buttons
    #[validate(length(min = 1))]
    pub admin_api_secret: String,

    /// Document store project identifier
    #[validate(length(min = 1))]
    pub sanity_project_id: String,

    /// Document store dataset
    #[serde(default = "default_sanity_dataset")]
    pub sanity_dataset: String,

    /// Document store API version (date string)
    #[serde(default = "default_sanity_api_version")]
    pub sanity_api_version: String,

    /// Document store write token
    #[validate(length(min = 1))]
    pub sanity_token: String,

    /// Signing secret for inbound content-lake webhooks
    #[validate(length(min = 1))]
    pub sanity_webhook_secret: String,

    /// Transactional email API key
    #[validate(length(min = 1))]
    pub resend_api_key: String,

    /// Sender address for transactional email
    #[validate(email)]
    pub resend_from_email: String,

    /// Site-owner address that receives enquiry and quote notifications
    #[validate(email)]
    pub notify_email: String,

    /// Currency for one-off charges (ISO 4217, lowercase)
    #[serde(default = "default_currency")]
    pub default_currency: String,

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS fallback
    #[serde(default)]
    pub cors_allow_any_origin: bool,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_webhook_tolerance_secs() -> u64 {
    DEFAULT_WEBHOOK_TOLERANCE_SECS
}

fn default_sanity_dataset() -> String {
    "production".to_string()
}

fn default_sanity_api_version() -> String {
    DEFAULT_SANITY_API_VERSION.to_string()
}

impl AppConfig {
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Returns true if explicit CORS origins are configured
    pub fn has_cors_allowed_origins(&self) -> bool {
        self.cors_allowed_origins
            .as_ref()
            .map(|raw| raw.split(',').any(|origin| !origin.trim().is_empty()))
            .unwrap_or(false)
    }

    /// Whether we should fall back to permissive CORS
    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.should_allow_permissive_cors() && !self.has_cors_allowed_origins() {
            let mut err = ValidationError::new("cors_allowed_origins_required");
            err.message = Some(
                "Set APP__CORS_ALLOWED_ORIGINS for non-development environments or explicitly opt-in via APP__CORS_ALLOW_ANY_ORIGIN=true".into(),
            );
            errors.add("cors_allowed_origins", err);
        }

        if !self.default_currency.chars().all(|c| c.is_ascii_lowercase())
            || self.default_currency.len() != 3
        {
            let mut err = ValidationError::new("invalid_currency");
            err.message = Some("default_currency must be a lowercase ISO 4217 code".into());
            errors.add("default_currency", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Initialize tracing with env-filter; `RUST_LOG` wins over the
/// configured level when set.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::fmt;

    let default_directive = format!("storefront_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

/// Loads configuration from layered files plus `APP__`-prefixed
/// environment variables.
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let builder = Config::builder()
        .set_default("host", "0.0.0.0")?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .set_default("site_url", "http://localhost:3000")?
        .set_default("sanity_project_id", "local")?
        .set_default("resend_from_email", "orders@example.com")?
        .set_default("notify_email", "owner@example.com")?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false));

    let config = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    // The secrets have no defaults - they must come from an environment
    // variable or config file, and startup aborts if any is missing.
    for (key, env_var) in REQUIRED_SECRETS {
        if config.get_string(key).is_err() {
            error!(
                "Missing required secret '{}'. Set the {} environment variable.",
                key, env_var
            );
            return Err(AppConfigError::Load(ConfigError::NotFound(format!(
                "{} is required but not configured. Set the {} environment variable.",
                key, env_var
            ))));
        }
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    Ok(app_config)
}
