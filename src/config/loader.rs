//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::EhrglotConfig;
use crate::domain::errors::EhrglotError;
use crate::domain::result::Result;
use crate::masking::MaskingPlatform;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("env var pattern is valid")
});

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into EhrglotConfig
/// 4. Applies environment variable overrides (EHRGLOT_* prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Returns an error if:
/// - File cannot be read
/// - TOML parsing fails
/// - A referenced environment variable is not set
/// - Configuration validation fails
///
/// # Examples
///
/// ```no_run
/// use ehrglot::config::loader::load_config;
///
/// let config = load_config("ehrglot.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<EhrglotConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(EhrglotError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        EhrglotError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    let contents = substitute_env_vars(&contents)?;

    let config: EhrglotConfig = toml::from_str(&contents)
        .map_err(|e| EhrglotError::Configuration(format!("Failed to parse TOML: {}", e)))?;

    finish(config)
}

/// Defaults with environment overrides applied, for running without a file
pub fn default_config() -> Result<EhrglotConfig> {
    finish(EhrglotConfig::default())
}

fn finish(mut config: EhrglotConfig) -> Result<EhrglotConfig> {
    apply_env_overrides(&mut config)?;

    config.validate().map_err(|e| {
        EhrglotError::Configuration(format!("Configuration validation failed: {}", e))
    })?;

    Ok(config)
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// Comment lines are copied unchanged. Every missing variable is reported in
/// one error.
fn substitute_env_vars(input: &str) -> Result<String> {
    let mut result = String::new();
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let mut processed_line = line.to_string();
        for cap in ENV_VAR_PATTERN.captures_iter(line) {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => {
                    let placeholder = format!("${{{}}}", var_name);
                    processed_line = processed_line.replace(&placeholder, &value);
                }
                Err(_) => {
                    if !missing_vars.iter().any(|v| v == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                }
            }
        }
        result.push_str(&processed_line);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(EhrglotError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

fn env_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Applies environment variable overrides using EHRGLOT_* prefix
///
/// Environment variables follow the pattern: EHRGLOT_<SECTION>_<KEY>
/// For example: EHRGLOT_SCHEMAS_SCHEMA_DIR, EHRGLOT_MASKING_PLATFORM.
/// Role lists are comma-separated.
fn apply_env_overrides(config: &mut EhrglotConfig) -> Result<()> {
    // Application overrides
    if let Ok(val) = std::env::var("EHRGLOT_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }

    // Schema overrides
    if let Ok(val) = std::env::var("EHRGLOT_SCHEMAS_SCHEMA_DIR") {
        config.schemas.schema_dir = PathBuf::from(val);
    }
    if let Ok(val) = std::env::var("EHRGLOT_SCHEMAS_OVERRIDE_DIR") {
        config.schemas.override_dir = Some(PathBuf::from(val));
    }

    // Detection overrides
    if let Ok(val) = std::env::var("EHRGLOT_DETECTION_SAMPLE_SIZE") {
        if let Ok(size) = val.parse() {
            config.detection.sample_size = size;
        }
    }
    if let Ok(val) = std::env::var("EHRGLOT_DETECTION_CONFIDENCE_THRESHOLD") {
        if let Ok(threshold) = val.parse() {
            config.detection.confidence_threshold = threshold;
        }
    }
    if let Ok(val) = std::env::var("EHRGLOT_DETECTION_VALUE_MATCH_THRESHOLD") {
        if let Ok(threshold) = val.parse() {
            config.detection.value_match_threshold = threshold;
        }
    }

    // Masking overrides
    if let Ok(val) = std::env::var("EHRGLOT_MASKING_PLATFORM") {
        config.masking.platform = Some(val.parse::<MaskingPlatform>()?);
    }
    if let Ok(val) = std::env::var("EHRGLOT_MASKING_FULL_ACCESS_ROLES") {
        config.masking.full_access_roles = env_list(&val);
    }
    if let Ok(val) = std::env::var("EHRGLOT_MASKING_PARTIAL_ACCESS_ROLES") {
        config.masking.partial_access_roles = env_list(&val);
    }
    if let Ok(val) = std::env::var("EHRGLOT_MASKING_NO_ACCESS_ROLES") {
        config.masking.no_access_roles = env_list(&val);
    }
    if let Ok(val) = std::env::var("EHRGLOT_MASKING_INCLUDE_DROPS") {
        config.masking.include_drops = val.parse().unwrap_or(false);
    }

    // Conversion overrides
    if let Ok(val) = std::env::var("EHRGLOT_CONVERSION_VALIDATE") {
        config.conversion.validate = val.parse().unwrap_or(true);
    }
    if let Ok(val) = std::env::var("EHRGLOT_CONVERSION_FAIL_ON_VALIDATION_ERROR") {
        config.conversion.fail_on_validation_error = val.parse().unwrap_or(false);
    }
    if let Ok(val) = std::env::var("EHRGLOT_CONVERSION_AUTO_DETECT_PII") {
        config.conversion.auto_detect_pii = val.parse().unwrap_or(true);
    }
    if let Ok(val) = std::env::var("EHRGLOT_CONVERSION_GENERATE_MASKING_POLICIES") {
        config.conversion.generate_masking_policies = val.parse().unwrap_or(true);
    }

    // Logging overrides
    if let Ok(val) = std::env::var("EHRGLOT_LOGGING_LOCAL_ENABLED") {
        config.logging.local_enabled = val.parse().unwrap_or(false);
    }
    if let Ok(val) = std::env::var("EHRGLOT_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }
    if let Ok(val) = std::env::var("EHRGLOT_LOGGING_LOCAL_ROTATION") {
        config.logging.local_rotation = val;
    }

    // Audit overrides
    if let Ok(val) = std::env::var("EHRGLOT_AUDIT_ENABLED") {
        config.audit.enabled = val.parse().unwrap_or(false);
    }
    if let Ok(val) = std::env::var("EHRGLOT_AUDIT_LOG_PATH") {
        config.audit.log_path = PathBuf::from(val);
    }

    Ok(())
}
