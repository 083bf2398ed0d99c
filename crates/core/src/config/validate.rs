use super::{types::Config, ConfigError};

/// Validate configuration invariants that serde cannot express.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.admin.enabled && config.admin.port == 0 {
        return Err(ConfigError::ValidationError(
            "admin.port cannot be 0".to_string(),
        ));
    }

    if config.converter.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "converter.timeout_secs must be greater than 0".to_string(),
        ));
    }

    if config.progress.rescan_interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "progress.rescan_interval_secs must be greater than 0".to_string(),
        ));
    }

    if config.progress.merge_dir == config.progress.untagged_dir {
        return Err(ConfigError::ValidationError(
            "progress.merge_dir and progress.untagged_dir must differ".to_string(),
        ));
    }

    if config.backup.retention == 0 {
        return Err(ConfigError::ValidationError(
            "backup.retention must be at least 1".to_string(),
        ));
    }

    if config.orchestrator.max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.max_attempts must be at least 1".to_string(),
        ));
    }

    if config.database.lock_retry.max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "database.lock_retry.max_attempts must be at least 1".to_string(),
        ));
    }

    Ok(())
}
