//! Error bridge implementations for root-crate errors.
//!
//! These bridges live in the root crate rather than `storyrun-core` because
//! the configuration layer (and its `toml` dependency) is not part of core.

use storyrun_core::error::StoryError;

use crate::config::ConfigError;

// ============================================================================
// Bridge: ConfigError -> StoryError
// ============================================================================

impl From<ConfigError> for StoryError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Io { .. } => StoryError::internal(err.to_string()),
            ConfigError::Parse { .. } | ConfigError::InvalidValue { .. } => {
                StoryError::configuration(err.to_string())
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
