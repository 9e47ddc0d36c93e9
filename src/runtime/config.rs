// SPDX-License-Identifier: MIT

//! Gatekeeper configuration.
//!
//! Every field has a default, so an empty document (or no file at all) yields
//! a working configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_PROFILE_NAME: &str = "GrackleGate_Script_Sandbox";
pub const DEFAULT_DISPLAY_NAME: &str = "Grackle Gate Script Runtime";
pub const DEFAULT_DESCRIPTION: &str = "Sandboxed environment for agent-produced scripts";
pub const DEFAULT_SCANNER_APP_NAME: &str = "GrackleGate";

// AppContainer profile names are limited to 64 characters.
const MAX_PROFILE_NAME_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatekeeperConfig {
    pub profile: ProfileConfig,
    pub scanner: ScannerConfig,
    pub launch: LaunchConfig,
}

/// The durable sandbox profile that every launch runs under.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProfileConfig {
    /// Fixed profile name; the OS persists the profile under this name.
    pub name: String,
    pub display_name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScannerConfig {
    /// Application name registered with the scanning service.
    pub app_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LaunchConfig {
    /// Network policy for requests that do not state one.
    pub network_by_default: bool,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_PROFILE_NAME.to_string(),
            display_name: DEFAULT_DISPLAY_NAME.to_string(),
            description: DEFAULT_DESCRIPTION.to_string(),
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            app_name: DEFAULT_SCANNER_APP_NAME.to_string(),
        }
    }
}

impl Default for LaunchConfig {
    fn default() -> Self {
        // Matches the documented interface default.  Requests that rely on it
        // are logged, see `NetworkPolicy::Default`.
        Self {
            network_by_default: true,
        }
    }
}

impl GatekeeperConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: GatekeeperConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.profile.validate()?;
        if self.scanner.app_name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "scanner.app_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl ProfileConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let name = &self.name;
        if name.is_empty() {
            return Err(ConfigError::Invalid("profile.name must not be empty".to_string()));
        }
        if name.chars().count() > MAX_PROFILE_NAME_LEN {
            return Err(ConfigError::Invalid(format!(
                "profile.name must be at most {MAX_PROFILE_NAME_LEN} characters"
            )));
        }
        if let Some(c) = name
            .chars()
            .find(|c| c.is_whitespace() || c.is_control() || matches!(c, '\\' | '/'))
        {
            return Err(ConfigError::Invalid(format!(
                "profile.name contains the forbidden character {c:?}"
            )));
        }
        Ok(())
    }
}
