//! # Renderer Configuration
//!
//! Settings consumed when bringing up the Vulkan instance and device and
//! when sizing the descriptor pool that meshes allocate from.

use serde::{Deserialize, Serialize};

pub use crate::config::{Config, ConfigError};

/// # Vulkan Renderer Configuration
///
/// Application metadata, validation, device selection policy and the
/// optional capabilities to request at device creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Application name for Vulkan instance creation
    pub application_name: String,
    /// Application version (major, minor, patch)
    pub application_version: (u32, u32, u32),
    /// Whether to enable Vulkan validation layers.
    ///
    /// `None` enables them in debug builds when the layer is installed;
    /// `Some(true)` fails instance creation if the layer is missing.
    pub enable_validation: Option<bool>,
    /// Accept integrated GPUs when no discrete GPU is present
    pub allow_integrated_gpu: bool,
    /// Device extensions that must be present
    pub required_device_extensions: Vec<String>,
    /// Device extensions enabled only when available
    pub optional_device_extensions: Vec<String>,
    /// Maximum descriptor sets (one per mesh) in the default pool
    pub max_descriptor_sets: u32,
    /// Log level used when `RUST_LOG` is not set
    pub log_level: String,
}

impl RendererConfig {
    /// Create a new renderer configuration
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            application_version: (1, 0, 0),
            enable_validation: None,
            allow_integrated_gpu: true,
            required_device_extensions: Vec::new(),
            optional_device_extensions: Vec::new(),
            max_descriptor_sets: 64,
            log_level: "info".to_string(),
        }
    }

    /// Set application version
    pub fn with_version(mut self, major: u32, minor: u32, patch: u32) -> Self {
        self.application_version = (major, minor, patch);
        self
    }

    /// Enable or disable validation layers
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = Some(enabled);
        self
    }

    /// Allow or refuse integrated GPUs
    pub fn with_integrated_gpu(mut self, allowed: bool) -> Self {
        self.allow_integrated_gpu = allowed;
        self
    }

    /// Require a device extension
    pub fn with_required_extension(mut self, name: impl Into<String>) -> Self {
        self.required_device_extensions.push(name.into());
        self
    }

    /// Request a device extension if the device offers it
    pub fn with_optional_extension(mut self, name: impl Into<String>) -> Self {
        self.optional_device_extensions.push(name.into());
        self
    }

    /// Set descriptor pool capacity
    pub fn with_max_descriptor_sets(mut self, sets: u32) -> Self {
        self.max_descriptor_sets = sets;
        self
    }

    /// Resolve the validation setting for the current build
    pub fn validation_requested(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }

    /// Whether a missing validation layer is an error
    pub fn validation_required(&self) -> bool {
        self.enable_validation == Some(true)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.application_name.is_empty() {
            return Err(ConfigError::Invalid("Application name cannot be empty".to_string()));
        }

        if self.max_descriptor_sets == 0 {
            return Err(ConfigError::Invalid("Descriptor pool needs at least one set".to_string()));
        }

        if self.log_level.parse::<log::LevelFilter>().is_err() {
            return Err(ConfigError::Invalid(format!("Unknown log level: {}", self.log_level)));
        }

        if let Some(name) = self
            .required_device_extensions
            .iter()
            .chain(&self.optional_device_extensions)
            .find(|name| name.is_empty() || name.contains('\0'))
        {
            return Err(ConfigError::Invalid(format!("Malformed extension name: {name:?}")));
        }

        Ok(())
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self::new("vk_scene application")
    }
}

impl Config for RendererConfig {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFormat;

    #[test]
    fn test_defaults_are_valid() {
        let config = RendererConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.allow_integrated_gpu);
        assert_eq!(config.validation_requested(), cfg!(debug_assertions));
        assert!(!config.validation_required());
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let text = r#"
            application_name = "mesh viewer"
            enable_validation = true
            optional_device_extensions = ["VK_EXT_memory_budget"]
        "#;

        let config = RendererConfig::from_str_with_format(text, ConfigFormat::Toml).unwrap();

        assert_eq!(config.application_name, "mesh viewer");
        assert!(config.validation_required());
        assert_eq!(config.optional_device_extensions, vec!["VK_EXT_memory_budget".to_string()]);
        assert_eq!(config.max_descriptor_sets, RendererConfig::default().max_descriptor_sets);
    }

    #[test]
    fn test_ron_document() {
        let text = r#"(application_name: "ron app", allow_integrated_gpu: false)"#;
        let config = RendererConfig::from_str_with_format(text, ConfigFormat::Ron).unwrap();

        assert_eq!(config.application_name, "ron app");
        assert!(!config.allow_integrated_gpu);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(RendererConfig::new("").validate().is_err());
        assert!(RendererConfig::default().with_max_descriptor_sets(0).validate().is_err());
        assert!(RendererConfig::default().with_required_extension("").validate().is_err());

        let mut config = RendererConfig::default();
        config.log_level = "loud".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
