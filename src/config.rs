use crate::gles::GL_SRGB8_ALPHA8;
use crate::vr::{
    FormFactor, KHR_ANDROID_CREATE_INSTANCE_EXTENSION_NAME, KHR_OPENGL_ES_ENABLE_EXTENSION_NAME,
    ReferenceSpaceType, SwapchainCreateInfo, SwapchainUsageFlags, Version, ViewConfigurationType,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

mod xr_serde;

/// `XR_MAX_APPLICATION_NAME_SIZE` minus the terminating NUL.
pub const MAX_APPLICATION_NAME_LEN: usize = 127;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Swapchain parameters. Width and height come from the runtime's
/// recommended view size, everything else from here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwapchainConfig {
    pub format: i64,
    #[serde(with = "xr_serde::usage")]
    pub usage: SwapchainUsageFlags,
    pub face_count: u32,
    pub array_size: u32,
    pub mip_count: u32,
    pub sample_count: u32,
}

impl Default for SwapchainConfig {
    fn default() -> Self {
        Self {
            format: GL_SRGB8_ALPHA8,
            usage: SwapchainUsageFlags::SAMPLED | SwapchainUsageFlags::COLOR_ATTACHMENT,
            face_count: 1,
            array_size: 2,
            mip_count: 1,
            sample_count: 1,
        }
    }
}

impl SwapchainConfig {
    pub fn create_info(&self, width: u32, height: u32) -> SwapchainCreateInfo {
        SwapchainCreateInfo {
            usage_flags: self.usage,
            format: self.format,
            sample_count: self.sample_count,
            width,
            height,
            face_count: self.face_count,
            array_size: self.array_size,
            mip_count: self.mip_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub application_name: String,
    pub application_version: u32,
    pub engine_name: String,
    pub engine_version: u32,
    #[serde(with = "xr_serde::version")]
    pub api_version: Version,
    /// Instance extensions enabled on top of the GLES and Android ones.
    pub extra_extensions: Vec<String>,
    #[serde(with = "xr_serde::form_factor")]
    pub form_factor: FormFactor,
    #[serde(with = "xr_serde::view_configuration")]
    pub view_configuration: ViewConfigurationType,
    #[serde(with = "xr_serde::reference_space")]
    pub reference_space: ReferenceSpaceType,
    pub swapchain: SwapchainConfig,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            application_name: "HelloXR".to_string(),
            application_version: 1,
            engine_name: "HelloXR".to_string(),
            engine_version: 1,
            api_version: Version::new(1, 0, 0),
            extra_extensions: Vec::new(),
            form_factor: FormFactor::HEAD_MOUNTED_DISPLAY,
            view_configuration: ViewConfigurationType::PRIMARY_STEREO,
            reference_space: ReferenceSpaceType::STAGE,
            swapchain: SwapchainConfig::default(),
        }
    }
}

impl BootstrapConfig {
    pub fn from_json_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = fs::read_to_string(path)?;
        Self::from_json_str(&source)
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.application_name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "application_name must not be empty".to_string(),
            ));
        }
        if self.application_name.len() > MAX_APPLICATION_NAME_LEN {
            return Err(ConfigError::Invalid(format!(
                "application_name is {} bytes, limit is {MAX_APPLICATION_NAME_LEN}",
                self.application_name.len()
            )));
        }
        if self.engine_name.len() > MAX_APPLICATION_NAME_LEN {
            return Err(ConfigError::Invalid(format!(
                "engine_name is {} bytes, limit is {MAX_APPLICATION_NAME_LEN}",
                self.engine_name.len()
            )));
        }

        let swapchain = &self.swapchain;
        for (label, value) in [
            ("face_count", swapchain.face_count),
            ("array_size", swapchain.array_size),
            ("mip_count", swapchain.mip_count),
            ("sample_count", swapchain.sample_count),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!(
                    "swapchain.{label} must be at least 1"
                )));
            }
        }
        if swapchain.usage.is_empty() {
            return Err(ConfigError::Invalid(
                "swapchain.usage must name at least one flag".to_string(),
            ));
        }
        Ok(())
    }

    /// Extensions the instance is created with, required ones first and
    /// without duplicates.
    pub fn required_extensions(&self) -> Vec<String> {
        let mut extensions = vec![
            KHR_OPENGL_ES_ENABLE_EXTENSION_NAME.to_string(),
            KHR_ANDROID_CREATE_INSTANCE_EXTENSION_NAME.to_string(),
        ];
        for extra in &self.extra_extensions {
            if !extensions.contains(extra) {
                extensions.push(extra.clone());
            }
        }
        extensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_describe_stereo_srgb_swapchain() {
        let config = BootstrapConfig::default();
        assert_eq!(config.application_name, "HelloXR");
        assert_eq!(config.view_configuration, ViewConfigurationType::PRIMARY_STEREO);
        assert_eq!(config.reference_space, ReferenceSpaceType::STAGE);

        let info = config.swapchain.create_info(1024, 768);
        assert_eq!(info.format, 0x8C43);
        assert_eq!(info.array_size, 2);
        assert_eq!((info.face_count, info.mip_count, info.sample_count), (1, 1, 1));
        assert_eq!((info.width, info.height), (1024, 768));
        assert!(info.usage_flags.contains(SwapchainUsageFlags::SAMPLED));
        assert!(info.usage_flags.contains(SwapchainUsageFlags::COLOR_ATTACHMENT));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = BootstrapConfig::from_json_str(
            r#"{ "application_name": "Gallery", "api_version": "1.0.34", "swapchain": { "mip_count": 4 } }"#,
        )
        .expect("partial config should parse");

        assert_eq!(config.application_name, "Gallery");
        assert_eq!(config.api_version, Version::new(1, 0, 34));
        assert_eq!(config.swapchain.mip_count, 4);
        assert_eq!(config.swapchain.array_size, 2);
        assert_eq!(config.engine_name, "HelloXR");
    }

    #[test]
    fn required_extensions_deduplicate_extras() {
        let config = BootstrapConfig {
            extra_extensions: vec![
                "XR_FB_display_refresh_rate".to_string(),
                KHR_OPENGL_ES_ENABLE_EXTENSION_NAME.to_string(),
            ],
            ..BootstrapConfig::default()
        };

        assert_eq!(
            config.required_extensions(),
            vec![
                KHR_OPENGL_ES_ENABLE_EXTENSION_NAME.to_string(),
                KHR_ANDROID_CREATE_INSTANCE_EXTENSION_NAME.to_string(),
                "XR_FB_display_refresh_rate".to_string(),
            ]
        );
    }

    #[test]
    fn validation_rejects_zero_counts_and_long_names() {
        let err = BootstrapConfig::from_json_str(r#"{ "swapchain": { "array_size": 0 } }"#)
            .unwrap_err();
        assert!(err.to_string().contains("array_size"));

        let long_name = "x".repeat(MAX_APPLICATION_NAME_LEN + 1);
        let config = BootstrapConfig {
            application_name: long_name,
            ..BootstrapConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn enumerants_serialize_by_name() {
        let config = BootstrapConfig {
            reference_space: ReferenceSpaceType::LOCAL,
            ..BootstrapConfig::default()
        };
        let json: serde_json::Value =
            serde_json::from_str(&config.to_json_pretty().expect("serialize")).expect("json");

        assert_eq!(json["form_factor"], "head_mounted_display");
        assert_eq!(json["view_configuration"], "primary_stereo");
        assert_eq!(json["reference_space"], "local");
        assert_eq!(json["api_version"], "1.0.0");
        assert_eq!(
            json["swapchain"]["usage"],
            serde_json::json!(["color_attachment", "sampled"])
        );
    }

    #[test]
    fn unknown_enumerant_is_a_parse_error() {
        let err = BootstrapConfig::from_json_str(r#"{ "form_factor": "wall_display" }"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("head_mounted_display"));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = BootstrapConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
