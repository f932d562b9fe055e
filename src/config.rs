use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::converter::MAX_WEBP_DIMENSION;

pub const DEFAULT_QUALITY: u8 = 80;

/// Main configuration structure loaded from config files
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    pub general: Option<GeneralConfig>,
    pub compression: Option<CompressionConfig>,
    pub resize: Option<ResizeConfig>,
    pub profiles: Option<HashMap<String, ProfileConfig>>,
}

/// Configuration profile for predefined settings
#[derive(Debug, Default, Deserialize, Clone)]
pub struct ProfileConfig {
    pub description: Option<String>,
    pub quality: Option<u8>,
    pub export_name: Option<String>,
    pub api_base_url: Option<String>,
    pub overwrite: Option<bool>,
    pub resize: Option<ResizeConfig>,
}

/// General configuration options
#[derive(Debug, Default, Deserialize)]
pub struct GeneralConfig {
    pub output_dir: Option<String>,
    pub overwrite: Option<bool>,
    pub export_name: Option<String>,
    pub api_base_url: Option<String>,
}

/// Compression-related configuration
#[derive(Debug, Default, Deserialize)]
pub struct CompressionConfig {
    pub quality: Option<u8>,
}

/// Resize-related configuration
#[derive(Debug, Default, Deserialize, Clone)]
pub struct ResizeConfig {
    pub enabled: Option<bool>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub preserve_aspect_ratio: Option<bool>,
}

impl Config {
    /// Load a TOML configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Look up a named profile
    pub fn profile(&self, name: &str) -> Option<&ProfileConfig> {
        self.profiles.as_ref().and_then(|profiles| profiles.get(name))
    }

    /// Layer this file (and optionally one of its profiles) over `options`.
    ///
    /// Base sections are applied first, the profile last, so a profile wins
    /// over the sections it shadows.
    pub fn apply_to(&self, mut options: ConversionOptions, profile: Option<&str>) -> Result<ConversionOptions> {
        if let Some(general) = &self.general {
            if let Some(dir) = &general.output_dir {
                options.output_dir = PathBuf::from(dir);
            }
            if let Some(overwrite) = general.overwrite {
                options.overwrite = overwrite;
            }
            if general.export_name.is_some() {
                options.export_name = general.export_name.clone();
            }
            if general.api_base_url.is_some() {
                options.api_base_url = general.api_base_url.clone();
            }
        }

        if let Some(quality) = self.compression.as_ref().and_then(|c| c.quality) {
            options.quality = quality;
        }

        if let Some(resize) = &self.resize {
            resize.apply_to(&mut options.resize);
        }

        if let Some(name) = profile {
            let profile = self
                .profile(name)
                .with_context(|| format!("Profile '{name}' not found in config file"))?;
            log::debug!(
                "Applying profile '{}'{}",
                name,
                profile.description.as_deref().map(|d| format!(": {d}")).unwrap_or_default()
            );
            if let Some(quality) = profile.quality {
                options.quality = quality;
            }
            if let Some(overwrite) = profile.overwrite {
                options.overwrite = overwrite;
            }
            if profile.export_name.is_some() {
                options.export_name = profile.export_name.clone();
            }
            if profile.api_base_url.is_some() {
                options.api_base_url = profile.api_base_url.clone();
            }
            if let Some(resize) = &profile.resize {
                resize.apply_to(&mut options.resize);
            }
        }

        Ok(options)
    }
}

impl ResizeConfig {
    fn apply_to(&self, resize: &mut ResizeOptions) {
        if let Some(enabled) = self.enabled {
            resize.enabled = enabled;
        }
        if self.width.is_some() {
            resize.width = self.width;
        }
        if self.height.is_some() {
            resize.height = self.height;
        }
        if let Some(preserve) = self.preserve_aspect_ratio {
            resize.preserve_aspect_ratio = preserve;
        }
    }
}

/// Reasons a set of options is rejected before any file is processed
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OptionsError {
    #[error("Quality must be between 1 and 100, got {0}")]
    QualityOutOfRange(u8),

    #[error("Provide at least width or height when resize is enabled")]
    MissingResizeDimension,

    #[error("Resize {0} must be greater than zero")]
    ZeroDimension(&'static str),

    #[error("With preserve aspect ratio enabled, specify only width or only height")]
    OverconstrainedAspect,

    #[error("Resize {0} must be at most {max} pixels", max = MAX_WEBP_DIMENSION)]
    DimensionTooLarge(&'static str),
}

/// Optional resize directive applied between decode and encode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResizeOptions {
    pub enabled: bool,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub preserve_aspect_ratio: bool,
}

impl Default for ResizeOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            width: None,
            height: None,
            preserve_aspect_ratio: true,
        }
    }
}

impl ResizeOptions {
    /// Resize to fit within the given bounds, keeping proportions
    pub fn fit(width: Option<u32>, height: Option<u32>) -> Self {
        Self {
            enabled: true,
            width,
            height,
            preserve_aspect_ratio: true,
        }
    }

    /// Resize to exactly the given dimensions
    pub fn exact(width: Option<u32>, height: Option<u32>) -> Self {
        Self {
            enabled: true,
            width,
            height,
            preserve_aspect_ratio: false,
        }
    }

    /// True when the resize step would actually touch the image
    pub fn is_active(&self) -> bool {
        self.enabled && (self.width.is_some() || self.height.is_some())
    }

    pub fn validate(&self) -> Result<(), OptionsError> {
        if !self.enabled {
            return Ok(());
        }
        if self.width.is_none() && self.height.is_none() {
            return Err(OptionsError::MissingResizeDimension);
        }
        if self.width == Some(0) {
            return Err(OptionsError::ZeroDimension("width"));
        }
        if self.height == Some(0) {
            return Err(OptionsError::ZeroDimension("height"));
        }
        if self.width.is_some_and(|w| w > MAX_WEBP_DIMENSION) {
            return Err(OptionsError::DimensionTooLarge("width"));
        }
        if self.height.is_some_and(|h| h > MAX_WEBP_DIMENSION) {
            return Err(OptionsError::DimensionTooLarge("height"));
        }
        if self.preserve_aspect_ratio && self.width.is_some() && self.height.is_some() {
            return Err(OptionsError::OverconstrainedAspect);
        }
        Ok(())
    }
}

/// Run configuration, immutable for the duration of one batch
#[derive(Debug, Clone)]
pub struct ConversionOptions {
    pub input_files: Vec<PathBuf>,
    pub output_dir: PathBuf,
    pub quality: u8,
    pub export_name: Option<String>,
    pub api_base_url: Option<String>,
    pub overwrite: bool,
    pub resize: ResizeOptions,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            input_files: Vec::new(),
            output_dir: PathBuf::new(),
            quality: DEFAULT_QUALITY,
            export_name: None,
            api_base_url: None,
            overwrite: true,
            resize: ResizeOptions::default(),
        }
    }
}

impl ConversionOptions {
    /// Create new conversion options with sensible defaults
    pub fn new(input_files: Vec<PathBuf>, output_dir: PathBuf) -> Self {
        Self {
            input_files,
            output_dir,
            ..Default::default()
        }
    }

    /// Builder pattern for setting quality
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    /// Builder pattern for setting the export base name
    pub fn with_export_name(mut self, export_name: impl Into<String>) -> Self {
        self.export_name = Some(export_name.into());
        self
    }

    /// Builder pattern for setting the public URL prefix
    pub fn with_api_base_url(mut self, api_base_url: impl Into<String>) -> Self {
        self.api_base_url = Some(api_base_url.into());
        self
    }

    /// Builder pattern for setting overwrite behavior
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Builder pattern for setting the resize directive
    pub fn with_resize(mut self, resize: ResizeOptions) -> Self {
        self.resize = resize;
        self
    }

    /// Export base name, if set and not blank
    pub fn trimmed_export_name(&self) -> Option<&str> {
        self.export_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// Check everything that must hold before a run may start
    pub fn validate(&self) -> Result<(), OptionsError> {
        if !(1..=100).contains(&self.quality) {
            return Err(OptionsError::QualityOutOfRange(self.quality));
        }
        self.resize.validate()
    }
}
