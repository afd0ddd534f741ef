use crate::render::ControlsConfig;
use crate::scene::presenter::{PresenterConfig, ROTATION_STEP};
use crate::ui::FadeRule;
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Everything that differs between viewer deployments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub model: PathBuf,
    /// Equirectangular background image; the page color shows when unset.
    pub environment: Option<PathBuf>,
    pub environment_exposure: f32,
    pub controls: ControlsConfig,
    pub fade_rule: FadeRule,
    pub help_popup: bool,
    pub branding: Vec<PathBuf>,
    pub rotation_step: f64,
    pub double_sided: bool,
    pub ambient_intensity: f32,
    pub window_title: String,
    pub window_size: [u32; 2],
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self::variant_a()
    }
}

impl ViewerConfig {
    /// Zoomable viewer with an HDR background; the overlay fades past 50%.
    pub fn variant_a() -> Self {
        Self {
            model: PathBuf::from("fbx_model.fbx"),
            environment: Some(PathBuf::from("environment.hdr")),
            environment_exposure: 1.0,
            controls: ControlsConfig {
                zoom_enabled: true,
                pan_enabled: false,
                ..ControlsConfig::default()
            },
            fade_rule: FadeRule::AboveHalf,
            help_popup: false,
            branding: Vec::new(),
            rotation_step: ROTATION_STEP,
            double_sided: false,
            ambient_intensity: 2.0,
            window_title: "turntable".to_string(),
            window_size: [1280, 720],
        }
    }

    /// Fixed-distance viewer with branding, a help popup and double-sided
    /// materials; the overlay stays until loading completes.
    pub fn variant_b() -> Self {
        Self {
            environment: None,
            controls: ControlsConfig {
                zoom_enabled: false,
                pan_enabled: false,
                ..ControlsConfig::default()
            },
            fade_rule: FadeRule::Complete,
            help_popup: true,
            branding: vec![
                PathBuf::from("branding/logo-left.png"),
                PathBuf::from("branding/logo-right.png"),
            ],
            double_sided: true,
            ..Self::variant_a()
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn presenter_config(&self) -> PresenterConfig {
        PresenterConfig {
            rotation_step: self.rotation_step,
            double_sided: self.double_sided,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Variant {
    A,
    B,
}

#[derive(Parser, Debug)]
#[command(name = "turntable")]
#[command(about = "Single-model FBX viewer with orbit controls and a loading overlay")]
pub struct Cli {
    /// JSON viewer config; fields left out take variant A values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Built-in preset used when no config file is given
    #[arg(long, value_enum)]
    pub variant: Option<Variant>,

    /// FBX model to show
    #[arg(long)]
    pub model: Option<PathBuf>,

    /// Equirectangular HDR background
    #[arg(long, conflicts_with = "no_environment")]
    pub environment: Option<PathBuf>,

    /// Draw the plain page color instead of an environment
    #[arg(long)]
    pub no_environment: bool,
}

impl Cli {
    /// Config file (or preset) first, then command line overrides.
    pub fn resolve(&self) -> Result<ViewerConfig, ConfigError> {
        let mut config = match (&self.config, self.variant) {
            (Some(path), variant) => {
                if variant.is_some() {
                    log::warn!("--variant ignored because --config was given");
                }
                ViewerConfig::load(path)?
            }
            (None, Some(Variant::B)) => ViewerConfig::variant_b(),
            (None, _) => ViewerConfig::variant_a(),
        };
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(environment) = &self.environment {
            config.environment = Some(environment.clone());
        }
        if self.no_environment {
            config.environment = None;
        }
        Ok(config)
    }
}
