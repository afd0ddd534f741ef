pub mod help;
pub mod overlay;

pub use help::HelpPopup;
pub use overlay::{FadeRule, LoadingOverlay};

use crate::render::ControlsConfig;
use crate::scene::LoadState;
use std::path::{Path, PathBuf};

/// Tallest branding image, in points.
const BRANDING_HEIGHT: f32 = 64.0;

#[derive(Debug, thiserror::Error)]
pub enum UiError {
    #[error("failed to load branding image {path}: {source}")]
    Branding {
        path: String,
        #[source]
        source: image::ImageError,
    },
}

pub struct BrandingImage {
    pub texture: egui::TextureHandle,
    pub size: egui::Vec2,
}

pub(crate) fn load_branding_image(ctx: &egui::Context, path: &Path) -> Result<BrandingImage, UiError> {
    let rgba = image::open(path)
        .map_err(|source| UiError::Branding {
            path: path.display().to_string(),
            source,
        })?
        .to_rgba8();
    let (width, height) = (rgba.width() as usize, rgba.height() as usize);
    let color_image = egui::ColorImage::from_rgba_unmultiplied([width, height], rgba.as_raw());
    let texture = ctx.load_texture(
        path.display().to_string(),
        color_image,
        egui::TextureOptions::LINEAR,
    );
    let scale = (BRANDING_HEIGHT / height.max(1) as f32).min(1.0);
    Ok(BrandingImage {
        texture,
        size: egui::vec2(width as f32 * scale, height as f32 * scale),
    })
}

/// What the user asked for through the UI this frame.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UiActions {
    pub retry: bool,
}

pub struct UiState {
    overlay: LoadingOverlay,
    help: Option<HelpPopup>,
}

impl UiState {
    pub fn new(fade_rule: FadeRule, help_enabled: bool, controls: &ControlsConfig) -> Self {
        Self {
            overlay: LoadingOverlay::new(fade_rule),
            help: help_enabled.then(|| HelpPopup::new(controls)),
        }
    }

    pub fn load_branding(&mut self, ctx: &egui::Context, paths: &[PathBuf]) {
        if !paths.is_empty() {
            self.overlay.load_branding(ctx, paths);
        }
    }

    /// Returns false when this viewer has no help popup.
    pub fn toggle_help(&mut self) -> bool {
        match &mut self.help {
            Some(help) => {
                help.toggle();
                true
            }
            None => false,
        }
    }

    /// Advances the overlay fade while the model is still pending.
    pub fn update(&mut self, state: &LoadState, progress: f32, dt: f32) {
        if matches!(state, LoadState::NotStarted | LoadState::Loading { .. }) {
            self.overlay.update(progress, dt);
        }
    }

    pub fn show(&mut self, ctx: &egui::Context, state: &LoadState, progress: f32) -> UiActions {
        let mut actions = UiActions::default();
        match state {
            LoadState::NotStarted | LoadState::Loading { .. } => self.overlay.show(ctx, progress),
            LoadState::Failed { message } => actions.retry = show_error_panel(ctx, message),
            LoadState::Ready(_) => {}
        }
        if let Some(help) = &mut self.help {
            help.show(ctx);
        }
        actions
    }
}

/// Returns true when Retry was clicked.
fn show_error_panel(ctx: &egui::Context, message: &str) -> bool {
    let mut retry = false;
    egui::Area::new(egui::Id::new("load_error"))
        .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
        .show(ctx, |ui| {
            egui::Frame::popup(ui.style())
                .inner_margin(egui::Margin::same(16))
                .show(ui, |ui| {
                    ui.set_max_width(420.0);
                    ui.label(egui::RichText::new("Could not load the model").strong().size(18.0));
                    ui.add_space(6.0);
                    ui.label(message);
                    ui.add_space(10.0);
                    retry = ui.button("Retry").clicked();
                });
        });
    retry
}
