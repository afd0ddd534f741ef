use super::{load_branding_image, BrandingImage};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Seconds for a full opacity transition.
pub const FADE_SECONDS: f32 = 0.5;
const PULSE_PERIOD_SECONDS: f32 = 2.0;
const LABEL_SIZE: f32 = 24.0;

/// When the loading overlay fades out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FadeRule {
    /// Transparent once more than half of the asset has loaded.
    AboveHalf,
    /// Transparent only when loading is complete.
    Complete,
}

impl FadeRule {
    pub fn target_opacity(self, progress: f32) -> f32 {
        let hidden = match self {
            FadeRule::AboveHalf => progress > 50.0,
            FadeRule::Complete => progress >= 100.0,
        };
        if hidden {
            0.0
        } else {
            1.0
        }
    }
}

pub struct LoadingOverlay {
    rule: FadeRule,
    opacity: f32,
    elapsed: f32,
    branding: Vec<BrandingImage>,
}

impl LoadingOverlay {
    pub fn new(rule: FadeRule) -> Self {
        Self {
            rule,
            opacity: 1.0,
            elapsed: 0.0,
            branding: Vec::new(),
        }
    }

    /// Decodes branding images into egui textures. Unreadable files are
    /// logged and left out.
    pub fn load_branding(&mut self, ctx: &egui::Context, paths: &[PathBuf]) {
        self.branding = paths
            .iter()
            .filter_map(|path| match load_branding_image(ctx, path) {
                Ok(image) => Some(image),
                Err(err) => {
                    log::warn!("{err}");
                    None
                }
            })
            .collect();
    }

    /// Moves the opacity toward the rule's target at a constant rate.
    pub fn update(&mut self, progress: f32, dt: f32) {
        let dt = dt.max(0.0);
        self.elapsed = (self.elapsed + dt) % PULSE_PERIOD_SECONDS;
        let target = self.rule.target_opacity(progress);
        let step = dt / FADE_SECONDS;
        self.opacity = if self.opacity < target {
            (self.opacity + step).min(target)
        } else {
            (self.opacity - step).max(target)
        };
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn is_hidden(&self) -> bool {
        self.opacity <= 0.0
    }

    pub fn label(progress: f32) -> String {
        format!("{:.0}%", progress.clamp(0.0, 100.0))
    }

    /// Text alpha oscillating between 0.5 and 1.0.
    pub fn pulse_alpha(&self) -> f32 {
        let phase = self.elapsed / PULSE_PERIOD_SECONDS * std::f32::consts::TAU;
        0.75 + 0.25 * phase.cos()
    }

    pub fn show(&self, ctx: &egui::Context, progress: f32) {
        if self.is_hidden() {
            return;
        }
        let text_color = egui::Color32::BLACK.gamma_multiply(self.opacity * self.pulse_alpha());
        let tint = egui::Color32::WHITE.gamma_multiply(self.opacity);

        egui::Area::new(egui::Id::new("loading_overlay"))
            .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
            .interactable(false)
            .show(ctx, |ui| {
                ui.vertical_centered(|ui| {
                    if !self.branding.is_empty() {
                        ui.horizontal(|ui| {
                            for image in &self.branding {
                                ui.add(
                                    egui::Image::new((image.texture.id(), image.size)).tint(tint),
                                );
                            }
                        });
                        ui.add_space(12.0);
                    }
                    ui.label(
                        egui::RichText::new(Self::label(progress))
                            .size(LABEL_SIZE)
                            .strong()
                            .color(text_color),
                    );
                });
            });
    }
}

#[cfg(test)]
mod tests {
    use super::{FadeRule, LoadingOverlay, FADE_SECONDS};

    #[test]
    fn above_half_rule_hides_strictly_over_fifty() {
        assert_eq!(FadeRule::AboveHalf.target_opacity(0.0), 1.0);
        assert_eq!(FadeRule::AboveHalf.target_opacity(50.0), 1.0);
        assert_eq!(FadeRule::AboveHalf.target_opacity(50.1), 0.0);
        assert_eq!(FadeRule::AboveHalf.target_opacity(100.0), 0.0);
    }

    #[test]
    fn complete_rule_hides_only_at_one_hundred() {
        assert_eq!(FadeRule::Complete.target_opacity(99.9), 1.0);
        assert_eq!(FadeRule::Complete.target_opacity(100.0), 0.0);
    }

    #[test]
    fn opacity_fades_over_half_a_second() {
        let mut overlay = LoadingOverlay::new(FadeRule::AboveHalf);
        assert_eq!(overlay.opacity(), 1.0);
        overlay.update(75.0, FADE_SECONDS / 2.0);
        assert!((overlay.opacity() - 0.5).abs() < 1e-6);
        assert!(!overlay.is_hidden());
        overlay.update(75.0, FADE_SECONDS);
        assert!(overlay.is_hidden());
    }

    #[test]
    fn opacity_recovers_when_target_returns() {
        let mut overlay = LoadingOverlay::new(FadeRule::Complete);
        overlay.update(100.0, 1.0);
        assert!(overlay.is_hidden());
        overlay.update(0.0, 0.1);
        assert!((overlay.opacity() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn label_rounds_to_whole_percent() {
        assert_eq!(LoadingOverlay::label(0.0), "0%");
        assert_eq!(LoadingOverlay::label(42.6), "43%");
        assert_eq!(LoadingOverlay::label(100.0), "100%");
    }

    #[test]
    fn pulse_stays_within_bounds() {
        let mut overlay = LoadingOverlay::new(FadeRule::Complete);
        for _ in 0..50 {
            overlay.update(10.0, 0.037);
            let alpha = overlay.pulse_alpha();
            assert!((0.5..=1.0).contains(&alpha));
        }
    }

    #[test]
    fn rule_serializes_snake_case() {
        let json = serde_json::to_string(&FadeRule::AboveHalf).unwrap();
        assert_eq!(json, "\"above_half\"");
        let rule: FadeRule = serde_json::from_str("\"complete\"").unwrap();
        assert_eq!(rule, FadeRule::Complete);
    }
}
