use crate::render::ControlsConfig;

/// Control hints for the gestures this viewer actually accepts.
fn help_lines(controls: &ControlsConfig) -> Vec<String> {
    let mut lines = vec!["Left drag: orbit the camera".to_string()];
    if controls.zoom_enabled {
        lines.push("Mouse wheel: zoom".to_string());
    }
    if controls.pan_enabled {
        lines.push("Right or middle drag: pan".to_string());
    }
    lines.extend(
        ["R: reset the view", "F12: save a screenshot", "H or ?: toggle this help", "Esc: quit"]
            .map(String::from),
    );
    lines
}

/// Help panel whose visibility only changes through [`HelpPopup::toggle`].
/// A hidden popup keeps its place in the layout at zero opacity.
#[derive(Debug)]
pub struct HelpPopup {
    visible: bool,
    lines: Vec<String>,
}

impl HelpPopup {
    pub fn new(controls: &ControlsConfig) -> Self {
        Self {
            visible: false,
            lines: help_lines(controls),
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn toggle(&mut self) {
        self.visible = !self.visible;
        log::debug!("help popup visible: {}", self.visible);
    }

    pub fn opacity(&self) -> f32 {
        if self.visible {
            1.0
        } else {
            0.0
        }
    }

    /// Draws the "?" button and the panel above it. Clicking the button
    /// toggles the popup.
    pub fn show(&mut self, ctx: &egui::Context) {
        let opacity = self.opacity();
        let mut clicked = false;

        egui::Area::new(egui::Id::new("help_popup"))
            .anchor(egui::Align2::RIGHT_BOTTOM, egui::vec2(-16.0, -16.0))
            .show(ctx, |ui| {
                ui.with_layout(egui::Layout::bottom_up(egui::Align::Max), |ui| {
                    let button = egui::Button::new(egui::RichText::new("?").size(18.0).strong())
                        .min_size(egui::vec2(32.0, 32.0))
                        .corner_radius(egui::CornerRadius::same(16));
                    clicked = ui.add(button).on_hover_text("Help").clicked();
                    ui.add_space(8.0);

                    ui.scope(|ui| {
                        ui.set_opacity(opacity);
                        egui::Frame::popup(ui.style())
                            .inner_margin(egui::Margin::same(12))
                            .show(ui, |ui| {
                                ui.label(egui::RichText::new("Controls").strong());
                                for line in &self.lines {
                                    ui.label(line.as_str());
                                }
                            });
                    });
                });
            });

        if clicked {
            self.toggle();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::HelpPopup;
    use crate::render::ControlsConfig;

    fn popup() -> HelpPopup {
        HelpPopup::new(&ControlsConfig::default())
    }

    #[test]
    fn starts_hidden_at_zero_opacity() {
        let popup = popup();
        assert!(!popup.is_visible());
        assert_eq!(popup.opacity(), 0.0);
    }

    #[test]
    fn toggling_twice_restores_visibility() {
        let mut popup = popup();
        popup.toggle();
        assert!(popup.is_visible());
        assert_eq!(popup.opacity(), 1.0);
        popup.toggle();
        assert!(!popup.is_visible());
    }

    #[test]
    fn hidden_popup_still_lays_out() {
        let ctx = egui::Context::default();
        let mut popup = popup();
        let _ = ctx.run(egui::RawInput::default(), |ctx| popup.show(ctx));
        let _ = ctx.run(egui::RawInput::default(), |ctx| popup.show(ctx));
        let rect = ctx.memory(|mem| mem.area_rect(egui::Id::new("help_popup")));
        assert!(rect.is_some_and(|rect| rect.height() > 40.0));
        assert!(!popup.is_visible());
    }

    #[test]
    fn hints_follow_enabled_gestures() {
        let fixed = HelpPopup::new(&ControlsConfig {
            zoom_enabled: false,
            pan_enabled: false,
            ..ControlsConfig::default()
        });
        assert!(!fixed.lines.iter().any(|line| line.contains("zoom")));
        assert!(!fixed.lines.iter().any(|line| line.contains("pan")));

        let free = HelpPopup::new(&ControlsConfig {
            zoom_enabled: true,
            pan_enabled: true,
            ..ControlsConfig::default()
        });
        assert!(free.lines.iter().any(|line| line == "Mouse wheel: zoom"));
        assert!(free.lines.iter().any(|line| line.ends_with("pan")));
        assert_eq!(free.lines.len(), fixed.lines.len() + 2);
    }
}
