use winit::event::MouseButton;
use winit::keyboard::{KeyCode, PhysicalKey};

/// Viewport cursor: an open hand at rest, a closed hand while dragging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorStyle {
    Grab,
    Grabbing,
}

impl CursorStyle {
    pub fn icon(self) -> egui::CursorIcon {
        match self {
            CursorStyle::Grab => egui::CursorIcon::Grab,
            CursorStyle::Grabbing => egui::CursorIcon::Grabbing,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DragKind {
    Orbit,
    Pan,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerDrag {
    None,
    Orbit { dx: f32, dy: f32 },
    Pan { dx: f32, dy: f32 },
}

/// Pointer-down tracking for the viewport. The button that starts a drag
/// owns it until that same button is released.
#[derive(Debug, Default)]
pub struct PointerState {
    drag: Option<(MouseButton, DragKind)>,
    last_position: Option<(f32, f32)>,
}

impl PointerState {
    pub fn cursor(&self) -> CursorStyle {
        if self.drag.is_some() {
            CursorStyle::Grabbing
        } else {
            CursorStyle::Grab
        }
    }

    pub fn press(&mut self, button: MouseButton) {
        if self.drag.is_some() {
            return;
        }
        let kind = match button {
            MouseButton::Left => DragKind::Orbit,
            MouseButton::Right | MouseButton::Middle => DragKind::Pan,
            _ => return,
        };
        self.drag = Some((button, kind));
    }

    pub fn release(&mut self, button: MouseButton) {
        if self.drag.is_some_and(|(owner, _)| owner == button) {
            self.drag = None;
        }
    }

    pub fn cursor_moved(&mut self, x: f32, y: f32) -> PointerDrag {
        let previous = self.last_position.replace((x, y));
        let (Some((_, kind)), Some((px, py))) = (self.drag, previous) else {
            return PointerDrag::None;
        };
        let (dx, dy) = (x - px, y - py);
        match kind {
            DragKind::Orbit => PointerDrag::Orbit { dx, dy },
            DragKind::Pan => PointerDrag::Pan { dx, dy },
        }
    }

    pub fn cursor_left(&mut self) {
        self.last_position = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputAction {
    None,
    ToggleHelp,
    ResetCamera,
    Screenshot,
    Quit,
}

pub fn map_key(key: PhysicalKey, pressed: bool) -> InputAction {
    if !pressed {
        return InputAction::None;
    }
    match key {
        PhysicalKey::Code(KeyCode::KeyH) => InputAction::ToggleHelp,
        PhysicalKey::Code(KeyCode::KeyR) => InputAction::ResetCamera,
        PhysicalKey::Code(KeyCode::F12) => InputAction::Screenshot,
        PhysicalKey::Code(KeyCode::Escape) => InputAction::Quit,
        _ => InputAction::None,
    }
}

#[cfg(test)]
mod tests {
    use super::{map_key, CursorStyle, InputAction, PointerDrag, PointerState};
    use winit::event::MouseButton;
    use winit::keyboard::{KeyCode, PhysicalKey};

    #[test]
    fn press_then_release_restores_grab() {
        let mut pointer = PointerState::default();
        assert_eq!(pointer.cursor(), CursorStyle::Grab);
        pointer.press(MouseButton::Left);
        assert_eq!(pointer.cursor(), CursorStyle::Grabbing);
        pointer.release(MouseButton::Left);
        assert_eq!(pointer.cursor(), CursorStyle::Grab);
        assert!(pointer.drag.is_none());
    }

    #[test]
    fn left_drag_reports_orbit_deltas() {
        let mut pointer = PointerState::default();
        assert_eq!(pointer.cursor_moved(10.0, 10.0), PointerDrag::None);
        pointer.press(MouseButton::Left);
        assert_eq!(
            pointer.cursor_moved(14.0, 7.0),
            PointerDrag::Orbit { dx: 4.0, dy: -3.0 }
        );
        pointer.release(MouseButton::Left);
        assert_eq!(pointer.cursor_moved(20.0, 20.0), PointerDrag::None);
    }

    #[test]
    fn other_button_release_keeps_the_drag() {
        let mut pointer = PointerState::default();
        pointer.cursor_moved(0.0, 0.0);
        pointer.press(MouseButton::Left);
        pointer.press(MouseButton::Right);
        pointer.release(MouseButton::Right);
        assert_eq!(pointer.cursor(), CursorStyle::Grabbing);
        assert_eq!(
            pointer.cursor_moved(3.0, 0.0),
            PointerDrag::Orbit { dx: 3.0, dy: 0.0 }
        );
        pointer.release(MouseButton::Left);
        assert_eq!(pointer.cursor(), CursorStyle::Grab);
    }

    #[test]
    fn right_drag_reports_pan() {
        let mut pointer = PointerState::default();
        pointer.cursor_moved(0.0, 0.0);
        pointer.press(MouseButton::Right);
        assert_eq!(
            pointer.cursor_moved(2.0, 1.0),
            PointerDrag::Pan { dx: 2.0, dy: 1.0 }
        );
    }

    #[test]
    fn re_entering_window_does_not_jump() {
        let mut pointer = PointerState::default();
        pointer.press(MouseButton::Left);
        pointer.cursor_moved(0.0, 0.0);
        pointer.cursor_left();
        assert_eq!(pointer.cursor_moved(300.0, 300.0), PointerDrag::None);
    }

    #[test]
    fn keys_map_on_press_only() {
        let h = PhysicalKey::Code(KeyCode::KeyH);
        assert_eq!(map_key(h, true), InputAction::ToggleHelp);
        assert_eq!(map_key(h, false), InputAction::None);
        assert_eq!(
            map_key(PhysicalKey::Code(KeyCode::F12), true),
            InputAction::Screenshot
        );
        assert_eq!(
            map_key(PhysicalKey::Code(KeyCode::Escape), true),
            InputAction::Quit
        );
    }
}
