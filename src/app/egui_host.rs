use super::input::CursorStyle;
use winit::event::WindowEvent;
use winit::window::Window;

pub struct EguiFrameOutput {
    pub clipped_primitives: Vec<egui::ClippedPrimitive>,
    pub textures_delta: egui::TexturesDelta,
    pub pixels_per_point: f32,
}

pub struct EguiHost {
    context: egui::Context,
    winit_state: egui_winit::State,
}

impl EguiHost {
    pub fn new(window: &Window) -> Self {
        let context = egui::Context::default();
        context.set_visuals(egui::Visuals::light());
        let viewport_id = egui::ViewportId::ROOT;
        let winit_state = egui_winit::State::new(
            context.clone(),
            viewport_id,
            window,
            Some(window.scale_factor() as f32),
            None,
            None,
        );

        Self {
            context,
            winit_state,
        }
    }

    pub fn context(&self) -> &egui::Context {
        &self.context
    }

    /// Forwards a window event; returns true when egui consumed it.
    pub fn on_window_event(&mut self, window: &Window, event: &WindowEvent) -> bool {
        self.winit_state.on_window_event(window, event).consumed
    }

    pub fn wants_pointer_input(&self) -> bool {
        self.context.wants_pointer_input()
    }

    pub fn wants_keyboard_input(&self) -> bool {
        self.context.wants_keyboard_input()
    }

    /// Runs one UI pass. Where egui leaves the cursor at its default and the
    /// pointer is over the viewport, `viewport_cursor` is shown instead.
    pub fn run_ui<F>(&mut self, window: &Window, viewport_cursor: CursorStyle, run_ui: F) -> EguiFrameOutput
    where
        F: FnMut(&egui::Context),
    {
        let raw_input = self.winit_state.take_egui_input(window);
        let mut full_output = self.context.run(raw_input, run_ui);
        let over_ui = self.context.is_pointer_over_area();
        if full_output.platform_output.cursor_icon == egui::CursorIcon::Default && !over_ui {
            full_output.platform_output.cursor_icon = viewport_cursor.icon();
        }
        self.winit_state
            .handle_platform_output(window, full_output.platform_output);
        let pixels_per_point = self.context.pixels_per_point();
        let clipped_primitives = self
            .context
            .tessellate(full_output.shapes, pixels_per_point);

        EguiFrameOutput {
            clipped_primitives,
            textures_delta: full_output.textures_delta,
            pixels_per_point,
        }
    }
}
