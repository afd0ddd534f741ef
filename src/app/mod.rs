mod egui_host;
mod input;
mod timing;

use crate::config::ViewerConfig;
use crate::render::{EnvironmentMap, OrbitControls, RenderContext, RenderError, StageLighting};
use crate::scene::{FrameContext, LoadState, SceneRoot};
use crate::ui::{UiActions, UiState};
use egui_host::EguiHost;
use input::{map_key, InputAction, PointerDrag, PointerState};
use timing::FrameTiming;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowAttributes, WindowId};

/// Pixels of trackpad scroll that count as one wheel line.
const PIXELS_PER_LINE: f32 = 50.0;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
    #[error("failed to create window: {0}")]
    Window(#[from] winit::error::OsError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

pub struct App {
    config: ViewerConfig,
    window: Option<Arc<Window>>,
    render: Option<RenderContext>,
    egui: Option<EguiHost>,
    scene: SceneRoot,
    ui: UiState,
    controls: OrbitControls,
    framed_model: bool,
    pointer: PointerState,
    timing: FrameTiming,
    target_frame_duration: Duration,
    next_frame_time: Instant,
    screenshot_requested: bool,
    fatal: Option<AppError>,
}

impl App {
    fn new(config: ViewerConfig) -> Self {
        let scene = SceneRoot::new(config.model.clone(), config.presenter_config());
        let controls = OrbitControls::from_bounds([0.0; 3], [1.0; 3], config.controls);
        let ui = UiState::new(config.fade_rule, config.help_popup, &controls.config());
        let timing = FrameTiming::new(config.window_title.clone());
        Self {
            config,
            window: None,
            render: None,
            egui: None,
            scene,
            ui,
            controls,
            framed_model: false,
            pointer: PointerState::default(),
            timing,
            target_frame_duration: Duration::from_millis(16),
            next_frame_time: Instant::now(),
            screenshot_requested: false,
            fatal: None,
        }
    }

    fn init_window(&mut self, event_loop: &ActiveEventLoop) -> Result<(), AppError> {
        let [width, height] = self.config.window_size;
        let window_attrs = WindowAttributes::default()
            .with_title(self.config.window_title.clone())
            .with_inner_size(PhysicalSize::new(width.max(1), height.max(1)))
            .with_resizable(true);
        let window = Arc::new(event_loop.create_window(window_attrs)?);

        let mut render = RenderContext::new(
            window.clone(),
            StageLighting::rembrandt(self.config.ambient_intensity),
        )?;
        if let Some(path) = &self.config.environment {
            match EnvironmentMap::load(path, self.config.environment_exposure) {
                Ok(environment) => render.renderer_mut().set_environment(Some(environment)),
                Err(err) => log::warn!("{err}; using plain background"),
            }
        }

        let egui = EguiHost::new(&window);
        self.ui.load_branding(egui.context(), &self.config.branding);

        self.update_target_frame_duration(&window);
        self.render = Some(render);
        self.egui = Some(egui);
        self.window = Some(window);
        self.scene.start();
        Ok(())
    }

    fn update_target_frame_duration(&mut self, window: &Window) {
        let mut target = Duration::from_millis(16);
        if let Some(monitor) = window.current_monitor() {
            if let Some(millihz) = monitor.refresh_rate_millihertz() {
                let hz = millihz as f32 / 1000.0;
                if hz > 1.0 {
                    target = Duration::from_secs_f32(1.0 / hz);
                }
            }
        }
        self.target_frame_duration = target;
        self.next_frame_time = Instant::now() + self.target_frame_duration;
    }

    fn handle_action(&mut self, action: InputAction, event_loop: &ActiveEventLoop) {
        match action {
            InputAction::ToggleHelp => {
                self.ui.toggle_help();
            }
            InputAction::ResetCamera => self.controls.reset(),
            InputAction::Screenshot => self.screenshot_requested = true,
            InputAction::Quit => {
                log::info!("Escape pressed, shutting down...");
                event_loop.exit();
            }
            InputAction::None => {}
        }
    }

    /// Re-targets the camera once per mounted model.
    fn sync_camera_framing(&mut self) {
        match self.scene.presenter() {
            Some(presenter) if !self.framed_model => {
                self.controls
                    .frame_bounds_preserve_orientation([0.0; 3], presenter.extent().to_array());
                self.framed_model = true;
            }
            Some(_) => {}
            None => self.framed_model = false,
        }
    }

    fn render(&mut self) {
        let frame_start = Instant::now();
        self.timing.update(self.window.as_deref(), frame_start);
        let frame = FrameContext {
            frame_index: self.timing.frame_index(),
        };

        if self.scene.poll() {
            log::debug!("scene state: {}", self.scene.state().label());
        }
        self.sync_camera_framing();
        self.scene.tick(&frame);
        let progress = self.scene.progress();
        self.ui.update(self.scene.state(), progress, self.timing.frame_dt);

        let (Some(window), Some(render), Some(egui)) =
            (self.window.as_ref(), self.render.as_mut(), self.egui.as_mut())
        else {
            return;
        };
        render
            .renderer_mut()
            .draw_scene(&self.controls, self.scene.presenter());

        let ui = &mut self.ui;
        let state = self.scene.state();
        let mut actions = UiActions::default();
        let output = egui.run_ui(window, self.pointer.cursor(), |ctx| {
            actions = ui.show(ctx, state, progress);
        });
        if let Err(err) = render.renderer_mut().draw_ui(
            &output.clipped_primitives,
            &output.textures_delta,
            output.pixels_per_point,
        ) {
            log::warn!("ui compositing failed: {err}");
        }

        if std::mem::take(&mut self.screenshot_requested) {
            let path = screenshot_path();
            match render.renderer().save_png(&path) {
                Ok(()) => log::info!("saved screenshot {}", path.display()),
                Err(err) => log::error!("{err}"),
            }
        }
        if let Err(err) = render.present() {
            log::error!("present failed: {err}");
        }

        self.timing
            .set_render_ms(frame_start.elapsed().as_secs_f32() * 1000.0);
        if actions.retry {
            self.scene.retry();
        }
    }
}

fn screenshot_path() -> PathBuf {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    PathBuf::from(format!("screenshot-{stamp}.png"))
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(err) = self.init_window(event_loop) {
            log::error!("{err}");
            self.fatal = Some(err);
            event_loop.exit();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(window) = self.window.clone() else {
            return;
        };
        let (consumed, ui_wants_pointer, ui_wants_keyboard) = match &mut self.egui {
            Some(egui) => (
                egui.on_window_event(&window, &event),
                egui.wants_pointer_input(),
                egui.wants_keyboard_input(),
            ),
            None => (false, false, false),
        };

        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                event_loop.exit();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if consumed || ui_wants_keyboard {
                    return;
                }
                let pressed = event.state == ElementState::Pressed;
                if pressed && event.repeat {
                    return;
                }
                let action = map_key(event.physical_key, pressed);
                self.handle_action(action, event_loop);
            }
            WindowEvent::Resized(new_size) => {
                if let Some(render) = &mut self.render {
                    if let Err(err) = render.resize(new_size) {
                        log::error!("resize failed: {err}");
                    }
                }
                self.update_target_frame_duration(&window);
            }
            WindowEvent::Moved(_) => {
                self.update_target_frame_duration(&window);
            }
            WindowEvent::CursorMoved { position, .. } => {
                let height = window.inner_size().height as f32;
                match self.pointer.cursor_moved(position.x as f32, position.y as f32) {
                    PointerDrag::Orbit { dx, dy } => self.controls.orbit(dx, dy),
                    PointerDrag::Pan { dx, dy } => {
                        self.controls.pan(dx, dy, height);
                    }
                    PointerDrag::None => {}
                }
            }
            WindowEvent::CursorLeft { .. } => {
                self.pointer.cursor_left();
            }
            WindowEvent::MouseInput { state, button, .. } => match state {
                ElementState::Pressed if !ui_wants_pointer => self.pointer.press(button),
                ElementState::Pressed => {}
                ElementState::Released => self.pointer.release(button),
            },
            WindowEvent::MouseWheel { delta, .. } => {
                if ui_wants_pointer {
                    return;
                }
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / PIXELS_PER_LINE,
                };
                self.controls.zoom(lines);
            }
            WindowEvent::RedrawRequested => {
                self.render();
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let now = Instant::now();
        if now >= self.next_frame_time {
            if let Some(window) = &self.window {
                window.request_redraw();
            }
            self.next_frame_time = now + self.target_frame_duration;
        }
        event_loop.set_control_flow(ControlFlow::WaitUntil(self.next_frame_time));
    }
}

pub fn run(config: ViewerConfig) -> Result<(), AppError> {
    log::info!("turntable: {}", config.model.display());
    log::info!("   Press ESC or close window to exit");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    if let Some(err) = app.fatal.take() {
        return Err(err);
    }
    if let LoadState::Failed { message } = app.scene.state() {
        log::warn!("exited with failed load: {message}");
    }
    app.scene.unmount();

    log::info!("Goodbye!");
    Ok(())
}
