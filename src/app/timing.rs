use std::time::{Duration, Instant};
use winit::window::Window;

/// Longest step fed to animations, so a stalled frame does not skip the fade.
const MAX_FRAME_DT: f32 = 0.1;

pub struct FrameTiming {
    last_frame_time: Option<Instant>,
    last_fps_time: Instant,
    frame_count: u32,
    frame_index: u64,
    pub frame_dt: f32,
    render_ms: f32,
    base_title: String,
}

impl FrameTiming {
    pub fn new(base_title: String) -> Self {
        Self {
            last_frame_time: None,
            last_fps_time: Instant::now(),
            frame_count: 0,
            frame_index: 0,
            frame_dt: 1.0 / 60.0,
            render_ms: 0.0,
            base_title,
        }
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn set_render_ms(&mut self, render_ms: f32) {
        self.render_ms = render_ms;
    }

    pub fn update(&mut self, window: Option<&Window>, now: Instant) {
        let dt_duration = if let Some(last) = self.last_frame_time {
            now.saturating_duration_since(last)
        } else {
            Duration::from_millis(16)
        };
        self.last_frame_time = Some(now);
        self.frame_dt = dt_duration.as_secs_f32().clamp(0.0, MAX_FRAME_DT);
        self.frame_index = self.frame_index.wrapping_add(1);

        self.frame_count = self.frame_count.saturating_add(1);
        let elapsed = now.saturating_duration_since(self.last_fps_time);
        if elapsed.as_secs_f32() >= 0.5 {
            let fps = self.frame_count as f32 / elapsed.as_secs_f32();
            if let Some(window) = window {
                window.set_title(&format!(
                    "{} - {:.1} fps (render {:.2} ms)",
                    self.base_title, fps, self.render_ms
                ));
            }
            self.frame_count = 0;
            self.last_fps_time = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FrameTiming, MAX_FRAME_DT};
    use std::time::{Duration, Instant};

    #[test]
    fn counts_frames_and_clamps_dt() {
        let mut timing = FrameTiming::new("turntable".into());
        let start = Instant::now();
        timing.update(None, start);
        assert_eq!(timing.frame_index(), 1);
        timing.update(None, start + Duration::from_secs(3));
        assert_eq!(timing.frame_index(), 2);
        assert_eq!(timing.frame_dt, MAX_FRAME_DT);
    }
}
