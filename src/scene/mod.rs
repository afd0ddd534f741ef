pub mod presenter;

pub use presenter::{ModelPresenter, PresenterConfig};

use crate::assets::{AssetError, AssetLoader, LoadEvent};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameContext {
    pub frame_index: u64,
}

/// Per-frame callback for mounted scene content. Listeners see each
/// `frame_index` at most once.
pub trait FrameListener {
    fn on_frame(&mut self, frame: &FrameContext);
}

#[derive(Debug)]
pub enum LoadState {
    NotStarted,
    Loading { progress: f32 },
    Ready(ModelPresenter),
    Failed { message: String },
}

impl LoadState {
    pub fn label(&self) -> &'static str {
        match self {
            LoadState::NotStarted => "not started",
            LoadState::Loading { .. } => "loading",
            LoadState::Ready(_) => "ready",
            LoadState::Failed { .. } => "failed",
        }
    }
}

/// Top of the scene: tracks the model load and forwards frame ticks to the
/// presenter once it is mounted.
pub struct SceneRoot {
    state: LoadState,
    loader: Option<AssetLoader>,
    model_path: PathBuf,
    presenter_config: PresenterConfig,
}

impl SceneRoot {
    pub fn new(model_path: PathBuf, presenter_config: PresenterConfig) -> Self {
        Self {
            state: LoadState::NotStarted,
            loader: None,
            model_path,
            presenter_config,
        }
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    /// Load percentage for the overlay. A mounted model reports 100.
    pub fn progress(&self) -> f32 {
        match &self.state {
            LoadState::NotStarted | LoadState::Failed { .. } => 0.0,
            LoadState::Loading { progress } => *progress,
            LoadState::Ready(_) => 100.0,
        }
    }

    pub fn presenter(&self) -> Option<&ModelPresenter> {
        match &self.state {
            LoadState::Ready(presenter) => Some(presenter),
            _ => None,
        }
    }

    /// Spawns a loader for the configured model path.
    pub fn start(&mut self) {
        let loader = AssetLoader::spawn(self.model_path.clone());
        self.begin_load(loader);
    }

    /// Replaces whatever is mounted with a fresh load session.
    pub fn begin_load(&mut self, loader: AssetLoader) {
        log::debug!(
            "scene {} -> loading {}",
            self.state.label(),
            loader.path().display()
        );
        self.loader = Some(loader);
        self.state = LoadState::Loading { progress: 0.0 };
    }

    /// Restarts a failed load. Returns false in any other state.
    pub fn retry(&mut self) -> bool {
        if !matches!(self.state, LoadState::Failed { .. }) {
            return false;
        }
        log::info!("retrying load of {}", self.model_path.display());
        self.start();
        true
    }

    /// Drops the mounted model or the pending load.
    pub fn unmount(&mut self) {
        self.loader = None;
        self.state = LoadState::NotStarted;
    }

    /// Applies everything the loader has reported since the last call.
    /// Returns true when the state or progress changed.
    pub fn poll(&mut self) -> bool {
        let Some(loader) = &self.loader else {
            return false;
        };
        let (events, disconnected) = loader.drain();
        let mut changed = false;
        for event in events {
            changed = true;
            match event {
                LoadEvent::Progress(value) => {
                    if let LoadState::Loading { progress } = &mut self.state {
                        *progress = progress.max(value.clamp(0.0, 100.0));
                    }
                }
                LoadEvent::Loaded(asset) => {
                    self.loader = None;
                    self.state = LoadState::Ready(ModelPresenter::mount(
                        *asset,
                        self.presenter_config,
                    ));
                    return true;
                }
                LoadEvent::Failed(error) => {
                    self.fail(error);
                    return true;
                }
            }
        }
        if disconnected {
            let error = AssetError::LoaderStopped {
                path: self.model_path.display().to_string(),
            };
            self.fail(error);
            return true;
        }
        changed
    }

    fn fail(&mut self, error: AssetError) {
        log::warn!("model load failed: {error}");
        self.loader = None;
        self.state = LoadState::Failed {
            message: error.to_string(),
        };
    }

    pub fn tick(&mut self, frame: &FrameContext) {
        if let LoadState::Ready(presenter) = &mut self.state {
            presenter.on_frame(frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FrameContext, LoadState, PresenterConfig, SceneRoot};
    use crate::assets::{AssetError, AssetLoader, LoadEvent, Material, Mesh, ModelAsset};
    use glam::{Vec2, Vec3};
    use std::path::{Path, PathBuf};
    use std::sync::mpsc;
    use std::sync::Arc;

    fn asset() -> ModelAsset {
        let mesh = Mesh {
            name: "tri".into(),
            positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            normals: vec![Vec3::Z; 3],
            uvs: vec![Vec2::ZERO; 3],
            indices: vec![0, 1, 2],
            material: Arc::new(Material::fallback()),
        };
        ModelAsset::new(Path::new("fixture.fbx"), vec![mesh])
    }

    fn root_with_channel() -> (SceneRoot, mpsc::Sender<LoadEvent>) {
        let (sender, receiver) = mpsc::channel();
        let mut root = SceneRoot::new(PathBuf::from("fixture.fbx"), PresenterConfig::default());
        root.begin_load(AssetLoader::from_channel(
            PathBuf::from("fixture.fbx"),
            receiver,
        ));
        (root, sender)
    }

    fn frame(frame_index: u64) -> FrameContext {
        FrameContext { frame_index }
    }

    #[test]
    fn progress_never_goes_backwards() {
        let (mut root, sender) = root_with_channel();
        for value in [10.0, 60.0, 40.0] {
            sender.send(LoadEvent::Progress(value)).unwrap();
        }
        assert!(root.poll());
        assert_eq!(root.progress(), 60.0);
        assert!(!root.poll());
    }

    #[test]
    fn loaded_asset_mounts_and_rotates() {
        let (mut root, sender) = root_with_channel();
        root.tick(&frame(0));
        sender.send(LoadEvent::Progress(100.0)).unwrap();
        sender.send(LoadEvent::Loaded(Box::new(asset()))).unwrap();
        assert!(root.poll());
        assert!(matches!(root.state(), LoadState::Ready(_)));
        assert_eq!(root.progress(), 100.0);

        root.tick(&frame(1));
        root.tick(&frame(2));
        root.tick(&frame(2));
        let angle = root.presenter().map(|presenter| presenter.angle());
        assert!((angle.unwrap() - 0.002).abs() < 1e-12);
    }

    #[test]
    fn failure_is_recorded_with_message() {
        let (mut root, sender) = root_with_channel();
        sender
            .send(LoadEvent::Failed(AssetError::NoGeometry {
                path: "fixture.fbx".into(),
            }))
            .unwrap();
        root.poll();
        match root.state() {
            LoadState::Failed { message } => assert!(message.contains("no triangle geometry")),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn dropped_loader_turns_into_failure() {
        let (mut root, sender) = root_with_channel();
        drop(sender);
        assert!(root.poll());
        assert!(matches!(root.state(), LoadState::Failed { .. }));
    }

    #[test]
    fn retry_only_applies_after_failure() {
        let (mut root, sender) = root_with_channel();
        assert!(!root.retry());
        drop(sender);
        root.poll();
        assert!(root.retry());
        assert!(matches!(root.state(), LoadState::Loading { .. }));
    }

    #[test]
    fn unmount_releases_presenter() {
        let (mut root, sender) = root_with_channel();
        sender.send(LoadEvent::Loaded(Box::new(asset()))).unwrap();
        root.poll();
        root.unmount();
        assert!(root.presenter().is_none());
        assert_eq!(root.progress(), 0.0);
    }
}
