use super::extract::{ParsedScene, TextureSource};
use super::fbx::Document;
use super::{AssetError, ModelAsset, Texture};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;

const READ_CHUNK: usize = 64 * 1024;
/// Share of the progress bar spent reading bytes from disk.
const READ_SHARE: f32 = 70.0;
const PARSED: f32 = 80.0;
const GRAPH_READY: f32 = 90.0;

#[derive(Debug)]
pub enum LoadEvent {
    Progress(f32),
    Loaded(Box<ModelAsset>),
    Failed(AssetError),
}

/// Loads one FBX file on a background thread and streams [`LoadEvent`]s.
///
/// Dropping the loader disconnects the channel; the worker notices on its
/// next progress report and stops.
pub struct AssetLoader {
    path: PathBuf,
    receiver: Receiver<LoadEvent>,
}

impl AssetLoader {
    pub fn spawn(path: PathBuf) -> Self {
        let (sender, receiver) = mpsc::channel();
        let worker_path = path.clone();
        let worker_sender = sender.clone();
        let spawned = thread::Builder::new()
            .name("asset-loader".to_string())
            .spawn(move || run_worker(worker_path, worker_sender));
        if let Err(source) = spawned {
            let _ = sender.send(LoadEvent::Failed(AssetError::Read {
                path: path.display().to_string(),
                source,
            }));
        }
        log::info!("loading model {}", path.display());
        Self { path, receiver }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Non-blocking: returns everything received so far and whether the
    /// worker has gone away.
    pub fn drain(&self) -> (Vec<LoadEvent>, bool) {
        let mut events = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) => return (events, false),
                Err(TryRecvError::Disconnected) => return (events, true),
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn from_channel(path: PathBuf, receiver: Receiver<LoadEvent>) -> Self {
        Self { path, receiver }
    }
}

enum Abort {
    Failed(AssetError),
    Cancelled,
}

impl From<AssetError> for Abort {
    fn from(error: AssetError) -> Self {
        Abort::Failed(error)
    }
}

struct ProgressReporter {
    sender: Sender<LoadEvent>,
    last: f32,
}

impl ProgressReporter {
    /// Reports are clamped so the published value never goes backwards.
    fn report(&mut self, percent: f32) -> Result<(), Abort> {
        let percent = percent.clamp(0.0, 100.0).max(self.last);
        if percent > self.last {
            self.last = percent;
            self.sender
                .send(LoadEvent::Progress(percent))
                .map_err(|_| Abort::Cancelled)?;
        }
        Ok(())
    }
}

fn run_worker(path: PathBuf, sender: Sender<LoadEvent>) {
    let mut reporter = ProgressReporter {
        sender: sender.clone(),
        last: 0.0,
    };
    let outcome = load_model(&path, &mut reporter).and_then(|asset| {
        reporter.report(100.0)?;
        Ok(asset)
    });
    let event = match outcome {
        Ok(asset) => {
            log::info!(
                "loaded {} ({} meshes, {} triangles)",
                asset.name,
                asset.meshes.len(),
                asset.triangle_count()
            );
            LoadEvent::Loaded(Box::new(asset))
        }
        Err(Abort::Failed(error)) => {
            log::error!("{error}");
            LoadEvent::Failed(error)
        }
        Err(Abort::Cancelled) => {
            log::debug!("load of {} cancelled", path.display());
            return;
        }
    };
    let _ = sender.send(event);
}

fn load_model(path: &Path, reporter: &mut ProgressReporter) -> Result<ModelAsset, Abort> {
    let bytes = read_with_progress(path, reporter)?;

    let document = Document::parse(&bytes).map_err(|source| AssetError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    drop(bytes);
    reporter.report(PARSED)?;

    let scene = ParsedScene::from_document(&document, path)?;
    drop(document);
    reporter.report(GRAPH_READY)?;

    let sources = scene.texture_sources().to_vec();
    let mut textures = HashMap::new();
    for (index, source) in sources.iter().enumerate() {
        if let Some(texture) = decode_texture(source) {
            textures.insert(source.id, Arc::new(texture));
        }
        let done = (index + 1) as f32 / sources.len() as f32;
        reporter.report(GRAPH_READY + done * (99.0 - GRAPH_READY))?;
    }

    Ok(scene.build(&textures)?)
}

fn read_with_progress(path: &Path, reporter: &mut ProgressReporter) -> Result<Vec<u8>, Abort> {
    let read_error = |source| AssetError::Read {
        path: path.display().to_string(),
        source,
    };
    let mut file = File::open(path).map_err(read_error)?;
    let total = file.metadata().map(|meta| meta.len()).unwrap_or(0).max(1);

    let mut bytes = Vec::with_capacity(total as usize);
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let count = file.read(&mut chunk).map_err(read_error)?;
        if count == 0 {
            break;
        }
        bytes.extend_from_slice(&chunk[..count]);
        let fraction = (bytes.len() as f64 / total as f64).min(1.0) as f32;
        reporter.report(fraction * READ_SHARE)?;
    }
    Ok(bytes)
}

fn decode_texture(source: &TextureSource) -> Option<Texture> {
    for candidate in &source.candidates {
        if !candidate.is_file() {
            continue;
        }
        match image::open(candidate) {
            Ok(image) => {
                log::debug!("decoded texture {}", candidate.display());
                return Some(Texture::from_rgba8(&source.name, &image.to_rgba8()));
            }
            Err(source) => {
                let error = AssetError::Texture {
                    path: candidate.display().to_string(),
                    source,
                };
                log::warn!("{error}");
            }
        }
    }
    log::warn!("texture {:?} not found, using material color", source.name);
    None
}
