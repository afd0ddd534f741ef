pub mod extract;
pub mod fbx;
mod loader;

pub use loader::{AssetLoader, LoadEvent};

use fbx::FbxError;
use glam::{Vec2, Vec3};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("failed to read model at {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse FBX {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: FbxError,
    },
    #[error("FBX {path} has no Objects section")]
    MissingObjects { path: String },
    #[error("FBX {path} contains no triangle geometry")]
    NoGeometry { path: String },
    #[error("failed to decode texture {path}: {source}")]
    Texture {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error("asset loader stopped before finishing {path}")]
    LoaderStopped { path: String },
}

/// Which triangle faces are discarded while rasterizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    Back,
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<[u8; 4]>,
}

impl Texture {
    pub fn from_rgba8(name: impl Into<String>, image: &image::RgbaImage) -> Self {
        Self {
            name: name.into(),
            width: image.width(),
            height: image.height(),
            pixels: image.pixels().map(|pixel| pixel.0).collect(),
        }
    }

    /// Nearest-neighbour sample with repeat wrapping. FBX UVs have their
    /// origin at the bottom-left corner.
    pub fn sample(&self, uv: Vec2) -> [f32; 4] {
        if self.width == 0 || self.height == 0 || self.pixels.is_empty() {
            return [1.0, 1.0, 1.0, 1.0];
        }
        let u = uv.x.rem_euclid(1.0);
        let v = 1.0 - uv.y.rem_euclid(1.0);
        let x = ((u * self.width as f32) as u32).min(self.width - 1);
        let y = ((v * self.height as f32) as u32).min(self.height - 1);
        let texel = self.pixels[(y * self.width + x) as usize];
        [
            texel[0] as f32 / 255.0,
            texel[1] as f32 / 255.0,
            texel[2] as f32 / 255.0,
            texel[3] as f32 / 255.0,
        ]
    }
}

#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    pub diffuse: [f32; 3],
    pub cull: CullMode,
    pub map: Option<Arc<Texture>>,
}

impl Material {
    pub fn fallback() -> Self {
        Self {
            name: "default".to_string(),
            diffuse: [0.8, 0.8, 0.8],
            cull: CullMode::Back,
            map: None,
        }
    }

    /// Copy of this material that renders both faces and shares the same
    /// texture map.
    pub fn double_sided(&self) -> Self {
        Self {
            cull: CullMode::None,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone)]
pub struct Mesh {
    pub name: String,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub uvs: Vec<Vec2>,
    pub indices: Vec<u32>,
    pub material: Arc<Material>,
}

impl Mesh {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn include(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn center(&self) -> Vec3 {
        if self.is_empty() {
            Vec3::ZERO
        } else {
            (self.min + self.max) * 0.5
        }
    }

    /// Half size along each axis.
    pub fn extent(&self) -> Vec3 {
        if self.is_empty() {
            Vec3::ZERO
        } else {
            (self.max - self.min) * 0.5
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelAsset {
    pub name: String,
    pub source: PathBuf,
    pub meshes: Vec<Mesh>,
    pub bounds: Bounds,
}

impl ModelAsset {
    pub fn new(source: &Path, meshes: Vec<Mesh>) -> Self {
        let mut bounds = Bounds::empty();
        for mesh in &meshes {
            for position in &mesh.positions {
                bounds.include(*position);
            }
        }
        let name = source
            .file_name()
            .and_then(|value| value.to_str())
            .unwrap_or("model")
            .to_string();
        Self {
            name,
            source: source.to_path_buf(),
            meshes,
            bounds,
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.meshes.iter().map(Mesh::triangle_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::{Bounds, CullMode, Material, Texture};
    use glam::{Vec2, Vec3};
    use std::sync::Arc;

    #[test]
    fn double_sided_copy_keeps_texture_identity() {
        let texture = Arc::new(Texture {
            name: "albedo".into(),
            width: 1,
            height: 1,
            pixels: vec![[255, 0, 0, 255]],
        });
        let material = Material {
            map: Some(texture.clone()),
            ..Material::fallback()
        };
        let patched = material.double_sided();
        assert_eq!(patched.cull, CullMode::None);
        assert_eq!(material.cull, CullMode::Back);
        assert!(Arc::ptr_eq(patched.map.as_ref().unwrap(), &texture));
    }

    #[test]
    fn texture_sampling_wraps_and_flips_v() {
        let texture = Texture {
            name: "checker".into(),
            width: 2,
            height: 2,
            pixels: vec![
                [255, 0, 0, 255],
                [0, 255, 0, 255],
                [0, 0, 255, 255],
                [255, 255, 255, 255],
            ],
        };
        // v = 0.9 is the top row of the image.
        assert_eq!(texture.sample(Vec2::new(0.1, 0.9))[0], 1.0);
        // Bottom-left texel after wrapping u = 1.1 -> 0.1.
        assert_eq!(texture.sample(Vec2::new(1.1, 0.1))[2], 1.0);
    }

    #[test]
    fn bounds_track_center_and_extent() {
        let mut bounds = Bounds::empty();
        assert!(bounds.is_empty());
        assert_eq!(bounds.center(), Vec3::ZERO);
        bounds.include(Vec3::new(-1.0, 0.0, 2.0));
        bounds.include(Vec3::new(3.0, 4.0, 2.0));
        assert_eq!(bounds.center(), Vec3::new(1.0, 2.0, 2.0));
        assert_eq!(bounds.extent(), Vec3::new(2.0, 2.0, 0.0));
    }
}
