use super::{FrameContext, FrameListener};
use crate::assets::{Material, ModelAsset};
use glam::{Mat4, Vec3};
use std::collections::HashMap;
use std::f64::consts::TAU;
use std::sync::Arc;

/// Radians added to the turntable angle on every rendered frame.
pub const ROTATION_STEP: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PresenterConfig {
    pub rotation_step: f64,
    pub double_sided: bool,
}

impl Default for PresenterConfig {
    fn default() -> Self {
        Self {
            rotation_step: ROTATION_STEP,
            double_sided: false,
        }
    }
}

/// Owns a loaded model while it is on screen and spins it around Y.
#[derive(Debug)]
pub struct ModelPresenter {
    asset: ModelAsset,
    angle: f64,
    rotation_step: f64,
    materials_patched: bool,
    last_frame: Option<u64>,
    frames_shown: u64,
}

impl ModelPresenter {
    pub fn mount(asset: ModelAsset, config: PresenterConfig) -> Self {
        let mut presenter = Self {
            asset,
            angle: 0.0,
            rotation_step: config.rotation_step,
            materials_patched: false,
            last_frame: None,
            frames_shown: 0,
        };
        if config.double_sided {
            presenter.patch_materials();
        }
        log::info!(
            "mounted {} ({} triangles, double sided: {})",
            presenter.asset.name,
            presenter.asset.triangle_count(),
            presenter.materials_patched
        );
        presenter
    }

    /// Replaces every mesh material with a double-sided copy. Meshes that
    /// shared a material keep sharing the patched copy, and texture maps
    /// stay the same allocation. Runs at most once per mount.
    fn patch_materials(&mut self) {
        if self.materials_patched {
            return;
        }
        let mut patched: HashMap<*const Material, Arc<Material>> = HashMap::new();
        for mesh in &mut self.asset.meshes {
            let key = Arc::as_ptr(&mesh.material);
            let replacement = patched
                .entry(key)
                .or_insert_with(|| Arc::new(mesh.material.double_sided()))
                .clone();
            mesh.material = replacement;
        }
        log::debug!("patched {} materials to double sided", patched.len());
        self.materials_patched = true;
    }

    pub fn asset(&self) -> &ModelAsset {
        &self.asset
    }

    pub fn angle(&self) -> f64 {
        self.angle
    }

    pub fn materials_patched(&self) -> bool {
        self.materials_patched
    }

    /// Object-to-world transform: the model is centered on the origin and
    /// then turned by the current angle.
    pub fn model_matrix(&self) -> Mat4 {
        let center = self.asset.bounds.center();
        Mat4::from_rotation_y(self.angle as f32) * Mat4::from_translation(-center)
    }

    /// Half size of the centered model, used for framing and the shadow.
    pub fn extent(&self) -> Vec3 {
        self.asset.bounds.extent()
    }
}

impl FrameListener for ModelPresenter {
    fn on_frame(&mut self, frame: &FrameContext) {
        if self.last_frame == Some(frame.frame_index) {
            return;
        }
        self.last_frame = Some(frame.frame_index);
        self.frames_shown += 1;
        self.angle = (self.angle + self.rotation_step).rem_euclid(TAU);
    }
}

impl Drop for ModelPresenter {
    fn drop(&mut self) {
        log::debug!(
            "unmounted {} after {} frames",
            self.asset.name,
            self.frames_shown
        );
    }
}

#[cfg(test)]
mod tests {
    use super::{ModelPresenter, PresenterConfig, ROTATION_STEP};
    use crate::assets::{CullMode, Material, Mesh, ModelAsset, Texture};
    use crate::scene::{FrameContext, FrameListener};
    use glam::{Vec2, Vec3};
    use std::f64::consts::TAU;
    use std::path::Path;
    use std::sync::Arc;

    fn triangle(material: Arc<Material>) -> Mesh {
        Mesh {
            name: "tri".into(),
            positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            normals: vec![Vec3::Z; 3],
            uvs: vec![Vec2::ZERO; 3],
            indices: vec![0, 1, 2],
            material,
        }
    }

    fn textured_asset() -> (ModelAsset, Arc<Texture>) {
        let texture = Arc::new(Texture {
            name: "albedo".into(),
            width: 1,
            height: 1,
            pixels: vec![[10, 20, 30, 255]],
        });
        let shared = Arc::new(Material {
            map: Some(texture.clone()),
            ..Material::fallback()
        });
        let plain = Arc::new(Material::fallback());
        let meshes = vec![
            triangle(shared.clone()),
            triangle(shared),
            triangle(plain),
        ];
        (ModelAsset::new(Path::new("fixture.fbx"), meshes), texture)
    }

    fn frame(index: u64) -> FrameContext {
        FrameContext { frame_index: index }
    }

    #[test]
    fn angle_advances_one_step_per_frame() {
        let (asset, _) = textured_asset();
        let mut presenter = ModelPresenter::mount(asset, PresenterConfig::default());
        let frames = 10_000u64;
        for index in 0..frames {
            presenter.on_frame(&frame(index));
        }
        let expected = (frames as f64 * ROTATION_STEP).rem_euclid(TAU);
        let diff = (presenter.angle() - expected).abs();
        assert!(diff.min(TAU - diff) < 1e-9, "angle {}", presenter.angle());
    }

    #[test]
    fn repeated_frame_index_rotates_once() {
        let (asset, _) = textured_asset();
        let mut presenter = ModelPresenter::mount(asset, PresenterConfig::default());
        presenter.on_frame(&frame(7));
        presenter.on_frame(&frame(7));
        assert_eq!(presenter.angle(), ROTATION_STEP);
        presenter.on_frame(&frame(8));
        assert_eq!(presenter.angle(), 2.0 * ROTATION_STEP);
    }

    #[test]
    fn angle_stays_normalized() {
        let (asset, _) = textured_asset();
        let config = PresenterConfig {
            rotation_step: 1.0,
            ..PresenterConfig::default()
        };
        let mut presenter = ModelPresenter::mount(asset, config);
        for index in 0..100 {
            presenter.on_frame(&frame(index));
            assert!((0.0..TAU).contains(&presenter.angle()));
        }
    }

    #[test]
    fn patch_makes_every_material_double_sided_and_keeps_textures() {
        let (asset, texture) = textured_asset();
        let config = PresenterConfig {
            double_sided: true,
            ..PresenterConfig::default()
        };
        let presenter = ModelPresenter::mount(asset, config);
        assert!(presenter.materials_patched());

        let meshes = &presenter.asset().meshes;
        assert!(meshes.iter().all(|mesh| mesh.material.cull == CullMode::None));
        assert!(Arc::ptr_eq(&meshes[0].material, &meshes[1].material));
        assert!(Arc::ptr_eq(meshes[0].material.map.as_ref().unwrap(), &texture));
        assert!(meshes[2].material.map.is_none());
    }

    #[test]
    fn unpatched_mount_keeps_back_face_culling() {
        let (asset, _) = textured_asset();
        let presenter = ModelPresenter::mount(asset, PresenterConfig::default());
        assert!(!presenter.materials_patched());
        assert!(presenter
            .asset()
            .meshes
            .iter()
            .all(|mesh| mesh.material.cull == CullMode::Back));
    }

    #[test]
    fn model_matrix_centers_the_asset() {
        let (asset, _) = textured_asset();
        let presenter = ModelPresenter::mount(asset, PresenterConfig::default());
        let center = presenter.model_matrix().transform_point3(Vec3::new(0.5, 0.5, 0.0));
        assert!(center.length() < 1e-6);
    }
}
