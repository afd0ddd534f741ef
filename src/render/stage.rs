use super::raster::Fragment;
use crate::assets::Material;
use glam::Vec3;

/// Scale from scene-graph ambient intensity units to the shading term.
const AMBIENT_SCALE: f32 = 0.2;
/// Texels at or below this alpha are treated as holes.
const ALPHA_CUTOFF: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    /// Unit vector pointing from the surface toward the light.
    pub direction: Vec3,
    pub color: [f32; 3],
    pub intensity: f32,
}

impl DirectionalLight {
    fn new(toward: Vec3, color: [f32; 3], intensity: f32) -> Self {
        Self {
            direction: toward.normalize_or_zero(),
            color,
            intensity,
        }
    }

    fn contribution(&self, normal: Vec3) -> Vec3 {
        let lambert = normal.dot(self.direction).max(0.0);
        Vec3::from(self.color) * self.intensity * lambert
    }
}

/// Key/fill light rig plus a flat ambient term.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageLighting {
    pub key: DirectionalLight,
    pub fill: DirectionalLight,
    pub ambient: f32,
}

impl StageLighting {
    /// Strong warm key high on one side, weak cool fill low on the other.
    pub fn rembrandt(ambient_intensity: f32) -> Self {
        Self {
            key: DirectionalLight::new(Vec3::new(1.0, 2.0, 1.0), [1.0, 0.96, 0.9], 0.9),
            fill: DirectionalLight::new(Vec3::new(-2.0, -0.5, -2.0), [0.85, 0.9, 1.0], 0.25),
            ambient: ambient_intensity.max(0.0) * AMBIENT_SCALE,
        }
    }

    pub fn irradiance(&self, normal: Vec3) -> Vec3 {
        Vec3::splat(self.ambient) + self.key.contribution(normal) + self.fill.contribution(normal)
    }

    /// Lambert shading of one fragment. Returns `None` for cut-out texels.
    pub fn shade(&self, material: &Material, fragment: &Fragment) -> Option<[f32; 4]> {
        let mut albedo = Vec3::from(material.diffuse);
        if let Some(texture) = &material.map {
            let texel = texture.sample(fragment.varyings.uv);
            if texel[3] <= ALPHA_CUTOFF {
                return None;
            }
            albedo *= Vec3::new(texel[0], texel[1], texel[2]);
        }
        let mut normal = fragment.varyings.normal.normalize_or_zero();
        if !fragment.front_facing {
            normal = -normal;
        }
        let lit = albedo * self.irradiance(normal);
        Some([lit.x, lit.y, lit.z, 1.0])
    }
}

/// Soft dark disc on the ground plane under the model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactShadow {
    pub height: f32,
    pub radius: f32,
    pub opacity: f32,
}

impl ContactShadow {
    /// Sized from the half extent of a model centered on the origin.
    pub fn under(extent: Vec3) -> Self {
        let footprint = extent.x.max(extent.z).max(extent.y * 0.5);
        Self {
            height: -extent.y - 0.001 * extent.max_element().max(1.0),
            radius: (footprint * 1.5).max(0.01),
            opacity: 0.55,
        }
    }

    /// Corners of the ground quad, counter-clockwise seen from above.
    pub fn quad(&self) -> [Vec3; 4] {
        let (r, y) = (self.radius, self.height);
        [
            Vec3::new(-r, y, r),
            Vec3::new(r, y, r),
            Vec3::new(r, y, -r),
            Vec3::new(-r, y, -r),
        ]
    }

    pub fn alpha_at(&self, world: Vec3) -> f32 {
        let distance = Vec3::new(world.x, 0.0, world.z).length() / self.radius;
        if distance >= 1.0 {
            return 0.0;
        }
        let falloff = 1.0 - distance;
        self.opacity * falloff * falloff
    }

    pub fn shade(&self, fragment: &Fragment) -> Option<[f32; 4]> {
        let alpha = self.alpha_at(fragment.varyings.world);
        if alpha <= 0.004 {
            return None;
        }
        Some([0.0, 0.0, 0.0, alpha])
    }
}

#[cfg(test)]
mod tests {
    use super::{ContactShadow, StageLighting};
    use crate::assets::{Material, Texture};
    use crate::render::raster::{Fragment, Varyings};
    use glam::{Vec2, Vec3};
    use std::sync::Arc;

    fn fragment(normal: Vec3, front_facing: bool) -> Fragment {
        Fragment {
            varyings: Varyings {
                world: Vec3::ZERO,
                normal,
                uv: Vec2::new(0.5, 0.5),
            },
            front_facing,
            depth: 0.5,
        }
    }

    #[test]
    fn ambient_lights_faces_away_from_every_light() {
        let lighting = StageLighting::rembrandt(2.0);
        let away = -(lighting.key.direction + lighting.fill.direction).normalize();
        let irradiance = lighting.irradiance(away);
        assert!(irradiance.x >= lighting.ambient - 1e-6);
        assert!(lighting.irradiance(lighting.key.direction).x > irradiance.x);
    }

    #[test]
    fn back_faces_are_lit_from_their_visible_side() {
        let lighting = StageLighting::rembrandt(0.0);
        let material = Material::fallback();
        let normal = lighting.key.direction;
        let front = lighting.shade(&material, &fragment(normal, true)).unwrap();
        let back = lighting.shade(&material, &fragment(-normal, false)).unwrap();
        assert!((front[0] - back[0]).abs() < 1e-6);
    }

    #[test]
    fn transparent_texels_are_discarded() {
        let lighting = StageLighting::rembrandt(2.0);
        let material = Material {
            map: Some(Arc::new(Texture {
                name: "cutout".into(),
                width: 1,
                height: 1,
                pixels: vec![[255, 255, 255, 0]],
            })),
            ..Material::fallback()
        };
        assert!(lighting.shade(&material, &fragment(Vec3::Y, true)).is_none());
    }

    #[test]
    fn contact_shadow_fades_toward_the_rim() {
        let shadow = ContactShadow::under(Vec3::new(1.0, 2.0, 1.0));
        assert!(shadow.height < -2.0);
        let center = shadow.alpha_at(Vec3::ZERO);
        let mid = shadow.alpha_at(Vec3::new(shadow.radius * 0.5, 0.0, 0.0));
        assert!((center - shadow.opacity).abs() < 1e-6);
        assert!(mid > 0.0 && mid < center);
        assert_eq!(shadow.alpha_at(Vec3::new(shadow.radius, 0.0, 0.0)), 0.0);
    }
}
