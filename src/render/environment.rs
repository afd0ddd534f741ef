use super::raster::{pack_rgb, Framebuffer};
use super::RenderError;
use glam::{Mat4, Vec3, Vec4};
use std::f32::consts::{PI, TAU};
use std::path::Path;

/// Equirectangular background, tone mapped once at load time.
pub struct EnvironmentMap {
    width: usize,
    height: usize,
    texels: Vec<u32>,
}

impl EnvironmentMap {
    pub fn load(path: &Path, exposure: f32) -> Result<Self, RenderError> {
        let image = image::open(path).map_err(|source| RenderError::Environment {
            path: path.display().to_string(),
            source,
        })?;
        let hdr = image.to_rgb32f();
        let (width, height) = (hdr.width() as usize, hdr.height() as usize);
        let linear: Vec<[f32; 3]> = hdr.pixels().map(|pixel| pixel.0).collect();
        log::info!(
            "loaded environment {} ({}x{})",
            path.display(),
            width,
            height
        );
        Ok(Self::from_linear(width, height, &linear, exposure))
    }

    pub fn from_linear(width: usize, height: usize, linear: &[[f32; 3]], exposure: f32) -> Self {
        let texels = linear
            .iter()
            .map(|rgb| {
                pack_rgb([
                    tone_map(rgb[0] * exposure),
                    tone_map(rgb[1] * exposure),
                    tone_map(rgb[2] * exposure),
                ])
            })
            .collect();
        Self {
            width: width.max(1),
            height: height.max(1),
            texels,
        }
    }

    /// Nearest texel seen along a world-space direction. +Y is up and the
    /// seam sits behind -Z.
    pub fn sample(&self, direction: Vec3) -> u32 {
        let d = direction.normalize_or_zero();
        if d == Vec3::ZERO || self.texels.is_empty() {
            return 0;
        }
        let u = 0.5 + d.x.atan2(-d.z) / TAU;
        let v = d.y.clamp(-1.0, 1.0).acos() / PI;
        let x = ((u * self.width as f32) as usize).min(self.width - 1);
        let y = ((v * self.height as f32) as usize).min(self.height - 1);
        self.texels[y * self.width + x]
    }

    /// Paints the background for a camera. Ray directions are interpolated
    /// between the four frustum corners.
    pub fn fill(&self, target: &mut Framebuffer, view_proj: Mat4) {
        let (width, height) = (target.width(), target.height());
        if width == 0 || height == 0 {
            return;
        }
        let inverse = view_proj.inverse();
        let ray = |ndc_x: f32, ndc_y: f32| {
            let near = inverse * Vec4::new(ndc_x, ndc_y, 0.0, 1.0);
            let far = inverse * Vec4::new(ndc_x, ndc_y, 1.0, 1.0);
            far.truncate() / far.w - near.truncate() / near.w
        };
        let top_left = ray(-1.0, 1.0);
        let top_right = ray(1.0, 1.0);
        let bottom_left = ray(-1.0, -1.0);
        let bottom_right = ray(1.0, -1.0);

        let pixels = target.color_mut();
        for y in 0..height {
            let ty = (y as f32 + 0.5) / height as f32;
            let left = top_left.lerp(bottom_left, ty);
            let right = top_right.lerp(bottom_right, ty);
            for x in 0..width {
                let tx = (x as f32 + 0.5) / width as f32;
                pixels[y * width + x] = self.sample(left.lerp(right, tx));
            }
        }
    }
}

/// Reinhard operator followed by display gamma.
fn tone_map(value: f32) -> f32 {
    let value = value.max(0.0);
    (value / (1.0 + value)).powf(1.0 / 2.2)
}

#[cfg(test)]
mod tests {
    use super::{tone_map, EnvironmentMap};
    use crate::render::raster::{pack_rgb, Framebuffer};
    use glam::{Mat4, Vec3};

    /// Two rows: bright sky on top, black ground below.
    fn sky_and_ground() -> EnvironmentMap {
        let sky = [4.0, 4.0, 4.0];
        let ground = [0.0, 0.0, 0.0];
        EnvironmentMap::from_linear(2, 2, &[sky, sky, ground, ground], 1.0)
    }

    #[test]
    fn tone_map_is_bounded_and_monotonic() {
        assert_eq!(tone_map(0.0), 0.0);
        assert!(tone_map(1000.0) < 1.0);
        assert!(tone_map(2.0) > tone_map(1.0));
        assert_eq!(tone_map(-3.0), 0.0);
    }

    #[test]
    fn up_samples_the_top_row() {
        let env = sky_and_ground();
        let sky = pack_rgb([tone_map(4.0); 3]);
        assert_eq!(env.sample(Vec3::Y), sky);
        assert_eq!(env.sample(-Vec3::Y), 0);
        assert_eq!(env.sample(Vec3::new(0.3, 0.8, -0.2)), sky);
    }

    #[test]
    fn fill_splits_sky_and_ground_at_the_horizon() {
        let env = sky_and_ground();
        let mut target = Framebuffer::new(8, 8);
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        let proj = Mat4::perspective_rh(1.0, 1.0, 0.1, 100.0);
        env.fill(&mut target, proj * view);
        let sky = pack_rgb([tone_map(4.0); 3]);
        assert_eq!(target.pixel(4, 0), sky);
        assert_eq!(target.pixel(4, 7), 0);
    }
}
