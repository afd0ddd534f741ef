use crate::assets::CullMode;
use glam::{Vec2, Vec3, Vec4};

/// CPU color and depth target. Colors are packed `0x00RRGGBB`, the layout
/// softbuffer presents.
pub struct Framebuffer {
    width: usize,
    height: usize,
    color: Vec<u32>,
    depth: Vec<f32>,
}

impl Framebuffer {
    pub fn new(width: usize, height: usize) -> Self {
        let len = width * height;
        Self {
            width,
            height,
            color: vec![0; len],
            depth: vec![f32::INFINITY; len],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn resize(&mut self, width: usize, height: usize) {
        if self.width == width && self.height == height {
            return;
        }
        self.width = width;
        self.height = height;
        self.color = vec![0; width * height];
        self.depth = vec![f32::INFINITY; width * height];
    }

    pub fn clear(&mut self, color: u32) {
        self.color.fill(color);
        self.depth.fill(f32::INFINITY);
    }

    pub fn clear_depth(&mut self) {
        self.depth.fill(f32::INFINITY);
    }

    pub fn color(&self) -> &[u32] {
        &self.color
    }

    pub fn color_mut(&mut self) -> &mut [u32] {
        &mut self.color
    }

    pub fn pixel(&self, x: usize, y: usize) -> u32 {
        self.color[y * self.width + x]
    }

    /// Alpha-blends a straight (non-premultiplied) linear color.
    pub fn blend(&mut self, index: usize, rgba: [f32; 4]) {
        let alpha = rgba[3].clamp(0.0, 1.0);
        if alpha >= 0.999 {
            self.color[index] = pack_rgb([rgba[0], rgba[1], rgba[2]]);
            return;
        }
        let dst = unpack_rgb(self.color[index]);
        self.color[index] = pack_rgb([
            rgba[0] * alpha + dst[0] * (1.0 - alpha),
            rgba[1] * alpha + dst[1] * (1.0 - alpha),
            rgba[2] * alpha + dst[2] * (1.0 - alpha),
        ]);
    }

    /// Rows of `0xRRGGBB` flattened to RGB8 bytes, for PNG export.
    pub fn to_rgb8(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.color.len() * 3);
        for pixel in &self.color {
            bytes.push((pixel >> 16) as u8);
            bytes.push((pixel >> 8) as u8);
            bytes.push(*pixel as u8);
        }
        bytes
    }
}

pub fn pack_rgb(rgb: [f32; 3]) -> u32 {
    let channel = |value: f32| (value.clamp(0.0, 1.0) * 255.0 + 0.5) as u32;
    (channel(rgb[0]) << 16) | (channel(rgb[1]) << 8) | channel(rgb[2])
}

pub fn unpack_rgb(pixel: u32) -> [f32; 3] {
    [
        ((pixel >> 16) & 0xff) as f32 / 255.0,
        ((pixel >> 8) & 0xff) as f32 / 255.0,
        (pixel & 0xff) as f32 / 255.0,
    ]
}

/// Per-vertex values interpolated across a triangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Varyings {
    pub world: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
}

impl Varyings {
    fn scaled(&self, factor: f32) -> Self {
        Self {
            world: self.world * factor,
            normal: self.normal * factor,
            uv: self.uv * factor,
        }
    }

    fn weighted_sum(values: [Varyings; 3], weights: [f32; 3]) -> Self {
        Self {
            world: values[0].world * weights[0]
                + values[1].world * weights[1]
                + values[2].world * weights[2],
            normal: values[0].normal * weights[0]
                + values[1].normal * weights[1]
                + values[2].normal * weights[2],
            uv: values[0].uv * weights[0] + values[1].uv * weights[1] + values[2].uv * weights[2],
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ClipVertex {
    pub clip: Vec4,
    pub varyings: Varyings,
}

pub struct Fragment {
    pub varyings: Varyings,
    /// False when a double-sided triangle is seen from behind.
    pub front_facing: bool,
    pub depth: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthMode {
    TestAndWrite,
    TestOnly,
}

struct ScreenVertex {
    position: [f32; 2],
    depth: f32,
    inv_w: f32,
    varyings: Varyings,
}

fn edge_function(a: &[f32; 2], b: &[f32; 2], c: &[f32; 2]) -> f32 {
    (c[0] - a[0]) * (b[1] - a[1]) - (c[1] - a[1]) * (b[0] - a[0])
}

fn to_screen(vertex: &ClipVertex, width: usize, height: usize) -> Option<ScreenVertex> {
    let clip = vertex.clip;
    // Behind the eye or in front of the near plane.
    if clip.w <= 1e-6 || clip.z < 0.0 {
        return None;
    }
    let inv_w = 1.0 / clip.w;
    let ndc = clip.truncate() * inv_w;
    Some(ScreenVertex {
        position: [
            (ndc.x * 0.5 + 0.5) * width as f32,
            (0.5 - ndc.y * 0.5) * height as f32,
        ],
        depth: ndc.z,
        inv_w,
        varyings: vertex.varyings.scaled(inv_w),
    })
}

/// Rasterizes one triangle with perspective-correct interpolation.
///
/// Triangles that cross the near plane are dropped whole. The shader
/// returns `None` to discard a fragment; returned colors are straight
/// alpha and blended over the target. Returns the number of fragments
/// written.
pub fn draw_triangle<F>(
    target: &mut Framebuffer,
    vertices: [&ClipVertex; 3],
    cull: CullMode,
    depth_mode: DepthMode,
    mut shader: F,
) -> usize
where
    F: FnMut(&Fragment) -> Option<[f32; 4]>,
{
    let (width, height) = (target.width, target.height);
    if width == 0 || height == 0 {
        return 0;
    }
    let (Some(s0), Some(s1), Some(s2)) = (
        to_screen(vertices[0], width, height),
        to_screen(vertices[1], width, height),
        to_screen(vertices[2], width, height),
    ) else {
        return 0;
    };

    let mut corners = [s0, s1, s2];
    let mut area = edge_function(&corners[0].position, &corners[1].position, &corners[2].position);
    if area == 0.0 || !area.is_finite() {
        return 0;
    }
    let mut front_facing = true;
    if area < 0.0 {
        if cull == CullMode::Back {
            return 0;
        }
        corners.swap(1, 2);
        area = -area;
        front_facing = false;
    }

    let xs = corners.iter().map(|corner| corner.position[0]);
    let ys = corners.iter().map(|corner| corner.position[1]);
    let min_x = xs.clone().fold(f32::INFINITY, f32::min).floor().max(0.0) as usize;
    let max_x = xs.fold(f32::NEG_INFINITY, f32::max).ceil().min(width as f32 - 1.0);
    let min_y = ys.clone().fold(f32::INFINITY, f32::min).floor().max(0.0) as usize;
    let max_y = ys.fold(f32::NEG_INFINITY, f32::max).ceil().min(height as f32 - 1.0);
    if max_x < 0.0 || max_y < 0.0 {
        return 0;
    }
    let (max_x, max_y) = (max_x as usize, max_y as usize);

    let varyings = [corners[0].varyings, corners[1].varyings, corners[2].varyings];
    let mut written = 0;
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let p = [x as f32 + 0.5, y as f32 + 0.5];
            let w0 = edge_function(&corners[1].position, &corners[2].position, &p);
            let w1 = edge_function(&corners[2].position, &corners[0].position, &p);
            let w2 = edge_function(&corners[0].position, &corners[1].position, &p);
            if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                continue;
            }
            let b = [w0 / area, w1 / area, w2 / area];

            let depth = corners[0].depth * b[0] + corners[1].depth * b[1] + corners[2].depth * b[2];
            let index = y * width + x;
            if depth >= target.depth[index] {
                continue;
            }

            let inv_w = corners[0].inv_w * b[0] + corners[1].inv_w * b[1] + corners[2].inv_w * b[2];
            if inv_w <= 0.0 {
                continue;
            }
            let fragment = Fragment {
                varyings: Varyings::weighted_sum(varyings, b).scaled(1.0 / inv_w),
                front_facing,
                depth,
            };
            let Some(color) = shader(&fragment) else {
                continue;
            };
            if depth_mode == DepthMode::TestAndWrite {
                target.depth[index] = depth;
            }
            target.blend(index, color);
            written += 1;
        }
    }
    written
}
