use super::raster::Framebuffer;
use super::RenderError;
use std::collections::HashMap;

#[derive(Clone, Copy)]
struct UiVertex {
    pos: [f32; 2],
    uv: [f32; 2],
    color: [u8; 4],
}

/// Premultiplied sRGBA texels of one egui-managed or user texture.
struct UiTexture {
    size: [usize; 2],
    pixels: Vec<u8>,
}

impl UiTexture {
    fn sample(&self, uv: [f32; 2]) -> [f32; 4] {
        let [w, h] = self.size;
        if w == 0 || h == 0 {
            return [255.0; 4];
        }
        let x = ((uv[0].clamp(0.0, 1.0) * w as f32) as usize).min(w - 1);
        let y = ((uv[1].clamp(0.0, 1.0) * h as f32) as usize).min(h - 1);
        let i = (y * w + x) * 4;
        [
            self.pixels[i] as f32,
            self.pixels[i + 1] as f32,
            self.pixels[i + 2] as f32,
            self.pixels[i + 3] as f32,
        ]
    }
}

/// Composites tessellated egui output over the CPU framebuffer.
#[derive(Default)]
pub struct EguiOverlay {
    textures: HashMap<egui::TextureId, UiTexture>,
    warned_missing_texture: bool,
}

impl EguiOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(
        &mut self,
        target: &mut Framebuffer,
        clipped_primitives: &[egui::ClippedPrimitive],
        textures_delta: &egui::TexturesDelta,
        pixels_per_point: f32,
    ) -> Result<(), RenderError> {
        self.apply_textures(textures_delta)?;
        self.paint(target, clipped_primitives, pixels_per_point);
        for texture_id in &textures_delta.free {
            self.textures.remove(texture_id);
        }
        Ok(())
    }

    fn apply_textures(&mut self, textures_delta: &egui::TexturesDelta) -> Result<(), RenderError> {
        for (texture_id, image_delta) in &textures_delta.set {
            let (w, h, pixels) = image_to_rgba8(image_delta)?;
            match image_delta.pos {
                Some([x, y]) => {
                    let texture = self.textures.entry(*texture_id).or_insert(UiTexture {
                        size: [0, 0],
                        pixels: Vec::new(),
                    });
                    ensure_capacity(texture, x + w, y + h);
                    let row_bytes = w * 4;
                    let atlas_w = texture.size[0];
                    for row in 0..h {
                        let src = row * row_bytes;
                        let dst = ((y + row) * atlas_w + x) * 4;
                        texture.pixels[dst..dst + row_bytes]
                            .copy_from_slice(&pixels[src..src + row_bytes]);
                    }
                }
                None => {
                    self.textures.insert(
                        *texture_id,
                        UiTexture {
                            size: [w, h],
                            pixels,
                        },
                    );
                }
            }
        }
        Ok(())
    }

    fn paint(
        &mut self,
        target: &mut Framebuffer,
        clipped_primitives: &[egui::ClippedPrimitive],
        pixels_per_point: f32,
    ) {
        let ppp = pixels_per_point.max(0.01);
        let screen = [0.0, 0.0, target.width() as f32, target.height() as f32];

        for clipped in clipped_primitives {
            let egui::epaint::Primitive::Mesh(mesh) = &clipped.primitive else {
                continue;
            };
            let Some(texture) = self.textures.get(&mesh.texture_id) else {
                if !self.warned_missing_texture {
                    log::warn!("egui mesh references unknown texture {:?}", mesh.texture_id);
                    self.warned_missing_texture = true;
                }
                continue;
            };

            let clip_rect = [
                (clipped.clip_rect.min.x * ppp).max(screen[0]),
                (clipped.clip_rect.min.y * ppp).max(screen[1]),
                (clipped.clip_rect.max.x * ppp).min(screen[2]),
                (clipped.clip_rect.max.y * ppp).min(screen[3]),
            ];
            if clip_rect[0] >= clip_rect[2] || clip_rect[1] >= clip_rect[3] {
                continue;
            }

            for triangle in mesh.indices.chunks_exact(3) {
                let vertex = |index: u32| mesh.vertices.get(index as usize).copied();
                let (Some(v0), Some(v1), Some(v2)) =
                    (vertex(triangle[0]), vertex(triangle[1]), vertex(triangle[2]))
                else {
                    continue;
                };
                let polygon = clip_triangle(
                    [
                        mesh_vertex_to_ui(v0, ppp),
                        mesh_vertex_to_ui(v1, ppp),
                        mesh_vertex_to_ui(v2, ppp),
                    ],
                    clip_rect,
                );
                if polygon.len() < 3 {
                    continue;
                }
                for i in 1..(polygon.len() - 1) {
                    fill_triangle(target, texture, [polygon[0], polygon[i], polygon[i + 1]]);
                }
            }
        }
    }
}

fn edge_function(a: [f32; 2], b: [f32; 2], c: [f32; 2]) -> f32 {
    (c[0] - a[0]) * (b[1] - a[1]) - (c[1] - a[1]) * (b[0] - a[0])
}

/// egui emits both windings, so coverage uses the sign of the area.
fn fill_triangle(target: &mut Framebuffer, texture: &UiTexture, tri: [UiVertex; 3]) {
    let area = edge_function(tri[0].pos, tri[1].pos, tri[2].pos);
    if area.abs() <= f32::EPSILON {
        return;
    }
    let width = target.width();
    let height = target.height();
    let min_x = tri.iter().map(|v| v.pos[0]).fold(f32::INFINITY, f32::min).floor().max(0.0) as usize;
    let min_y = tri.iter().map(|v| v.pos[1]).fold(f32::INFINITY, f32::min).floor().max(0.0) as usize;
    let max_x = (tri.iter().map(|v| v.pos[0]).fold(f32::NEG_INFINITY, f32::max).ceil() as usize).min(width);
    let max_y = (tri.iter().map(|v| v.pos[1]).fold(f32::NEG_INFINITY, f32::max).ceil() as usize).min(height);

    let pixels = target.color_mut();
    for y in min_y..max_y {
        for x in min_x..max_x {
            let p = [x as f32 + 0.5, y as f32 + 0.5];
            let w0 = edge_function(tri[1].pos, tri[2].pos, p) / area;
            let w1 = edge_function(tri[2].pos, tri[0].pos, p) / area;
            let w2 = edge_function(tri[0].pos, tri[1].pos, p) / area;
            if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                continue;
            }
            let uv = [
                tri[0].uv[0] * w0 + tri[1].uv[0] * w1 + tri[2].uv[0] * w2,
                tri[0].uv[1] * w0 + tri[1].uv[1] * w1 + tri[2].uv[1] * w2,
            ];
            let texel = texture.sample(uv);
            let mut src = [0.0f32; 4];
            for channel in 0..4 {
                let vertex = tri[0].color[channel] as f32 * w0
                    + tri[1].color[channel] as f32 * w1
                    + tri[2].color[channel] as f32 * w2;
                src[channel] = vertex * texel[channel] / (255.0 * 255.0);
            }
            if src[3] <= 0.0 && src[0] <= 0.0 && src[1] <= 0.0 && src[2] <= 0.0 {
                continue;
            }
            let index = y * width + x;
            pixels[index] = blend_premultiplied(pixels[index], src);
        }
    }
}

fn blend_premultiplied(dst: u32, src: [f32; 4]) -> u32 {
    let inv_alpha = 1.0 - src[3].clamp(0.0, 1.0);
    let channel = |shift: u32, value: f32| {
        let existing = ((dst >> shift) & 0xff) as f32 / 255.0;
        let mixed = (value + existing * inv_alpha).clamp(0.0, 1.0);
        ((mixed * 255.0 + 0.5) as u32) << shift
    };
    channel(16, src[0]) | channel(8, src[1]) | channel(0, src[2])
}

fn ensure_capacity(texture: &mut UiTexture, required_w: usize, required_h: usize) {
    let [cur_w, cur_h] = texture.size;
    if cur_w >= required_w && cur_h >= required_h {
        return;
    }

    let new_w = cur_w.max(required_w).max(1);
    let new_h = cur_h.max(required_h).max(1);
    let mut new_pixels = vec![0u8; new_w * new_h * 4];

    if cur_w > 0 && cur_h > 0 && !texture.pixels.is_empty() {
        let copy_w_bytes = cur_w * 4;
        for row in 0..cur_h {
            let src = row * copy_w_bytes;
            let dst = row * new_w * 4;
            new_pixels[dst..dst + copy_w_bytes]
                .copy_from_slice(&texture.pixels[src..src + copy_w_bytes]);
        }
    }

    texture.size = [new_w, new_h];
    texture.pixels = new_pixels;
}

fn image_to_rgba8(
    image_delta: &egui::epaint::ImageDelta,
) -> Result<(usize, usize, Vec<u8>), RenderError> {
    let (w, h, out) = match &image_delta.image {
        egui::ImageData::Color(image) => {
            let mut out = Vec::with_capacity(image.pixels.len() * 4);
            for pixel in &image.pixels {
                out.extend_from_slice(&pixel.to_array());
            }
            (image.width(), image.height(), out)
        }
        egui::ImageData::Font(image) => {
            let mut out = Vec::with_capacity(image.width() * image.height() * 4);
            for pixel in image.srgba_pixels(None) {
                out.extend_from_slice(&pixel.to_array());
            }
            (image.width(), image.height(), out)
        }
    };
    if out.len() != w * h * 4 {
        return Err(RenderError::EguiTexture(format!(
            "texel count mismatch: have {} bytes for {}x{}",
            out.len(),
            w,
            h
        )));
    }
    Ok((w, h, out))
}

fn mesh_vertex_to_ui(v: egui::epaint::Vertex, pixels_per_point: f32) -> UiVertex {
    UiVertex {
        pos: [v.pos.x * pixels_per_point, v.pos.y * pixels_per_point],
        uv: [v.uv.x, v.uv.y],
        color: v.color.to_array(),
    }
}

fn clip_triangle(triangle: [UiVertex; 3], rect: [f32; 4]) -> Vec<UiVertex> {
    let mut polygon = vec![triangle[0], triangle[1], triangle[2]];
    polygon = clip_polygon_edge(
        &polygon,
        |p| p.pos[0] >= rect[0],
        |a, b| intersect_at_x(a, b, rect[0]),
    );
    polygon = clip_polygon_edge(
        &polygon,
        |p| p.pos[0] <= rect[2],
        |a, b| intersect_at_x(a, b, rect[2]),
    );
    polygon = clip_polygon_edge(
        &polygon,
        |p| p.pos[1] >= rect[1],
        |a, b| intersect_at_y(a, b, rect[1]),
    );
    clip_polygon_edge(
        &polygon,
        |p| p.pos[1] <= rect[3],
        |a, b| intersect_at_y(a, b, rect[3]),
    )
}

/// One Sutherland-Hodgman pass against a single edge.
fn clip_polygon_edge<FIn, FIntersect>(
    input: &[UiVertex],
    inside: FIn,
    intersect: FIntersect,
) -> Vec<UiVertex>
where
    FIn: Fn(UiVertex) -> bool,
    FIntersect: Fn(UiVertex, UiVertex) -> UiVertex,
{
    let Some(&last) = input.last() else {
        return Vec::new();
    };
    let mut output = Vec::with_capacity(input.len() + 2);
    let mut prev = last;
    let mut prev_inside = inside(prev);
    for &current in input {
        let cur_inside = inside(current);
        match (prev_inside, cur_inside) {
            (true, true) => output.push(current),
            (true, false) => output.push(intersect(prev, current)),
            (false, true) => {
                output.push(intersect(prev, current));
                output.push(current);
            }
            (false, false) => {}
        }
        prev = current;
        prev_inside = cur_inside;
    }
    output
}

fn intersect_at_x(a: UiVertex, b: UiVertex, x: f32) -> UiVertex {
    let dx = b.pos[0] - a.pos[0];
    let t = if dx.abs() <= f32::EPSILON {
        0.0
    } else {
        ((x - a.pos[0]) / dx).clamp(0.0, 1.0)
    };
    interpolate_vertex(a, b, t)
}

fn intersect_at_y(a: UiVertex, b: UiVertex, y: f32) -> UiVertex {
    let dy = b.pos[1] - a.pos[1];
    let t = if dy.abs() <= f32::EPSILON {
        0.0
    } else {
        ((y - a.pos[1]) / dy).clamp(0.0, 1.0)
    };
    interpolate_vertex(a, b, t)
}

fn interpolate_vertex(a: UiVertex, b: UiVertex, t: f32) -> UiVertex {
    let inv_t = 1.0 - t;
    let mut color = [0u8; 4];
    for (channel, out) in color.iter_mut().enumerate() {
        *out = ((a.color[channel] as f32) * inv_t + (b.color[channel] as f32) * t).round() as u8;
    }
    UiVertex {
        pos: [
            a.pos[0] * inv_t + b.pos[0] * t,
            a.pos[1] * inv_t + b.pos[1] * t,
        ],
        uv: [a.uv[0] * inv_t + b.uv[0] * t, a.uv[1] * inv_t + b.uv[1] * t],
        color,
    }
}
