mod camera;
mod egui_overlay;
mod environment;
pub mod raster;
mod stage;

pub use camera::{ControlsConfig, OrbitControls};
pub use egui_overlay::EguiOverlay;
pub use environment::EnvironmentMap;
pub use stage::{ContactShadow, StageLighting};

use crate::assets::{CullMode, Mesh};
use crate::scene::ModelPresenter;
use glam::{Mat4, Vec3};
use raster::{draw_triangle, ClipVertex, DepthMode, Framebuffer, Varyings};
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use winit::dpi::PhysicalSize;
use winit::window::Window;

/// Page color behind the canvas when no environment is drawn.
const CLEAR_COLOR: u32 = 0x00f2_f2f2;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("softbuffer surface error: {0}")]
    Surface(#[from] softbuffer::SoftBufferError),
    #[error("failed to load environment {path}: {source}")]
    Environment {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error("invalid egui texture: {0}")]
    EguiTexture(String),
    #[error("failed creating screenshot directory '{path}': {source}")]
    ScreenshotDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed writing screenshot '{path}': {source}")]
    Screenshot {
        path: String,
        #[source]
        source: image::ImageError,
    },
}

/// Window-independent frame producer: stage, model and UI into a CPU
/// framebuffer.
pub struct Renderer {
    framebuffer: Framebuffer,
    lighting: StageLighting,
    environment: Option<EnvironmentMap>,
    overlay: EguiOverlay,
    clip_scratch: Vec<ClipVertex>,
}

impl Renderer {
    pub fn new(width: usize, height: usize, lighting: StageLighting) -> Self {
        Self {
            framebuffer: Framebuffer::new(width, height),
            lighting,
            environment: None,
            overlay: EguiOverlay::new(),
            clip_scratch: Vec::new(),
        }
    }

    pub fn set_environment(&mut self, environment: Option<EnvironmentMap>) {
        self.environment = environment;
    }

    pub fn framebuffer(&self) -> &Framebuffer {
        &self.framebuffer
    }

    pub fn resize(&mut self, width: usize, height: usize) {
        self.framebuffer.resize(width.max(1), height.max(1));
    }

    pub fn aspect(&self) -> f32 {
        self.framebuffer.width() as f32 / self.framebuffer.height().max(1) as f32
    }

    pub fn draw_scene(&mut self, controls: &OrbitControls, presenter: Option<&ModelPresenter>) {
        let view_proj = controls.projection_matrix(self.aspect()) * controls.view_matrix();
        match &self.environment {
            Some(environment) => {
                environment.fill(&mut self.framebuffer, view_proj);
                self.framebuffer.clear_depth();
            }
            None => self.framebuffer.clear(CLEAR_COLOR),
        }

        let Some(presenter) = presenter else {
            return;
        };
        let model = presenter.model_matrix();
        for mesh in &presenter.asset().meshes {
            self.draw_mesh(mesh, model, view_proj);
        }
        self.draw_contact_shadow(ContactShadow::under(presenter.extent()), view_proj);
    }

    fn draw_mesh(&mut self, mesh: &Mesh, model: Mat4, view_proj: Mat4) {
        let clip_from_object = view_proj * model;
        self.clip_scratch.clear();
        self.clip_scratch
            .extend(mesh.positions.iter().enumerate().map(|(index, position)| {
                let normal = mesh.normals.get(index).copied().unwrap_or(Vec3::Y);
                ClipVertex {
                    clip: clip_from_object * position.extend(1.0),
                    varyings: Varyings {
                        world: model.transform_point3(*position),
                        normal: model.transform_vector3(normal),
                        uv: mesh.uvs.get(index).copied().unwrap_or_default(),
                    },
                }
            }));

        let material = mesh.material.as_ref();
        let lighting = &self.lighting;
        for triangle in mesh.indices.chunks_exact(3) {
            let corner = |slot: usize| self.clip_scratch.get(triangle[slot] as usize);
            let (Some(a), Some(b), Some(c)) = (corner(0), corner(1), corner(2)) else {
                continue;
            };
            draw_triangle(
                &mut self.framebuffer,
                [a, b, c],
                material.cull,
                DepthMode::TestAndWrite,
                |fragment| lighting.shade(material, fragment),
            );
        }
    }

    fn draw_contact_shadow(&mut self, shadow: ContactShadow, view_proj: Mat4) {
        let corners = shadow.quad().map(|world| ClipVertex {
            clip: view_proj * world.extend(1.0),
            varyings: Varyings {
                world,
                normal: Vec3::Y,
                uv: Default::default(),
            },
        });
        for [a, b, c] in [[0, 1, 2], [0, 2, 3]] {
            draw_triangle(
                &mut self.framebuffer,
                [&corners[a], &corners[b], &corners[c]],
                CullMode::None,
                DepthMode::TestOnly,
                |fragment| shadow.shade(fragment),
            );
        }
    }

    pub fn draw_ui(
        &mut self,
        clipped_primitives: &[egui::ClippedPrimitive],
        textures_delta: &egui::TexturesDelta,
        pixels_per_point: f32,
    ) -> Result<(), RenderError> {
        self.overlay.update(
            &mut self.framebuffer,
            clipped_primitives,
            textures_delta,
            pixels_per_point,
        )
    }

    pub fn save_png(&self, path: &Path) -> Result<(), RenderError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| RenderError::ScreenshotDir {
                    path: parent.display().to_string(),
                    source,
                })?;
            }
        }

        image::save_buffer_with_format(
            PathBuf::from(path),
            &self.framebuffer.to_rgb8(),
            self.framebuffer.width() as u32,
            self.framebuffer.height() as u32,
            image::ColorType::Rgb8,
            image::ImageFormat::Png,
        )
        .map_err(|source| RenderError::Screenshot {
            path: path.display().to_string(),
            source,
        })
    }
}

/// Presents [`Renderer`] output on a winit window through softbuffer.
pub struct RenderContext {
    _context: softbuffer::Context<Arc<Window>>,
    surface: softbuffer::Surface<Arc<Window>, Arc<Window>>,
    renderer: Renderer,
}

impl RenderContext {
    pub fn new(window: Arc<Window>, lighting: StageLighting) -> Result<Self, RenderError> {
        let context = softbuffer::Context::new(window.clone())?;
        let surface = softbuffer::Surface::new(&context, window.clone())?;
        let size = window.inner_size();
        log::info!("render surface {}x{}", size.width, size.height);
        let mut render = Self {
            _context: context,
            surface,
            renderer: Renderer::new(size.width.max(1) as usize, size.height.max(1) as usize, lighting),
        };
        render.resize(size)?;
        Ok(render)
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut Renderer {
        &mut self.renderer
    }

    pub fn resize(&mut self, new_size: PhysicalSize<u32>) -> Result<(), RenderError> {
        let (Some(width), Some(height)) =
            (NonZeroU32::new(new_size.width), NonZeroU32::new(new_size.height))
        else {
            // Minimized; keep the previous buffers.
            return Ok(());
        };
        self.surface.resize(width, height)?;
        self.renderer
            .resize(width.get() as usize, height.get() as usize);
        Ok(())
    }

    pub fn present(&mut self) -> Result<(), RenderError> {
        let mut buffer = self.surface.buffer_mut()?;
        let source = self.renderer.framebuffer().color();
        if buffer.len() == source.len() {
            buffer.copy_from_slice(source);
        } else {
            log::debug!(
                "surface size {} differs from framebuffer {}; skipping copy",
                buffer.len(),
                source.len()
            );
        }
        buffer.present()?;
        Ok(())
    }
}
