//! Turns a parsed FBX node tree into renderable meshes.
//!
//! Extraction is split in two so the loader can decode texture files (and
//! report progress for them) between reading the object graph and building
//! the final [`ModelAsset`].

use super::fbx::{Document, Node, Property};
use super::{AssetError, Material, Mesh, ModelAsset, Texture};
use glam::{Mat3, Mat4, Vec2, Vec3};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const MAX_PARENT_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct TextureSource {
    pub id: i64,
    pub name: String,
    /// Paths to try in order; the first one that decodes wins.
    pub candidates: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mapping {
    ByPolygonVertex,
    ByControlPoint,
    ByPolygon,
    AllSame,
}

#[derive(Debug, Clone)]
struct Layer<T> {
    mapping: Mapping,
    values: Vec<T>,
    indices: Option<Vec<i32>>,
}

impl<T: Copy> Layer<T> {
    fn value(&self, polygon_vertex: usize, control_point: usize, polygon: usize) -> Option<T> {
        let direct = match self.mapping {
            Mapping::ByPolygonVertex => polygon_vertex,
            Mapping::ByControlPoint => control_point,
            Mapping::ByPolygon => polygon,
            Mapping::AllSame => 0,
        };
        let index = match &self.indices {
            Some(indices) => usize::try_from(*indices.get(direct)?).ok()?,
            None => direct,
        };
        self.values.get(index).copied()
    }
}

#[derive(Debug, Clone)]
struct Geometry {
    name: String,
    control_points: Vec<Vec3>,
    polygon_vertex_index: Vec<i32>,
    normals: Option<Layer<Vec3>>,
    uvs: Option<Layer<Vec2>>,
    material_slots: Option<Layer<i32>>,
}

#[derive(Debug, Clone)]
struct ModelNode {
    name: String,
    local: Mat4,
    parent: Option<i64>,
    geometries: Vec<i64>,
    materials: Vec<i64>,
}

#[derive(Debug, Clone)]
struct MaterialNode {
    name: String,
    diffuse: [f32; 3],
    texture: Option<i64>,
}

/// Object graph of an FBX file, ready to be turned into a [`ModelAsset`].
#[derive(Debug, Clone)]
pub struct ParsedScene {
    source: PathBuf,
    geometries: BTreeMap<i64, Geometry>,
    models: BTreeMap<i64, ModelNode>,
    materials: HashMap<i64, MaterialNode>,
    textures: Vec<TextureSource>,
}

impl ParsedScene {
    pub fn from_document(document: &Document, source: &Path) -> Result<Self, AssetError> {
        let objects = document
            .root("Objects")
            .ok_or_else(|| AssetError::MissingObjects {
                path: source.display().to_string(),
            })?;
        let base_dir = source.parent().map(Path::to_path_buf).unwrap_or_default();

        let mut scene = Self {
            source: source.to_path_buf(),
            geometries: BTreeMap::new(),
            models: BTreeMap::new(),
            materials: HashMap::new(),
            textures: Vec::new(),
        };

        for object in &objects.children {
            let Some(id) = object.id() else {
                continue;
            };
            match object.name.as_str() {
                "Geometry" if object_class(object) == Some("Mesh") => {
                    scene.geometries.insert(id, read_geometry(object));
                }
                "Model" => {
                    scene.models.insert(id, read_model(object));
                }
                "Material" => {
                    scene.materials.insert(id, read_material(object));
                }
                "Texture" => {
                    scene.textures.push(read_texture(object, id, &base_dir));
                }
                _ => {}
            }
        }

        if let Some(connections) = document.root("Connections") {
            for link in connections.children_named("C") {
                scene.connect(link);
            }
        }

        log::debug!(
            "FBX object graph: {} geometries, {} models, {} materials, {} textures",
            scene.geometries.len(),
            scene.models.len(),
            scene.materials.len(),
            scene.textures.len()
        );
        Ok(scene)
    }

    pub fn texture_sources(&self) -> &[TextureSource] {
        &self.textures
    }

    pub fn build(self, textures: &HashMap<i64, Arc<Texture>>) -> Result<ModelAsset, AssetError> {
        let fallback = Arc::new(Material::fallback());
        let materials: HashMap<i64, Arc<Material>> = self
            .materials
            .iter()
            .map(|(id, node)| {
                let material = Material {
                    name: node.name.clone(),
                    diffuse: node.diffuse,
                    map: node.texture.and_then(|texture| textures.get(&texture).cloned()),
                    ..Material::fallback()
                };
                (*id, Arc::new(material))
            })
            .collect();

        let mut meshes = Vec::new();
        for model in self.models.values() {
            if model.geometries.is_empty() {
                continue;
            }
            let world = self.world_transform(model);
            let slots: Vec<Arc<Material>> = model
                .materials
                .iter()
                .map(|id| materials.get(id).cloned().unwrap_or_else(|| fallback.clone()))
                .collect();
            for geometry_id in &model.geometries {
                if let Some(geometry) = self.geometries.get(geometry_id) {
                    meshes.extend(triangulate(geometry, &model.name, world, &slots, &fallback));
                }
            }
        }

        if meshes.is_empty() {
            // Some exporters leave geometry unconnected; show it untransformed.
            for geometry in self.geometries.values() {
                meshes.extend(triangulate(geometry, &geometry.name, Mat4::IDENTITY, &[], &fallback));
            }
        }

        meshes.retain(|mesh| !mesh.indices.is_empty());
        if meshes.is_empty() {
            return Err(AssetError::NoGeometry {
                path: self.source.display().to_string(),
            });
        }
        Ok(ModelAsset::new(&self.source, meshes))
    }

    fn connect(&mut self, link: &Node) {
        let kind = link.property(0).and_then(Property::as_str).unwrap_or("");
        let (Some(child), Some(parent)) = (
            link.property(1).and_then(Property::as_i64),
            link.property(2).and_then(Property::as_i64),
        ) else {
            return;
        };
        let slot = link.property(3).and_then(Property::as_str);

        if self.geometries.contains_key(&child) {
            if let Some(model) = self.models.get_mut(&parent) {
                model.geometries.push(child);
            }
        } else if self.materials.contains_key(&child) {
            if let Some(model) = self.models.get_mut(&parent) {
                model.materials.push(child);
            }
        } else if self.textures.iter().any(|texture| texture.id == child) {
            if let Some(material) = self.materials.get_mut(&parent) {
                let diffuse_slot = kind != "OP" || slot.map_or(true, |name| name.contains("Diffuse"));
                if diffuse_slot && material.texture.is_none() {
                    material.texture = Some(child);
                }
            }
        } else if self.models.contains_key(&child) && self.models.contains_key(&parent) {
            if let Some(model) = self.models.get_mut(&child) {
                model.parent = Some(parent);
            }
        }
    }

    fn world_transform(&self, model: &ModelNode) -> Mat4 {
        let mut world = model.local;
        let mut parent = model.parent;
        let mut depth = 0;
        while let Some(id) = parent {
            let Some(node) = self.models.get(&id) else {
                break;
            };
            world = node.local * world;
            parent = node.parent;
            depth += 1;
            if depth >= MAX_PARENT_DEPTH {
                log::warn!("FBX model hierarchy deeper than {MAX_PARENT_DEPTH}; truncating");
                break;
            }
        }
        world
    }
}

fn object_class(node: &Node) -> Option<&str> {
    node.property(2).and_then(Property::as_str)
}

fn read_geometry(node: &Node) -> Geometry {
    let control_points = node
        .child("Vertices")
        .and_then(|child| child.property(0))
        .and_then(Property::to_f64_vec)
        .map(|values| {
            values
                .chunks_exact(3)
                .map(|c| Vec3::new(c[0] as f32, c[1] as f32, c[2] as f32))
                .collect()
        })
        .unwrap_or_default();
    let polygon_vertex_index = node
        .child("PolygonVertexIndex")
        .and_then(|child| child.property(0))
        .and_then(Property::to_i32_vec)
        .unwrap_or_default();

    let normals = node.child("LayerElementNormal").and_then(|layer| {
        read_layer(layer, "Normals", "NormalsIndex", |values| {
            values
                .chunks_exact(3)
                .map(|c| Vec3::new(c[0] as f32, c[1] as f32, c[2] as f32))
                .collect()
        })
    });
    let uvs = node.child("LayerElementUV").and_then(|layer| {
        read_layer(layer, "UV", "UVIndex", |values| {
            values
                .chunks_exact(2)
                .map(|c| Vec2::new(c[0] as f32, c[1] as f32))
                .collect()
        })
    });
    let material_slots = node.child("LayerElementMaterial").and_then(|layer| {
        let values = layer
            .child("Materials")
            .and_then(|child| child.property(0))
            .and_then(Property::to_i32_vec)?;
        Some(Layer {
            mapping: read_mapping(layer),
            values,
            indices: None,
        })
    });

    Geometry {
        name: node.object_name().to_string(),
        control_points,
        polygon_vertex_index,
        normals,
        uvs,
        material_slots,
    }
}

fn read_layer<T>(
    layer: &Node,
    values_name: &str,
    index_name: &str,
    convert: impl Fn(&[f64]) -> Vec<T>,
) -> Option<Layer<T>> {
    let values = layer
        .child(values_name)
        .and_then(|child| child.property(0))
        .and_then(Property::to_f64_vec)?;
    let reference = layer
        .child("ReferenceInformationType")
        .and_then(|child| child.property(0))
        .and_then(Property::as_str)
        .unwrap_or("Direct");
    let indices = if reference == "IndexToDirect" || reference == "Index" {
        layer
            .child(index_name)
            .and_then(|child| child.property(0))
            .and_then(Property::to_i32_vec)
    } else {
        None
    };
    Some(Layer {
        mapping: read_mapping(layer),
        values: convert(&values),
        indices,
    })
}

fn read_mapping(layer: &Node) -> Mapping {
    let mapping = layer
        .child("MappingInformationType")
        .and_then(|child| child.property(0))
        .and_then(Property::as_str)
        .unwrap_or("ByPolygonVertex");
    match mapping {
        "ByVertice" | "ByVertex" | "ByControlPoint" => Mapping::ByControlPoint,
        "ByPolygon" => Mapping::ByPolygon,
        "AllSame" => Mapping::AllSame,
        _ => Mapping::ByPolygonVertex,
    }
}

/// Looks up a `Properties70` entry and returns its trailing numeric values.
fn property70_values(node: &Node, name: &str) -> Option<Vec<f64>> {
    let properties = node.child("Properties70")?;
    let entry = properties
        .children_named("P")
        .find(|p| p.property(0).and_then(Property::as_str) == Some(name))?;
    let values: Vec<f64> = entry
        .properties
        .iter()
        .skip(4)
        .filter_map(Property::as_f64)
        .collect();
    (!values.is_empty()).then_some(values)
}

fn property70_vec3(node: &Node, name: &str) -> Option<Vec3> {
    let values = property70_values(node, name)?;
    (values.len() >= 3).then(|| Vec3::new(values[0] as f32, values[1] as f32, values[2] as f32))
}

fn read_model(node: &Node) -> ModelNode {
    let translation = property70_vec3(node, "Lcl Translation").unwrap_or(Vec3::ZERO);
    let rotation = property70_vec3(node, "Lcl Rotation").unwrap_or(Vec3::ZERO);
    let pre_rotation = property70_vec3(node, "PreRotation").unwrap_or(Vec3::ZERO);
    let scaling = property70_vec3(node, "Lcl Scaling").unwrap_or(Vec3::ONE);

    let local = Mat4::from_translation(translation)
        * euler_xyz_degrees(pre_rotation)
        * euler_xyz_degrees(rotation)
        * Mat4::from_scale(scaling);

    ModelNode {
        name: node.object_name().to_string(),
        local,
        parent: None,
        geometries: Vec::new(),
        materials: Vec::new(),
    }
}

/// FBX default rotation order: X applied first, then Y, then Z.
fn euler_xyz_degrees(degrees: Vec3) -> Mat4 {
    Mat4::from_rotation_z(degrees.z.to_radians())
        * Mat4::from_rotation_y(degrees.y.to_radians())
        * Mat4::from_rotation_x(degrees.x.to_radians())
}

fn read_material(node: &Node) -> MaterialNode {
    let diffuse = property70_vec3(node, "DiffuseColor")
        .or_else(|| property70_vec3(node, "Diffuse"))
        .map(|color| [color.x, color.y, color.z])
        .unwrap_or(Material::fallback().diffuse);
    MaterialNode {
        name: node.object_name().to_string(),
        diffuse,
        texture: None,
    }
}

fn read_texture(node: &Node, id: i64, base_dir: &Path) -> TextureSource {
    let string_child = |name: &str| {
        node.child(name)
            .and_then(|child| child.property(0))
            .and_then(Property::as_str)
            .filter(|value| !value.is_empty())
            .map(|value| value.replace('\\', "/"))
    };

    let mut candidates = Vec::new();
    if let Some(relative) = string_child("RelativeFilename") {
        candidates.push(base_dir.join(&relative));
    }
    if let Some(absolute) = string_child("FileName") {
        let absolute = PathBuf::from(absolute);
        if let Some(file_name) = absolute.file_name() {
            candidates.push(base_dir.join(file_name));
        }
        candidates.push(absolute);
    }
    candidates.dedup();

    TextureSource {
        id,
        name: node.object_name().to_string(),
        candidates,
    }
}

#[derive(Default)]
struct MeshBuilder {
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    uvs: Vec<Vec2>,
    indices: Vec<u32>,
    has_normals: bool,
}

struct Corner {
    polygon_vertex: usize,
    control_point: usize,
}

fn triangulate(
    geometry: &Geometry,
    name: &str,
    world: Mat4,
    slots: &[Arc<Material>],
    fallback: &Arc<Material>,
) -> Vec<Mesh> {
    let normal_matrix = if world.determinant().abs() > f32::EPSILON {
        Mat3::from_mat4(world).inverse().transpose()
    } else {
        Mat3::IDENTITY
    };
    let mirrored = world.determinant() < 0.0;

    let mut builders: BTreeMap<usize, MeshBuilder> = BTreeMap::new();
    let mut polygon: Vec<Corner> = Vec::new();
    let mut polygon_index = 0usize;

    for (polygon_vertex, &raw) in geometry.polygon_vertex_index.iter().enumerate() {
        let (control_point, last) = if raw < 0 {
            ((!raw) as usize, true)
        } else {
            (raw as usize, false)
        };
        polygon.push(Corner {
            polygon_vertex,
            control_point,
        });
        if !last {
            continue;
        }

        let slot = geometry
            .material_slots
            .as_ref()
            .and_then(|layer| layer.value(polygon_vertex, control_point, polygon_index))
            .and_then(|slot| usize::try_from(slot).ok())
            .unwrap_or(0);
        let builder = builders.entry(slot).or_default();
        emit_polygon(geometry, &polygon, polygon_index, world, normal_matrix, mirrored, builder);

        polygon.clear();
        polygon_index += 1;
    }

    let multiple = builders.len() > 1;
    builders
        .into_iter()
        .map(|(slot, mut builder)| {
            if !builder.has_normals {
                compute_flat_normals(&mut builder);
            }
            Mesh {
                name: if multiple {
                    format!("{name}#{slot}")
                } else {
                    name.to_string()
                },
                positions: builder.positions,
                normals: builder.normals,
                uvs: builder.uvs,
                indices: builder.indices,
                material: slots.get(slot).cloned().unwrap_or_else(|| fallback.clone()),
            }
        })
        .collect()
}

fn emit_polygon(
    geometry: &Geometry,
    polygon: &[Corner],
    polygon_index: usize,
    world: Mat4,
    normal_matrix: Mat3,
    mirrored: bool,
    builder: &mut MeshBuilder,
) {
    if polygon.len() < 3 {
        return;
    }
    if polygon
        .iter()
        .any(|corner| corner.control_point >= geometry.control_points.len())
    {
        log::warn!("skipping polygon {polygon_index} of {}: bad vertex index", geometry.name);
        return;
    }

    let base = builder.positions.len() as u32;
    for corner in polygon {
        let position = world.transform_point3(geometry.control_points[corner.control_point]);
        let normal = geometry
            .normals
            .as_ref()
            .and_then(|layer| layer.value(corner.polygon_vertex, corner.control_point, polygon_index))
            .map(|normal| (normal_matrix * normal).normalize_or_zero());
        let uv = geometry
            .uvs
            .as_ref()
            .and_then(|layer| layer.value(corner.polygon_vertex, corner.control_point, polygon_index))
            .unwrap_or(Vec2::ZERO);

        builder.has_normals |= normal.is_some();
        builder.positions.push(position);
        builder.normals.push(normal.unwrap_or(Vec3::ZERO));
        builder.uvs.push(uv);
    }

    for i in 1..(polygon.len() as u32 - 1) {
        if mirrored {
            builder.indices.extend_from_slice(&[base, base + i + 1, base + i]);
        } else {
            builder.indices.extend_from_slice(&[base, base + i, base + i + 1]);
        }
    }
}

fn compute_flat_normals(builder: &mut MeshBuilder) {
    for triangle in builder.indices.chunks_exact(3) {
        let [a, b, c] = [triangle[0], triangle[1], triangle[2]].map(|i| i as usize);
        let normal = (builder.positions[b] - builder.positions[a])
            .cross(builder.positions[c] - builder.positions[a])
            .normalize_or_zero();
        for index in [a, b, c] {
            builder.normals[index] = normal;
        }
    }
}
