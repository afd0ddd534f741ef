//! Binary FBX node tree.
//!
//! `fbxcel` does the record decoding; this module copies its tree into owned
//! nodes with lenient property accessors. Interpreting the tree as geometry
//! lives in [`super::extract`].

use fbxcel::low::v7400::AttributeValue;
use fbxcel::tree::any::AnyTree;
use fbxcel::tree::v7400::NodeHandle;
use std::io::Cursor;

const BINARY_MAGIC: &[u8] = b"Kaydara FBX Binary  \0";
const ASCII_MARKER: &[u8] = b"; FBX";
/// Nesting limit for copied nodes. Real exports stay far below it.
pub const MAX_NODE_DEPTH: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum FbxError {
    #[error("ASCII FBX files are not supported, export as binary FBX")]
    Ascii,
    #[error("missing binary FBX header")]
    BadMagic,
    #[error("malformed binary FBX: {0}")]
    Malformed(String),
    #[error("unsupported FBX version")]
    UnsupportedVersion,
    #[error("node tree nested deeper than {limit} levels")]
    TooDeep { limit: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
    Raw(Vec<u8>),
    BoolArray(Vec<bool>),
    I32Array(Vec<i32>),
    I64Array(Vec<i64>),
    F32Array(Vec<f32>),
    F64Array(Vec<f64>),
}

impl From<&AttributeValue> for Property {
    fn from(value: &AttributeValue) -> Self {
        match value {
            AttributeValue::Bool(v) => Property::Bool(*v),
            AttributeValue::I16(v) => Property::I16(*v),
            AttributeValue::I32(v) => Property::I32(*v),
            AttributeValue::I64(v) => Property::I64(*v),
            AttributeValue::F32(v) => Property::F32(*v),
            AttributeValue::F64(v) => Property::F64(*v),
            AttributeValue::ArrBool(v) => Property::BoolArray(v.clone()),
            AttributeValue::ArrI32(v) => Property::I32Array(v.clone()),
            AttributeValue::ArrI64(v) => Property::I64Array(v.clone()),
            AttributeValue::ArrF32(v) => Property::F32Array(v.clone()),
            AttributeValue::ArrF64(v) => Property::F64Array(v.clone()),
            AttributeValue::String(v) => Property::String(v.clone()),
            AttributeValue::Binary(v) => Property::Raw(v.clone()),
        }
    }
}

impl Property {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Property::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Property::I16(value) => Some(value as i64),
            Property::I32(value) => Some(value as i64),
            Property::I64(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Property::F32(value) => Some(value as f64),
            Property::F64(value) => Some(value),
            Property::I16(value) => Some(value as f64),
            Property::I32(value) => Some(value as f64),
            Property::I64(value) => Some(value as f64),
            _ => None,
        }
    }

    pub fn to_f64_vec(&self) -> Option<Vec<f64>> {
        match self {
            Property::F64Array(values) => Some(values.clone()),
            Property::F32Array(values) => Some(values.iter().map(|&v| v as f64).collect()),
            Property::I32Array(values) => Some(values.iter().map(|&v| v as f64).collect()),
            _ => None,
        }
    }

    pub fn to_i32_vec(&self) -> Option<Vec<i32>> {
        match self {
            Property::I32Array(values) => Some(values.clone()),
            Property::I64Array(values) => Some(values.iter().map(|&v| v as i32).collect()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub name: String,
    pub properties: Vec<Property>,
    pub children: Vec<Node>,
}

impl Node {
    fn from_handle(handle: NodeHandle<'_>, depth: usize) -> Result<Self, FbxError> {
        if depth > MAX_NODE_DEPTH {
            return Err(FbxError::TooDeep {
                limit: MAX_NODE_DEPTH,
            });
        }
        let children = handle
            .children()
            .map(|child| Node::from_handle(child, depth + 1))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name: handle.name().to_string(),
            properties: handle.attributes().iter().map(Property::from).collect(),
            children,
        })
    }

    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|child| child.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.children.iter().filter(move |child| child.name == name)
    }

    pub fn property(&self, index: usize) -> Option<&Property> {
        self.properties.get(index)
    }

    pub fn id(&self) -> Option<i64> {
        self.property(0).and_then(Property::as_i64)
    }

    /// Object name with the `\0\x01Class` suffix stripped.
    pub fn object_name(&self) -> &str {
        self.property(1)
            .and_then(Property::as_str)
            .map(strip_class_suffix)
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub version: u32,
    pub roots: Vec<Node>,
}

impl Document {
    pub fn parse(bytes: &[u8]) -> Result<Self, FbxError> {
        if !bytes.starts_with(BINARY_MAGIC) {
            if looks_like_ascii(bytes) {
                return Err(FbxError::Ascii);
            }
            return Err(FbxError::BadMagic);
        }

        let tree = AnyTree::from_seekable_reader(Cursor::new(bytes))
            .map_err(|err| FbxError::Malformed(err.to_string()))?;
        let (version, tree) = match tree {
            AnyTree::V7400(version, tree, _footer) => (version.raw(), tree),
            _ => return Err(FbxError::UnsupportedVersion),
        };

        let roots = tree
            .root()
            .children()
            .map(|node| Node::from_handle(node, 1))
            .collect::<Result<Vec<_>, _>>()?;
        log::debug!("parsed FBX v{} with {} top-level nodes", version, roots.len());
        Ok(Self { version, roots })
    }

    pub fn root(&self, name: &str) -> Option<&Node> {
        self.roots.iter().find(|node| node.name == name)
    }
}

pub fn strip_class_suffix(name: &str) -> &str {
    name.split("\u{0}\u{1}").next().unwrap_or(name)
}

fn looks_like_ascii(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(256)];
    head.windows(ASCII_MARKER.len()).any(|window| window == ASCII_MARKER)
        || head.starts_with(b"FBXHeaderExtension")
}


#[cfg(test)]
mod tests {
    use super::fixture::*;
    use super::{Document, FbxError, Property, MAX_NODE_DEPTH};

    #[test]
    fn parses_nested_nodes_and_scalar_properties() {
        let bytes = document(&[node(
            "Objects",
            vec![],
            vec![node(
                "Model",
                vec![
                    prop_i64(42),
                    prop_str("Body\u{0}\u{1}Model"),
                    prop_str("Mesh"),
                ],
                vec![node("Version", vec![prop_i32(232)], vec![])],
            )],
        )]);

        let doc = Document::parse(&bytes).unwrap();
        assert_eq!(doc.version, 7400);
        let objects = doc.root("Objects").unwrap();
        let model = objects.child("Model").unwrap();
        assert_eq!(model.id(), Some(42));
        assert_eq!(model.object_name(), "Body");
        assert_eq!(model.property(2), Some(&Property::String("Mesh".into())));
        let version = model.child("Version").unwrap();
        assert_eq!(version.property(0).and_then(Property::as_i64), Some(232));
    }

    #[test]
    fn decodes_raw_and_compressed_arrays() {
        let values = [1.0, -2.5, 3.25, 0.0];
        let indices = [0, 1, -3];
        let bytes = document(&[node(
            "Geometry",
            vec![],
            vec![
                node("Vertices", vec![prop_f64_array(&values, true)], vec![]),
                node("PolygonVertexIndex", vec![prop_i32_array(&indices, false)], vec![]),
            ],
        )]);

        let doc = Document::parse(&bytes).unwrap();
        let geometry = doc.root("Geometry").unwrap();
        let vertices = geometry.child("Vertices").unwrap().property(0).unwrap();
        assert_eq!(vertices.to_f64_vec().unwrap(), values.to_vec());
        let polygon = geometry
            .child("PolygonVertexIndex")
            .unwrap()
            .property(0)
            .unwrap();
        assert_eq!(polygon.to_i32_vec().unwrap(), indices.to_vec());
    }

    #[test]
    fn rejects_ascii_files() {
        let text = b"; FBX 7.4.0 project file\nFBXHeaderExtension:  {\n}";
        assert!(matches!(Document::parse(text), Err(FbxError::Ascii)));
    }

    #[test]
    fn rejects_unknown_bytes() {
        assert!(matches!(
            Document::parse(b"definitely not a model file at all"),
            Err(FbxError::BadMagic)
        ));
    }

    #[test]
    fn truncated_file_is_malformed() {
        let mut bytes = document(&[node(
            "Objects",
            vec![prop_str("a fairly long string property")],
            vec![],
        )]);
        bytes.truncate(40);
        assert!(matches!(Document::parse(&bytes), Err(FbxError::Malformed(_))));
    }

    #[test]
    fn array_claiming_more_elements_than_stored_is_malformed() {
        let payload: Vec<u8> = [1.0f64, 2.0].iter().flat_map(|v| v.to_le_bytes()).collect();
        for compress in [true, false] {
            let bytes = document(&[node(
                "Geometry",
                vec![],
                vec![node(
                    "Vertices",
                    vec![prop_array_claiming(b'd', u32::MAX / 8, &payload, compress)],
                    vec![],
                )],
            )]);
            assert!(
                matches!(Document::parse(&bytes), Err(FbxError::Malformed(_))),
                "compress = {compress}"
            );
        }
    }

    fn nested_chain(depth: usize) -> FixtureNode {
        let mut current = node("Leaf", vec![prop_i32(0)], vec![]);
        for _ in 1..depth {
            current = node("Nest", vec![], vec![current]);
        }
        current
    }

    #[test]
    fn deeply_nested_nodes_are_rejected() {
        let bytes = document(&[nested_chain(MAX_NODE_DEPTH + 40)]);
        assert!(matches!(
            Document::parse(&bytes),
            Err(FbxError::TooDeep { limit: MAX_NODE_DEPTH })
        ));
    }

    #[test]
    fn nesting_up_to_the_limit_is_kept() {
        let bytes = document(&[nested_chain(MAX_NODE_DEPTH)]);
        let doc = Document::parse(&bytes).unwrap();
        let mut node = &doc.roots[0];
        let mut depth = 1;
        while let Some(child) = node.children.first() {
            node = child;
            depth += 1;
        }
        assert_eq!(depth, MAX_NODE_DEPTH);
        assert_eq!(node.name, "Leaf");
    }

    #[test]
    fn malformed_file_fails_on_a_loader_thread() {
        let bytes = document(&[nested_chain(MAX_NODE_DEPTH * 4)]);
        let result = std::thread::Builder::new()
            .name("asset-loader".into())
            .spawn(move || Document::parse(&bytes).map(|_| ()))
            .unwrap()
            .join()
            .expect("parse must not panic");
        assert!(matches!(result, Err(FbxError::TooDeep { .. })));
    }
}
