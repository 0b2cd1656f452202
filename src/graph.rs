//! Import graph over the declared images.
//!
//! A plain adjacency list: one vertex per image, one edge per distinct
//! `import`, directed from the imported image (dependency) to the importing
//! image (dependent). Neighbour lists keep insertion order, so every walk
//! over the graph is reproducible.
//!
//! Cycles are not rejected here; see [`crate::scheduler`].

use crate::config::ImageSpec;
use crate::error::LayercakeError;
use anyhow::Result;
use std::collections::{BTreeMap, HashMap};

pub type VertexId = usize;

#[derive(Debug)]
pub struct Vertex<'a> {
    pub name: String,
    pub image: &'a ImageSpec,
}

#[derive(Debug, Default)]
pub struct Graph<'a> {
    vertices: Vec<Vertex<'a>>,
    index: HashMap<String, VertexId>,
    /// Dependencies of each vertex, in import order.
    parents: Vec<Vec<VertexId>>,
    /// Dependents of each vertex, in discovery order.
    children: Vec<Vec<VertexId>>,
}

impl<'a> Graph<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the graph for a set of declared images.
    ///
    /// Fails with [`LayercakeError::UndefinedReference`] on the first import
    /// that names an image not in `images`.
    pub fn from_images(images: &'a BTreeMap<String, ImageSpec>) -> Result<Self> {
        let mut graph = Self::new();

        for (name, image) in images {
            graph.add_vertex(name, image);
        }

        for (name, image) in images {
            let dependent = graph.index[name.as_str()];

            for import in image.imports() {
                let dependency =
                    graph
                        .get(import)
                        .ok_or_else(|| LayercakeError::UndefinedReference {
                            image: name.clone(),
                            import: import.to_string(),
                        })?;

                graph.add_edge(dependency, dependent);
            }
        }

        Ok(graph)
    }

    /// Adds a vertex, returning the existing id if the name is already present.
    pub fn add_vertex(&mut self, name: &str, image: &'a ImageSpec) -> VertexId {
        if let Some(&id) = self.index.get(name) {
            return id;
        }

        let id = self.vertices.len();
        self.vertices.push(Vertex {
            name: name.to_string(),
            image,
        });
        self.index.insert(name.to_string(), id);
        self.parents.push(Vec::new());
        self.children.push(Vec::new());
        id
    }

    /// Adds a dependency -> dependent edge. Repeated edges are collapsed.
    pub fn add_edge(&mut self, from: VertexId, to: VertexId) {
        if !self.children[from].contains(&to) {
            self.children[from].push(to);
            self.parents[to].push(from);
        }
    }

    pub fn get(&self, name: &str) -> Option<VertexId> {
        self.index.get(name).copied()
    }

    pub fn vertex(&self, id: VertexId) -> &Vertex<'a> {
        &self.vertices[id]
    }

    pub fn parents_of(&self, id: VertexId) -> &[VertexId] {
        &self.parents[id]
    }

    pub fn children_of(&self, id: VertexId) -> &[VertexId] {
        &self.children[id]
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }
}
