//! Build order over the import graph.
//!
//! [`schedule`] walks from the requested targets (all images when none are
//! given) up through their dependencies, emitting each image after all of
//! its dependencies. Ties are broken by discovery order: targets in the
//! order requested, dependencies in import order, each image emitted the
//! first time it is reached.

use crate::error::LayercakeError;
use crate::graph::{Graph, VertexId};
use anyhow::Result;

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

struct Walk<'g, 'a> {
    graph: &'g Graph<'a>,
    marks: Vec<Mark>,
    path: Vec<VertexId>,
    order: Vec<VertexId>,
}

impl Walk<'_, '_> {
    fn visit(&mut self, id: VertexId) -> Result<()> {
        match self.marks[id] {
            Mark::Done => return Ok(()),
            Mark::InProgress => return Err(self.cycle_from(id).into()),
            Mark::Unvisited => {}
        }

        self.marks[id] = Mark::InProgress;
        self.path.push(id);

        for &parent in self.graph.parents_of(id) {
            self.visit(parent)?;
        }

        self.path.pop();
        self.marks[id] = Mark::Done;
        self.order.push(id);
        Ok(())
    }

    /// Builds the cycle path `a -> b -> ... -> a`, listed dependents first.
    fn cycle_from(&self, id: VertexId) -> LayercakeError {
        let start = self.path.iter().position(|&v| v == id).unwrap_or(0);
        let names = self.path[start..]
            .iter()
            .chain(std::iter::once(&id))
            .map(|&v| self.graph.vertex(v).name.clone())
            .collect();
        LayercakeError::CycleDetected(names)
    }
}

/// Computes the build order for `targets` and their transitive imports.
///
/// Every dependency precedes its dependents, and images outside the
/// targets' import closure are left out. Fails with
/// [`LayercakeError::UnknownTarget`] for an undeclared target and
/// [`LayercakeError::CycleDetected`] when the walk re-enters an image that
/// is still being expanded.
pub fn schedule(graph: &Graph<'_>, targets: &[String]) -> Result<Vec<VertexId>> {
    let roots: Vec<VertexId> = if targets.is_empty() {
        (0..graph.len()).collect()
    } else {
        targets
            .iter()
            .map(|name| {
                graph
                    .get(name)
                    .ok_or_else(|| LayercakeError::UnknownTarget(name.clone()))
            })
            .collect::<std::result::Result<_, _>>()?
    };

    let mut walk = Walk {
        graph,
        marks: vec![Mark::Unvisited; graph.len()],
        path: Vec::new(),
        order: Vec::with_capacity(graph.len()),
    };

    for root in roots {
        walk.visit(root)?;
    }

    Ok(walk.order)
}
