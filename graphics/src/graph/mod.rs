//! Frame-graph compiler.
//!
//! Orders the shaderpack's render passes by their texture dependencies and
//! materializes each into a render-pass object:
//!
//! | Step | Type | Purpose |
//! |------|------|---------|
//! | Order | [`RenderGraph`] | Dependency edges and a stable topological sort |
//! | Resolve | [`RenderPassLayout`] | Inputs to attachments, fixed subpass dependency |
//! | Build | [`CompiledPass`] | The render-pass object plus its position |
//! | Cache | [`CompiledPasses`] | Compiled passes by name, in order |
//!
//! A pass depends on another when it reads a texture the other writes.
//! Ties are broken by declaration order, so the same shaderpack always
//! compiles to the same order.
//!
//! # Example
//!
//! ```
//! use nova_graphics::graph::RenderGraph;
//! use nova_graphics::shaderpack::RenderPassData;
//!
//! let passes = [
//!     RenderPassData::new("lighting").with_inputs(["albedo"]),
//!     RenderPassData::new("gbuffer").with_outputs(["albedo"]),
//! ];
//! let graph = RenderGraph::from_passes(&passes).unwrap();
//! let order = graph.compile().unwrap();
//! assert_eq!(graph.pass_names(order.pass_order()), vec!["gbuffer", "lighting"]);
//! ```

mod pass;
mod target;

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use crate::backend::GpuBackend;
use crate::error::{ConfigError, GraphicsError};
use crate::resources::DynamicTextures;
use crate::shaderpack::RenderPassData;

pub use pass::{
    AttachmentDescription, AttachmentReference, CompiledPass, RenderPassLayout, SubpassDependency,
};
pub use target::{AttachmentLayout, LoadOp, StoreOp};

/// Handle to a pass in the render graph.
///
/// `PassHandle` is `Copy` and cheap to pass around. It is only valid within
/// the `RenderGraph` that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassHandle(u32);

impl PassHandle {
    fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Declaration index of the pass.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Dependency graph over declared passes.
#[derive(Debug, Default)]
pub struct RenderGraph<'a> {
    passes: Vec<&'a RenderPassData>,
    /// Dependency edges stored as (dependent, dependency) pairs.
    edges: Vec<(PassHandle, PassHandle)>,
}

impl<'a> RenderGraph<'a> {
    /// Build the graph from passes in declaration order.
    ///
    /// Pass `A` depends on pass `B` when one of `A`'s texture inputs is among
    /// `B`'s texture outputs. Inputs nobody produces add no edge.
    pub fn from_passes(passes: &'a [RenderPassData]) -> Result<Self, ConfigError> {
        let mut producers: HashMap<&str, Vec<PassHandle>> = HashMap::new();
        let mut seen: HashMap<&str, PassHandle> = HashMap::new();
        for (index, pass) in passes.iter().enumerate() {
            let handle = PassHandle::new(index);
            if seen.insert(pass.name.as_str(), handle).is_some() {
                return Err(ConfigError::DuplicatePass(pass.name.clone()));
            }
            for output in &pass.texture_outputs {
                producers.entry(output.as_str()).or_default().push(handle);
            }
        }

        let mut graph = Self {
            passes: passes.iter().collect(),
            edges: Vec::new(),
        };
        for (index, pass) in passes.iter().enumerate() {
            let dependent = PassHandle::new(index);
            for input in &pass.texture_inputs {
                for &dependency in producers.get(input.as_str()).into_iter().flatten() {
                    if dependency != dependent {
                        graph.add_dependency(dependent, dependency);
                    }
                }
            }
        }
        Ok(graph)
    }

    /// Add a dependency between passes.
    ///
    /// The `dependent` pass will execute after the `dependency` pass.
    pub fn add_dependency(&mut self, dependent: PassHandle, dependency: PassHandle) {
        if !self.edges.contains(&(dependent, dependency)) {
            self.edges.push((dependent, dependency));
        }
    }

    /// Get the dependencies of a pass.
    pub fn dependencies(&self, handle: PassHandle) -> impl Iterator<Item = PassHandle> + '_ {
        self.edges
            .iter()
            .filter(move |(dependent, _)| *dependent == handle)
            .map(|(_, dependency)| *dependency)
    }

    /// Number of passes.
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    /// The pass behind a handle.
    pub fn pass(&self, handle: PassHandle) -> &'a RenderPassData {
        self.passes[handle.index()]
    }

    /// Names of the passes behind `handles`.
    pub fn pass_names(&self, handles: &[PassHandle]) -> Vec<&'a str> {
        handles
            .iter()
            .map(|&h| self.passes[h.index()].name.as_str())
            .collect()
    }

    /// Sort the passes topologically.
    ///
    /// Among passes whose dependencies are all satisfied, the one declared
    /// first goes first. A cycle is reported with every pass that could not
    /// be ordered, in declaration order.
    pub fn compile(&self) -> Result<CompiledGraph, ConfigError> {
        let count = self.passes.len();
        let mut in_degree = vec![0usize; count];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];
        for &(dependent, dependency) in &self.edges {
            in_degree[dependent.index()] += 1;
            dependents[dependency.index()].push(dependent.index());
        }

        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(index, _)| Reverse(index))
            .collect();

        let mut pass_order = Vec::with_capacity(count);
        while let Some(Reverse(index)) = ready.pop() {
            pass_order.push(PassHandle::new(index));
            for &dependent in &dependents[index] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.push(Reverse(dependent));
                }
            }
        }

        if pass_order.len() < count {
            let passes = in_degree
                .iter()
                .enumerate()
                .filter(|(_, degree)| **degree > 0)
                .map(|(index, _)| self.passes[index].name.clone())
                .collect();
            return Err(ConfigError::DependencyCycle { passes });
        }
        Ok(CompiledGraph { pass_order })
    }
}

/// A topologically sorted render graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledGraph {
    pass_order: Vec<PassHandle>,
}

impl CompiledGraph {
    /// Pass execution order as handles.
    pub fn pass_order(&self) -> &[PassHandle] {
        &self.pass_order
    }
}

/// Compiled render passes of the loaded shaderpack, cached by name.
#[derive(Debug, Default)]
pub struct CompiledPasses {
    order: Vec<String>,
    passes: HashMap<String, CompiledPass>,
}

impl CompiledPasses {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Order the declared passes and build each one, in order.
    pub fn compile(
        backend: &dyn GpuBackend,
        declared: &[RenderPassData],
        textures: &DynamicTextures,
    ) -> Result<Self, GraphicsError> {
        let graph = RenderGraph::from_passes(declared)?;
        let compiled = graph.compile()?;

        let mut result = Self::new();
        for (position, &handle) in compiled.pass_order().iter().enumerate() {
            let pass = graph.pass(handle);
            let compiled_pass = CompiledPass::compile(backend, pass, textures, position)?;
            result.order.push(pass.name.clone());
            result.passes.insert(pass.name.clone(), compiled_pass);
        }
        log::info!("Compiled frame graph: {}", result.order.join(" -> "));
        Ok(result)
    }

    /// Look up a pass by name.
    pub fn get(&self, name: &str) -> Option<&CompiledPass> {
        self.passes.get(name)
    }

    /// Pass names in execution order.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Passes in execution order.
    pub fn iter(&self) -> impl Iterator<Item = &CompiledPass> {
        self.order.iter().filter_map(|name| self.passes.get(name))
    }

    /// Number of passes.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if there are no passes.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
