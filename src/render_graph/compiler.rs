//! Render graph compilation.
//!
//! Turns the declared passes into an execution plan ([`CompiledGraph`]):
//!
//! 1. **Dependency edges** - replay every enabled pass's accesses in
//!    declaration order and derive read-after-write, write-after-write and
//!    write-after-read edges, plus explicit dependencies.
//! 2. **Topological sort** - Kahn's algorithm with the lowest declaration index
//!    picked first, so identical declarations always compile to the same order.
//! 3. **Culling** - walk backwards from the roots (cull-immune passes and the
//!    producers of frame outputs) and drop every pass not reached.
//! 4. **Validation** - every read by a live pass must be resolved by an
//!    external value or by an earlier live producer.
//!
//! Write-after-read edges only order passes. They never keep a pass alive,
//! otherwise a reader would make every later writer of the same resource
//! live.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::error::GraphError;
use crate::render_graph::pass::{AccessKind, PassHandle, PassNode};
use crate::render_graph::resource::{ResourceId, ResourceOrigin, ResourceRegistry};

/// Why one pass must run after another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// The dependent reads what the dependency created or wrote.
    ReadAfterWrite,
    /// Both write the resource; declaration order decides.
    WriteAfterWrite,
    /// The dependent overwrites what the dependency read.
    WriteAfterRead,
    /// Added with `RenderGraph::add_dependency`.
    Explicit,
}

impl EdgeKind {
    /// Whether this edge keeps its dependency alive during culling.
    pub fn carries_data(self) -> bool {
        !matches!(self, EdgeKind::WriteAfterRead)
    }
}

/// A dependency edge: `dependent` runs after `dependency`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DependencyEdge {
    pub dependent: PassHandle,
    pub dependency: PassHandle,
    pub kind: EdgeKind,
    /// The resource the edge was derived from; `None` for explicit edges
    pub resource: Option<ResourceId>,
}

/// A compiled render graph ready for execution.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CompiledGraph {
    pass_order: Vec<PassHandle>,
    culled: Vec<PassHandle>,
    disabled: Vec<PassHandle>,
    edges: Vec<DependencyEdge>,
    /// Position of each pass in `pass_order`, indexed by declaration index
    positions: Vec<Option<usize>>,
}

impl CompiledGraph {
    /// Live passes in execution order.
    pub fn pass_order(&self) -> &[PassHandle] {
        &self.pass_order
    }

    pub fn pass_count(&self) -> usize {
        self.pass_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pass_order.is_empty()
    }

    /// Enabled passes removed by culling, in declaration order.
    pub fn culled(&self) -> &[PassHandle] {
        &self.culled
    }

    /// Passes excluded because they are disabled.
    pub fn disabled(&self) -> &[PassHandle] {
        &self.disabled
    }

    /// Every edge between enabled passes.
    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    pub fn is_live(&self, pass: PassHandle) -> bool {
        self.position(pass).is_some()
    }

    /// Index of `pass` in the execution order.
    pub fn position(&self, pass: PassHandle) -> Option<usize> {
        self.positions.get(pass.index()).copied().flatten()
    }
}

#[derive(Default, Clone)]
struct ResourceState {
    last_writer: Option<PassHandle>,
    readers_since_write: Vec<PassHandle>,
}

struct UnresolvedRead {
    pass: PassHandle,
    resource: ResourceId,
}

/// Compile the declared passes into an execution plan.
pub(crate) fn compile(
    passes: &[PassNode],
    resources: &ResourceRegistry,
    explicit: &[(PassHandle, PassHandle)],
) -> Result<CompiledGraph, GraphError> {
    let n = passes.len();
    let enabled: Vec<bool> = passes.iter().map(PassNode::is_enabled).collect();

    let (mut edges, unresolved) = derive_edges(passes, &enabled, resources);
    for &(dependent, dependency) in explicit {
        if enabled[dependent.index()] && enabled[dependency.index()] {
            push_edge(
                &mut edges,
                DependencyEdge {
                    dependent,
                    dependency,
                    kind: EdgeKind::Explicit,
                    resource: None,
                },
            );
        }
    }

    let sorted = topological_sort(passes, &enabled, &edges)?;
    let live = live_passes(passes, &enabled, &edges, resources);

    if let Some(read) = unresolved.iter().find(|read| live[read.pass.index()]) {
        return Err(GraphError::UnresolvedRead {
            resource: resources.name(read.resource).to_string(),
            pass: passes[read.pass.index()].name().to_string(),
        });
    }

    let pass_order: Vec<PassHandle> = sorted
        .into_iter()
        .filter(|pass| live[pass.index()])
        .collect();
    let mut positions = vec![None; n];
    for (position, pass) in pass_order.iter().enumerate() {
        positions[pass.index()] = Some(position);
    }

    let handles = (0..n as u32).map(PassHandle::new);
    let culled = handles
        .clone()
        .filter(|h| enabled[h.index()] && !live[h.index()])
        .collect();
    let disabled = handles.filter(|h| !enabled[h.index()]).collect();

    Ok(CompiledGraph {
        pass_order,
        culled,
        disabled,
        edges,
        positions,
    })
}

fn push_edge(edges: &mut Vec<DependencyEdge>, edge: DependencyEdge) {
    if edge.dependent == edge.dependency {
        return;
    }
    let duplicate = edges.iter().any(|e| {
        e.dependent == edge.dependent && e.dependency == edge.dependency && e.kind == edge.kind
    });
    if !duplicate {
        edges.push(edge);
    }
}

/// Replay accesses in declaration order and derive the dependency edges.
///
/// Also collects reads that nothing has produced at the point they are
/// declared. Whether those are errors depends on culling.
fn derive_edges(
    passes: &[PassNode],
    enabled: &[bool],
    resources: &ResourceRegistry,
) -> (Vec<DependencyEdge>, Vec<UnresolvedRead>) {
    let mut states = vec![ResourceState::default(); resources.len()];
    let mut edges = Vec::new();
    let mut unresolved = Vec::new();

    for (index, node) in passes.iter().enumerate() {
        if !enabled[index] {
            continue;
        }
        let pass = PassHandle::new(index as u32);

        for access in node.accesses() {
            let resource = access.resource;
            let Some(state) = states.get_mut(resource.index()) else {
                continue;
            };
            match access.kind {
                AccessKind::Create => {
                    state.last_writer = Some(pass);
                    state.readers_since_write.clear();
                }
                AccessKind::Read => {
                    match state.last_writer {
                        Some(writer) => push_edge(
                            &mut edges,
                            DependencyEdge {
                                dependent: pass,
                                dependency: writer,
                                kind: EdgeKind::ReadAfterWrite,
                                resource: Some(resource),
                            },
                        ),
                        None => {
                            let external = resources
                                .get(resource)
                                .is_some_and(|r| r.origin() == ResourceOrigin::External);
                            if !external {
                                unresolved.push(UnresolvedRead { pass, resource });
                            }
                        }
                    }
                    if state.last_writer != Some(pass) && !state.readers_since_write.contains(&pass) {
                        state.readers_since_write.push(pass);
                    }
                }
                AccessKind::Write => {
                    if let Some(writer) = state.last_writer {
                        push_edge(
                            &mut edges,
                            DependencyEdge {
                                dependent: pass,
                                dependency: writer,
                                kind: EdgeKind::WriteAfterWrite,
                                resource: Some(resource),
                            },
                        );
                    }
                    for &reader in &state.readers_since_write {
                        push_edge(
                            &mut edges,
                            DependencyEdge {
                                dependent: pass,
                                dependency: reader,
                                kind: EdgeKind::WriteAfterRead,
                                resource: Some(resource),
                            },
                        );
                    }
                    state.last_writer = Some(pass);
                    state.readers_since_write.clear();
                }
            }
        }
    }

    (edges, unresolved)
}

/// Kahn's algorithm over enabled passes, lowest declaration index first.
fn topological_sort(
    passes: &[PassNode],
    enabled: &[bool],
    edges: &[DependencyEdge],
) -> Result<Vec<PassHandle>, GraphError> {
    let n = passes.len();

    // Edge (dependent, dependency) means dependent has one more in-degree
    let mut in_degree = vec![0u32; n];
    let mut dependents: Vec<Vec<PassHandle>> = vec![Vec::new(); n];
    for edge in edges {
        in_degree[edge.dependent.index()] += 1;
        dependents[edge.dependency.index()].push(edge.dependent);
    }

    let mut ready: BinaryHeap<Reverse<PassHandle>> = (0..n as u32)
        .map(PassHandle::new)
        .filter(|h| enabled[h.index()] && in_degree[h.index()] == 0)
        .map(Reverse)
        .collect();

    let mut order = Vec::with_capacity(n);
    while let Some(Reverse(handle)) = ready.pop() {
        order.push(handle);
        for &dependent in &dependents[handle.index()] {
            in_degree[dependent.index()] -= 1;
            if in_degree[dependent.index()] == 0 {
                ready.push(Reverse(dependent));
            }
        }
    }

    let enabled_count = enabled.iter().filter(|&&e| e).count();
    if order.len() != enabled_count {
        let passes = (0..n)
            .filter(|&i| enabled[i] && in_degree[i] > 0)
            .map(|i| passes[i].name().to_string())
            .collect();
        return Err(GraphError::CyclicDependency { passes });
    }

    Ok(order)
}

/// Mark every pass reachable backwards from the roots over data edges.
fn live_passes(
    passes: &[PassNode],
    enabled: &[bool],
    edges: &[DependencyEdge],
    resources: &ResourceRegistry,
) -> Vec<bool> {
    let n = passes.len();
    let mut live = vec![false; n];
    let mut stack: Vec<PassHandle> = Vec::new();

    let mark = |pass: PassHandle, live: &mut Vec<bool>, stack: &mut Vec<PassHandle>| {
        if enabled[pass.index()] && !live[pass.index()] {
            live[pass.index()] = true;
            stack.push(pass);
        }
    };

    for (index, node) in passes.iter().enumerate() {
        if node.is_cull_immune() {
            mark(PassHandle::new(index as u32), &mut live, &mut stack);
        }
    }
    for (_, resource) in resources.iter().filter(|(_, r)| r.is_frame_output()) {
        if let Some(producer) = resource.producer() {
            mark(producer, &mut live, &mut stack);
        }
        for &writer in resource.writers() {
            mark(writer, &mut live, &mut stack);
        }
    }

    while let Some(pass) = stack.pop() {
        for edge in edges {
            if edge.dependent == pass && edge.kind.carries_data() {
                mark(edge.dependency, &mut live, &mut stack);
            }
        }
    }

    live
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_graph::graph::RenderGraph;
    use crate::render_graph::resource::{GraphResource, ResourceHandle, ResourceKind};
    use crate::render_graph::resource::{ResourceDescriptor, TextureDesc, TextureFormat};

    struct Tex;

    impl GraphResource for Tex {
        const KIND: ResourceKind = ResourceKind::Texture;
    }

    fn desc() -> ResourceDescriptor {
        ResourceDescriptor::Texture(TextureDesc::new(16, 16, TextureFormat::Rgba8Unorm))
    }

    fn creator(graph: &mut RenderGraph, name: &str, resource: &str) -> (PassHandle, ResourceHandle<Tex>) {
        let resource = resource.to_string();
        let (pass, handle) = graph
            .add_callback_pass(name, |b| b.create::<Tex>(&resource, desc()), |_, _| Ok(()))
            .unwrap();
        (pass, handle)
    }

    fn reader(graph: &mut RenderGraph, name: &str, inputs: &[ResourceHandle<Tex>]) -> PassHandle {
        let inputs = inputs.to_vec();
        graph
            .add_callback_pass(
                name,
                |b| {
                    for input in inputs {
                        b.read(input)?;
                    }
                    Ok(())
                },
                |_, _| Ok(()),
            )
            .unwrap()
            .0
    }

    #[test]
    fn test_compile_empty_graph() {
        let mut graph = RenderGraph::new();
        let compiled = graph.compile().unwrap();
        assert!(compiled.is_empty());
        assert_eq!(compiled.pass_count(), 0);
    }

    #[test]
    fn test_compile_linear_chain() {
        // A -> B -> C
        let mut graph = RenderGraph::new();
        let (a, ra) = creator(&mut graph, "A", "ra");
        let (b, rb) = graph
            .add_callback_pass(
                "B",
                |builder| {
                    builder.read(ra)?;
                    builder.create::<Tex>("rb", desc())
                },
                |_, _| Ok(()),
            )
            .unwrap();
        let c = reader(&mut graph, "C", &[rb]);
        graph.set_cull_immune(c, true).unwrap();

        let compiled = graph.compile().unwrap();
        assert_eq!(compiled.pass_order(), &[a, b, c]);
        assert!(compiled.culled().is_empty());
    }

    #[test]
    fn test_declaration_order_breaks_ties() {
        // Independent producers keep declaration order regardless of edges
        // added later.
        let mut graph = RenderGraph::new();
        let (a, ra) = creator(&mut graph, "A", "ra");
        let (b, rb) = creator(&mut graph, "B", "rb");
        let (c, rc) = creator(&mut graph, "C", "rc");
        let sink = reader(&mut graph, "Sink", &[rc, rb, ra]);
        graph.set_cull_immune(sink, true).unwrap();

        let first = graph.compile().unwrap().clone();
        assert_eq!(first.pass_order(), &[a, b, c, sink]);

        graph.set_cull_immune(sink, true).unwrap();
        let second = graph.compile().unwrap();
        assert_eq!(&first, second);
    }

    #[test]
    fn test_diamond() {
        //     A
        //    / \
        //   B   C
        //    \ /
        //     D
        let mut graph = RenderGraph::new();
        let (a, ra) = creator(&mut graph, "A", "ra");
        let (b, rb) = graph
            .add_callback_pass(
                "B",
                |builder| {
                    builder.read(ra)?;
                    builder.create::<Tex>("rb", desc())
                },
                |_, _| Ok(()),
            )
            .unwrap();
        let (c, rc) = graph
            .add_callback_pass(
                "C",
                |builder| {
                    builder.read(ra)?;
                    builder.create::<Tex>("rc", desc())
                },
                |_, _| Ok(()),
            )
            .unwrap();
        let d = reader(&mut graph, "D", &[rb, rc]);
        graph.set_cull_immune(d, true).unwrap();

        let compiled = graph.compile().unwrap();
        assert_eq!(compiled.pass_order(), &[a, b, c, d]);
    }

    #[test]
    fn test_write_after_read_orders_but_does_not_keep_alive() {
        let mut graph = RenderGraph::new();
        let (producer, color) = creator(&mut graph, "Producer", "Color");
        let consumer = reader(&mut graph, "Consumer", &[color]);
        let (overwrite, _) = graph
            .add_callback_pass("Overwrite", |b| b.write(color), |_, _| Ok(()))
            .unwrap();
        graph.set_cull_immune(consumer, true).unwrap();

        let compiled = graph.compile().unwrap();
        assert_eq!(compiled.pass_order(), &[producer, consumer]);
        assert_eq!(compiled.culled(), &[overwrite]);

        // Once the overwrite is live it must run after the consumer.
        graph.set_cull_immune(overwrite, true).unwrap();
        let compiled = graph.compile().unwrap();
        assert_eq!(compiled.pass_order(), &[producer, consumer, overwrite]);
        assert!(compiled.edges().iter().any(|e| e.dependent == overwrite
            && e.dependency == consumer
            && e.kind == EdgeKind::WriteAfterRead));
    }

    #[test]
    fn test_cycle_reports_pass_names() {
        let mut graph = RenderGraph::new();
        let (a, _) = creator(&mut graph, "A", "ra");
        let (b, _) = creator(&mut graph, "B", "rb");
        let (_d, _) = creator(&mut graph, "D", "rd");
        graph.set_cull_immune(a, true).unwrap();
        graph.add_dependency(b, a).unwrap();
        graph.add_dependency(a, b).unwrap();

        let err = graph.compile().unwrap_err();
        assert_eq!(
            err,
            GraphError::CyclicDependency {
                passes: vec!["A".into(), "B".into()]
            }
        );
    }

    #[test]
    fn test_read_of_unwritten_transient_is_unresolved() {
        let mut graph = RenderGraph::new();
        let shadow = graph
            .declare_transient::<Tex>("ShadowMap", desc())
            .unwrap();
        let lighting = reader(&mut graph, "Lighting", &[shadow]);
        graph.set_cull_immune(lighting, true).unwrap();

        assert_eq!(
            graph.compile().unwrap_err(),
            GraphError::UnresolvedRead {
                resource: "ShadowMap".into(),
                pass: "Lighting".into(),
            }
        );
    }

    #[test]
    fn test_unresolved_read_in_culled_pass_is_ignored() {
        let mut graph = RenderGraph::new();
        let shadow = graph
            .declare_transient::<Tex>("ShadowMap", desc())
            .unwrap();
        let dead = reader(&mut graph, "Dead", &[shadow]);

        let compiled = graph.compile().unwrap();
        assert_eq!(compiled.culled(), &[dead]);
    }

    #[test]
    fn test_transient_written_by_earlier_pass_resolves() {
        let mut graph = RenderGraph::new();
        let shadow = graph
            .declare_transient::<Tex>("ShadowMap", desc())
            .unwrap();
        let (shadows, _) = graph
            .add_callback_pass("Shadows", |b| b.write(shadow), |_, _| Ok(()))
            .unwrap();
        let lighting = reader(&mut graph, "Lighting", &[shadow]);
        graph.set_cull_immune(lighting, true).unwrap();

        let compiled = graph.compile().unwrap();
        assert_eq!(compiled.pass_order(), &[shadows, lighting]);
    }

    #[test]
    fn test_disabled_producer_unresolves_reader() {
        let mut graph = RenderGraph::new();
        let (geometry, gbuffer) = creator(&mut graph, "Geometry", "GBuffer");
        let lighting = reader(&mut graph, "Lighting", &[gbuffer]);
        graph.set_cull_immune(lighting, true).unwrap();
        assert_eq!(graph.compile().unwrap().pass_count(), 2);

        graph.set_pass_enabled(geometry, false).unwrap();
        assert!(matches!(
            graph.compile(),
            Err(GraphError::UnresolvedRead { .. })
        ));

        graph.set_pass_enabled(lighting, false).unwrap();
        let compiled = graph.compile().unwrap();
        assert!(compiled.is_empty());
        assert_eq!(compiled.disabled(), &[geometry, lighting]);
    }

    #[test]
    fn test_frame_output_roots_all_writers() {
        let mut graph = RenderGraph::new();
        let (base, color) = creator(&mut graph, "Base", "Color");
        let (overlay, _) = graph
            .add_callback_pass("Overlay", |b| b.write(color), |_, _| Ok(()))
            .unwrap();
        let (_unrelated, _) = creator(&mut graph, "Unrelated", "Other");
        graph.mark_frame_output(color).unwrap();

        let compiled = graph.compile().unwrap();
        assert_eq!(compiled.pass_order(), &[base, overlay]);
        assert_eq!(compiled.position(overlay), Some(1));
        assert!(!compiled.is_live(PassHandle::new(2)));
    }
}
