//! Graphviz export for offline debugging.
//!
//! Passes are boxes, resources are ellipses. Creates and writes point from
//! the pass to the resource, reads from the resource to the pass. With a
//! compiled graph, live passes are labelled with their execution position,
//! culled passes are greyed out and disabled passes are dotted.

use std::fmt::Write;

use crate::render_graph::compiler::{CompiledGraph, EdgeKind};
use crate::render_graph::graph::RenderGraph;
use crate::render_graph::pass::{AccessKind, PassHandle};

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Render the graph in DOT format.
pub fn to_dot(graph: &RenderGraph, compiled: Option<&CompiledGraph>) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail
    let _ = write_dot(&mut out, graph, compiled);
    out
}

fn write_dot(
    out: &mut String,
    graph: &RenderGraph,
    compiled: Option<&CompiledGraph>,
) -> std::fmt::Result {
    writeln!(out, "digraph render_graph {{")?;
    writeln!(out, "    rankdir=LR;")?;
    writeln!(out, "    node [fontname=\"monospace\"];")?;

    for (index, pass) in graph.passes().iter().enumerate() {
        let handle = PassHandle::new(index as u32);
        let name = escape(pass.name());
        let (label, style) = match compiled {
            _ if !pass.is_enabled() => (name, "style=dotted"),
            Some(c) => match c.position(handle) {
                Some(position) => (format!("{position}: {name}"), "style=solid"),
                None => (name, "style=filled, fillcolor=lightgrey, fontcolor=grey40"),
            },
            None => (name, "style=solid"),
        };
        let border = if pass.is_cull_immune() { ", peripheries=2" } else { "" };
        writeln!(out, "    p{} [shape=box, label=\"{label}\", {style}{border}];", handle.raw())?;
    }

    for (id, resource) in graph.resources().iter() {
        let shape = if resource.is_external() {
            "ellipse, style=dashed"
        } else {
            "ellipse"
        };
        let output = if resource.is_frame_output() { ", peripheries=2" } else { "" };
        writeln!(
            out,
            "    r{} [shape={shape}, label=\"{}\\n{}\"{output}];",
            id.raw(),
            escape(resource.name()),
            escape(&resource.descriptor().summary())
        )?;
    }

    for (index, pass) in graph.passes().iter().enumerate() {
        for access in pass.accesses() {
            let resource = access.resource.raw();
            match access.kind {
                AccessKind::Read => writeln!(out, "    r{resource} -> p{index};")?,
                AccessKind::Write => writeln!(out, "    p{index} -> r{resource} [color=red];")?,
                AccessKind::Create => writeln!(out, "    p{index} -> r{resource} [style=bold];")?,
            }
        }
    }

    match compiled {
        Some(c) => {
            for edge in c.edges().iter().filter(|e| e.kind == EdgeKind::Explicit) {
                writeln!(
                    out,
                    "    p{} -> p{} [style=dashed, label=\"after\"];",
                    edge.dependency.raw(),
                    edge.dependent.raw()
                )?;
            }
        }
        None => {
            for (dependent, dependency) in graph.explicit_dependencies() {
                writeln!(
                    out,
                    "    p{} -> p{} [style=dashed, label=\"after\"];",
                    dependency.raw(),
                    dependent.raw()
                )?;
            }
        }
    }

    writeln!(out, "}}")
}
