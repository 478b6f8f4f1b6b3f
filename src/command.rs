//! Command recording.
//!
//! Passes never talk to the device directly. They record [`Command`]s into a
//! [`RecordingContext`], which is finished into a [`CommandBuffer`] and handed
//! to the primary queue in compiled pass order. A recording context that lives
//! on a worker thread is a *deferred* context: it records independently of the
//! primary queue and only becomes visible once the primary thread submits it.

use crate::profiling::QueryId;
use crate::render_graph::ResourceId;
use crate::scene::{MaterialId, MeshId};

/// Which thread recorded a command buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordingThread {
    /// The primary thread that owns submission order.
    Primary,
    /// A worker thread with its own deferred context.
    Worker(usize),
}

/// Position of a timestamp inside a profiled region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimestampPoint {
    Begin,
    End,
}

/// A single recorded GPU command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    BeginPass { label: String },
    EndPass,
    BindMaterial(MaterialId),
    UnbindMaterial(MaterialId),
    Draw { mesh: MeshId, instance: u32 },
    Dispatch { x: u32, y: u32, z: u32 },
    WriteBuffer { target: ResourceId, data: Vec<u8> },
    Clear { target: ResourceId, color: [f32; 4] },
    Blit { source: ResourceId, destination: ResourceId },
    WriteTimestamp { query: QueryId, point: TimestampPoint },
    Marker(String),
}

/// A finished, immutable list of commands ready for submission.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandBuffer {
    label: String,
    thread: RecordingThread,
    commands: Vec<Command>,
}

impl CommandBuffer {
    /// Debug label, normally the recording pass name.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Thread the buffer was recorded on.
    pub fn thread(&self) -> RecordingThread {
        self.thread
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Number of draw commands in this buffer.
    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::Draw { .. }))
            .count()
    }

    /// Number of material binds in this buffer.
    pub fn material_binds(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::BindMaterial(_)))
            .count()
    }

    /// Timestamp queries written by this buffer, in recording order.
    pub fn timestamps(&self) -> impl Iterator<Item = (QueryId, TimestampPoint)> + '_ {
        self.commands.iter().filter_map(|c| match c {
            Command::WriteTimestamp { query, point } => Some((*query, *point)),
            _ => None,
        })
    }
}

/// Records commands into a buffer.
///
/// On a worker thread this is a deferred recording context; on the primary
/// thread it records the pass's immediate command stream.
#[derive(Debug)]
pub struct RecordingContext {
    buffer: CommandBuffer,
    bound_material: Option<MaterialId>,
}

impl RecordingContext {
    pub fn new(label: impl Into<String>, thread: RecordingThread) -> Self {
        Self {
            buffer: CommandBuffer {
                label: label.into(),
                thread,
                commands: Vec::new(),
            },
            bound_material: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.buffer.label
    }

    pub fn thread(&self) -> RecordingThread {
        self.buffer.thread
    }

    /// Append a raw command.
    pub fn push(&mut self, command: Command) {
        self.buffer.commands.push(command);
    }

    pub fn begin_pass(&mut self, label: impl Into<String>) {
        self.push(Command::BeginPass {
            label: label.into(),
        });
    }

    pub fn end_pass(&mut self) {
        self.push(Command::EndPass);
    }

    /// Bind `material` unless it is already bound.
    ///
    /// The previously bound material is unbound first. Returns `true` when a
    /// state change was recorded.
    pub fn bind_material(&mut self, material: MaterialId) -> bool {
        if self.bound_material == Some(material) {
            return false;
        }
        if let Some(previous) = self.bound_material.take() {
            self.push(Command::UnbindMaterial(previous));
        }
        self.push(Command::BindMaterial(material));
        self.bound_material = Some(material);
        true
    }

    /// Unbind the current material, if any.
    pub fn unbind_material(&mut self) {
        if let Some(previous) = self.bound_material.take() {
            self.push(Command::UnbindMaterial(previous));
        }
    }

    pub fn bound_material(&self) -> Option<MaterialId> {
        self.bound_material
    }

    pub fn draw(&mut self, mesh: MeshId, instance: u32) {
        self.push(Command::Draw { mesh, instance });
    }

    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.push(Command::Dispatch { x, y, z });
    }

    pub fn write_buffer(&mut self, target: ResourceId, data: &[u8]) {
        self.push(Command::WriteBuffer {
            target,
            data: data.to_vec(),
        });
    }

    pub fn clear(&mut self, target: ResourceId, color: [f32; 4]) {
        self.push(Command::Clear { target, color });
    }

    pub fn blit(&mut self, source: ResourceId, destination: ResourceId) {
        self.push(Command::Blit {
            source,
            destination,
        });
    }

    pub fn marker(&mut self, text: impl Into<String>) {
        self.push(Command::Marker(text.into()));
    }

    pub fn len(&self) -> usize {
        self.buffer.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.commands.is_empty()
    }

    /// Finish recording. Any material still bound is unbound first.
    pub fn finish(mut self) -> CommandBuffer {
        self.unbind_material();
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_material_only_on_change() {
        let mut ctx = RecordingContext::new("test", RecordingThread::Primary);
        assert!(ctx.bind_material(MaterialId(1)));
        assert!(!ctx.bind_material(MaterialId(1)));
        ctx.draw(MeshId(0), 0);
        assert!(ctx.bind_material(MaterialId(2)));
        ctx.draw(MeshId(1), 0);

        let buffer = ctx.finish();
        assert_eq!(
            buffer.commands(),
            &[
                Command::BindMaterial(MaterialId(1)),
                Command::Draw {
                    mesh: MeshId(0),
                    instance: 0
                },
                Command::UnbindMaterial(MaterialId(1)),
                Command::BindMaterial(MaterialId(2)),
                Command::Draw {
                    mesh: MeshId(1),
                    instance: 0
                },
                Command::UnbindMaterial(MaterialId(2)),
            ]
        );
        assert_eq!(buffer.material_binds(), 2);
        assert_eq!(buffer.draw_count(), 2);
    }

    #[test]
    fn test_buffer_keeps_label_and_thread() {
        let mut ctx = RecordingContext::new("geometry", RecordingThread::Worker(3));
        ctx.marker("hello");
        let buffer = ctx.finish();
        assert_eq!(buffer.label(), "geometry");
        assert_eq!(buffer.thread(), RecordingThread::Worker(3));
        assert_eq!(buffer.len(), 1);
    }
}
