//! Common utilities for integration tests.

#![allow(dead_code)]

use frame_graph::device::{DummyDevice, GpuTexture};
use frame_graph::{
    GraphError, PassHandle, RenderGraph, ResourceDescriptor, ResourceHandle, TextureDesc,
    TextureFormat, WorkerPool,
};

/// Install a test logger once per test binary.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn color_desc() -> ResourceDescriptor {
    ResourceDescriptor::Texture(TextureDesc::new(32, 32, TextureFormat::Rgba16Float))
}

/// A dummy device, a graph with its factories registered, and a pool.
pub struct TestContext {
    pub device: DummyDevice,
    pub graph: RenderGraph,
    pub pool: WorkerPool,
}

impl TestContext {
    pub fn new(threads: usize) -> Self {
        init_logging();
        let device = DummyDevice::new(threads);
        let mut graph = RenderGraph::new();
        device.register_factories(&mut graph);
        Self {
            device,
            graph,
            pool: WorkerPool::new(threads),
        }
    }

    /// A pass creating the texture `output` and recording one marker.
    pub fn creator(&mut self, name: &str, output: &str) -> (PassHandle, ResourceHandle<GpuTexture>) {
        let output = output.to_string();
        self.graph
            .add_callback_pass(
                name,
                |b| b.create::<GpuTexture>(&output, color_desc()),
                |_, ctx| {
                    let name = ctx.name();
                    ctx.commands().marker(name);
                    Ok(())
                },
            )
            .unwrap()
    }

    /// A pass reading `input` and creating the texture `output`.
    pub fn transform(
        &mut self,
        name: &str,
        input: ResourceHandle<GpuTexture>,
        output: &str,
    ) -> Result<(PassHandle, ResourceHandle<GpuTexture>), GraphError> {
        let output = output.to_string();
        self.graph.add_callback_pass(
            name,
            |b| {
                b.read(input)?;
                b.create::<GpuTexture>(&output, color_desc())
            },
            |_, ctx| {
                let name = ctx.name();
                ctx.commands().marker(name);
                Ok(())
            },
        )
    }

    /// Compiled pass names in order.
    pub fn order(&mut self) -> Vec<String> {
        self.graph
            .compiled_pass_names()
            .unwrap()
            .into_iter()
            .map(str::to_string)
            .collect()
    }
}
