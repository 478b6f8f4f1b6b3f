//! Resource nodes of the render graph.
//!
//! Resources live in an index-stable arena owned by the [`ResourceRegistry`].
//! Passes refer to them through [`ResourceHandle`]s, which carry the Rust type
//! of the realized object so execute callbacks get typed access without
//! casting at the call site.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{GraphError, PassError, RealizeError};
use crate::render_graph::factory::{FactoryRegistry, RealizedObject};
use crate::render_graph::pass::PassHandle;

/// Untyped identifier of a resource node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub(crate) u32);

impl ResourceId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }

    /// Raw arena index.
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Typed handle to a resource node.
///
/// `T` is the type of the realized object. Handles are `Copy` and only valid
/// within the graph that created them.
pub struct ResourceHandle<T> {
    id: ResourceId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ResourceHandle<T> {
    pub(crate) fn new(id: ResourceId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }
}

impl<T> Clone for ResourceHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ResourceHandle<T> {}

impl<T> PartialEq for ResourceHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for ResourceHandle<T> {}

impl<T> fmt::Debug for ResourceHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceHandle<{}>({})", std::any::type_name::<T>(), self.id)
    }
}

/// Closed set of realized object kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Texture,
    Buffer,
    Sampler,
    /// Arbitrary caller-owned data (cameras, scene snapshots, shader programs)
    Value,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Texture => "texture",
            Self::Buffer => "buffer",
            Self::Sampler => "sampler",
            Self::Value => "value",
        };
        f.write_str(name)
    }
}

/// A type the graph can construct from a descriptor.
pub trait GraphResource: Any + Send + Sync {
    const KIND: ResourceKind;
}

/// Texture formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8UnormSrgb,
    Rgba16Float,
    Rgba32Float,
    Depth32Float,
    R32Float,
}

impl TextureFormat {
    pub fn is_depth(&self) -> bool {
        matches!(self, TextureFormat::Depth32Float)
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::Rgba8Unorm
            | TextureFormat::Rgba8UnormSrgb
            | TextureFormat::Bgra8UnormSrgb
            | TextureFormat::Depth32Float
            | TextureFormat::R32Float => 4,
            TextureFormat::Rgba16Float => 8,
            TextureFormat::Rgba32Float => 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub mip_levels: u32,
}

impl TextureDesc {
    pub fn new(width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            width,
            height,
            format,
            mip_levels: 1,
        }
    }

    pub fn with_mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels.max(1);
        self
    }

    /// Size of the top mip level in bytes.
    pub fn byte_size(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height) * u64::from(self.format.bytes_per_pixel())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BufferDesc {
    pub size: u64,
    /// Contents uploaded when the buffer is realized
    pub initial_data: Option<Vec<u8>>,
}

impl BufferDesc {
    pub fn new(size: u64) -> Self {
        Self {
            size,
            initial_data: None,
        }
    }

    /// A buffer sized to and initialized with `data`.
    pub fn with_data(data: &[u8]) -> Self {
        Self {
            size: data.len() as u64,
            initial_data: Some(data.to_vec()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerDesc {
    pub filter: FilterMode,
    pub clamp: bool,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            filter: FilterMode::Linear,
            clamp: true,
        }
    }
}

/// Plain data describing how to construct a resource.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceDescriptor {
    Texture(TextureDesc),
    Buffer(BufferDesc),
    Sampler(SamplerDesc),
    /// A caller-owned value; never constructed by the graph
    External { type_name: &'static str },
}

/// Discriminant of [`ResourceDescriptor`], used as a factory key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorKind {
    Texture,
    Buffer,
    Sampler,
    External,
}

impl ResourceDescriptor {
    pub fn kind(&self) -> DescriptorKind {
        match self {
            Self::Texture(_) => DescriptorKind::Texture,
            Self::Buffer(_) => DescriptorKind::Buffer,
            Self::Sampler(_) => DescriptorKind::Sampler,
            Self::External { .. } => DescriptorKind::External,
        }
    }

    /// Short human-readable summary for logs and diagnostics.
    pub fn summary(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Texture(desc) => write!(
                f,
                "texture {}x{} {:?} mips={}",
                desc.width, desc.height, desc.format, desc.mip_levels
            ),
            Self::Buffer(desc) => write!(f, "buffer {} bytes", desc.size),
            Self::Sampler(desc) => write!(f, "sampler {:?} clamp={}", desc.filter, desc.clamp),
            Self::External { type_name } => write!(f, "external {type_name}"),
        }
    }
}

impl fmt::Display for DescriptorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Texture => "texture descriptor",
            Self::Buffer => "buffer descriptor",
            Self::Sampler => "sampler descriptor",
            Self::External => "external descriptor",
        };
        f.write_str(name)
    }
}

/// Where a resource's contents come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceOrigin {
    /// Supplied by the caller, lifetime owned outside the graph.
    External,
    /// Declared on the graph; the first live writer produces it.
    Transient,
    /// Created by a pass during setup.
    Created(PassHandle),
}

/// A resource node.
#[derive(Debug)]
pub struct ResourceNode {
    name: String,
    kind: ResourceKind,
    descriptor: ResourceDescriptor,
    origin: ResourceOrigin,
    type_id: TypeId,
    type_name: &'static str,
    readers: Vec<PassHandle>,
    writers: Vec<PassHandle>,
    frame_output: bool,
    actual: Option<RealizedObject>,
}

impl ResourceNode {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    pub fn origin(&self) -> ResourceOrigin {
        self.origin
    }

    pub fn is_external(&self) -> bool {
        self.origin == ResourceOrigin::External
    }

    /// The pass that created this resource, if any.
    pub fn producer(&self) -> Option<PassHandle> {
        match self.origin {
            ResourceOrigin::Created(pass) => Some(pass),
            _ => None,
        }
    }

    pub fn readers(&self) -> &[PassHandle] {
        &self.readers
    }

    pub fn writers(&self) -> &[PassHandle] {
        &self.writers
    }

    /// True if some pass declared a write to this resource.
    pub fn is_written(&self) -> bool {
        !self.writers.is_empty()
    }

    pub fn is_frame_output(&self) -> bool {
        self.frame_output
    }

    pub fn is_realized(&self) -> bool {
        self.actual.is_some()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

/// Arena of resource nodes and their realized objects.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    nodes: Vec<ResourceNode>,
    by_name: HashMap<String, ResourceId>,
    epoch: u64,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a caller-owned resource. The graph never constructs or
    /// destroys it.
    pub fn declare_external<T: Any + Send + Sync>(
        &mut self,
        name: &str,
        value: Arc<T>,
    ) -> Result<ResourceHandle<T>, GraphError> {
        let id = self.insert::<T>(
            name,
            ResourceKind::Value,
            ResourceDescriptor::External {
                type_name: std::any::type_name::<T>(),
            },
            ResourceOrigin::External,
        )?;
        self.nodes[id.index()].actual = Some(value);
        Ok(ResourceHandle::new(id))
    }

    /// Register a resource the graph constructs and destroys itself.
    pub fn declare_transient<T: GraphResource>(
        &mut self,
        name: &str,
        descriptor: ResourceDescriptor,
    ) -> Result<ResourceHandle<T>, GraphError> {
        let id = self.insert::<T>(name, T::KIND, descriptor, ResourceOrigin::Transient)?;
        Ok(ResourceHandle::new(id))
    }

    pub(crate) fn declare_created<T: GraphResource>(
        &mut self,
        name: &str,
        descriptor: ResourceDescriptor,
        creator: PassHandle,
    ) -> Result<ResourceHandle<T>, GraphError> {
        let id = self.insert::<T>(name, T::KIND, descriptor, ResourceOrigin::Created(creator))?;
        Ok(ResourceHandle::new(id))
    }

    fn insert<T: Any>(
        &mut self,
        name: &str,
        kind: ResourceKind,
        descriptor: ResourceDescriptor,
        origin: ResourceOrigin,
    ) -> Result<ResourceId, GraphError> {
        if self.by_name.contains_key(name) {
            return Err(GraphError::DuplicateResource(name.to_string()));
        }
        let id = ResourceId(self.nodes.len() as u32);
        self.nodes.push(ResourceNode {
            name: name.to_string(),
            kind,
            descriptor,
            origin,
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            readers: Vec::new(),
            writers: Vec::new(),
            frame_output: false,
            actual: None,
        });
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    /// Replace the value of an external resource.
    ///
    /// This is how per-frame inputs reach the graph; it does not change the
    /// graph shape and never triggers recompilation.
    pub fn set_external<T: Any + Send + Sync>(
        &mut self,
        handle: ResourceHandle<T>,
        value: Arc<T>,
    ) -> Result<(), GraphError> {
        let node = self.node_mut(handle.id())?;
        if !node.is_external() {
            return Err(GraphError::NotExternal(node.name.clone()));
        }
        node.actual = Some(value);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: ResourceId) -> Option<&ResourceNode> {
        self.nodes.get(id.index())
    }

    pub(crate) fn node(&self, id: ResourceId) -> Result<&ResourceNode, GraphError> {
        self.nodes
            .get(id.index())
            .ok_or(GraphError::InvalidResourceHandle(id.0))
    }

    fn node_mut(&mut self, id: ResourceId) -> Result<&mut ResourceNode, GraphError> {
        self.nodes
            .get_mut(id.index())
            .ok_or(GraphError::InvalidResourceHandle(id.0))
    }

    /// Look up a resource by name.
    pub fn find(&self, name: &str) -> Option<ResourceId> {
        self.by_name.get(name).copied()
    }

    /// Look up a resource by name and check its type.
    pub fn find_typed<T: Any>(&self, name: &str) -> Result<ResourceHandle<T>, GraphError> {
        let id = self
            .find(name)
            .ok_or_else(|| GraphError::UnknownResource(name.to_string()))?;
        self.check_type::<T>(id)?;
        Ok(ResourceHandle::new(id))
    }

    pub(crate) fn check_type<T: Any>(&self, id: ResourceId) -> Result<(), GraphError> {
        let node = self.node(id)?;
        if node.type_id != TypeId::of::<T>() {
            return Err(GraphError::ResourceTypeMismatch {
                resource: node.name.clone(),
                expected: std::any::type_name::<T>(),
            });
        }
        Ok(())
    }

    pub fn name(&self, id: ResourceId) -> &str {
        self.nodes
            .get(id.index())
            .map_or("<invalid>", |node| node.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (ResourceId, &ResourceNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (ResourceId(i as u32), node))
    }

    pub(crate) fn add_reader(&mut self, id: ResourceId, pass: PassHandle) {
        if let Some(node) = self.nodes.get_mut(id.index()) {
            if !node.readers.contains(&pass) {
                node.readers.push(pass);
            }
        }
    }

    pub(crate) fn add_writer(&mut self, id: ResourceId, pass: PassHandle) {
        if let Some(node) = self.nodes.get_mut(id.index()) {
            if !node.writers.contains(&pass) {
                node.writers.push(pass);
            }
        }
    }

    pub(crate) fn set_frame_output(&mut self, id: ResourceId, output: bool) -> Result<(), GraphError> {
        self.node_mut(id)?.frame_output = output;
        Ok(())
    }

    /// Undo everything a failed pass setup registered.
    pub(crate) fn rollback(&mut self, resource_count: usize, pass: PassHandle) {
        for node in self.nodes.drain(resource_count..) {
            self.by_name.remove(&node.name);
        }
        for node in &mut self.nodes {
            node.readers.retain(|&p| p != pass);
            node.writers.retain(|&p| p != pass);
        }
    }

    /// Current realization epoch.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Start a new realization epoch, releasing every graph-owned object.
    pub(crate) fn begin_epoch(&mut self) -> usize {
        self.epoch += 1;
        self.release_transients()
    }

    /// Realize a resource through the factory registry.
    ///
    /// Idempotent: returns `Ok(false)` without touching the factory when the
    /// resource is already realized in this epoch.
    pub fn realize(&mut self, id: ResourceId, factories: &FactoryRegistry) -> Result<bool, RealizeError> {
        let Some(node) = self.nodes.get_mut(id.index()) else {
            return Err(RealizeError::NoFactory {
                resource: format!("#{}", id.0),
                descriptor: "<invalid handle>".to_string(),
                kind: "<unknown>".to_string(),
            });
        };
        if node.actual.is_some() {
            return Ok(false);
        }
        if node.is_external() {
            return Err(RealizeError::MissingExternal(node.name.clone()));
        }

        let object = factories
            .construct(&node.name, &node.descriptor, node.kind)
            .ok_or_else(|| RealizeError::NoFactory {
                resource: node.name.clone(),
                descriptor: node.descriptor.summary(),
                kind: node.kind.to_string(),
            })?
            .map_err(|source| RealizeError::Device {
                resource: node.name.clone(),
                descriptor: node.descriptor.summary(),
                source,
            })?;

        if (*object).type_id() != node.type_id {
            return Err(RealizeError::TypeMismatch {
                resource: node.name.clone(),
            });
        }

        log::trace!(
            "Realized '{}' ({}) in epoch {}",
            node.name,
            node.descriptor,
            self.epoch
        );
        node.actual = Some(object);
        Ok(true)
    }

    /// Typed access to a realized object.
    pub fn get_realized<T: Any>(&self, id: ResourceId) -> Result<&T, PassError> {
        let node = self
            .nodes
            .get(id.index())
            .ok_or_else(|| PassError::MissingResource(format!("#{}", id.0)))?;
        let object = node
            .actual
            .as_ref()
            .ok_or_else(|| PassError::MissingResource(node.name.clone()))?;
        object
            .downcast_ref::<T>()
            .ok_or_else(|| PassError::TypeMismatch(node.name.clone()))
    }

    /// Shared ownership of a realized object.
    pub fn get_shared<T: Any + Send + Sync>(&self, id: ResourceId) -> Option<Arc<T>> {
        let object = self.nodes.get(id.index())?.actual.clone()?;
        object.downcast::<T>().ok()
    }

    fn release_transients(&mut self) -> usize {
        let mut released = 0;
        for node in &mut self.nodes {
            if !node.is_external() && node.actual.take().is_some() {
                released += 1;
            }
        }
        released
    }

    /// Release every graph-owned object. External values are left alone.
    pub fn teardown(&mut self) -> usize {
        let released = self.release_transients();
        log::debug!("Released {released} transient resources");
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeviceError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, PartialEq)]
    struct Tex(u32);

    impl GraphResource for Tex {
        const KIND: ResourceKind = ResourceKind::Texture;
    }

    fn tex_desc() -> ResourceDescriptor {
        ResourceDescriptor::Texture(TextureDesc::new(64, 64, TextureFormat::Rgba8Unorm))
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut registry = ResourceRegistry::new();
        registry.declare_transient::<Tex>("A", tex_desc()).unwrap();
        let err = registry
            .declare_external("A", Arc::new(1u32))
            .unwrap_err();
        assert_eq!(err, GraphError::DuplicateResource("A".into()));
    }

    #[test]
    fn test_realize_is_idempotent() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut factories = FactoryRegistry::new();
        let counter = Arc::clone(&calls);
        factories.register(DescriptorKind::Texture, move |_name, _desc| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Tex(7))
        });

        let mut registry = ResourceRegistry::new();
        let handle = registry.declare_transient::<Tex>("Color", tex_desc()).unwrap();

        assert_eq!(registry.realize(handle.id(), &factories), Ok(true));
        assert_eq!(registry.realize(handle.id(), &factories), Ok(false));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.get_realized::<Tex>(handle.id()), Ok(&Tex(7)));

        assert_eq!(registry.begin_epoch(), 1);
        assert!(!registry.get(handle.id()).unwrap().is_realized());
        assert_eq!(registry.realize(handle.id(), &factories), Ok(true));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_realize_reports_failures() {
        let mut registry = ResourceRegistry::new();
        let handle = registry.declare_transient::<Tex>("HDR", tex_desc()).unwrap();

        let err = registry
            .realize(handle.id(), &FactoryRegistry::new())
            .unwrap_err();
        assert!(matches!(err, RealizeError::NoFactory { .. }));

        let mut factories = FactoryRegistry::new();
        factories.register::<Tex, _>(DescriptorKind::Texture, |_, _| Err(DeviceError::OutOfMemory));
        let err = registry.realize(handle.id(), &factories).unwrap_err();
        assert_eq!(
            err,
            RealizeError::Device {
                resource: "HDR".into(),
                descriptor: "texture 64x64 Rgba8Unorm mips=1".into(),
                source: DeviceError::OutOfMemory,
            }
        );
        assert!(!registry.get(handle.id()).unwrap().is_realized());
    }

    #[test]
    fn test_externals_survive_teardown() {
        let mut registry = ResourceRegistry::new();
        let camera = Arc::new(42u32);
        let handle = registry.declare_external("Camera", Arc::clone(&camera)).unwrap();
        registry.teardown();
        assert_eq!(registry.get_realized::<u32>(handle.id()), Ok(&42));
        assert_eq!(
            registry.get_realized::<f32>(handle.id()),
            Err(PassError::TypeMismatch("Camera".into()))
        );

        registry.set_external(handle, Arc::new(43)).unwrap();
        assert_eq!(registry.get_realized::<u32>(handle.id()), Ok(&43));
    }

    #[test]
    fn test_find_typed_checks_type() {
        let mut registry = ResourceRegistry::new();
        registry.declare_external("Exposure", Arc::new(1.0f32)).unwrap();
        assert!(registry.find_typed::<f32>("Exposure").is_ok());
        assert!(matches!(
            registry.find_typed::<u32>("Exposure"),
            Err(GraphError::ResourceTypeMismatch { .. })
        ));
        assert!(matches!(
            registry.find_typed::<f32>("Missing"),
            Err(GraphError::UnknownResource(_))
        ));
    }

    #[test]
    fn test_descriptor_summary() {
        let desc = ResourceDescriptor::Buffer(BufferDesc::with_data(&[1, 2, 3]));
        assert_eq!(desc.kind(), DescriptorKind::Buffer);
        assert_eq!(desc.summary(), "buffer 3 bytes");
        assert_eq!(
            TextureDesc::new(4, 4, TextureFormat::Rgba16Float).byte_size(),
            128
        );
    }
}
