//! Resource construction dispatch.
//!
//! Realization is resolved through a map keyed by
//! `(DescriptorKind, ResourceKind)`. The device collaborator registers one
//! constructor per pair it supports; the registry type-erases the produced
//! object so the graph can store every kind in one arena.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::DeviceError;
use crate::render_graph::resource::{DescriptorKind, GraphResource, ResourceDescriptor, ResourceKind};

/// A type-erased realized object.
pub type RealizedObject = Arc<dyn Any + Send + Sync>;

type FactoryFn =
    Box<dyn Fn(&str, &ResourceDescriptor) -> Result<RealizedObject, DeviceError> + Send + Sync>;

/// Constructors keyed by descriptor kind and resource kind.
#[derive(Default)]
pub struct FactoryRegistry {
    factories: HashMap<(DescriptorKind, ResourceKind), FactoryFn>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the constructor producing `T` from `descriptor` descriptors.
    ///
    /// The constructor receives the resource name and its descriptor. A
    /// previous constructor for the same pair is replaced; returns `true` in
    /// that case.
    pub fn register<T, F>(&mut self, descriptor: DescriptorKind, factory: F) -> bool
    where
        T: GraphResource,
        F: Fn(&str, &ResourceDescriptor) -> Result<T, DeviceError> + Send + Sync + 'static,
    {
        let erased: FactoryFn = Box::new(move |name: &str, desc: &ResourceDescriptor| {
            factory(name, desc).map(|object| Arc::new(object) as RealizedObject)
        });
        self.factories
            .insert((descriptor, T::KIND), erased)
            .is_some()
    }

    pub fn contains(&self, descriptor: DescriptorKind, kind: ResourceKind) -> bool {
        self.factories.contains_key(&(descriptor, kind))
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Run the constructor for `(descriptor.kind(), kind)`.
    ///
    /// Returns `None` when no constructor is registered for the pair.
    pub fn construct(
        &self,
        name: &str,
        descriptor: &ResourceDescriptor,
        kind: ResourceKind,
    ) -> Option<Result<RealizedObject, DeviceError>> {
        let factory = self.factories.get(&(descriptor.kind(), kind))?;
        Some(factory(name, descriptor))
    }
}

impl std::fmt::Debug for FactoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}
