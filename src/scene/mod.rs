//! Per-frame scene input
//!
//! The scene collaborator refreshes a [`FrameScene`] once per frame before the
//! graph executes: the active cameras, lights and drawable (mesh, material)
//! pairs, plus the drawables grouped by material for the draw scheduler.

mod camera;
mod light;

pub use camera::*;
pub use light::*;

use std::collections::HashMap;

use glam::Mat4;

/// Identifier of a material (the draw scheduler's state key).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub u32);

/// Identifier of a mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub u32);

/// A renderable (mesh, material) pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Drawable {
    pub mesh: MeshId,
    pub material: MaterialId,
    pub transform: Mat4,
}

impl Drawable {
    pub fn new(mesh: MeshId, material: MaterialId) -> Self {
        Self {
            mesh,
            material,
            transform: Mat4::IDENTITY,
        }
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }
}

/// One draw in a material group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawItem {
    pub mesh: MeshId,
    /// Index of the drawable in [`FrameScene::drawables`], used as instance id
    pub instance: u32,
}

/// All draws sharing one material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialGroup {
    pub material: MaterialId,
    pub items: Vec<DrawItem>,
}

impl MaterialGroup {
    pub fn new(material: MaterialId, items: Vec<DrawItem>) -> Self {
        Self { material, items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Group drawables by material.
///
/// Groups appear in the order their material is first seen, items keep
/// drawable order, so the grouping is stable for identical input.
pub fn group_by_material(drawables: &[Drawable]) -> Vec<MaterialGroup> {
    let mut groups: Vec<MaterialGroup> = Vec::new();
    let mut index_of: HashMap<MaterialId, usize> = HashMap::new();

    for (i, drawable) in drawables.iter().enumerate() {
        let slot = *index_of.entry(drawable.material).or_insert_with(|| {
            groups.push(MaterialGroup::new(drawable.material, Vec::new()));
            groups.len() - 1
        });
        groups[slot].items.push(DrawItem {
            mesh: drawable.mesh,
            instance: i as u32,
        });
    }

    groups
}

/// The scene snapshot consumed by the graph for one frame.
#[derive(Debug, Clone, Default)]
pub struct FrameScene {
    cameras: Vec<Camera>,
    lights: Vec<Light>,
    drawables: Vec<Drawable>,
    groups: Vec<MaterialGroup>,
}

impl FrameScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the frame contents and rebuild the material grouping.
    pub fn refresh(&mut self, cameras: Vec<Camera>, lights: Vec<Light>, drawables: Vec<Drawable>) {
        self.groups = group_by_material(&drawables);
        self.cameras = cameras;
        self.lights = lights;
        self.drawables = drawables;
    }

    pub fn cameras(&self) -> &[Camera] {
        &self.cameras
    }

    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    pub fn drawables(&self) -> &[Drawable] {
        &self.drawables
    }

    pub fn material_groups(&self) -> &[MaterialGroup] {
        &self.groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_by_material_is_stable() {
        let drawables = vec![
            Drawable::new(MeshId(0), MaterialId(7)),
            Drawable::new(MeshId(1), MaterialId(3)),
            Drawable::new(MeshId(2), MaterialId(7)),
            Drawable::new(MeshId(3), MaterialId(3)),
            Drawable::new(MeshId(4), MaterialId(9)),
        ];

        let groups = group_by_material(&drawables);
        let materials: Vec<_> = groups.iter().map(|g| g.material).collect();
        assert_eq!(materials, vec![MaterialId(7), MaterialId(3), MaterialId(9)]);

        let instances: Vec<_> = groups[0].items.iter().map(|i| i.instance).collect();
        assert_eq!(instances, vec![0, 2]);
        assert_eq!(groups[1].len(), 2);
        assert_eq!(groups[2].items[0].mesh, MeshId(4));
    }

    #[test]
    fn test_refresh_rebuilds_groups() {
        let mut scene = FrameScene::new();
        scene.refresh(
            vec![Camera::default()],
            Vec::new(),
            vec![Drawable::new(MeshId(0), MaterialId(1))],
        );
        assert_eq!(scene.material_groups().len(), 1);

        scene.refresh(vec![Camera::default()], Vec::new(), Vec::new());
        assert!(scene.material_groups().is_empty());
        assert_eq!(scene.cameras().len(), 1);
    }
}
