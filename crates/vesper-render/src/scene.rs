//! Flat registry of renderable objects.

use std::collections::BTreeMap;
use std::sync::Arc;

use glam::Vec3;
use vesper_core::{IdAllocator, ObjectId, Result, Transform};

use crate::mesh::Mesh;

/// A renderable object.
pub struct GameObject {
    id: ObjectId,
    /// Shared mesh; objects without one are skipped when rendering.
    pub mesh: Option<Arc<Mesh>>,
    /// Tint multiplied into the mesh's vertex colors. White by default.
    pub color: Vec3,
    pub transform: Transform,
}

impl GameObject {
    pub fn id(&self) -> ObjectId {
        self.id
    }
}

/// Objects keyed by id. Iteration is in ascending id order, which is also
/// creation order.
#[derive(Default)]
pub struct Scene {
    ids: IdAllocator,
    objects: BTreeMap<ObjectId, GameObject>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new object with an identity transform and return it for setup.
    pub fn spawn(&mut self) -> Result<&mut GameObject> {
        let id = self.ids.allocate()?;
        let object = self.objects.entry(id).or_insert(GameObject {
            id,
            mesh: None,
            color: Vec3::ONE,
            transform: Transform::default(),
        });
        Ok(object)
    }

    /// Register an object with the given mesh and transform.
    pub fn spawn_with(&mut self, mesh: Arc<Mesh>, transform: Transform) -> Result<ObjectId> {
        let object = self.spawn()?;
        object.mesh = Some(mesh);
        object.transform = transform;
        Ok(object.id)
    }

    pub fn get(&self, id: ObjectId) -> Option<&GameObject> {
        self.objects.get(&id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut GameObject> {
        self.objects.get_mut(&id)
    }

    /// Remove an object. Its mesh is released once the last reference drops.
    pub fn remove(&mut self, id: ObjectId) -> Option<GameObject> {
        self.objects.remove(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &GameObject> {
        self.objects.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut GameObject> {
        self.objects.values_mut()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iteration_follows_creation_order() {
        let mut scene = Scene::new();
        let ids: Vec<ObjectId> = (0..5).map(|_| scene.spawn().unwrap().id()).collect();
        scene.remove(ids[2]);
        let seen: Vec<ObjectId> = scene.iter().map(GameObject::id).collect();
        assert_eq!(seen, vec![ids[0], ids[1], ids[3], ids[4]]);
    }

    #[test]
    fn removed_ids_are_not_reused() {
        let mut scene = Scene::new();
        let first = scene.spawn().unwrap().id();
        scene.remove(first);
        let second = scene.spawn().unwrap().id();
        assert_ne!(first, second);
        assert!(scene.get(first).is_none());
        assert_eq!(scene.len(), 1);
    }

    #[test]
    fn scenes_allocate_independently() {
        let mut a = Scene::new();
        let mut b = Scene::new();
        a.spawn().unwrap();
        a.spawn().unwrap();
        assert_eq!(b.spawn().unwrap().id(), ObjectId(0));
    }

    #[test]
    fn objects_can_be_edited_in_place() {
        let mut scene = Scene::new();
        let id = scene.spawn().unwrap().id();
        scene.get_mut(id).unwrap().transform.translation = Vec3::new(1.0, 2.0, 3.0);
        assert_eq!(scene.get(id).unwrap().color, Vec3::ONE);
        for object in scene.iter_mut() {
            object.color = Vec3::new(0.2, 0.4, 0.6);
        }
        let object = scene.get(id).unwrap();
        assert_eq!(object.transform.translation, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(object.color, Vec3::new(0.2, 0.4, 0.6));
    }
}
