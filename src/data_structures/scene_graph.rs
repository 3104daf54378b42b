//! Scene graph.
//!
//! Every node keeps a local transform relative to its parent and the world
//! transform derived from it. [`ContainerNode`] only groups children (the
//! spinning car group, the root of an imported glTF scene); [`ModelNode`] also
//! draws a [`model::Model`] and owns the instance buffer the shaders read.

use wgpu::util::DeviceExt;

use crate::{
    data_structures::{
        instance::{Instance, InstanceRaw},
        model,
    },
    render::Instanced,
};

pub trait SceneNode {
    fn get_local_transform(&self) -> &Instance;

    fn get_world_transform(&self) -> &Instance;

    fn set_local_transform(&mut self, instance: Instance);

    fn set_local_transform_with(&mut self, mutation: &mut dyn FnMut(&mut Instance));

    fn get_children(&self) -> &Vec<Box<dyn SceneNode>>;

    fn add_child(&mut self, child: Box<dyn SceneNode>);

    /// Recomputes `world = parent * local` for this node and everything below it.
    fn update_world_transforms(&mut self, parent_world_transform: &Instance);

    fn update_world_transform_all(&mut self) {
        self.update_world_transforms(&Instance::default());
    }

    fn write_to_buffers(&mut self, queue: &wgpu::Queue);

    /// Visits every drawable in the subtree, this node included.
    fn traverse_models(&mut self, visit: &mut dyn FnMut(&mut ModelNode));

    fn get_render(&self) -> Vec<Instanced<'_>>;
}

pub struct ContainerNode {
    pub children: Vec<Box<dyn SceneNode>>,
    pub name: String,
    local: Instance,
    world: Instance,
}

impl ContainerNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            children: vec![],
            name: name.into(),
            local: Instance::default(),
            world: Instance::default(),
        }
    }
}

impl SceneNode for ContainerNode {
    fn get_local_transform(&self) -> &Instance {
        &self.local
    }

    fn get_world_transform(&self) -> &Instance {
        &self.world
    }

    fn set_local_transform(&mut self, instance: Instance) {
        self.local = instance;
    }

    fn set_local_transform_with(&mut self, mutation: &mut dyn FnMut(&mut Instance)) {
        mutation(&mut self.local);
    }

    fn get_children(&self) -> &Vec<Box<dyn SceneNode>> {
        &self.children
    }

    fn add_child(&mut self, child: Box<dyn SceneNode>) {
        self.children.push(child);
    }

    fn update_world_transforms(&mut self, parent_world_transform: &Instance) {
        self.world = parent_world_transform * &self.local;
        for child in self.children.iter_mut() {
            child.update_world_transforms(&self.world);
        }
    }

    fn write_to_buffers(&mut self, queue: &wgpu::Queue) {
        self.children
            .iter_mut()
            .for_each(|child| child.write_to_buffers(queue));
    }

    fn traverse_models(&mut self, visit: &mut dyn FnMut(&mut ModelNode)) {
        for child in self.children.iter_mut() {
            child.traverse_models(visit);
        }
    }

    fn get_render(&self) -> Vec<Instanced<'_>> {
        self.children
            .iter()
            .flat_map(|child| child.get_render())
            .collect()
    }
}

pub struct ModelNode {
    children: Vec<Box<dyn SceneNode>>,
    instance_buffer: wgpu::Buffer,
    local: Instance,
    world: Instance,
    model: model::Model,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
}

impl ModelNode {
    pub fn new(
        device: &wgpu::Device,
        model: model::Model,
        cast_shadow: bool,
        receive_shadow: bool,
    ) -> Self {
        let world = Instance::default();
        let instance_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Instance Buffer"),
            contents: bytemuck::cast_slice(&[world.to_raw(receive_shadow)]),
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        });

        Self {
            children: vec![],
            instance_buffer,
            local: Instance::default(),
            world,
            model,
            cast_shadow,
            receive_shadow,
        }
    }
}

impl SceneNode for ModelNode {
    fn get_local_transform(&self) -> &Instance {
        &self.local
    }

    fn get_world_transform(&self) -> &Instance {
        &self.world
    }

    fn set_local_transform(&mut self, instance: Instance) {
        self.local = instance;
    }

    fn set_local_transform_with(&mut self, mutation: &mut dyn FnMut(&mut Instance)) {
        mutation(&mut self.local);
    }

    fn get_children(&self) -> &Vec<Box<dyn SceneNode>> {
        &self.children
    }

    fn add_child(&mut self, child: Box<dyn SceneNode>) {
        self.children.push(child);
    }

    fn update_world_transforms(&mut self, parent_world_transform: &Instance) {
        self.world = parent_world_transform * &self.local;
        for child in self.children.iter_mut() {
            child.update_world_transforms(&self.world);
        }
    }

    fn write_to_buffers(&mut self, queue: &wgpu::Queue) {
        let raw: [InstanceRaw; 1] = [self.world.to_raw(self.receive_shadow)];
        queue.write_buffer(&self.instance_buffer, 0, bytemuck::cast_slice(&raw));
        self.children
            .iter_mut()
            .for_each(|child| child.write_to_buffers(queue));
    }

    fn traverse_models(&mut self, visit: &mut dyn FnMut(&mut ModelNode)) {
        visit(self);
        for child in self.children.iter_mut() {
            child.traverse_models(visit);
        }
    }

    fn get_render(&self) -> Vec<Instanced<'_>> {
        self.children
            .iter()
            .flat_map(|child| child.get_render())
            .chain([Instanced {
                instance: &self.instance_buffer,
                model: &self.model,
                amount: 1,
                casts_shadow: self.cast_shadow,
            }])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use cgmath::{InnerSpace, Rad, Rotation3, Vector3};

    use super::*;

    #[test]
    fn nested_containers_compose_transforms() {
        let mut group = ContainerNode::new("group");
        group.set_local_transform(Instance {
            rotation: cgmath::Quaternion::from_angle_y(Rad(std::f32::consts::PI)),
            ..Default::default()
        });
        let mut child = ContainerNode::new("car");
        child.set_local_transform(Instance::from(Vector3::new(1.0, -0.4, 0.0)));
        group.add_child(Box::new(child));

        group.update_world_transform_all();
        let world = group.get_children()[0].get_world_transform();
        assert!((world.position - Vector3::new(-1.0, -0.4, 0.0)).magnitude() < 1e-5);
    }

    #[test]
    fn local_mutation_takes_effect_after_update() {
        let mut group = ContainerNode::new("group");
        group.add_child(Box::new(ContainerNode::new("child")));
        group.set_local_transform_with(&mut |local| local.position.y += 2.0);
        assert_eq!(group.get_children()[0].get_world_transform().position.y, 0.0);
        group.update_world_transform_all();
        assert_eq!(group.get_children()[0].get_world_transform().position.y, 2.0);
    }

    #[test]
    fn containers_render_nothing_on_their_own() {
        let mut group = ContainerNode::new("group");
        group.add_child(Box::new(ContainerNode::new("empty")));
        assert!(group.get_render().is_empty());
        let mut visited = 0;
        group.traverse_models(&mut |_| visited += 1);
        assert_eq!(visited, 0);
    }
}
