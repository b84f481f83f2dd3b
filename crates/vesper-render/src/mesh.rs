//! Vertex layout and GPU meshes.

use std::mem::{offset_of, size_of};

use ash::vk;
use glam::{Vec2, Vec3};
use vesper_gpu::{BufferDesc, GpuBuffer, GpuError, MemoryLocation, Result, SharedDevice};

/// Interleaved vertex, matching the inputs of the simple shader.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub fn new(position: Vec3, color: Vec3, normal: Vec3, uv: Vec2) -> Self {
        Self {
            position: position.to_array(),
            color: color.to_array(),
            normal: normal.to_array(),
            uv: uv.to_array(),
        }
    }

    /// Single interleaved binding at index 0.
    pub fn binding_descriptions() -> Vec<vk::VertexInputBindingDescription> {
        vec![vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }]
    }

    /// Locations 0..=3: position, color, normal, uv.
    pub fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
        let attribute = |location, format, offset: usize| vk::VertexInputAttributeDescription {
            location,
            binding: 0,
            format,
            offset: offset as u32,
        };
        vec![
            attribute(0, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, position)),
            attribute(1, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, color)),
            attribute(2, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, normal)),
            attribute(3, vk::Format::R32G32_SFLOAT, offset_of!(Self, uv)),
        ]
    }
}

/// CPU-side mesh geometry.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    /// Triangle list indices. Empty for non-indexed meshes.
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Axis-aligned cube centered on the origin with edge length 1.
    ///
    /// Each face has its own four vertices so normals stay flat, and its own color.
    pub fn cube() -> Self {
        // (normal, tangent u, tangent v, color)
        let faces = [
            (Vec3::X, Vec3::NEG_Z, Vec3::Y, Vec3::new(0.8, 0.8, 0.1)),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y, Vec3::new(0.9, 0.9, 0.9)),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z, Vec3::new(0.8, 0.1, 0.1)),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z, Vec3::new(0.9, 0.6, 0.1)),
            (Vec3::Z, Vec3::X, Vec3::Y, Vec3::new(0.1, 0.1, 0.8)),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y, Vec3::new(0.1, 0.8, 0.1)),
        ];

        let mut data = Self::default();
        for (normal, u, v, color) in faces {
            let center = normal * 0.5;
            let base = data.vertices.len() as u32;
            for (su, sv) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
                data.vertices.push(Vertex::new(
                    center + u * su + v * sv,
                    color,
                    normal,
                    Vec2::new(su + 0.5, sv + 0.5),
                ));
            }
            data.indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        data
    }

    /// Square in the XZ plane centered on the origin, facing -Y (up in Vulkan clip space).
    pub fn plane(size: f32, color: Vec3) -> Self {
        let h = size * 0.5;
        let corners = [(-h, -h), (h, -h), (h, h), (-h, h)];
        let vertices = corners
            .iter()
            .map(|&(x, z)| {
                Vertex::new(
                    Vec3::new(x, 0.0, z),
                    color,
                    Vec3::NEG_Y,
                    Vec2::new(x / size + 0.5, z / size + 0.5),
                )
            })
            .collect();
        Self {
            vertices,
            indices: vec![0, 1, 2, 0, 2, 3],
        }
    }

    /// Check that the geometry can be drawn as a triangle list.
    pub fn validate(&self) -> Result<()> {
        if self.vertices.len() < 3 {
            return Err(GpuError::InvalidConfig(format!(
                "Mesh needs at least 3 vertices, got {}",
                self.vertices.len()
            )));
        }
        if !self.indices.is_empty() && self.indices.len() < 3 {
            return Err(GpuError::InvalidConfig(format!(
                "Indexed mesh needs at least 3 indices, got {}",
                self.indices.len()
            )));
        }
        let vertex_count = self.vertices.len() as u32;
        if let Some(index) = self.indices.iter().find(|&&i| i >= vertex_count) {
            return Err(GpuError::InvalidConfig(format!(
                "Index {index} out of range for {vertex_count} vertices"
            )));
        }
        Ok(())
    }
}

/// Mesh uploaded to GPU buffers.
///
/// Buffers are host-visible and written once at creation. Dropping a mesh
/// while a frame that draws it is in flight is a use-after-free; park it with
/// `FrameOrchestrator::defer_destroy` instead.
pub struct Mesh {
    vertex_buffer: GpuBuffer,
    index_buffer: Option<GpuBuffer>,
    vertex_count: u32,
    index_count: u32,
    device: SharedDevice,
}

impl Mesh {
    /// Validate `data` and upload it.
    pub fn new(device: SharedDevice, data: &MeshData, name: &str) -> Result<Self> {
        data.validate()?;

        let vertex_buffer = upload(
            &device,
            bytemuck::cast_slice(&data.vertices),
            vk::BufferUsageFlags::VERTEX_BUFFER,
            &format!("{name}.vertices"),
        )?;

        let index_buffer = if data.indices.is_empty() {
            None
        } else {
            match upload(
                &device,
                bytemuck::cast_slice(&data.indices),
                vk::BufferUsageFlags::INDEX_BUFFER,
                &format!("{name}.indices"),
            ) {
                Ok(buffer) => Some(buffer),
                Err(e) => {
                    let mut vertex_buffer = vertex_buffer;
                    device.destroy_buffer(&mut vertex_buffer);
                    return Err(e);
                }
            }
        };

        tracing::debug!(
            name,
            vertices = data.vertices.len(),
            indices = data.indices.len(),
            "Mesh uploaded"
        );

        Ok(Self {
            vertex_buffer,
            index_buffer,
            vertex_count: data.vertices.len() as u32,
            index_count: data.indices.len() as u32,
            device,
        })
    }

    /// Bind the vertex buffer and, if present, the index buffer.
    pub fn bind(&self, cmd: vk::CommandBuffer) {
        self.device
            .cmd_bind_vertex_buffer(cmd, self.vertex_buffer.buffer);
        if let Some(index_buffer) = &self.index_buffer {
            self.device.cmd_bind_index_buffer(cmd, index_buffer.buffer);
        }
    }

    /// Draw the whole mesh. Must follow [`Mesh::bind`].
    pub fn draw(&self, cmd: vk::CommandBuffer) {
        if self.has_index_buffer() {
            self.device.cmd_draw_indexed(cmd, self.index_count);
        } else {
            self.device.cmd_draw(cmd, self.vertex_count);
        }
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn has_index_buffer(&self) -> bool {
        self.index_buffer.is_some()
    }

    pub fn vertex_buffer(&self) -> vk::Buffer {
        self.vertex_buffer.buffer
    }
}

impl Drop for Mesh {
    fn drop(&mut self) {
        if let Some(index_buffer) = &mut self.index_buffer {
            self.device.destroy_buffer(index_buffer);
        }
        self.device.destroy_buffer(&mut self.vertex_buffer);
    }
}

/// Create a host-visible buffer holding `bytes`, flushed for device reads.
fn upload(
    device: &SharedDevice,
    bytes: &[u8],
    usage: vk::BufferUsageFlags,
    name: &str,
) -> Result<GpuBuffer> {
    let mut buffer = device.create_buffer(&BufferDesc {
        size: bytes.len() as u64,
        usage,
        location: MemoryLocation::CpuToGpu,
        name,
    })?;
    let written = device.write_buffer(&buffer, 0, bytes).and_then(|()| {
        if buffer.host_coherent {
            Ok(())
        } else {
            device.flush_buffer(&buffer, 0, buffer.size)
        }
    });
    if let Err(e) = written {
        device.destroy_buffer(&mut buffer);
        return Err(e);
    }
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::sync::Arc;
    use vesper_gpu::headless::{HeadlessDevice, RecordedCommand};
    use vesper_gpu::GpuDevice;

    #[test]
    fn vertex_layout() {
        assert_eq!(size_of::<Vertex>(), 44);
        let attributes = Vertex::attribute_descriptions();
        let offsets: Vec<u32> = attributes.iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 12, 24, 36]);
        assert_eq!(Vertex::binding_descriptions()[0].stride, 44);
    }

    #[test]
    fn cube_normals_point_outward() {
        let cube = MeshData::cube();
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.indices.len(), 36);
        for vertex in &cube.vertices {
            let normal = Vec3::from(vertex.normal);
            let position = Vec3::from(vertex.position);
            assert_relative_eq!(normal.length(), 1.0);
            assert_relative_eq!(position.dot(normal), 0.5);
            assert!(position.abs().max_element() <= 0.5 + f32::EPSILON);
        }
        cube.validate().unwrap();
    }

    #[test]
    fn plane_is_flat() {
        let plane = MeshData::plane(4.0, Vec3::ONE);
        assert!(plane.vertices.iter().all(|v| v.position[1] == 0.0));
        assert_eq!(plane.vertices[2].position, [2.0, 0.0, 2.0]);
        plane.validate().unwrap();
    }

    #[test]
    fn invalid_geometry_rejected() {
        let two = MeshData {
            vertices: vec![Vertex::default(); 2],
            indices: Vec::new(),
        };
        assert!(matches!(two.validate(), Err(GpuError::InvalidConfig(_))));

        let mut out_of_range = MeshData::plane(1.0, Vec3::ONE);
        out_of_range.indices[4] = 9;
        assert!(matches!(out_of_range.validate(), Err(GpuError::InvalidConfig(_))));
    }

    #[test]
    fn upload_reaches_device_memory() {
        let device = Arc::new(HeadlessDevice::new());
        let data = MeshData::cube();
        let mesh = Mesh::new(device.clone(), &data, "cube").unwrap();
        let expected: &[u8] = bytemuck::cast_slice(&data.vertices);
        let uploaded = device.read_device_bytes(mesh.vertex_buffer(), 0, expected.len() as u64);
        assert_eq!(uploaded, expected);
        assert_eq!(device.live_buffers(), 2);
        drop(mesh);
        assert_eq!(device.live_buffers(), 0);
    }

    #[test]
    fn indexed_and_plain_draws() {
        let device = Arc::new(HeadlessDevice::new());
        let pool = device.create_command_pool().unwrap();
        let cmd = device.allocate_command_buffers(pool, 1).unwrap()[0];

        let indexed = Mesh::new(device.clone(), &MeshData::plane(1.0, Vec3::ONE), "plane").unwrap();
        let mut triangle = MeshData::plane(1.0, Vec3::ONE);
        triangle.vertices.truncate(3);
        triangle.indices.clear();
        let plain = Mesh::new(device.clone(), &triangle, "triangle").unwrap();

        device.begin_command_buffer(cmd).unwrap();
        indexed.bind(cmd);
        indexed.draw(cmd);
        plain.bind(cmd);
        plain.draw(cmd);

        let commands = device.recorded_commands(cmd);
        assert!(commands.contains(&RecordedCommand::DrawIndexed { index_count: 6 }));
        assert!(commands.contains(&RecordedCommand::Draw { vertex_count: 3 }));
        assert_eq!(
            commands
                .iter()
                .filter(|c| matches!(c, RecordedCommand::BindIndexBuffer(_)))
                .count(),
            1
        );
        device.destroy_command_pool(pool);
    }
}
