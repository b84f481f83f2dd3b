//! Per-frame global descriptor resources.

use ash::vk;
use vesper_gpu::{
    DescriptorPool, DescriptorPoolConfig, DescriptorSetLayout, DescriptorSetLayoutConfig,
    DescriptorWriter, Result, SharedDevice, UniformBufferRing,
};

use crate::uniforms::GlobalUniforms;

/// Set index the global uniforms are bound at.
pub const GLOBAL_SET: u32 = 0;

/// Uniform ring, layout, pool and one descriptor set per frame slot.
///
/// Slot `i`'s set always points at slot `i`'s uniform buffer, so updating the
/// open frame's slot never touches data an in-flight frame reads.
pub struct GlobalResources {
    sets: Vec<vk::DescriptorSet>,
    pool: DescriptorPool,
    layout: DescriptorSetLayout,
    ring: UniformBufferRing<GlobalUniforms>,
}

impl GlobalResources {
    pub fn new(device: SharedDevice, frames_in_flight: usize) -> Result<Self> {
        let ring = UniformBufferRing::new(device.clone(), frames_in_flight, "global_uniforms")?;
        let layout = DescriptorSetLayout::new(
            device.clone(),
            &DescriptorSetLayoutConfig::new().uniform_buffer(0, vk::ShaderStageFlags::ALL_GRAPHICS),
        )?;
        let mut pool = DescriptorPool::new(
            device,
            &DescriptorPoolConfig::for_layout(&layout, frames_in_flight as u32),
        )?;
        let sets = (0..frames_in_flight)
            .map(|slot| {
                DescriptorWriter::new(&layout)
                    .buffer(0, ring.descriptor_region(slot))
                    .build(&mut pool)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            sets,
            pool,
            layout,
            ring,
        })
    }

    /// Write and flush slot `slot`'s uniforms.
    ///
    /// Only call for the open frame's slot.
    pub fn update(&self, slot: usize, uniforms: &GlobalUniforms) -> Result<()> {
        self.ring.write(slot, uniforms)?;
        self.ring.flush(slot)
    }

    /// Descriptor set for slot `slot`.
    ///
    /// # Panics
    /// If `slot` is not below the frame count the resources were created for.
    pub fn descriptor_set(&self, slot: usize) -> vk::DescriptorSet {
        self.sets[slot]
    }

    pub fn layout(&self) -> &DescriptorSetLayout {
        &self.layout
    }

    pub fn frames_in_flight(&self) -> usize {
        self.sets.len()
    }

    /// Pool the sets were allocated from.
    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vesper_gpu::headless::HeadlessDevice;

    #[test]
    fn one_set_per_slot_pointing_at_its_buffer() {
        for frames_in_flight in [2usize, 3] {
            let device = Arc::new(HeadlessDevice::new());
            let globals = GlobalResources::new(device.clone(), frames_in_flight).unwrap();
            assert_eq!(globals.frames_in_flight(), frames_in_flight);
            assert_eq!(globals.pool().remaining_sets(), 0);

            for slot in 0..frames_in_flight {
                let uniforms = GlobalUniforms::default().with_ambient(glam::Vec3::ONE, slot as f32);
                globals.update(slot, &uniforms).unwrap();
            }
            for slot in 0..frames_in_flight {
                let bytes = device
                    .read_descriptor_bytes(globals.descriptor_set(slot), 0)
                    .unwrap();
                let read: GlobalUniforms = bytemuck::pod_read_unaligned(&bytes[..112]);
                assert_eq!(read.ambient_color[3], slot as f32);
            }
            assert!(device.validation_errors().is_empty());
        }
    }

    #[test]
    fn drop_releases_everything() {
        let device = Arc::new(HeadlessDevice::new());
        drop(GlobalResources::new(device.clone(), 2).unwrap());
        assert_eq!(device.live_buffers(), 0);
        assert_eq!(device.live_descriptor_pools(), 0);
    }
}
