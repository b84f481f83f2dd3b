//! Per-frame uniform buffers.

use std::marker::PhantomData;

use crate::device::SharedDevice;
use crate::error::Result;
use crate::memory::{BufferDesc, BufferRegion, GpuBuffer, MemoryLocation};
use ash::vk;
use bytemuck::Pod;
use vesper_core::math::align_up;

/// One persistently mapped uniform buffer per frame slot.
///
/// Slot `i` must only be written while slot `i`'s in-flight fence is
/// signaled, which the frame orchestrator guarantees between `begin_frame`
/// and `end_frame` for the open slot.
pub struct UniformBufferRing<T: Pod> {
    buffers: Vec<GpuBuffer>,
    padded_size: u64,
    device: SharedDevice,
    _marker: PhantomData<T>,
}

impl<T: Pod> UniformBufferRing<T> {
    /// Allocate `frames_in_flight` buffers, each padded to the device's
    /// uniform offset alignment.
    pub fn new(device: SharedDevice, frames_in_flight: usize, name: &str) -> Result<Self> {
        let alignment = device.limits().min_uniform_buffer_offset_alignment.max(1);
        let padded_size = align_up(std::mem::size_of::<T>() as u64, alignment);

        let mut buffers: Vec<GpuBuffer> = Vec::with_capacity(frames_in_flight);
        for slot in 0..frames_in_flight {
            let label = format!("{name}[{slot}]");
            let created = device.create_buffer(&BufferDesc {
                size: padded_size,
                usage: vk::BufferUsageFlags::UNIFORM_BUFFER,
                location: MemoryLocation::CpuToGpu,
                name: &label,
            });
            match created {
                Ok(buffer) => buffers.push(buffer),
                Err(e) => {
                    for mut buffer in buffers {
                        device.destroy_buffer(&mut buffer);
                    }
                    return Err(e);
                }
            }
        }

        Ok(Self {
            buffers,
            padded_size,
            device,
            _marker: PhantomData,
        })
    }

    /// Copy `value` into slot `slot`'s mapped memory.
    pub fn write(&self, slot: usize, value: &T) -> Result<()> {
        self.device
            .write_buffer(self.slot(slot), 0, bytemuck::bytes_of(value))
    }

    /// Make slot `slot`'s host writes visible to the device.
    pub fn flush(&self, slot: usize) -> Result<()> {
        let buffer = self.slot(slot);
        if buffer.host_coherent {
            return Ok(());
        }
        self.device.flush_buffer(buffer, 0, self.padded_size)
    }

    /// Region to bind for slot `slot`.
    pub fn descriptor_region(&self, slot: usize) -> BufferRegion {
        let buffer = self.slot(slot);
        BufferRegion {
            buffer: buffer.buffer,
            offset: 0,
            range: std::mem::size_of::<T>() as u64,
        }
    }

    /// Size of each slot after alignment padding.
    pub fn padded_size(&self) -> u64 {
        self.padded_size
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Whether the ring has no slots.
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    fn slot(&self, slot: usize) -> &GpuBuffer {
        assert!(
            slot < self.buffers.len(),
            "uniform slot {slot} out of range for {} frames in flight",
            self.buffers.len()
        );
        &self.buffers[slot]
    }
}

impl<T: Pod> Drop for UniformBufferRing<T> {
    fn drop(&mut self) {
        for buffer in &mut self.buffers {
            self.device.destroy_buffer(buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceLimits;
    use crate::headless::HeadlessDevice;
    use std::sync::Arc;

    #[repr(C)]
    #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
    struct Block {
        value: [f32; 4],
        pad: [f32; 20],
    }

    fn block(v: f32) -> Block {
        Block {
            value: [v; 4],
            pad: [0.0; 20],
        }
    }

    #[test]
    fn slots_padded_to_alignment() {
        let device = Arc::new(HeadlessDevice::new().with_limits(DeviceLimits {
            min_uniform_buffer_offset_alignment: 64,
            non_coherent_atom_size: 64,
        }));
        let ring = UniformBufferRing::<Block>::new(device.clone(), 3, "globals").unwrap();
        assert_eq!(std::mem::size_of::<Block>(), 96);
        assert_eq!(ring.padded_size(), 128);
        assert_eq!(ring.len(), 3);
        assert_eq!(device.live_buffers(), 3);
        drop(ring);
        assert_eq!(device.live_buffers(), 0);
    }

    #[test]
    fn unflushed_write_not_visible() {
        let device = Arc::new(HeadlessDevice::new());
        let ring = UniformBufferRing::<Block>::new(device.clone(), 2, "globals").unwrap();
        let region = ring.descriptor_region(1);

        ring.write(1, &block(7.0)).unwrap();
        let before = device.read_device_bytes(region.buffer, 0, 16);
        assert_eq!(before, vec![0u8; 16]);

        ring.flush(1).unwrap();
        let after = device.read_device_bytes(region.buffer, 0, 16);
        assert_eq!(after, bytemuck::bytes_of(&[7.0f32; 4]).to_vec());
    }

    #[test]
    fn coherent_memory_needs_no_flush() {
        let device = Arc::new(HeadlessDevice::new().with_coherent_memory(true));
        let ring = UniformBufferRing::<Block>::new(device.clone(), 1, "globals").unwrap();
        ring.write(0, &block(3.0)).unwrap();
        let region = ring.descriptor_region(0);
        assert_eq!(
            device.read_device_bytes(region.buffer, 0, 4),
            3.0f32.to_ne_bytes().to_vec()
        );
        ring.flush(0).unwrap();
        assert_eq!(device.flush_count(), 0);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn slot_out_of_range_panics() {
        let device = Arc::new(HeadlessDevice::new());
        let ring = UniformBufferRing::<Block>::new(device, 2, "globals").unwrap();
        let _ = ring.write(2, &block(1.0));
    }
}
