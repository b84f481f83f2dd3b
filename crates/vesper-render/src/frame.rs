//! Per-frame context for rendering.

use ash::vk;
use vesper_gpu::FrameOrchestrator;

use crate::camera::Camera;
use crate::global::GlobalResources;
use crate::scene::Scene;

/// Everything a render system needs to record one frame.
///
/// Only valid between `begin_frame` and `end_frame` of the orchestrator it
/// was opened from.
pub struct FrameContext<'a> {
    /// Frame slot of the open frame.
    pub frame_index: usize,
    /// Seconds since the previous frame.
    pub frame_time: f32,
    pub command_buffer: vk::CommandBuffer,
    /// Render pass the frame records into.
    pub render_pass: vk::RenderPass,
    pub camera: &'a Camera,
    /// Global set for `frame_index`.
    pub global_descriptor_set: vk::DescriptorSet,
    pub scene: &'a Scene,
}

impl<'a> FrameContext<'a> {
    /// Capture the open frame of `orchestrator`.
    ///
    /// # Panics
    /// If no frame is open.
    pub fn open(
        orchestrator: &FrameOrchestrator,
        globals: &GlobalResources,
        camera: &'a Camera,
        scene: &'a Scene,
        frame_time: f32,
    ) -> Self {
        let frame_index = orchestrator.frame_index();
        Self {
            frame_index,
            frame_time,
            command_buffer: orchestrator.current_command_buffer(),
            render_pass: orchestrator.render_pass(),
            camera,
            global_descriptor_set: globals.descriptor_set(frame_index),
            scene,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vesper_gpu::headless::{HeadlessDevice, HeadlessSurface};
    use vesper_gpu::FrameConfig;

    #[test]
    fn context_tracks_frame_slot() {
        let device = Arc::new(HeadlessDevice::new());
        let surface = Arc::new(HeadlessSurface::new(640, 480));
        let mut orchestrator =
            FrameOrchestrator::new(device.clone(), surface, FrameConfig::default()).unwrap();
        let globals = GlobalResources::new(device, orchestrator.frames_in_flight()).unwrap();
        let camera = Camera::new();
        let scene = Scene::new();

        for expected in [0usize, 1, 0] {
            let cmd = orchestrator.begin_frame().unwrap().unwrap();
            let frame = FrameContext::open(&orchestrator, &globals, &camera, &scene, 0.016);
            assert_eq!(frame.frame_index, expected);
            assert_eq!(frame.command_buffer, cmd);
            assert_eq!(frame.global_descriptor_set, globals.descriptor_set(expected));
            assert_eq!(frame.render_pass, orchestrator.render_pass());
            orchestrator.begin_render_pass(cmd);
            orchestrator.end_render_pass(cmd);
            orchestrator.end_frame().unwrap();
        }
    }

    #[test]
    #[should_panic(expected = "no frame open")]
    fn context_requires_open_frame() {
        let device = Arc::new(HeadlessDevice::new());
        let surface = Arc::new(HeadlessSurface::new(640, 480));
        let orchestrator =
            FrameOrchestrator::new(device.clone(), surface, FrameConfig::default()).unwrap();
        let globals = GlobalResources::new(device, 2).unwrap();
        let camera = Camera::new();
        let scene = Scene::new();
        let _ = FrameContext::open(&orchestrator, &globals, &camera, &scene, 0.0);
    }
}
