//! Viewer application.

use std::f32::consts::{FRAC_PI_4, TAU};
use std::sync::Arc;

use glam::Vec3;
use vesper_app::{AppContext, Camera, FrameInfo, VesperApp};
use vesper_core::{ObjectId, Transform};
use vesper_render::{
    FrameContext, GlobalResources, GlobalUniforms, Mesh, MeshData, PointLight, RenderSystem,
    Scene, SimpleRenderSystem,
};

/// Seconds per camera orbit.
const ORBIT_PERIOD: f32 = 20.0;
const ORBIT_RADIUS: f32 = 3.0;
/// Camera height above the floor. Y points down.
const ORBIT_HEIGHT: f32 = -1.2;
/// Radians per second.
const SPIN_SPEED: f32 = 0.8;

pub struct Viewer {
    system: SimpleRenderSystem,
    globals: GlobalResources,
    scene: Scene,
    camera: Camera,
    spinning: Vec<ObjectId>,
    elapsed: f32,
}

impl VesperApp for Viewer {
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
        let globals = GlobalResources::new(ctx.device.clone(), ctx.frames_in_flight())?;
        let system = SimpleRenderSystem::new(
            ctx.device.clone(),
            ctx.frames.render_pass(),
            globals.layout(),
            vesper_shaders::simple_vertex_shader(),
            vesper_shaders::simple_fragment_shader(),
        )?;

        let cube = Arc::new(Mesh::new(ctx.device.clone(), &MeshData::cube(), "cube")?);
        let floor = Arc::new(Mesh::new(
            ctx.device.clone(),
            &MeshData::plane(3.0, Vec3::splat(0.6)),
            "floor",
        )?);

        let mut scene = Scene::new();
        let small = scene.spawn_with(
            cube.clone(),
            Transform::from_translation(Vec3::new(-0.6, 0.25, 0.0)).with_scale(Vec3::splat(0.5)),
        )?;
        let tall = scene.spawn_with(
            cube,
            Transform::from_translation(Vec3::new(0.6, 0.0, 0.3))
                .with_scale(Vec3::new(0.5, 1.0, 0.5)),
        )?;
        scene.spawn_with(floor, Transform::from_translation(Vec3::new(0.0, 0.5, 0.0)))?;
        if let Some(object) = scene.get_mut(tall) {
            object.color = Vec3::new(1.0, 0.6, 0.3);
        }

        tracing::info!(
            objects = scene.len(),
            frames_in_flight = ctx.frames_in_flight(),
            "Viewer initialized"
        );

        Ok(Self {
            system,
            globals,
            scene,
            camera: Camera::new(),
            spinning: vec![small, tall],
            elapsed: 0.0,
        })
    }

    fn update(&mut self, ctx: &AppContext, dt: f32) {
        self.elapsed += dt;

        let angle = self.elapsed / ORBIT_PERIOD * TAU;
        let eye = Vec3::new(
            ORBIT_RADIUS * angle.sin(),
            ORBIT_HEIGHT,
            -ORBIT_RADIUS * angle.cos(),
        );
        self.camera.set_view_target(eye, Vec3::ZERO, Vec3::NEG_Y);
        self.camera
            .set_perspective_projection(FRAC_PI_4, ctx.aspect_ratio(), 0.1, 100.0);

        for &id in &self.spinning {
            if let Some(object) = self.scene.get_mut(id) {
                object.transform.rotation.y = (object.transform.rotation.y + SPIN_SPEED * dt) % TAU;
            }
        }
    }

    fn render(&mut self, ctx: &AppContext, frame: &FrameInfo) -> anyhow::Result<()> {
        let uniforms = GlobalUniforms::new(self.camera.projection_view()).with_light(&PointLight {
            position: Vec3::new(-1.0, -2.0, -1.0),
            color: Vec3::ONE,
            intensity: 2.0,
        });
        self.globals.update(frame.frame_index, &uniforms)?;

        let context =
            FrameContext::open(&ctx.frames, &self.globals, &self.camera, &self.scene, frame.dt);
        self.system.render(&context)?;
        Ok(())
    }

    fn cleanup(&mut self, ctx: &mut AppContext) {
        tracing::info!(frames = ctx.frame_count(), "Viewer shutting down");
    }
}
