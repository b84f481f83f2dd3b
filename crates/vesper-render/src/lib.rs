//! Scene, camera and render systems for the Vesper renderer.
//!
//! This crate provides:
//! - Camera projection and view management
//! - A flat scene registry of game objects
//! - Meshes with an interleaved vertex layout
//! - The global uniform block and its per-frame descriptor resources
//! - The render system interface and a simple lit render system

pub mod camera;
pub mod frame;
pub mod global;
pub mod mesh;
pub mod render_system;
pub mod scene;
pub mod uniforms;

pub use camera::Camera;
pub use frame::FrameContext;
pub use global::{GlobalResources, GLOBAL_SET};
pub use mesh::{Mesh, MeshData, Vertex};
pub use render_system::{RenderSystem, SimplePushConstants, SimpleRenderSystem};
pub use scene::{GameObject, Scene};
pub use uniforms::{GlobalUniforms, PointLight};
