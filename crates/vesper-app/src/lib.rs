//! Application framework for the Vesper renderer.
//!
//! This crate provides a trait-based application framework that handles
//! common boilerplate like:
//! - Window creation and management
//! - Device and frame orchestrator initialization
//! - Forwarding resizes to the swap chain
//! - Event loop handling and frame pacing
//!
//! # Example
//!
//! ```no_run
//! use vesper_app::{run_app, AppConfig, AppContext, FrameInfo, VesperApp};
//!
//! struct MyApp;
//!
//! impl VesperApp for MyApp {
//!     fn init(_ctx: &mut AppContext) -> anyhow::Result<Self> {
//!         Ok(MyApp)
//!     }
//!
//!     fn update(&mut self, _ctx: &AppContext, _dt: f32) {}
//!
//!     fn render(&mut self, _ctx: &AppContext, _frame: &FrameInfo) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     run_app::<MyApp>(AppConfig::default())
//! }
//! ```

mod app;
mod context;
mod frame;
mod runner;
mod surface;

pub use app::VesperApp;
pub use context::AppContext;
pub use frame::FrameInfo;
pub use runner::{run_app, AppConfig, FpsSummary, FrameStats};
pub use surface::WindowSurface;

// Re-export commonly used types for convenience
pub use vesper_gpu::{FrameConfig, FrameOrchestrator, GpuContextBuilder};
pub use vesper_render::Camera;
pub use winit::event::WindowEvent;
