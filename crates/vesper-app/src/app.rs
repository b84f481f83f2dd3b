//! `VesperApp` trait definition.

use crate::context::AppContext;
use crate::frame::FrameInfo;
use winit::event::WindowEvent;

/// Trait for Vesper applications.
///
/// The framework owns the window, the device and the frame orchestrator. It
/// acquires an image, opens the swap chain render pass, calls
/// [`VesperApp::render`], then closes the pass, submits and presents.
pub trait VesperApp: Sized {
    /// Initialize the application.
    ///
    /// Called once after the window, device and frame orchestrator exist.
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self>;

    /// Update application state.
    ///
    /// Called every frame before rendering, including frames that end up
    /// skipped because no image could be acquired.
    ///
    /// # Arguments
    /// * `ctx` - Application context with device and window access
    /// * `dt` - Delta time in seconds since last frame
    fn update(&mut self, ctx: &AppContext, dt: f32);

    /// Record draws for the open frame.
    ///
    /// The swap chain render pass is already open on `frame.command_buffer`
    /// with viewport and scissor set. Per-frame uniforms for
    /// `frame.frame_index` may be written here.
    fn render(&mut self, ctx: &AppContext, frame: &FrameInfo) -> anyhow::Result<()>;

    /// Handle window resize.
    ///
    /// The swap chain is rebuilt by the frame orchestrator on the next frame;
    /// this is for size-dependent application state.
    ///
    /// Default implementation does nothing.
    #[allow(unused_variables)]
    fn on_resize(&mut self, ctx: &mut AppContext, width: u32, height: u32) -> anyhow::Result<()> {
        Ok(())
    }

    /// Handle window events.
    ///
    /// Return `true` if the event was handled and should not be processed further.
    #[allow(unused_variables)]
    fn on_event(&mut self, event: &WindowEvent) -> bool {
        false
    }

    /// Cleanup resources before shutdown.
    ///
    /// Called with the device idle, so GPU resources can be released directly.
    #[allow(unused_variables)]
    fn cleanup(&mut self, ctx: &mut AppContext) {}
}
