//! Vesper Demo Viewer
//!
//! Renders a few lit meshes with an orbiting camera.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p vesper-viewer -- [OPTIONS]
//! ```
//!
//! ## Options
//!
//! - `--frames-in-flight <N>`: Frames recorded ahead of the GPU, 1 to 4 (default: 2)
//! - `--vsync`: Present with FIFO
//! - `--no-validation`: Disable Vulkan validation layers
//! - `-h, --help`: Print help message
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod app;
mod options;

use vesper_app::{run_app, AppConfig};

use crate::app::Viewer;
use crate::options::ViewerOptions;

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

fn main() -> anyhow::Result<()> {
    let options = match ViewerOptions::parse(std::env::args().skip(1)) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("error: {e:#}\n");
            print_help();
            std::process::exit(2);
        }
    };
    if options.help {
        print_help();
        return Ok(());
    }

    run_app::<Viewer>(options.apply(AppConfig::new("Vesper Viewer").with_size(WIDTH, HEIGHT)))
}

fn print_help() {
    eprintln!(
        "Vesper Demo Viewer

USAGE:
    cargo run -p vesper-viewer -- [OPTIONS]

OPTIONS:
    --frames-in-flight <N>  Frames recorded ahead of the GPU, 1 to 4 (default: 2)
    --vsync                 Present with FIFO (default: off)
    --no-validation         Disable Vulkan validation layers
    -h, --help              Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log level (e.g., info, debug, trace)"
    );
}
