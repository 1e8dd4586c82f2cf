//! Flint demo viewer
//!
//! Draws a textured quad spinning about the z axis, with four frames in
//! flight. Press Escape or close the window to exit.
//!
//! ## Usage
//!
//! ```bash
//! # Compile the shaders first, see shaders/README.md
//! cargo run -p flint-viewer
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod app;

use flint_app::{run_app, AppConfig};
use flint_core::constants::{WINDOW_HEIGHT, WINDOW_WIDTH};

use crate::app::QuadViewer;

fn main() -> anyhow::Result<()> {
    run_app::<QuadViewer>(AppConfig::new("Flint - Spinning Quad").with_size(WINDOW_WIDTH, WINDOW_HEIGHT))
}
