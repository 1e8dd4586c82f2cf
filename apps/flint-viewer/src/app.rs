//! Spinning quad application.

use std::time::Instant;

use flint_app::{AppConfig, FrameInfo, FrameUniforms, MeshData, RenderApp, RenderScene, TextureData};
use flint_core::math::spinning_quad;

const TEXTURE_SIZE: u32 = 256;
const CHECKER_CELL: u32 = 32;
const LIGHT: [u8; 4] = [235, 235, 235, 255];
const DARK: [u8; 4] = [40, 90, 160, 255];

pub struct QuadViewer {
    start: Instant,
    frames: u64,
}

impl RenderApp for QuadViewer {
    fn init(config: &AppConfig) -> anyhow::Result<Self> {
        tracing::info!(
            width = config.width,
            height = config.height,
            frames_in_flight = config.frames_in_flight,
            "Starting quad viewer"
        );
        Ok(Self {
            start: Instant::now(),
            frames: 0,
        })
    }

    fn scene(&self) -> RenderScene {
        RenderScene {
            mesh: MeshData::quad(),
            texture: Some(TextureData::checkerboard(
                TEXTURE_SIZE,
                CHECKER_CELL,
                LIGHT,
                DARK,
            )),
        }
    }

    fn update(&mut self, _dt: f32) {
        self.frames += 1;
    }

    // Spin follows wall-clock time since startup
    fn frame_uniforms(&self, frame: &FrameInfo) -> FrameUniforms {
        spinning_quad(
            self.start.elapsed().as_secs_f32(),
            frame.extent.width,
            frame.extent.height,
        )
    }

    fn on_resize(&mut self, width: u32, height: u32) {
        tracing::debug!(width, height, "Viewer resized");
    }

    fn cleanup(&mut self) {
        tracing::info!(updates = self.frames, "Quad viewer shutting down");
    }
}
