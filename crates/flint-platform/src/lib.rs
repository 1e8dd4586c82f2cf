//! Platform abstraction for the Flint renderer.
//!
//! Provides window creation via winit and the narrow window interface the
//! renderer needs: raw handles for the surface and the drawable size.

use flint_core::constants::{WINDOW_HEIGHT, WINDOW_WIDTH};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::Arc;
use thiserror::Error;
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window, WindowAttributes};

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Window creation failed: {0}")]
    WindowCreation(String),
    #[error("Event loop error: {0}")]
    EventLoop(String),
}

impl From<winit::error::EventLoopError> for PlatformError {
    fn from(e: winit::error::EventLoopError) -> Self {
        Self::EventLoop(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PlatformError>;

/// A window the renderer can present to.
pub trait SurfaceWindow: HasDisplayHandle + HasWindowHandle {
    /// Drawable size in physical pixels.
    fn framebuffer_size(&self) -> (u32, u32);

    /// Whether the window currently has a non-empty drawable area.
    fn is_drawable(&self) -> bool {
        let (width, height) = self.framebuffer_size();
        width > 0 && height > 0
    }
}

impl SurfaceWindow for Window {
    fn framebuffer_size(&self) -> (u32, u32) {
        let size = self.inner_size();
        (size.width, size.height)
    }
}

/// Platform configuration.
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            title: flint_core::constants::ENGINE_NAME.to_string(),
            width: WINDOW_WIDTH,
            height: WINDOW_HEIGHT,
            resizable: true,
        }
    }
}

impl PlatformConfig {
    /// Window attributes for winit.
    pub fn window_attributes(&self) -> WindowAttributes {
        Window::default_attributes()
            .with_title(&self.title)
            .with_inner_size(PhysicalSize::new(self.width, self.height))
            .with_resizable(self.resizable)
    }
}

/// Create a window on the active event loop.
pub fn create_window(event_loop: &ActiveEventLoop, config: &PlatformConfig) -> Result<Arc<Window>> {
    event_loop
        .create_window(config.window_attributes())
        .map(Arc::new)
        .map_err(|e| PlatformError::WindowCreation(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_size_matches_constants() {
        let config = PlatformConfig::default();
        assert_eq!((config.width, config.height), (800, 600));
        assert!(config.resizable);
    }

    #[test]
    fn window_attributes_carry_config() {
        let config = PlatformConfig {
            title: "quad".to_string(),
            width: 320,
            height: 240,
            resizable: false,
        };
        let attrs = config.window_attributes();
        assert_eq!(attrs.title, "quad");
        assert!(!attrs.resizable);
        assert_eq!(
            attrs.inner_size,
            Some(PhysicalSize::new(320u32, 240u32).into())
        );
    }

    #[test]
    fn event_loop_errors_map_to_platform_error() {
        let err = PlatformError::from(winit::error::EventLoopError::ExitFailure(3));
        assert!(matches!(&err, PlatformError::EventLoop(msg) if msg.contains('3')));
        assert!(err.to_string().starts_with("Event loop error"));
    }

    struct FakeWindow(u32, u32);

    impl HasWindowHandle for FakeWindow {
        fn window_handle(
            &self,
        ) -> std::result::Result<raw_window_handle::WindowHandle<'_>, raw_window_handle::HandleError>
        {
            Err(raw_window_handle::HandleError::Unavailable)
        }
    }

    impl HasDisplayHandle for FakeWindow {
        fn display_handle(
            &self,
        ) -> std::result::Result<raw_window_handle::DisplayHandle<'_>, raw_window_handle::HandleError>
        {
            Err(raw_window_handle::HandleError::Unavailable)
        }
    }

    impl SurfaceWindow for FakeWindow {
        fn framebuffer_size(&self) -> (u32, u32) {
            (self.0, self.1)
        }
    }

    #[test]
    fn minimized_window_is_not_drawable() {
        assert!(FakeWindow(800, 600).is_drawable());
        assert!(!FakeWindow(0, 600).is_drawable());
        assert!(!FakeWindow(800, 0).is_drawable());
    }
}
