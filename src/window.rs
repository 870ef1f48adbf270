//! Window management using winit

use crate::error::{SceneError, SceneResult};
use crate::RenderConfig;
use std::sync::Arc;
use winit::{
    dpi::{PhysicalPosition, PhysicalSize},
    event::{ElementState, Event, MouseButton, MouseScrollDelta, WindowEvent},
    event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget},
    window::{Window as WinitWindow, WindowBuilder},
};

/// Wrapper around a winit window plus the input state a viewer needs
pub struct Window {
    window: Arc<WinitWindow>,
    width: u32,
    height: u32,
    resized: bool,
    close_requested: bool,
    cursor: Option<PhysicalPosition<f64>>,
    drag_delta: (f32, f32),
    dragging: bool,
    scroll: f32,
    clicked: Option<(u32, u32)>,
}

impl Window {
    pub fn new(event_loop: &EventLoop<()>, title: &str, width: u32, height: u32) -> SceneResult<Self> {
        let window = WindowBuilder::new()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(width, height))
            .build(event_loop)
            .map_err(|e| SceneError::Window(e.to_string()))?;

        Ok(Self {
            window: Arc::new(window),
            width,
            height,
            resized: false,
            close_requested: false,
            cursor: None,
            drag_delta: (0.0, 0.0),
            dragging: false,
            scroll: 0.0,
            clicked: None,
        })
    }

    pub fn window(&self) -> &WinitWindow {
        &self.window
    }

    /// Shared handle for backend initialization
    pub fn window_arc(&self) -> Arc<WinitWindow> {
        Arc::clone(&self.window)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn was_resized(&self) -> bool {
        self.resized
    }

    pub fn clear_resize_flag(&mut self) {
        self.resized = false;
    }

    pub fn should_close(&self) -> bool {
        self.close_requested
    }

    /// Pixel under the cursor, if the cursor is inside the window
    pub fn cursor_pixel(&self) -> Option<(u32, u32)> {
        let cursor = self.cursor?;
        (cursor.x >= 0.0 && cursor.y >= 0.0).then(|| (cursor.x as u32, cursor.y as u32))
    }

    /// Left click released since the last call, at this pixel
    pub fn take_click(&mut self) -> Option<(u32, u32)> {
        self.clicked.take()
    }

    /// Cursor movement with the right button held since the last call
    pub fn take_drag(&mut self) -> (f32, f32) {
        std::mem::take(&mut self.drag_delta)
    }

    /// Scroll lines since the last call
    pub fn take_scroll(&mut self) -> f32 {
        std::mem::take(&mut self.scroll)
    }

    pub fn handle_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::Resized(size) => {
                self.width = size.width;
                self.height = size.height;
                self.resized = true;
            }
            WindowEvent::CloseRequested => {
                self.close_requested = true;
            }
            WindowEvent::CursorMoved { position, .. } => {
                if let (true, Some(previous)) = (self.dragging, self.cursor) {
                    self.drag_delta.0 += (position.x - previous.x) as f32;
                    self.drag_delta.1 += (position.y - previous.y) as f32;
                }
                self.cursor = Some(*position);
            }
            WindowEvent::CursorLeft { .. } => {
                self.cursor = None;
            }
            WindowEvent::MouseInput { state, button, .. } => match (button, state) {
                (MouseButton::Left, ElementState::Released) => {
                    self.clicked = self.cursor_pixel();
                }
                (MouseButton::Right, state) => {
                    self.dragging = *state == ElementState::Pressed;
                }
                _ => {}
            },
            WindowEvent::MouseWheel { delta, .. } => {
                self.scroll += match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(p) => p.y as f32 / 40.0,
                };
            }
            _ => {}
        }
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }
}

/// Open a window and call `frame` once per loop iteration until the window
/// closes or `frame` fails.
pub fn run<F>(config: &RenderConfig, mut frame: F) -> SceneResult<()>
where
    F: FnMut(&mut Window) -> SceneResult<()> + 'static,
{
    let event_loop = EventLoop::new().map_err(|e| SceneError::Window(e.to_string()))?;
    let mut window = Window::new(&event_loop, &config.title, config.width, config.height)?;

    event_loop
        .run(move |event, elwt: &EventLoopWindowTarget<()>| {
            elwt.set_control_flow(ControlFlow::Poll);

            match event {
                Event::WindowEvent { event, .. } => {
                    window.handle_event(&event);

                    if let WindowEvent::CloseRequested = event {
                        elwt.exit();
                    }
                }
                Event::AboutToWait => {
                    if let Err(e) = frame(&mut window) {
                        log::error!("frame failed: {}", e);
                        elwt.exit();
                    }
                    window.request_redraw();
                }
                _ => {}
            }
        })
        .map_err(|e| SceneError::Window(e.to_string()))
}
