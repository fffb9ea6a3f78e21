//! The window and its input, built on winit.
//!
//! The engine owns the frame loop, so instead of handing control to
//! `EventLoop::run_app` the display pumps pending window events once per
//! [`EventSource::poll`] and translates the ones the engine cares about.

use std::{sync::Arc, time::Duration};

use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    error::OsError,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{Key, NamedKey},
    platform::pump_events::{EventLoopExtPumpEvents, PumpStatus},
    window::{Window, WindowAttributes, WindowId},
};

use crate::{
    config::EngineConfig,
    input::{EventSource, InputEvent, KeyCode, char_key, keys},
};

struct DisplayHandler {
    attributes: Option<WindowAttributes>,
    window: Option<Arc<Window>>,
    error: Option<OsError>,
    events: Vec<InputEvent>,
}

impl ApplicationHandler for DisplayHandler {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let Some(attributes) = self.attributes.take() else {
            return;
        };
        match event_loop.create_window(attributes) {
            Ok(window) => self.window = Some(Arc::new(window)),
            Err(e) => {
                log::error!("Unable to create window: {}", e);
                self.error = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.events.push(InputEvent::Quit),
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key,
                        state,
                        repeat: false,
                        ..
                    },
                ..
            } => {
                let Some(key) = key_code(&logical_key) else {
                    log::trace!("unmapped key {:?}", logical_key);
                    return;
                };
                self.events.push(match state {
                    ElementState::Pressed => InputEvent::KeyPress(key),
                    ElementState::Released => InputEvent::KeyRelease(key),
                });
            }
            _ => {}
        }
    }
}

/// A fixed-size window whose input feeds the engine.
pub struct Display {
    event_loop: EventLoop<()>,
    handler: DisplayHandler,
    window: Arc<Window>,
    closed: bool,
}

impl Display {
    pub fn open(config: &EngineConfig) -> anyhow::Result<Self> {
        let mut event_loop = EventLoop::new()?;
        let attributes = Window::default_attributes()
            .with_title(config.title.clone())
            .with_inner_size(PhysicalSize::new(config.width, config.height))
            .with_resizable(false);
        let mut handler = DisplayHandler {
            attributes: Some(attributes),
            window: None,
            error: None,
            events: Vec::new(),
        };

        let window = loop {
            let status = event_loop.pump_app_events(Some(Duration::from_millis(10)), &mut handler);
            if let Some(e) = handler.error.take() {
                return Err(e.into());
            }
            if let Some(window) = &handler.window {
                break window.clone();
            }
            if let PumpStatus::Exit(code) = status {
                anyhow::bail!("event loop exited with code {} before a window opened", code);
            }
        };
        log::info!("opened {}x{} window", config.width, config.height);

        Ok(Self {
            event_loop,
            handler,
            window,
            closed: false,
        })
    }

    pub fn window(&self) -> Arc<Window> {
        self.window.clone()
    }
}

impl EventSource for Display {
    fn poll(&mut self, out: &mut Vec<InputEvent>) {
        if self.closed {
            out.push(InputEvent::Quit);
            return;
        }
        let status = self
            .event_loop
            .pump_app_events(Some(Duration::ZERO), &mut self.handler);
        out.append(&mut self.handler.events);
        if let PumpStatus::Exit(_) = status {
            self.closed = true;
            out.push(InputEvent::Quit);
        }
    }
}

fn key_code(key: &Key) -> Option<KeyCode> {
    match key {
        Key::Character(text) => text.chars().next().map(char_key),
        Key::Named(named) => Some(match named {
            NamedKey::Space => keys::SPACE,
            NamedKey::Enter => keys::ENTER,
            NamedKey::Escape => keys::ESCAPE,
            NamedKey::Tab => keys::TAB,
            NamedKey::Backspace => keys::BACKSPACE,
            NamedKey::Delete => keys::DELETE,
            NamedKey::ArrowUp => keys::ARROW_UP,
            NamedKey::ArrowDown => keys::ARROW_DOWN,
            NamedKey::ArrowLeft => keys::ARROW_LEFT,
            NamedKey::ArrowRight => keys::ARROW_RIGHT,
            NamedKey::Shift => keys::SHIFT,
            NamedKey::Control => keys::CONTROL,
            NamedKey::Alt => keys::ALT,
            _ => return None,
        }),
        _ => None,
    }
}
