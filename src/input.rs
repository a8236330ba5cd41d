//! Translates pointer, touch and window events into simulation signals.
//!
//! Event handlers only flip small pieces of state here; the next frame reads
//! them. Touch release is debounced against frame timestamps instead of a
//! timer so the core stays free of host scheduling.

use crate::command::Command;
use crate::vector::Vector;

/// How long a lifted finger keeps influencing the flock.
pub const TOUCH_RELEASE_MS: f64 = 250.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InputEvent {
    PointerMove { x: f64, y: f64 },
    PointerDown { x: f64, y: f64 },
    PointerUp,
    PointerLeave,
    TouchStart { x: f64, y: f64 },
    TouchMove { x: f64, y: f64 },
    TouchEnd,
    Resize { width: f64, height: f64 },
    Scroll,
}

/// Mouse snapshot read by the steering pass.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Interaction {
    pub mouse: Vector,
    pub active: bool,
}

#[derive(Debug, Default)]
pub struct InputHandler {
    mouse: Vector,
    mouse_active: bool,
    holding: bool,
    pending_scatter: Option<Vector>,
    release_requested: bool,
    release_at: Option<f64>,
}

impl InputHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one host event. Window-level events come back as commands for
    /// the simulation to process.
    pub fn handle(&mut self, event: InputEvent) -> Option<Command> {
        match event {
            InputEvent::PointerMove { x, y } | InputEvent::TouchMove { x, y } => {
                self.mouse.set(x, y);
                self.mouse_active = true;
            }
            InputEvent::PointerDown { x, y } | InputEvent::TouchStart { x, y } => {
                self.mouse.set(x, y);
                self.mouse_active = true;
                self.holding = true;
                self.pending_scatter = Some(Vector::new(x, y));
                self.release_requested = false;
                self.release_at = None;
            }
            InputEvent::PointerUp => {
                self.holding = false;
            }
            InputEvent::PointerLeave => {
                self.holding = false;
                self.mouse_active = false;
            }
            InputEvent::TouchEnd => {
                self.holding = false;
                self.release_requested = true;
            }
            InputEvent::Resize { width, height } => return Some(Command::Resize { width, height }),
            InputEvent::Scroll => return Some(Command::RefreshObstacles),
        }
        None
    }

    /// Advances the touch-release debounce to the frame time `now`.
    pub fn tick(&mut self, now: f64) {
        if self.release_requested {
            self.release_requested = false;
            self.release_at = Some(now + TOUCH_RELEASE_MS);
        }
        if let Some(deadline) = self.release_at {
            if now >= deadline {
                self.release_at = None;
                self.mouse_active = false;
            }
        }
    }

    /// Scatter origin for this frame: the press point once, then the pointer
    /// position for as long as it is held.
    pub fn take_scatter(&mut self) -> Option<Vector> {
        match self.pending_scatter.take() {
            Some(origin) => Some(origin),
            None if self.holding => Some(self.mouse),
            None => None,
        }
    }

    pub fn interaction(&self) -> Interaction {
        Interaction {
            mouse: self.mouse,
            active: self.mouse_active,
        }
    }

    pub fn is_holding(&self) -> bool {
        self.holding
    }
}
