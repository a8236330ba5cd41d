//! Browser glue: the canvas surface, DOM-backed obstacles and the
//! `requestAnimationFrame` loop.

use std::cell::{Cell, RefCell};
use std::f64::consts::TAU;
use std::rc::Rc;

use wasm_bindgen::prelude::*;
use web_sys::{CanvasRenderingContext2d, Element, HtmlCanvasElement, HtmlImageElement};

use crate::error::SimError;
use crate::obstacle::ObstacleSource;
use crate::render::{Stroke, Surface};
use crate::simulation::FrameStatus;
use crate::vector::{Rect, Vector};

pub const DEFAULT_BACKGROUND: &str = "#0b0d14";

pub struct CanvasSurface {
    context: CanvasRenderingContext2d,
    sprite: HtmlImageElement,
    background: String,
}

impl CanvasSurface {
    /// Fails when the sprite has not finished loading: without it there is
    /// nothing to draw, so startup stops here.
    pub fn new(canvas: &HtmlCanvasElement, sprite: HtmlImageElement) -> Result<Self, SimError> {
        if !sprite.complete() || sprite.natural_width() == 0 || sprite.natural_height() == 0 {
            return Err(SimError::SpriteNotLoaded { src: sprite.src() });
        }

        let context = canvas
            .get_context("2d")?
            .ok_or(SimError::MissingContext)?
            .dyn_into::<CanvasRenderingContext2d>()
            .map_err(|_| SimError::MissingContext)?;

        Ok(Self {
            context,
            sprite,
            background: DEFAULT_BACKGROUND.to_string(),
        })
    }

    pub fn set_background(&mut self, color: &str) {
        self.background = color.to_string();
    }

    fn apply_stroke(&self, stroke: &Stroke) {
        self.context.set_stroke_style_str(stroke.color);
        self.context.set_line_width(stroke.width);
        self.context.set_global_alpha(stroke.alpha);
    }
}

fn report(result: Result<(), JsValue>) {
    if let Err(e) = result {
        log::debug!("canvas call failed: {:?}", e);
    }
}

impl Surface for CanvasSurface {
    fn clear_with_fade(&mut self, width: f64, height: f64, alpha: f64) {
        let ctx = &self.context;
        ctx.save();
        ctx.set_global_alpha(alpha);
        ctx.set_fill_style_str(&self.background);
        ctx.fill_rect(0.0, 0.0, width, height);
        ctx.restore();
    }

    fn draw_boid(&mut self, x: f64, y: f64, size: f64, rotation: f64, alpha: f64) {
        let ctx = &self.context;
        ctx.save();
        ctx.set_global_alpha(alpha);
        report(ctx.translate(x, y));
        report(ctx.rotate(rotation));
        let half = size * 0.5;
        report(ctx.draw_image_with_html_image_element_and_dw_and_dh(
            &self.sprite,
            -half,
            -half,
            size,
            size,
        ));
        ctx.restore();
    }

    fn stroke_line(&mut self, from: &Vector, to: &Vector, stroke: &Stroke) {
        let ctx = &self.context;
        ctx.save();
        self.apply_stroke(stroke);
        ctx.begin_path();
        ctx.move_to(from.x, from.y);
        ctx.line_to(to.x, to.y);
        ctx.stroke();
        ctx.restore();
    }

    fn stroke_circle(&mut self, center: &Vector, radius: f64, stroke: &Stroke) {
        let ctx = &self.context;
        ctx.save();
        self.apply_stroke(stroke);
        ctx.begin_path();
        report(ctx.arc(center.x, center.y, radius, 0.0, TAU));
        ctx.stroke();
        ctx.restore();
    }

    fn stroke_rect(&mut self, rect: &Rect, stroke: &Stroke) {
        let ctx = &self.context;
        ctx.save();
        self.apply_stroke(stroke);
        ctx.stroke_rect(rect.left, rect.top, rect.width, rect.height);
        ctx.restore();
    }
}

/// A page element the flock avoids. Its client rect is mapped into canvas
/// coordinates on every read, so scrolling and layout changes are picked up.
pub struct ElementObstacle {
    element: Element,
    canvas: HtmlCanvasElement,
}

impl ElementObstacle {
    pub fn new(element: Element, canvas: HtmlCanvasElement) -> Self {
        Self { element, canvas }
    }
}

impl ObstacleSource for ElementObstacle {
    fn bounding_rect(&self) -> Option<Rect> {
        let rect = self.element.get_bounding_client_rect();
        if rect.width() <= 0.0 || rect.height() <= 0.0 {
            return None;
        }

        let frame = self.canvas.get_bounding_client_rect();
        let scale_x = scale(self.canvas.width(), frame.width());
        let scale_y = scale(self.canvas.height(), frame.height());

        Some(Rect::new(
            (rect.left() - frame.left()) * scale_x,
            (rect.top() - frame.top()) * scale_y,
            rect.width() * scale_x,
            rect.height() * scale_y,
        ))
    }
}

/// Canvas pixels per CSS pixel along one axis.
fn scale(pixels: u32, css: f64) -> f64 {
    if css > 0.0 {
        pixels as f64 / css
    } else {
        1.0
    }
}

type FrameCallback = Rc<RefCell<Option<Closure<dyn FnMut(f64)>>>>;

/// Drives `tick` once per display refresh until it returns anything other
/// than [`FrameStatus::Continue`] or the loop is stopped.
pub struct FrameLoop {
    pending: Rc<Cell<Option<i32>>>,
    callback: FrameCallback,
}

impl FrameLoop {
    pub fn start<F>(mut tick: F) -> Result<Self, SimError>
    where
        F: FnMut(f64) -> FrameStatus + 'static,
    {
        let pending = Rc::new(Cell::new(None));
        let callback: FrameCallback = Rc::new(RefCell::new(None));

        let next_pending = pending.clone();
        let next_callback = callback.clone();
        *callback.borrow_mut() = Some(Closure::new(move |now: f64| {
            next_pending.set(None);
            if tick(now) != FrameStatus::Continue {
                return;
            }
            if let Some(closure) = next_callback.borrow().as_ref() {
                match request_frame(closure) {
                    Ok(handle) => next_pending.set(Some(handle)),
                    Err(e) => log::error!("could not schedule the next frame: {}", e),
                }
            }
        }));

        let handle = match callback.borrow().as_ref() {
            Some(closure) => request_frame(closure)?,
            None => return Err(SimError::Js("frame callback missing".to_string())),
        };
        pending.set(Some(handle));

        Ok(Self { pending, callback })
    }

    pub fn is_scheduled(&self) -> bool {
        self.pending.get().is_some()
    }

    /// Cancels the pending frame, if any.
    pub fn stop(&self) {
        if let (Some(handle), Some(window)) = (self.pending.take(), web_sys::window()) {
            report(window.cancel_animation_frame(handle));
        }
    }
}

impl Drop for FrameLoop {
    fn drop(&mut self) {
        self.stop();
        // The closure holds a handle to its own cell; break the cycle.
        self.callback.borrow_mut().take();
    }
}

fn request_frame(closure: &Closure<dyn FnMut(f64)>) -> Result<i32, SimError> {
    let window = web_sys::window().ok_or_else(|| SimError::Js("no window".to_string()))?;
    Ok(window.request_animation_frame(closure.as_ref().unchecked_ref())?)
}

/// Milliseconds on the same clock `requestAnimationFrame` reports.
pub fn now() -> f64 {
    web_sys::window()
        .and_then(|w| w.performance())
        .map(|p| p.now())
        .unwrap_or(0.0)
}
