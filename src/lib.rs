use std::cell::RefCell;
use std::rc::Rc;

use wasm_bindgen::prelude::*;
use web_sys::{Element, HtmlCanvasElement, HtmlImageElement};

pub mod boid;
pub mod command;
pub mod error;
pub mod flock;
pub mod input;
pub mod logger;
pub mod math;
pub mod obstacle;
pub mod params;
pub mod pool;
pub mod render;
pub mod rng;
pub mod simulation;
pub mod spatial_grid;
pub mod vector;
pub mod web;

pub use command::Command;
pub use error::SimError;
pub use flock::FlockSize;
pub use input::InputEvent;
pub use params::{DebugFlag, ParamKey, SimParams};
pub use simulation::{FrameStatus, Simulation};

use vector::Vector;
use web::{CanvasSurface, ElementObstacle, FrameLoop};

#[cfg(feature = "console_error_panic_hook")]
pub fn set_panic_hook() {
    console_error_panic_hook::set_once();
}

/// Installs the panic hook and the console logger. Call once before
/// constructing a [`Sim`].
#[wasm_bindgen]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    set_panic_hook();

    logger::init();
    log::info!("flock-wasm {} initialized", version());
}

#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// The page-facing handle: owns the simulation, the canvas surface and the
/// frame loop driving them.
#[wasm_bindgen]
pub struct Sim {
    sim: Rc<RefCell<Simulation>>,
    surface: Rc<RefCell<CanvasSurface>>,
    canvas: HtmlCanvasElement,
    frames: Option<FrameLoop>,
}

#[wasm_bindgen]
impl Sim {
    /// `params` is a JSON snapshot of the settings menu (missing fields take
    /// defaults). A `seed` of 0 picks a random flock.
    #[wasm_bindgen(constructor)]
    pub fn new(
        canvas: HtmlCanvasElement,
        sprite: HtmlImageElement,
        params: Option<String>,
        seed: u32,
    ) -> Result<Sim, JsValue> {
        let params = match params.as_deref() {
            Some(json) if !json.trim().is_empty() => SimParams::from_json(json)?,
            _ => SimParams::default(),
        };
        let surface = CanvasSurface::new(&canvas, sprite)?;
        let (width, height) = (canvas.width() as f64, canvas.height() as f64);
        let sim = Simulation::new(width, height, params, seed as u64);

        Ok(Sim {
            sim: Rc::new(RefCell::new(sim)),
            surface: Rc::new(RefCell::new(surface)),
            canvas,
            frames: None,
        })
    }

    pub fn start(&mut self) -> Result<(), JsValue> {
        if self.frames.as_ref().is_some_and(FrameLoop::is_scheduled) {
            return Ok(());
        }

        self.sim.borrow_mut().start(web::now());
        let sim = self.sim.clone();
        let surface = self.surface.clone();
        self.frames = Some(FrameLoop::start(move |now| {
            sim.borrow_mut().frame(now, &mut *surface.borrow_mut())
        })?);
        Ok(())
    }

    pub fn stop(&mut self) {
        self.frames = None;
        self.sim.borrow_mut().stop();
    }

    /// Plays the exit animation; the loop ends on its own when it finishes.
    pub fn exit(&mut self) {
        self.sim.borrow_mut().apply(Command::BeginExit);
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.sim.borrow_mut().handle_input(InputEvent::Resize { width, height });
    }

    #[wasm_bindgen(js_name = setParams)]
    pub fn set_params(&mut self, json: &str) -> Result<(), JsValue> {
        let params = SimParams::from_json(json)?;
        self.sim.borrow_mut().apply(Command::ReplaceParams(params));
        Ok(())
    }

    #[wasm_bindgen(js_name = setParam)]
    pub fn set_param(&mut self, name: &str, value: f64) -> Result<(), JsValue> {
        let key: ParamKey = name.parse()?;
        self.sim.borrow_mut().apply(Command::SetParam { key, value });
        Ok(())
    }

    #[wasm_bindgen(js_name = setDebug)]
    pub fn set_debug(&mut self, name: &str, enabled: bool) -> Result<(), JsValue> {
        let flag: DebugFlag = name.parse()?;
        self.sim.borrow_mut().apply(Command::SetDebug { flag, enabled });
        Ok(())
    }

    /// `0` returns the flock to responsive sizing.
    #[wasm_bindgen(js_name = setFlockSize)]
    pub fn set_flock_size(&mut self, size: u32) {
        let size = match size {
            0 => FlockSize::Responsive,
            n => FlockSize::Manual(n as usize),
        };
        self.sim.borrow_mut().apply(Command::SetFlockSize(size));
    }

    #[wasm_bindgen(js_name = setAnchor)]
    pub fn set_anchor(&mut self, x: f64, y: f64) {
        self.sim.borrow_mut().apply(Command::SetAnchor(Vector::new(x, y)));
    }

    #[wasm_bindgen(js_name = setBackground)]
    pub fn set_background(&mut self, color: &str) {
        self.surface.borrow_mut().set_background(color);
    }

    /// Registers a page element for the flock to avoid. Returns its slot.
    #[wasm_bindgen(js_name = addObstacle)]
    pub fn add_obstacle(&mut self, element: Element) -> usize {
        let source = ElementObstacle::new(element, self.canvas.clone());
        self.sim.borrow_mut().add_obstacle(Box::new(source)).0
    }

    #[wasm_bindgen(js_name = refreshObstacles)]
    pub fn refresh_obstacles(&mut self) {
        self.sim.borrow_mut().handle_input(InputEvent::Scroll);
    }

    #[wasm_bindgen(js_name = pointerMove)]
    pub fn pointer_move(&mut self, x: f64, y: f64) {
        self.sim.borrow_mut().handle_input(InputEvent::PointerMove { x, y });
    }

    #[wasm_bindgen(js_name = pointerDown)]
    pub fn pointer_down(&mut self, x: f64, y: f64) {
        self.sim.borrow_mut().handle_input(InputEvent::PointerDown { x, y });
    }

    #[wasm_bindgen(js_name = pointerUp)]
    pub fn pointer_up(&mut self) {
        self.sim.borrow_mut().handle_input(InputEvent::PointerUp);
    }

    #[wasm_bindgen(js_name = pointerLeave)]
    pub fn pointer_leave(&mut self) {
        self.sim.borrow_mut().handle_input(InputEvent::PointerLeave);
    }

    #[wasm_bindgen(js_name = touchStart)]
    pub fn touch_start(&mut self, x: f64, y: f64) {
        self.sim.borrow_mut().handle_input(InputEvent::TouchStart { x, y });
    }

    #[wasm_bindgen(js_name = touchMove)]
    pub fn touch_move(&mut self, x: f64, y: f64) {
        self.sim.borrow_mut().handle_input(InputEvent::TouchMove { x, y });
    }

    #[wasm_bindgen(js_name = touchEnd)]
    pub fn touch_end(&mut self) {
        self.sim.borrow_mut().handle_input(InputEvent::TouchEnd);
    }

    pub fn count(&self) -> usize {
        self.sim.borrow().flock().total_count()
    }

    #[wasm_bindgen(js_name = livingCount)]
    pub fn living_count(&self) -> usize {
        self.sim.borrow().flock().living_count()
    }

    #[wasm_bindgen(js_name = isRunning)]
    pub fn is_running(&self) -> bool {
        self.sim.borrow().is_running()
    }
}
