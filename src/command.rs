use crate::flock::FlockSize;
use crate::params::{DebugFlag, ParamKey, SimParams};
use crate::vector::Vector;

/// Messages the page (settings menu, resize observer, easter egg) sends to
/// the simulation. Applied synchronously, between frames.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    ReplaceParams(SimParams),
    SetParam { key: ParamKey, value: f64 },
    SetDebug { flag: DebugFlag, enabled: bool },
    Resize { width: f64, height: f64 },
    /// Screen point boids spawn from and return to on exit.
    SetAnchor(Vector),
    SetFlockSize(FlockSize),
    BeginExit,
    /// Obstacle source rectangles moved (scroll, layout change).
    RefreshObstacles,
}
