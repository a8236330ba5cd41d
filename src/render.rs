//! Drawing the flock onto a 2D surface, plus the debug overlays.

use crate::boid::{Boid, BoidId};
use crate::flock::Flock;
use crate::obstacle::{AvoidanceKind, AvoidanceTrace, ObstacleRegistry};
use crate::params::SimParams;
use crate::spatial_grid::SpatialGrid;
use crate::vector::{Rect, Vector, World};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Stroke {
    pub color: &'static str,
    pub width: f64,
    pub alpha: f64,
}

impl Stroke {
    pub const fn new(color: &'static str, width: f64, alpha: f64) -> Self {
        Self { color, width, alpha }
    }
}

pub const GRID_STROKE: Stroke = Stroke::new("#4a90d9", 1.0, 0.25);
pub const OBSTACLE_STROKE: Stroke = Stroke::new("#e0a030", 1.5, 0.8);
pub const STEER_STROKE: Stroke = Stroke::new("#e0a030", 1.0, 0.6);
pub const BOUNCE_STROKE: Stroke = Stroke::new("#e04040", 1.5, 0.9);
pub const VISION_STROKE: Stroke = Stroke::new("#7fd17f", 1.0, 0.2);
pub const NEIGHBOR_STROKE: Stroke = Stroke::new("#ffffff", 1.0, 0.15);

/// The 2D drawing target. The browser canvas implements it; tests record
/// calls instead.
pub trait Surface {
    /// Washes the whole surface with the background at `alpha`, leaving
    /// faded trails of the previous frame.
    fn clear_with_fade(&mut self, width: f64, height: f64, alpha: f64);
    /// Draws the boid sprite centered on `(x, y)`, rotated to `rotation`.
    fn draw_boid(&mut self, x: f64, y: f64, size: f64, rotation: f64, alpha: f64);
    fn stroke_line(&mut self, from: &Vector, to: &Vector, stroke: &Stroke);
    fn stroke_circle(&mut self, center: &Vector, radius: f64, stroke: &Stroke);
    fn stroke_rect(&mut self, rect: &Rect, stroke: &Stroke);
}

#[derive(Debug, Default)]
pub struct Renderer {
    neighbor_scratch: Vec<BoidId>,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_frame<S: Surface + ?Sized>(
        &self,
        surface: &mut S,
        world: &World,
        params: &SimParams,
    ) {
        surface.clear_with_fade(world.width, world.height, params.background_alpha);
    }

    /// Draws `boid`, repeating the sprite across any canvas edge it
    /// straddles so it slides off one side and onto the other.
    pub fn draw_boid<S: Surface + ?Sized>(
        &self,
        surface: &mut S,
        boid: &Boid,
        world: &World,
        alpha: f64,
    ) {
        if boid.render_size <= 0.0 || alpha <= 0.0 {
            return;
        }

        let half = boid.render_size * 0.5;
        let xs = wrapped_copies(boid.position.x, half, world.width);
        let ys = wrapped_copies(boid.position.y, half, world.height);

        for y in ys.iter().flatten() {
            for x in xs.iter().flatten() {
                surface.draw_boid(*x, *y, boid.render_size, boid.rotation, alpha);
            }
        }
    }

    pub fn draw_grid<S: Surface + ?Sized, T: Copy>(
        &self,
        surface: &mut S,
        grid: &SpatialGrid<T>,
        world: &World,
    ) {
        let cell = grid.cell_size();
        for col in 1..grid.cols() {
            let x = col as f64 * cell;
            surface.stroke_line(&Vector::new(x, 0.0), &Vector::new(x, world.height), &GRID_STROKE);
        }
        for row in 1..grid.rows() {
            let y = row as f64 * cell;
            surface.stroke_line(&Vector::new(0.0, y), &Vector::new(world.width, y), &GRID_STROKE);
        }
    }

    pub fn draw_obstacles<S: Surface + ?Sized>(
        &self,
        surface: &mut S,
        registry: &ObstacleRegistry,
        traces: &[AvoidanceTrace],
    ) {
        for (_, obstacle) in registry.iter_enabled() {
            surface.stroke_rect(obstacle.bounds(), &OBSTACLE_STROKE);
        }
        for trace in traces {
            let stroke = match trace.kind {
                AvoidanceKind::Steer => &STEER_STROKE,
                AvoidanceKind::Bounce => &BOUNCE_STROKE,
            };
            surface.stroke_line(&trace.position, &trace.closest, stroke);
        }
    }

    pub fn draw_vision<S: Surface + ?Sized>(
        &self,
        surface: &mut S,
        flock: &Flock,
        params: &SimParams,
    ) {
        let radius = params.alignment_radius.max(params.cohesion_radius);
        for boid in flock.iter().filter(|b| !b.is_dying()) {
            surface.stroke_circle(&boid.position, radius, &VISION_STROKE);
            surface.stroke_circle(&boid.position, params.separation_radius, &VISION_STROKE);
        }
    }

    /// One line per neighboring pair within the widest flocking radius.
    /// Lines crossing a canvas edge take the short way and run off-canvas.
    pub fn draw_neighbor_lines<S: Surface + ?Sized>(
        &mut self,
        surface: &mut S,
        flock: &Flock,
        grid: &SpatialGrid<BoidId>,
        world: &World,
        params: &SimParams,
    ) {
        let radius = params
            .alignment_radius
            .max(params.cohesion_radius)
            .max(params.separation_radius);
        let radius_sq = radius * radius;

        for boid in flock.iter().filter(|b| !b.is_dying()) {
            self.neighbor_scratch.clear();
            grid.for_each_in_neighborhood(&boid.position, |id| {
                if boid.id < id {
                    self.neighbor_scratch.push(id);
                }
            });

            for &id in &self.neighbor_scratch {
                let Some(other) = flock.get(id) else {
                    continue;
                };
                let delta = world.delta(&boid.position, &other.position);
                if delta.mag_sq() <= radius_sq {
                    let mut end = boid.position;
                    end.add(&delta);
                    surface.stroke_line(&boid.position, &end, &NEIGHBOR_STROKE);
                }
            }
        }
    }
}

/// The coordinate plus its wrapped twin when `[value - half, value + half]`
/// crosses an edge of `[0, extent]`.
fn wrapped_copies(value: f64, half: f64, extent: f64) -> [Option<f64>; 2] {
    let twin = if value - half < 0.0 {
        Some(value + extent)
    } else if value + half > extent {
        Some(value - extent)
    } else {
        None
    };
    [Some(value), twin]
}

#[cfg(test)]
pub(crate) mod testing {
    use super::{Stroke, Surface};
    use crate::vector::{Rect, Vector};

    #[derive(Clone, Debug, PartialEq)]
    pub enum DrawOp {
        Clear { alpha: f64 },
        Boid { x: f64, y: f64, size: f64, alpha: f64 },
        Line { from: Vector, to: Vector, color: &'static str },
        Circle { center: Vector, radius: f64 },
        Rect { rect: Rect, color: &'static str },
    }

    #[derive(Debug, Default)]
    pub struct RecordingSurface {
        pub ops: Vec<DrawOp>,
    }

    impl RecordingSurface {
        pub fn boids(&self) -> usize {
            self.ops.iter().filter(|op| matches!(op, DrawOp::Boid { .. })).count()
        }

        pub fn lines(&self, color: &str) -> usize {
            self.ops
                .iter()
                .filter(|op| matches!(op, DrawOp::Line { color: c, .. } if *c == color))
                .count()
        }
    }

    impl Surface for RecordingSurface {
        fn clear_with_fade(&mut self, _width: f64, _height: f64, alpha: f64) {
            self.ops.push(DrawOp::Clear { alpha });
        }

        fn draw_boid(&mut self, x: f64, y: f64, size: f64, _rotation: f64, alpha: f64) {
            self.ops.push(DrawOp::Boid { x, y, size, alpha });
        }

        fn stroke_line(&mut self, from: &Vector, to: &Vector, stroke: &Stroke) {
            self.ops.push(DrawOp::Line {
                from: *from,
                to: *to,
                color: stroke.color,
            });
        }

        fn stroke_circle(&mut self, center: &Vector, radius: f64, _stroke: &Stroke) {
            self.ops.push(DrawOp::Circle {
                center: *center,
                radius,
            });
        }

        fn stroke_rect(&mut self, rect: &Rect, stroke: &Stroke) {
            self.ops.push(DrawOp::Rect {
                rect: *rect,
                color: stroke.color,
            });
        }
    }
}
