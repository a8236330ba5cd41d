//! 2D vector math and the geometry contracts shared by boids, obstacles and
//! the spatial grid.
//!
//! Mutators return `&mut Self` so steering code can chain them the same way
//! it chains operations on pooled scratch vectors.

use std::f64::consts::TAU;

use rand::Rng;

use crate::math::{self, EPSILON};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vector {
    pub x: f64,
    pub y: f64,
}

impl Vector {
    pub const ZERO: Vector = Vector { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn set(&mut self, x: f64, y: f64) -> &mut Self {
        self.x = x;
        self.y = y;
        self
    }

    pub fn set_from(&mut self, other: &Vector) -> &mut Self {
        self.set(other.x, other.y)
    }

    pub fn add(&mut self, other: &Vector) -> &mut Self {
        self.x += other.x;
        self.y += other.y;
        self
    }

    pub fn sub(&mut self, other: &Vector) -> &mut Self {
        self.x -= other.x;
        self.y -= other.y;
        self
    }

    pub fn mult(&mut self, scalar: f64) -> &mut Self {
        self.x *= scalar;
        self.y *= scalar;
        self
    }

    /// Division by zero yields the zero vector instead of NaN/Infinity.
    pub fn div(&mut self, scalar: f64) -> &mut Self {
        if scalar == 0.0 {
            return self.set(0.0, 0.0);
        }
        self.x /= scalar;
        self.y /= scalar;
        self
    }

    pub fn mag_sq(&self) -> f64 {
        self.x * self.x + self.y * self.y
    }

    pub fn mag(&self) -> f64 {
        self.mag_sq().sqrt()
    }

    pub fn normalize(&mut self) -> &mut Self {
        let mag = self.mag();
        if mag > EPSILON {
            self.div(mag);
        }
        self
    }

    pub fn set_mag(&mut self, magnitude: f64) -> &mut Self {
        self.normalize().mult(magnitude)
    }

    pub fn limit(&mut self, max: f64) -> &mut Self {
        let mag_sq = self.mag_sq();
        if mag_sq > max * max {
            self.div(mag_sq.sqrt()).mult(max);
        }
        self
    }

    pub fn heading(&self) -> f64 {
        self.y.atan2(self.x)
    }

    pub fn dist_sq(&self, other: &Vector) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        dx * dx + dy * dy
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Writes `a - b` into `out`.
    pub fn sub_into<'a>(a: &Vector, b: &Vector, out: &'a mut Vector) -> &'a mut Vector {
        out.set(a.x - b.x, a.y - b.y)
    }

    /// Writes a uniformly distributed unit vector into `out`.
    pub fn random_2d<'a, R: Rng + ?Sized>(rng: &mut R, out: &'a mut Vector) -> &'a mut Vector {
        let angle = rng.random::<f64>() * TAU;
        out.set(angle.cos(), angle.sin())
    }
}

/// Axis-aligned rectangle in canvas pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn center(&self) -> Vector {
        Vector::new(self.left + self.width * 0.5, self.top + self.height * 0.5)
    }

    pub fn inflate(&self, pad: f64) -> Rect {
        Rect::new(
            self.left - pad,
            self.top - pad,
            self.width + pad * 2.0,
            self.height + pad * 2.0,
        )
    }

    pub fn translate(&self, dx: f64, dy: f64) -> Rect {
        Rect::new(self.left + dx, self.top + dy, self.width, self.height)
    }

    pub fn contains(&self, point: &Vector) -> bool {
        point.x >= self.left
            && point.x <= self.right()
            && point.y >= self.top
            && point.y <= self.bottom()
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.left < other.right()
            && other.left < self.right()
            && self.top < other.bottom()
            && other.top < self.bottom()
    }

    /// Writes the point of the rectangle nearest to `point` into `out`.
    pub fn closest_point<'a>(&self, point: &Vector, out: &'a mut Vector) -> &'a mut Vector {
        out.set(
            point.x.clamp(self.left, self.right()),
            point.y.clamp(self.top, self.bottom()),
        )
    }
}

/// The toroidal canvas the flock lives on.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct World {
    pub width: f64,
    pub height: f64,
}

impl World {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Shortest offset from `from` to `to`, wrapping at the canvas edges.
    pub fn delta(&self, from: &Vector, to: &Vector) -> Vector {
        let (dx, dy) = math::toroidal_delta(from.x, from.y, to.x, to.y, self.width, self.height);
        Vector::new(dx, dy)
    }

    pub fn distance_sq(&self, a: &Vector, b: &Vector) -> f64 {
        math::toroidal_distance_sq(a.x, a.y, b.x, b.y, self.width, self.height)
    }

    pub fn wrap(&self, position: &mut Vector) {
        position.x = math::wrap_coordinate(position.x, self.width);
        position.y = math::wrap_coordinate(position.y, self.height);
    }

    pub fn rect(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width, self.height)
    }

    pub fn area(&self) -> f64 {
        self.rect().area()
    }

    pub fn center(&self) -> Vector {
        self.rect().center()
    }
}

/// Anything the grid can bucket by a single point.
pub trait HasPosition {
    fn position(&self) -> &Vector;
}

/// Anything the grid buckets into every cell its rectangle overlaps.
pub trait HasBounds {
    fn bounds(&self) -> &Rect;
}
