//! Rectangular regions the flock steers around, and the avoidance pass.

use std::cell::Cell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use crate::boid::BoidId;
use crate::flock::Flock;
use crate::math::EPSILON;
use crate::params::SimParams;
use crate::pool::VectorPool;
use crate::spatial_grid::SpatialGrid;
use crate::vector::{HasBounds, Rect, Vector, World};

/// Where an obstacle's rectangle comes from, in canvas coordinates.
/// `None` means the source is currently gone (detached, hidden).
pub trait ObstacleSource {
    fn bounding_rect(&self) -> Option<Rect>;
}

impl ObstacleSource for Rect {
    fn bounding_rect(&self) -> Option<Rect> {
        Some(*self)
    }
}

impl ObstacleSource for Rc<Cell<Option<Rect>>> {
    fn bounding_rect(&self) -> Option<Rect> {
        self.get()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObstacleId(pub usize);

pub struct Obstacle {
    source: Box<dyn ObstacleSource>,
    bounds: Rect,
    center: Vector,
    is_enabled: bool,
}

impl Obstacle {
    pub fn new(source: Box<dyn ObstacleSource>) -> Self {
        Self {
            source,
            bounds: Rect::default(),
            center: Vector::ZERO,
            is_enabled: false,
        }
    }

    /// Re-reads the source rectangle. Returns `true` when the obstacle was
    /// enabled or disabled by this update.
    pub fn update(&mut self, canvas_width: f64, canvas_height: f64, padding: f64) -> bool {
        let was_enabled = self.is_enabled;
        let canvas = Rect::new(0.0, 0.0, canvas_width, canvas_height);

        match self.source.bounding_rect() {
            Some(rect) if rect.area() > 0.0 && rect.intersects(&canvas) => {
                self.bounds = rect.inflate(padding);
                self.center = rect.center();
                self.is_enabled = true;
            }
            _ => self.is_enabled = false,
        }

        was_enabled != self.is_enabled
    }

    pub fn bounds(&self) -> &Rect {
        &self.bounds
    }

    pub fn center(&self) -> &Vector {
        &self.center
    }

    pub fn is_enabled(&self) -> bool {
        self.is_enabled
    }
}

impl HasBounds for Obstacle {
    fn bounds(&self) -> &Rect {
        &self.bounds
    }
}

impl fmt::Debug for Obstacle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Obstacle")
            .field("bounds", &self.bounds)
            .field("center", &self.center)
            .field("is_enabled", &self.is_enabled)
            .finish()
    }
}

/// Fixed obstacle slots for the session. Slots are never removed; a source
/// that disappears just disables its slot.
#[derive(Debug, Default)]
pub struct ObstacleRegistry {
    obstacles: Vec<Obstacle>,
}

impl ObstacleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, source: Box<dyn ObstacleSource>) -> ObstacleId {
        self.obstacles.push(Obstacle::new(source));
        ObstacleId(self.obstacles.len() - 1)
    }

    pub fn update_all(&mut self, canvas_width: f64, canvas_height: f64, padding: f64) {
        for (index, obstacle) in self.obstacles.iter_mut().enumerate() {
            if obstacle.update(canvas_width, canvas_height, padding) {
                log::debug!(
                    "obstacle {} {}",
                    index,
                    if obstacle.is_enabled() { "enabled" } else { "disabled" }
                );
            }
        }
    }

    pub fn get(&self, id: ObstacleId) -> Option<&Obstacle> {
        self.obstacles.get(id.0)
    }

    pub fn iter_enabled(&self) -> impl Iterator<Item = (ObstacleId, &Obstacle)> {
        self.obstacles
            .iter()
            .enumerate()
            .filter(|(_, o)| o.is_enabled())
            .map(|(i, o)| (ObstacleId(i), o))
    }

    /// Re-buckets every enabled obstacle into `grid`.
    pub fn populate(&self, grid: &mut SpatialGrid<ObstacleId>) {
        grid.clear();
        for (id, obstacle) in self.iter_enabled() {
            grid.add_item_in_area(id, obstacle);
        }
    }

    /// Enabled obstacles whose padded bounds contain `point`, each listed once.
    pub fn obstacles_at(&self, point: &Vector, grid: &SpatialGrid<ObstacleId>) -> Vec<ObstacleId> {
        let mut seen = HashSet::new();
        grid.items_in_area(&Rect::new(point.x, point.y, 0.0, 0.0))
            .into_iter()
            .filter(|id| seen.insert(*id))
            .filter(|id| {
                self.get(*id)
                    .is_some_and(|o| o.is_enabled() && o.bounds().contains(point))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.obstacles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.obstacles.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum AvoidanceKind {
    Steer,
    Bounce,
}

/// One winning interaction, kept for the obstacle debug overlay.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AvoidanceTrace {
    pub boid: BoidId,
    pub position: Vector,
    pub closest: Vector,
    pub kind: AvoidanceKind,
}

struct Candidate {
    kind: AvoidanceKind,
    distance: f64,
    force: Vector,
    closest: Vector,
}

impl Candidate {
    fn beats(&self, other: &Candidate) -> bool {
        self.kind > other.kind || (self.kind == other.kind && self.distance < other.distance)
    }
}

/// Pushes every boid near an enabled obstacle away from it.
///
/// Each (obstacle, boid) pair contributes only its most critical
/// interaction across the obstacle's toroidal images: an overlap bounces,
/// otherwise proximity inside `obstacle_radius` steers with a linear
/// falloff. The winner is scaled by `obstacle_force × time_scale` and added
/// to the boid's desired velocity.
#[allow(clippy::too_many_arguments)]
pub fn apply_obstacle_avoidance_forces(
    flock: &mut Flock,
    registry: &ObstacleRegistry,
    grid: &SpatialGrid<BoidId>,
    pool: &VectorPool,
    params: &SimParams,
    world: &World,
    time_scale: f64,
    mut traces: Option<&mut Vec<AvoidanceTrace>>,
) {
    let vision = params.obstacle_radius;
    // `boid_size` bounds every boid's drawn radius, so overlapping boids are
    // found even when the vision radius is smaller than they are.
    let query_pad = vision + params.boid_size;

    for (_, obstacle) in registry.iter_enabled() {
        let bounds = *obstacle.bounds();
        let center = *obstacle.center();

        for id in grid.items_in_area(&bounds.inflate(query_pad)) {
            let Some(boid) = flock.get_mut(id) else {
                continue;
            };
            if boid.is_dying() {
                continue;
            }

            let boid_radius = boid.render_size * 0.5;
            let position = boid.position;
            let velocity = boid.velocity;
            let dynamic_max_force =
                boid.max_force * (1.0 + velocity.mag() / boid.max_speed.max(EPSILON));

            let reach = vision + boid_radius;
            let near_edge = position.x < reach
                || position.y < reach
                || position.x > world.width - reach
                || position.y > world.height - reach;

            let mut best: Option<Candidate> = None;
            let mut closest = pool.get(0.0, 0.0);
            let mut offset_to_boid = pool.get(0.0, 0.0);

            for (dx, dy) in image_offsets(world, near_edge) {
                let image = bounds.translate(dx, dy);
                image.closest_point(&position, &mut closest);
                Vector::sub_into(&position, &closest, &mut offset_to_boid);
                let distance = offset_to_boid.mag();

                let candidate = if distance < boid_radius || image.contains(&position) {
                    let image_center = Vector::new(center.x + dx, center.y + dy);
                    let mut away =
                        pool.get(position.x - image_center.x, position.y - image_center.y);
                    let center_distance = away.mag();
                    if away.mag_sq() <= EPSILON {
                        away.set(-velocity.x, -velocity.y);
                        if away.mag_sq() <= EPSILON {
                            away.set(1.0, 0.0);
                        }
                    }
                    away.set_mag(boid.max_speed)
                        .sub(&velocity)
                        .mult(params.bounce_multiplier)
                        .limit(dynamic_max_force * params.bounce_multiplier);
                    Candidate {
                        kind: AvoidanceKind::Bounce,
                        distance: center_distance,
                        force: *away,
                        closest: *closest,
                    }
                } else if distance < vision {
                    let strength = (vision - distance) / vision;
                    let mut steer = offset_to_boid.copy();
                    steer.set_mag(dynamic_max_force * strength);
                    Candidate {
                        kind: AvoidanceKind::Steer,
                        distance,
                        force: *steer,
                        closest: *closest,
                    }
                } else {
                    continue;
                };

                if best.as_ref().is_none_or(|b| candidate.beats(b)) {
                    best = Some(candidate);
                }
            }

            if let Some(winner) = best {
                let mut force = winner.force;
                force.mult(params.obstacle_force * time_scale);
                boid.desired_velocity.add(&force);

                if let Some(traces) = traces.as_mut() {
                    traces.push(AvoidanceTrace {
                        boid: id,
                        position,
                        closest: winner.closest,
                        kind: winner.kind,
                    });
                }
            }
        }
    }
}

fn image_offsets(world: &World, wrapped: bool) -> impl Iterator<Item = (f64, f64)> {
    let (w, h) = (world.width, world.height);
    let all = [
        (0.0, 0.0),
        (-w, -h),
        (0.0, -h),
        (w, -h),
        (-w, 0.0),
        (w, 0.0),
        (-w, h),
        (0.0, h),
        (w, h),
    ];
    let count = if wrapped { all.len() } else { 1 };
    all.into_iter().take(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial_grid::cell_size_for;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    struct Scene {
        world: World,
        params: SimParams,
        flock: Flock,
        grid: SpatialGrid<BoidId>,
        pool: VectorPool,
    }

    fn scene(boids: &[(f64, f64, f64, f64)]) -> Scene {
        scene_in(World::new(800.0, 600.0), SimParams::default(), boids)
    }

    fn scene_in(world: World, params: SimParams, boids: &[(f64, f64, f64, f64)]) -> Scene {
        let mut rng = ChaCha8Rng::seed_from_u64(17);
        let mut flock = Flock::new();
        flock.seed(boids.len(), world.center(), &params, &mut rng);
        for (boid, &(x, y, vx, vy)) in flock.iter_mut().zip(boids) {
            boid.position = Vector::new(x, y);
            boid.velocity = Vector::new(vx, vy);
            boid.desired_velocity = boid.velocity;
        }
        let mut grid = SpatialGrid::new(world.width, world.height, cell_size_for(&params));
        for boid in flock.iter() {
            grid.add_item_at_point(boid.id, boid);
        }
        Scene {
            world,
            params,
            flock,
            grid,
            pool: VectorPool::with_capacity(32),
        }
    }

    #[test]
    fn update_tracks_visibility_of_the_source() {
        let shared: Rc<Cell<Option<Rect>>> = Rc::new(Cell::new(None));
        let mut obstacle = Obstacle::new(Box::new(shared.clone()));

        assert!(!obstacle.update(800.0, 600.0, 8.0));
        assert!(!obstacle.is_enabled());

        shared.set(Some(Rect::new(100.0, 100.0, 50.0, 20.0)));
        assert!(obstacle.update(800.0, 600.0, 8.0));
        assert!(obstacle.is_enabled());
        assert_eq!(*obstacle.bounds(), Rect::new(92.0, 92.0, 66.0, 36.0));
        assert_eq!(*obstacle.center(), Vector::new(125.0, 110.0));

        shared.set(Some(Rect::new(100.0, 700.0, 50.0, 20.0)));
        assert!(obstacle.update(800.0, 600.0, 8.0));
        assert!(!obstacle.is_enabled());

        shared.set(Some(Rect::new(100.0, 100.0, 0.0, 20.0)));
        obstacle.update(800.0, 600.0, 8.0);
        assert!(!obstacle.is_enabled());
    }

    #[test]
    fn contained_boid_bounces_at_the_clamp_limit() {
        let mut s = scene(&[(150.0, 200.0, 2.0, 0.0)]);
        let mut registry = ObstacleRegistry::new();
        registry.add(Box::new(Rect::new(100.0, 100.0, 200.0, 200.0)));
        registry.update_all(s.world.width, s.world.height, s.params.obstacle_padding);

        let boid = &s.flock.boids()[0];
        let before = boid.desired_velocity;
        let dynamic_max_force = boid.max_force * (1.0 + boid.velocity.mag() / boid.max_speed);

        let mut traces = Vec::new();
        apply_obstacle_avoidance_forces(
            &mut s.flock,
            &registry,
            &s.grid,
            &s.pool,
            &s.params,
            &s.world,
            1.0,
            Some(&mut traces),
        );

        let after = s.flock.boids()[0].desired_velocity;
        let applied = Vector::new(after.x - before.x, after.y - before.y);
        let limit = dynamic_max_force * s.params.bounce_multiplier * s.params.obstacle_force;
        assert!((applied.mag() - limit).abs() < 1.0e-9);
        assert!(applied.x < 0.0);
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].kind, AvoidanceKind::Bounce);
        assert_eq!(s.pool.stats().outstanding(), 0);
    }

    #[test]
    fn nearby_boid_steers_away_with_linear_falloff() {
        let mut s = scene(&[(330.0, 200.0, 0.0, 0.0), (345.0, 200.0, 0.0, 0.0)]);
        let mut registry = ObstacleRegistry::new();
        registry.add(Box::new(Rect::new(100.0, 100.0, 200.0, 200.0)));
        registry.update_all(s.world.width, s.world.height, 0.0);

        apply_obstacle_avoidance_forces(
            &mut s.flock,
            &registry,
            &s.grid,
            &s.pool,
            &s.params,
            &s.world,
            1.0,
            None,
        );

        let near = s.flock.boids()[0].desired_velocity;
        let far = s.flock.boids()[1].desired_velocity;
        assert!(near.x > 0.0 && near.y.abs() < 1.0e-12);
        assert!(far.x > 0.0);
        assert!(near.x > far.x);

        let max_force = s.params.max_force;
        let expected = max_force * (s.params.obstacle_radius - 30.0) / s.params.obstacle_radius;
        assert!((near.x - expected).abs() < 1.0e-9);
        assert_eq!(s.pool.stats().outstanding(), 0);
    }

    #[test]
    fn obstacles_are_seen_across_the_canvas_edge() {
        let mut s = scene(&[(795.0, 300.0, 0.0, 0.0)]);
        let mut registry = ObstacleRegistry::new();
        registry.add(Box::new(Rect::new(0.0, 250.0, 20.0, 100.0)));
        registry.update_all(s.world.width, s.world.height, 0.0);

        apply_obstacle_avoidance_forces(
            &mut s.flock,
            &registry,
            &s.grid,
            &s.pool,
            &s.params,
            &s.world,
            1.0,
            None,
        );

        // The wrapped image sits 5px to the right, so the push is leftward.
        assert!(s.flock.boids()[0].desired_velocity.x < 0.0);
    }

    fn push_on(s: &mut Scene, registry: &ObstacleRegistry) -> (Vector, AvoidanceKind) {
        let mut traces = Vec::new();
        apply_obstacle_avoidance_forces(
            &mut s.flock,
            registry,
            &s.grid,
            &s.pool,
            &s.params,
            &s.world,
            1.0,
            Some(&mut traces),
        );
        assert_eq!(traces.len(), 1);
        assert_eq!(s.pool.stats().outstanding(), 0);
        (s.flock.boids()[0].desired_velocity, traces[0].kind)
    }

    #[test]
    fn nearest_image_wins_and_bounce_beats_steer() {
        let world = World::new(100.0, 100.0);
        let mut registry = ObstacleRegistry::new();
        registry.add(Box::new(Rect::new(0.0, 40.0, 20.0, 20.0)));
        registry.update_all(world.width, world.height, 0.0);

        // 35px from the obstacle, 45px from its wrapped image.
        let mut s = scene_in(world, SimParams::default(), &[(55.0, 50.0, 0.0, 0.0)]);
        let (push, kind) = push_on(&mut s, &registry);
        assert_eq!(kind, AvoidanceKind::Steer);
        assert!(push.x > 0.0);

        // 46px from the obstacle, 34px from its wrapped image.
        let mut s = scene_in(world, SimParams::default(), &[(66.0, 50.0, 0.0, 0.0)]);
        let (push, kind) = push_on(&mut s, &registry);
        assert_eq!(kind, AvoidanceKind::Steer);
        assert!(push.x < 0.0);

        // Overlapping the obstacle while the wrapped image is within vision.
        let params = SimParams {
            obstacle_radius: 100.0,
            ..SimParams::default()
        };
        let mut s = scene_in(world, params, &[(22.0, 50.0, 0.0, 0.0)]);
        s.flock.iter_mut().for_each(|b| b.render_size = 20.0);
        let (push, kind) = push_on(&mut s, &registry);
        assert_eq!(kind, AvoidanceKind::Bounce);
        assert!(push.x > 0.0);
    }

    #[test]
    fn overlapping_boids_bounce_with_zero_vision() {
        let params = SimParams {
            alignment_radius: 0.0,
            cohesion_radius: 0.0,
            separation_radius: 0.0,
            depth_radius: 0.0,
            obstacle_radius: 0.0,
            ..SimParams::default()
        };
        assert_eq!(cell_size_for(&params), 1.0);

        let mut s = scene_in(World::new(800.0, 600.0), params, &[(305.0, 200.0, 0.0, 0.0)]);
        s.flock.iter_mut().for_each(|b| b.render_size = 20.0);
        let mut registry = ObstacleRegistry::new();
        registry.add(Box::new(Rect::new(100.0, 100.0, 200.0, 200.0)));
        registry.update_all(s.world.width, s.world.height, 0.0);

        let (push, kind) = push_on(&mut s, &registry);
        assert_eq!(kind, AvoidanceKind::Bounce);
        assert!(push.x > 0.0);
    }

    #[test]
    fn far_boids_and_disabled_obstacles_are_ignored() {
        let mut s = scene(&[(600.0, 500.0, 1.0, 0.0)]);
        let mut registry = ObstacleRegistry::new();
        registry.add(Box::new(Rect::new(100.0, 100.0, 50.0, 50.0)));
        registry.add(Box::new(Rc::new(Cell::new(None::<Rect>))));
        registry.update_all(s.world.width, s.world.height, 8.0);
        assert_eq!(registry.iter_enabled().count(), 1);

        apply_obstacle_avoidance_forces(
            &mut s.flock,
            &registry,
            &s.grid,
            &s.pool,
            &s.params,
            &s.world,
            1.0,
            None,
        );
        assert_eq!(s.flock.boids()[0].desired_velocity, Vector::new(1.0, 0.0));
    }

    #[test]
    fn points_inside_obstacles_resolve_once() {
        let params = SimParams::default();
        let mut registry = ObstacleRegistry::new();
        registry.add(Box::new(Rect::new(10.0, 10.0, 300.0, 300.0)));
        registry.add(Box::new(Rect::new(500.0, 500.0, 40.0, 40.0)));
        registry.update_all(800.0, 600.0, params.obstacle_padding);

        let mut grid = SpatialGrid::new(800.0, 600.0, cell_size_for(&params));
        registry.populate(&mut grid);

        assert_eq!(registry.obstacles_at(&Vector::new(150.0, 150.0), &grid), vec![ObstacleId(0)]);
        assert_eq!(registry.obstacles_at(&Vector::new(5.0, 5.0), &grid), vec![ObstacleId(0)]);
        assert!(registry.obstacles_at(&Vector::new(400.0, 400.0), &grid).is_empty());
    }
}
