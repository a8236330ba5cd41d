//! The per-frame orchestrator: owns the flock, grids, obstacles, pool and
//! input state, and applies commands between frames.

use rand_chacha::ChaCha8Rng;

use crate::boid::{BoidId, Steering};
use crate::command::Command;
use crate::flock::{Flock, FlockSize, MAX_FLOCK_SIZE, MIN_BOIDS};
use crate::input::{InputEvent, InputHandler};
use crate::obstacle::{
    apply_obstacle_avoidance_forces, AvoidanceTrace, ObstacleId, ObstacleRegistry, ObstacleSource,
};
use crate::params::{DebugFlags, SimParams};
use crate::pool::{VectorPool, PEAK_VECTORS_PER_BOID};
use crate::render::{Renderer, Surface};
use crate::rng::create_rng;
use crate::spatial_grid::{cell_size_for, SpatialGrid};
use crate::vector::{Vector, World};

pub const TARGET_FPS: f64 = 60.0;
pub const MAX_FRAME_DELTA_MS: f64 = 100.0;
pub const EXIT_DURATION_MS: f64 = 1_200.0;
/// Fraction of the remaining distance to the anchor covered per frame.
pub const EXIT_LERP: f64 = 0.1;
pub const EXIT_SNAP_DISTANCE: f64 = 4.0;
pub const EXIT_SNAP_PROGRESS: f64 = 0.85;

const NOMINAL_FRAME_MS: f64 = 1_000.0 / TARGET_FPS;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    /// Schedule another frame.
    Continue,
    /// The exit animation completed; stop scheduling.
    Finished,
    /// The simulation is not running.
    Stopped,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum RunState {
    Stopped,
    Running,
    Exiting { started_at: f64 },
    Finished,
}

pub struct Simulation {
    world: World,
    params: SimParams,
    debug: DebugFlags,
    anchor: Vector,
    flock: Flock,
    boid_grid: SpatialGrid<BoidId>,
    obstacle_grid: SpatialGrid<ObstacleId>,
    obstacles: ObstacleRegistry,
    pool: VectorPool,
    input: InputHandler,
    renderer: Renderer,
    rng: ChaCha8Rng,
    state: RunState,
    exit_requested: bool,
    last_frame: Option<f64>,
    steering: Vec<(BoidId, Steering)>,
    neighbor_ids: Vec<BoidId>,
    traces: Vec<AvoidanceTrace>,
}

impl Simulation {
    pub fn new(width: f64, height: f64, mut params: SimParams, seed: u64) -> Self {
        params.sanitize();
        let world = World::new(width.max(1.0), height.max(1.0));
        let cell_size = cell_size_for(&params);

        Self {
            world,
            anchor: world.center(),
            flock: Flock::new(),
            boid_grid: SpatialGrid::new(world.width, world.height, cell_size),
            obstacle_grid: SpatialGrid::new(world.width, world.height, cell_size),
            obstacles: ObstacleRegistry::new(),
            pool: VectorPool::for_flock(MAX_FLOCK_SIZE, PEAK_VECTORS_PER_BOID),
            input: InputHandler::new(),
            renderer: Renderer::new(),
            rng: create_rng(seed),
            params,
            debug: DebugFlags::default(),
            state: RunState::Stopped,
            exit_requested: false,
            last_frame: None,
            steering: Vec::new(),
            neighbor_ids: Vec::new(),
            traces: Vec::new(),
        }
    }

    /// Starts (or resumes) the loop. An empty flock is seeded at the anchor
    /// and grows toward its target by mitosis.
    pub fn start(&mut self, now: f64) {
        if matches!(self.state, RunState::Running | RunState::Exiting { .. }) {
            return;
        }

        if self.state == RunState::Finished {
            self.flock.clear();
        }
        if self.flock.is_empty() {
            let count = self.target_size().min(MIN_BOIDS);
            self.flock.seed(count, self.anchor, &self.params, &mut self.rng);
        }

        self.state = RunState::Running;
        self.exit_requested = false;
        self.last_frame = None;
        log::info!(
            "flock started at {:.0}ms: {} boids on {}x{}",
            now,
            self.flock.total_count(),
            self.world.width,
            self.world.height
        );
    }

    pub fn stop(&mut self) {
        if self.state != RunState::Stopped {
            log::info!("flock stopped");
        }
        self.state = RunState::Stopped;
    }

    /// Starts the one-shot exit animation: every boid converges on the
    /// anchor and shrinks away.
    pub fn begin_exit(&mut self, now: f64) {
        if self.state == RunState::Running {
            self.state = RunState::Exiting { started_at: now };
            log::info!("flock exit animation started");
        }
        self.exit_requested = false;
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.world = World::new(width.max(1.0), height.max(1.0));
        self.boid_grid.resize(self.world.width, self.world.height);
        self.obstacle_grid.resize(self.world.width, self.world.height);
        self.refresh_obstacles();
        for boid in self.flock.iter_mut() {
            self.world.wrap(&mut boid.position);
        }
    }

    pub fn add_obstacle(&mut self, source: Box<dyn ObstacleSource>) -> ObstacleId {
        let id = self.obstacles.add(source);
        self.refresh_obstacles();
        id
    }

    pub fn apply(&mut self, command: Command) {
        match command {
            Command::ReplaceParams(params) => {
                self.params = params;
                self.params.sanitize();
                self.refresh_cell_size();
            }
            Command::SetParam { key, value } => {
                self.params.set(key, value);
                if key.affects_cell_size() {
                    self.refresh_cell_size();
                }
            }
            Command::SetDebug { flag, enabled } => self.debug.set(flag, enabled),
            Command::Resize { width, height } => self.resize(width, height),
            Command::SetAnchor(anchor) => self.anchor = anchor,
            Command::SetFlockSize(size) => {
                self.params.flock_size = match size {
                    FlockSize::Responsive => 0,
                    FlockSize::Manual(n) => n,
                };
                self.params.sanitize();
            }
            Command::BeginExit => self.exit_requested = true,
            Command::RefreshObstacles => self.refresh_obstacles(),
        }
    }

    pub fn handle_input(&mut self, event: InputEvent) {
        if let Some(command) = self.input.handle(event) {
            self.apply(command);
        }
    }

    /// Runs one frame at host time `now` (milliseconds) and draws it.
    pub fn frame<S: Surface + ?Sized>(&mut self, now: f64, surface: &mut S) -> FrameStatus {
        match self.state {
            RunState::Stopped => return FrameStatus::Stopped,
            RunState::Finished => return FrameStatus::Finished,
            RunState::Running | RunState::Exiting { .. } => {}
        }
        if self.exit_requested {
            self.begin_exit(now);
        }

        let time_scale = frame_time_scale(self.last_frame, now);
        self.last_frame = Some(now);

        self.input.tick(now);
        self.obstacles
            .update_all(self.world.width, self.world.height, self.params.obstacle_padding);
        self.obstacles.populate(&mut self.obstacle_grid);

        self.renderer.begin_frame(surface, &self.world, &self.params);
        self.draw_overlays(surface);

        self.flock.cleanup(now);

        if let RunState::Exiting { started_at } = self.state {
            let progress = ((now - started_at) / EXIT_DURATION_MS).clamp(0.0, 1.0);
            self.exit_step(progress, time_scale, now, surface);
            if progress >= 1.0 {
                self.state = RunState::Finished;
                log::info!("flock exit animation finished");
                return FrameStatus::Finished;
            }
            return FrameStatus::Continue;
        }

        let target = self.target_size();
        self.flock.adjust_to_target_size(
            target,
            self.anchor,
            &self.world,
            &self.params,
            &self.boid_grid,
            &mut self.rng,
            now,
        );
        self.populate_boid_grid();
        self.scatter_from_input();

        self.steer_flock(time_scale);
        self.traces.clear();
        apply_obstacle_avoidance_forces(
            &mut self.flock,
            &self.obstacles,
            &self.boid_grid,
            &self.pool,
            &self.params,
            &self.world,
            time_scale,
            self.debug.obstacles.then_some(&mut self.traces),
        );
        if self.debug.neighbors {
            self.renderer.draw_neighbor_lines(
                surface,
                &self.flock,
                &self.boid_grid,
                &self.world,
                &self.params,
            );
        }

        for boid in self.flock.iter_mut() {
            boid.apply_forces_and_move(&self.world, &self.params, time_scale);
            boid.refresh_render_size(&self.params, now);
            let alpha = boid.fade(now);
            self.renderer.draw_boid(surface, boid, &self.world, alpha);
        }

        FrameStatus::Continue
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn params(&self) -> &SimParams {
        &self.params
    }

    pub fn debug(&self) -> &DebugFlags {
        &self.debug
    }

    pub fn flock(&self) -> &Flock {
        &self.flock
    }

    pub fn pool(&self) -> &VectorPool {
        &self.pool
    }

    pub fn anchor(&self) -> Vector {
        self.anchor
    }

    pub fn cell_size(&self) -> f64 {
        self.boid_grid.cell_size()
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, RunState::Running | RunState::Exiting { .. })
    }

    pub fn is_exiting(&self) -> bool {
        matches!(self.state, RunState::Exiting { .. })
    }

    pub fn target_size(&self) -> usize {
        self.params.flock_size().target(&self.world)
    }

    fn refresh_cell_size(&mut self) {
        let cell_size = cell_size_for(&self.params);
        if cell_size != self.boid_grid.cell_size() {
            self.boid_grid.set_cell_size(cell_size);
            self.obstacle_grid.set_cell_size(cell_size);
            self.obstacles.populate(&mut self.obstacle_grid);
            log::debug!("grid cell size now {}", cell_size);
        }
    }

    fn refresh_obstacles(&mut self) {
        self.obstacles
            .update_all(self.world.width, self.world.height, self.params.obstacle_padding);
        self.obstacles.populate(&mut self.obstacle_grid);
    }

    fn populate_boid_grid(&mut self) {
        self.boid_grid.clear();
        for boid in self.flock.iter().filter(|b| !b.is_dying()) {
            self.boid_grid.add_item_at_point(boid.id, boid);
        }
    }

    /// Presses on page UI that doubles as an obstacle do not scatter.
    fn scatter_from_input(&mut self) {
        let Some(origin) = self.input.take_scatter() else {
            return;
        };
        if !self.obstacles.obstacles_at(&origin, &self.obstacle_grid).is_empty() {
            return;
        }

        let radius_sq = self.params.scatter_radius * self.params.scatter_radius;
        for boid in self.flock.iter_mut().filter(|b| !b.is_dying()) {
            if self.world.distance_sq(&origin, &boid.position) <= radius_sq {
                boid.scatter();
            }
        }
    }

    fn steer_flock(&mut self, time_scale: f64) {
        let interaction = self.input.interaction();
        self.steering.clear();

        for boid in self.flock.iter() {
            if boid.is_dying() {
                continue;
            }

            self.neighbor_ids.clear();
            self.boid_grid
                .for_each_in_neighborhood(&boid.position, |id| self.neighbor_ids.push(id));

            let flock = &self.flock;
            let steering = boid.calculate_flocking_forces(
                self.neighbor_ids.iter().filter_map(|id| flock.get(*id)),
                &self.world,
                &self.params,
                &self.pool,
                &interaction,
                time_scale,
            );
            self.steering.push((boid.id, steering));
        }

        for (id, steering) in &self.steering {
            if let Some(boid) = self.flock.get_mut(*id) {
                boid.apply_steering(steering);
            }
        }
    }

    fn exit_step<S: Surface + ?Sized>(
        &mut self,
        progress: f64,
        time_scale: f64,
        now: f64,
        surface: &mut S,
    ) {
        let lerp = 1.0 - (1.0 - EXIT_LERP).powf(time_scale);
        let anchor = self.anchor;

        for boid in self.flock.iter_mut() {
            if !boid.exit_arrived {
                boid.position.x += (anchor.x - boid.position.x) * lerp;
                boid.position.y += (anchor.y - boid.position.y) * lerp;
                let snap_sq = EXIT_SNAP_DISTANCE * EXIT_SNAP_DISTANCE;
                let close = boid.position.dist_sq(&anchor) <= snap_sq;
                if progress >= EXIT_SNAP_PROGRESS && close {
                    boid.position = anchor;
                    boid.exit_arrived = true;
                }
            }

            boid.refresh_render_size(&self.params, now);
            boid.render_size *= 1.0 - progress;
            let alpha = boid.fade(now);
            self.renderer.draw_boid(surface, boid, &self.world, alpha);
        }
    }

    fn draw_overlays<S: Surface + ?Sized>(&mut self, surface: &mut S) {
        if self.debug.grid {
            self.renderer.draw_grid(surface, &self.boid_grid, &self.world);
        }
        if self.debug.obstacles {
            self.renderer.draw_obstacles(surface, &self.obstacles, &self.traces);
        }
        if self.debug.vision {
            self.renderer.draw_vision(surface, &self.flock, &self.params);
        }
    }
}

/// Frame delta as a multiple of the nominal frame. The first frame after a
/// start runs at exactly 1; stalls clamp to `MAX_FRAME_DELTA_MS`.
fn frame_time_scale(last_frame: Option<f64>, now: f64) -> f64 {
    let delta = match last_frame {
        Some(last) => (now - last).clamp(0.0, MAX_FRAME_DELTA_MS),
        None => NOMINAL_FRAME_MS,
    };
    delta / 1_000.0 * TARGET_FPS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boid::{ScatterState, MITOSIS_BOOST, SPAWN_BOOST};
    use crate::params::{DebugFlag, ParamKey};
    use crate::render::testing::{DrawOp, RecordingSurface};
    use crate::render::NEIGHBOR_STROKE;
    use crate::vector::Rect;
    use std::cell::Cell;
    use std::rc::Rc;

    fn running(width: f64, height: f64, flock_size: usize) -> Simulation {
        let params = SimParams {
            flock_size,
            ..SimParams::default()
        };
        let mut sim = Simulation::new(width, height, params, 7);
        sim.start(0.0);
        sim
    }

    fn run_frames(sim: &mut Simulation, from: f64, frames: usize) -> f64 {
        let mut surface = RecordingSurface::default();
        let mut now = from;
        for _ in 0..frames {
            now += NOMINAL_FRAME_MS;
            sim.frame(now, &mut surface);
        }
        now
    }

    #[test]
    fn start_seeds_at_the_anchor_and_grows_to_target() {
        let mut sim = running(800.0, 600.0, 30);
        assert_eq!(sim.flock().total_count(), MIN_BOIDS);
        assert!(sim.flock().iter().all(|b| b.position == sim.anchor()));

        run_frames(&mut sim, 0.0, 20);
        assert_eq!(sim.flock().living_count(), 30);
        assert_eq!(sim.pool().stats().outstanding(), 0);
    }

    #[test]
    fn frames_draw_background_then_every_boid() {
        let mut sim = running(800.0, 600.0, 12);
        let mut surface = RecordingSurface::default();
        assert_eq!(sim.frame(16.0, &mut surface), FrameStatus::Continue);

        assert!(matches!(surface.ops[0], DrawOp::Clear { .. }));
        assert!(surface.boids() >= 12);
        assert!(sim.flock().iter().all(|b| b.position.is_finite()));
    }

    #[test]
    fn long_pauses_are_clamped_to_the_max_delta() {
        let mut sim = running(800.0, 600.0, 12);
        let mut surface = RecordingSurface::default();
        sim.frame(1_000.0, &mut surface);
        let before: Vec<Vector> = sim.flock().iter().map(|b| b.position).collect();

        sim.frame(60_000.0, &mut surface);
        let limit = MAX_FRAME_DELTA_MS / 1_000.0 * TARGET_FPS;
        for (boid, start) in sim.flock().iter().zip(before) {
            let moved = sim.world().distance_sq(&start, &boid.position).sqrt();
            let speed_cap = boid.max_speed + SPAWN_BOOST + 4.0 * MITOSIS_BOOST;
            assert!(moved <= speed_cap * limit);
        }
    }

    #[test]
    fn time_scale_follows_the_frame_delta() {
        assert!((frame_time_scale(None, 5_000.0) - 1.0).abs() < 1.0e-12);
        assert!((frame_time_scale(Some(0.0), 1_000.0 / 30.0) - 2.0).abs() < 1.0e-12);
        assert!((frame_time_scale(Some(0.0), 60_000.0) - 6.0).abs() < 1.0e-12);
        assert_eq!(frame_time_scale(Some(100.0), 90.0), 0.0);
    }

    #[test]
    fn slow_frames_move_boids_proportionally_further() {
        let sim = running(800.0, 600.0, 12);
        let params = SimParams::default();
        let mut boid = sim.flock().boids()[0].clone();
        boid.position = Vector::new(100.0, 100.0);
        boid.velocity = Vector::new(1.0, 0.5);
        boid.desired_velocity = boid.velocity;
        boid.boost = Vector::ZERO;

        let displacement = |time_scale: f64| {
            let mut b = boid.clone();
            b.apply_forces_and_move(sim.world(), &params, time_scale);
            sim.world().distance_sq(&boid.position, &b.position).sqrt()
        };

        let at_60 = displacement(frame_time_scale(Some(0.0), 1_000.0 / 60.0));
        let at_30 = displacement(frame_time_scale(Some(0.0), 1_000.0 / 30.0));
        assert!((at_60 - boid.velocity.mag()).abs() < 1.0e-9);
        assert!((at_30 - 2.0 * at_60).abs() < 1.0e-9);
    }

    #[test]
    fn exit_animation_finishes_at_the_anchor() {
        let mut sim = running(800.0, 600.0, 12);
        let mut surface = RecordingSurface::default();
        let now = run_frames(&mut sim, 0.0, 30);

        sim.apply(Command::BeginExit);
        assert_eq!(sim.frame(now + 16.0, &mut surface), FrameStatus::Continue);
        assert!(sim.is_exiting());

        let mut t = now + 16.0;
        let status = loop {
            t += NOMINAL_FRAME_MS;
            let status = sim.frame(t, &mut surface);
            if status != FrameStatus::Continue {
                break status;
            }
        };
        assert_eq!(status, FrameStatus::Finished);
        assert!(sim.flock().iter().all(|b| b.position == sim.anchor()));
        assert!(sim.flock().iter().all(|b| b.render_size == 0.0));
        assert_eq!(sim.frame(t + 16.0, &mut surface), FrameStatus::Finished);
    }

    #[test]
    fn stopped_simulations_do_not_draw() {
        let mut sim = running(800.0, 600.0, 12);
        sim.stop();
        let mut surface = RecordingSurface::default();
        assert_eq!(sim.frame(16.0, &mut surface), FrameStatus::Stopped);
        assert!(surface.ops.is_empty());
    }

    #[test]
    fn radius_changes_rebuild_the_grid() {
        let mut sim = running(800.0, 600.0, 12);
        assert_eq!(sim.cell_size(), 60.0);

        sim.apply(Command::SetParam {
            key: ParamKey::CohesionRadius,
            value: 95.0,
        });
        assert_eq!(sim.cell_size(), 95.0);
        assert_eq!(sim.params().cohesion_radius, 95.0);

        sim.apply(Command::SetParam {
            key: ParamKey::MouseRadius,
            value: 300.0,
        });
        assert_eq!(sim.cell_size(), 95.0);

        sim.apply(Command::ReplaceParams(SimParams::default()));
        assert_eq!(sim.cell_size(), 60.0);
    }

    #[test]
    fn presses_scatter_nearby_boids_unless_on_an_obstacle() {
        let mut sim = running(800.0, 600.0, 12);
        let anchor = sim.anchor();
        let source: Rc<Cell<Option<Rect>>> =
            Rc::new(Cell::new(Some(Rect::new(anchor.x - 40.0, anchor.y - 40.0, 80.0, 80.0))));
        sim.add_obstacle(Box::new(source.clone()));
        let mut surface = RecordingSurface::default();
        sim.frame(16.0, &mut surface);

        sim.handle_input(InputEvent::PointerDown { x: anchor.x, y: anchor.y });
        sim.handle_input(InputEvent::PointerUp);
        sim.frame(32.0, &mut surface);
        assert!(sim.flock().iter().all(|b| b.scatter_state() == ScatterState::Calm));

        sim.handle_input(InputEvent::PointerDown { x: anchor.x + 450.0, y: anchor.y });
        sim.handle_input(InputEvent::PointerUp);
        sim.frame(48.0, &mut surface);
        assert!(sim.flock().iter().all(|b| b.scatter_state() == ScatterState::Calm));

        source.set(None);
        sim.handle_input(InputEvent::PointerDown { x: anchor.x, y: anchor.y });
        sim.handle_input(InputEvent::PointerUp);
        sim.frame(64.0, &mut surface);
        assert_eq!(sim.flock().total_count(), MIN_BOIDS);
        assert!(sim.flock().iter().all(|b| b.scatter_state() == ScatterState::Fleeing));
    }

    #[test]
    fn neighbor_overlay_follows_the_debug_flag() {
        let mut sim = running(800.0, 600.0, 12);
        let mut surface = RecordingSurface::default();
        sim.frame(16.0, &mut surface);
        assert_eq!(surface.lines(NEIGHBOR_STROKE.color), 0);

        sim.apply(Command::SetDebug {
            flag: DebugFlag::Neighbors,
            enabled: true,
        });
        assert!(sim.debug().neighbors);
        let mut surface = RecordingSurface::default();
        sim.frame(32.0, &mut surface);
        assert!(surface.lines(NEIGHBOR_STROKE.color) > 0);
    }

    #[test]
    fn manual_flock_size_shrinks_with_fades() {
        let mut sim = running(800.0, 600.0, 20);
        let now = run_frames(&mut sim, 0.0, 10);
        assert_eq!(sim.flock().living_count(), 20);

        sim.apply(Command::SetFlockSize(FlockSize::Manual(14)));
        let now = run_frames(&mut sim, now, 3);
        assert_eq!(sim.flock().living_count(), 14);
        assert_eq!(sim.flock().total_count(), 20);

        run_frames(&mut sim, now, 60);
        assert_eq!(sim.flock().total_count(), 14);
    }
}
