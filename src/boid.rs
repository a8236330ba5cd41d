//! A single flock member: state, steering and integration.

use std::f64::consts::TAU;

use rand::Rng;

use crate::input::Interaction;
use crate::math::{angle_difference, wrap_angle, EPSILON};
use crate::params::SimParams;
use crate::pool::VectorPool;
use crate::vector::{HasPosition, Vector, World};

pub const DEPTH_BLEND_RATE: f64 = 0.01;
pub const PHASE_SYNC_RATE: f64 = 0.02;
/// Frames (at the target frame rate) a scattered boid keeps fleeing.
pub const SCATTER_DURATION: f64 = 45.0;
/// Frames spent easing back to cruising speed after fleeing.
pub const COOLDOWN_DURATION: f64 = 60.0;
pub const SCATTER_SPEED_MULTIPLIER: f64 = 2.5;
pub const DEPTH_SPEED_FLOOR: f64 = 0.6;
pub const DEPTH_SIZE_FLOOR: f64 = 0.55;
pub const BOOST_DECAY: f64 = 0.94;
pub const SPAWN_BOOST: f64 = 4.0;
pub const MITOSIS_BOOST: f64 = 2.5;
pub const MITOSIS_JITTER: f64 = 2.0;
pub const OSCILLATION_AMPLITUDE: f64 = 0.08;
pub const FADE_DURATION_MS: f64 = 800.0;

const MOUSE_FLEE_FORCE_MULTIPLIER: f64 = 3.0;
const MIN_BOOST_SQ: f64 = 1.0e-6;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BoidId(pub u64);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScatterState {
    #[default]
    Calm,
    Fleeing,
    CoolingDown,
}

impl ScatterState {
    pub fn as_u8(self) -> u8 {
        match self {
            ScatterState::Calm => 0,
            ScatterState::Fleeing => 1,
            ScatterState::CoolingDown => 2,
        }
    }
}

/// Output of one steering pass, applied after every boid has been read.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Steering {
    pub alignment: Vector,
    pub cohesion: Vector,
    pub separation: Vector,
    pub mouse: Vector,
    pub desired_velocity: Vector,
    pub depth: f64,
    pub oscillation_phase: f64,
    pub neighbors: usize,
}

#[derive(Clone, Debug)]
pub struct Boid {
    pub id: BoidId,
    pub position: Vector,
    pub velocity: Vector,
    /// Velocity target accumulated from steering and obstacle forces.
    pub desired_velocity: Vector,
    pub boost: Vector,
    pub max_force: f64,
    pub max_speed: f64,
    /// Heading in radians, kept in `[0, 2π)`.
    pub rotation: f64,
    /// Per-boid multiplier on how quickly the heading eases.
    pub rotation_speed: f64,
    /// Relative size; the drawn size also depends on depth, oscillation and fades.
    pub size: f64,
    pub render_size: f64,
    /// Simulated z-axis in `[0, 1]`; 1 is nearest.
    pub depth: f64,
    pub oscillation_phase: f64,
    pub oscillation_speed: f64,
    scatter_state: ScatterState,
    cooldown_timer: f64,
    is_dying: bool,
    dying_start_time: f64,
    pub(crate) exit_arrived: bool,
}

impl Boid {
    /// A fresh boid released from `anchor` in a random direction.
    pub fn spawn<R: Rng + ?Sized>(
        id: BoidId,
        anchor: Vector,
        params: &SimParams,
        rng: &mut R,
    ) -> Self {
        let mut direction = Vector::ZERO;
        Vector::random_2d(rng, &mut direction);

        let mut velocity = direction;
        velocity.mult(params.max_speed * rng.random_range(0.5..1.0));
        let mut boost = direction;
        boost.mult(SPAWN_BOOST);

        let mut boid = Self {
            id,
            position: anchor,
            velocity,
            desired_velocity: velocity,
            boost,
            max_force: params.max_force,
            max_speed: params.max_speed,
            rotation: wrap_angle(velocity.heading()),
            rotation_speed: rng.random_range(0.8..1.2),
            size: rng.random_range(0.85..1.15),
            render_size: 0.0,
            depth: rng.random::<f64>(),
            oscillation_phase: rng.random::<f64>() * TAU,
            oscillation_speed: rng.random_range(0.03..0.07),
            scatter_state: ScatterState::Calm,
            cooldown_timer: 0.0,
            is_dying: false,
            dying_start_time: 0.0,
            exit_arrived: false,
        };
        boid.refresh_render_size(params, 0.0);
        boid
    }

    /// Splits a child off `parent`. Both receive equal and opposite impulses
    /// perpendicular to the parent's heading so the pair visibly separates.
    pub fn split_from<R: Rng + ?Sized>(
        parent: &mut Boid,
        id: BoidId,
        world: &World,
        params: &SimParams,
        rng: &mut R,
    ) -> Self {
        let mut jitter = Vector::ZERO;
        Vector::random_2d(rng, &mut jitter).mult(MITOSIS_JITTER);
        let mut position = parent.position;
        position.add(&jitter);
        world.wrap(&mut position);

        let mut impulse = Vector::new(-parent.velocity.y, parent.velocity.x);
        if impulse.mag_sq() <= EPSILON {
            Vector::random_2d(rng, &mut impulse);
        }
        impulse.set_mag(MITOSIS_BOOST);
        parent.boost.add(&impulse);

        let mut child_boost = impulse;
        child_boost.mult(-1.0);

        let mut child = Self {
            id,
            position,
            velocity: parent.velocity,
            desired_velocity: parent.velocity,
            boost: child_boost,
            max_force: params.max_force,
            max_speed: parent.max_speed,
            rotation: parent.rotation,
            rotation_speed: rng.random_range(0.8..1.2),
            size: rng.random_range(0.85..1.15),
            render_size: 0.0,
            depth: parent.depth,
            oscillation_phase: parent.oscillation_phase,
            oscillation_speed: rng.random_range(0.03..0.07),
            scatter_state: ScatterState::Calm,
            cooldown_timer: 0.0,
            is_dying: false,
            dying_start_time: 0.0,
            exit_arrived: false,
        };
        child.refresh_render_size(params, 0.0);
        child
    }

    /// One pass over the neighborhood accumulating alignment, cohesion,
    /// separation, depth blending and oscillation phase sync.
    ///
    /// Reads only; the caller writes the result back once every boid has
    /// been steered so the pass is order independent.
    pub fn calculate_flocking_forces<'a, I>(
        &self,
        neighbors: I,
        world: &World,
        params: &SimParams,
        pool: &VectorPool,
        interaction: &Interaction,
        time_scale: f64,
    ) -> Steering
    where
        I: IntoIterator<Item = &'a Boid>,
    {
        let mut alignment = pool.get(0.0, 0.0);
        let mut cohesion = pool.get(0.0, 0.0);
        let mut separation = pool.get(0.0, 0.0);
        let mut offset = pool.get(0.0, 0.0);
        let mut away = pool.get(0.0, 0.0);

        let mut align_count = 0usize;
        let mut cohesion_count = 0usize;
        let mut separation_count = 0usize;
        let mut depth_count = 0usize;
        let mut neighbor_count = 0usize;
        let mut depth_sum = 0.0;
        let mut phase_sin = 0.0;
        let mut phase_cos = 0.0;

        let align_sq = params.alignment_radius * params.alignment_radius;
        let cohesion_sq = params.cohesion_radius * params.cohesion_radius;
        let separation_sq = params.separation_radius * params.separation_radius;
        let depth_sq = params.depth_radius * params.depth_radius;

        for other in neighbors {
            if other.id == self.id || other.is_dying {
                continue;
            }

            offset.set_from(&world.delta(&self.position, &other.position));
            let dist_sq = offset.mag_sq();
            let mut interacted = false;

            if dist_sq < align_sq {
                alignment.add(&other.velocity);
                align_count += 1;
                interacted = true;
            }

            if dist_sq < cohesion_sq {
                // Unwrapped neighbor position: ours plus the short-way offset.
                cohesion.add(&self.position).add(&offset);
                cohesion_count += 1;
                interacted = true;
            }

            if dist_sq < separation_sq && dist_sq > 0.0 {
                let dist = dist_sq.sqrt();
                away.set_from(&offset)
                    .mult(-1.0)
                    .div(dist)
                    .mult(1.0 - dist / params.separation_radius);
                separation.add(&away);
                separation_count += 1;
                interacted = true;
            }

            if dist_sq < depth_sq {
                depth_sum += other.depth;
                phase_sin += other.oscillation_phase.sin();
                phase_cos += other.oscillation_phase.cos();
                depth_count += 1;
                interacted = true;
            }

            if interacted {
                neighbor_count += 1;
            }
        }

        if align_count > 0 {
            alignment
                .div(align_count as f64)
                .set_mag(self.max_speed)
                .sub(&self.velocity)
                .limit(self.max_force);
        }

        if cohesion_count > 0 {
            cohesion
                .div(cohesion_count as f64)
                .sub(&self.position)
                .set_mag(self.max_speed)
                .sub(&self.velocity)
                .limit(self.max_force);
        }

        if separation_count > 0 {
            separation.limit(self.max_force);
        }

        let mut depth = self.depth;
        let mut oscillation_phase = self.oscillation_phase;
        if depth_count > 0 {
            let local_depth = depth_sum / depth_count as f64;
            depth = (depth + (local_depth - depth) * DEPTH_BLEND_RATE).clamp(0.0, 1.0);

            let consensus = phase_sin.atan2(phase_cos);
            let drift = angle_difference(oscillation_phase, consensus);
            oscillation_phase =
                wrap_angle(oscillation_phase + drift * PHASE_SYNC_RATE * time_scale);
        }

        let mouse = self.mouse_attraction(interaction, params, pool);

        let mut desired = pool.get(self.velocity.x, self.velocity.y);
        let mut total = pool.get(0.0, 0.0);
        total.add(Vector::new(alignment.x, alignment.y).mult(params.alignment_force));
        total.add(Vector::new(cohesion.x, cohesion.y).mult(params.cohesion_force));
        total.add(Vector::new(separation.x, separation.y).mult(params.separation_force));
        total.add(&mouse);
        desired.add(total.mult(time_scale));

        Steering {
            alignment: *alignment,
            cohesion: *cohesion,
            separation: *separation,
            mouse,
            desired_velocity: *desired,
            depth,
            oscillation_phase,
            neighbors: neighbor_count,
        }
    }

    /// Flee the pointer while scattered, otherwise drift toward it with a
    /// pull that fades linearly to zero at the influence radius.
    pub fn mouse_attraction(
        &self,
        interaction: &Interaction,
        params: &SimParams,
        pool: &VectorPool,
    ) -> Vector {
        if !interaction.active || params.mouse_radius <= 0.0 {
            return Vector::ZERO;
        }

        let mut toward = pool.get(0.0, 0.0);
        Vector::sub_into(&interaction.mouse, &self.position, &mut toward);
        let dist = toward.mag();
        if dist >= params.mouse_radius {
            return Vector::ZERO;
        }

        let mut force = pool.get(toward.x, toward.y);
        if self.scatter_state == ScatterState::Fleeing {
            force
                .mult(-1.0)
                .set_mag(self.max_speed)
                .sub(&self.velocity)
                .limit(self.max_force * MOUSE_FLEE_FORCE_MULTIPLIER);
        } else {
            let strength = 1.0 - dist / params.mouse_radius;
            force
                .set_mag(self.max_speed * strength)
                .sub(&self.velocity)
                .limit(self.max_force);
        }
        force.mult(params.mouse_force);
        *force
    }

    pub fn apply_steering(&mut self, steering: &Steering) {
        self.desired_velocity = steering.desired_velocity;
        self.depth = steering.depth.clamp(0.0, 1.0);
        self.oscillation_phase = steering.oscillation_phase;
    }

    /// Blends toward the desired velocity, clamps speed, adds the decaying
    /// boost, then moves and wraps.
    pub fn apply_forces_and_move(&mut self, world: &World, params: &SimParams, time_scale: f64) {
        if !self.is_dying {
            let keep = params.velocity_inertia.powf(time_scale);
            self.velocity.mult(keep);
            let mut pull = self.desired_velocity;
            pull.mult(1.0 - keep);
            self.velocity.add(&pull);
        }

        self.update_scatter_state(time_scale);
        self.max_force = params.max_force;
        self.max_speed = self.current_max_speed(params);
        self.velocity.limit(self.max_speed);

        // Boost may push the instantaneous speed past the cap.
        if self.boost.mag_sq() > 0.0 {
            self.velocity.add(&self.boost);
            self.boost.mult(BOOST_DECAY.powf(time_scale));
            if self.boost.mag_sq() < MIN_BOOST_SQ {
                self.boost = Vector::ZERO;
            }
        }

        let mut step = self.velocity;
        step.mult(time_scale);
        self.position.add(&step);
        world.wrap(&mut self.position);

        if self.velocity.mag_sq() > EPSILON {
            let turn = angle_difference(self.rotation, self.velocity.heading());
            let ease =
                ((1.0 - params.rotation_inertia.powf(time_scale)) * self.rotation_speed).min(1.0);
            self.rotation = wrap_angle(self.rotation + turn * ease);
        }

        self.oscillation_phase =
            wrap_angle(self.oscillation_phase + self.oscillation_speed * time_scale);
        self.desired_velocity = self.velocity;
    }

    pub fn scatter(&mut self) {
        self.scatter_state = ScatterState::Fleeing;
        self.cooldown_timer = SCATTER_DURATION;
    }

    pub fn update_scatter_state(&mut self, time_scale: f64) {
        match self.scatter_state {
            ScatterState::Calm => {}
            ScatterState::Fleeing => {
                self.cooldown_timer -= time_scale;
                if self.cooldown_timer <= 0.0 {
                    self.scatter_state = ScatterState::CoolingDown;
                    self.cooldown_timer = COOLDOWN_DURATION;
                }
            }
            ScatterState::CoolingDown => {
                self.cooldown_timer -= time_scale;
                if self.cooldown_timer <= 0.0 {
                    self.scatter_state = ScatterState::Calm;
                    self.cooldown_timer = 0.0;
                }
            }
        }
    }

    /// Cruising speed scales with depth; fleeing multiplies it, and cooling
    /// down blends back from the fleeing speed.
    pub fn current_max_speed(&self, params: &SimParams) -> f64 {
        let base = params.max_speed * (DEPTH_SPEED_FLOOR + (1.0 - DEPTH_SPEED_FLOOR) * self.depth);
        let fleeing = base * SCATTER_SPEED_MULTIPLIER;
        match self.scatter_state {
            ScatterState::Calm => base,
            ScatterState::Fleeing => fleeing,
            ScatterState::CoolingDown => {
                let remaining = (self.cooldown_timer / COOLDOWN_DURATION).clamp(0.0, 1.0);
                base + (fleeing - base) * remaining
            }
        }
    }

    pub fn depth_scale(&self) -> f64 {
        DEPTH_SIZE_FLOOR + (1.0 - DEPTH_SIZE_FLOOR) * self.depth
    }

    pub fn refresh_render_size(&mut self, params: &SimParams, now: f64) {
        let breathing = 1.0 + OSCILLATION_AMPLITUDE * self.oscillation_phase.sin();
        self.render_size =
            params.boid_size * self.size * self.depth_scale() * breathing * self.fade(now);
    }

    pub fn start_dying(&mut self, now: f64) {
        if !self.is_dying {
            self.is_dying = true;
            self.dying_start_time = now;
        }
    }

    /// Opacity: 1 while alive, easing linearly to 0 over the fade.
    pub fn fade(&self, now: f64) -> f64 {
        if !self.is_dying {
            return 1.0;
        }
        (1.0 - (now - self.dying_start_time) / FADE_DURATION_MS).clamp(0.0, 1.0)
    }

    pub fn is_faded(&self, now: f64) -> bool {
        self.is_dying && now - self.dying_start_time >= FADE_DURATION_MS
    }

    pub fn is_dying(&self) -> bool {
        self.is_dying
    }

    pub fn scatter_state(&self) -> ScatterState {
        self.scatter_state
    }
}

impl HasPosition for Boid {
    fn position(&self) -> &Vector {
        &self.position
    }
}
