use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::flock::{FlockSize, MAX_FLOCK_SIZE};
use crate::math::clamp_finite;

pub const MAX_RADIUS: f64 = 400.0;
pub const MAX_WEIGHT: f64 = 10.0;

/// Tunable simulation parameters shared with the settings menu.
///
/// The page owns the values; the simulation keeps a sanitized snapshot and
/// refreshes it on every parameter-change notification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SimParams {
    pub alignment_force: f64,
    pub cohesion_force: f64,
    pub separation_force: f64,
    pub alignment_radius: f64,
    pub cohesion_radius: f64,
    pub separation_radius: f64,
    /// Radius for depth blending and oscillation phase sync.
    pub depth_radius: f64,
    /// Vision radius around obstacles.
    pub obstacle_radius: f64,
    pub obstacle_padding: f64,
    pub obstacle_force: f64,
    pub bounce_multiplier: f64,
    pub mouse_radius: f64,
    pub mouse_force: f64,
    pub scatter_radius: f64,
    pub max_speed: f64,
    pub max_force: f64,
    pub velocity_inertia: f64,
    pub rotation_inertia: f64,
    pub boid_size: f64,
    /// Opacity of the background wash drawn each frame (lower = longer trails).
    pub background_alpha: f64,
    /// Target living boids; `0` sizes the flock from the canvas area.
    pub flock_size: usize,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            alignment_force: 1.0,
            cohesion_force: 0.6,
            separation_force: 1.6,
            alignment_radius: 50.0,
            cohesion_radius: 60.0,
            separation_radius: 24.0,
            depth_radius: 60.0,
            obstacle_radius: 60.0,
            obstacle_padding: 8.0,
            obstacle_force: 1.0,
            bounce_multiplier: 2.0,
            mouse_radius: 150.0,
            mouse_force: 1.0,
            scatter_radius: 120.0,
            max_speed: 2.2,
            max_force: 0.2,
            velocity_inertia: 0.85,
            rotation_inertia: 0.85,
            boid_size: 18.0,
            background_alpha: 0.35,
            flock_size: 0,
        }
    }
}

impl SimParams {
    pub fn from_json(json: &str) -> Result<Self, SimError> {
        let mut params: SimParams = serde_json::from_str(json)?;
        params.sanitize();
        Ok(params)
    }

    pub fn sanitize(&mut self) {
        let defaults = SimParams::default();
        self.alignment_force =
            clamp_finite(self.alignment_force, 0.0, MAX_WEIGHT, defaults.alignment_force);
        self.cohesion_force =
            clamp_finite(self.cohesion_force, 0.0, MAX_WEIGHT, defaults.cohesion_force);
        self.separation_force =
            clamp_finite(self.separation_force, 0.0, MAX_WEIGHT, defaults.separation_force);
        self.alignment_radius =
            clamp_finite(self.alignment_radius, 0.0, MAX_RADIUS, defaults.alignment_radius);
        self.cohesion_radius =
            clamp_finite(self.cohesion_radius, 0.0, MAX_RADIUS, defaults.cohesion_radius);
        self.separation_radius =
            clamp_finite(self.separation_radius, 0.0, MAX_RADIUS, defaults.separation_radius);
        self.depth_radius = clamp_finite(self.depth_radius, 0.0, MAX_RADIUS, defaults.depth_radius);
        self.obstacle_radius =
            clamp_finite(self.obstacle_radius, 0.0, MAX_RADIUS, defaults.obstacle_radius);
        self.obstacle_padding =
            clamp_finite(self.obstacle_padding, 0.0, MAX_RADIUS, defaults.obstacle_padding);
        self.obstacle_force =
            clamp_finite(self.obstacle_force, 0.0, MAX_WEIGHT, defaults.obstacle_force);
        self.bounce_multiplier =
            clamp_finite(self.bounce_multiplier, 0.0, MAX_WEIGHT, defaults.bounce_multiplier);
        self.mouse_radius = clamp_finite(self.mouse_radius, 0.0, 2_000.0, defaults.mouse_radius);
        self.mouse_force = clamp_finite(self.mouse_force, 0.0, MAX_WEIGHT, defaults.mouse_force);
        self.scatter_radius =
            clamp_finite(self.scatter_radius, 0.0, 2_000.0, defaults.scatter_radius);
        self.max_speed = clamp_finite(self.max_speed, 0.1, 40.0, defaults.max_speed);
        self.max_force = clamp_finite(self.max_force, 0.001, 10.0, defaults.max_force);
        self.velocity_inertia =
            clamp_finite(self.velocity_inertia, 0.0, 0.999, defaults.velocity_inertia);
        self.rotation_inertia =
            clamp_finite(self.rotation_inertia, 0.0, 0.999, defaults.rotation_inertia);
        self.boid_size = clamp_finite(self.boid_size, 2.0, 128.0, defaults.boid_size);
        self.background_alpha =
            clamp_finite(self.background_alpha, 0.0, 1.0, defaults.background_alpha);
        self.flock_size = self.flock_size.min(MAX_FLOCK_SIZE);
    }

    pub fn flock_size(&self) -> FlockSize {
        match self.flock_size {
            0 => FlockSize::Responsive,
            n => FlockSize::Manual(n),
        }
    }

    pub fn get(&self, key: ParamKey) -> f64 {
        match key {
            ParamKey::AlignmentForce => self.alignment_force,
            ParamKey::CohesionForce => self.cohesion_force,
            ParamKey::SeparationForce => self.separation_force,
            ParamKey::AlignmentRadius => self.alignment_radius,
            ParamKey::CohesionRadius => self.cohesion_radius,
            ParamKey::SeparationRadius => self.separation_radius,
            ParamKey::DepthRadius => self.depth_radius,
            ParamKey::ObstacleRadius => self.obstacle_radius,
            ParamKey::ObstaclePadding => self.obstacle_padding,
            ParamKey::ObstacleForce => self.obstacle_force,
            ParamKey::BounceMultiplier => self.bounce_multiplier,
            ParamKey::MouseRadius => self.mouse_radius,
            ParamKey::MouseForce => self.mouse_force,
            ParamKey::ScatterRadius => self.scatter_radius,
            ParamKey::MaxSpeed => self.max_speed,
            ParamKey::MaxForce => self.max_force,
            ParamKey::VelocityInertia => self.velocity_inertia,
            ParamKey::RotationInertia => self.rotation_inertia,
            ParamKey::BoidSize => self.boid_size,
            ParamKey::BackgroundAlpha => self.background_alpha,
            ParamKey::FlockSize => self.flock_size as f64,
        }
    }

    /// Writes one field and re-sanitizes the snapshot.
    pub fn set(&mut self, key: ParamKey, value: f64) {
        let slot = match key {
            ParamKey::AlignmentForce => &mut self.alignment_force,
            ParamKey::CohesionForce => &mut self.cohesion_force,
            ParamKey::SeparationForce => &mut self.separation_force,
            ParamKey::AlignmentRadius => &mut self.alignment_radius,
            ParamKey::CohesionRadius => &mut self.cohesion_radius,
            ParamKey::SeparationRadius => &mut self.separation_radius,
            ParamKey::DepthRadius => &mut self.depth_radius,
            ParamKey::ObstacleRadius => &mut self.obstacle_radius,
            ParamKey::ObstaclePadding => &mut self.obstacle_padding,
            ParamKey::ObstacleForce => &mut self.obstacle_force,
            ParamKey::BounceMultiplier => &mut self.bounce_multiplier,
            ParamKey::MouseRadius => &mut self.mouse_radius,
            ParamKey::MouseForce => &mut self.mouse_force,
            ParamKey::ScatterRadius => &mut self.scatter_radius,
            ParamKey::MaxSpeed => &mut self.max_speed,
            ParamKey::MaxForce => &mut self.max_force,
            ParamKey::VelocityInertia => &mut self.velocity_inertia,
            ParamKey::RotationInertia => &mut self.rotation_inertia,
            ParamKey::BoidSize => &mut self.boid_size,
            ParamKey::BackgroundAlpha => &mut self.background_alpha,
            ParamKey::FlockSize => {
                self.flock_size = if value.is_finite() && value > 0.0 {
                    value.round() as usize
                } else {
                    0
                };
                self.sanitize();
                return;
            }
        };
        *slot = value;
        self.sanitize();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParamKey {
    AlignmentForce,
    CohesionForce,
    SeparationForce,
    AlignmentRadius,
    CohesionRadius,
    SeparationRadius,
    DepthRadius,
    ObstacleRadius,
    ObstaclePadding,
    ObstacleForce,
    BounceMultiplier,
    MouseRadius,
    MouseForce,
    ScatterRadius,
    MaxSpeed,
    MaxForce,
    VelocityInertia,
    RotationInertia,
    BoidSize,
    BackgroundAlpha,
    FlockSize,
}

impl ParamKey {
    pub const ALL: [ParamKey; 21] = [
        ParamKey::AlignmentForce,
        ParamKey::CohesionForce,
        ParamKey::SeparationForce,
        ParamKey::AlignmentRadius,
        ParamKey::CohesionRadius,
        ParamKey::SeparationRadius,
        ParamKey::DepthRadius,
        ParamKey::ObstacleRadius,
        ParamKey::ObstaclePadding,
        ParamKey::ObstacleForce,
        ParamKey::BounceMultiplier,
        ParamKey::MouseRadius,
        ParamKey::MouseForce,
        ParamKey::ScatterRadius,
        ParamKey::MaxSpeed,
        ParamKey::MaxForce,
        ParamKey::VelocityInertia,
        ParamKey::RotationInertia,
        ParamKey::BoidSize,
        ParamKey::BackgroundAlpha,
        ParamKey::FlockSize,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ParamKey::AlignmentForce => "alignmentForce",
            ParamKey::CohesionForce => "cohesionForce",
            ParamKey::SeparationForce => "separationForce",
            ParamKey::AlignmentRadius => "alignmentRadius",
            ParamKey::CohesionRadius => "cohesionRadius",
            ParamKey::SeparationRadius => "separationRadius",
            ParamKey::DepthRadius => "depthRadius",
            ParamKey::ObstacleRadius => "obstacleRadius",
            ParamKey::ObstaclePadding => "obstaclePadding",
            ParamKey::ObstacleForce => "obstacleForce",
            ParamKey::BounceMultiplier => "bounceMultiplier",
            ParamKey::MouseRadius => "mouseRadius",
            ParamKey::MouseForce => "mouseForce",
            ParamKey::ScatterRadius => "scatterRadius",
            ParamKey::MaxSpeed => "maxSpeed",
            ParamKey::MaxForce => "maxForce",
            ParamKey::VelocityInertia => "velocityInertia",
            ParamKey::RotationInertia => "rotationInertia",
            ParamKey::BoidSize => "boidSize",
            ParamKey::BackgroundAlpha => "backgroundAlpha",
            ParamKey::FlockSize => "flockSize",
        }
    }

    /// Radii feed the grid cell size, which must be recomputed when they change.
    pub fn affects_cell_size(self) -> bool {
        matches!(
            self,
            ParamKey::AlignmentRadius
                | ParamKey::CohesionRadius
                | ParamKey::SeparationRadius
                | ParamKey::DepthRadius
                | ParamKey::ObstacleRadius
        )
    }
}

impl FromStr for ParamKey {
    type Err = SimError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        ParamKey::ALL
            .into_iter()
            .find(|key| key.as_str() == name)
            .ok_or_else(|| SimError::UnknownParam(name.to_string()))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DebugFlags {
    pub grid: bool,
    pub obstacles: bool,
    pub neighbors: bool,
    pub vision: bool,
}

impl DebugFlags {
    pub fn set(&mut self, flag: DebugFlag, enabled: bool) {
        match flag {
            DebugFlag::Grid => self.grid = enabled,
            DebugFlag::Obstacles => self.obstacles = enabled,
            DebugFlag::Neighbors => self.neighbors = enabled,
            DebugFlag::Vision => self.vision = enabled,
        }
    }

    pub fn any(&self) -> bool {
        self.grid || self.obstacles || self.neighbors || self.vision
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DebugFlag {
    Grid,
    Obstacles,
    Neighbors,
    Vision,
}

impl FromStr for DebugFlag {
    type Err = SimError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "grid" => Ok(DebugFlag::Grid),
            "obstacles" => Ok(DebugFlag::Obstacles),
            "neighbors" => Ok(DebugFlag::Neighbors),
            "vision" => Ok(DebugFlag::Vision),
            other => Err(SimError::UnknownDebugFlag(other.to_string())),
        }
    }
}
