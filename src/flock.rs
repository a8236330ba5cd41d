//! Population management: spawning, mitosis growth, fade-out removal.
//!
//! Boids stay sorted by id. Ids only ever grow and removal preserves order,
//! so the grid's `BoidId` handles resolve by binary search and a handle to
//! a removed boid simply stops resolving.

use rand::Rng;

use crate::boid::{Boid, BoidId};
use crate::params::SimParams;
use crate::spatial_grid::SpatialGrid;
use crate::vector::{Vector, World};

pub const MIN_BOIDS: usize = 12;
/// Hard cap on boids alive at once, dying ones included.
pub const MAX_FLOCK_SIZE: usize = 400;
pub const PIXELS_PER_BOID: f64 = 9_000.0;
pub const MIN_PIXELS_PER_BOID: f64 = 2_500.0;
pub const MAX_CHANGES_PER_FRAME: usize = 2;
pub const CLUMP_SAMPLES: usize = 15;
pub const REMOVAL_RETRIES: usize = 10;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FlockSize {
    /// Follow the canvas area.
    #[default]
    Responsive,
    Manual(usize),
}

impl FlockSize {
    pub fn target(self, world: &World) -> usize {
        match self {
            FlockSize::Responsive => responsive_target(world.width, world.height),
            FlockSize::Manual(n) => n.min(MAX_FLOCK_SIZE),
        }
    }
}

/// Living boid count for a canvas of `width × height`: one boid per
/// `PIXELS_PER_BOID`, never fewer than `MIN_BOIDS`, never denser than one
/// per `MIN_PIXELS_PER_BOID`.
pub fn responsive_target(width: f64, height: f64) -> usize {
    let area = (width.max(0.0) * height.max(0.0)).max(0.0);
    let density_cap = ((area / MIN_PIXELS_PER_BOID).floor() as usize).min(MAX_FLOCK_SIZE);
    let upper = density_cap.max(MIN_BOIDS);
    ((area / PIXELS_PER_BOID).round() as usize).clamp(MIN_BOIDS, upper)
}

/// Boids added and marked dying by one population adjustment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PopulationChange {
    pub added: usize,
    pub removed: usize,
}

#[derive(Debug, Default)]
pub struct Flock {
    boids: Vec<Boid>,
    next_id: u64,
}

impl Flock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default spawn: `count` boids released from `anchor`.
    pub fn seed<R: Rng + ?Sized>(
        &mut self,
        count: usize,
        anchor: Vector,
        params: &SimParams,
        rng: &mut R,
    ) -> usize {
        let count = count.min(MAX_FLOCK_SIZE.saturating_sub(self.boids.len()));
        for _ in 0..count {
            let id = self.allocate_id();
            self.boids.push(Boid::spawn(id, anchor, params, rng));
        }
        if count > 0 {
            log::trace!("seeded {} boids at ({:.0}, {:.0})", count, anchor.x, anchor.y);
        }
        count
    }

    /// Moves the living count toward `target` by at most
    /// `MAX_CHANGES_PER_FRAME` boids: splits a clumped parent to grow, marks a
    /// clumped boid dying to shrink.
    #[allow(clippy::too_many_arguments)]
    pub fn adjust_to_target_size<R: Rng + ?Sized>(
        &mut self,
        target: usize,
        anchor: Vector,
        world: &World,
        params: &SimParams,
        grid: &SpatialGrid<BoidId>,
        rng: &mut R,
        now: f64,
    ) -> PopulationChange {
        let target = target.min(MAX_FLOCK_SIZE);
        let living = self.living_count();
        let mut change = PopulationChange::default();

        if living < target {
            let wanted = (target - living).min(MAX_CHANGES_PER_FRAME);
            for _ in 0..wanted {
                if self.boids.len() >= MAX_FLOCK_SIZE {
                    break;
                }
                let id = self.allocate_id();
                let parent = self
                    .find_boid_in_clump(world, params, grid, rng)
                    .and_then(|p| self.index_of(p));
                let child = match parent {
                    Some(parent) => {
                        Boid::split_from(&mut self.boids[parent], id, world, params, rng)
                    }
                    None => Boid::spawn(id, anchor, params, rng),
                };
                self.boids.push(child);
                change.added += 1;
            }
        } else if living > target {
            let excess = (living - target).min(MAX_CHANGES_PER_FRAME);
            for _ in 0..excess {
                match self.pick_for_removal(world, params, grid, rng) {
                    Some(index) => {
                        self.boids[index].start_dying(now);
                        change.removed += 1;
                    }
                    None => break,
                }
            }
        }

        if change.added > 0 || change.removed > 0 {
            log::trace!(
                "population {} -> target {} (+{} / -{})",
                living,
                target,
                change.added,
                change.removed
            );
        }
        change
    }

    /// Samples up to `CLUMP_SAMPLES` living boids and returns the one with
    /// the most living neighbors inside the cohesion radius. Falls back to a
    /// uniform pick when no sample has a neighbor.
    pub fn find_boid_in_clump<R: Rng + ?Sized>(
        &self,
        world: &World,
        params: &SimParams,
        grid: &SpatialGrid<BoidId>,
        rng: &mut R,
    ) -> Option<BoidId> {
        let living: Vec<usize> = self.living_indices().collect();
        if living.is_empty() {
            return None;
        }

        let radius_sq = params.cohesion_radius * params.cohesion_radius;
        let mut best: Option<(BoidId, usize)> = None;

        for _ in 0..CLUMP_SAMPLES.min(living.len()) {
            let candidate = &self.boids[living[rng.random_range(0..living.len())]];
            let mut density = 0;
            grid.for_each_in_neighborhood(&candidate.position, |id| {
                if id == candidate.id {
                    return;
                }
                if let Some(other) = self.get(id) {
                    let distance_sq = world.distance_sq(&candidate.position, &other.position);
                    if !other.is_dying() && distance_sq <= radius_sq {
                        density += 1;
                    }
                }
            });

            if density > 0 && best.is_none_or(|(_, top)| density > top) {
                best = Some((candidate.id, density));
            }
        }

        best.map(|(id, _)| id)
            .or_else(|| Some(self.boids[living[rng.random_range(0..living.len())]].id))
    }

    /// Drops boids whose fade has finished. Returns how many were removed.
    pub fn cleanup(&mut self, now: f64) -> usize {
        let before = self.boids.len();
        self.boids.retain(|boid| !boid.is_faded(now));
        before - self.boids.len()
    }

    pub fn living_count(&self) -> usize {
        self.boids.iter().filter(|b| !b.is_dying()).count()
    }

    pub fn total_count(&self) -> usize {
        self.boids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boids.is_empty()
    }

    pub fn index_of(&self, id: BoidId) -> Option<usize> {
        self.boids.binary_search_by_key(&id, |b| b.id).ok()
    }

    pub fn get(&self, id: BoidId) -> Option<&Boid> {
        self.index_of(id).map(|i| &self.boids[i])
    }

    pub fn get_mut(&mut self, id: BoidId) -> Option<&mut Boid> {
        self.index_of(id).map(move |i| &mut self.boids[i])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Boid> {
        self.boids.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Boid> {
        self.boids.iter_mut()
    }

    pub fn boids(&self) -> &[Boid] {
        &self.boids
    }

    pub fn clear(&mut self) {
        self.boids.clear();
    }

    fn living_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.boids
            .iter()
            .enumerate()
            .filter(|(_, b)| !b.is_dying())
            .map(|(i, _)| i)
    }

    fn pick_for_removal<R: Rng + ?Sized>(
        &self,
        world: &World,
        params: &SimParams,
        grid: &SpatialGrid<BoidId>,
        rng: &mut R,
    ) -> Option<usize> {
        for _ in 0..REMOVAL_RETRIES {
            // Boids marked earlier this frame are still in the grid.
            if let Some(index) = self
                .find_boid_in_clump(world, params, grid, rng)
                .and_then(|id| self.index_of(id))
                .filter(|&i| !self.boids[i].is_dying())
            {
                return Some(index);
            }
        }
        self.living_indices().next()
    }

    fn allocate_id(&mut self) -> BoidId {
        let id = BoidId(self.next_id);
        self.next_id += 1;
        id
    }
}
