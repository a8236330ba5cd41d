//! Free-list of scratch vectors for the per-frame steering pipeline.
//!
//! A [`Pooled`] guard hands its slot back when it is dropped, so every exit
//! path of a steering routine releases what it borrowed, early returns
//! included. [`PoolStats`] keeps the `get`/`release` accounting observable.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::ops::{Deref, DerefMut};

use crate::vector::Vector;

/// Worst-case scratch vectors held at once while steering one boid.
pub const PEAK_VECTORS_PER_BOID: usize = 12;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub gets: u64,
    pub releases: u64,
    /// Vectors created because the free list was empty.
    pub fresh_allocations: u64,
    /// Released vectors discarded (pool full or non-finite value).
    pub dropped: u64,
}

impl PoolStats {
    pub fn outstanding(&self) -> u64 {
        self.gets.saturating_sub(self.releases)
    }
}

pub struct VectorPool {
    free: RefCell<Vec<Vector>>,
    capacity: usize,
    stats: Cell<PoolStats>,
    exhausted: Cell<bool>,
}

impl VectorPool {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            free: RefCell::new(vec![Vector::ZERO; capacity]),
            capacity,
            stats: Cell::new(PoolStats::default()),
            exhausted: Cell::new(false),
        }
    }

    pub fn for_flock(max_flock_size: usize, peak_per_boid: usize) -> Self {
        Self::with_capacity(max_flock_size.saturating_mul(peak_per_boid))
    }

    /// Borrows a vector initialised to `(x, y)`. Never fails: an empty pool
    /// falls back to a fresh vector and logs once per exhaustion episode.
    pub fn get(&self, x: f64, y: f64) -> Pooled<'_> {
        let recycled = self.free.borrow_mut().pop();
        let mut stats = self.stats.get();
        stats.gets += 1;

        let mut value = match recycled {
            Some(value) => value,
            None => {
                stats.fresh_allocations += 1;
                if !self.exhausted.replace(true) {
                    log::warn!(
                        "vector pool exhausted (capacity {}), falling back to fresh vectors",
                        self.capacity
                    );
                }
                Vector::ZERO
            }
        };
        self.stats.set(stats);

        value.set(x, y);
        Pooled { value, pool: self }
    }

    /// Explicit form of dropping the guard. A guard borrowed from another
    /// pool goes back to its owner.
    pub fn release(&self, vector: Pooled<'_>) {
        if !std::ptr::eq(vector.pool, self) {
            log::trace!("released a vector owned by a different pool");
        }
        drop(vector);
    }

    pub fn stats(&self) -> PoolStats {
        self.stats.get()
    }

    pub fn available(&self) -> usize {
        self.free.borrow().len()
    }

    fn reclaim(&self, value: Vector) {
        let mut stats = self.stats.get();
        stats.releases += 1;

        let mut free = self.free.borrow_mut();
        if !value.is_finite() || free.len() >= self.capacity {
            stats.dropped += 1;
        } else {
            free.push(value);
            self.exhausted.set(false);
        }
        self.stats.set(stats);
    }
}

impl fmt::Debug for VectorPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VectorPool")
            .field("capacity", &self.capacity)
            .field("available", &self.available())
            .field("stats", &self.stats.get())
            .finish()
    }
}

/// A vector on loan from a [`VectorPool`].
pub struct Pooled<'p> {
    value: Vector,
    pool: &'p VectorPool,
}

impl<'p> Pooled<'p> {
    /// A second pooled vector equal to this one.
    pub fn copy(&self) -> Pooled<'p> {
        self.pool.get(self.value.x, self.value.y)
    }
}

impl Deref for Pooled<'_> {
    type Target = Vector;

    fn deref(&self) -> &Vector {
        &self.value
    }
}

impl DerefMut for Pooled<'_> {
    fn deref_mut(&mut self) -> &mut Vector {
        &mut self.value
    }
}

impl Drop for Pooled<'_> {
    fn drop(&mut self) {
        self.pool.reclaim(self.value);
    }
}

impl fmt::Debug for Pooled<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}
