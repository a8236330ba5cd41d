use crate::params::SimParams;
use crate::vector::{HasBounds, HasPosition, Rect, Vector};

const MIN_BOUND: f64 = 1.0;
const MIN_CELL_SIZE: f64 = 1.0;

/// Uniform bucket grid over a toroidal canvas. Holds copyable handles only;
/// it never owns the boids or obstacles it indexes.
pub struct SpatialGrid<T: Copy> {
    cell_size: f64,
    width: f64,
    height: f64,
    cols: usize,
    rows: usize,
    buckets: Vec<Vec<T>>,
}

impl<T: Copy> SpatialGrid<T> {
    pub fn new(width: f64, height: f64, cell_size: f64) -> Self {
        let mut grid = Self {
            cell_size: sanitize_cell_size(cell_size),
            width: 0.0,
            height: 0.0,
            cols: 0,
            rows: 0,
            buckets: Vec::new(),
        };

        grid.resize(width, height);
        grid
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.width = sanitize_bound(width);
        self.height = sanitize_bound(height);
        self.ensure_layout();
    }

    pub fn set_cell_size(&mut self, cell_size: f64) {
        self.cell_size = sanitize_cell_size(cell_size);
        self.ensure_layout();
    }

    /// Empties every bucket but keeps their allocations.
    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
    }

    pub fn add_item_at_point(&mut self, item: T, at: &impl HasPosition) {
        let cell = self.cell_index_for_position(at.position());
        self.buckets[cell].push(item);
    }

    /// Buckets `item` into every cell its bounds overlap.
    pub fn add_item_in_area(&mut self, item: T, area: &impl HasBounds) {
        let bounds = area.bounds();
        let min_x = self.cell_x(bounds.left);
        let max_x = self.cell_x(bounds.right());
        let min_y = self.cell_y(bounds.top);
        let max_y = self.cell_y(bounds.bottom());

        for cell_y in min_y..=max_y {
            for cell_x in min_x..=max_x {
                self.buckets[cell_y * self.cols + cell_x].push(item);
            }
        }
    }

    /// Visits the 3×3 block of cells around `position`, wrapping at the
    /// grid edges. Each distinct cell is visited once even on grids
    /// narrower than three cells, and the block reaches one cell further
    /// where it crosses a partial edge column or row.
    pub fn for_each_in_neighborhood<F>(&self, position: &Vector, mut callback: F)
    where
        F: FnMut(T),
    {
        let reach = self.cell_size;
        self.scan_span(
            self.unwrapped_col(position.x - reach),
            self.unwrapped_col(position.x + reach),
            self.unwrapped_row(position.y - reach),
            self.unwrapped_row(position.y + reach),
            &mut callback,
        );
    }

    pub fn items_in_neighborhood(&self, position: &Vector) -> Vec<T> {
        let mut items = Vec::new();
        self.for_each_in_neighborhood(position, |item| items.push(item));
        items
    }

    /// Items in every cell overlapped by `area`, which may extend past the
    /// canvas and wrap around it.
    pub fn items_in_area(&self, area: &Rect) -> Vec<T> {
        let mut items = Vec::new();
        self.scan_span(
            self.unwrapped_col(area.left),
            self.unwrapped_col(area.right()),
            self.unwrapped_row(area.top),
            self.unwrapped_row(area.bottom()),
            &mut |item| items.push(item),
        );
        items
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(Vec::is_empty)
    }

    fn scan_span<F>(&self, min_x: isize, max_x: isize, min_y: isize, max_y: isize, callback: &mut F)
    where
        F: FnMut(T),
    {
        let (min_x, max_x) = clamp_span(min_x, max_x, self.cols);
        let (min_y, max_y) = clamp_span(min_y, max_y, self.rows);

        for y in min_y..=max_y {
            let row = wrap_cell_index(y, self.rows) * self.cols;
            for x in min_x..=max_x {
                let cell = row + wrap_cell_index(x, self.cols);
                for &item in &self.buckets[cell] {
                    callback(item);
                }
            }
        }
    }

    fn ensure_layout(&mut self) {
        let cols = ((self.width / self.cell_size).ceil() as usize).max(1);
        let rows = ((self.height / self.cell_size).ceil() as usize).max(1);

        if cols != self.cols || rows != self.rows {
            self.cols = cols;
            self.rows = rows;
            self.buckets = vec![Vec::new(); cols * rows];
        } else {
            self.clear();
        }
    }

    fn cell_index_for_position(&self, position: &Vector) -> usize {
        self.cell_y(position.y) * self.cols + self.cell_x(position.x)
    }

    // Column index counted across repeated copies of the canvas, so spans
    // that leave the canvas map onto the right cells after wrapping.
    fn unwrapped_col(&self, x: f64) -> isize {
        let laps = (x / self.width).floor();
        let local = x - laps * self.width;
        laps as isize * self.cols as isize + self.cell_x(local) as isize
    }

    fn unwrapped_row(&self, y: f64) -> isize {
        let laps = (y / self.height).floor();
        let local = y - laps * self.height;
        laps as isize * self.rows as isize + self.cell_y(local) as isize
    }

    fn cell_x(&self, x: f64) -> usize {
        clamp_cell(x / self.cell_size, self.cols)
    }

    fn cell_y(&self, y: f64) -> usize {
        clamp_cell(y / self.cell_size, self.rows)
    }
}

/// Grid cell size that covers every interaction radius in use.
pub fn cell_size_for(params: &SimParams) -> f64 {
    params
        .alignment_radius
        .max(params.cohesion_radius)
        .max(params.separation_radius)
        .max(params.obstacle_radius)
        .max(params.depth_radius)
        .max(MIN_CELL_SIZE)
}

fn clamp_cell(scaled: f64, len: usize) -> usize {
    if !scaled.is_finite() || scaled <= 0.0 {
        return 0;
    }
    (scaled.floor() as usize).min(len - 1)
}

// A span at least as wide as the grid covers every cell exactly once.
fn clamp_span(min: isize, max: isize, len: usize) -> (isize, isize) {
    if max - min + 1 >= len as isize {
        (0, len as isize - 1)
    } else {
        (min, max)
    }
}

fn wrap_cell_index(index: isize, len: usize) -> usize {
    index.rem_euclid(len as isize) as usize
}

fn sanitize_cell_size(cell_size: f64) -> f64 {
    if cell_size.is_finite() {
        cell_size.max(MIN_CELL_SIZE)
    } else {
        MIN_CELL_SIZE
    }
}

fn sanitize_bound(extent: f64) -> f64 {
    if extent.is_finite() {
        extent.max(MIN_BOUND)
    } else {
        MIN_BOUND
    }
}

#[cfg(test)]
mod tests {
    use super::{cell_size_for, SpatialGrid};
    use crate::math::toroidal_distance;
    use crate::params::SimParams;
    use crate::vector::{HasBounds, HasPosition, Rect, Vector};

    struct Point(Vector);

    impl HasPosition for Point {
        fn position(&self) -> &Vector {
            &self.0
        }
    }

    struct Area(Rect);

    impl HasBounds for Area {
        fn bounds(&self) -> &Rect {
            &self.0
        }
    }

    fn sorted(mut items: Vec<usize>) -> Vec<usize> {
        items.sort_unstable();
        items.dedup();
        items
    }

    #[test]
    fn dimensions_follow_the_cell_size() {
        let mut grid: SpatialGrid<usize> = SpatialGrid::new(1000.0, 450.0, 100.0);
        assert_eq!((grid.cols(), grid.rows()), (10, 5));

        grid.set_cell_size(5000.0);
        assert_eq!((grid.cols(), grid.rows()), (1, 1));

        grid.resize(0.0, 0.0);
        assert_eq!((grid.cols(), grid.rows()), (1, 1));
    }

    #[test]
    fn neighborhood_wraps_across_edges() {
        let mut grid = SpatialGrid::new(1000.0, 1000.0, 50.0);
        grid.add_item_at_point(0usize, &Point(Vector::new(999.0, 500.0)));
        grid.add_item_at_point(1usize, &Point(Vector::new(2.0, 500.0)));
        grid.add_item_at_point(2usize, &Point(Vector::new(500.0, 500.0)));

        let around_left = sorted(grid.items_in_neighborhood(&Vector::new(2.0, 500.0)));
        assert_eq!(around_left, vec![0, 1]);

        let corner = sorted(grid.items_in_neighborhood(&Vector::new(999.0, 999.0)));
        assert!(corner.is_empty());
    }

    #[test]
    fn neighborhood_is_complete_within_one_cell_size() {
        let (width, height, cell) = (730.0, 410.0, 60.0);
        let mut points = Vec::new();
        let mut seed = 17u64;
        for _ in 0..200 {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let x = (seed >> 11) as f64 / (1u64 << 53) as f64 * width;
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let y = (seed >> 11) as f64 / (1u64 << 53) as f64 * height;
            points.push(Vector::new(x, y));
        }

        let mut grid = SpatialGrid::new(width, height, cell);
        for (i, p) in points.iter().enumerate() {
            grid.add_item_at_point(i, &Point(*p));
        }

        for (i, a) in points.iter().enumerate() {
            let seen = grid.items_in_neighborhood(a);
            for (j, b) in points.iter().enumerate() {
                if toroidal_distance(a.x, a.y, b.x, b.y, width, height) <= cell {
                    assert!(seen.contains(&j), "{i} should see {j}");
                }
            }
        }
    }

    #[test]
    fn small_grids_visit_each_cell_once() {
        let mut grid = SpatialGrid::new(100.0, 100.0, 60.0);
        grid.add_item_at_point(7usize, &Point(Vector::new(10.0, 10.0)));
        assert_eq!(grid.items_in_neighborhood(&Vector::new(90.0, 90.0)), vec![7]);
    }

    #[test]
    fn area_items_span_multiple_cells() {
        let mut grid = SpatialGrid::new(400.0, 400.0, 100.0);
        grid.add_item_in_area(3usize, &Area(Rect::new(150.0, 150.0, 120.0, 20.0)));
        assert_eq!(grid.len(), 2);

        // Duplicates are expected when a neighborhood covers both cells.
        let seen = grid.items_in_neighborhood(&Vector::new(210.0, 160.0));
        assert_eq!(seen, vec![3, 3]);
    }

    #[test]
    fn area_query_wraps_and_clear_keeps_layout() {
        let mut grid = SpatialGrid::new(400.0, 400.0, 100.0);
        grid.add_item_at_point(1usize, &Point(Vector::new(395.0, 5.0)));
        grid.add_item_at_point(2usize, &Point(Vector::new(200.0, 200.0)));

        let seen = sorted(grid.items_in_area(&Rect::new(-20.0, -20.0, 40.0, 40.0)));
        assert_eq!(seen, vec![1]);

        grid.clear();
        assert!(grid.is_empty());
        assert_eq!((grid.cols(), grid.rows()), (4, 4));
    }

    #[test]
    fn cell_size_is_the_largest_radius() {
        let mut params = SimParams::default();
        params.alignment_radius = 10.0;
        params.cohesion_radius = 20.0;
        params.separation_radius = 5.0;
        params.depth_radius = 15.0;
        params.obstacle_radius = 95.0;
        assert_eq!(cell_size_for(&params), 95.0);
    }
}
