use std::f64::consts::TAU;

pub const EPSILON: f64 = 1.0e-9;

/// Shortest signed offset from `from` to `to` along an axis that wraps at
/// `extent`.
pub fn wrapped_delta(delta: f64, extent: f64) -> f64 {
    if extent <= EPSILON {
        return delta;
    }

    let half_extent = extent * 0.5;
    if delta > half_extent {
        delta - extent
    } else if delta < -half_extent {
        delta + extent
    } else {
        delta
    }
}

/// Offset from `(ax, ay)` to `(bx, by)` on a torus of `width × height`.
pub fn toroidal_delta(ax: f64, ay: f64, bx: f64, by: f64, width: f64, height: f64) -> (f64, f64) {
    (
        wrapped_delta(bx - ax, width),
        wrapped_delta(by - ay, height),
    )
}

pub fn toroidal_distance_sq(ax: f64, ay: f64, bx: f64, by: f64, width: f64, height: f64) -> f64 {
    let (dx, dy) = toroidal_delta(ax, ay, bx, by, width, height);
    dx * dx + dy * dy
}

pub fn toroidal_distance(ax: f64, ay: f64, bx: f64, by: f64, width: f64, height: f64) -> f64 {
    toroidal_distance_sq(ax, ay, bx, by, width, height).sqrt()
}

/// Wraps a coordinate into `[0, extent)`.
pub fn wrap_coordinate(value: f64, extent: f64) -> f64 {
    if extent <= EPSILON || !value.is_finite() {
        return 0.0;
    }
    let wrapped = value.rem_euclid(extent);
    // rem_euclid can round up to `extent` for tiny negative inputs.
    if wrapped >= extent {
        0.0
    } else {
        wrapped
    }
}

pub fn wrap_angle(angle: f64) -> f64 {
    wrap_coordinate(angle, TAU)
}

/// Signed shortest rotation from `from` to `to`, in `(-π, π]`.
pub fn angle_difference(from: f64, to: f64) -> f64 {
    let diff = to - from;
    diff.sin().atan2(diff.cos())
}

pub fn clamp_finite(value: f64, min: f64, max: f64, fallback: f64) -> f64 {
    if !value.is_finite() {
        return fallback;
    }
    value.clamp(min, max)
}

#[cfg(test)]
mod tests {
    use super::{angle_difference, toroidal_distance, wrap_angle, wrap_coordinate, wrapped_delta};
    use std::f64::consts::PI;

    #[test]
    fn wrapped_delta_takes_the_short_way_round() {
        assert_eq!(wrapped_delta(997.0, 1000.0), -3.0);
        assert_eq!(wrapped_delta(-997.0, 1000.0), 3.0);
        assert_eq!(wrapped_delta(120.0, 1000.0), 120.0);
    }

    #[test]
    fn toroidal_distance_is_symmetric_and_never_longer() {
        let points = [
            (0.0, 0.0),
            (999.0, 500.0),
            (2.0, 500.0),
            (250.5, 780.25),
            (640.0, 10.0),
            (10.0, 640.0),
        ];
        let dims = [(1000.0, 1000.0), (640.0, 480.0), (37.0, 911.0)];

        for &(w, h) in &dims {
            for &(ax, ay) in &points {
                for &(bx, by) in &points {
                    let ab = toroidal_distance(ax, ay, bx, by, w, h);
                    let ba = toroidal_distance(bx, by, ax, ay, w, h);
                    let plain = ((bx - ax) * (bx - ax) + (by - ay) * (by - ay)).sqrt();
                    assert!((ab - ba).abs() < 1.0e-9);
                    assert!(ab <= plain + 1.0e-9);
                }
            }
        }
    }

    #[test]
    fn wraps_across_the_right_edge() {
        let d = toroidal_distance(999.0, 500.0, 2.0, 500.0, 1000.0, 1000.0);
        assert!((d - 3.0).abs() < 1.0e-9);
    }

    #[test]
    fn coordinates_and_angles_wrap_into_range() {
        assert_eq!(wrap_coordinate(-1.0, 100.0), 99.0);
        assert_eq!(wrap_coordinate(100.0, 100.0), 0.0);
        assert_eq!(wrap_coordinate(-1.0e-18, 100.0), 0.0);
        let a = wrap_angle(-0.5 * PI);
        assert!((a - 1.5 * PI).abs() < 1.0e-12);
    }

    #[test]
    fn angle_difference_avoids_wraparound_snapping() {
        let diff = angle_difference(0.1, 2.0 * PI - 0.1);
        assert!((diff + 0.2).abs() < 1.0e-9);
        let diff = angle_difference(2.0 * PI - 0.1, 0.1);
        assert!((diff - 0.2).abs() < 1.0e-9);
    }
}
