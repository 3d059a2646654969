use rand::Rng;

use crate::action::PixelCoordinate;

pub const DEFAULT_CONTROL_POINTS: usize = 3;
const MIN_STEPS: usize = 10;
const PIXELS_PER_STEP: f64 = 10.0;
const MAX_CONTROL_OFFSET: f64 = 100.0;
const CONTROL_OFFSET_RATIO: f64 = 0.2;

/// Humanlike cursor path from `start` to `end` along a randomized Bezier
/// curve of degree `control_points + 1`.
///
/// Interior control points sit on the straight segment at even parametric
/// spacing, each jittered by up to `min(100, 0.2 * d)` per axis, so short
/// moves wiggle more than long ones. The curve is sampled at `steps + 1`
/// points with `steps = max(10, round(d / 10))`; the first and last points
/// are exactly `start` and `end`.
pub fn path<R: Rng + ?Sized>(
    rng: &mut R,
    start: PixelCoordinate,
    end: PixelCoordinate,
    control_points: usize,
) -> Vec<PixelCoordinate> {
    let distance = start.distance(&end);
    let steps = ((distance / PIXELS_PER_STEP).round() as usize).max(MIN_STEPS);
    let max_offset = MAX_CONTROL_OFFSET.min(distance * CONTROL_OFFSET_RATIO);

    let mut controls = Vec::with_capacity(control_points + 2);
    controls.push(start);
    for i in 0..control_points {
        let t = (i + 1) as f64 / (control_points + 1) as f64;
        let line = PixelCoordinate::new(
            start.x + t * (end.x - start.x),
            start.y + t * (end.y - start.y),
        );
        controls.push(line.offset(jitter(rng, max_offset), jitter(rng, max_offset)));
    }
    controls.push(end);

    let mut points = Vec::with_capacity(steps + 1);
    points.push(start);
    for i in 1..steps {
        let t = i as f64 / steps as f64;
        points.push(bezier_point(t, &controls));
    }
    // Pin the endpoint; the Bernstein sum at t = 1 can be off by an ulp.
    points.push(end);
    points
}

fn jitter<R: Rng + ?Sized>(rng: &mut R, max_offset: f64) -> f64 {
    if max_offset > 0.0 {
        rng.random_range(-max_offset..=max_offset)
    } else {
        0.0
    }
}

/// Bernstein-polynomial weighted sum of the control points at `t`.
pub fn bezier_point(t: f64, controls: &[PixelCoordinate]) -> PixelCoordinate {
    let n = controls.len().saturating_sub(1);
    let mut x = 0.0;
    let mut y = 0.0;
    for (i, c) in controls.iter().enumerate() {
        let weight = binomial(n, i) * t.powi(i as i32) * (1.0 - t).powi((n - i) as i32);
        x += c.x * weight;
        y += c.y * weight;
    }
    PixelCoordinate::new(x, y)
}

fn binomial(n: usize, k: usize) -> f64 {
    let k = k.min(n - k);
    (0..k).fold(1.0, |acc, i| acc * (n - i) as f64 / (i + 1) as f64)
}
