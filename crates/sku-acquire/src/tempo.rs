//! Human pacing helpers: randomized inter-SKU delays and pointer paths.

use std::time::Duration;

use rand::Rng;

/// Randomized sleep between SKUs, occasionally extended so the cadence
/// never becomes a detectable fixed rhythm.
pub fn inter_sku_delay<R: Rng>(bounds: (u64, u64), long_probability: f64, extra_ms: u64, rng: &mut R) -> Duration {
    let (min_ms, max_ms) = if bounds.0 <= bounds.1 {
        bounds
    } else {
        (bounds.1, bounds.0)
    };
    let mut delay = rng.gen_range(min_ms..=max_ms);
    if long_probability > 0.0 && rng.gen_bool(long_probability.min(1.0)) {
        delay += rng.gen_range(0..=extra_ms);
    }
    Duration::from_millis(delay)
}

/// A pointer gesture: intermediate move coordinates ending on the target,
/// plus hover and press dwell times.
#[derive(Clone, Debug)]
pub struct PointerPlan {
    pub path: Vec<(f64, f64)>,
    pub hover_ms: u64,
    pub press_ms: u64,
}

/// Move-then-down-then-up plan toward `(x, y)` with randomized offset and
/// timing, instead of a programmatic click at the exact center.
pub fn pointer_plan<R: Rng>(x: f64, y: f64, rng: &mut R) -> PointerPlan {
    let target_x = x + rng.gen_range(-3.0..=3.0);
    let target_y = y + rng.gen_range(-2.0..=2.0);
    let steps = rng.gen_range(3..=6);

    let start_x = target_x - rng.gen_range(40.0..=160.0);
    let start_y = target_y - rng.gen_range(30.0..=120.0);

    let mut path = Vec::with_capacity(steps + 1);
    for i in 1..=steps {
        let t = i as f64 / steps as f64;
        let jx = rng.gen_range(-1.5..=1.5);
        let jy = rng.gen_range(-1.5..=1.5);
        path.push((
            start_x + (target_x - start_x) * t + jx * (1.0 - t),
            start_y + (target_y - start_y) * t + jy * (1.0 - t),
        ));
    }
    path.push((target_x, target_y));

    PointerPlan {
        path,
        hover_ms: rng.gen_range(60..=220),
        press_ms: rng.gen_range(40..=130),
    }
}
