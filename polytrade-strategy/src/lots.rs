//! Pure TWAP lot computation and inter-order scheduling. Kept free of any
//! I/O so invariant 6 (`Σ lots ≈ amount`, per-lot deviation bound) and
//! scenario S4 are exercised as plain unit tests.

use rand::Rng;

/// Splits `amount` into `lots_count` sizes whose sum is `amount`, each a
/// random perturbation of the mean bounded by `randomness`. Pairs are
/// drawn `(mean·(1+r), mean·(1−r))` for `r ∈ [0, randomness]`; an odd
/// instance contributes one `mean`-sized residual lot. Rounding to
/// `amount_precision` absorbs any residue into the last lot so the sum is
/// preserved exactly.
pub fn compute_lots(
    amount: f64,
    lots_count: usize,
    randomness: f64,
    amount_precision: f64,
    rng: &mut impl Rng,
) -> Vec<f64> {
    if lots_count == 0 {
        return Vec::new();
    }
    let mean = amount / lots_count as f64;
    let pairs = lots_count / 2;
    let has_residual = lots_count % 2 == 1;

    let mut lots = Vec::with_capacity(lots_count);
    for _ in 0..pairs {
        let r = if randomness > 0.0 {
            rng.random_range(0.0..=randomness)
        } else {
            0.0
        };
        lots.push(round_down(mean * (1.0 + r), amount_precision));
        lots.push(round_down(mean * (1.0 - r), amount_precision));
    }
    if has_residual {
        lots.push(round_down(mean, amount_precision));
    }

    absorb_rounding_residue(&mut lots, amount, amount_precision);
    lots
}

fn round_down(value: f64, precision: f64) -> f64 {
    if precision <= 0.0 {
        return value;
    }
    (value / precision).floor() * precision
}

/// Pushes whatever `amount − Σlots` remains onto the last lot so the
/// computed sequence sums exactly to `amount`, never leaving the last lot
/// negative.
fn absorb_rounding_residue(lots: &mut [f64], amount: f64, precision: f64) {
    let Some(last) = lots.last_mut() else { return };
    let sum: f64 = lots.iter().sum::<f64>();
    let residue = amount - sum;
    let adjusted = *last + residue;
    *last = if precision > 0.0 {
        (adjusted / precision).round() * precision
    } else {
        adjusted
    };
}

/// `Δ = duration_min · 60 · 1000 / lotsCount`, the base inter-order
/// interval in milliseconds.
pub fn base_interval_ms(duration_min: f64, lots_count: usize) -> i64 {
    if lots_count == 0 {
        return 0;
    }
    ((duration_min * 60.0 * 1000.0) / lots_count as f64).round() as i64
}

/// Next firing time: `now + Δ · (1 + r)` for `r ∈ [−randomness, randomness]`.
pub fn next_fire_at_ms(now_ms: i64, base_interval_ms: i64, randomness: f64, rng: &mut impl Rng) -> i64 {
    let r = if randomness > 0.0 {
        rng.random_range(-randomness..=randomness)
    } else {
        0.0
    };
    now_ms + (base_interval_ms as f64 * (1.0 + r)).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn lots_sum_to_amount_for_even_count() {
        let mut rng = StdRng::seed_from_u64(1);
        let lots = compute_lots(10.0, 4, 0.1, 0.0001, &mut rng);
        let sum: f64 = lots.iter().sum();
        assert!((sum - 10.0).abs() < 1e-6, "sum was {sum}");
        assert_eq!(lots.len(), 4);
    }

    #[test]
    fn lots_sum_to_amount_with_odd_residual() {
        let mut rng = StdRng::seed_from_u64(2);
        let lots = compute_lots(9.0, 5, 0.2, 0.0001, &mut rng);
        let sum: f64 = lots.iter().sum();
        assert!((sum - 9.0).abs() < 1e-6, "sum was {sum}");
        assert_eq!(lots.len(), 5);
    }

    #[test]
    fn per_lot_deviation_is_bounded_by_randomness_fraction_of_mean() {
        let mut rng = StdRng::seed_from_u64(3);
        let amount = 10.0;
        let lots_count = 4;
        let randomness = 0.1;
        let lots = compute_lots(amount, lots_count, randomness, 0.0, &mut rng);
        let mean = amount / lots_count as f64;
        for (i, lot) in lots.iter().enumerate() {
            let deviation = (lot - mean).abs();
            assert!(
                deviation <= mean * randomness + 1e-9,
                "lot {i} = {lot} deviates {deviation} from mean {mean} beyond {randomness}"
            );
        }
    }

    #[test]
    fn zero_randomness_yields_equal_lots() {
        let mut rng = StdRng::seed_from_u64(4);
        let lots = compute_lots(12.0, 4, 0.0, 0.0, &mut rng);
        assert!(lots.iter().all(|l| (*l - 3.0).abs() < 1e-9));
    }

    #[test]
    fn base_interval_matches_duration_over_lots_count() {
        // 2 minutes, 4 lots => 30 seconds each.
        assert_eq!(base_interval_ms(2.0, 4), 30_000);
    }

    #[test]
    fn next_fire_at_stays_within_jitter_bound() {
        let mut rng = StdRng::seed_from_u64(5);
        let base = 30_000i64;
        for _ in 0..50 {
            let fired = next_fire_at_ms(0, base, 0.1, &mut rng);
            assert!(fired >= (base as f64 * 0.9) as i64);
            assert!(fired <= (base as f64 * 1.1) as i64);
        }
    }
}
