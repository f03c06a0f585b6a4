//! Affordability solving for geometric upgrade costs.
//!
//! Upgrade prices follow `price(L) = base × ratio^L`, optionally stepped by a
//! milestone multiplier every fixed number of levels and optionally capped.
//! The solver answers three questions without iterating level-by-level when
//! the answer may be astronomically large: the exact price at a level, the
//! total price of a block of levels, and the maximum block a wallet affords.
//!
//! Prices are exact through a cached level range and log-space approximations
//! beyond it. Wherever a result will actually debit a wallet, a float
//! estimate is re-verified with exact big-integer accumulation: over- or
//! under-granting currency is a player-visible bug, a slightly slow answer is
//! not.

use core::f64::consts::LN_10;

use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use tracing::{debug, trace};

use crate::bignum::parse_multiplier;
use crate::BigNum;

// ============================================================================
// Constants
// ============================================================================

/// Highest level whose price is kept exactly in the series cache.
const EXACT_CACHE_LIMIT: u64 = 5000;

/// Block length up to which affordability runs by plain linear accumulation.
const SMALL_BLOCK_LIMIT: u64 = 100;

/// Purchasable-level ceiling for uncapped upgrades. Large enough that no
/// player reaches it in one purchase, finite so counts stay machine words.
const UNCAPPED_PURCHASE_CEILING: u64 = 1_000_000_000;

/// Shared iteration budget for every estimate-correction loop. Exhaustion
/// returns the best estimate so far instead of looping unboundedly.
const CORRECTION_ITERATION_LIMIT: u32 = 96;

/// Slack applied when comparing series logs against a wallet log. Covers
/// f64 rounding in the closed forms; exact re-verification catches the rest.
const LN_TOLERANCE: f64 = 1e-9;

// ============================================================================
// Cost Model
// ============================================================================

/// A per-level growth multiplier, kept both as an exact numerator/scale pair
/// (for cache fills) and as a natural log (for closed forms). Anything
/// malformed, non-positive, or shrinking degrades to flat; pricing never
/// throws over a bad curve definition.
#[derive(Debug, Clone)]
struct GrowthRatio {
    numerator: BigUint,
    scale: u32,
    ln: f64,
}

impl GrowthRatio {
    fn flat() -> Self {
        Self {
            numerator: BigUint::from(1u32),
            scale: 0,
            ln: 0.0,
        }
    }

    fn from_text(text: &str) -> Self {
        let Ok((numerator, scale)) = parse_multiplier(text) else {
            return Self::flat();
        };
        let value = numerator.to_f64().unwrap_or(f64::INFINITY) / 10f64.powi(scale as i32);
        if !value.is_finite() || value <= 1.0 {
            return Self::flat();
        }
        Self {
            ln: value.ln(),
            numerator,
            scale,
        }
    }

    #[inline]
    fn is_flat(&self) -> bool {
        self.ln == 0.0
    }
}

/// An extra cost multiplier applied every `interval` levels.
#[derive(Debug, Clone)]
pub struct MilestoneStep {
    interval: u64,
    multiplier: GrowthRatio,
}

impl MilestoneStep {
    /// A step that multiplies the price by `multiplier` each time a level
    /// crosses a multiple of `interval`. Malformed or shrinking multipliers
    /// degrade to no-ops.
    pub fn new(interval: u64, multiplier: &str) -> Self {
        Self {
            interval: interval.max(1),
            multiplier: GrowthRatio::from_text(multiplier),
        }
    }
}

/// Price curve for one upgrade: `price(L) = base × ratio^L`, stepped at
/// milestones and clamped at a level cap when configured.
#[derive(Debug, Clone)]
pub struct CostCurve {
    base: BigNum,
    ratio: GrowthRatio,
    step: Option<MilestoneStep>,
    cap: Option<u64>,
}

impl CostCurve {
    /// A constant-price curve.
    pub fn flat(base: BigNum) -> Self {
        Self {
            base,
            ratio: GrowthRatio::flat(),
            step: None,
            cap: None,
        }
    }

    /// A geometric curve growing by the decimal `ratio` per level, e.g.
    /// `"1.15"`. Ratios at or below one, or unparsable ones, fall back to
    /// flat pricing.
    pub fn geometric(base: BigNum, ratio: &str) -> Self {
        Self {
            base,
            ratio: GrowthRatio::from_text(ratio),
            step: None,
            cap: None,
        }
    }

    /// Adds a milestone step multiplier.
    #[must_use]
    pub fn with_milestones(mut self, step: MilestoneStep) -> Self {
        self.step = Some(step);
        self
    }

    /// Caps the purchasable level range.
    #[must_use]
    pub fn with_level_cap(mut self, cap: u64) -> Self {
        self.cap = Some(cap);
        self
    }

    /// Price at level zero.
    pub fn base(&self) -> &BigNum {
        &self.base
    }

    pub fn level_cap(&self) -> Option<u64> {
        self.cap
    }
}

/// Result of a bulk-purchase solve.
///
/// The three fields are computed as one consistent unit: commit the new
/// level, the debited wallet, and the displayed next price together, or not
/// at all. Committing a subset leaves the game state contradicting itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Purchase {
    /// Levels affordable from the starting level.
    pub count: u64,
    /// Total price of those levels; never exceeds the wallet.
    pub spent: BigNum,
    /// Price of the first level after the purchased block.
    pub next_price: BigNum,
}

// ============================================================================
// Cost Series
// ============================================================================

/// A [`CostCurve`] bundled with its exact-price cache.
///
/// The cache is a level-indexed vector filled monotonically; its length is
/// the watermark of exactly-priced levels, and `price(N+1)` is always derived
/// from the committed `price(N)`. Each series owns its cache, so independent
/// sessions (save slots, tests) cannot contaminate each other; a save-slot
/// switch resets by dropping or [`CostSeries::reset_cache`]-ing the series.
///
/// Single-threaded by design: embedders that share a series across threads
/// must wrap it in a mutex or keep one per context.
#[derive(Debug, Clone)]
pub struct CostSeries {
    curve: CostCurve,
    cache: Vec<BigNum>,
}

impl CostSeries {
    pub fn new(curve: CostCurve) -> Self {
        Self {
            curve,
            cache: Vec::new(),
        }
    }

    pub fn curve(&self) -> &CostCurve {
        &self.curve
    }

    /// Count of levels with exactly cached prices.
    pub fn cached_levels(&self) -> u64 {
        self.cache.len() as u64
    }

    /// Drops every cached price, e.g. on a save-slot switch.
    pub fn reset_cache(&mut self) {
        self.cache.clear();
    }

    /// Exact price at `level` while the cache reaches it, a log-space
    /// approximation beyond.
    pub fn cost_at_level(&mut self, level: u64) -> BigNum {
        if self.curve.base.is_infinite() || self.curve.base.is_zero() {
            return self.curve.base.clone();
        }
        if level <= EXACT_CACHE_LIMIT {
            self.fill_cache_to(level);
            return self.cache[level as usize].clone();
        }
        BigNum::from_log10(self.ln_price(level) / LN_10, self.curve.base.precision())
    }

    /// Total price of `count` levels starting at `start`. Exact for short
    /// blocks within the cache's reach; closed-form geometric sums in
    /// natural-log space otherwise, decomposed per milestone window.
    pub fn total_cost(&mut self, start: u64, count: u64) -> BigNum {
        let precision = self.curve.base.precision();
        if count == 0 {
            return BigNum::zero_with_precision(precision);
        }
        if self.curve.base.is_infinite() || self.curve.base.is_zero() {
            return self.curve.base.clone();
        }
        if self.curve.ratio.is_flat() && self.curve.step.is_none() {
            // degenerate series: the closed form divides by ratio − 1
            return self.cost_at_level(start).mul_u64(count);
        }
        if count <= SMALL_BLOCK_LIMIT && start + count <= EXACT_CACHE_LIMIT + 1 {
            return self.accumulate_range(start, count);
        }
        self.approx_total(start, count)
    }

    /// Maximum levels affordable with `wallet` starting at `level`, with the
    /// exact amount spent and the price that follows.
    pub fn bulk_purchase(&mut self, level: u64, wallet: &BigNum) -> Purchase {
        let precision = self.curve.base.precision();
        let room = match self.curve.cap {
            Some(cap) => cap.saturating_sub(level),
            None => UNCAPPED_PURCHASE_CEILING,
        };
        if room == 0 {
            return Purchase {
                count: 0,
                spent: BigNum::zero_with_precision(precision),
                next_price: self.cost_at_level(level),
            };
        }
        if wallet.is_infinite() {
            // straight to the cap; an infinite wallet is never meaningfully
            // debited, so nothing is spent
            return Purchase {
                count: room,
                spent: BigNum::zero_with_precision(precision),
                next_price: self.cost_at_level(level.saturating_add(room)),
            };
        }
        let first_price = self.cost_at_level(level);
        if first_price.is_infinite() || wallet < &first_price {
            return Purchase {
                count: 0,
                spent: BigNum::zero_with_precision(precision),
                next_price: first_price,
            };
        }
        if first_price.is_zero() {
            // a free curve: the whole room is affordable
            return Purchase {
                count: room,
                spent: BigNum::zero_with_precision(precision),
                next_price: self.cost_at_level(level.saturating_add(room)),
            };
        }
        let (count, spent) = self.affordable(level, room, wallet);
        Purchase {
            count,
            spent,
            next_price: self.cost_at_level(level.saturating_add(count)),
        }
    }

    // ------------------------------------------------------------------
    // internals
    // ------------------------------------------------------------------

    fn fill_cache_to(&mut self, level: u64) {
        if self.cache.is_empty() {
            self.cache.push(self.curve.base.clone());
        }
        while (self.cache.len() as u64) <= level {
            let next_level = self.cache.len() as u64;
            let prev = &self.cache[self.cache.len() - 1];
            let mut next = prev.mul_fraction(&self.curve.ratio.numerator, self.curve.ratio.scale);
            if let Some(step) = &self.curve.step {
                if next_level % step.interval == 0 {
                    next = next.mul_fraction(&step.multiplier.numerator, step.multiplier.scale);
                }
            }
            self.cache.push(next);
        }
    }

    /// Exact ascending sum of `count` cached prices from `start`.
    fn accumulate_range(&mut self, start: u64, count: u64) -> BigNum {
        let mut total = BigNum::zero_with_precision(self.curve.base.precision());
        if count == 0 {
            return total;
        }
        self.fill_cache_to(start + count - 1);
        for level in start..start + count {
            total.accumulate(&self.cache[level as usize]);
        }
        total
    }

    /// Natural log of the price at `level`, from the closed form.
    fn ln_price(&self, level: u64) -> f64 {
        let mut ln = self.curve.base.approx_ln() + level as f64 * self.curve.ratio.ln;
        if let Some(step) = &self.curve.step {
            ln += (level / step.interval) as f64 * step.multiplier.ln;
        }
        ln
    }

    /// Closed-form total in log space, decomposed into head window, whole
    /// windows (a geometric series in window space), and tail window.
    fn approx_total(&self, start: u64, count: u64) -> BigNum {
        let precision = self.curve.base.precision();
        let g = self.curve.ratio.ln;
        let Some(step) = &self.curve.step else {
            let ln = series_ln(self.ln_price(start), g, count);
            return BigNum::from_log10(ln / LN_10, precision);
        };

        let interval = step.interval;
        let boundary = (start / interval + 1) * interval;
        let head = (boundary - start).min(count);
        let mut total =
            BigNum::from_log10(series_ln(self.ln_price(start), g, head) / LN_10, precision);
        let rest = count - head;
        if rest == 0 {
            return total;
        }
        let windows = rest / interval;
        let tail = rest % interval;
        if windows > 0 {
            let first_window_ln = series_ln(self.ln_price(boundary), g, interval);
            let window_growth_ln = interval as f64 * g + step.multiplier.ln;
            total = total.add(&BigNum::from_log10(
                series_ln(first_window_ln, window_growth_ln, windows) / LN_10,
                precision,
            ));
        }
        if tail > 0 {
            let tail_start = boundary + windows * interval;
            total = total.add(&BigNum::from_log10(
                series_ln(self.ln_price(tail_start), g, tail) / LN_10,
                precision,
            ));
        }
        total
    }

    /// Regime dispatch for the affordability core: exact linear accumulation
    /// when the range is small, otherwise estimate in log space and then
    /// re-verify exactly wherever the cache can reach.
    fn affordable(&mut self, level: u64, room: u64, wallet: &BigNum) -> (u64, BigNum) {
        let precision = self.curve.base.precision();
        if room <= SMALL_BLOCK_LIMIT && level + room <= EXACT_CACHE_LIMIT {
            return self.linear_affordable(level, room, wallet);
        }

        let estimate = if self.curve.step.is_some() {
            self.milestone_estimate(level, room, wallet)
        } else if self.curve.ratio.is_flat() {
            self.flat_estimate(level, room, wallet)
        } else {
            geometric_count(
                self.ln_price(level),
                self.curve.ratio.ln,
                wallet.approx_ln(),
                room,
            )
        };
        let estimate = estimate.min(room);

        if level.saturating_add(estimate) <= EXACT_CACHE_LIMIT {
            return self.exact_verify(level, room, wallet, estimate);
        }

        trace!(
            level,
            estimate,
            "bulk purchase beyond exact reach; spending from log-space totals"
        );
        if estimate == 0 {
            return (0, BigNum::zero_with_precision(precision));
        }
        let mut spent = self.total_cost(level, estimate);
        if &spent > wallet {
            spent = wallet.clone();
        }
        (estimate, spent)
    }

    /// Accumulate prices one level at a time, stopping as soon as the wallet
    /// is exceeded.
    fn linear_affordable(&mut self, level: u64, room: u64, wallet: &BigNum) -> (u64, BigNum) {
        self.fill_cache_to(level + room - 1);
        let mut spent = BigNum::zero_with_precision(self.curve.base.precision());
        let mut count = 0u64;
        while count < room {
            let with = spent.add(&self.cache[(level + count) as usize]);
            if &with > wallet {
                break;
            }
            spent = with;
            count += 1;
        }
        (count, spent)
    }

    /// Trust the float estimate, then verify exactly: walk the count down
    /// while the exact total overshoots the wallet and back up while another
    /// level still fits. Mandatory wherever a purchase debits a wallet. The
    /// shrink walk runs unbudgeted; the count itself bounds it, and the
    /// returned total must not exceed the wallet.
    fn exact_verify(&mut self, level: u64, room: u64, wallet: &BigNum, estimate: u64) -> (u64, BigNum) {
        let mut count = estimate.min(room);
        let mut spent = self.accumulate_range(level, count);
        while count > 0 && &spent > wallet {
            count -= 1;
            spent = spent.sub(&self.cache[(level + count) as usize]);
        }
        // the committed total is always the ascending sum; the descending
        // subtractions above only tracked the walk
        spent = self.accumulate_range(level, count);
        while count > 0 && &spent > wallet {
            count -= 1;
            spent = self.accumulate_range(level, count);
        }
        let mut budget = CORRECTION_ITERATION_LIMIT;
        while count < room && budget > 0 {
            self.fill_cache_to(level + count);
            let with = spent.add(&self.cache[(level + count) as usize]);
            if &with > wallet {
                break;
            }
            spent = with;
            count += 1;
            budget -= 1;
        }
        if budget == 0 {
            debug!(
                level,
                count, "exact re-verification hit its iteration cap; returning best estimate"
            );
        }
        (count, spent)
    }

    /// Flat pricing reduces to integer division: exact big-integer division
    /// when wallet and price are both plain integers, log subtraction with a
    /// multiply-and-compare polish otherwise.
    fn flat_estimate(&mut self, level: u64, room: u64, wallet: &BigNum) -> u64 {
        let price = self.cost_at_level(level);
        if price.is_zero() {
            return room;
        }
        if let (Some(w), Some(p)) = (wallet.to_integer_digits(), price.to_integer_digits()) {
            if !p.is_zero()
                && wallet.floor_to_integer() == *wallet
                && price.floor_to_integer() == price
            {
                let quotient = w / p;
                return quotient.to_u64().unwrap_or(u64::MAX).min(room);
            }
        }
        let gap = wallet.approx_log10() - price.approx_log10();
        let mut count = if gap >= 19.0 {
            room
        } else {
            (10f64.powf(gap).floor() as u64).min(room)
        };
        let mut budget = CORRECTION_ITERATION_LIMIT;
        while count > 0 && budget > 0 && price.mul_u64(count) > *wallet {
            count -= 1;
            budget -= 1;
        }
        while count < room && budget > 0 && price.mul_u64(count + 1) <= *wallet {
            count += 1;
            budget -= 1;
        }
        count
    }

    /// Milestone curves solve per pricing segment: finish the current
    /// window, reapply what remains of the wallet to the whole-window
    /// geometric series (in window space, so millions of windows cost one
    /// closed form), then finish inside the final partial window.
    fn milestone_estimate(&self, level: u64, room: u64, wallet: &BigNum) -> u64 {
        let (interval, step_ln) = match &self.curve.step {
            Some(step) => (step.interval, step.multiplier.ln),
            None => (1, 0.0),
        };
        let g = self.curve.ratio.ln;
        let wallet_ln = wallet.approx_ln();

        let boundary = (level / interval + 1) * interval;
        let head_room = (boundary - level).min(room);
        let head = geometric_count(self.ln_price(level), g, wallet_ln, head_room);
        if head < head_room || head == room {
            return head;
        }

        let mut remaining_ln = ln_sub(wallet_ln, series_ln(self.ln_price(level), g, head));
        let levels_left = room - head;
        let max_windows = levels_left / interval;
        let mut windows = 0u64;
        if max_windows > 0 && remaining_ln > f64::NEG_INFINITY {
            let first_window_ln = series_ln(self.ln_price(boundary), g, interval);
            let window_growth_ln = interval as f64 * g + step_ln;
            windows = geometric_count(first_window_ln, window_growth_ln, remaining_ln, max_windows);
            if windows > 0 {
                remaining_ln = ln_sub(
                    remaining_ln,
                    series_ln(first_window_ln, window_growth_ln, windows),
                );
            }
        }

        let consumed = head + windows * interval;
        let tail_room = (room - consumed).min(interval);
        let tail = if remaining_ln > f64::NEG_INFINITY && tail_room > 0 {
            geometric_count(self.ln_price(level + consumed), g, remaining_ln, tail_room)
        } else {
            0
        };
        consumed + tail
    }
}

// ============================================================================
// Log-Space Series Math
// ============================================================================

/// `ln` of `Σ_{k=0}^{n-1} e^{ln_first + k·g}`: the geometric series total in
/// natural-log space, with the flat series handled separately because the
/// closed form divides by `e^g − 1`.
fn series_ln(ln_first: f64, g: f64, n: u64) -> f64 {
    if n == 0 {
        return f64::NEG_INFINITY;
    }
    if g <= 0.0 {
        return ln_first + (n as f64).ln();
    }
    ln_first + ln_expm1(g * n as f64) - ln_expm1(g)
}

/// `ln(e^x − 1)` for positive `x`, stable across the whole range: direct for
/// moderate `x`, the asymptotic `x + ln(1 − e^−x)` branch once `e^x` nears
/// overflow territory.
fn ln_expm1(x: f64) -> f64 {
    if x > 30.0 {
        x + (-(-x).exp()).ln_1p()
    } else {
        x.exp_m1().ln()
    }
}

/// `ln(1 + e^t)` without overflowing for large `t`.
fn ln1p_exp(t: f64) -> f64 {
    if t > 30.0 {
        t
    } else {
        t.exp().ln_1p()
    }
}

/// `ln(e^a − e^b)`, negative infinity when nothing remains.
fn ln_sub(a: f64, b: f64) -> f64 {
    if b >= a {
        return f64::NEG_INFINITY;
    }
    a + (-(b - a).exp()).ln_1p()
}

/// Largest `n ≤ room` whose series log stays within the wallet log: invert
/// the closed form for an initial estimate, then correct float drift with a
/// narrowing halver, an exponential widener, and a final bisection, all under
/// one iteration budget.
fn geometric_count(ln_first: f64, g: f64, wallet_ln: f64, room: u64) -> u64 {
    if room == 0 || wallet_ln == f64::NEG_INFINITY {
        return 0;
    }
    if g <= 0.0 {
        let quotient = (wallet_ln - ln_first).exp().floor();
        return if quotient >= room as f64 {
            room
        } else {
            quotient as u64
        };
    }
    let fits = |n: u64| n == 0 || series_ln(ln_first, g, n) <= wallet_ln + LN_TOLERANCE;
    if fits(room) {
        return room;
    }

    let t = wallet_ln - ln_first + ln_expm1(g);
    let raw = (ln1p_exp(t) / g).floor();
    let mut lo = if raw >= room as f64 {
        room
    } else if raw > 0.0 {
        raw as u64
    } else {
        0
    };

    let mut budget = CORRECTION_ITERATION_LIMIT;
    while lo > 0 && !fits(lo) {
        lo /= 2;
        budget -= 1;
        if budget == 0 {
            debug!(estimate = lo, "affordability correction hit its iteration cap while narrowing");
            return if fits(lo) { lo } else { 0 };
        }
    }
    let mut step = 1u64;
    while lo + step < room && fits(lo + step) {
        lo += step;
        step = step.saturating_mul(2);
        budget -= 1;
        if budget == 0 {
            debug!(estimate = lo, "affordability correction hit its iteration cap while widening");
            return lo;
        }
    }
    let mut hi = (lo + step).min(room);
    while lo + 1 < hi {
        let mid = lo + (hi - lo) / 2;
        if fits(mid) {
            lo = mid;
        } else {
            hi = mid;
        }
        budget -= 1;
        if budget == 0 {
            debug!(estimate = lo, "affordability correction hit its iteration cap while bisecting");
            break;
        }
    }
    lo
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn bn(s: &str) -> BigNum {
        BigNum::parse(s).unwrap()
    }

    /// Reference implementation: one level at a time, straight accumulation.
    fn brute_force(series: &mut CostSeries, level: u64, room: u64, wallet: &BigNum) -> (u64, BigNum) {
        let mut spent = BigNum::zero();
        let mut count = 0u64;
        while count < room {
            let price = series.cost_at_level(level + count);
            let with = spent.add(&price);
            if &with > wallet {
                break;
            }
            spent = with;
            count += 1;
        }
        (count, spent)
    }

    #[test]
    fn test_cost_at_level_exact() {
        let mut series = CostSeries::new(CostCurve::geometric(BigNum::from_u64(10), "2"));
        assert_eq!(series.cost_at_level(0), bn("10"));
        assert_eq!(series.cost_at_level(1), bn("20"));
        assert_eq!(series.cost_at_level(10), bn("10240"));
        assert_eq!(series.cached_levels(), 11);
    }

    #[test]
    fn test_cost_at_level_beyond_cache_uses_logs() {
        let mut series = CostSeries::new(CostCurve::geometric(BigNum::from_u64(10), "2"));
        let price = series.cost_at_level(6000);
        let expected_log10 = 1.0 + 6000.0 * 2f64.log10();
        assert!((price.approx_log10() - expected_log10).abs() < 1e-6);
        // the cache never fills that far
        assert_eq!(series.cached_levels(), 0);
    }

    #[test]
    fn test_ratio_fallback_to_flat() {
        for ratio in ["0", "0.5", "1", "garbage", ""] {
            let mut series = CostSeries::new(CostCurve::geometric(BigNum::from_u64(10), ratio));
            assert_eq!(series.cost_at_level(3), bn("10"), "ratio {ratio:?}");
        }
    }

    #[test]
    fn test_milestone_prices() {
        let curve = CostCurve::geometric(BigNum::from_u64(10), "2")
            .with_milestones(MilestoneStep::new(5, "10"));
        let mut series = CostSeries::new(curve);
        assert_eq!(series.cost_at_level(0), bn("10"));
        assert_eq!(series.cost_at_level(4), bn("160"));
        assert_eq!(series.cost_at_level(5), bn("3200"));
        assert_eq!(series.cost_at_level(6), bn("6400"));
        assert_eq!(series.cost_at_level(10), bn("1024000"));
    }

    #[test]
    fn test_total_cost_exact_small_block() {
        let mut series = CostSeries::new(CostCurve::geometric(BigNum::from_u64(10), "2"));
        assert_eq!(series.total_cost(0, 3), bn("70"));
        assert_eq!(series.total_cost(2, 2), bn("120"));
        assert!(series.total_cost(0, 0).is_zero());
    }

    #[test]
    fn test_total_cost_closed_form() {
        let mut series = CostSeries::new(CostCurve::geometric(BigNum::one(), "2"));
        let total = series.total_cost(0, 500);
        let expected_log10 = 500.0 * 2f64.log10();
        assert!((total.approx_log10() - expected_log10).abs() < 1e-9);
    }

    #[test]
    fn test_total_cost_flat_is_exact_multiplication() {
        let mut series = CostSeries::new(CostCurve::flat(BigNum::from_u64(5)));
        assert_eq!(series.total_cost(0, 1_000_000), bn("5000000"));
    }

    #[test]
    fn test_bulk_purchase_exact_wallet_buys_one() {
        let mut series = CostSeries::new(CostCurve::geometric(BigNum::from_u64(10), "1.1"));
        let wallet = series.cost_at_level(0);
        let purchase = series.bulk_purchase(0, &wallet);
        assert_eq!(purchase.count, 1);
        assert_eq!(purchase.spent, wallet);
        assert_eq!(purchase.next_price, series.cost_at_level(1));
    }

    #[test]
    fn test_bulk_purchase_zero_wallet() {
        let mut series = CostSeries::new(CostCurve::geometric(BigNum::from_u64(10), "1.1"));
        let purchase = series.bulk_purchase(0, &BigNum::zero());
        assert_eq!(purchase.count, 0);
        assert!(purchase.spent.is_zero());
        assert_eq!(purchase.next_price, bn("10"));
    }

    #[test]
    fn test_bulk_purchase_flat_division() {
        let mut series = CostSeries::new(CostCurve::flat(BigNum::from_u64(5)));
        let purchase = series.bulk_purchase(0, &bn("23"));
        assert_eq!(purchase.count, 4);
        assert_eq!(purchase.spent, bn("20"));
        assert_eq!(purchase.next_price, bn("5"));
    }

    #[test]
    fn test_bulk_purchase_infinite_wallet_capped() {
        let curve = CostCurve::geometric(BigNum::from_u64(10), "1.1").with_level_cap(100);
        let mut series = CostSeries::new(curve);
        let purchase = series.bulk_purchase(40, &BigNum::infinite());
        assert_eq!(purchase.count, 60);
        assert!(purchase.spent.is_zero());
    }

    #[test]
    fn test_bulk_purchase_infinite_wallet_uncapped() {
        let mut series = CostSeries::new(CostCurve::geometric(BigNum::from_u64(10), "1.1"));
        let purchase = series.bulk_purchase(0, &BigNum::infinite());
        assert_eq!(purchase.count, UNCAPPED_PURCHASE_CEILING);
        assert!(purchase.spent.is_zero());
    }

    #[test]
    fn test_bulk_purchase_at_cap() {
        let curve = CostCurve::geometric(BigNum::from_u64(10), "1.1").with_level_cap(100);
        let mut series = CostSeries::new(curve);
        let purchase = series.bulk_purchase(100, &bn("1e50"));
        assert_eq!(purchase.count, 0);
        assert!(purchase.spent.is_zero());
    }

    #[test]
    fn test_bulk_purchase_cap_clamps_rich_wallet() {
        let curve = CostCurve::geometric(BigNum::from_u64(10), "1.1").with_level_cap(100);
        let mut series = CostSeries::new(curve);
        let purchase = series.bulk_purchase(98, &bn("1e50"));
        assert_eq!(purchase.count, 2);
        let expected = series.cost_at_level(98).add(&series.cost_at_level(99));
        assert_eq!(purchase.spent, expected);
    }

    #[test]
    fn test_bulk_purchase_matches_linear_accumulation() {
        let curve = CostCurve::geometric(BigNum::from_u64(10), "1.07");
        for levels in 0..60u64 {
            let mut pricing = CostSeries::new(curve.clone());
            let exact_total = pricing.total_cost(0, levels);
            for wallet in [
                exact_total.clone(),
                exact_total.add(&BigNum::one()),
                exact_total.sub(&BigNum::one()),
            ] {
                let (want_count, want_spent) =
                    brute_force(&mut CostSeries::new(curve.clone()), 0, u64::MAX, &wallet);
                let purchase = CostSeries::new(curve.clone()).bulk_purchase(0, &wallet);
                assert_eq!(purchase.count, want_count, "wallet covering {levels} levels");
                assert_eq!(purchase.spent, want_spent, "wallet covering {levels} levels");
            }
        }
    }

    #[test]
    fn test_bulk_purchase_from_mid_curve_matches_linear() {
        let curve = CostCurve::geometric(BigNum::from_u64(3), "1.2");
        let mut pricing = CostSeries::new(curve.clone());
        let wallet = pricing.total_cost(17, 31);
        let (want_count, want_spent) =
            brute_force(&mut CostSeries::new(curve.clone()), 17, u64::MAX, &wallet);
        let purchase = CostSeries::new(curve).bulk_purchase(17, &wallet);
        assert_eq!(purchase.count, want_count);
        assert_eq!(purchase.spent, want_spent);
    }

    #[test]
    fn test_bulk_purchase_across_milestones() {
        let curve = CostCurve::geometric(BigNum::from_u64(10), "1.5")
            .with_milestones(MilestoneStep::new(25, "4"))
            .with_level_cap(200);
        for levels in [1u64, 10, 24, 25, 26, 70, 150] {
            let mut pricing = CostSeries::new(curve.clone());
            let mut wallet = BigNum::zero();
            for level in 0..levels {
                wallet.accumulate(&pricing.cost_at_level(level));
            }
            let (want_count, want_spent) =
                brute_force(&mut CostSeries::new(curve.clone()), 0, 200, &wallet);
            let purchase = CostSeries::new(curve.clone()).bulk_purchase(0, &wallet);
            assert_eq!(purchase.count, want_count, "wallet covering {levels} levels");
            assert_eq!(purchase.spent, want_spent, "wallet covering {levels} levels");
        }
    }

    #[test]
    fn test_bulk_purchase_flat_with_milestones() {
        let curve = CostCurve::flat(BigNum::from_u64(5))
            .with_milestones(MilestoneStep::new(10, "2"))
            .with_level_cap(1000);
        // ten levels at 5, then seven at 10: exactly 120
        let purchase = CostSeries::new(curve).bulk_purchase(0, &bn("120"));
        assert_eq!(purchase.count, 17);
        assert_eq!(purchase.spent, bn("120"));
    }

    #[test]
    fn test_bulk_purchase_huge_wallet() {
        let mut series = CostSeries::new(CostCurve::geometric(BigNum::from_u64(10), "1.1"));
        let wallet = bn("1e300");
        let purchase = series.bulk_purchase(0, &wallet);
        assert!(purchase.spent <= wallet);
        assert!(purchase.count > 7190 && purchase.count < 7210, "count {}", purchase.count);
        // maximality: what remains cannot cover the next level
        let remaining = wallet.sub(&purchase.spent);
        assert!(purchase.next_price > remaining);
    }

    #[test]
    fn test_bulk_purchase_beyond_cache_reach() {
        let mut series = CostSeries::new(CostCurve::geometric(BigNum::from_u64(10), "1.1"));
        let wallet = series.cost_at_level(6000).mul_u64(10);
        let purchase = series.bulk_purchase(6000, &wallet);
        assert_eq!(purchase.count, 7);
        assert!(purchase.spent <= wallet);
    }

    #[test]
    fn test_bulk_purchase_flat_huge_wallet_hits_ceiling() {
        let mut series = CostSeries::new(CostCurve::flat(BigNum::from_u64(5)));
        let purchase = series.bulk_purchase(0, &bn("1e300"));
        assert_eq!(purchase.count, UNCAPPED_PURCHASE_CEILING);
        assert_eq!(purchase.spent, bn("5e9"));
    }

    #[test]
    fn test_zero_base_is_free() {
        let curve = CostCurve::geometric(BigNum::zero(), "1.5").with_level_cap(50);
        let purchase = CostSeries::new(curve).bulk_purchase(0, &bn("10"));
        assert_eq!(purchase.count, 50);
        assert!(purchase.spent.is_zero());
    }

    #[test]
    fn test_infinite_base_is_unaffordable() {
        let mut series = CostSeries::new(CostCurve::geometric(BigNum::infinite(), "1.5"));
        let purchase = series.bulk_purchase(0, &bn("1e300"));
        assert_eq!(purchase.count, 0);
        assert!(purchase.spent.is_zero());
        assert!(purchase.next_price.is_infinite());
    }

    #[test]
    fn test_cache_reset() {
        let mut series = CostSeries::new(CostCurve::geometric(BigNum::from_u64(10), "2"));
        series.cost_at_level(20);
        assert_eq!(series.cached_levels(), 21);
        series.reset_cache();
        assert_eq!(series.cached_levels(), 0);
        assert_eq!(series.cost_at_level(1), bn("20"));
    }

    #[test]
    fn test_series_ln_stable_branches() {
        // moderate x: direct expm1
        let small = series_ln(0.0, 0.1, 10);
        let expected: f64 = (0..10).map(|k| (0.1 * k as f64).exp()).sum();
        assert!((small - expected.ln()).abs() < 1e-12);
        // large x: asymptotic branch must not overflow
        let large = series_ln(10.0, 1.0, 10_000);
        assert!((large - (10.0 + 10_000.0 - ln_expm1(1.0))).abs() < 1e-9);
    }

    #[test]
    fn test_geometric_count_inverts_series() {
        let g = 1.1f64.ln();
        let p0 = 10f64.ln();
        for n in [1u64, 2, 10, 100, 5000, 100_000] {
            let wallet_ln = series_ln(p0, g, n);
            assert_eq!(geometric_count(p0, g, wallet_ln, u64::MAX), n, "n = {n}");
        }
    }
}
