use core::cmp::Ordering;
use core::fmt;
use core::iter::Sum;
use core::str::FromStr;

use num_bigint::{BigInt, BigUint, Sign};
use num_integer::Integer;
use num_traits::{FromPrimitive, ToPrimitive, Zero};

#[cfg(feature = "serde")]
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::ParseError;

/// Non-negative decimal number with a fixed count of significant digits and
/// an effectively unbounded base-10 exponent.
///
/// A finite nonzero value is `significand × 10^(T − precision + 1)` where the
/// significand carries exactly `precision` decimal digits and `T`, the true
/// exponent, is the base-10 exponent of the leading digit. `T` lives in an
/// IEEE double while it stays inside the double's exact-integer range and
/// spills into an arbitrary-precision offset beyond that, which is what lets
/// the type hold numbers like 10^(10^50).
///
/// Values are immutable: arithmetic returns new instances. There is no
/// division and no negative result anywhere in the API; subtraction floors at
/// zero and oversized magnitudes saturate to an infinite sentinel instead of
/// failing.
#[derive(Clone)]
pub struct BigNum {
    precision: u32,
    magnitude: Magnitude,
}

#[derive(Clone)]
enum Magnitude {
    Finite {
        significand: BigUint,
        exponent: f64,
        offset: BigInt,
    },
    Infinite,
}

// ============================================================================
// Constants
// ============================================================================

/// Significant digits retained when no explicit precision is requested.
pub const DEFAULT_PRECISION: u32 = 18;

/// Largest exponent magnitude kept in the `f64` field. An IEEE double holds
/// every integer up to 2^53 exactly; past 9e15 the whole exponent moves into
/// the big-integer offset.
const EXPONENT_SPLIT_LIMIT: f64 = 9.0e15;

/// True-exponent bounds applied when parsing plain or scientific decimal
/// text. These mirror what the same text would do parsed into a double:
/// above 308 the double is infinite, below -324 it is zero. The storage
/// format and arithmetic are exempt; they extend through the offset.
const PARSE_EXP_MAX: i64 = 308;
const PARSE_EXP_MIN: i64 = -324;

/// Exponent sentinel in the storage format marking an infinite value (2^53,
/// the first integer a double cannot hold exactly).
const STORAGE_EXP_INFINITE: i64 = 9_007_199_254_740_992;

/// Fractional digits accepted in a decimal multiplier string.
pub(crate) const MULTIPLIER_MAX_FRACTION: u32 = 9;

/// Exponent-difference margin beyond `precision` at which the smaller
/// operand of an addition or subtraction is dropped outright. Deterministic
/// by contract: serialized values must replay identically.
const NEGLIGIBLE_MARGIN: u64 = 2;

/// Largest true exponent for which an exact floored integer view will be
/// materialized. Past this the digit string itself would be absurd.
const INT_DIGITS_LIMIT: i64 = 20_000;

// ============================================================================
// Digit Helpers
// ============================================================================

pub(crate) fn pow10(k: u32) -> BigUint {
    BigUint::from(10u32).pow(k)
}

/// Count of decimal digits; zero has none.
fn decimal_digits(n: &BigUint) -> u64 {
    if n.is_zero() {
        return 0;
    }
    // bits-based estimate is exact or one low; a single compare settles it
    let estimate = ((n.bits() - 1) as f64 * core::f64::consts::LOG10_2) as u64 + 1;
    if *n >= pow10(estimate as u32) {
        estimate + 1
    } else {
        estimate
    }
}

/// Drop `drop` trailing decimal digits, rounding half up.
fn div_round_half_up(n: &BigUint, drop: u32) -> BigUint {
    if drop == 0 {
        return n.clone();
    }
    let divisor = pow10(drop);
    let (quotient, remainder) = n.div_rem(&divisor);
    if remainder * 2u32 >= divisor {
        quotient + 1u32
    } else {
        quotient
    }
}

/// Rescale a significand from one precision to another, rounding half up
/// when digits are dropped. Returns the new significand and the (possibly
/// carry-adjusted) true exponent.
fn rescale_sig(sig: &BigUint, true_exp: BigInt, from_p: u32, to_p: u32) -> (BigUint, BigInt) {
    match from_p.cmp(&to_p) {
        Ordering::Equal => (sig.clone(), true_exp),
        Ordering::Less => (sig * pow10(to_p - from_p), true_exp),
        Ordering::Greater => {
            let mut rounded = div_round_half_up(sig, from_p - to_p);
            if decimal_digits(&rounded) > to_p as u64 {
                // carry rippled all the way up; the result is exactly 10^to_p
                rounded /= 10u32;
                (rounded, true_exp + 1)
            } else {
                (rounded, true_exp)
            }
        }
    }
}

/// Split a true exponent into the canonical (f64, offset) pair.
fn split_exponent(true_exp: BigInt) -> (f64, BigInt) {
    match true_exp.to_i64() {
        Some(e) if (e.unsigned_abs() as f64) <= EXPONENT_SPLIT_LIMIT => (e as f64, BigInt::zero()),
        _ => (0.0, true_exp),
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl Default for BigNum {
    fn default() -> Self {
        Self::zero()
    }
}

impl BigNum {
    /// Zero at the default precision.
    #[inline]
    pub fn zero() -> Self {
        Self::zero_with_precision(DEFAULT_PRECISION)
    }

    /// Zero carrying an explicit precision.
    pub fn zero_with_precision(precision: u32) -> Self {
        Self {
            precision: precision.max(1),
            magnitude: Magnitude::Finite {
                significand: BigUint::zero(),
                exponent: 0.0,
                offset: BigInt::zero(),
            },
        }
    }

    /// One at the default precision.
    #[inline]
    pub fn one() -> Self {
        Self::from_u64(1)
    }

    /// The infinite sentinel. Absorbs every finite operand in addition and
    /// multiplication and never decreases under subtraction of a finite
    /// value.
    #[inline]
    pub fn infinite() -> Self {
        Self::infinite_with_precision(DEFAULT_PRECISION)
    }

    /// The infinite sentinel carrying an explicit precision.
    pub fn infinite_with_precision(precision: u32) -> Self {
        Self {
            precision: precision.max(1),
            magnitude: Magnitude::Infinite,
        }
    }

    /// Creates a BigNum from a machine integer.
    #[inline]
    pub fn from_u64(value: u64) -> Self {
        Self::from_u64_with_precision(value, DEFAULT_PRECISION)
    }

    /// Creates a BigNum from a machine integer at an explicit precision.
    pub fn from_u64_with_precision(value: u64, precision: u32) -> Self {
        Self::finite_from_raw(BigUint::from(value), BigInt::zero(), precision.max(1))
    }

    /// Normalizes a raw significand so it carries exactly `precision` digits,
    /// rounding half up when digits are dropped. `unit_exponent` is the
    /// base-10 exponent of the significand's least-significant digit.
    fn finite_from_raw(significand: BigUint, unit_exponent: BigInt, precision: u32) -> Self {
        if significand.is_zero() {
            return Self::zero_with_precision(precision);
        }
        let digits = decimal_digits(&significand);
        let mut true_exp = unit_exponent + BigInt::from(digits) - BigInt::from(1);
        let p = precision as u64;
        let significand = match digits.cmp(&p) {
            Ordering::Greater => {
                let mut sig = div_round_half_up(&significand, (digits - p) as u32);
                if decimal_digits(&sig) > p {
                    sig /= 10u32;
                    true_exp += 1;
                }
                sig
            }
            Ordering::Less => significand * pow10((p - digits) as u32),
            Ordering::Equal => significand,
        };
        let (exponent, offset) = split_exponent(true_exp);
        Self {
            precision,
            magnitude: Magnitude::Finite {
                significand,
                exponent,
                offset,
            },
        }
    }

    /// Rebuilds a finite value from a log10 magnitude. The double's ~16
    /// meaningful digits become the leading significand digits; the rest pad
    /// with zeros. Used where log-space math converts back to a value.
    pub(crate) fn from_log10(log10: f64, precision: u32) -> Self {
        if log10.is_nan() || log10 == f64::NEG_INFINITY {
            return Self::zero_with_precision(precision);
        }
        if log10 == f64::INFINITY {
            return Self::infinite_with_precision(precision);
        }
        let floor = log10.floor();
        let frac = log10 - floor;
        let mut sig = (10f64.powf(frac) * 1e14).round() as u64;
        let mut true_exp = match BigInt::from_f64(floor) {
            Some(t) => t,
            None => return Self::infinite_with_precision(precision),
        };
        if sig >= 1_000_000_000_000_000 {
            sig /= 10;
            true_exp += 1;
        }
        Self::finite_from_raw(BigUint::from(sig), true_exp - BigInt::from(14), precision)
    }
}

// ============================================================================
// Parsing
// ============================================================================

impl BigNum {
    /// Parses any accepted input form: plain integers (`"123"`), decimal
    /// and scientific notation (`"1.5e300"`), `"Infinity"`/`"inf"` in any
    /// case, and the type's own storage serialization (`"BN:…"`).
    ///
    /// # Errors
    /// Returns a `ParseError` for malformed text. The kernel never silently
    /// coerces bad input to zero; that choice belongs to the caller.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Self::parse_with_precision(s, DEFAULT_PRECISION)
    }

    /// Like [`BigNum::parse`] with an explicit precision for non-storage
    /// forms. Storage records always carry their own precision.
    pub fn parse_with_precision(s: &str, precision: u32) -> crate::Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ParseError::Empty);
        }
        if s.eq_ignore_ascii_case("infinity") || s.eq_ignore_ascii_case("inf") {
            return Ok(Self::infinite_with_precision(precision));
        }
        if let Some(fields) = s.strip_prefix("BN:") {
            return Self::from_storage_fields(fields);
        }
        Self::from_decimal_text(s, precision.max(1))
    }

    /// Plain or scientific decimal text. True exponents past the double
    /// range degrade the way a double parse would: too large is infinite,
    /// too small is zero.
    fn from_decimal_text(s: &str, precision: u32) -> crate::Result<Self> {
        let bytes = s.as_bytes();
        let mut idx = 0;
        if bytes.first() == Some(&b'+') {
            idx = 1;
        }

        let int_start = idx;
        while idx < bytes.len() && bytes[idx].is_ascii_digit() {
            idx += 1;
        }
        let int_part = &s[int_start..idx];

        let mut frac_part = "";
        if idx < bytes.len() && bytes[idx] == b'.' {
            idx += 1;
            let frac_start = idx;
            while idx < bytes.len() && bytes[idx].is_ascii_digit() {
                idx += 1;
            }
            frac_part = &s[frac_start..idx];
        }

        if int_part.is_empty() && frac_part.is_empty() {
            return Err(ParseError::InvalidFormat);
        }

        let mut exp: i64 = 0;
        let mut exp_overflow_sign: Option<Sign> = None;
        if idx < bytes.len() && (bytes[idx] == b'e' || bytes[idx] == b'E') {
            idx += 1;
            let negative = match bytes.get(idx) {
                Some(b'-') => {
                    idx += 1;
                    true
                }
                Some(b'+') => {
                    idx += 1;
                    false
                }
                _ => false,
            };
            let exp_start = idx;
            while idx < bytes.len() && bytes[idx].is_ascii_digit() {
                idx += 1;
            }
            let exp_text = &s[exp_start..idx];
            if exp_text.is_empty() {
                return Err(ParseError::InvalidExponent);
            }
            match exp_text.parse::<i64>() {
                Ok(magnitude) => exp = if negative { -magnitude } else { magnitude },
                // the digits alone overflow i64: the double would already be
                // infinite or zero, record which
                Err(_) => {
                    exp_overflow_sign = Some(if negative { Sign::Minus } else { Sign::Plus })
                }
            }
        }

        if idx != bytes.len() {
            return Err(ParseError::InvalidDigit);
        }

        let mut digits = String::with_capacity(int_part.len() + frac_part.len());
        digits.push_str(int_part);
        digits.push_str(frac_part);
        let stripped = digits.trim_start_matches('0');
        if stripped.is_empty() {
            return Ok(Self::zero_with_precision(precision));
        }

        match exp_overflow_sign {
            Some(Sign::Minus) => return Ok(Self::zero_with_precision(precision)),
            Some(_) => return Ok(Self::infinite_with_precision(precision)),
            None => {}
        }

        let unit_exp = exp.saturating_sub(frac_part.len() as i64);
        let true_exp = unit_exp.saturating_add(stripped.len() as i64 - 1);
        if true_exp > PARSE_EXP_MAX {
            return Ok(Self::infinite_with_precision(precision));
        }
        if true_exp < PARSE_EXP_MIN {
            return Ok(Self::zero_with_precision(precision));
        }

        let significand = stripped
            .parse::<BigUint>()
            .map_err(|_| ParseError::InvalidDigit)?;
        Ok(Self::finite_from_raw(
            significand,
            BigInt::from(unit_exp),
            precision,
        ))
    }

    /// The fields after the `BN:` tag: `<precision>:<digits>:<exp>[^<offset>]`.
    fn from_storage_fields(fields: &str) -> crate::Result<Self> {
        let mut parts = fields.splitn(3, ':');
        let precision = parts
            .next()
            .ok_or(ParseError::InvalidStorage("missing precision"))?
            .parse::<u32>()
            .map_err(|_| ParseError::InvalidStorage("precision is not an integer"))?;
        if precision == 0 || precision > 10_000 {
            return Err(ParseError::InvalidStorage("precision out of range"));
        }
        let digits = parts
            .next()
            .ok_or(ParseError::InvalidStorage("missing significand"))?;
        let exp_field = parts
            .next()
            .ok_or(ParseError::InvalidStorage("missing exponent"))?;

        let (exp_text, offset_text) = match exp_field.split_once('^') {
            Some((e, o)) => (e, Some(o)),
            None => (exp_field, None),
        };
        let exponent = exp_text
            .parse::<i64>()
            .map_err(|_| ParseError::InvalidStorage("exponent is not an integer"))?;
        if exponent == STORAGE_EXP_INFINITE {
            return Ok(Self::infinite_with_precision(precision));
        }

        let significand = digits
            .parse::<BigUint>()
            .map_err(|_| ParseError::InvalidStorage("significand is not an integer"))?;
        if significand.is_zero() {
            return Ok(Self::zero_with_precision(precision));
        }

        let offset = match offset_text {
            Some(o) => o
                .parse::<BigInt>()
                .map_err(|_| ParseError::InvalidStorage("offset is not an integer"))?,
            None => BigInt::zero(),
        };

        let true_exp = BigInt::from(exponent) + offset;
        let unit_exp = true_exp - BigInt::from(precision as i64 - 1);
        Ok(Self::finite_from_raw(significand, unit_exp, precision))
    }

    /// Serializes to the storage form, the sole contract with persistence:
    /// `BN:<precision>:<significand>:<exponent>[^<offset>]`, significand
    /// zero-padded to `precision` digits, offset omitted when zero, and a
    /// fixed large exponent sentinel for infinity.
    ///
    /// Round-trip safe: parsing the output reproduces an equal value with an
    /// identical storage string.
    pub fn to_storage(&self) -> String {
        match &self.magnitude {
            Magnitude::Infinite => {
                format!("BN:{}:0:{}", self.precision, STORAGE_EXP_INFINITE)
            }
            Magnitude::Finite {
                significand,
                exponent,
                offset,
            } => {
                let digits = significand.to_str_radix(10);
                let width = self.precision as usize;
                if offset.is_zero() {
                    format!("BN:{}:{:0>width$}:{}", self.precision, digits, *exponent as i64)
                } else {
                    format!(
                        "BN:{}:{:0>width$}:{}^{}",
                        self.precision, digits, *exponent as i64, offset
                    )
                }
            }
        }
    }
}

impl FromStr for BigNum {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ============================================================================
// Accessors
// ============================================================================

impl BigNum {
    /// Significant digits carried by this value.
    #[inline]
    pub fn precision(&self) -> u32 {
        self.precision
    }

    #[inline]
    pub fn is_infinite(&self) -> bool {
        matches!(self.magnitude, Magnitude::Infinite)
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        match &self.magnitude {
            Magnitude::Finite { significand, .. } => significand.is_zero(),
            Magnitude::Infinite => false,
        }
    }

    /// True exponent as an exact big integer. Finite nonzero values only;
    /// zero reports 0 and infinity has no exponent to report.
    pub(crate) fn true_exponent_int(&self) -> BigInt {
        match &self.magnitude {
            Magnitude::Finite {
                exponent, offset, ..
            } => BigInt::from(*exponent as i64) + offset,
            Magnitude::Infinite => BigInt::zero(),
        }
    }

    /// The significand as a digit string of exactly `precision` characters.
    /// Finite nonzero values only.
    pub(crate) fn significand_digits(&self) -> String {
        match &self.magnitude {
            Magnitude::Finite { significand, .. } => {
                let digits = significand.to_str_radix(10);
                let width = self.precision as usize;
                format!("{digits:0>width$}")
            }
            Magnitude::Infinite => String::new(),
        }
    }

    /// Base-10 logarithm as a double. Saturates: zero reports negative
    /// infinity, the infinite sentinel positive infinity. This is the bridge
    /// into the cost solver's log-space math and is approximate by nature.
    pub fn approx_log10(&self) -> f64 {
        match &self.magnitude {
            Magnitude::Infinite => f64::INFINITY,
            Magnitude::Finite {
                significand,
                exponent,
                offset,
            } => {
                if significand.is_zero() {
                    return f64::NEG_INFINITY;
                }
                let sig = significand.to_f64().unwrap_or(f64::INFINITY);
                let sig_log = sig.log10() - (self.precision as f64 - 1.0);
                let off = offset.to_f64().unwrap_or(match offset.sign() {
                    Sign::Minus => f64::NEG_INFINITY,
                    _ => f64::INFINITY,
                });
                exponent + off + sig_log
            }
        }
    }

    /// Natural logarithm, derived from [`BigNum::approx_log10`].
    pub(crate) fn approx_ln(&self) -> f64 {
        self.approx_log10() * core::f64::consts::LN_10
    }

    /// Exact floored integer view, when one can reasonably exist: `None` for
    /// infinity or for exponents so large the digit string would be
    /// unreasonable to materialize.
    pub(crate) fn to_integer_digits(&self) -> Option<BigUint> {
        match &self.magnitude {
            Magnitude::Infinite => None,
            Magnitude::Finite { significand, .. } => {
                if significand.is_zero() {
                    return Some(BigUint::zero());
                }
                let true_exp = self.true_exponent_int();
                if true_exp.sign() == Sign::Minus {
                    return Some(BigUint::zero());
                }
                let t = true_exp.to_i64().filter(|t| *t <= INT_DIGITS_LIMIT)?;
                let p = self.precision as i64 - 1;
                if t >= p {
                    Some(significand * pow10((t - p) as u32))
                } else {
                    Some(significand / pow10((p - t) as u32))
                }
            }
        }
    }

    /// Rebuilds this value at a different precision, rounding half up if
    /// digits are dropped.
    pub fn rescaled(&self, precision: u32) -> Self {
        let precision = precision.max(1);
        match &self.magnitude {
            Magnitude::Infinite => Self::infinite_with_precision(precision),
            Magnitude::Finite { significand, .. } => {
                if significand.is_zero() {
                    return Self::zero_with_precision(precision);
                }
                let (sig, true_exp) = rescale_sig(
                    significand,
                    self.true_exponent_int(),
                    self.precision,
                    precision,
                );
                let (exponent, offset) = split_exponent(true_exp);
                Self {
                    precision,
                    magnitude: Magnitude::Finite {
                        significand: sig,
                        exponent,
                        offset,
                    },
                }
            }
        }
    }
}

// ============================================================================
// Comparison
// ============================================================================

impl BigNum {
    /// Total order: ∞ equals ∞ and exceeds every finite value; zero is below
    /// every nonzero value; otherwise true exponents decide (compared as
    /// exact big integers whenever an offset is in play) with significands
    /// breaking ties.
    fn cmp_magnitude(&self, other: &Self) -> Ordering {
        match (&self.magnitude, &other.magnitude) {
            (Magnitude::Infinite, Magnitude::Infinite) => Ordering::Equal,
            (Magnitude::Infinite, Magnitude::Finite { .. }) => Ordering::Greater,
            (Magnitude::Finite { .. }, Magnitude::Infinite) => Ordering::Less,
            (
                Magnitude::Finite {
                    significand: sa,
                    exponent: ea,
                    offset: oa,
                },
                Magnitude::Finite {
                    significand: sb,
                    exponent: eb,
                    offset: ob,
                },
            ) => match (sa.is_zero(), sb.is_zero()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                (false, false) => {
                    let exp_order = if oa.is_zero() && ob.is_zero() {
                        // fast path: exponents are exact integers in doubles
                        ea.partial_cmp(eb).unwrap_or(Ordering::Equal)
                    } else {
                        self.true_exponent_int().cmp(&other.true_exponent_int())
                    };
                    match exp_order {
                        Ordering::Equal => {
                            cmp_significands(sa, self.precision, sb, other.precision)
                        }
                        order => order,
                    }
                }
            },
        }
    }
}

/// Compare significands that may carry different precisions by scaling the
/// shorter one onto the longer one's digit grid.
fn cmp_significands(a: &BigUint, pa: u32, b: &BigUint, pb: u32) -> Ordering {
    match pa.cmp(&pb) {
        Ordering::Equal => a.cmp(b),
        Ordering::Less => (a * pow10(pb - pa)).cmp(b),
        Ordering::Greater => a.cmp(&(b * pow10(pa - pb))),
    }
}

impl PartialEq for BigNum {
    fn eq(&self, other: &Self) -> bool {
        self.cmp_magnitude(other) == Ordering::Equal
    }
}

impl Eq for BigNum {}

impl PartialOrd for BigNum {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp_magnitude(other))
    }
}

impl Ord for BigNum {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_magnitude(other)
    }
}

// ============================================================================
// Arithmetic - Addition and Subtraction
// ============================================================================

impl BigNum {
    /// Addition. The left operand's precision carries into the result.
    ///
    /// An operand whose exponent trails the other's by more than
    /// `precision + 2` digits contributes nothing at the retained precision
    /// and is dropped; this cutoff is deterministic and part of the numeric
    /// contract.
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn add(&self, rhs: &Self) -> Self {
        let precision = self.precision;
        if self.is_infinite() || rhs.is_infinite() {
            return Self::infinite_with_precision(precision);
        }
        if rhs.is_zero() {
            return self.clone();
        }
        if self.is_zero() {
            return rhs.rescaled(precision);
        }

        let (sa, ta) = self.aligned_parts(precision);
        let (sb, tb) = rhs.aligned_parts(precision);
        let (hi_sig, hi_exp, lo_sig, lo_exp) =
            if ta >= tb { (sa, ta, sb, tb) } else { (sb, tb, sa, ta) };

        let gap = &hi_exp - lo_exp;
        let shift = match gap.to_u64() {
            Some(g) if g <= precision as u64 + NEGLIGIBLE_MARGIN => g as u32,
            _ => {
                // the smaller operand is negligible at this precision
                let (exponent, offset) = split_exponent(hi_exp);
                return Self {
                    precision,
                    magnitude: Magnitude::Finite {
                        significand: hi_sig,
                        exponent,
                        offset,
                    },
                };
            }
        };

        let sum = hi_sig + div_round_half_up(&lo_sig, shift);
        let unit_exp = hi_exp - BigInt::from(precision as i64 - 1);
        Self::finite_from_raw(sum, unit_exp, precision)
    }

    /// Subtraction, floored at zero: whenever the subtrahend compares at or
    /// above the minuend the result is zero. ∞ − ∞ is zero by the same rule;
    /// ∞ minus any finite value stays ∞.
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn sub(&self, rhs: &Self) -> Self {
        let precision = self.precision;
        match (&self.magnitude, &rhs.magnitude) {
            (Magnitude::Infinite, Magnitude::Infinite) => Self::zero_with_precision(precision),
            (Magnitude::Infinite, Magnitude::Finite { .. }) => self.clone(),
            _ => {
                if rhs.is_zero() {
                    return self.clone();
                }
                if self.cmp_magnitude(rhs) != Ordering::Greater {
                    return Self::zero_with_precision(precision);
                }

                let (sa, ta) = self.aligned_parts(precision);
                let (sb, tb) = rhs.aligned_parts(precision);
                let gap = &ta - tb;
                let shift = match gap.to_u64() {
                    Some(g) if g <= precision as u64 + NEGLIGIBLE_MARGIN => g as u32,
                    _ => return self.clone(),
                };

                let aligned = div_round_half_up(&sb, shift);
                if aligned >= sa {
                    return Self::zero_with_precision(precision);
                }
                let unit_exp = ta - BigInt::from(precision as i64 - 1);
                Self::finite_from_raw(sa - aligned, unit_exp, precision)
            }
        }
    }

    /// In-place accumulation; behaves exactly like [`BigNum::add`] and
    /// exists as a convenience for summation loops.
    pub fn accumulate(&mut self, rhs: &Self) {
        *self = self.add(rhs);
    }

    /// Significand and true exponent with the significand rescaled to the
    /// requested precision. Finite nonzero receivers only.
    fn aligned_parts(&self, precision: u32) -> (BigUint, BigInt) {
        match &self.magnitude {
            Magnitude::Finite { significand, .. } => rescale_sig(
                significand,
                self.true_exponent_int(),
                self.precision,
                precision,
            ),
            Magnitude::Infinite => (BigUint::zero(), BigInt::zero()),
        }
    }
}

impl Sum for BigNum {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), |acc, x| acc.add(&x))
    }
}

impl<'a> Sum<&'a BigNum> for BigNum {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), |acc, x| acc.add(x))
    }
}

// ============================================================================
// Arithmetic - Multiplication
// ============================================================================

impl BigNum {
    /// Multiplication by another BigNum: significands multiply, exponents
    /// and offsets add. Zero dominates, including `0 × ∞ = 0`; otherwise an
    /// infinite operand makes the product infinite.
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn mul(&self, rhs: &Self) -> Self {
        let precision = self.precision;
        if self.is_zero() || rhs.is_zero() {
            return Self::zero_with_precision(precision);
        }
        match (&self.magnitude, &rhs.magnitude) {
            (Magnitude::Infinite, _) | (_, Magnitude::Infinite) => {
                Self::infinite_with_precision(precision)
            }
            (
                Magnitude::Finite { significand: sa, .. },
                Magnitude::Finite { significand: sb, .. },
            ) => {
                let unit_a = self.true_exponent_int() - BigInt::from(self.precision as i64 - 1);
                let unit_b = rhs.true_exponent_int() - BigInt::from(rhs.precision as i64 - 1);
                Self::finite_from_raw(sa * sb, unit_a + unit_b, precision)
            }
        }
    }

    /// Multiplication by a machine integer.
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn mul_u64(&self, factor: u64) -> Self {
        if factor == 0 || self.is_zero() {
            return Self::zero_with_precision(self.precision);
        }
        match &self.magnitude {
            Magnitude::Infinite => self.clone(),
            Magnitude::Finite { significand, .. } => {
                let unit_exp =
                    self.true_exponent_int() - BigInt::from(self.precision as i64 - 1);
                Self::finite_from_raw(significand * factor, unit_exp, self.precision)
            }
        }
    }

    /// Multiplication by a decimal multiplier string with at most nine
    /// fractional digits, e.g. `"1.15"`. The multiplier becomes an exact
    /// numerator/scale pair, so repeated growth steps stay reproducible.
    ///
    /// # Errors
    /// `ParseError` if the multiplier is malformed or carries too many
    /// fractional digits.
    pub fn mul_decimal_str(&self, multiplier: &str) -> crate::Result<Self> {
        let (numerator, scale) = parse_multiplier(multiplier)?;
        Ok(self.mul_fraction(&numerator, scale))
    }

    /// Core of [`BigNum::mul_decimal_str`]: multiply by an already-parsed
    /// `numerator / 10^scale` pair. Callers that apply the same multiplier
    /// thousands of times hold the pair instead of reparsing.
    pub(crate) fn mul_fraction(&self, numerator: &BigUint, scale: u32) -> Self {
        if numerator.is_zero() || self.is_zero() {
            return Self::zero_with_precision(self.precision);
        }
        match &self.magnitude {
            Magnitude::Infinite => self.clone(),
            Magnitude::Finite { significand, .. } => {
                let unit_exp = self.true_exponent_int()
                    - BigInt::from(self.precision as i64 - 1)
                    - BigInt::from(scale);
                Self::finite_from_raw(significand * numerator, unit_exp, self.precision)
            }
        }
    }
}

/// Parse a plain decimal multiplier into an integer numerator and the count
/// of fractional digits it carried.
pub(crate) fn parse_multiplier(s: &str) -> crate::Result<(BigUint, u32)> {
    let s = s.trim();
    if s.is_empty() {
        return Err(ParseError::Empty);
    }
    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, f),
        None => (s, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(ParseError::InvalidFormat);
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit())
        || !frac_part.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(ParseError::InvalidDigit);
    }
    if frac_part.len() as u32 > MULTIPLIER_MAX_FRACTION {
        return Err(ParseError::TooManyFractionDigits(MULTIPLIER_MAX_FRACTION));
    }
    let mut digits = String::with_capacity(int_part.len() + frac_part.len());
    digits.push_str(int_part);
    digits.push_str(frac_part);
    let numerator = if digits.bytes().all(|b| b == b'0') {
        BigUint::zero()
    } else {
        digits
            .trim_start_matches('0')
            .parse::<BigUint>()
            .map_err(|_| ParseError::InvalidDigit)?
    };
    Ok((numerator, frac_part.len() as u32))
}

// ============================================================================
// Flooring
// ============================================================================

impl BigNum {
    /// Zeroes the fractional digits implied by a true exponent below
    /// `precision − 1`. A no-op when the value is already integral at the
    /// retained precision; values below one floor to zero.
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn floor_to_integer(&self) -> Self {
        match &self.magnitude {
            Magnitude::Infinite => self.clone(),
            Magnitude::Finite {
                significand,
                exponent,
                offset,
            } => {
                if significand.is_zero() {
                    return self.clone();
                }
                let true_exp = self.true_exponent_int();
                if true_exp >= BigInt::from(self.precision as i64 - 1) {
                    return self.clone();
                }
                if true_exp.sign() == Sign::Minus {
                    return Self::zero_with_precision(self.precision);
                }
                // 0 <= T < precision - 1, so this fits comfortably
                let t = true_exp.to_i64().unwrap_or(0);
                let keep = pow10((self.precision as i64 - 1 - t) as u32);
                let floored = (significand / &keep) * &keep;
                Self {
                    precision: self.precision,
                    magnitude: Magnitude::Finite {
                        significand: floored,
                        exponent: *exponent,
                        offset: offset.clone(),
                    },
                }
            }
        }
    }
}

// ============================================================================
// Display / Debug
// ============================================================================

impl fmt::Display for BigNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::format::format_value(self))
    }
}

impl fmt::Debug for BigNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            // {:#?} shows raw internals
            match &self.magnitude {
                Magnitude::Infinite => f
                    .debug_struct("BigNum")
                    .field("precision", &self.precision)
                    .field("infinite", &true)
                    .finish(),
                Magnitude::Finite {
                    significand,
                    exponent,
                    offset,
                } => f
                    .debug_struct("BigNum")
                    .field("precision", &self.precision)
                    .field("significand", &significand.to_str_radix(10))
                    .field("exponent", exponent)
                    .field("offset", &offset.to_str_radix(10))
                    .finish(),
            }
        } else {
            // {:?} shows the storage form
            write!(f, "BigNum({})", self.to_storage())
        }
    }
}

// ============================================================================
// Serde Support
// ============================================================================

#[cfg(feature = "serde")]
impl Serialize for BigNum {
    fn serialize<S>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // the storage string IS the wire contract, human-readable or not
        serializer.serialize_str(&self.to_storage())
    }
}

#[cfg(feature = "serde")]
impl<'de> Deserialize<'de> for BigNum {
    fn deserialize<D>(deserializer: D) -> core::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(de::Error::custom)
    }
}

// ============================================================================
// Tests
// ============================================================================


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_bignum() -> impl Strategy<Value = BigNum> {
        (100_000_000_000_000_000u64..=999_999_999_999_999_999u64, -500i64..500i64).prop_map(
            |(sig, exp)| {
                BigNum::parse(&format!("BN:18:{sig}:{exp}")).unwrap()
            },
        )
    }

    proptest! {
        #[test]
        fn prop_storage_round_trip(v in arb_bignum()) {
            let stored = v.to_storage();
            let back = BigNum::parse(&stored).unwrap();
            prop_assert_eq!(&back, &v);
            prop_assert_eq!(back.to_storage(), stored);
        }

        #[test]
        fn prop_add_is_monotonic(a in arb_bignum(), b in arb_bignum()) {
            prop_assert!(a.add(&b) >= a);
        }

        #[test]
        fn prop_add_commutes(a in arb_bignum(), b in arb_bignum()) {
            prop_assert_eq!(a.add(&b), b.add(&a));
        }

        #[test]
        fn prop_sub_floors_at_zero(a in arb_bignum(), b in arb_bignum()) {
            if a <= b {
                prop_assert!(a.sub(&b).is_zero());
            } else {
                prop_assert!(a.sub(&b) <= a);
            }
        }

        #[test]
        fn prop_mul_identity(a in arb_bignum()) {
            prop_assert_eq!(a.mul(&BigNum::one()), a);
        }

        #[test]
        fn prop_mul_zero(a in arb_bignum()) {
            prop_assert!(a.mul(&BigNum::zero()).is_zero());
        }

        #[test]
        fn prop_cmp_agrees_with_sub(a in arb_bignum(), b in arb_bignum()) {
            if a.sub(&b).is_zero() && b.sub(&a).is_zero() {
                prop_assert_eq!(a, b);
            }
        }
    }
}
