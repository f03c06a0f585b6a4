//! Arbitrary-magnitude decimal arithmetic for incremental games
//!
//! This library provides the numeric kernel an idle/incremental game builds
//! its economy on:
//!
//! - **`BigNum`**: a non-negative decimal number whose base-10 exponent may
//!   itself be astronomically large
//!   - Significand: a fixed number of significant digits (default 18)
//!   - Exponent: an IEEE double extended by an arbitrary-precision offset,
//!     so values like 10^(10^50) are representable without overflow
//!   - Saturates to an infinite sentinel instead of failing
//! - **Formatting** (`format` module): plain grouped integers, short-scale
//!   suffix notation (`1.000M` … `9.999Ce`), scientific notation, and
//!   recursively nested exponents (`1.234e10.00M`) for numbers whose
//!   exponent no longer fits on screen
//! - **Cost solving** (`cost` module): for upgrade prices growing
//!   geometrically per level, answers "how many levels can this wallet buy,
//!   and what do they cost" in closed form instead of iterating when the
//!   answer may exceed 10^300
//!
//! ## Features
//!
//! - **Total arithmetic**: no division, no negative results, no overflow
//!   errors; extreme magnitudes degrade to zero or infinity deterministically
//! - **Round-trip safe storage**: the `BN:` string form is the sole contract
//!   with persistence layers
//! - **Serde support**: optional, carrying the storage string
//!
//! ## Example
//!
//! ```rust
//! use vastdec::{BigNum, CostCurve, CostSeries};
//!
//! let wallet: BigNum = "1.5e300".parse().unwrap();
//! let price = BigNum::from_u64(10);
//!
//! let curve = CostCurve::geometric(price, "1.15");
//! let mut series = CostSeries::new(curve);
//!
//! let purchase = series.bulk_purchase(0, &wallet);
//! assert!(purchase.spent <= wallet);
//! ```

mod bignum;
mod cost;
pub mod format;

pub use bignum::BigNum;
pub use cost::{CostCurve, CostSeries, MilestoneStep, Purchase};

use thiserror::Error;

/// Errors raised at the parsing boundary.
///
/// Arithmetic itself is total and never returns these; only construction from
/// text can fail. Callers that must survive corrupted input catch these and
/// substitute a default rather than crashing the game.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty input")]
    Empty,

    #[error("invalid character in numeric string")]
    InvalidDigit,

    #[error("malformed decimal or scientific notation")]
    InvalidFormat,

    #[error("exponent field is not a valid integer")]
    InvalidExponent,

    #[error("malformed storage record: {0}")]
    InvalidStorage(&'static str),

    #[error("multiplier carries more than {0} fractional digits")]
    TooManyFractionDigits(u32),
}

pub type Result<T> = core::result::Result<T, ParseError>;
