//! Display rendering for [`BigNum`] values.
//!
//! Pure functions, no side effects: a value renders as a grouped plain
//! integer while it is small, as a 4-significant-digit short-scale suffix
//! (`1.000M` … `9.999Ce`) through 10^305, as scientific notation past the
//! suffix table, and — once the exponent itself is too long to print — with
//! the exponent recursively rendered by the same rules (`1.234e10.00M`).
//!
//! Every rounding and carry in this module runs on decimal digit strings.
//! Exponents can be hundreds of digits long; pushing them through a double
//! would shred exactly the digits being displayed.

use num_bigint::{BigInt, Sign};
use num_traits::ToPrimitive;

use crate::BigNum;

/// Token displayed for the infinite sentinel.
pub const INFINITY_SYMBOL: &str = "∞";

/// True exponents below this render as grouped plain integers.
const PLAIN_EXPONENT_LIMIT: i64 = 6;

/// Last true exponent the suffix table covers (`Ce` spans 10^303..10^305).
const SUFFIX_EXPONENT_LIMIT: i64 = 305;

/// Significant digits shown in suffix and scientific mantissas.
const MANTISSA_DIGITS: usize = 4;

/// Exponents up to this many digits print as-is; longer ones recurse.
const EXPONENT_PLAIN_DIGITS: usize = 6;

// Short-scale names every third decade starting at 10^6, composed the usual
// way: nine standalone tiers, then unit-prefixed families of ten through
// 10^300, and the centillion closing the table at 10^303.
const FIRST_TIERS: [&str; 9] = ["M", "B", "T", "Qa", "Qi", "Sx", "Sp", "Oc", "No"];
const UNIT_PREFIXES: [&str; 10] = ["", "U", "D", "T", "Qa", "Qi", "Sx", "Sp", "O", "N"];
const TENS_FAMILIES: [&str; 9] = ["Dc", "Vg", "Tg", "Qd", "Qt", "Se", "St", "Og", "Ng"];

/// Renders a value for the player. Fractional parts are floored away: the
/// game displays whole units of currency.
pub fn format_value(n: &BigNum) -> String {
    if n.is_infinite() {
        return INFINITY_SYMBOL.to_owned();
    }
    if n.is_zero() {
        return "0".to_owned();
    }
    let sig = n.significand_digits();
    let true_exp = n.true_exponent_int();
    if true_exp.sign() == Sign::Minus {
        // below one: nothing whole to show
        return "0".to_owned();
    }
    if let Some(t) = true_exp.to_i64() {
        if t < PLAIN_EXPONENT_LIMIT {
            return plain_integer(&sig, t);
        }
        if t <= SUFFIX_EXPONENT_LIMIT {
            return suffix_notation(&sig, t);
        }
    }
    scientific_notation(&sig, &true_exp)
}

/// Short-scale suffix for tier `rank`, counting `M` as rank zero.
fn suffix_for_rank(rank: i64) -> Option<String> {
    match rank {
        0..=8 => Some(FIRST_TIERS[rank as usize].to_owned()),
        9..=98 => {
            let k = (rank - 9) as usize;
            Some(format!("{}{}", UNIT_PREFIXES[k % 10], TENS_FAMILIES[k / 10]))
        }
        99 => Some("Ce".to_owned()),
        _ => None,
    }
}

/// The floored integer digits, comma-grouped. `t` is the exponent of the
/// leading digit, so the integer part is `t + 1` digits wide.
fn plain_integer(sig: &str, t: i64) -> String {
    let width = (t + 1) as usize;
    let digits = if width <= sig.len() {
        sig[..width].to_owned()
    } else {
        // low precision: the trailing places are zeros by construction
        format!("{sig:0<width$}")
    };
    group_thousands(&digits)
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    let lead = digits.len() % 3;
    if lead > 0 {
        out.push_str(&digits[..lead]);
    }
    for chunk in digits[lead..].as_bytes().chunks(3) {
        if !out.is_empty() {
            out.push(',');
        }
        out.push_str(core::str::from_utf8(chunk).unwrap_or(""));
    }
    out
}

/// `<4-digit mantissa><suffix>`, with the mantissa's decimal point placed by
/// `t mod 3`. A rounding carry can bump the tier, possibly right out of the
/// suffix table.
fn suffix_notation(sig: &str, mut t: i64) -> String {
    let (mantissa, carried) = round_mantissa(sig, MANTISSA_DIGITS);
    if carried {
        t += 1;
    }
    if t > SUFFIX_EXPONENT_LIMIT {
        return assemble_scientific(&mantissa, &t.to_string());
    }
    let int_len = (t % 3) as usize + 1;
    match suffix_for_rank(t / 3 - 2) {
        Some(suffix) => format!("{}{}", place_point(&mantissa, int_len), suffix),
        None => assemble_scientific(&mantissa, &t.to_string()),
    }
}

/// `<mantissa>e<exponent>`; the exponent renders plainly while short and
/// through the suffix/scientific rules, recursively, once it is not.
fn scientific_notation(sig: &str, true_exp: &BigInt) -> String {
    let (mantissa, carried) = round_mantissa(sig, MANTISSA_DIGITS);
    let exp_digits = if carried {
        (true_exp + 1u32).to_str_radix(10)
    } else {
        true_exp.to_str_radix(10)
    };
    assemble_scientific(&mantissa, &exp_digits)
}

fn assemble_scientific(mantissa: &str, exp_digits: &str) -> String {
    format!(
        "{}e{}",
        place_point(mantissa, 1),
        format_exponent_digits(exp_digits)
    )
}

/// Renders an exponent given as a plain digit string. Short exponents pass
/// through; long ones get the suffix/scientific treatment, recursing for as
/// long as it takes.
fn format_exponent_digits(digits: &str) -> String {
    if digits.len() <= EXPONENT_PLAIN_DIGITS {
        return digits.to_owned();
    }
    let mut t = digits.len() as u64 - 1;
    let (mantissa, carried) = round_mantissa(digits, MANTISSA_DIGITS);
    if carried {
        t += 1;
    }
    if t <= SUFFIX_EXPONENT_LIMIT as u64 {
        let int_len = (t % 3) as usize + 1;
        if let Some(suffix) = suffix_for_rank(t as i64 / 3 - 2) {
            return format!("{}{}", place_point(&mantissa, int_len), suffix);
        }
    }
    format!(
        "{}e{}",
        place_point(&mantissa, 1),
        format_exponent_digits(&t.to_string())
    )
}

/// First `keep` digits of `digits`, rounded half up against the next digit.
/// The carry flag reports a ripple past the leading digit ("9999" → "1000",
/// one decade higher). Short inputs pad with zeros instead.
fn round_mantissa(digits: &str, keep: usize) -> (String, bool) {
    if digits.len() <= keep {
        return (format!("{digits:0<keep$}"), false);
    }
    let head = &digits[..keep];
    if digits.as_bytes()[keep] < b'5' {
        return (head.to_owned(), false);
    }
    increment_digits(head)
}

/// Add one to a digit string. On overflow the result is one digit longer
/// ("999" → "1000") and is truncated back to the input width, flagged.
fn increment_digits(digits: &str) -> (String, bool) {
    let mut bytes = digits.as_bytes().to_vec();
    for i in (0..bytes.len()).rev() {
        if bytes[i] == b'9' {
            bytes[i] = b'0';
        } else {
            bytes[i] += 1;
            return (String::from_utf8(bytes).unwrap_or_default(), false);
        }
    }
    // every digit was a nine: "1" followed by zeros, clipped to width
    bytes.insert(0, b'1');
    bytes.truncate(digits.len());
    (String::from_utf8(bytes).unwrap_or_default(), true)
}

fn place_point(mantissa: &str, int_len: usize) -> String {
    if int_len >= mantissa.len() {
        mantissa.to_owned()
    } else {
        format!("{}.{}", &mantissa[..int_len], &mantissa[int_len..])
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(s: &str) -> String {
        format_value(&BigNum::parse(s).unwrap())
    }

    #[test]
    fn test_sentinels() {
        assert_eq!(format_value(&BigNum::infinite()), "∞");
        assert_eq!(format_value(&BigNum::zero()), "0");
    }

    #[test]
    fn test_plain_integers() {
        assert_eq!(fmt("10"), "10");
        assert_eq!(fmt("1234"), "1,234");
        assert_eq!(fmt("999999"), "999,999");
        assert_eq!(fmt("123456.78"), "123,456");
    }

    #[test]
    fn test_below_one_floors_to_zero() {
        assert_eq!(fmt("0.9"), "0");
        assert_eq!(fmt("1e-50"), "0");
    }

    #[test]
    fn test_suffix_tiers() {
        assert_eq!(fmt("1000000"), "1.000M");
        assert_eq!(fmt("1234567"), "1.235M");
        assert_eq!(fmt("12345678"), "12.35M");
        assert_eq!(fmt("1.5e9"), "1.500B");
        assert_eq!(fmt("1e12"), "1.000T");
        assert_eq!(fmt("1e15"), "1.000Qa");
        assert_eq!(fmt("1e30"), "1.000No");
        assert_eq!(fmt("1e33"), "1.000Dc");
        assert_eq!(fmt("1e36"), "1.000UDc");
        assert_eq!(fmt("1e63"), "1.000Vg");
        assert_eq!(fmt("1e66"), "1.000UVg");
        assert_eq!(fmt("1e303"), "1.000Ce");
        assert_eq!(fmt("1e305"), "100.0Ce");
    }

    #[test]
    fn test_suffix_rounding_half_up() {
        assert_eq!(fmt("1234499"), "1.234M");
        assert_eq!(fmt("1234500"), "1.235M");
    }

    #[test]
    fn test_suffix_carry_ripples_into_next_tier() {
        assert_eq!(fmt("999999999"), "1.000B");
        assert_eq!(fmt("999960000"), "1.000B");
        assert_eq!(fmt("999940000"), "999.9M");
    }

    #[test]
    fn test_carry_out_of_suffix_table() {
        // 9.9999e305 rounds past the table's last tier
        assert_eq!(fmt("9.9999e305"), "1.000e306");
    }

    #[test]
    fn test_scientific() {
        assert_eq!(fmt("1e306"), "1.000e306");
        assert_eq!(fmt("2.5e1000"), "2.500e1000");
        assert_eq!(fmt("123456e306"), "1.235e311");
    }

    #[test]
    fn test_nested_exponent_suffix() {
        let v = BigNum::parse("BN:18:100000000000000000:10000000").unwrap();
        assert_eq!(format_value(&v), "1.000e10.00M");
    }

    #[test]
    fn test_nested_exponent_from_offset() {
        // true exponent 10^50: fifty-one digits, rendered through the table
        let offset = format!("1{}", "0".repeat(50));
        let v = BigNum::parse(&format!("BN:18:250000000000000000:0^{offset}")).unwrap();
        assert_eq!(format_value(&v), "2.500e100.0QiDc");
    }

    #[test]
    fn test_doubly_nested_exponent() {
        // an exponent of 10^1000000 needs a second level of nesting, and the
        // inner exponent (a million) is itself past the plain-digit limit
        let offset = format!("1{}", "0".repeat(1_000_000));
        let v = BigNum::parse(&format!("BN:18:100000000000000000:0^{offset}")).unwrap();
        assert_eq!(format_value(&v), "1.000e1.000e1.000M");
    }

    #[test]
    fn test_round_mantissa_digit_strings() {
        assert_eq!(round_mantissa("123456", 4), ("1234".to_owned(), false));
        assert_eq!(round_mantissa("123456", 3), ("123".to_owned(), false));
        assert_eq!(round_mantissa("12355", 4), ("1236".to_owned(), false));
        assert_eq!(round_mantissa("99995", 4), ("1000".to_owned(), true));
        assert_eq!(round_mantissa("12", 4), ("1200".to_owned(), false));
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands("1"), "1");
        assert_eq!(group_thousands("123"), "123");
        assert_eq!(group_thousands("1234"), "1,234");
        assert_eq!(group_thousands("1234567"), "1,234,567");
    }

    #[test]
    fn test_display_delegates_here() {
        assert_eq!(BigNum::from_u64(1_000_000).to_string(), "1.000M");
    }
}
