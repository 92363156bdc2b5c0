//! Money helpers
//!
//! All amounts are integer paise (1 rupee = 100 paise). Commission rates are
//! basis points (1% = 100 bps).

/// Basis points in 100%
pub const BPS_DENOMINATOR: i64 = 10_000;

/// Render paise as a rupee string with two decimals, e.g. `123450` → `"1234.50"`
pub fn format_paise(paise: i64) -> String {
    let sign = if paise < 0 { "-" } else { "" };
    let abs = paise.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

/// Portion of `amount_paise` at `bps` basis points, rounded down
pub fn apply_bps(amount_paise: i64, bps: i64) -> i64 {
    // i128 keeps large balances from overflowing the intermediate product
    ((amount_paise as i128 * bps as i128) / BPS_DENOMINATOR as i128) as i64
}
