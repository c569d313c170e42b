use alloy_primitives::U256;
use anyhow::{Result, bail};
use rust_decimal::Decimal;

/// Decimals of the native coin on every supported chain (wei, jager, ...).
pub const NATIVE_DECIMALS: u32 = 18;

fn unit_scale(decimals: u32) -> U256 {
    U256::from(10u64).pow(U256::from(decimals))
}

/// Convert a whole-coin decimal (e.g. `0.02`) into base units without rounding.
///
/// Fails for negative values and for values carrying more fractional digits
/// than the chain can represent.
pub fn to_base_units(value: Decimal) -> Result<U256> {
    if value.is_sign_negative() && !value.is_zero() {
        bail!("amount {value} is negative");
    }
    let value = value.normalize();
    let scale = value.scale();
    if scale > NATIVE_DECIMALS {
        bail!("amount {value} has more than {NATIVE_DECIMALS} fractional digits");
    }
    let mantissa = value.mantissa().unsigned_abs();
    Ok(U256::from(mantissa) * unit_scale(NATIVE_DECIMALS - scale))
}

/// Render base units as a whole-coin decimal string.
///
/// Integer division only: `20000000000000000` → `"0.02"`, `10^18` → `"1.0"`.
pub fn format_units(value: U256) -> String {
    let scale = unit_scale(NATIVE_DECIMALS);
    let whole = value / scale;
    let frac = value % scale;
    let digits = format!("{:0>width$}", frac.to_string(), width = NATIVE_DECIMALS as usize);
    let trimmed = digits.trim_end_matches('0');
    if trimmed.is_empty() {
        format!("{whole}.0")
    } else {
        format!("{whole}.{trimmed}")
    }
}

/// Absolute difference of two amounts.
pub fn abs_diff(a: U256, b: U256) -> U256 {
    if a >= b { a - b } else { b - a }
}
