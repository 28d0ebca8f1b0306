//! Fixed-width arithmetic helpers.

use crate::error::DmcError;

/// `a × b / c`, floored, through a 256-bit intermediate product.
///
/// Fails with [`DmcError::Overflow`] when `c` is zero or the quotient does
/// not fit in 128 bits.
pub fn mul_div(a: u128, b: u128, c: u128) -> Result<u128, DmcError> {
    if c == 0 {
        return Err(DmcError::Overflow);
    }
    if let Some(product) = a.checked_mul(b) {
        return Ok(product / c);
    }
    let (hi, lo) = widening_mul(a, b);
    if hi >= c {
        return Err(DmcError::Overflow);
    }
    // restoring long division; `rem < c` holds before every step
    let mut rem = hi;
    let mut quot = 0u128;
    for bit in (0..128).rev() {
        let carry = rem >> 127;
        rem = (rem << 1) | ((lo >> bit) & 1);
        quot <<= 1;
        if carry == 1 || rem >= c {
            rem = rem.wrapping_sub(c);
            quot |= 1;
        }
    }
    Ok(quot)
}

/// Full product as `(high, low)` halves.
fn widening_mul(a: u128, b: u128) -> (u128, u128) {
    const MASK: u128 = u64::MAX as u128;
    let (a1, a0) = (a >> 64, a & MASK);
    let (b1, b0) = (b >> 64, b & MASK);
    let p00 = a0 * b0;
    let p01 = a0 * b1;
    let p10 = a1 * b0;
    let p11 = a1 * b1;
    let mid = (p00 >> 64) + (p01 & MASK) + (p10 & MASK);
    let lo = (p00 & MASK) | (mid << 64);
    let hi = p11 + (p01 >> 64) + (p10 >> 64) + (mid >> 64);
    (hi, lo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::TOKEN_UNIT;

    #[test]
    fn small_products_take_the_direct_path() {
        assert_eq!(mul_div(200, 35, 85), Ok(82));
        assert_eq!(mul_div(0, u128::MAX, 1), Ok(0));
        assert_eq!(mul_div(1, 1, 0), Err(DmcError::Overflow));
    }

    #[test]
    fn wide_products_divide_exactly() {
        // 200 GWT pool, 35 of 85 DMC staked
        let pool = 200 * TOKEN_UNIT;
        let got = mul_div(pool * 1_000_000, 35 * TOKEN_UNIT * 1_000_000, 85 * TOKEN_UNIT * 1_000_000);
        assert_eq!(got, Ok(pool * 1_000_000 * 35 / 85));
        assert_eq!(mul_div(u128::MAX, u128::MAX, u128::MAX), Ok(u128::MAX));
        assert_eq!(mul_div(u128::MAX, 3, 4), Ok(u128::MAX / 4 * 3 + 2));
    }

    #[test]
    fn oversized_quotients_are_rejected() {
        assert_eq!(mul_div(u128::MAX, 2, 1), Err(DmcError::Overflow));
        assert_eq!(mul_div(u128::MAX, u128::MAX, u128::MAX - 1), Err(DmcError::Overflow));
    }
}
