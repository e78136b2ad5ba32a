use rust_decimal::{Decimal, RoundingStrategy};

pub struct CostUtil;

impl CostUtil {
    /// Two-decimal display form, half away from zero.
    #[inline]
    pub fn display_amount(amount: Decimal) -> String {
        let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        format!("{:.2}", rounded)
    }

    /// `part` as a percentage of `total`, one decimal; zero when `total` is zero.
    #[inline]
    pub fn share_percent(part: Decimal, total: Decimal) -> Decimal {
        if total.is_zero() {
            return Decimal::ZERO;
        }
        part.checked_div(total)
            .and_then(|r| r.checked_mul(Decimal::ONE_HUNDRED))
            .map(|p| p.round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero))
            .unwrap_or(Decimal::ZERO)
    }
}
