//! Slippage bounds for optional currency conversion.
//!
//! A conversion sends some amount of the treasury's source asset so that the
//! destination receives exactly the nominal withdrawal amount. The amount
//! sent may never exceed
//!
//! ```text
//! planned × (1 + max_slippage_percent / 100)
//! ```
//!
//! computed in basis points with checked `i128` arithmetic, rounded down.

use pom_types::{Amount, Asset, PomError, Result, constants};
use rust_decimal::{Decimal, prelude::ToPrimitive};
use serde::{Deserialize, Serialize};

/// A conversion path offered by the path-discovery collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionQuote {
    pub send_asset: Asset,
    /// Amount of `send_asset` the treasury would spend.
    pub send_amount: Amount,
    pub dest_asset: Asset,
    /// Amount of `dest_asset` the destination would receive.
    pub dest_amount: Amount,
    /// Intermediate assets, excluding both endpoints.
    pub path: Vec<Asset>,
}

/// Slippage percentage as whole basis points (rounded down).
///
/// # Errors
/// [`PomError::Configuration`] for negative or unrepresentable percentages.
pub fn slippage_bps(max_slippage_percent: Decimal) -> Result<Amount> {
    if max_slippage_percent.is_sign_negative() {
        return Err(PomError::Configuration(format!(
            "negative slippage {max_slippage_percent}%"
        )));
    }
    (max_slippage_percent * Decimal::ONE_HUNDRED)
        .floor()
        .to_i128()
        .ok_or_else(|| {
            PomError::Configuration(format!("slippage {max_slippage_percent}% out of range"))
        })
}

/// Largest amount that may be sent to deliver `planned`.
pub fn max_send_amount(planned: Amount, max_slippage_percent: Decimal) -> Result<Amount> {
    let bps = slippage_bps(max_slippage_percent)?;
    let extra = planned
        .checked_mul(bps)
        .ok_or(PomError::AmountOverflow)?
        / constants::BPS_DENOMINATOR;
    planned.checked_add(extra).ok_or(PomError::AmountOverflow)
}

/// Check a quote against the nominal withdrawal it is meant to pay.
///
/// # Errors
/// - [`PomError::ConversionPathNotFound`] if the quote does not deliver
///   exactly `planned` of `dest_asset` (the path is unusable for this payment)
/// - [`PomError::SlippageExceeded`] if the send amount exceeds the bound
pub fn check_quote(
    quote: &ConversionQuote,
    dest_asset: &Asset,
    planned: Amount,
    max_slippage_percent: Decimal,
) -> Result<()> {
    if quote.dest_asset != *dest_asset || quote.dest_amount != planned {
        return Err(PomError::ConversionPathNotFound {
            reason: format!(
                "quote delivers {} {}, need {planned} {dest_asset}",
                quote.dest_amount, quote.dest_asset
            ),
        });
    }
    if quote.send_amount <= 0 {
        return Err(PomError::ConversionPathNotFound {
            reason: format!("quote send amount {} is not positive", quote.send_amount),
        });
    }
    let max_allowed = max_send_amount(planned, max_slippage_percent)?;
    if quote.send_amount > max_allowed {
        return Err(PomError::SlippageExceeded {
            quoted: quote.send_amount,
            max_allowed,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(send: Amount, dest: Amount) -> ConversionQuote {
        ConversionQuote {
            send_asset: Asset::native(),
            send_amount: send,
            dest_asset: Asset::issued("EURC", [5u8; 32]),
            dest_amount: dest,
            path: vec![],
        }
    }

    #[test]
    fn default_one_percent_bound() {
        assert_eq!(max_send_amount(10_000, Decimal::ONE).unwrap(), 10_100);
        assert_eq!(max_send_amount(0, Decimal::ONE).unwrap(), 0);
    }

    #[test]
    fn fractional_percent_rounds_down() {
        // 0.255% -> 25 bps
        assert_eq!(slippage_bps(Decimal::new(255, 3)).unwrap(), 25);
        // 999 * 25 / 10000 = 2.4975 -> 2
        assert_eq!(max_send_amount(999, Decimal::new(255, 3)).unwrap(), 1_001);
    }

    #[test]
    fn negative_slippage_rejected() {
        assert!(matches!(
            slippage_bps(Decimal::new(-1, 0)),
            Err(PomError::Configuration(_))
        ));
    }

    #[test]
    fn overflow_is_checked() {
        assert!(matches!(
            max_send_amount(Amount::MAX, Decimal::ONE),
            Err(PomError::AmountOverflow)
        ));
    }

    #[test]
    fn quote_within_bound_accepted() {
        let dest = Asset::issued("EURC", [5u8; 32]);
        assert!(check_quote(&quote(10_100, 10_000), &dest, 10_000, Decimal::ONE).is_ok());
        assert!(check_quote(&quote(9_000, 10_000), &dest, 10_000, Decimal::ONE).is_ok());
    }

    #[test]
    fn quote_over_bound_is_slippage() {
        let dest = Asset::issued("EURC", [5u8; 32]);
        let err = check_quote(&quote(10_101, 10_000), &dest, 10_000, Decimal::ONE).unwrap_err();
        assert!(matches!(
            err,
            PomError::SlippageExceeded {
                quoted: 10_101,
                max_allowed: 10_100
            }
        ));
    }

    #[test]
    fn quote_for_wrong_payment_is_unusable() {
        let dest = Asset::issued("EURC", [5u8; 32]);
        let err = check_quote(&quote(100, 99), &dest, 100, Decimal::ONE).unwrap_err();
        assert!(matches!(err, PomError::ConversionPathNotFound { .. }));
        let err = check_quote(&quote(100, 100), &Asset::native(), 100, Decimal::ONE).unwrap_err();
        assert!(matches!(err, PomError::ConversionPathNotFound { .. }));
    }
}
