//! Markup, surcharge and rounding of item prices.
//!
//! Pure functions only: the same items and [`PricingConfig`] always give the
//! same result, so a variant can be re-rendered without re-extracting.
//!
//! ```text
//! price' = round(price × (1 + markup / 100) + fixed_add)
//! amount' = price' × qty            (to kopecks)
//! ```
//!
//! Ties round half away from zero (`4.5 → 5`, `-4.5 → -5`), negative
//! results included. Values are never clamped. Arithmetic is checked: a
//! result outside the `Decimal` range is a [`KpError::Pricing`].

use crate::error::KpError;
use crate::model::{Item, PricingConfig, RoundingPolicy};
use rust_decimal::{Decimal, RoundingStrategy};

/// Round to kopecks, half away from zero.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Apply a rounding policy to an already marked-up price.
///
/// `None` when `value / step` or the product back does not fit.
pub fn apply_rounding(value: Decimal, policy: RoundingPolicy) -> Option<Decimal> {
    let step = match policy {
        RoundingPolicy::None => return Some(value),
        RoundingPolicy::NearestInteger => Decimal::ONE,
        RoundingPolicy::NearestStep(step) if step > Decimal::ZERO => step,
        RoundingPolicy::NearestStep(_) => return Some(value),
    };
    let steps = value
        .checked_div(step)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    let mut rounded = round_money(steps.checked_mul(step)?);
    rounded.rescale(2);
    Some(rounded)
}

/// New per-unit price for one source price.
pub fn adjust_price(price: Decimal, pricing: &PricingConfig) -> Option<Decimal> {
    let factor = Decimal::ONE.checked_add(pricing.markup_percent / Decimal::ONE_HUNDRED)?;
    let raw = price.checked_mul(factor)?.checked_add(pricing.fixed_add)?;
    apply_rounding(raw, pricing.rounding)
}

/// Re-price every item, preserving order and all non-price fields.
///
/// # Errors
/// [`KpError::Pricing`] when a price, an amount or the grand total leaves
/// the `Decimal` range.
pub fn apply_pricing(items: &[Item], pricing: &PricingConfig) -> Result<Vec<Item>, KpError> {
    let out_of_range = |item: &Item, what: &str| KpError::Pricing {
        item: item.name.clone(),
        detail: format!("{what} is out of range"),
    };
    let mut total = Decimal::ZERO;
    let mut priced = Vec::with_capacity(items.len());
    for item in items {
        let price = adjust_price(item.price, pricing).ok_or_else(|| out_of_range(item, "price"))?;
        let amount = price
            .checked_mul(item.qty)
            .map(round_money)
            .ok_or_else(|| out_of_range(item, "amount"))?;
        total = total
            .checked_add(amount)
            .ok_or_else(|| out_of_range(item, "running total"))?;
        priced.push(Item {
            price,
            amount,
            ..item.clone()
        });
    }
    Ok(priced)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn cfg(markup: &str, rounding: RoundingPolicy) -> PricingConfig {
        PricingConfig::new(d(markup), rounding)
    }

    #[test]
    fn bolt_example() {
        let items = vec![Item::new("Bolt", d("10"), "pcs", d("5.00"))];
        let out = apply_pricing(&items, &cfg("20", RoundingPolicy::NearestStep(d("10")))).unwrap();
        assert_eq!(out[0].price, d("10.00"));
        assert_eq!(out[0].price.to_string(), "10.00");
        assert_eq!(out[0].amount, d("100.00"));
        assert_eq!(out[0].name, "Bolt");
        assert_eq!(out[0].qty, d("10"));
    }

    #[test]
    fn zero_markup_without_rounding_is_identity() {
        let items = vec![
            Item::new("A", d("3"), "шт", d("12.34")),
            Item::new("B", d("1.5"), "м", d("0.99")),
            Item::new("C", d("7"), "кг", d("100000.01")),
        ];
        let out = apply_pricing(&items, &cfg("0", RoundingPolicy::None)).unwrap();
        for (a, b) in items.iter().zip(&out) {
            assert_eq!(a.price, b.price);
        }
    }

    #[test]
    fn nearest_step_yields_multiples() {
        let prices = ["0.01", "4.99", "5", "17.5", "123.45", "999.99", "12345.67"];
        for step in ["1", "10", "50", "100"] {
            let step = d(step);
            for markup in ["0", "7.5", "15", "33.3", "-10"] {
                for p in prices {
                    let out = adjust_price(d(p), &cfg(markup, RoundingPolicy::NearestStep(step))).unwrap();
                    assert!(
                        (out % step).is_zero(),
                        "price {p} markup {markup} step {step} gave {out}"
                    );
                }
            }
        }
    }

    #[test]
    fn ties_round_away_from_zero() {
        assert_eq!(apply_rounding(d("4.5"), RoundingPolicy::NearestInteger).unwrap(), d("5"));
        assert_eq!(apply_rounding(d("-4.5"), RoundingPolicy::NearestInteger).unwrap(), d("-5"));
        assert_eq!(apply_rounding(d("25"), RoundingPolicy::NearestStep(d("50"))).unwrap(), d("50"));
        assert_eq!(apply_rounding(d("24.99"), RoundingPolicy::NearestStep(d("50"))).unwrap(), d("0"));
    }

    #[test]
    fn fractional_step() {
        assert_eq!(apply_rounding(d("10.26"), RoundingPolicy::NearestStep(d("0.5"))).unwrap(), d("10.5"));
    }

    #[test]
    fn non_positive_step_behaves_as_none() {
        assert_eq!(apply_rounding(d("12.345"), RoundingPolicy::NearestStep(d("0"))).unwrap(), d("12.345"));
    }

    #[test]
    fn fixed_add_after_markup() {
        let p = cfg("10", RoundingPolicy::None).with_fixed_add(d("5"));
        assert_eq!(adjust_price(d("100"), &p), Some(d("115")));
    }

    #[test]
    fn negative_results_are_not_clamped() {
        let out = adjust_price(d("10"), &cfg("-150", RoundingPolicy::NearestInteger));
        assert_eq!(out, Some(d("-5")));
    }

    #[test]
    fn overflow_is_an_error_not_a_panic() {
        assert_eq!(apply_rounding(Decimal::MAX, RoundingPolicy::NearestStep(d("0.01"))), None);

        let mut ingot = Item::new("Слиток", d("1"), "шт", Decimal::MAX / d("2"));
        ingot.qty = d("3");
        let err = apply_pricing(&[ingot], &cfg("0", RoundingPolicy::None)).unwrap_err();
        assert!(matches!(err, KpError::Pricing { ref item, .. } if item == "Слиток"), "got: {err}");

        let pair = [
            Item::new("A", d("1"), "шт", Decimal::MAX / d("4")),
            Item::new("B", d("1"), "шт", Decimal::MAX / d("4")),
        ];
        let err = apply_pricing(&pair, &cfg("150", RoundingPolicy::None)).unwrap_err();
        assert!(err.to_string().contains("running total"), "got: {err}");
    }

    #[test]
    fn preserves_order_and_metadata() {
        let mut a = Item::new("A", d("1"), "шт", d("1"));
        a.code = Some("X-1".into());
        a.category = Some("Крепёж".into());
        let b = Item::new("B", d("2"), "шт", d("2"));
        let out = apply_pricing(&[a.clone(), b], &cfg("50", RoundingPolicy::None)).unwrap();
        assert_eq!(out[0].name, "A");
        assert_eq!(out[1].name, "B");
        assert_eq!(out[0].code.as_deref(), Some("X-1"));
        assert_eq!(out[0].category, a.category);
        assert_eq!(out[1].amount, d("6.00"));
    }
}
