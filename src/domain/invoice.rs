//! Invoice arithmetic and numbering.
//!
//! All amounts are integer cents. Quantities may be fractional (hours, days),
//! so each line is rounded to the cent before summing. Quantities and tax rates
//! are exact decimals, and every multiplication or sum is checked.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// 항목당 최대 수량
pub const MAX_QUANTITY: i64 = 1_000_000;

/// 최대 단가 (cents, 1억)
pub const MAX_UNIT_PRICE: i64 = 10_000_000_000;

/// 수량/세율 소수 자릿수 (NUMERIC 컬럼 scale과 일치)
pub const MAX_SCALE: u32 = 4;

/// 송장 항목 입력
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub quantity: Decimal,
    /// 단가 (cents)
    pub unit_price: i64,
}

impl LineItem {
    /// round(quantity × unit_price), 0.5 cent는 0에서 먼 쪽으로
    pub fn amount(&self) -> Result<i64, ApiError> {
        self.quantity
            .checked_mul(Decimal::from(self.unit_price))
            .and_then(to_cents)
            .ok_or_else(|| overflow("line amount"))
    }
}

/// 금액이 확정된 항목 (저장소로 넘기는 값)
#[derive(Debug, Clone, PartialEq)]
pub struct PricedLine {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: i64,
    pub amount: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InvoiceTotals {
    pub subtotal: i64,
    pub tax_amount: i64,
    pub total_amount: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PricedInvoice {
    pub lines: Vec<PricedLine>,
    pub totals: InvoiceTotals,
}

fn to_cents(value: Decimal) -> Option<i64> {
    value
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

fn overflow(what: &str) -> ApiError {
    ApiError::ValidationError(format!("{} is out of range", what))
}

/// 항목별 금액과 subtotal / tax / total 계산
///
/// - `subtotal = Σ round(quantity × unit_price)`
/// - `tax_amount = round(subtotal × tax_rate / 100)`
/// - `total_amount = subtotal + tax_amount`
///
/// i64 범위를 넘으면 ValidationError (400)
pub fn price_invoice(items: &[LineItem], tax_rate: Decimal) -> Result<PricedInvoice, ApiError> {
    let mut lines = Vec::with_capacity(items.len());
    let mut subtotal: i64 = 0;

    for item in items {
        let amount = item.amount()?;
        subtotal = subtotal
            .checked_add(amount)
            .ok_or_else(|| overflow("subtotal"))?;
        lines.push(PricedLine {
            description: item.description.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price,
            amount,
        });
    }

    let tax_amount = Decimal::from(subtotal)
        .checked_mul(tax_rate)
        .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
        .and_then(to_cents)
        .ok_or_else(|| overflow("tax amount"))?;
    let total_amount = subtotal
        .checked_add(tax_amount)
        .ok_or_else(|| overflow("total amount"))?;

    Ok(PricedInvoice {
        lines,
        totals: InvoiceTotals { subtotal, tax_amount, total_amount },
    })
}

/// 합계만 필요할 때
pub fn compute_totals(items: &[LineItem], tax_rate: Decimal) -> Result<InvoiceTotals, ApiError> {
    price_invoice(items, tax_rate).map(|priced| priced.totals)
}

/// 입력 검증: 음수/상한 초과 금액, 범위 밖 세율, 빈 설명, 소수 자릿수 초과 거부
pub fn validate_items(items: &[LineItem], tax_rate: Decimal) -> Result<(), ApiError> {
    if tax_rate.is_sign_negative() || tax_rate > Decimal::ONE_HUNDRED {
        return Err(ApiError::ValidationError(
            "tax_rate must be between 0 and 100".to_string(),
        ));
    }
    if tax_rate.normalize().scale() > MAX_SCALE {
        return Err(ApiError::ValidationError(format!(
            "tax_rate allows at most {} decimal places",
            MAX_SCALE
        )));
    }

    for (i, item) in items.iter().enumerate() {
        if item.description.trim().is_empty() {
            return Err(ApiError::ValidationError(format!(
                "item {} has an empty description",
                i
            )));
        }
        if item.quantity.is_sign_negative()
            || item.quantity > Decimal::from(MAX_QUANTITY)
            || item.quantity.normalize().scale() > MAX_SCALE
        {
            return Err(ApiError::ValidationError(format!(
                "item {} has an invalid quantity",
                i
            )));
        }
        if !(0..=MAX_UNIT_PRICE).contains(&item.unit_price) {
            return Err(ApiError::ValidationError(format!(
                "item {} has an invalid unit price",
                i
            )));
        }
    }

    Ok(())
}

/// `INV-2026-00042`
pub fn format_invoice_number(year: i32, sequence: i64) -> String {
    format!("INV-{}-{:05}", year, sequence)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(quantity: Decimal, unit_price: i64) -> LineItem {
        LineItem {
            description: "Development".to_string(),
            quantity,
            unit_price,
        }
    }

    fn whole(n: i64) -> Decimal {
        Decimal::from(n)
    }

    #[test]
    fn test_empty_items_are_zero() {
        let totals = compute_totals(&[], whole(20)).unwrap();
        assert_eq!(totals, InvoiceTotals { subtotal: 0, tax_amount: 0, total_amount: 0 });
    }

    #[test]
    fn test_totals_with_tax() {
        // 3일 × 500€ + 2 × 125.50€ = 1751.00€, VAT 20%
        let items = vec![item(whole(3), 50_000), item(whole(2), 12_550)];
        let priced = price_invoice(&items, whole(20)).unwrap();

        assert_eq!(priced.totals.subtotal, 175_100);
        assert_eq!(priced.totals.tax_amount, 35_020);
        assert_eq!(priced.totals.total_amount, 210_120);
        assert_eq!(priced.lines[1].amount, 25_100);
    }

    #[test]
    fn test_tax_is_rounded() {
        // 333 × 5.5% = 18.315 → 18
        let totals = compute_totals(&[item(whole(1), 333)], Decimal::new(55, 1)).unwrap();
        assert_eq!(totals.tax_amount, 18);
        assert_eq!(totals.total_amount, 351);
    }

    #[test]
    fn test_fractional_quantity() {
        // 1.5시간 × 60.01€
        let totals = compute_totals(&[item(Decimal::new(15, 1), 6_001)], Decimal::ZERO).unwrap();
        assert_eq!(totals.subtotal, 9_002);
        assert_eq!(totals.tax_amount, 0);
    }

    #[test]
    fn test_half_cent_rounds_away_from_zero() {
        // 0.145 × 100 = 14.5 → 15 (이진 부동소수점이면 14.4999… → 14)
        let line = item(Decimal::new(145, 3), 100);
        assert_eq!(line.amount().unwrap(), 15);

        // 세금 쪽도 같은 규칙: 250 × 1% = 2.5 → 3
        let totals = compute_totals(&[item(whole(1), 250)], whole(1)).unwrap();
        assert_eq!(totals.tax_amount, 3);
    }

    #[test]
    fn test_overflow_is_a_validation_error() {
        let err = compute_totals(&[item(whole(2), i64::MAX)], Decimal::ZERO).unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));

        let err = compute_totals(
            &[item(whole(1), i64::MAX), item(whole(1), 1)],
            Decimal::ZERO,
        )
        .unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));

        let err = compute_totals(&[item(whole(1), i64::MAX)], whole(50)).unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));
    }

    #[test]
    fn test_bounded_items_fit_in_cents() {
        // 상한값 100개여도 i64 안
        let items = vec![item(whole(MAX_QUANTITY), MAX_UNIT_PRICE); 100];
        assert!(validate_items(&items, whole(100)).is_ok());
        let totals = compute_totals(&items, whole(100)).unwrap();
        assert_eq!(totals.total_amount, totals.subtotal * 2);
    }

    #[test]
    fn test_validation() {
        assert!(validate_items(&[item(whole(1), 100)], whole(20)).is_ok());
        assert!(validate_items(&[item(Decimal::new(15000, 4), 100)], whole(20)).is_ok());
        assert!(validate_items(&[item(whole(-1), 100)], whole(20)).is_err());
        assert!(validate_items(&[item(whole(1), -100)], whole(20)).is_err());
        assert!(validate_items(&[item(whole(1), 100)], whole(120)).is_err());
        assert!(validate_items(&[item(whole(1), 100)], whole(-1)).is_err());
        assert!(validate_items(&[item(whole(MAX_QUANTITY + 1), 100)], whole(20)).is_err());
        assert!(validate_items(&[item(whole(1), MAX_UNIT_PRICE + 1)], whole(20)).is_err());
        assert!(validate_items(&[item(Decimal::new(12345, 5), 100)], whole(20)).is_err());
        assert!(validate_items(&[item(whole(1), 100)], Decimal::new(123456, 5)).is_err());
    }

    #[test]
    fn test_quantity_accepts_json_numbers_exactly() {
        let line: LineItem = serde_json::from_value(serde_json::json!({
            "description": "Hours",
            "quantity": 0.145,
            "unit_price": 100
        }))
        .unwrap();
        assert_eq!(line.quantity, Decimal::new(145, 3));
        assert_eq!(line.amount().unwrap(), 15);
    }

    #[test]
    fn test_invoice_number_format() {
        assert_eq!(format_invoice_number(2026, 42), "INV-2026-00042");
        assert_eq!(format_invoice_number(2026, 123456), "INV-2026-123456");
    }
}
