//! Position risk math. All arithmetic is checked `Decimal`; no floating point.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::{
    errors::{CodecError, ServiceError},
    vault::RiskParameters,
};

/// Health factors strictly below this are `danger`.
pub const DANGER_HEALTH_FACTOR: Decimal = Decimal::from_parts(12, 0, 0, false, 1);
/// Health factors strictly below this (and not danger) are `warning`.
pub const WARNING_HEALTH_FACTOR: Decimal = Decimal::from_parts(15, 0, 0, false, 1);
/// Stands in for an unbounded ratio (zero debt, zero collateral).
pub const UNBOUNDED: Decimal = Decimal::MAX;

/// Ordered from least to most risky.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    Safe,
    Warning,
    Danger,
    Liquidated,
}

impl PositionStatus {
    pub fn from_health_factor(health_factor: Decimal, liquidated: bool) -> Self {
        if liquidated {
            Self::Liquidated
        } else if health_factor < DANGER_HEALTH_FACTOR {
            Self::Danger
        } else if health_factor < WARNING_HEALTH_FACTOR {
            Self::Warning
        } else {
            Self::Safe
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RiskMetrics {
    pub collateral_value_usd: Decimal,
    pub debt_value_usd: Decimal,
    pub health_factor: Decimal,
    /// Percent.
    pub current_ltv: Decimal,
    /// Collateral price at which the health factor reaches 1.
    pub liquidation_price: Decimal,
    pub available_to_borrow_usd: Decimal,
}

fn overflow(what: &str) -> ServiceError {
    CodecError::Overflow(format!("{what} overflows decimal range")).into()
}

fn mul(a: Decimal, b: Decimal, what: &str) -> Result<Decimal, ServiceError> {
    a.checked_mul(b).ok_or_else(|| overflow(what))
}

/// `a / b`, or [`UNBOUNDED`] when `b` is zero.
fn ratio(a: Decimal, b: Decimal, what: &str) -> Result<Decimal, ServiceError> {
    if b.is_zero() {
        return Ok(UNBOUNDED);
    }
    a.checked_div(b).ok_or_else(|| overflow(what))
}

fn percent(p: Decimal) -> Decimal {
    p / Decimal::ONE_HUNDRED
}

/// `(collateral_value × threshold/100) / debt_value`; [`UNBOUNDED`] at zero debt.
pub fn health_factor(
    collateral_value_usd: Decimal,
    liquidation_threshold: Decimal,
    debt_value_usd: Decimal,
) -> Result<Decimal, ServiceError> {
    let weighted = mul(
        collateral_value_usd,
        percent(liquidation_threshold),
        "weighted collateral",
    )?;
    ratio(weighted, debt_value_usd, "health factor")
}

/// Metrics for `collateral_amount` priced at `price` against `debt_amount` of a USD-pegged debt
/// token.
pub fn compute_metrics(
    collateral_amount: Decimal,
    debt_amount: Decimal,
    price: Decimal,
    risk: &RiskParameters,
) -> Result<RiskMetrics, ServiceError> {
    let collateral_value_usd = mul(collateral_amount, price, "collateral value")?;
    let debt_value_usd = debt_amount;

    let health_factor = health_factor(
        collateral_value_usd,
        risk.liquidation_threshold,
        debt_value_usd,
    )?;
    let ltv_ratio = ratio(debt_value_usd, collateral_value_usd, "loan to value")?;
    let current_ltv = if ltv_ratio == UNBOUNDED {
        UNBOUNDED
    } else {
        mul(ltv_ratio, Decimal::ONE_HUNDRED, "loan to value")?
    };
    let liquidation_price = ratio(
        debt_value_usd,
        mul(
            collateral_amount,
            percent(risk.liquidation_threshold),
            "liquidation basis",
        )?,
        "liquidation price",
    )?;
    let borrow_capacity = mul(collateral_value_usd, percent(risk.max_ltv), "borrow capacity")?;
    let available_to_borrow_usd = borrow_capacity
        .checked_sub(debt_value_usd)
        .ok_or_else(|| overflow("available to borrow"))?
        .max(Decimal::ZERO);

    Ok(RiskMetrics {
        collateral_value_usd,
        debt_value_usd,
        health_factor,
        current_ltv,
        liquidation_price,
        available_to_borrow_usd,
    })
}
