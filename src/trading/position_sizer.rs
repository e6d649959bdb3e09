//! Fixed-fractional risk sizing: risk a slice of the balance between entry
//! and stop.

use rust_decimal::Decimal;

use super::{StrategyConfig, StrategyError};

/// Converts balance, risk budget and stop distance into a position quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskSizer {
    risk_fraction: Decimal,
    max_risk_absolute: Decimal,
}

impl RiskSizer {
    pub fn new(risk_fraction: Decimal, max_risk_absolute: Decimal) -> Self {
        Self {
            risk_fraction,
            max_risk_absolute,
        }
    }

    pub fn from_config(config: &StrategyConfig) -> Self {
        Self::new(config.risk_fraction, config.max_risk_absolute)
    }

    /// Amount of quote currency put at risk on the next trade.
    ///
    /// risk = min(risk_fraction * balance, max_risk_absolute)
    pub fn risk_amount(&self, balance: Decimal) -> Decimal {
        (self.risk_fraction * balance).min(self.max_risk_absolute)
    }

    /// Quantity such that hitting the stop loses exactly the risk amount.
    pub fn size(&self, balance: Decimal, stop_distance: Decimal) -> Result<Decimal, StrategyError> {
        size(
            balance,
            self.risk_fraction,
            self.max_risk_absolute,
            stop_distance,
        )
    }

    /// Size a trade from its entry and stop prices.
    pub fn size_for_levels(
        &self,
        balance: Decimal,
        entry_price: Decimal,
        stop_loss: Decimal,
    ) -> Result<Decimal, StrategyError> {
        self.size(balance, (entry_price - stop_loss).abs())
    }
}

/// quantity = min(risk_fraction * balance, max_risk_absolute) / stop_distance
pub fn size(
    balance: Decimal,
    risk_fraction: Decimal,
    max_risk_absolute: Decimal,
    stop_distance: Decimal,
) -> Result<Decimal, StrategyError> {
    if stop_distance <= Decimal::ZERO {
        return Err(StrategyError::InvalidStopDistance(stop_distance));
    }

    let risk_amount = (risk_fraction * balance).min(max_risk_absolute);
    if risk_amount <= Decimal::ZERO {
        return Err(StrategyError::InsufficientBalance(risk_amount));
    }

    Ok(risk_amount / stop_distance)
}
