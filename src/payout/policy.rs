//! Payout amounts: performance bonuses, processing fee and minimums.

use rust_decimal::RoundingStrategy;
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::config::PayoutConfig;
use crate::worker::Worker;

/// Why a payout was initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutKind {
    Daily,
    Weekly,
    Manual,
}

impl PayoutKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Manual => "manual",
        }
    }
}

impl std::fmt::Display for PayoutKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Computed amounts for one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PayoutQuote {
    pub gross: Decimal,
    pub fee: Decimal,
    pub net: Decimal,
}

#[derive(Debug, Clone)]
pub struct PayoutPolicy {
    pub minimum_daily: Decimal,
    pub minimum_weekly: Decimal,
    pub processing_fee: Decimal,
}

impl Default for PayoutPolicy {
    fn default() -> Self {
        Self::from_config(&PayoutConfig::default())
    }
}

impl PayoutPolicy {
    pub fn from_config(config: &PayoutConfig) -> Self {
        Self {
            minimum_daily: config.minimum_daily,
            minimum_weekly: config.minimum_weekly,
            processing_fee: config.processing_fee,
        }
    }

    /// Smallest gross amount a payout of this kind may carry.
    pub fn minimum(&self, kind: PayoutKind) -> Decimal {
        match kind {
            PayoutKind::Daily => self.minimum_daily,
            PayoutKind::Weekly | PayoutKind::Manual => self.minimum_weekly,
        }
    }

    /// Gross payout for accumulated earnings, with bonuses applied.
    ///
    /// Success above 95% earns 20%, above 90% earns 10%; an average task
    /// time under 20 s earns a further 15%. Thresholds are strict.
    pub fn gross(&self, earnings: f64, success_rate: f64, avg_task_time: f64) -> Decimal {
        let Some(mut amount) = Decimal::from_f64(earnings).filter(|d| !d.is_sign_negative()) else {
            return Decimal::ZERO;
        };

        if success_rate > 0.95 {
            amount *= dec!(1.20);
        } else if success_rate > 0.90 {
            amount *= dec!(1.10);
        }
        if avg_task_time < 20.0 {
            amount *= dec!(1.15);
        }
        cents(amount)
    }

    pub fn quote(&self, worker: &Worker) -> PayoutQuote {
        self.quote_amount(self.gross(
            worker.earnings(),
            worker.success_rate(),
            worker.avg_task_time(),
        ))
    }

    pub fn quote_amount(&self, gross: Decimal) -> PayoutQuote {
        let fee = cents(gross * self.processing_fee);
        PayoutQuote {
            gross,
            fee,
            net: gross - fee,
        }
    }

    /// Whether a quote clears the minimum for `kind`.
    pub fn is_eligible(&self, quote: &PayoutQuote, kind: PayoutKind) -> bool {
        quote.gross > Decimal::ZERO && quote.gross >= self.minimum(kind)
    }
}

fn cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_bonus_at_thresholds() {
        let policy = PayoutPolicy::default();
        // Exactly 0.90 and exactly 20 s earn nothing extra.
        assert_eq!(policy.gross(10.0, 0.90, 20.0), dec!(10.00));
    }

    #[test]
    fn success_bonus_tiers() {
        let policy = PayoutPolicy::default();
        assert_eq!(policy.gross(10.0, 0.91, 30.0), dec!(11.00));
        assert_eq!(policy.gross(10.0, 0.95, 30.0), dec!(11.00));
        assert_eq!(policy.gross(10.0, 0.96, 30.0), dec!(12.00));
    }

    #[test]
    fn speed_bonus_stacks() {
        let policy = PayoutPolicy::default();
        assert_eq!(policy.gross(10.0, 0.96, 15.0), dec!(13.80));
    }

    #[test]
    fn negative_or_nan_earnings_pay_nothing() {
        let policy = PayoutPolicy::default();
        assert_eq!(policy.gross(-1.0, 0.99, 10.0), Decimal::ZERO);
        assert_eq!(policy.gross(f64::NAN, 0.99, 10.0), Decimal::ZERO);
    }

    #[test]
    fn fee_comes_off_gross() {
        let policy = PayoutPolicy::default();
        let quote = policy.quote_amount(dec!(12.50));
        assert_eq!(quote.fee, dec!(0.25));
        assert_eq!(quote.net, dec!(12.25));
    }

    #[test]
    fn minimums_by_kind() {
        let policy = PayoutPolicy::default();
        let small = policy.quote_amount(dec!(2.00));
        assert!(!policy.is_eligible(&small, PayoutKind::Daily));
        assert!(policy.is_eligible(&small, PayoutKind::Weekly));
        assert!(policy.is_eligible(&small, PayoutKind::Manual));
        assert!(!policy.is_eligible(&policy.quote_amount(Decimal::ZERO), PayoutKind::Manual));
    }
}
