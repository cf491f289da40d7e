use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    Percentage,
    Fixed,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::Percentage => "percentage",
            DiscountType::Fixed => "fixed",
        }
    }
}

impl fmt::Display for DiscountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiscountType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "percentage" => Ok(DiscountType::Percentage),
            "fixed" => Ok(DiscountType::Fixed),
            other => Err(DomainError::UnknownDiscountType(other.to_string())),
        }
    }
}

/// Why a coupon cannot be applied. Checks short-circuit in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CouponRejection {
    #[error("Invalid coupon code")]
    InvalidCode,
    #[error("This coupon is no longer active")]
    Inactive,
    #[error("This coupon is not yet valid")]
    NotYetValid,
    #[error("This coupon has expired")]
    Expired,
    #[error("This coupon has reached its usage limit")]
    UsageLimitReached,
    #[error("Minimum purchase of NZD ${minimum} required")]
    MinimumPurchase { minimum: BigDecimal },
}

/// The rule-bearing part of a stored coupon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouponTerms {
    pub discount_type: DiscountType,
    pub discount_value: BigDecimal,
    pub min_purchase_amount: Option<BigDecimal>,
    pub max_discount_amount: Option<BigDecimal>,
    pub usage_limit: Option<i32>,
    pub used_count: i32,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub active: bool,
}

/// Codes are stored and looked up upper-cased.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

impl CouponTerms {
    /// Checks applicability at `now` and returns the discount for `subtotal`.
    ///
    /// Pure: evaluating never consumes a use.
    pub fn evaluate(
        &self,
        now: DateTime<Utc>,
        subtotal: &BigDecimal,
    ) -> Result<BigDecimal, CouponRejection> {
        if !self.active {
            return Err(CouponRejection::Inactive);
        }
        if matches!(&self.valid_from, Some(from) if *from > now) {
            return Err(CouponRejection::NotYetValid);
        }
        if matches!(&self.valid_until, Some(until) if *until < now) {
            return Err(CouponRejection::Expired);
        }
        if matches!(self.usage_limit, Some(limit) if self.used_count >= limit) {
            return Err(CouponRejection::UsageLimitReached);
        }
        if let Some(minimum) = &self.min_purchase_amount {
            if subtotal < minimum {
                return Err(CouponRejection::MinimumPurchase {
                    minimum: minimum.with_scale(2),
                });
            }
        }
        Ok(self.calculate_discount(subtotal))
    }

    /// Raw discount, capped by `max_discount_amount` and then by the subtotal.
    /// Never negative.
    pub fn calculate_discount(&self, subtotal: &BigDecimal) -> BigDecimal {
        let raw = match self.discount_type {
            DiscountType::Percentage => {
                (subtotal * &self.discount_value / BigDecimal::from(100)).round(2)
            }
            DiscountType::Fixed => self.discount_value.clone(),
        };

        let capped = match &self.max_discount_amount {
            Some(cap) if raw > *cap => cap.clone(),
            _ => raw,
        };

        let bounded = if capped > *subtotal {
            subtotal.clone()
        } else {
            capped
        };

        if bounded < BigDecimal::zero() {
            BigDecimal::zero()
        } else {
            bounded
        }
    }
}
