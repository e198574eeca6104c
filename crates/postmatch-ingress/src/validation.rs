//! Order intake gate.
//!
//! Every `CreateOrder` passes through [`OrderValidator::validate`] before
//! anything is written. The validator is fail-closed: the first failed
//! check rejects the order with a validation error and no side effect.

use postmatch_types::{
    EngineConfig, Location, OrderSide, PaymentMethod, PostmatchError, Result,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Parameters of a new order as submitted by its creator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub side: OrderSide,
    pub amount: Decimal,
    pub fiat_amount: Decimal,
    pub fiat_currency: String,
    pub postal_code: String,
    pub payment_methods: Vec<PaymentMethod>,
    #[serde(default)]
    pub min_amount: Option<Decimal>,
    #[serde(default)]
    pub max_amount: Option<Decimal>,
    /// `0` means the configured default radius.
    #[serde(default)]
    pub max_distance_km: u32,
    #[serde(default)]
    pub preferred_languages: Vec<String>,
    #[serde(default)]
    pub min_trust_score: u8,
    #[serde(default)]
    pub require_kyc: bool,
}

/// Stateless checks on [`OrderRequest`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderValidator {
    max_payment_methods: usize,
    max_languages: usize,
}

impl OrderValidator {
    #[must_use]
    pub fn new(max_payment_methods: usize, max_languages: usize) -> Self {
        Self {
            max_payment_methods,
            max_languages,
        }
    }

    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.max_payment_methods, config.max_languages)
    }

    /// Check every field and resolve the postal code.
    pub fn validate(&self, request: &OrderRequest) -> Result<Location> {
        // 1. Amounts
        if request.amount <= Decimal::ZERO {
            return Err(PostmatchError::validation("amount must be positive"));
        }
        if request.fiat_amount <= Decimal::ZERO {
            return Err(PostmatchError::validation("fiat amount must be positive"));
        }
        let min = request.min_amount.unwrap_or(request.amount);
        let max = request.max_amount.unwrap_or(request.amount);
        if min <= Decimal::ZERO || max <= Decimal::ZERO {
            return Err(PostmatchError::validation("amount bounds must be positive"));
        }
        if min > max {
            return Err(PostmatchError::validation(format!(
                "min amount {min} exceeds max amount {max}"
            )));
        }

        // 2. Currency
        let currency = &request.fiat_currency;
        if currency.len() != 3 || !currency.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(PostmatchError::validation(format!(
                "fiat currency {currency:?} is not a three-letter code"
            )));
        }

        // 3. Location
        let location = Location::from_postal_code(&request.postal_code)?;

        // 4. Preferences
        if request.payment_methods.is_empty() {
            return Err(PostmatchError::validation("at least one payment method is required"));
        }
        if request.payment_methods.len() > self.max_payment_methods {
            return Err(PostmatchError::validation(format!(
                "{} payment methods exceed the limit of {}",
                request.payment_methods.len(),
                self.max_payment_methods
            )));
        }
        if request.preferred_languages.len() > self.max_languages {
            return Err(PostmatchError::validation(format!(
                "{} languages exceed the limit of {}",
                request.preferred_languages.len(),
                self.max_languages
            )));
        }
        if request.min_trust_score > 100 {
            return Err(PostmatchError::validation(format!(
                "min trust score {} above 100",
                request.min_trust_score
            )));
        }

        Ok(location)
    }
}

/// Reject reasons longer than `max_len` bytes or empty after trimming.
pub fn validate_reason(reason: &str, max_len: usize) -> Result<()> {
    if reason.trim().is_empty() {
        return Err(PostmatchError::validation("reason must not be empty"));
    }
    if reason.len() > max_len {
        return Err(PostmatchError::validation(format!(
            "reason is {} bytes, limit is {max_len}",
            reason.len()
        )));
    }
    Ok(())
}

#[cfg(any(test, feature = "test-helpers"))]
impl OrderRequest {
    /// A sell or buy of `amount` tokens at 80 INR each over UPI.
    pub fn dummy(side: OrderSide, postal_code: &str, amount: Decimal) -> Self {
        Self {
            side,
            amount,
            fiat_amount: amount * Decimal::new(80, 0),
            fiat_currency: "INR".into(),
            postal_code: postal_code.into(),
            payment_methods: vec![PaymentMethod::new(postmatch_types::PaymentMethodType::Upi, "")],
            min_amount: None,
            max_amount: None,
            max_distance_km: 0,
            preferred_languages: Vec::new(),
            min_trust_score: 0,
            require_kyc: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> OrderValidator {
        OrderValidator::from_config(&EngineConfig::default())
    }

    fn sell(amount: i64) -> OrderRequest {
        OrderRequest::dummy(OrderSide::Sell, "110001", Decimal::new(amount, 0))
    }

    #[test]
    fn valid_order_resolves_location() {
        let location = validator().validate(&sell(1000)).unwrap();
        assert_eq!(location.district, "District-110");
        assert_eq!(location.state, "Delhi");
    }

    #[test]
    fn non_positive_amounts_rejected() {
        assert!(validator().validate(&sell(0)).unwrap_err().is_validation());
        let mut req = sell(10);
        req.fiat_amount = Decimal::ZERO;
        assert!(validator().validate(&req).unwrap_err().is_validation());
    }

    #[test]
    fn inverted_range_rejected() {
        let mut req = sell(10);
        req.min_amount = Some(Decimal::new(20, 0));
        assert!(validator().validate(&req).unwrap_err().is_validation());
        req.max_amount = Some(Decimal::new(30, 0));
        assert!(validator().validate(&req).is_ok());
    }

    #[test]
    fn malformed_postal_code_rejected() {
        let mut req = sell(10);
        req.postal_code = "01234".into();
        assert!(matches!(
            validator().validate(&req),
            Err(PostmatchError::InvalidPostalCode { .. })
        ));
    }

    #[test]
    fn preference_limits() {
        let mut req = sell(10);
        req.payment_methods.clear();
        assert!(validator().validate(&req).is_err());

        let mut req = sell(10);
        req.preferred_languages = vec!["hi".into(); 9];
        assert!(validator().validate(&req).is_err());

        let mut req = sell(10);
        req.min_trust_score = 101;
        assert!(validator().validate(&req).is_err());

        let mut req = sell(10);
        req.fiat_currency = "inr".into();
        assert!(validator().validate(&req).is_err());
    }

    #[test]
    fn request_json_fills_optional_fields() {
        let json = r#"{
            "side": "Sell",
            "amount": "1000",
            "fiat_amount": "80000",
            "fiat_currency": "INR",
            "postal_code": "110001",
            "payment_methods": [{ "method_type": "UPI", "provider": "" }]
        }"#;
        let req: OrderRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req, sell(1000));
    }

    #[test]
    fn reasons_bounded() {
        assert!(validate_reason("seller never paid", 512).is_ok());
        assert!(validate_reason("   ", 512).is_err());
        assert!(validate_reason(&"x".repeat(513), 512).is_err());
    }
}
