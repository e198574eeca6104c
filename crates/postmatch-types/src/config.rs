//! Engine configuration.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Address, PostmatchError, Result, constants};

/// Matching parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Radius used when an order does not set its own.
    pub max_distance_km: u32,
    /// Relative rate deviation at which the price score reaches zero.
    pub max_price_deviation: Decimal,
    pub language_bonus: Decimal,
    pub payment_method_weight: Decimal,
    pub district_widen_threshold: usize,
    pub state_widen_threshold: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            max_distance_km: constants::DEFAULT_MAX_DISTANCE_KM,
            max_price_deviation: Decimal::new(constants::DEFAULT_MAX_PRICE_DEVIATION_BPS, 4),
            language_bonus: Decimal::from(constants::DEFAULT_LANGUAGE_BONUS),
            payment_method_weight: Decimal::from(constants::DEFAULT_PAYMENT_METHOD_WEIGHT),
            district_widen_threshold: constants::DISTRICT_WIDEN_THRESHOLD,
            state_widen_threshold: constants::STATE_WIDEN_THRESHOLD,
        }
    }
}

/// Configuration of the P2P engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Token custodied by escrows.
    pub asset: String,
    /// Fee as a fraction of escrowed principal.
    pub platform_fee_rate: Decimal,
    /// Scale fees down by the depositor's trust-level discount.
    pub apply_trust_discount: bool,
    pub fee_collector: Address,
    /// May release any escrow, ban users and set KYC flags.
    pub admins: Vec<Address>,
    /// May resolve disputes.
    pub resolvers: Vec<Address>,
    pub order_ttl_secs: u64,
    pub settlement_window_secs: u64,
    pub max_reason_len: usize,
    pub max_payment_methods: usize,
    pub max_languages: usize,
    pub matching: MatchingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            asset: constants::DEFAULT_ASSET.to_string(),
            platform_fee_rate: Decimal::new(constants::DEFAULT_PLATFORM_FEE_BPS, 4),
            apply_trust_discount: true,
            fee_collector: Address::module(constants::FEE_COLLECTOR_MODULE),
            admins: Vec::new(),
            resolvers: Vec::new(),
            order_ttl_secs: constants::DEFAULT_ORDER_TTL_SECS,
            settlement_window_secs: constants::DEFAULT_SETTLEMENT_WINDOW_SECS,
            max_reason_len: constants::MAX_REASON_LEN,
            max_payment_methods: constants::MAX_PAYMENT_METHODS,
            max_languages: constants::MAX_LANGUAGES,
            matching: MatchingConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        let fail = |reason: &str| {
            Err(PostmatchError::Config {
                reason: reason.to_string(),
            })
        };
        if self.asset.is_empty() {
            return fail("asset must be set");
        }
        if self.platform_fee_rate.is_sign_negative() || self.platform_fee_rate >= Decimal::ONE {
            return fail("platform_fee_rate must be in [0, 1)");
        }
        if self.order_ttl_secs == 0 || self.settlement_window_secs == 0 {
            return fail("order_ttl_secs and settlement_window_secs must be positive");
        }
        if self.matching.max_price_deviation <= Decimal::ZERO {
            return fail("matching.max_price_deviation must be positive");
        }
        if self.max_payment_methods == 0 {
            return fail("max_payment_methods must be positive");
        }
        Ok(())
    }

    #[must_use]
    pub fn is_admin(&self, who: &Address) -> bool {
        self.admins.contains(who)
    }

    /// Admins may also resolve disputes.
    #[must_use]
    pub fn is_resolver(&self, who: &Address) -> bool {
        self.resolvers.contains(who) || self.is_admin(who)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = EngineConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.platform_fee_rate, Decimal::new(5, 3));
        assert_eq!(cfg.matching.max_price_deviation, Decimal::new(5, 2));
        assert_eq!(cfg.settlement_window_secs, 7_200);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{"asset":"XYZ","matching":{"max_distance_km":25}}"#).unwrap();
        assert_eq!(cfg.asset, "XYZ");
        assert_eq!(cfg.matching.max_distance_km, 25);
        assert_eq!(cfg.order_ttl_secs, 86_400);
    }

    #[test]
    fn rejects_bad_fee_rate() {
        let cfg = EngineConfig {
            platform_fee_rate: Decimal::ONE,
            ..EngineConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(PostmatchError::Config { .. })));
    }

    #[test]
    fn admins_are_resolvers() {
        let cfg = EngineConfig {
            admins: vec![Address::dummy(1)],
            resolvers: vec![Address::dummy(2)],
            ..EngineConfig::default()
        };
        assert!(cfg.is_resolver(&Address::dummy(1)));
        assert!(cfg.is_resolver(&Address::dummy(2)));
        assert!(!cfg.is_admin(&Address::dummy(2)));
    }
}
