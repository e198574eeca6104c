//! System-wide constants and defaults.

/// Default settlement token.
pub const DEFAULT_ASSET: &str = "RMT";

/// Platform fee in basis points of escrowed principal (0.5%).
pub const DEFAULT_PLATFORM_FEE_BPS: i64 = 50;

/// Order lifetime before it can be refunded (24 hours).
pub const DEFAULT_ORDER_TTL_SECS: u64 = 86_400;

/// Window for the buyer to pay and the seller to confirm (2 hours).
pub const DEFAULT_SETTLEMENT_WINDOW_SECS: u64 = 7_200;

/// Default matching radius.
pub const DEFAULT_MAX_DISTANCE_KM: u32 = 50;

/// Maximum relative rate deviation before the price score hits zero (5%).
pub const DEFAULT_MAX_PRICE_DEVIATION_BPS: i64 = 500;

/// Bonus for sharing a preferred language.
pub const DEFAULT_LANGUAGE_BONUS: i64 = 10;

/// Weight of the payment-method overlap ratio.
pub const DEFAULT_PAYMENT_METHOD_WEIGHT: i64 = 15;

/// Widen from postal code to district below this many candidates.
pub const DISTRICT_WIDEN_THRESHOLD: usize = 10;

/// Widen from district to state below this many candidates.
pub const STATE_WIDEN_THRESHOLD: usize = 20;

/// Longest accepted dispute or ban reason, in bytes.
pub const MAX_REASON_LEN: usize = 512;

pub const MAX_PAYMENT_METHODS: usize = 8;

pub const MAX_LANGUAGES: usize = 8;

/// Name of the keyless fee-collector module account.
pub const FEE_COLLECTOR_MODULE: &str = "fee_collector";

/// Name of the module account that raises system disputes.
pub const SWEEPER_MODULE: &str = "expiry_sweeper";

/// Refund reason recorded by the expiry sweep.
pub const REFUND_REASON_EXPIRED: &str = "expired";

/// Refund reason for a buyer's commitment escrow once its trade closes.
pub const REFUND_REASON_TRADE_CLOSED: &str = "trade_closed";

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "postmatch";
