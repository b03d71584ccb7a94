//! System-wide constants for the Custodex settlement core.

/// Maximum decimal precision for prices (8 decimal places).
pub const PRICE_PRECISION: u32 = 8;

/// Maximum decimal precision for quantities (8 decimal places).
pub const QTY_PRECISION: u32 = 8;

/// Fee rates are configured in percent.
pub const FEE_PERCENT_BASE: i64 = 100;

/// Default interval between deposit scan ticks in milliseconds.
pub const DEFAULT_SCAN_INTERVAL_MS: u64 = 1_000;

/// Default interval between confirmation sweeps in milliseconds.
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 5_000;

/// Default interval between withdrawal dispatch ticks in milliseconds.
pub const DEFAULT_WITHDRAW_INTERVAL_MS: u64 = 10_000;

/// Default interval between withdrawal recovery sweeps in milliseconds.
pub const DEFAULT_RECOVERY_INTERVAL_MS: u64 = 60_000;

/// Default random jitter added to every tick in milliseconds.
pub const DEFAULT_JITTER_MS: u64 = 250;

/// A `processing` withdrawal older than this is inspected by recovery.
pub const DEFAULT_PROCESSING_TIMEOUT_SECS: u64 = 600;

/// A broadcast transfer the node still does not know after this long is
/// marked `failed` for manual review.
pub const DEFAULT_UNKNOWN_OUTCOME_TIMEOUT_SECS: u64 = 86_400;

/// Default confirmations before a deposit is credited.
pub const DEFAULT_REQUIRED_CONFIRMATIONS: u64 = 12;

/// Decimals of a native coin's smallest unit (wei).
pub const DEFAULT_NATIVE_DECIMALS: u32 = 18;

/// Fee revenue must cover this multiple of the expected gas before the
/// exchange pays for a reverse top-up.
pub const INSURANCE_FEE_MULTIPLIER: i64 = 2;

/// Topic of the canonical `Transfer(address,address,uint256)` event.
pub const TRANSFER_EVENT_TOPIC: &str =
    "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

/// Digits in a withdrawal security code.
pub const SECURITY_CODE_LEN: usize = 6;

/// Lifetime of an issued security code in seconds.
pub const DEFAULT_SECURITY_CODE_TTL_SECS: u64 = 900;

/// Default OHLC bucket width in seconds.
pub const DEFAULT_GRAPH_RESOLUTION_SECS: i64 = 60;

/// Capacity of the in-process notification channel.
pub const NOTIFICATION_CHANNEL_CAPACITY: usize = 4_096;

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "Custodex";
