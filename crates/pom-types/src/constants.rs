//! System-wide constants for the Proof-of-Money bridge.

/// Asset code of the settlement ledger's native asset.
pub const NATIVE_ASSET_CODE: &str = "XLM";

/// Issuer bytes hashed in place of an issuer key for the native asset.
pub const NATIVE_ISSUER_SENTINEL: &[u8] = b"native";

/// Length of a settlement-ledger address (StrKey).
pub const ADDRESS_LEN: usize = 56;

/// Minimum number of auditors in a subnet.
pub const MIN_AUDITORS: usize = 3;

/// Length of the idempotency tag in bytes (fits a 32-byte hash memo).
pub const IDEMPOTENCY_TAG_LEN: usize = 28;

/// Default network passphrase used to domain-separate transaction hashes.
pub const DEFAULT_NETWORK_PASSPHRASE: &str = "Test SDF Network ; September 2015";

/// Default timeout for a single settlement-ledger call, in milliseconds.
pub const DEFAULT_LEDGER_TIMEOUT_MS: u64 = 30_000;

/// Default retry base delay in milliseconds.
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1_000;

/// Default backoff multiplier.
pub const DEFAULT_BACKOFF_MULTIPLIER: u32 = 2;

/// Default retry delay cap in milliseconds.
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 30_000;

/// Default attempts for ledger timeouts.
pub const DEFAULT_TIMEOUT_MAX_ATTEMPTS: u32 = 3;

/// Default attempts when no conversion path is found.
pub const DEFAULT_CONVERSION_MAX_ATTEMPTS: u32 = 2;

/// Default attempts when a conversion quote exceeds the slippage bound.
pub const DEFAULT_SLIPPAGE_MAX_ATTEMPTS: u32 = 3;

/// Default maximum conversion slippage, in percent.
pub const DEFAULT_MAX_SLIPPAGE_PERCENT: u32 = 1;

/// Settlement record cache size (number of (subnet, period) keys to remember).
pub const SETTLEMENT_RECORD_CACHE_SIZE: usize = 100_000;

/// Basis points in 100%.
pub const BPS_DENOMINATOR: i128 = 10_000;

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
