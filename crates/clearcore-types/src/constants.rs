//! System-wide constants for the ClearCore transactional core.

/// Maximum decimal precision for prices (8 decimal places).
pub const PRICE_PRECISION: u32 = 8;

/// Maximum decimal precision for quantities (8 decimal places).
pub const QTY_PRECISION: u32 = 8;

/// Bounded attempts for an optimistic balance update before the conflict
/// is surfaced as a transient failure.
pub const OPTIMISTIC_LOCK_MAX_RETRIES: u32 = 3;

/// Processed-order cache size per instrument book (duplicate-command
/// absorption under at-least-once delivery).
pub const PROCESSED_ORDER_CACHE_SIZE: usize = 1_000_000;

/// Settlement idempotency log size (number of trade outcomes to remember).
pub const SETTLEMENT_APPLIED_LOG_SIZE: usize = 500_000;

/// Position projection applied-event log size.
pub const POSITION_APPLIED_LOG_SIZE: usize = 500_000;

/// Order-to-instrument routing cache size in the engine (cancels carry
/// only an order id).
pub const ORDER_ROUTING_CACHE_SIZE: usize = 1_000_000;

/// Depth levels included in an `OrderBookUpdated` snapshot.
pub const DEFAULT_DEPTH_LEVELS: usize = 10;

/// Capacity of each instrument worker's command mailbox.
pub const WORKER_MAILBOX_CAPACITY: usize = 10_000;

/// Capacity of the engine's outbound event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 100_000;

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "ClearCore";
