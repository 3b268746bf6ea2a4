// Naming
pub(crate) const MDPW_WORKER: &str = "MDPW01";

// Heartbeat
pub const DEFAULT_MAX_LIVENESS: u32 = 3;
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 2500;

// Polling
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2500;

// Reconnection
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 2500;

// Message Validity
pub(crate) const MINIMUM_MESSAGE_FRAMES: usize = 3;
