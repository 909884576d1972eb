// Constants shared by the deduplicated logger.

use std::time::Duration;

pub const COMPONENT: &str = "dedlog";

/// Window over which identical reasons are folded into one line.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(5);

/// Pending entries buffered between flushes; overflow is dropped.
pub const CHANNEL_CAPACITY: usize = 1024;
