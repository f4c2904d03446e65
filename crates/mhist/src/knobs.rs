//! Tunable limits for the core. Deployment configuration (paths, size
//! budgets, ports) lives in the server's clap config; these are the
//! operational knobs that only need touching when something misbehaves.

use std::sync::LazyLock;

use cmd_util::env::env_config;

/// Soft cap on the disk block buffer. Exceeding it triggers a commit ahead
/// of the flush tick.
pub static BLOCK_SOFT_CAP_BYTES: LazyLock<usize> =
    LazyLock::new(|| env_config("MHIST_BLOCK_SOFT_CAP_BYTES", 12 * 1024));

/// Depth of the disk-store worker's request channels.
pub static DISK_QUEUE_SIZE: LazyLock<usize> =
    LazyLock::new(|| env_config("MHIST_DISK_QUEUE_SIZE", 64));

/// Depth of the outbound queue kept per replication peer. When a peer stays
/// unreachable long enough to fill it, further measurements are dropped.
pub static REPLICATION_QUEUE_SIZE: LazyLock<usize> =
    LazyLock::new(|| env_config("MHIST_REPLICATION_QUEUE_SIZE", 1024));
