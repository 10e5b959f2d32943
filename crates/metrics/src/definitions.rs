//! Metric name and label definitions.
//!
//! All metric names used throughout howl live here so dashboards have a single
//! place to look.

/// Worker fleet metrics
pub mod fleet {
    /// Number of workers currently registered
    pub const WORKERS_ACTIVE: &str = "howl_fleet_workers_active";
    /// Total number of workers admitted
    pub const WORKERS_CONNECTED_TOTAL: &str = "howl_fleet_workers_connected_total";
    /// Total number of workers removed (labelled by `reason`)
    pub const WORKERS_REMOVED_TOTAL: &str = "howl_fleet_workers_removed_total";
    /// Number of sessions currently bound across the fleet
    pub const SESSIONS_ACTIVE: &str = "howl_fleet_sessions_active";
    /// Total number of sessions assigned to a worker
    pub const SESSIONS_ASSIGNED_TOTAL: &str = "howl_fleet_sessions_assigned_total";
    /// Session requests rejected because every worker was full or draining
    pub const NO_WORKER_AVAILABLE_TOTAL: &str = "howl_fleet_no_worker_available_total";
    /// Time spent pushing a session binding to a worker
    pub const BIND_DURATION_SECONDS: &str = "howl_fleet_bind_duration_seconds";
    /// Shutdown notices that could not be delivered
    pub const SHUTDOWN_NOTICE_FAILURES_TOTAL: &str = "howl_fleet_shutdown_notice_failures_total";
}

/// Outbound chat metrics
pub mod dispatch {
    /// Total number of messages sent to chats
    pub const MESSAGES_SENT_TOTAL: &str = "howl_dispatch_messages_sent_total";
    /// Sends that failed in transport
    pub const DELIVERY_FAILURES_TOTAL: &str = "howl_dispatch_delivery_failures_total";
    /// Sends rejected by platform rate limiting
    pub const RATE_LIMITED_TOTAL: &str = "howl_dispatch_rate_limited_total";
}

/// Inbound update metrics
pub mod inbound {
    /// Total number of updates received from the chat platform
    pub const MESSAGES_RECEIVED_TOTAL: &str = "howl_inbound_messages_received_total";
    /// Total number of commands received (labelled by `command`)
    pub const COMMANDS_TOTAL: &str = "howl_inbound_commands_total";
    /// Updates with no owning session
    pub const UNROUTED_TOTAL: &str = "howl_inbound_unrouted_total";
}

/// Common label keys
pub mod labels {
    pub const REASON: &str = "reason";
    pub const COMMAND: &str = "command";
}

/// Histogram bucket boundaries
pub mod buckets {
    /// Worker bind latency (in seconds), 1ms to 5s
    pub const BIND_DURATION: &[f64] = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0];
}
