//! Metrics for room operations
//!
//! Recording goes through the `metrics` facade. Installing a recorder and
//! exporting is left to the embedding binary.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Instant;

pub const ROOMS_CREATED: &str = "room.created";
pub const ROOMS_DUPLICATE: &str = "room.create.duplicate";
pub const ROOMS_DELETED: &str = "room.deleted";
pub const ROOM_ENTRIES: &str = "room.entry";
pub const PERMISSION_CHECKS: &str = "room.permission.checks";
pub const TOKENS_ISSUED: &str = "room.tokens.issued";
pub const LISTING_DURATION_MS: &str = "room.listing.duration_ms";

/// Initialize metrics with descriptions
pub fn init_metrics() {
    describe_counter!(ROOMS_CREATED, "Rooms successfully created");
    describe_counter!(ROOMS_DUPLICATE, "Room creations rejected for a taken name");
    describe_counter!(ROOMS_DELETED, "Rooms hard-deleted");
    describe_counter!(
        ROOM_ENTRIES,
        "Room entry attempts by outcome (granted, auth_failed, not_found)"
    );
    describe_counter!(PERMISSION_CHECKS, "Permission checks by result (allow, deny)");
    describe_counter!(TOKENS_ISSUED, "Session tokens issued after entry");
    describe_histogram!(
        LISTING_DURATION_MS,
        "Room listing snapshot, sort and page duration in milliseconds"
    );
}

/// Record a counter metric
pub fn record_counter(name: &'static str, value: u64) {
    counter!(name).increment(value);
}

/// Record an entry attempt
pub fn record_entry(outcome: &'static str) {
    counter!(ROOM_ENTRIES, "outcome" => outcome).increment(1);
}

/// Record a permission check
pub fn record_permission_check(allowed: bool) {
    let result = if allowed { "allow" } else { "deny" };
    counter!(PERMISSION_CHECKS, "result" => result).increment(1);
}

/// Timer for measuring operation duration
pub struct Timer {
    name: &'static str,
    start: Instant,
}

impl Timer {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            start: Instant::now(),
        }
    }

    /// Stop the timer and record the duration
    pub fn stop(self) {
        let duration = self.start.elapsed();
        histogram!(self.name).record(duration.as_secs_f64() * 1000.0);
    }
}
