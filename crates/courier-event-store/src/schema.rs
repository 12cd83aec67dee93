//! Event store database schema.

/// SQL to create the events table.
///
/// The primary key on `(aggregate_id, version)` is what turns two concurrent
/// dispatches claiming the same version into a concurrency conflict.
pub const CREATE_EVENTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS courier_events (
    aggregate_id    TEXT NOT NULL,
    version         BIGINT NOT NULL,
    kind            VARCHAR(255) NOT NULL,
    payload         BYTEA NOT NULL,
    correlation_id  UUID NOT NULL,
    recorded_at     TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (aggregate_id, version)
);

CREATE INDEX IF NOT EXISTS idx_courier_events_correlation_id
    ON courier_events (correlation_id);
";
