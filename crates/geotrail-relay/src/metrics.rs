//! Relay counters, exported through the global meter provider.

use std::sync::LazyLock;

use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::Counter;

const METER: &str = "geotrail-relay";

static FIXES_PERSISTED: LazyLock<Counter<u64>> = LazyLock::new(|| {
    global::meter(METER)
        .u64_counter("geotrail.relay.fixes_persisted")
        .with_description("Location fixes written to the ledger and presence store")
        .build()
});

static RELAY_FAILURES: LazyLock<Counter<u64>> = LazyLock::new(|| {
    global::meter(METER)
        .u64_counter("geotrail.relay.failures")
        .with_description("Location updates dropped, by failure kind")
        .build()
});

static FRAMES_DELIVERED: LazyLock<Counter<u64>> = LazyLock::new(|| {
    global::meter(METER)
        .u64_counter("geotrail.gateway.frames_delivered")
        .with_description("Outbound frames accepted by connection queues")
        .build()
});

pub fn record_fix_persisted() {
    FIXES_PERSISTED.add(1, &[]);
}

pub fn record_relay_failure(kind: &'static str) {
    RELAY_FAILURES.add(1, &[KeyValue::new("kind", kind)]);
}

pub fn record_frames_delivered(event: &str, count: usize) {
    FRAMES_DELIVERED.add(count as u64, &[KeyValue::new("event", event.to_string())]);
}
