//! Global subscriber installation
//!
//! Kept in its own test binary: installing the subscriber is process-wide.

use cloud_endpoints_controller::telemetry::{init_telemetry, TelemetryConfig};

#[test]
fn second_init_is_reported() {
    init_telemetry(TelemetryConfig::default()).unwrap();

    let err = init_telemetry(TelemetryConfig { json: true }).unwrap_err();
    assert!(err.to_string().contains("subscriber"));
}
