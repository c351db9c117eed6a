//! Status projection and spec signatures
//!
//! The persisted status is the controller's only memory. Each call starts
//! from a working copy of it, reset when the spec was edited while at rest.

use std::fmt::Write;

use aws_lc_rs::digest;
use serde_json::Value;
use tracing::debug;

use crate::crd::{CloudEndpointSpec, CloudEndpointStatus};
use crate::Error;

/// SHA-256 of `input`, hex encoded
pub fn content_hash(input: &str) -> String {
    let hash = digest::digest(&digest::SHA256, input.as_bytes());
    hash.as_ref()
        .iter()
        .fold(String::with_capacity(64), |mut s, b| {
            let _ = write!(s, "{:02x}", b);
            s
        })
}

/// Signature of a spec: the hash of its canonical JSON form
///
/// Object keys are sorted at every level, so the signature does not depend
/// on field order.
pub fn spec_signature(spec: &CloudEndpointSpec) -> Result<String, Error> {
    let value = serde_json::to_value(spec)?;
    let mut canonical = String::new();
    write_canonical(&value, &mut canonical)?;
    Ok(content_hash(&canonical))
}

fn write_canonical(value: &Value, out: &mut String) -> Result<(), Error> {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                write_canonical(&map[key], out)?;
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        scalar => out.push_str(&serde_json::to_string(scalar)?),
    }
    Ok(())
}

/// Working status for this call
///
/// - nothing persisted: a fresh IDLE status
/// - IDLE with a recorded signature that no longer matches: a fresh IDLE
///   status, which also clears the signature so drift is detected
/// - anything else: the persisted status unchanged
pub fn project_status(
    persisted: Option<&CloudEndpointStatus>,
    signature: &str,
) -> CloudEndpointStatus {
    let Some(status) = persisted else {
        return CloudEndpointStatus::default();
    };

    let edited_at_rest = status.state_current.is_idle()
        && status
            .last_applied_sig
            .as_deref()
            .is_some_and(|sig| sig != signature);

    if edited_at_rest {
        debug!("spec changed since last apply, resetting status");
        return CloudEndpointStatus::default();
    }

    status.clone()
}
