//! Cloud Endpoints controller - Metacontroller sync hook for CloudEndpoint resources
//!
//! A CloudEndpoint declares a Google Cloud Endpoints service. On every resync
//! the controller manager POSTs the resource to this hook, which takes one
//! step towards the declared state and returns the status to persist:
//!
//! `IDLE -> ENDPOINT_CREATE_PENDING -> ENDPOINT_SUBMIT_PENDING -> ENDPOINT_ROLLOUT_PENDING -> IDLE`
//!
//! All memory between calls lives in that status; backend operations are
//! recorded and polled, never awaited.
//!
//! # Modules
//!
//! - [`crd`] - CloudEndpoint Custom Resource Definition
//! - [`controller`] - Reconciliation state machine, drift detection, target resolution
//! - [`openapi`] - API document rendering and validation
//! - [`gcp`] - Service Management and Compute REST clients
//! - [`webhook`] - Sync hook HTTP server
//! - [`config`] - Process configuration
//! - [`telemetry`] - Logging setup
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod gcp;
pub mod openapi;
pub mod telemetry;
pub mod webhook;

pub use error::{Error, SyncFailure};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
