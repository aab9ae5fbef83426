//! Deployment manifest domain primitives.
//!
//! This crate owns manifest normalization, resource naming, and permission
//! policy validation. It intentionally excludes AWS SDK and Lambda runtime
//! concerns; reconciliation against the control plane lives in `deploy_lambda`.

pub mod contract;
pub mod error;
pub mod naming;
pub mod policy;
