//! Deployment reconciler for image-packaged functions and their execution
//! roles.
//!
//! `deploy_core` owns the manifest contract and policy rules; this crate owns
//! everything that talks to the control plane: gateway traits and their AWS
//! implementation, the role and function reconcilers, bounded polling, the
//! event handler and process configuration.

pub mod adapters;
pub mod config;
pub mod error;
pub mod handlers;
pub mod manifest_file;
pub mod reconcile;
pub mod telemetry;
pub mod wait;
