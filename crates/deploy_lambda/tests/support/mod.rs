#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use deploy_core::contract::RawManifest;
use deploy_core::naming::AccountRegion;
use deploy_lambda::adapters::in_memory::InMemoryControlPlane;
use deploy_lambda::config::ReconcilerConfig;
use deploy_lambda::wait::WaitPolicy;
use serde_json::Value;

pub const ACCOUNT_ID: &str = "123456789012";
pub const REGION: &str = "eu-west-1";

pub fn account() -> AccountRegion {
    AccountRegion::new(ACCOUNT_ID, REGION)
}

/// Pushed-at timestamps on a fixed day so image ordering is explicit.
pub fn pushed_at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, hour, 0, 0).unwrap()
}

/// Control plane with an `orders` repository holding two images, the newer
/// tagged `v2`.
pub fn seeded_plane() -> InMemoryControlPlane {
    InMemoryControlPlane::new(account())
        .with_image("orders", &["v1"], pushed_at(9))
        .with_image("orders", &["v2", "latest"], pushed_at(11))
}

/// Config that never sleeps between polls.
pub fn fast_config(max_attempts: u32) -> ReconcilerConfig {
    ReconcilerConfig {
        wait: WaitPolicy::immediate(max_attempts),
        ..ReconcilerConfig::default()
    }
}

pub fn raw_manifest(value: Value) -> RawManifest {
    serde_json::from_value(value).expect("manifest should deserialize")
}
