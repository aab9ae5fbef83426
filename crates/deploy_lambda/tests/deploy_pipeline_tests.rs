mod support;

use deploy_core::contract::{LOGGING_POLICY_NAME, PERMISSIONS_POLICY_NAME};
use deploy_lambda::adapters::in_memory::ControlPlaneCall;
use deploy_lambda::handlers::deploy::handle_deploy_event;
use deploy_lambda::reconcile::{deploy, ReconcileAction};
use serde_json::json;

use support::{fast_config, pushed_at, raw_manifest, seeded_plane};

const ROLE_ARN: &str = "arn:aws:iam::123456789012:role/lambda/orders";
const FUNCTION_ARN: &str = "arn:aws:lambda:eu-west-1:123456789012:function:orders";

fn manifest_with_policy() -> serde_json::Value {
    json!({
        "name": "orders",
        "description": "order api",
        "memory_mb": 1024,
        "timeout_seconds": 60,
        "policy": {
            "Version": "2012-10-17",
            "Statement": [
                {"Effect": "Allow", "Action": "iam:GetRole", "Resource": "*"},
                {
                    "Effect": "Allow",
                    "Action": "secretsmanager:GetSecretValue",
                    "Resource": "arn:aws:secretsmanager:eu-west-1:123456789012:secret:orders-db-AbCdEf"
                }
            ]
        }
    })
}

#[test]
fn first_deployment_creates_role_and_function() {
    let plane = seeded_plane();

    let summary = deploy(
        raw_manifest(manifest_with_policy()),
        None,
        &plane,
        &fast_config(3),
    )
    .expect("deployment should succeed");

    assert_eq!(summary.role, ReconcileAction::Created);
    assert_eq!(summary.function, ReconcileAction::Created);
    assert_eq!(summary.role_ref, ROLE_ARN);
    assert_eq!(summary.function_ref, FUNCTION_ARN);
    assert_eq!(
        summary.image_uri,
        "123456789012.dkr.ecr.eu-west-1.amazonaws.com/orders:v2"
    );

    let role = plane.role(ROLE_ARN).expect("role should exist");
    assert_eq!(role.path, "/lambda/");
    assert_eq!(
        role.inline_policies.keys().collect::<Vec<_>>(),
        vec![LOGGING_POLICY_NAME, PERMISSIONS_POLICY_NAME]
    );

    let function = plane.function(FUNCTION_ARN).expect("function should exist");
    assert_eq!(function.configuration.role_arn, ROLE_ARN);
    assert_eq!(function.configuration.memory_mb, 1024);
    assert_eq!(function.configuration.timeout_seconds, 60);
    assert_eq!(function.configuration.ephemeral_storage_mb, 512);
}

#[test]
fn repeated_deployment_converges_to_the_same_state() {
    let plane = seeded_plane().with_pending_polls(2);
    let config = fast_config(5);

    let first = deploy(raw_manifest(manifest_with_policy()), None, &plane, &config)
        .expect("first deployment should succeed");
    let role_after_first = plane.role(ROLE_ARN).expect("role should exist");
    let function_after_first = plane.function(FUNCTION_ARN).expect("function should exist");

    let second = deploy(raw_manifest(manifest_with_policy()), None, &plane, &config)
        .expect("second deployment should succeed");
    let role_after_second = plane.role(ROLE_ARN).expect("role should exist");
    let function_after_second = plane.function(FUNCTION_ARN).expect("function should exist");

    let third = deploy(raw_manifest(manifest_with_policy()), None, &plane, &config)
        .expect("third deployment should wait for the second's code update");
    assert_eq!(third.function, ReconcileAction::Updated);
    assert_eq!(
        plane.function(FUNCTION_ARN).map(|function| function.configuration),
        Some(function_after_second.configuration.clone())
    );

    assert_eq!(second.role, ReconcileAction::Updated);
    assert_eq!(second.function, ReconcileAction::Updated);
    assert_eq!(first.manifest_fingerprint, second.manifest_fingerprint);
    assert_eq!(first.image_uri, second.image_uri);

    assert_eq!(role_after_first, role_after_second);
    assert_eq!(
        function_after_first.configuration,
        function_after_second.configuration
    );
    assert_eq!(function_after_first.image_uri, function_after_second.image_uri);
    assert_eq!(
        plane.count_calls(|call| matches!(call, ControlPlaneCall::CreateRole { .. })),
        1
    );
    assert_eq!(
        plane.count_calls(|call| matches!(call, ControlPlaneCall::CreateFunction { .. })),
        1
    );
}

#[test]
fn update_path_deploys_newer_image() {
    let plane = seeded_plane();
    let config = fast_config(3);
    deploy(raw_manifest(json!({"name": "orders"})), None, &plane, &config)
        .expect("first deployment should succeed");

    let plane = plane.with_image("orders", &["v3"], pushed_at(15));
    plane.clear_calls();
    let summary = deploy(raw_manifest(json!({"name": "orders"})), None, &plane, &config)
        .expect("second deployment should succeed");

    assert_eq!(
        summary.image_uri,
        "123456789012.dkr.ecr.eu-west-1.amazonaws.com/orders:v3"
    );
    let function = plane.function(FUNCTION_ARN).expect("function should exist");
    assert_eq!(function.image_uri, summary.image_uri);
    assert_eq!(function.published_versions, 2);
    assert!(plane
        .calls()
        .iter()
        .any(|call| matches!(call, ControlPlaneCall::GetUpdateStatus { .. })));
}

#[test]
fn dropping_the_policy_removes_permissions_policy() {
    let plane = seeded_plane();
    let config = fast_config(3);
    deploy(raw_manifest(manifest_with_policy()), None, &plane, &config)
        .expect("first deployment should succeed");

    deploy(raw_manifest(json!({"name": "orders"})), None, &plane, &config)
        .expect("second deployment should succeed");

    let role = plane.role(ROLE_ARN).expect("role should exist");
    assert_eq!(
        role.inline_policies.keys().collect::<Vec<_>>(),
        vec![LOGGING_POLICY_NAME]
    );
}

#[test]
fn rejected_policy_leaves_remote_state_untouched() {
    let plane = seeded_plane();

    let response = handle_deploy_event(
        json!({"body": json!({
            "name": "orders",
            "policy": {"Statement": [
                {"Action": "iam:AttachRolePolicy", "Resource": "*"},
                {"Action": "secretsmanager:*", "Resource": "arn:aws:secretsmanager:eu-west-1:123456789012:secret:foo-*"}
            ]}
        }).to_string()}),
        None,
        &plane,
        &fast_config(3),
    );

    assert_eq!(response.status_code, 403);
    let body = response.body_json().expect("body should be json");
    assert_eq!(body["violations"].as_array().map(Vec::len), Some(2));
    assert_eq!(plane.count_calls(ControlPlaneCall::is_mutation), 0);
    assert!(plane.role(ROLE_ARN).is_none());
}

#[test]
fn role_failure_stops_before_function() {
    let plane = seeded_plane().with_failure("put_inline_policy", "MalformedPolicyDocument: bad");

    let response = handle_deploy_event(json!({"name": "orders"}), None, &plane, &fast_config(3));

    assert_eq!(response.status_code, 502);
    let body = response.body_json().expect("body should be json");
    assert_eq!(body["error"], "control_plane_error");
    assert_eq!(
        body["message"],
        "put_inline_policy failed: MalformedPolicyDocument: bad"
    );
    assert!(plane.role(ROLE_ARN).is_some());
    assert!(plane.function(FUNCTION_ARN).is_none());
}
