//! End-to-end tests against a real Firecracker binary.
//!
//! These need KVM, the firecracker binary, and boot images. Point
//! `NESTBOX_TEST_KERNEL` and `NESTBOX_TEST_ROOTFS` at a vmlinux and an
//! ext4 rootfs (and optionally `NESTBOX_TEST_FIRECRACKER` at the binary),
//! then run: `cargo test --test firecracker_e2e -- --ignored`

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use nestbox_agent::{create_router, AgentConfig, AgentState, SharedState};
use tower::ServiceExt;

fn e2e_state(cap: usize) -> SharedState {
    let mut config = AgentConfig::default();
    if let Ok(bin) = std::env::var("NESTBOX_TEST_FIRECRACKER") {
        config.vmm.firecracker_bin = bin.into();
    }
    config.max_microvms = cap;
    Arc::new(AgentState::new(config))
}

fn create_body(name: Option<&str>, vcpus: Option<u32>, memory_mib: Option<u32>) -> String {
    let kernel = std::env::var("NESTBOX_TEST_KERNEL").expect("NESTBOX_TEST_KERNEL must be set");
    let rootfs = std::env::var("NESTBOX_TEST_ROOTFS").expect("NESTBOX_TEST_ROOTFS must be set");
    let mut body = serde_json::json!({ "kernel": kernel, "rootfs": rootfs });
    if let Some(name) = name {
        body["name"] = serde_json::json!(name);
    }
    if let Some(vcpus) = vcpus {
        body["vcpus"] = serde_json::json!(vcpus);
    }
    if let Some(memory_mib) = memory_mib {
        body["memory_mib"] = serde_json::json!(memory_mib);
    }
    body.to_string()
}

async fn send(
    state: &SharedState,
    method: Method,
    uri: &str,
    body: &str,
) -> (StatusCode, serde_json::Value) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    let request = builder.body(Body::from(body.to_owned())).expect("request");
    let resp = create_router(Arc::clone(state))
        .oneshot(request)
        .await
        .expect("handler");
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), 1 << 20)
        .await
        .expect("body");
    let value = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, value)
}

async fn cleanup(state: &SharedState) {
    state.stop_all().await;
}

#[tokio::test]
#[ignore = "requires KVM and the firecracker binary"]
async fn minimal_create_boots_with_defaults() {
    let state = e2e_state(10);

    let (status, vm) = send(
        &state,
        Method::POST,
        "/agent/microvms",
        &create_body(None, None, None),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(vm["name"], "microvm-1");
    assert_eq!(vm["running"], true);
    assert_eq!(vm["config"]["vcpus"], 1);
    assert_eq!(vm["config"]["memory_mib"], 128);
    assert_eq!(vm["config"]["boot_args"], "console=ttyS0 reboot=k panic=1 pci=off");
    assert!(vm["pid"].as_u64().is_some_and(|pid| pid > 0));

    cleanup(&state).await;
}

#[tokio::test]
#[ignore = "requires KVM and the firecracker binary"]
async fn named_create_reports_its_sizing() {
    let state = e2e_state(10);

    let (status, _) = send(
        &state,
        Method::POST,
        "/agent/microvms",
        &create_body(Some("web"), Some(2), Some(512)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, vm) = send(&state, Method::GET, "/agent/microvms/web", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(vm["config"]["vcpus"], 2);
    assert_eq!(vm["config"]["memory_mib"], 512);
    assert_eq!(vm["running"], true);

    cleanup(&state).await;
}

#[tokio::test]
#[ignore = "requires KVM and the firecracker binary"]
async fn second_create_with_the_same_name_conflicts() {
    let state = e2e_state(10);

    let body = create_body(Some("db"), None, None);
    let (status, _) = send(&state, Method::POST, "/agent/microvms", &body).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(&state, Method::POST, "/agent/microvms", &body).await;
    assert_eq!(status, StatusCode::CONFLICT);

    cleanup(&state).await;
}

#[tokio::test]
#[ignore = "requires KVM and the firecracker binary"]
async fn creates_past_the_cap_are_rejected() {
    let state = e2e_state(2);

    for name in ["one", "two"] {
        let (status, _) = send(
            &state,
            Method::POST,
            "/agent/microvms",
            &create_body(Some(name), None, None),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "create at or under cap must work");
    }

    let (status, _) = send(
        &state,
        Method::POST,
        "/agent/microvms",
        &create_body(Some("three"), None, None),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    cleanup(&state).await;
}

#[tokio::test]
#[ignore = "requires KVM and the firecracker binary"]
async fn deleted_vms_disappear_from_every_view() {
    let state = e2e_state(10);

    let (_, vm) = send(
        &state,
        Method::POST,
        "/agent/microvms",
        &create_body(None, None, None),
    )
    .await;
    let id = vm["id"].as_str().expect("id").to_owned();

    let (status, _) = send(&state, Method::DELETE, &format!("/agent/microvms/{id}"), "").await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&state, Method::GET, &format!("/agent/microvms/{id}"), "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Scenario: console against a deleted record is a 404, not a 503.
    let (status, _) = send(
        &state,
        Method::GET,
        &format!("/agent/microvms/{id}/console"),
        "",
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, listing) = send(&state, Method::GET, "/agent/microvms", "").await;
    let ids: Vec<_> = listing
        .as_array()
        .map(|a| a.iter().map(|vm| vm["id"].clone()).collect())
        .unwrap_or_default();
    assert!(!ids.contains(&serde_json::json!(id)));

    cleanup(&state).await;
}

#[tokio::test]
#[ignore = "requires KVM and the firecracker binary"]
async fn proxy_passthrough_reaches_the_firecracker_api() {
    let state = e2e_state(10);

    let (_, vm) = send(
        &state,
        Method::POST,
        "/agent/microvms",
        &create_body(Some("proxied"), None, None),
    )
    .await;
    let id = vm["id"].as_str().expect("id").to_owned();

    let (status, machine) = send(
        &state,
        Method::GET,
        &format!("/agent/microvms/{id}/machine-config"),
        "",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(machine["vcpu_count"], 1, "firecracker must report the applied config");
    assert_eq!(machine["mem_size_mib"], 128);

    cleanup(&state).await;
}

#[tokio::test]
#[ignore = "requires KVM and the firecracker binary"]
async fn externally_killed_vm_reads_as_not_running() {
    let state = e2e_state(10);

    let (_, vm) = send(
        &state,
        Method::POST,
        "/agent/microvms",
        &create_body(Some("victim"), None, None),
    )
    .await;
    let pid = vm["pid"].as_u64().expect("pid");

    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGKILL);
    }
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;

    let (status, vm) = send(&state, Method::GET, "/agent/microvms/victim", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(vm["running"], false, "a killed subprocess must read as not running");

    cleanup(&state).await;
}
