//! Uses the single integration test approach.
//!
//! This improves parallelism when running the tests, and reduces the number of binaries that have to be built (and linked)

mod common;

use reqwest::{Client, StatusCode};
use serde_json::{Value, json};

use common::{
    FAKE_KEY, KillOnDrop, get_free_port, run_cli, spawn_control_service, wait_for_listening,
    write_config,
};

#[tokio::test]
async fn control_service_registers_probes_and_audits() {
    let port = get_free_port();
    let unreachable = get_free_port();
    let config = write_config(
        &format!("service_{port}"),
        &format!(
            r#"
        [server]
        port = {port}
        bind = "127.0.0.1"

        [db]
        path = ":memory:"

        [remote]
        connect_timeout_secs = 2
        reachability_timeout_secs = 1

        [scheduler]
        expiry_interval_secs = 0
        "#
        ),
    );
    let _guard = KillOnDrop(spawn_control_service(&config));
    wait_for_listening(port, 10).await;

    let client = Client::new();
    let base = format!("http://127.0.0.1:{port}/api");

    let resp = client
        .post(format!("{base}/hosts"))
        .header("x-forwarded-user", "alice")
        .json(&json!({
            "name": "lab",
            "address": "127.0.0.1",
            "port": unreachable,
            "user": "deploy",
            "private_key": FAKE_KEY,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let host: Value = resp.json().await.unwrap();
    assert_eq!(host["status"], "offline");
    assert!(host.get("private_key").is_none(), "key must not be echoed");
    let host_id = host["id"].as_str().unwrap().to_string();

    let resp = client
        .post(format!("{base}/apps"))
        .header("x-forwarded-user", "alice")
        .json(&json!({
            "name": "wiki",
            "host_id": host_id,
            "compose_path": "/srv/wiki",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let app: Value = resp.json().await.unwrap();
    assert_eq!(app["status"], "stopped");
    assert_eq!(app["auto_stop_mins"], 60);
    let app_id = app["id"].as_str().unwrap().to_string();

    let resp = client
        .post(format!("{base}/apps/{app_id}/start"))
        .header("x-forwarded-user", "alice")
        .json(&json!({ "timeout_minutes": 15 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let err: Value = resp.json().await.unwrap();
    assert_eq!(err["kind"], "connect_error");

    let apps: Value = client
        .get(format!("{base}/apps"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(apps[0]["status"], "stopped", "failed start leaves the app stopped");

    let audit: Value = client
        .get(format!("{base}/audit-logs?userId=alice"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let actions: Vec<&str> = audit["logs"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|entry| entry["action"].as_str())
        .collect();
    assert_eq!(actions, ["create_app", "create_server"]);
    assert_eq!(audit["total"], 2);
}

#[tokio::test]
async fn unknown_routes_are_json_not_found() {
    let port = get_free_port();
    let config = write_config(
        &format!("fallback_{port}"),
        &format!(
            r#"
        [server]
        port = {port}

        [db]
        path = ":memory:"
        "#
        ),
    );
    let _guard = KillOnDrop(spawn_control_service(&config));
    wait_for_listening(port, 10).await;

    let resp = Client::new()
        .get(format!("http://127.0.0.1:{port}/api/hosts_status"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["kind"], "route_not_found");
}

#[test]
fn one_shot_commands_share_the_database() {
    let tag = format!("cli_{}", get_free_port());
    let db = std::env::temp_dir().join(format!("fleetctl_integration_{tag}.db"));
    let config = write_config(
        &tag,
        &format!(
            r#"
        [db]
        path = "{}"

        [remote]
        reachability_timeout_secs = 1
        "#,
            db.display()
        ),
    );
    let unreachable = get_free_port().to_string();

    let host = run_cli(
        &config,
        &["host", "add", "lab", "127.0.0.1", "--port", &unreachable, "--user", "deploy"],
    );
    assert_eq!(host["status"], "offline");
    let host_id = host["id"].as_str().unwrap().to_string();

    let hosts = run_cli(&config, &["host", "list"]);
    assert_eq!(hosts.as_array().map(Vec::len), Some(1));

    run_cli(&config, &["host", "remove", &host_id]);
    let hosts = run_cli(&config, &["host", "list"]);
    assert_eq!(hosts.as_array().map(Vec::len), Some(0));

    let audit = run_cli(&config, &["audit", "list", "--user-id", "integration"]);
    assert_eq!(audit["total"], 2);
    assert_eq!(audit["logs"][0]["action"], "delete_server");
    assert_eq!(audit["logs"][1]["action"], "create_server");

    let sweep = run_cli(&config, &["sweep-expired"]);
    assert_eq!(sweep, json!({ "stopped": 0, "failed": 0 }));

    for suffix in ["", "-wal", "-shm"] {
        drop(std::fs::remove_file(format!("{}{suffix}", db.display())));
    }
}
