use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    app::AppState,
    fleet::{
        FleetError, HostUpdate, NewHost, NewWorkload, WorkloadUpdate, format_duration, page_size,
    },
    http::{
        context::Actor,
        error::ApiError,
        extract::{ApiJson, ApiPath, ApiQuery, OptionalJson},
    },
    model::{AuditAction, AuditEntry, AuditFilter, Host, HostStatus, ResourceType, Workload},
};

type ApiResult<T> = Result<T, ApiError>;

pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .route("/hosts", get(list_hosts).post(create_host))
        .route("/hosts/refresh", post(refresh_hosts))
        .route("/hosts/{id}/probe", post(probe_host))
        .route("/hosts/{id}", put(update_host).delete(delete_host))
        .route("/apps", get(list_apps).post(create_app))
        .route("/apps/{id}/start", post(start_app))
        .route("/apps/{id}/stop", post(stop_app))
        .route("/apps/{id}", put(update_app).delete(delete_app))
        .route("/audit-logs", get(list_audit_logs))
}

#[derive(Serialize)]
struct Message {
    message: &'static str,
}

#[derive(Serialize)]
struct RefreshResponse {
    message: &'static str,
    servers: Vec<Host>,
}

#[derive(Serialize)]
struct ProbeResponse {
    status: HostStatus,
    workload_count: u32,
    /// Unix seconds.
    last_checked: i64,
}

#[derive(Deserialize, Default)]
struct StartRequest {
    #[serde(default)]
    timeout_minutes: i64,
}

#[derive(Serialize)]
struct StartResponse {
    message: &'static str,
    output: String,
    /// Unix seconds, `0` when the workload only stops manually.
    timer_ends_at: i64,
    app_url: Option<String>,
}

#[derive(Serialize)]
struct StopResponse {
    message: &'static str,
    output: String,
    duration: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct AuditQuery {
    limit: u32,
    offset: u32,
    user_id: Option<String>,
    action: Option<String>,
    resource_type: Option<String>,
}

#[derive(Serialize)]
struct AuditResponse {
    logs: Vec<AuditEntry>,
    total: u64,
    limit: u32,
    offset: u32,
}

/// Blank query values count as absent.
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl AuditQuery {
    fn filter(self) -> Result<AuditFilter, FleetError> {
        let action = non_blank(self.action)
            .map(|a| {
                a.parse::<AuditAction>()
                    .map_err(|_| FleetError::Validation(format!("unknown audit action: {a}")))
            })
            .transpose()?;
        let resource_type = non_blank(self.resource_type)
            .map(|r| {
                r.parse::<ResourceType>()
                    .map_err(|_| FleetError::Validation(format!("unknown resource type: {r}")))
            })
            .transpose()?;
        Ok(AuditFilter {
            actor_id: non_blank(self.user_id),
            action,
            resource_type,
        })
    }
}

#[axum::debug_handler]
async fn list_hosts(State(state): State<AppState>) -> ApiResult<Json<Vec<Host>>> {
    Ok(Json(state.fleet.list_hosts().await?))
}

#[axum::debug_handler]
async fn create_host(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    ApiJson(new): ApiJson<NewHost>,
) -> ApiResult<(StatusCode, Json<Host>)> {
    let host = state.fleet.register_host(new, &ctx).await?;
    Ok((StatusCode::CREATED, Json(host)))
}

#[axum::debug_handler]
async fn refresh_hosts(
    State(state): State<AppState>,
    Actor(ctx): Actor,
) -> ApiResult<Json<RefreshResponse>> {
    let servers = state.fleet.probe_all_hosts(&ctx).await?;
    Ok(Json(RefreshResponse {
        message: "All servers refreshed",
        servers,
    }))
}

#[axum::debug_handler]
async fn probe_host(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<ProbeResponse>> {
    let host = state.fleet.probe_host(id, &ctx).await?;
    Ok(Json(ProbeResponse {
        status: host.status,
        workload_count: host.workload_count,
        last_checked: host.last_checked.map_or(0, |at| at.timestamp()),
    }))
}

#[axum::debug_handler]
async fn update_host(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(update): ApiJson<HostUpdate>,
) -> ApiResult<Json<Host>> {
    Ok(Json(state.fleet.update_host(id, update, &ctx).await?))
}

#[axum::debug_handler]
async fn delete_host(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Message>> {
    state.fleet.remove_host(id, &ctx).await?;
    Ok(Json(Message {
        message: "Server deleted",
    }))
}

#[axum::debug_handler]
async fn list_apps(State(state): State<AppState>) -> ApiResult<Json<Vec<Workload>>> {
    Ok(Json(state.fleet.list_workloads().await?))
}

#[axum::debug_handler]
async fn create_app(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    ApiJson(new): ApiJson<NewWorkload>,
) -> ApiResult<(StatusCode, Json<Workload>)> {
    let workload = state.fleet.register_workload(new, &ctx).await?;
    Ok((StatusCode::CREATED, Json(workload)))
}

/// The body is optional; without one the workload stops manually only. A body that is sent must be
/// declared as JSON.
#[axum::debug_handler]
async fn start_app(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    ApiPath(id): ApiPath<Uuid>,
    OptionalJson(request): OptionalJson<StartRequest>,
) -> ApiResult<Json<StartResponse>> {
    let outcome = state
        .fleet
        .start_workload(id, request.timeout_minutes, Utc::now(), &ctx)
        .await?;
    Ok(Json(StartResponse {
        message: "App started",
        timer_ends_at: outcome.timer_ends_at_epoch_seconds(),
        output: outcome.output,
        app_url: outcome.app_url,
    }))
}

#[axum::debug_handler]
async fn stop_app(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<StopResponse>> {
    let outcome = state.fleet.stop_workload(id, Utc::now(), &ctx).await?;
    Ok(Json(StopResponse {
        message: "App stopped",
        output: outcome.output,
        duration: outcome.ran_for.map(format_duration),
    }))
}

#[axum::debug_handler]
async fn update_app(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(update): ApiJson<WorkloadUpdate>,
) -> ApiResult<Json<Workload>> {
    Ok(Json(state.fleet.update_workload(id, update, &ctx).await?))
}

#[axum::debug_handler]
async fn delete_app(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Message>> {
    state.fleet.remove_workload(id, &ctx).await?;
    Ok(Json(Message {
        message: "App deleted",
    }))
}

#[axum::debug_handler]
async fn list_audit_logs(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<AuditQuery>,
) -> ApiResult<Json<AuditResponse>> {
    let (limit, offset) = (page_size(query.limit), query.offset);
    let page = state
        .fleet
        .list_audit_entries(&query.filter()?, limit, offset)
        .await?;
    Ok(Json(AuditResponse {
        logs: page.entries,
        total: page.total,
        limit,
        offset,
    }))
}

#[cfg(test)]
pub(crate) mod tests {
    use alloc::sync::Arc;

    use axum::{
        body::{Body, to_bytes},
        http::{Request, Response},
    };
    use serde_json::{Value, json};
    use tower::ServiceExt as _;

    use super::*;
    use crate::{
        config::FleetConfig,
        fleet::{
            bring_up_command,
            testing::{ScriptedExecutor, TEST_KEY, closed_port, fleet, host_at},
            tear_down_command,
        },
        http::router::create_router,
        model::WorkloadStatus,
        store::{SqliteStore, Store as _},
    };

    pub(crate) async fn state() -> (AppState, Arc<ScriptedExecutor>) {
        let (state, executor, _store) = state_with_store().await;
        (state, executor)
    }

    async fn state_with_store() -> (AppState, Arc<ScriptedExecutor>, Arc<SqliteStore>) {
        let (fleet, executor, store) = fleet().await;
        let state = AppState {
            fleet,
            config: Arc::new(FleetConfig::default()),
        };
        (state, executor, store)
    }

    async fn call(state: &AppState, request: Request<Body>) -> (StatusCode, Value) {
        let response: Response<Body> = create_router(state.clone())
            .oneshot(request)
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .header("x-forwarded-user", "alice")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn seeded_workload(store: &SqliteStore) -> Workload {
        let host = host_at("10.0.0.5", 22, Some(TEST_KEY));
        store.insert_host(&host).await.unwrap();
        let workload = Workload {
            id: Uuid::new_v4(),
            name: "wiki".to_string(),
            host_id: host.id,
            compose_path: "/srv/wiki".to_string(),
            app_url: Some("http://wiki.internal".to_string()),
            auto_stop_mins: 60,
            status: WorkloadStatus::Stopped,
            started_at: None,
            timer_ends_at: None,
        };
        store.insert_workload(&workload).await.unwrap();
        workload
    }

    #[tokio::test]
    async fn registering_an_unreachable_host_stores_it_offline() {
        let (state, _executor) = state().await;
        let port = closed_port().await;
        let (status, body) = call(
            &state,
            post_json(
                "/api/hosts",
                &json!({ "name": "lab", "address": "127.0.0.1", "port": port, "user": "deploy" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "offline");
        assert!(body.get("private_key").is_none());

        let (status, body) = call(
            &state,
            Request::get("/api/hosts").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn start_and_stop_report_timer_and_duration() {
        let (state, executor, store) = state_with_store().await;
        let workload = seeded_workload(&store).await;
        executor.reply(&bring_up_command("/srv/wiki"), Ok("Started wiki".to_string()));
        executor.reply(&tear_down_command("/srv/wiki"), Ok("Stopped wiki".to_string()));

        let (status, body) = call(
            &state,
            post_json(
                &format!("/api/apps/{}/start", workload.id),
                &json!({ "timeout_minutes": 15 }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["output"], "Started wiki");
        assert_eq!(body["app_url"], "http://wiki.internal");
        assert!(body["timer_ends_at"].as_i64().unwrap() > Utc::now().timestamp());

        let (status, body) = call(
            &state,
            post_json(&format!("/api/apps/{}/stop", workload.id), &json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["output"], "Stopped wiki");
        assert_eq!(body["duration"], "0m0s");

        let (status, body) = call(
            &state,
            Request::get("/api/audit-logs?userId=alice&action=start_app")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["limit"], 50);
        assert_eq!(body["logs"][0]["actor_name"], "alice");
    }

    #[tokio::test]
    async fn start_without_body_means_manual_stop() {
        let (state, _executor, store) = state_with_store().await;
        let workload = seeded_workload(&store).await;

        let (status, body) = call(
            &state,
            Request::post(format!("/api/apps/{}/start", workload.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["timer_ends_at"], 0);
    }

    #[tokio::test]
    async fn remote_failure_maps_to_bad_gateway_with_output() {
        let (state, executor, store) = state_with_store().await;
        let workload = seeded_workload(&store).await;
        executor.reply(
            &bring_up_command("/srv/wiki"),
            Err(ScriptedExecutor::command_failure("10.0.0.5:22")),
        );

        let (status, body) = call(
            &state,
            post_json(&format!("/api/apps/{}/start", workload.id), &json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["kind"], "command_error");
        assert_eq!(body["output"], "no such file or directory");

        let stored = store.workload(workload.id).await.unwrap().unwrap();
        assert_eq!(stored.status, WorkloadStatus::Stopped);
    }

    #[tokio::test]
    async fn unknown_workload_is_not_found() {
        let (state, _executor) = state().await;
        let (status, body) = call(
            &state,
            post_json(&format!("/api/apps/{}/stop", Uuid::new_v4()), &json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "workload_not_found");
    }

    #[tokio::test]
    async fn unknown_audit_action_is_rejected() {
        let (state, _executor) = state().await;
        let (status, body) = call(
            &state,
            Request::get("/api/audit-logs?action=reboot_everything")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "validation_error");
    }

    #[tokio::test]
    async fn malformed_requests_get_json_validation_errors() {
        let (state, _executor) = state().await;
        let requests = [
            post_json("/api/apps/not-a-uuid/start", &json!({})),
            Request::post("/api/hosts")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"name": "lab", "address": "#))
                .unwrap(),
            Request::get("/api/audit-logs?limit=-1")
                .body(Body::empty())
                .unwrap(),
        ];
        for request in requests {
            let uri = request.uri().clone();
            let (status, body) = call(&state, request).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body["kind"], "validation_error", "{uri}");
            assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()), "{uri}");
        }
    }

    #[tokio::test]
    async fn start_body_without_json_content_type_is_rejected() {
        let (state, executor, store) = state_with_store().await;
        let workload = seeded_workload(&store).await;

        let (status, body) = call(
            &state,
            Request::post(format!("/api/apps/{}/start", workload.id))
                .body(Body::from(r#"{"timeout_minutes": 15}"#))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "validation_error");
        assert!(executor.calls().is_empty());
        let stored = store.workload(workload.id).await.unwrap().unwrap();
        assert_eq!(stored.status, WorkloadStatus::Stopped);
    }

    #[tokio::test]
    async fn edits_change_only_the_given_fields() {
        let (state, _executor, store) = state_with_store().await;
        let workload = seeded_workload(&store).await;

        let (status, body) = call(
            &state,
            Request::put(format!("/api/apps/{}", workload.id))
                .header("content-type", "application/json")
                .body(Body::from(json!({ "auto_stop_mins": 5 }).to_string()))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["auto_stop_mins"], 5);
        assert_eq!(body["compose_path"], "/srv/wiki");
        assert_eq!(body["app_url"], "http://wiki.internal");

        let (status, body) = call(
            &state,
            Request::put(format!("/api/hosts/{}", workload.host_id))
                .header("content-type", "application/json")
                .body(Body::from(json!({ "address": "10.0.0.6" }).to_string()))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["address"], "10.0.0.6");
        assert_eq!(body["port"], 22);

        let (status, body) = call(
            &state,
            Request::put(format!("/api/hosts/{}", Uuid::new_v4()))
                .header("content-type", "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "host_not_found");
    }
}
