use core::{net::SocketAddr, time::Duration};

use axum::{
    Json, Router,
    body::Body,
    extract::connect_info::IntoMakeServiceWithConnectInfo,
    http::{
        Request, StatusCode,
        header::{AUTHORIZATION, COOKIE},
    },
    middleware::{self as ax_middleware},
    routing,
};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::{
    ServiceBuilderExt as _, request_id::MakeRequestUuid, timeout::TimeoutLayer, trace::TraceLayer,
};

use crate::{
    app::AppState,
    http::{
        api,
        server::middleware::{LevelAdjustingOnFailure, api_headers_middleware},
    },
};

/// Headroom on top of the remote command timeout before a request is abandoned.
const REQUEST_TIMEOUT_SLACK: Duration = Duration::from_secs(30);

/// Builds the routed application with state and middleware applied.
pub(crate) fn create_router(app_state: AppState) -> Router<()> {
    let request_timeout = app_state.config.remote.command_timeout() + REQUEST_TIMEOUT_SLACK;

    let middleware_stack = ServiceBuilder::new()
        .sensitive_headers([AUTHORIZATION, COOKIE])
        .set_x_request_id(MakeRequestUuid)
        .propagate_x_request_id()
        .layer(TraceLayer::new_for_http().on_failure(LevelAdjustingOnFailure))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(ax_middleware::from_fn(api_headers_middleware));

    Router::new()
        .nest("/api", api::routes())
        .with_state(app_state)
        .fallback(routing::any(|req: Request<Body>| async move {
            tracing::warn!(method = %req.method(), uri = %req.uri(), "Unhandled request");
            (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "no such route", "kind": "route_not_found" })),
            )
        }))
        .layer(middleware_stack)
}

/// The router as a service that records the peer address for request attribution.
pub(crate) fn create_app(
    app_state: AppState,
) -> IntoMakeServiceWithConnectInfo<Router<()>, SocketAddr> {
    create_router(app_state).into_make_service_with_connect_info::<SocketAddr>()
}
