use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use fleetctl_common::RemoteError;
use serde_json::json;
use tracing::error;

use crate::fleet::FleetError;

/// JSON error response: `{"error": <message>, "kind": <kind>}`, plus any partial remote output.
#[derive(Debug)]
pub(crate) struct ApiError(pub FleetError);

impl From<FleetError> for ApiError {
    fn from(e: FleetError) -> Self {
        Self(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(FleetError::Validation(rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self(FleetError::Validation(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self(FleetError::Validation(rejection.body_text()))
    }
}

impl ApiError {
    pub(crate) const fn status(&self) -> StatusCode {
        match self.0 {
            FleetError::Validation(_)
            | FleetError::RemoteExecution(RemoteError::InvalidTarget(_)) => StatusCode::BAD_REQUEST,
            FleetError::HostNotFound(_) | FleetError::WorkloadNotFound(_) => StatusCode::NOT_FOUND,
            FleetError::RemoteExecution(_) => StatusCode::BAD_GATEWAY,
            FleetError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() && status != StatusCode::BAD_GATEWAY {
            error!("Request failed: {}", self.0);
        }
        let mut body = json!({
            "error": self.0.to_string(),
            "kind": self.0.kind(),
        });
        if let FleetError::RemoteExecution(ref e) = self.0
            && let Some(output) = e.partial_output()
        {
            body["output"] = json!(output);
        }
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn statuses_follow_the_error_taxonomy() {
        let remote = RemoteError::Command {
            endpoint: "h:22".to_string(),
            exit_status: Some(1),
            message: "exited with status 1".to_string(),
            output: "partial".to_string(),
        };
        let cases = [
            (FleetError::Validation("x".to_string()), StatusCode::BAD_REQUEST),
            (FleetError::HostNotFound(Uuid::nil()), StatusCode::NOT_FOUND),
            (FleetError::WorkloadNotFound(Uuid::nil()), StatusCode::NOT_FOUND),
            (FleetError::RemoteExecution(remote), StatusCode::BAD_GATEWAY),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError(err).status(), expected);
        }
    }
}
