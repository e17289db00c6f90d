//! Attribution of API requests: who is calling and from where.
//!
//! Authentication happens in the proxy in front of the service; the actor name is taken from the
//! header it sets and is used for the audit trail only.

use core::{convert::Infallible, net::SocketAddr};

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, header::USER_AGENT, request::Parts},
};

use crate::{app::AppState, model::RequestContext};

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Extractor for the [`RequestContext`] of an API call. Never rejects.
pub(crate) struct Actor(pub RequestContext);

impl FromRequestParts<AppState> for Actor {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|&ConnectInfo(addr)| addr);
        Ok(Self(request_context(
            &parts.headers,
            peer,
            &state.config.server.actor_header,
        )))
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

pub(crate) fn request_context(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    actor_header: &str,
) -> RequestContext {
    let actor = header(headers, actor_header);
    // First hop of X-Forwarded-For is the original client.
    let forwarded = header(headers, FORWARDED_FOR)
        .and_then(|value| value.split(',').next().map(|hop| hop.trim().to_string()))
        .filter(|hop| !hop.is_empty());
    RequestContext {
        actor_id: actor.clone(),
        actor_name: actor,
        origin_address: forwarded.or_else(|| peer.map(|addr| addr.ip().to_string())),
        origin_client: header(headers, USER_AGENT.as_str()),
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn proxy_headers_take_precedence_over_peer() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-user", HeaderValue::from_static("alice"));
        headers.insert(
            FORWARDED_FOR,
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static("Mozilla/5.0"));
        let peer: SocketAddr = "10.0.0.1:51234".parse().unwrap();

        let ctx = request_context(&headers, Some(peer), "x-forwarded-user");
        assert_eq!(ctx.actor_name.as_deref(), Some("alice"));
        assert_eq!(ctx.actor_id.as_deref(), Some("alice"));
        assert_eq!(ctx.origin_address.as_deref(), Some("203.0.113.9"));
        assert_eq!(ctx.origin_client.as_deref(), Some("Mozilla/5.0"));
    }

    #[test]
    fn missing_headers_fall_back_to_peer_and_unknown_actor() {
        let peer: SocketAddr = "[::1]:40000".parse().unwrap();
        let ctx = request_context(&HeaderMap::new(), Some(peer), "x-forwarded-user");
        assert_eq!(ctx.actor_name, None);
        assert_eq!(ctx.actor_label(), "unknown");
        assert_eq!(ctx.origin_address.as_deref(), Some("::1"));
        assert_eq!(ctx.origin_client, None);
    }
}
