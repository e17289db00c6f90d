//! Router assembly and the middleware stack shared by every route.

pub mod middleware;
pub mod router;
