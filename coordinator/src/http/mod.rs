//! HTTP control API: JSON endpoints over the fleet, attributed through the proxy-supplied actor
//! header.

pub mod api;
mod context;
mod error;
mod extract;
pub mod server;

pub(crate) use server::*;
