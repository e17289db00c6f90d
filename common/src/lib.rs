//! Remote execution primitives shared by the fleet coordinator.
//!
//! This crate provides:
//! - The [`RemoteExecutor`] seam used by everything that talks to a managed host
//! - An SSH-backed implementation ([`SshExecutor`]) with bounded connect and command timeouts
//! - Private key syntax checks that run before any socket is opened
//! - A classified error type ([`RemoteError`]) that never carries key material

extern crate alloc;
extern crate core;

mod remote;

pub use remote::*;
