//! Mod conversion API server library.
//!
//! Exposes the core building blocks (config, state, job engine, error
//! handling, routes, WebSocket progress stream) so integration tests and the
//! binary entrypoint can both access them.

pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
pub mod ws;
