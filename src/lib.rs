//! Region-routed job dispatcher
//!
//! Accepts work requests over HTTP, validates them, and routes each one
//! through an intake queue to the regional queue named by its `location`,
//! where a worker calls a backend service on the request's behalf. Every
//! queue is drained before the process exits.

pub mod app_state;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;
