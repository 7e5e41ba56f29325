//! tutor-gateway: HTTP front end for the tutor router
//!
//! Exposes `POST /api/v1/ask`, `GET /api/v1/history` and a service info
//! document at `/`.

pub mod protocol;
pub mod server;

pub use server::{GatewayServer, GatewayState};
