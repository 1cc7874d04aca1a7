//! Todo API server library.
//!
//! Provides the session authentication subsystem (rotating refresh tokens
//! with replay detection), the todo CRUD API, and a cookie-aware HTTP client
//! with single-flight token refresh.

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod middleware;
pub mod migration;
pub mod models;
pub mod services;
