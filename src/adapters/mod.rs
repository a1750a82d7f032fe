//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (HTTP client, metrics server).
//!
//! Adapter categories:
//! - `api`: LZT market REST API client, auth, and account facade
//! - `metrics`: Prometheus metrics export and health checks

pub mod api;
pub mod metrics;
