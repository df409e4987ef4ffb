// Library exports for the binary, benchmarks and integration tests

// ===== Cookie tracking =====
pub mod cookies;
pub mod tracking;

// ===== Proxy runtime =====
pub mod config;
pub mod controller;
pub mod transport;

// ===== Operator surfaces =====
pub mod admin_api;
pub mod logging;
pub mod metrics;
pub mod reporting;
