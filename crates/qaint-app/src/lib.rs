//! Process wiring for the QA intelligence sync pipeline.
//!
//! # Module organization
//!
//! - `config`: application configuration from environment variables
//! - `infrastructure`: the placeholder outbound tracker port and Prometheus setup
//! - `presentation`: HTTP routes and handlers
//! - `state`: application state container with `FromRef` implementations

pub mod config;
pub mod infrastructure;
pub mod presentation;
pub mod state;
