//! Integration tests for deriv-bot.
//!
//! These tests verify the interaction between components:
//! - Live connector against an in-process WebSocket server
//! - Full orchestrator runs against the simulated venue

pub mod common;
