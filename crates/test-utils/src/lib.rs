//! Shared helpers for integration tests that need a live PostgreSQL server.

pub mod db;
