//! Deterministic, pure logic shared by the orchestrator.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod budget;
pub mod graph;
pub mod path;
pub mod policy;
pub mod schema;
pub mod types;
pub mod validator;
pub mod worker;
