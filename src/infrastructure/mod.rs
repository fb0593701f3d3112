//! Adapters for the domain ports: the real REST backend plus in-memory
//! and fake implementations for tests and backend-less demos.

pub mod fake_wallet;
pub mod in_memory;
pub mod rest;
