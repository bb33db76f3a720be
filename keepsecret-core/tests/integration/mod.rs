//! Integration tests driven by the in-memory secret store

pub mod fixtures;
pub mod item_tests;
