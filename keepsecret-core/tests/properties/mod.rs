//! Property-based tests for KeepSecret core library

mod folder_tests;
mod tracker_tests;
