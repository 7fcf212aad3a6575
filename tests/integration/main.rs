//! Integration test suite for Issue-Harvest

mod engine_tests;
