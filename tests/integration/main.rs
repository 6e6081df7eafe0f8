//! Integration tests against a mock procurement site

mod fixtures;
mod orchestrator_tests;
mod router_tests;
mod sync_tests;
