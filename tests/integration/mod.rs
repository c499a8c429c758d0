//! Integration tests for the gazette store, resolver, patcher and sync controller

mod api_scenarios;
mod config_integration;
mod store_integration;
mod sync_integration;
mod test_utils;
