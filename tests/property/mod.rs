//! Property-based tests for history resolution

mod patch_window;
