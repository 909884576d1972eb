//! Scenario tests for the league core.
//!
//! Each case starts a fully wired core over the test config with a recording
//! notifier and drives it the way a hosting app would.


pub mod support;
