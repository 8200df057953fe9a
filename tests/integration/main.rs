//! Integration test driver for `tests/integration/` submodules.
//!
//! Every test runs the real session engine against an in-memory scripted
//! link and a manual clock; no network or timers involved.

mod channel_sync_tests;
mod device_api_tests;
mod harness;
mod mock_link;
mod session_tests;
