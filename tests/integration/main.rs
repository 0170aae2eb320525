//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises the sync engine against
//! mock adapters. All tests run on the host (x86_64) with no broker or
//! real hardware required.

mod mock_hw;
mod ota_flow_tests;
mod supervisor_tests;
mod sync_flow_tests;
