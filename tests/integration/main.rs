//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that drives the full controller
//! against mock adapters.  All tests run on the host with no hardware.

mod fault_tests;
mod isolation_tests;
mod mock_hw;
mod sequencing_tests;
