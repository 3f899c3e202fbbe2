//! Conformance suite for `carbon` storage adapters.
//!
//! A fixture builds a [`CommonAdapterTest`] around the adapter under test and hands it
//! to [`common_adapter_tests!`], which expands every behavior into its own `#[test]`.

pub mod harness;
pub mod logging;
pub mod macros;
pub mod mock;
pub mod time;

pub use harness::{CommonAdapterTest, Outcome, run_behavior};
pub use logging::init_test_logging;
pub use mock::MockAdapter;
pub use time::{ModifiableTime, RealTime, TimeControl};
