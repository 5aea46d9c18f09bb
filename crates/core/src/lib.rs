//! covkeeper-core
//!
//! Core library for turning externally produced code-coverage records into
//! instruction-exact hit sets.
//!
//! The pipeline is:
//! raw file bytes → [`io::StrictLineReader`] → [`ranges::CoverageRangeSet`]
//! → [`model::CoverageAggregateModel`] → [`model::InstructionAlignmentModel`].
//!
//! All substantive logic lives here so it is testable and reusable from
//! frontends; the CLI only parses arguments and prints.

pub mod address;
pub mod config;
pub mod io;
pub mod listing;
pub mod model;
pub mod ranges;
pub mod report;
pub mod session;

pub use address::{Address, AddressRange};
pub use session::CoverageSession;

/// Returns the library version as encoded at compile time.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
