//! QtTest Core Library
//!
//! Discovers QtTest executables through CTest, introspects their test
//! slots, runs them and maps TAP results back to slots.
//! The binary entry point is in main.rs.

pub mod codemodel;
pub mod config;
pub mod correlate;
pub mod ctest;
pub mod error;
pub mod executable;
pub mod introspect;
pub mod junit;
pub mod logger;
pub mod paths;
pub mod process;
pub mod reporter;
pub mod runner;
pub mod scan;
pub mod signals;
pub mod suite;
pub mod tap;

pub use executable::{Failure, Slot, SlotState, TestExecutable};
pub use logger::Logger;
pub use runner::RunOptions;
pub use suite::TestSuite;
