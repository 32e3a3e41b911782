//! # stressgen
//!
//! Generates a synthetic, internally consistent command stream for stress
//! testing a multi-threaded order-matching engine.
//!
//! ## Stream Layout
//!
//! ```text
//! <num_threads>                      header: size of the worker pool
//! o                                  open: start the workers
//! .                                  barrier: synchronize before processing
//! <tid> <B|S> <oid> <sym> <px> <qty> place, oid = 0, 1, 2, ...
//! <tid> C <oid>                      cancel of an earlier placement
//! x                                  close: shut the workers down
//! ```
//!
//! ## Guarantees
//!
//! - Order IDs are allocated sequentially from 0; cancels never consume one
//! - Every cancel names an order placed earlier, on the thread it was placed on
//! - Exactly `orders` command lines between the barrier and close markers
//! - Same seed and config => byte-identical stream

pub mod command;
pub mod config;
pub mod registry;
pub mod generator;
pub mod verify;
pub mod logging;

// Re-exports for convenience
pub use command::{Command, PlaceOrder, CancelOrder, Side, Instrument, Marker, ParseError};
pub use config::{GeneratorConfig, CancelPolicy, ConfigError};
pub use registry::{OrderRegistry, OrderRef};
pub use generator::{generate, Generator, GenerateError, GenerateStats};
pub use verify::{
    verify_reader, verify_str, StreamSummary, StreamVerifier, VerifyError, VerifyLimits,
};
