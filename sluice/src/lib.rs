//! The sluice metrics reporter.
//!
//! This library drains a [`sluice_registry::Registry`] on a fixed interval and
//! publishes what it finds to a remote monitoring backend. The
//! [`reporter::Reporter`] converts each metric into named data points, the
//! [`filter`] decides which of those are worth sending and the [`publish`]
//! module ships them in bounded batches. The [`scheduler::Scheduler`] drives
//! the whole thing until told to stop.

#![deny(clippy::all)]
#![deny(clippy::cargo)]
#![deny(clippy::pedantic)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![deny(clippy::dbg_macro)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]
#![deny(missing_copy_implementations)]
#![deny(missing_debug_implementations)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::multiple_crate_versions)]

pub mod config;
pub mod datum;
pub mod filter;
pub mod publish;
pub mod reporter;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod test;
