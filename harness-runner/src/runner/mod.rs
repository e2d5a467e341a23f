// Copyright (c) The harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The test runner.
//!
//! The main structure in this module is [`TestRunner`]. The scheduling and retry building blocks
//! it is made of are exposed as [`schedule`] and [`retry_failures`].

mod imp;
mod retry;
mod scheduler;

pub use imp::*;
pub use retry::*;
pub use scheduler::*;
