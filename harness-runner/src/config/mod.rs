// Copyright (c) The harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration support for the harness.
//!
//! Configuration is layered: the built-in default config, then `.config/harness.toml` in the
//! repository (or a file passed on the command line). Settings that vary between runs live in
//! named profiles, which inherit unset values from `profile.default`.

mod command;
mod imp;
mod limit;

pub use command::*;
pub use imp::*;
pub use limit::*;
