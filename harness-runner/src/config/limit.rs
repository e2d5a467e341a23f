// Copyright (c) The harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::ConcurrencyLimitParseError;
use serde::Deserialize;
use std::{fmt, num::NonZeroUsize, str::FromStr, sync::OnceLock};
use tracing::warn;

const CPUS_KEYWORD: &str = "num-cpus";

/// How many test files may run at once.
///
/// Set by the `test-threads` profile key and the `--limit` flag. Both accept a positive count,
/// `"num-cpus"`, or a negative number meaning "all CPUs but this many".
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(try_from = "RawLimit")]
pub enum ConcurrencyLimit {
    /// Exactly this many test files at a time.
    Fixed(NonZeroUsize),

    /// One test file per logical CPU, leaving `reserve` CPUs free. Never less than one.
    Cpus {
        /// The number of CPUs left free.
        reserve: usize,
    },
}

impl ConcurrencyLimit {
    /// Resolves the limit against the CPUs available on this machine.
    pub fn resolve(self) -> NonZeroUsize {
        match self {
            Self::Fixed(n) => n,
            Self::Cpus { reserve } => NonZeroUsize::new(available_cpus().saturating_sub(reserve))
                .unwrap_or(NonZeroUsize::MIN),
        }
    }

    fn from_signed(n: i64) -> Result<Self, ConcurrencyLimitParseError> {
        if n > 0 {
            usize::try_from(n)
                .ok()
                .and_then(NonZeroUsize::new)
                .map(Self::Fixed)
                .ok_or_else(|| ConcurrencyLimitParseError::new(n.to_string(), "too large"))
        } else if n < 0 {
            let reserve = usize::try_from(n.unsigned_abs())
                .map_err(|_| ConcurrencyLimitParseError::new(n.to_string(), "too large"))?;
            Ok(Self::Cpus { reserve })
        } else {
            Err(ConcurrencyLimitParseError::new("0", "must not be zero"))
        }
    }
}

impl FromStr for ConcurrencyLimit {
    type Err = ConcurrencyLimitParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == CPUS_KEYWORD {
            return Ok(Self::Cpus { reserve: 0 });
        }
        let n = s
            .parse::<i64>()
            .map_err(|err| ConcurrencyLimitParseError::new(s, err.to_string()))?;
        Self::from_signed(n)
    }
}

impl fmt::Display for ConcurrencyLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(n) => write!(f, "{n}"),
            Self::Cpus { reserve: 0 } => f.write_str(CPUS_KEYWORD),
            Self::Cpus { reserve } => write!(f, "-{reserve}"),
        }
    }
}

// TOML integers arrive as i64, strings as the keyword.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawLimit {
    Number(i64),
    Keyword(String),
}

impl TryFrom<RawLimit> for ConcurrencyLimit {
    type Error = ConcurrencyLimitParseError;

    fn try_from(raw: RawLimit) -> Result<Self, Self::Error> {
        match raw {
            RawLimit::Number(n) => Self::from_signed(n),
            RawLimit::Keyword(s) if s == CPUS_KEYWORD => Ok(Self::Cpus { reserve: 0 }),
            RawLimit::Keyword(s) => Err(ConcurrencyLimitParseError::new(
                s,
                format!("expected an integer or \"{CPUS_KEYWORD}\""),
            )),
        }
    }
}

fn available_cpus() -> usize {
    static CPUS: OnceLock<usize> = OnceLock::new();

    *CPUS.get_or_init(|| match std::thread::available_parallelism() {
        Ok(count) => count.get(),
        Err(err) => {
            warn!("unable to determine the number of CPUs ({err}), assuming 1");
            1
        }
    })
}
