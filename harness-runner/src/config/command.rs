// Copyright (c) The harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, de::Error};
use std::fmt;

/// The command used to run a single test file.
///
/// Specified either as a Unix shell-style string, which is split with `shell-words`, or as a list
/// of arguments. Arguments may contain placeholders that are filled in per attempt; see
/// [`CommandPlaceholders`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestCommand {
    program: String,
    args: Vec<String>,
}

impl TestCommand {
    /// Creates a new command from a program and its arguments.
    pub fn new(
        program: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the program, with placeholders not yet substituted.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Returns the arguments, with placeholders not yet substituted.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Returns the program and arguments with every placeholder substituted.
    pub fn substitute(&self, placeholders: &CommandPlaceholders<'_>) -> (String, Vec<String>) {
        let program = placeholders.apply(&self.program);
        let args = self.args.iter().map(|arg| placeholders.apply(arg)).collect();
        (program, args)
    }
}

impl fmt::Display for TestCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&shell_words::join(
            std::iter::once(&self.program).chain(&self.args),
        ))
    }
}

impl<'de> Deserialize<'de> for TestCommand {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct CommandVisitor;

        impl<'de> serde::de::Visitor<'de> for CommandVisitor {
            type Value = TestCommand;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a Unix shell command or a list of arguments")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: Error,
            {
                let mut args = shell_words::split(value).map_err(E::custom)?;
                if args.is_empty() {
                    return Err(E::invalid_value(serde::de::Unexpected::Str(value), &self));
                }
                let program = args.remove(0);
                Ok(TestCommand { program, args })
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: serde::de::SeqAccess<'de>,
            {
                let Some(program) = seq.next_element::<String>()? else {
                    return Err(A::Error::invalid_length(0, &self));
                };
                let mut args = Vec::new();
                while let Some(value) = seq.next_element::<String>()? {
                    args.push(value);
                }
                Ok(TestCommand { program, args })
            }
        }

        deserializer.deserialize_any(CommandVisitor)
    }
}

/// Values substituted into a [`TestCommand`] for one attempt.
///
/// `{test}`, `{port}`, `{attempt}` and `{workdir}` are recognized; anything else in braces is left
/// alone.
#[derive(Clone, Debug)]
pub struct CommandPlaceholders<'a> {
    /// The test file.
    pub test: &'a str,

    /// The browser debug port.
    pub port: u16,

    /// The attempt number.
    pub attempt: u32,

    /// The private working directory.
    pub workdir: &'a str,
}

impl CommandPlaceholders<'_> {
    fn apply(&self, input: &str) -> String {
        if !input.contains('{') {
            return input.to_owned();
        }
        input
            .replace("{test}", self.test)
            .replace("{port}", &self.port.to_string())
            .replace("{attempt}", &self.attempt.to_string())
            .replace("{workdir}", self.workdir)
    }
}
