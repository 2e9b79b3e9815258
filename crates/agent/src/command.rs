// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent command-line configuration.

use thiserror::Error;

#[derive(Debug, Error)]
#[error("empty agent command")]
pub struct EmptyCommand;

/// The agent program and its fixed arguments.
///
/// Parsed from `MCP_AGENT_CMD` by whitespace splitting; arguments that need
/// embedded spaces belong in a wrapper script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl AgentCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self { program: program.into(), args }
    }

    /// Parse a whitespace-separated command line.
    pub fn parse(line: &str) -> Result<Self, EmptyCommand> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or(EmptyCommand)?;
        Ok(Self { program, args: parts.collect() })
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
