// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Preview dev-server command.

use std::path::Path;
use std::process::Stdio;
use tokio::process::{Child, Command};

/// Dev-server command template.
///
/// `{port}` and `{workspace}` placeholders in arguments are substituted at
/// spawn time; `PORT` is always injected into the child environment for
/// servers that read it from there instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for PreviewCommand {
    fn default() -> Self {
        Self { program: "npm".to_string(), args: vec!["run".to_string(), "dev".to_string()] }
    }
}

impl PreviewCommand {
    /// Parse a whitespace-separated command line; `None` input keeps the
    /// default (`npm run dev`).
    pub fn parse(line: Option<&str>) -> Self {
        let Some(line) = line else {
            return Self::default();
        };
        let mut parts = line.split_whitespace().map(str::to_string);
        match parts.next() {
            Some(program) => Self { program, args: parts.collect() },
            None => Self::default(),
        }
    }

    /// Arguments with placeholders substituted for this spawn.
    pub fn resolved_args(&self, port: u16, workspace: &Path) -> Vec<String> {
        let ws = workspace.display().to_string();
        self.args
            .iter()
            .map(|a| a.replace("{port}", &port.to_string()).replace("{workspace}", &ws))
            .collect()
    }

    /// Spawn the dev server against a workspace, bound to `port`.
    pub fn spawn(&self, port: u16, workspace: &Path) -> std::io::Result<Child> {
        Command::new(&self.program)
            .args(self.resolved_args(port, workspace))
            .current_dir(workspace)
            .env("PORT", port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
    }
}

#[cfg(test)]
#[path = "preview_tests.rs"]
mod tests;
