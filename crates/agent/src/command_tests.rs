// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn parses_program_and_args() {
    let cmd = AgentCommand::parse("codegen --print --dangerously-skip-permissions").unwrap();
    assert_eq!(cmd.program, "codegen");
    assert_eq!(cmd.args, vec!["--print", "--dangerously-skip-permissions"]);
}

#[test]
fn collapses_whitespace() {
    let cmd = AgentCommand::parse("  codegen   run  ").unwrap();
    assert_eq!(cmd.program, "codegen");
    assert_eq!(cmd.args, vec!["run"]);
}

#[test]
fn empty_line_is_an_error() {
    assert!(AgentCommand::parse("").is_err());
    assert!(AgentCommand::parse("   ").is_err());
}

#[test]
fn bare_program() {
    let cmd = AgentCommand::parse("codegen").unwrap();
    assert!(cmd.args.is_empty());
}
