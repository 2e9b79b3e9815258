// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers and proptest strategies.

use crate::build::BuildStatus;
use crate::prompt::CustomPromptStatus;
use crate::step::StepStatus;

pub mod strategies {
    use super::*;
    use proptest::prelude::*;

    pub fn arb_build_status() -> impl Strategy<Value = BuildStatus> {
        prop_oneof![
            Just(BuildStatus::Queued),
            Just(BuildStatus::Running),
            Just(BuildStatus::Retrying),
            Just(BuildStatus::Completed),
            Just(BuildStatus::Failed),
            Just(BuildStatus::Cancelled),
        ]
    }

    pub fn arb_step_status() -> impl Strategy<Value = StepStatus> {
        prop_oneof![
            Just(StepStatus::Pending),
            Just(StepStatus::Running),
            Just(StepStatus::Retrying),
            Just(StepStatus::Succeeded),
            Just(StepStatus::Failed),
        ]
    }

    pub fn arb_custom_prompt_status() -> impl Strategy<Value = CustomPromptStatus> {
        prop_oneof![
            Just(CustomPromptStatus::Pending),
            Just(CustomPromptStatus::Injected),
            Just(CustomPromptStatus::Executed),
            Just(CustomPromptStatus::Skipped),
        ]
    }

    /// Short prompt-like strings.
    pub fn arb_prompt() -> impl Strategy<Value = String> {
        "[a-z ]{1,40}"
    }
}
