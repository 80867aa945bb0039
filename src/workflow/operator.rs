//! Operator prompts: the only place the workflow waits on a human.

use dialoguer::{Confirm, Input};

use crate::commit::group::Group;
use crate::error::WorkflowError;

/// What the operator wants to do with the composed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Confirm,
    Adjust,
    Skip,
    AbortAll,
}

impl Decision {
    /// Default taken on empty input.
    pub const DEFAULT: Decision = Decision::Confirm;

    /// Parse a letter-coded answer; empty input means [`Decision::DEFAULT`].
    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_lowercase().as_str() {
            "" => Some(Self::DEFAULT),
            "c" | "confirm" | "y" | "yes" => Some(Decision::Confirm),
            "a" | "adjust" => Some(Decision::Adjust),
            "s" | "skip" => Some(Decision::Skip),
            "q" | "quit" | "abort" => Some(Decision::AbortAll),
            _ => None,
        }
    }
}

/// Source of operator answers. The terminal implementation uses dialoguer;
/// tests drive the workflow with scripted answers.
pub trait Operator {
    /// Yes/no question with a default for empty input.
    fn confirm(&mut self, prompt: &str, default: bool) -> Result<bool, WorkflowError>;

    /// Ask what to do with group `group` of `total`.
    fn decide(&mut self, group: &Group, total: usize) -> Result<Decision, WorkflowError>;

    /// Free-text question; empty input yields `default`.
    fn input(&mut self, prompt: &str, default: &str) -> Result<String, WorkflowError>;
}

/// Interactive prompts on the controlling terminal.
#[derive(Debug, Default)]
pub struct TerminalOperator;

impl Operator for TerminalOperator {
    fn confirm(&mut self, prompt: &str, default: bool) -> Result<bool, WorkflowError> {
        Confirm::new()
            .with_prompt(prompt)
            .default(default)
            .interact()
            .map_err(|e| WorkflowError::Prompt(e.to_string()))
    }

    fn decide(&mut self, group: &Group, total: usize) -> Result<Decision, WorkflowError> {
        loop {
            let answer: String = Input::new()
                .with_prompt(format!(
                    "GROUP {}/{}: [c]onfirm, [a]djust, [s]kip, [q]uit all",
                    group.index, total
                ))
                .default("c".to_string())
                .show_default(true)
                .allow_empty(true)
                .interact_text()
                .map_err(|e| WorkflowError::Prompt(e.to_string()))?;

            match Decision::from_key(&answer) {
                Some(decision) => return Ok(decision),
                None => eprintln!("  Please answer c, a, s or q."),
            }
        }
    }

    fn input(&mut self, prompt: &str, default: &str) -> Result<String, WorkflowError> {
        Input::new()
            .with_prompt(prompt)
            .default(default.to_string())
            .show_default(!default.is_empty())
            .allow_empty(true)
            .interact_text()
            .map_err(|e| WorkflowError::Prompt(e.to_string()))
    }
}
