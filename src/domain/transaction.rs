//! Release transaction plan
//!
//! A transaction is an explicit list of (step, policy, compensation)
//! entries. The runner in `services::transaction` executes it; keeping the
//! plan as data makes the rollback order reviewable on its own.

use std::fmt;

use super::command::RemoteCommand;
use super::release::{ReleaseId, ReleaseStep};

/// What to do when a step has to be undone
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compensation {
    /// Nothing to undo
    None,
    /// Run these commands in order
    Commands(Vec<RemoteCommand>),
    /// Run another step through the step runner
    Invoke(ReleaseStep),
    /// The step cannot be undone; run `cleanup` and report `reason`
    Unavailable {
        cleanup: Vec<RemoteCommand>,
        reason: String,
    },
}

/// Whether a failing step aborts the transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPolicy {
    /// Failure compensates every registered step and aborts
    Required,
    /// Failure compensates only this step and the transaction continues
    BestEffort,
}

#[derive(Debug, Clone)]
pub struct PlannedStep {
    pub step: ReleaseStep,
    pub policy: StepPolicy,
    pub compensation: Compensation,
}

/// Ordered steps of one release transaction
#[derive(Debug, Clone)]
pub struct TransactionPlan {
    pub release: ReleaseId,
    steps: Vec<PlannedStep>,
}

impl TransactionPlan {
    pub fn new(release: ReleaseId) -> Self {
        Self {
            release,
            steps: Vec::new(),
        }
    }

    /// Builder: append a step
    pub fn with(mut self, step: ReleaseStep, policy: StepPolicy, compensation: Compensation) -> Self {
        self.steps.push(PlannedStep {
            step,
            policy,
            compensation,
        });
        self
    }

    pub fn steps(&self) -> &[PlannedStep] {
        &self.steps
    }

    pub fn contains(&self, step: ReleaseStep) -> bool {
        self.steps.iter().any(|p| p.step == step)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// What happened while compensating a failed transaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackReport {
    /// Steps whose compensation ran, in the order it ran
    pub compensated: Vec<ReleaseStep>,
    /// Compensation failures; logged, never masking the original error
    pub failures: Vec<String>,
    /// Set when some step could not be undone at all
    pub terminal: Option<String>,
}

impl RollbackReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.terminal.is_none()
    }
}

impl fmt::Display for RollbackReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let steps: Vec<&str> = self.compensated.iter().map(|s| s.name()).collect();
        write!(f, "rolled back [{}]", steps.join(", "))?;
        if !self.failures.is_empty() {
            write!(f, "; {} compensation(s) failed", self.failures.len())?;
        }
        if let Some(reason) = &self.terminal {
            write!(f, "; rollback incomplete: {}", reason)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_builder_keeps_order() {
        let id = ReleaseId::parse("20230101000000").unwrap();
        let plan = TransactionPlan::new(id)
            .with(ReleaseStep::Materialize, StepPolicy::Required, Compensation::None)
            .with(ReleaseStep::Finalize, StepPolicy::Required, Compensation::None)
            .with(
                ReleaseStep::Cutover,
                StepPolicy::Required,
                Compensation::Invoke(ReleaseStep::Restore),
            );

        let steps: Vec<ReleaseStep> = plan.steps().iter().map(|p| p.step).collect();
        assert_eq!(steps, ReleaseStep::core_sequence().to_vec());
        assert!(plan.contains(ReleaseStep::Cutover));
        assert!(!plan.contains(ReleaseStep::Migrate));
    }

    #[test]
    fn test_rollback_report_display() {
        let report = RollbackReport {
            compensated: vec![ReleaseStep::Cutover, ReleaseStep::Materialize],
            failures: vec![],
            terminal: Some("no previous release".to_string()),
        };
        let text = report.to_string();
        assert!(text.contains("Cutover, Materialize"));
        assert!(text.contains("rollback incomplete: no previous release"));
        assert!(!report.is_clean());
    }
}
