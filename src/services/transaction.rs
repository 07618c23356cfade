//! Release transaction runner
//!
//! Executes a [`TransactionPlan`] step by step. A step's compensation is
//! registered when the step starts, so a step that fails halfway is undone
//! along with everything before it. On a required step's failure every
//! registered compensation runs in reverse registration order and the
//! original error is returned; compensations never run after a fully
//! successful plan.

use async_trait::async_trait;
use colored::Colorize;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::domain::transaction::PlannedStep;
use crate::domain::{Compensation, ReleaseStep, RollbackReport, StepPolicy, StepResult, TransactionPlan};
use crate::error::{DeployError, TransactionError};
use crate::infrastructure::Remote;

/// Forward actions of the steps a plan names
#[async_trait]
pub trait StepRunner: Send + Sync {
    async fn forward(&self, step: ReleaseStep) -> Result<(), DeployError>;
}

pub struct TransactionRunner {
    remote: Remote,
}

impl TransactionRunner {
    pub fn new(remote: Remote) -> Self {
        Self { remote }
    }

    pub async fn run(
        &self,
        plan: &TransactionPlan,
        runner: &dyn StepRunner,
    ) -> Result<Vec<StepResult>, TransactionError> {
        let mut registered: Vec<&PlannedStep> = Vec::new();
        let mut results = Vec::new();

        for planned in plan.steps() {
            let step = planned.step;
            info!(release = %plan.release, "{} Starting: {}", step.emoji(), step.name());
            registered.push(planned);

            let start = Instant::now();
            let outcome = runner.forward(step).await;
            let duration = start.elapsed();

            let e = match outcome {
                Ok(()) => {
                    info!(
                        "{} {} completed in {:.1}s",
                        "✅".green(),
                        step.name(),
                        duration.as_secs_f64()
                    );
                    results.push(StepResult::success(step, duration));
                    continue;
                }
                Err(e) => e,
            };

            results.push(StepResult::failure(step, duration, e.to_string()));

            if planned.policy == StepPolicy::BestEffort {
                warn!(
                    release = %plan.release,
                    step = %step,
                    error = %e,
                    "Best-effort step failed, undoing it and continuing"
                );
                registered.pop();
                let mut report = RollbackReport::default();
                self.compensate(planned, runner, &mut report).await;
                continue;
            }

            error!(release = %plan.release, step = %step, error = %e, "{} {} failed", "❌".red(), step.name());
            let rollback = self.rollback(&registered, runner).await;
            return Err(TransactionError::StepFailed {
                step,
                release: plan.release.to_string(),
                source: Box::new(e),
                rollback,
                results,
            });
        }

        Ok(results)
    }

    async fn rollback(&self, registered: &[&PlannedStep], runner: &dyn StepRunner) -> RollbackReport {
        let mut report = RollbackReport::default();
        for planned in registered.iter().rev() {
            self.compensate(planned, runner, &mut report).await;
        }
        report
    }

    async fn compensate(&self, planned: &PlannedStep, runner: &dyn StepRunner, report: &mut RollbackReport) {
        let step = planned.step;
        match &planned.compensation {
            Compensation::None => return,
            Compensation::Commands(commands) => {
                for command in commands {
                    if let Err(e) = self.remote.execute(command).await {
                        warn!(step = %step, command = %command, error = %e, "Compensation failed");
                        report.failures.push(format!("{}: {}", step, e));
                    }
                }
            }
            Compensation::Invoke(other) => {
                if let Err(e) = runner.forward(*other).await {
                    warn!(step = %step, compensation = %other, error = %e, "Compensation failed");
                    report.failures.push(format!("{}: {}", step, e));
                }
            }
            Compensation::Unavailable { cleanup, reason } => {
                for command in cleanup {
                    if let Err(e) = self.remote.execute(command).await {
                        warn!(step = %step, command = %command, error = %e, "Cleanup failed");
                        report.failures.push(format!("{}: {}", step, e));
                    }
                }
                error!(step = %step, "Cannot undo {}: {}", step.name(), reason);
                report.terminal = Some(reason.clone());
            }
        }
        info!("⏪ Compensated {}", step.name());
        report.compensated.push(step);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Privilege, ReleaseId, RemoteCommand};
    use crate::error::ExecutorError;
    use crate::testing::RecordingExecutor;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct ScriptedSteps {
        failing: Vec<ReleaseStep>,
        calls: Mutex<Vec<ReleaseStep>>,
    }

    impl ScriptedSteps {
        fn failing(steps: &[ReleaseStep]) -> Self {
            Self {
                failing: steps.to_vec(),
                calls: Mutex::default(),
            }
        }

        fn calls(&self) -> Vec<ReleaseStep> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StepRunner for ScriptedSteps {
        async fn forward(&self, step: ReleaseStep) -> Result<(), DeployError> {
            self.calls.lock().unwrap().push(step);
            if self.failing.contains(&step) {
                return Err(ExecutorError::CommandFailed {
                    command: step.name().to_string(),
                    status: 1,
                    stderr: "boom".to_string(),
                }
                .into());
            }
            Ok(())
        }
    }

    fn cmd(line: &str) -> Compensation {
        Compensation::Commands(vec![RemoteCommand::user(line)])
    }

    fn core_plan() -> TransactionPlan {
        TransactionPlan::new(ReleaseId::parse("20230102000000").unwrap())
            .with(ReleaseStep::Materialize, StepPolicy::Required, cmd("undo-materialize"))
            .with(ReleaseStep::Finalize, StepPolicy::Required, Compensation::None)
            .with(ReleaseStep::Cutover, StepPolicy::Required, cmd("relink-previous"))
    }

    fn runner(executor: &Arc<RecordingExecutor>) -> TransactionRunner {
        TransactionRunner::new(Remote::new(executor.clone(), Privilege::User))
    }

    #[tokio::test]
    async fn test_success_runs_no_compensation() {
        let executor = Arc::new(RecordingExecutor::new());
        let steps = ScriptedSteps::default();

        let results = runner(&executor).run(&core_plan(), &steps).await.unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.success));
        assert!(executor.commands().is_empty());
        assert_eq!(steps.calls(), ReleaseStep::core_sequence().to_vec());
    }

    #[tokio::test]
    async fn test_failure_compensates_in_reverse_and_stops() {
        let executor = Arc::new(RecordingExecutor::new());
        let steps = ScriptedSteps::failing(&[ReleaseStep::Cutover]);
        let plan = core_plan().with(ReleaseStep::ClearCache, StepPolicy::Required, Compensation::None);

        let err = runner(&executor).run(&plan, &steps).await.unwrap_err();
        assert_eq!(err.step(), ReleaseStep::Cutover);
        assert_eq!(executor.commands(), vec!["relink-previous", "undo-materialize"]);
        assert_eq!(
            err.rollback().compensated,
            vec![ReleaseStep::Cutover, ReleaseStep::Materialize]
        );
        assert!(err.rollback().is_clean());
        assert!(!steps.calls().contains(&ReleaseStep::ClearCache));
        assert!(err.to_string().contains("20230102000000"));
    }

    #[tokio::test]
    async fn test_compensation_failure_does_not_mask_original_error() {
        let executor = Arc::new(RecordingExecutor::new());
        executor.fail("relink-previous", "ln: permission denied");
        let steps = ScriptedSteps::failing(&[ReleaseStep::Cutover]);

        let err = runner(&executor).run(&core_plan(), &steps).await.unwrap_err();
        let TransactionError::StepFailed { source, rollback, .. } = err;
        assert!(source.to_string().contains("Cutover"));
        assert_eq!(rollback.failures.len(), 1);
        assert_eq!(executor.commands(), vec!["relink-previous", "undo-materialize"]);
    }

    #[tokio::test]
    async fn test_unavailable_compensation_is_terminal() {
        let executor = Arc::new(RecordingExecutor::new());
        let steps = ScriptedSteps::failing(&[ReleaseStep::Cutover]);
        let plan = TransactionPlan::new(ReleaseId::parse("20230101000000").unwrap())
            .with(ReleaseStep::Materialize, StepPolicy::Required, cmd("undo-materialize"))
            .with(
                ReleaseStep::Cutover,
                StepPolicy::Required,
                Compensation::Unavailable {
                    cleanup: vec![RemoteCommand::user("rm -f current")],
                    reason: "no previous release to roll back to".to_string(),
                },
            );

        let err = runner(&executor).run(&plan, &steps).await.unwrap_err();
        assert_eq!(
            err.rollback().terminal.as_deref(),
            Some("no previous release to roll back to")
        );
        assert_eq!(executor.commands(), vec!["rm -f current", "undo-materialize"]);
    }

    #[tokio::test]
    async fn test_best_effort_failure_undoes_only_itself() {
        let executor = Arc::new(RecordingExecutor::new());
        let steps = ScriptedSteps::failing(&[ReleaseStep::BackupFiles, ReleaseStep::Migrate]);
        let plan = core_plan()
            .with(ReleaseStep::BackupFiles, StepPolicy::BestEffort, cmd("rm-partial-snapshot"))
            .with(
                ReleaseStep::MaintenanceOn,
                StepPolicy::Required,
                Compensation::Invoke(ReleaseStep::MaintenanceOff),
            )
            .with(ReleaseStep::Migrate, StepPolicy::Required, Compensation::None);

        let err = runner(&executor).run(&plan, &steps).await.unwrap_err();
        assert_eq!(err.step(), ReleaseStep::Migrate);

        // partial snapshot removed once, right after the backup failed
        assert_eq!(
            executor.commands(),
            vec!["rm-partial-snapshot", "relink-previous", "undo-materialize"]
        );
        assert_eq!(
            steps.calls(),
            vec![
                ReleaseStep::Materialize,
                ReleaseStep::Finalize,
                ReleaseStep::Cutover,
                ReleaseStep::BackupFiles,
                ReleaseStep::MaintenanceOn,
                ReleaseStep::Migrate,
                ReleaseStep::MaintenanceOff,
            ]
        );
    }

    #[tokio::test]
    async fn test_best_effort_failure_lets_plan_complete() {
        let executor = Arc::new(RecordingExecutor::new());
        let steps = ScriptedSteps::failing(&[ReleaseStep::BackupDatabase]);
        let plan = core_plan()
            .with(ReleaseStep::BackupDatabase, StepPolicy::BestEffort, cmd("rm-partial-dump"))
            .with(ReleaseStep::ClearCache, StepPolicy::Required, Compensation::None);

        let results = runner(&executor).run(&plan, &steps).await.unwrap();
        assert_eq!(results.len(), 5);
        assert!(!results[3].success);
        assert!(results[4].success);
        assert_eq!(executor.commands(), vec!["rm-partial-dump"]);
    }
}
