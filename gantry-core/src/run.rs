//! Run domain types
//!
//! A run is one pipeline execution for one build-matrix entry. Stages
//! execute in a fixed order; the run state machine is
//! `Pending → Setup → Installing → Testing → AfterSuccess → Deploying
//! → {Succeeded, Failed}`, where the transition to Failed is immediate
//! and short-circuits all remaining stages except best-effort ones.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::log::LogEntry;
use crate::manifest::{DeployCondition, MatrixEntry};

/// The source-control event that triggered the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trigger {
    /// Plain push to a branch
    Push { branch: String },
    /// Push of a named release tag
    Tag { name: String },
}

impl Trigger {
    pub fn is_tag(&self) -> bool {
        matches!(self, Self::Tag { .. })
    }

    /// Whether this trigger satisfies a deploy condition
    pub fn satisfies(&self, condition: &DeployCondition) -> bool {
        match self {
            Self::Tag { .. } => condition.tags,
            Self::Push { branch } => condition
                .branch
                .as_ref()
                .is_some_and(|wanted| wanted == branch),
        }
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Push { branch } => write!(f, "push to {}", branch),
            Self::Tag { name } => write!(f, "tag {}", name),
        }
    }
}

/// A pipeline stage, in fixed execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Setup,
    BeforeScript,
    Script,
    AfterSuccess,
    Deploy,
}

impl Stage {
    /// All stages in execution order
    pub const ORDER: [Stage; 5] = [
        Stage::Setup,
        Stage::BeforeScript,
        Stage::Script,
        Stage::AfterSuccess,
        Stage::Deploy,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::BeforeScript => "before_script",
            Self::Script => "script",
            Self::AfterSuccess => "after_success",
            Self::Deploy => "deploy",
        }
    }

    /// Failure policy for this stage
    pub fn policy(&self) -> StagePolicy {
        match self {
            Self::Setup | Self::BeforeScript | Self::Script => StagePolicy::Fatal,
            Self::AfterSuccess | Self::Deploy => StagePolicy::BestEffort,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// How a stage failure affects the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagePolicy {
    /// Failure aborts the run and marks it Failed
    Fatal,
    /// Failure is reported but does not change an already-successful run
    BestEffort,
}

/// Run lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Pending,
    Setup,
    Installing,
    Testing,
    AfterSuccess,
    Deploying,
    Succeeded,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Outcome of a single stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageOutcome {
    Succeeded,
    Failed { exit_code: i32 },
    Skipped { reason: String },
}

impl StageOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Skipped { .. })
    }
}

/// Result of one executed (or skipped) stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: Stage,
    pub outcome: StageOutcome,
    pub duration_ms: u64,
    pub log: Vec<LogEntry>,
}

/// One pipeline run for one matrix entry
///
/// Created when a trigger event occurs; mutated as each stage
/// completes; archived when the run reaches a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub entry: MatrixEntry,
    pub trigger: Trigger,
    pub state: RunState,
    pub stage_results: Vec<StageResult>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Run {
    /// Creates a new pending run for a matrix entry
    pub fn new(entry: MatrixEntry, trigger: Trigger) -> Self {
        Self {
            id: Uuid::new_v4(),
            entry,
            trigger,
            state: RunState::Pending,
            stage_results: Vec::new(),
            started_at: chrono::Utc::now(),
            finished_at: None,
        }
    }

    /// Advances the state machine
    ///
    /// Terminal states saturate: once Succeeded or Failed, the run
    /// never leaves that state.
    pub fn transition(&mut self, next: RunState) {
        debug_assert!(
            !self.state.is_terminal(),
            "transition out of terminal state {:?}",
            self.state
        );
        if self.state.is_terminal() {
            return;
        }
        self.state = next;
        if next.is_terminal() {
            self.finished_at = Some(chrono::Utc::now());
        }
    }

    /// Records a completed stage
    pub fn record(&mut self, result: StageResult) {
        self.stage_results.push(result);
    }

    pub fn succeeded(&self) -> bool {
        self.state == RunState::Succeeded
    }

    /// Whether every fatal stage recorded so far succeeded
    pub fn fatal_stages_green(&self) -> bool {
        self.stage_results
            .iter()
            .filter(|r| r.stage.policy() == StagePolicy::Fatal)
            .all(|r| r.outcome.is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> MatrixEntry {
        MatrixEntry {
            os: "linux".to_string(),
            runtime: "3.7".to_string(),
        }
    }

    #[test]
    fn test_stage_order_is_invariant() {
        assert_eq!(
            Stage::ORDER,
            [
                Stage::Setup,
                Stage::BeforeScript,
                Stage::Script,
                Stage::AfterSuccess,
                Stage::Deploy,
            ]
        );
    }

    #[test]
    fn test_stage_policies() {
        assert_eq!(Stage::Setup.policy(), StagePolicy::Fatal);
        assert_eq!(Stage::BeforeScript.policy(), StagePolicy::Fatal);
        assert_eq!(Stage::Script.policy(), StagePolicy::Fatal);
        assert_eq!(Stage::AfterSuccess.policy(), StagePolicy::BestEffort);
        assert_eq!(Stage::Deploy.policy(), StagePolicy::BestEffort);
    }

    #[test]
    fn test_trigger_satisfies_tag_condition() {
        let condition = DeployCondition::default();
        let tag = Trigger::Tag {
            name: "v0.2.0".to_string(),
        };
        let push = Trigger::Push {
            branch: "main".to_string(),
        };

        assert!(tag.satisfies(&condition));
        assert!(!push.satisfies(&condition));
    }

    #[test]
    fn test_trigger_satisfies_branch_condition() {
        let condition = DeployCondition {
            tags: false,
            branch: Some("release".to_string()),
        };

        let release = Trigger::Push {
            branch: "release".to_string(),
        };
        let main = Trigger::Push {
            branch: "main".to_string(),
        };
        let tag = Trigger::Tag {
            name: "v1".to_string(),
        };

        assert!(release.satisfies(&condition));
        assert!(!main.satisfies(&condition));
        assert!(!tag.satisfies(&condition));
    }

    #[test]
    fn test_terminal_state_saturates() {
        let mut run = Run::new(
            entry(),
            Trigger::Push {
                branch: "main".to_string(),
            },
        );
        run.transition(RunState::Setup);
        run.transition(RunState::Failed);
        assert!(run.state.is_terminal());
        assert!(run.finished_at.is_some());
    }

    #[test]
    fn test_skipped_counts_as_success() {
        let mut run = Run::new(
            entry(),
            Trigger::Push {
                branch: "main".to_string(),
            },
        );
        run.record(StageResult {
            stage: Stage::Script,
            outcome: StageOutcome::Succeeded,
            duration_ms: 10,
            log: Vec::new(),
        });
        run.record(StageResult {
            stage: Stage::Deploy,
            outcome: StageOutcome::Skipped {
                reason: "not a tag push".to_string(),
            },
            duration_ms: 0,
            log: Vec::new(),
        });
        assert!(run.fatal_stages_green());
    }

    #[test]
    fn test_fatal_stages_green_detects_failure() {
        let mut run = Run::new(
            entry(),
            Trigger::Tag {
                name: "v1".to_string(),
            },
        );
        run.record(StageResult {
            stage: Stage::Script,
            outcome: StageOutcome::Failed { exit_code: 1 },
            duration_ms: 10,
            log: Vec::new(),
        });
        assert!(!run.fatal_stages_green());
    }
}
