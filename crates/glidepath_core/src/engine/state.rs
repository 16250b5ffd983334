use std::fmt;

use crate::error::BackendError;
use crate::model::BackendKind;

/// Lifecycle of a single engine run. There is no reentry: a finished run
/// stays `Completed` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Configured,
    AccumulationRun,
    RetirementRun,
    Completed,
    Failed,
}

impl RunState {
    #[must_use]
    pub fn can_advance_to(self, next: RunState) -> bool {
        matches!(
            (self, next),
            (RunState::Configured, RunState::AccumulationRun)
                | (RunState::AccumulationRun, RunState::RetirementRun)
                | (RunState::RetirementRun, RunState::Completed)
                | (
                    RunState::Configured | RunState::AccumulationRun | RunState::RetirementRun,
                    RunState::Failed
                )
        )
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Configured => "configured",
            RunState::AccumulationRun => "accumulation",
            RunState::RetirementRun => "retirement",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Tracks and logs the state of one backend run
#[derive(Debug)]
pub(crate) struct RunTracker {
    backend: BackendKind,
    state: RunState,
}

impl RunTracker {
    pub(crate) fn new(backend: BackendKind) -> Self {
        Self {
            backend,
            state: RunState::Configured,
        }
    }

    pub(crate) fn state(&self) -> RunState {
        self.state
    }

    pub(crate) fn advance(&mut self, next: RunState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal run transition {} -> {}",
            self.state,
            next
        );
        tracing::debug!(backend = %self.backend, from = %self.state, to = %next, "run state");
        self.state = next;
    }

    /// Move to `Failed` and hand the error back for propagation
    pub(crate) fn fail(&mut self, err: BackendError) -> BackendError {
        if !self.state.is_terminal() {
            tracing::debug!(backend = %self.backend, from = %self.state, error = %err, "run failed");
            self.state = RunState::Failed;
        }
        err
    }
}
