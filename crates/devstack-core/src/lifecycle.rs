/// Lifecycle of one managed process.
///
/// Transitions are monotonic along
/// `NotStarted -> Starting -> Running -> Stopping -> Stopped`;
/// `Failed` is reachable from any non-terminal state on a spawn or exit
/// error. Terminal states never transition again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    NotStarted,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl LifecycleState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Stopped | LifecycleState::Failed)
    }

    /// Whether a transition to `next` is legal.
    pub fn can_transition_to(&self, next: LifecycleState) -> bool {
        use LifecycleState::*;

        if self.is_terminal() {
            return false;
        }

        match (self, next) {
            (_, Failed) => true,
            (NotStarted, Starting) => true,
            (Starting, Running) => true,
            // A probe-gated process can be torn down before it was ever
            // confirmed running.
            (Starting, Stopping) => true,
            (Running, Stopping) => true,
            (Stopping, Stopped) => true,
            _ => false,
        }
    }

    /// Advance to `next` if legal, otherwise stay put.
    pub fn advance(&mut self, next: LifecycleState) -> bool {
        if self.can_transition_to(next) {
            *self = next;
            true
        } else {
            false
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            LifecycleState::NotStarted => "not-started",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Stopped => "stopped",
            LifecycleState::Failed => "failed",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LifecycleState::*;

    #[test]
    fn graceful_path_is_legal() {
        let mut state = NotStarted;
        for next in [Starting, Running, Stopping, Stopped] {
            assert!(state.advance(next), "{state} -> {next} should be legal");
        }
        assert!(state.is_terminal());
    }

    #[test]
    fn terminal_states_are_absorbing() {
        let mut state = Stopped;
        assert!(!state.advance(Starting));
        assert!(!state.advance(Failed));
        assert_eq!(state, Stopped);

        let mut state = Failed;
        assert!(!state.advance(Running));
        assert_eq!(state, Failed);
    }

    #[test]
    fn failure_is_reachable_from_live_states() {
        for from in [NotStarted, Starting, Running, Stopping] {
            let mut state = from;
            assert!(state.advance(Failed), "{from} -> failed should be legal");
        }
    }

    #[test]
    fn no_skipping_forward() {
        let mut state = NotStarted;
        assert!(!state.advance(Running));
        assert!(!state.advance(Stopped));
        assert_eq!(state, NotStarted);
    }
}
