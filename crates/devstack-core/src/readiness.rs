/// Outcome of one readiness wait.
///
/// Connection failures and non-2xx responses during polling are expected
/// while a service boots and never surface here; only the overall outcome
/// does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessResult {
    /// A 2xx response was observed; no further polls were issued.
    Ready,
    /// The wait was cancelled (shutdown began) before the endpoint
    /// became healthy.
    NotYetReady,
    /// The timeout elapsed without a healthy response.
    TimedOut,
}

impl ReadinessResult {
    pub fn is_ready(&self) -> bool {
        matches!(self, ReadinessResult::Ready)
    }
}

impl std::fmt::Display for ReadinessResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ReadinessResult::Ready => "ready",
            ReadinessResult::NotYetReady => "not-yet-ready",
            ReadinessResult::TimedOut => "timed-out",
        };
        f.write_str(label)
    }
}
