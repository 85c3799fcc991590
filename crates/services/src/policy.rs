/// How an endpoint reports storage it cannot use.
///
/// The artifact lookup and the watchlist deliberately answer differently when
/// the store is unconfigured or down; each service names the policy it follows
/// so the difference reads as a decision rather than an accident.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Configuration faults and outages reach the caller with their reason.
    Surface,
    /// Outages are logged and replaced by a fallback value or a no-op; the
    /// caller never sees an error status.
    Degrade,
}

impl FailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailurePolicy::Surface => "surface",
            FailurePolicy::Degrade => "degrade",
        }
    }
}
