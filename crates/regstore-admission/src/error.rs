/// Errors produced when a validation chain rejects a proposed object.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    /// A hook returned a failing decision.
    #[error("rejected by '{hook}': {reason}")]
    Rejected { hook: String, reason: String },
}

impl AdmissionError {
    pub fn rejected(hook: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            hook: hook.into(),
            reason: reason.into(),
        }
    }

    /// Name of the hook that failed.
    pub fn hook(&self) -> &str {
        match self {
            Self::Rejected { hook, .. } => hook,
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            Self::Rejected { reason, .. } => reason,
        }
    }
}
