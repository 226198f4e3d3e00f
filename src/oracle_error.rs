/// Indicates that the oracle could not answer a query about its trials.
///
/// Reporting code treats this as a transient condition: it is displayed, never propagated.
#[derive(Clone, PartialEq, Debug)]
pub enum OracleError {
    /// A trial was marked complete before its score was recorded
    IncompleteTrialState {
        /// The trial whose state was incomplete
        trial_id: String,
    },
    /// The oracle could not be queried at all
    Unavailable {
        /// Why the oracle was unavailable
        reason: String,
    },
}

impl std::fmt::Display for OracleError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            OracleError::IncompleteTrialState { trial_id } => {
                write!(f, "trial {} is complete but has no recorded score", trial_id)
            }
            OracleError::Unavailable { reason } => write!(f, "oracle unavailable: {}", reason),
        }
    }
}

impl std::error::Error for OracleError {}
