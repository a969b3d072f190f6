//! Provider lifecycle states and the transition guards between them.
//!
//! ```text
//! unconfigured → configuring → testing → {test-failed, test-passed}
//!   → saving → {configured, error(save)}
//!   → fetching-models → {ready, error(fetch)}
//! ```
//!
//! The status value doubles as the per-provider lock: an operation whose
//! guard sees an in-flight state is rejected, never queued.

use serde::{Deserialize, Serialize};

/// Which persisted step failed when a provider lands in `error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailedStage {
    Save,
    Fetch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum ProviderStatus {
    #[default]
    Unconfigured,
    Configuring,
    Testing,
    TestFailed,
    TestPassed,
    Saving,
    Configured,
    Error {
        stage: FailedStage,
    },
    FetchingModels,
    Ready,
}

/// Operations that drive or consult the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    EnterCredentials,
    TestConnection,
    SaveProvider,
    FetchModels,
    ResetProvider,
    UpdateModels,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EnterCredentials => "enter-credentials",
            Self::TestConnection => "test-connection",
            Self::SaveProvider => "save-provider",
            Self::FetchModels => "fetch-models",
            Self::ResetProvider => "reset-provider",
            Self::UpdateModels => "update-models",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ProviderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unconfigured => "unconfigured",
            Self::Configuring => "configuring",
            Self::Testing => "testing",
            Self::TestFailed => "test-failed",
            Self::TestPassed => "test-passed",
            Self::Saving => "saving",
            Self::Configured => "configured",
            Self::Error { .. } => "error",
            Self::FetchingModels => "fetching-models",
            Self::Ready => "ready",
        }
    }

    /// A network call for this provider is pending.
    pub fn is_in_flight(self) -> bool {
        match self {
            Self::Testing | Self::Saving | Self::FetchingModels => true,
            Self::Unconfigured
            | Self::Configuring
            | Self::TestFailed
            | Self::TestPassed
            | Self::Configured
            | Self::Error { .. }
            | Self::Ready => false,
        }
    }

    /// Whether the status has passed a successful connectivity test.
    pub fn is_tested(self) -> bool {
        match self {
            Self::TestPassed
            | Self::Saving
            | Self::Configured
            | Self::Error { .. }
            | Self::FetchingModels
            | Self::Ready => true,
            Self::Unconfigured | Self::Configuring | Self::Testing | Self::TestFailed => false,
        }
    }

    /// Transition guard. Every state is spelled out so a new state has to be
    /// placed explicitly.
    pub fn permits(self, op: Operation) -> bool {
        use Operation::*;

        match self {
            Self::Testing | Self::Saving => matches!(op, UpdateModels),
            Self::FetchingModels => false,
            Self::Unconfigured | Self::Configuring | Self::TestFailed => {
                matches!(op, EnterCredentials | TestConnection | ResetProvider | UpdateModels)
            },
            Self::TestPassed => matches!(
                op,
                EnterCredentials | TestConnection | SaveProvider | ResetProvider | UpdateModels
            ),
            Self::Configured | Self::Ready => matches!(
                op,
                EnterCredentials | TestConnection | FetchModels | ResetProvider | UpdateModels
            ),
            Self::Error {
                stage: FailedStage::Save,
            } => matches!(
                op,
                EnterCredentials | TestConnection | ResetProvider | UpdateModels
            ),
            Self::Error {
                stage: FailedStage::Fetch,
            } => matches!(
                op,
                EnterCredentials | TestConnection | FetchModels | ResetProvider | UpdateModels
            ),
        }
    }
}

impl std::fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error { stage } => write!(f, "error ({})", match stage {
                FailedStage::Save => "save",
                FailedStage::Fetch => "fetch",
            }),
            other => f.write_str(other.as_str()),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    const SAVE_ERROR: ProviderStatus = ProviderStatus::Error {
        stage: FailedStage::Save,
    };
    const FETCH_ERROR: ProviderStatus = ProviderStatus::Error {
        stage: FailedStage::Fetch,
    };

    #[rstest]
    #[case(ProviderStatus::Unconfigured, true)]
    #[case(ProviderStatus::Configuring, true)]
    #[case(ProviderStatus::Testing, false)]
    #[case(ProviderStatus::TestFailed, true)]
    #[case(ProviderStatus::TestPassed, true)]
    #[case(ProviderStatus::Saving, false)]
    #[case(ProviderStatus::Configured, true)]
    #[case(SAVE_ERROR, true)]
    #[case(FETCH_ERROR, true)]
    #[case(ProviderStatus::FetchingModels, false)]
    #[case(ProviderStatus::Ready, true)]
    fn enter_credentials_guard(#[case] status: ProviderStatus, #[case] allowed: bool) {
        assert_eq!(status.permits(Operation::EnterCredentials), allowed);
    }

    #[rstest]
    #[case(ProviderStatus::Unconfigured)]
    #[case(ProviderStatus::Configuring)]
    #[case(ProviderStatus::Testing)]
    #[case(ProviderStatus::TestFailed)]
    #[case(ProviderStatus::Saving)]
    #[case(ProviderStatus::Configured)]
    #[case(SAVE_ERROR)]
    #[case(FETCH_ERROR)]
    #[case(ProviderStatus::FetchingModels)]
    #[case(ProviderStatus::Ready)]
    fn save_requires_test_passed(#[case] status: ProviderStatus) {
        assert!(!status.permits(Operation::SaveProvider));
        assert!(ProviderStatus::TestPassed.permits(Operation::SaveProvider));
    }

    #[rstest]
    #[case(ProviderStatus::Configured, true)]
    #[case(ProviderStatus::Ready, true)]
    #[case(FETCH_ERROR, true)]
    #[case(SAVE_ERROR, false)]
    #[case(ProviderStatus::TestPassed, false)]
    #[case(ProviderStatus::FetchingModels, false)]
    #[case(ProviderStatus::Unconfigured, false)]
    fn fetch_guard(#[case] status: ProviderStatus, #[case] allowed: bool) {
        assert_eq!(status.permits(Operation::FetchModels), allowed);
    }

    #[test]
    fn in_flight_states_reject_retesting() {
        for status in [
            ProviderStatus::Testing,
            ProviderStatus::Saving,
            ProviderStatus::FetchingModels,
        ] {
            assert!(status.is_in_flight());
            assert!(!status.permits(Operation::TestConnection));
            assert!(!status.permits(Operation::ResetProvider));
        }
    }

    #[test]
    fn serializes_as_tagged_state() {
        assert_eq!(
            serde_json::to_value(ProviderStatus::FetchingModels).unwrap(),
            serde_json::json!({"state": "fetching-models"})
        );
        assert_eq!(
            serde_json::to_value(FETCH_ERROR).unwrap(),
            serde_json::json!({"state": "error", "stage": "fetch"})
        );
    }

    #[test]
    fn display_names_error_stage() {
        assert_eq!(SAVE_ERROR.to_string(), "error (save)");
        assert_eq!(ProviderStatus::TestFailed.to_string(), "test-failed");
    }
}
