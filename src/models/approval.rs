use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Moderation state shared by instructor profiles, courses and videos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApprovalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(ApprovalStatus::Pending),
            "approved" => Ok(ApprovalStatus::Approved),
            "rejected" => Ok(ApprovalStatus::Rejected),
            other => Err(format!("Unknown approval status: {}", other)),
        }
    }
}

/// `{status, reason}` pair embedded in moderated records.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Approval {
    #[serde(default)]
    pub status: ApprovalStatus,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModerationAction {
    Approve,
    Reject(String),
    /// The owner edited the record and it goes back into the review queue.
    Resubmit,
}

impl ModerationAction {
    fn verb(&self) -> &'static str {
        match self {
            ModerationAction::Approve => "approve",
            ModerationAction::Reject(_) => "reject",
            ModerationAction::Resubmit => "resubmit",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("Cannot {action} a record that is already {from}")]
    InvalidTransition {
        from: ApprovalStatus,
        action: &'static str,
    },

    #[error("A rejection reason is required")]
    MissingReason,
}

impl Approval {
    pub fn pending() -> Self {
        Self::default()
    }

    pub fn approved() -> Self {
        Self {
            status: ApprovalStatus::Approved,
            reason: None,
        }
    }

    /// Computes the next state without mutating `self`.
    ///
    /// pending -> approved | rejected, and any state -> pending on resubmit.
    /// Approval always clears the reason.
    pub fn apply(&self, action: &ModerationAction) -> Result<Approval, TransitionError> {
        match (self.status, action) {
            (ApprovalStatus::Pending, ModerationAction::Approve) => Ok(Approval::approved()),
            (ApprovalStatus::Pending, ModerationAction::Reject(reason)) => {
                let reason = reason.trim();
                if reason.is_empty() {
                    return Err(TransitionError::MissingReason);
                }
                Ok(Approval {
                    status: ApprovalStatus::Rejected,
                    reason: Some(reason.to_string()),
                })
            }
            (_, ModerationAction::Resubmit) => Ok(Approval::pending()),
            (from, action) => Err(TransitionError::InvalidTransition {
                from,
                action: action.verb(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(reason: &str) -> Approval {
        Approval {
            status: ApprovalStatus::Rejected,
            reason: Some(reason.to_string()),
        }
    }

    #[test]
    fn pending_can_be_approved_and_reason_is_cleared() {
        let current = Approval {
            status: ApprovalStatus::Pending,
            reason: Some("stale note".to_string()),
        };
        let next = current.apply(&ModerationAction::Approve).unwrap();
        assert_eq!(next.status, ApprovalStatus::Approved);
        assert_eq!(next.reason, None);
    }

    #[test]
    fn pending_can_be_rejected_with_reason() {
        let next = Approval::pending()
            .apply(&ModerationAction::Reject("  blurry audio ".to_string()))
            .unwrap();
        assert_eq!(next, rejected("blurry audio"));
    }

    #[test]
    fn rejection_needs_a_reason() {
        let err = Approval::pending()
            .apply(&ModerationAction::Reject("   ".to_string()))
            .unwrap_err();
        assert_eq!(err, TransitionError::MissingReason);
    }

    #[test]
    fn approved_is_not_reenterable() {
        let err = Approval::approved().apply(&ModerationAction::Approve).unwrap_err();
        assert_eq!(
            err,
            TransitionError::InvalidTransition {
                from: ApprovalStatus::Approved,
                action: "approve"
            }
        );
        assert!(Approval::approved()
            .apply(&ModerationAction::Reject("late".to_string()))
            .is_err());
    }

    #[test]
    fn rejected_only_moves_through_resubmit() {
        assert!(rejected("x").apply(&ModerationAction::Approve).is_err());
        assert!(rejected("x").apply(&ModerationAction::Reject("y".into())).is_err());

        let next = rejected("x").apply(&ModerationAction::Resubmit).unwrap();
        assert_eq!(next, Approval::pending());
    }

    #[test]
    fn editing_an_approved_record_sends_it_back_to_review() {
        let next = Approval::approved().apply(&ModerationAction::Resubmit).unwrap();
        assert_eq!(next.status, ApprovalStatus::Pending);
    }

    #[test]
    fn every_transition_lands_in_a_known_state() {
        let states = [Approval::pending(), Approval::approved(), rejected("r")];
        let actions = [
            ModerationAction::Approve,
            ModerationAction::Reject("r".to_string()),
            ModerationAction::Resubmit,
        ];

        for state in &states {
            for action in &actions {
                if let Ok(next) = state.apply(action) {
                    if next.status == ApprovalStatus::Approved {
                        assert!(next.reason.is_none());
                    }
                    if next.status == ApprovalStatus::Rejected {
                        assert!(next.reason.is_some());
                    }
                }
            }
        }
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("Approved".parse::<ApprovalStatus>().unwrap(), ApprovalStatus::Approved);
        assert!("archived".parse::<ApprovalStatus>().is_err());
    }

    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_value(rejected("spam")).unwrap();
        assert_eq!(json["status"], "rejected");
        assert_eq!(json["reason"], "spam");
    }
}
