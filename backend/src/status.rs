//! Proposal lifecycle statuses, legal transitions and role-based cancellation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    SubmittedByOperatorAwaitingRentalApp,
    SubmittedByGuestAwaitingRentalApp,
    SubmittedByOperatorPendingConfirmation,
    HostReview,
    HostCounteroffer,
    AcceptedDraftingLease,
    LeaseDocumentsForReview,
    LeaseDocumentsForSignature,
    LeaseSignedAwaitingPayment,
    InitialPaymentSubmitted,
    CancelledByGuest,
    RejectedByHost,
    CancelledByOperator,
    SuggestionIgnored,
}

use ProposalStatus::*;

/// Coarse grouping of statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    PreSubmission,
    Active,
    Terminal,
}

impl ProposalStatus {
    pub const ALL: [ProposalStatus; 14] = [
        SubmittedByOperatorAwaitingRentalApp,
        SubmittedByGuestAwaitingRentalApp,
        SubmittedByOperatorPendingConfirmation,
        HostReview,
        HostCounteroffer,
        AcceptedDraftingLease,
        LeaseDocumentsForReview,
        LeaseDocumentsForSignature,
        LeaseSignedAwaitingPayment,
        InitialPaymentSubmitted,
        CancelledByGuest,
        RejectedByHost,
        CancelledByOperator,
        SuggestionIgnored,
    ];

    pub fn display(&self) -> &'static str {
        match self {
            SubmittedByOperatorAwaitingRentalApp => {
                "Proposal Submitted by Operator - Awaiting Rental Application"
            }
            SubmittedByGuestAwaitingRentalApp => {
                "Proposal Submitted by guest - Awaiting Rental Application"
            }
            SubmittedByOperatorPendingConfirmation => {
                "Proposal Submitted by Operator - Pending Confirmation"
            }
            HostReview => "Host Review",
            HostCounteroffer => "Host Counteroffer Submitted / Awaiting Guest Review",
            AcceptedDraftingLease => "Proposal or Counteroffer Accepted / Drafting Lease Documents",
            LeaseDocumentsForReview => "Lease Documents Sent for Review",
            LeaseDocumentsForSignature => "Lease Documents Sent for Signatures",
            LeaseSignedAwaitingPayment => "Lease Documents Signed / Awaiting Initial Payment",
            InitialPaymentSubmitted => "Initial Payment Submitted / Lease Activated",
            CancelledByGuest => "Proposal Cancelled by Guest",
            RejectedByHost => "Proposal Rejected by Host",
            CancelledByOperator => "Proposal Cancelled by Operator",
            SuggestionIgnored => "Operator Suggestion Ignored",
        }
    }

    /// Lifecycle stage: 0 before submission completes, 1..=7 through the
    /// lease workflow, -1 once the proposal is closed.
    pub fn stage(&self) -> i8 {
        match self {
            SubmittedByOperatorAwaitingRentalApp
            | SubmittedByGuestAwaitingRentalApp
            | SubmittedByOperatorPendingConfirmation => 0,
            HostReview => 1,
            HostCounteroffer => 2,
            AcceptedDraftingLease => 3,
            LeaseDocumentsForReview => 4,
            LeaseDocumentsForSignature => 5,
            LeaseSignedAwaitingPayment => 6,
            InitialPaymentSubmitted => 7,
            CancelledByGuest | RejectedByHost | CancelledByOperator | SuggestionIgnored => -1,
        }
    }

    pub fn phase(&self) -> Phase {
        match self.stage() {
            0 => Phase::PreSubmission,
            -1 => Phase::Terminal,
            _ => Phase::Active,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.phase() == Phase::Terminal
    }

    pub fn successors(&self) -> &'static [ProposalStatus] {
        match self {
            SubmittedByOperatorAwaitingRentalApp => &[
                SubmittedByOperatorPendingConfirmation,
                HostReview,
                CancelledByGuest,
                CancelledByOperator,
                SuggestionIgnored,
            ],
            SubmittedByGuestAwaitingRentalApp => {
                &[HostReview, CancelledByGuest, CancelledByOperator]
            }
            SubmittedByOperatorPendingConfirmation => &[
                HostReview,
                CancelledByGuest,
                CancelledByOperator,
                SuggestionIgnored,
            ],
            HostReview => &[
                HostCounteroffer,
                AcceptedDraftingLease,
                RejectedByHost,
                CancelledByGuest,
                CancelledByOperator,
            ],
            HostCounteroffer => &[
                AcceptedDraftingLease,
                RejectedByHost,
                CancelledByGuest,
                CancelledByOperator,
            ],
            AcceptedDraftingLease => {
                &[LeaseDocumentsForReview, CancelledByGuest, CancelledByOperator]
            }
            LeaseDocumentsForReview => {
                &[LeaseDocumentsForSignature, CancelledByGuest, CancelledByOperator]
            }
            LeaseDocumentsForSignature => {
                &[LeaseSignedAwaitingPayment, CancelledByGuest, CancelledByOperator]
            }
            LeaseSignedAwaitingPayment => {
                &[InitialPaymentSubmitted, CancelledByGuest, CancelledByOperator]
            }
            InitialPaymentSubmitted => &[CancelledByGuest, CancelledByOperator],
            CancelledByGuest | RejectedByHost | CancelledByOperator | SuggestionIgnored => &[],
        }
    }

    pub fn can_transition_to(&self, target: ProposalStatus) -> bool {
        self.successors().contains(&target)
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown proposal status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for ProposalStatus {
    type Err = UnknownStatus;

    /// Accepts either the display string or the snake_case key.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ProposalStatus::ALL
            .iter()
            .copied()
            .find(|status| {
                status.display().eq_ignore_ascii_case(wanted)
                    || serde_json::to_value(status)
                        .ok()
                        .and_then(|key| key.as_str().map(|key| key == wanted))
                        .unwrap_or(false)
            })
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// Initial status for a new proposal. A recognized override wins; otherwise
/// a submitted rental application sends the proposal straight to host review.
pub fn initial_status(
    override_status: Option<&str>,
    rental_application_submitted: Option<bool>,
) -> ProposalStatus {
    if let Some(status) = override_status.and_then(|raw| raw.parse().ok()) {
        return status;
    }
    if rental_application_submitted == Some(true) {
        HostReview
    } else {
        SubmittedByGuestAwaitingRentalApp
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Guest,
    Host,
    Admin,
}

impl Role {
    /// The one terminal status each role lands on when it cancels.
    pub fn cancellation_status(&self) -> ProposalStatus {
        match self {
            Role::Guest => CancelledByGuest,
            Role::Host => RejectedByHost,
            Role::Admin => CancelledByOperator,
        }
    }
}

pub fn can_cancel(role: Role, current: ProposalStatus) -> bool {
    if current.is_terminal() {
        return false;
    }
    match role {
        Role::Admin => true,
        Role::Guest => matches!(current.phase(), Phase::PreSubmission | Phase::Active),
        Role::Host => matches!(current, HostReview | HostCounteroffer),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CancellationDenied {
    #[error("proposal is already closed ({0})")]
    AlreadyTerminal(ProposalStatus),
    #[error("{role:?} may not cancel a proposal in '{status}'")]
    NotPermitted { role: Role, status: ProposalStatus },
}

/// Resolves the terminal status a cancellation by `role` moves to.
pub fn cancellation_target(
    role: Role,
    current: ProposalStatus,
) -> Result<ProposalStatus, CancellationDenied> {
    if current.is_terminal() {
        return Err(CancellationDenied::AlreadyTerminal(current));
    }
    let target = role.cancellation_status();
    if can_cancel(role, current) && current.can_transition_to(target) {
        Ok(target)
    } else {
        Err(CancellationDenied::NotPermitted { role, status: current })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_partition_into_phases() {
        let pre: Vec<_> = ProposalStatus::ALL
            .iter()
            .filter(|s| s.phase() == Phase::PreSubmission)
            .collect();
        let terminal: Vec<_> = ProposalStatus::ALL.iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(pre.len(), 3);
        assert_eq!(terminal.len(), 4);
        assert_eq!(InitialPaymentSubmitted.stage(), 7);
        assert_eq!(HostReview.stage(), 1);
    }

    #[test]
    fn terminal_states_have_no_successors() {
        for status in ProposalStatus::ALL {
            assert_eq!(status.is_terminal(), status.successors().is_empty(), "{status:?}");
        }
    }

    #[test]
    fn transition_predicate_follows_successor_lists() {
        assert!(HostReview.can_transition_to(HostCounteroffer));
        assert!(HostCounteroffer.can_transition_to(AcceptedDraftingLease));
        assert!(!HostReview.can_transition_to(InitialPaymentSubmitted));
        assert!(!CancelledByGuest.can_transition_to(HostReview));
        assert!(!HostReview.can_transition_to(HostReview));
    }

    #[test]
    fn parses_display_strings_and_keys() {
        assert_eq!("Host Review".parse::<ProposalStatus>(), Ok(HostReview));
        assert_eq!("host review".parse::<ProposalStatus>(), Ok(HostReview));
        assert_eq!("rejected_by_host".parse::<ProposalStatus>(), Ok(RejectedByHost));
        assert!("Pending".parse::<ProposalStatus>().is_err());
        for status in ProposalStatus::ALL {
            assert_eq!(status.display().parse::<ProposalStatus>(), Ok(status));
        }
    }

    #[test]
    fn initial_status_depends_on_rental_application() {
        assert_eq!(initial_status(None, Some(true)), HostReview);
        assert_eq!(initial_status(None, Some(false)), SubmittedByGuestAwaitingRentalApp);
        assert_eq!(initial_status(None, None), SubmittedByGuestAwaitingRentalApp);
    }

    #[test]
    fn initial_status_honours_known_overrides_only() {
        assert_eq!(
            initial_status(Some("Proposal Submitted by Operator - Pending Confirmation"), None),
            SubmittedByOperatorPendingConfirmation
        );
        assert_eq!(initial_status(Some("not a status"), Some(true)), HostReview);
    }

    #[test]
    fn terminal_proposals_are_never_cancellable() {
        for status in ProposalStatus::ALL.iter().filter(|s| s.is_terminal()) {
            for role in [Role::Guest, Role::Host, Role::Admin] {
                assert!(!can_cancel(role, *status));
                assert_eq!(
                    cancellation_target(role, *status),
                    Err(CancellationDenied::AlreadyTerminal(*status))
                );
            }
        }
    }

    #[test]
    fn host_may_reject_only_during_review_or_counteroffer() {
        for status in ProposalStatus::ALL {
            let allowed = matches!(status, HostReview | HostCounteroffer);
            assert_eq!(can_cancel(Role::Host, status), allowed, "{status:?}");
        }
        assert_eq!(cancellation_target(Role::Host, HostCounteroffer), Ok(RejectedByHost));
    }

    #[test]
    fn guest_and_admin_cancel_any_open_proposal() {
        for status in ProposalStatus::ALL.iter().filter(|s| !s.is_terminal()) {
            assert_eq!(cancellation_target(Role::Guest, *status), Ok(CancelledByGuest));
            assert_eq!(cancellation_target(Role::Admin, *status), Ok(CancelledByOperator));
        }
    }

    #[test]
    fn roles_read_from_lowercase_claims() {
        assert_eq!(serde_json::from_str::<Role>(r#""admin""#).unwrap(), Role::Admin);
        assert_eq!(serde_json::from_str::<Role>(r#""guest""#).unwrap(), Role::Guest);
        assert!(serde_json::from_str::<Role>(r#""landlord""#).is_err());
    }
}
