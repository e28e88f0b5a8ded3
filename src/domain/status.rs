//! Status Transition Tables
//!
//! Every entity with a lifecycle has exactly one table here
//! (current status → allowed next statuses). Handlers never compare statuses
//! by hand; they call [`ensure_transition`] and then write with a
//! compare-and-set on the status they read.
//!
//! ```text
//! Mission:  DRAFT ──▶ PENDING_REVIEW ──▶ OPEN ──▶ IN_PROGRESS ──▶ COMPLETED
//!             ▲            │   │          │            │
//!             └─ REJECTED ◀┘   └─▶ DRAFT  └──▶ CANCELLED ◀┘
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// 상태 전이 테이블을 가진 enum
pub trait StatusMachine: Copy + Eq + fmt::Display + 'static {
    /// 에러 메시지에 쓰이는 엔티티 이름
    const ENTITY: &'static str;

    fn allowed_next(self) -> &'static [Self];

    fn can_transition_to(self, next: Self) -> bool {
        self.allowed_next().contains(&next)
    }

    fn is_terminal(self) -> bool {
        self.allowed_next().is_empty()
    }
}

/// `from → to`가 테이블에 없으면 400
pub fn ensure_transition<S: StatusMachine>(from: S, to: S) -> Result<(), ApiError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(ApiError::InvalidTransition(format!(
            "{} cannot move from {} to {}",
            S::ENTITY,
            from,
            to
        )))
    }
}

macro_rules! db_enum {
    ($(#[$meta:meta])* $name:ident, $type_name:tt { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
        #[sqlx(type_name = $type_name, rename_all = "SCREAMING_SNAKE_CASE")]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

db_enum!(
    /// 사용자 역할
    Role, "user_role" {
        Client => "CLIENT",
        Freelancer => "FREELANCER",
        Admin => "ADMIN",
    }
);

db_enum!(MissionStatus, "mission_status" {
    Draft => "DRAFT",
    PendingReview => "PENDING_REVIEW",
    Open => "OPEN",
    InProgress => "IN_PROGRESS",
    Completed => "COMPLETED",
    Cancelled => "CANCELLED",
    Rejected => "REJECTED",
});

db_enum!(ProposalStatus, "proposal_status" {
    Pending => "PENDING",
    Accepted => "ACCEPTED",
    Rejected => "REJECTED",
    Withdrawn => "WITHDRAWN",
});

db_enum!(ContractStatus, "contract_status" {
    Pending => "PENDING",
    Active => "ACTIVE",
    Completed => "COMPLETED",
    Cancelled => "CANCELLED",
    Disputed => "DISPUTED",
});

db_enum!(MilestoneStatus, "milestone_status" {
    Pending => "PENDING",
    InProgress => "IN_PROGRESS",
    Submitted => "SUBMITTED",
    Approved => "APPROVED",
    Paid => "PAID",
});

db_enum!(InvoiceStatus, "invoice_status" {
    Draft => "DRAFT",
    Sent => "SENT",
    Paid => "PAID",
    Overdue => "OVERDUE",
    Cancelled => "CANCELLED",
});

db_enum!(GigStatus, "gig_status" {
    Draft => "DRAFT",
    PendingReview => "PENDING_REVIEW",
    Active => "ACTIVE",
    Paused => "PAUSED",
    Rejected => "REJECTED",
    Archived => "ARCHIVED",
});

db_enum!(DisputeStatus, "dispute_status" {
    Open => "OPEN",
    UnderReview => "UNDER_REVIEW",
    Resolved => "RESOLVED",
    Closed => "CLOSED",
});

db_enum!(TicketStatus, "ticket_status" {
    Open => "OPEN",
    InProgress => "IN_PROGRESS",
    WaitingOnUser => "WAITING_ON_USER",
    Resolved => "RESOLVED",
    Closed => "CLOSED",
});

db_enum!(TicketPriority, "ticket_priority" {
    Low => "LOW",
    Medium => "MEDIUM",
    High => "HIGH",
    Urgent => "URGENT",
});

db_enum!(
    /// 크레딧 원장 항목 종류
    CreditKind, "credit_kind" {
        Welcome => "WELCOME",
        Grant => "GRANT",
        ProposalSpend => "PROPOSAL_SPEND",
        ProposalRefund => "PROPOSAL_REFUND",
    }
);

// ============ Transition tables ============

impl StatusMachine for MissionStatus {
    const ENTITY: &'static str = "mission";

    fn allowed_next(self) -> &'static [Self] {
        use MissionStatus::*;
        match self {
            Draft => &[PendingReview, Cancelled],
            PendingReview => &[Open, Rejected, Draft],
            Open => &[Cancelled, InProgress],
            InProgress => &[Completed, Cancelled],
            Rejected => &[Draft],
            Completed | Cancelled => &[],
        }
    }
}

impl MissionStatus {
    /// 내용 수정이 가능한 상태 (게시 전)
    pub fn is_editable(self) -> bool {
        matches!(
            self,
            MissionStatus::Draft | MissionStatus::PendingReview | MissionStatus::Rejected
        )
    }
}

impl StatusMachine for ProposalStatus {
    const ENTITY: &'static str = "proposal";

    fn allowed_next(self) -> &'static [Self] {
        use ProposalStatus::*;
        match self {
            Pending => &[Accepted, Rejected, Withdrawn],
            Accepted | Rejected | Withdrawn => &[],
        }
    }
}

impl StatusMachine for ContractStatus {
    const ENTITY: &'static str = "contract";

    fn allowed_next(self) -> &'static [Self] {
        use ContractStatus::*;
        match self {
            Pending => &[Active, Cancelled],
            Active => &[Completed, Disputed, Cancelled],
            Disputed => &[Active, Completed, Cancelled],
            Completed | Cancelled => &[],
        }
    }
}

impl StatusMachine for MilestoneStatus {
    const ENTITY: &'static str = "milestone";

    fn allowed_next(self) -> &'static [Self] {
        use MilestoneStatus::*;
        match self {
            Pending => &[InProgress],
            InProgress => &[Submitted],
            // 수정 요청 시 IN_PROGRESS로 되돌림
            Submitted => &[Approved, InProgress],
            Approved => &[Paid],
            Paid => &[],
        }
    }
}

impl StatusMachine for InvoiceStatus {
    const ENTITY: &'static str = "invoice";

    fn allowed_next(self) -> &'static [Self] {
        use InvoiceStatus::*;
        match self {
            Draft => &[Sent, Cancelled],
            Sent => &[Paid, Overdue, Cancelled],
            Overdue => &[Paid, Cancelled],
            Paid | Cancelled => &[],
        }
    }
}

impl StatusMachine for GigStatus {
    const ENTITY: &'static str = "gig";

    fn allowed_next(self) -> &'static [Self] {
        use GigStatus::*;
        match self {
            Draft => &[PendingReview],
            PendingReview => &[Active, Rejected],
            Active => &[Paused, Archived],
            Paused => &[Active, Archived],
            Rejected => &[Draft],
            Archived => &[],
        }
    }
}

impl StatusMachine for DisputeStatus {
    const ENTITY: &'static str = "dispute";

    fn allowed_next(self) -> &'static [Self] {
        use DisputeStatus::*;
        match self {
            Open => &[UnderReview, Closed],
            UnderReview => &[Resolved, Closed],
            Resolved => &[Closed],
            Closed => &[],
        }
    }
}

impl StatusMachine for TicketStatus {
    const ENTITY: &'static str = "ticket";

    fn allowed_next(self) -> &'static [Self] {
        use TicketStatus::*;
        match self {
            Open => &[InProgress, WaitingOnUser, Resolved, Closed],
            InProgress => &[WaitingOnUser, Resolved, Closed],
            WaitingOnUser => &[InProgress, Resolved, Closed],
            Resolved => &[InProgress, Closed],
            Closed => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_mission_reaches_only_cancelled_and_in_progress() {
        for &next in MissionStatus::ALL {
            let allowed = MissionStatus::Open.can_transition_to(next);
            let expected = matches!(next, MissionStatus::Cancelled | MissionStatus::InProgress);
            assert_eq!(allowed, expected, "OPEN -> {}", next);
        }
    }

    #[test]
    fn test_ensure_transition_rejects_with_400() {
        let err = ensure_transition(MissionStatus::Open, MissionStatus::Draft).unwrap_err();
        assert!(matches!(err, ApiError::InvalidTransition(_)));
        assert!(err.to_string().contains("OPEN"));
    }

    #[test]
    fn test_terminal_states() {
        assert!(MissionStatus::Completed.is_terminal());
        assert!(ProposalStatus::Withdrawn.is_terminal());
        assert!(ContractStatus::Cancelled.is_terminal());
        assert!(InvoiceStatus::Paid.is_terminal());
        assert!(GigStatus::Archived.is_terminal());
        assert!(DisputeStatus::Closed.is_terminal());
        assert!(TicketStatus::Closed.is_terminal());
        assert!(!ContractStatus::Disputed.is_terminal());
    }

    #[test]
    fn test_no_self_transitions() {
        // 같은 상태로의 전이는 어느 테이블에도 없음
        for &s in MissionStatus::ALL {
            assert!(!s.can_transition_to(s));
        }
        for &s in ContractStatus::ALL {
            assert!(!s.can_transition_to(s));
        }
        for &s in TicketStatus::ALL {
            assert!(!s.can_transition_to(s));
        }
    }

    #[test]
    fn test_serde_uses_screaming_case() {
        let json = serde_json::to_string(&MissionStatus::PendingReview).unwrap();
        assert_eq!(json, "\"PENDING_REVIEW\"");

        let parsed: TicketStatus = serde_json::from_str("\"WAITING_ON_USER\"").unwrap();
        assert_eq!(parsed, TicketStatus::WaitingOnUser);
    }
}
