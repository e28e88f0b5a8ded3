//! Domain Module
//!
//! 저장소/HTTP와 무관한 순수 도메인 규칙
//!
//! - `status`: 엔티티별 상태 enum과 전이 테이블
//! - `invoice`: 송장 합계 계산, 번호 포맷

pub mod invoice;
pub mod status;

pub use invoice::{
    compute_totals, format_invoice_number, price_invoice, InvoiceTotals, LineItem, PricedInvoice,
    PricedLine,
};
pub use status::{
    ensure_transition, ContractStatus, CreditKind, DisputeStatus, GigStatus, InvoiceStatus,
    MilestoneStatus, MissionStatus, ProposalStatus, Role, StatusMachine, TicketPriority,
    TicketStatus,
};

/// 제안서 1건 제출 비용
pub const PROPOSAL_CREDIT_COST: i64 = 1;

/// 신규 프리랜서 가입 보너스
pub const WELCOME_CREDITS: i64 = 10;
