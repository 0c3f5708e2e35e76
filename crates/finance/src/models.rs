//! Finance domain types. Amounts are integer cents; ledger amounts are
//! signed (dues positive, expenses negative).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named budget for a period ("Fall 2026 Social").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Budget {
    pub id: Uuid,
    pub chapter_id: Uuid,
    pub name: String,
    pub period: String,
    pub amount_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseStatus {
    Pending,
    Approved,
    Denied,
    Reimbursed,
}

/// A member-submitted expense awaiting admin approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expense {
    pub id: Uuid,
    pub chapter_id: Uuid,
    pub budget_id: Option<Uuid>,
    pub title: String,
    pub amount_cents: i64,
    pub status: ExpenseStatus,
    pub submitted_by: Uuid,
    pub approved_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuesStatus {
    Pending,
    Paid,
    Waived,
}

/// Dues assigned to one member for a period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuesPayment {
    pub id: Uuid,
    pub chapter_id: Uuid,
    pub user_id: Uuid,
    pub amount_cents: i64,
    pub due_date: DateTime<Utc>,
    pub status: DuesStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Dues,
    Expense,
    Refund,
    Adjustment,
}

/// Append-only ledger row. Chapter balance is the sum of `amount_cents`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub chapter_id: Uuid,
    pub kind: TransactionKind,
    pub amount_cents: i64,
    /// Source record (expense or dues payment id), when applicable.
    pub reference_id: Option<Uuid>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

// ─── API Request types ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateBudgetRequest {
    pub name: String,
    pub period: String,
    pub amount_cents: i64,
}

#[derive(Debug, Deserialize)]
pub struct SubmitExpenseRequest {
    pub title: String,
    pub amount_cents: i64,
    pub budget_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct AssignDuesRequest {
    pub user_id: Uuid,
    pub amount_cents: i64,
    pub due_date: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct RecordAdjustmentRequest {
    pub amount_cents: i64,
    pub description: String,
}
