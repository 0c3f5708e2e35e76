//! In-memory finance store: budgets, expenses, dues, and the ledger.

use crate::models::*;
use chrono::Utc;
use dashmap::DashMap;
use greekdash_core::{GreekDashError, GreekDashResult};
use tracing::info;
use uuid::Uuid;

/// Thread-safe finance store backed by DashMap.
pub struct FinanceStore {
    budgets: DashMap<Uuid, Budget>,
    expenses: DashMap<Uuid, Expense>,
    dues: DashMap<Uuid, DuesPayment>,
    ledger: DashMap<Uuid, Transaction>,
}

impl Default for FinanceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FinanceStore {
    pub fn new() -> Self {
        Self {
            budgets: DashMap::new(),
            expenses: DashMap::new(),
            dues: DashMap::new(),
            ledger: DashMap::new(),
        }
    }

    // ─── Budgets ───────────────────────────────────────────────────────────

    pub fn create_budget(&self, chapter_id: Uuid, req: CreateBudgetRequest) -> GreekDashResult<Budget> {
        if req.amount_cents <= 0 {
            return Err(GreekDashError::Validation("budget amount must be positive".into()));
        }
        if req.name.trim().is_empty() {
            return Err(GreekDashError::Validation("budget name must not be empty".into()));
        }
        let now = Utc::now();
        let budget = Budget {
            id: Uuid::new_v4(),
            chapter_id,
            name: req.name.trim().to_string(),
            period: req.period,
            amount_cents: req.amount_cents,
            created_at: now,
            updated_at: now,
        };
        info!(budget_id = %budget.id, chapter_id = %chapter_id, "Budget created");
        self.budgets.insert(budget.id, budget.clone());
        Ok(budget)
    }

    pub fn list_budgets(&self, chapter_id: Uuid) -> Vec<Budget> {
        self.budgets
            .iter()
            .filter(|e| e.value().chapter_id == chapter_id)
            .map(|e| e.value().clone())
            .collect()
    }

    /// Sum of approved and reimbursed expenses charged against a budget.
    pub fn budget_spent_cents(&self, budget_id: Uuid) -> i64 {
        self.expenses
            .iter()
            .filter(|e| {
                let exp = e.value();
                exp.budget_id == Some(budget_id)
                    && matches!(exp.status, ExpenseStatus::Approved | ExpenseStatus::Reimbursed)
            })
            .map(|e| e.value().amount_cents)
            .sum()
    }

    // ─── Expenses ──────────────────────────────────────────────────────────

    pub fn submit_expense(
        &self,
        chapter_id: Uuid,
        req: SubmitExpenseRequest,
        submitted_by: Uuid,
    ) -> GreekDashResult<Expense> {
        if req.amount_cents <= 0 {
            return Err(GreekDashError::Validation("expense amount must be positive".into()));
        }
        if let Some(budget_id) = req.budget_id {
            let budget = self
                .budgets
                .get(&budget_id)
                .ok_or_else(|| GreekDashError::NotFound(format!("budget: {budget_id}")))?;
            if budget.chapter_id != chapter_id {
                return Err(GreekDashError::Validation(
                    "budget belongs to a different chapter".into(),
                ));
            }
        }

        let now = Utc::now();
        let expense = Expense {
            id: Uuid::new_v4(),
            chapter_id,
            budget_id: req.budget_id,
            title: req.title.trim().to_string(),
            amount_cents: req.amount_cents,
            status: ExpenseStatus::Pending,
            submitted_by,
            approved_by: None,
            created_at: now,
            updated_at: now,
        };
        info!(expense_id = %expense.id, chapter_id = %chapter_id, "Expense submitted");
        self.expenses.insert(expense.id, expense.clone());
        Ok(expense)
    }

    /// Approve a pending expense and append the ledger debit.
    pub fn approve_expense(&self, id: Uuid, approver: Uuid) -> GreekDashResult<Expense> {
        let expense = {
            let mut entry = self
                .expenses
                .get_mut(&id)
                .ok_or_else(|| GreekDashError::NotFound(format!("expense: {id}")))?;
            if entry.status != ExpenseStatus::Pending {
                return Err(GreekDashError::Validation("expense is not pending".into()));
            }
            entry.status = ExpenseStatus::Approved;
            entry.approved_by = Some(approver);
            entry.updated_at = Utc::now();
            entry.clone()
        };

        self.append_transaction(
            expense.chapter_id,
            TransactionKind::Expense,
            -expense.amount_cents,
            Some(expense.id),
            &format!("Expense: {}", expense.title),
        );
        info!(expense_id = %id, "Expense approved");
        Ok(expense)
    }

    pub fn deny_expense(&self, id: Uuid, approver: Uuid) -> GreekDashResult<Expense> {
        let mut entry = self
            .expenses
            .get_mut(&id)
            .ok_or_else(|| GreekDashError::NotFound(format!("expense: {id}")))?;
        if entry.status != ExpenseStatus::Pending {
            return Err(GreekDashError::Validation("expense is not pending".into()));
        }
        entry.status = ExpenseStatus::Denied;
        entry.approved_by = Some(approver);
        entry.updated_at = Utc::now();
        info!(expense_id = %id, "Expense denied");
        Ok(entry.clone())
    }

    /// Mark an approved expense as reimbursed. The ledger row was already
    /// appended at approval.
    pub fn mark_reimbursed(&self, id: Uuid) -> GreekDashResult<Expense> {
        let mut entry = self
            .expenses
            .get_mut(&id)
            .ok_or_else(|| GreekDashError::NotFound(format!("expense: {id}")))?;
        if entry.status != ExpenseStatus::Approved {
            return Err(GreekDashError::Validation("expense is not approved".into()));
        }
        entry.status = ExpenseStatus::Reimbursed;
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    pub fn get_expense(&self, id: Uuid) -> Option<Expense> {
        self.expenses.get(&id).map(|e| e.value().clone())
    }

    pub fn list_expenses(&self, chapter_id: Uuid) -> Vec<Expense> {
        let mut expenses: Vec<Expense> = self
            .expenses
            .iter()
            .filter(|e| e.value().chapter_id == chapter_id)
            .map(|e| e.value().clone())
            .collect();
        expenses.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        expenses
    }

    // ─── Dues ──────────────────────────────────────────────────────────────

    pub fn assign_dues(&self, chapter_id: Uuid, req: AssignDuesRequest) -> GreekDashResult<DuesPayment> {
        if req.amount_cents <= 0 {
            return Err(GreekDashError::Validation("dues amount must be positive".into()));
        }
        let now = Utc::now();
        let dues = DuesPayment {
            id: Uuid::new_v4(),
            chapter_id,
            user_id: req.user_id,
            amount_cents: req.amount_cents,
            due_date: req.due_date,
            status: DuesStatus::Pending,
            paid_at: None,
            created_at: now,
            updated_at: now,
        };
        info!(dues_id = %dues.id, chapter_id = %chapter_id, "Dues assigned");
        self.dues.insert(dues.id, dues.clone());
        Ok(dues)
    }

    /// Record payment of pending dues and append the ledger credit.
    pub fn mark_dues_paid(&self, id: Uuid) -> GreekDashResult<DuesPayment> {
        let dues = {
            let mut entry = self
                .dues
                .get_mut(&id)
                .ok_or_else(|| GreekDashError::NotFound(format!("dues payment: {id}")))?;
            if entry.status != DuesStatus::Pending {
                return Err(GreekDashError::Validation("dues are not pending".into()));
            }
            let now = Utc::now();
            entry.status = DuesStatus::Paid;
            entry.paid_at = Some(now);
            entry.updated_at = now;
            entry.clone()
        };

        self.append_transaction(
            dues.chapter_id,
            TransactionKind::Dues,
            dues.amount_cents,
            Some(dues.id),
            "Dues payment",
        );
        info!(dues_id = %id, "Dues paid");
        Ok(dues)
    }

    pub fn waive_dues(&self, id: Uuid) -> GreekDashResult<DuesPayment> {
        let mut entry = self
            .dues
            .get_mut(&id)
            .ok_or_else(|| GreekDashError::NotFound(format!("dues payment: {id}")))?;
        if entry.status != DuesStatus::Pending {
            return Err(GreekDashError::Validation("dues are not pending".into()));
        }
        entry.status = DuesStatus::Waived;
        entry.updated_at = Utc::now();
        info!(dues_id = %id, "Dues waived");
        Ok(entry.clone())
    }

    pub fn list_dues(&self, chapter_id: Uuid) -> Vec<DuesPayment> {
        let mut dues: Vec<DuesPayment> = self
            .dues
            .iter()
            .filter(|e| e.value().chapter_id == chapter_id)
            .map(|e| e.value().clone())
            .collect();
        dues.sort_by(|a, b| a.due_date.cmp(&b.due_date));
        dues
    }

    pub fn dues_for_user(&self, chapter_id: Uuid, user_id: Uuid) -> Vec<DuesPayment> {
        self.list_dues(chapter_id)
            .into_iter()
            .filter(|d| d.user_id == user_id)
            .collect()
    }

    // ─── Ledger ────────────────────────────────────────────────────────────

    /// Record a manual adjustment (signed amount).
    pub fn record_adjustment(
        &self,
        chapter_id: Uuid,
        req: RecordAdjustmentRequest,
    ) -> GreekDashResult<Transaction> {
        if req.amount_cents == 0 {
            return Err(GreekDashError::Validation("adjustment amount must be non-zero".into()));
        }
        Ok(self.append_transaction(
            chapter_id,
            TransactionKind::Adjustment,
            req.amount_cents,
            None,
            &req.description,
        ))
    }

    /// Chapter balance: sum of all ledger amounts.
    pub fn balance_cents(&self, chapter_id: Uuid) -> i64 {
        self.ledger
            .iter()
            .filter(|e| e.value().chapter_id == chapter_id)
            .map(|e| e.value().amount_cents)
            .sum()
    }

    /// Ledger rows for a chapter, newest first.
    pub fn list_transactions(&self, chapter_id: Uuid) -> Vec<Transaction> {
        let mut txns: Vec<Transaction> = self
            .ledger
            .iter()
            .filter(|e| e.value().chapter_id == chapter_id)
            .map(|e| e.value().clone())
            .collect();
        txns.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        txns
    }

    fn append_transaction(
        &self,
        chapter_id: Uuid,
        kind: TransactionKind,
        amount_cents: i64,
        reference_id: Option<Uuid>,
        description: &str,
    ) -> Transaction {
        let txn = Transaction {
            id: Uuid::new_v4(),
            chapter_id,
            kind,
            amount_cents,
            reference_id,
            description: description.to_string(),
            created_at: Utc::now(),
        };
        self.ledger.insert(txn.id, txn.clone());
        txn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_expense_approval_appends_one_ledger_row() {
        let store = FinanceStore::new();
        let chapter = Uuid::new_v4();
        let member = Uuid::new_v4();
        let admin = Uuid::new_v4();

        let expense = store
            .submit_expense(
                chapter,
                SubmitExpenseRequest {
                    title: "Mixers supplies".into(),
                    amount_cents: 12_500,
                    budget_id: None,
                },
                member,
            )
            .unwrap();
        assert_eq!(store.list_transactions(chapter).len(), 0);

        let approved = store.approve_expense(expense.id, admin).unwrap();
        assert_eq!(approved.status, ExpenseStatus::Approved);
        assert_eq!(approved.approved_by, Some(admin));

        let txns = store.list_transactions(chapter);
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].amount_cents, -12_500);
        assert_eq!(txns[0].kind, TransactionKind::Expense);
        assert_eq!(txns[0].reference_id, Some(expense.id));

        // Double approval fails and must not append another row.
        assert!(store.approve_expense(expense.id, admin).is_err());
        assert_eq!(store.list_transactions(chapter).len(), 1);
    }

    #[test]
    fn test_denied_expense_never_hits_ledger() {
        let store = FinanceStore::new();
        let chapter = Uuid::new_v4();
        let expense = store
            .submit_expense(
                chapter,
                SubmitExpenseRequest {
                    title: "Questionable".into(),
                    amount_cents: 99_999,
                    budget_id: None,
                },
                Uuid::new_v4(),
            )
            .unwrap();

        store.deny_expense(expense.id, Uuid::new_v4()).unwrap();
        assert_eq!(store.balance_cents(chapter), 0);
        assert!(store.mark_reimbursed(expense.id).is_err());
    }

    #[test]
    fn test_dues_flow_and_balance() {
        let store = FinanceStore::new();
        let chapter = Uuid::new_v4();
        let member = Uuid::new_v4();

        let dues = store
            .assign_dues(
                chapter,
                AssignDuesRequest {
                    user_id: member,
                    amount_cents: 50_000,
                    due_date: Utc::now() + Duration::days(30),
                },
            )
            .unwrap();

        let paid = store.mark_dues_paid(dues.id).unwrap();
        assert_eq!(paid.status, DuesStatus::Paid);
        assert!(paid.paid_at.is_some());
        assert_eq!(store.balance_cents(chapter), 50_000);

        // Paying again fails.
        assert!(store.mark_dues_paid(dues.id).is_err());

        // An approved expense reduces the balance.
        let expense = store
            .submit_expense(
                chapter,
                SubmitExpenseRequest {
                    title: "Venue deposit".into(),
                    amount_cents: 20_000,
                    budget_id: None,
                },
                member,
            )
            .unwrap();
        store.approve_expense(expense.id, Uuid::new_v4()).unwrap();
        assert_eq!(store.balance_cents(chapter), 30_000);
    }

    #[test]
    fn test_waived_dues_do_not_credit() {
        let store = FinanceStore::new();
        let chapter = Uuid::new_v4();
        let dues = store
            .assign_dues(
                chapter,
                AssignDuesRequest {
                    user_id: Uuid::new_v4(),
                    amount_cents: 50_000,
                    due_date: Utc::now(),
                },
            )
            .unwrap();

        store.waive_dues(dues.id).unwrap();
        assert_eq!(store.balance_cents(chapter), 0);
        assert!(store.mark_dues_paid(dues.id).is_err());
    }

    #[test]
    fn test_budget_tracking() {
        let store = FinanceStore::new();
        let chapter = Uuid::new_v4();
        let budget = store
            .create_budget(
                chapter,
                CreateBudgetRequest {
                    name: "Social".into(),
                    period: "Fall 2026".into(),
                    amount_cents: 100_000,
                },
            )
            .unwrap();

        // Budget from another chapter is rejected on submission.
        assert!(store
            .submit_expense(
                Uuid::new_v4(),
                SubmitExpenseRequest {
                    title: "Cross-chapter".into(),
                    amount_cents: 100,
                    budget_id: Some(budget.id),
                },
                Uuid::new_v4(),
            )
            .is_err());

        let expense = store
            .submit_expense(
                chapter,
                SubmitExpenseRequest {
                    title: "DJ".into(),
                    amount_cents: 40_000,
                    budget_id: Some(budget.id),
                },
                Uuid::new_v4(),
            )
            .unwrap();
        assert_eq!(store.budget_spent_cents(budget.id), 0);

        store.approve_expense(expense.id, Uuid::new_v4()).unwrap();
        assert_eq!(store.budget_spent_cents(budget.id), 40_000);
    }

    #[test]
    fn test_adjustment() {
        let store = FinanceStore::new();
        let chapter = Uuid::new_v4();
        store
            .record_adjustment(
                chapter,
                RecordAdjustmentRequest {
                    amount_cents: -1_500,
                    description: "Bank fee".into(),
                },
            )
            .unwrap();
        assert_eq!(store.balance_cents(chapter), -1_500);
        assert!(store
            .record_adjustment(
                chapter,
                RecordAdjustmentRequest {
                    amount_cents: 0,
                    description: "noop".into(),
                }
            )
            .is_err());
    }
}
