//! Finance endpoints: budgets, expenses, dues, and the ledger.

use crate::auth::require;
use crate::chapter_rest::lookup_chapter;
use crate::rest::{error_response, ErrorResponse};
use crate::state::ApiContext;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use greekdash_core::GreekDashError;
use greekdash_finance::models::{
    AssignDuesRequest, Budget, CreateBudgetRequest, DuesPayment, Expense,
    RecordAdjustmentRequest, SubmitExpenseRequest, Transaction,
};
use greekdash_platform::auth::Session;
use greekdash_platform::rbac::Permission;
use serde::Serialize;
use uuid::Uuid;

type HandlerError = (StatusCode, Json<ErrorResponse>);

// ─── Budgets ───────────────────────────────────────────────────────────────

/// GET /api/v1/chapters/:slug/finance/budgets
pub async fn list_budgets(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path(slug): Path<String>,
) -> Result<Json<Vec<Budget>>, HandlerError> {
    require(&session, &slug, Permission::FinanceView)?;
    let chapter = lookup_chapter(&ctx, &slug)?;
    Ok(Json(ctx.finance.list_budgets(chapter.id)))
}

/// POST /api/v1/chapters/:slug/finance/budgets
pub async fn create_budget(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path(slug): Path<String>,
    Json(req): Json<CreateBudgetRequest>,
) -> Result<(StatusCode, Json<Budget>), HandlerError> {
    require(&session, &slug, Permission::FinanceManage)?;
    let chapter = lookup_chapter(&ctx, &slug)?;
    let budget = ctx.finance.create_budget(chapter.id, req).map_err(error_response)?;

    ctx.audit.log_action(
        chapter.id,
        Some(session.user_id),
        "finance.budget_create",
        "budget",
        &budget.id.to_string(),
        serde_json::json!({ "name": budget.name, "amount_cents": budget.amount_cents }),
    );
    Ok((StatusCode::CREATED, Json(budget)))
}

// ─── Expenses ──────────────────────────────────────────────────────────────

/// GET /api/v1/chapters/:slug/finance/expenses
pub async fn list_expenses(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path(slug): Path<String>,
) -> Result<Json<Vec<Expense>>, HandlerError> {
    require(&session, &slug, Permission::FinanceView)?;
    let chapter = lookup_chapter(&ctx, &slug)?;
    Ok(Json(ctx.finance.list_expenses(chapter.id)))
}

/// POST /api/v1/chapters/:slug/finance/expenses — any member may submit.
pub async fn submit_expense(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path(slug): Path<String>,
    Json(req): Json<SubmitExpenseRequest>,
) -> Result<(StatusCode, Json<Expense>), HandlerError> {
    require(&session, &slug, Permission::FinanceView)?;
    let chapter = lookup_chapter(&ctx, &slug)?;
    let expense = ctx
        .finance
        .submit_expense(chapter.id, req, session.user_id)
        .map_err(error_response)?;

    ctx.audit.log_action(
        chapter.id,
        Some(session.user_id),
        "finance.expense_submit",
        "expense",
        &expense.id.to_string(),
        serde_json::json!({ "title": expense.title, "amount_cents": expense.amount_cents }),
    );
    Ok((StatusCode::CREATED, Json(expense)))
}

/// POST /api/v1/chapters/:slug/finance/expenses/:id/approve
pub async fn approve_expense(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path((slug, expense_id)): Path<(String, Uuid)>,
) -> Result<Json<Expense>, HandlerError> {
    require(&session, &slug, Permission::FinanceManage)?;
    let chapter = lookup_chapter(&ctx, &slug)?;
    chapter_expense(&ctx, chapter.id, expense_id)?;
    let expense = ctx
        .finance
        .approve_expense(expense_id, session.user_id)
        .map_err(error_response)?;

    ctx.audit.log_action(
        chapter.id,
        Some(session.user_id),
        "finance.expense_approve",
        "expense",
        &expense.id.to_string(),
        serde_json::json!({ "amount_cents": expense.amount_cents }),
    );
    Ok(Json(expense))
}

/// POST /api/v1/chapters/:slug/finance/expenses/:id/deny
pub async fn deny_expense(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path((slug, expense_id)): Path<(String, Uuid)>,
) -> Result<Json<Expense>, HandlerError> {
    require(&session, &slug, Permission::FinanceManage)?;
    let chapter = lookup_chapter(&ctx, &slug)?;
    chapter_expense(&ctx, chapter.id, expense_id)?;
    let expense = ctx
        .finance
        .deny_expense(expense_id, session.user_id)
        .map_err(error_response)?;

    ctx.audit.log_action(
        chapter.id,
        Some(session.user_id),
        "finance.expense_deny",
        "expense",
        &expense.id.to_string(),
        serde_json::json!({}),
    );
    Ok(Json(expense))
}

/// POST /api/v1/chapters/:slug/finance/expenses/:id/reimburse
pub async fn reimburse_expense(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path((slug, expense_id)): Path<(String, Uuid)>,
) -> Result<Json<Expense>, HandlerError> {
    require(&session, &slug, Permission::FinanceManage)?;
    let chapter = lookup_chapter(&ctx, &slug)?;
    chapter_expense(&ctx, chapter.id, expense_id)?;
    let expense = ctx.finance.mark_reimbursed(expense_id).map_err(error_response)?;

    ctx.audit.log_action(
        chapter.id,
        Some(session.user_id),
        "finance.expense_reimburse",
        "expense",
        &expense.id.to_string(),
        serde_json::json!({}),
    );
    Ok(Json(expense))
}

// ─── Dues ──────────────────────────────────────────────────────────────────

/// GET /api/v1/chapters/:slug/finance/dues — admins see all rows.
pub async fn list_dues(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path(slug): Path<String>,
) -> Result<Json<Vec<DuesPayment>>, HandlerError> {
    require(&session, &slug, Permission::FinanceManage)?;
    let chapter = lookup_chapter(&ctx, &slug)?;
    Ok(Json(ctx.finance.list_dues(chapter.id)))
}

/// GET /api/v1/chapters/:slug/finance/dues/mine — a member's own dues.
pub async fn my_dues(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path(slug): Path<String>,
) -> Result<Json<Vec<DuesPayment>>, HandlerError> {
    require(&session, &slug, Permission::FinanceView)?;
    let chapter = lookup_chapter(&ctx, &slug)?;
    Ok(Json(ctx.finance.dues_for_user(chapter.id, session.user_id)))
}

/// POST /api/v1/chapters/:slug/finance/dues
pub async fn assign_dues(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path(slug): Path<String>,
    Json(req): Json<AssignDuesRequest>,
) -> Result<(StatusCode, Json<DuesPayment>), HandlerError> {
    require(&session, &slug, Permission::FinanceManage)?;
    let chapter = lookup_chapter(&ctx, &slug)?;

    // Dues are assigned to active chapter members only.
    let member = ctx.memberships.find(chapter.id, req.user_id);
    if !member.is_some_and(|m| m.role.is_active()) {
        return Err(error_response(GreekDashError::Validation(
            "dues can only be assigned to active members".into(),
        )));
    }

    let dues = ctx.finance.assign_dues(chapter.id, req).map_err(error_response)?;

    ctx.audit.log_action(
        chapter.id,
        Some(session.user_id),
        "finance.dues_assign",
        "dues_payment",
        &dues.id.to_string(),
        serde_json::json!({ "user_id": dues.user_id, "amount_cents": dues.amount_cents }),
    );
    Ok((StatusCode::CREATED, Json(dues)))
}

/// POST /api/v1/chapters/:slug/finance/dues/:id/pay
pub async fn mark_dues_paid(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path((slug, dues_id)): Path<(String, Uuid)>,
) -> Result<Json<DuesPayment>, HandlerError> {
    require(&session, &slug, Permission::FinanceManage)?;
    let chapter = lookup_chapter(&ctx, &slug)?;
    chapter_dues(&ctx, chapter.id, dues_id)?;
    let dues = ctx.finance.mark_dues_paid(dues_id).map_err(error_response)?;

    ctx.audit.log_action(
        chapter.id,
        Some(session.user_id),
        "finance.dues_paid",
        "dues_payment",
        &dues.id.to_string(),
        serde_json::json!({ "amount_cents": dues.amount_cents }),
    );
    metrics::counter!("api.dues_payments").increment(1);
    Ok(Json(dues))
}

/// POST /api/v1/chapters/:slug/finance/dues/:id/waive
pub async fn waive_dues(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path((slug, dues_id)): Path<(String, Uuid)>,
) -> Result<Json<DuesPayment>, HandlerError> {
    require(&session, &slug, Permission::FinanceManage)?;
    let chapter = lookup_chapter(&ctx, &slug)?;
    chapter_dues(&ctx, chapter.id, dues_id)?;
    let dues = ctx.finance.waive_dues(dues_id).map_err(error_response)?;

    ctx.audit.log_action(
        chapter.id,
        Some(session.user_id),
        "finance.dues_waive",
        "dues_payment",
        &dues.id.to_string(),
        serde_json::json!({}),
    );
    Ok(Json(dues))
}

// ─── Ledger ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub balance_cents: i64,
}

/// GET /api/v1/chapters/:slug/finance/balance
pub async fn balance(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path(slug): Path<String>,
) -> Result<Json<BalanceResponse>, HandlerError> {
    require(&session, &slug, Permission::FinanceView)?;
    let chapter = lookup_chapter(&ctx, &slug)?;
    Ok(Json(BalanceResponse {
        balance_cents: ctx.finance.balance_cents(chapter.id),
    }))
}

/// GET /api/v1/chapters/:slug/finance/transactions
pub async fn list_transactions(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path(slug): Path<String>,
) -> Result<Json<Vec<Transaction>>, HandlerError> {
    require(&session, &slug, Permission::FinanceView)?;
    let chapter = lookup_chapter(&ctx, &slug)?;
    Ok(Json(ctx.finance.list_transactions(chapter.id)))
}

/// POST /api/v1/chapters/:slug/finance/adjustments
pub async fn record_adjustment(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path(slug): Path<String>,
    Json(req): Json<RecordAdjustmentRequest>,
) -> Result<(StatusCode, Json<Transaction>), HandlerError> {
    require(&session, &slug, Permission::FinanceManage)?;
    let chapter = lookup_chapter(&ctx, &slug)?;
    let txn = ctx.finance.record_adjustment(chapter.id, req).map_err(error_response)?;

    ctx.audit.log_action(
        chapter.id,
        Some(session.user_id),
        "finance.adjustment",
        "transaction",
        &txn.id.to_string(),
        serde_json::json!({ "amount_cents": txn.amount_cents, "description": txn.description }),
    );
    Ok((StatusCode::CREATED, Json(txn)))
}

// ─── Helpers ───────────────────────────────────────────────────────────────

fn chapter_expense(ctx: &ApiContext, chapter_id: Uuid, expense_id: Uuid) -> Result<(), HandlerError> {
    match ctx.finance.get_expense(expense_id) {
        Some(e) if e.chapter_id == chapter_id => Ok(()),
        _ => Err(error_response(GreekDashError::NotFound(format!("expense: {expense_id}")))),
    }
}

fn chapter_dues(ctx: &ApiContext, chapter_id: Uuid, dues_id: Uuid) -> Result<(), HandlerError> {
    let belongs = ctx
        .finance
        .list_dues(chapter_id)
        .iter()
        .any(|d| d.id == dues_id);
    if belongs {
        Ok(())
    } else {
        Err(error_response(GreekDashError::NotFound(format!("dues payment: {dues_id}"))))
    }
}
