//! Chapter finance: budgets, expense approval, dues, and the transaction
//! ledger. All amounts are integer cents.
//!
//! Data stored in DashMap (development); swap to PostgreSQL for production.

pub mod models;
pub mod store;

pub use models::{Budget, DuesPayment, Expense, Transaction};
pub use store::FinanceStore;
