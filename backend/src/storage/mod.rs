//! SQLite repositories. Each repository owns a clone of the shared
//! [`DbConnection`](crate::db::DbConnection); methods that must take part in
//! a caller-managed transaction accept a `&mut SqliteConnection` instead of
//! using the pool.

pub mod balance_repository;
pub mod bill_repository;
pub mod transaction_repository;
pub mod user_repository;

pub use balance_repository::BalanceRepository;
pub use bill_repository::BillRepository;
pub use transaction_repository::TransactionRepository;
pub use user_repository::UserRepository;
