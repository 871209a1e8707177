//! Domain layer: period arithmetic, ledger models and the services that
//! keep the balance tables consistent.

pub mod bill_service;
pub mod cascade_service;
pub mod locale;
pub mod models;
pub mod period;
pub mod transaction_service;
