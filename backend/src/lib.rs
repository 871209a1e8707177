//! budget-ledger backend: bill management, transaction deletion and the
//! cascading balance-ledger maintenance that keeps the per-period cash/bank
//! aggregate tables consistent.

pub mod db;
pub mod domain;
pub mod error;
pub mod rest;
pub mod storage;
