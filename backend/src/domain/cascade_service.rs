//! Cascade recalculation: re-derives every period's current and carried
//! balances from a starting period forward.
//!
//! The recalculation walks the user's existing period rows in ascending key
//! order. The starting period begins from a zero carry-in; only when the
//! requested start has no row does the walk seed from the latest earlier
//! period's stored position. Within the walk each period's ending position
//! becomes the next period's `previous_*`.

use tracing::{info, warn};

use crate::domain::models::period_balance::{CarriedBalances, CascadedTotals};
use crate::domain::period::Granularity;
use crate::error::Result;
use crate::storage::BalanceRepository;

#[derive(Clone)]
pub struct CascadeService {
    balances: BalanceRepository,
}

impl CascadeService {
    pub fn new(balances: BalanceRepository) -> Self {
        Self { balances }
    }

    /// Recompute `current = previous + income − expense − bill` for every
    /// period ≥ `start_key`, chaining each period's result into the next.
    ///
    /// Fetching the period list is a hard failure (no partial cascade). A
    /// failure on a single period is logged and the walk continues — later
    /// periods may then be computed from a stale carry, which is accepted.
    ///
    /// Returns the number of periods recalculated.
    pub async fn recalculate_from(
        &self,
        user_id: &str,
        granularity: Granularity,
        start_key: &str,
    ) -> Result<usize> {
        let keys = self
            .balances
            .period_keys_from(user_id, granularity, start_key)
            .await?;

        if keys.is_empty() {
            return Ok(0);
        }

        let mut carried = CarriedBalances::default();
        if keys[0] != start_key {
            // The true start has no row yet; seed from its predecessor.
            if let Some(previous_key) = self
                .balances
                .latest_period_before(user_id, granularity, &keys[0])
                .await?
            {
                carried = self
                    .balances
                    .carried_balances(user_id, granularity, &previous_key)
                    .await?
                    .unwrap_or_default();
            }
        }

        let mut updated = 0;
        for key in &keys {
            let flows = match self.balances.period_flows(user_id, granularity, key).await {
                Ok(Some(flows)) => flows,
                Ok(None) => {
                    warn!("Period {} vanished from {} mid-cascade", key, granularity.table());
                    continue;
                }
                Err(err) => {
                    warn!(
                        "Error fetching {} flows for period {}: {}",
                        granularity.name(),
                        key,
                        err
                    );
                    continue;
                }
            };

            let cash_amount = carried.cash_amount + flows.income_cash_amount
                - flows.expense_cash_amount
                - flows.bill_cash_amount;
            let bank_amount = carried.bank_amount + flows.income_bank_amount
                - flows.expense_bank_amount
                - flows.bill_bank_amount;
            let total_balance = cash_amount + bank_amount;

            let totals = CascadedTotals {
                cash_amount,
                bank_amount,
                balance_cash_amount: cash_amount,
                balance_bank_amount: bank_amount,
                total_balance,
                previous_cash_amount: carried.cash_amount,
                previous_bank_amount: carried.bank_amount,
                total_previous_balance: carried.total_balance,
            };

            if let Err(err) = self
                .balances
                .store_cascaded(user_id, granularity, key, &totals)
                .await
            {
                warn!(
                    "Error updating {} balance for period {}: {}",
                    granularity.name(),
                    key,
                    err
                );
            } else {
                updated += 1;
            }

            carried = CarriedBalances {
                cash_amount,
                bank_amount,
                total_balance,
            };
        }

        info!(
            "Recalculated {} {} periods for user {} from {}",
            updated,
            granularity.name(),
            user_id,
            start_key
        );
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbConnection;
    use crate::domain::models::period_balance::{Bucket, PaymentMethod, PeriodBalance};

    async fn setup() -> (BalanceRepository, CascadeService) {
        let db = DbConnection::init_test().await.expect("test database");
        let balances = BalanceRepository::new(db);
        let cascade = CascadeService::new(balances.clone());
        (balances, cascade)
    }

    async fn fetch(balances: &BalanceRepository, key: &str) -> PeriodBalance {
        balances
            .fetch_row("1", Granularity::Monthly, key)
            .await
            .unwrap()
            .expect("row present")
    }

    fn assert_invariants(row: &PeriodBalance) {
        let cash = row.previous_cash_amount + row.income_cash_amount
            - row.expense_cash_amount
            - row.bill_cash_amount;
        let bank = row.previous_bank_amount + row.income_bank_amount
            - row.expense_bank_amount
            - row.bill_bank_amount;
        assert!((row.cash_amount - cash).abs() < 1e-9, "cash invariant for {}", row.period_key);
        assert!((row.bank_amount - bank).abs() < 1e-9, "bank invariant for {}", row.period_key);
        assert!(
            (row.total_balance - (row.balance_cash_amount + row.balance_bank_amount)).abs() < 1e-9,
            "total invariant for {}",
            row.period_key
        );
    }

    #[tokio::test]
    async fn test_cascade_chains_balances_forward() {
        let (balances, cascade) = setup().await;

        balances
            .apply_amount("1", Granularity::Monthly, "2025-01", Bucket::Income, PaymentMethod::Cash, 300.0)
            .await
            .unwrap();
        balances
            .apply_amount("1", Granularity::Monthly, "2025-02", Bucket::Expense, PaymentMethod::Cash, 80.0)
            .await
            .unwrap();
        balances
            .apply_amount("1", Granularity::Monthly, "2025-03", Bucket::Bill, PaymentMethod::Bank, 50.0)
            .await
            .unwrap();

        let updated = cascade
            .recalculate_from("1", Granularity::Monthly, "2025-01")
            .await
            .unwrap();
        assert_eq!(updated, 3);

        let january = fetch(&balances, "2025-01").await;
        assert_eq!(january.cash_amount, 300.0);
        assert_eq!(january.previous_cash_amount, 0.0);

        let february = fetch(&balances, "2025-02").await;
        assert_eq!(february.previous_cash_amount, 300.0);
        assert_eq!(february.cash_amount, 220.0);
        assert_eq!(february.total_previous_balance, 300.0);

        let march = fetch(&balances, "2025-03").await;
        assert_eq!(march.previous_cash_amount, 220.0);
        assert_eq!(march.cash_amount, 220.0);
        assert_eq!(march.bank_amount, -50.0);
        assert_eq!(march.total_balance, 170.0);

        for row in [&january, &february, &march] {
            assert_invariants(row);
        }
    }

    #[tokio::test]
    async fn test_cascade_is_idempotent() {
        let (balances, cascade) = setup().await;

        balances
            .apply_amount("1", Granularity::Monthly, "2025-01", Bucket::Income, PaymentMethod::Bank, 100.0)
            .await
            .unwrap();
        balances
            .apply_amount("1", Granularity::Monthly, "2025-02", Bucket::Bill, PaymentMethod::Bank, 40.0)
            .await
            .unwrap();

        cascade
            .recalculate_from("1", Granularity::Monthly, "2025-01")
            .await
            .unwrap();
        let first: Vec<PeriodBalance> = vec![
            fetch(&balances, "2025-01").await,
            fetch(&balances, "2025-02").await,
        ];

        cascade
            .recalculate_from("1", Granularity::Monthly, "2025-01")
            .await
            .unwrap();
        let second: Vec<PeriodBalance> = vec![
            fetch(&balances, "2025-01").await,
            fetch(&balances, "2025-02").await,
        ];

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_cascade_seeds_from_predecessor_when_start_has_no_row() {
        let (balances, cascade) = setup().await;

        // December has an established position; January has no row at all.
        balances
            .apply_amount("1", Granularity::Monthly, "2024-12", Bucket::Income, PaymentMethod::Cash, 500.0)
            .await
            .unwrap();
        cascade
            .recalculate_from("1", Granularity::Monthly, "2024-12")
            .await
            .unwrap();

        balances
            .apply_amount("1", Granularity::Monthly, "2025-02", Bucket::Expense, PaymentMethod::Cash, 120.0)
            .await
            .unwrap();

        // Cascade from 2025-01: no row there, so February seeds from December.
        cascade
            .recalculate_from("1", Granularity::Monthly, "2025-01")
            .await
            .unwrap();

        let february = fetch(&balances, "2025-02").await;
        assert_eq!(february.previous_cash_amount, 500.0);
        assert_eq!(february.cash_amount, 380.0);
        assert_invariants(&february);
    }

    #[tokio::test]
    async fn test_cascade_start_period_resets_carry() {
        let (balances, cascade) = setup().await;

        balances
            .apply_amount("1", Granularity::Monthly, "2025-01", Bucket::Income, PaymentMethod::Cash, 100.0)
            .await
            .unwrap();
        balances
            .apply_amount("1", Granularity::Monthly, "2025-02", Bucket::Income, PaymentMethod::Cash, 10.0)
            .await
            .unwrap();
        cascade
            .recalculate_from("1", Granularity::Monthly, "2025-01")
            .await
            .unwrap();

        // Recalculating from February treats February as the chain start:
        // its carry-in comes from the walk's seed, which is zero when the
        // start period itself has a row.
        cascade
            .recalculate_from("1", Granularity::Monthly, "2025-02")
            .await
            .unwrap();
        let february = fetch(&balances, "2025-02").await;
        assert_eq!(february.previous_cash_amount, 0.0);
        assert_eq!(february.cash_amount, 10.0);
    }

    #[tokio::test]
    async fn test_cascade_without_rows_is_a_noop() {
        let (_balances, cascade) = setup().await;
        let updated = cascade
            .recalculate_from("1", Granularity::Monthly, "2025-01")
            .await
            .unwrap();
        assert_eq!(updated, 0);
    }
}
