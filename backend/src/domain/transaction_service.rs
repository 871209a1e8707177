//! Transaction deletion and the ledger reversal it triggers.
//!
//! Deleting an income, a bill-due item, or a standalone expense reverses the
//! amount out of every granularity's period and walks a bounded number of
//! subsequent periods to undo the carried effect. Deleting an expense that
//! was created by a bill payment instead rolls the payment back: the amount
//! moves from the expense bucket back to the bill bucket for that month and
//! the payment record flips to unpaid, with no forward walk at all.

use tracing::{info, warn};

use crate::db::DbConnection;
use crate::domain::models::transaction::{TransactionDetails, TransactionKind};
use crate::domain::period::Granularity;
use crate::error::Result;
use crate::storage::{BalanceRepository, BillRepository, TransactionRepository};

/// How many periods past a reversed transaction each forward walk visits.
#[derive(Debug, Clone, Copy)]
pub struct ForwardHorizon {
    pub months: u32,
    pub quarters: u32,
    pub years: u32,
}

impl ForwardHorizon {
    pub fn periods_for(&self, granularity: Granularity) -> u32 {
        match granularity {
            Granularity::Monthly => self.months,
            Granularity::Quarterly => self.quarters,
            Granularity::Annual => self.years,
            // Daily, weekly and semiannual periods get no forward walk.
            _ => 0,
        }
    }
}

/// Horizon bounds for the two reversal strategies. The values are
/// pragmatic cutoffs rather than anything principled, so they are
/// configurable; the defaults match the system's historical behaviour.
#[derive(Debug, Clone, Copy)]
pub struct CascadeConfig {
    /// Income and bill-due reversals re-derive previous balances this far.
    pub rederive_horizon: ForwardHorizon,
    /// Standalone expense reversals shift amounts forward this far.
    pub shift_horizon: ForwardHorizon,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            rederive_horizon: ForwardHorizon {
                months: 12,
                quarters: 4,
                years: 5,
            },
            shift_horizon: ForwardHorizon {
                months: 24,
                quarters: 8,
                years: 10,
            },
        }
    }
}

#[derive(Clone)]
pub struct TransactionService {
    transactions: TransactionRepository,
    bills: BillRepository,
    balances: BalanceRepository,
    config: CascadeConfig,
}

impl TransactionService {
    pub fn new(db: DbConnection) -> Self {
        Self::with_config(db, CascadeConfig::default())
    }

    pub fn with_config(db: DbConnection, config: CascadeConfig) -> Self {
        Self {
            transactions: TransactionRepository::new(db.clone()),
            bills: BillRepository::new(db.clone()),
            balances: BalanceRepository::new(db),
            config,
        }
    }

    /// Delete a transaction and reverse its ledger contribution.
    ///
    /// Validation and lookup failures abort before any mutation. Once the
    /// row is gone, reversal problems are logged but never fail the
    /// deletion — the ledger is patched best-effort.
    pub async fn delete_transaction(
        &self,
        user_id: &str,
        transaction_id: i64,
        kind: TransactionKind,
    ) -> Result<()> {
        if user_id.is_empty() {
            return Err(crate::error::LedgerError::validation("User ID is required"));
        }
        if transaction_id <= 0 {
            return Err(crate::error::LedgerError::validation(
                "Valid transaction ID is required",
            ));
        }

        let details = self
            .transactions
            .fetch_details(transaction_id, kind, user_id)
            .await?;

        if kind == TransactionKind::Expense && details.bill_id.is_some() {
            return self.reverse_bill_payment(&details).await;
        }

        self.transactions.delete(transaction_id, kind, user_id).await?;

        if let Err(err) = self.reverse_ledger(&details, kind).await {
            warn!(
                "Error recalculating balances after deleting {} {}: {}",
                kind.as_str(),
                transaction_id,
                err
            );
        }
        Ok(())
    }

    /// Deleting an expense that settled a bill month: flip the payment back
    /// to unpaid and move the amount from the expense bucket to the bill
    /// bucket for that month. No cross-period cascade runs.
    async fn reverse_bill_payment(&self, details: &TransactionDetails) -> Result<()> {
        let Some(bill_id) = details.bill_id else {
            return Ok(());
        };
        let year_month = Granularity::Monthly.period_key(details.date);
        info!(
            "Reversing bill payment: expense {} for bill {} in {}",
            details.id, bill_id, year_month
        );

        let flipped = self.bills.mark_payment_unpaid(bill_id, &year_month).await?;
        if flipped == 0 {
            warn!(
                "No payment record found for bill {} and month {}",
                bill_id, year_month
            );
        }

        let moved = self
            .balances
            .move_expense_to_bill(
                &details.user_id,
                &year_month,
                details.payment_method,
                details.amount,
            )
            .await?;
        if moved == 0 {
            warn!(
                "No monthly balance row found for user {} and month {}",
                details.user_id, year_month
            );
        }

        self.transactions
            .delete(details.id, TransactionKind::Expense, &details.user_id)
            .await
    }

    /// Reverse the amount out of every granularity's period for the
    /// transaction date, then patch subsequent periods within the horizon.
    async fn reverse_ledger(&self, details: &TransactionDetails, kind: TransactionKind) -> Result<()> {
        info!(
            "Reversing {} of {:.2} ({}) dated {} for user {}",
            kind.as_str(),
            details.amount,
            details.payment_method.as_str(),
            details.date,
            details.user_id
        );

        for granularity in Granularity::ALL {
            let period_key = granularity.period_key(details.date);

            if let Err(err) = self
                .balances
                .reverse_single_period(
                    &details.user_id,
                    granularity,
                    &period_key,
                    kind,
                    details.payment_method,
                    details.amount,
                )
                .await
            {
                warn!(
                    "Error reversing {} balance for period {}: {}",
                    granularity.name(),
                    period_key,
                    err
                );
                continue;
            }

            match kind {
                // A standalone expense had pushed a deficit into every later
                // period's carry; add the amount back along the horizon.
                TransactionKind::Expense => {
                    self.shift_subsequent_periods(details, granularity).await;
                }
                // Incomes and bill-due items re-derive each later period's
                // carry from its predecessor's stored position.
                TransactionKind::Income | TransactionKind::Bill => {
                    self.rederive_subsequent_periods(details, granularity).await;
                }
            }
        }

        Ok(())
    }

    async fn shift_subsequent_periods(
        &self,
        details: &TransactionDetails,
        granularity: Granularity,
    ) {
        let horizon = self.config.shift_horizon.periods_for(granularity);
        for step in 1..=horizon {
            let Some(next_date) = granularity.advance(details.date, step) else {
                break;
            };
            let period_key = granularity.period_key(next_date);
            if let Err(err) = self
                .balances
                .shift_period_forward(
                    &details.user_id,
                    granularity,
                    &period_key,
                    details.payment_method,
                    details.amount,
                )
                .await
            {
                warn!("Error shifting period {} forward: {}", period_key, err);
            }
        }
    }

    async fn rederive_subsequent_periods(
        &self,
        details: &TransactionDetails,
        granularity: Granularity,
    ) {
        let horizon = self.config.rederive_horizon.periods_for(granularity);
        for step in 1..=horizon {
            let Some(next_date) = granularity.advance(details.date, step) else {
                break;
            };
            let period_key = granularity.period_key(next_date);
            if let Err(err) = self
                .balances
                .rederive_previous(&details.user_id, granularity, &period_key)
                .await
            {
                warn!("Error re-deriving previous balance for {}: {}", period_key, err);
            }
        }
    }
}

/// Seed the ledger side of a freshly recorded income or expense. Only used
/// by tests and fixtures here; the income/expense entry services live in
/// other parts of the product.
#[cfg(test)]
async fn record_flows(
    balances: &BalanceRepository,
    user_id: &str,
    date: chrono::NaiveDate,
    bucket: crate::domain::models::period_balance::Bucket,
    method: crate::domain::models::period_balance::PaymentMethod,
    amount: f64,
) {
    for granularity in Granularity::ALL {
        let key = granularity.period_key(date);
        balances
            .apply_amount(user_id, granularity, &key, bucket, method, amount)
            .await
            .expect("apply amount");
    }
}
