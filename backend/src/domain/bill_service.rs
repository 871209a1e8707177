//! Bill lifecycle operations and their ledger bookkeeping.
//!
//! A bill projects its amount into the bill bucket of every covered month.
//! Paying a month moves that month's amount into the expense bucket without
//! cascading; every other mutation ends with a cascade from the earliest
//! affected month.

use chrono::{Datelike, Days, Local, Months, NaiveDate};
use tracing::{info, warn};

use crate::db::DbConnection;
use crate::domain::cascade_service::CascadeService;
use crate::domain::locale::payment_description;
use crate::domain::models::bill::{Bill, BillPayment, BillUpdate, NewBill};
use crate::domain::models::period_balance::{Bucket, PaymentMethod};
use crate::domain::period::{covered_months, parse_stored_date, Granularity};
use crate::error::{LedgerError, Result};
use crate::storage::{BalanceRepository, BillRepository, TransactionRepository, UserRepository};

const DEFAULT_ICON: &str = "💳";

#[derive(Debug, Clone)]
pub struct AddBillCommand {
    pub user_id: String,
    pub name: String,
    pub amount: f64,
    pub due_date: String,
    pub start_date: Option<String>,
    pub payment_day: Option<u32>,
    pub duration_months: Option<u32>,
    pub regularity: Option<String>,
    pub category: String,
    pub icon: Option<String>,
    pub payment_method: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UpdateBillCommand {
    pub user_id: String,
    pub bill_id: i64,
    pub name: Option<String>,
    pub amount: Option<f64>,
    pub start_date: Option<String>,
    pub payment_day: Option<u32>,
    pub duration_months: Option<u32>,
    pub regularity: Option<String>,
    pub category: Option<String>,
    pub icon: Option<String>,
    pub payment_method: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PayBillCommand {
    pub user_id: String,
    pub bill_id: i64,
    pub year_month: String,
    pub payment_date: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PayBillOutcome {
    pub bill_id: i64,
    pub user_id: String,
    pub year_month: String,
    pub payment_date: String,
    pub amount: f64,
    pub payment_method: PaymentMethod,
    pub bill_fully_paid: bool,
    pub remaining_payments: i64,
}

#[derive(Debug, Clone)]
pub struct BillPaymentStatus {
    pub bill: Bill,
    pub total_payments: i64,
    pub paid_payments: i64,
    pub payments: Vec<BillPayment>,
}

#[derive(Clone)]
pub struct BillService {
    db: DbConnection,
    bills: BillRepository,
    balances: BalanceRepository,
    transactions: TransactionRepository,
    users: UserRepository,
    cascade: CascadeService,
}

impl BillService {
    pub fn new(db: DbConnection) -> Self {
        let bills = BillRepository::new(db.clone());
        let balances = BalanceRepository::new(db.clone());
        let transactions = TransactionRepository::new(db.clone());
        let users = UserRepository::new(db.clone());
        let cascade = CascadeService::new(balances.clone());
        Self {
            db,
            bills,
            balances,
            transactions,
            users,
            cascade,
        }
    }

    /// Create a bill, reserve its months in the ledger and cascade from the
    /// first covered month. Ledger seeding failures after the insert are
    /// logged but do not undo the bill.
    pub async fn add_bill(&self, command: AddBillCommand) -> Result<Bill> {
        let bill = validate_add_command(command)?;

        let bill_id = self.bills.insert(&bill).await?;

        if let Err(err) = self
            .bills
            .create_payment_records(bill_id, bill.start_date, bill.duration_months, bill.payment_method)
            .await
        {
            warn!("Error creating bill payment records for bill {}: {}", bill_id, err);
        }

        let months = covered_months(bill.start_date, bill.duration_months);
        for month in &months {
            if let Err(err) = self
                .balances
                .apply_amount(
                    &bill.user_id,
                    Granularity::Monthly,
                    month,
                    Bucket::Bill,
                    bill.payment_method,
                    bill.amount,
                )
                .await
            {
                warn!("Error adding bill amount for month {}: {}", month, err);
            }
        }

        if let Some(first_month) = months.first() {
            if let Err(err) = self
                .cascade
                .recalculate_from(&bill.user_id, Granularity::Monthly, first_month)
                .await
            {
                warn!("Error updating cascade balances after bill add: {}", err);
            }
        }

        self.bills
            .fetch(bill_id, &bill.user_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("bill vanished after insert"))
    }

    /// Mark one month of a bill as paid: the amount moves from the bill
    /// bucket to the expense bucket for that month only and an expense row
    /// tagged with the bill is written, all in one transaction. No cascade
    /// runs — other balance columns of the month are deliberately left
    /// untouched.
    pub async fn pay_bill(&self, command: PayBillCommand) -> Result<PayBillOutcome> {
        if command.user_id.is_empty() {
            return Err(LedgerError::validation("User ID is required"));
        }
        if command.bill_id <= 0 {
            return Err(LedgerError::validation("Valid bill ID is required"));
        }
        Granularity::Monthly.parse_period_key(&command.year_month)?;

        let payment_date = match &command.payment_date {
            Some(date) => {
                parse_stored_date(date)?;
                date.clone()
            }
            None => Local::now().date_naive().format("%Y-%m-%d").to_string(),
        };

        let bill = self
            .bills
            .fetch(command.bill_id, &command.user_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("bill not found"))?;

        let locale = self
            .users
            .locale(&command.user_id)
            .await?
            .unwrap_or_else(|| "en".to_string());

        // Bills created before payment tracking existed get their records
        // backfilled from the stored duration.
        if self.bills.payment_count(command.bill_id).await? == 0 {
            info!(
                "No payment records found for bill {}, creating retroactive records",
                command.bill_id
            );
            self.bills
                .create_payment_records(
                    command.bill_id,
                    bill.start_date,
                    bill.duration_months,
                    bill.payment_method,
                )
                .await?;
        }

        let mut tx = self.db.pool().begin().await?;

        match self
            .bills
            .payment_paid_flag(&mut tx, command.bill_id, &command.year_month)
            .await?
        {
            None => {
                return Err(LedgerError::not_found(format!(
                    "payment record not found for bill {} in month {}",
                    command.bill_id, command.year_month
                )))
            }
            Some(true) => {
                return Err(LedgerError::validation(format!(
                    "bill for month {} is already paid",
                    command.year_month
                )))
            }
            Some(false) => {}
        }

        self.bills
            .mark_payment_paid(&mut tx, command.bill_id, &command.year_month, &payment_date)
            .await?;

        self.balances
            .move_bill_to_expense(
                &mut tx,
                &command.user_id,
                &command.year_month,
                bill.payment_method,
                bill.amount,
            )
            .await?;

        let description = payment_description(&locale, &bill.category, &payment_date);
        self.transactions
            .insert_expense_tx(
                &mut tx,
                &command.user_id,
                bill.amount,
                &payment_date,
                &bill.category,
                bill.payment_method,
                &description,
                Some(command.bill_id),
            )
            .await?;

        let (total_payments, paid_payments) =
            self.bills.payment_counts(&mut tx, command.bill_id).await?;
        let bill_fully_paid = total_payments > 0 && paid_payments >= total_payments;
        if bill_fully_paid {
            self.bills
                .set_bill_paid(&mut tx, command.bill_id, &command.user_id)
                .await?;
        }

        tx.commit().await?;

        info!(
            "Payment processed for month {} - only bill and expense buckets updated",
            command.year_month
        );

        Ok(PayBillOutcome {
            bill_id: command.bill_id,
            user_id: command.user_id,
            year_month: command.year_month,
            payment_date,
            amount: bill.amount,
            payment_method: bill.payment_method,
            bill_fully_paid,
            remaining_payments: total_payments - paid_payments,
        })
    }

    /// Apply a partial update to a bill, reconciling the ledger for amount
    /// and coverage changes, then cascade once from the earliest month of
    /// the old or new coverage.
    pub async fn update_bill(&self, command: UpdateBillCommand) -> Result<()> {
        if command.user_id.is_empty() {
            return Err(LedgerError::validation("User ID is required"));
        }
        if command.bill_id <= 0 {
            return Err(LedgerError::validation("Valid bill ID is required"));
        }

        let old = self
            .bills
            .fetch(command.bill_id, &command.user_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Bill not found"))?;

        let merged = merge_update(&old, &command)?;
        self.bills.update(&merged).await?;

        let update = BillUpdate {
            bill_id: old.id,
            user_id: old.user_id.clone(),
            old_amount: old.amount,
            new_amount: merged.amount,
            old_start_date: old.start_date,
            new_start_date: merged.start_date,
            old_duration_months: old.duration_months,
            new_duration_months: merged.duration_months,
            old_payment_method: old.payment_method,
            new_payment_method: merged.payment_method,
        };

        self.reconcile_amount_change(&update).await?;
        self.reconcile_coverage_change(&update).await?;

        let old_first = Granularity::Monthly.period_key(update.old_start_date);
        let new_first = Granularity::Monthly.period_key(update.new_start_date);
        let cascade_start = if old_first < new_first { old_first } else { new_first };
        if let Err(err) = self
            .cascade
            .recalculate_from(&update.user_id, Granularity::Monthly, &cascade_start)
            .await
        {
            warn!("Error updating cascade balances after bill update: {}", err);
        }

        Ok(())
    }

    /// Months that already carry a linked expense get the delta on their
    /// expense rows and expense bucket; unpaid months get it on the bill
    /// bucket.
    async fn reconcile_amount_change(&self, update: &BillUpdate) -> Result<()> {
        if update.old_amount == update.new_amount {
            return Ok(());
        }
        let delta = update.new_amount - update.old_amount;
        info!(
            "Bill {} amount changed by {:.2} ({:.2} -> {:.2})",
            update.bill_id, delta, update.old_amount, update.new_amount
        );

        let expense_months = self
            .transactions
            .months_with_bill_expenses(update.bill_id, &update.user_id)
            .await?;

        for month in covered_months(update.new_start_date, update.new_duration_months) {
            let result = if expense_months.contains(&month) {
                match self
                    .transactions
                    .adjust_bill_expense_amounts(update.bill_id, &update.user_id, &month, delta)
                    .await
                {
                    Ok(_) => {
                        self.balances
                            .apply_amount(
                                &update.user_id,
                                Granularity::Monthly,
                                &month,
                                Bucket::Expense,
                                update.new_payment_method,
                                delta,
                            )
                            .await
                    }
                    Err(err) => Err(err),
                }
            } else {
                self.balances
                    .apply_amount(
                        &update.user_id,
                        Granularity::Monthly,
                        &month,
                        Bucket::Bill,
                        update.new_payment_method,
                        delta,
                    )
                    .await
            };
            if let Err(err) = result {
                warn!("Error adjusting amount for month {}: {}", month, err);
            }
        }

        Ok(())
    }

    /// Reconcile the covered month set after a duration or start-date
    /// change: removed months give back their contribution and lose their
    /// payment record, added months gain both.
    async fn reconcile_coverage_change(&self, update: &BillUpdate) -> Result<()> {
        let old_months = covered_months(update.old_start_date, update.old_duration_months);
        let new_months = covered_months(update.new_start_date, update.new_duration_months);
        if old_months == new_months {
            return Ok(());
        }

        let removed: Vec<&String> = old_months
            .iter()
            .filter(|month| !new_months.contains(month))
            .collect();
        let added: Vec<&String> = new_months
            .iter()
            .filter(|month| !old_months.contains(month))
            .collect();
        info!(
            "Bill {} coverage changed: removed {:?}, added {:?}",
            update.bill_id, removed, added
        );

        let expense_months = self
            .transactions
            .months_with_bill_expenses(update.bill_id, &update.user_id)
            .await?;

        for month in removed {
            let result = if expense_months.contains(month) {
                match self
                    .transactions
                    .adjust_bill_expense_amounts(
                        update.bill_id,
                        &update.user_id,
                        month,
                        -update.old_amount,
                    )
                    .await
                {
                    Ok(_) => {
                        self.balances
                            .apply_amount(
                                &update.user_id,
                                Granularity::Monthly,
                                month,
                                Bucket::Expense,
                                update.old_payment_method,
                                -update.old_amount,
                            )
                            .await
                    }
                    Err(err) => Err(err),
                }
            } else {
                self.balances
                    .apply_amount(
                        &update.user_id,
                        Granularity::Monthly,
                        month,
                        Bucket::Bill,
                        update.old_payment_method,
                        -update.old_amount,
                    )
                    .await
            };
            if let Err(err) = result {
                warn!("Error processing removed month {}: {}", month, err);
                continue;
            }
            if let Err(err) = self.bills.delete_payment(update.bill_id, month).await {
                warn!("Error deleting payment record for month {}: {}", month, err);
            }
        }

        for month in added {
            if let Err(err) = self
                .bills
                .create_payment_record(update.bill_id, month, update.new_payment_method)
                .await
            {
                warn!("Error creating payment record for month {}: {}", month, err);
            }
            let result = if expense_months.contains(month) {
                match self
                    .transactions
                    .adjust_bill_expense_amounts(
                        update.bill_id,
                        &update.user_id,
                        month,
                        update.new_amount,
                    )
                    .await
                {
                    Ok(_) => {
                        self.balances
                            .apply_amount(
                                &update.user_id,
                                Granularity::Monthly,
                                month,
                                Bucket::Expense,
                                update.new_payment_method,
                                update.new_amount,
                            )
                            .await
                    }
                    Err(err) => Err(err),
                }
            } else {
                self.balances
                    .apply_amount(
                        &update.user_id,
                        Granularity::Monthly,
                        month,
                        Bucket::Bill,
                        update.new_payment_method,
                        update.new_amount,
                    )
                    .await
            };
            if let Err(err) = result {
                warn!("Error processing added month {}: {}", month, err);
            }
        }

        Ok(())
    }

    /// Remove a bill: reverse every covered month's contribution, cascade,
    /// then drop the payment records and the bill itself.
    pub async fn delete_bill(&self, user_id: &str, bill_id: i64) -> Result<()> {
        if user_id.is_empty() {
            return Err(LedgerError::validation("User ID is required"));
        }
        if bill_id <= 0 {
            return Err(LedgerError::validation("Valid bill ID is required"));
        }

        let bill = self
            .bills
            .fetch(bill_id, user_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("bill not found"))?;

        let expense_months = self
            .transactions
            .months_with_bill_expenses(bill_id, user_id)
            .await?;

        let months = bill.covered_months();
        for month in &months {
            let bucket = if expense_months.contains(month) {
                Bucket::Expense
            } else {
                Bucket::Bill
            };
            self.balances
                .apply_amount(
                    user_id,
                    Granularity::Monthly,
                    month,
                    bucket,
                    bill.payment_method,
                    -bill.amount,
                )
                .await?;
        }

        if let Some(first_month) = months.first() {
            self.cascade
                .recalculate_from(user_id, Granularity::Monthly, first_month)
                .await?;
        }

        self.bills.delete_payments(bill_id).await?;
        if self.bills.delete(bill_id, user_id).await? == 0 {
            return Err(LedgerError::not_found("bill not found or already deleted"));
        }

        Ok(())
    }

    pub async fn payment_status(&self, bill_id: i64, user_id: &str) -> Result<BillPaymentStatus> {
        let bill = self
            .bills
            .fetch(bill_id, user_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("bill not found"))?;

        let payments = self.bills.payments(bill_id).await?;
        let total_payments = payments.len() as i64;
        let paid_payments = payments.iter().filter(|payment| payment.paid).count() as i64;

        Ok(BillPaymentStatus {
            bill,
            total_payments,
            paid_payments,
            payments,
        })
    }

    pub async fn fetch_bills(&self, user_id: &str) -> Result<Vec<Bill>> {
        if user_id.is_empty() {
            return Err(LedgerError::validation("User ID is required"));
        }
        self.bills.fetch_all(user_id).await
    }

    /// Bills covering the month of `date`, with that month's paid flag, a
    /// due date clamped to the month length, and overdue state relative to
    /// today.
    pub async fn fetch_bills_for_period(&self, user_id: &str, date: &str) -> Result<Vec<Bill>> {
        self.fetch_bills_for_period_at(user_id, date, Local::now().date_naive())
            .await
    }

    async fn fetch_bills_for_period_at(
        &self,
        user_id: &str,
        date: &str,
        today: NaiveDate,
    ) -> Result<Vec<Bill>> {
        if user_id.is_empty() {
            return Err(LedgerError::validation("User ID is required"));
        }
        let year_month = extract_year_month(date)?;
        let month_start = Granularity::Monthly.parse_period_key(&year_month)?;

        let paid_flags = self.bills.paid_flags_for_month(user_id, &year_month).await?;

        let mut bills = Vec::new();
        for mut bill in self.bills.fetch_all(user_id).await? {
            let covers = if bill.recurring {
                bill.covered_months().contains(&year_month)
            } else {
                bill.due_date.starts_with(&year_month)
            };
            if !covers {
                continue;
            }

            let due_day = bill.payment_day.min(days_in_month(month_start));
            let due_date = NaiveDate::from_ymd_opt(month_start.year(), month_start.month(), due_day)
                .unwrap_or(month_start);

            bill.due_date = due_date.format("%Y-%m-%d").to_string();
            bill.paid = paid_flags.get(&bill.id).copied().unwrap_or(false);
            bill.overdue = !bill.paid && due_date < today;
            bill.overdue_days = if bill.overdue {
                (today - due_date).num_days()
            } else {
                0
            };
            bills.push(bill);
        }

        bills.sort_by(|a, b| a.due_date.cmp(&b.due_date).then(a.id.cmp(&b.id)));
        Ok(bills)
    }
}

fn validate_add_command(command: AddBillCommand) -> Result<NewBill> {
    if command.user_id.is_empty() {
        return Err(LedgerError::validation("User ID is required"));
    }
    if command.name.is_empty() {
        return Err(LedgerError::validation("Name is required"));
    }
    if command.amount <= 0.0 {
        return Err(LedgerError::validation("Amount must be greater than 0"));
    }
    if command.due_date.is_empty() {
        return Err(LedgerError::validation("Due date is required"));
    }
    if command.category.is_empty() {
        return Err(LedgerError::validation("Category is required"));
    }

    let payment_method = match command.payment_method.as_deref() {
        None | Some("") => PaymentMethod::Bank,
        Some(method) => PaymentMethod::parse(method)?,
    };
    let payment_day = command.payment_day.filter(|day| *day > 0).unwrap_or(1);
    if !(1..=28).contains(&payment_day) {
        return Err(LedgerError::validation(
            "Payment day must be between 1 and 28",
        ));
    }
    let duration_months = command.duration_months.filter(|months| *months > 0).unwrap_or(1);

    let start_date_str = match command.start_date.as_deref() {
        None | Some("") => command.due_date.clone(),
        Some(date) => date.to_string(),
    };
    let start_date = parse_stored_date(&start_date_str)?;

    Ok(NewBill {
        user_id: command.user_id,
        name: command.name,
        amount: command.amount,
        due_date: command.due_date,
        start_date,
        payment_day,
        duration_months,
        regularity: command
            .regularity
            .filter(|regularity| !regularity.is_empty())
            .unwrap_or_else(|| "monthly".to_string()),
        category: command.category,
        icon: command
            .icon
            .filter(|icon| !icon.is_empty())
            .unwrap_or_else(|| DEFAULT_ICON.to_string()),
        payment_method,
    })
}

fn merge_update(old: &Bill, command: &UpdateBillCommand) -> Result<Bill> {
    let mut merged = old.clone();

    if let Some(name) = command.name.as_deref().filter(|name| !name.is_empty()) {
        merged.name = name.to_string();
    }
    if let Some(amount) = command.amount.filter(|amount| *amount > 0.0) {
        merged.amount = amount;
    }
    if let Some(start_date) = command.start_date.as_deref().filter(|date| !date.is_empty()) {
        merged.start_date = parse_stored_date(start_date)?;
    }
    if let Some(payment_day) = command.payment_day.filter(|day| *day > 0) {
        if !(1..=28).contains(&payment_day) {
            return Err(LedgerError::validation(
                "Payment day must be between 1 and 28",
            ));
        }
        merged.payment_day = payment_day;
    }
    if let Some(duration) = command.duration_months.filter(|months| *months > 0) {
        merged.duration_months = duration;
    }
    if let Some(regularity) = command
        .regularity
        .as_deref()
        .filter(|regularity| !regularity.is_empty())
    {
        merged.regularity = regularity.to_string();
    }
    if let Some(category) = command.category.as_deref().filter(|category| !category.is_empty()) {
        merged.category = category.to_string();
    }
    if let Some(icon) = command.icon.as_deref().filter(|icon| !icon.is_empty()) {
        merged.icon = icon.to_string();
    }
    if let Some(method) = command
        .payment_method
        .as_deref()
        .filter(|method| !method.is_empty())
    {
        merged.payment_method = PaymentMethod::parse(method)?;
    }

    Ok(merged)
}

fn extract_year_month(date: &str) -> Result<String> {
    if date.len() >= 10 {
        Ok(date[..7].to_string())
    } else if date.len() == 7 {
        Ok(date.to_string())
    } else {
        Err(LedgerError::validation(format!(
            "unsupported date format: {}",
            date
        )))
    }
}

fn days_in_month(month_start: NaiveDate) -> u32 {
    month_start
        .checked_add_months(Months::new(1))
        .and_then(|next| next.checked_sub_days(Days::new(1)))
        .map(|last| last.day())
        .unwrap_or(28)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::period_balance::PeriodBalance;

    struct Harness {
        service: BillService,
        balances: BalanceRepository,
        transactions: TransactionRepository,
        users: UserRepository,
    }

    async fn setup() -> Harness {
        let db = DbConnection::init_test().await.expect("test database");
        Harness {
            service: BillService::new(db.clone()),
            balances: BalanceRepository::new(db.clone()),
            transactions: TransactionRepository::new(db.clone()),
            users: UserRepository::new(db),
        }
    }

    fn add_command(user_id: &str) -> AddBillCommand {
        AddBillCommand {
            user_id: user_id.to_string(),
            name: "Electricity".to_string(),
            amount: 100.0,
            due_date: "2025-01-01".to_string(),
            start_date: Some("2025-01-01".to_string()),
            payment_day: Some(15),
            duration_months: Some(3),
            regularity: None,
            category: "Utilities".to_string(),
            icon: None,
            payment_method: Some("cash".to_string()),
        }
    }

    async fn monthly_row(harness: &Harness, user_id: &str, month: &str) -> PeriodBalance {
        harness
            .balances
            .fetch_row(user_id, Granularity::Monthly, month)
            .await
            .unwrap()
            .unwrap_or_else(|| panic!("monthly row {} missing", month))
    }

    #[tokio::test]
    async fn test_add_bill_projects_months_and_cascades() {
        let harness = setup().await;

        let bill = harness.service.add_bill(add_command("1")).await.unwrap();
        assert_eq!(bill.duration_months, 3);
        assert!(!bill.paid);

        // Each covered month carries the bill amount and the cascaded
        // positions accumulate the deficit.
        for (month, expected_cash) in [("2025-01", -100.0), ("2025-02", -200.0), ("2025-03", -300.0)]
        {
            let row = monthly_row(&harness, "1", month).await;
            assert_eq!(row.bill_cash_amount, 100.0, "bill bucket for {}", month);
            assert_eq!(row.cash_amount, expected_cash, "cash position for {}", month);
            assert_eq!(row.total_balance, expected_cash, "total for {}", month);
        }

        let status = harness.service.payment_status(bill.id, "1").await.unwrap();
        assert_eq!(status.total_payments, 3);
        assert_eq!(status.paid_payments, 0);
    }

    #[tokio::test]
    async fn test_add_bill_rejects_bad_input() {
        let harness = setup().await;

        let mut command = add_command("1");
        command.amount = 0.0;
        assert!(matches!(
            harness.service.add_bill(command).await,
            Err(LedgerError::Validation(_))
        ));

        let mut command = add_command("1");
        command.payment_day = Some(31);
        assert!(matches!(
            harness.service.add_bill(command).await,
            Err(LedgerError::Validation(_))
        ));

        let mut command = add_command("1");
        command.payment_method = Some("cheque".to_string());
        assert!(matches!(
            harness.service.add_bill(command).await,
            Err(LedgerError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_pay_bill_moves_bucket_without_cascade() {
        let harness = setup().await;
        let user_id = harness
            .users
            .insert("ana@example.com", "Ana", Some("es"))
            .await
            .unwrap()
            .to_string();

        let bill = harness
            .service
            .add_bill(add_command(&user_id))
            .await
            .unwrap();

        let outcome = harness
            .service
            .pay_bill(PayBillCommand {
                user_id: user_id.clone(),
                bill_id: bill.id,
                year_month: "2025-01".to_string(),
                payment_date: Some("2025-01-15".to_string()),
            })
            .await
            .unwrap();

        assert!(!outcome.bill_fully_paid);
        assert_eq!(outcome.remaining_payments, 2);

        let january = monthly_row(&harness, &user_id, "2025-01").await;
        assert_eq!(january.bill_cash_amount, 0.0);
        assert_eq!(january.expense_cash_amount, 100.0);
        // The payment path leaves the cascaded position untouched.
        assert_eq!(january.cash_amount, -100.0);

        // An expense row tagged with the bill and a localized description
        // was written.
        let row = sqlx::query(
            "SELECT amount, bill_id, description FROM expenses WHERE user_id = ?",
        )
        .bind(&user_id)
        .fetch_one(harness.service.db.pool())
        .await
        .unwrap();
        use sqlx::Row as _;
        assert_eq!(row.get::<f64, _>("amount"), 100.0);
        assert_eq!(row.get::<i64, _>("bill_id"), bill.id);
        assert_eq!(
            row.get::<String, _>("description"),
            "Pago factura: Utilities 2025-01-15"
        );

        let bill_after = harness
            .service
            .payment_status(bill.id, &user_id)
            .await
            .unwrap();
        assert!(!bill_after.bill.paid);
        assert_eq!(bill_after.paid_payments, 1);
    }

    #[tokio::test]
    async fn test_pay_bill_twice_is_rejected() {
        let harness = setup().await;
        let user_id = harness
            .users
            .insert("bo@example.com", "Bo", None)
            .await
            .unwrap()
            .to_string();
        let bill = harness
            .service
            .add_bill(add_command(&user_id))
            .await
            .unwrap();

        let command = PayBillCommand {
            user_id: user_id.clone(),
            bill_id: bill.id,
            year_month: "2025-01".to_string(),
            payment_date: Some("2025-01-15".to_string()),
        };
        harness.service.pay_bill(command.clone()).await.unwrap();

        let err = harness.service.pay_bill(command).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        // The bucket move happened exactly once.
        let january = monthly_row(&harness, &user_id, "2025-01").await;
        assert_eq!(january.expense_cash_amount, 100.0);
    }

    #[tokio::test]
    async fn test_paying_all_months_marks_bill_paid() {
        let harness = setup().await;
        let user_id = harness
            .users
            .insert("cy@example.com", "Cy", None)
            .await
            .unwrap()
            .to_string();
        let mut command = add_command(&user_id);
        command.duration_months = Some(2);
        let bill = harness.service.add_bill(command).await.unwrap();

        for (month, date) in [("2025-01", "2025-01-15"), ("2025-02", "2025-02-15")] {
            let outcome = harness
                .service
                .pay_bill(PayBillCommand {
                    user_id: user_id.clone(),
                    bill_id: bill.id,
                    year_month: month.to_string(),
                    payment_date: Some(date.to_string()),
                })
                .await
                .unwrap();
            if month == "2025-02" {
                assert!(outcome.bill_fully_paid);
                assert_eq!(outcome.remaining_payments, 0);
            }
        }

        let status = harness.service.payment_status(bill.id, &user_id).await.unwrap();
        assert!(status.bill.paid);
    }

    #[tokio::test]
    async fn test_extending_duration_appends_months_and_cascades() {
        let harness = setup().await;
        let bill = harness.service.add_bill(add_command("1")).await.unwrap();

        harness
            .service
            .update_bill(UpdateBillCommand {
                user_id: "1".to_string(),
                bill_id: bill.id,
                name: None,
                amount: None,
                start_date: None,
                payment_day: None,
                duration_months: Some(5),
                regularity: None,
                category: None,
                icon: None,
                payment_method: None,
            })
            .await
            .unwrap();

        for (month, expected_cash) in [("2025-04", -400.0), ("2025-05", -500.0)] {
            let row = monthly_row(&harness, "1", month).await;
            assert_eq!(row.bill_cash_amount, 100.0, "bill bucket for {}", month);
            assert_eq!(row.cash_amount, expected_cash, "cash position for {}", month);
        }

        let status = harness.service.payment_status(bill.id, "1").await.unwrap();
        assert_eq!(status.total_payments, 5);
    }

    #[tokio::test]
    async fn test_shrinking_duration_reverses_removed_months() {
        let harness = setup().await;
        let bill = harness.service.add_bill(add_command("1")).await.unwrap();

        harness
            .service
            .update_bill(UpdateBillCommand {
                user_id: "1".to_string(),
                bill_id: bill.id,
                name: None,
                amount: None,
                start_date: None,
                payment_day: None,
                duration_months: Some(1),
                regularity: None,
                category: None,
                icon: None,
                payment_method: None,
            })
            .await
            .unwrap();

        let february = monthly_row(&harness, "1", "2025-02").await;
        assert_eq!(february.bill_cash_amount, 0.0);
        assert_eq!(february.cash_amount, -100.0); // January's deficit carries.

        let status = harness.service.payment_status(bill.id, "1").await.unwrap();
        assert_eq!(status.total_payments, 1);
    }

    #[tokio::test]
    async fn test_amount_update_adjusts_unpaid_months() {
        let harness = setup().await;
        let bill = harness.service.add_bill(add_command("1")).await.unwrap();

        harness
            .service
            .update_bill(UpdateBillCommand {
                user_id: "1".to_string(),
                bill_id: bill.id,
                name: None,
                amount: Some(150.0),
                start_date: None,
                payment_day: None,
                duration_months: None,
                regularity: None,
                category: None,
                icon: None,
                payment_method: None,
            })
            .await
            .unwrap();

        for (month, expected_cash) in [("2025-01", -150.0), ("2025-02", -300.0), ("2025-03", -450.0)]
        {
            let row = monthly_row(&harness, "1", month).await;
            assert_eq!(row.bill_cash_amount, 150.0, "bill bucket for {}", month);
            assert_eq!(row.cash_amount, expected_cash, "cash position for {}", month);
        }
    }

    #[tokio::test]
    async fn test_amount_update_adjusts_paid_months_via_expenses() {
        let harness = setup().await;
        let user_id = harness
            .users
            .insert("di@example.com", "Di", None)
            .await
            .unwrap()
            .to_string();
        let bill = harness
            .service
            .add_bill(add_command(&user_id))
            .await
            .unwrap();
        harness
            .service
            .pay_bill(PayBillCommand {
                user_id: user_id.clone(),
                bill_id: bill.id,
                year_month: "2025-01".to_string(),
                payment_date: Some("2025-01-15".to_string()),
            })
            .await
            .unwrap();

        harness
            .service
            .update_bill(UpdateBillCommand {
                user_id: user_id.clone(),
                bill_id: bill.id,
                name: None,
                amount: Some(120.0),
                start_date: None,
                payment_day: None,
                duration_months: None,
                regularity: None,
                category: None,
                icon: None,
                payment_method: None,
            })
            .await
            .unwrap();

        // The paid month's delta lands on the expense side.
        let january = monthly_row(&harness, &user_id, "2025-01").await;
        assert_eq!(january.expense_cash_amount, 120.0);
        assert_eq!(january.bill_cash_amount, 0.0);

        // Its linked expense row follows the bill's new amount.
        use sqlx::Row as _;
        let amount: f64 = sqlx::query("SELECT amount FROM expenses WHERE bill_id = ?")
            .bind(bill.id)
            .fetch_one(harness.service.db.pool())
            .await
            .unwrap()
            .get("amount");
        assert_eq!(amount, 120.0);

        // Unpaid months stay in the bill bucket at the new amount.
        let february = monthly_row(&harness, &user_id, "2025-02").await;
        assert_eq!(february.bill_cash_amount, 120.0);
    }

    #[tokio::test]
    async fn test_delete_bill_reverses_everything() {
        let harness = setup().await;
        let bill = harness.service.add_bill(add_command("1")).await.unwrap();

        harness.service.delete_bill("1", bill.id).await.unwrap();

        for month in ["2025-01", "2025-02", "2025-03"] {
            let row = monthly_row(&harness, "1", month).await;
            assert_eq!(row.bill_cash_amount, 0.0, "bill bucket for {}", month);
            assert_eq!(row.cash_amount, 0.0, "cash position for {}", month);
        }
        assert!(harness.service.payment_status(bill.id, "1").await.is_err());
        assert!(matches!(
            harness.service.delete_bill("1", bill.id).await,
            Err(LedgerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_bills_for_period_reports_month_state() {
        let harness = setup().await;
        let user_id = harness
            .users
            .insert("ed@example.com", "Ed", None)
            .await
            .unwrap()
            .to_string();
        let mut command = add_command(&user_id);
        command.payment_day = Some(28);
        let bill = harness.service.add_bill(command).await.unwrap();

        harness
            .service
            .pay_bill(PayBillCommand {
                user_id: user_id.clone(),
                bill_id: bill.id,
                year_month: "2025-01".to_string(),
                payment_date: Some("2025-01-28".to_string()),
            })
            .await
            .unwrap();

        let today = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let january = harness
            .service
            .fetch_bills_for_period_at(&user_id, "2025-01-05", today)
            .await
            .unwrap();
        assert_eq!(january.len(), 1);
        assert!(january[0].paid);
        assert!(!january[0].overdue);
        assert_eq!(january[0].due_date, "2025-01-28");

        let february = harness
            .service
            .fetch_bills_for_period_at(&user_id, "2025-02", today)
            .await
            .unwrap();
        assert_eq!(february.len(), 1);
        assert!(!february[0].paid);
        assert!(february[0].overdue);
        assert_eq!(february[0].overdue_days, 10);

        // April is past the bill's coverage.
        let april = harness
            .service
            .fetch_bills_for_period_at(&user_id, "2025-04", today)
            .await
            .unwrap();
        assert!(april.is_empty());
    }

    #[test]
    fn test_days_in_month_clamping() {
        assert_eq!(days_in_month(NaiveDate::from_ymd_opt(2025, 2, 1).unwrap()), 28);
        assert_eq!(days_in_month(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()), 29);
        assert_eq!(days_in_month(NaiveDate::from_ymd_opt(2025, 4, 1).unwrap()), 30);
        assert_eq!(days_in_month(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()), 31);
    }
}
