//! The city budget ledger: funds, transactions and affordability checks.
use crate::catalog::EnergyCatalog;
use crate::units::{Dimensionless, Money};
use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_string_enum::{DeserializeLabeledStringEnum, SerializeLabeledStringEnum};
use std::collections::VecDeque;

/// Fraction of the purchase price refunded when selling an installation.
pub const REFUND_RATE: f64 = 0.7;

/// Maximum entries retained per transaction list (oldest evicted first).
pub const MAX_LEDGER_ENTRIES: usize = 50;

/// Which side of the ledger an entry belongs to
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    Debug,
    SerializeLabeledStringEnum,
    DeserializeLabeledStringEnum,
)]
pub enum EntryKind {
    /// Money leaving the budget
    #[string = "expense"]
    Expense,
    /// Money entering the budget
    #[string = "revenue"]
    Revenue,
}

/// One recorded transaction
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Expense or revenue
    pub kind: EntryKind,
    /// Human-readable description
    pub label: String,
    /// Transaction amount (always positive)
    pub amount: Money,
    /// Unix timestamp of the transaction
    pub timestamp: i64,
}

/// Snapshot delivered to budget observers on every balance-affecting operation
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BudgetSnapshot {
    /// Funds currently available
    pub current_budget: Money,
    /// Cumulative net spending
    pub total_spent: Money,
    /// The most recently applied monthly income
    pub monthly_income: Money,
}

/// Observer callback. Errors are logged and never propagated.
pub type BudgetListener = Box<dyn FnMut(&BudgetSnapshot) -> Result<()>>;

/// Serializable ledger state for the save envelope
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BudgetState {
    /// The budget the session started with
    pub initial_budget: Money,
    /// Funds currently available
    pub current_budget: Money,
    /// Cumulative net spending
    pub total_spent: Money,
    /// The most recently applied monthly income
    pub income_per_turn: Money,
    /// Retained expense entries, oldest first
    pub expenses: Vec<LedgerEntry>,
    /// Retained revenue entries, oldest first
    pub revenue: Vec<LedgerEntry>,
}

/// Tracks funds and transaction history, and gates purchases on affordability.
pub struct BudgetLedger {
    initial_budget: Money,
    current: Money,
    total_spent: Money,
    monthly_income: Money,
    expenses: VecDeque<LedgerEntry>,
    revenue: VecDeque<LedgerEntry>,
    listeners: Vec<BudgetListener>,
}

impl BudgetLedger {
    /// Create a ledger with the given starting funds.
    pub fn new(initial_budget: Money) -> Self {
        Self {
            initial_budget,
            current: initial_budget,
            total_spent: Money(0.0),
            monthly_income: Money(0.0),
            expenses: VecDeque::new(),
            revenue: VecDeque::new(),
            listeners: Vec::new(),
        }
    }

    /// Funds currently available.
    pub fn current_budget(&self) -> Money {
        self.current
    }

    /// The budget the session started with.
    pub fn initial_budget(&self) -> Money {
        self.initial_budget
    }

    /// Cumulative net spending.
    pub fn total_spent(&self) -> Money {
        self.total_spent
    }

    /// The most recently applied monthly income.
    pub fn monthly_income(&self) -> Money {
        self.monthly_income
    }

    /// Retained expense entries, oldest first.
    pub fn expenses(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.expenses.iter()
    }

    /// Retained revenue entries, oldest first.
    pub fn revenue(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.revenue.iter()
    }

    /// Register an observer. Observers are notified in registration order.
    pub fn subscribe(&mut self, listener: BudgetListener) {
        self.listeners.push(listener);
    }

    /// Whether the current funds cover `qty` installations of the given source.
    pub fn can_afford(&self, catalog: &EnergyCatalog, source_id: &str, qty: u32) -> bool {
        match catalog.get(source_id) {
            Some(source) => purchase_cost(source.base_cost, qty) <= self.current,
            None => false,
        }
    }

    /// Debit the cost of `qty` installations and record the expense.
    ///
    /// Affordability is checked here as well as by callers, so the balance
    /// cannot go negative through this operation. Returns false and leaves
    /// state unchanged when the purchase cannot be afforded; the caller
    /// surfaces the shortfall.
    pub fn purchase(&mut self, catalog: &EnergyCatalog, source_id: &str, qty: u32) -> bool {
        let Some(source) = catalog.get(source_id) else {
            log::warn!("Attempted purchase of unknown energy source '{source_id}'");
            return false;
        };

        let cost = purchase_cost(source.base_cost, qty);
        if cost > self.current {
            return false;
        }

        self.current = self.current - cost;
        self.total_spent += cost;
        self.push_entry(EntryKind::Expense, format!("{} x{qty}", source.name), cost);
        self.notify();
        true
    }

    /// Credit the refund for `qty` installations and record the revenue.
    ///
    /// Always succeeds; the refund is [`REFUND_RATE`] of the purchase price.
    /// Cumulative spending decreases by the refund, floored at zero.
    pub fn sell(&mut self, catalog: &EnergyCatalog, source_id: &str, qty: u32) -> Money {
        let Some(source) = catalog.get(source_id) else {
            log::warn!("Attempted sale of unknown energy source '{source_id}'");
            return Money(0.0);
        };

        let refund = purchase_cost(source.base_cost, qty) * Dimensionless(REFUND_RATE);
        self.current += refund;
        self.total_spent = Money((self.total_spent - refund).value().max(0.0));
        self.push_entry(
            EntryKind::Revenue,
            format!("Sold {} x{qty}", source.name),
            refund,
        );
        self.notify();
        refund
    }

    /// Credit the precomputed monthly income.
    ///
    /// Records a revenue entry only when the amount is positive.
    pub fn apply_monthly_income(&mut self, amount: Money) {
        self.monthly_income = amount;
        if amount > Money(0.0) {
            self.current += amount;
            self.push_entry(EntryKind::Revenue, "Monthly energy income".into(), amount);
        }
        self.notify();
    }

    /// Unconditionally credit funds (manual grants).
    pub fn add_funds(&mut self, amount: Money, label: &str) {
        self.current += amount;
        self.push_entry(EntryKind::Revenue, label.into(), amount);
        self.notify();
    }

    /// Restore the initial budget and clear all history.
    pub fn reset(&mut self) {
        self.current = self.initial_budget;
        self.total_spent = Money(0.0);
        self.monthly_income = Money(0.0);
        self.expenses.clear();
        self.revenue.clear();
        self.notify();
    }

    /// The ledger state for the save envelope.
    pub fn export(&self) -> BudgetState {
        BudgetState {
            initial_budget: self.initial_budget,
            current_budget: self.current,
            total_spent: self.total_spent,
            income_per_turn: self.monthly_income,
            expenses: self.expenses.iter().cloned().collect(),
            revenue: self.revenue.iter().cloned().collect(),
        }
    }

    /// Overwrite the ledger from a save envelope.
    ///
    /// Restored lists are re-capped in case the envelope carries more than
    /// the retention limit.
    pub fn restore(&mut self, state: BudgetState) {
        self.initial_budget = state.initial_budget;
        self.current = state.current_budget;
        self.total_spent = state.total_spent;
        self.monthly_income = state.income_per_turn;
        self.expenses = cap_entries(state.expenses);
        self.revenue = cap_entries(state.revenue);
        self.notify();
    }

    fn push_entry(&mut self, kind: EntryKind, label: String, amount: Money) {
        let entry = LedgerEntry {
            kind,
            label,
            amount,
            timestamp: Utc::now().timestamp(),
        };

        let list = match kind {
            EntryKind::Expense => &mut self.expenses,
            EntryKind::Revenue => &mut self.revenue,
        };
        if list.len() == MAX_LEDGER_ENTRIES {
            list.pop_front();
        }
        list.push_back(entry);
    }

    fn notify(&mut self) {
        let snapshot = BudgetSnapshot {
            current_budget: self.current,
            total_spent: self.total_spent,
            monthly_income: self.monthly_income,
        };

        for listener in &mut self.listeners {
            if let Err(err) = listener(&snapshot) {
                log::error!("Budget observer failed: {err:#}");
            }
        }
    }
}

/// Combined cost of `qty` installations.
fn purchase_cost(unit_cost: Money, qty: u32) -> Money {
    unit_cost * Dimensionless(f64::from(qty))
}

fn cap_entries(entries: Vec<LedgerEntry>) -> VecDeque<LedgerEntry> {
    let skip = entries.len().saturating_sub(MAX_LEDGER_ENTRIES);
    entries.into_iter().skip(skip).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{catalog, ledger};
    use float_cmp::assert_approx_eq;
    use itertools::Itertools;
    use rstest::rstest;

    #[rstest]
    fn test_can_afford(catalog: EnergyCatalog) {
        let ledger = BudgetLedger::new(Money(20_000.0));
        assert!(ledger.can_afford(&catalog, "solar", 1)); // $12k
        assert!(!ledger.can_afford(&catalog, "solar", 2));
        assert!(!ledger.can_afford(&catalog, "hydro", 1)); // $35k
        assert!(!ledger.can_afford(&catalog, "fusion", 1));
    }

    #[rstest]
    fn test_purchase_gates_on_affordability(catalog: EnergyCatalog) {
        let mut ledger = BudgetLedger::new(Money(20_000.0));

        assert!(ledger.purchase(&catalog, "solar", 1));
        assert_eq!(ledger.current_budget(), Money(8_000.0));
        assert_eq!(ledger.total_spent(), Money(12_000.0));

        // Unaffordable: state unchanged
        assert!(!ledger.purchase(&catalog, "solar", 1));
        assert_eq!(ledger.current_budget(), Money(8_000.0));
        assert_eq!(ledger.expenses().count(), 1);
    }

    #[rstest]
    fn test_refund_arithmetic(catalog: EnergyCatalog) {
        let mut ledger = BudgetLedger::new(Money(50_000.0));
        ledger.purchase(&catalog, "natural_gas", 1); // $10,000

        let refund = ledger.sell(&catalog, "natural_gas", 1);
        assert_approx_eq!(f64, refund.value(), 7_000.0);
        assert_approx_eq!(f64, ledger.current_budget().value(), 47_000.0);
        assert_approx_eq!(f64, ledger.total_spent().value(), 3_000.0);

        // Selling more than was ever spent floors cumulative spending at zero
        ledger.sell(&catalog, "natural_gas", 1);
        assert_eq!(ledger.total_spent(), Money(0.0));
    }

    #[rstest]
    fn test_ledger_fifo_retention(catalog: EnergyCatalog) {
        let mut ledger = BudgetLedger::new(Money(1_000_000.0));
        for _ in 0..60 {
            assert!(ledger.purchase(&catalog, "coal", 1));
        }

        assert_eq!(ledger.expenses().count(), MAX_LEDGER_ENTRIES);
        // Entries retained in original order
        assert!(ledger
            .expenses()
            .tuple_windows()
            .all(|(a, b)| a.timestamp <= b.timestamp));
    }

    #[rstest]
    fn test_apply_monthly_income(mut ledger: BudgetLedger) {
        let before = ledger.current_budget();
        ledger.apply_monthly_income(Money(500.0));
        assert_eq!(ledger.current_budget(), before + Money(500.0));
        assert_eq!(ledger.monthly_income(), Money(500.0));
        assert_eq!(ledger.revenue().count(), 1);

        // Zero income updates the figure but records no entry
        ledger.apply_monthly_income(Money(0.0));
        assert_eq!(ledger.monthly_income(), Money(0.0));
        assert_eq!(ledger.revenue().count(), 1);
    }

    #[rstest]
    fn test_reset(catalog: EnergyCatalog, mut ledger: BudgetLedger) {
        let initial = ledger.initial_budget();
        ledger.purchase(&catalog, "solar", 2);
        ledger.add_funds(Money(1_000.0), "Grant");

        ledger.reset();
        assert_eq!(ledger.current_budget(), initial);
        assert_eq!(ledger.total_spent(), Money(0.0));
        assert_eq!(ledger.expenses().count(), 0);
        assert_eq!(ledger.revenue().count(), 0);
    }

    #[rstest]
    fn test_observer_errors_do_not_block_delivery(catalog: EnergyCatalog) {
        use std::cell::RefCell;
        use std::rc::Rc;

        let calls = Rc::new(RefCell::new(0));
        let mut ledger = BudgetLedger::new(Money(100_000.0));

        ledger.subscribe(Box::new(|_| anyhow::bail!("observer exploded")));
        let counter = Rc::clone(&calls);
        ledger.subscribe(Box::new(move |snapshot| {
            assert!(snapshot.current_budget <= Money(100_000.0));
            *counter.borrow_mut() += 1;
            Ok(())
        }));

        ledger.purchase(&catalog, "solar", 1);
        ledger.sell(&catalog, "solar", 1);
        assert_eq!(*calls.borrow(), 2);
    }

    #[rstest]
    fn test_export_restore_round_trip(catalog: EnergyCatalog, mut ledger: BudgetLedger) {
        ledger.purchase(&catalog, "wind", 1);
        ledger.apply_monthly_income(Money(320.0));

        let state = ledger.export();
        let mut restored = BudgetLedger::new(Money(0.0));
        restored.restore(state);

        assert_eq!(restored.current_budget(), ledger.current_budget());
        assert_eq!(restored.total_spent(), ledger.total_spent());
        assert_eq!(restored.monthly_income(), ledger.monthly_income());
        assert_eq!(
            restored.expenses().cloned().collect_vec(),
            ledger.expenses().cloned().collect_vec()
        );
    }
}
