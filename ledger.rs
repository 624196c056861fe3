use crate::config::CostShare;
use crate::error::{Error, Result};
use crate::models::{PurchaseRecord, SharedPaymentRecord};
use std::collections::BTreeMap;

/// Purchase line ids (positions in the purchase list) pulled out of the default split.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShareOverrides {
    /// Lines the debtor owes in full.
    pub debtor_only: Vec<usize>,
    /// Lines the creditor keeps for themselves; nobody owes anything on them.
    pub creditor_only: Vec<usize>,
}

impl ShareOverrides {
    pub fn is_empty(&self) -> bool {
        self.debtor_only.is_empty() && self.creditor_only.is_empty()
    }
}

pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Applies the default split to every line, then the per-line overrides.
pub fn assign_shares(
    purchases: &mut [PurchaseRecord],
    share: &CostShare,
    overrides: &ShareOverrides,
) -> Result<()> {
    let len = purchases.len();
    for id in overrides.debtor_only.iter().chain(&overrides.creditor_only) {
        if *id >= len {
            return Err(Error::InvalidInput(format!(
                "purchase line {id} does not exist (receipt has {len} lines)"
            )));
        }
    }
    if let Some(id) = overrides
        .debtor_only
        .iter()
        .find(|id| overrides.creditor_only.contains(id))
    {
        return Err(Error::InvalidInput(format!(
            "purchase line {id} cannot be paid in full by both parties"
        )));
    }

    for purchase in purchases.iter_mut() {
        purchase.creditor = share.creditor;
        purchase.debtor = share.debtor;
        purchase.debt_multiplier = share.debt_multiplier;
    }
    for id in &overrides.debtor_only {
        purchases[*id].debt_multiplier = 1.0;
    }
    for id in &overrides.creditor_only {
        purchases[*id].debtor = share.creditor;
        purchases[*id].debt_multiplier = 1.0;
    }
    Ok(())
}

/// Sums every line's final price per (debtor, creditor) pair. Pairs where
/// someone would owe themselves are dropped.
pub fn shared_payments(receipt_id: i64, purchases: &[PurchaseRecord]) -> Vec<SharedPaymentRecord> {
    let mut owed: BTreeMap<(i64, i64), f64> = BTreeMap::new();
    for purchase in purchases {
        *owed.entry((purchase.debtor, purchase.creditor)).or_insert(0.0) += purchase.final_price();
    }

    owed.into_iter()
        .filter(|((debtor, creditor), _)| debtor != creditor)
        .map(|((debtor, creditor), amount)| SharedPaymentRecord {
            shared_payment_id: None,
            receipt_id,
            debtor,
            creditor,
            amount_owed: round_cents(amount),
            is_paid: false,
            paid_datetime: None,
        })
        .collect()
}
