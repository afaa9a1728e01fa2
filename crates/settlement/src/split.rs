use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::UserId;

/// The parts of a bill the engine needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitBill {
    pub owner_id: UserId,
    pub amount: Decimal,
    pub payers: Vec<UserId>,
    pub include_owner: bool,
}

/// One payer's share of one bill, owed to the bill's owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Obligation {
    pub payer_id: UserId,
    pub payee_id: UserId,
    pub amount: Decimal,
}

/// Per-payer share: `amount / N` truncated to cents, where `N` counts the
/// payers plus the owner when the owner takes a share.
pub fn share_of(bill: &SplitBill) -> Decimal {
    let parts = bill.payers.len() + usize::from(bill.include_owner);
    if parts == 0 {
        return Decimal::ZERO;
    }

    (bill.amount / Decimal::from(parts)).round_dp_with_strategy(2, RoundingStrategy::ToZero)
}

/// Expands bills into payer -> owner edges. Self-edges and zero shares are
/// dropped; the owner's own share is absorbed.
pub fn obligations(bills: &[SplitBill]) -> Vec<Obligation> {
    let mut out = Vec::new();
    for bill in bills {
        let share = share_of(bill);
        if share <= Decimal::ZERO {
            continue;
        }

        for payer in &bill.payers {
            if *payer == bill.owner_id {
                continue;
            }
            out.push(Obligation {
                payer_id: *payer,
                payee_id: bill.owner_id,
                amount: share,
            });
        }
    }
    out
}
