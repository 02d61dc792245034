//! Per-order escrow slot.
//!
//! Funds enter the slot when an order is placed and leave it exactly once,
//! either released to the seller or returned to the buyer. The order status
//! is the lock: callers only reach [`release`] or [`refund`] from an open
//! status, and both zero the slot.

use super::ledger::{self, EntryRef};
use super::Txn;
use crate::error::{MarketError, MarketResult};
use crate::models::{EntryKind, Order, PLATFORM_ACCOUNT};

/// Debit the buyer and bind the amount to `order`.
pub fn hold(txn: &mut Txn<'_>, order: &mut Order) -> MarketResult<()> {
    if order.escrow_points != 0 {
        return Err(MarketError::invalid_state("escrow slot already funded"));
    }
    ledger::debit(
        txn,
        order.buyer_id,
        EntryKind::Purchase,
        order.amount_points,
        EntryRef::order(order.id),
    )?;
    order.escrow_points = order.amount_points;
    Ok(())
}

fn ensure_funded(order: &Order) -> MarketResult<()> {
    if !order.status.holds_escrow() || order.escrow_points != order.amount_points {
        return Err(MarketError::invalid_state(format!(
            "escrow for order {} is not held",
            order.id
        )));
    }
    Ok(())
}

/// Pay the seller `amount - fee` and the platform `fee`.
pub fn release(txn: &mut Txn<'_>, order: &mut Order) -> MarketResult<()> {
    ensure_funded(order)?;
    let at = EntryRef::order(order.id);
    let net = order.escrow_points - order.fee_points;
    if net > 0 {
        ledger::credit(txn, order.seller_id, EntryKind::OrderIncome, net, at)?;
    }
    if order.fee_points > 0 {
        ledger::credit(txn, PLATFORM_ACCOUNT, EntryKind::PlatformFee, order.fee_points, at)?;
    }
    order.escrow_points = 0;
    Ok(())
}

/// Return the whole slot to the buyer.
pub fn refund(txn: &mut Txn<'_>, order: &mut Order) -> MarketResult<()> {
    ensure_funded(order)?;
    ledger::credit(
        txn,
        order.buyer_id,
        EntryKind::Refund,
        order.escrow_points,
        EntryRef::order(order.id),
    )?;
    order.escrow_points = 0;
    Ok(())
}
