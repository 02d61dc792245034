//! Points ledger: every balance mutation goes through here and leaves an
//! append-only entry behind.

use uuid::Uuid;

use super::Txn;
use crate::error::{MarketError, MarketResult};
use crate::models::{EntryKind, LedgerEntry, User, PLATFORM_ACCOUNT};

/// Reference attached to an entry
#[derive(Debug, Clone, Copy, Default)]
pub struct EntryRef {
    pub order_id: Option<Uuid>,
    pub ref_id: Option<Uuid>,
}

impl EntryRef {
    pub fn order(order_id: Uuid) -> Self {
        Self {
            order_id: Some(order_id),
            ref_id: None,
        }
    }

    pub fn record(ref_id: Uuid) -> Self {
        Self {
            order_id: None,
            ref_id: Some(ref_id),
        }
    }
}

fn record(txn: &mut Txn<'_>, user: &User, kind: EntryKind, amount: i64, balance_after: i64, at: EntryRef) {
    let entry = LedgerEntry {
        id: Uuid::new_v4(),
        user_id: user.id,
        kind,
        amount_points: amount,
        balance_after,
        order_id: at.order_id,
        ref_id: at.ref_id,
        created_at: txn.now(),
    };
    txn.push_entry(entry);
}

fn ensure_positive(points: i64) -> MarketResult<()> {
    if points <= 0 {
        return Err(MarketError::Validation(format!(
            "points amount must be positive, got {points}"
        )));
    }
    Ok(())
}

/// Add `points` to the available balance.
pub fn credit(txn: &mut Txn<'_>, user_id: Uuid, kind: EntryKind, points: i64, at: EntryRef) -> MarketResult<User> {
    ensure_positive(points)?;
    let mut user = txn.user(user_id)?;
    user.balance_points += points;
    user.updated_at = txn.now();
    record(txn, &user, kind, points, user.available_points(), at);
    txn.put_user(user.clone());
    Ok(user)
}

/// Take `points` from the available balance; frozen points are untouchable.
pub fn debit(txn: &mut Txn<'_>, user_id: Uuid, kind: EntryKind, points: i64, at: EntryRef) -> MarketResult<User> {
    ensure_positive(points)?;
    let mut user = txn.user(user_id)?;
    if user.available_points() < points {
        return Err(MarketError::InsufficientBalance {
            required: points,
            available: user.available_points(),
        });
    }
    user.balance_points -= points;
    user.updated_at = txn.now();
    record(txn, &user, kind, -points, user.available_points(), at);
    txn.put_user(user.clone());
    Ok(user)
}

/// Move available points into the frozen bucket for a pending withdrawal.
pub fn freeze(txn: &mut Txn<'_>, user_id: Uuid, points: i64, at: EntryRef) -> MarketResult<User> {
    ensure_positive(points)?;
    let mut user = txn.user(user_id)?;
    if user.available_points() < points {
        return Err(MarketError::InsufficientBalance {
            required: points,
            available: user.available_points(),
        });
    }
    user.frozen_points += points;
    user.updated_at = txn.now();
    record(txn, &user, EntryKind::Withdrawal, -points, user.available_points(), at);
    txn.put_user(user.clone());
    Ok(user)
}

/// Return frozen points to the available balance.
pub fn unfreeze(txn: &mut Txn<'_>, user_id: Uuid, points: i64, at: EntryRef) -> MarketResult<User> {
    ensure_positive(points)?;
    let mut user = txn.user(user_id)?;
    if user.frozen_points < points {
        return Err(MarketError::invalid_state("frozen balance below withdrawal amount"));
    }
    user.frozen_points -= points;
    user.updated_at = txn.now();
    record(txn, &user, EntryKind::WithdrawalReturned, points, user.available_points(), at);
    txn.put_user(user.clone());
    Ok(user)
}

/// Frozen points left the platform. The available balance was already
/// debited when they were frozen, so no entry is written.
pub fn pay_out_frozen(txn: &mut Txn<'_>, user_id: Uuid, points: i64) -> MarketResult<User> {
    ensure_positive(points)?;
    let mut user = txn.user(user_id)?;
    if user.frozen_points < points {
        return Err(MarketError::invalid_state("frozen balance below withdrawal amount"));
    }
    user.frozen_points -= points;
    user.balance_points -= points;
    user.updated_at = txn.now();
    txn.put_user(user.clone());
    Ok(user)
}

/// Move available points into the seller deposit.
pub fn move_to_deposit(txn: &mut Txn<'_>, user_id: Uuid, points: i64, at: EntryRef) -> MarketResult<User> {
    let mut user = debit(txn, user_id, EntryKind::Deposit, points, at)?;
    user.deposit_points += points;
    txn.put_user(user.clone());
    Ok(user)
}

/// Move deposit points back to the available balance.
pub fn return_deposit(txn: &mut Txn<'_>, user_id: Uuid, points: i64, at: EntryRef) -> MarketResult<User> {
    ensure_positive(points)?;
    let mut user = txn.user(user_id)?;
    if user.deposit_points < points {
        return Err(MarketError::invalid_state("deposit below refund amount"));
    }
    user.deposit_points -= points;
    txn.put_user(user);
    credit(txn, user_id, EntryKind::DepositRefund, points, at)
}

/// Forfeit up to `points` of a seller deposit to the platform. Returns the
/// amount actually taken, which is capped at the deposit held.
pub fn penalize_deposit(txn: &mut Txn<'_>, seller_id: Uuid, points: i64, at: EntryRef) -> MarketResult<i64> {
    let mut seller = txn.user(seller_id)?;
    let taken = points.min(seller.deposit_points).max(0);
    if taken == 0 {
        return Ok(0);
    }
    seller.deposit_points -= taken;
    seller.updated_at = txn.now();
    record(txn, &seller, EntryKind::Penalty, -taken, seller.deposit_points, at);
    txn.put_user(seller);
    credit(txn, PLATFORM_ACCOUNT, EntryKind::Penalty, taken, at)?;
    Ok(taken)
}
