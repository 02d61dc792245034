//! Seller deposit gate and the points/Pi conversion.

use uuid::Uuid;

use super::ledger::{self, EntryRef};
use super::Txn;
use crate::error::{MarketError, MarketResult};
use crate::models::{
    ComplaintStatus, Deposit, DepositKind, PaymentPurpose, ReviewStatus, UserRole,
};

/// Fixed conversion between one Pi and internal points. The server is the
/// only party that knows it; clients read it from `/users/me`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointsRate {
    points_per_pi: i64,
}

impl PointsRate {
    pub fn new(points_per_pi: i64) -> Self {
        Self {
            points_per_pi: points_per_pi.max(1),
        }
    }

    pub fn points_per_pi(&self) -> i64 {
        self.points_per_pi
    }

    pub fn points_from_whole_pi(&self, pi: i64) -> i64 {
        pi * self.points_per_pi
    }

    /// Points for a wallet amount, rounded to the nearest point.
    pub fn points_from_pi(&self, pi: f64) -> MarketResult<i64> {
        if !pi.is_finite() || pi <= 0.0 {
            return Err(MarketError::Validation(format!("invalid Pi amount {pi}")));
        }
        let points = (pi * self.points_per_pi as f64).round();
        if points < 1.0 || points > i64::MAX as f64 {
            return Err(MarketError::Validation(format!(
                "Pi amount {pi} does not convert to a whole number of points"
            )));
        }
        Ok(points as i64)
    }

    /// Nearest whole Pi, as shown to users.
    pub fn pi_for_display(&self, points: i64) -> i64 {
        (points + self.points_per_pi / 2).div_euclid(self.points_per_pi)
    }

    /// Whole Pi a user must pay to obtain at least `points`.
    pub fn pi_needed(&self, points: i64) -> i64 {
        if points <= 0 {
            return 0;
        }
        (points + self.points_per_pi - 1) / self.points_per_pi
    }
}

fn refund_pending(txn: &Txn<'_>, user_id: Uuid) -> bool {
    !txn
        .deposits_where(|d| {
            d.user_id == user_id && d.kind == DepositKind::Refund && d.status == ReviewStatus::Pending
        })
        .is_empty()
}

/// Fails with `DepositRequired` unless the seller holds the full deposit and
/// has no refund request waiting.
pub fn ensure_deposit(txn: &Txn<'_>, user_id: Uuid) -> MarketResult<()> {
    let user = txn.user(user_id)?;
    let required = txn.settings().required_deposit_points();
    let current = if refund_pending(txn, user_id) {
        0
    } else {
        user.deposit_points
    };
    if current < required {
        return Err(MarketError::DepositRequired { required, current });
    }
    Ok(())
}

fn record_payment(
    txn: &mut Txn<'_>,
    user_id: Uuid,
    points: i64,
    payment_id: Option<String>,
) -> MarketResult<Deposit> {
    let now = txn.now();
    let deposit = Deposit {
        id: Uuid::new_v4(),
        user_id,
        kind: DepositKind::Payment,
        amount_points: points,
        status: ReviewStatus::Approved,
        payment_id,
        note: None,
        created_at: now,
        reviewed_at: Some(now),
    };
    let mut user = ledger::move_to_deposit(txn, user_id, points, EntryRef::record(deposit.id))?;
    if user.deposit_points >= txn.settings().required_deposit_points() && user.role == UserRole::Buyer {
        user.role = UserRole::Seller;
        txn.put_user(user);
    }
    txn.put_deposit(deposit.clone());
    Ok(deposit)
}

fn ensure_no_pending_refund(txn: &Txn<'_>, user_id: Uuid) -> MarketResult<()> {
    if refund_pending(txn, user_id) {
        return Err(MarketError::invalid_state("a deposit refund is waiting for review"));
    }
    Ok(())
}

/// Top the deposit up to the threshold from the available balance.
pub fn pay_from_balance(txn: &mut Txn<'_>, user_id: Uuid) -> MarketResult<Deposit> {
    let user = txn.active_user(user_id)?;
    ensure_no_pending_refund(txn, user_id)?;
    let shortfall = txn.settings().required_deposit_points() - user.deposit_points;
    if shortfall <= 0 {
        return Err(MarketError::invalid_state("deposit is already paid"));
    }
    record_payment(txn, user_id, shortfall, None)
}

/// Move a credited deposit payment into the deposit. Replaying the same
/// payment returns the deposit it already produced.
pub fn pay_with_payment(txn: &mut Txn<'_>, user_id: Uuid, payment_id: &str) -> MarketResult<Deposit> {
    txn.active_user(user_id)?;
    let record = txn
        .payment(payment_id)
        .ok_or_else(|| MarketError::Payment(format!("payment {payment_id} has not been credited")))?;
    if record.user_id != user_id {
        return Err(MarketError::forbidden("payment belongs to another user"));
    }
    if record.purpose != PaymentPurpose::Deposit {
        return Err(MarketError::invalid_state("payment was made for another purpose"));
    }
    if let Some(existing) = txn
        .deposits_where(|d| d.payment_id.as_deref() == Some(payment_id))
        .into_iter()
        .next()
    {
        return Ok(existing);
    }
    ensure_no_pending_refund(txn, user_id)?;
    record_payment(txn, user_id, record.amount_points, Some(record.payment_id))
}

/// Why the deposit cannot be returned right now, if anything.
fn refund_blocker(txn: &Txn<'_>, user_id: Uuid) -> Option<&'static str> {
    if !txn
        .products_where(|p| p.seller_id == user_id && p.is_active)
        .is_empty()
    {
        return Some("deactivate all listings before requesting a deposit refund");
    }
    let open_orders = txn.orders_where(|o| o.seller_id == user_id && o.status.holds_escrow());
    if !open_orders.is_empty() {
        return Some("orders as seller are still open");
    }
    let disputed = txn.complaints_where(|c| {
        c.status == ComplaintStatus::Pending
            && txn
                .order(c.order_id)
                .map(|o| o.seller_id == user_id)
                .unwrap_or(false)
    });
    if !disputed.is_empty() {
        return Some("a complaint against your orders is pending");
    }
    None
}

/// Ask for the deposit back; an admin decides.
pub fn request_refund(txn: &mut Txn<'_>, user_id: Uuid) -> MarketResult<Deposit> {
    let user = txn.active_user(user_id)?;
    if user.deposit_points <= 0 {
        return Err(MarketError::invalid_state("no deposit to refund"));
    }
    ensure_no_pending_refund(txn, user_id)?;
    if let Some(reason) = refund_blocker(txn, user_id) {
        return Err(MarketError::invalid_state(reason));
    }
    let deposit = Deposit {
        id: Uuid::new_v4(),
        user_id,
        kind: DepositKind::Refund,
        amount_points: user.deposit_points,
        status: ReviewStatus::Pending,
        payment_id: None,
        note: None,
        created_at: txn.now(),
        reviewed_at: None,
    };
    txn.put_deposit(deposit.clone());
    Ok(deposit)
}

/// Decide a pending refund request. Approval returns the deposit, capped at
/// what the seller still holds.
pub fn review_refund(
    txn: &mut Txn<'_>,
    deposit_id: Uuid,
    approved: bool,
    note: Option<String>,
) -> MarketResult<Deposit> {
    let mut deposit = txn.deposit(deposit_id)?;
    if deposit.kind != DepositKind::Refund {
        return Err(MarketError::invalid_state("only refund requests are reviewed"));
    }
    if deposit.status != ReviewStatus::Pending {
        return Err(MarketError::AlreadyDecided);
    }

    if approved {
        if let Some(reason) = refund_blocker(txn, deposit.user_id) {
            return Err(MarketError::invalid_state(reason));
        }
        let held = txn.user(deposit.user_id)?.deposit_points;
        let amount = deposit.amount_points.min(held);
        if amount > 0 {
            ledger::return_deposit(txn, deposit.user_id, amount, EntryRef::record(deposit.id))?;
        }
        let mut user = txn.user(deposit.user_id)?;
        if user.role == UserRole::Seller {
            user.role = UserRole::Buyer;
            txn.put_user(user);
        }
        deposit.amount_points = amount;
        deposit.status = ReviewStatus::Approved;
    } else {
        deposit.status = ReviewStatus::Rejected;
    }
    deposit.note = note;
    deposit.reviewed_at = Some(txn.now());
    txn.put_deposit(deposit.clone());
    Ok(deposit)
}
