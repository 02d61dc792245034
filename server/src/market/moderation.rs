//! Listings and the admin review workflows.
//!
//! Every reviewed item moves out of its pending state exactly once; deciding
//! it again fails with `AlreadyDecided`.

use uuid::Uuid;

use super::ledger::{self, EntryRef};
use super::{deposit, orders, Txn};
use crate::error::{MarketError, MarketResult};
use crate::models::{
    Complaint, ComplaintDecision, ComplaintStatus, CreateProductRequest, FavoriteAction,
    FavoriteToggle, PriceModification, PriceModificationRequest, Product, ReviewStatus,
    UpdateProductRequest, User, Withdrawal, WithdrawalAction, WithdrawalRequest,
    WithdrawalStatus, MAX_PRICE_POINTS, PLATFORM_ACCOUNT,
};

fn owned_product(txn: &Txn<'_>, seller_id: Uuid, product_id: Uuid) -> MarketResult<Product> {
    let product = txn.product(product_id)?;
    if product.seller_id != seller_id {
        return Err(MarketError::forbidden("not your product"));
    }
    Ok(product)
}

fn check_price(price_points: i64) -> MarketResult<()> {
    if !(1..=MAX_PRICE_POINTS).contains(&price_points) {
        return Err(MarketError::Validation(format!(
            "price must be between 1 and {MAX_PRICE_POINTS} points"
        )));
    }
    Ok(())
}

/// New listing, waiting for approval. Requires the full seller deposit.
pub fn create_product(
    txn: &mut Txn<'_>,
    seller_id: Uuid,
    req: CreateProductRequest,
) -> MarketResult<Product> {
    txn.active_user(seller_id)?;
    check_price(req.price_points)?;
    deposit::ensure_deposit(txn, seller_id)?;

    let now = txn.now();
    let product = Product {
        id: Uuid::new_v4(),
        seller_id,
        title: req.title,
        subtitle: req.subtitle,
        description: req.description,
        price_points: req.price_points,
        stock: req.stock,
        images: req.images,
        category: req.category,
        delivery_method: req.delivery_method,
        is_active: false,
        moderation: ReviewStatus::Pending,
        review_note: None,
        favorites_count: 0,
        created_at: now,
        updated_at: now,
    };
    txn.put_product(product.clone());
    Ok(product)
}

/// Owner edit. A rejected listing goes back into the review queue.
pub fn update_product(
    txn: &mut Txn<'_>,
    seller_id: Uuid,
    product_id: Uuid,
    req: UpdateProductRequest,
) -> MarketResult<Product> {
    txn.active_user(seller_id)?;
    let mut product = owned_product(txn, seller_id, product_id)?;

    if let Some(title) = req.title {
        product.title = title;
    }
    if let Some(subtitle) = req.subtitle {
        product.subtitle = subtitle;
    }
    if let Some(description) = req.description {
        product.description = description;
    }
    if let Some(category) = req.category {
        product.category = category;
    }
    if let Some(delivery_method) = req.delivery_method {
        product.delivery_method = delivery_method;
    }
    if let Some(images) = req.images {
        product.images = images;
    }
    if let Some(stock) = req.stock {
        if stock < 0 {
            return Err(MarketError::Validation("stock cannot be negative".to_string()));
        }
        product.stock = stock;
        if stock == 0 {
            product.is_active = false;
        }
    }
    if product.moderation == ReviewStatus::Rejected {
        product.moderation = ReviewStatus::Pending;
        product.review_note = None;
    }
    product.updated_at = txn.now();
    txn.put_product(product.clone());
    Ok(product)
}

/// Owner switches a listing on or off. Going on sale passes the deposit gate.
pub fn set_active(
    txn: &mut Txn<'_>,
    seller_id: Uuid,
    product_id: Uuid,
    active: bool,
) -> MarketResult<Product> {
    txn.active_user(seller_id)?;
    let mut product = owned_product(txn, seller_id, product_id)?;
    if active {
        if product.moderation != ReviewStatus::Approved {
            return Err(MarketError::invalid_state("product has not been approved"));
        }
        if product.stock <= 0 {
            return Err(MarketError::invalid_state("product is out of stock"));
        }
        deposit::ensure_deposit(txn, seller_id)?;
    }
    product.is_active = active;
    product.updated_at = txn.now();
    txn.put_product(product.clone());
    Ok(product)
}

pub fn approve_product(txn: &mut Txn<'_>, product_id: Uuid) -> MarketResult<Product> {
    let mut product = txn.product(product_id)?;
    if product.moderation != ReviewStatus::Pending {
        return Err(MarketError::AlreadyDecided);
    }
    product.moderation = ReviewStatus::Approved;
    product.is_active = product.stock > 0 && txn.user(product.seller_id)?.is_active;
    product.review_note = None;
    product.updated_at = txn.now();
    txn.put_product(product.clone());
    Ok(product)
}

pub fn reject_product(
    txn: &mut Txn<'_>,
    product_id: Uuid,
    note: Option<String>,
) -> MarketResult<Product> {
    let mut product = txn.product(product_id)?;
    if product.moderation != ReviewStatus::Pending {
        return Err(MarketError::AlreadyDecided);
    }
    product.moderation = ReviewStatus::Rejected;
    product.is_active = false;
    product.review_note = note;
    product.updated_at = txn.now();
    txn.put_product(product.clone());
    Ok(product)
}

pub fn toggle_favorite(txn: &mut Txn<'_>, user_id: Uuid, product_id: Uuid) -> MarketResult<FavoriteToggle> {
    txn.active_user(user_id)?;
    let mut product = txn.product(product_id)?;
    let action = if txn.is_favorite(user_id, product_id) {
        txn.set_favorite(user_id, product_id, false);
        product.favorites_count = (product.favorites_count - 1).max(0);
        FavoriteAction::Unfavorite
    } else {
        txn.set_favorite(user_id, product_id, true);
        product.favorites_count += 1;
        FavoriteAction::Favorite
    };
    let favorites_count = product.favorites_count;
    txn.put_product(product);
    Ok(FavoriteToggle {
        action,
        favorites_count,
    })
}

/// Seller asks to change the price; one open request per product.
pub fn request_price_change(
    txn: &mut Txn<'_>,
    seller_id: Uuid,
    product_id: Uuid,
    req: PriceModificationRequest,
) -> MarketResult<PriceModification> {
    txn.active_user(seller_id)?;
    let product = owned_product(txn, seller_id, product_id)?;
    check_price(req.new_price)?;
    if req.new_price == product.price_points {
        return Err(MarketError::Validation("price is unchanged".to_string()));
    }
    let open = txn.price_modifications_where(|m| {
        m.product_id == product_id && m.status == ReviewStatus::Pending
    });
    if !open.is_empty() {
        return Err(MarketError::invalid_state(
            "a price change for this product is already waiting for review",
        ));
    }

    let modification = PriceModification {
        id: Uuid::new_v4(),
        product_id,
        seller_id,
        old_price: product.price_points,
        new_price: req.new_price,
        reason: req.reason,
        status: ReviewStatus::Pending,
        reviewer_note: None,
        created_at: txn.now(),
        reviewed_at: None,
    };
    txn.put_price_modification(modification.clone());
    Ok(modification)
}

/// Approval overwrites the listing price. Existing orders keep the amount
/// they were placed at.
pub fn review_price_change(
    txn: &mut Txn<'_>,
    modification_id: Uuid,
    approved: bool,
    note: Option<String>,
) -> MarketResult<PriceModification> {
    let mut modification = txn.price_modification(modification_id)?;
    if modification.status != ReviewStatus::Pending {
        return Err(MarketError::AlreadyDecided);
    }
    if approved {
        let mut product = txn.product(modification.product_id)?;
        product.price_points = modification.new_price;
        product.updated_at = txn.now();
        txn.put_product(product);
        modification.status = ReviewStatus::Approved;
    } else {
        modification.status = ReviewStatus::Rejected;
    }
    modification.reviewer_note = note;
    modification.reviewed_at = Some(txn.now());
    txn.put_price_modification(modification.clone());
    Ok(modification)
}

/// Freeze `amount` of the available balance until an admin decides.
pub fn request_withdrawal(
    txn: &mut Txn<'_>,
    user_id: Uuid,
    req: WithdrawalRequest,
) -> MarketResult<Withdrawal> {
    txn.active_user(user_id)?;
    if req.address.trim().is_empty() {
        return Err(MarketError::Validation("withdrawal address is required".to_string()));
    }
    let withdrawal = Withdrawal {
        id: Uuid::new_v4(),
        user_id,
        amount_points: req.amount_points,
        address: req.address.trim().to_string(),
        status: WithdrawalStatus::Pending,
        created_at: txn.now(),
        reviewed_at: None,
    };
    ledger::freeze(txn, user_id, req.amount_points, EntryRef::record(withdrawal.id))?;
    txn.put_withdrawal(withdrawal.clone());
    Ok(withdrawal)
}

/// `approve` and `reject` act on pending requests, `reject` also on approved
/// ones, and `paid` closes a pending or approved request.
pub fn review_withdrawal(
    txn: &mut Txn<'_>,
    withdrawal_id: Uuid,
    action: WithdrawalAction,
) -> MarketResult<Withdrawal> {
    use WithdrawalStatus::{Approved, Paid, Pending, Rejected};

    let mut withdrawal = txn.withdrawal(withdrawal_id)?;
    let next = match (withdrawal.status, action) {
        (Pending, WithdrawalAction::Approve) => Approved,
        (Pending | Approved, WithdrawalAction::Reject) => Rejected,
        (Pending | Approved, WithdrawalAction::Paid) => Paid,
        (Approved, WithdrawalAction::Approve) | (Rejected | Paid, _) => {
            return Err(MarketError::AlreadyDecided)
        }
    };

    match next {
        Rejected => {
            ledger::unfreeze(
                txn,
                withdrawal.user_id,
                withdrawal.amount_points,
                EntryRef::record(withdrawal.id),
            )?;
        }
        Paid => {
            ledger::pay_out_frozen(txn, withdrawal.user_id, withdrawal.amount_points)?;
        }
        Pending | Approved => {}
    }

    withdrawal.status = next;
    withdrawal.reviewed_at = Some(txn.now());
    txn.put_withdrawal(withdrawal.clone());
    Ok(withdrawal)
}

/// Dispute an open order; one pending complaint per order.
pub fn file_complaint(
    txn: &mut Txn<'_>,
    actor: Uuid,
    order_id: Uuid,
    reason: String,
) -> MarketResult<Complaint> {
    txn.active_user(actor)?;
    let order = txn.order(order_id)?;
    if !order.is_participant(actor) {
        return Err(MarketError::forbidden("not a participant of this order"));
    }
    if !order.status.holds_escrow() {
        return Err(MarketError::invalid_state("only open orders can be disputed"));
    }
    let open = txn.complaints_where(|c| c.order_id == order_id && c.status == ComplaintStatus::Pending);
    if !open.is_empty() {
        return Err(MarketError::invalid_state("this order already has an open complaint"));
    }

    let complaint = Complaint {
        id: Uuid::new_v4(),
        order_id,
        complainant_id: actor,
        reason,
        status: ComplaintStatus::Pending,
        decision: None,
        penalty_points: 0,
        created_at: txn.now(),
        decided_at: None,
    };
    txn.put_complaint(complaint.clone());
    Ok(complaint)
}

/// Arbitration. `refund_and_penalty` refunds the order, forfeits up to
/// `penalty_points` of the seller deposit and counts a violation, all in the
/// calling transaction.
pub fn decide_complaint(
    txn: &mut Txn<'_>,
    complaint_id: Uuid,
    decision: ComplaintDecision,
    penalty_points: i64,
) -> MarketResult<Complaint> {
    let mut complaint = txn.complaint(complaint_id)?;
    if complaint.status != ComplaintStatus::Pending {
        return Err(MarketError::AlreadyDecided);
    }
    if penalty_points < 0 {
        return Err(MarketError::Validation("penalty cannot be negative".to_string()));
    }

    match decision {
        ComplaintDecision::RefundAndPenalty => {
            let order = orders::refund(txn, complaint.order_id)?;
            let at = EntryRef {
                order_id: Some(order.id),
                ref_id: Some(complaint.id),
            };
            let taken = ledger::penalize_deposit(txn, order.seller_id, penalty_points, at)?;
            let mut seller = txn.user(order.seller_id)?;
            seller.violation_count += 1;
            seller.updated_at = txn.now();
            txn.put_user(seller);

            complaint.status = ComplaintStatus::Resolved;
            complaint.penalty_points = taken;
        }
        ComplaintDecision::Reject => {
            complaint.status = ComplaintStatus::Rejected;
        }
    }
    complaint.decision = Some(decision);
    complaint.decided_at = Some(txn.now());
    txn.put_complaint(complaint.clone());
    Ok(complaint)
}

/// Soft-deactivate an account and take its listings off sale. Balances and
/// open orders are left for the admin to settle.
pub fn deactivate_user(txn: &mut Txn<'_>, user_id: Uuid) -> MarketResult<User> {
    if user_id == PLATFORM_ACCOUNT {
        return Err(MarketError::forbidden("the platform account cannot be deactivated"));
    }
    let mut user = txn.user(user_id)?;
    if !user.is_active {
        return Err(MarketError::AlreadyDecided);
    }
    user.is_active = false;
    user.updated_at = txn.now();
    txn.put_user(user.clone());

    for mut product in txn.products_where(|p| p.seller_id == user_id && p.is_active) {
        product.is_active = false;
        product.updated_at = txn.now();
        txn.put_product(product);
    }
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::testkit::{sample_product, Harness};
    use crate::models::{EntryKind, OrderStatus, PLATFORM_ACCOUNT};

    #[test]
    fn new_listing_waits_for_approval() {
        let mut h = Harness::new();
        let (seller, _) = h.seller_with_product("seller", 10, 2);
        let product = h
            .run(|txn| create_product(txn, seller, sample_product(20, 3)))
            .unwrap();
        assert_eq!(product.moderation, ReviewStatus::Pending);
        assert!(!product.is_active);

        let approved = h.run(|txn| approve_product(txn, product.id)).unwrap();
        assert!(approved.is_active);
        assert!(matches!(
            h.run(|txn| reject_product(txn, product.id, None)).unwrap_err(),
            MarketError::AlreadyDecided
        ));
    }

    #[test]
    fn editing_a_rejected_listing_resubmits_it() {
        let mut h = Harness::new();
        let (seller, _) = h.seller_with_product("seller", 10, 2);
        let product = h
            .run(|txn| create_product(txn, seller, sample_product(20, 3)))
            .unwrap();
        h.run(|txn| reject_product(txn, product.id, Some("blurry photos".into())))
            .unwrap();

        let edit = UpdateProductRequest {
            title: None,
            subtitle: None,
            description: None,
            category: None,
            delivery_method: None,
            stock: None,
            images: Some(vec!["https://img/1.png".into()]),
        };
        let edited = h
            .run(|txn| update_product(txn, seller, product.id, edit))
            .unwrap();
        assert_eq!(edited.moderation, ReviewStatus::Pending);
        assert!(edited.review_note.is_none());
    }

    #[test]
    fn only_the_owner_edits() {
        let mut h = Harness::new();
        let (_, product) = h.seller_with_product("seller", 10, 2);
        let other = h.funded_user("other", 0);
        let err = h
            .run(|txn| set_active(txn, other, product, false))
            .unwrap_err();
        assert!(matches!(err, MarketError::Forbidden(_)));
    }

    #[test]
    fn favorites_toggle() {
        let mut h = Harness::new();
        let (_, product) = h.seller_with_product("seller", 10, 2);
        let fan = h.funded_user("fan", 0);

        let on = h.run(|txn| toggle_favorite(txn, fan, product)).unwrap();
        assert_eq!(on.action, FavoriteAction::Favorite);
        assert_eq!(on.favorites_count, 1);
        assert!(h.state.is_favorite(fan, product));

        let off = h.run(|txn| toggle_favorite(txn, fan, product)).unwrap();
        assert_eq!(off.action, FavoriteAction::Unfavorite);
        assert_eq!(off.favorites_count, 0);
        assert!(!h.state.is_favorite(fan, product));
    }

    #[test]
    fn approving_a_deactivated_sellers_listing_keeps_it_off_sale() {
        let mut h = Harness::new();
        let (seller, _) = h.seller_with_product("seller", 10, 2);
        let pending = h
            .run(|txn| create_product(txn, seller, sample_product(20, 3)))
            .unwrap();
        h.run(|txn| deactivate_user(txn, seller)).unwrap();

        let approved = h.run(|txn| approve_product(txn, pending.id)).unwrap();
        assert_eq!(approved.moderation, ReviewStatus::Approved);
        assert!(!approved.is_active);
        assert!(!h.state.product(pending.id).unwrap().is_listed());
    }

    #[test]
    fn prices_outside_the_listing_range_are_rejected() {
        let mut h = Harness::new();
        let (seller, product) = h.seller_with_product("seller", 10, 2);

        let err = h
            .run(|txn| create_product(txn, seller, sample_product(MAX_PRICE_POINTS + 1, 1)))
            .unwrap_err();
        assert!(matches!(err, MarketError::Validation(_)));

        let request = PriceModificationRequest {
            new_price: i64::MAX / 100,
            reason: "bulk".into(),
        };
        assert!(matches!(
            h.run(|txn| request_price_change(txn, seller, product, request))
                .unwrap_err(),
            MarketError::Validation(_)
        ));

        let over = PriceModificationRequest {
            new_price: MAX_PRICE_POINTS + 1,
            reason: "bulk".into(),
        };
        assert!(validator::Validate::validate(&over).is_err());
    }

    #[test]
    fn approved_price_change_applies_to_new_orders_only() {
        let mut h = Harness::new();
        let (seller, product) = h.seller_with_product("seller", 100, 5);
        let buyer = h.funded_user("buyer", 500);
        let early = h
            .run(|txn| orders::place_order(txn, buyer, product, None))
            .unwrap()
            .order;

        let request = PriceModificationRequest {
            new_price: 150,
            reason: "supplier raised prices".into(),
        };
        let modification = h
            .run(|txn| request_price_change(txn, seller, product, request))
            .unwrap();
        let duplicate = PriceModificationRequest {
            new_price: 120,
            reason: "again".into(),
        };
        assert!(matches!(
            h.run(|txn| request_price_change(txn, seller, product, duplicate))
                .unwrap_err(),
            MarketError::InvalidState(_)
        ));

        h.run(|txn| review_price_change(txn, modification.id, true, None))
            .unwrap();
        assert_eq!(h.state.product(product).unwrap().price_points, 150);
        assert_eq!(h.order(early.id).amount_points, 100);
        assert!(matches!(
            h.run(|txn| review_price_change(txn, modification.id, false, None))
                .unwrap_err(),
            MarketError::AlreadyDecided
        ));
    }

    #[test]
    fn withdrawal_lifecycle() {
        let mut h = Harness::new();
        let user = h.funded_user("alice", 300);
        let request = || WithdrawalRequest {
            amount_points: 200,
            address: "GABC".into(),
        };

        let w = h.run(|txn| request_withdrawal(txn, user, request())).unwrap();
        assert_eq!(h.user(user).available_points(), 100);
        assert!(matches!(
            h.run(|txn| request_withdrawal(txn, user, request())).unwrap_err(),
            MarketError::InsufficientBalance { .. }
        ));

        h.run(|txn| review_withdrawal(txn, w.id, WithdrawalAction::Approve))
            .unwrap();
        let paid = h
            .run(|txn| review_withdrawal(txn, w.id, WithdrawalAction::Paid))
            .unwrap();
        assert_eq!(paid.status, WithdrawalStatus::Paid);
        assert_eq!(h.user(user).balance_points, 100);
        assert_eq!(h.user(user).frozen_points, 0);
        h.assert_conserved();

        for action in [
            WithdrawalAction::Approve,
            WithdrawalAction::Reject,
            WithdrawalAction::Paid,
        ] {
            assert!(matches!(
                h.run(|txn| review_withdrawal(txn, w.id, action)).unwrap_err(),
                MarketError::AlreadyDecided
            ));
        }
    }

    #[test]
    fn rejected_withdrawal_unfreezes() {
        let mut h = Harness::new();
        let user = h.funded_user("alice", 300);
        let w = h
            .run(|txn| {
                request_withdrawal(
                    txn,
                    user,
                    WithdrawalRequest {
                        amount_points: 300,
                        address: "GABC".into(),
                    },
                )
            })
            .unwrap();

        h.run(|txn| review_withdrawal(txn, w.id, WithdrawalAction::Reject))
            .unwrap();
        assert_eq!(h.user(user).available_points(), 300);
        assert_eq!(
            h.state.ledger().last().map(|e| e.kind),
            Some(EntryKind::WithdrawalReturned)
        );
        h.assert_conserved();
    }

    #[test]
    fn refund_and_penalty_lands_together() {
        let mut h = Harness::new();
        let (seller, product) = h.seller_with_product("seller", 100, 5);
        let buyer = h.funded_user("buyer", 100);
        let order = h
            .run(|txn| orders::place_order(txn, buyer, product, None))
            .unwrap()
            .order;
        h.run(|txn| orders::ship(txn, order.id, seller)).unwrap();
        let complaint = h
            .run(|txn| file_complaint(txn, buyer, order.id, "never arrived".into()))
            .unwrap();

        let decided = h
            .run(|txn| {
                decide_complaint(txn, complaint.id, ComplaintDecision::RefundAndPenalty, 1000)
            })
            .unwrap();

        assert_eq!(decided.status, ComplaintStatus::Resolved);
        assert_eq!(decided.penalty_points, 1000);
        assert_eq!(h.order(order.id).status, OrderStatus::Refunded);
        assert_eq!(h.user(buyer).balance_points, 100);
        assert_eq!(h.user(seller).deposit_points, 0);
        assert_eq!(h.user(seller).violation_count, 1);
        assert_eq!(h.user(PLATFORM_ACCOUNT).balance_points, 1000);
        h.assert_conserved();

        assert!(matches!(
            h.run(|txn| decide_complaint(txn, complaint.id, ComplaintDecision::Reject, 0))
                .unwrap_err(),
            MarketError::AlreadyDecided
        ));
    }

    #[test]
    fn complaint_on_settled_order_cannot_refund() {
        let mut h = Harness::new();
        let (_, product) = h.seller_with_product("seller", 100, 5);
        let buyer = h.funded_user("buyer", 100);
        let order = h
            .run(|txn| orders::place_order(txn, buyer, product, None))
            .unwrap()
            .order;
        let complaint = h
            .run(|txn| file_complaint(txn, buyer, order.id, "wrong item".into()))
            .unwrap();
        h.run(|txn| orders::settle(txn, order.id)).unwrap();
        let ledger_len = h.state.ledger().len();

        let err = h
            .run(|txn| {
                decide_complaint(txn, complaint.id, ComplaintDecision::RefundAndPenalty, 10)
            })
            .unwrap_err();
        assert!(matches!(err, MarketError::InvalidState(_)));
        assert_eq!(h.state.ledger().len(), ledger_len);
        assert_eq!(h.state.complaints().next().unwrap().status, ComplaintStatus::Pending);
    }

    #[test]
    fn outsiders_cannot_complain() {
        let mut h = Harness::new();
        let (_, product) = h.seller_with_product("seller", 100, 5);
        let buyer = h.funded_user("buyer", 100);
        let outsider = h.funded_user("outsider", 0);
        let order = h
            .run(|txn| orders::place_order(txn, buyer, product, None))
            .unwrap()
            .order;
        let err = h
            .run(|txn| file_complaint(txn, outsider, order.id, "spam".into()))
            .unwrap_err();
        assert!(matches!(err, MarketError::Forbidden(_)));
    }

    #[test]
    fn deactivated_seller_is_delisted_and_locked_out() {
        let mut h = Harness::new();
        let (seller, product) = h.seller_with_product("seller", 100, 5);

        h.run(|txn| deactivate_user(txn, seller)).unwrap();
        assert!(!h.user(seller).is_active);
        assert!(!h.state.product(product).unwrap().is_active);

        let err = h
            .run(|txn| set_active(txn, seller, product, true))
            .unwrap_err();
        assert!(matches!(err, MarketError::Forbidden(_)));
        assert!(h.run(|txn| deactivate_user(txn, PLATFORM_ACCOUNT)).is_err());
    }
}
