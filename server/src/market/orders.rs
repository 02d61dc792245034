//! Order state machine.
//!
//! ```text
//! paid ──ship──▶ shipped ──confirm/settle──▶ completed
//!  │  └──────────settle──────────────────────▲
//!  ├──cancel──▶ canceled
//!  └──refund──▶ refunded ◀──refund── shipped
//! ```
//!
//! Every transition checks the current status before touching the escrow
//! slot, so release and refund can never both happen for one order.

use uuid::Uuid;

use super::{escrow, Txn};
use crate::error::{MarketError, MarketResult};
use crate::models::{Order, OrderStatus, PaymentPurpose};

/// Outcome of placing an order
#[derive(Debug, Clone)]
pub struct Placement {
    pub order: Order,
    /// The payment id had already produced this order; nothing changed
    pub replayed: bool,
}

/// Buy one unit of `product_id`. With a `payment_id`, the payment must
/// already be credited to the buyer for this purpose; a payment that already
/// produced an order replays that order instead of buying again.
pub fn place_order(
    txn: &mut Txn<'_>,
    buyer_id: Uuid,
    product_id: Uuid,
    payment_id: Option<&str>,
) -> MarketResult<Placement> {
    txn.active_user(buyer_id)?;

    let mut payment = match payment_id {
        Some(id) => {
            let record = txn
                .payment(id)
                .ok_or_else(|| MarketError::Payment(format!("payment {id} has not been credited")))?;
            if record.user_id != buyer_id {
                return Err(MarketError::forbidden("payment belongs to another user"));
            }
            if record.purpose != PaymentPurpose::Order {
                return Err(MarketError::invalid_state("payment was made for another purpose"));
            }
            if let Some(order_id) = record.order_id {
                return Ok(Placement {
                    order: txn.order(order_id)?,
                    replayed: true,
                });
            }
            Some(record)
        }
        None => None,
    };

    let mut product = txn.product(product_id)?;
    if !product.is_listed() {
        return Err(MarketError::invalid_state("product is not on sale"));
    }
    if product.seller_id == buyer_id {
        return Err(MarketError::forbidden("sellers cannot buy their own listing"));
    }
    if !txn.user(product.seller_id)?.is_active {
        return Err(MarketError::invalid_state("seller account is deactivated"));
    }

    let now = txn.now();
    let amount = product.price_points;
    let mut order = Order {
        id: Uuid::new_v4(),
        product_id,
        product_title: product.title.clone(),
        buyer_id,
        seller_id: product.seller_id,
        amount_points: amount,
        fee_points: txn.settings().fee_for(amount),
        escrow_points: 0,
        status: OrderStatus::Paid,
        payment_id: payment.as_ref().map(|p| p.payment_id.clone()),
        created_at: now,
        shipped_at: None,
        completed_at: None,
        closed_at: None,
        updated_at: now,
    };
    escrow::hold(txn, &mut order)?;

    product.stock -= 1;
    if product.stock == 0 {
        product.is_active = false;
    }
    product.updated_at = now;
    txn.put_product(product);

    if let Some(record) = payment.as_mut() {
        record.order_id = Some(order.id);
        txn.put_payment(record.clone());
    }
    txn.put_order(order.clone());

    Ok(Placement {
        order,
        replayed: false,
    })
}

/// Seller marks a paid order as shipped.
pub fn ship(txn: &mut Txn<'_>, order_id: Uuid, actor: Uuid) -> MarketResult<Order> {
    let mut order = txn.order(order_id)?;
    if actor != order.seller_id {
        return Err(MarketError::forbidden("only the seller can ship this order"));
    }
    if order.status != OrderStatus::Paid {
        return Err(MarketError::invalid_state(format!(
            "cannot ship an order that is {:?}",
            order.status
        )));
    }
    order.status = OrderStatus::Shipped;
    order.shipped_at = Some(txn.now());
    order.updated_at = txn.now();
    txn.put_order(order.clone());
    Ok(order)
}

/// Buyer confirms receipt; escrow goes to the seller.
pub fn confirm(txn: &mut Txn<'_>, order_id: Uuid, actor: Uuid) -> MarketResult<Order> {
    let order = txn.order(order_id)?;
    if actor != order.buyer_id {
        return Err(MarketError::forbidden("only the buyer can confirm this order"));
    }
    if order.status != OrderStatus::Shipped {
        return Err(MarketError::invalid_state(format!(
            "cannot confirm an order that is {:?}",
            order.status
        )));
    }
    complete(txn, order)
}

/// Admin completes an open order regardless of buyer action.
pub fn settle(txn: &mut Txn<'_>, order_id: Uuid) -> MarketResult<Order> {
    let order = txn.order(order_id)?;
    if order.status.is_terminal() {
        return Err(MarketError::invalid_state(format!(
            "order is already {:?}",
            order.status
        )));
    }
    complete(txn, order)
}

fn complete(txn: &mut Txn<'_>, mut order: Order) -> MarketResult<Order> {
    escrow::release(txn, &mut order)?;
    order.status = OrderStatus::Completed;
    order.completed_at = Some(txn.now());
    order.updated_at = txn.now();
    txn.put_order(order.clone());
    Ok(order)
}

/// Admin refund of a paid or shipped order.
pub fn refund(txn: &mut Txn<'_>, order_id: Uuid) -> MarketResult<Order> {
    let order = txn.order(order_id)?;
    if !order.status.holds_escrow() {
        return Err(MarketError::invalid_state(format!(
            "cannot refund an order that is {:?}",
            order.status
        )));
    }
    close(txn, order, OrderStatus::Refunded)
}

/// Buyer cancels before the seller ships.
pub fn cancel(txn: &mut Txn<'_>, order_id: Uuid, actor: Uuid) -> MarketResult<Order> {
    let order = txn.order(order_id)?;
    if actor != order.buyer_id {
        return Err(MarketError::forbidden("only the buyer can cancel this order"));
    }
    if order.status != OrderStatus::Paid {
        return Err(MarketError::invalid_state(format!(
            "cannot cancel an order that is {:?}",
            order.status
        )));
    }
    close(txn, order, OrderStatus::Canceled)
}

fn close(txn: &mut Txn<'_>, mut order: Order, status: OrderStatus) -> MarketResult<Order> {
    escrow::refund(txn, &mut order)?;
    order.status = status;
    order.closed_at = Some(txn.now());
    order.updated_at = txn.now();

    // the unit goes back on the shelf; relisting stays with the seller
    let mut product = txn.product(order.product_id)?;
    product.stock += 1;
    product.updated_at = txn.now();
    txn.put_product(product);

    txn.put_order(order.clone());
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::testkit::Harness;
    use crate::market::MarketSettings;
    use crate::models::{EntryKind, MAX_PRICE_POINTS, PLATFORM_ACCOUNT};

    fn open_order(h: &mut Harness, price: i64) -> (Uuid, Uuid, Uuid) {
        let (seller, product) = h.seller_with_product("seller", price, 5);
        let buyer = h.funded_user("buyer", price);
        let order = h.run(|txn| place_order(txn, buyer, product, None)).unwrap().order;
        (buyer, seller, order.id)
    }

    #[test]
    fn purchase_without_funds_creates_nothing() {
        let mut h = Harness::new();
        let (_, product) = h.seller_with_product("seller", 100, 5);
        let buyer = h.funded_user("buyer", 0);

        let err = h
            .run(|txn| place_order(txn, buyer, product, None))
            .unwrap_err();
        assert!(matches!(err, MarketError::InsufficientBalance { required: 100, available: 0 }));
        assert_eq!(h.state.orders().count(), 0);
        assert_eq!(h.state.product(product).unwrap().stock, 5);
    }

    #[test]
    fn fee_stays_within_the_amount_for_any_price() {
        let settings = MarketSettings::default();
        assert_eq!(settings.fee_for(i64::MAX), i64::MAX / 20);
        let everything = MarketSettings {
            platform_fee_bps: 10_000,
            ..settings
        };
        assert_eq!(everything.fee_for(i64::MAX), i64::MAX);
        assert_eq!(settings.fee_for(19), 0);
        assert_eq!(settings.fee_for(20), 1);
    }

    #[test]
    fn top_priced_listing_fails_cleanly_for_a_broke_buyer() {
        let mut h = Harness::new();
        let (_, product) = h.seller_with_product("seller", MAX_PRICE_POINTS, 1);
        let buyer = h.funded_user("buyer", 0);

        let err = h
            .run(|txn| place_order(txn, buyer, product, None))
            .unwrap_err();
        assert!(matches!(err, MarketError::InsufficientBalance { required: MAX_PRICE_POINTS, .. }));
        assert_eq!(h.state.orders().count(), 0);
    }

    #[test]
    fn placing_an_order_moves_funds_into_escrow() {
        let mut h = Harness::new();
        let (buyer, _, order_id) = open_order(&mut h, 100);

        let order = h.order(order_id);
        assert_eq!(order.status, OrderStatus::Paid);
        assert_eq!(order.amount_points, 100);
        assert_eq!(order.fee_points, 5);
        assert_eq!(order.escrow_points, 100);
        assert_eq!(h.user(buyer).balance_points, 0);
        h.assert_conserved();
    }

    #[test]
    fn confirm_releases_escrow_minus_fee() {
        let mut h = Harness::new();
        let (buyer, seller, order_id) = open_order(&mut h, 100);
        let seller_before = h.user(seller).balance_points;

        h.run(|txn| ship(txn, order_id, seller)).unwrap();
        h.run(|txn| confirm(txn, order_id, buyer)).unwrap();

        let order = h.order(order_id);
        assert_eq!(order.status, OrderStatus::Completed);
        assert_eq!(order.escrow_points, 0);
        assert!(order.completed_at.is_some());
        assert_eq!(h.user(seller).balance_points, seller_before + 95);
        assert_eq!(h.user(PLATFORM_ACCOUNT).balance_points, 5);
        h.assert_conserved();
    }

    #[test]
    fn second_confirm_pays_nothing() {
        let mut h = Harness::new();
        let (buyer, seller, order_id) = open_order(&mut h, 100);
        h.run(|txn| ship(txn, order_id, seller)).unwrap();
        h.run(|txn| confirm(txn, order_id, buyer)).unwrap();
        let entries = h.state.ledger().len();
        let seller_balance = h.user(seller).balance_points;

        let err = h.run(|txn| confirm(txn, order_id, buyer)).unwrap_err();
        assert!(matches!(err, MarketError::InvalidState(_)));
        assert_eq!(h.state.ledger().len(), entries);
        assert_eq!(h.user(seller).balance_points, seller_balance);
    }

    #[test]
    fn ship_by_non_seller_is_forbidden() {
        let mut h = Harness::new();
        let (buyer, _, order_id) = open_order(&mut h, 100);

        let err = h.run(|txn| ship(txn, order_id, buyer)).unwrap_err();
        assert!(matches!(err, MarketError::Forbidden(_)));
        assert_eq!(h.order(order_id).status, OrderStatus::Paid);
    }

    #[test]
    fn confirm_requires_shipped() {
        let mut h = Harness::new();
        let (buyer, _, order_id) = open_order(&mut h, 100);

        let err = h.run(|txn| confirm(txn, order_id, buyer)).unwrap_err();
        assert!(matches!(err, MarketError::InvalidState(_)));
    }

    #[test]
    fn refund_of_shipped_order_returns_escrow_to_buyer() {
        let mut h = Harness::new();
        let (buyer, seller, order_id) = open_order(&mut h, 100);
        let seller_before = h.user(seller).balance_points;
        h.run(|txn| ship(txn, order_id, seller)).unwrap();

        h.run(|txn| refund(txn, order_id)).unwrap();

        let order = h.order(order_id);
        assert_eq!(order.status, OrderStatus::Refunded);
        assert_eq!(order.escrow_points, 0);
        assert_eq!(h.user(buyer).balance_points, 100);
        assert_eq!(h.user(seller).balance_points, seller_before);
        assert!(!h
            .state
            .ledger()
            .iter()
            .any(|e| e.kind == EntryKind::OrderIncome));
        h.assert_conserved();
    }

    #[test]
    fn release_and_refund_are_mutually_exclusive() {
        let mut h = Harness::new();
        let (_, _, settled) = open_order(&mut h, 100);
        h.run(|txn| settle(txn, settled)).unwrap();
        assert!(matches!(
            h.run(|txn| refund(txn, settled)).unwrap_err(),
            MarketError::InvalidState(_)
        ));
        assert!(matches!(
            h.run(|txn| settle(txn, settled)).unwrap_err(),
            MarketError::InvalidState(_)
        ));

        let buyer = h.funded_user("second", 100);
        let product = h.state.orders().next().unwrap().product_id;
        let refunded = h.run(|txn| place_order(txn, buyer, product, None)).unwrap().order.id;
        h.run(|txn| refund(txn, refunded)).unwrap();
        assert!(matches!(
            h.run(|txn| settle(txn, refunded)).unwrap_err(),
            MarketError::InvalidState(_)
        ));
        h.assert_conserved();
    }

    #[test]
    fn cancel_only_before_shipping() {
        let mut h = Harness::new();
        let (buyer, seller, order_id) = open_order(&mut h, 100);
        assert!(matches!(
            h.run(|txn| cancel(txn, order_id, seller)).unwrap_err(),
            MarketError::Forbidden(_)
        ));

        h.run(|txn| cancel(txn, order_id, buyer)).unwrap();
        assert_eq!(h.order(order_id).status, OrderStatus::Canceled);
        assert_eq!(h.user(buyer).balance_points, 100);
        assert_eq!(h.state.product(h.order(order_id).product_id).unwrap().stock, 5);
        h.assert_conserved();
    }

    #[test]
    fn last_unit_delists_the_product() {
        let mut h = Harness::new();
        let (_, product) = h.seller_with_product("seller", 10, 1);
        let buyer = h.funded_user("buyer", 50);

        h.run(|txn| place_order(txn, buyer, product, None)).unwrap();
        let listing = h.state.product(product).unwrap();
        assert_eq!(listing.stock, 0);
        assert!(!listing.is_active);

        let err = h.run(|txn| place_order(txn, buyer, product, None)).unwrap_err();
        assert!(matches!(err, MarketError::InvalidState(_)));
    }

    #[test]
    fn sellers_cannot_buy_their_own_listing() {
        let mut h = Harness::new();
        let (seller, product) = h.seller_with_product("seller", 10, 1);
        let err = h.run(|txn| place_order(txn, seller, product, None)).unwrap_err();
        assert!(matches!(err, MarketError::Forbidden(_)));
    }

    #[test]
    fn every_terminal_order_pays_exactly_one_side() {
        let mut h = Harness::new();
        let (seller, product) = h.seller_with_product("seller", 40, 10);
        let buyer = h.funded_user("buyer", 400);

        let mut ids = Vec::new();
        for _ in 0..5 {
            ids.push(h.run(|txn| place_order(txn, buyer, product, None)).unwrap().order.id);
        }
        h.run(|txn| ship(txn, ids[0], seller)).unwrap();
        h.run(|txn| confirm(txn, ids[0], buyer)).unwrap();
        h.run(|txn| settle(txn, ids[1])).unwrap();
        h.run(|txn| refund(txn, ids[2])).unwrap();
        h.run(|txn| cancel(txn, ids[3], buyer)).unwrap();
        h.run(|txn| ship(txn, ids[4], seller)).unwrap();
        h.run(|txn| refund(txn, ids[4])).unwrap();

        for id in ids {
            let order = h.order(id);
            assert!(order.status.is_terminal());
            assert_eq!(order.escrow_points, 0);
            let paid_seller = h
                .state
                .ledger()
                .iter()
                .any(|e| e.order_id == Some(id) && e.kind == EntryKind::OrderIncome);
            let refunded_buyer = h
                .state
                .ledger()
                .iter()
                .any(|e| e.order_id == Some(id) && e.kind == EntryKind::Refund);
            assert!(paid_seller ^ refunded_buyer, "order {id} paid both or neither");
        }
        h.assert_conserved();
    }
}
