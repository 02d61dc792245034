//! Marketplace engine: points ledger, per-order escrow, the order state
//! machine and the admin moderation workflows.
//!
//! Every write runs inside a [`Txn`]: reads go through to the committed
//! [`MarketState`], writes are staged in a [`Changeset`]. A changeset is
//! applied to the state only after it has been persisted, so an operation
//! either lands completely or not at all.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{MarketError, MarketResult};
use crate::models::{
    ChatMessage, Complaint, Deposit, LedgerEntry, Order, OrderStatus, PaymentRecord,
    PriceModification, Product, User, Withdrawal, PLATFORM_ACCOUNT,
};

pub mod deposit;
pub mod escrow;
pub mod ledger;
pub mod moderation;
pub mod orders;
pub mod payments;

pub use deposit::PointsRate;
pub use payments::{PaymentEvent, VerifiedPayment};

/// Marketplace constants resolved from configuration
#[derive(Debug, Clone, Copy)]
pub struct MarketSettings {
    pub rate: PointsRate,
    pub seller_deposit_pi: i64,
    pub platform_fee_bps: i64,
}

impl MarketSettings {
    pub fn required_deposit_points(&self) -> i64 {
        self.rate.points_from_whole_pi(self.seller_deposit_pi)
    }

    /// Platform fee for an order amount, rounded down and never more than
    /// the amount itself.
    pub fn fee_for(&self, amount_points: i64) -> i64 {
        let amount = i128::from(amount_points.max(0));
        let fee = (amount * i128::from(self.platform_fee_bps) / 10_000).clamp(0, amount);
        i64::try_from(fee).unwrap_or(amount_points)
    }
}

impl Default for MarketSettings {
    fn default() -> Self {
        Self {
            rate: PointsRate::new(1),
            seller_deposit_pi: 1000,
            platform_fee_bps: 500,
        }
    }
}

/// Committed marketplace state
#[derive(Debug, Clone)]
pub struct MarketState {
    pub(crate) users: HashMap<Uuid, User>,
    pub(crate) products: HashMap<Uuid, Product>,
    pub(crate) price_modifications: HashMap<Uuid, PriceModification>,
    pub(crate) orders: HashMap<Uuid, Order>,
    pub(crate) withdrawals: HashMap<Uuid, Withdrawal>,
    pub(crate) deposits: HashMap<Uuid, Deposit>,
    pub(crate) complaints: HashMap<Uuid, Complaint>,
    pub(crate) payments: HashMap<String, PaymentRecord>,
    pub(crate) favorites: HashSet<(Uuid, Uuid)>,
    pub(crate) ledger: Vec<LedgerEntry>,
}

impl MarketState {
    /// Empty marketplace holding only the platform account.
    pub fn new(now: DateTime<Utc>) -> Self {
        let mut users = HashMap::new();
        users.insert(PLATFORM_ACCOUNT, User::platform(now));
        Self {
            users,
            products: HashMap::new(),
            price_modifications: HashMap::new(),
            orders: HashMap::new(),
            withdrawals: HashMap::new(),
            deposits: HashMap::new(),
            complaints: HashMap::new(),
            payments: HashMap::new(),
            favorites: HashSet::new(),
            ledger: Vec::new(),
        }
    }

    /// Apply a persisted changeset.
    pub fn apply(&mut self, changes: Changeset) {
        self.users.extend(changes.users);
        self.products.extend(changes.products);
        self.price_modifications.extend(changes.price_modifications);
        self.orders
            .extend(changes.orders.into_iter().map(|(id, staged)| (id, staged.order)));
        self.withdrawals.extend(changes.withdrawals);
        self.deposits.extend(changes.deposits);
        self.complaints.extend(changes.complaints);
        self.payments.extend(changes.payments);
        for key in changes.favorites_removed {
            self.favorites.remove(&key);
        }
        self.favorites.extend(changes.favorites_added);
        self.ledger.extend(changes.ledger);
    }

    pub fn user(&self, id: Uuid) -> Option<&User> {
        self.users.get(&id)
    }

    pub fn user_by_wallet(&self, wallet_uid: &str) -> Option<&User> {
        self.users
            .values()
            .find(|u| u.wallet_uid.as_deref() == Some(wallet_uid))
    }

    pub fn product(&self, id: Uuid) -> Option<&Product> {
        self.products.get(&id)
    }

    pub fn order(&self, id: Uuid) -> Option<&Order> {
        self.orders.get(&id)
    }

    pub fn payment(&self, payment_id: &str) -> Option<&PaymentRecord> {
        self.payments.get(payment_id)
    }

    pub fn products(&self) -> impl Iterator<Item = &Product> {
        self.products.values()
    }

    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    pub fn price_modifications(&self) -> impl Iterator<Item = &PriceModification> {
        self.price_modifications.values()
    }

    pub fn withdrawals(&self) -> impl Iterator<Item = &Withdrawal> {
        self.withdrawals.values()
    }

    pub fn deposits(&self) -> impl Iterator<Item = &Deposit> {
        self.deposits.values()
    }

    pub fn complaints(&self) -> impl Iterator<Item = &Complaint> {
        self.complaints.values()
    }

    pub fn ledger(&self) -> &[LedgerEntry] {
        &self.ledger
    }

    pub fn is_favorite(&self, user_id: Uuid, product_id: Uuid) -> bool {
        self.favorites.contains(&(user_id, product_id))
    }

    /// Points held on accounts, deposits and open escrows. Equals the sum of
    /// credited payments minus paid-out withdrawals.
    pub fn points_in_custody(&self) -> i64 {
        let accounts: i64 = self
            .users
            .values()
            .map(|u| u.balance_points + u.deposit_points)
            .sum();
        let escrow: i64 = self.orders.values().map(|o| o.escrow_points).sum();
        accounts + escrow
    }
}

/// An order row staged for write, with the status it was read at. The
/// journal uses `expected` as the compare-and-swap precondition.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedOrder {
    pub order: Order,
    pub expected: Option<OrderStatus>,
}

/// Rows written by one transaction
#[derive(Debug, Default, Clone)]
pub struct Changeset {
    pub users: HashMap<Uuid, User>,
    pub products: HashMap<Uuid, Product>,
    pub price_modifications: HashMap<Uuid, PriceModification>,
    pub orders: HashMap<Uuid, StagedOrder>,
    pub withdrawals: HashMap<Uuid, Withdrawal>,
    pub deposits: HashMap<Uuid, Deposit>,
    pub complaints: HashMap<Uuid, Complaint>,
    pub payments: HashMap<String, PaymentRecord>,
    pub favorites_added: Vec<(Uuid, Uuid)>,
    pub favorites_removed: Vec<(Uuid, Uuid)>,
    pub ledger: Vec<LedgerEntry>,
    pub messages: Vec<ChatMessage>,
}

impl Changeset {
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
            && self.products.is_empty()
            && self.price_modifications.is_empty()
            && self.orders.is_empty()
            && self.withdrawals.is_empty()
            && self.deposits.is_empty()
            && self.complaints.is_empty()
            && self.payments.is_empty()
            && self.favorites_added.is_empty()
            && self.favorites_removed.is_empty()
            && self.ledger.is_empty()
            && self.messages.is_empty()
    }
}

/// Staged read-your-writes view over the committed state
pub struct Txn<'a> {
    base: &'a MarketState,
    settings: &'a MarketSettings,
    now: DateTime<Utc>,
    changes: Changeset,
}

macro_rules! staged_rows {
    ($get:ident, $put:ident, $field:ident, $ty:ty, $what:literal) => {
        pub fn $get(&self, id: Uuid) -> MarketResult<$ty> {
            self.changes
                .$field
                .get(&id)
                .or_else(|| self.base.$field.get(&id))
                .cloned()
                .ok_or(MarketError::NotFound($what))
        }

        pub fn $put(&mut self, row: $ty) {
            self.changes.$field.insert(row.id, row);
        }
    };
}

impl<'a> Txn<'a> {
    pub fn new(base: &'a MarketState, settings: &'a MarketSettings, now: DateTime<Utc>) -> Self {
        Self {
            base,
            settings,
            now,
            changes: Changeset::default(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn settings(&self) -> &MarketSettings {
        self.settings
    }

    pub fn into_changes(self) -> Changeset {
        self.changes
    }

    staged_rows!(user, put_user, users, User, "user");
    staged_rows!(product, put_product, products, Product, "product");
    staged_rows!(price_modification, put_price_modification, price_modifications, PriceModification, "price modification");
    staged_rows!(withdrawal, put_withdrawal, withdrawals, Withdrawal, "withdrawal");
    staged_rows!(deposit, put_deposit, deposits, Deposit, "deposit");
    staged_rows!(complaint, put_complaint, complaints, Complaint, "complaint");

    pub fn order(&self, id: Uuid) -> MarketResult<Order> {
        self.changes
            .orders
            .get(&id)
            .map(|staged| &staged.order)
            .or_else(|| self.base.orders.get(&id))
            .cloned()
            .ok_or(MarketError::NotFound("order"))
    }

    pub fn put_order(&mut self, order: Order) {
        let expected = self.base.orders.get(&order.id).map(|o| o.status);
        self.changes
            .orders
            .insert(order.id, StagedOrder { order, expected });
    }

    /// Active user, or `Forbidden` for a deactivated account.
    pub fn active_user(&self, id: Uuid) -> MarketResult<User> {
        let user = self.user(id)?;
        if !user.is_active {
            return Err(MarketError::forbidden("account is deactivated"));
        }
        Ok(user)
    }

    pub fn user_by_wallet(&self, wallet_uid: &str) -> Option<User> {
        let matches = |u: &&User| u.wallet_uid.as_deref() == Some(wallet_uid);
        self.changes
            .users
            .values()
            .find(matches)
            .or_else(|| {
                self.base
                    .users
                    .values()
                    .filter(|u| !self.changes.users.contains_key(&u.id))
                    .find(matches)
            })
            .cloned()
    }

    pub fn payment(&self, payment_id: &str) -> Option<PaymentRecord> {
        self.changes
            .payments
            .get(payment_id)
            .or_else(|| self.base.payments.get(payment_id))
            .cloned()
    }

    pub fn put_payment(&mut self, record: PaymentRecord) {
        self.changes
            .payments
            .insert(record.payment_id.clone(), record);
    }

    pub fn is_favorite(&self, user_id: Uuid, product_id: Uuid) -> bool {
        let key = (user_id, product_id);
        if self.changes.favorites_removed.contains(&key) {
            return false;
        }
        self.changes.favorites_added.contains(&key) || self.base.favorites.contains(&key)
    }

    pub fn set_favorite(&mut self, user_id: Uuid, product_id: Uuid, on: bool) {
        let key = (user_id, product_id);
        self.changes.favorites_added.retain(|k| *k != key);
        self.changes.favorites_removed.retain(|k| *k != key);
        if on {
            self.changes.favorites_added.push(key);
        } else {
            self.changes.favorites_removed.push(key);
        }
    }

    pub(crate) fn push_entry(&mut self, entry: LedgerEntry) {
        self.changes.ledger.push(entry);
    }

    /// Orders as of this transaction, staged rows taking precedence.
    pub fn orders_where(&self, pred: impl Fn(&Order) -> bool) -> Vec<Order> {
        let mut out: Vec<Order> = self
            .changes
            .orders
            .values()
            .map(|s| &s.order)
            .filter(|o| pred(o))
            .cloned()
            .collect();
        out.extend(
            self.base
                .orders
                .values()
                .filter(|o| !self.changes.orders.contains_key(&o.id) && pred(o))
                .cloned(),
        );
        out
    }

    pub fn products_where(&self, pred: impl Fn(&Product) -> bool) -> Vec<Product> {
        let mut out: Vec<Product> = self
            .changes
            .products
            .values()
            .filter(|p| pred(p))
            .cloned()
            .collect();
        out.extend(
            self.base
                .products
                .values()
                .filter(|p| !self.changes.products.contains_key(&p.id) && pred(p))
                .cloned(),
        );
        out
    }

    pub fn complaints_where(&self, pred: impl Fn(&Complaint) -> bool) -> Vec<Complaint> {
        let mut out: Vec<Complaint> = self
            .changes
            .complaints
            .values()
            .filter(|c| pred(c))
            .cloned()
            .collect();
        out.extend(
            self.base
                .complaints
                .values()
                .filter(|c| !self.changes.complaints.contains_key(&c.id) && pred(c))
                .cloned(),
        );
        out
    }

    pub fn deposits_where(&self, pred: impl Fn(&Deposit) -> bool) -> Vec<Deposit> {
        let mut out: Vec<Deposit> = self
            .changes
            .deposits
            .values()
            .filter(|d| pred(d))
            .cloned()
            .collect();
        out.extend(
            self.base
                .deposits
                .values()
                .filter(|d| !self.changes.deposits.contains_key(&d.id) && pred(d))
                .cloned(),
        );
        out
    }

    pub fn price_modifications_where(
        &self,
        pred: impl Fn(&PriceModification) -> bool,
    ) -> Vec<PriceModification> {
        let mut out: Vec<PriceModification> = self
            .changes
            .price_modifications
            .values()
            .filter(|m| pred(m))
            .cloned()
            .collect();
        out.extend(
            self.base
                .price_modifications
                .values()
                .filter(|m| !self.changes.price_modifications.contains_key(&m.id) && pred(m))
                .cloned(),
        );
        out
    }
}
