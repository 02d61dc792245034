//! Marketplace service: serialises writes through one staged transaction at
//! a time and persists each changeset before it becomes visible.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{MarketError, MarketResult};
use crate::market::orders::{self, Placement};
use crate::market::payments::{self, Credit};
use crate::market::{deposit, moderation, MarketSettings, MarketState, Txn, VerifiedPayment};
use crate::models::{
    ClientConfig, Complaint, ComplaintDecision, ComplaintStatus, CreateProductRequest,
    DashboardStats, Deposit, FavoriteToggle, LedgerEntry, ListProductsQuery, MeResponse, Order,
    PaymentPurpose, PriceModification, PriceModificationRequest, Product, PublicProfile,
    RechargeResponse, ReviewStatus, UpdateProductRequest, User, Withdrawal, WithdrawalAction,
    WithdrawalRequest, WithdrawalStatus,
};
use crate::store::Journal;
use crate::wallet::WalletUser;

pub struct MarketService {
    state: Mutex<MarketState>,
    settings: MarketSettings,
    journal: Arc<dyn Journal>,
}

fn newest_first<T>(items: &mut [T], created_at: impl Fn(&T) -> DateTime<Utc>) {
    items.sort_by_key(|item| std::cmp::Reverse(created_at(item)));
}

impl MarketService {
    pub fn new(state: MarketState, settings: MarketSettings, journal: Arc<dyn Journal>) -> Self {
        Self {
            state: Mutex::new(state),
            settings,
            journal,
        }
    }

    pub fn settings(&self) -> &MarketSettings {
        &self.settings
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            points_per_pi: self.settings.rate.points_per_pi(),
            required_deposit_points: self.settings.required_deposit_points(),
            platform_fee_bps: self.settings.platform_fee_bps,
        }
    }

    /// Run `op` against a staged view of the state. Its changeset is written
    /// to the journal and applied only if `op` succeeds and the journal
    /// commits; otherwise nothing changes.
    pub async fn transact<T>(&self, op: impl FnOnce(&mut Txn<'_>) -> MarketResult<T>) -> MarketResult<T> {
        let mut state = self.state.lock().await;
        let (out, changes) = {
            let mut txn = Txn::new(&state, &self.settings, Utc::now());
            let out = op(&mut txn)?;
            (out, txn.into_changes())
        };
        if !changes.is_empty() {
            if let Err(err) = self.journal.commit(&changes).await {
                tracing::error!(error = %err, "journal rejected changeset; state left unchanged");
                return Err(err);
            }
            state.apply(changes);
        }
        Ok(out)
    }

    /// Read the committed state.
    pub async fn read<T>(&self, f: impl FnOnce(&MarketState) -> T) -> T {
        let state = self.state.lock().await;
        f(&state)
    }

    // ----- accounts -----

    /// Find or create the user behind a verified wallet account.
    pub async fn sign_in(&self, wallet: &WalletUser) -> MarketResult<User> {
        let uid = wallet.uid.trim().to_string();
        if uid.is_empty() {
            return Err(MarketError::Unauthorized);
        }
        let username = wallet
            .username
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("pioneer-{}", uid.chars().take(8).collect::<String>()));

        let user = self
            .transact(|txn| {
                let existing = txn.user_by_wallet(&uid);
                match existing {
                    Some(mut user) => {
                        if !user.is_active {
                            return Err(MarketError::forbidden("account is deactivated"));
                        }
                        if user.username != username {
                            user.username = username.clone();
                            user.updated_at = txn.now();
                            txn.put_user(user.clone());
                        }
                        Ok(user)
                    }
                    None => {
                        let user = User::new(uid.clone(), username.clone(), txn.now());
                        txn.put_user(user.clone());
                        Ok(user)
                    }
                }
            })
            .await?;
        tracing::info!(user_id = %user.id, "wallet user signed in");
        Ok(user)
    }

    /// Active user, for request authentication.
    pub async fn active_user(&self, user_id: Uuid) -> MarketResult<User> {
        let user = self
            .read(|s| s.user(user_id).cloned())
            .await
            .ok_or(MarketError::Unauthorized)?;
        if !user.is_active {
            return Err(MarketError::forbidden("account is deactivated"));
        }
        Ok(user)
    }

    pub async fn me(&self, user_id: Uuid) -> MarketResult<MeResponse> {
        let user = self.active_user(user_id).await?;
        let rate = self.settings.rate;
        let shortfall = self.settings.required_deposit_points() - user.deposit_points;
        Ok(MeResponse {
            available_points: user.available_points(),
            available_pi: rate.pi_for_display(user.available_points()),
            deposit_shortfall_pi: rate.pi_needed(shortfall),
            user,
            config: self.client_config(),
        })
    }

    pub async fn profile(&self, user_id: Uuid) -> MarketResult<PublicProfile> {
        self.read(|s| s.user(user_id).map(PublicProfile::from))
            .await
            .ok_or(MarketError::NotFound("user"))
    }

    pub async fn transactions(&self, user_id: Uuid) -> Vec<LedgerEntry> {
        let mut entries: Vec<LedgerEntry> = self
            .read(|s| s.ledger().iter().filter(|e| e.user_id == user_id).cloned().collect())
            .await;
        entries.reverse();
        entries
    }

    // ----- payments, deposit, withdrawals -----

    async fn credit(
        &self,
        user_id: Uuid,
        payment: &VerifiedPayment,
        purpose: PaymentPurpose,
    ) -> MarketResult<Credit> {
        let credit = self
            .transact(|txn| payments::credit_payment(txn, user_id, payment, purpose, None))
            .await?;
        if credit.replayed {
            tracing::info!(payment_id = %payment.payment_id, %user_id, "payment already credited");
        } else {
            tracing::info!(
                payment_id = %payment.payment_id,
                %user_id,
                points = payment.amount_points,
                ?purpose,
                "payment credited"
            );
        }
        Ok(credit)
    }

    pub async fn recharge(&self, user_id: Uuid, payment: &VerifiedPayment) -> MarketResult<RechargeResponse> {
        let credit = self.credit(user_id, payment, PaymentPurpose::Recharge).await?;
        if credit.record.purpose != PaymentPurpose::Recharge {
            return Err(MarketError::invalid_state("payment was made for another purpose"));
        }
        let user = self.active_user(user_id).await?;
        Ok(RechargeResponse {
            credited_points: credit.record.amount_points,
            balance_points: user.balance_points,
            replayed: credit.replayed,
        })
    }

    /// Credit a recharge reported by the payment webhook. Returns `None` when
    /// no user owns the paying wallet.
    pub async fn credit_webhook_recharge(&self, payment: &VerifiedPayment) -> MarketResult<Option<Credit>> {
        let owner = self
            .read(|s| s.user_by_wallet(&payment.wallet_uid).map(|u| u.id))
            .await;
        match owner {
            Some(user_id) => self
                .credit(user_id, payment, PaymentPurpose::Recharge)
                .await
                .map(Some),
            None => Ok(None),
        }
    }

    pub async fn pay_deposit(&self, user_id: Uuid, payment: Option<&VerifiedPayment>) -> MarketResult<Deposit> {
        let deposit = match payment {
            Some(payment) => {
                self.credit(user_id, payment, PaymentPurpose::Deposit).await?;
                self.transact(|txn| deposit::pay_with_payment(txn, user_id, &payment.payment_id))
                    .await?
            }
            None => self.transact(|txn| deposit::pay_from_balance(txn, user_id)).await?,
        };
        tracing::info!(%user_id, deposit_id = %deposit.id, points = deposit.amount_points, "deposit paid");
        Ok(deposit)
    }

    pub async fn request_deposit_refund(&self, user_id: Uuid) -> MarketResult<Deposit> {
        let deposit = self.transact(|txn| deposit::request_refund(txn, user_id)).await?;
        tracing::info!(%user_id, deposit_id = %deposit.id, points = deposit.amount_points, "deposit refund requested");
        Ok(deposit)
    }

    pub async fn request_withdrawal(&self, user_id: Uuid, req: WithdrawalRequest) -> MarketResult<Withdrawal> {
        let withdrawal = self
            .transact(|txn| moderation::request_withdrawal(txn, user_id, req))
            .await?;
        tracing::info!(%user_id, withdrawal_id = %withdrawal.id, points = withdrawal.amount_points, "withdrawal requested");
        Ok(withdrawal)
    }

    pub async fn withdrawals_of(&self, user_id: Uuid) -> Vec<Withdrawal> {
        let mut list: Vec<Withdrawal> = self
            .read(|s| s.withdrawals().filter(|w| w.user_id == user_id).cloned().collect())
            .await;
        newest_first(&mut list, |w| w.created_at);
        list
    }

    // ----- products -----

    pub async fn list_products(&self, query: &ListProductsQuery) -> Vec<Product> {
        let mut list: Vec<Product> = self
            .read(|s| {
                s.products()
                    .filter(|p| p.is_listed() && p.matches(query))
                    .cloned()
                    .collect()
            })
            .await;
        newest_first(&mut list, |p| p.created_at);
        query.pagination().apply(list)
    }

    pub async fn products_of(&self, seller_id: Uuid) -> Vec<Product> {
        let mut list: Vec<Product> = self
            .read(|s| s.products().filter(|p| p.seller_id == seller_id).cloned().collect())
            .await;
        newest_first(&mut list, |p| p.created_at);
        list
    }

    pub async fn product(&self, product_id: Uuid) -> MarketResult<Product> {
        self.read(|s| s.product(product_id).cloned())
            .await
            .ok_or(MarketError::NotFound("product"))
    }

    pub async fn create_product(&self, seller_id: Uuid, req: CreateProductRequest) -> MarketResult<Product> {
        let product = self
            .transact(|txn| moderation::create_product(txn, seller_id, req))
            .await?;
        tracing::info!(%seller_id, product_id = %product.id, "product submitted for review");
        Ok(product)
    }

    pub async fn update_product(
        &self,
        seller_id: Uuid,
        product_id: Uuid,
        req: UpdateProductRequest,
    ) -> MarketResult<Product> {
        self.transact(|txn| moderation::update_product(txn, seller_id, product_id, req))
            .await
    }

    pub async fn set_product_active(&self, seller_id: Uuid, product_id: Uuid, active: bool) -> MarketResult<Product> {
        let product = self
            .transact(|txn| moderation::set_active(txn, seller_id, product_id, active))
            .await?;
        tracing::info!(%seller_id, %product_id, active, "product availability changed");
        Ok(product)
    }

    pub async fn toggle_favorite(&self, user_id: Uuid, product_id: Uuid) -> MarketResult<FavoriteToggle> {
        self.transact(|txn| moderation::toggle_favorite(txn, user_id, product_id))
            .await
    }

    pub async fn request_price_change(
        &self,
        seller_id: Uuid,
        product_id: Uuid,
        req: PriceModificationRequest,
    ) -> MarketResult<PriceModification> {
        let modification = self
            .transact(|txn| moderation::request_price_change(txn, seller_id, product_id, req))
            .await?;
        tracing::info!(
            %product_id,
            old_price = modification.old_price,
            new_price = modification.new_price,
            "price change requested"
        );
        Ok(modification)
    }

    // ----- orders -----

    /// Place an order. A funding payment is credited in its own transaction
    /// first, so a purchase that fails afterwards leaves the points on the
    /// buyer's balance and the same payment id can be retried.
    pub async fn place_order(
        &self,
        buyer_id: Uuid,
        product_id: Uuid,
        payment: Option<&VerifiedPayment>,
    ) -> MarketResult<Placement> {
        if let Some(payment) = payment {
            self.credit(buyer_id, payment, PaymentPurpose::Order).await?;
        }
        let payment_id = payment.map(|p| p.payment_id.as_str());
        let placement = self
            .transact(|txn| orders::place_order(txn, buyer_id, product_id, payment_id))
            .await?;
        let order = &placement.order;
        if placement.replayed {
            tracing::info!(order_id = %order.id, "order replayed for payment");
        } else {
            tracing::info!(
                order_id = %order.id,
                %buyer_id,
                seller_id = %order.seller_id,
                amount = order.amount_points,
                fee = order.fee_points,
                "order placed, escrow held"
            );
        }
        Ok(placement)
    }

    pub async fn orders_as_buyer(&self, buyer_id: Uuid) -> Vec<Order> {
        let mut list: Vec<Order> = self
            .read(|s| s.orders().filter(|o| o.buyer_id == buyer_id).cloned().collect())
            .await;
        newest_first(&mut list, |o| o.created_at);
        list
    }

    pub async fn orders_as_seller(&self, seller_id: Uuid) -> Vec<Order> {
        let mut list: Vec<Order> = self
            .read(|s| s.orders().filter(|o| o.seller_id == seller_id).cloned().collect())
            .await;
        newest_first(&mut list, |o| o.created_at);
        list
    }

    /// Order visible to one of its participants.
    pub async fn order_for(&self, user_id: Uuid, order_id: Uuid) -> MarketResult<Order> {
        let order = self
            .read(|s| s.order(order_id).cloned())
            .await
            .ok_or(MarketError::NotFound("order"))?;
        if !order.is_participant(user_id) {
            return Err(MarketError::forbidden("not a participant of this order"));
        }
        Ok(order)
    }

    pub async fn ship(&self, order_id: Uuid, actor: Uuid) -> MarketResult<Order> {
        let order = self.transact(|txn| orders::ship(txn, order_id, actor)).await?;
        tracing::info!(%order_id, %actor, "order shipped");
        Ok(order)
    }

    pub async fn confirm(&self, order_id: Uuid, actor: Uuid) -> MarketResult<Order> {
        let order = self.transact(|txn| orders::confirm(txn, order_id, actor)).await?;
        tracing::info!(
            %order_id,
            %actor,
            seller_points = order.amount_points - order.fee_points,
            fee = order.fee_points,
            "order confirmed, escrow released"
        );
        Ok(order)
    }

    pub async fn cancel(&self, order_id: Uuid, actor: Uuid) -> MarketResult<Order> {
        let order = self.transact(|txn| orders::cancel(txn, order_id, actor)).await?;
        tracing::info!(%order_id, %actor, refund = order.amount_points, "order canceled, escrow refunded");
        Ok(order)
    }

    pub async fn settle(&self, order_id: Uuid) -> MarketResult<Order> {
        let order = self.transact(|txn| orders::settle(txn, order_id)).await?;
        tracing::info!(%order_id, fee = order.fee_points, "order settled by admin");
        Ok(order)
    }

    pub async fn refund(&self, order_id: Uuid) -> MarketResult<Order> {
        let order = self.transact(|txn| orders::refund(txn, order_id)).await?;
        tracing::info!(%order_id, refund = order.amount_points, "order refunded by admin");
        Ok(order)
    }

    pub async fn file_complaint(&self, actor: Uuid, order_id: Uuid, reason: String) -> MarketResult<Complaint> {
        let complaint = self
            .transact(|txn| moderation::file_complaint(txn, actor, order_id, reason))
            .await?;
        tracing::info!(%order_id, complaint_id = %complaint.id, "complaint filed");
        Ok(complaint)
    }

    // ----- admin -----

    pub async fn dashboard(&self, now: DateTime<Utc>) -> DashboardStats {
        let today = now.date_naive();
        self.read(|s| {
            let mut stats = DashboardStats::default();
            for order in s.orders().filter(|o| o.created_at.date_naive() == today) {
                stats.orders_today += 1;
                stats.amount_points_today += order.amount_points;
                stats.fee_points_today += order.fee_points;
            }
            stats.pending_products = s
                .products()
                .filter(|p| p.moderation == ReviewStatus::Pending)
                .count() as i64;
            stats.pending_withdrawals = s
                .withdrawals()
                .filter(|w| w.status == WithdrawalStatus::Pending)
                .count() as i64;
            stats.open_complaints = s
                .complaints()
                .filter(|c| c.status == ComplaintStatus::Pending)
                .count() as i64;
            stats
        })
        .await
    }

    pub async fn pending_products(&self) -> Vec<Product> {
        let mut list: Vec<Product> = self
            .read(|s| {
                s.products()
                    .filter(|p| p.moderation == ReviewStatus::Pending)
                    .cloned()
                    .collect()
            })
            .await;
        list.sort_by_key(|p| p.created_at);
        list
    }

    pub async fn approve_product(&self, product_id: Uuid) -> MarketResult<Product> {
        let product = self.transact(|txn| moderation::approve_product(txn, product_id)).await?;
        tracing::info!(%product_id, "product approved");
        Ok(product)
    }

    pub async fn reject_product(&self, product_id: Uuid, note: Option<String>) -> MarketResult<Product> {
        let product = self
            .transact(|txn| moderation::reject_product(txn, product_id, note))
            .await?;
        tracing::info!(%product_id, "product rejected");
        Ok(product)
    }

    pub async fn pending_price_modifications(&self) -> Vec<PriceModification> {
        let mut list: Vec<PriceModification> = self
            .read(|s| {
                s.price_modifications()
                    .filter(|m| m.status == ReviewStatus::Pending)
                    .cloned()
                    .collect()
            })
            .await;
        list.sort_by_key(|m| m.created_at);
        list
    }

    pub async fn review_price_change(
        &self,
        modification_id: Uuid,
        approved: bool,
        note: Option<String>,
    ) -> MarketResult<PriceModification> {
        let modification = self
            .transact(|txn| moderation::review_price_change(txn, modification_id, approved, note))
            .await?;
        tracing::info!(%modification_id, approved, "price change reviewed");
        Ok(modification)
    }

    pub async fn withdrawals(&self, status: Option<WithdrawalStatus>) -> Vec<Withdrawal> {
        let mut list: Vec<Withdrawal> = self
            .read(|s| {
                s.withdrawals()
                    .filter(|w| status.map_or(true, |st| w.status == st))
                    .cloned()
                    .collect()
            })
            .await;
        newest_first(&mut list, |w| w.created_at);
        list
    }

    pub async fn review_withdrawal(&self, withdrawal_id: Uuid, action: WithdrawalAction) -> MarketResult<Withdrawal> {
        let withdrawal = self
            .transact(|txn| moderation::review_withdrawal(txn, withdrawal_id, action))
            .await?;
        tracing::info!(
            %withdrawal_id,
            status = ?withdrawal.status,
            points = withdrawal.amount_points,
            "withdrawal reviewed"
        );
        Ok(withdrawal)
    }

    pub async fn deposits(&self) -> Vec<Deposit> {
        let mut list: Vec<Deposit> = self.read(|s| s.deposits().cloned().collect()).await;
        newest_first(&mut list, |d| d.created_at);
        list
    }

    pub async fn review_deposit(&self, deposit_id: Uuid, approved: bool, note: Option<String>) -> MarketResult<Deposit> {
        let deposit = self
            .transact(|txn| deposit::review_refund(txn, deposit_id, approved, note))
            .await?;
        tracing::info!(%deposit_id, approved, points = deposit.amount_points, "deposit refund reviewed");
        Ok(deposit)
    }

    pub async fn complaints(&self) -> Vec<Complaint> {
        let mut list: Vec<Complaint> = self.read(|s| s.complaints().cloned().collect()).await;
        newest_first(&mut list, |c| c.created_at);
        list
    }

    pub async fn decide_complaint(
        &self,
        complaint_id: Uuid,
        decision: ComplaintDecision,
        penalty_points: i64,
    ) -> MarketResult<Complaint> {
        let complaint = self
            .transact(|txn| moderation::decide_complaint(txn, complaint_id, decision, penalty_points))
            .await?;
        tracing::info!(
            %complaint_id,
            order_id = %complaint.order_id,
            ?decision,
            penalty = complaint.penalty_points,
            "complaint decided"
        );
        Ok(complaint)
    }

    pub async fn deactivate_user(&self, user_id: Uuid) -> MarketResult<User> {
        let user = self.transact(|txn| moderation::deactivate_user(txn, user_id)).await?;
        tracing::info!(%user_id, "user deactivated");
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryJournal;
    use async_trait::async_trait;

    struct BrokenJournal;

    #[async_trait]
    impl Journal for BrokenJournal {
        async fn commit(&self, _changes: &crate::market::Changeset) -> MarketResult<()> {
            Err(MarketError::Conflict("test".to_string()))
        }
    }

    fn wallet(uid: &str) -> WalletUser {
        WalletUser {
            uid: uid.to_string(),
            username: Some(uid.to_string()),
        }
    }

    #[tokio::test]
    async fn sign_in_is_idempotent_per_wallet() {
        let service = MarketService::new(
            MarketState::new(Utc::now()),
            MarketSettings::default(),
            Arc::new(MemoryJournal),
        );
        let first = service.sign_in(&wallet("uid-a")).await.unwrap();
        let second = service.sign_in(&wallet("uid-a")).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(service.read(|s| s.users.len()).await, 2);
    }

    #[tokio::test]
    async fn failed_commit_leaves_state_untouched() {
        let service = MarketService::new(
            MarketState::new(Utc::now()),
            MarketSettings::default(),
            Arc::new(BrokenJournal),
        );
        let err = service.sign_in(&wallet("uid-a")).await.unwrap_err();
        assert!(matches!(err, MarketError::Conflict(_)));
        assert_eq!(service.read(|s| s.users.len()).await, 1);
    }
}
