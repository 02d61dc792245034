//! Postgres journal

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, Transaction};

use super::Journal;
use crate::error::{MarketError, MarketResult};
use crate::market::{Changeset, MarketState, StagedOrder};
use crate::models::{
    ChatMessage, Complaint, Deposit, LedgerEntry, Order, PaymentRecord, PriceModification,
    Product, User, Withdrawal,
};

/// Rows loaded at startup
pub struct Snapshot {
    pub state: MarketState,
    pub messages: Vec<ChatMessage>,
}

#[derive(Clone)]
pub struct PgJournal {
    pool: PgPool,
}

impl PgJournal {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Rebuild the marketplace from the tables.
    pub async fn load(&self) -> MarketResult<Snapshot> {
        let mut state = MarketState::new(Utc::now());

        let users = sqlx::query_as::<_, User>("SELECT * FROM users")
            .fetch_all(&self.pool)
            .await?;
        state.users.extend(users.into_iter().map(|u| (u.id, u)));

        let products = sqlx::query_as::<_, Product>("SELECT * FROM products")
            .fetch_all(&self.pool)
            .await?;
        state.products.extend(products.into_iter().map(|p| (p.id, p)));

        let modifications = sqlx::query_as::<_, PriceModification>("SELECT * FROM price_modifications")
            .fetch_all(&self.pool)
            .await?;
        state
            .price_modifications
            .extend(modifications.into_iter().map(|m| (m.id, m)));

        let orders = sqlx::query_as::<_, Order>("SELECT * FROM orders")
            .fetch_all(&self.pool)
            .await?;
        state.orders.extend(orders.into_iter().map(|o| (o.id, o)));

        let withdrawals = sqlx::query_as::<_, Withdrawal>("SELECT * FROM withdrawals")
            .fetch_all(&self.pool)
            .await?;
        state.withdrawals.extend(withdrawals.into_iter().map(|w| (w.id, w)));

        let deposits = sqlx::query_as::<_, Deposit>("SELECT * FROM deposits")
            .fetch_all(&self.pool)
            .await?;
        state.deposits.extend(deposits.into_iter().map(|d| (d.id, d)));

        let complaints = sqlx::query_as::<_, Complaint>("SELECT * FROM complaints")
            .fetch_all(&self.pool)
            .await?;
        state.complaints.extend(complaints.into_iter().map(|c| (c.id, c)));

        let payments = sqlx::query_as::<_, PaymentRecord>("SELECT * FROM payments")
            .fetch_all(&self.pool)
            .await?;
        state
            .payments
            .extend(payments.into_iter().map(|p| (p.payment_id.clone(), p)));

        let favorites = sqlx::query_as::<_, (uuid::Uuid, uuid::Uuid)>(
            "SELECT user_id, product_id FROM favorites",
        )
        .fetch_all(&self.pool)
        .await?;
        state.favorites.extend(favorites);

        state.ledger = sqlx::query_as::<_, LedgerEntry>(
            "SELECT * FROM ledger_entries ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await?;

        let messages = sqlx::query_as::<_, ChatMessage>(
            "SELECT * FROM chat_messages ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(Snapshot { state, messages })
    }
}

#[async_trait]
impl Journal for PgJournal {
    async fn commit(&self, changes: &Changeset) -> MarketResult<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;

        for user in changes.users.values() {
            upsert_user(&mut tx, user).await?;
        }
        for product in changes.products.values() {
            upsert_product(&mut tx, product).await?;
        }
        for modification in changes.price_modifications.values() {
            upsert_price_modification(&mut tx, modification).await?;
        }
        for staged in changes.orders.values() {
            write_order(&mut tx, staged).await?;
        }
        for withdrawal in changes.withdrawals.values() {
            upsert_withdrawal(&mut tx, withdrawal).await?;
        }
        for deposit in changes.deposits.values() {
            upsert_deposit(&mut tx, deposit).await?;
        }
        for complaint in changes.complaints.values() {
            upsert_complaint(&mut tx, complaint).await?;
        }
        for payment in changes.payments.values() {
            upsert_payment(&mut tx, payment).await?;
        }
        for (user_id, product_id) in &changes.favorites_added {
            sqlx::query(
                "INSERT INTO favorites (user_id, product_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(user_id)
            .bind(product_id)
            .execute(&mut *tx)
            .await?;
        }
        for (user_id, product_id) in &changes.favorites_removed {
            sqlx::query("DELETE FROM favorites WHERE user_id = $1 AND product_id = $2")
                .bind(user_id)
                .bind(product_id)
                .execute(&mut *tx)
                .await?;
        }
        for entry in &changes.ledger {
            insert_entry(&mut tx, entry).await?;
        }
        for message in &changes.messages {
            upsert_message(&mut tx, message).await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

async fn upsert_user(tx: &mut Transaction<'_, Postgres>, user: &User) -> MarketResult<()> {
    sqlx::query(
        r#"
        INSERT INTO users (
            id, wallet_uid, username, role, balance_points, frozen_points, deposit_points,
            rating, violation_count, is_active, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ON CONFLICT (id) DO UPDATE SET
            wallet_uid = EXCLUDED.wallet_uid,
            username = EXCLUDED.username,
            role = EXCLUDED.role,
            balance_points = EXCLUDED.balance_points,
            frozen_points = EXCLUDED.frozen_points,
            deposit_points = EXCLUDED.deposit_points,
            rating = EXCLUDED.rating,
            violation_count = EXCLUDED.violation_count,
            is_active = EXCLUDED.is_active,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(user.id)
    .bind(&user.wallet_uid)
    .bind(&user.username)
    .bind(user.role)
    .bind(user.balance_points)
    .bind(user.frozen_points)
    .bind(user.deposit_points)
    .bind(user.rating)
    .bind(user.violation_count)
    .bind(user.is_active)
    .bind(user.created_at)
    .bind(user.updated_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn upsert_product(tx: &mut Transaction<'_, Postgres>, product: &Product) -> MarketResult<()> {
    sqlx::query(
        r#"
        INSERT INTO products (
            id, seller_id, title, subtitle, description, price_points, stock, images,
            category, delivery_method, is_active, moderation, review_note, favorites_count,
            created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        ON CONFLICT (id) DO UPDATE SET
            title = EXCLUDED.title,
            subtitle = EXCLUDED.subtitle,
            description = EXCLUDED.description,
            price_points = EXCLUDED.price_points,
            stock = EXCLUDED.stock,
            images = EXCLUDED.images,
            category = EXCLUDED.category,
            delivery_method = EXCLUDED.delivery_method,
            is_active = EXCLUDED.is_active,
            moderation = EXCLUDED.moderation,
            review_note = EXCLUDED.review_note,
            favorites_count = EXCLUDED.favorites_count,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(product.id)
    .bind(product.seller_id)
    .bind(&product.title)
    .bind(&product.subtitle)
    .bind(&product.description)
    .bind(product.price_points)
    .bind(product.stock)
    .bind(&product.images)
    .bind(&product.category)
    .bind(&product.delivery_method)
    .bind(product.is_active)
    .bind(product.moderation)
    .bind(&product.review_note)
    .bind(product.favorites_count)
    .bind(product.created_at)
    .bind(product.updated_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn upsert_price_modification(
    tx: &mut Transaction<'_, Postgres>,
    m: &PriceModification,
) -> MarketResult<()> {
    sqlx::query(
        r#"
        INSERT INTO price_modifications (
            id, product_id, seller_id, old_price, new_price, reason, status, reviewer_note,
            created_at, reviewed_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (id) DO UPDATE SET
            status = EXCLUDED.status,
            reviewer_note = EXCLUDED.reviewer_note,
            reviewed_at = EXCLUDED.reviewed_at
        "#,
    )
    .bind(m.id)
    .bind(m.product_id)
    .bind(m.seller_id)
    .bind(m.old_price)
    .bind(m.new_price)
    .bind(&m.reason)
    .bind(m.status)
    .bind(&m.reviewer_note)
    .bind(m.created_at)
    .bind(m.reviewed_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// New orders are inserted; existing ones move only from the status they
/// were read at.
async fn write_order(tx: &mut Transaction<'_, Postgres>, staged: &StagedOrder) -> MarketResult<()> {
    let order = &staged.order;
    match staged.expected {
        None => {
            sqlx::query(
                r#"
                INSERT INTO orders (
                    id, product_id, product_title, buyer_id, seller_id, amount_points,
                    fee_points, escrow_points, status, payment_id, created_at, shipped_at,
                    completed_at, closed_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                "#,
            )
            .bind(order.id)
            .bind(order.product_id)
            .bind(&order.product_title)
            .bind(order.buyer_id)
            .bind(order.seller_id)
            .bind(order.amount_points)
            .bind(order.fee_points)
            .bind(order.escrow_points)
            .bind(order.status)
            .bind(&order.payment_id)
            .bind(order.created_at)
            .bind(order.shipped_at)
            .bind(order.completed_at)
            .bind(order.closed_at)
            .bind(order.updated_at)
            .execute(&mut **tx)
            .await?;
        }
        Some(expected) => {
            let result = sqlx::query(
                r#"
                UPDATE orders
                SET escrow_points = $3, status = $4, shipped_at = $5, completed_at = $6,
                    closed_at = $7, updated_at = $8
                WHERE id = $1 AND status = $2
                "#,
            )
            .bind(order.id)
            .bind(expected)
            .bind(order.escrow_points)
            .bind(order.status)
            .bind(order.shipped_at)
            .bind(order.completed_at)
            .bind(order.closed_at)
            .bind(order.updated_at)
            .execute(&mut **tx)
            .await?;

            if result.rows_affected() != 1 {
                tracing::warn!(order_id = %order.id, ?expected, "order status changed underneath transition");
                return Err(MarketError::Conflict(format!("order {}", order.id)));
            }
        }
    }
    Ok(())
}

async fn upsert_withdrawal(tx: &mut Transaction<'_, Postgres>, w: &Withdrawal) -> MarketResult<()> {
    sqlx::query(
        r#"
        INSERT INTO withdrawals (id, user_id, amount_points, address, status, created_at, reviewed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (id) DO UPDATE SET
            status = EXCLUDED.status,
            reviewed_at = EXCLUDED.reviewed_at
        "#,
    )
    .bind(w.id)
    .bind(w.user_id)
    .bind(w.amount_points)
    .bind(&w.address)
    .bind(w.status)
    .bind(w.created_at)
    .bind(w.reviewed_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn upsert_deposit(tx: &mut Transaction<'_, Postgres>, d: &Deposit) -> MarketResult<()> {
    sqlx::query(
        r#"
        INSERT INTO deposits (
            id, user_id, kind, amount_points, status, payment_id, note, created_at, reviewed_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (id) DO UPDATE SET
            amount_points = EXCLUDED.amount_points,
            status = EXCLUDED.status,
            note = EXCLUDED.note,
            reviewed_at = EXCLUDED.reviewed_at
        "#,
    )
    .bind(d.id)
    .bind(d.user_id)
    .bind(d.kind)
    .bind(d.amount_points)
    .bind(d.status)
    .bind(&d.payment_id)
    .bind(&d.note)
    .bind(d.created_at)
    .bind(d.reviewed_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn upsert_complaint(tx: &mut Transaction<'_, Postgres>, c: &Complaint) -> MarketResult<()> {
    sqlx::query(
        r#"
        INSERT INTO complaints (
            id, order_id, complainant_id, reason, status, decision, penalty_points,
            created_at, decided_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (id) DO UPDATE SET
            status = EXCLUDED.status,
            decision = EXCLUDED.decision,
            penalty_points = EXCLUDED.penalty_points,
            decided_at = EXCLUDED.decided_at
        "#,
    )
    .bind(c.id)
    .bind(c.order_id)
    .bind(c.complainant_id)
    .bind(&c.reason)
    .bind(c.status)
    .bind(c.decision)
    .bind(c.penalty_points)
    .bind(c.created_at)
    .bind(c.decided_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn upsert_payment(tx: &mut Transaction<'_, Postgres>, p: &PaymentRecord) -> MarketResult<()> {
    sqlx::query(
        r#"
        INSERT INTO payments (payment_id, user_id, amount_points, purpose, order_id, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (payment_id) DO UPDATE SET order_id = EXCLUDED.order_id
        "#,
    )
    .bind(&p.payment_id)
    .bind(p.user_id)
    .bind(p.amount_points)
    .bind(p.purpose)
    .bind(p.order_id)
    .bind(p.created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_entry(tx: &mut Transaction<'_, Postgres>, e: &LedgerEntry) -> MarketResult<()> {
    sqlx::query(
        r#"
        INSERT INTO ledger_entries (
            id, user_id, kind, amount_points, balance_after, order_id, ref_id, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(e.id)
    .bind(e.user_id)
    .bind(e.kind)
    .bind(e.amount_points)
    .bind(e.balance_after)
    .bind(e.order_id)
    .bind(e.ref_id)
    .bind(e.created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn upsert_message(tx: &mut Transaction<'_, Postgres>, m: &ChatMessage) -> MarketResult<()> {
    sqlx::query(
        r#"
        INSERT INTO chat_messages (id, room_id, sender_id, content, read, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (id) DO UPDATE SET read = EXCLUDED.read
        "#,
    )
    .bind(m.id)
    .bind(&m.room_id)
    .bind(m.sender_id)
    .bind(&m.content)
    .bind(m.read)
    .bind(m.created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
