//! Persistence of committed changesets

use async_trait::async_trait;

use crate::error::MarketResult;
use crate::market::Changeset;

pub mod postgres;

pub use postgres::PgJournal;

/// Durable sink for changesets. A changeset is applied to the in-memory
/// state only after `commit` returns `Ok`.
#[async_trait]
pub trait Journal: Send + Sync {
    async fn commit(&self, changes: &Changeset) -> MarketResult<()>;
}

/// Keeps nothing; state lives only as long as the process
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryJournal;

#[async_trait]
impl Journal for MemoryJournal {
    async fn commit(&self, _changes: &Changeset) -> MarketResult<()> {
        Ok(())
    }
}
