//! # Item Status Coordinator
//!
//! Guards "an item is pledged to at most one open loan" and moves items
//! through their closed status table.
//!
//! Every method runs inside the caller's transaction: it takes the item row
//! lock, re-reads the item and only then checks the transition. A loan
//! origination that fails after `try_pledge` rolls the pledge back with it.
//!
//! ```text
//! available ──try_pledge──► pledged ──release──► available
//!                              │
//!                              └──confiscate──► confiscated ──list_for_sale──► for_sale ──mark_sold──► sold
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::EngineResult;
use pawn_core::{CoreError, Item, ItemStatus};
use pawn_db::ItemRepository;

#[derive(Debug, Clone, Copy, Default)]
pub struct ItemCoordinator {
    items: ItemRepository,
}

impl ItemCoordinator {
    pub fn new() -> Self {
        ItemCoordinator::default()
    }

    /// Binds an available item to a new loan.
    pub async fn try_pledge(
        &self,
        conn: &mut SqliteConnection,
        item_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<Item> {
        self.transition(conn, item_id, ItemStatus::Pledged, now).await
    }

    /// Frees a pledged item once its loan is paid.
    pub async fn release(
        &self,
        conn: &mut SqliteConnection,
        item_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<Item> {
        self.transition(conn, item_id, ItemStatus::Available, now).await
    }

    /// Takes a pledged item into the shop's ownership.
    pub async fn confiscate(
        &self,
        conn: &mut SqliteConnection,
        item_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<Item> {
        self.transition(conn, item_id, ItemStatus::Confiscated, now).await
    }

    pub async fn list_for_sale(
        &self,
        conn: &mut SqliteConnection,
        item_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<Item> {
        self.transition(conn, item_id, ItemStatus::ForSale, now).await
    }

    pub async fn mark_sold(
        &self,
        conn: &mut SqliteConnection,
        item_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<Item> {
        self.transition(conn, item_id, ItemStatus::Sold, now).await
    }

    async fn transition(
        &self,
        conn: &mut SqliteConnection,
        item_id: &str,
        to: ItemStatus,
        now: DateTime<Utc>,
    ) -> EngineResult<Item> {
        if !self.items.lock(&mut *conn, item_id).await? {
            return Err(CoreError::not_found("Item", item_id).into());
        }

        let mut item = self
            .items
            .get(&mut *conn, item_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Item", item_id))?;

        let unavailable = |status| CoreError::ItemUnavailable {
            item_id: item_id.to_string(),
            status,
            requested: to,
        };

        if !item.status.can_transition_to(to) {
            return Err(unavailable(item.status).into());
        }

        // Conditional on the status just read; the row lock makes a miss impossible
        // unless the schema and this table disagree.
        if !self
            .items
            .update_status(&mut *conn, item_id, item.status, to, now)
            .await?
        {
            return Err(unavailable(item.status).into());
        }

        debug!(item_id = %item_id, from = %item.status, to = %to, "Item status changed");

        item.status = to;
        item.updated_at = now;
        Ok(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{date, seed_item, setup};
    use pawn_core::{Clock, ErrorKind, Money};

    #[tokio::test]
    async fn test_item_walks_the_confiscation_path() {
        let (engine, clock) = setup(date(2026, 1, 1)).await;
        let item = seed_item(engine.database(), "branch-1", Money::from_cents(200_000)).await;
        let coordinator = ItemCoordinator::new();
        let now = clock.now();

        let mut tx = engine.database().begin().await.unwrap();
        for status in [
            ItemStatus::Pledged,
            ItemStatus::Confiscated,
            ItemStatus::ForSale,
            ItemStatus::Sold,
        ] {
            let moved = match status {
                ItemStatus::Pledged => coordinator.try_pledge(&mut *tx, &item.id, now).await,
                ItemStatus::Confiscated => coordinator.confiscate(&mut *tx, &item.id, now).await,
                ItemStatus::ForSale => coordinator.list_for_sale(&mut *tx, &item.id, now).await,
                _ => coordinator.mark_sold(&mut *tx, &item.id, now).await,
            }
            .unwrap();
            assert_eq!(moved.status, status);
        }
        tx.commit().await.unwrap();

        let mut conn = engine.database().acquire().await.unwrap();
        let stored = engine
            .database()
            .items()
            .get(&mut *conn, &item.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, ItemStatus::Sold);
    }

    #[tokio::test]
    async fn test_double_pledge_is_a_conflict() {
        let (engine, clock) = setup(date(2026, 1, 1)).await;
        let item = seed_item(engine.database(), "branch-1", Money::from_cents(200_000)).await;
        let coordinator = ItemCoordinator::new();

        let mut tx = engine.database().begin().await.unwrap();
        coordinator
            .try_pledge(&mut *tx, &item.id, clock.now())
            .await
            .unwrap();
        let err = coordinator
            .try_pledge(&mut *tx, &item.id, clock.now())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = coordinator
            .list_for_sale(&mut *tx, &item.id, clock.now())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_unknown_item() {
        let (engine, clock) = setup(date(2026, 1, 1)).await;
        let mut tx = engine.database().begin().await.unwrap();
        let err = ItemCoordinator::new()
            .try_pledge(&mut *tx, "missing", clock.now())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
