//! Restaurant financial profiles.
//!
//! The engine is not the system of record for restaurant catalog data.
//! This repository keeps the subset the engine needs: the commission
//! override and the settlement counters.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use eatoff_core::Restaurant;

#[derive(Debug, Clone)]
pub struct RestaurantRepository {
    pool: SqlitePool,
}

impl RestaurantRepository {
    pub fn new(pool: SqlitePool) -> Self {
        RestaurantRepository { pool }
    }

    /// Creates or refreshes a restaurant profile.
    ///
    /// Settlement counters are preserved on conflict; only the name and
    /// commission override follow the upstream catalog.
    pub async fn upsert(
        &self,
        id: &str,
        name: &str,
        commission_bps: Option<u32>,
    ) -> DbResult<()> {
        debug!(restaurant = %id, ?commission_bps, "Upserting restaurant profile");

        sqlx::query(
            r#"
            INSERT INTO restaurants (
                id, name, commission_bps,
                pending_settlement_cents, total_settled_cents, created_at
            ) VALUES (?1, ?2, ?3, 0, 0, ?4)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                commission_bps = excluded.commission_bps
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(commission_bps)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Restaurant>> {
        let restaurant = sqlx::query_as::<_, Restaurant>(
            r#"
            SELECT id, name, commission_bps,
                   pending_settlement_cents, total_settled_cents, created_at
            FROM restaurants
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(restaurant)
    }
}

#[cfg(test)]
mod tests {
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_upsert_preserves_counters() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.restaurants();

        repo.upsert("r-1", "Trattoria", Some(600)).await.unwrap();
        // Simulate accrued settlement state
        sqlx::query("UPDATE restaurants SET pending_settlement_cents = 4200 WHERE id = 'r-1'")
            .execute(db.pool())
            .await
            .unwrap();

        // Catalog refresh must not clobber the counters
        repo.upsert("r-1", "Trattoria Nuova", None).await.unwrap();

        let fresh = repo.get("r-1").await.unwrap().unwrap();
        assert_eq!(fresh.name, "Trattoria Nuova");
        assert_eq!(fresh.commission_bps, None);
        assert_eq!(fresh.pending_settlement_cents, 4200);
        assert_eq!(fresh.commission_rate().bps(), 550);
    }
}
