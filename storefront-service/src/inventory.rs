use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use tracing::info;
use uuid::Uuid;

use crate::db::{DbPool, PoolError};
use crate::models::*;
use crate::schema::*;

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error(transparent)]
    Database(#[from] diesel::result::Error),
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Catalogue stock for cards and figurines.
#[derive(Clone)]
pub struct InventoryService {
    pool: DbPool,
}

impl InventoryService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create_card(&self, card: NewCard) -> Result<Card, InventoryError> {
        let mut conn = self.pool.get().await?;
        let created = diesel::insert_into(cards::table)
            .values(&card)
            .get_result::<Card>(&mut conn)
            .await?;
        info!("Listed card {} ({} in stock)", created.card_name, created.quantity);
        Ok(created)
    }

    pub async fn create_figurine(&self, figurine: NewFigurine) -> Result<Figurine, InventoryError> {
        let mut conn = self.pool.get().await?;
        let created = diesel::insert_into(figurines::table)
            .values(&figurine)
            .get_result::<Figurine>(&mut conn)
            .await?;
        info!(
            "Listed figurine {} ({} in stock)",
            created.product_name, created.quantity
        );
        Ok(created)
    }

    pub async fn find_card(&self, card_id: Uuid) -> Result<Option<Card>, InventoryError> {
        let mut conn = self.pool.get().await?;
        let card = cards::table
            .find(card_id)
            .first::<Card>(&mut conn)
            .await
            .optional()?;
        Ok(card)
    }

    pub async fn find_figurine(&self, figurine_id: Uuid) -> Result<Option<Figurine>, InventoryError> {
        let mut conn = self.pool.get().await?;
        let figurine = figurines::table
            .find(figurine_id)
            .first::<Figurine>(&mut conn)
            .await
            .optional()?;
        Ok(figurine)
    }
}
