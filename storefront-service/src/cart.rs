use bigdecimal::BigDecimal;
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use num_traits::Zero;
use serde::Serialize;
use shared::ProductRef;
use tracing::info;
use uuid::Uuid;

use crate::db::{DbPool, PoolError};
use crate::models::*;
use crate::schema::*;

#[derive(Debug, thiserror::Error)]
pub enum CartError {
    #[error("quantity must be greater than zero")]
    InvalidQuantity,
    #[error("cart line {0} not found")]
    LineNotFound(Uuid),
    #[error("{0} not found")]
    ProductNotFound(ProductRef),
    #[error(transparent)]
    Database(#[from] diesel::result::Error),
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// A cart line with what the shopper sees about the product.
#[derive(Debug, Clone, Serialize)]
pub struct CartLine {
    pub id: Uuid,
    pub product: Option<ProductRef>,
    pub quantity: i32,
    pub name: Option<String>,
    pub set_name: Option<String>,
    pub unit_price: Option<BigDecimal>,
    pub stock: Option<i32>,
}

impl CartLine {
    pub fn line_total(&self) -> Option<BigDecimal> {
        self.unit_price
            .as_ref()
            .map(|price| price * BigDecimal::from(self.quantity))
    }
}

type CartRow = (
    CartItem,
    Option<String>,
    Option<String>,
    Option<BigDecimal>,
    Option<i32>,
    Option<String>,
    Option<BigDecimal>,
    Option<i32>,
);

#[derive(Clone)]
pub struct CartService {
    pool: DbPool,
}

impl CartService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Adds `quantity` of a product, growing the existing line if the product
    /// is already in the cart.
    pub async fn add_item(
        &self,
        user_id: Uuid,
        product: ProductRef,
        quantity: i32,
    ) -> Result<CartItem, CartError> {
        if quantity <= 0 {
            return Err(CartError::InvalidQuantity);
        }
        let mut conn = self.pool.get().await?;
        ensure_product_exists(&mut conn, product).await?;

        let existing = match product {
            ProductRef::Card(card_id) => {
                cart::table
                    .filter(cart::user_id.eq(user_id))
                    .filter(cart::card_id.eq(card_id))
                    .first::<CartItem>(&mut conn)
                    .await
                    .optional()?
            }
            ProductRef::Figurine(figurine_id) => {
                cart::table
                    .filter(cart::user_id.eq(user_id))
                    .filter(cart::figurine_id.eq(figurine_id))
                    .first::<CartItem>(&mut conn)
                    .await
                    .optional()?
            }
        };

        let item = match existing {
            Some(line) => {
                diesel::update(cart::table.filter(cart::id.eq(line.id)))
                    .set(cart::quantity.eq(cart::quantity + quantity))
                    .get_result::<CartItem>(&mut conn)
                    .await?
            }
            None => {
                let new_item = NewCartItem {
                    id: Uuid::new_v4(),
                    user_id,
                    card_id: product.card_id(),
                    figurine_id: product.figurine_id(),
                    quantity,
                };
                diesel::insert_into(cart::table)
                    .values(&new_item)
                    .get_result::<CartItem>(&mut conn)
                    .await?
            }
        };

        info!("Cart of user {} now holds {} x {}", user_id, item.quantity, product);
        Ok(item)
    }

    /// Lines with product details, newest first.
    pub async fn items(&self, user_id: Uuid) -> Result<Vec<CartLine>, CartError> {
        let mut conn = self.pool.get().await?;

        let rows = cart::table
            .left_join(cards::table)
            .left_join(figurines::table)
            .filter(cart::user_id.eq(user_id))
            .order(cart::added_at.desc())
            .select((
                cart::all_columns,
                cards::card_name.nullable(),
                cards::set_name.nullable(),
                cards::price_nzd.nullable(),
                cards::quantity.nullable(),
                figurines::product_name.nullable(),
                figurines::price_nzd.nullable(),
                figurines::quantity.nullable(),
            ))
            .load::<CartRow>(&mut conn)
            .await?;

        Ok(rows
            .into_iter()
            .map(
                |(item, card_name, set_name, card_price, card_stock, product_name, figurine_price, figurine_stock)| {
                    CartLine {
                        id: item.id,
                        product: item.product(),
                        quantity: item.quantity,
                        name: card_name.or(product_name),
                        set_name,
                        unit_price: card_price.or(figurine_price),
                        stock: card_stock.or(figurine_stock),
                    }
                },
            )
            .collect())
    }

    pub async fn update_quantity(
        &self,
        line_id: Uuid,
        user_id: Uuid,
        quantity: i32,
    ) -> Result<CartItem, CartError> {
        if quantity <= 0 {
            return Err(CartError::InvalidQuantity);
        }
        let mut conn = self.pool.get().await?;
        diesel::update(
            cart::table
                .filter(cart::id.eq(line_id))
                .filter(cart::user_id.eq(user_id)),
        )
        .set(cart::quantity.eq(quantity))
        .get_result::<CartItem>(&mut conn)
        .await
        .optional()?
        .ok_or(CartError::LineNotFound(line_id))
    }

    pub async fn remove_item(&self, line_id: Uuid, user_id: Uuid) -> Result<(), CartError> {
        let mut conn = self.pool.get().await?;
        diesel::delete(
            cart::table
                .filter(cart::id.eq(line_id))
                .filter(cart::user_id.eq(user_id)),
        )
        .execute(&mut conn)
        .await?;
        Ok(())
    }

    pub async fn clear(&self, user_id: Uuid) -> Result<usize, CartError> {
        let mut conn = self.pool.get().await?;
        let removed = diesel::delete(cart::table.filter(cart::user_id.eq(user_id)))
            .execute(&mut conn)
            .await?;
        Ok(removed)
    }

    /// Sum of quantity x current unit price. Lines without a price count as 0.
    pub async fn total(&self, user_id: Uuid) -> Result<BigDecimal, CartError> {
        let lines = self.items(user_id).await?;
        Ok(lines
            .iter()
            .filter_map(CartLine::line_total)
            .fold(BigDecimal::zero(), |acc, line| acc + line))
    }
}

async fn ensure_product_exists(
    conn: &mut AsyncPgConnection,
    product: ProductRef,
) -> Result<(), CartError> {
    let found = match product {
        ProductRef::Card(id) => {
            cards::table
                .find(id)
                .select(cards::id)
                .first::<Uuid>(conn)
                .await
                .optional()?
        }
        ProductRef::Figurine(id) => {
            figurines::table
                .find(id)
                .select(figurines::id)
                .first::<Uuid>(conn)
                .await
                .optional()?
        }
    };
    found.map(|_| ()).ok_or(CartError::ProductNotFound(product))
}
