use bigdecimal::BigDecimal;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use num_traits::Zero;
use serde::Deserialize;
use shared::coupon::normalize_code;
use shared::{generate_order_number, CouponRejection, CouponTerms, DomainError, OrderStatus, ProductRef};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::coupons::CouponService;
use crate::db::{DbPool, PoolError};
use crate::models::*;
use crate::notifier::{self, Notifier};
use crate::schema::*;

#[derive(Debug, thiserror::Error)]
pub enum OrderCreationError {
    #[error("Cart is empty")]
    EmptyCart,
    #[error("cart line {0} does not reference exactly one product")]
    InvalidLine(Uuid),
    #[error("{0} has no price")]
    Unpriced(ProductRef),
    #[error("{product} is out of stock (requested {requested})")]
    OutOfStock { product: ProductRef, requested: i32 },
    #[error("discount {discount} must be between 0 and the subtotal {subtotal}")]
    DiscountOutOfRange {
        discount: BigDecimal,
        subtotal: BigDecimal,
    },
    #[error(transparent)]
    Coupon(#[from] CouponRejection),
    #[error("stored coupon is malformed: {0}")]
    MalformedCoupon(#[from] DomainError),
    #[error(transparent)]
    Database(#[from] diesel::result::Error),
    #[error(transparent)]
    Pool(#[from] PoolError),
}

#[derive(Debug, thiserror::Error)]
pub enum OrderStatusError {
    #[error("order {0} not found")]
    NotFound(Uuid),
    #[error("cannot move order from {from} to {to}")]
    IllegalTransition { from: OrderStatus, to: OrderStatus },
    #[error("order {0} changed status concurrently")]
    Conflict(Uuid),
    #[error(transparent)]
    Corrupt(#[from] DomainError),
    #[error(transparent)]
    Database(#[from] diesel::result::Error),
    #[error(transparent)]
    Pool(#[from] PoolError),
}

#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("{}", .0.join("; "))]
    InvalidDetails(Vec<String>),
    #[error(transparent)]
    Order(#[from] OrderCreationError),
}

/// Order metadata for [`OrderService::create_order`]. A caller-supplied
/// `discount_amount` must lie within the cart subtotal.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderRequest {
    pub customer_name: String,
    pub customer_email: String,
    pub shipping_address: String,
    pub notes: Option<String>,
    pub coupon_id: Option<Uuid>,
    pub discount_amount: Option<BigDecimal>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckoutRequest {
    pub customer_name: String,
    pub customer_email: String,
    pub shipping_address: String,
    pub notes: Option<String>,
    pub coupon_code: Option<String>,
}

impl CheckoutRequest {
    /// One message per unusable customer detail.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.customer_name.trim().is_empty() {
            errors.push("Name is required".to_string());
        }
        if !is_valid_email(self.customer_email.trim()) {
            errors.push("Valid email is required".to_string());
        }
        if self.shipping_address.trim().is_empty() {
            errors.push("Shipping address is required".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn coupon_code(&self) -> Option<String> {
        self.coupon_code
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(str::to_string)
    }
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain.contains('.')
        && domain.split('.').all(|label| !label.is_empty())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub search: Option<String>,
}

struct PricedLine {
    product: ProductRef,
    quantity: i32,
    unit_price: BigDecimal,
}

#[derive(Clone)]
pub struct OrderService {
    pool: DbPool,
    notifier: Arc<dyn Notifier>,
    coupons: CouponService,
}

impl OrderService {
    pub fn new(pool: DbPool, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            coupons: CouponService::new(pool.clone()),
            pool,
            notifier,
        }
    }

    /// Turns the user's cart into an order in one transaction: order row,
    /// one item per cart line at today's price, stock decrement, cart cleared.
    /// The confirmation email goes out after commit and cannot fail the order.
    pub async fn create_order(
        &self,
        user_id: Uuid,
        request: OrderRequest,
    ) -> Result<Order, OrderCreationError> {
        self.place_order(user_id, request, None).await
    }

    /// Validates the customer details, places the order with the coupon
    /// priced against the subtotal inside the order transaction, and records
    /// the redemption once the order exists.
    pub async fn checkout(
        &self,
        user_id: Uuid,
        request: CheckoutRequest,
    ) -> Result<Order, CheckoutError> {
        request.validate().map_err(CheckoutError::InvalidDetails)?;

        let coupon_code = request.coupon_code();
        let order_request = OrderRequest {
            customer_name: request.customer_name.trim().to_string(),
            customer_email: request.customer_email.trim().to_string(),
            shipping_address: request.shipping_address.trim().to_string(),
            notes: request.notes,
            coupon_id: None,
            discount_amount: None,
        };
        let order = self.place_order(user_id, order_request, coupon_code).await?;

        if let Some(coupon_id) = order.coupon_id {
            if let Err(e) = self
                .coupons
                .record_usage(coupon_id, user_id, order.id, &order.discount_amount)
                .await
            {
                warn!(
                    "Failed to record coupon {} usage for order {}: {}",
                    coupon_id, order.order_number, e
                );
            }
        }

        Ok(order)
    }

    async fn place_order(
        &self,
        user_id: Uuid,
        request: OrderRequest,
        coupon_code: Option<String>,
    ) -> Result<Order, OrderCreationError> {
        let mut conn = self.pool.get().await?;

        let order = conn
            .transaction::<_, OrderCreationError, _>(|conn| {
                Box::pin(async move {
                    let lines = load_priced_cart(conn, user_id).await?;
                    if lines.is_empty() {
                        return Err(OrderCreationError::EmptyCart);
                    }

                    let subtotal = lines.iter().fold(BigDecimal::zero(), |acc, line| {
                        acc + &line.unit_price * BigDecimal::from(line.quantity)
                    });

                    let (coupon_id, discount) = match coupon_code {
                        Some(code) => {
                            let (coupon_id, discount) = quote_coupon(conn, &code, &subtotal).await?;
                            (Some(coupon_id), discount)
                        }
                        None => (
                            request.coupon_id,
                            request.discount_amount.unwrap_or_else(BigDecimal::zero),
                        ),
                    };
                    if discount < BigDecimal::zero() || discount > subtotal {
                        return Err(OrderCreationError::DiscountOutOfRange { discount, subtotal });
                    }
                    let total = &subtotal - &discount;

                    let new_order = NewOrder {
                        id: Uuid::new_v4(),
                        user_id,
                        order_number: generate_order_number(Utc::now(), &mut rand::thread_rng()),
                        subtotal_nzd: subtotal,
                        discount_amount: discount,
                        total_nzd: total,
                        customer_name: request.customer_name,
                        customer_email: request.customer_email,
                        shipping_address: request.shipping_address,
                        notes: request.notes,
                        coupon_id,
                        status: OrderStatus::Pending.as_str().to_string(),
                    };

                    let order = diesel::insert_into(orders::table)
                        .values(&new_order)
                        .get_result::<Order>(conn)
                        .await?;

                    for line in &lines {
                        let item = NewOrderItem {
                            id: Uuid::new_v4(),
                            order_id: order.id,
                            card_id: line.product.card_id(),
                            figurine_id: line.product.figurine_id(),
                            quantity: line.quantity,
                            price_nzd: line.unit_price.clone(),
                        };
                        diesel::insert_into(order_items::table)
                            .values(&item)
                            .execute(conn)
                            .await?;

                        decrement_stock(conn, line.product, line.quantity).await?;
                    }

                    diesel::delete(cart::table.filter(cart::user_id.eq(user_id)))
                        .execute(conn)
                        .await?;

                    Ok(order)
                })
            })
            .await?;
        drop(conn);

        info!(
            "Order {} created for user {} (total {})",
            order.order_number, user_id, order.total_nzd
        );

        self.send_confirmation(&order).await;
        Ok(order)
    }

    /// Moves an order along the status state machine and notifies the
    /// customer.
    pub async fn update_status(
        &self,
        order_id: Uuid,
        next: OrderStatus,
    ) -> Result<Order, OrderStatusError> {
        let mut conn = self.pool.get().await?;

        let order = orders::table
            .find(order_id)
            .first::<Order>(&mut conn)
            .await
            .optional()?
            .ok_or(OrderStatusError::NotFound(order_id))?;

        let current = order.status()?;
        if !current.can_transition_to(next) {
            return Err(OrderStatusError::IllegalTransition { from: current, to: next });
        }

        let updated = diesel::update(
            orders::table
                .filter(orders::id.eq(order_id))
                .filter(orders::status.eq(current.as_str())),
        )
        .set((
            orders::status.eq(next.as_str()),
            orders::updated_at.eq(Some(Utc::now())),
        ))
        .get_result::<Order>(&mut conn)
        .await
        .optional()?
        .ok_or(OrderStatusError::Conflict(order_id))?;
        drop(conn);

        info!("Order {} moved from {} to {}", updated.order_number, current, next);

        let email = notifier::order_status_update(&updated, next);
        if let Err(e) = self.notifier.send(email).await {
            warn!(
                "Failed to send status update email for order {}: {}",
                updated.order_number, e
            );
        }

        Ok(updated)
    }

    pub async fn find_by_id(&self, order_id: Uuid) -> Result<Option<Order>, OrderCreationError> {
        let mut conn = self.pool.get().await?;
        let order = orders::table
            .find(order_id)
            .first::<Order>(&mut conn)
            .await
            .optional()?;
        Ok(order)
    }

    pub async fn find_by_order_number(
        &self,
        order_number: &str,
    ) -> Result<Option<Order>, OrderCreationError> {
        let mut conn = self.pool.get().await?;
        let order = orders::table
            .filter(orders::order_number.eq(order_number))
            .first::<Order>(&mut conn)
            .await
            .optional()?;
        Ok(order)
    }

    pub async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<Order>, OrderCreationError> {
        let mut conn = self.pool.get().await?;
        let found = orders::table
            .filter(orders::user_id.eq(user_id))
            .order(orders::created_at.desc())
            .load::<Order>(&mut conn)
            .await?;
        Ok(found)
    }

    /// Admin listing, newest first.
    pub async fn find_all(&self, filter: OrderFilter) -> Result<Vec<Order>, OrderCreationError> {
        let mut conn = self.pool.get().await?;
        let mut query = orders::table.into_boxed();

        if let Some(status) = filter.status {
            query = query.filter(orders::status.eq(status.as_str()));
        }
        if let Some(search) = filter.search.filter(|s| !s.trim().is_empty()) {
            let pattern = format!("%{}%", search.trim());
            query = query.filter(
                orders::order_number
                    .ilike(pattern.clone())
                    .or(orders::customer_name.ilike(pattern.clone()))
                    .or(orders::customer_email.ilike(pattern)),
            );
        }

        let found = query
            .order(orders::created_at.desc())
            .load::<Order>(&mut conn)
            .await?;
        Ok(found)
    }

    pub async fn items(&self, order_id: Uuid) -> Result<Vec<OrderItemDetail>, OrderCreationError> {
        let mut conn = self.pool.get().await?;
        let details = load_item_details(&mut conn, order_id).await?;
        Ok(details)
    }

    async fn send_confirmation(&self, order: &Order) {
        let items = match self.items(order.id).await {
            Ok(items) => items,
            Err(e) => {
                warn!(
                    "Failed to load items for confirmation of order {}: {}",
                    order.order_number, e
                );
                return;
            }
        };

        let email = notifier::order_confirmation(order, &items);
        if let Err(e) = self.notifier.send(email).await {
            warn!(
                "Failed to send order confirmation email for {}: {}",
                order.order_number, e
            );
        }
    }
}

/// Prices a coupon against the subtotal of the cart being ordered.
async fn quote_coupon(
    conn: &mut AsyncPgConnection,
    code: &str,
    subtotal: &BigDecimal,
) -> Result<(Uuid, BigDecimal), OrderCreationError> {
    let coupon = coupons::table
        .filter(coupons::code.eq(normalize_code(code)))
        .first::<Coupon>(conn)
        .await
        .optional()?
        .ok_or(CouponRejection::InvalidCode)?;
    let terms = CouponTerms::try_from(&coupon)?;
    let discount = terms.evaluate(Utc::now(), subtotal)?;
    Ok((coupon.id, discount))
}

async fn load_priced_cart(
    conn: &mut AsyncPgConnection,
    user_id: Uuid,
) -> Result<Vec<PricedLine>, OrderCreationError> {
    let rows = cart::table
        .left_join(cards::table)
        .left_join(figurines::table)
        .filter(cart::user_id.eq(user_id))
        .order(cart::added_at.asc())
        .select((
            cart::all_columns,
            cards::price_nzd.nullable(),
            figurines::price_nzd.nullable(),
        ))
        .load::<(CartItem, Option<BigDecimal>, Option<BigDecimal>)>(conn)
        .await?;

    rows.into_iter()
        .map(|(item, card_price, figurine_price)| {
            let product = item
                .product()
                .ok_or(OrderCreationError::InvalidLine(item.id))?;
            let unit_price = match product {
                ProductRef::Card(_) => card_price,
                ProductRef::Figurine(_) => figurine_price,
            }
            .ok_or(OrderCreationError::Unpriced(product))?;
            Ok(PricedLine {
                product,
                quantity: item.quantity,
                unit_price,
            })
        })
        .collect()
}

/// Takes `quantity` out of stock only if that much is on hand.
async fn decrement_stock(
    conn: &mut AsyncPgConnection,
    product: ProductRef,
    quantity: i32,
) -> Result<(), OrderCreationError> {
    let updated = match product {
        ProductRef::Card(id) => {
            diesel::update(
                cards::table
                    .filter(cards::id.eq(id))
                    .filter(cards::quantity.ge(quantity)),
            )
            .set(cards::quantity.eq(cards::quantity - quantity))
            .execute(conn)
            .await?
        }
        ProductRef::Figurine(id) => {
            diesel::update(
                figurines::table
                    .filter(figurines::id.eq(id))
                    .filter(figurines::quantity.ge(quantity)),
            )
            .set(figurines::quantity.eq(figurines::quantity - quantity))
            .execute(conn)
            .await?
        }
    };

    if updated == 0 {
        return Err(OrderCreationError::OutOfStock {
            product,
            requested: quantity,
        });
    }
    Ok(())
}

async fn load_item_details(
    conn: &mut AsyncPgConnection,
    order_id: Uuid,
) -> Result<Vec<OrderItemDetail>, diesel::result::Error> {
    let rows = order_items::table
        .left_join(cards::table)
        .left_join(figurines::table)
        .filter(order_items::order_id.eq(order_id))
        .select((
            order_items::all_columns,
            cards::card_name.nullable(),
            cards::set_name.nullable(),
            figurines::product_name.nullable(),
        ))
        .load::<(OrderItem, Option<String>, Option<String>, Option<String>)>(conn)
        .await?;

    Ok(rows
        .into_iter()
        .map(|(item, card_name, set_name, product_name)| OrderItemDetail {
            item,
            card_name,
            set_name,
            product_name,
        })
        .collect())
}
