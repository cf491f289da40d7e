use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use shared::coupon::normalize_code;
use shared::{CouponRejection, CouponTerms, DiscountType, DomainError};
use tracing::info;
use uuid::Uuid;

use crate::db::{DbPool, PoolError};
use crate::models::*;
use crate::schema::*;

#[derive(Debug, thiserror::Error)]
pub enum CouponError {
    #[error(transparent)]
    Rejected(#[from] CouponRejection),
    #[error("stored coupon is malformed: {0}")]
    Malformed(#[from] DomainError),
    #[error("coupon {0} not found")]
    NotFound(Uuid),
    #[error("coupon {0} has been used on orders; deactivate it instead")]
    InUse(Uuid),
    #[error(transparent)]
    Database(#[from] diesel::result::Error),
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// An accepted coupon and the discount it grants for the quoted subtotal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CouponQuote {
    pub coupon_id: Uuid,
    pub code: String,
    pub discount: BigDecimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CouponDraft {
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: BigDecimal,
    pub min_purchase_amount: Option<BigDecimal>,
    pub max_discount_amount: Option<BigDecimal>,
    pub usage_limit: Option<i32>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
}

/// Admin edit of a coupon; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CouponUpdate {
    pub code: Option<String>,
    pub discount_type: Option<DiscountType>,
    pub discount_value: Option<BigDecimal>,
    pub min_purchase_amount: Option<BigDecimal>,
    pub max_discount_amount: Option<BigDecimal>,
    pub usage_limit: Option<i32>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub active: Option<bool>,
}

impl From<CouponUpdate> for CouponChangeset {
    fn from(update: CouponUpdate) -> Self {
        Self {
            code: update.code.as_deref().map(normalize_code),
            discount_type: update.discount_type.map(|t| t.as_str().to_string()),
            discount_value: update.discount_value,
            min_purchase_amount: update.min_purchase_amount,
            max_discount_amount: update.max_discount_amount,
            usage_limit: update.usage_limit,
            valid_from: update.valid_from,
            valid_until: update.valid_until,
            active: update.active,
        }
    }
}

#[derive(Clone)]
pub struct CouponService {
    pool: DbPool,
}

impl CouponService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, draft: CouponDraft) -> Result<Coupon, CouponError> {
        let mut conn = self.pool.get().await?;
        let new_coupon = NewCoupon {
            id: Uuid::new_v4(),
            code: normalize_code(&draft.code),
            discount_type: draft.discount_type.as_str().to_string(),
            discount_value: draft.discount_value,
            min_purchase_amount: draft.min_purchase_amount,
            max_discount_amount: draft.max_discount_amount,
            usage_limit: draft.usage_limit,
            valid_from: draft.valid_from,
            valid_until: draft.valid_until,
            active: true,
        };
        let coupon = diesel::insert_into(coupons::table)
            .values(&new_coupon)
            .get_result::<Coupon>(&mut conn)
            .await?;
        info!("Created coupon {}", coupon.code);
        Ok(coupon)
    }

    pub async fn find_by_code(&self, code: &str) -> Result<Option<Coupon>, CouponError> {
        let mut conn = self.pool.get().await?;
        find_by_code(&mut conn, code).await
    }

    pub async fn list(&self) -> Result<Vec<Coupon>, CouponError> {
        let mut conn = self.pool.get().await?;
        let all = coupons::table
            .order(coupons::created_at.desc())
            .load::<Coupon>(&mut conn)
            .await?;
        Ok(all)
    }

    pub async fn set_active(&self, coupon_id: Uuid, active: bool) -> Result<Coupon, CouponError> {
        let mut conn = self.pool.get().await?;
        diesel::update(coupons::table.find(coupon_id))
            .set(coupons::active.eq(active))
            .get_result::<Coupon>(&mut conn)
            .await
            .optional()?
            .ok_or(CouponError::NotFound(coupon_id))
    }

    pub async fn update(&self, coupon_id: Uuid, update: CouponUpdate) -> Result<Coupon, CouponError> {
        let changes = CouponChangeset::from(update);
        let mut conn = self.pool.get().await?;

        let coupon = if changes.is_empty() {
            coupons::table
                .find(coupon_id)
                .first::<Coupon>(&mut conn)
                .await
                .optional()?
        } else {
            diesel::update(coupons::table.find(coupon_id))
                .set(&changes)
                .get_result::<Coupon>(&mut conn)
                .await
                .optional()?
        };

        let coupon = coupon.ok_or(CouponError::NotFound(coupon_id))?;
        info!("Updated coupon {}", coupon.code);
        Ok(coupon)
    }

    /// Coupons referenced by orders or redemptions cannot be removed.
    pub async fn delete(&self, coupon_id: Uuid) -> Result<(), CouponError> {
        let mut conn = self.pool.get().await?;
        let deleted = diesel::delete(coupons::table.find(coupon_id))
            .execute(&mut conn)
            .await
            .map_err(|e| match e {
                DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => {
                    CouponError::InUse(coupon_id)
                }
                other => CouponError::Database(other),
            })?;
        if deleted == 0 {
            return Err(CouponError::NotFound(coupon_id));
        }
        info!("Deleted coupon {}", coupon_id);
        Ok(())
    }

    pub async fn validate(&self, code: &str, subtotal: &BigDecimal) -> Result<CouponQuote, CouponError> {
        self.validate_at(code, subtotal, Utc::now()).await
    }

    /// Read-only: a quote never consumes a use.
    pub async fn validate_at(
        &self,
        code: &str,
        subtotal: &BigDecimal,
        now: DateTime<Utc>,
    ) -> Result<CouponQuote, CouponError> {
        let mut conn = self.pool.get().await?;
        let coupon = find_by_code(&mut conn, code)
            .await?
            .ok_or(CouponRejection::InvalidCode)?;
        let terms = CouponTerms::try_from(&coupon)?;
        let discount = terms.evaluate(now, subtotal)?;

        Ok(CouponQuote {
            coupon_id: coupon.id,
            code: coupon.code,
            discount,
        })
    }

    /// Counts one redemption and writes its audit row, atomically.
    pub async fn record_usage(
        &self,
        coupon_id: Uuid,
        user_id: Uuid,
        order_id: Uuid,
        discount_amount: &BigDecimal,
    ) -> Result<CouponUsage, CouponError> {
        let mut conn = self.pool.get().await?;
        let discount_amount = discount_amount.clone();

        let usage = conn
            .transaction::<_, CouponError, _>(|conn| {
                Box::pin(async move {
                    let updated = diesel::update(coupons::table.find(coupon_id))
                        .set(coupons::used_count.eq(coupons::used_count + 1))
                        .execute(conn)
                        .await?;
                    if updated == 0 {
                        return Err(CouponError::NotFound(coupon_id));
                    }

                    let usage = NewCouponUsage {
                        id: Uuid::new_v4(),
                        coupon_id,
                        user_id,
                        order_id,
                        discount_amount,
                    };
                    let recorded = diesel::insert_into(coupon_usage::table)
                        .values(&usage)
                        .get_result::<CouponUsage>(conn)
                        .await?;
                    Ok(recorded)
                })
            })
            .await?;

        info!("Coupon {} redeemed on order {}", coupon_id, order_id);
        Ok(usage)
    }
}

async fn find_by_code(
    conn: &mut AsyncPgConnection,
    code: &str,
) -> Result<Option<Coupon>, CouponError> {
    let coupon = coupons::table
        .filter(coupons::code.eq(normalize_code(code)))
        .first::<Coupon>(conn)
        .await
        .optional()?;
    Ok(coupon)
}
