use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use shared::*;
use uuid::Uuid;

#[derive(Debug, Clone, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::cards)]
pub struct Card {
    pub id: Uuid,
    pub card_name: String,
    pub set_name: Option<String>,
    pub card_number: Option<String>,
    pub year: Option<i32>,
    pub sport_type: Option<String>,
    pub condition: Option<String>,
    pub price_nzd: Option<BigDecimal>,
    pub quantity: i32,
    pub description: Option<String>,
    pub player_name: Option<String>,
    pub rarity: Option<String>,
    pub graded: bool,
    pub grade_company: Option<String>,
    pub grade_value: Option<String>,
    pub available: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable, Deserialize)]
#[diesel(table_name = crate::schema::cards)]
pub struct NewCard {
    pub id: Uuid,
    pub card_name: String,
    pub set_name: Option<String>,
    pub card_number: Option<String>,
    pub year: Option<i32>,
    pub sport_type: Option<String>,
    pub condition: Option<String>,
    pub price_nzd: Option<BigDecimal>,
    pub quantity: i32,
    pub description: Option<String>,
    pub player_name: Option<String>,
    pub rarity: Option<String>,
    pub graded: bool,
    pub grade_company: Option<String>,
    pub grade_value: Option<String>,
    pub available: bool,
}

impl From<&CardDraft> for NewCard {
    fn from(draft: &CardDraft) -> Self {
        Self {
            id: Uuid::new_v4(),
            card_name: draft.card_name.clone(),
            set_name: draft.set_name.clone(),
            card_number: draft.card_number.clone(),
            year: draft.year,
            sport_type: draft.sport_type.clone(),
            condition: draft.condition.map(|c| c.as_str().to_string()),
            price_nzd: draft.price_nzd.clone(),
            quantity: draft.quantity_or_default(),
            description: draft.description.clone(),
            player_name: draft.player_name.clone(),
            rarity: draft.rarity.clone(),
            graded: draft.graded_or_default(),
            grade_company: draft.grade_company.clone(),
            grade_value: draft.grade_value.clone(),
            available: true,
        }
    }
}

/// Full overwrite of the importable columns. Values the CSV left out are
/// written as NULL (or the insert default for the non-null columns).
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = crate::schema::cards, treat_none_as_null = true)]
pub struct CardOverwrite {
    pub card_name: String,
    pub set_name: Option<String>,
    pub card_number: Option<String>,
    pub year: Option<i32>,
    pub sport_type: Option<String>,
    pub condition: Option<String>,
    pub price_nzd: Option<BigDecimal>,
    pub quantity: i32,
    pub description: Option<String>,
    pub player_name: Option<String>,
    pub rarity: Option<String>,
    pub graded: bool,
    pub grade_company: Option<String>,
    pub grade_value: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&CardDraft> for CardOverwrite {
    fn from(draft: &CardDraft) -> Self {
        Self {
            card_name: draft.card_name.clone(),
            set_name: draft.set_name.clone(),
            card_number: draft.card_number.clone(),
            year: draft.year,
            sport_type: draft.sport_type.clone(),
            condition: draft.condition.map(|c| c.as_str().to_string()),
            price_nzd: draft.price_nzd.clone(),
            quantity: draft.quantity_or_default(),
            description: draft.description.clone(),
            player_name: draft.player_name.clone(),
            rarity: draft.rarity.clone(),
            graded: draft.graded_or_default(),
            grade_company: draft.grade_company.clone(),
            grade_value: draft.grade_value.clone(),
            updated_at: Some(Utc::now()),
        }
    }
}

/// Existing inventory row matched by duplicate detection.
#[derive(Debug, Clone, QueryableByName, Serialize, Deserialize)]
pub struct ExistingCard {
    #[diesel(sql_type = diesel::sql_types::Uuid)]
    pub id: Uuid,
    #[diesel(sql_type = diesel::sql_types::Varchar)]
    pub card_name: String,
    #[diesel(sql_type = diesel::sql_types::Nullable<diesel::sql_types::Varchar>)]
    pub set_name: Option<String>,
    #[diesel(sql_type = diesel::sql_types::Nullable<diesel::sql_types::Varchar>)]
    pub card_number: Option<String>,
    #[diesel(sql_type = diesel::sql_types::Nullable<diesel::sql_types::Numeric>)]
    pub price_nzd: Option<BigDecimal>,
    #[diesel(sql_type = diesel::sql_types::Int4)]
    pub quantity: i32,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::figurines)]
pub struct Figurine {
    pub id: Uuid,
    pub product_name: String,
    pub description: Option<String>,
    pub price_nzd: BigDecimal,
    pub quantity: i32,
    pub available: bool,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable, Deserialize)]
#[diesel(table_name = crate::schema::figurines)]
pub struct NewFigurine {
    pub id: Uuid,
    pub product_name: String,
    pub description: Option<String>,
    pub price_nzd: BigDecimal,
    pub quantity: i32,
    pub available: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::cart)]
pub struct CartItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub card_id: Option<Uuid>,
    pub figurine_id: Option<Uuid>,
    pub quantity: i32,
    pub added_at: Option<DateTime<Utc>>,
}

impl CartItem {
    pub fn product(&self) -> Option<ProductRef> {
        ProductRef::from_columns(self.card_id, self.figurine_id)
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::cart)]
pub struct NewCartItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub card_id: Option<Uuid>,
    pub figurine_id: Option<Uuid>,
    pub quantity: i32,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::orders)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub order_number: String,
    pub subtotal_nzd: BigDecimal,
    pub discount_amount: BigDecimal,
    pub total_nzd: BigDecimal,
    pub customer_name: String,
    pub customer_email: String,
    pub shipping_address: String,
    pub notes: Option<String>,
    pub coupon_id: Option<Uuid>,
    pub status: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn status(&self) -> Result<OrderStatus, DomainError> {
        self.status.parse()
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::orders)]
pub struct NewOrder {
    pub id: Uuid,
    pub user_id: Uuid,
    pub order_number: String,
    pub subtotal_nzd: BigDecimal,
    pub discount_amount: BigDecimal,
    pub total_nzd: BigDecimal,
    pub customer_name: String,
    pub customer_email: String,
    pub shipping_address: String,
    pub notes: Option<String>,
    pub coupon_id: Option<Uuid>,
    pub status: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::order_items)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub card_id: Option<Uuid>,
    pub figurine_id: Option<Uuid>,
    pub quantity: i32,
    pub price_nzd: BigDecimal,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::order_items)]
pub struct NewOrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub card_id: Option<Uuid>,
    pub figurine_id: Option<Uuid>,
    pub quantity: i32,
    pub price_nzd: BigDecimal,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::coupons)]
pub struct Coupon {
    pub id: Uuid,
    pub code: String,
    pub discount_type: String,
    pub discount_value: BigDecimal,
    pub min_purchase_amount: Option<BigDecimal>,
    pub max_discount_amount: Option<BigDecimal>,
    pub usage_limit: Option<i32>,
    pub used_count: i32,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub active: bool,
    pub created_at: Option<DateTime<Utc>>,
}

impl TryFrom<&Coupon> for CouponTerms {
    type Error = DomainError;

    fn try_from(coupon: &Coupon) -> Result<Self, Self::Error> {
        Ok(Self {
            discount_type: coupon.discount_type.parse()?,
            discount_value: coupon.discount_value.clone(),
            min_purchase_amount: coupon.min_purchase_amount.clone(),
            max_discount_amount: coupon.max_discount_amount.clone(),
            usage_limit: coupon.usage_limit,
            used_count: coupon.used_count,
            valid_from: coupon.valid_from,
            valid_until: coupon.valid_until,
            active: coupon.active,
        })
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::coupons)]
pub struct NewCoupon {
    pub id: Uuid,
    pub code: String,
    pub discount_type: String,
    pub discount_value: BigDecimal,
    pub min_purchase_amount: Option<BigDecimal>,
    pub max_discount_amount: Option<BigDecimal>,
    pub usage_limit: Option<i32>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub active: bool,
}

/// Partial coupon edit. `None` leaves the column as it is.
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = crate::schema::coupons)]
pub struct CouponChangeset {
    pub code: Option<String>,
    pub discount_type: Option<String>,
    pub discount_value: Option<BigDecimal>,
    pub min_purchase_amount: Option<BigDecimal>,
    pub max_discount_amount: Option<BigDecimal>,
    pub usage_limit: Option<i32>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub active: Option<bool>,
}

impl CouponChangeset {
    pub fn is_empty(&self) -> bool {
        self.code.is_none()
            && self.discount_type.is_none()
            && self.discount_value.is_none()
            && self.min_purchase_amount.is_none()
            && self.max_discount_amount.is_none()
            && self.usage_limit.is_none()
            && self.valid_from.is_none()
            && self.valid_until.is_none()
            && self.active.is_none()
    }
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::coupon_usage)]
pub struct CouponUsage {
    pub id: Uuid,
    pub coupon_id: Uuid,
    pub user_id: Uuid,
    pub order_id: Uuid,
    pub discount_amount: BigDecimal,
    pub used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::coupon_usage)]
pub struct NewCouponUsage {
    pub id: Uuid,
    pub coupon_id: Uuid,
    pub user_id: Uuid,
    pub order_id: Uuid,
    pub discount_amount: BigDecimal,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::csv_imports)]
pub struct CsvImport {
    pub id: Uuid,
    pub user_id: Uuid,
    pub filename: String,
    pub total_rows: i32,
    pub successful_rows: i32,
    pub failed_rows: i32,
    pub duplicates_skipped: i32,
    pub status: String,
    pub error_log: serde_json::Value,
    pub created_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl CsvImport {
    pub fn status(&self) -> Result<ImportStatus, DomainError> {
        self.status.parse()
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::csv_imports)]
pub struct NewCsvImport {
    pub id: Uuid,
    pub user_id: Uuid,
    pub filename: String,
    pub total_rows: i32,
    pub status: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::email_queue)]
pub struct QueuedEmail {
    pub id: Uuid,
    pub recipient_email: String,
    pub subject: String,
    pub body: String,
    pub template_name: Option<String>,
    pub template_data: Option<serde_json::Value>,
    pub sent: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::email_queue)]
pub struct NewQueuedEmail {
    pub id: Uuid,
    pub recipient_email: String,
    pub subject: String,
    pub body: String,
    pub template_name: Option<String>,
    pub template_data: Option<serde_json::Value>,
}

/// An order line joined with the name of what was bought.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItemDetail {
    #[serde(flatten)]
    pub item: OrderItem,
    pub card_name: Option<String>,
    pub set_name: Option<String>,
    pub product_name: Option<String>,
}

impl OrderItemDetail {
    pub fn display_name(&self) -> &str {
        self.card_name
            .as_deref()
            .or(self.product_name.as_deref())
            .unwrap_or("Item no longer listed")
    }
}
