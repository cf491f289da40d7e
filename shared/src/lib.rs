pub mod coupon;
pub mod import;
pub mod order;

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub use coupon::{CouponRejection, CouponTerms, DiscountType};
pub use import::{
    CardCondition, CardDraft, ColumnMapping, DuplicateAction, ImportField, ImportStatus, RawRow,
};
pub use order::{generate_order_number, OrderStatus};

/// The thing a cart line or order line points at. A line always refers to
/// exactly one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ProductRef {
    Card(Uuid),
    Figurine(Uuid),
}

impl ProductRef {
    /// Rebuilds a reference from the two nullable foreign key columns.
    pub fn from_columns(card_id: Option<Uuid>, figurine_id: Option<Uuid>) -> Option<Self> {
        match (card_id, figurine_id) {
            (Some(id), None) => Some(ProductRef::Card(id)),
            (None, Some(id)) => Some(ProductRef::Figurine(id)),
            _ => None,
        }
    }

    pub fn card_id(&self) -> Option<Uuid> {
        match self {
            ProductRef::Card(id) => Some(*id),
            ProductRef::Figurine(_) => None,
        }
    }

    pub fn figurine_id(&self) -> Option<Uuid> {
        match self {
            ProductRef::Figurine(id) => Some(*id),
            ProductRef::Card(_) => None,
        }
    }
}

impl fmt::Display for ProductRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProductRef::Card(id) => write!(f, "card {}", id),
            ProductRef::Figurine(id) => write!(f, "figurine {}", id),
        }
    }
}

/// Failure to read a stored enum value back into its domain type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    #[error("unknown order status: {0}")]
    UnknownOrderStatus(String),
    #[error("unknown discount type: {0}")]
    UnknownDiscountType(String),
    #[error("unknown duplicate action: {0}")]
    UnknownDuplicateAction(String),
    #[error("unknown import status: {0}")]
    UnknownImportStatus(String),
    #[error("unknown card condition: {0}")]
    UnknownCondition(String),
}
