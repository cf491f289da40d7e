#![allow(dead_code)]

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use shared::{CardDraft, ProductRef};
use std::str::FromStr;
use std::sync::{Arc, Mutex, Once};
use storefront_service::cart::CartService;
use storefront_service::db::{self, DbPool};
use storefront_service::inventory::InventoryService;
use storefront_service::models::{NewCard, NewFigurine, Order};
use storefront_service::notifier::{Notifier, OutgoingEmail};
use storefront_service::orders::{OrderRequest, OrderService};
use uuid::Uuid;

static MIGRATE: Once = Once::new();

/// Pool against `TEST_DATABASE_URL`, or `None` when no test database is
/// configured.
pub async fn test_pool() -> Option<DbPool> {
    let url = match std::env::var("TEST_DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("TEST_DATABASE_URL not set, skipping");
            return None;
        }
    };
    MIGRATE.call_once(|| {
        db::run_migrations(&url).expect("migrations should apply");
    });
    Some(db::build_pool(&url).await.expect("pool should connect"))
}

/// Keeps every email in memory.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<OutgoingEmail>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn subjects(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|email| email.subject.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, email: OutgoingEmail) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(email);
        Ok(())
    }
}

/// Always fails, for checking that email trouble never fails an order.
pub struct BrokenNotifier;

#[async_trait]
impl Notifier for BrokenNotifier {
    async fn send(&self, _email: OutgoingEmail) -> anyhow::Result<()> {
        anyhow::bail!("mail relay unavailable")
    }
}

pub fn dec(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

/// Short random tag so rows from concurrent tests never collide.
pub fn tag() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

pub fn card(
    name: &str,
    set_name: Option<&str>,
    card_number: Option<&str>,
    price: &str,
    quantity: i32,
) -> NewCard {
    NewCard::from(&CardDraft {
        card_name: name.to_string(),
        set_name: set_name.map(str::to_string),
        card_number: card_number.map(str::to_string),
        year: None,
        sport_type: None,
        condition: None,
        price_nzd: Some(dec(price)),
        quantity: Some(quantity),
        description: None,
        player_name: None,
        rarity: None,
        graded: None,
        grade_company: None,
        grade_value: None,
    })
}

pub fn figurine(name: &str, price: &str, quantity: i32) -> NewFigurine {
    NewFigurine {
        id: Uuid::new_v4(),
        product_name: name.to_string(),
        description: None,
        price_nzd: dec(price),
        quantity,
        available: true,
    }
}

/// A committed single-card order for a fresh shopper, for tests that need a
/// real order row to point at.
pub async fn placed_order(pool: &DbPool) -> Order {
    let inventory = InventoryService::new(pool.clone());
    let cart = CartService::new(pool.clone());
    let orders = OrderService::new(pool.clone(), RecordingNotifier::new());

    let stock = inventory
        .create_card(card(&format!("Order Filler {}", tag()), None, None, "10.00", 1))
        .await
        .unwrap();
    let user_id = Uuid::new_v4();
    cart.add_item(user_id, ProductRef::Card(stock.id), 1).await.unwrap();
    orders
        .create_order(
            user_id,
            OrderRequest {
                customer_name: "Sam Collector".to_string(),
                customer_email: "sam@example.com".to_string(),
                shipping_address: "1 Queen Street, Auckland".to_string(),
                ..OrderRequest::default()
            },
        )
        .await
        .unwrap()
}
