//! Customer notifications.
//!
//! Emails are rendered here and handed to a [`Notifier`]. The production
//! notifier writes them to `email_queue`; [`crate::outbox::OutboxProcessor`]
//! relays queued mail to the transport. Callers treat every send as best
//! effort and only log failures.

use anyhow::Result;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use diesel_async::RunQueryDsl;
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use shared::OrderStatus;
use std::fmt::Write;
use uuid::Uuid;

use crate::db::DbPool;
use crate::models::{NewQueuedEmail, Order, OrderItemDetail};
use crate::schema::email_queue;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingEmail {
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub template_name: Option<String>,
    pub template_data: Option<serde_json::Value>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<()>;
}

/// Queues mail in the `email_queue` table.
#[derive(Clone)]
pub struct EmailQueue {
    pool: DbPool,
}

impl EmailQueue {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Notifier for EmailQueue {
    async fn send(&self, email: OutgoingEmail) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let row = NewQueuedEmail {
            id: Uuid::new_v4(),
            recipient_email: email.recipient,
            subject: email.subject,
            body: email.body,
            template_name: email.template_name,
            template_data: email.template_data,
        };
        diesel::insert_into(email_queue::table)
            .values(&row)
            .execute(&mut conn)
            .await?;
        Ok(())
    }
}

fn money(amount: &BigDecimal) -> String {
    format!("NZD ${}", amount.with_scale(2))
}

pub fn order_confirmation(order: &Order, items: &[OrderItemDetail]) -> OutgoingEmail {
    let mut body = String::new();
    let _ = writeln!(body, "Dear {},", order.customer_name);
    let _ = writeln!(body);
    let _ = writeln!(
        body,
        "Thank you for your order! We've received your order and will process it shortly."
    );
    let _ = writeln!(body);
    let _ = writeln!(body, "Order #{}", order.order_number);
    if let Some(created_at) = order.created_at {
        let _ = writeln!(body, "Order Date: {}", created_at.format("%d/%m/%Y"));
    }
    let _ = writeln!(body, "Email: {}", order.customer_email);
    let _ = writeln!(body);
    let _ = writeln!(body, "Items:");
    for detail in items {
        let line_total = &detail.item.price_nzd * BigDecimal::from(detail.item.quantity);
        let _ = write!(body, "  {}", detail.display_name());
        if let Some(set_name) = &detail.set_name {
            let _ = write!(body, " ({})", set_name);
        }
        let _ = writeln!(
            body,
            " - Quantity: {} x {} = {}",
            detail.item.quantity,
            money(&detail.item.price_nzd),
            money(&line_total)
        );
    }
    let _ = writeln!(body);
    if order.discount_amount > BigDecimal::zero() {
        let _ = writeln!(body, "Subtotal: {}", money(&order.subtotal_nzd));
        let _ = writeln!(body, "Discount: -{}", money(&order.discount_amount));
    }
    let _ = writeln!(body, "Total: {}", money(&order.total_nzd));
    let _ = writeln!(body);
    let _ = writeln!(body, "Shipping Address:");
    let _ = writeln!(body, "{}", order.shipping_address);
    if let Some(notes) = &order.notes {
        let _ = writeln!(body);
        let _ = writeln!(body, "Order Notes:");
        let _ = writeln!(body, "{}", notes);
    }
    let _ = writeln!(body);
    let _ = writeln!(
        body,
        "We'll send you payment instructions shortly. If you have any questions, please don't hesitate to contact us."
    );

    OutgoingEmail {
        recipient: order.customer_email.clone(),
        subject: format!("Order Confirmation - {}", order.order_number),
        body,
        template_name: Some("order_confirmation".to_string()),
        template_data: Some(serde_json::json!({
            "order": order,
            "items": items,
        })),
    }
}

pub fn order_status_update(order: &Order, status: OrderStatus) -> OutgoingEmail {
    let body = format!(
        "Dear {},\n\nOrder #{} is now {}.\n\n{}\n",
        order.customer_name,
        order.order_number,
        status,
        status.customer_message()
    );

    OutgoingEmail {
        recipient: order.customer_email.clone(),
        subject: format!("Order Status Update - {}", order.order_number),
        body,
        template_name: Some("order_status_update".to_string()),
        template_data: Some(serde_json::json!({
            "order_number": order.order_number,
            "status": status,
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderItem;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn order(discount: &str, notes: Option<&str>) -> Order {
        Order {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            order_number: "ORD-TEST-ABCDE".to_string(),
            subtotal_nzd: dec("125.00"),
            discount_amount: dec(discount),
            total_nzd: dec("125.00") - dec(discount),
            customer_name: "Sam Collector".to_string(),
            customer_email: "sam@example.com".to_string(),
            shipping_address: "1 Queen Street\nAuckland".to_string(),
            notes: notes.map(str::to_string),
            coupon_id: None,
            status: "pending".to_string(),
            created_at: None,
            updated_at: None,
        }
    }

    fn card_line(quantity: i32, price: &str) -> OrderItemDetail {
        OrderItemDetail {
            item: OrderItem {
                id: Uuid::new_v4(),
                order_id: Uuid::new_v4(),
                card_id: Some(Uuid::new_v4()),
                figurine_id: None,
                quantity,
                price_nzd: dec(price),
            },
            card_name: Some("Jordan Rookie".to_string()),
            set_name: Some("1986 Fleer".to_string()),
            product_name: None,
        }
    }

    #[test]
    fn confirmation_lists_items_and_discount() {
        let email = order_confirmation(&order("12.50", Some("Gift wrap")), &[card_line(2, "50")]);
        assert_eq!(email.recipient, "sam@example.com");
        assert_eq!(email.subject, "Order Confirmation - ORD-TEST-ABCDE");
        assert!(email.body.contains("Jordan Rookie (1986 Fleer)"));
        assert!(email.body.contains("Quantity: 2 x NZD $50.00 = NZD $100.00"));
        assert!(email.body.contains("Discount: -NZD $12.50"));
        assert!(email.body.contains("Total: NZD $112.50"));
        assert!(email.body.contains("Gift wrap"));
        assert_eq!(email.template_name.as_deref(), Some("order_confirmation"));
    }

    #[test]
    fn confirmation_without_discount_omits_subtotal_block() {
        let email = order_confirmation(&order("0", None), &[]);
        assert!(!email.body.contains("Discount"));
        assert!(!email.body.contains("Order Notes"));
    }

    #[test]
    fn status_update_uses_status_message() {
        let email = order_status_update(&order("0", None), OrderStatus::Shipped);
        assert_eq!(email.subject, "Order Status Update - ORD-TEST-ABCDE");
        assert!(email.body.contains("is now shipped"));
        assert!(email.body.contains("Your order has been shipped."));
    }
}
