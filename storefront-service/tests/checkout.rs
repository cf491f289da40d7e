mod common;

use common::*;
use shared::{DiscountType, OrderStatus, ProductRef};
use std::sync::Arc;
use storefront_service::cart::CartService;
use storefront_service::coupons::{CouponDraft, CouponService};
use storefront_service::inventory::InventoryService;
use storefront_service::orders::{
    CheckoutError, CheckoutRequest, OrderCreationError, OrderFilter, OrderRequest, OrderService,
    OrderStatusError,
};
use uuid::Uuid;

fn coupon(code: &str, discount_type: DiscountType, value: &str) -> CouponDraft {
    CouponDraft {
        code: code.to_string(),
        discount_type,
        discount_value: dec(value),
        min_purchase_amount: None,
        max_discount_amount: None,
        usage_limit: None,
        valid_from: None,
        valid_until: None,
    }
}

fn checkout_details(coupon_code: Option<String>) -> CheckoutRequest {
    CheckoutRequest {
        customer_name: "Sam Collector".to_string(),
        customer_email: "sam@example.com".to_string(),
        shipping_address: "1 Queen Street, Auckland".to_string(),
        notes: None,
        coupon_code,
    }
}

fn customer() -> OrderRequest {
    OrderRequest {
        customer_name: "Sam Collector".to_string(),
        customer_email: "sam@example.com".to_string(),
        shipping_address: "1 Queen Street, Auckland".to_string(),
        ..OrderRequest::default()
    }
}

#[tokio::test]
async fn checkout_with_coupon_discounts_and_clears_cart() {
    let Some(pool) = test_pool().await else { return };
    let tag = tag();
    let inventory = InventoryService::new(pool.clone());
    let cart = CartService::new(pool.clone());
    let coupons = CouponService::new(pool.clone());
    let notifier = RecordingNotifier::new();
    let orders = OrderService::new(pool.clone(), notifier.clone());

    let card = inventory
        .create_card(card(&format!("Jordan Rookie {}", tag), Some("1986 Fleer"), Some("57"), "50.00", 5))
        .await
        .unwrap();
    let figurine = inventory
        .create_figurine(figurine(&format!("Pikachu Statue {}", tag), "25.00", 3))
        .await
        .unwrap();
    let code = format!("SAVE10{}", tag);
    let coupon = coupons
        .create(CouponDraft {
            code: code.clone(),
            discount_type: DiscountType::Percentage,
            discount_value: dec("10"),
            min_purchase_amount: None,
            max_discount_amount: None,
            usage_limit: None,
            valid_from: None,
            valid_until: None,
        })
        .await
        .unwrap();

    let user_id = Uuid::new_v4();
    cart.add_item(user_id, ProductRef::Card(card.id), 2).await.unwrap();
    cart.add_item(user_id, ProductRef::Figurine(figurine.id), 1).await.unwrap();

    let order = orders
        .checkout(
            user_id,
            CheckoutRequest {
                customer_name: "Sam Collector".to_string(),
                customer_email: "sam@example.com".to_string(),
                shipping_address: "1 Queen Street, Auckland".to_string(),
                notes: None,
                coupon_code: Some(code.to_lowercase()),
            },
        )
        .await
        .unwrap();

    assert_eq!(order.subtotal_nzd, dec("125.00"));
    assert_eq!(order.discount_amount, dec("12.50"));
    assert_eq!(order.total_nzd, dec("112.50"));
    assert_eq!(order.coupon_id, Some(coupon.id));
    assert_eq!(order.status().unwrap(), OrderStatus::Pending);
    assert!(order.order_number.starts_with("ORD-"));

    let items = orders.items(order.id).await.unwrap();
    assert_eq!(items.len(), 2);
    let card_line = items.iter().find(|d| d.item.card_id == Some(card.id)).unwrap();
    assert_eq!(card_line.item.quantity, 2);
    assert_eq!(card_line.item.price_nzd, dec("50.00"));

    assert!(cart.items(user_id).await.unwrap().is_empty());
    assert_eq!(inventory.find_card(card.id).await.unwrap().unwrap().quantity, 3);
    assert_eq!(inventory.find_figurine(figurine.id).await.unwrap().unwrap().quantity, 2);

    let redeemed = coupons.find_by_code(&code).await.unwrap().unwrap();
    assert_eq!(redeemed.used_count, 1);

    assert_eq!(
        notifier.subjects(),
        vec![format!("Order Confirmation - {}", order.order_number)]
    );
}

#[tokio::test]
async fn empty_cart_creates_nothing() {
    let Some(pool) = test_pool().await else { return };
    let orders = OrderService::new(pool.clone(), RecordingNotifier::new());
    let user_id = Uuid::new_v4();

    let result = orders.create_order(user_id, customer()).await;

    assert!(matches!(result, Err(OrderCreationError::EmptyCart)));
    assert!(orders.find_by_user(user_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn insufficient_stock_rolls_back_everything() {
    let Some(pool) = test_pool().await else { return };
    let tag = tag();
    let inventory = InventoryService::new(pool.clone());
    let cart = CartService::new(pool.clone());
    let orders = OrderService::new(pool.clone(), RecordingNotifier::new());

    let plentiful = inventory
        .create_card(card(&format!("Common {}", tag), None, None, "1.00", 10))
        .await
        .unwrap();
    let scarce = inventory
        .create_card(card(&format!("Scarce {}", tag), None, None, "99.00", 1))
        .await
        .unwrap();

    let user_id = Uuid::new_v4();
    cart.add_item(user_id, ProductRef::Card(plentiful.id), 3).await.unwrap();
    cart.add_item(user_id, ProductRef::Card(scarce.id), 2).await.unwrap();

    let result = orders.create_order(user_id, customer()).await;

    match result {
        Err(OrderCreationError::OutOfStock { product, requested }) => {
            assert_eq!(product, ProductRef::Card(scarce.id));
            assert_eq!(requested, 2);
        }
        other => panic!("expected out of stock, got {:?}", other.map(|o| o.id)),
    }
    assert!(orders.find_by_user(user_id).await.unwrap().is_empty());
    assert_eq!(cart.items(user_id).await.unwrap().len(), 2);
    assert_eq!(inventory.find_card(plentiful.id).await.unwrap().unwrap().quantity, 10);
    assert_eq!(inventory.find_card(scarce.id).await.unwrap().unwrap().quantity, 1);
}

#[tokio::test]
async fn rejected_coupon_blocks_checkout() {
    let Some(pool) = test_pool().await else { return };
    let tag = tag();
    let inventory = InventoryService::new(pool.clone());
    let cart = CartService::new(pool.clone());
    let orders = OrderService::new(pool.clone(), RecordingNotifier::new());

    let card = inventory
        .create_card(card(&format!("Griffey {}", tag), None, None, "10.00", 2))
        .await
        .unwrap();
    let user_id = Uuid::new_v4();
    cart.add_item(user_id, ProductRef::Card(card.id), 1).await.unwrap();

    let result = orders
        .checkout(
            user_id,
            CheckoutRequest {
                customer_name: "Sam Collector".to_string(),
                customer_email: "sam@example.com".to_string(),
                shipping_address: "1 Queen Street, Auckland".to_string(),
                notes: None,
                coupon_code: Some(format!("NOPE{}", tag)),
            },
        )
        .await;

    assert!(matches!(
        result,
        Err(CheckoutError::Order(OrderCreationError::Coupon(_)))
    ));
    assert_eq!(cart.items(user_id).await.unwrap().len(), 1);
    assert!(orders.find_by_user(user_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn notifier_failure_does_not_fail_the_order() {
    let Some(pool) = test_pool().await else { return };
    let tag = tag();
    let inventory = InventoryService::new(pool.clone());
    let cart = CartService::new(pool.clone());
    let orders = OrderService::new(pool.clone(), Arc::new(BrokenNotifier));

    let card = inventory
        .create_card(card(&format!("Gretzky {}", tag), None, None, "40.00", 1))
        .await
        .unwrap();
    let user_id = Uuid::new_v4();
    cart.add_item(user_id, ProductRef::Card(card.id), 1).await.unwrap();

    let order = orders.create_order(user_id, customer()).await.unwrap();

    assert_eq!(order.total_nzd, dec("40.00"));
    assert!(cart.items(user_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn status_follows_the_order_lifecycle() {
    let Some(pool) = test_pool().await else { return };
    let tag = tag();
    let inventory = InventoryService::new(pool.clone());
    let cart = CartService::new(pool.clone());
    let notifier = RecordingNotifier::new();
    let orders = OrderService::new(pool.clone(), notifier.clone());

    let card = inventory
        .create_card(card(&format!("Ohtani {}", tag), None, None, "15.00", 4))
        .await
        .unwrap();
    let user_id = Uuid::new_v4();
    cart.add_item(user_id, ProductRef::Card(card.id), 1).await.unwrap();
    let order = orders.create_order(user_id, customer()).await.unwrap();

    let skipped = orders.update_status(order.id, OrderStatus::Completed).await;
    assert!(matches!(
        skipped,
        Err(OrderStatusError::IllegalTransition {
            from: OrderStatus::Pending,
            to: OrderStatus::Completed
        })
    ));

    for next in [OrderStatus::Processing, OrderStatus::Shipped, OrderStatus::Completed] {
        let updated = orders.update_status(order.id, next).await.unwrap();
        assert_eq!(updated.status().unwrap(), next);
        assert!(updated.updated_at.is_some());
    }

    let reopened = orders.update_status(order.id, OrderStatus::Cancelled).await;
    assert!(matches!(reopened, Err(OrderStatusError::IllegalTransition { .. })));

    let missing = orders.update_status(Uuid::new_v4(), OrderStatus::Processing).await;
    assert!(matches!(missing, Err(OrderStatusError::NotFound(_))));

    let status_mails = notifier
        .subjects()
        .into_iter()
        .filter(|s| s.starts_with("Order Status Update"))
        .count();
    assert_eq!(status_mails, 3);
}

#[tokio::test]
async fn admin_listing_filters_by_status_and_search() {
    let Some(pool) = test_pool().await else { return };
    let tag = tag();
    let inventory = InventoryService::new(pool.clone());
    let cart = CartService::new(pool.clone());
    let orders = OrderService::new(pool.clone(), RecordingNotifier::new());

    let card = inventory
        .create_card(card(&format!("Messi {}", tag), None, None, "5.00", 2))
        .await
        .unwrap();
    let user_id = Uuid::new_v4();
    cart.add_item(user_id, ProductRef::Card(card.id), 1).await.unwrap();
    let order = orders
        .create_order(
            user_id,
            OrderRequest {
                customer_email: format!("buyer-{}@example.com", tag),
                ..customer()
            },
        )
        .await
        .unwrap();
    orders.update_status(order.id, OrderStatus::Cancelled).await.unwrap();

    let by_number = orders.find_by_order_number(&order.order_number).await.unwrap();
    assert_eq!(by_number.map(|o| o.id), Some(order.id));

    let cancelled = orders
        .find_all(OrderFilter {
            status: Some(OrderStatus::Cancelled),
            search: Some(tag.to_uppercase()),
        })
        .await
        .unwrap();
    assert_eq!(cancelled.len(), 1);
    assert_eq!(cancelled[0].id, order.id);

    let pending = orders
        .find_all(OrderFilter {
            status: Some(OrderStatus::Pending),
            search: Some(tag.clone()),
        })
        .await
        .unwrap();
    assert!(pending.is_empty());
}

#[tokio::test]
async fn discount_larger_than_subtotal_is_refused() {
    let Some(pool) = test_pool().await else { return };
    let tag = tag();
    let inventory = InventoryService::new(pool.clone());
    let cart = CartService::new(pool.clone());
    let orders = OrderService::new(pool.clone(), RecordingNotifier::new());

    let card = inventory
        .create_card(card(&format!("Bird {}", tag), None, None, "20.00", 2))
        .await
        .unwrap();
    let user_id = Uuid::new_v4();
    cart.add_item(user_id, ProductRef::Card(card.id), 1).await.unwrap();

    let result = orders
        .create_order(
            user_id,
            OrderRequest {
                discount_amount: Some(dec("25.00")),
                ..customer()
            },
        )
        .await;

    match result {
        Err(OrderCreationError::DiscountOutOfRange { discount, subtotal }) => {
            assert_eq!(discount, dec("25.00"));
            assert_eq!(subtotal, dec("20.00"));
        }
        other => panic!("expected discount out of range, got {:?}", other.map(|o| o.id)),
    }

    let negative = orders
        .create_order(
            user_id,
            OrderRequest {
                discount_amount: Some(dec("-1")),
                ..customer()
            },
        )
        .await;
    assert!(matches!(negative, Err(OrderCreationError::DiscountOutOfRange { .. })));

    assert!(orders.find_by_user(user_id).await.unwrap().is_empty());
    assert_eq!(cart.items(user_id).await.unwrap().len(), 1);
    assert_eq!(inventory.find_card(card.id).await.unwrap().unwrap().quantity, 2);
}

#[tokio::test]
async fn coupon_is_priced_against_the_cart_that_was_ordered() {
    let Some(pool) = test_pool().await else { return };
    let tag = tag();
    let inventory = InventoryService::new(pool.clone());
    let cart = CartService::new(pool.clone());
    let coupons = CouponService::new(pool.clone());
    let orders = OrderService::new(pool.clone(), RecordingNotifier::new());

    let code = format!("FIFTY{}", tag);
    coupons
        .create(coupon(&code, DiscountType::Fixed, "50"))
        .await
        .unwrap();
    let big = inventory
        .create_card(card(&format!("Trophy {}", tag), None, None, "60.00", 20))
        .await
        .unwrap();
    let small = inventory
        .create_card(card(&format!("Sticker {}", tag), None, None, "10.00", 20))
        .await
        .unwrap();

    let user_id = Uuid::new_v4();
    for _ in 0..10 {
        let big_line = cart.add_item(user_id, ProductRef::Card(big.id), 1).await.unwrap();
        cart.add_item(user_id, ProductRef::Card(small.id), 1).await.unwrap();

        let (placed, _) = tokio::join!(
            orders.checkout(user_id, checkout_details(Some(code.clone()))),
            cart.remove_item(big_line.id, user_id),
        );

        match placed {
            Ok(_)
            | Err(CheckoutError::Order(OrderCreationError::EmptyCart))
            | Err(CheckoutError::Order(OrderCreationError::Coupon(_))) => {}
            Err(other) => panic!("unexpected checkout failure: {}", other),
        }
        cart.clear(user_id).await.unwrap();
    }

    for order in orders.find_by_user(user_id).await.unwrap() {
        assert!(order.discount_amount <= order.subtotal_nzd);
        assert!(order.total_nzd >= dec("0"));
        assert_eq!(order.total_nzd, &order.subtotal_nzd - &order.discount_amount);
    }
}

#[tokio::test]
async fn empty_cart_is_reported_before_coupon_rules() {
    let Some(pool) = test_pool().await else { return };
    let tag = tag();
    let coupons = CouponService::new(pool.clone());
    let orders = OrderService::new(pool.clone(), RecordingNotifier::new());

    let code = format!("BIGSPEND{}", tag);
    coupons
        .create(CouponDraft {
            min_purchase_amount: Some(dec("100")),
            ..coupon(&code, DiscountType::Percentage, "10")
        })
        .await
        .unwrap();

    let user_id = Uuid::new_v4();
    let result = orders.checkout(user_id, checkout_details(Some(code))).await;

    assert!(matches!(
        result,
        Err(CheckoutError::Order(OrderCreationError::EmptyCart))
    ));
}

#[tokio::test]
async fn incomplete_customer_details_write_nothing() {
    let Some(pool) = test_pool().await else { return };
    let tag = tag();
    let inventory = InventoryService::new(pool.clone());
    let cart = CartService::new(pool.clone());
    let orders = OrderService::new(pool.clone(), RecordingNotifier::new());

    let card = inventory
        .create_card(card(&format!("Brady {}", tag), None, None, "30.00", 1))
        .await
        .unwrap();
    let user_id = Uuid::new_v4();
    cart.add_item(user_id, ProductRef::Card(card.id), 1).await.unwrap();

    let result = orders
        .checkout(
            user_id,
            CheckoutRequest {
                customer_name: "   ".to_string(),
                customer_email: "not-an-email".to_string(),
                shipping_address: String::new(),
                notes: None,
                coupon_code: None,
            },
        )
        .await;

    match result {
        Err(CheckoutError::InvalidDetails(errors)) => assert_eq!(
            errors,
            vec![
                "Name is required",
                "Valid email is required",
                "Shipping address is required"
            ]
        ),
        other => panic!("expected invalid details, got {:?}", other.map(|o| o.id)),
    }
    assert!(orders.find_by_user(user_id).await.unwrap().is_empty());
    assert_eq!(cart.items(user_id).await.unwrap().len(), 1);
    assert_eq!(inventory.find_card(card.id).await.unwrap().unwrap().quantity, 1);
}
