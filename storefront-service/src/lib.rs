pub mod api;
pub mod cart;
pub mod coupons;
pub mod csv_import;
pub mod db;
pub mod inventory;
pub mod models;
pub mod notifier;
pub mod orders;
pub mod outbox;
pub mod schema;
