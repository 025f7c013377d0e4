pub mod checkout_commit;
pub mod notification;
pub mod order;
pub mod order_item;
pub mod product;
pub mod product_analytics;
pub mod shop;
pub mod user;
pub mod user_analytics;
