pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod coupons;
pub mod inventory;
pub mod orders;
pub mod ratings;
