pub mod addresses;
pub mod auth;
pub mod cart;
pub mod dashboard;
pub mod orders;
pub mod payments;
pub mod products;
