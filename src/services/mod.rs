//! Business logic layer.

pub mod carts;
pub mod catalog;
pub mod checkout;
pub mod dashboard;
pub mod orders;
pub mod payments;
pub mod users;
