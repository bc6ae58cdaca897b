//! Database entities (sea-orm models).

pub mod cart;
pub mod cart_item;
pub mod order;
pub mod order_item;
pub mod payment_attempt;
pub mod product;
pub mod user;

pub use cart::{CartStatus, Entity as Cart, Model as CartModel};
pub use cart_item::{Entity as CartItem, Model as CartItemModel};
pub use order::{Entity as Order, Model as OrderModel, OrderStatus};
pub use order_item::{Entity as OrderItem, Model as OrderItemModel};
pub use payment_attempt::{AttemptStatus, Entity as PaymentAttempt, Model as PaymentAttemptModel};
pub use product::{Entity as Product, Model as ProductModel};
pub use user::{AccountRole, Entity as User, Model as UserModel};
