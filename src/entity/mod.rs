pub mod addresses;
pub mod audit_logs;
pub mod cart_items;
pub mod carts;
pub mod categories;
pub mod order_items;
pub mod orders;
pub mod payments;
pub mod product_images;
pub mod products;
pub mod refunds;
pub mod reviews;
pub mod users;

pub use addresses::Entity as Addresses;
pub use audit_logs::Entity as AuditLogs;
pub use cart_items::Entity as CartItems;
pub use carts::Entity as Carts;
pub use categories::Entity as Categories;
pub use order_items::Entity as OrderItems;
pub use orders::Entity as Orders;
pub use payments::Entity as Payments;
pub use product_images::Entity as ProductImages;
pub use products::Entity as Products;
pub use refunds::Entity as Refunds;
pub use reviews::Entity as Reviews;
pub use users::Entity as Users;
