pub mod cart_item;
pub mod category;
pub mod coupon;
pub mod order;
pub mod order_item;
pub mod product;
pub mod product_variant;
pub mod rating;

pub use cart_item::{Entity as CartItem, Model as CartItemModel};
pub use category::{Entity as Category, Model as CategoryModel};
pub use coupon::{CouponType, Entity as Coupon, Model as CouponModel};
pub use order::{Entity as Order, Model as OrderModel, OrderStatus};
pub use order_item::{Entity as OrderItem, Model as OrderItemModel};
pub use product::{Entity as Product, Model as ProductModel};
pub use product_variant::{Entity as ProductVariant, Model as ProductVariantModel};
pub use rating::{Entity as Rating, Model as RatingModel};
