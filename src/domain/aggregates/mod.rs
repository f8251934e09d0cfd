//! Aggregates module
pub mod cart;
pub mod category;
pub mod discount;
pub mod message;
pub mod order;
pub mod product;

pub use cart::{AppliedDiscount, Cart, CartError, CartItem, CartSummary, PricedLine, ShippingPolicy, UnavailableLine};
pub use category::Category;
pub use discount::{validate, DiscountCode, DiscountKind, DiscountRejection, DiscountValidation, NewDiscount, ValidatedDiscount};
pub use message::{ContactMessage, MessageStatus};
pub use order::{
    Address, FulfillmentStatus, GatewayRef, NewOrder, Order, OrderError, OrderItem, OrderStatus, PaymentMethod, PaymentStatus,
    TrackingItem, TrackingUpdate, TrackingView,
};
pub use product::{FulfillmentType, NewProduct, Product, ProductError, PublicProduct, PublicVariant, SyncVariant, Variant, VendorRefs};
