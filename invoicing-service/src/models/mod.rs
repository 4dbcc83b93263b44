pub mod fiscal;
pub mod invoice;
pub mod subscription;

pub use fiscal::FiscalProfile;
pub use invoice::{Invoice, InvoiceStatus};
pub use subscription::{Subscription, SubscriptionStatus};
