pub mod order;
pub mod quote;
pub mod service;

pub use order::{OneOffStatus, SubscriptionStatus};
pub use quote::{QuoteDoc, QuoteStatus};
pub use service::{BriefForm, ServiceDoc};
