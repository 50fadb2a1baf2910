pub mod content;
pub mod payment;
