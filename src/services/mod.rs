pub mod briefs;
pub mod catalogue;
pub mod quotes;
pub mod reconciler;
