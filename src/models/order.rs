use serde::{Deserialize, Serialize};
use strum::Display;
use utoipa::ToSchema;

/// Brief payload sentinel written at order creation when the purchased
/// service defines an intake form; replaced exactly once by the
/// post-purchase brief submission.
pub const BRIEF_PENDING: &str = "Pending submission...";
/// Marker for one-off orders whose service has no intake form.
pub const BRIEF_NOT_APPLICABLE: &str = "N/A";
/// Marker for subscription orders whose service has no intake form.
pub const BRIEF_NOT_APPLICABLE_SUBSCRIPTION: &str = "N/A - Recurring Subscription";

/// Status vocabulary for one-off (manual-capture) orders.
///
/// Transitions are monotonic: `new` advances through the workflow
/// states (`awaitingClient`, `completed`) or straight to `paid` on an
/// immediate capture, with `cancelled` reachable from any non-terminal
/// state. `paid` and `cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, ToSchema)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum OneOffStatus {
    New,
    AwaitingClient,
    Completed,
    Paid,
    Cancelled,
}

impl OneOffStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Paid | Self::Cancelled)
    }

    /// Whether the order may move from `self` to `next`.
    pub fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::New, Self::AwaitingClient) => true,
            (Self::New, Self::Completed) => true,
            (Self::New, Self::Paid) => true,
            (Self::AwaitingClient, Self::Completed) => true,
            (Self::AwaitingClient, Self::Paid) => true,
            (Self::Completed, Self::Paid) => true,
            (from, Self::Cancelled) if !from.is_terminal() => true,
            _ => false,
        }
    }
}

/// Status vocabulary for subscription orders. `cancelled` is terminal
/// and the webhook handler is its only writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, ToSchema)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum SubscriptionStatus {
    InProgress,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
