//! Order lifecycle.
//!
//! ```text
//! pending ──► processing ──► shipped ──► delivered
//!    │
//!    └──► cancelled
//! ```
//!
//! `delivered` and `cancelled` are terminal. The table in
//! [`OrderStatus::allowed_transitions`] is the only place transitions are
//! defined; the dedicated cancel path goes through it as well.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid order status: {0}")]
pub struct UnknownStatus(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot change status from {from} to {to}")]
pub struct IllegalTransition {
    pub from: OrderStatus,
    pub to: OrderStatus,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Targets reachable in one step from this status.
    pub fn allowed_transitions(&self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::Pending => &[OrderStatus::Processing, OrderStatus::Cancelled],
            OrderStatus::Processing => &[OrderStatus::Shipped],
            OrderStatus::Shipped => &[OrderStatus::Delivered],
            OrderStatus::Delivered | OrderStatus::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        *self != next && self.allowed_transitions().contains(&next)
    }

    pub fn transition_to(self, next: OrderStatus) -> Result<OrderStatus, IllegalTransition> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(IllegalTransition {
                from: self,
                to: next,
            })
        }
    }

    /// Only pending orders may be cancelled.
    pub fn can_be_cancelled(&self) -> bool {
        self.can_transition_to(OrderStatus::Cancelled)
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_transitions_follow_the_table() {
        use OrderStatus::*;
        let legal = [
            (Pending, Processing),
            (Pending, Cancelled),
            (Processing, Shipped),
            (Shipped, Delivered),
        ];
        for from in OrderStatus::ALL {
            for to in OrderStatus::ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    legal.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn self_transitions_are_illegal() {
        for status in OrderStatus::ALL {
            assert_eq!(
                status.transition_to(status),
                Err(IllegalTransition {
                    from: status,
                    to: status
                })
            );
        }
    }

    #[test]
    fn terminal_states_have_no_exits() {
        assert!(OrderStatus::Delivered.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::Processing.is_terminal());
        assert!(!OrderStatus::Shipped.is_terminal());
    }

    #[test]
    fn no_status_is_reachable_from_itself() {
        // walk every path; the graph is small enough to enumerate
        fn reaches(from: OrderStatus, target: OrderStatus, depth: usize) -> bool {
            depth > 0
                && from.allowed_transitions().iter().any(|next| {
                    *next == target || reaches(*next, target, depth - 1)
                })
        }
        for status in OrderStatus::ALL {
            assert!(!reaches(status, status, OrderStatus::ALL.len()), "{status}");
        }
    }

    #[test]
    fn only_pending_can_be_cancelled() {
        for status in OrderStatus::ALL {
            assert_eq!(status.can_be_cancelled(), status == OrderStatus::Pending);
        }
    }

    #[test]
    fn parses_known_statuses_only() {
        assert_eq!("shipped".parse::<OrderStatus>(), Ok(OrderStatus::Shipped));
        assert_eq!(
            "paid".parse::<OrderStatus>(),
            Err(UnknownStatus("paid".into()))
        );
        assert!("Pending".parse::<OrderStatus>().is_err());
    }
}
