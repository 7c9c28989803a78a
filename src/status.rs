//! Status vocabularies stored as text columns, and the order lifecycle rules.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;

macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = AppError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(AppError::BadRequest(format!(
                        "unknown {} '{other}'",
                        stringify!($name)
                    ))),
                }
            }
        }
    };
}

text_enum!(OrderStatus {
    Pending => "pending",
    Processing => "processing",
    Shipped => "shipped",
    Delivered => "delivered",
    Cancelled => "cancelled",
    Refunded => "refunded",
});

text_enum!(PaymentStatus {
    Pending => "pending",
    Paid => "paid",
    Failed => "failed",
    Refunded => "refunded",
});

text_enum!(PaymentState {
    Pending => "pending",
    Completed => "completed",
    Failed => "failed",
});

text_enum!(RefundStatus {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
    Completed => "completed",
});

text_enum!(AddressType {
    Shipping => "shipping",
    Billing => "billing",
});

impl OrderStatus {
    /// Target of a cancel request, or `InvalidTransition` when the order has left
    /// the cancellable states.
    pub fn cancel(self) -> Result<OrderStatus, AppError> {
        match self {
            OrderStatus::Pending | OrderStatus::Processing => Ok(OrderStatus::Cancelled),
            other => Err(AppError::InvalidTransition {
                from: other.to_string(),
                to: OrderStatus::Cancelled.to_string(),
            }),
        }
    }
}

/// Order and payment status after a payment completes.
pub fn on_payment_completed() -> (OrderStatus, PaymentStatus) {
    (OrderStatus::Processing, PaymentStatus::Paid)
}
