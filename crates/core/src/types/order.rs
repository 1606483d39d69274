//! Order summary as seen by the client.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::OrderId;
use super::status::{OrderStatus, PaymentMethod, PaymentStatus};

/// A customer order, in the shape the authorization rules and order listings
/// need. Line-item detail stays on the wire DTOs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub total_amount: Decimal,
    pub created_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Whether the order is still in its initial state.
    #[must_use]
    pub const fn is_new(&self) -> bool {
        matches!(self.status, OrderStatus::New)
    }

    /// Whether the order is a bank transfer still awaiting payment.
    #[must_use]
    pub const fn awaiting_bank_transfer(&self) -> bool {
        matches!(self.payment_method, PaymentMethod::BankTransfer)
            && matches!(self.payment_status, PaymentStatus::Unpaid)
    }
}
