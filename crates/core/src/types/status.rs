//! Status enums for orders and payments.
//!
//! The backend serializes these as small integers, so every enum here carries
//! an explicit numeric wire representation with fallible decoding. Unknown
//! values are rejected at the boundary rather than mapped to a default.

use serde::{Deserialize, Serialize};

/// Error returned when decoding an unknown status value.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownStatus {
    /// Which enum failed to decode.
    pub kind: &'static str,
    /// The offending wire value.
    pub value: u8,
}

macro_rules! wire_status {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident = $value:expr),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(into = "u8", try_from = "u8")]
        #[repr(u8)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $value),+
        }

        impl From<$name> for u8 {
            fn from(status: $name) -> Self {
                status as Self
            }
        }

        impl TryFrom<u8> for $name {
            type Error = UnknownStatus;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $($value => Ok(Self::$variant),)+
                    _ => Err(UnknownStatus {
                        kind: stringify!($name),
                        value,
                    }),
                }
            }
        }
    };
}

wire_status! {
    /// Order lifecycle status. Only `New` orders can be cancelled.
    OrderStatus {
        New = 0,
        Confirmed = 1,
        Packing = 2,
        Shipped = 3,
        Completed = 4,
        Cancelled = 5,
    }
}

wire_status! {
    /// How an order is paid. Bank transfers are the only method that leaves
    /// an order payable after creation.
    PaymentMethod {
        BankTransfer = 0,
        CashOnDelivery = 1,
        OnlineGateway = 2,
    }
}

wire_status! {
    /// Payment progress for an order.
    PaymentStatus {
        Unpaid = 0,
        Paid = 1,
        Refunded = 2,
        Failed = 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_wire_values() {
        assert_eq!(OrderStatus::try_from(0).unwrap(), OrderStatus::New);
        assert_eq!(u8::from(OrderStatus::Cancelled), 5);
        assert_eq!(
            PaymentMethod::try_from(0).unwrap(),
            PaymentMethod::BankTransfer
        );
        assert_eq!(PaymentStatus::try_from(1).unwrap(), PaymentStatus::Paid);
    }

    #[test]
    fn rejects_unknown_values() {
        let err = OrderStatus::try_from(9).unwrap_err();
        assert_eq!(err.kind, "OrderStatus");
        assert_eq!(err.value, 9);
    }

    #[test]
    fn serde_uses_integers() {
        assert_eq!(serde_json::to_string(&OrderStatus::New).unwrap(), "0");
        let status: PaymentStatus = serde_json::from_str("0").unwrap();
        assert_eq!(status, PaymentStatus::Unpaid);
        assert!(serde_json::from_str::<PaymentMethod>("99").is_err());
    }
}
