//! Wire DTOs for the storefront REST backend.
//!
//! Every payload crossing the HTTP boundary has an explicit struct here and
//! is mapped into core types before the rest of the crate sees it. Mapping
//! is lenient where the backend is loose: unknown permission strings and
//! malformed emails are logged and skipped, never propagated as errors.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use clementine_core::{
    CartItemId, CustomerId, CustomerType, Email, Order, OrderId, OrderStatus, PaymentMethod,
    PaymentStatus, Permission, Principal, ProductId,
};

use crate::cart::RemoteCartLine;

// ═════════════════════════════════════════════════════════════════════════
// Authentication
// ═════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    pub customer: CustomerDto,
}

#[derive(Debug, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LogoutRequest {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: String,
}

/// Customer payload as the backend sends it: loosely typed, everything
/// optional that can possibly be absent.
#[derive(Debug, Clone, Deserialize)]
pub struct CustomerDto {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub customer_type: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub is_vip: bool,
    #[serde(default)]
    pub vip_expires_at: Option<DateTime<Utc>>,
}

impl CustomerDto {
    /// Validate-and-map into a [`Principal`].
    ///
    /// Unknown permission strings and unparseable emails are dropped with a
    /// warning; a customer record is never rejected over them.
    #[must_use]
    pub fn into_principal(self) -> Principal {
        let email = self.email.as_deref().and_then(|raw| match Email::parse(raw) {
            Ok(email) => Some(email),
            Err(e) => {
                warn!(customer_id = self.id, error = %e, "dropping unparseable customer email");
                None
            }
        });

        let permissions = self
            .permissions
            .iter()
            .filter_map(|raw| {
                serde_json::from_value::<Permission>(serde_json::Value::String(raw.clone()))
                    .map_err(|_| warn!(permission = %raw, "skipping unknown permission"))
                    .ok()
            })
            .collect();

        let customer_type = self
            .customer_type
            .as_deref()
            .and_then(|raw| {
                serde_json::from_value::<CustomerType>(serde_json::Value::String(raw.to_owned()))
                    .map_err(|_| warn!(customer_type = %raw, "unknown customer type, assuming regular"))
                    .ok()
            })
            .unwrap_or_default();

        let name = match (self.first_name.as_deref(), self.last_name.as_deref()) {
            (Some(first), Some(last)) => Some(format!("{first} {last}")),
            (Some(only), None) | (None, Some(only)) => Some(only.to_owned()),
            (None, None) => None,
        };

        Principal {
            id: CustomerId::new(self.id),
            email,
            name,
            customer_type,
            permissions,
            is_vip: self.is_vip,
            vip_expires_at: self.vip_expires_at,
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// Cart
// ═════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
pub struct CartResponse {
    #[serde(default)]
    pub items: Vec<CartItemDto>,
}

#[derive(Debug, Deserialize)]
pub struct CartItemDto {
    pub id: i64,
    pub product: CartProductDto,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct CartProductDto {
    pub id: i64,
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub sale_price: Option<Decimal>,
    #[serde(default)]
    pub image: Option<String>,
}

impl From<CartItemDto> for RemoteCartLine {
    fn from(dto: CartItemDto) -> Self {
        Self {
            item_id: CartItemId::new(dto.id),
            product_id: ProductId::new(dto.product.id),
            name: dto.product.name,
            unit_price: dto.product.sale_price.unwrap_or(dto.product.price),
            original_unit_price: dto.product.price,
            quantity: dto.quantity,
            image: dto.product.image,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AddToCartRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Debug, Serialize)]
pub struct UpdateQuantityRequest {
    pub quantity: u32,
}

// ═════════════════════════════════════════════════════════════════════════
// Orders
// ═════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
pub struct CreateOrderRequest {
    pub customer_name: String,
    pub payment_method: PaymentMethod,
    pub items: Vec<CreateOrderItem>,
}

#[derive(Debug, Serialize)]
pub struct CreateOrderItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub price: Decimal,
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct OrderDto {
    pub id: i64,
    #[serde(default)]
    pub order_status: u8,
    #[serde(default)]
    pub payment_method: u8,
    #[serde(default)]
    pub payment_status: u8,
    #[serde(default)]
    pub total_amount: Decimal,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl OrderDto {
    /// Validate-and-map into an [`Order`].
    ///
    /// Unknown status values are logged and mapped to the null-ish default
    /// of each enum rather than failing the whole listing.
    #[must_use]
    pub fn into_order(self) -> Order {
        Order {
            id: OrderId::new(self.id),
            status: OrderStatus::try_from(self.order_status).unwrap_or_else(|e| {
                warn!(order_id = self.id, error = %e, "unknown order status");
                OrderStatus::New
            }),
            payment_method: PaymentMethod::try_from(self.payment_method).unwrap_or_else(|e| {
                warn!(order_id = self.id, error = %e, "unknown payment method");
                PaymentMethod::BankTransfer
            }),
            payment_status: PaymentStatus::try_from(self.payment_status).unwrap_or_else(|e| {
                warn!(order_id = self.id, error = %e, "unknown payment status");
                PaymentStatus::Unpaid
            }),
            total_amount: self.total_amount,
            created_at: self.created_at,
        }
    }
}
