//! Product summary as seen by the client.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::ProductId;

/// A product, in the shape cart lines and authorization rules need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Decimal,
    pub sale_price: Option<Decimal>,
    /// Exclusive products are gated behind the VIP `exclusive_products`
    /// permission for both viewing and purchase.
    #[serde(default)]
    pub is_exclusive: bool,
    pub thumbnail: Option<String>,
}

impl Product {
    /// The price a new cart line should charge: the sale price when one is
    /// set, otherwise the list price.
    #[must_use]
    pub fn effective_price(&self) -> Decimal {
        self.sale_price.unwrap_or(self.price)
    }
}
