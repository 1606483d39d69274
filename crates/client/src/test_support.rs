//! Shared fixtures for unit tests: principals, products, and an in-memory
//! fake of the remote cart service with call counters and failure switches.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

use rust_decimal::Decimal;

use clementine_core::{
    CartItemId, CustomerId, CustomerType, Email, Permission, Principal, Product, ProductId,
};

use crate::cart::{CartApi, RemoteCartLine};
use crate::error::{ClientError, Result};

pub fn principal_with(id: i64, is_vip: bool, permissions: &[Permission]) -> Principal {
    Principal {
        id: CustomerId::new(id),
        email: Some(Email::parse(&format!("customer{id}@example.com")).unwrap()),
        name: None,
        customer_type: if is_vip {
            CustomerType::Vip
        } else {
            CustomerType::Regular
        },
        permissions: permissions.iter().copied().collect::<HashSet<_>>(),
        is_vip,
        vip_expires_at: None,
    }
}

pub fn product(id: i64, price: i64) -> Product {
    Product {
        id: ProductId::new(id),
        name: format!("Product {id}"),
        price: Decimal::from(price),
        sale_price: None,
        is_exclusive: false,
        thumbnail: None,
    }
}

/// In-memory stand-in for the remote cart service.
#[derive(Default)]
pub struct FakeCartApi {
    lines: Mutex<Vec<RemoteCartLine>>,
    next_item_id: AtomicI64,
    pub fetch_calls: AtomicUsize,
    pub add_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub remove_calls: AtomicUsize,
    pub fail_fetch: AtomicBool,
    pub fail_add: AtomicBool,
    pub fail_update: AtomicBool,
    pub fail_remove: AtomicBool,
}

impl FakeCartApi {
    pub fn seed(&self, product_id: i64, quantity: u32) {
        let item_id = self.next_item_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.lines_mut().push(RemoteCartLine {
            item_id: CartItemId::new(item_id),
            product_id: ProductId::new(product_id),
            name: format!("Product {product_id}"),
            unit_price: Decimal::from(10),
            original_unit_price: Decimal::from(10),
            quantity,
            image: None,
        });
    }

    pub fn lines(&self) -> Vec<RemoteCartLine> {
        self.lines_mut().clone()
    }

    pub fn quantity_of(&self, product_id: i64) -> Option<u32> {
        self.lines_mut()
            .iter()
            .find(|line| line.product_id == ProductId::new(product_id))
            .map(|line| line.quantity)
    }

    fn lines_mut(&self) -> std::sync::MutexGuard<'_, Vec<RemoteCartLine>> {
        match self.lines.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn remote_error() -> ClientError {
        ClientError::Api {
            status: 503,
            message: "backend unavailable".into(),
        }
    }
}

impl CartApi for FakeCartApi {
    async fn fetch_cart(&self) -> Result<Vec<RemoteCartLine>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(FakeCartApi::remote_error());
        }
        Ok(self.lines())
    }

    async fn add_line(&self, product_id: ProductId, quantity: u32) -> Result<RemoteCartLine> {
        self.add_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_add.load(Ordering::SeqCst) {
            return Err(FakeCartApi::remote_error());
        }
        let item_id = self.next_item_id.fetch_add(1, Ordering::SeqCst) + 1;
        let line = RemoteCartLine {
            item_id: CartItemId::new(item_id),
            product_id,
            name: format!("Product {product_id}"),
            unit_price: Decimal::from(10),
            original_unit_price: Decimal::from(10),
            quantity,
            image: None,
        };
        self.lines_mut().push(line.clone());
        Ok(line)
    }

    async fn update_line(&self, item_id: CartItemId, quantity: u32) -> Result<()> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(FakeCartApi::remote_error());
        }
        if let Some(line) = self
            .lines_mut()
            .iter_mut()
            .find(|line| line.item_id == item_id)
        {
            line.quantity = quantity;
        }
        Ok(())
    }

    async fn remove_line(&self, item_id: CartItemId) -> Result<()> {
        self.remove_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(FakeCartApi::remote_error());
        }
        self.lines_mut().retain(|line| line.item_id != item_id);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.lines_mut().clear();
        Ok(())
    }
}
