//! Customer identity and authorization attributes.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::email::Email;
use super::id::CustomerId;

/// Customer account tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CustomerType {
    #[default]
    Regular,
    Vip,
}

/// Fine-grained customer permissions.
///
/// The last five are the VIP tier: an active VIP holds all permissions
/// implicitly, so the tier markers mostly exist for upgrade prompts and for
/// explicit grants to non-VIP accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ViewProfile,
    EditProfile,
    ViewOrders,
    CreateOrder,
    CancelOrder,
    ExpressCheckout,
    PrioritySupport,
    ExclusiveProducts,
    FreeShipping,
    EarlyAccess,
}

impl Permission {
    /// Whether this permission is normally granted through the VIP tier.
    #[must_use]
    pub const fn is_vip_tier(self) -> bool {
        matches!(
            self,
            Self::ExpressCheckout
                | Self::PrioritySupport
                | Self::ExclusiveProducts
                | Self::FreeShipping
                | Self::EarlyAccess
        )
    }
}

/// The authenticated customer identity and its authorization attributes.
///
/// A principal is owned by the session credential and replaced wholesale on
/// login, refresh, and profile fetch. It is never partially patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub id: CustomerId,
    pub email: Option<Email>,
    pub name: Option<String>,
    #[serde(default)]
    pub customer_type: CustomerType,
    #[serde(default)]
    pub permissions: HashSet<Permission>,
    #[serde(default)]
    pub is_vip: bool,
    pub vip_expires_at: Option<DateTime<Utc>>,
}

impl Principal {
    /// Whether VIP status is currently active.
    ///
    /// Active means `is_vip` is set and the VIP grant either has no expiry or
    /// expires in the future. While active, the principal implicitly holds
    /// every [`Permission`] regardless of the explicit set.
    #[must_use]
    pub fn vip_active(&self) -> bool {
        self.is_vip && self.vip_expires_at.is_none_or(|at| at > Utc::now())
    }

    /// Whether the principal holds the given permission.
    #[must_use]
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.vip_active() || self.permissions.contains(&permission)
    }

    /// The key identifying this principal for session scoping.
    ///
    /// Prefers the numeric id; falls back to the email address for accounts
    /// that have not been assigned one.
    #[must_use]
    pub fn identity_key(&self) -> String {
        if self.id.get() != 0 {
            self.id.to_string()
        } else {
            self.email
                .as_ref()
                .map_or_else(String::new, |email| email.as_str().to_owned())
        }
    }
}
