//! Permission evaluation: maps UI action names to allow/deny decisions.
//!
//! Decisions are values, never errors - a denial carries a human-readable
//! reason and, when the missing permission belongs to the VIP tier, an
//! upgrade hint the UI can surface as a prompt.

use clementine_core::{Order, Permission, Product};

use crate::session::TokenStore;

/// The outcome of evaluating one action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    /// Set on denial; human-readable.
    pub reason: Option<String>,
    /// Set on denial of a VIP-tier permission; upgrade-prompt material.
    pub upgrade_hint: Option<String>,
}

impl Decision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            upgrade_hint: None,
        }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            upgrade_hint: None,
        }
    }

    fn deny_permission(reason: impl Into<String>, missing: Permission) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            upgrade_hint: missing.is_vip_tier().then(|| upgrade_hint(missing).to_owned()),
        }
    }
}

/// Optional subject of an action.
#[derive(Debug, Clone, Copy)]
pub enum ActionContext<'a> {
    Order(&'a Order),
    Product(&'a Product),
}

impl<'a> ActionContext<'a> {
    const fn order(self) -> Option<&'a Order> {
        match self {
            Self::Order(order) => Some(order),
            Self::Product(_) => None,
        }
    }

    const fn product(self) -> Option<&'a Product> {
        match self {
            Self::Product(product) => Some(product),
            Self::Order(_) => None,
        }
    }
}

/// One entry of a bulk evaluation request.
#[derive(Debug, Clone, Copy)]
pub struct ActionRequest<'a> {
    pub action: &'a str,
    pub context: Option<ActionContext<'a>>,
}

/// One entry of a bulk evaluation result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionDecision {
    pub action: String,
    pub decision: Decision,
}

/// Permission evaluator over the session's token store.
#[derive(Clone)]
pub struct Authorizer {
    tokens: TokenStore,
}

impl Authorizer {
    /// Create an evaluator reading authorization state from `tokens`.
    #[must_use]
    pub const fn new(tokens: TokenStore) -> Self {
        Self { tokens }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Permission checks
    // ─────────────────────────────────────────────────────────────────────

    /// Whether the current user holds `permission` (VIP short-circuits).
    #[must_use]
    pub fn can(&self, permission: Permission) -> bool {
        self.tokens.has_permission(permission)
    }

    /// Whether the current user holds every listed permission.
    #[must_use]
    pub fn can_all(&self, permissions: &[Permission]) -> bool {
        self.tokens.has_all_permissions(permissions)
    }

    /// Whether the current user holds any of the listed permissions.
    #[must_use]
    pub fn can_any(&self, permissions: &[Permission]) -> bool {
        self.tokens.has_any_permission(permissions)
    }

    /// Whether VIP status is currently active.
    #[must_use]
    pub fn is_vip(&self) -> bool {
        self.tokens.is_vip_active()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Action rules
    // ─────────────────────────────────────────────────────────────────────

    /// Only new orders can be cancelled, and only with the permission.
    #[must_use]
    pub fn can_cancel_order(&self, order: &Order) -> bool {
        self.can(Permission::CancelOrder) && order.is_new()
    }

    /// Only unpaid bank-transfer orders can still be paid.
    #[must_use]
    pub fn can_pay_order(&self, order: &Order) -> bool {
        self.can(Permission::CreateOrder) && order.awaiting_bank_transfer()
    }

    /// Non-exclusive products are always viewable; exclusive ones need the
    /// VIP exclusive-products permission.
    #[must_use]
    pub fn can_view_product(&self, product: &Product) -> bool {
        !product.is_exclusive || self.can(Permission::ExclusiveProducts)
    }

    /// Adding to cart needs create-order; exclusive products additionally
    /// need the exclusive-products permission.
    #[must_use]
    pub fn can_add_to_cart(&self, product: &Product) -> bool {
        if product.is_exclusive {
            self.can(Permission::ExclusiveProducts) && self.can(Permission::CreateOrder)
        } else {
            self.can(Permission::CreateOrder)
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Name-based evaluation
    // ─────────────────────────────────────────────────────────────────────

    /// Evaluate a UI action name against the current session.
    ///
    /// Unknown names deny. Actions that require a subject deny with a
    /// context-missing reason *before* any permission check runs.
    #[must_use]
    pub fn evaluate(&self, action: &str, context: Option<ActionContext<'_>>) -> Decision {
        match action {
            "edit_profile" | "change_password" => {
                self.require(Permission::EditProfile, "No permission to edit profile")
            }
            "view_orders" => self.require(Permission::ViewOrders, "No permission to view orders"),
            "create_order" => {
                self.require(Permission::CreateOrder, "No permission to create orders")
            }
            "cancel_order" => {
                let Some(order) = context.and_then(ActionContext::order) else {
                    return Decision::deny("Order context required");
                };
                if self.can_cancel_order(order) {
                    Decision::allow()
                } else {
                    Decision::deny_permission("Cannot cancel this order", Permission::CancelOrder)
                }
            }
            "pay_order" => {
                let Some(order) = context.and_then(ActionContext::order) else {
                    return Decision::deny("Order context required");
                };
                if self.can_pay_order(order) {
                    Decision::allow()
                } else {
                    Decision::deny_permission("Cannot pay this order", Permission::CreateOrder)
                }
            }
            "view_exclusive_product" => {
                let Some(product) = context.and_then(ActionContext::product) else {
                    return Decision::deny("Product context required");
                };
                if self.can_view_product(product) {
                    Decision::allow()
                } else {
                    Decision::deny_permission(
                        "Cannot view exclusive products",
                        Permission::ExclusiveProducts,
                    )
                }
            }
            "add_exclusive_to_cart" => {
                let Some(product) = context.and_then(ActionContext::product) else {
                    return Decision::deny("Product context required");
                };
                if self.can_add_to_cart(product) {
                    Decision::allow()
                } else {
                    Decision::deny_permission(
                        "Cannot add this product to the cart",
                        Permission::ExclusiveProducts,
                    )
                }
            }
            "express_checkout" => self.require(
                Permission::ExpressCheckout,
                "Express checkout not available",
            ),
            "priority_support" => self.require(
                Permission::PrioritySupport,
                "Priority support not available",
            ),
            "free_shipping" => {
                self.require(Permission::FreeShipping, "Free shipping not available")
            }
            "early_access" => self.require(Permission::EarlyAccess, "Early access not available"),
            _ => Decision::deny("Unknown action"),
        }
    }

    /// Evaluate a batch of actions: ordered results, one per input, no
    /// short-circuiting between entries.
    #[must_use]
    pub fn evaluate_many(&self, requests: &[ActionRequest<'_>]) -> Vec<ActionDecision> {
        requests
            .iter()
            .map(|request| ActionDecision {
                action: request.action.to_owned(),
                decision: self.evaluate(request.action, request.context),
            })
            .collect()
    }

    fn require(&self, permission: Permission, reason: &str) -> Decision {
        if self.can(permission) {
            Decision::allow()
        } else {
            Decision::deny_permission(reason, permission)
        }
    }
}

/// Upgrade-prompt copy for VIP-tier permissions.
#[must_use]
pub fn upgrade_hint(permission: Permission) -> &'static str {
    match permission {
        Permission::ExpressCheckout => "Upgrade to VIP to use express checkout",
        Permission::PrioritySupport => "Upgrade to VIP for priority support",
        Permission::ExclusiveProducts => "Upgrade to VIP to access exclusive products",
        Permission::FreeShipping => "Upgrade to VIP for free shipping",
        Permission::EarlyAccess => "Upgrade to VIP for early access",
        _ => "Upgrade your account to use this feature",
    }
}
