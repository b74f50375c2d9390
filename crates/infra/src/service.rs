//! Application service for the workshop.
//!
//! Every mutating operation follows the same pipeline:
//!
//! ```text
//! authorize actor
//!   ↓
//! read rows (each carries its version)
//!   ↓
//! decide (pure: validation, workflow planning)
//!   ↓
//! commit one ChangeSet (version-checked, all-or-nothing)
//!   ↓ on StoreError::Concurrency
//! re-read and decide again, up to `max_conflict_retries` times
//! ```
//!
//! Deterministic failures (validation, authorization, invalid transitions) are
//! returned immediately and never retried.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use atelier_auth::{authorize, NewUser, Permission, User};
use atelier_core::{DomainError, DomainResult, ExpectedVersion, OrderId, ProductId, UserId};
use atelier_inventory::{self as inventory, NewProduct, Product, ProductPatch, StockLevel};
use atelier_orders::{
    plan_transition, priced_total, LineItem, NewOrder, Order, OrderState, StockMovement,
    TransitionOptions, TransitionOutcome, TransitionRequest,
};

use crate::config::WorkshopConfig;
use crate::reporting::DashboardMetrics;
use crate::store::{ChangeSet, OrderWrite, ProductWrite, StoreError, UserWrite, WorkshopStore};

/// Workshop service over a row store.
#[derive(Debug)]
pub struct Workshop<S> {
    store: S,
    config: WorkshopConfig,
}

impl<S> Workshop<S> {
    pub fn new(store: S, config: WorkshopConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &WorkshopConfig {
        &self.config
    }

    pub fn into_store(self) -> S {
        self.store
    }
}

fn require(actor: &User, permission: Permission) -> DomainResult<()> {
    authorize(actor, permission).map_err(|err| {
        warn!(
            actor = %actor.username,
            permission = %permission,
            error = %err,
            "authorization denied"
        );
        DomainError::from(err)
    })
}

impl<S> Workshop<S>
where
    S: WorkshopStore,
{
    /// Run `decide` and commit its change set, re-deciding on version conflicts.
    fn commit_with_retry<T, F>(&self, operation: &'static str, mut decide: F) -> DomainResult<T>
    where
        F: FnMut() -> DomainResult<(ChangeSet, T)>,
    {
        let mut attempt: u32 = 0;
        loop {
            let (changes, value) = decide()?;
            match self.store.commit(changes) {
                Ok(()) => return Ok(value),
                Err(StoreError::Concurrency(reason)) if attempt < self.config.max_conflict_retries => {
                    attempt += 1;
                    debug!(operation, attempt, %reason, "optimistic conflict, retrying");
                }
                Err(StoreError::Concurrency(reason)) => {
                    warn!(operation, attempts = attempt + 1, %reason, "giving up after repeated conflicts");
                    return Err(DomainError::conflict(format!(
                        "{operation} kept conflicting with concurrent writers: {reason}"
                    )));
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn require_product(&self, id: ProductId) -> DomainResult<Product> {
        self.store.get_product(id)?.ok_or(DomainError::NotFound)
    }

    fn require_order(&self, id: OrderId) -> DomainResult<Order> {
        self.store.get_order(id)?.ok_or(DomainError::NotFound)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Users
    // ─────────────────────────────────────────────────────────────────────────

    /// Register a user.
    ///
    /// `actor` may be `None` only while the workshop has no users, which is how
    /// the first account is created.
    #[instrument(skip(self, new, actor), fields(username = %new.username))]
    pub fn register_user(&self, new: NewUser, actor: Option<&User>) -> DomainResult<User> {
        if let Some(actor) = actor {
            require(actor, Permission::ManageUsers)?;
        }
        let user = new.into_user()?;

        self.commit_with_retry("register_user", || {
            let existing = self.store.list_users()?;
            if actor.is_none() && !existing.is_empty() {
                return Err(DomainError::unauthorized(
                    "an acting user is required once accounts exist",
                ));
            }
            if existing.iter().any(|u| u.username == user.username) {
                return Err(DomainError::validation("username", "is already taken"));
            }
            Ok((ChangeSet::new().with_user(UserWrite::Put(user.clone())), ()))
        })?;

        info!(user_id = %user.id, role = %user.role, "user registered");
        Ok(user)
    }

    /// Delete a user; orders they created keep existing without a creator.
    #[instrument(skip(self, actor), fields(actor = %actor.username))]
    pub fn delete_user(&self, id: UserId, actor: &User) -> DomainResult<()> {
        require(actor, Permission::ManageUsers)?;
        if id == actor.id {
            return Err(DomainError::validation("user", "cannot delete the acting user"));
        }

        let detached = self.commit_with_retry("delete_user", || {
            if self.store.get_user(id)?.is_none() {
                return Err(DomainError::NotFound);
            }
            let mut changes = ChangeSet::new().with_user(UserWrite::Delete(id));
            let mut detached = 0usize;
            for mut order in self.store.list_orders()? {
                if order.created_by == Some(id) {
                    order.created_by = None;
                    changes = changes.with_order(OrderWrite::update(order));
                    detached += 1;
                }
            }
            Ok((changes, detached))
        })?;

        info!(user_id = %id, detached_orders = detached, "user deleted");
        Ok(())
    }

    /// All users; admins only.
    pub fn list_users(&self, actor: &User) -> DomainResult<Vec<User>> {
        require(actor, Permission::ViewUsers)?;
        Ok(self.store.list_users()?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Products
    // ─────────────────────────────────────────────────────────────────────────

    #[instrument(skip(self, new, actor), fields(sku = %new.sku, actor = %actor.username))]
    pub fn create_product(&self, new: NewProduct, actor: &User) -> DomainResult<Product> {
        require(actor, Permission::ManageProducts)?;
        let product = new.into_product(self.config.default_stock_minimo)?;

        self.commit_with_retry("create_product", || {
            self.ensure_sku_free(&product.sku, product.id)?;
            Ok((
                ChangeSet::new().with_product(ProductWrite::insert(product.clone())),
                (),
            ))
        })?;

        info!(product_id = %product.id, sku = %product.sku, "product created");
        Ok(product)
    }

    #[instrument(skip(self, patch, actor), fields(actor = %actor.username))]
    pub fn update_product(
        &self,
        id: ProductId,
        patch: ProductPatch,
        actor: &User,
    ) -> DomainResult<Product> {
        require(actor, Permission::ManageProducts)?;

        let saved = self.commit_with_retry("update_product", || {
            let current = self.require_product(id)?;
            let next = patch.apply_to(&current)?;
            if next.sku != current.sku {
                self.ensure_sku_free(&next.sku, id)?;
            }
            let mut saved = next.clone();
            saved.version = current.version + 1;
            Ok((ChangeSet::new().with_product(ProductWrite::update(next)), saved))
        })?;

        info!(product_id = %id, version = saved.version, "product updated");
        Ok(saved)
    }

    /// Delete a product no order refers to.
    #[instrument(skip(self, actor), fields(actor = %actor.username))]
    pub fn delete_product(&self, id: ProductId, actor: &User) -> DomainResult<()> {
        require(actor, Permission::ManageProducts)?;

        self.commit_with_retry("delete_product", || {
            let product = self.require_product(id)?;
            if let Some(order) = self
                .store
                .list_orders()?
                .into_iter()
                .find(|o| o.references_product(id))
            {
                return Err(DomainError::referenced(format!(
                    "product {} is used by order {}",
                    product.sku, order.id
                )));
            }
            Ok((
                ChangeSet::new().with_product(ProductWrite::Delete {
                    id,
                    expected: ExpectedVersion::of(&product),
                }),
                (),
            ))
        })?;

        info!(product_id = %id, "product deleted");
        Ok(())
    }

    pub fn get_product(&self, id: ProductId) -> DomainResult<Product> {
        self.require_product(id)
    }

    pub fn list_products(&self) -> DomainResult<Vec<Product>> {
        Ok(self.store.list_products()?)
    }

    fn ensure_sku_free(&self, sku: &str, owner: ProductId) -> DomainResult<()> {
        let taken = self
            .store
            .list_products()?
            .iter()
            .any(|p| p.sku == sku && p.id != owner);
        if taken {
            return Err(DomainError::validation(
                "sku",
                format!("'{sku}' is already in use"),
            ));
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Orders
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a customer order in `ingresado`, created by `actor`.
    ///
    /// When no total is given it is computed from unit prices, provided every
    /// line's product has one.
    #[instrument(skip(self, new, actor), fields(actor = %actor.username))]
    pub fn create_order(&self, new: NewOrder, actor: &User) -> DomainResult<Order> {
        require(actor, Permission::ManageOrders)?;
        let lines = new.validate()?;
        let mut order = Order::new_customer(
            new.client.as_str(),
            Some(actor.id),
            lines,
            new.total,
            Utc::now(),
        );

        let order = self.commit_with_retry("create_order", || {
            let mut prices = HashMap::new();
            for (i, line) in order.lines.iter().enumerate() {
                let product = self.store.get_product(line.product_id)?.ok_or_else(|| {
                    DomainError::validation(
                        format!("lines[{i}].product_id"),
                        format!("unknown product {}", line.product_id),
                    )
                })?;
                prices.insert(product.id, product.unit_price);
            }
            if new.total.is_none() {
                order.total =
                    priced_total(&order.lines, |id| prices.get(&id).copied().flatten());
            }
            Ok((
                ChangeSet::new().with_order(OrderWrite::insert(order.clone())),
                order.clone(),
            ))
        })?;

        info!(order_id = %order.id, lines = order.lines.len(), "order created");
        Ok(order)
    }

    /// Move an order to `target` with the given lines.
    ///
    /// Stock shortfalls are not errors: the order is saved in `presupuestado`
    /// (or, for an admin forcing `orden_trabajo`, with what stock allows) and a
    /// replenishment order is created in the same commit. The outcome reports
    /// which of the two happened.
    #[instrument(
        skip(self, lines, actor),
        fields(actor = %actor.username)
    )]
    pub fn submit_transition(
        &self,
        order_id: OrderId,
        target: OrderState,
        lines: &[LineItem],
        actor: &User,
        options: TransitionOptions,
    ) -> DomainResult<TransitionOutcome> {
        require(actor, Permission::ManageOrders)?;
        let policy = self.config.workflow_policy();

        let (from, outcome) = self.commit_with_retry("submit_transition", || {
            let order = self.require_order(order_id)?;

            let mut products = HashMap::new();
            let referenced = lines
                .iter()
                .map(|l| l.product_id)
                .chain(order.reserved.iter().map(|r| r.product_id));
            for id in referenced {
                if products.contains_key(&id) {
                    continue;
                }
                if let Some(product) = self.store.get_product(id)? {
                    products.insert(id, product);
                }
            }

            let request = TransitionRequest {
                target,
                lines,
                actor,
                options,
            };
            let plan = plan_transition(&order, &products, &request, &policy, Utc::now())?;

            let mut changes = ChangeSet::new()
                .with_order(OrderWrite::update(plan.order))
                .with_stock(plan.movements);
            if let Some(replenishment) = plan.replenishment {
                changes = changes.with_order(OrderWrite::insert(replenishment));
            }
            Ok((changes, (order.state, plan.outcome)))
        })?;

        match &outcome {
            TransitionOutcome::Success {
                state,
                stock_updated,
                ..
            } => {
                info!(
                    order_id = %order_id,
                    from = %from,
                    to = %state,
                    stock_updated,
                    "transition committed"
                );
            }
            TransitionOutcome::Warning {
                requested,
                state,
                shortfalls,
                replenishment_order_id,
                forced,
                ..
            } => {
                warn!(
                    order_id = %order_id,
                    from = %from,
                    requested = %requested,
                    to = %state,
                    short_products = shortfalls.len(),
                    replenishment_order_id = %replenishment_order_id,
                    forced,
                    "transition committed with stock shortfall"
                );
            }
        }
        Ok(outcome)
    }

    /// Delete an order.
    ///
    /// Stock the order still holds is returned only when
    /// `restore_stock_on_delete` is set, and never for completed orders.
    #[instrument(skip(self, actor), fields(actor = %actor.username))]
    pub fn delete_order(&self, id: OrderId, actor: &User) -> DomainResult<()> {
        require(actor, Permission::ManageOrders)?;
        let restore = self.config.restore_stock_on_delete;

        let restored = self.commit_with_retry("delete_order", || {
            let order = self.require_order(id)?;
            let mut movements = Vec::new();
            if restore && order.state != OrderState::Completed {
                for reservation in &order.reserved {
                    let product = self.require_product(reservation.product_id)?;
                    movements.push(StockMovement {
                        product_id: product.id,
                        expected_version: product.version,
                        delta: i64::from(reservation.quantity),
                    });
                }
            }
            let restored = movements.len();
            let changes = ChangeSet::new()
                .with_order(OrderWrite::Delete {
                    id,
                    expected: ExpectedVersion::of(&order),
                })
                .with_stock(movements);
            Ok((changes, restored))
        })?;

        info!(order_id = %id, restored_products = restored, "order deleted");
        Ok(())
    }

    pub fn get_order(&self, id: OrderId) -> DomainResult<Order> {
        self.require_order(id)
    }

    pub fn list_orders(&self) -> DomainResult<Vec<Order>> {
        Ok(self.store.list_orders()?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reporting
    // ─────────────────────────────────────────────────────────────────────────

    pub fn list_critical(&self) -> DomainResult<Vec<Product>> {
        Ok(inventory::list_critical(&self.store.list_products()?))
    }

    pub fn classify(&self, id: ProductId) -> DomainResult<StockLevel> {
        Ok(inventory::classify(&self.require_product(id)?))
    }

    pub fn dashboard(&self, now: DateTime<Utc>) -> DomainResult<DashboardMetrics> {
        let snapshot = self.store.snapshot()?;
        Ok(DashboardMetrics::compute(
            &snapshot.products,
            &snapshot.orders,
            now,
        ))
    }
}
