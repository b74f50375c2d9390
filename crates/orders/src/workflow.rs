//! Order workflow engine: decides the effect of a requested state transition.
//!
//! Planning is pure. Given the order, the current rows of every product it
//! touches and the acting user, [`plan_transition`] returns a
//! [`TransitionPlan`]: the order as it must be saved, the stock movements
//! (each guarded by the product version that was read) and, when stock is
//! short, a replenishment order. Committing the plan is the storage layer's job
//! and must be all-or-nothing.
//!
//! Stock rules:
//!
//! - Entering an active state (`aprobado`, `orden_trabajo`) takes each line's
//!   quantity out of stock. What the order already holds is tracked in
//!   `Order::reserved`, so moving between active states never takes it twice.
//! - If any product is short, every shortfall is reported, the order falls back
//!   to `presupuestado`, anything it held is released, and one replenishment
//!   order covers the missing quantities.
//! - Admins may force `orden_trabajo` despite shortfalls: available stock is
//!   consumed down to zero and the replenishment order covers the rest.
//! - Completion requires the order's own lines and keeps whatever it holds as
//!   consumed, including the partial hold of a forced work order.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use atelier_auth::{authorize, can_force_work_order, Permission, User};
use atelier_core::{DomainError, DomainResult, OrderId, ProductId};
use atelier_inventory::{check_availability, Product};

use crate::{LineItem, Order, OrderLine, OrderState, Reservation};

/// Configuration-driven workflow behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkflowPolicy {
    /// Return reserved stock when an order is cancelled.
    pub restore_stock_on_cancel: bool,
}

/// Per-request options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransitionOptions {
    /// Commit `orden_trabajo` even when stock is short. Honoured for admins
    /// only; for anyone else the protective downgrade applies.
    pub force: bool,
}

impl TransitionOptions {
    pub fn forced() -> Self {
        Self { force: true }
    }
}

/// A requested transition, with the actor passed explicitly.
#[derive(Debug, Clone, Copy)]
pub struct TransitionRequest<'a> {
    pub target: OrderState,
    pub lines: &'a [LineItem],
    pub actor: &'a User,
    pub options: TransitionOptions,
}

/// A product that cannot cover its requested quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shortfall {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub requested: u32,
    /// Stock on hand plus what this order already held.
    pub available: u32,
}

impl Shortfall {
    pub fn missing(&self) -> u32 {
        self.requested.saturating_sub(self.available)
    }
}

/// Stock change for one product, valid only against `expected_version`.
///
/// Positive deltas return stock, negative deltas take it. A zero delta still
/// guards the version of a product whose stock was read for the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub product_id: ProductId,
    pub expected_version: u64,
    pub delta: i64,
}

/// Caller-facing result of a committed transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum TransitionOutcome {
    Success {
        order_id: OrderId,
        state: OrderState,
        stock_updated: bool,
    },
    /// Stock was short; the transition still committed.
    Warning {
        order_id: OrderId,
        requested: OrderState,
        state: OrderState,
        shortfalls: Vec<Shortfall>,
        replenishment_order_id: OrderId,
        forced: bool,
    },
}

impl TransitionOutcome {
    pub fn order_id(&self) -> OrderId {
        match self {
            TransitionOutcome::Success { order_id, .. } => *order_id,
            TransitionOutcome::Warning { order_id, .. } => *order_id,
        }
    }

    /// State the order was saved with.
    pub fn state(&self) -> OrderState {
        match self {
            TransitionOutcome::Success { state, .. } => *state,
            TransitionOutcome::Warning { state, .. } => *state,
        }
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, TransitionOutcome::Warning { .. })
    }

    pub fn replenishment_order_id(&self) -> Option<OrderId> {
        match self {
            TransitionOutcome::Success { .. } => None,
            TransitionOutcome::Warning {
                replenishment_order_id,
                ..
            } => Some(*replenishment_order_id),
        }
    }

    pub fn shortfalls(&self) -> &[Shortfall] {
        match self {
            TransitionOutcome::Success { .. } => &[],
            TransitionOutcome::Warning { shortfalls, .. } => shortfalls,
        }
    }

    /// Message for the person who submitted the transition.
    pub fn message(&self) -> String {
        match self {
            TransitionOutcome::Success {
                order_id,
                state,
                stock_updated,
            } => {
                if *stock_updated {
                    format!("Order {order_id} moved to '{state}' and stock updated.")
                } else {
                    format!("Order {order_id} moved to '{state}'.")
                }
            }
            TransitionOutcome::Warning {
                order_id,
                requested,
                state,
                shortfalls,
                replenishment_order_id,
                forced,
            } => {
                let mut msg = if *forced {
                    format!("Order {order_id} forced into '{state}' with insufficient stock:")
                } else {
                    format!(
                        "Insufficient stock: order {order_id} moved to '{state}' instead of '{requested}':"
                    )
                };
                for s in shortfalls {
                    msg.push_str(&format!(
                        "\n- {}: requested {}, available {}",
                        s.name, s.requested, s.available
                    ));
                }
                msg.push_str(&format!(
                    "\nReplenishment order {replenishment_order_id} was generated."
                ));
                msg
            }
        }
    }
}

/// Everything a committed transition writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionPlan {
    /// Order to save; its `version` is the one the plan was computed against.
    pub order: Order,
    pub movements: Vec<StockMovement>,
    pub replenishment: Option<Order>,
    pub outcome: TransitionOutcome,
}

impl TransitionPlan {
    /// Movements that actually change stock.
    pub fn effective_movements(&self) -> impl Iterator<Item = &StockMovement> {
        self.movements.iter().filter(|m| m.delta != 0)
    }
}

/// Decide what `request` does to `order`.
///
/// `products` must contain every product referenced by the requested lines or
/// reserved by the order; an unknown line product is a validation error.
pub fn plan_transition(
    order: &Order,
    products: &HashMap<ProductId, Product>,
    request: &TransitionRequest<'_>,
    policy: &WorkflowPolicy,
    now: DateTime<Utc>,
) -> DomainResult<TransitionPlan> {
    authorize(request.actor, Permission::ManageOrders)?;

    let target = request.target;
    if !order.state.can_transition_to(target) {
        return Err(DomainError::InvalidTransition {
            from: order.state.to_string(),
            to: target.to_string(),
        });
    }

    let lines = validate_lines(request.lines, products)?;
    let requested = totals_by_product(lines.iter().map(|l| (l.product_id, l.quantity)))?;
    let held = totals_by_product(order.reserved.iter().map(|r| (r.product_id, r.quantity)))?;

    let mut next = order.clone();
    next.lines = lines;

    if target.is_active() {
        return plan_active(next, products, request, &requested, &held, now);
    }

    let after: Vec<(ProductId, u32)> = match target {
        OrderState::Completed => {
            // A forced work order holds less than its lines; the lines still
            // describe the demand and must not change on completion.
            let current =
                totals_by_product(order.lines.iter().map(|l| (l.product_id, l.quantity)))?;
            if !same_quantities(&requested, &current) {
                return Err(DomainError::invariant(
                    "lines of a work order cannot change on completion",
                ));
            }
            held.clone()
        }
        OrderState::Cancelled if !policy.restore_stock_on_cancel => held.clone(),
        _ => Vec::new(),
    };

    let movements = movements_between(&held, &after, &[], products)?;
    let stock_updated = movements.iter().any(|m| m.delta != 0);
    next.state = target;
    next.reserved = to_reservations(&after);

    Ok(TransitionPlan {
        outcome: TransitionOutcome::Success {
            order_id: next.id,
            state: target,
            stock_updated,
        },
        order: next,
        movements,
        replenishment: None,
    })
}

fn plan_active(
    mut next: Order,
    products: &HashMap<ProductId, Product>,
    request: &TransitionRequest<'_>,
    requested: &[(ProductId, u32)],
    held: &[(ProductId, u32)],
    now: DateTime<Utc>,
) -> DomainResult<TransitionPlan> {
    let target = request.target;

    // Collect every shortfall; the report must list all of them.
    let mut shortfalls = Vec::new();
    for &(product_id, qty) in requested {
        let product = lookup(products, product_id)?;
        let on_hand_for_order = product.stock_actual.saturating_add(quantity_in(held, product_id));
        let needed = qty.saturating_sub(quantity_in(held, product_id));
        if !check_availability(product, needed) {
            shortfalls.push(Shortfall {
                product_id,
                sku: product.sku.clone(),
                name: product.name.clone(),
                requested: qty,
                available: on_hand_for_order,
            });
        }
    }

    if shortfalls.is_empty() {
        let movements = movements_between(held, requested, requested, products)?;
        let stock_updated = movements.iter().any(|m| m.delta != 0);
        next.state = target;
        next.reserved = to_reservations(requested);
        return Ok(TransitionPlan {
            outcome: TransitionOutcome::Success {
                order_id: next.id,
                state: target,
                stock_updated,
            },
            order: next,
            movements,
            replenishment: None,
        });
    }

    let forced = request.options.force
        && target == OrderState::WorkOrder
        && can_force_work_order(request.actor);

    let (state, after) = if forced {
        let mut after = Vec::with_capacity(requested.len());
        for &(product_id, qty) in requested {
            let product = lookup(products, product_id)?;
            let on_hand_for_order =
                product.stock_actual.saturating_add(quantity_in(held, product_id));
            after.push((product_id, qty.min(on_hand_for_order)));
        }
        (OrderState::WorkOrder, after)
    } else {
        (OrderState::Quoted, Vec::new())
    };

    let movements = movements_between(held, &after, requested, products)?;
    next.state = state;
    next.reserved = to_reservations(&after);

    let replenishment_lines = shortfalls
        .iter()
        .map(|s| OrderLine {
            product_id: s.product_id,
            quantity: s.missing(),
        })
        .collect();
    let replenishment =
        Order::replenishment_for(next.id, request.actor.id, replenishment_lines, now);

    Ok(TransitionPlan {
        outcome: TransitionOutcome::Warning {
            order_id: next.id,
            requested: target,
            state,
            shortfalls,
            replenishment_order_id: replenishment.id,
            forced,
        },
        order: next,
        movements,
        replenishment: Some(replenishment),
    })
}

fn validate_lines(
    lines: &[LineItem],
    products: &HashMap<ProductId, Product>,
) -> DomainResult<Vec<OrderLine>> {
    lines
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let line = item.validate(i)?;
            if !products.contains_key(&line.product_id) {
                return Err(DomainError::validation(
                    format!("lines[{i}].product_id"),
                    format!("unknown product {}", line.product_id),
                ));
            }
            Ok(line)
        })
        .collect()
}

/// Sum quantities per product, keeping first-seen order.
fn totals_by_product<I>(entries: I) -> DomainResult<Vec<(ProductId, u32)>>
where
    I: IntoIterator<Item = (ProductId, u32)>,
{
    let mut totals: Vec<(ProductId, u32)> = Vec::new();
    for (product_id, qty) in entries {
        match totals.iter_mut().find(|(id, _)| *id == product_id) {
            Some((_, total)) => {
                *total = total
                    .checked_add(qty)
                    .ok_or_else(|| DomainError::validation("lines", "total quantity is too large"))?;
            }
            None => totals.push((product_id, qty)),
        }
    }
    Ok(totals)
}

fn quantity_in(totals: &[(ProductId, u32)], product_id: ProductId) -> u32 {
    totals
        .iter()
        .find(|(id, _)| *id == product_id)
        .map(|(_, q)| *q)
        .unwrap_or(0)
}

fn same_quantities(a: &[(ProductId, u32)], b: &[(ProductId, u32)]) -> bool {
    let nonzero = |t: &[(ProductId, u32)]| t.iter().filter(|(_, q)| *q > 0).count();
    nonzero(a) == nonzero(b) && a.iter().all(|&(id, q)| quantity_in(b, id) == q)
}

fn to_reservations(totals: &[(ProductId, u32)]) -> Vec<Reservation> {
    totals
        .iter()
        .filter(|(_, q)| *q > 0)
        .map(|&(product_id, quantity)| Reservation {
            product_id,
            quantity,
        })
        .collect()
}

fn lookup(products: &HashMap<ProductId, Product>, product_id: ProductId) -> DomainResult<&Product> {
    products.get(&product_id).ok_or_else(|| {
        DomainError::invariant(format!("product {product_id} missing from planning snapshot"))
    })
}

/// Stock movements that turn the `before` holding into `after`.
///
/// `guarded` lists products whose stock was read for the decision; they get a
/// movement even when nothing changes so the commit re-checks their version.
fn movements_between(
    before: &[(ProductId, u32)],
    after: &[(ProductId, u32)],
    guarded: &[(ProductId, u32)],
    products: &HashMap<ProductId, Product>,
) -> DomainResult<Vec<StockMovement>> {
    let mut ids: Vec<ProductId> = Vec::new();
    for (id, _) in guarded.iter().chain(before).chain(after) {
        if !ids.contains(id) {
            ids.push(*id);
        }
    }

    let mut movements = Vec::with_capacity(ids.len());
    for product_id in ids {
        let delta = i64::from(quantity_in(before, product_id)) - i64::from(quantity_in(after, product_id));
        let is_guarded = guarded.iter().any(|(id, _)| *id == product_id);
        if delta == 0 && !is_guarded {
            continue;
        }
        let product = lookup(products, product_id)?;
        movements.push(StockMovement {
            product_id,
            expected_version: product.version,
            delta,
        });
    }
    Ok(movements)
}
