//! Workshop orders and the order workflow engine.
//!
//! `order` holds the order model and its state lifecycle; `workflow` decides
//! what a requested transition does to the order, to stock, and whether a
//! replenishment order is needed. Both are deterministic domain logic (no IO,
//! no storage): the infrastructure layer commits the resulting plan atomically.

pub mod order;
pub mod workflow;

pub use order::{
    priced_total, LineItem, NewOrder, Order, OrderKind, OrderLine, OrderState, Reservation,
};
pub use workflow::{
    plan_transition, Shortfall, StockMovement, TransitionOptions, TransitionOutcome,
    TransitionPlan, TransitionRequest, WorkflowPolicy,
};
