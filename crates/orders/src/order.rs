use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use atelier_core::{AggregateRoot, DomainError, DomainResult, OrderId, ProductId, UserId};

const CLIENT_MAX_LEN: usize = 200;

/// Order state lifecycle.
///
/// `Intake → Quoted → Approved → WorkOrder → Completed`, with `Cancelled`
/// reachable from any non-terminal state. Serialized with the workshop's
/// state names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderState {
    #[serde(rename = "ingresado")]
    Intake,
    #[serde(rename = "presupuestado")]
    Quoted,
    #[serde(rename = "aprobado")]
    Approved,
    #[serde(rename = "orden_trabajo")]
    WorkOrder,
    #[serde(rename = "completado")]
    Completed,
    #[serde(rename = "cancelado")]
    Cancelled,
}

impl OrderState {
    pub const ALL: [OrderState; 6] = [
        OrderState::Intake,
        OrderState::Quoted,
        OrderState::Approved,
        OrderState::WorkOrder,
        OrderState::Completed,
        OrderState::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::Intake => "ingresado",
            OrderState::Quoted => "presupuestado",
            OrderState::Approved => "aprobado",
            OrderState::WorkOrder => "orden_trabajo",
            OrderState::Completed => "completado",
            OrderState::Cancelled => "cancelado",
        }
    }

    /// Position in the forward chain; `None` for `Cancelled`.
    fn rank(&self) -> Option<u8> {
        match self {
            OrderState::Intake => Some(0),
            OrderState::Quoted => Some(1),
            OrderState::Approved => Some(2),
            OrderState::WorkOrder => Some(3),
            OrderState::Completed => Some(4),
            OrderState::Cancelled => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderState::Completed | OrderState::Cancelled)
    }

    /// States that require the order's stock to be reserved.
    pub fn is_active(&self) -> bool {
        matches!(self, OrderState::Approved | OrderState::WorkOrder)
    }

    /// Whether a caller may request `target` from this state.
    ///
    /// Staying in the same state is allowed (resubmission with edited lines),
    /// moving forward may skip steps, except that `Completed` is only reachable
    /// from `WorkOrder`. Backward moves are reserved to the workflow's own
    /// protective downgrade.
    pub fn can_transition_to(&self, target: OrderState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match target {
            OrderState::Cancelled => true,
            OrderState::Completed => *self == OrderState::WorkOrder,
            _ => match (self.rank(), target.rank()) {
                (Some(from), Some(to)) => to >= from,
                _ => false,
            },
        }
    }
}

impl core::fmt::Display for OrderState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for OrderState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| DomainError::validation("state", format!("unknown state '{s}'")))
    }
}

/// Customer orders versus automatically generated restocking requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderKind {
    #[default]
    #[serde(rename = "cliente")]
    Customer,
    #[serde(rename = "insumo")]
    Replenishment,
}

/// Order line: product and quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Quantity of a product already taken out of stock for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Line item as submitted by a caller, before validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: ProductId,
    pub quantity: i64,
}

impl LineItem {
    pub fn new(product_id: ProductId, quantity: i64) -> Self {
        Self {
            product_id,
            quantity,
        }
    }

    /// Check the quantity; `index` locates the line in error messages.
    pub fn validate(&self, index: usize) -> DomainResult<OrderLine> {
        let field = format!("lines[{index}].quantity");
        if self.quantity <= 0 {
            return Err(DomainError::validation(field, "must be positive"));
        }
        let quantity =
            u32::try_from(self.quantity).map_err(|_| DomainError::validation(field, "is too large"))?;
        Ok(OrderLine {
            product_id: self.product_id,
            quantity,
        })
    }
}

/// Input for creating a customer order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NewOrder {
    pub client: String,
    #[serde(default)]
    pub lines: Vec<LineItem>,
    /// Explicit total; computed from unit prices when omitted.
    #[serde(default)]
    pub total: Option<Decimal>,
}

impl NewOrder {
    pub fn new(client: impl Into<String>, lines: Vec<LineItem>) -> Self {
        Self {
            client: client.into(),
            lines,
            total: None,
        }
    }

    /// Validate client and quantities. Product existence is checked by the
    /// caller that owns the catalogue.
    pub fn validate(&self) -> DomainResult<Vec<OrderLine>> {
        validate_client(&self.client)?;
        if let Some(total) = self.total {
            if total.is_sign_negative() && !total.is_zero() {
                return Err(DomainError::validation("total", "cannot be negative"));
            }
        }
        self.lines
            .iter()
            .enumerate()
            .map(|(i, line)| line.validate(i))
            .collect()
    }
}

fn validate_client(client: &str) -> DomainResult<()> {
    let client = client.trim();
    if client.is_empty() {
        return Err(DomainError::validation("client", "cannot be empty"));
    }
    if client.chars().count() > CLIENT_MAX_LEN {
        return Err(DomainError::validation(
            "client",
            format!("cannot exceed {CLIENT_MAX_LEN} characters"),
        ));
    }
    Ok(())
}

/// Sum of `quantity * unit_price`, or `None` when any line is unpriced.
pub fn priced_total<F>(lines: &[OrderLine], price_of: F) -> Option<Decimal>
where
    F: Fn(ProductId) -> Option<Decimal>,
{
    lines.iter().try_fold(Decimal::ZERO, |acc, line| {
        price_of(line.product_id).map(|price| acc + price * Decimal::from(line.quantity))
    })
}

/// A workshop order and its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub client: String,
    pub created_at: DateTime<Utc>,
    pub state: OrderState,
    #[serde(default)]
    pub kind: OrderKind,
    pub created_by: Option<UserId>,
    #[serde(default)]
    pub total: Option<Decimal>,
    #[serde(default)]
    pub lines: Vec<OrderLine>,
    #[serde(default)]
    pub reserved: Vec<Reservation>,
    #[serde(default)]
    pub version: u64,
}

impl Order {
    /// New customer order in `Intake`.
    pub fn new_customer(
        client: impl Into<String>,
        created_by: Option<UserId>,
        lines: Vec<OrderLine>,
        total: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OrderId::new(),
            client: client.into().trim().to_string(),
            created_at: now,
            state: OrderState::Intake,
            kind: OrderKind::Customer,
            created_by,
            total,
            lines,
            reserved: Vec::new(),
            version: 0,
        }
    }

    /// Restocking request generated for `original`.
    pub fn replenishment_for(
        original: OrderId,
        created_by: UserId,
        lines: Vec<OrderLine>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OrderId::new(),
            client: format!("Replenishment request for order {original}"),
            created_at: now,
            state: OrderState::Intake,
            kind: OrderKind::Replenishment,
            created_by: Some(created_by),
            total: None,
            lines,
            reserved: Vec::new(),
            version: 0,
        }
    }

    pub fn is_modifiable(&self) -> bool {
        !self.state.is_terminal()
    }

    /// True when a line or a reservation points at `product_id`.
    pub fn references_product(&self, product_id: ProductId) -> bool {
        self.lines.iter().any(|l| l.product_id == product_id)
            || self.reserved.iter().any(|r| r.product_id == product_id)
    }

    /// Quantity of `product_id` this order currently holds out of stock.
    pub fn reserved_quantity(&self, product_id: ProductId) -> u32 {
        self.reserved
            .iter()
            .filter(|r| r.product_id == product_id)
            .map(|r| r.quantity)
            .sum()
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl core::fmt::Display for Order {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Order {} - {} ({})", self.id, self.client, self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(quantity: u32) -> OrderLine {
        OrderLine {
            product_id: ProductId::new(),
            quantity,
        }
    }

    #[test]
    fn forward_moves_may_skip_steps() {
        assert!(OrderState::Intake.can_transition_to(OrderState::Approved));
        assert!(OrderState::Intake.can_transition_to(OrderState::WorkOrder));
        assert!(OrderState::Approved.can_transition_to(OrderState::WorkOrder));
        assert!(OrderState::Quoted.can_transition_to(OrderState::Quoted));
    }

    #[test]
    fn backward_moves_are_rejected() {
        assert!(!OrderState::Approved.can_transition_to(OrderState::Quoted));
        assert!(!OrderState::WorkOrder.can_transition_to(OrderState::Intake));
    }

    #[test]
    fn completion_requires_work_order() {
        assert!(OrderState::WorkOrder.can_transition_to(OrderState::Completed));
        assert!(!OrderState::Approved.can_transition_to(OrderState::Completed));
        assert!(!OrderState::Intake.can_transition_to(OrderState::Completed));
    }

    #[test]
    fn cancel_from_any_non_terminal_state() {
        for state in OrderState::ALL {
            assert_eq!(
                state.can_transition_to(OrderState::Cancelled),
                !state.is_terminal(),
                "{state}"
            );
        }
    }

    #[test]
    fn terminal_states_are_closed() {
        for target in OrderState::ALL {
            assert!(!OrderState::Completed.can_transition_to(target));
            assert!(!OrderState::Cancelled.can_transition_to(target));
        }
    }

    #[test]
    fn states_serialize_with_workshop_names() {
        assert_eq!(
            serde_json::to_string(&OrderState::WorkOrder).unwrap(),
            "\"orden_trabajo\""
        );
        let parsed: OrderState = "presupuestado".parse().unwrap();
        assert_eq!(parsed, OrderState::Quoted);
        assert!("shipped".parse::<OrderState>().is_err());
    }

    #[test]
    fn non_positive_quantity_is_rejected_with_line_index() {
        let order = NewOrder::new(
            "Taller Ruiz",
            vec![
                LineItem::new(ProductId::new(), 2),
                LineItem::new(ProductId::new(), -1),
            ],
        );
        match order.validate().unwrap_err() {
            DomainError::Validation { field, .. } => assert_eq!(field, "lines[1].quantity"),
            other => panic!("expected validation error, got {other:?}"),
        }

        let zero = LineItem::new(ProductId::new(), 0);
        assert!(zero.validate(0).is_err());
    }

    #[test]
    fn blank_client_is_rejected() {
        let order = NewOrder::new("  ", vec![]);
        match order.validate().unwrap_err() {
            DomainError::Validation { field, .. } => assert_eq!(field, "client"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn priced_total_requires_every_price() {
        let a = line(2);
        let b = line(3);
        let lines = vec![a, b];

        let total = priced_total(&lines, |id| {
            if id == a.product_id {
                Some(dec!(10.50))
            } else {
                Some(dec!(2))
            }
        });
        assert_eq!(total, Some(dec!(27.00)));

        let missing = priced_total(&lines, |id| (id == a.product_id).then_some(dec!(1)));
        assert_eq!(missing, None);
    }

    #[test]
    fn replenishment_order_references_original() {
        let original = OrderId::new();
        let actor = UserId::new();
        let order = Order::replenishment_for(original, actor, vec![line(3)], Utc::now());
        assert_eq!(order.kind, OrderKind::Replenishment);
        assert_eq!(order.state, OrderState::Intake);
        assert_eq!(order.created_by, Some(actor));
        assert!(order.client.contains(&original.to_string()));
    }

    #[test]
    fn reserved_quantity_sums_per_product() {
        let mut order = Order::new_customer("Cliente", None, vec![], None, Utc::now());
        let p = ProductId::new();
        order.reserved = vec![
            Reservation {
                product_id: p,
                quantity: 2,
            },
            Reservation {
                product_id: ProductId::new(),
                quantity: 9,
            },
        ];
        assert_eq!(order.reserved_quantity(p), 2);
        assert_eq!(order.reserved_quantity(ProductId::new()), 0);
    }
}
