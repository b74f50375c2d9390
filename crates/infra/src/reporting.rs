//! Dashboard read model computed on demand.
//!
//! Pure over the rows it is given; the service feeds it a consistent read.

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use atelier_inventory::Product;
use atelier_orders::{Order, OrderKind, OrderState};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardMetrics {
    /// Customer orders in `aprobado` or `orden_trabajo`.
    pub active_orders: usize,
    pub completed_orders: usize,
    /// Sum of totals of customer orders completed and created in the month of `now`.
    pub completed_revenue_this_month: Decimal,
    /// Share of products at or below their minimum, 0-100, two decimals.
    pub critical_stock_percentage: Decimal,
    pub total_products: usize,
    pub critical_products: usize,
}

impl DashboardMetrics {
    pub fn compute<'a, P, O>(products: P, orders: O, now: DateTime<Utc>) -> Self
    where
        P: IntoIterator<Item = &'a Product>,
        O: IntoIterator<Item = &'a Order>,
    {
        let mut total_products = 0usize;
        let mut critical_products = 0usize;
        for product in products {
            total_products += 1;
            if product.is_critical() {
                critical_products += 1;
            }
        }

        let mut active_orders = 0usize;
        let mut completed_orders = 0usize;
        let mut completed_revenue_this_month = Decimal::ZERO;
        for order in orders.into_iter().filter(|o| o.kind == OrderKind::Customer) {
            if order.state.is_active() {
                active_orders += 1;
            }
            if order.state == OrderState::Completed {
                completed_orders += 1;
                if same_month(order.created_at, now) {
                    completed_revenue_this_month += order.total.unwrap_or(Decimal::ZERO);
                }
            }
        }

        Self {
            active_orders,
            completed_orders,
            completed_revenue_this_month,
            critical_stock_percentage: percentage(critical_products, total_products),
            total_products,
            critical_products,
        }
    }
}

fn same_month(at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    at.year() == now.year() && at.month() == now.month()
}

fn percentage(part: usize, whole: usize) -> Decimal {
    if whole == 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(part) * Decimal::ONE_HUNDRED / Decimal::from(whole)).round_dp(2)
}
