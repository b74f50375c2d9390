//! Stock checks and mutations on a single product.
//!
//! These are the only functions that change `stock_actual`. The order
//! workflow pre-checks availability and never reaches the
//! `InsufficientStock` guard in `decrement`; direct callers may.

use serde::{Deserialize, Serialize};

use atelier_core::{DomainError, DomainResult};

use crate::Product;

/// Stock health of a product, used for dashboards and alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockLevel {
    Normal,
    Low,
    Critical,
}

impl core::fmt::Display for StockLevel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            StockLevel::Normal => f.write_str("normal"),
            StockLevel::Low => f.write_str("low"),
            StockLevel::Critical => f.write_str("critical"),
        }
    }
}

/// True iff the product holds at least `requested_qty`.
pub fn check_availability(product: &Product, requested_qty: u32) -> bool {
    product.stock_actual >= requested_qty
}

/// Take `qty` out of stock. Never clamps.
pub fn decrement(product: &mut Product, qty: u32) -> DomainResult<()> {
    match product.stock_actual.checked_sub(qty) {
        Some(remaining) => {
            product.stock_actual = remaining;
            Ok(())
        }
        None => Err(DomainError::InsufficientStock {
            product: product.name.clone(),
            requested: qty,
            available: product.stock_actual,
        }),
    }
}

/// Put `qty` back into stock.
pub fn restock(product: &mut Product, qty: u32) -> DomainResult<()> {
    product.stock_actual = product
        .stock_actual
        .checked_add(qty)
        .ok_or_else(|| DomainError::validation("stock_actual", "is too large"))?;
    Ok(())
}

/// Critical at or below half the minimum, low at or below the minimum.
pub fn classify(product: &Product) -> StockLevel {
    // stock <= minimo * 0.5, kept in integers.
    if u64::from(product.stock_actual) * 2 <= u64::from(product.stock_minimo) {
        StockLevel::Critical
    } else if product.stock_actual <= product.stock_minimo {
        StockLevel::Low
    } else {
        StockLevel::Normal
    }
}

/// Products at or below their minimum, lowest stock first (ties by SKU).
pub fn list_critical<'a, I>(products: I) -> Vec<Product>
where
    I: IntoIterator<Item = &'a Product>,
{
    let mut critical: Vec<Product> = products
        .into_iter()
        .filter(|p| p.is_critical())
        .cloned()
        .collect();
    critical.sort_by(|a, b| {
        a.stock_actual
            .cmp(&b.stock_actual)
            .then_with(|| a.sku.cmp(&b.sku))
    });
    critical
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NewProduct, DEFAULT_STOCK_MINIMO};
    use proptest::prelude::*;

    fn product(sku: &str, stock: i64, minimo: i64) -> Product {
        NewProduct::new(sku, format!("Producto {sku}"))
            .with_stock(stock, minimo)
            .into_product(DEFAULT_STOCK_MINIMO)
            .unwrap()
    }

    #[test]
    fn availability_is_inclusive() {
        let p = product("A", 5, 5);
        assert!(check_availability(&p, 5));
        assert!(check_availability(&p, 0));
        assert!(!check_availability(&p, 6));
    }

    #[test]
    fn decrement_subtracts() {
        let mut p = product("A", 10, 5);
        decrement(&mut p, 4).unwrap();
        assert_eq!(p.stock_actual, 6);
    }

    #[test]
    fn decrement_beyond_stock_fails_without_mutation() {
        let mut p = product("A", 5, 5);
        let err = decrement(&mut p, 8).unwrap_err();
        assert_eq!(
            err,
            DomainError::InsufficientStock {
                product: "Producto A".to_string(),
                requested: 8,
                available: 5,
            }
        );
        assert_eq!(p.stock_actual, 5);
    }

    #[test]
    fn restock_adds_back() {
        let mut p = product("A", 2, 5);
        restock(&mut p, 3).unwrap();
        assert_eq!(p.stock_actual, 5);
    }

    #[test]
    fn restock_overflow_is_rejected() {
        let mut p = product("A", 0, 5);
        p.stock_actual = u32::MAX;
        assert!(restock(&mut p, 1).is_err());
        assert_eq!(p.stock_actual, u32::MAX);
    }

    #[test]
    fn classify_thresholds() {
        assert_eq!(classify(&product("A", 11, 10)), StockLevel::Normal);
        assert_eq!(classify(&product("A", 10, 10)), StockLevel::Low);
        assert_eq!(classify(&product("A", 6, 10)), StockLevel::Low);
        assert_eq!(classify(&product("A", 5, 10)), StockLevel::Critical);
        assert_eq!(classify(&product("A", 0, 0)), StockLevel::Critical);
        // Odd minimum: 2 <= 5 * 0.5 holds, 3 does not.
        assert_eq!(classify(&product("A", 2, 5)), StockLevel::Critical);
        assert_eq!(classify(&product("A", 3, 5)), StockLevel::Low);
    }

    #[test]
    fn list_critical_filters_and_sorts_ascending() {
        let products = vec![
            product("C", 4, 5),
            product("A", 20, 5),
            product("B", 1, 5),
            product("D", 5, 5),
            product("E", 1, 3),
        ];
        let critical = list_critical(&products);
        let skus: Vec<&str> = critical.iter().map(|p| p.sku.as_str()).collect();
        assert_eq!(skus, vec!["B", "E", "C", "D"]);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: no sequence of guarded decrements and restocks can drive
        /// stock below zero, and rejected decrements leave stock unchanged.
        #[test]
        fn stock_never_goes_negative(
            initial in 0u32..1_000,
            ops in prop::collection::vec((any::<bool>(), 0u32..200), 1..50)
        ) {
            let mut p = product("P", 0, 5);
            p.stock_actual = initial;
            let mut expected = i64::from(initial);

            for (is_decrement, qty) in ops {
                if is_decrement {
                    let before = p.stock_actual;
                    match decrement(&mut p, qty) {
                        Ok(()) => expected -= i64::from(qty),
                        Err(_) => prop_assert_eq!(p.stock_actual, before),
                    }
                } else {
                    restock(&mut p, qty).unwrap();
                    expected += i64::from(qty);
                }
                prop_assert!(expected >= 0);
                prop_assert_eq!(i64::from(p.stock_actual), expected);
            }
        }

        /// Property: classification agrees with the critical flag.
        #[test]
        fn classify_matches_is_critical(stock in 0u32..500, minimo in 0u32..500) {
            let mut p = product("P", 0, 0);
            p.stock_actual = stock;
            p.stock_minimo = minimo;
            let level = classify(&p);
            prop_assert_eq!(level != StockLevel::Normal, p.is_critical());
        }
    }
}
