use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use atelier_core::{AggregateRoot, DomainError, DomainResult, ProductId};

/// Unit used when none is given.
pub const DEFAULT_UNIT: &str = "unidad";

/// Reorder threshold used when none is given.
pub const DEFAULT_STOCK_MINIMO: u32 = 5;

const SKU_MAX_LEN: usize = 50;
const NAME_MAX_LEN: usize = 150;

/// A stocked product (garment, fabric, trim...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub sku: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub size: String,
    pub unit: String,
    pub stock_actual: u32,
    pub stock_minimo: u32,
    #[serde(default)]
    pub unit_price: Option<Decimal>,
    #[serde(default)]
    pub version: u64,
}

impl Product {
    /// At or below the reorder threshold.
    pub fn is_critical(&self) -> bool {
        self.stock_actual <= self.stock_minimo
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl core::fmt::Display for Product {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} - {}", self.sku, self.name)
    }
}

/// Input for creating a product.
///
/// Quantities are signed so that negative input can be reported as a
/// validation error instead of failing deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NewProduct {
    pub sku: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub stock_actual: i64,
    #[serde(default)]
    pub stock_minimo: Option<i64>,
    #[serde(default)]
    pub unit_price: Option<Decimal>,
}

impl NewProduct {
    pub fn new(sku: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            sku: sku.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_stock(mut self, stock_actual: i64, stock_minimo: i64) -> Self {
        self.stock_actual = stock_actual;
        self.stock_minimo = Some(stock_minimo);
        self
    }

    pub fn with_price(mut self, unit_price: Decimal) -> Self {
        self.unit_price = Some(unit_price);
        self
    }

    /// Validate and build the product at version 0.
    pub fn into_product(self, default_stock_minimo: u32) -> DomainResult<Product> {
        let sku = validate_sku(&self.sku)?;
        let name = validate_name(&self.name)?;
        let unit = match self.unit {
            Some(unit) => validate_unit(&unit)?,
            None => DEFAULT_UNIT.to_string(),
        };
        let stock_actual = quantity_field("stock_actual", self.stock_actual)?;
        let stock_minimo = match self.stock_minimo {
            Some(v) => quantity_field("stock_minimo", v)?,
            None => default_stock_minimo,
        };
        validate_price(self.unit_price)?;

        Ok(Product {
            id: ProductId::new(),
            sku,
            name,
            description: self.description,
            color: self.color,
            size: self.size,
            unit,
            stock_actual,
            stock_minimo,
            unit_price: self.unit_price,
            version: 0,
        })
    }
}

/// Partial update of a product; `None` leaves the field untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProductPatch {
    pub sku: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub size: Option<String>,
    pub unit: Option<String>,
    pub stock_actual: Option<i64>,
    pub stock_minimo: Option<i64>,
    /// `Some(None)` clears the price. In JSON an absent key leaves it and
    /// `null` clears it.
    #[serde(
        default,
        deserialize_with = "present_or_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub unit_price: Option<Option<Decimal>>,
}

/// Any value of a present key, `null` included, becomes `Some`.
fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl ProductPatch {
    /// Apply onto a copy of `product`; the original is untouched on error.
    pub fn apply_to(&self, product: &Product) -> DomainResult<Product> {
        let mut next = product.clone();
        if let Some(sku) = &self.sku {
            next.sku = validate_sku(sku)?;
        }
        if let Some(name) = &self.name {
            next.name = validate_name(name)?;
        }
        if let Some(description) = &self.description {
            next.description = description.clone();
        }
        if let Some(color) = &self.color {
            next.color = color.clone();
        }
        if let Some(size) = &self.size {
            next.size = size.clone();
        }
        if let Some(unit) = &self.unit {
            next.unit = validate_unit(unit)?;
        }
        if let Some(v) = self.stock_actual {
            next.stock_actual = quantity_field("stock_actual", v)?;
        }
        if let Some(v) = self.stock_minimo {
            next.stock_minimo = quantity_field("stock_minimo", v)?;
        }
        if let Some(price) = self.unit_price {
            validate_price(price)?;
            next.unit_price = price;
        }
        Ok(next)
    }
}

fn validate_sku(sku: &str) -> DomainResult<String> {
    let sku = sku.trim();
    if sku.is_empty() {
        return Err(DomainError::validation("sku", "cannot be empty"));
    }
    if sku.chars().count() > SKU_MAX_LEN {
        return Err(DomainError::validation(
            "sku",
            format!("cannot exceed {SKU_MAX_LEN} characters"),
        ));
    }
    Ok(sku.to_string())
}

fn validate_name(name: &str) -> DomainResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::validation("name", "cannot be empty"));
    }
    if name.chars().count() > NAME_MAX_LEN {
        return Err(DomainError::validation(
            "name",
            format!("cannot exceed {NAME_MAX_LEN} characters"),
        ));
    }
    Ok(name.to_string())
}

fn validate_unit(unit: &str) -> DomainResult<String> {
    let unit = unit.trim();
    if unit.is_empty() {
        return Err(DomainError::validation("unit", "cannot be empty"));
    }
    Ok(unit.to_string())
}

fn validate_price(price: Option<Decimal>) -> DomainResult<()> {
    match price {
        Some(p) if p.is_sign_negative() && !p.is_zero() => {
            Err(DomainError::validation("unit_price", "cannot be negative"))
        }
        _ => Ok(()),
    }
}

fn quantity_field(field: &str, value: i64) -> DomainResult<u32> {
    if value < 0 {
        return Err(DomainError::validation(field, "cannot be negative"));
    }
    u32::try_from(value).map_err(|_| DomainError::validation(field, "is too large"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn field_of(err: DomainError) -> String {
        match err {
            DomainError::Validation { field, .. } => field,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn defaults_unit_and_minimum() {
        let product = NewProduct::new("TS-001", "Camiseta blanca")
            .into_product(DEFAULT_STOCK_MINIMO)
            .unwrap();
        assert_eq!(product.unit, DEFAULT_UNIT);
        assert_eq!(product.stock_minimo, DEFAULT_STOCK_MINIMO);
        assert_eq!(product.stock_actual, 0);
        assert_eq!(product.version, 0);
        assert!(product.is_critical());
    }

    #[test]
    fn trims_sku_and_name() {
        let product = NewProduct::new("  TS-001 ", " Camiseta ")
            .with_stock(10, 2)
            .into_product(DEFAULT_STOCK_MINIMO)
            .unwrap();
        assert_eq!(product.sku, "TS-001");
        assert_eq!(product.name, "Camiseta");
        assert_eq!(product.to_string(), "TS-001 - Camiseta");
    }

    #[test]
    fn negative_stock_is_rejected_with_field() {
        let err = NewProduct::new("TS-001", "Camiseta")
            .with_stock(-1, 5)
            .into_product(DEFAULT_STOCK_MINIMO)
            .unwrap_err();
        assert_eq!(field_of(err), "stock_actual");
    }

    #[test]
    fn overlong_sku_is_rejected() {
        let err = NewProduct::new("X".repeat(51), "Camiseta")
            .into_product(DEFAULT_STOCK_MINIMO)
            .unwrap_err();
        assert_eq!(field_of(err), "sku");
    }

    #[test]
    fn negative_price_is_rejected() {
        let err = NewProduct::new("TS-001", "Camiseta")
            .with_price(dec!(-1.50))
            .into_product(DEFAULT_STOCK_MINIMO)
            .unwrap_err();
        assert_eq!(field_of(err), "unit_price");
    }

    #[test]
    fn patch_updates_only_given_fields() {
        let product = NewProduct::new("TS-001", "Camiseta")
            .with_stock(10, 5)
            .with_price(dec!(12.50))
            .into_product(DEFAULT_STOCK_MINIMO)
            .unwrap();
        let patch = ProductPatch {
            color: Some("rojo".to_string()),
            stock_actual: Some(3),
            unit_price: Some(None),
            ..ProductPatch::default()
        };
        let next = patch.apply_to(&product).unwrap();
        assert_eq!(next.color, "rojo");
        assert_eq!(next.stock_actual, 3);
        assert_eq!(next.unit_price, None);
        assert_eq!(next.sku, product.sku);
        assert_eq!(next.id, product.id);
    }

    #[test]
    fn invalid_patch_leaves_product_untouched() {
        let product = NewProduct::new("TS-001", "Camiseta")
            .with_stock(10, 5)
            .into_product(DEFAULT_STOCK_MINIMO)
            .unwrap();
        let patch = ProductPatch {
            name: Some("  ".to_string()),
            ..ProductPatch::default()
        };
        let err = patch.apply_to(&product).unwrap_err();
        assert_eq!(field_of(err), "name");
        assert_eq!(product.name, "Camiseta");
    }

    #[test]
    fn patch_json_tells_null_price_from_absent_price() {
        let untouched: ProductPatch = serde_json::from_str(r#"{"name":"Polo"}"#).unwrap();
        assert_eq!(untouched.unit_price, None);

        let cleared: ProductPatch = serde_json::from_str(r#"{"unit_price":null}"#).unwrap();
        assert_eq!(cleared.unit_price, Some(None));

        let priced: ProductPatch = serde_json::from_str(r#"{"unit_price":"12.50"}"#).unwrap();
        assert_eq!(priced.unit_price, Some(Some(Decimal::new(1250, 2))));

        let product = NewProduct::new("PL-1", "Polo")
            .with_price(Decimal::new(30, 0))
            .into_product(DEFAULT_STOCK_MINIMO)
            .unwrap();
        assert_eq!(cleared.apply_to(&product).unwrap().unit_price, None);
        assert_eq!(
            untouched.apply_to(&product).unwrap().unit_price,
            Some(Decimal::new(30, 0))
        );
        assert!(serde_json::to_string(&cleared).unwrap().contains(r#""unit_price":null"#));
        assert!(!serde_json::to_string(&untouched).unwrap().contains("unit_price"));
    }

    #[test]
    fn deserializes_minimal_json() {
        let input: NewProduct =
            serde_json::from_str(r#"{"sku":"PN-7","name":"Pantalon","stock_actual":4}"#).unwrap();
        let product = input.into_product(7).unwrap();
        assert_eq!(product.stock_minimo, 7);
        assert_eq!(product.stock_actual, 4);
    }
}
