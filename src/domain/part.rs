//! Catalog parts as seen by the Order service.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Unspecified,
    Engine,
    Fuel,
    Porthole,
    Wing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub length: f64,
    pub width: f64,
    pub height: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manufacturer {
    pub name: String,
    pub country: String,
    pub website: String,
}

/// Free-form metadata attached to a part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    String(String),
    Int(i64),
    Double(f64),
    Bool(bool),
}

/// A catalog item owned by the Inventory service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Minor currency units.
    pub price: i64,
    pub stock_quantity: i64,
    pub category: Category,
    #[serde(default)]
    pub dimensions: Option<Dimensions>,
    #[serde(default)]
    pub manufacturer: Option<Manufacturer>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, MetadataValue>,
}

/// Catalog query.
///
/// An empty field places no restriction. Fields combine with AND, values
/// within one field combine with OR.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartsFilter {
    #[serde(default)]
    pub ids: Vec<Uuid>,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub manufacturer_countries: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl PartsFilter {
    /// Filter selecting exactly the given part ids.
    pub fn by_ids(ids: impl IntoIterator<Item = Uuid>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Check whether a part satisfies every non-empty field.
    pub fn matches(&self, part: &Part) -> bool {
        let country = part.manufacturer.as_ref().map(|m| m.country.as_str());

        (self.ids.is_empty() || self.ids.contains(&part.id))
            && (self.names.is_empty() || self.names.iter().any(|n| *n == part.name))
            && (self.categories.is_empty() || self.categories.contains(&part.category))
            && (self.manufacturer_countries.is_empty()
                || country.is_some_and(|c| self.manufacturer_countries.iter().any(|m| m == c)))
            && (self.tags.is_empty() || part.tags.iter().any(|t| self.tags.contains(t)))
    }
}

/// Sum the price of each distinct part once, regardless of how many times
/// it appears in `parts`.
pub fn distinct_price_total(parts: &[Part]) -> i64 {
    let mut seen = HashSet::with_capacity(parts.len());
    parts
        .iter()
        .filter(|p| seen.insert(p.id))
        .map(|p| p.price)
        .sum()
}
