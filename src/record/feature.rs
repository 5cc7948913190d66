//! Listing categories, feature fields, and typed field values

use rusqlite::types::{ToSql, ToSqlOutput, Value};
use std::fmt;
use std::str::FromStr;

/// Transaction category of a catalog; each category gets its own table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Buy,
    Rent,
}

/// Features every listing carries regardless of category
const COMMON_FEATURES: [Feature; 7] = [
    Feature::Size,
    Feature::Rooms,
    Feature::Bedrooms,
    Feature::Bathrooms,
    Feature::Floor,
    Feature::Agent,
    Feature::PostalCode,
];

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Rent => "rent",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "buy" => Some(Self::Buy),
            "rent" => Some(Self::Rent),
            _ => None,
        }
    }

    /// Transaction-specific features, stored ahead of the common ones
    pub fn transaction_features(&self) -> &'static [Feature] {
        match self {
            Self::Buy => &[Feature::Price, Feature::PricePerSqm],
            Self::Rent => &[Feature::MonthlyRent],
        }
    }

    /// Full ordered feature set of this category
    pub fn features(&self) -> Vec<Feature> {
        self.transaction_features()
            .iter()
            .chain(COMMON_FEATURES.iter())
            .copied()
            .collect()
    }

    pub fn all() -> [Category; 2] {
        [Self::Buy, Self::Rent]
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_string(&s.to_ascii_lowercase())
            .ok_or_else(|| format!("unknown category '{}', expected 'buy' or 'rent'", s))
    }
}

/// Storage type of a feature column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureKind {
    Float,
    Integer,
    Text,
}

impl FeatureKind {
    pub fn sql_type(&self) -> &'static str {
        match self {
            Self::Float => "REAL",
            Self::Integer => "INTEGER",
            Self::Text => "TEXT",
        }
    }
}

/// A site-independent listing feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Feature {
    Price,
    PricePerSqm,
    MonthlyRent,
    Size,
    Rooms,
    Bedrooms,
    Bathrooms,
    Floor,
    Agent,
    PostalCode,
}

impl Feature {
    /// Column name in the listing tables
    pub fn column(&self) -> &'static str {
        match self {
            Self::Price => "price",
            Self::PricePerSqm => "price_per_sqm",
            Self::MonthlyRent => "monthly_rent",
            Self::Size => "size",
            Self::Rooms => "rooms",
            Self::Bedrooms => "bedrooms",
            Self::Bathrooms => "bathrooms",
            Self::Floor => "floor",
            Self::Agent => "agent",
            Self::PostalCode => "postal_code",
        }
    }

    /// Parses the kebab-case name used in configuration files
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "price" => Some(Self::Price),
            "price-per-sqm" => Some(Self::PricePerSqm),
            "monthly-rent" => Some(Self::MonthlyRent),
            "size" => Some(Self::Size),
            "rooms" => Some(Self::Rooms),
            "bedrooms" => Some(Self::Bedrooms),
            "bathrooms" => Some(Self::Bathrooms),
            "floor" => Some(Self::Floor),
            "agent" => Some(Self::Agent),
            "postal-code" => Some(Self::PostalCode),
            _ => None,
        }
    }

    pub fn kind(&self) -> FeatureKind {
        match self {
            Self::Floor => FeatureKind::Integer,
            Self::Agent | Self::PostalCode => FeatureKind::Text,
            _ => FeatureKind::Float,
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.column())
    }
}

/// A normalized, typed feature value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    Text(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{}", v),
            Self::Integer(v) => write!(f, "{}", v),
            Self::Text(v) => write!(f, "{}", v),
        }
    }
}

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Float(v) => ToSqlOutput::Owned(Value::Real(*v)),
            Self::Integer(v) => ToSqlOutput::Owned(Value::Integer(*v)),
            Self::Text(v) => ToSqlOutput::Borrowed(v.as_str().into()),
        })
    }
}
