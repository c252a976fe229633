//! Declarative queries over record collections

use std::cmp::Ordering;
use std::fmt;
use chrono::{DateTime, Utc};
use lm_core::Record;

/// Field holding the owner id
pub const OWNER_FIELD: &str = "owner";

/// Field holding the record date
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// A value a filter compares against
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Time(DateTime<Utc>),
}

impl FieldValue {
    /// Compare two values of the same variant
    pub fn compare(&self, other: &FieldValue) -> Option<Ordering> {
        match (self, other) {
            (FieldValue::Text(a), FieldValue::Text(b)) => Some(a.cmp(b)),
            (FieldValue::Time(a), FieldValue::Time(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Read a named field from a record
    pub fn of(record: &Record, field: &str) -> Option<FieldValue> {
        match field {
            OWNER_FIELD => Some(FieldValue::Text(record.owner.to_string())),
            TIMESTAMP_FIELD => Some(FieldValue::Time(record.timestamp)),
            "id" => Some(FieldValue::Text(record.id.to_string())),
            "label" => Some(FieldValue::Text(record.label.clone())),
            _ => None,
        }
    }
}

/// Comparison operator of a filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOp {
    Eq,
    Ge,
    Le,
}

/// A single `where` clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: FieldValue,
}

impl Filter {
    pub fn matches(&self, record: &Record) -> bool {
        let Some(actual) = FieldValue::of(record, &self.field) else {
            return false;
        };
        match (self.op, actual.compare(&self.value)) {
            (FilterOp::Eq, Some(ord)) => ord == Ordering::Equal,
            (FilterOp::Ge, Some(ord)) => ord != Ordering::Less,
            (FilterOp::Le, Some(ord)) => ord != Ordering::Greater,
            (_, None) => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// A filtered, optionally ordered read of one collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order_by: Option<OrderBy>,
}

impl Query {
    /// Start a query over a collection
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            filters: Vec::new(),
            order_by: None,
        }
    }

    pub fn where_eq(self, field: &str, value: FieldValue) -> Self {
        self.filter(field, FilterOp::Eq, value)
    }

    pub fn where_ge(self, field: &str, value: FieldValue) -> Self {
        self.filter(field, FilterOp::Ge, value)
    }

    pub fn where_le(self, field: &str, value: FieldValue) -> Self {
        self.filter(field, FilterOp::Le, value)
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.to_string(),
            direction,
        });
        self
    }

    fn filter(mut self, field: &str, op: FilterOp, value: FieldValue) -> Self {
        self.filters.push(Filter {
            field: field.to_string(),
            op,
            value,
        });
        self
    }

    /// Check a record against every filter
    pub fn matches(&self, record: &Record) -> bool {
        self.filters.iter().all(|f| f.matches(record))
    }

    /// Sort records by the order clause; stable, no-op without one
    pub fn sort(&self, records: &mut [Record]) {
        let Some(order) = &self.order_by else {
            return;
        };
        records.sort_by(|a, b| {
            let ord = match (FieldValue::of(a, &order.field), FieldValue::of(b, &order.field)) {
                (Some(x), Some(y)) => x.compare(&y).unwrap_or(Ordering::Equal),
                _ => Ordering::Equal,
            };
            match order.direction {
                Direction::Ascending => ord,
                Direction::Descending => ord.reverse(),
            }
        });
    }

    /// Structural shape, independent of the compared values
    pub fn shape(&self) -> QueryShape {
        let mut equality: Vec<String> = Vec::new();
        let mut range: Vec<String> = Vec::new();
        for filter in &self.filters {
            let bucket = match filter.op {
                FilterOp::Eq => &mut equality,
                FilterOp::Ge | FilterOp::Le => &mut range,
            };
            if !bucket.contains(&filter.field) {
                bucket.push(filter.field.clone());
            }
        }
        equality.sort();
        range.sort();

        QueryShape {
            collection: self.collection.clone(),
            equality,
            range,
            order: self.order_by.as_ref().map(|o| (o.field.clone(), o.direction)),
        }
    }
}

/// Which fields a query filters and orders on
///
/// Backends decide from the shape which composite index a query needs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryShape {
    pub collection: String,
    pub equality: Vec<String>,
    pub range: Vec<String>,
    pub order: Option<(String, Direction)>,
}

impl fmt::Display for QueryShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[eq: {}", self.collection, self.equality.join(","))?;
        if !self.range.is_empty() {
            write!(f, "; range: {}", self.range.join(","))?;
        }
        if let Some((field, direction)) = &self.order {
            let dir = match direction {
                Direction::Ascending => "asc",
                Direction::Descending => "desc",
            };
            write!(f, "; order: {} {}", field, dir)?;
        }
        write!(f, "]")
    }
}
