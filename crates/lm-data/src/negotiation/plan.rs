//! Query tiers and plans

use std::fmt;
use lm_core::{DateRange, OwnerId, Record};

use crate::query::{Direction, FieldValue, Query, OWNER_FIELD, TIMESTAMP_FIELD};

/// How much of the filtering the server performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryTier {
    /// Owner filter, date bounds and date order on the server
    Strict,
    /// Owner filter and date order on the server, date bounds on the client
    Relaxed,
    /// Owner filter on the server, date bounds and order on the client
    Basic,
}

impl QueryTier {
    /// Tiers in the order they are attempted
    pub const FALLBACK_ORDER: [QueryTier; 3] =
        [QueryTier::Strict, QueryTier::Relaxed, QueryTier::Basic];

    pub fn name(&self) -> &'static str {
        match self {
            QueryTier::Strict => "strict",
            QueryTier::Relaxed => "relaxed",
            QueryTier::Basic => "basic",
        }
    }
}

impl fmt::Display for QueryTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a subscription should return
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTarget {
    pub collection: String,
    pub owner: OwnerId,
    pub range: DateRange,
}

impl QueryTarget {
    pub fn new(collection: impl Into<String>, owner: impl Into<OwnerId>, range: DateRange) -> Self {
        Self {
            collection: collection.into(),
            owner: owner.into(),
            range,
        }
    }

    /// The predicate every tier must end up applying
    pub fn accepts(&self, record: &Record) -> bool {
        record.owner == self.owner && self.range.contains(record.timestamp)
    }
}

/// A tier bound to concrete filter parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    tier: QueryTier,
    target: QueryTarget,
}

impl QueryPlan {
    pub fn new(tier: QueryTier, target: QueryTarget) -> Self {
        Self { tier, target }
    }

    pub fn tier(&self) -> QueryTier {
        self.tier
    }

    pub fn target(&self) -> &QueryTarget {
        &self.target
    }

    /// The server-side part of the plan
    pub fn query(&self) -> Query {
        let owner = Query::collection(&self.target.collection)
            .where_eq(OWNER_FIELD, FieldValue::Text(self.target.owner.to_string()));

        match self.tier {
            QueryTier::Strict => owner
                .where_ge(TIMESTAMP_FIELD, FieldValue::Time(self.target.range.start()))
                .where_le(TIMESTAMP_FIELD, FieldValue::Time(self.target.range.end()))
                .order_by(TIMESTAMP_FIELD, Direction::Ascending),
            QueryTier::Relaxed => owner.order_by(TIMESTAMP_FIELD, Direction::Ascending),
            QueryTier::Basic => owner,
        }
    }

    /// Apply on the client whatever the server part left out
    pub fn refine(&self, mut records: Vec<Record>) -> Vec<Record> {
        match self.tier {
            QueryTier::Strict => records,
            QueryTier::Relaxed => {
                records.retain(|r| self.target.accepts(r));
                records
            }
            QueryTier::Basic => {
                records.retain(|r| self.target.accepts(r));
                records.sort_by_key(|r| r.timestamp);
                records
            }
        }
    }
}
