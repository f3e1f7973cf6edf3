use std::cmp::Ordering as CmpOrdering;

use async_trait::async_trait;
use serde_json::Value;
use shared::{
    domain::{FieldMap, Page, PageRequest, RecordKey},
    error::PersistenceError,
};

use crate::record::Record;

#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortOrder {
    pub field: String,
    pub descending: bool,
}

/// Selection of records: equality filters plus an optional ordering.
/// Without an explicit ordering records come back in key order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<FieldFilter>,
    pub order: Option<SortOrder>,
}

impl Query {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(FieldFilter {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, descending: bool) -> Self {
        self.order = Some(SortOrder {
            field: field.into(),
            descending,
        });
        self
    }

    pub fn matches(&self, fields: &FieldMap) -> bool {
        self.filters.iter().all(|filter| {
            fields
                .get(&filter.field)
                .is_some_and(|value| compare_values(value, &filter.value) == CmpOrdering::Equal)
        })
    }

    /// Evaluates the query over records already in memory.
    pub fn apply<R: Record>(&self, records: impl IntoIterator<Item = R>) -> Vec<R> {
        let mut rows: Vec<(FieldMap, R)> = records
            .into_iter()
            .map(|record| (record.to_fields(), record))
            .filter(|(fields, _)| self.matches(fields))
            .collect();

        match &self.order {
            Some(order) => rows.sort_by(|(a, _), (b, _)| {
                let ordering = compare_values(
                    a.get(&order.field).unwrap_or(&Value::Null),
                    b.get(&order.field).unwrap_or(&Value::Null),
                );
                if order.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            }),
            None => rows.sort_by(|(_, a), (_, b)| match (a.key(), b.key()) {
                (Some(a), Some(b)) => compare_keys(&a, &b),
                (a, b) => a.is_some().cmp(&b.is_some()),
            }),
        }

        rows.into_iter().map(|(_, record)| record).collect()
    }
}

/// Numeric-aware key ordering, so `"2"` sorts before `"10"`.
pub fn compare_keys(a: &RecordKey, b: &RecordKey) -> CmpOrdering {
    match (a.as_str().parse::<i64>(), b.as_str().parse::<i64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        (Ok(_), Err(_)) => CmpOrdering::Less,
        (Err(_), Ok(_)) => CmpOrdering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

fn compare_values(a: &Value, b: &Value) -> CmpOrdering {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(CmpOrdering::Equal),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Null, Value::Null) => CmpOrdering::Equal,
        (Value::Null, _) => CmpOrdering::Less,
        (_, Value::Null) => CmpOrdering::Greater,
        (a, b) => a.to_string().cmp(&b.to_string()),
    }
}

/// Storage backend for one record type.
///
/// `fetch_page` defaults to slicing `fetch_all`; backends that can count and
/// offset natively should override it.
#[async_trait]
pub trait PersistenceAdapter<R: Record>: Send + Sync {
    fn default_query(&self) -> Query {
        Query::all()
    }

    async fn fetch_by_key(&self, key: &RecordKey) -> Result<Option<R>, PersistenceError>;

    async fn fetch_all(&self, query: &Query) -> Result<Vec<R>, PersistenceError>;

    async fn fetch_page(
        &self,
        query: &Query,
        request: PageRequest,
    ) -> Result<Page<R>, PersistenceError> {
        let all = self.fetch_all(query).await?;
        Ok(Page::from_all(all, request))
    }

    /// Inserts or updates `record`, assigning a key when it has none.
    async fn save(&self, record: &mut R) -> Result<RecordKey, PersistenceError>;

    /// Removes the record stored under `key`. Deleting an absent key is not an
    /// error.
    async fn delete(&self, key: &RecordKey) -> Result<(), PersistenceError>;
}
