use async_trait::async_trait;
use serde_json::Value;
use shared::{
    domain::{FieldMap, RecordKey},
    error::PersistenceError,
};

use crate::filter::InputFilter;

/// An entity managed by a [`CrudController`](crate::CrudController).
///
/// Records expose their state as a [`FieldMap`] so that posted data, validated
/// data and stored rows can all flow through the same path. `exchange` only
/// overwrites the fields present in the map it receives.
pub trait Record: Send + Sync + 'static {
    /// Names of the key fields, in composite-key order.
    fn key_fields(&self) -> &'static [&'static str];

    fn to_fields(&self) -> FieldMap;

    fn exchange(&mut self, data: &FieldMap);

    fn input_filter(&self) -> InputFilter;

    fn key(&self) -> Option<RecordKey> {
        RecordKey::from_fields(self.key_fields(), &self.to_fields())
    }

    fn set_key(&mut self, key: &RecordKey) {
        let fields = self
            .key_fields()
            .iter()
            .zip(key.parts())
            .map(|(name, part)| (name.to_string(), Value::String(part.to_string())))
            .collect::<FieldMap>();
        self.exchange(&fields);
    }

    /// Hook for the active-record strategy.
    fn as_self_persisting(&mut self) -> Option<&mut dyn SelfPersisting> {
        None
    }
}

/// Active-record persistence: the record writes and removes itself.
#[async_trait]
pub trait SelfPersisting: Send + Sync {
    async fn save(&mut self) -> Result<RecordKey, PersistenceError>;

    async fn delete(&mut self) -> Result<(), PersistenceError>;
}

/// Produces empty records of a controller's concrete type.
pub trait RecordFactory<R>: Send + Sync {
    fn new_record(&self) -> R;
}

impl<R, F> RecordFactory<R> for F
where
    F: Fn() -> R + Send + Sync,
{
    fn new_record(&self) -> R {
        self()
    }
}

/// Renders a field value the way a form would post it.
pub fn value_as_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Lenient integer read: accepts JSON numbers and numeric strings.
pub fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
