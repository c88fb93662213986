//! Typed accessors for the range options namespace.

use std::sync::Arc;

use serde_json::Value;

use super::{FieldSpec, OptionChange, OptionError, OptionSchema, OptionStore};
use crate::models::{MatchCount, PlayerMin, RangeOptions, TimeSpan};
use crate::notify::Subscription;
use crate::storage::OptionStorage;

pub const DEFAULT_RANGE_NAMESPACE: &str = "matchroom.range";

pub const MATCH_COUNT: &str = "matchCount";
pub const PLAYER_MIN: &str = "playerMin";
pub const TIME_SPAN: &str = "timeSpan";

fn default_match_count() -> Value {
    Value::from(MatchCount::default().as_str())
}

fn default_player_min() -> Value {
    Value::from(PlayerMin::default().as_str())
}

fn default_time_span() -> Value {
    Value::from(TimeSpan::default().as_str())
}

pub const RANGE_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: MATCH_COUNT,
        default: default_match_count,
    },
    FieldSpec {
        name: PLAYER_MIN,
        default: default_player_min,
    },
    FieldSpec {
        name: TIME_SPAN,
        default: default_time_span,
    },
];

#[derive(Clone)]
pub struct RangeOptionStore {
    store: OptionStore,
}

impl RangeOptionStore {
    pub fn new(namespace: impl Into<String>, storage: Arc<dyn OptionStorage>) -> Self {
        Self {
            store: OptionStore::new(OptionSchema::new(namespace, RANGE_FIELDS), storage),
        }
    }

    pub fn store(&self) -> &OptionStore {
        &self.store
    }

    /// Current options. Stored values that are not recognised decode to the
    /// widest setting for that field.
    pub async fn range_options(&self) -> Result<RangeOptions, OptionError> {
        let values = self.store.values().await?;
        let raw = |field: &str| -> String {
            values
                .get(field)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Ok(RangeOptions::from_raw(
            &raw(MATCH_COUNT),
            &raw(PLAYER_MIN),
            &raw(TIME_SPAN),
        ))
    }

    pub async fn set_match_count(&self, count: MatchCount) -> Result<bool, OptionError> {
        self.store.set(MATCH_COUNT, Value::from(count.as_str())).await
    }

    pub async fn set_player_min(&self, min: PlayerMin) -> Result<bool, OptionError> {
        self.store.set(PLAYER_MIN, Value::from(min.as_str())).await
    }

    pub async fn set_time_span(&self, span: TimeSpan) -> Result<bool, OptionError> {
        self.store.set(TIME_SPAN, Value::from(span.as_str())).await
    }

    /// Set a field from user input, rejecting values the field does not know.
    pub async fn set_raw(&self, field: &str, raw: &str) -> Result<bool, OptionError> {
        let invalid = || OptionError::InvalidValue {
            field: field.to_string(),
            value: raw.to_string(),
        };
        match field {
            MATCH_COUNT => self.set_match_count(MatchCount::parse(raw).ok_or_else(invalid)?).await,
            PLAYER_MIN => self.set_player_min(PlayerMin::parse(raw).ok_or_else(invalid)?).await,
            TIME_SPAN => self.set_time_span(TimeSpan::parse(raw).ok_or_else(invalid)?).await,
            other => Err(OptionError::UnknownField {
                namespace: self.store.namespace().to_string(),
                field: other.to_string(),
            }),
        }
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&OptionChange) + Send + Sync + 'static,
    {
        self.store.subscribe(callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::storage::MemoryStorage;

    #[tokio::test]
    async fn test_defaults() {
        let options = RangeOptionStore::new(DEFAULT_RANGE_NAMESPACE, Arc::new(MemoryStorage::new()));
        let range = options.range_options().await.unwrap();

        assert_eq!(range.match_count, MatchCount::Twenty);
        assert_eq!(range.player_min, PlayerMin::Any);
        assert_eq!(range.time_span, TimeSpan::ThreeMonths);
    }

    #[tokio::test]
    async fn test_stored_values_decode() {
        let storage = MemoryStorage::new();
        storage
            .set_many(vec![
                ("matchroom.range.timeSpan".to_string(), json!("1W")),
                ("matchroom.range.matchCount".to_string(), json!("bogus")),
            ])
            .await
            .unwrap();
        let options = RangeOptionStore::new(DEFAULT_RANGE_NAMESPACE, Arc::new(storage));

        let range = options.range_options().await.unwrap();
        assert_eq!(range.time_span, TimeSpan::OneWeek);
        assert_eq!(range.match_count, MatchCount::Hundred);
    }

    #[tokio::test]
    async fn test_set_raw() {
        let storage = MemoryStorage::new();
        let options = RangeOptionStore::new(DEFAULT_RANGE_NAMESPACE, Arc::new(storage.clone()));

        assert!(options.set_raw(PLAYER_MIN, "min3").await.unwrap());
        assert_eq!(storage.snapshot()["matchroom.range.playerMin"], json!("MIN3"));

        let err = options.set_raw(TIME_SPAN, "5Y").await.unwrap_err();
        assert!(matches!(err, OptionError::InvalidValue { .. }));
        let err = options.set_raw("colour", "red").await.unwrap_err();
        assert!(matches!(err, OptionError::UnknownField { .. }));
    }
}
