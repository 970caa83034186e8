//! Learned Fact store.
//!
//! Persisted facts, deduplicated by normalized (lower-cased, trimmed) text.
//! First load of a legacy `list[str]` file migrates it to structured form
//! and re-saves atomically (§3, §8 invariant 4).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use uuid::Uuid;

pub const MIGRATED_CATEGORY: &str = "uncategorized_migrated";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnedFact {
    pub fact_id: Uuid,
    pub text: String,
    pub category: String,
    pub source: String,
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

pub struct FactStore {
    path: Option<PathBuf>,
    facts: parking_lot::RwLock<Vec<LearnedFact>>,
}

impl FactStore {
    pub fn new(path: PathBuf) -> anyhow::Result<Self> {
        let facts = Self::load_or_migrate(&path)?;
        let store = Self {
            path: Some(path),
            facts: parking_lot::RwLock::new(facts),
        };
        store.persist()?;
        Ok(store)
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            facts: parking_lot::RwLock::new(Vec::new()),
        }
    }

    /// Loads the structured form directly when possible; falls back to
    /// parsing a legacy `list[str]` and migrating each entry.
    fn load_or_migrate(path: &std::path::Path) -> anyhow::Result<Vec<LearnedFact>> {
        let raw: Option<Value> = crate::persistence::read_json_opt(path)?;
        let Some(raw) = raw else {
            return Ok(Vec::new());
        };

        if let Ok(facts) = serde_json::from_value::<Vec<LearnedFact>>(raw.clone()) {
            return Ok(facts);
        }

        let legacy: Vec<String> = serde_json::from_value(raw)?;
        let now = Utc::now();
        Ok(legacy
            .into_iter()
            .map(|text| LearnedFact {
                fact_id: Uuid::new_v4(),
                text,
                category: MIGRATED_CATEGORY.to_string(),
                source: "legacy_migration".to_string(),
                user_id: None,
                created_at: now,
                updated_at: now,
            })
            .collect())
    }

    fn persist(&self) -> anyhow::Result<()> {
        if let Some(path) = &self.path {
            crate::persistence::write_json_atomic(path, &*self.facts.read())?;
        }
        Ok(())
    }

    pub fn contains_text(&self, text: &str) -> bool {
        let normalized = normalize(text);
        self.facts.read().iter().any(|f| normalize(&f.text) == normalized)
    }

    pub fn add_fact(
        &self,
        text: &str,
        category: &str,
        source: &str,
        user_id: Option<String>,
    ) -> anyhow::Result<LearnedFact> {
        let now = Utc::now();
        let fact = LearnedFact {
            fact_id: Uuid::new_v4(),
            text: text.to_string(),
            category: category.to_string(),
            source: source.to_string(),
            user_id,
            created_at: now,
            updated_at: now,
        };
        self.facts.write().push(fact.clone());
        self.persist()?;
        Ok(fact)
    }

    pub fn all(&self) -> Vec<LearnedFact> {
        self.facts.read().clone()
    }

    pub fn len(&self) -> usize {
        self.facts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
