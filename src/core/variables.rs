use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

#[derive(Debug, Clone, thiserror::Error)]
pub enum VariableError {
    #[error("Variable not found: owner={owner_id}, name={name}")]
    NotFound { owner_id: String, name: String },
    #[error("Variable access denied: owner={owner_id}, name={name}")]
    AccessDenied { owner_id: String, name: String },
    #[error("Variable service error: {0}")]
    ServiceError(String),
}

/// External secret/variable store consulted for `load_from_db` fields.
#[async_trait]
pub trait VariableService: Send + Sync {
    async fn resolve(&self, owner_id: &str, name: &str) -> Result<String, VariableError>;
}

/// Variables keyed by owner, then by name.
pub struct InMemoryVariableService {
    store: RwLock<HashMap<String, HashMap<String, String>>>,
}

impl InMemoryVariableService {
    pub fn new() -> Self {
        Self {
            store: RwLock::new(HashMap::new()),
        }
    }

    pub fn insert(&self, owner_id: impl Into<String>, name: impl Into<String>, value: impl Into<String>) {
        self.store
            .write()
            .entry(owner_id.into())
            .or_default()
            .insert(name.into(), value.into());
    }

    pub fn with_variable(
        self,
        owner_id: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.insert(owner_id, name, value);
        self
    }
}

impl Default for InMemoryVariableService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VariableService for InMemoryVariableService {
    async fn resolve(&self, owner_id: &str, name: &str) -> Result<String, VariableError> {
        let guard = self.store.read();
        guard
            .get(owner_id)
            .and_then(|vars| vars.get(name))
            .cloned()
            .ok_or_else(|| VariableError::NotFound {
                owner_id: owner_id.to_string(),
                name: name.to_string(),
            })
    }
}
