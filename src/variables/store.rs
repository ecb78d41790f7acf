//! Variable Store
//!
//! Read-only access to the currently defined variables. The query pipeline
//! reads a snapshot once per call; mutation belongs to whoever owns the store.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::variables::types::{Assignment, Variable};

/// Source of user-defined variables
#[async_trait]
pub trait VariableStore: Send + Sync {
    /// Snapshot of all currently defined variables
    async fn variables(&self) -> Vec<Variable>;

    /// Resolve a variable into zero or more assignments
    fn as_assignment(&self, variable: &Variable) -> Vec<Assignment> {
        variable.resolve()
    }
}

/// In-memory variable store
#[derive(Debug, Default)]
pub struct MemoryVariableStore {
    variables: RwLock<Vec<Variable>>,
}

impl MemoryVariableStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with variables
    pub fn with_variables(variables: Vec<Variable>) -> Self {
        Self {
            variables: RwLock::new(variables),
        }
    }

    /// Insert a variable, replacing any existing one with the same name
    pub async fn set(&self, variable: Variable) {
        let mut variables = self.variables.write().await;
        match variables.iter_mut().find(|v| v.name == variable.name) {
            Some(existing) => *existing = variable,
            None => variables.push(variable),
        }
    }

    /// Remove a variable by name, returning it if present
    pub async fn remove(&self, name: &str) -> Option<Variable> {
        let mut variables = self.variables.write().await;
        let idx = variables.iter().position(|v| v.name == name)?;
        Some(variables.remove(idx))
    }

    /// Number of defined variables
    pub async fn len(&self) -> usize {
        self.variables.read().await.len()
    }

    /// Whether no variables are defined
    pub async fn is_empty(&self) -> bool {
        self.variables.read().await.is_empty()
    }
}

#[async_trait]
impl VariableStore for MemoryVariableStore {
    async fn variables(&self) -> Vec<Variable> {
        self.variables.read().await.clone()
    }
}
