use indexmap::IndexMap;
use squery_core::Operation;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Duplicate operation id: {0}")]
    DuplicateId(String),
}

/// Operations reachable through a route handler, keyed by exact id.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    operations: IndexMap<String, Operation>,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            operations: IndexMap::new(),
        }
    }

    pub fn from_operations(
        operations: impl IntoIterator<Item = Operation>,
    ) -> Result<Self, RegistryError> {
        let mut registry = Registry::new();
        for operation in operations {
            registry.insert(operation)?;
        }
        Ok(registry)
    }

    pub fn insert(&mut self, operation: Operation) -> Result<(), RegistryError> {
        if self.operations.contains_key(operation.id()) {
            return Err(RegistryError::DuplicateId(operation.id().to_string()));
        }
        self.operations.insert(operation.id().to_string(), operation);
        Ok(())
    }

    pub fn lookup(&self, id: &str) -> Option<&Operation> {
        self.operations.get(id)
    }

    /// Ids in registration order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.operations.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
