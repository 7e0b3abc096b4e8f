use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// Construction context handed to every component's `create`.
///
/// Carries the owning player's id (if any) plus one typed value per Rust type,
/// for data the host wants components to see at spawn time.
#[derive(Clone, Default)]
pub struct EntityContext {
    /// Player that owns the entity, `None` for NPCs
    pub owner: Option<u64>,
    values: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl EntityContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_owner(owner: u64) -> Self {
        Self {
            owner: Some(owner),
            values: HashMap::new(),
        }
    }

    pub fn with<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.insert(value);
        self
    }

    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) {
        self.values.insert(TypeId::of::<T>(), Arc::new(value));
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.values
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }
}

impl std::fmt::Debug for EntityContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityContext")
            .field("owner", &self.owner)
            .field("values", &self.values.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Level(u32);

    #[test]
    fn test_typed_values() {
        let context = EntityContext::for_owner(42).with(Level(3));
        assert_eq!(context.owner, Some(42));
        assert_eq!(context.get::<Level>(), Some(&Level(3)));
        assert!(context.get::<String>().is_none());
    }
}
