use crate::parser::{Parser, ParserResult};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Produces parser instances for one media type.
pub trait ParserFactory: Send + Sync {
    fn create(&self) -> ParserResult<Box<dyn Parser>>;
}

impl<F> ParserFactory for F
where
    F: Fn() -> ParserResult<Box<dyn Parser>> + Send + Sync,
{
    fn create(&self) -> ParserResult<Box<dyn Parser>> {
        self()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("a parser is already registered for media type {type_id}")]
    DuplicateRegistration { type_id: String },
    #[error("media type identifier must not be empty")]
    EmptyTypeId,
}

/// Collects registrations during startup. Call [`RegistryBuilder::freeze`]
/// once every parser is registered.
#[derive(Default)]
pub struct RegistryBuilder {
    order: Vec<String>,
    factories: HashMap<String, Arc<dyn ParserFactory>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` for `type_id`.
    ///
    /// A second registration for the same type is a programming error: it is
    /// rejected, logged, and the first registration stays in place.
    pub fn register<F>(&mut self, type_id: impl Into<String>, factory: F) -> Result<(), RegistryError>
    where
        F: ParserFactory + 'static,
    {
        let type_id = type_id.into();
        if type_id.trim().is_empty() {
            return Err(RegistryError::EmptyTypeId);
        }
        if self.factories.contains_key(&type_id) {
            tracing::error!(media_type = %type_id, "duplicate parser registration rejected");
            return Err(RegistryError::DuplicateRegistration { type_id });
        }
        tracing::debug!(media_type = %type_id, "parser registered");
        self.factories.insert(type_id.clone(), Arc::new(factory));
        self.order.push(type_id);
        Ok(())
    }

    pub fn freeze(self) -> ParserRegistry {
        ParserRegistry {
            order: self.order,
            factories: self.factories,
        }
    }
}

/// Read-only map from media type to parser factory.
///
/// Built once at startup and shared by reference with whatever creates
/// browser sessions.
#[derive(Clone, Default)]
pub struct ParserRegistry {
    order: Vec<String>,
    factories: HashMap<String, Arc<dyn ParserFactory>>,
}

impl ParserRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn resolve(&self, type_id: &str) -> Option<Arc<dyn ParserFactory>> {
        self.factories.get(type_id).cloned()
    }

    /// Registered media types, in registration order.
    pub fn all_types(&self) -> &[String] {
        &self.order
    }

    pub fn contains(&self, type_id: &str) -> bool {
        self.factories.contains_key(type_id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserRegistry")
            .field("types", &self.order)
            .finish()
    }
}
