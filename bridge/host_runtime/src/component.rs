//! Application components and the factory that builds them by name.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::{BridgeError, Result};

/// Identity of one component instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentId(Ulid);

impl ComponentId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for ComponentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unit of UI logic mounted into a page.
pub trait Component: Send + Sync + 'static {
    /// Markup for the current state.
    fn render(&self) -> String;

    fn on_mount(&self) {}

    fn on_dismount(&self) {}
}

/// Shared handle to a component instance and its identity.
#[derive(Clone)]
pub struct ComponentHandle {
    id: ComponentId,
    name: Arc<str>,
    inner: Arc<dyn Component>,
}

impl ComponentHandle {
    pub fn new(name: &str, component: Box<dyn Component>) -> Self {
        Self {
            id: ComponentId::new(),
            name: Arc::from(name),
            inner: Arc::from(component),
        }
    }

    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn component(&self) -> &dyn Component {
        self.inner.as_ref()
    }
}

impl fmt::Debug for ComponentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

type Constructor = Arc<dyn Fn() -> Box<dyn Component> + Send + Sync + 'static>;

/// Builds components from the names derived from page locations.
#[derive(Default)]
pub struct Factory {
    constructors: RwLock<HashMap<String, Constructor>>,
}

impl Factory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a constructor under `name` (case-insensitive). A later
    /// registration for the same name replaces the earlier one.
    pub fn register<F, C>(&self, name: &str, constructor: F)
    where
        F: Fn() -> C + Send + Sync + 'static,
        C: Component,
    {
        let constructor: Constructor =
            Arc::new(move || -> Box<dyn Component> { Box::new(constructor()) });
        self.constructors
            .write()
            .insert(name.to_lowercase(), constructor);
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.constructors.read().contains_key(&name.to_lowercase())
    }

    pub fn new_component(&self, name: &str) -> Result<ComponentHandle> {
        let key = name.to_lowercase();
        let constructor = self
            .constructors
            .read()
            .get(&key)
            .cloned()
            .ok_or_else(|| BridgeError::not_found(format!("component {name:?}")))?;

        Ok(ComponentHandle::new(&key, constructor()))
    }
}
