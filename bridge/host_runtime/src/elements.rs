//! Process-wide directory of live UI elements.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::component::{ComponentHandle, ComponentId};
use crate::error::{BridgeError, Result};

/// Identity of a page, window, menu or other element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(Ulid);

impl ElementId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for ElementId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ElementId {
    type Err = BridgeError;

    fn from_str(raw: &str) -> Result<Self> {
        Ulid::from_string(raw)
            .map(Self)
            .map_err(|_| BridgeError::not_found(format!("element {raw:?}")))
    }
}

/// Element hosting at most one mounted component.
pub trait Element: Send + Sync + 'static {
    fn id(&self) -> ElementId;

    /// Short element kind for logs, e.g. `"page"`.
    fn kind(&self) -> &'static str;

    /// Whether `component` is mounted in this element.
    fn contains(&self, component: ComponentId) -> bool;

    fn render(&self, component: &ComponentHandle) -> Result<()>;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Elements by identity, with a reverse lookup by hosted component.
///
/// The component lookup is derived from the elements themselves, so removing
/// an element drops both mappings in one step.
#[derive(Default)]
pub struct ElementDirectory {
    elements: RwLock<HashMap<ElementId, Arc<dyn Element>>>,
}

impl ElementDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, element: Arc<dyn Element>) {
        let id = element.id();
        log::debug!("{} {id} added", element.kind());
        self.elements.write().insert(id, element);
    }

    pub fn remove(&self, id: ElementId) -> Option<Arc<dyn Element>> {
        let removed = self.elements.write().remove(&id);
        if let Some(element) = &removed {
            log::debug!("{} {id} removed", element.kind());
        }
        removed
    }

    pub fn element(&self, id: ElementId) -> Result<Arc<dyn Element>> {
        self.elements
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| BridgeError::not_found(format!("element {id}")))
    }

    /// Concrete element type behind `id`.
    pub fn typed<T: Element>(&self, id: ElementId) -> Result<Arc<T>> {
        let element = self.element(id)?;
        let kind = element.kind();
        element
            .into_any()
            .downcast::<T>()
            .map_err(|_| BridgeError::not_found(format!("{kind} {id} of requested type")))
    }

    /// Element hosting `component`. Elements are queried after the directory
    /// lock is released, so they may call back into the directory.
    pub fn element_by_component(&self, component: ComponentId) -> Result<Arc<dyn Element>> {
        let elements: Vec<Arc<dyn Element>> = self.elements.read().values().cloned().collect();
        elements
            .into_iter()
            .find(|element| element.contains(component))
            .ok_or_else(|| BridgeError::not_found(format!("element hosting component {component}")))
    }

    pub fn len(&self) -> usize {
        self.elements.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.read().is_empty()
    }
}
