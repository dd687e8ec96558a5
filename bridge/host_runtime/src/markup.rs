//! Markup engine seam.
//!
//! Diffing and mount internals live outside this crate; pages talk to them
//! through [`Markup`]. [`TextMarkup`] keeps each mounted component's rendered
//! text in memory.

use std::collections::HashMap;

use crate::component::{ComponentHandle, ComponentId};
use crate::error::{BridgeError, Result};

/// Engines only track rendered output. Component mount hooks are run by the
/// page after it releases its locks.
pub trait Markup: Send + 'static {
    fn mount(&mut self, component: &ComponentHandle) -> Result<()>;

    /// Returns whether `component` was mounted.
    fn dismount(&mut self, component: &ComponentHandle) -> bool;

    fn update(&mut self, component: &ComponentHandle) -> Result<()>;

    fn contains(&self, component: ComponentId) -> bool;
}

#[derive(Debug, Default)]
pub struct TextMarkup {
    rendered: HashMap<ComponentId, String>,
}

impl TextMarkup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rendered(&self, component: ComponentId) -> Option<&str> {
        self.rendered.get(&component).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.rendered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rendered.is_empty()
    }
}

impl Markup for TextMarkup {
    fn mount(&mut self, component: &ComponentHandle) -> Result<()> {
        if self.rendered.contains_key(&component.id()) {
            return Err(BridgeError::AlreadyMounted {
                component: component.id(),
            });
        }

        let text = component.component().render();
        self.rendered.insert(component.id(), text);
        Ok(())
    }

    fn dismount(&mut self, component: &ComponentHandle) -> bool {
        self.rendered.remove(&component.id()).is_some()
    }

    fn update(&mut self, component: &ComponentHandle) -> Result<()> {
        let slot = self
            .rendered
            .get_mut(&component.id())
            .ok_or_else(|| BridgeError::not_found(format!("mounted component {}", component.id())))?;
        *slot = component.component().render();
        Ok(())
    }

    fn contains(&self, component: ComponentId) -> bool {
        self.rendered.contains_key(&component)
    }
}
