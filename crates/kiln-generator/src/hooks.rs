//! Ordered callbacks at named points of the build lifecycle.

use std::{collections::HashMap, sync::Arc};

use kiln_core::Renderable;
use serde_yaml::Value;
use thiserror::Error;

use crate::site::Site;

/// Error returned by a hook callback.
#[derive(Debug, Error)]
#[error("hook failed: {message}")]
pub struct HookError {
    message: String,
}

impl HookError {
    /// Create a hook error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Result type for hook callbacks.
pub type Result<T> = std::result::Result<T, HookError>;

/// Site lifecycle points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SiteHook {
    /// Once the site is constructed.
    AfterInit,
    /// After run-scoped state is cleared.
    AfterReset,
    /// After the source tree is read.
    PostRead,
    /// Before any item is rendered; receives the payload.
    PreRender,
    /// After every item is rendered; receives the payload.
    PostRender,
    /// After everything is written.
    PostWrite,
}

/// Per-item lifecycle points for documents and pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemHook {
    /// Before templating and conversion.
    PreRender,
    /// After conversion, before layouts.
    PostConvert,
    /// After layouts.
    PostRender,
    /// After the output file is written.
    PostWrite,
}

/// Site callback. The payload is present at render points only.
pub type SiteCallback = Arc<dyn Fn(&mut Site, Option<&mut Value>) -> Result<()> + Send + Sync>;

/// Item callback.
pub type ItemCallback = Arc<dyn Fn(&mut dyn Renderable) -> Result<()> + Send + Sync>;

/// Registry of hook callbacks, run in registration order.
#[derive(Clone, Default)]
pub struct Hooks {
    site: HashMap<SiteHook, Vec<SiteCallback>>,
    items: HashMap<ItemHook, Vec<ItemCallback>>,
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("site", &self.site.iter().map(|(k, v)| (k, v.len())).collect::<Vec<_>>())
            .field("items", &self.items.iter().map(|(k, v)| (k, v.len())).collect::<Vec<_>>())
            .finish()
    }
}

impl Hooks {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a site callback.
    pub fn on_site<F>(&mut self, point: SiteHook, callback: F)
    where
        F: Fn(&mut Site, Option<&mut Value>) -> Result<()> + Send + Sync + 'static,
    {
        self.site.entry(point).or_default().push(Arc::new(callback));
    }

    /// Register an item callback.
    pub fn on_item<F>(&mut self, point: ItemHook, callback: F)
    where
        F: Fn(&mut dyn Renderable) -> Result<()> + Send + Sync + 'static,
    {
        self.items.entry(point).or_default().push(Arc::new(callback));
    }

    /// Site callbacks for a point, in order.
    pub fn site_callbacks(&self, point: SiteHook) -> &[SiteCallback] {
        self.site.get(&point).map_or(&[][..], Vec::as_slice)
    }

    /// Run item callbacks for a point, stopping at the first error.
    pub fn trigger_item(&self, point: ItemHook, item: &mut dyn Renderable) -> Result<()> {
        for callback in self.items.get(&point).map_or(&[][..], Vec::as_slice) {
            callback(&mut *item)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use kiln_core::{FrontMatter, Page};

    use super::*;

    #[test]
    fn test_item_hooks_run_in_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut hooks = Hooks::new();
        for n in 0..3 {
            let order = Arc::clone(&order);
            hooks.on_item(ItemHook::PostRender, move |_| {
                order.lock().unwrap().push(n);
                Ok(())
            });
        }

        let mut page = Page::generated("", "a.html", FrontMatter::new(), "");
        hooks.trigger_item(ItemHook::PostRender, &mut page).unwrap();
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_item_hook_can_edit_output() {
        let mut hooks = Hooks::new();
        hooks.on_item(ItemHook::PostRender, |item| {
            let output = format!("{}<!-- {} -->", item.output().unwrap_or_default(), item.url());
            item.set_output(output);
            Ok(())
        });

        let mut page = Page::generated("", "a.html", FrontMatter::new(), "");
        page.set_output("<p>x</p>".to_string());
        hooks.trigger_item(ItemHook::PostRender, &mut page).unwrap();
        assert_eq!(page.output(), Some("<p>x</p><!--  -->"));
    }

    #[test]
    fn test_item_hook_error_stops_the_chain() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut hooks = Hooks::new();
        hooks.on_item(ItemHook::PreRender, |_| Err(HookError::new("nope")));
        let counter = Arc::clone(&calls);
        hooks.on_item(ItemHook::PreRender, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let mut page = Page::generated("", "a.html", FrontMatter::new(), "");
        let err = hooks.trigger_item(ItemHook::PreRender, &mut page).unwrap_err();
        assert_eq!(err.to_string(), "hook failed: nope");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_site_callbacks_lookup() {
        let mut hooks = Hooks::new();
        assert!(hooks.site_callbacks(SiteHook::PostRead).is_empty());
        hooks.on_site(SiteHook::PostRead, |_, _| Ok(()));
        assert_eq!(hooks.site_callbacks(SiteHook::PostRead).len(), 1);
        assert!(hooks.site_callbacks(SiteHook::PostWrite).is_empty());
    }
}
