//! Event hooks.
//!
//! Hooks run at fixed points of the request lifecycle, highest priority
//! first. A per-request hook gets the mutable [`Context`] and may either fail
//! the request or answer it directly with [`Context::respond`].

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use laconic_core::{ApiError, PriorityList};
use thiserror::Error;

use crate::config::LaconicConfig;
use crate::context::Context;
use crate::router::RouteInfo;

/// Lowest hook priority.
pub const MIN_PRIORITY: i32 = -1;
/// Highest hook priority.
pub const MAX_PRIORITY: i32 = 100;
/// Priority used when none is given.
pub const DEFAULT_PRIORITY: i32 = 1;

/// Points in the application and request lifecycle where hooks fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// The application was frozen into a service.
    AppCreated,
    /// A request context was created.
    ContextInit,
    /// The request head and body were read.
    RequestParsed,
    /// The router picked an endpoint.
    EndpointDetermined,
    /// A response exists (from the endpoint, a handler, a hook or an error).
    ResponseGenerated,
    /// The request is done.
    ContextFinalize,
}

impl Event {
    /// Every event, in lifecycle order.
    pub const ALL: [Self; 6] = [
        Self::AppCreated,
        Self::ContextInit,
        Self::RequestParsed,
        Self::EndpointDetermined,
        Self::ResponseGenerated,
        Self::ContextFinalize,
    ];

    /// Hook name of the event.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AppCreated => "on_app_created",
            Self::ContextInit => "on_context_init",
            Self::RequestParsed => "on_request_parsed",
            Self::EndpointDetermined => "on_endpoint_determined",
            Self::ResponseGenerated => "on_response_generated",
            Self::ContextFinalize => "on_context_finalize",
        }
    }

    /// Whether hooks for this event receive a request context.
    #[must_use]
    pub const fn is_per_request(self) -> bool {
        !matches!(self, Self::AppCreated)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Event {
    type Err = HookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| HookError::UnknownEvent(s.to_string()))
    }
}

/// Hook registration errors.
#[derive(Debug, Error)]
pub enum HookError {
    #[error("Unknown event `{0}`")]
    UnknownEvent(String),

    #[error("Event `{0}` does not carry a request context, use `on_app_created`.")]
    WrongEvent(Event),
}

/// What `on_app_created` hooks get to see.
#[derive(Debug, Clone)]
pub struct AppInfo {
    /// Application name.
    pub name: String,
    /// Frozen configuration.
    pub config: Arc<LaconicConfig>,
    /// Registered routes, in matching order.
    pub routes: Vec<RouteInfo>,
}

/// A hook run for every request.
pub type ContextHook = dyn Fn(&mut Context) -> Result<(), ApiError> + Send + Sync;

/// A hook run once when the application is created.
pub type AppHook = dyn Fn(&AppInfo) + Send + Sync;

/// Clamp a priority into the accepted range.
#[must_use]
pub const fn clamp_priority(priority: i32) -> i32 {
    if priority < MIN_PRIORITY {
        MIN_PRIORITY
    } else if priority > MAX_PRIORITY {
        MAX_PRIORITY
    } else {
        priority
    }
}

/// Registered hooks, per event.
#[derive(Clone, Default)]
pub struct EventHooks {
    context: HashMap<Event, PriorityList<Arc<ContextHook>>>,
    app: PriorityList<Arc<AppHook>>,
}

impl fmt::Debug for EventHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<&str, usize> = self
            .context
            .iter()
            .map(|(e, hooks)| (e.as_str(), hooks.len()))
            .collect();
        f.debug_struct("EventHooks")
            .field("context", &counts)
            .field("app", &self.app.len())
            .finish()
    }
}

impl EventHooks {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a per-request hook.
    ///
    /// # Errors
    ///
    /// Returns `HookError::WrongEvent` for `Event::AppCreated`.
    pub fn add<F>(&mut self, event: Event, priority: i32, hook: F) -> Result<(), HookError>
    where
        F: Fn(&mut Context) -> Result<(), ApiError> + Send + Sync + 'static,
    {
        if !event.is_per_request() {
            return Err(HookError::WrongEvent(event));
        }
        self.insert(event, priority, Arc::new(hook));
        Ok(())
    }

    pub(crate) fn insert(&mut self, event: Event, priority: i32, hook: Arc<ContextHook>) {
        self.context
            .entry(event)
            .or_default()
            .insert(clamp_priority(priority), hook);
    }

    /// Register an `on_app_created` hook.
    pub fn add_app<F>(&mut self, priority: i32, hook: F)
    where
        F: Fn(&AppInfo) + Send + Sync + 'static,
    {
        self.app.insert(clamp_priority(priority), Arc::new(hook));
    }

    /// Run the hooks of `event` against a request context.
    ///
    /// Stops at the first hook that fails.
    ///
    /// # Errors
    ///
    /// Returns the failing hook's error.
    pub fn trigger(&self, event: Event, ctx: &mut Context) -> Result<(), ApiError> {
        let Some(hooks) = self.context.get(&event) else {
            return Ok(());
        };
        for hook in hooks.iter() {
            hook(ctx)?;
        }
        Ok(())
    }

    /// Run the `on_app_created` hooks.
    pub fn trigger_app(&self, info: &AppInfo) {
        for hook in self.app.iter() {
            hook(info);
        }
    }

    /// Number of hooks registered for `event`.
    #[must_use]
    pub fn len(&self, event: Event) -> usize {
        match event {
            Event::AppCreated => self.app.len(),
            _ => self.context.get(&event).map_or(0, PriorityList::len),
        }
    }

    /// Whether no hooks are registered at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.app.is_empty() && self.context.values().all(PriorityList::is_empty)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use serde_json::Value;

    use super::*;

    fn ctx() -> Context {
        Context::detached(Arc::new(LaconicConfig::default()))
    }

    #[test]
    fn test_event_names_round_trip() {
        for event in Event::ALL {
            assert_eq!(event.as_str().parse::<Event>().unwrap(), event);
        }
        assert!(matches!(
            "on_something".parse::<Event>(),
            Err(HookError::UnknownEvent(name)) if name == "on_something"
        ));
    }

    #[test]
    fn test_clamp_priority() {
        assert_eq!(clamp_priority(-50), MIN_PRIORITY);
        assert_eq!(clamp_priority(500), MAX_PRIORITY);
        assert_eq!(clamp_priority(7), 7);
    }

    #[test]
    fn test_per_request_hook_for_app_created_is_rejected() {
        let mut hooks = EventHooks::new();
        let result = hooks.add(Event::AppCreated, 1, |_| Ok(()));
        assert!(matches!(result, Err(HookError::WrongEvent(Event::AppCreated))));
        assert!(hooks.is_empty());
    }

    #[test]
    fn test_hooks_run_in_priority_order() {
        let mut hooks = EventHooks::new();
        for (priority, tag) in [(1, "a"), (100, "b"), (1, "c"), (-5, "d"), (500, "e")] {
            hooks
                .add(Event::ContextInit, priority, move |ctx: &mut Context| {
                    let seen = ctx
                        .locals()
                        .get("seen")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    ctx.locals_mut()
                        .insert("seen".into(), Value::from(seen + tag));
                    Ok(())
                })
                .unwrap();
        }

        let mut ctx = ctx();
        hooks.trigger(Event::ContextInit, &mut ctx).unwrap();
        // 500 is clamped to 100 and registered after "b"
        assert_eq!(ctx.locals()["seen"], "beacd");
        assert_eq!(hooks.len(Event::ContextInit), 5);
    }

    #[test]
    fn test_failing_hook_stops_the_chain() {
        let mut hooks = EventHooks::new();
        hooks
            .add(Event::RequestParsed, 10, |_| {
                Err(ApiError::bad_request("nope"))
            })
            .unwrap();
        hooks
            .add(Event::RequestParsed, 1, |ctx: &mut Context| {
                ctx.locals_mut().insert("ran".into(), Value::Bool(true));
                Ok(())
            })
            .unwrap();

        let mut ctx = ctx();
        let err = hooks.trigger(Event::RequestParsed, &mut ctx).unwrap_err();
        assert_eq!(err.description(), "nope");
        assert!(!ctx.locals().contains_key("ran"));
    }

    #[test]
    fn test_app_hooks() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut hooks = EventHooks::new();
        let seen = Arc::clone(&calls);
        hooks.add_app(DEFAULT_PRIORITY, move |info| {
            seen.lock().unwrap().push(info.name.clone());
        });

        let info = AppInfo {
            name: "demo".into(),
            config: Arc::new(LaconicConfig::default()),
            routes: Vec::new(),
        };
        hooks.trigger_app(&info);
        assert_eq!(*calls.lock().unwrap(), vec!["demo".to_string()]);
        assert_eq!(hooks.len(Event::AppCreated), 1);
    }
}
