use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::sync::RwLock;

use crate::context::Context;
use crate::error::ConfigError;

/// A single handler or middleware step in an action's chain. Boxed futures
/// let handlers call other async code without the router itself needing
/// to be generic over every handler's future type.
pub type HandlerFunc = Arc<dyn for<'c> Fn(&'c mut Context) -> BoxFuture<'c, ()> + Send + Sync>;
pub type HandlersChain = Vec<HandlerFunc>;

/// Registers the action-name to handler-chain mapping the dispatcher
/// consults on every inbound request. Registration happens once at
/// startup; `add` panics on a duplicate action name rather than silently
/// overwriting it, matching the original's fail-fast registration.
pub struct Router {
    handler_map: RwLock<HashMap<String, HandlersChain>>,
    global_middleware: RwLock<HandlersChain>,
}

impl Router {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            handler_map: RwLock::new(HashMap::new()),
            global_middleware: RwLock::new(Vec::new()),
        })
    }

    /// Middleware added here runs before every registered action's own
    /// handlers, in registration order.
    pub async fn use_middleware(&self, f: HandlerFunc) {
        self.global_middleware.write().await.push(f);
    }

    /// Panics if `action` is already registered.
    pub async fn add(&self, action: impl Into<String>, handlers: HandlersChain) {
        let action = action.into();
        let mut map = self.handler_map.write().await;
        if map.contains_key(&action) {
            panic!("{}", ConfigError::DuplicateRoute(action));
        }

        let mut chain = self.global_middleware.read().await.clone();
        chain.extend(handlers);
        map.insert(action, chain);
    }

    /// Returns a group that prefixes every action it registers with
    /// `"<prefix>."` and prepends `middlewares` ahead of each action's own
    /// handlers, in addition to the router's global middleware.
    pub fn group(self: &Arc<Self>, prefix: impl Into<String>, middlewares: HandlersChain) -> RouterGroup {
        RouterGroup { router: self.clone(), prefix: prefix.into(), middlewares }
    }

    pub async fn resolve(&self, action: &str) -> Option<HandlersChain> {
        self.handler_map.read().await.get(action).cloned()
    }
}

pub struct RouterGroup {
    router: Arc<Router>,
    prefix: String,
    middlewares: HandlersChain,
}

impl RouterGroup {
    pub async fn add(&self, action: impl AsRef<str>, handlers: HandlersChain) {
        let full_action = format!("{}.{}", self.prefix, action.as_ref());
        let mut chain = self.middlewares.clone();
        chain.extend(handlers);
        self.router.add(full_action, chain).await;
    }

    pub fn group(&self, prefix: impl AsRef<str>, middlewares: HandlersChain) -> RouterGroup {
        let mut combined = self.middlewares.clone();
        combined.extend(middlewares);
        RouterGroup {
            router: self.router.clone(),
            prefix: format!("{}.{}", self.prefix, prefix.as_ref()),
            middlewares: combined,
        }
    }
}
