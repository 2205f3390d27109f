//! Query APIs an engine exposes to the node's RPC layer.
//!
//! The transport is outside this crate; an engine only describes a namespace
//! of named, argument-free methods that return JSON values.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

/// Handler behind one API method.
pub type ApiHandler = Arc<dyn Fn() -> Value + Send + Sync>;

/// A named query.
#[derive(Clone)]
pub struct ApiMethod {
    pub name: &'static str,
    handler: ApiHandler,
}

impl ApiMethod {
    pub fn new(name: &'static str, handler: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        Self {
            name,
            handler: Arc::new(handler),
        }
    }

    pub fn call(&self) -> Value {
        (self.handler)()
    }
}

impl fmt::Debug for ApiMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiMethod").field("name", &self.name).finish_non_exhaustive()
    }
}

/// A namespace of query methods.
#[derive(Debug, Clone)]
pub struct Api {
    pub namespace: &'static str,
    pub version: &'static str,
    pub methods: Vec<ApiMethod>,
}

impl Api {
    /// Invoke `method` by name.
    pub fn call(&self, method: &str) -> Option<Value> {
        self.methods
            .iter()
            .find(|m| m.name == method)
            .map(ApiMethod::call)
    }

    /// Method names, in declaration order.
    pub fn method_names(&self) -> Vec<&'static str> {
        self.methods.iter().map(|m| m.name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn call_dispatches_by_name() {
        let counter = Arc::new(AtomicU64::new(7));
        let c = Arc::clone(&counter);
        let api = Api {
            namespace: "test",
            version: "1.0",
            methods: vec![
                ApiMethod::new("counter", move || json!(c.load(Ordering::SeqCst))),
                ApiMethod::new("name", || json!("forge")),
            ],
        };
        assert_eq!(api.call("counter"), Some(json!(7)));
        counter.store(9, Ordering::SeqCst);
        assert_eq!(api.call("counter"), Some(json!(9)));
        assert_eq!(api.call("name"), Some(json!("forge")));
        assert_eq!(api.call("missing"), None);
        assert_eq!(api.method_names(), vec!["counter", "name"]);
    }
}
