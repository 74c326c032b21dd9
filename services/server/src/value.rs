use std::any::Any;
use std::sync::Arc;

/// A copy-on-read wrapper around a per-connection keyed value, returned by
/// `Client::get_key`. Rust has no `any`-to-concrete-type coercion as
/// permissive as the original's `reflect`-based `Value.By`, so typed
/// extraction goes through `downcast_ref` instead; the `Option`-returning
/// accessors below give the same "absent or wrong type yields a default"
/// ergonomics the original's per-type getters have.
#[derive(Clone)]
pub struct Value(Option<Arc<dyn Any + Send + Sync>>);

impl Value {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn new(data: impl Any + Send + Sync) -> Self {
        Self(Some(Arc::new(data)))
    }

    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }

    pub fn downcast<T: Any + Send + Sync + Clone>(&self) -> Option<T> {
        self.0.as_ref()?.downcast_ref::<T>().cloned()
    }

    pub fn string(&self) -> String {
        self.downcast::<String>().unwrap_or_default()
    }

    pub fn int(&self) -> i64 {
        self.downcast::<i64>().unwrap_or_default()
    }

    pub fn boolean(&self) -> bool {
        self.downcast::<bool>().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_value_downcasts_to_default() {
        let v = Value::none();
        assert_eq!(v.string(), "");
        assert_eq!(v.int(), 0);
        assert!(!v.boolean());
    }

    #[test]
    fn typed_round_trip() {
        let v = Value::new("hello".to_string());
        assert_eq!(v.string(), "hello");
        assert_eq!(v.int(), 0, "wrong-type access yields the type's default");
    }

    #[test]
    fn bool_and_int_round_trip() {
        assert!(Value::new(true).boolean());
        assert_eq!(Value::new(42i64).int(), 42);
    }
}
