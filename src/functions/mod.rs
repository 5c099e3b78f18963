use crate::errors::CallError;
use crate::value::{Type, Value};
use itertools::Itertools;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Trait for pluggable functions callable from expressions.
///
/// Implementations receive already-evaluated argument values. They never see
/// unknown arguments: the registry short-circuits those to an unknown result
/// of the function's return type before dispatch.
pub trait Function: Send + Sync {
    fn name(&self) -> &'static str;
    fn arity(&self) -> std::ops::RangeInclusive<usize>;
    fn return_type(&self) -> Type;

    /// Pure functions may run during speculative evaluation. Impure ones are
    /// replaced by unknown results when the context is in pure-only mode.
    fn is_pure(&self) -> bool {
        true
    }

    fn call(&self, args: &[Value]) -> Result<Value, CallError>;
}

/// Thread-safe function registry.
///
/// Built once per [`Context`](crate::context::Context) and shared read-only
/// afterwards. The base directory and pure-only flag are baked in at build
/// time.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<HashMap<&'static str, Arc<dyn Function>>>,
    pure_only: bool,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble the built-in function table.
    ///
    /// `base_dir` anchors filesystem functions such as `file`; `pure_only`
    /// makes impure functions yield unknown results instead of executing.
    pub fn build(base_dir: &Path, pure_only: bool) -> Self {
        debug!(base_dir = %base_dir.display(), pure_only, "building function table");
        let mut map: HashMap<&'static str, Arc<dyn Function>> = HashMap::new();
        let funcs: [Arc<dyn Function>; 12] = [
            Arc::new(builtins::Lower),
            Arc::new(builtins::Upper),
            Arc::new(builtins::Length),
            Arc::new(builtins::Join),
            Arc::new(builtins::Split),
            Arc::new(builtins::First),
            Arc::new(builtins::Unique),
            Arc::new(builtins::Coalesce),
            Arc::new(builtins::JsonEncode),
            Arc::new(builtins::JsonDecode),
            Arc::new(builtins::FileRead {
                base_dir: base_dir.to_path_buf(),
            }),
            Arc::new(builtins::Timestamp),
        ];
        for func in funcs {
            map.insert(func.name(), func);
        }
        Self {
            inner: Arc::new(map),
            pure_only,
        }
    }

    pub fn register<F: Function + 'static>(&mut self, f: F) {
        let mut_map = Arc::make_mut(&mut self.inner);
        mut_map.insert(f.name(), Arc::new(f));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Function>> {
        self.inner.get(name).cloned()
    }

    /// Registered function names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        self.inner.keys().copied().sorted().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Dispatch a call by name, enforcing arity and the unknown/pure-only
    /// short circuits.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, CallError> {
        let func = self
            .get(name)
            .ok_or_else(|| CallError::UnknownFunction(name.to_string()))?;

        let arity = func.arity();
        if !arity.contains(&args.len()) {
            return Err(CallError::BadArity {
                name: name.to_string(),
                expected: describe_arity(&arity),
                got: args.len(),
            });
        }

        if self.pure_only && !func.is_pure() {
            return Ok(Value::Unknown(func.return_type()));
        }
        if args.iter().any(Value::is_unknown) {
            return Ok(Value::Unknown(func.return_type()));
        }

        func.call(args)
    }
}

fn describe_arity(arity: &std::ops::RangeInclusive<usize>) -> String {
    match (*arity.start(), *arity.end()) {
        (min, max) if min == max => format!("exactly {min}"),
        (min, usize::MAX) => format!("at least {min}"),
        (min, max) => format!("between {min} and {max}"),
    }
}

pub mod builtins {
    use super::*;

    fn want_string(name: &'static str, arg: &Value) -> Result<String, CallError> {
        match arg {
            Value::String(text) => Ok(text.clone()),
            other => Err(CallError::InvalidArgument {
                name: name.to_string(),
                reason: format!("expected a string, got {}", other.type_of()),
            }),
        }
    }

    fn want_list<'a>(name: &'static str, arg: &'a Value) -> Result<&'a [Value], CallError> {
        match arg {
            Value::List(items) => Ok(items),
            other => Err(CallError::InvalidArgument {
                name: name.to_string(),
                reason: format!("expected a list, got {}", other.type_of()),
            }),
        }
    }

    pub struct Lower;
    impl Function for Lower {
        fn name(&self) -> &'static str {
            "lower"
        }
        fn arity(&self) -> std::ops::RangeInclusive<usize> {
            1..=1
        }
        fn return_type(&self) -> Type {
            Type::String
        }
        fn call(&self, args: &[Value]) -> Result<Value, CallError> {
            let text = want_string(self.name(), &args[0])?;
            Ok(Value::String(text.to_lowercase()))
        }
    }

    pub struct Upper;
    impl Function for Upper {
        fn name(&self) -> &'static str {
            "upper"
        }
        fn arity(&self) -> std::ops::RangeInclusive<usize> {
            1..=1
        }
        fn return_type(&self) -> Type {
            Type::String
        }
        fn call(&self, args: &[Value]) -> Result<Value, CallError> {
            let text = want_string(self.name(), &args[0])?;
            Ok(Value::String(text.to_uppercase()))
        }
    }

    pub struct Length;
    impl Function for Length {
        fn name(&self) -> &'static str {
            "length"
        }
        fn arity(&self) -> std::ops::RangeInclusive<usize> {
            1..=1
        }
        fn return_type(&self) -> Type {
            Type::Number
        }
        fn call(&self, args: &[Value]) -> Result<Value, CallError> {
            let len = match &args[0] {
                Value::String(text) => text.chars().count(),
                Value::List(items) => items.len(),
                Value::Object(attrs) => attrs.len(),
                other => {
                    return Err(CallError::InvalidArgument {
                        name: self.name().to_string(),
                        reason: format!("cannot take the length of {}", other.type_of()),
                    })
                }
            };
            Ok(Value::Number(len as f64))
        }
    }

    pub struct Join;
    impl Function for Join {
        fn name(&self) -> &'static str {
            "join"
        }
        fn arity(&self) -> std::ops::RangeInclusive<usize> {
            2..=2
        }
        fn return_type(&self) -> Type {
            Type::String
        }
        fn call(&self, args: &[Value]) -> Result<Value, CallError> {
            let sep = want_string(self.name(), &args[0])?;
            let items = want_list(self.name(), &args[1])?;
            let parts: Result<Vec<String>, CallError> = items
                .iter()
                .map(|item| want_string(self.name(), item))
                .collect();
            Ok(Value::String(parts?.join(&sep)))
        }
    }

    pub struct Split;
    impl Function for Split {
        fn name(&self) -> &'static str {
            "split"
        }
        fn arity(&self) -> std::ops::RangeInclusive<usize> {
            2..=2
        }
        fn return_type(&self) -> Type {
            Type::list_of(Type::String)
        }
        fn call(&self, args: &[Value]) -> Result<Value, CallError> {
            let sep = want_string(self.name(), &args[0])?;
            let text = want_string(self.name(), &args[1])?;
            Ok(Value::List(
                text.split(&sep)
                    .map(|part| Value::String(part.to_string()))
                    .collect(),
            ))
        }
    }

    pub struct First;
    impl Function for First {
        fn name(&self) -> &'static str {
            "first"
        }
        fn arity(&self) -> std::ops::RangeInclusive<usize> {
            1..=1
        }
        fn return_type(&self) -> Type {
            Type::Any
        }
        fn call(&self, args: &[Value]) -> Result<Value, CallError> {
            let items = want_list(self.name(), &args[0])?;
            Ok(items.first().cloned().unwrap_or(Value::Null))
        }
    }

    pub struct Unique;
    impl Function for Unique {
        fn name(&self) -> &'static str {
            "unique"
        }
        fn arity(&self) -> std::ops::RangeInclusive<usize> {
            1..=1
        }
        fn return_type(&self) -> Type {
            Type::Any
        }
        fn call(&self, args: &[Value]) -> Result<Value, CallError> {
            let items = want_list(self.name(), &args[0])?;
            let dedup = items
                .iter()
                .cloned()
                .unique_by(|item| serde_json::to_string(&item.to_json()).unwrap_or_default())
                .collect();
            Ok(Value::List(dedup))
        }
    }

    pub struct Coalesce;
    impl Function for Coalesce {
        fn name(&self) -> &'static str {
            "coalesce"
        }
        fn arity(&self) -> std::ops::RangeInclusive<usize> {
            1..=usize::MAX
        }
        fn return_type(&self) -> Type {
            Type::Any
        }
        fn call(&self, args: &[Value]) -> Result<Value, CallError> {
            Ok(args
                .iter()
                .find(|arg| !arg.is_null())
                .cloned()
                .unwrap_or(Value::Null))
        }
    }

    pub struct JsonEncode;
    impl Function for JsonEncode {
        fn name(&self) -> &'static str {
            "jsonencode"
        }
        fn arity(&self) -> std::ops::RangeInclusive<usize> {
            1..=1
        }
        fn return_type(&self) -> Type {
            Type::String
        }
        fn call(&self, args: &[Value]) -> Result<Value, CallError> {
            serde_json::to_string(&args[0].to_json())
                .map(Value::String)
                .map_err(|err| CallError::InvalidArgument {
                    name: self.name().to_string(),
                    reason: err.to_string(),
                })
        }
    }

    pub struct JsonDecode;
    impl Function for JsonDecode {
        fn name(&self) -> &'static str {
            "jsondecode"
        }
        fn arity(&self) -> std::ops::RangeInclusive<usize> {
            1..=1
        }
        fn return_type(&self) -> Type {
            Type::Any
        }
        fn call(&self, args: &[Value]) -> Result<Value, CallError> {
            let text = want_string(self.name(), &args[0])?;
            serde_json::from_str::<serde_json::Value>(&text)
                .map(|doc| Value::from_json(&doc))
                .map_err(|err| CallError::InvalidArgument {
                    name: self.name().to_string(),
                    reason: format!("invalid JSON: {err}"),
                })
        }
    }

    /// Reads a file as a string, relative to the context's base directory.
    pub struct FileRead {
        pub base_dir: PathBuf,
    }
    impl Function for FileRead {
        fn name(&self) -> &'static str {
            "file"
        }
        fn arity(&self) -> std::ops::RangeInclusive<usize> {
            1..=1
        }
        fn return_type(&self) -> Type {
            Type::String
        }
        fn call(&self, args: &[Value]) -> Result<Value, CallError> {
            let rel = want_string(self.name(), &args[0])?;
            let path = self.base_dir.join(&rel);
            std::fs::read_to_string(&path)
                .map(Value::String)
                .map_err(|err| CallError::InvalidArgument {
                    name: self.name().to_string(),
                    reason: format!("cannot read {}: {err}", path.display()),
                })
        }
    }

    /// Seconds since the Unix epoch. Impure: yields unknown in pure-only
    /// mode so repeated speculative evaluations stay stable.
    pub struct Timestamp;
    impl Function for Timestamp {
        fn name(&self) -> &'static str {
            "timestamp"
        }
        fn arity(&self) -> std::ops::RangeInclusive<usize> {
            0..=0
        }
        fn return_type(&self) -> Type {
            Type::Number
        }
        fn is_pure(&self) -> bool {
            false
        }
        fn call(&self, _args: &[Value]) -> Result<Value, CallError> {
            let secs = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs_f64())
                .unwrap_or_default();
            Ok(Value::Number(secs))
        }
    }
}
