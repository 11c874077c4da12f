//! Callable function objects
//!
//! Functions are native Rust closures registered as script callables. A
//! function may capture script values; captures are traced like properties,
//! so anything a function closes over stays alive as long as the function.

use std::fmt;
use std::rc::Rc;

use crate::context::Context;
use crate::error::VmResult;
use crate::runtime::Runtime;
use crate::value::Value;

/// Function body signature
pub type NativeFn = Rc<dyn Fn(&CallArgs<'_>) -> VmResult<Value>>;

/// A callable heap object
pub struct JsFunction {
    name: String,
    captures: Vec<Value>,
    body: NativeFn,
}

impl JsFunction {
    /// Create a function with no captured values
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&CallArgs<'_>) -> VmResult<Value> + 'static,
    {
        Self {
            name: name.into(),
            captures: Vec::new(),
            body: Rc::new(body),
        }
    }

    /// Attach captured script values, visible through [`CallArgs::capture`]
    pub fn with_captures(mut self, captures: Vec<Value>) -> Self {
        self.captures = captures;
        self
    }

    /// Function name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Captured script values
    pub fn captures(&self) -> &[Value] {
        &self.captures
    }

    pub(crate) fn call(&self, args: &CallArgs<'_>) -> VmResult<Value> {
        (self.body)(args)
    }
}

impl fmt::Debug for JsFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsFunction")
            .field("name", &self.name)
            .field("captures", &self.captures.len())
            .finish()
    }
}

/// Arguments of one call, as seen by the function body
pub struct CallArgs<'a> {
    pub(crate) context: &'a Rc<Context>,
    pub(crate) function: &'a JsFunction,
    pub(crate) this: &'a Value,
    pub(crate) args: &'a [Value],
}

impl<'a> CallArgs<'a> {
    /// The context the call runs in
    pub fn context(&self) -> &'a Rc<Context> {
        self.context
    }

    /// The runtime the call runs in
    pub fn runtime(&self) -> &'a Rc<Runtime> {
        self.context.runtime()
    }

    /// The `this` binding
    pub fn this(&self) -> &'a Value {
        self.this
    }

    /// All arguments
    pub fn args(&self) -> &'a [Value] {
        self.args
    }

    /// Argument `index`, or `undefined` when absent
    pub fn arg(&self, index: usize) -> Value {
        self.args.get(index).cloned().unwrap_or_default()
    }

    /// Number of arguments
    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// Whether the call has no arguments
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Captured value `index`, or `undefined` when absent
    pub fn capture(&self, index: usize) -> Value {
        self.function
            .captures()
            .get(index)
            .cloned()
            .unwrap_or_default()
    }
}
