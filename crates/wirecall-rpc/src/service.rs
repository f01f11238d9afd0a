//! Services and the typed invokers behind their methods.
//!
//! A method is registered as an async closure over concrete argument and
//! reply types. The closure is wrapped once, at registration, into an
//! [`Invoker`] that decodes the argument from a [`Value`], awaits the closure
//! and encodes the reply, so dispatch is a map lookup plus one call.
//!
//! ```ignore
//! let arith = Service::builder("Arith")
//!     .method("Sum", |args: Vec<i64>| async move { Ok::<_, String>(args.iter().sum::<i64>()) })
//!     .build()?;
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::error::{RpcError, Result};

/// Boxed future returned by invokers.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outcome of one invocation: the encoded reply, or the message for
/// `Header.Error`.
pub type InvokeResult = std::result::Result<Value, String>;

/// Type-erased method body.
pub trait Invoker: Send + Sync + 'static {
    fn invoke(&self, argv: Value) -> BoxFuture<'static, InvokeResult>;
}

/// Invoker for an async closure `Fn(A) -> Future<Output = Result<R, E>>`.
pub struct TypedInvoker<F, A, R, E, Fut> {
    method: F,
    _types: PhantomData<fn(A) -> (R, E, Fut)>,
}

impl<F, A, R, E, Fut> TypedInvoker<F, A, R, E, Fut> {
    pub fn new(method: F) -> Self {
        Self {
            method,
            _types: PhantomData,
        }
    }
}

impl<F, A, R, E, Fut> Invoker for TypedInvoker<F, A, R, E, Fut>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    A: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    E: fmt::Display + Send + 'static,
    Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
{
    fn invoke(&self, argv: Value) -> BoxFuture<'static, InvokeResult> {
        // Every invocation decodes into its own fresh argument value.
        let args: A = match serde_json::from_value(argv) {
            Ok(args) => args,
            Err(err) => {
                let message = format!("rpc server: read argv err: {err}");
                return Box::pin(async move { Err(message) });
            }
        };

        let fut = (self.method)(args);
        Box::pin(async move {
            let reply = fut.await.map_err(|err| err.to_string())?;
            serde_json::to_value(reply).map_err(|err| format!("rpc server: write reply err: {err}"))
        })
    }
}

/// One callable method of a service.
pub struct MethodType {
    name: String,
    arg_type: &'static str,
    reply_type: &'static str,
    num_calls: AtomicU64,
    invoker: Box<dyn Invoker>,
}

impl MethodType {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rust type name of the argument.
    pub fn arg_type(&self) -> &'static str {
        self.arg_type
    }

    /// Rust type name of the reply.
    pub fn reply_type(&self) -> &'static str {
        self.reply_type
    }

    /// How many times the method has been invoked.
    pub fn num_calls(&self) -> u64 {
        self.num_calls.load(Ordering::Relaxed)
    }

    /// Invoke the method with an undecoded argument.
    pub fn call(&self, argv: Value) -> BoxFuture<'static, InvokeResult> {
        self.num_calls.fetch_add(1, Ordering::Relaxed);
        self.invoker.invoke(argv)
    }
}

impl fmt::Debug for MethodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodType")
            .field("name", &self.name)
            .field("arg_type", &self.arg_type)
            .field("reply_type", &self.reply_type)
            .field("num_calls", &self.num_calls())
            .finish()
    }
}

/// A named set of methods, addressed on the wire as `Service.Method`.
#[derive(Debug)]
pub struct Service {
    name: String,
    methods: BTreeMap<String, Arc<MethodType>>,
}

impl Service {
    pub fn builder(name: impl Into<String>) -> ServiceBuilder {
        ServiceBuilder {
            name: name.into(),
            methods: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&self, name: &str) -> Option<&Arc<MethodType>> {
        self.methods.get(name)
    }

    /// Methods in name order.
    pub fn methods(&self) -> impl Iterator<Item = &Arc<MethodType>> {
        self.methods.values()
    }
}

/// Collects methods for a [`Service`].
///
/// Methods whose names are not identifiers are skipped, as is a second
/// method with an already used name. Both are logged.
#[must_use]
pub struct ServiceBuilder {
    name: String,
    methods: BTreeMap<String, Arc<MethodType>>,
}

impl ServiceBuilder {
    /// Add an async method taking `A` and replying with `R`.
    ///
    /// An `Err(e)` from the method reaches the caller as `e.to_string()`.
    pub fn method<F, A, R, E, Fut>(mut self, name: &str, method: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        E: fmt::Display + Send + 'static,
        Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
    {
        if !is_identifier(name) {
            warn!(service = %self.name, method = name, "skipping method: not a valid identifier");
            return self;
        }
        if self.methods.contains_key(name) {
            warn!(service = %self.name, method = name, "skipping duplicate method");
            return self;
        }

        self.methods.insert(
            name.to_string(),
            Arc::new(MethodType {
                name: name.to_string(),
                arg_type: std::any::type_name::<A>(),
                reply_type: std::any::type_name::<R>(),
                num_calls: AtomicU64::new(0),
                invoker: Box::new(TypedInvoker::<F, A, R, E, Fut>::new(method)),
            }),
        );
        self
    }

    pub fn build(self) -> Result<Service> {
        if !is_identifier(&self.name) {
            return Err(RpcError::InvalidServiceName(self.name));
        }
        if self.methods.is_empty() {
            return Err(RpcError::NoMethods(self.name));
        }
        Ok(Service {
            name: self.name,
            methods: self.methods,
        })
    }
}

pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}
