//! # Davstack service
//!
//! A small builder for typed procedures. A procedure is an ordered list of
//! context middleware plus one resolver. Input and output types are fixed with
//! `serde`, so untyped callers (`call_json`) get their input validated by
//! deserialization:
//!
//! ```rust
//! use davstack_service::*;
//! use serde::Deserialize;
//! use serde_json::json;
//!
//! #[derive(Clone, Default)]
//! struct Ctx {
//!     user: Option<String>,
//! }
//!
//! impl AuthContext for Ctx {
//!     fn user_id(&self) -> Option<&str> {
//!         self.user.as_deref()
//!     }
//! }
//!
//! #[derive(Deserialize)]
//! struct Greet {
//!     name: String,
//! }
//!
//! let greet = service::<Ctx>()
//!     .middleware(require_user)
//!     .input::<Greet>()
//!     .output::<String>()
//!     .query(|ctx, input| Ok(format!("{} greets {}", ctx.user.as_deref().unwrap_or(""), input.name)));
//!
//! let ctx = Ctx { user: Some("ada".into()) };
//! assert_eq!(greet.call_json(ctx, json!({ "name": "bob" })).unwrap(), json!("ada greets bob"));
//! assert!(matches!(greet.call_json(Ctx::default(), json!({ "name": "bob" })), Err(ServiceError::Unauthorized(_))));
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("procedure `{0}` has no resolver")]
    UndefinedResolver(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("invalid input for `{procedure}`: {source}")]
    InvalidInput {
        procedure: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("could not serialize output of `{procedure}`: {source}")]
    InvalidOutput {
        procedure: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("unknown procedure `{0}`")]
    UnknownProcedure(String),
    #[error("{0}")]
    Custom(String),
}

impl ServiceError {
    pub fn custom(message: impl Into<String>) -> Self {
        ServiceError::Custom(message.into())
    }
}

pub type Result<T, E = ServiceError> = std::result::Result<T, E>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcedureKind {
    Query,
    Mutation,
}

impl fmt::Display for ProcedureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcedureKind::Query => f.write_str("query"),
            ProcedureKind::Mutation => f.write_str("mutation"),
        }
    }
}

/// Context transformer. Returning an error aborts the call.
pub type Middleware<Ctx> = Arc<dyn Fn(Ctx) -> Result<Ctx> + Send + Sync>;
pub type Resolver<Ctx, I, O> = Arc<dyn Fn(&Ctx, I) -> Result<O> + Send + Sync>;

/// Contexts that may carry an authenticated user.
pub trait AuthContext {
    fn user_id(&self) -> Option<&str>;
}

/// Middleware that rejects contexts without a user.
pub fn require_user<Ctx: AuthContext>(ctx: Ctx) -> Result<Ctx> {
    if ctx.user_id().is_none() {
        log::debug!("rejecting call without an authenticated user");
        return Err(ServiceError::Unauthorized("no authenticated user".into()));
    }
    Ok(ctx)
}

/// Starts a procedure over context `Ctx`. Input defaults to `()`, output to
/// untyped JSON.
pub fn service<Ctx>() -> ServiceBuilder<Ctx> {
    ServiceBuilder {
        name: None,
        middleware: Vec::new(),
        _types: PhantomData,
    }
}

/// Same builder as [`service`]; conventionally finished with
/// [`mutation`](ServiceBuilder::mutation).
pub fn action<Ctx>() -> ServiceBuilder<Ctx> {
    service()
}

pub struct ServiceBuilder<Ctx, I = (), O = serde_json::Value> {
    name: Option<String>,
    middleware: Vec<Middleware<Ctx>>,
    _types: PhantomData<fn(I) -> O>,
}

impl<Ctx, I, O> Clone for ServiceBuilder<Ctx, I, O> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            middleware: self.middleware.clone(),
            _types: PhantomData,
        }
    }
}

impl<Ctx, I, O> ServiceBuilder<Ctx, I, O> {
    /// Name used in logs and errors.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn input<I2>(self) -> ServiceBuilder<Ctx, I2, O> {
        ServiceBuilder {
            name: self.name,
            middleware: self.middleware,
            _types: PhantomData,
        }
    }

    pub fn output<O2>(self) -> ServiceBuilder<Ctx, I, O2> {
        ServiceBuilder {
            name: self.name,
            middleware: self.middleware,
            _types: PhantomData,
        }
    }

    /// Appends a context transformer; middleware runs in insertion order.
    pub fn middleware(mut self, f: impl Fn(Ctx) -> Result<Ctx> + Send + Sync + 'static) -> Self {
        self.middleware.push(Arc::new(f));
        self
    }

    pub fn query(self, resolver: impl Fn(&Ctx, I) -> Result<O> + Send + Sync + 'static) -> Procedure<Ctx, I, O> {
        self.finish(ProcedureKind::Query, Some(Arc::new(resolver)))
    }

    pub fn mutation(
        self,
        resolver: impl Fn(&Ctx, I) -> Result<O> + Send + Sync + 'static,
    ) -> Procedure<Ctx, I, O> {
        self.finish(ProcedureKind::Mutation, Some(Arc::new(resolver)))
    }

    /// A procedure with no resolver; calling it fails with
    /// [`ServiceError::UndefinedResolver`].
    pub fn build(self) -> Procedure<Ctx, I, O> {
        self.finish(ProcedureKind::Query, None)
    }

    fn finish(self, kind: ProcedureKind, resolver: Option<Resolver<Ctx, I, O>>) -> Procedure<Ctx, I, O> {
        Procedure {
            name: self.name.unwrap_or_else(|| "anonymous".into()),
            kind,
            middleware: self.middleware.into(),
            resolver,
        }
    }
}

pub struct Procedure<Ctx, I, O> {
    name: String,
    kind: ProcedureKind,
    middleware: Arc<[Middleware<Ctx>]>,
    resolver: Option<Resolver<Ctx, I, O>>,
}

impl<Ctx, I, O> Clone for Procedure<Ctx, I, O> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            kind: self.kind,
            middleware: self.middleware.clone(),
            resolver: self.resolver.clone(),
        }
    }
}

impl<Ctx, I, O> fmt::Debug for Procedure<Ctx, I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Procedure")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("middleware", &self.middleware.len())
            .field("resolved", &self.resolver.is_some())
            .finish()
    }
}

impl<Ctx, I, O> Procedure<Ctx, I, O> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ProcedureKind {
        self.kind
    }

    /// Same procedure under a new name (what a router registers it as).
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Runs the middleware chain, then the resolver.
    pub fn call(&self, ctx: Ctx, input: I) -> Result<O> {
        let Some(resolver) = &self.resolver else {
            return Err(ServiceError::UndefinedResolver(self.name.clone()));
        };
        let ctx = self.middleware.iter().try_fold(ctx, |ctx, m| m(ctx))?;
        log::debug!("{} `{}`", self.kind, self.name);
        resolver(&ctx, input)
    }
}

impl<Ctx, I, O> Procedure<Ctx, I, O>
where
    I: DeserializeOwned,
    O: Serialize,
{
    /// Untyped entry point: `input` is validated by deserializing into `I`.
    pub fn call_json(&self, ctx: Ctx, input: serde_json::Value) -> Result<serde_json::Value> {
        let input = serde_json::from_value::<I>(input).map_err(|source| ServiceError::InvalidInput {
            procedure: self.name.clone(),
            source,
        })?;
        let out = self.call(ctx, input)?;
        serde_json::to_value(out).map_err(|source| ServiceError::InvalidOutput {
            procedure: self.name.clone(),
            source,
        })
    }
}

trait ErasedProcedure<Ctx>: Send + Sync {
    fn kind(&self) -> ProcedureKind;
    fn call_json(&self, ctx: Ctx, input: serde_json::Value) -> Result<serde_json::Value>;
}

impl<Ctx, I, O> ErasedProcedure<Ctx> for Procedure<Ctx, I, O>
where
    Ctx: 'static,
    I: DeserializeOwned + 'static,
    O: Serialize + 'static,
{
    fn kind(&self) -> ProcedureKind {
        self.kind
    }

    fn call_json(&self, ctx: Ctx, input: serde_json::Value) -> Result<serde_json::Value> {
        Procedure::call_json(self, ctx, input)
    }
}

/// Named procedures over one context type.
pub struct Router<Ctx> {
    procedures: BTreeMap<String, Arc<dyn ErasedProcedure<Ctx>>>,
}

impl<Ctx> Default for Router<Ctx> {
    fn default() -> Self {
        Self {
            procedures: BTreeMap::new(),
        }
    }
}

impl<Ctx: 'static> Router<Ctx> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `procedure` under `name`, replacing any previous entry.
    pub fn procedure<I, O>(mut self, name: impl Into<String>, procedure: Procedure<Ctx, I, O>) -> Self
    where
        I: DeserializeOwned + 'static,
        O: Serialize + 'static,
    {
        let name = name.into();
        let procedure = procedure.named(name.clone());
        self.procedures.insert(name, Arc::new(procedure));
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.procedures.keys().map(String::as_str)
    }

    pub fn kind(&self, name: &str) -> Option<ProcedureKind> {
        self.procedures.get(name).map(|p| p.kind())
    }

    pub fn call_json(&self, name: &str, ctx: Ctx, input: serde_json::Value) -> Result<serde_json::Value> {
        match self.procedures.get(name) {
            Some(p) => p.call_json(ctx, input),
            None => {
                log::warn!("no procedure named `{name}`");
                Err(ServiceError::UnknownProcedure(name.to_string()))
            }
        }
    }
}

impl<Ctx> fmt::Debug for Router<Ctx> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("procedures", &self.procedures.keys().collect::<Vec<_>>())
            .finish()
    }
}
