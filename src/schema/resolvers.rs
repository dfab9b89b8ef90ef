use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_graphql::ErrorExtensions;
use futures_util::future::BoxFuture;
use mongodb::Database;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::database::DatabaseProvider;
use crate::identity::{Principal, RequestContext};

pub type ResolverFuture = BoxFuture<'static, async_graphql::Result<Value>>;

/// Computes one field. Results are plain JSON and are shaped by the field's
/// declared type when handed to the engine.
pub type Resolver = Arc<dyn Fn(ResolveContext) -> ResolverFuture + Send + Sync>;

/// Wrap an async closure as a [`Resolver`].
pub fn resolver<F, Fut>(f: F) -> Resolver
where
    F: Fn(ResolveContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = async_graphql::Result<Value>> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}

/// Resolvers keyed by `(type, field)`.
#[derive(Clone, Default)]
pub struct ResolverMap {
    inner: BTreeMap<String, BTreeMap<String, Resolver>>,
}

impl ResolverMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn field(mut self, type_name: &str, field: &str, r: Resolver) -> Self {
        self.insert(type_name, field, r);
        self
    }

    pub fn insert(&mut self, type_name: &str, field: &str, r: Resolver) -> Option<Resolver> {
        self.inner.entry(type_name.to_string()).or_default().insert(field.to_string(), r)
    }

    pub fn get(&self, type_name: &str, field: &str) -> Option<&Resolver> {
        self.inner.get(type_name)?.get(field)
    }

    /// Copy every entry of `other` into `self`; `other` wins on collisions.
    pub fn merge(&mut self, other: &ResolverMap) {
        for (type_name, field, r) in other.iter() {
            self.insert(type_name, field, r.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &Resolver)> {
        self.inner
            .iter()
            .flat_map(|(t, fields)| fields.iter().map(move |(f, r)| (t.as_str(), f.as_str(), r)))
    }

    pub fn len(&self) -> usize {
        self.inner.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ResolverMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter().map(|(t, field, _)| format!("{t}.{field}"))).finish()
    }
}

/// A named resolver fragment.
#[derive(Debug, Clone)]
pub struct ResolverSource {
    pub name: String,
    pub resolvers: ResolverMap,
}

impl ResolverSource {
    pub fn new(name: impl Into<String>, resolvers: ResolverMap) -> Self {
        Self { name: name.into(), resolvers }
    }
}

/// Key-wise merge; a later source overrides earlier ones for the same field.
pub fn merge_resolvers(sources: &[ResolverSource]) -> ResolverMap {
    let mut out = ResolverMap::new();
    for src in sources {
        out.merge(&src.resolvers);
    }
    out
}

/// Everything a resolver may look at.
#[derive(Clone)]
pub struct ResolveContext {
    pub type_name: String,
    pub field_name: String,
    /// JSON value of the enclosing object; `Null` on root fields.
    pub parent: Value,
    pub args: Map<String, Value>,
    request: Option<RequestContext>,
    database: DatabaseProvider,
}

impl ResolveContext {
    pub fn new(
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        parent: Value,
        args: Map<String, Value>,
        request: Option<RequestContext>,
        database: DatabaseProvider,
    ) -> Self {
        Self { type_name: type_name.into(), field_name: field_name.into(), parent, args, request, database }
    }

    /// Deserialize an argument. Absent arguments deserialize from `null`, so
    /// `Option<T>` works for optional ones.
    pub fn arg<T: DeserializeOwned>(&self, name: &str) -> async_graphql::Result<T> {
        let raw = self.args.get(name).cloned().unwrap_or(Value::Null);
        serde_json::from_value(raw).map_err(|e| async_graphql::Error::new(format!("argument '{name}': {e}")))
    }

    /// Per-request context; `None` when request context is disabled.
    pub fn request(&self) -> Option<&RequestContext> {
        self.request.as_ref()
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.request.as_ref()?.principal.as_ref()
    }

    pub fn require_principal(&self) -> async_graphql::Result<&Principal> {
        self.principal().ok_or_else(|| {
            async_graphql::Error::new("authentication required").extend_with(|_, e| e.set("code", "UNAUTHENTICATED"))
        })
    }

    pub async fn database(&self) -> async_graphql::Result<Database> {
        self.database.database().await.map_err(|e| {
            let code = e.code_str().to_string();
            async_graphql::Error::new(e.message()).extend_with(move |_, ext| ext.set("code", code.as_str()))
        })
    }

    pub fn set_response_header(&self, name: &str, value: &str) -> async_graphql::Result<()> {
        let req = self.request.as_ref().ok_or_else(|| async_graphql::Error::new("request context is disabled"))?;
        req.response.insert(name, value).map_err(|e| async_graphql::Error::new(e.to_string()))
    }
}
