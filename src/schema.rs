//!
//! gqlgate schema composer
//! -----------------------
//! Merges independently authored SDL fragments and resolver maps into one
//! executable schema. Composition runs once before the listener binds; any
//! parse error, conflict or dangling resolver aborts startup with a message
//! naming the fragment it came from.

use thiserror::Error;
use tracing::{debug, info};

pub mod executable;
pub mod merge;
pub mod resolvers;
pub mod sources;

pub use executable::BuildOptions;
pub use merge::{merge_type_defs, MergedTypes, TypeDef, TypeShape};
pub use resolvers::{merge_resolvers, resolver, ResolveContext, Resolver, ResolverMap, ResolverSource};
pub use sources::{load_type_defs, TypeDefSource};

use crate::database::DatabaseProvider;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ComposeError {
    #[error("cannot read type definitions at {path}: {message}")]
    Io { path: String, message: String },
    #[error("{source_name}: {message}")]
    Parse { source_name: String, message: String },
    #[error("{source_name}: field {type_name}.{field} redeclared as {incoming} (was {existing})")]
    FieldConflict { type_name: String, field: String, existing: String, incoming: String, source_name: String },
    #[error("{source_name}: '{type_name}' redeclared as {incoming} (was {existing})")]
    KindConflict { type_name: String, existing: &'static str, incoming: &'static str, source_name: String },
    #[error("{source_name}: {operation} root redeclared as '{incoming}' (was '{existing}')")]
    RootConflict { operation: &'static str, existing: String, incoming: String, source_name: String },
    #[error("{operation} root type '{name}' is not defined as an object type")]
    MissingRoot { operation: &'static str, name: String },
    #[error("subscription root '{0}' declared but subscriptions are not served")]
    SubscriptionsUnsupported(String),
    #[error("{source_name}: resolver for unknown type '{type_name}'")]
    UnknownType { source_name: String, type_name: String },
    #[error("{source_name}: resolvers can only be attached to object types, '{type_name}' is not one")]
    NotAnObject { source_name: String, type_name: String },
    #[error("{source_name}: resolver for unknown field {type_name}.{field}")]
    UnknownField { source_name: String, type_name: String, field: String },
    #[error("schema rejected by the engine: {0}")]
    Invalid(String),
}

/// Merged type definitions plus the resolvers attached to them.
#[derive(Debug, Clone)]
pub struct ComposedSchema {
    types: MergedTypes,
    resolvers: ResolverMap,
}

impl ComposedSchema {
    pub fn types(&self) -> &MergedTypes {
        &self.types
    }

    pub fn resolvers(&self) -> &ResolverMap {
        &self.resolvers
    }

    pub fn sdl(&self) -> String {
        self.types.to_sdl()
    }

    /// Produce the executable schema served by the GraphQL endpoint.
    pub fn build(&self, database: DatabaseProvider, options: BuildOptions) -> Result<async_graphql::dynamic::Schema, ComposeError> {
        executable::build(&self.types, &self.resolvers, database, options)
    }
}

/// Merge and validate type and resolver fragments.
pub fn compose(type_sources: &[TypeDefSource], resolver_sources: &[ResolverSource]) -> Result<ComposedSchema, ComposeError> {
    let types = merge_type_defs(type_sources)?;

    if let Some(sub) = &types.subscription {
        return Err(ComposeError::SubscriptionsUnsupported(sub.clone()));
    }
    let roots = std::iter::once(("query", Some(&types.query))).chain(std::iter::once(("mutation", types.mutation.as_ref())));
    for (operation, name) in roots {
        let Some(name) = name else { continue };
        if !matches!(types.get(name).map(|t| &t.shape), Some(TypeShape::Object { .. })) {
            return Err(ComposeError::MissingRoot { operation, name: name.clone() });
        }
    }

    for src in resolver_sources {
        for (type_name, field, _) in src.resolvers.iter() {
            let def = types.get(type_name).ok_or_else(|| ComposeError::UnknownType {
                source_name: src.name.clone(),
                type_name: type_name.to_string(),
            })?;
            if !matches!(def.shape, TypeShape::Object { .. }) {
                return Err(ComposeError::NotAnObject { source_name: src.name.clone(), type_name: type_name.to_string() });
            }
            if def.field(field).is_none() {
                return Err(ComposeError::UnknownField {
                    source_name: src.name.clone(),
                    type_name: type_name.to_string(),
                    field: field.to_string(),
                });
            }
        }
    }
    let resolvers = merge_resolvers(resolver_sources);

    info!(
        target: "schema",
        fragments = type_sources.len(),
        resolver_sources = resolver_sources.len(),
        types = types.len(),
        resolvers = resolvers.len(),
        "schema composed"
    );
    debug!(target: "schema", sdl = %types.to_sdl(), "merged schema");
    Ok(ComposedSchema { types, resolvers })
}

pub fn builtin_type_defs() -> TypeDefSource {
    TypeDefSource::new("builtin:ping", "type Query {\n  ping: String\n}\n")
}

pub fn builtin_resolvers() -> ResolverSource {
    let mut map = ResolverMap::new();
    map.insert("Query", "ping", resolver(|_ctx| async { Ok(serde_json::Value::from("pong")) }));
    ResolverSource::new("builtin:ping", map)
}
