//! Turns merged type definitions and resolvers into an async-graphql dynamic
//! schema. Resolvers produce JSON; the declared field type decides whether a
//! value is handed to the engine as a leaf, a nested object (whose fields are
//! looked up on the JSON) or a list. Abstract types pick their concrete type
//! from the value's `__typename`.

use std::collections::HashMap;
use std::sync::Arc;

use async_graphql::dynamic::{
    Enum, EnumItem, Field, FieldFuture, FieldValue, InputObject, InputValue, Interface, InterfaceField, Object,
    ResolverContext, Scalar, Schema, TypeRef, Union,
};
use async_graphql::parser::types::{BaseType, Type};
use async_graphql::{Name, Value as ConstValue};
use serde_json::{Map, Value};

use super::merge::{ArgumentDef, FieldDef, MergedTypes, TypeShape, BUILTIN_SCALARS};
use super::resolvers::{ResolveContext, Resolver, ResolverMap};
use super::ComposeError;
use crate::database::DatabaseProvider;
use crate::identity::RequestContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOptions {
    /// Hand the per-request `RequestContext` to resolvers.
    pub enable_request_context: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self { enable_request_context: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Scalar,
    Enum,
    Object,
    Abstract,
}

struct Shared {
    kinds: HashMap<String, Kind>,
    database: DatabaseProvider,
    options: BuildOptions,
}

struct FieldPlan {
    type_name: String,
    field_name: String,
    ty: Type,
    resolver: Option<Resolver>,
}

pub(crate) fn build(
    types: &MergedTypes,
    resolvers: &ResolverMap,
    database: DatabaseProvider,
    options: BuildOptions,
) -> Result<Schema, ComposeError> {
    let mut kinds: HashMap<String, Kind> = BUILTIN_SCALARS.iter().map(|s| (s.to_string(), Kind::Scalar)).collect();
    for def in types.types() {
        let kind = match def.shape {
            TypeShape::Scalar | TypeShape::InputObject { .. } => Kind::Scalar,
            TypeShape::Enum { .. } => Kind::Enum,
            TypeShape::Object { .. } => Kind::Object,
            TypeShape::Interface { .. } | TypeShape::Union { .. } => Kind::Abstract,
        };
        kinds.insert(def.name.clone(), kind);
    }
    let shared = Arc::new(Shared { kinds, database, options });

    let mut builder = Schema::build(&types.query, types.mutation.as_deref(), None);
    for def in types.types() {
        match &def.shape {
            TypeShape::Scalar => {
                if BUILTIN_SCALARS.contains(&def.name.as_str()) {
                    continue;
                }
                let mut s = Scalar::new(&def.name);
                if let Some(d) = &def.description { s = s.description(d); }
                builder = builder.register(s);
            }
            TypeShape::Object { implements, fields } => {
                let mut obj = Object::new(&def.name);
                if let Some(d) = &def.description { obj = obj.description(d); }
                for i in implements {
                    obj = obj.implement(i);
                }
                for f in fields {
                    let plan = FieldPlan {
                        type_name: def.name.clone(),
                        field_name: f.name.clone(),
                        ty: f.ty.clone(),
                        resolver: resolvers.get(&def.name, &f.name).cloned(),
                    };
                    obj = obj.field(object_field(f, plan, shared.clone()));
                }
                builder = builder.register(obj);
            }
            TypeShape::Interface { implements, fields } => {
                let mut iface = Interface::new(&def.name);
                if let Some(d) = &def.description { iface = iface.description(d); }
                for i in implements {
                    iface = iface.implement(i);
                }
                for f in fields {
                    let mut field = InterfaceField::new(&f.name, type_ref(&f.ty));
                    if let Some(d) = &f.description { field = field.description(d); }
                    for a in &f.arguments {
                        field = field.argument(input_value(a));
                    }
                    iface = iface.field(field);
                }
                builder = builder.register(iface);
            }
            TypeShape::Union { members } => {
                let mut u = Union::new(&def.name);
                if let Some(d) = &def.description { u = u.description(d); }
                for m in members {
                    u = u.possible_type(m);
                }
                builder = builder.register(u);
            }
            TypeShape::Enum { values } => {
                let mut e = Enum::new(&def.name);
                if let Some(d) = &def.description { e = e.description(d); }
                for v in values {
                    let mut item = EnumItem::new(&v.name);
                    if let Some(d) = &v.description { item = item.description(d); }
                    if let Some(reason) = &v.deprecation { item = item.deprecation(reason.as_deref()); }
                    e = e.item(item);
                }
                builder = builder.register(e);
            }
            TypeShape::InputObject { fields } => {
                let mut io = InputObject::new(&def.name);
                if let Some(d) = &def.description { io = io.description(d); }
                for a in fields {
                    io = io.field(input_value(a));
                }
                builder = builder.register(io);
            }
        }
    }
    builder.finish().map_err(|e| ComposeError::Invalid(e.to_string()))
}

fn object_field(def: &FieldDef, plan: FieldPlan, shared: Arc<Shared>) -> Field {
    let plan = Arc::new(plan);
    let mut field = Field::new(&def.name, type_ref(&def.ty), move |ctx: ResolverContext<'_>| {
        let plan = plan.clone();
        let shared = shared.clone();
        let parent = ctx.parent_value.try_downcast_ref::<Value>().ok().cloned().unwrap_or(Value::Null);
        let args = collect_args(&ctx);
        let request = if shared.options.enable_request_context {
            ctx.ctx.data_opt::<RequestContext>().cloned()
        } else {
            None
        };
        FieldFuture::new(async move {
            let value = match &plan.resolver {
                Some(resolve) => {
                    let rc = ResolveContext::new(&plan.type_name, &plan.field_name, parent, args?, request, shared.database.clone());
                    resolve(rc).await?
                }
                None => parent.get(&plan.field_name).cloned().unwrap_or(Value::Null),
            };
            to_field_value(value, &plan.ty, &shared.kinds)
        })
    });
    if let Some(d) = &def.description { field = field.description(d); }
    if let Some(reason) = &def.deprecation { field = field.deprecation(reason.as_deref()); }
    for a in &def.arguments {
        field = field.argument(input_value(a));
    }
    field
}

fn collect_args(ctx: &ResolverContext<'_>) -> async_graphql::Result<Map<String, Value>> {
    let mut out = Map::new();
    for (name, value) in ctx.args.iter() {
        let json = value
            .as_value()
            .clone()
            .into_json()
            .map_err(|e| async_graphql::Error::new(format!("argument '{name}': {e}")))?;
        out.insert(name.to_string(), json);
    }
    Ok(out)
}

fn input_value(a: &ArgumentDef) -> InputValue {
    let mut v = InputValue::new(&a.name, type_ref(&a.ty));
    if let Some(d) = &a.description { v = v.description(d); }
    if let Some(default) = &a.default_value { v = v.default_value(default.clone()); }
    v
}

pub(crate) fn type_ref(ty: &Type) -> TypeRef {
    let inner = match &ty.base {
        BaseType::Named(name) => TypeRef::Named(name.to_string().into()),
        BaseType::List(item) => TypeRef::List(Box::new(type_ref(item))),
    };
    if ty.nullable { inner } else { TypeRef::NonNull(Box::new(inner)) }
}

fn to_field_value<'a>(value: Value, ty: &Type, kinds: &HashMap<String, Kind>) -> async_graphql::Result<Option<FieldValue<'a>>> {
    if value.is_null() {
        return Ok(None);
    }
    match &ty.base {
        BaseType::List(item) => {
            let Value::Array(items) = value else {
                return Err(async_graphql::Error::new(format!("expected a list for {ty}")));
            };
            let mut out = Vec::with_capacity(items.len());
            for v in items {
                out.push(to_field_value(v, item, kinds)?.unwrap_or(FieldValue::NULL));
            }
            Ok(Some(FieldValue::list(out)))
        }
        BaseType::Named(name) => match kinds.get(name.as_str()).copied().unwrap_or(Kind::Scalar) {
            Kind::Scalar => {
                let v = ConstValue::from_json(value).map_err(|e| async_graphql::Error::new(e.to_string()))?;
                Ok(Some(FieldValue::value(v)))
            }
            Kind::Enum => match value {
                Value::String(s) => Ok(Some(FieldValue::value(ConstValue::Enum(Name::new(s))))),
                other => Err(async_graphql::Error::new(format!("enum {name} expects a string, got {other}"))),
            },
            Kind::Object => Ok(Some(FieldValue::owned_any(value))),
            Kind::Abstract => {
                let concrete = value
                    .get("__typename")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| async_graphql::Error::new(format!("value for abstract type {name} has no __typename")))?;
                Ok(Some(FieldValue::owned_any(value).with_type(concrete)))
            }
        },
    }
}
