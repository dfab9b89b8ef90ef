//! Type definition merging.
//!
//! Fragments are parsed with the engine's SDL parser and folded into an owned
//! model keyed by type name. Same-named types are unioned: fields, interface
//! lists, enum values and union members accumulate in first-seen order, and
//! `extend type` is treated like another definition of the same type. A field
//! declared twice with different types, or a name used for two kinds of type,
//! is a conflict.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use async_graphql::parser::parse_schema;
use async_graphql::parser::types::{
    ConstDirective, EnumValueDefinition, FieldDefinition, InputValueDefinition, SchemaDefinition, Type,
    TypeDefinition, TypeKind, TypeSystemDefinition,
};
use async_graphql::parser::Positioned;
use async_graphql::Value as ConstValue;

use super::{ComposeError, TypeDefSource};

pub const BUILTIN_SCALARS: [&str; 5] = ["Int", "Float", "String", "Boolean", "ID"];

#[derive(Debug, Clone, PartialEq)]
pub struct ArgumentDef {
    pub name: String,
    pub description: Option<String>,
    pub ty: Type,
    pub default_value: Option<ConstValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub description: Option<String>,
    pub arguments: Vec<ArgumentDef>,
    pub ty: Type,
    /// `Some(reason)` when marked `@deprecated`.
    pub deprecation: Option<Option<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumValueDef {
    pub name: String,
    pub description: Option<String>,
    pub deprecation: Option<Option<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeShape {
    Scalar,
    Object { implements: Vec<String>, fields: Vec<FieldDef> },
    Interface { implements: Vec<String>, fields: Vec<FieldDef> },
    Union { members: Vec<String> },
    Enum { values: Vec<EnumValueDef> },
    InputObject { fields: Vec<ArgumentDef> },
}

impl TypeShape {
    pub fn kind_name(&self) -> &'static str {
        match self {
            TypeShape::Scalar => "scalar",
            TypeShape::Object { .. } => "type",
            TypeShape::Interface { .. } => "interface",
            TypeShape::Union { .. } => "union",
            TypeShape::Enum { .. } => "enum",
            TypeShape::InputObject { .. } => "input",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    pub name: String,
    pub description: Option<String>,
    pub shape: TypeShape,
}

impl TypeDef {
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        match &self.shape {
            TypeShape::Object { fields, .. } | TypeShape::Interface { fields, .. } => fields.iter().find(|f| f.name == name),
            _ => None,
        }
    }
}

/// All fragments folded together.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedTypes {
    types: BTreeMap<String, TypeDef>,
    pub query: String,
    pub mutation: Option<String>,
    pub subscription: Option<String>,
}

impl MergedTypes {
    pub fn get(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDef> {
        self.types.values()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Canonical SDL rendering of the merged schema.
    pub fn to_sdl(&self) -> String {
        let mut out = String::new();
        let default_roots = self.query == "Query"
            && self.mutation.as_deref().map_or(true, |m| m == "Mutation")
            && self.subscription.as_deref().map_or(true, |s| s == "Subscription");
        if !default_roots {
            out.push_str("schema {\n");
            let _ = writeln!(out, "  query: {}", self.query);
            if let Some(m) = &self.mutation { let _ = writeln!(out, "  mutation: {m}"); }
            if let Some(s) = &self.subscription { let _ = writeln!(out, "  subscription: {s}"); }
            out.push_str("}\n\n");
        }
        for def in self.types.values() {
            write_description(&mut out, def.description.as_deref(), "");
            match &def.shape {
                TypeShape::Scalar => { let _ = writeln!(out, "scalar {}", def.name); }
                TypeShape::Object { implements, fields } | TypeShape::Interface { implements, fields } => {
                    let _ = write!(out, "{} {}", def.shape.kind_name(), def.name);
                    if !implements.is_empty() {
                        let _ = write!(out, " implements {}", implements.join(" & "));
                    }
                    out.push_str(" {\n");
                    for f in fields {
                        write_description(&mut out, f.description.as_deref(), "  ");
                        let _ = write!(out, "  {}", f.name);
                        if !f.arguments.is_empty() {
                            let args = f.arguments.iter().map(render_argument).collect::<Vec<_>>().join(", ");
                            let _ = write!(out, "({args})");
                        }
                        let _ = write!(out, ": {}", f.ty);
                        write_deprecation(&mut out, &f.deprecation);
                        out.push('\n');
                    }
                    out.push_str("}\n");
                }
                TypeShape::Union { members } => { let _ = writeln!(out, "union {} = {}", def.name, members.join(" | ")); }
                TypeShape::Enum { values } => {
                    let _ = writeln!(out, "enum {} {{", def.name);
                    for v in values {
                        write_description(&mut out, v.description.as_deref(), "  ");
                        let _ = write!(out, "  {}", v.name);
                        write_deprecation(&mut out, &v.deprecation);
                        out.push('\n');
                    }
                    out.push_str("}\n");
                }
                TypeShape::InputObject { fields } => {
                    let _ = writeln!(out, "input {} {{", def.name);
                    for a in fields {
                        write_description(&mut out, a.description.as_deref(), "  ");
                        let _ = writeln!(out, "  {}", render_argument(a));
                    }
                    out.push_str("}\n");
                }
            }
            out.push('\n');
        }
        out.trim_end().to_string()
    }
}

fn render_argument(a: &ArgumentDef) -> String {
    match &a.default_value {
        Some(v) => format!("{}: {} = {}", a.name, a.ty, v),
        None => format!("{}: {}", a.name, a.ty),
    }
}

fn write_description(out: &mut String, desc: Option<&str>, indent: &str) {
    if let Some(d) = desc {
        let _ = writeln!(out, "{indent}\"\"\"{}\"\"\"", d.replace("\"\"\"", "\\\"\"\""));
    }
}

fn write_deprecation(out: &mut String, dep: &Option<Option<String>>) {
    match dep {
        Some(Some(reason)) => { let _ = write!(out, " @deprecated(reason: {})", ConstValue::String(reason.clone())); }
        Some(None) => out.push_str(" @deprecated"),
        None => {}
    }
}

#[derive(Default)]
struct RootNames {
    query: Option<String>,
    mutation: Option<String>,
    subscription: Option<String>,
}

/// Parse and merge fragments in the order given.
pub fn merge_type_defs(sources: &[TypeDefSource]) -> Result<MergedTypes, ComposeError> {
    let mut types: BTreeMap<String, TypeDef> = BTreeMap::new();
    let mut roots = RootNames::default();
    for src in sources {
        let doc = parse_schema(&src.sdl)
            .map_err(|e| ComposeError::Parse { source_name: src.name.clone(), message: e.to_string() })?;
        for def in doc.definitions {
            match def {
                TypeSystemDefinition::Schema(s) => merge_roots(&mut roots, s.node, &src.name)?,
                TypeSystemDefinition::Type(t) => {
                    let incoming = convert_type(t.node);
                    match types.get_mut(&incoming.name) {
                        Some(existing) => merge_type(existing, incoming, &src.name)?,
                        None => { types.insert(incoming.name.clone(), incoming); }
                    }
                }
                // directive definitions carry no runtime behaviour here
                TypeSystemDefinition::Directive(_) => {}
            }
        }
    }
    let query = roots.query.unwrap_or_else(|| "Query".to_string());
    let mutation = roots.mutation.or_else(|| types.contains_key("Mutation").then(|| "Mutation".to_string()));
    let subscription = roots
        .subscription
        .or_else(|| types.contains_key("Subscription").then(|| "Subscription".to_string()));
    Ok(MergedTypes { types, query, mutation, subscription })
}

fn merge_roots(roots: &mut RootNames, def: SchemaDefinition, source: &str) -> Result<(), ComposeError> {
    let pairs = [
        ("query", &mut roots.query, def.query),
        ("mutation", &mut roots.mutation, def.mutation),
        ("subscription", &mut roots.subscription, def.subscription),
    ];
    for (operation, slot, incoming) in pairs {
        let Some(incoming) = incoming.map(|n| n.node.to_string()) else { continue };
        if let Some(existing) = slot.as_ref() {
            if *existing != incoming {
                return Err(ComposeError::RootConflict {
                    operation,
                    existing: existing.clone(),
                    incoming,
                    source_name: source.to_string(),
                });
            }
            continue;
        }
        *slot = Some(incoming);
    }
    Ok(())
}

fn merge_type(existing: &mut TypeDef, incoming: TypeDef, source: &str) -> Result<(), ComposeError> {
    if existing.description.is_none() {
        existing.description = incoming.description;
    }
    let type_name = existing.name.clone();
    match (&mut existing.shape, incoming.shape) {
        (TypeShape::Scalar, TypeShape::Scalar) => Ok(()),
        (TypeShape::Object { implements, fields }, TypeShape::Object { implements: more, fields: new_fields })
        | (TypeShape::Interface { implements, fields }, TypeShape::Interface { implements: more, fields: new_fields }) => {
            union_names(implements, more);
            for f in new_fields {
                merge_field(&type_name, fields, f, source)?;
            }
            Ok(())
        }
        (TypeShape::Union { members }, TypeShape::Union { members: more }) => {
            union_names(members, more);
            Ok(())
        }
        (TypeShape::Enum { values }, TypeShape::Enum { values: more }) => {
            for v in more {
                if !values.iter().any(|x| x.name == v.name) {
                    values.push(v);
                }
            }
            Ok(())
        }
        (TypeShape::InputObject { fields }, TypeShape::InputObject { fields: more }) => {
            for a in more {
                match fields.iter().find(|x| x.name == a.name).map(|x| x.ty.to_string()) {
                    Some(existing) if existing != a.ty.to_string() => {
                        return Err(ComposeError::FieldConflict {
                            type_name,
                            field: a.name,
                            existing,
                            incoming: a.ty.to_string(),
                            source_name: source.to_string(),
                        })
                    }
                    Some(_) => {}
                    None => fields.push(a),
                }
            }
            Ok(())
        }
        (shape, other) => Err(ComposeError::KindConflict {
            type_name,
            existing: shape.kind_name(),
            incoming: other.kind_name(),
            source_name: source.to_string(),
        }),
    }
}

fn merge_field(type_name: &str, fields: &mut Vec<FieldDef>, incoming: FieldDef, source: &str) -> Result<(), ComposeError> {
    let Some(idx) = fields.iter().position(|f| f.name == incoming.name) else {
        fields.push(incoming);
        return Ok(());
    };
    let existing = &mut fields[idx];
    if existing.ty != incoming.ty {
        return Err(ComposeError::FieldConflict {
            type_name: type_name.to_string(),
            field: incoming.name,
            existing: existing.ty.to_string(),
            incoming: incoming.ty.to_string(),
            source_name: source.to_string(),
        });
    }
    for arg in incoming.arguments {
        if !existing.arguments.iter().any(|a| a.name == arg.name) {
            existing.arguments.push(arg);
        }
    }
    if existing.description.is_none() {
        existing.description = incoming.description;
    }
    if existing.deprecation.is_none() {
        existing.deprecation = incoming.deprecation;
    }
    Ok(())
}

fn union_names(into: &mut Vec<String>, more: Vec<String>) {
    for n in more {
        if !into.contains(&n) {
            into.push(n);
        }
    }
}

fn convert_type(def: TypeDefinition) -> TypeDef {
    let shape = match def.kind {
        TypeKind::Scalar => TypeShape::Scalar,
        TypeKind::Object(o) => TypeShape::Object {
            implements: o.implements.into_iter().map(|n| n.node.to_string()).collect(),
            fields: o.fields.into_iter().map(|f| convert_field(f.node)).collect(),
        },
        TypeKind::Interface(i) => TypeShape::Interface {
            implements: i.implements.into_iter().map(|n| n.node.to_string()).collect(),
            fields: i.fields.into_iter().map(|f| convert_field(f.node)).collect(),
        },
        TypeKind::Union(u) => TypeShape::Union { members: u.members.into_iter().map(|n| n.node.to_string()).collect() },
        TypeKind::Enum(e) => TypeShape::Enum { values: e.values.into_iter().map(|v| convert_enum_value(v.node)).collect() },
        TypeKind::InputObject(i) => TypeShape::InputObject { fields: i.fields.into_iter().map(|a| convert_input(a.node)).collect() },
    };
    TypeDef { name: def.name.node.to_string(), description: def.description.map(|d| d.node), shape }
}

fn convert_field(f: FieldDefinition) -> FieldDef {
    FieldDef {
        name: f.name.node.to_string(),
        description: f.description.map(|d| d.node),
        arguments: f.arguments.into_iter().map(|a| convert_input(a.node)).collect(),
        ty: f.ty.node,
        deprecation: deprecation(&f.directives),
    }
}

fn convert_input(a: InputValueDefinition) -> ArgumentDef {
    ArgumentDef {
        name: a.name.node.to_string(),
        description: a.description.map(|d| d.node),
        ty: a.ty.node,
        default_value: a.default_value.map(|v| v.node),
    }
}

fn convert_enum_value(v: EnumValueDefinition) -> EnumValueDef {
    EnumValueDef {
        name: v.value.node.to_string(),
        description: v.description.map(|d| d.node),
        deprecation: deprecation(&v.directives),
    }
}

fn deprecation(directives: &[Positioned<ConstDirective>]) -> Option<Option<String>> {
    let d = directives.iter().find(|d| d.node.name.node.as_str() == "deprecated")?;
    let reason = d.node.arguments.iter().find(|(n, _)| n.node.as_str() == "reason").and_then(|(_, v)| match &v.node {
        ConstValue::String(s) => Some(s.clone()),
        _ => None,
    });
    Some(reason)
}
