//! Schema composition: merge semantics, resolver override, and execution of the
//! resulting dynamic schema.

use std::time::Duration;

use anyhow::Result;
use serde_json::{json, Value};
use tempfile::tempdir;

use gqlgate::database::DatabaseProvider;
use gqlgate::schema::{
    builtin_resolvers, builtin_type_defs, compose, load_type_defs, resolver, BuildOptions, ComposeError, ResolverMap,
    ResolverSource, TypeDefSource,
};

fn offline_db() -> DatabaseProvider {
    DatabaseProvider::new("mongodb://127.0.0.1:1/test", Duration::from_millis(50))
}

fn constant(v: Value) -> gqlgate::schema::Resolver {
    resolver(move |_ctx| {
        let v = v.clone();
        async move { Ok(v) }
    })
}

async fn run(sources: &[TypeDefSource], resolvers: &[ResolverSource], query: &str) -> Result<Value> {
    let composed = compose(sources, resolvers)?;
    let schema = composed.build(offline_db(), BuildOptions::default())?;
    let resp = schema.execute(query).await;
    Ok(serde_json::to_value(&resp)?)
}

#[tokio::test]
async fn ping_resolves_to_pong() -> Result<()> {
    let out = run(&[builtin_type_defs()], &[builtin_resolvers()], "{ ping }").await?;
    assert_eq!(out, json!({"data": {"ping": "pong"}}));
    Ok(())
}

#[test]
fn merge_is_independent_of_discovery_order() -> Result<()> {
    let users = TypeDefSource::new("users.graphql", "type User { id: ID! } extend type Query { user(id: ID!): User }");
    let posts = TypeDefSource::new("posts.graphql", "type Post { title: String } extend type Query { posts: [Post] }");
    let a = compose(&[builtin_type_defs(), users.clone(), posts.clone()], &[])?;
    let b = compose(&[builtin_type_defs(), posts, users], &[])?;
    for name in ["User", "Post"] {
        assert_eq!(a.types().get(name), b.types().get(name));
    }
    let query_fields = |c: &gqlgate::schema::ComposedSchema| {
        let q = c.types().get("Query").unwrap();
        let mut names: Vec<String> = ["ping", "user", "posts"].iter().filter(|f| q.field(f).is_some()).map(|s| s.to_string()).collect();
        names.sort();
        names
    };
    assert_eq!(query_fields(&a), query_fields(&b));
    assert_eq!(query_fields(&a).len(), 3);
    Ok(())
}

#[test]
fn disjoint_fragments_render_identical_sdl_in_either_order() -> Result<()> {
    let users = TypeDefSource::new("users.graphql", "type User { id: ID! name: String }");
    let tags = TypeDefSource::new("tags.graphql", "enum Tag { NEW HOT } input TagFilter { tag: Tag }");
    let a = compose(&[builtin_type_defs(), users.clone(), tags.clone()], &[])?;
    let b = compose(&[builtin_type_defs(), tags, users], &[])?;
    assert_eq!(a.sdl(), b.sdl());
    assert_eq!(a.types(), b.types());
    Ok(())
}

#[test]
fn fragments_from_disk_compose_with_builtins() -> Result<()> {
    let tmp = tempdir()?;
    std::fs::create_dir_all(tmp.path().join("users"))?;
    std::fs::write(tmp.path().join("users").join("user.graphql"), "type User { id: ID! }\nextend type Query { me: User }")?;
    std::fs::write(tmp.path().join("status.gql"), "extend type Query { status: String }")?;
    let mut sources = vec![builtin_type_defs()];
    sources.extend(load_type_defs(tmp.path())?);
    let composed = compose(&sources, &[builtin_resolvers()])?;
    let q = composed.types().get("Query").unwrap();
    assert!(q.field("ping").is_some() && q.field("me").is_some() && q.field("status").is_some());
    assert!(composed.sdl().contains("type User {\n  id: ID!\n}"));
    Ok(())
}

#[test]
fn conflicting_fragments_abort_with_source_name() {
    let err = compose(
        &[
            builtin_type_defs(),
            TypeDefSource::new("a.graphql", "type User { id: ID! }"),
            TypeDefSource::new("b.graphql", "type User { id: Int }"),
        ],
        &[],
    )
    .unwrap_err();
    assert!(matches!(err, ComposeError::FieldConflict { ref source_name, .. } if source_name == "b.graphql"));
    assert!(err.to_string().contains("User.id"));
}

#[tokio::test]
async fn later_resolver_overrides_earlier() -> Result<()> {
    let defs = [builtin_type_defs(), TypeDefSource::new("v", "extend type Query { version: String }")];
    let first = ResolverSource::new("first", ResolverMap::new().field("Query", "version", constant(json!("v1"))));
    let second = ResolverSource::new("second", ResolverMap::new().field("Query", "version", constant(json!("v2"))));
    let out = run(&defs, &[builtin_resolvers(), first, second], "{ version ping }").await?;
    assert_eq!(out, json!({"data": {"version": "v2", "ping": "pong"}}));
    Ok(())
}

#[tokio::test]
async fn nested_lists_enums_and_unions_convert_from_json() -> Result<()> {
    let defs = [
        builtin_type_defs(),
        TypeDefSource::new(
            "catalog.graphql",
            r#"
            enum Role { ADMIN MEMBER }
            type User { id: ID! name: String role: Role posts: [Post!]! }
            type Post { title: String tags: [String] }
            union SearchResult = User | Post
            extend type Query {
              users: [User!]!
              search(term: String!): [SearchResult!]!
            }
            "#,
        ),
    ];
    let users = json!([
        {"id": "u1", "name": "Ada", "role": "ADMIN", "posts": [{"title": "Hello", "tags": ["a", null]}]},
        {"id": "u2", "role": "MEMBER", "posts": []}
    ]);
    let search = resolver(|ctx| async move {
        let term: String = ctx.arg("term")?;
        Ok(json!([
            {"__typename": "User", "id": "u1", "name": term, "posts": []},
            {"__typename": "Post", "title": "Hello"}
        ]))
    });
    let res = ResolverSource::new("catalog", ResolverMap::new().field("Query", "users", constant(users)).field("Query", "search", search));
    let out = run(
        &defs,
        &[builtin_resolvers(), res],
        r#"{
            users { id name role posts { title tags } }
            search(term: "Ada") { __typename ... on User { name } ... on Post { title } }
        }"#,
    )
    .await?;
    assert_eq!(
        out,
        json!({"data": {
            "users": [
                {"id": "u1", "name": "Ada", "role": "ADMIN", "posts": [{"title": "Hello", "tags": ["a", null]}]},
                {"id": "u2", "name": null, "role": "MEMBER", "posts": []}
            ],
            "search": [
                {"__typename": "User", "name": "Ada"},
                {"__typename": "Post", "title": "Hello"}
            ]
        }})
    );
    Ok(())
}

#[tokio::test]
async fn resolver_errors_stay_in_the_envelope() -> Result<()> {
    let defs = [builtin_type_defs(), TypeDefSource::new("f", "extend type Query { broken: String }")];
    let broken = ResolverSource::new(
        "broken",
        ResolverMap::new().field("Query", "broken", resolver(|_ctx| async { Err(async_graphql::Error::new("boom")) })),
    );
    let out = run(&defs, &[builtin_resolvers(), broken], "{ ping broken }").await?;
    assert_eq!(out["data"], json!({"ping": "pong", "broken": null}));
    assert_eq!(out["errors"][0]["message"], "boom");
    assert_eq!(out["errors"][0]["path"], json!(["broken"]));
    Ok(())
}

#[tokio::test]
async fn database_backed_resolver_reports_unavailable() -> Result<()> {
    let defs = [builtin_type_defs(), TypeDefSource::new("db", "extend type Query { count: Int }")];
    let count = resolver(|ctx| async move {
        let db = ctx.database().await?;
        Ok(json!(db.name().len()))
    });
    let res = ResolverSource::new("db", ResolverMap::new().field("Query", "count", count));
    let out = run(&defs, &[builtin_resolvers(), res], "{ count }").await?;
    assert_eq!(out["data"], json!({"count": null}));
    assert_eq!(out["errors"][0]["message"], "database not connected");
    assert_eq!(out["errors"][0]["extensions"]["code"], "db_unavailable");
    Ok(())
}

#[tokio::test]
async fn mutations_and_default_arguments() -> Result<()> {
    let defs = [
        builtin_type_defs(),
        TypeDefSource::new("m", "type Mutation { echo(text: String = \"hi\", times: Int!): [String!]! }"),
    ];
    let echo = resolver(|ctx| async move {
        let text: String = ctx.arg("text")?;
        let times: usize = ctx.arg("times")?;
        Ok(json!(vec![text; times]))
    });
    let res = ResolverSource::new("m", ResolverMap::new().field("Mutation", "echo", echo));
    let out = run(&defs, &[builtin_resolvers(), res], "mutation { echo(times: 2) }").await?;
    assert_eq!(out, json!({"data": {"echo": ["hi", "hi"]}}));
    Ok(())
}
