//! End-to-end tests: compiled classes resolving and mutating through a graph
//! store over the in-memory adapter.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use keystone_core::connection::{encode_cursor, Connection, ConnectionArgs};
use keystone_core::{
    CurrentViewer, Edge, EdgeFilter, KeystoneError, NewEdge, NewNode, Node, NodeId, NodeQuery,
    OrgId, PersonId, PropFilter, Props, Result,
};
use keystone_graph::backend::MemoryBackend;
use keystone_graph::{BackendAdapter, BackendCapabilities, SharedBackend};
use keystone_schema::catalog::Organization;
use keystone_schema::{
    compile, id_arg, ArgSpec, ClassRef, FieldOpts, NodeClass, RelationOpts, RequestContext,
    ScalarKind, Schema, SpecBuilder,
};

// ── Test Classes ─────────────────────────────────────────────────

struct Content;

impl NodeClass for Content {
    const TYPE_NAME: &'static str = "Content";
    const ABSTRACT: bool = true;

    fn gql_spec(gql: &mut SpecBuilder) {
        gql.field()
            .string("title")
            .nullable()
            .string("body")
            .nullable()
            .enumeration("status", ["DRAFT", "LIVE"]);
        gql.mutation().custom(
            "publish",
            [ArgSpec::required("id", ScalarKind::Id)],
            |args, ctx| async move {
                let id = id_arg(&args, "id")?;
                compile::<Content>()?
                    .set_field(&ctx, &id, "status", json!("LIVE"))
                    .await
            },
        );
    }
}

struct Post;

impl NodeClass for Post {
    const TYPE_NAME: &'static str = "Post";

    fn parent() -> Option<ClassRef> {
        Some(ClassRef::of::<Content>())
    }

    fn gql_spec(gql: &mut SpecBuilder) {
        gql.field().int("views").with(
            "shout",
            ScalarKind::String,
            FieldOpts::new().resolve(|node, _args, _ctx| async move {
                let title = node.property("title").and_then(Value::as_str).unwrap_or("");
                Ok(json!(title.to_uppercase()))
            }),
        );
        gql.relation().many::<Comment>("comments");
    }
}

struct Comment;

impl NodeClass for Comment {
    const TYPE_NAME: &'static str = "Comment";

    fn gql_spec(gql: &mut SpecBuilder) {
        gql.field().string("text");
        gql.relation()
            .one_with::<Post>("post", RelationOpts::new().role("comments").incoming());
        gql.mutation().created_by::<Post>("comments");
    }
}

struct Article;

impl NodeClass for Article {
    const TYPE_NAME: &'static str = "Article";

    fn parent() -> Option<ClassRef> {
        Some(ClassRef::of::<Content>())
    }

    fn gql_spec(gql: &mut SpecBuilder) {
        gql.field()
            .nullable()
            .enumeration("status", ["DRAFT", "LIVE"]);
        gql.mutation().custom(
            "feature",
            [
                ArgSpec::required("id", ScalarKind::Id),
                ArgSpec::new("rank", ScalarKind::Int),
            ],
            |args, ctx| async move {
                let id = id_arg(&args, "id")?;
                ctx.store.get_node(&ctx.viewer, &id).await
            },
        );
    }
}

struct Reshaped;

impl NodeClass for Reshaped {
    const TYPE_NAME: &'static str = "Reshaped";

    fn parent() -> Option<ClassRef> {
        Some(ClassRef::of::<Content>())
    }

    fn gql_spec(gql: &mut SpecBuilder) {
        gql.field().enumeration("status", ["DRAFT", "GONE"]);
    }
}

struct ClaimsId;

impl NodeClass for ClaimsId {
    const TYPE_NAME: &'static str = "ClaimsId";

    fn gql_spec(gql: &mut SpecBuilder) {
        gql.field().string("id");
    }
}

struct Twice;

impl NodeClass for Twice {
    const TYPE_NAME: &'static str = "Twice";

    fn gql_spec(gql: &mut SpecBuilder) {
        gql.field().string("label");
        gql.relation().many::<Post>("label");
    }
}

/// The in-memory adapter claiming range-query support.
struct RangeCapable(MemoryBackend);

#[async_trait]
impl BackendAdapter for RangeCapable {
    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            name: "memory-ranged",
            range_queries: true,
        }
    }
    async fn create_node(&self, draft: NewNode) -> Result<Node> {
        self.0.create_node(draft).await
    }
    async fn get_node(&self, id: &NodeId, owner: Option<&OrgId>) -> Result<Option<Node>> {
        self.0.get_node(id, owner).await
    }
    async fn update_node(&self, id: &NodeId, properties: Props) -> Result<Node> {
        self.0.update_node(id, properties).await
    }
    async fn delete_node(&self, id: &NodeId) -> Result<()> {
        self.0.delete_node(id).await
    }
    async fn query_nodes(&self, query: &NodeQuery) -> Result<Vec<Node>> {
        self.0.query_nodes(query).await
    }
    async fn create_edge(&self, draft: NewEdge) -> Result<Edge> {
        self.0.create_edge(draft).await
    }
    async fn query_edges(&self, filter: &EdgeFilter) -> Result<Vec<Edge>> {
        self.0.query_edges(filter).await
    }
    async fn delete_edge(&self, source: &NodeId, target: &NodeId, role: &str) -> Result<()> {
        self.0.delete_edge(source, target, role).await
    }
    async fn close(&self) -> Result<()> {
        self.0.close().await
    }
}

// ── Helpers ──────────────────────────────────────────────────────

fn props(value: Value) -> Props {
    value.as_object().cloned().unwrap_or_default()
}

fn schema() -> Arc<Schema> {
    Arc::new(
        Schema::builder()
            .register::<Organization>()
            .register::<Post>()
            .register::<Article>()
            .build()
            .unwrap(),
    )
}

fn member(person: &str, org: &str) -> CurrentViewer {
    CurrentViewer::logged_in(PersonId::from(person), OrgId::from(org))
}

/// Schema, a context for a member of `o-1`, and the `o-1` organization node.
async fn setup(backend: SharedBackend) -> (Arc<Schema>, RequestContext) {
    let schema = schema();
    let store = schema.store(backend);
    for org in ["o-1", "o-2"] {
        store
            .create_node_with_id(
                &CurrentViewer::omni(),
                NodeId::from(org),
                "Organization",
                OrgId::from(org),
                props(json!({"name": org})),
            )
            .await
            .unwrap();
    }
    let ctx = schema.context(member("p-1", "o-1"), store);
    (schema, ctx)
}

async fn post(schema: &Schema, ctx: &RequestContext, title: &str) -> Node {
    schema
        .get("Post")
        .unwrap()
        .run_mutation("createPost", props(json!({"title": title, "views": 0})), ctx)
        .await
        .unwrap()
}

async fn comment(schema: &Schema, ctx: &RequestContext, parent: &Node, text: &str) -> Node {
    schema
        .get("Comment")
        .unwrap()
        .run_mutation(
            "createComment",
            props(json!({"parentId": parent.id.as_str(), "text": text})),
            ctx,
        )
        .await
        .unwrap()
}

// ── Compilation ──────────────────────────────────────────────────

#[test]
fn test_compile_returns_the_same_object() {
    let first = compile::<Post>().unwrap();
    let second = compile::<Post>().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    let schema = schema();
    assert!(Arc::ptr_eq(schema.get("Post").unwrap(), &first));
}

#[test]
fn test_subclass_includes_parent_fields_and_implements_it() {
    let post = compile::<Post>().unwrap();
    let names: Vec<&str> = post.fields.iter().map(|f| f.name()).collect();
    assert_eq!(names, vec!["id", "title", "body", "status", "views", "shout"]);
    assert_eq!(post.interfaces, vec!["Content"]);
    assert!(post.mutation("publishPost").is_some());

    let content = compile::<Content>().unwrap();
    assert!(content.mutation("createContent").is_none());
    assert!(content.mutation("publishContent").is_some());
}

#[test]
fn test_declaration_conflicts_fail_at_compile_time() {
    let err = compile::<ClaimsId>().unwrap_err();
    assert!(matches!(err, KeystoneError::SpecValidation(ref m) if m.contains("reserved")));
    let err = compile::<Twice>().unwrap_err();
    assert!(matches!(err, KeystoneError::SpecValidation(ref m) if m.contains("more than once")));
    let err = compile::<Reshaped>().unwrap_err();
    assert!(matches!(err, KeystoneError::SpecValidation(ref m) if m.contains("members")));
}

#[test]
fn test_sdl_rendering() {
    let sdl = schema().to_sdl();
    assert!(sdl.contains("scalar JSON"));
    assert!(sdl.contains("enum Content_status_Enum {\n  DRAFT\n  LIVE\n}"));
    assert!(sdl.contains("interface Content {"));
    assert!(sdl.contains("type Post implements Content {"));
    assert!(sdl.contains("  title: String!"));
    assert!(sdl.contains("  body: String\n"));
    assert!(sdl.contains(
        "  comments(first: Int, after: String, last: Int, before: String): CommentConnection!"
    ));
    assert!(sdl.contains("  post: Post\n"));
    assert!(sdl.contains("type PageInfo {"));
    assert!(sdl.contains("  createComment(text: String!, parentId: ID!): Comment!"));
    assert!(sdl.contains("  deletePost(id: ID!): Post!"));
    assert!(sdl.contains("status: Content_status_Enum"));
    assert!(!sdl.contains("createContent"));
}

#[test]
fn test_sdl_overridden_enum_keeps_interface_type() {
    let sdl = schema().to_sdl();
    assert!(sdl.contains("type Article implements Content {"));
    assert!(!sdl.contains("Article_status_Enum"));
    let article = &sdl[sdl.find("type Article").unwrap()..];
    let article = &article[..article.find('}').unwrap()];
    assert!(article.contains("  status: Content_status_Enum\n"));
    assert!(sdl.contains("  featureArticle(id: ID!, rank: Int): Article!"));
}

#[test]
fn test_sdl_has_query_root() {
    let sdl = schema().to_sdl();
    assert!(sdl.contains("\ntype Query {\n"));
    assert!(sdl.contains("  post(id: ID!): Post\n"));
    assert!(sdl.contains(
        "  allContent(first: Int, after: String, last: Int, before: String): ContentConnection!"
    ));
    assert!(sdl.contains("type OrganizationConnection {"));
}

// ── Resolvers ────────────────────────────────────────────────────

#[tokio::test]
async fn test_scalar_and_computed_fields() {
    let (schema, ctx) = setup(Arc::new(MemoryBackend::new())).await;
    let node = post(&schema, &ctx, "hello").await;
    let compiled = schema.resolve_type(&node).unwrap();

    let title = compiled
        .resolve_field(&node, "title", Props::new(), &ctx)
        .await
        .unwrap();
    assert_eq!(title, json!("hello"));
    let body = compiled
        .resolve_field(&node, "body", Props::new(), &ctx)
        .await
        .unwrap();
    assert_eq!(body, Value::Null);
    let shout = compiled
        .resolve_field(&node, "shout", Props::new(), &ctx)
        .await
        .unwrap();
    assert_eq!(shout, json!("HELLO"));
    let typename = compiled
        .resolve_field(&node, "__typename", Props::new(), &ctx)
        .await
        .unwrap();
    assert_eq!(typename, json!("Post"));
}

#[tokio::test]
async fn test_relations_resolve_in_both_directions() {
    let (schema, ctx) = setup(Arc::new(MemoryBackend::new())).await;
    let parent = post(&schema, &ctx, "p").await;
    let first = comment(&schema, &ctx, &parent, "one").await;
    let second = comment(&schema, &ctx, &parent, "two").await;
    assert_eq!(first.owner_id, OrgId::from("o-1"));

    let comments = schema
        .get("Post")
        .unwrap()
        .resolve_field(&parent, "comments", Props::new(), &ctx)
        .await
        .unwrap();
    let comments: Connection<Node> = serde_json::from_value(comments).unwrap();
    let ids: Vec<&NodeId> = comments.nodes().map(|n| &n.id).collect();
    assert_eq!(ids, vec![&first.id, &second.id]);
    assert!(!comments.page_info.has_next_page);

    let back = schema
        .get("Comment")
        .unwrap()
        .resolve_field(&second, "post", Props::new(), &ctx)
        .await
        .unwrap();
    assert_eq!(back["id"], json!(parent.id.as_str()));

    let from_first = schema
        .get("Comment")
        .unwrap()
        .resolve_field(&first, "post", Props::new(), &ctx)
        .await
        .unwrap();
    assert_eq!(from_first["typeName"], json!("Post"));
}

#[tokio::test]
async fn test_missing_one_relation_is_null() {
    let (schema, ctx) = setup(Arc::new(MemoryBackend::new())).await;
    let parent = post(&schema, &ctx, "p").await;
    let child = comment(&schema, &ctx, &parent, "c").await;
    ctx.store
        .delete_edge(&ctx.viewer, &parent.id, &child.id, "comments")
        .await
        .unwrap();
    let value = schema
        .get("Comment")
        .unwrap()
        .resolve_field(&child, "post", Props::new(), &ctx)
        .await
        .unwrap();
    assert_eq!(value, Value::Null);
}

#[tokio::test]
async fn test_traversal_pagination_needs_range_queries() {
    let (schema, ctx) = setup(Arc::new(MemoryBackend::new())).await;
    let parent = post(&schema, &ctx, "p").await;
    comment(&schema, &ctx, &parent, "one").await;

    let err = schema
        .get("Post")
        .unwrap()
        .resolve_field(&parent, "comments", props(json!({"first": 1})), &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, KeystoneError::NotImplemented(_)));
}

#[tokio::test]
async fn test_traversal_pagination_with_range_capable_backend() {
    let (schema, ctx) = setup(Arc::new(RangeCapable(MemoryBackend::new()))).await;
    let parent = post(&schema, &ctx, "p").await;
    let mut comments = Vec::new();
    for text in ["a", "b", "c"] {
        comments.push(comment(&schema, &ctx, &parent, text).await);
    }

    let page = schema
        .get("Post")
        .unwrap()
        .resolve_field(
            &parent,
            "comments",
            props(json!({"first": 1, "after": encode_cursor(0)})),
            &ctx,
        )
        .await
        .unwrap();
    let page: Connection<Node> = serde_json::from_value(page).unwrap();
    assert_eq!(page.edges.len(), 1);
    assert_eq!(page.edges[0].node.id, comments[1].id);
    assert_eq!(page.edges[0].cursor, encode_cursor(1));
    assert!(page.page_info.has_next_page);
}

// ── Relation Helpers ─────────────────────────────────────────────

#[tokio::test]
async fn test_find_and_create_related() {
    let (schema, ctx) = setup(Arc::new(MemoryBackend::new())).await;
    let compiled = schema.get("Post").unwrap();
    let parent = post(&schema, &ctx, "p").await;
    let first = comment(&schema, &ctx, &parent, "one").await;

    let created = compiled
        .create_related(&ctx, &parent.id, "comments", props(json!({"text": "two"})))
        .await
        .unwrap();
    assert_eq!(created.type_name, "Comment");
    assert_eq!(created.owner_id, parent.owner_id);

    let related = compiled
        .find_related(&ctx, &parent.id, "comments")
        .await
        .unwrap();
    let ids: Vec<&NodeId> = related.iter().map(|n| &n.id).collect();
    assert_eq!(ids, vec![&first.id, &created.id]);

    let err = compiled
        .create_related(&ctx, &parent.id, "comments", Props::new())
        .await
        .unwrap_err();
    assert!(matches!(err, KeystoneError::InvalidArgument(ref m) if m.contains("text")));
    assert_eq!(
        compiled.find_related(&ctx, &parent.id, "comments").await.unwrap().len(),
        2
    );

    let err = compiled
        .find_related(&ctx, &parent.id, "likes")
        .await
        .unwrap_err();
    assert!(matches!(err, KeystoneError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_incoming_relation_helpers() {
    let (schema, ctx) = setup(Arc::new(MemoryBackend::new())).await;
    let compiled = schema.get("Comment").unwrap();
    let parent = post(&schema, &ctx, "old").await;
    let child = comment(&schema, &ctx, &parent, "c").await;

    let removed = compiled
        .delete_related(&ctx, &child.id, "post", None, false)
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert!(ctx.store.find_node(&ctx.viewer, &parent.id).await.unwrap().is_some());
    assert!(compiled.find_related(&ctx, &child.id, "post").await.unwrap().is_empty());

    let fresh = compiled
        .create_related(&ctx, &child.id, "post", props(json!({"title": "new", "views": 0})))
        .await
        .unwrap();
    let back = compiled
        .resolve_field(&child, "post", Props::new(), &ctx)
        .await
        .unwrap();
    assert_eq!(back["id"], json!(fresh.id.as_str()));
}

#[tokio::test]
async fn test_delete_related_can_remove_the_node() {
    let (schema, ctx) = setup(Arc::new(MemoryBackend::new())).await;
    let compiled = schema.get("Post").unwrap();
    let parent = post(&schema, &ctx, "p").await;
    let first = comment(&schema, &ctx, &parent, "one").await;
    let second = comment(&schema, &ctx, &parent, "two").await;

    let removed = compiled
        .delete_related(&ctx, &parent.id, "comments", Some(&first.id), true)
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert!(ctx.store.find_node(&ctx.viewer, &first.id).await.unwrap().is_none());

    let left = compiled
        .find_related(&ctx, &parent.id, "comments")
        .await
        .unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].id, second.id);
}

// ── Mutations ────────────────────────────────────────────────────

#[tokio::test]
async fn test_custom_mutation_args_are_validated() {
    let (schema, ctx) = setup(Arc::new(MemoryBackend::new())).await;
    let compiled = schema.get("Article").unwrap();
    let article = compiled
        .run_mutation("createArticle", props(json!({"title": "a"})), &ctx)
        .await
        .unwrap();

    let err = compiled
        .run_mutation("featureArticle", props(json!({"rank": 1})), &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, KeystoneError::InvalidArgument(ref m) if m.contains("requires argument \"id\"")));

    let err = compiled
        .run_mutation(
            "featureArticle",
            props(json!({"id": article.id.as_str(), "rank": "top"})),
            &ctx,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, KeystoneError::InvalidArgument(ref m) if m.contains("expects int")));

    let featured = compiled
        .run_mutation(
            "featureArticle",
            props(json!({"id": article.id.as_str(), "rank": 1})),
            &ctx,
        )
        .await
        .unwrap();
    assert_eq!(featured.id, article.id);
}

#[tokio::test]
async fn test_create_validates_fields() {
    let (schema, ctx) = setup(Arc::new(MemoryBackend::new())).await;
    let compiled = schema.get("Post").unwrap();

    let missing = compiled
        .run_mutation("createPost", props(json!({"views": 1})), &ctx)
        .await
        .unwrap_err();
    assert!(matches!(missing, KeystoneError::InvalidArgument(ref m) if m.contains("title")));

    let wrong_kind = compiled
        .run_mutation("createPost", props(json!({"title": "t", "views": "many"})), &ctx)
        .await
        .unwrap_err();
    assert!(matches!(wrong_kind, KeystoneError::InvalidArgument(_)));

    let undeclared = compiled
        .run_mutation(
            "createPost",
            props(json!({"title": "t", "views": 1, "color": "red"})),
            &ctx,
        )
        .await
        .unwrap_err();
    assert!(matches!(undeclared, KeystoneError::InvalidArgument(_)));

    let computed = compiled
        .run_mutation(
            "createPost",
            props(json!({"title": "t", "views": 1, "shout": "T"})),
            &ctx,
        )
        .await
        .unwrap_err();
    assert!(matches!(computed, KeystoneError::InvalidArgument(_)));

    let abstract_create = compile::<Content>()
        .unwrap()
        .create(&ctx, props(json!({"title": "t"})))
        .await
        .unwrap_err();
    assert!(matches!(abstract_create, KeystoneError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_update_set_field_and_delete() {
    let (schema, ctx) = setup(Arc::new(MemoryBackend::new())).await;
    let compiled = schema.get("Post").unwrap();
    let node = post(&schema, &ctx, "draft").await;

    let updated = compiled
        .run_mutation(
            "updatePost",
            props(json!({"id": node.id.as_str(), "views": 7})),
            &ctx,
        )
        .await
        .unwrap();
    assert_eq!(updated.property("views"), Some(&json!(7)));
    assert_eq!(updated.property("title"), Some(&json!("draft")));

    let err = compiled
        .set_field(&ctx, &node.id, "title", Value::Null)
        .await
        .unwrap_err();
    assert!(matches!(err, KeystoneError::InvalidArgument(_)));
    let err = compiled
        .set_field(&ctx, &node.id, "status", json!("ARCHIVED"))
        .await
        .unwrap_err();
    assert!(matches!(err, KeystoneError::InvalidArgument(_)));

    let published = compiled
        .run_mutation("publishPost", props(json!({"id": node.id.as_str()})), &ctx)
        .await
        .unwrap();
    assert_eq!(published.property("status"), Some(&json!("LIVE")));

    let deleted = compiled
        .run_mutation("deletePost", props(json!({"id": node.id.as_str()})), &ctx)
        .await
        .unwrap();
    assert_eq!(deleted.id, node.id);
    assert!(ctx.store.find_node(&ctx.viewer, &node.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_created_by_requires_parent_of_declared_type() {
    let (schema, ctx) = setup(Arc::new(MemoryBackend::new())).await;
    let compiled = schema.get("Comment").unwrap();

    let err = compiled
        .run_mutation("createComment", props(json!({"text": "x"})), &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, KeystoneError::InvalidArgument(ref m) if m.contains("parentId")));

    let err = compiled
        .run_mutation(
            "createComment",
            props(json!({"text": "x", "parentId": "o-1"})),
            &ctx,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, KeystoneError::InvalidArgument(_)));
}

// ── Polymorphism & Isolation ─────────────────────────────────────

#[tokio::test]
async fn test_polymorphic_queries_return_concrete_types() {
    let (schema, ctx) = setup(Arc::new(MemoryBackend::new())).await;
    for title in ["a", "b", "c"] {
        post(&schema, &ctx, title).await;
    }

    let content = schema
        .query_nodes(&ctx, "Content", PropFilter::default())
        .await
        .unwrap();
    assert_eq!(content.len(), 3);
    for node in &content {
        assert_eq!(node.type_name, "Post");
        assert_eq!(schema.resolve_type(node).unwrap().name, "Post");
    }

    let page = schema
        .query_connection(&ctx, "Content", PropFilter::default(), &ConnectionArgs::first(2))
        .await
        .unwrap();
    assert_eq!(page.edges.len(), 2);
    assert!(page.page_info.has_next_page);
    assert_eq!(page.page_info.end_cursor, Some(encode_cursor(1)));
}

#[tokio::test]
async fn test_other_orgs_are_unauthorized() {
    let (schema, ctx) = setup(Arc::new(MemoryBackend::new())).await;
    let node = post(&schema, &ctx, "mine").await;

    let outsider = schema.context(member("p-9", "o-2"), ctx.store.clone());
    let visible = schema
        .query_nodes(&outsider, "Post", PropFilter::default())
        .await
        .unwrap();
    assert!(visible.is_empty());

    let err = schema
        .get("Post")
        .unwrap()
        .run_mutation("updatePost", props(json!({"id": node.id.as_str(), "views": 1})), &outsider)
        .await
        .unwrap_err();
    assert!(matches!(err, KeystoneError::Unauthorized(_)));

    let err = schema
        .get("Post")
        .unwrap()
        .resolve_field(&node, "comments", Props::new(), &outsider)
        .await
        .unwrap_err();
    assert!(matches!(err, KeystoneError::Unauthorized(_)));
}

#[tokio::test]
async fn test_people_reach_their_own_node_across_orgs() {
    let (schema, ctx) = setup(Arc::new(MemoryBackend::new())).await;
    let person = schema
        .get("Person")
        .unwrap()
        .run_mutation(
            "createPerson",
            props(json!({"parentId": "o-2", "name": "Ada"})),
            &schema.context(CurrentViewer::omni(), ctx.store.clone()),
        )
        .await
        .unwrap();
    assert_eq!(person.owner_id, OrgId::from("o-2"));

    // Logged in to o-1, but the person node lives in o-2.
    let own = schema.context(
        CurrentViewer::logged_in(PersonId::from(person.id.as_str()), OrgId::from("o-1")),
        ctx.store.clone(),
    );
    let people = schema
        .query_nodes(&own, "Person", PropFilter::default())
        .await
        .unwrap();
    assert_eq!(people.len(), 1);
    assert_eq!(people[0].id, person.id);

    let stranger = schema.context(member("p-9", "o-1"), ctx.store.clone());
    let people = schema
        .query_nodes(&stranger, "Person", PropFilter::default())
        .await
        .unwrap();
    assert!(people.is_empty());
}
