mod common;

use std::{sync::Arc, time::Duration};

use toolsmith_core::clock::FixedClock;
use toolsmith_core::modules::ModuleLayout;
use toolsmith_core::store::SurrealToolStore;
use toolsmith_store::models::{
    InputSchema,
    InterfaceRecord,
    ParamType,
    PropertySchema,
    ToolDescriptor,
};

use common::{build_db, start_time};

fn record(name: &str, category: &str) -> InterfaceRecord {
    InterfaceRecord {
        category: category.to_string(),
        interface_name: name.to_string(),
        description: Some(format!("{name} description")),
        ..InterfaceRecord::default()
    }
}

async fn build_store(db_name: &str) -> SurrealToolStore<surrealdb::engine::local::Db> {
    let store = SurrealToolStore::new(build_db(db_name).await);
    store.ensure_schema().await.expect("schema should apply");
    store
}

#[tokio::test]
async fn replace_all_swaps_the_whole_snapshot() {
    let store = build_store("replace").await;
    let interfaces = store.interfaces();

    let first = vec![record("b_api", "B"), record("a_api", "A"), record("c_api", "C")];
    assert_eq!(interfaces.replace_all(first).await.expect("first replace"), 3);
    let listed = interfaces.list_all().await.expect("list");
    let names: Vec<&str> = listed.iter().map(|record| record.interface_name.as_str()).collect();
    assert_eq!(names, vec!["b_api", "a_api", "c_api"], "document order is kept");
    assert_eq!(listed[0].description.as_deref(), Some("b_api description"));
    assert_eq!(listed[0].sub_category, None);

    interfaces
        .replace_all(vec![record("d_api", "D")])
        .await
        .expect("second replace");
    let listed = interfaces.list_all().await.expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].interface_name, "d_api");

    interfaces.replace_all(Vec::new()).await.expect("empty replace");
    assert!(interfaces.list_all().await.expect("list").is_empty());
}

#[tokio::test]
async fn replace_all_rejects_blank_names() {
    let store = build_store("blank").await;
    let result = store.interfaces().replace_all(vec![record("  ", "A")]).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn columns_come_from_the_table_definition() {
    let store = build_store("columns").await;
    let columns = store.interfaces().columns().await.expect("columns");
    for expected in ["category", "interface_name", "input_params", "example", "updated_at"] {
        assert!(columns.iter().any(|column| column == expected), "missing column {expected}");
    }
}

#[tokio::test]
async fn ensure_schema_is_repeatable() {
    let store = build_store("schema").await;
    store.ensure_schema().await.expect("second schema run");
}

#[tokio::test]
async fn registry_upsert_preserves_created_at() {
    let store = build_store("registry").await;
    let registry = store.registry();
    let created = start_time();

    let mut schema = InputSchema::default();
    schema.properties.insert(
        "symbol".to_string(),
        PropertySchema {
            kind: ParamType::String,
            description: "code".to_string(),
        },
    );
    schema.required.push("symbol".to_string());

    let first = registry
        .upsert(ToolDescriptor::new("stock_x", "first", schema.clone(), created))
        .await
        .expect("insert");
    assert_eq!(first.created_at, created);

    let later = created + chrono::Duration::minutes(45);
    let second = registry
        .upsert(ToolDescriptor::new("stock_x", "second", InputSchema::default(), later))
        .await
        .expect("update");
    assert_eq!(second.created_at, created);
    assert_eq!(second.updated_at, later);
    assert_eq!(second.description, "second");

    let fetched = registry
        .get_by_name("stock_x")
        .await
        .expect("get")
        .expect("row exists");
    assert_eq!(fetched, second);
    assert_eq!(registry.list_all().await.expect("list").len(), 1);
}

#[tokio::test]
async fn registry_lists_by_name_and_deletes() {
    let store = build_store("listing").await;
    let registry = store.registry();
    for name in ["zeta", "alpha", "mid"] {
        registry
            .upsert(ToolDescriptor::new(name, name, InputSchema::default(), start_time()))
            .await
            .expect("insert");
    }
    let names: Vec<String> = registry
        .list_all()
        .await
        .expect("list")
        .into_iter()
        .map(|descriptor| descriptor.name)
        .collect();
    assert_eq!(names, vec!["alpha", "mid", "zeta"]);

    assert!(registry.delete_by_name("mid").await.expect("delete"));
    assert!(!registry.delete_by_name("mid").await.expect("delete again"));
    assert!(registry.get_by_name("mid").await.expect("get").is_none());
}

#[tokio::test]
async fn recent_update_window() {
    let store = build_store("window").await;
    let registry = store.registry();
    let updated = start_time();
    let window = Duration::from_secs(30 * 60);

    assert!(
        !registry
            .is_recently_updated_at("ghost", window, updated)
            .await
            .expect("lookup"),
        "unknown names are never recent"
    );

    registry
        .upsert(ToolDescriptor::new("tool", "d", InputSchema::default(), updated))
        .await
        .expect("insert");
    let soon = updated + chrono::Duration::minutes(10);
    let late = updated + chrono::Duration::minutes(31);
    assert!(registry.is_recently_updated_at("tool", window, soon).await.expect("lookup"));
    assert!(!registry.is_recently_updated_at("tool", window, late).await.expect("lookup"));
}

#[tokio::test]
async fn status_covers_interfaces_and_registry() {
    let dir = tempfile::tempdir().expect("tempdir");
    let layout = ModuleLayout::with_default_extension(dir.path());
    let control = common::build_control_plane(
        "status",
        layout.clone(),
        Arc::new(FixedClock(start_time() + chrono::Duration::minutes(5))),
    )
    .await;

    control
        .interfaces()
        .replace_all(vec![record("Pending API", "A"), record("ready_api", "A")])
        .await
        .expect("interfaces");
    let registry = control.registry();
    registry
        .upsert(ToolDescriptor::new("ready_api", "r", InputSchema::default(), start_time()))
        .await
        .expect("ready");
    registry
        .upsert(ToolDescriptor::new(
            "orphan",
            "o",
            InputSchema::default(),
            start_time() - chrono::Duration::hours(3),
        ))
        .await
        .expect("orphan");
    layout
        .write_atomic("ready_api", "async def execute(**p):\n    return []\n")
        .await
        .expect("write");

    let statuses = control.status(Duration::from_secs(30 * 60)).await.expect("status");
    let summary: Vec<(String, &str, &str, bool)> = statuses
        .iter()
        .map(|status| {
            let descriptor = match status.descriptor {
                toolsmith_core::control::DescriptorState::Pending => "pending",
                toolsmith_core::control::DescriptorState::Ready => "ready",
                toolsmith_core::control::DescriptorState::Stale => "stale",
            };
            let module = match status.module {
                toolsmith_core::modules::ModuleState::Absent => "absent",
                toolsmith_core::modules::ModuleState::Building => "building",
                toolsmith_core::modules::ModuleState::Built => "built",
            };
            (status.name.clone(), descriptor, module, status.servable)
        })
        .collect();
    assert_eq!(
        summary,
        vec![
            ("orphan".to_string(), "stale", "absent", false),
            ("pending_api".to_string(), "pending", "absent", false),
            ("ready_api".to_string(), "ready", "built", true),
        ]
    );

    let deleted = control.delete_tool("ready_api", true).await.expect("delete");
    assert!(deleted.descriptor_removed);
    assert!(deleted.module_removed);
    assert_eq!(
        layout.state("ready_api").await.expect("state"),
        toolsmith_core::modules::ModuleState::Absent
    );
}
