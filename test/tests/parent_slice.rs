//! Tests for child components that mirror part of a parent's state.
//!
//! These tests verify that:
//! - Reads and writes under the slice prefix reach the parent's data
//! - Parent renders of a mirrored path refresh the child's bindings
//! - A slice pinned to a list element addresses that element
//! - Local getters under the slice prefix shadow the parent

use pathweave_test::prelude::*;

struct Family {
    scheduler: Scheduler,
    parent: Component,
    child: Component,
    log: BindingLog,
}

fn family() -> Family {
    let scheduler = Scheduler::new();
    let parent_class = StateClass::builder(json!({ "user": { "name": "Ada" } }))
        .build()
        .unwrap();
    let parent_engine = ComponentEngine::new(ComponentDefinition::new(parent_class));
    let parent = Component::new(&parent_engine, &scheduler);

    let child_class = StateClass::builder(json!({})).build().unwrap();
    let child_engine =
        ComponentEngine::new(ComponentDefinition::new(child_class).path("profile.name"));
    let child = Component::new(&child_engine, &scheduler);
    ParentSlice::new(&parent, "profile", "user", None)
        .attach(&child)
        .unwrap();

    let log = BindingLog::new();
    child.register_binding(child.state_ref("profile.name", None).unwrap(), log.binding());
    Family {
        scheduler,
        parent,
        child,
        log,
    }
}

/// Test that the child reads through to the parent.
#[test]
fn test_child_reads_parent_state() {
    let family = family();

    let name = family
        .child
        .create_readonly_state(|state| state.get("profile.name"))
        .unwrap();

    assert_eq!(name, json!("Ada"));
    assert_eq!(family.child.data_snapshot(), json!({}));
}

/// Test that a child write lands in the parent and renders the child once.
#[test]
fn test_child_write_updates_parent() {
    let family = family();

    family
        .child
        .update(None, |state| state.set("profile.name", json!("Grace")))
        .unwrap();
    family.scheduler.drain_pending_work().unwrap();

    assert_eq!(family.parent.data_snapshot()["user"]["name"], json!("Grace"));
    assert_eq!(family.log.values_for("profile.name"), vec![json!("Grace")]);
}

/// Test that a parent write reaches the child's bindings.
#[test]
fn test_parent_write_notifies_child() {
    let family = family();

    family
        .parent
        .update(None, |state| state.set("user.name", json!("Lin")))
        .unwrap();
    assert!(family.log.is_empty(), "nothing renders before the scheduler runs");
    family.scheduler.drain_pending_work().unwrap();

    assert_eq!(family.log.values_for("profile.name"), vec![json!("Lin")]);
}

/// Test that a slice pinned to a list element reads that element.
#[test]
fn test_slice_pinned_to_list_element() {
    let parent = Harness::new(todo_definition());
    parent.bind_list("items", &[]).unwrap();
    parent.render_all().unwrap();
    let second = parent.element("items", 1).unwrap();

    let child_class = StateClass::builder(json!({})).build().unwrap();
    let child_engine =
        ComponentEngine::new(ComponentDefinition::new(child_class).path("row.title"));
    let child = Component::new(&child_engine, &parent.scheduler);
    ParentSlice::new(&parent.component, "row", "items.*", Some(second))
        .attach(&child)
        .unwrap();

    let title = child
        .create_readonly_state(|state| state.get("row.title"))
        .unwrap();
    assert_eq!(title, json!("test"));

    child
        .update(None, |state| state.set("row.title", json!("verify")))
        .unwrap();
    parent.flush().unwrap();
    assert_eq!(
        parent.component.data_snapshot()["items"][1]["title"],
        json!("verify")
    );
}

/// Test that a local getter under the prefix wins over the parent's data.
#[test]
fn test_local_getter_shadows_slice() {
    let scheduler = Scheduler::new();
    let parent_class = StateClass::builder(json!({ "user": { "name": "Ada" } }))
        .build()
        .unwrap();
    let parent_engine = ComponentEngine::new(ComponentDefinition::new(parent_class));
    let parent = Component::new(&parent_engine, &scheduler);

    let child_class = StateClass::builder(json!({}))
        .getter("profile.title", |state| {
            let name = state.get("profile.name")?;
            Ok(json!(format!("Dr. {}", name.as_str().unwrap_or_default())))
        })
        .build()
        .unwrap();
    let child_engine = ComponentEngine::new(
        ComponentDefinition::new(child_class).paths(["profile.name", "profile.title"]),
    );
    let child = Component::new(&child_engine, &scheduler);
    ParentSlice::new(&parent, "profile", "user", None)
        .attach(&child)
        .unwrap();

    let title = child
        .create_readonly_state(|state| state.get("profile.title"))
        .unwrap();
    assert_eq!(title, json!("Dr. Ada"));

    assert!(
        !parent.engine().path_manager().contains("user.title"),
        "a shadowed path is not mirrored"
    );

    let log = BindingLog::new();
    child.register_binding(child.state_ref("profile.title", None).unwrap(), log.binding());
    parent
        .update(None, |state| state.set("user.name", json!("Lin")))
        .unwrap();
    scheduler.drain_pending_work().unwrap();
    assert_eq!(log.values_for("profile.title"), vec![json!("Dr. Lin")]);
    assert_eq!(parent.data_snapshot(), json!({ "user": { "name": "Lin" } }));
}
