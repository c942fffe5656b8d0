//! Tests for dependency discovery and change propagation.
//!
//! These tests verify that:
//! - Getters record what they read the first time they run
//! - A write reaches every computed member that depends on it, transitively
//! - Each binding is told at most once per batch

use std::cell::Cell;
use std::rc::Rc;

use pathweave_test::prelude::*;

/// Test that reading a getter chain records one edge per getter.
#[test]
fn test_getter_reads_are_recorded() {
    let harness = Harness::new(ComponentDefinition::new(counter_class()));

    assert_eq!(harness.get("label").unwrap(), json!("count: 0"));

    let snapshot = harness.engine.path_manager().snapshot();
    assert_eq!(snapshot.dynamic_dependencies["count"], vec!["double"]);
    assert_eq!(snapshot.dynamic_dependencies["double"], vec!["label"]);
}

/// Test that accessors with a setter never become dependents.
#[test]
fn test_setter_members_are_not_dependents() {
    let harness = Harness::new(ComponentDefinition::new(counter_class()));

    assert_eq!(harness.get("count_text").unwrap(), json!("0"));

    let snapshot = harness.engine.path_manager().snapshot();
    assert!(
        !snapshot
            .dynamic_dependencies
            .get("count")
            .is_some_and(|dependents| dependents.contains(&"count_text".to_string())),
        "count_text has a setter and must not be tracked"
    );
}

/// Test that a write propagates through a chain of getters.
#[test]
fn test_write_reaches_transitive_dependents() {
    let harness = Harness::new(ComponentDefinition::new(counter_class()));
    harness.bind("double").unwrap();
    harness.bind("label").unwrap();
    harness.render_all().unwrap();
    harness.log.clear();

    harness.set("count", json!(2)).unwrap();
    harness.flush().unwrap();

    assert_eq!(harness.log.values_for("double"), vec![json!(4)]);
    assert_eq!(harness.log.values_for("label"), vec![json!("count: 4")]);
    assert_eq!(harness.log.batches().len(), 1);
}

/// Test that a binding bound to several changed refs is told once per batch.
#[test]
fn test_binding_notified_at_most_once_per_batch() {
    let harness = Harness::new(ComponentDefinition::new(counter_class()));
    let calls = Rc::new(Cell::new(0));

    struct Counting(Rc<Cell<usize>>);
    impl Binding for Counting {
        fn apply_change(&self, _renderer: &mut Renderer<'_>) -> PathweaveResult<()> {
            self.0.set(self.0.get() + 1);
            Ok(())
        }
    }

    let counting: Rc<dyn Binding> = Rc::new(Counting(calls.clone()));
    let id = harness
        .component
        .register_binding(harness.component.state_ref("count", None).unwrap(), counting.clone());
    harness.component.register_binding(
        harness.component.state_ref("count", None).unwrap(),
        counting.clone(),
    );
    harness.component.unregister_binding(id);
    let count = harness.component.state_ref("count", None).unwrap();
    assert_eq!(harness.component.get_bindings(&count).len(), 1);

    harness
        .component
        .update(None, |state| {
            state.set("count", json!(1))?;
            state.set("count", json!(2))
        })
        .unwrap();
    harness.flush().unwrap();

    assert_eq!(calls.get(), 1);
}

/// Test that a dependent reached through two paths is notified once.
#[test]
fn test_diamond_dependency_notifies_once() {
    let class = StateClass::builder(json!({ "a": 1, "b": 2 }))
        .getter("sum", |state| {
            let a = state.get("a")?.as_i64().unwrap_or(0);
            let b = state.get("b")?.as_i64().unwrap_or(0);
            Ok(json!(a + b))
        })
        .build()
        .unwrap();
    let harness = Harness::new(ComponentDefinition::new(class));
    harness.bind("sum").unwrap();
    harness.render_all().unwrap();
    harness.log.clear();

    harness
        .component
        .update(None, |state| {
            state.set("a", json!(10))?;
            state.set("b", json!(20))
        })
        .unwrap();
    harness.flush().unwrap();

    assert_eq!(harness.log.values_for("sum"), vec![json!(30)]);
}

/// Test that writing a nested path notifies bindings on its descendants.
#[test]
fn test_structural_children_are_rendered() {
    let class = StateClass::builder(json!({ "user": { "name": "Ada", "age": 36 } }))
        .build()
        .unwrap();
    let harness = Harness::new(ComponentDefinition::new(class).paths(["user.name", "user.age"]));
    harness.bind("user.name").unwrap();
    harness.bind("user.age").unwrap();

    harness
        .set("user", json!({ "name": "Grace", "age": 45 }))
        .unwrap();
    harness.flush().unwrap();

    assert_eq!(harness.log.values_for("user.name"), vec![json!("Grace")]);
    assert_eq!(harness.log.values_for("user.age"), vec![json!(45)]);
}

/// Test that a write to an undeclared nested path is registered on the fly.
#[test]
fn test_undeclared_path_write_is_registered() {
    let class = StateClass::builder(json!({ "user": { "name": "Ada" } }))
        .build()
        .unwrap();
    let harness = Harness::new(ComponentDefinition::new(class));
    harness.bind("user").unwrap();

    harness.set("user.email", json!("ada@example.com")).unwrap();
    harness.flush().unwrap();

    assert!(harness.engine.path_manager().contains("user.email"));
    assert_eq!(
        harness.get("user").unwrap(),
        json!({ "name": "Ada", "email": "ada@example.com" })
    );
}

/// Test that the read cache of a read-only view skips repeated getter runs,
/// and that it can be turned off.
#[test]
fn test_readonly_cache_respects_config() {
    for (readonly_cache, expected) in [(true, 1), (false, 2)] {
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let class = StateClass::builder(json!({ "count": 3 }))
            .getter("double", move |state| {
                counter.set(counter.get() + 1);
                Ok(json!(state.get("count")?.as_i64().unwrap_or(0) * 2))
            })
            .build()
            .unwrap();
        let config = EngineConfig {
            readonly_cache,
            ..EngineConfig::default()
        };
        let harness = Harness::new(ComponentDefinition::new(class).config(config));

        harness
            .component
            .create_readonly_state(|state| {
                state.get("double")?;
                state.get("double")
            })
            .unwrap();

        assert_eq!(runs.get(), expected, "readonly_cache = {readonly_cache}");
    }
}

/// Test that a cached value is re-read after a write in the same transaction.
#[test]
fn test_transaction_cache_sees_own_writes() {
    let harness = Harness::new(ComponentDefinition::new(counter_class()));
    harness.get("double").unwrap();

    let (before, after) = harness
        .component
        .update(None, |state| {
            let before = state.get("double")?;
            state.set("count", json!(21))?;
            Ok((before, state.get("double")?))
        })
        .unwrap();

    assert_eq!(before, json!(0));
    assert_eq!(after, json!(42));
}

fn greeting_class() -> StateClass {
    StateClass::builder(json!({ "user": { "name": "Ada" } }))
        .getter("greeting", |state| {
            let user = state.get("user")?;
            Ok(json!(format!("Hi {}", user["name"].as_str().unwrap_or_default())))
        })
        .build()
        .unwrap()
}

/// Test that a getter reading an ancestor sees a leaf write made earlier in
/// the same transaction.
#[test]
fn test_leaf_write_refreshes_ancestor_reader_in_transaction() {
    let harness = Harness::new(ComponentDefinition::new(greeting_class()).path("user.name"));

    let (before, after) = harness
        .component
        .update(None, |state| {
            let before = state.get("greeting")?;
            state.set("user.name", json!("Grace"))?;
            Ok((before, state.get("greeting")?))
        })
        .unwrap();

    assert_eq!(before, json!("Hi Ada"));
    assert_eq!(after, json!("Hi Grace"));
}

/// Test that a leaf write notifies bindings on its ancestors and on getters
/// that read an ancestor, without touching the ancestor's other children.
#[test]
fn test_leaf_write_notifies_ancestor_bindings() {
    let class = StateClass::builder(json!({ "user": { "name": "Ada", "age": 36 } }))
        .getter("greeting", |state| {
            let user = state.get("user")?;
            Ok(json!(format!("Hi {}", user["name"].as_str().unwrap_or_default())))
        })
        .build()
        .unwrap();
    let harness = Harness::new(ComponentDefinition::new(class).paths(["user.name", "user.age"]));
    harness.bind("user").unwrap();
    harness.bind("user.age").unwrap();
    harness.bind("greeting").unwrap();
    harness.get("greeting").unwrap();

    harness.set("user.name", json!("Grace")).unwrap();
    harness.flush().unwrap();

    assert_eq!(
        harness.log.values_for("user"),
        vec![json!({ "name": "Grace", "age": 36 })]
    );
    assert_eq!(harness.log.values_for("greeting"), vec![json!("Hi Grace")]);
    assert!(harness.log.values_for("user.age").is_empty());
    assert_eq!(harness.log.batches().len(), 1);
}

/// Test that a getter under two wildcard levels fans out over every inner
/// element of every outer element.
#[test]
fn test_nested_wildcard_dependents_fan_out() {
    let class = StateClass::builder(json!({
        "groups": [
            { "items": [{ "name": "a" }, { "name": "b" }] },
            { "items": [{ "name": "c" }] },
        ],
        "suffix": "!",
    }))
    .getter("groups.*.items.*.label", |state| {
        let name = state.get("groups.*.items.*.name")?;
        let suffix = state.get("suffix")?;
        Ok(json!(format!(
            "{}{}",
            name.as_str().unwrap_or_default(),
            suffix.as_str().unwrap_or_default()
        )))
    })
    .build()
    .unwrap();
    let harness = Harness::new(
        ComponentDefinition::new(class)
            .list("groups")
            .list("groups.*.items")
            .paths(["groups.*.items.*.name", "groups.*.items.*.label"]),
    );
    harness.render_all().unwrap();

    let groups = harness.component.state_ref("groups", None).unwrap();
    for group in harness.component.get_list_indexes(&groups).unwrap() {
        let items = harness
            .component
            .state_ref("groups.*.items", Some(group))
            .unwrap();
        for item in harness.component.get_list_indexes(&items).unwrap() {
            let label = harness
                .component
                .state_ref("groups.*.items.*.label", Some(item))
                .unwrap();
            harness
                .component
                .create_readonly_state(|state| state.get_ref(&label))
                .unwrap();
            harness.bind_ref(label);
        }
    }

    harness.set("suffix", json!("?")).unwrap();
    harness.flush().unwrap();

    let mut labels = harness.log.values_for("groups.*.items.*.label");
    labels.sort_by_key(|v| v.to_string());
    assert_eq!(labels, vec![json!("a?"), json!("b?"), json!("c?")]);
}
