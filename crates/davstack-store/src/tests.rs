#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;
    use std::rc::Rc;

    use serde::{Deserialize, Serialize};
    use serde_json::json;

    use crate::*;

    fn counter_store() -> StoreBuilder {
        store(json!({ "count": 0 })).extend(|_| {
            Extension::new().action("inc", |s, _| {
                let n = s.at("count").get().as_i64().unwrap_or(0);
                s.at("count").set(n + 1);
                Ok(Value::Null)
            })
        })
    }

    fn call_counter() -> (Rc<Cell<usize>>, impl Fn(&Value, &Value) + 'static) {
        let calls = Rc::new(Cell::new(0));
        let c = calls.clone();
        (calls, move |_: &Value, _: &Value| c.set(c.get() + 1))
    }

    #[test]
    fn test_extend_action_increments() {
        let s = counter_store().create();
        for _ in 0..3 {
            s.call("inc", &[]).unwrap();
        }
        assert_eq!(s.at("count").get(), Value::from(3));
    }

    #[test]
    fn test_nested_set() {
        let s = store(json!({ "parent": { "count": 2 } })).create();
        s.at("parent.count").set(5);
        assert_eq!(s.get().to_json(), json!({ "parent": { "count": 5 } }));
        assert_eq!(s.at("parent").at("count").get(), Value::from(5));
    }

    #[test]
    fn test_path_round_trip() {
        let s = store(json!({ "a": { "b": { "c": 1 } }, "list": [1, 2, 3] })).create();

        s.at("a.b.c").set("text");
        assert_eq!(s.at("a.b.c").get(), Value::from("text"));

        let obj = Value::from(json!({ "deep": [true, null] }));
        s.at("a.b").set(obj.clone());
        assert_eq!(s.at("a.b").get(), obj);
        assert!(s.at("a.b").get().same(&obj));

        s.at("list.1").set(20);
        assert_eq!(s.at("list").get().to_json(), json!([1, 20, 3]));
    }

    #[test]
    fn test_missing_path_reads_null() {
        let s = store(json!({ "a": 1 })).create();
        assert!(s.at("nope.deeper").get().is_null());
        assert!(!s.at("nope").exists());
    }

    #[test]
    fn test_noop_set_does_not_notify() {
        let s = store(json!({ "a": 1, "obj": { "k": 1 } })).create();
        let (calls, listener) = call_counter();
        let _sub = s.at("a").on_change(listener, OnChangeOptions::default());

        assert_eq!(s.at("a").set(1), Committed::Unchanged);
        assert_eq!(calls.get(), 0);

        let same_obj = s.at("obj").get();
        assert_eq!(s.at("obj").set(same_obj), Committed::Unchanged);

        assert_eq!(s.at("a").set(2), Committed::Written);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_structural_sharing() {
        let s = store(json!({
            "left": { "items": [1, 2] },
            "right": { "nested": { "x": 1 } },
        }))
        .create();
        let before = s.get();

        s.at("left.items.0").set(100);

        let after = s.get();
        assert!(!after.same(&before));
        assert!(after.resolve(&"right".into()).same(&before.resolve(&"right".into())));
        assert!(
            after
                .resolve(&"right.nested".into())
                .same(&before.resolve(&"right.nested".into()))
        );
        assert!(!after.resolve(&"left".into()).same(&before.resolve(&"left".into())));
    }

    #[test]
    fn test_root_set_replaces_state() {
        let s = store(json!({ "a": 1 })).create();
        s.set(json!({ "b": 2 }));
        assert_eq!(s.get().to_json(), json!({ "b": 2 }));
    }

    #[test]
    fn test_root_primitive_update() {
        let s = store(5).create();
        s.root().update(|v| *v = Value::from(v.as_i64().unwrap_or(0) + 1));
        assert_eq!(s.get(), Value::from(6));

        s.root().set_with(|v| Value::from(v.as_i64().unwrap_or(0) * 10));
        assert_eq!(s.get(), Value::from(60));
    }

    #[test]
    fn test_nested_update_and_set_with() {
        let s = store(json!({ "todos": [{ "done": false }], "meta": {} })).create();
        let meta = s.at("meta").get();

        s.at("todos").update(|todos| {
            *todos.pointer_mut(&"0.done".into()) = Value::from(true);
        });
        assert_eq!(s.at("todos.0.done").get(), Value::from(true));
        assert!(s.at("meta").get().same(&meta));

        s.at("todos").set_with(|todos| {
            let mut items = todos.as_array().map(<[Value]>::to_vec).unwrap_or_default();
            items.push(Value::from(json!({ "done": false })));
            Value::from(items)
        });
        assert_eq!(s.at("todos").get().as_array().map(<[Value]>::len), Some(2));
    }

    #[test]
    fn test_assign_merges_objects() {
        let s = store(json!({ "user": { "name": "ada", "age": 36 } })).create();
        s.at("user").assign(json!({ "age": 37, "role": "admin" }));
        assert_eq!(
            s.at("user").get().to_json(),
            json!({ "name": "ada", "age": 37, "role": "admin" })
        );

        // not an object: plain set
        s.at("user.name").assign("grace");
        assert_eq!(s.at("user.name").get(), Value::from("grace"));
    }

    #[test]
    fn test_on_change_deps_keys() {
        let s = store(json!({ "a": 1, "b": 2 })).create();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let _sub = s.root().on_change(
            {
                let seen = seen.clone();
                move |next: &Value, _: &Value| seen.borrow_mut().push(next.to_json())
            },
            OnChangeOptions::keys(["a"]),
        );

        s.at("b").set(3);
        assert!(seen.borrow().is_empty());

        s.at("a").set(5);
        s.at("a").set(5);
        s.at("a").set(6);
        assert_eq!(*seen.borrow(), vec![json!([5]), json!([6])]);
    }

    #[test]
    fn test_on_change_select_and_fire_immediately() {
        let s = store(json!({ "a": 1, "b": 2 })).create();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sub = s.root().on_change(
            {
                let seen = seen.clone();
                move |next: &Value, prev: &Value| {
                    seen.borrow_mut().push((next.clone(), prev.clone()))
                }
            },
            OnChangeOptions::select(|state| {
                let a = state.resolve(&"a".into()).as_i64().unwrap_or(0);
                let b = state.resolve(&"b".into()).as_i64().unwrap_or(0);
                Value::from(a + b)
            })
            .immediate(),
        );

        assert_eq!(*seen.borrow(), vec![(Value::from(3), Value::from(3))]);
        s.at("b").set(10);
        assert_eq!(seen.borrow()[1], (Value::from(11), Value::from(3)));

        sub.run();
        s.at("b").set(0);
        assert_eq!(seen.borrow().len(), 2);
    }

    #[test]
    fn test_computed_recompute() {
        let s = counter_store()
            .computed(|_| {
                [(
                    "doubled",
                    Computed::new(|read, _| {
                        Value::from(read.at("count").as_i64().unwrap_or(0) * 2)
                    }),
                )]
            })
            .create();
        let doubled = s.computed("doubled").unwrap();

        for n in [0, 1, -1, 7, -250] {
            s.at("count").set(n);
            assert_eq!(doubled.get(), Value::from(n * 2));
        }
    }

    #[test]
    fn test_parameterized_and_writable_computed() {
        let s = store(json!({ "items": [3, 4, 5], "celsius": 100 }))
            .computed(|_| {
                [
                    (
                        "item",
                        Computed::new(|read, input| {
                            let i = input.as_i64().unwrap_or(0) as usize;
                            read.at(Path::parse("items").child(i))
                        }),
                    ),
                    (
                        "fahrenheit",
                        Computed::new(|read, _| {
                            let c = read.at("celsius").as_f64().unwrap_or(0.0);
                            Value::from(c * 9.0 / 5.0 + 32.0)
                        })
                        .with_write(|s, f| {
                            let f = f.as_f64().unwrap_or(32.0);
                            s.at("celsius").set((f - 32.0) * 5.0 / 9.0);
                            Ok(())
                        }),
                    ),
                ]
            })
            .create();

        assert_eq!(s.computed("item").unwrap().get_for(1), Value::from(4));

        let f = s.computed("fahrenheit").unwrap();
        assert_eq!(f.get().as_f64(), Some(212.0));
        f.set(32.0).unwrap();
        assert_eq!(s.at("celsius").get().as_f64(), Some(0.0));

        let item = s.computed("item").unwrap();
        assert!(matches!(
            item.set(1),
            Err(StoreError::ReadOnlyComputed { .. })
        ));
    }

    #[test]
    fn test_computed_use_subscribes_observer() {
        let s = store(json!({ "count": 1, "unrelated": 0 }))
            .computed(|_| {
                [(
                    "doubled",
                    Computed::new(|read, _| {
                        Value::from(read.at("count").as_i64().unwrap_or(0) * 2)
                    }),
                )]
            })
            .create();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let view = observe({
            let s = s.clone();
            let seen = seen.clone();
            move || {
                let doubled = s.computed("doubled").map(|c| c.use_value()).unwrap_or_default();
                seen.borrow_mut().push(doubled);
            }
        });

        s.at("unrelated").set(1);
        s.at("count").set(4);
        assert_eq!(*seen.borrow(), vec![Value::from(2), Value::from(8)]);
        assert_eq!(view.runs(), 2);

        // get mode never subscribes
        let before = s.engine().listener_count();
        let _ = s.computed("doubled").unwrap().get();
        assert_eq!(s.engine().listener_count(), before);
    }

    #[test]
    fn test_extensions_see_earlier_layers() {
        let s = counter_store()
            .extend(|s| {
                // the earlier action is already installed
                assert!(s.member("inc").is_some());
                Extension::new().action("inc_twice", |s, _| {
                    s.call("inc", &[])?;
                    s.call("inc", &[])
                })
            })
            .create();
        s.call("inc_twice", &[]).unwrap();
        assert_eq!(s.at("count").get(), Value::from(2));
    }

    #[test]
    fn test_later_redefinition_is_visible_through_the_handle() {
        let s = counter_store()
            .extend(|_| {
                Extension::new().action("bump", |s, _| s.call("inc", &[]))
            })
            .extend(|_| {
                Extension::new().action("inc", |s, _| {
                    s.at("count").set(100);
                    Ok(Value::Null)
                })
            })
            .create();
        s.call("bump", &[]).unwrap();
        assert_eq!(s.at("count").get(), Value::from(100));
    }

    #[test]
    fn test_builder_is_immutable() {
        let base = store(json!({ "count": 0 }));
        let extended = base.extend(|_| Extension::new().value("label", "counter"));

        assert_eq!(base.definition().layer_count(), 0);
        assert_eq!(extended.definition().layer_count(), 1);
        assert!(base.create().member("label").is_none());
        assert!(matches!(
            extended.create().member("label"),
            Some(Member::Value(v)) if v == Value::from("counter")
        ));
    }

    #[test]
    fn test_nested_extensions() {
        let s = store(json!({ "form": { "first": "Ada", "last": "Lovelace" } }))
            .extend_at("form", |_| {
                Extension::new().action("clear", |form, _| {
                    form.set(json!({ "first": "", "last": "" }));
                    Ok(Value::Null)
                })
            })
            .computed_at("form", |_| {
                [(
                    "full",
                    Computed::new(|read, _| {
                        let first = read.at("first");
                        let last = read.at("last");
                        Value::from(format!(
                            "{} {}",
                            first.as_str().unwrap_or_default(),
                            last.as_str().unwrap_or_default()
                        ))
                    }),
                )]
            })
            .create();

        let form = s.at("form");
        assert_eq!(form.computed("full").unwrap().get(), Value::from("Ada Lovelace"));
        form.call("clear", &[]).unwrap();
        assert_eq!(form.computed("full").unwrap().get(), Value::from(" "));
        assert!(s.call("clear", &[]).is_err());
    }

    #[test]
    fn test_effects_lifecycle_is_idempotent() {
        let seen = Rc::new(Cell::new(0));
        let s = store(json!({ "count": 0 }))
            .effects({
                let seen = seen.clone();
                move |_| {
                    let seen = seen.clone();
                    Effects::new().effect("log", move |s| {
                        let seen = seen.clone();
                        s.at("count").on_change(
                            move |_: &Value, _: &Value| seen.set(seen.get() + 1),
                            OnChangeOptions::default(),
                        )
                    })
                }
            })
            .create();

        assert!(s.active_effects().is_empty());
        s.subscribe_to_effects();
        s.subscribe_to_effects();
        assert_eq!(s.active_effects(), vec!["log".to_string()]);

        s.at("count").set(1);
        assert_eq!(seen.get(), 1);

        s.unsubscribe_from_effects();
        s.unsubscribe_from_effects();
        s.at("count").set(2);
        assert_eq!(seen.get(), 1);
        assert_eq!(s.engine().listener_count(), 0);
    }

    #[test]
    fn test_scoped_isolation() {
        let ctx = create_store_context(counter_store().name("counter"));
        let a = ctx.mount_with(json!({ "count": 1 }));
        let b = ctx.mount_with(json!({ "count": 50 }));

        a.run(|| {
            let s = ctx.use_store().unwrap();
            s.call("inc", &[]).unwrap();
            s.call("inc", &[]).unwrap();
        });

        assert_eq!(a.store().at("count").get(), Value::from(3));
        assert_eq!(b.store().at("count").get(), Value::from(50));
        b.run(|| {
            assert_eq!(ctx.use_store().unwrap().at("count").get(), Value::from(50));
        });
    }

    #[test]
    fn test_nested_providers_resolve_innermost() {
        let ctx = create_store_context(counter_store());
        let outer = ctx.mount_with(json!({ "count": 1 }));
        let inner = ctx.mount_with(json!({ "count": 2 }));
        outer.run(|| {
            inner.run(|| {
                assert!(ctx.use_store().unwrap().ptr_eq(inner.store()));
            });
            assert!(ctx.use_store().unwrap().ptr_eq(outer.store()));
        });
    }

    #[test]
    fn test_missing_provider() {
        let ctx = create_store_context(counter_store().name("counter"));
        let err = ctx.use_store().unwrap_err();
        assert!(matches!(err, StoreError::MissingProvider { ref context } if context == "counter"));
        insta::assert_snapshot!(err.to_string(), @"`use_store` called outside of a `counter` provider");
    }

    #[test]
    fn test_provider_unmount_unsubscribes_effects() {
        let fired = Rc::new(Cell::new(0));
        let ctx = create_store_context(store(json!({ "count": 0 })).effects({
            let fired = fired.clone();
            move |_| {
                let fired = fired.clone();
                Effects::new().effect("watch", move |s| {
                    let fired = fired.clone();
                    s.at("count").on_change(
                        move |_: &Value, _: &Value| fired.set(fired.get() + 1),
                        OnChangeOptions::default(),
                    )
                })
            }
        }));

        let provider = ctx.mount();
        let s = provider.store().clone();
        assert_eq!(s.active_effects(), vec!["watch".to_string()]);
        s.at("count").set(1);
        provider.unmount();
        s.at("count").set(2);

        assert_eq!(fired.get(), 1);
        assert!(s.active_effects().is_empty());
    }

    #[test]
    fn test_scope_cleanup_on_unmount() {
        let ctx = create_store_context(store(json!({})));
        let cleaned = Rc::new(Cell::new(false));
        let (provider, ()) = ctx.provide(None, || {
            let cleaned = cleaned.clone();
            effect(move || Dispose::new(move || cleaned.set(true)));
        });
        assert!(!cleaned.get());
        drop(provider);
        assert!(cleaned.get());
    }

    #[test]
    fn test_global_store_materializes_lazily() {
        let subscribed = Rc::new(Cell::new(0));
        let global = GlobalStore::new(store(json!({ "n": 0 })).effects({
            let subscribed = subscribed.clone();
            move |_| {
                let subscribed = subscribed.clone();
                Effects::new().effect("boot", move |_| {
                    subscribed.set(subscribed.get() + 1);
                    Dispose::noop()
                })
            }
        }));

        assert!(!global.is_materialized());
        global.at("n").set(1);
        assert!(global.is_materialized());
        global.at("n").set(2);
        assert_eq!(global.instance().at("n").get(), Value::from(2));
        assert_eq!(subscribed.get(), 1);
    }

    #[test]
    fn test_deferred_initial_state() {
        let def = store_deferred();
        assert!(def.definition().initial_state().is_none());
        assert!(def.create().get().is_null());
        let s = def.create_with(json!({ "ready": true }));
        assert_eq!(s.at("ready").get(), Value::from(true));
    }

    #[test]
    fn test_router_dispatch() {
        let s = counter_store()
            .computed(|_| {
                [(
                    "doubled",
                    Computed::new(|read, _| {
                        Value::from(read.at("count").as_i64().unwrap_or(0) * 2)
                    }),
                )]
            })
            .create();
        let router = s.router();

        assert!(matches!(router.prop("inc"), Property::Member(Member::Action(_))));
        assert!(matches!(router.prop("then"), Property::Absent));
        assert!(matches!(router.prop("constructor"), Property::Route(_)));

        router.route("inc").invoke(Args::new()).unwrap();
        router.route("count.set").invoke(Args::new().arg(4)).unwrap();
        let doubled = router.route("doubled.get").invoke(Args::new()).unwrap();
        assert_eq!(doubled.into_value(), Some(Value::from(8)));

        // computed members route on to their get/use operations
        let doubled = walk(walk(router.prop("doubled")).prop("get"));
        assert_eq!(doubled.invoke(Args::new()).unwrap().into_value(), Some(Value::from(8)));

        let seen = Rc::new(Cell::new(0));
        let sub = router
            .route("count.onChange")
            .invoke(Args::new().listener({
                let seen = seen.clone();
                move |_: &Value, _: &Value| seen.set(seen.get() + 1)
            }))
            .unwrap()
            .into_subscription()
            .unwrap();
        s.at("count").set(9);
        sub.run();
        s.at("count").set(10);
        assert_eq!(seen.get(), 1);
    }

    fn walk(property: Property) -> PathRouter {
        match property {
            Property::Route(next) => next,
            other => panic!("expected a route, got {other:?}"),
        }
    }

    #[test]
    fn test_router_walks_array_elements() {
        let s = store(json!({ "items": [1, 2, 3] })).create();
        let item = walk(walk(s.router().prop("items")).prop("1"));

        let got = walk(item.prop("get")).invoke(Args::new()).unwrap();
        assert_eq!(got.into_value(), Some(Value::from(2)));

        walk(item.prop("set")).invoke(Args::new().arg(9)).unwrap();
        assert_eq!(s.get().to_json(), json!({ "items": [1, 9, 3] }));

        // explicit string keys reach array elements too
        let by_key = s.at(Path::from_iter([
            Segment::Key("items".into()),
            Segment::Key("2".into()),
        ]));
        by_key.set(30);
        assert_eq!(s.get().to_json(), json!({ "items": [1, 9, 30] }));
    }

    #[test]
    fn test_zero_padded_keys_round_trip() {
        let s = store(json!({ "ids": { "007": "bond", "7": "seven" } })).create();
        assert_eq!(s.at("ids.007").get(), Value::from("bond"));

        s.at("ids.007").set("q");
        assert_eq!(s.get().to_json(), json!({ "ids": { "007": "q", "7": "seven" } }));

        let routed = walk(walk(walk(s.router().prop("ids")).prop("007")).prop("get"));
        assert_eq!(routed.invoke(Args::new()).unwrap().into_value(), Some(Value::from("q")));
    }

    #[test]
    fn test_router_rejects_unknown_operations() {
        let s = store(json!({ "count": 0 })).create();
        let err = s.router().route("count.sett").invoke(Args::new().arg(1)).unwrap_err();
        assert!(matches!(
            err,
            StoreError::UnrecognizedOperation { ref op, ref path } if op == "sett" && path == "count"
        ));
        assert!(matches!(
            s.router().route("count.set").invoke(Args::new()),
            Err(StoreError::InvalidArguments { .. })
        ));
        assert!("nope".parse::<AccessorOp>().is_err());
        assert_eq!("onChange".parse::<AccessorOp>().unwrap(), AccessorOp::OnChange);
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Profile {
        name: String,
        tags: Vec<String>,
    }

    #[test]
    fn test_typed_access_through_serde() {
        let s = store(json!({ "profile": null })).create();
        let profile = Profile {
            name: "ada".into(),
            tags: vec!["math".into()],
        };
        s.at("profile").set_serde(&profile).unwrap();
        assert_eq!(s.at("profile").get_as::<Profile>().unwrap(), profile);
        assert!(s.at("profile.name").get_as::<i64>().is_err());
        insta::assert_snapshot!(s.get().to_string(), @r#"{"profile":{"name":"ada","tags":["math"]}}"#);
    }

    #[derive(Default)]
    struct MemoryStorage(RefCell<HashMap<String, String>>);

    impl StateStorage for MemoryStorage {
        fn get_item(&self, key: &str) -> Option<String> {
            self.0.borrow().get(key).cloned()
        }
        fn set_item(&self, key: &str, value: &str) {
            self.0.borrow_mut().insert(key.to_string(), value.to_string());
        }
        fn remove_item(&self, key: &str) {
            self.0.borrow_mut().remove(key);
        }
    }

    #[test]
    fn test_persistence_round_trip() {
        let storage = Rc::new(MemoryStorage::default());
        let def = store(json!({ "theme": "dark", "volume": 3 }))
            .name("settings")
            .persist(storage.clone());

        let first = def.create();
        first.at("volume").set(7);
        assert_eq!(
            storage.get_item("settings").as_deref(),
            Some(r#"{"theme":"dark","volume":7}"#)
        );

        let second = def.create();
        assert_eq!(second.at("volume").get(), Value::from(7));

        second.clear_persisted();
        assert!(storage.get_item("settings").is_none());
    }

    #[test]
    fn test_host_values_are_replaced_not_drafted() {
        struct Player {
            id: u32,
        }
        let s = store(json!({ "player": null })).create();
        s.at("player").set(Value::host(Player { id: 1 }));
        s.at("player").update(|p| {
            let next = p.as_host::<Player>().map(|p| p.id + 1).unwrap_or(0);
            *p = Value::host(Player { id: next });
        });
        let id = s.at("player").get_with(|p| p.as_host::<Player>().map(|p| p.id));
        assert_eq!(id, Some(2));
    }
}
