use std::cell::Cell;
use std::rc::Rc;

use anyhow::Context as _;
use davstack_service::{AuthContext, Router, require_user, service};
use davstack_store::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Serialize, Deserialize)]
struct Todo {
    title: String,
    done: bool,
}

fn counter() -> StoreBuilder {
    store(json!({ "count": 0, "step": 1 }))
        .name("counter")
        .actions(|_| {
            Extension::new()
                .action("inc", |s, _| {
                    let step = s.at("step").get().as_i64().unwrap_or(1);
                    s.at("count").set_with(move |n| Value::from(n.as_i64().unwrap_or(0) + step));
                    Ok(Value::Null)
                })
                .action("reset", |s, _| {
                    s.at("count").set(0);
                    Ok(Value::Null)
                })
        })
        .computed(|_| {
            [(
                "parity",
                Computed::new(|read, _| {
                    let n = read.at("count").as_i64().unwrap_or(0);
                    Value::from(match n {
                        n if n < 0 => "negative",
                        0 => "zero",
                        n if n % 2 == 0 => "even",
                        _ => "odd",
                    })
                }),
            )]
        })
        .effects(|_| {
            Effects::new().effect("log-count", |s| {
                s.at("count").on_change(
                    |next: &Value, prev: &Value| log::info!("count {prev} -> {next}"),
                    OnChangeOptions::default(),
                )
            })
        })
}

fn todos() -> StoreBuilder {
    store(json!({ "items": [], "filter": "all" })).name("todos")
}

#[derive(Clone, Default)]
struct RequestCtx {
    user: Option<String>,
}

impl AuthContext for RequestCtx {
    fn user_id(&self) -> Option<&str> {
        self.user.as_deref()
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    // global instance
    let global = GlobalStore::new(counter());
    for _ in 0..3 {
        global.instance().call("inc", &[])?;
    }
    let parity = global.instance().computed("parity")?;
    println!("global count = {}, {}", global.at("count").get(), parity.get());

    // a view that re-renders when `count` changes
    let renders = Rc::new(Cell::new(0));
    let view = observe({
        let s = global.instance().clone();
        let renders = renders.clone();
        move || {
            let count = s.at("count").use_value();
            renders.set(renders.get() + 1);
            println!("  render #{}: count = {count}", renders.get());
        }
    });
    global.at("step").set(5);
    global.instance().call("inc", &[])?;
    drop(view);

    // one instance per provider
    let ctx = create_store_context(counter());
    let left = ctx.mount_with(json!({ "count": 10 }));
    let right = ctx.mount_with(json!({ "count": -3 }));
    left.run(|| -> anyhow::Result<()> {
        let s = ctx.use_store()?;
        s.call("inc", &[])?;
        Ok(())
    })?;
    for (label, provider) in [("left", &left), ("right", &right)] {
        let s = provider.store();
        let parity = s.computed("parity")?.get();
        println!("{label}: count = {}, {parity}", s.at("count").get());
    }
    right.unmount();

    // typed values through serde
    let list = todos().create();
    list.at("items").set_serde(&vec![Todo {
        title: "write docs".into(),
        done: false,
    }])?;
    list.at("items.0.done").set(true);
    let items: Vec<Todo> = list.at("items").get_as()?;
    println!("todos: {items:?}");

    // procedures validate input; the caller applies the result
    let router = Router::new().procedure(
        "todos.add",
        service::<RequestCtx>()
            .middleware(require_user)
            .input::<Todo>()
            .output::<Todo>()
            .mutation(|_, todo| Ok(todo)),
    );
    let added = router
        .call_json(
            "todos.add",
            RequestCtx {
                user: Some("ada".into()),
            },
            json!({ "title": "ship", "done": false }),
        )
        .context("calling todos.add")?;
    list.at("items").update(move |items| {
        let len = items.as_array().map_or(0, <[Value]>::len);
        *items.pointer_mut(&Path::from(len)) = Value::from(added);
    });
    println!("todos: {}", list.at("items").get());

    let anonymous = router.call_json("todos.add", RequestCtx::default(), json!({ "title": "x", "done": false }));
    if let Err(e) = anonymous {
        println!("anonymous call rejected: {e}");
    }

    Ok(())
}
