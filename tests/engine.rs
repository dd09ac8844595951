//! End-to-end tests driving the engine the way a host would: mount markup,
//! dispatch events, advance the clock, read the document back.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::{Value, json};
use weft::{Engine, Router, TemplateLoader, Translator};

fn first(engine: &Engine, tag: &str) -> weft::NodeId {
    engine.find_by_tag(tag)[0]
}

// =============================================================================
// State, Bindings, Events
// =============================================================================

#[test]
fn test_counter_round_trip() {
    let engine = Engine::new();
    engine
        .mount(
            r#"
            <div state="{count: 0}">
                <span bind="count"></span>
                <button on:click="count++">+1</button>
            </div>
            "#,
        )
        .unwrap();
    let span = first(&engine, "span");
    assert_eq!(engine.text_of(span), "0");

    let button = first(&engine, "button");
    engine.dispatch(button, "click", Value::Null);
    assert_eq!(engine.text_of(span), "1");
    engine.dispatch(button, "click", Value::Null);
    assert_eq!(engine.text_of(span), "2");
}

#[test]
fn test_one_increment_feeds_many_bindings() {
    let engine = Engine::new();
    engine
        .mount(
            r#"
            <div state="{count: 0}">
                <em bind="count"></em>
                <strong bind="count + 100"></strong>
                <button on:click="count++">+1</button>
            </div>
            "#,
        )
        .unwrap();
    engine.dispatch(first(&engine, "button"), "click", Value::Null);
    // The handler evaluated exactly once; both bindings observe it.
    assert_eq!(engine.text_of(first(&engine, "em")), "1");
    assert_eq!(engine.text_of(first(&engine, "strong")), "101");
}

#[test]
fn test_child_scope_shadows_parent() {
    let engine = Engine::new();
    engine
        .mount(
            r#"
            <div state="{name: 'outer', shared: 'up'}">
                <p bind="name"></p>
                <section state="{name: 'inner'}">
                    <span bind="name"></span>
                    <em bind="shared"></em>
                </section>
            </div>
            "#,
        )
        .unwrap();
    assert_eq!(engine.text_of(first(&engine, "p")), "outer");
    assert_eq!(engine.text_of(first(&engine, "span")), "inner");
    assert_eq!(engine.text_of(first(&engine, "em")), "up");
}

#[test]
fn test_unknown_name_renders_empty() {
    let engine = Engine::new();
    engine
        .mount(r#"<div state="{}"><p bind="nope.deep.path"></p></div>"#)
        .unwrap();
    assert_eq!(engine.text_of(first(&engine, "p")), "");
}

#[test]
fn test_computed_follows_dependencies() {
    let engine = Engine::new();
    engine
        .mount(
            r#"
            <div state="{a: 10, b: 20}" computed="sum" expr="a + b">
                <p bind="sum"></p>
            </div>
            "#,
        )
        .unwrap();
    let p = first(&engine, "p");
    assert_eq!(engine.text_of(p), "30");

    engine.assign_at(p, "a", json!(5));
    assert_eq!(engine.text_of(p), "25");
}

#[test]
fn test_on_init_runs_before_descendant_bindings() {
    let engine = Engine::new();
    engine
        .mount(
            r#"
            <div state="{n: 5}" on:init="n = n * 2">
                <span bind="n"></span>
            </div>
            "#,
        )
        .unwrap();
    assert_eq!(engine.text_of(first(&engine, "span")), "10");
}

// =============================================================================
// Filters
// =============================================================================

#[test]
fn test_filter_pipeline() {
    let engine = Engine::new();
    engine
        .mount(
            r#"
            <div state="{name: '  ada lovelace  '}">
                <p bind="name | trim | uppercase"></p>
                <em bind="name | trim | capitalize"></em>
                <span bind="missing | default: 'n/a'"></span>
            </div>
            "#,
        )
        .unwrap();
    assert_eq!(engine.text_of(first(&engine, "p")), "ADA LOVELACE");
    assert_eq!(engine.text_of(first(&engine, "em")), "Ada Lovelace");
    assert_eq!(engine.text_of(first(&engine, "span")), "n/a");
}

#[test]
fn test_unknown_filter_passes_value_through() {
    let engine = Engine::new();
    engine
        .mount(r#"<div state="{x: 'keep'}"><p bind="x | nosuchfilter"></p></div>"#)
        .unwrap();
    assert_eq!(engine.text_of(first(&engine, "p")), "keep");
}

#[test]
fn test_custom_filter_registration() {
    let engine = Engine::new();
    engine.register_filter(
        "shout",
        Rc::new(|value, _| Value::String(format!("{}!", weft::value::display(value)))),
    );
    engine
        .mount(r#"<div state="{x: 'hey'}"><p bind="x | shout"></p></div>"#)
        .unwrap();
    assert_eq!(engine.text_of(first(&engine, "p")), "hey!");
}

#[test]
fn test_filter_replacement_applies_to_subsequent_evaluations() {
    let engine = Engine::new();
    engine.register_filter(
        "mark",
        Rc::new(|value, _| Value::String(format!("<{}>", weft::value::display(value)))),
    );
    engine
        .mount(
            r#"
            <div state="{x: 'a'}">
                <p bind="x | mark"></p>
                <button on:click="x = 'b'">set</button>
            </div>
            "#,
        )
        .unwrap();
    let p = first(&engine, "p");
    assert_eq!(engine.text_of(p), "<a>");

    engine.register_filter(
        "mark",
        Rc::new(|value, _| Value::String(format!("[{}]", weft::value::display(value)))),
    );
    // Replacement does not retroactively re-render; it takes effect when
    // the binding next evaluates.
    assert_eq!(engine.text_of(p), "<a>");
    engine.dispatch(first(&engine, "button"), "click", Value::Null);
    assert_eq!(engine.text_of(p), "[b]");
}

#[test]
fn test_validator_registration_and_replacement() {
    let engine = Engine::new();
    engine.register_validator(
        "min",
        Rc::new(|value, args| {
            let floor = args.first().and_then(Value::as_f64).unwrap_or(0.0);
            Value::Bool(value.as_f64().is_some_and(|v| v >= floor))
        }),
    );
    assert_eq!(
        engine.validate("min", &json!(5), &[json!(3)]),
        Value::Bool(true)
    );
    assert_eq!(
        engine.validate("min", &json!(2), &[json!(3)]),
        Value::Bool(false)
    );

    // Re-registering replaces the rule for subsequent checks.
    engine.register_validator("min", Rc::new(|_, _| Value::Bool(false)));
    assert_eq!(
        engine.validate("min", &json!(5), &[json!(3)]),
        Value::Bool(false)
    );
    // Unknown validators pass with a diagnostic, like unknown filters.
    assert_eq!(
        engine.validate("nope", &json!(5), &[]),
        Value::Bool(true)
    );
}

// =============================================================================
// Control Flow
// =============================================================================

#[test]
fn test_if_else_chain_renders_one_branch() {
    let engine = Engine::new();
    engine
        .mount(
            r#"
            <div state="{mode: 'a'}">
                <p if="mode == 'a'">A</p>
                <p else-if="mode == 'b'">B</p>
                <p else>C</p>
            </div>
            "#,
        )
        .unwrap();
    let div = first(&engine, "div");
    assert_eq!(engine.find_by_tag("p").len(), 1);
    assert_eq!(engine.text_of(div), "A");

    engine.assign_at(div, "mode", json!("b"));
    assert_eq!(engine.find_by_tag("p").len(), 1);
    assert_eq!(engine.text_of(div), "B");

    engine.assign_at(div, "mode", json!("zzz"));
    assert_eq!(engine.text_of(div), "C");
}

#[test]
fn test_deactivated_branch_is_fully_destroyed() {
    let engine = Engine::new();
    engine
        .mount(
            r#"
            <div state="{on: true, n: 0}">
                <p if="on"><span bind="n"></span></p>
            </div>
            "#,
        )
        .unwrap();
    let div = first(&engine, "div");
    assert_eq!(engine.find_by_tag("span").len(), 1);

    engine.assign_at(div, "on", json!(false));
    assert!(engine.find_by_tag("span").is_empty());
    // Writes to cells the dead branch watched are harmless no-ops.
    engine.assign_at(div, "n", json!(42));
    assert!(engine.find_by_tag("span").is_empty());

    engine.assign_at(div, "on", json!(true));
    assert_eq!(engine.text_of(first(&engine, "span")), "42");
}

#[test]
fn test_switch_picks_matching_case() {
    let engine = Engine::new();
    engine
        .mount(
            r#"
            <div state="{tab: 'one'}">
                <section switch="tab">
                    <p case="'one'">1</p>
                    <p case="'two'">2</p>
                    <p else>other</p>
                </section>
            </div>
            "#,
        )
        .unwrap();
    let section = first(&engine, "section");
    assert_eq!(engine.text_of(section), "1");

    engine.assign_at(section, "tab", json!("two"));
    assert_eq!(engine.text_of(section), "2");

    engine.assign_at(section, "tab", json!("nope"));
    assert_eq!(engine.text_of(section), "other");
}

#[test]
fn test_show_toggles_visibility_not_structure() {
    let engine = Engine::new();
    engine
        .mount(r#"<div state="{open: false}"><p show="open">peek</p></div>"#)
        .unwrap();
    assert_eq!(engine.find_by_tag("p").len(), 1);
    assert!(engine.html().contains("display: none"));

    engine.assign_at(first(&engine, "div"), "open", json!(true));
    assert!(!engine.html().contains("display: none"));
}

// =============================================================================
// Lists
// =============================================================================

#[test]
fn test_each_renders_items_in_order() {
    let engine = Engine::new();
    engine
        .mount(
            r#"
            <ul state="{items: ['a', 'b', 'c']}">
                <li each="x in items" bind="x + $index"></li>
            </ul>
            "#,
        )
        .unwrap();
    assert_eq!(engine.find_by_tag("li").len(), 3);
    assert_eq!(engine.text_of(first(&engine, "ul")), "a0b1c2");
}

#[test]
fn test_each_recycles_positionally() {
    let engine = Engine::new();
    engine
        .mount(
            r#"
            <ul state="{items: ['a', 'b', 'c']}">
                <li each="x in items" bind="x"></li>
            </ul>
            "#,
        )
        .unwrap();
    let ul = first(&engine, "ul");
    let before: Vec<_> = engine.find_by_tag("li");

    // Head removal: surviving slots shift their values, the tail slot dies.
    engine.assign_at(ul, "items", json!(["b", "c"]));
    let after: Vec<_> = engine.find_by_tag("li");
    assert_eq!(after.len(), 2);
    assert_eq!(after, before[..2].to_vec());
    assert_eq!(engine.text_of(ul), "bc");

    // Growth clones fresh slots at the tail.
    engine.assign_at(ul, "items", json!(["b", "c", "d", "e"]));
    assert_eq!(engine.find_by_tag("li").len(), 4);
    assert_eq!(engine.text_of(ul), "bcde");
}

#[test]
fn test_each_exposes_loop_locals() {
    let engine = Engine::new();
    engine
        .mount(
            r#"
            <ul state="{items: ['x', 'y', 'z']}">
                <li each="item in items" bind="$first ? 'F' : ($last ? 'L' : 'M')"></li>
            </ul>
            "#,
        )
        .unwrap();
    assert_eq!(engine.text_of(first(&engine, "ul")), "FML");
}

#[test]
fn test_foreach_filters_sorts_and_limits_in_fixed_order() {
    let engine = Engine::new();
    engine
        .mount(
            r#"
            <ul state="{nums: [5, 1, 4, 2, 3]}">
                <li foreach="n" from="nums" filter="n > 1" sort="n" limit="3" bind="n"></li>
            </ul>
            "#,
        )
        .unwrap();
    // filter [5,4,2,3] -> sort [2,3,4,5] -> limit [2,3,4]
    assert_eq!(engine.text_of(first(&engine, "ul")), "234");
}

#[test]
fn test_each_over_non_iterable_renders_nothing() {
    let engine = Engine::new();
    engine.set_debug(true);
    let kinds = Rc::new(RefCell::new(Vec::new()));
    let sink = kinds.clone();
    engine.on_diagnostic(Rc::new(move |error| {
        sink.borrow_mut().push(error.kind());
    }));
    engine
        .mount(r#"<ul state="{items: 7}"><li each="x in items" bind="x"></li></ul>"#)
        .unwrap();
    // Zero items, no error: a scalar collection is not a broken binding.
    assert!(engine.find_by_tag("li").is_empty());
    assert!(kinds.borrow().is_empty());
}

// =============================================================================
// Events: Modifiers, Bubbling, Debounce
// =============================================================================

#[test]
fn test_stop_and_once_modifiers() {
    let engine = Engine::new();
    engine
        .mount(
            r#"
            <div state="{n: 0}">
                <section on:click="n = n + 10">
                    <button on:click.stop.once="n++">x</button>
                </section>
            </div>
            "#,
        )
        .unwrap();
    let button = first(&engine, "button");
    let span = first(&engine, "section");

    // First click: button handler runs, propagation stops.
    engine.dispatch(button, "click", Value::Null);
    assert_eq!(engine.eval_at(span, "n"), json!(1));

    // Second click: the once-armed handler is spent, so the event bubbles.
    engine.dispatch(button, "click", Value::Null);
    assert_eq!(engine.eval_at(span, "n"), json!(11));
}

#[test]
fn test_prevent_marks_dispatch_result() {
    let engine = Engine::new();
    engine
        .mount(r#"<form state="{}" on:submit.prevent="x = 1">go</form>"#)
        .unwrap();
    let form = first(&engine, "form");
    assert!(engine.dispatch(form, "submit", Value::Null).prevented);
    assert!(!engine.dispatch(form, "focus", Value::Null).prevented);
}

#[test]
fn test_event_payload_is_in_scope() {
    let engine = Engine::new();
    engine
        .mount(r#"<div state="{last: ''}" on:custom="last = $event.detail"></div>"#)
        .unwrap();
    let div = first(&engine, "div");
    engine.dispatch(div, "custom", json!({"detail": "hello"}));
    assert_eq!(engine.eval_at(div, "last"), json!("hello"));
}

#[test]
fn test_debounce_coalesces_on_the_virtual_clock() {
    let engine = Engine::new();
    engine
        .mount(r#"<div state="{q: 0}"><input on:input.debounce(300)="q++"></div>"#)
        .unwrap();
    let input = first(&engine, "input");
    let div = first(&engine, "div");

    engine.dispatch(input, "input", Value::Null);
    engine.dispatch(input, "input", Value::Null);
    assert_eq!(engine.eval_at(div, "q"), json!(0));

    engine.advance(299);
    assert_eq!(engine.eval_at(div, "q"), json!(0));
    engine.advance(1);
    assert_eq!(engine.eval_at(div, "q"), json!(1));
    engine.advance(1000);
    assert_eq!(engine.eval_at(div, "q"), json!(1));
}

// =============================================================================
// Two-Way Binding
// =============================================================================

#[test]
fn test_model_text_input() {
    let engine = Engine::new();
    engine
        .mount(
            r#"
            <div state="{name: 'ada'}">
                <input model="name">
                <p bind="name"></p>
            </div>
            "#,
        )
        .unwrap();
    let input = first(&engine, "input");
    assert_eq!(engine.value_of(input), json!("ada"));

    engine.dispatch(input, "input", json!("grace"));
    assert_eq!(engine.text_of(first(&engine, "p")), "grace");
    assert_eq!(engine.value_of(input), json!("grace"));
}

#[test]
fn test_model_checkbox_coerces_to_bool() {
    let engine = Engine::new();
    engine
        .mount(r#"<div state="{done: false}"><input type="checkbox" model="done"></div>"#)
        .unwrap();
    let input = first(&engine, "input");
    assert_eq!(engine.value_of(input), json!(false));

    engine.dispatch(input, "input", json!(true));
    assert_eq!(engine.eval_at(input, "done"), json!(true));
    assert_eq!(engine.value_of(input), json!(true));
}

// =============================================================================
// Classes, Styles, Attributes
// =============================================================================

#[test]
fn test_class_and_style_directives() {
    let engine = Engine::new();
    engine
        .mount(
            r#"
            <div state="{active: true}">
                <p class="base" class-active="active" style-color="active ? 'red' : ''">x</p>
            </div>
            "#,
        )
        .unwrap();
    assert!(engine.html().contains(r#"class="base active""#));
    assert!(engine.html().contains("color: red"));

    engine.assign_at(first(&engine, "div"), "active", json!(false));
    assert!(engine.html().contains(r#"class="base""#));
    assert!(!engine.html().contains("color: red"));
}

#[test]
fn test_class_object_form_diffs_cleanly() {
    let engine = Engine::new();
    engine
        .mount(r#"<div state="{flag: true}"><p class="{on: flag, off: !flag}">x</p></div>"#)
        .unwrap();
    assert!(engine.html().contains(r#"class="on""#));

    engine.assign_at(first(&engine, "div"), "flag", json!(false));
    assert!(engine.html().contains(r#"class="off""#));
    assert!(!engine.html().contains("on off"));
}

#[test]
fn test_bound_attribute_add_and_remove() {
    let engine = Engine::new();
    engine
        .mount(r#"<div state="{url: null}"><a bind-href="url">link</a></div>"#)
        .unwrap();
    assert!(!engine.html().contains("href"));

    engine.assign_at(first(&engine, "a"), "url", json!("/docs"));
    assert!(engine.html().contains(r#"href="/docs""#));

    engine.assign_at(first(&engine, "a"), "url", json!(false));
    assert!(!engine.html().contains("href"));
}

// =============================================================================
// Templates & Slots
// =============================================================================

#[test]
fn test_inline_template_inclusion() {
    let engine = Engine::new();
    engine
        .mount(
            r#"
            <template id="greeting"><p bind="who"></p></template>
            <div state="{who: 'world'}" template="greeting"></div>
            "#,
        )
        .unwrap();
    assert_eq!(engine.text_of(first(&engine, "div")), "world");
}

#[test]
fn test_use_projects_slots_with_fallback() {
    let engine = Engine::new();
    engine
        .mount(
            r#"
            <template id="card">
                <div class="card"><h1><slot name="title">Untitled</slot></h1><slot></slot></div>
            </template>
            <section state="{}">
                <article use="card">
                    <span slot="title">Hello</span>
                    <p>Body</p>
                </article>
                <article use="card"><p>Only body</p></article>
            </section>
            "#,
        )
        .unwrap();
    let articles = engine.find_by_tag("article");
    assert_eq!(engine.text_of(articles[0]), "HelloBody");
    assert_eq!(engine.text_of(articles[1]), "UntitledOnly body");
}

#[test]
fn test_use_var_seeds_component_scope() {
    let engine = Engine::new();
    engine
        .mount(
            r#"
            <template id="badge"><em bind="label"></em></template>
            <div state="{n: 41}">
                <span use="badge" var="label: n + 1"></span>
            </div>
            "#,
        )
        .unwrap();
    assert_eq!(engine.text_of(first(&engine, "em")), "42");
}

#[test]
fn test_missing_template_is_inert() {
    let engine = Engine::new();
    engine
        .mount(r#"<div state="{}"><p use="ghost"><span>kept</span></p></div>"#)
        .unwrap();
    // Invocation content stays when the fragment is unknown.
    assert_eq!(engine.text_of(first(&engine, "p")), "kept");
}

struct RecordingLoader {
    log: RefCell<Vec<String>>,
}

impl TemplateLoader for RecordingLoader {
    fn fetch(&self, url: &str) -> Result<String, String> {
        self.log.borrow_mut().push(url.to_string());
        Ok(format!("<p>from {url}</p>"))
    }
}

#[test]
fn test_two_phase_remote_loading() {
    let engine = Engine::new();
    let loader = Rc::new(RecordingLoader {
        log: RefCell::new(Vec::new()),
    });
    engine.set_template_loader(loader.clone());
    engine
        .mount(
            r#"
            <template id="hero" src="/t/hero" priority></template>
            <template id="extra" src="/t/extra"></template>
            <div state="{}" template="hero"></div>
            "#,
        )
        .unwrap();
    // Phase 1 blocked on the priority template only, and it rendered.
    assert_eq!(*loader.log.borrow(), vec!["/t/hero"]);
    assert_eq!(engine.text_of(first(&engine, "div")), "from /t/hero");

    // Phase 2 drains on clock advance, exactly once.
    engine.advance(1);
    assert_eq!(*loader.log.borrow(), vec!["/t/hero", "/t/extra"]);
    engine.advance(1);
    assert_eq!(loader.log.borrow().len(), 2);
}

// =============================================================================
// Store, Refs, Router, i18n
// =============================================================================

#[test]
fn test_store_is_globally_visible_and_reactive() {
    let engine = Engine::new();
    engine
        .mount(
            r#"
            <div state="{}" store="theme" value="'dark'">
                <p bind="$store.theme"></p>
            </div>
            "#,
        )
        .unwrap();
    assert_eq!(engine.text_of(first(&engine, "p")), "dark");

    engine.store_set("theme", json!("light"));
    assert_eq!(engine.text_of(first(&engine, "p")), "light");
    assert_eq!(engine.store_get("theme"), json!("light"));
}

#[test]
fn test_ref_registers_and_unregisters() {
    let engine = Engine::new();
    engine
        .mount(
            r#"
            <div state="{on: true}">
                <section if="on"><canvas ref="screen"></canvas></section>
            </div>
            "#,
        )
        .unwrap();
    let canvas = first(&engine, "canvas");
    assert_eq!(engine.ref_node("screen"), Some(canvas));

    engine.assign_at(first(&engine, "div"), "on", json!(false));
    assert_eq!(engine.ref_node("screen"), None);
}

#[test]
fn test_router_updates_ambient_route() {
    let engine = Engine::new();
    let router = Router::new(&engine);
    router.register("/users/:id", &[]);
    engine
        .mount(
            r#"
            <div state="{}">
                <p bind="$route.path"></p>
                <span bind="$route.params.id"></span>
                <em bind="$route.query.tab"></em>
            </div>
            "#,
        )
        .unwrap();
    assert_eq!(engine.text_of(first(&engine, "p")), "");

    router.push("/users/7?tab=info");
    assert_eq!(engine.text_of(first(&engine, "p")), "/users/7");
    assert_eq!(engine.text_of(first(&engine, "span")), "7");
    assert_eq!(engine.text_of(first(&engine, "em")), "info");
}

struct BracketTranslator;

impl Translator for BracketTranslator {
    fn translate(&self, key: &str, _params: &Value) -> Value {
        Value::String(format!("[{key}]"))
    }
}

#[test]
fn test_translation_falls_back_to_key() {
    let engine = Engine::new();
    engine
        .mount(r#"<div state="{}"><h1 t="home.title">x</h1></div>"#)
        .unwrap();
    assert_eq!(engine.text_of(first(&engine, "h1")), "home.title");

    engine.set_translator(Rc::new(BracketTranslator));
    assert_eq!(engine.text_of(first(&engine, "h1")), "[home.title]");
}

// =============================================================================
// Extension Points
// =============================================================================

#[test]
fn test_custom_directive_replaces_builtin() {
    use weft::{DirectiveHooks, Flow, priority};

    let engine = Engine::new();
    engine.register_directive(
        "bind",
        priority::BIND,
        DirectiveHooks::init_only(|_, _, _| Flow::Continue),
    );
    engine
        .mount(r#"<div state="{x: 'hi'}"><p bind="x">static</p></div>"#)
        .unwrap();
    // The replacement no-op leaves the static content alone.
    assert_eq!(engine.text_of(first(&engine, "p")), "static");
}

#[test]
fn test_diagnostics_reach_subscribers_in_debug_mode() {
    let engine = Engine::new();
    engine.set_debug(true);
    let kinds = Rc::new(RefCell::new(Vec::new()));
    let sink = kinds.clone();
    engine.on_diagnostic(Rc::new(move |error| {
        sink.borrow_mut().push(error.kind());
    }));
    engine
        .mount(r#"<div state="{}"><p bind="a +"></p></div>"#)
        .unwrap();
    assert!(kinds.borrow().contains(&"expression"));
}
