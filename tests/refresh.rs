use realtime_templates::{Change, CollectionRef, ObjectRef, Value};
use serde_json::json;

mod fixture_;
use fixture_::{collection, data, descendants, html, mount, named, record_events};

fn page() -> serde_json::Value {
	json!({
		"elements": [
			{"tag": "h1", "bind": ".title"},
			{"tag": "ul", "children": [{"template": "item"}]},
		],
		"templates": {"item": {"query": ".items", "elements": [{"tag": "li", "bind": ".name"}]}},
	})
}

fn page_data() -> ObjectRef {
	ObjectRef::with_fields([
		("title", Value::from("Groceries")),
		("items", CollectionRef::from_items([named("milk").into(), named("eggs").into()]).into()),
	])
}

#[test]
fn identical_refresh_keeps_every_node() {
	let mut binder = mount(page(), page_data());
	let events = record_events(&mut binder);
	let root = binder.root();
	let before = descendants(&binder, root);
	let markup = html(&binder);

	binder.apply(&Change::update(data(&binder))).unwrap();

	assert_eq!(descendants(&binder, root), before);
	assert_eq!(html(&binder), markup);
	assert!(events.borrow().is_empty());
}

#[test]
fn field_update_touches_only_its_text() {
	let mut binder = mount(page(), page_data());
	let root = binder.root();
	let before = descendants(&binder, root);
	let items = collection(&data(&binder), "items");
	let eggs = items.get(1).unwrap();

	eggs.as_object().unwrap().set("name", "bacon");
	binder.apply(&Change::update(eggs)).unwrap();

	assert_eq!(descendants(&binder, root), before);
	assert_eq!(html(&binder), "<h1>Groceries</h1><ul><li>milk</li><li>bacon</li><!--:item--></ul>");
}

#[test]
fn filtered_element_round_trip() {
	let view = json!({"elements": [
		{"tag": "p", "filters": {".visible": true}, "bind": ".message"},
		{"tag": "footer", "bind": ".message"},
	]});
	let mut binder = mount(view, ObjectRef::with_fields([("visible", Value::from(true)), ("message", Value::from("hi"))]));
	let data = data(&binder);
	assert_eq!(html(&binder), "<p>hi</p><footer>hi</footer>");
	let footer = binder.document().last_child(binder.root()).unwrap();

	data.set("visible", false);
	binder.apply(&Change::update(data.clone())).unwrap();
	assert_eq!(html(&binder), "<footer>hi</footer>");

	data.set("visible", true);
	data.set("message", "back");
	binder.apply(&Change::update(data)).unwrap();
	assert_eq!(html(&binder), "<p>back</p><footer>back</footer>");
	assert_eq!(binder.document().last_child(binder.root()), Some(footer));
}

#[test]
fn shared_reference_fans_out() {
	let view = json!({
		"elements": [{"tag": "main", "children": [{"template": "post"}]}],
		"templates": {"post": {"query": ".posts", "elements": [
			{"tag": "article", "children": [{"tag": "h2", "bind": ".title"}, {"tag": "i", "bind": ".author.name"}]},
		]}},
	});
	let ann = named("Ann");
	let post = |title: &str, author: &ObjectRef| Value::from(ObjectRef::with_fields([("title", Value::from(title)), ("author", author.clone().into())]));
	let posts = CollectionRef::from_items([post("One", &ann), post("Two", &named("Ben")), post("Three", &ann)]);
	let mut binder = mount(view, ObjectRef::with_fields([("posts", Value::from(posts))]));

	assert_eq!(binder.bound_nodes(&ann.clone().into()).len(), 2);

	ann.set("name", "Anne");
	binder.apply(&Change::update(ann)).unwrap();
	assert_eq!(
		html(&binder),
		"<main>\
			<article><h2>One</h2><i>Anne</i></article>\
			<article><h2>Two</h2><i>Ben</i></article>\
			<article><h2>Three</h2><i>Anne</i></article>\
			<!--:post-->\
		</main>"
	);
}

#[test]
fn bound_attributes_follow_the_data() {
	let view = json!({"elements": [{"tag": "a", "attributes": {"class": "link"}, "bind_attributes": {"href": ".url", "title": ".hint"}, "bind": ".label"}]});
	let mut binder = mount(view, ObjectRef::with_fields([("url", Value::from("/a")), ("label", Value::from("A"))]));
	assert_eq!(html(&binder), "<a class=\"link\" href=\"/a\">A</a>");

	let data = data(&binder);
	data.set("url", "/b");
	data.set("hint", "go & see");
	binder.apply(&Change::update(data.clone())).unwrap();
	assert_eq!(html(&binder), "<a class=\"link\" href=\"/b\" title=\"go &amp; see\">A</a>");

	data.remove("hint");
	binder.apply(&Change::update(data)).unwrap();
	assert_eq!(html(&binder), "<a class=\"link\" href=\"/b\">A</a>");
}

#[test]
fn filtered_instance_root_comes_and_goes() {
	let view = json!({
		"elements": [{"tag": "ul", "children": [{"template": "item"}]}],
		"templates": {"item": {"query": ".items", "elements": [
			{"tag": "li", "bind": ".name"},
			{"tag": "em", "filters": {".done": true}, "children": ["done"]},
		]}},
	});
	let task = |name: &str| ObjectRef::with_fields([("name", Value::from(name)), ("done", Value::from(false))]);
	let (a, b) = (task("a"), task("b"));
	let mut binder = mount(view, ObjectRef::with_fields([("items", Value::from(CollectionRef::from_items([a.clone().into(), b.into()])))]));
	assert_eq!(html(&binder), "<ul><li>a</li><li>b</li><!--:item--></ul>");
	let li = binder.bound_nodes(&a.clone().into())[0];

	a.set("done", true);
	binder.apply(&Change::update(a.clone())).unwrap();
	assert_eq!(html(&binder), "<ul><li>a</li><em>done</em><li>b</li><!--:item--></ul>");
	assert_eq!(binder.bound_nodes(&a.clone().into()).len(), 2);

	a.set("done", false);
	binder.apply(&Change::update(a.clone())).unwrap();
	assert_eq!(html(&binder), "<ul><li>a</li><li>b</li><!--:item--></ul>");
	assert_eq!(binder.bound_nodes(&a.clone().into()), [li]);

	a.set("done", true);
	a.set("name", "A");
	binder.apply(&Change::update(a)).unwrap();
	assert_eq!(html(&binder), "<ul><li>A</li><em>done</em><li>b</li><!--:item--></ul>");
}

#[test]
fn fully_filtered_instance_stays_bound() {
	let view = json!({
		"elements": [{"tag": "ul", "children": [{"template": "item"}]}],
		"templates": {"item": {"query": ".items", "elements": [{"tag": "li", "filters": {".visible": true}, "bind": ".name"}]}},
	});
	let item = |name: &str, visible: bool| ObjectRef::with_fields([("name", Value::from(name)), ("visible", Value::from(visible))]);
	let (a, b) = (item("a", false), item("b", true));
	let mut binder = mount(view, ObjectRef::with_fields([("items", Value::from(CollectionRef::from_items([a.clone().into(), b.clone().into()])))]));
	assert_eq!(html(&binder), "<ul><li>b</li><!--:item--></ul>");
	assert_eq!(binder.bound_nodes(&a.clone().into()).len(), 1);

	a.set("visible", true);
	binder.apply(&Change::update(a.clone())).unwrap();
	assert_eq!(html(&binder), "<ul><li>a</li><li>b</li><!--:item--></ul>");

	b.set("visible", false);
	binder.apply(&Change::update(b.clone())).unwrap();
	assert_eq!(html(&binder), "<ul><li>a</li><!--:item--></ul>");
	assert_eq!(binder.bound_nodes(&b.clone().into()).len(), 1);

	b.set("visible", true);
	b.set("name", "B");
	binder.apply(&Change::update(b)).unwrap();
	assert_eq!(html(&binder), "<ul><li>a</li><li>B</li><!--:item--></ul>");
}
