use core::time::Duration;
use realtime_templates::{binder::BinderEvent, index::Teardown, BinderOptions, Change, CollectionRef, ObjectRef, Value};
use serde_json::json;
use std::{cell::Cell, rc::Rc};

mod fixture_;
use fixture_::{collection, data, html, list_view, mount, mount_with, named, record_events};

fn list(names: &[&str]) -> ObjectRef {
	ObjectRef::with_fields([("items", Value::from(CollectionRef::from_items(names.iter().map(|name| named(name).into()))))])
}

#[test]
fn delayed_removal_outlives_refreshes() {
	let mut binder = mount(list_view(), list(&["a", "b"]));
	let events = record_events(&mut binder);
	binder.on_before_remove(|_, _, removal| removal.delay(Duration::from_millis(300)));
	let items = collection(&data(&binder), "items");
	let b = items.get(1).unwrap();
	let li = binder.bound_nodes(&b)[0];

	items.remove(&b);
	binder.apply(&Change::remove(items, b)).unwrap();
	assert_eq!(binder.pending_removals(), 1);
	assert!(binder.document().is_attached(li));
	assert!(!binder.index().is_bound(li));

	binder.apply(&Change::update(data(&binder))).unwrap();
	assert_eq!(html(&binder), "<ul><li>a</li><li>b</li><!--:item--></ul>");

	binder.advance(Duration::from_millis(100));
	assert!(binder.document().is_attached(li));
	assert!(events.borrow().is_empty());

	binder.advance(Duration::from_millis(200));
	assert_eq!(binder.pending_removals(), 0);
	assert!(!binder.document().contains(li));
	assert_eq!(events.borrow().as_slice(), [BinderEvent::Removed(li)]);
	assert_eq!(html(&binder), "<ul><li>a</li><!--:item--></ul>");
}

#[test]
fn longest_delay_wins() {
	let mut binder = mount(list_view(), list(&["a"]));
	binder.on_before_remove(|_, _, removal| removal.delay(Duration::from_millis(50)));
	binder.on_before_remove(|_, _, removal| removal.delay(Duration::from_millis(20)));
	let items = collection(&data(&binder), "items");
	let a = items.get(0).unwrap();

	items.remove(&a);
	binder.apply(&Change::remove(items, a)).unwrap();
	binder.advance(Duration::from_millis(20));
	assert_eq!(binder.pending_removals(), 1);
	binder.advance(Duration::from_millis(30));
	assert_eq!(binder.pending_removals(), 0);
	assert_eq!(binder.clock(), Duration::from_millis(50));
}

#[test]
fn flush_detaches_everything_pending() {
	let mut binder = mount(list_view(), list(&["a", "b"]));
	let events = record_events(&mut binder);
	binder.on_before_remove(|_, _, removal| removal.delay(Duration::from_secs(1)));
	let items = collection(&data(&binder), "items");
	for item in items.items() {
		items.remove(&item);
		binder.apply(&Change::remove(items.clone(), item)).unwrap();
	}

	binder.flush_removals();
	assert_eq!(events.borrow().len(), 2);
	assert_eq!(html(&binder), "<ul><!--:item--></ul>");
}

#[test]
fn behaviors_are_torn_down_with_their_element() {
	let setups = Rc::new(Cell::new(0));
	let teardowns = Rc::new(Cell::new(0));
	let options = BinderOptions::new().with_behavior("tracked", {
		let setups = Rc::clone(&setups);
		let teardowns = Rc::clone(&teardowns);
		move |document, node, source| {
			setups.set(setups.get() + 1);
			let name = source.field("name").to_string();
			document.set_attribute(node, "title", &name);
			let teardowns = Rc::clone(&teardowns);
			let teardown: Teardown = Box::new(move || teardowns.set(teardowns.get() + 1));
			Some(teardown)
		}
	});
	let view = json!({
		"elements": [{"tag": "ul", "children": [{"template": "item"}]}],
		"templates": {"item": {"query": ".items", "elements": [{"tag": "li", "attributes": {"data-behavior": "tracked"}, "bind": ".name"}]}},
	});
	let mut binder = mount_with(view, list(&["a", "b"]), options);
	assert_eq!(setups.get(), 2);
	let items = collection(&data(&binder), "items");
	let li = binder.bound_nodes(&items.get(0).unwrap())[0];
	assert_eq!(binder.document().attribute(li, "title"), Some("a"));

	let c = Value::from(named("c"));
	items.push(c.clone());
	binder.apply(&Change::append(items.clone(), c)).unwrap();
	assert_eq!(setups.get(), 3);

	let a = items.get(0).unwrap();
	items.remove(&a);
	binder.apply(&Change::remove(items, a)).unwrap();
	assert_eq!(teardowns.get(), 1);
	assert_eq!(setups.get(), 3);
}

#[test]
fn host_nodes_are_left_alone() {
	let mut binder = mount(list_view(), list(&["a"]));
	let root = binder.root();
	let ul = binder.document().first_child(root).unwrap();
	let document = binder.document_mut();
	let note = document.create_text("note");
	document.append_child(ul, note);

	binder.apply(&Change::update(data(&binder))).unwrap();
	assert_eq!(html(&binder), "<ul><li>a</li><!--:item-->note</ul>");
}

#[test]
fn repeated_removal_restarts_the_delay() {
	let mut binder = mount(list_view(), list(&["a", "b"]));
	let events = record_events(&mut binder);
	binder.on_before_remove(|_, _, removal| removal.delay(Duration::from_millis(100)));
	let b = collection(&data(&binder), "items").get(1).unwrap();
	let li = binder.bound_nodes(&b)[0];

	binder.remove(li);
	binder.advance(Duration::from_millis(60));
	binder.remove(li);
	assert_eq!(binder.pending_removals(), 1);

	binder.advance(Duration::from_millis(40));
	assert!(binder.document().is_attached(li));
	assert!(events.borrow().is_empty());

	binder.advance(Duration::from_millis(59));
	assert!(binder.document().is_attached(li));

	binder.advance(Duration::from_millis(1));
	assert_eq!(binder.pending_removals(), 0);
	assert!(!binder.document().contains(li));
	assert_eq!(events.borrow().as_slice(), [BinderEvent::Removed(li)]);

	binder.advance(Duration::from_millis(500));
	assert_eq!(events.borrow().len(), 1);
}
