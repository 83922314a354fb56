#![allow(dead_code)]

use realtime_templates::{
	binder::BinderEvent,
	html::Metadata,
	Binder, BinderOptions, CollectionRef, Datasource, NodeId, ObjectRef, PathDatasource, Value, View, ViewSet,
};
use std::{cell::RefCell, rc::Rc};

pub fn init_logging() {
	let _ = tracing_subscriber::fmt().with_test_writer().with_max_level(tracing::Level::TRACE).try_init();
}

pub fn mount(view: serde_json::Value, data: impl Into<Value>) -> Binder {
	mount_with(view, data, BinderOptions::new())
}

pub fn mount_with(view: serde_json::Value, data: impl Into<Value>, options: BinderOptions) -> Binder {
	init_logging();
	let views = ViewSet::new(View::from_json_value("", view).unwrap());
	Binder::new(views, PathDatasource::new(data), options).unwrap()
}

pub fn html(binder: &Binder) -> String {
	binder.html(Metadata::Omit)
}

pub fn data(binder: &Binder) -> ObjectRef {
	binder.datasource().data().as_object().unwrap().clone()
}

pub fn collection(object: &ObjectRef, field: &str) -> CollectionRef {
	object.get(field).unwrap().as_collection().unwrap().clone()
}

pub fn named(name: &str) -> ObjectRef {
	ObjectRef::with_fields([("name", Value::from(name))])
}

pub fn list_view() -> serde_json::Value {
	serde_json::json!({
		"elements": [{"tag": "ul", "children": [{"template": "item"}]}],
		"templates": {"item": {"query": ".items", "elements": [{"tag": "li", "bind": ".name"}]}},
	})
}

/// Every node below `parent`, in document order.
pub fn descendants(binder: &Binder, parent: NodeId) -> Vec<NodeId> {
	let document = binder.document();
	let mut nodes = Vec::new();
	let mut pending = document.children(parent);
	pending.reverse();
	while let Some(node) = pending.pop() {
		nodes.push(node);
		let mut children = document.children(node);
		children.reverse();
		pending.extend(children);
	}
	nodes
}

pub fn record_events(binder: &mut Binder) -> Rc<RefCell<Vec<BinderEvent>>> {
	let events = Rc::new(RefCell::new(Vec::new()));
	binder.on_event({
		let events = Rc::clone(&events);
		move |_, event| events.borrow_mut().push(*event)
	});
	events
}
