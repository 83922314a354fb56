//! The change binder: owns a live tree bound to a data graph and translates [`Change`]s into node operations.
//!
//! Every region root (the mount root for the main view, and each root node of a template instance) is bound to a
//! shared [`BindingContext`] and indexed under the entities that context depends on. A change selects affected
//! roots through the [`Index`], refreshes their contexts once each, re-renders and reconciles them in place.

use crate::{
	change::{Action, After, Before, Change, Membership},
	context::BindingContext,
	data::{CollectionRef, EntityId, EntityKey, Value},
	datasource::{Datasource, PathDatasource},
	dom::{Document, NodeId},
	error::{Error, Result},
	html::Metadata,
	index::{Index, InstanceBinding, PlaceholderBinding, SharedContext, Teardown},
	load,
	materialize::{materialize, materialize_into},
	ordinal::{InstanceId, TemplateRef},
	reconcile::{owning_placeholder, reconcile_children, reconcile_instance, Patch},
	render::{render_template, root_context, Formatters, RenderEnv, RenderOptions},
	template::{Template, ViewSet},
	temp_set::TempSet,
	vdom::{VNode, BEHAVIOR_ATTRIBUTE},
	walk::Walker,
};
use core::{
	cell::{Ref, RefCell},
	time::Duration,
};
use hashbrown::HashMap;
use indexmap::{IndexMap, IndexSet};
use std::rc::Rc;
use tracing::{error, instrument, level_filters::STATIC_MAX_LEVEL, trace, trace_span, warn, Level};

/// Sets up an element carrying a `data-behavior` attribute, given the object of the instance it was rendered in.
///
/// The returned [`Teardown`] runs when the element is removed.
pub type Behavior = Rc<dyn Fn(&mut Document, NodeId, &Value) -> Option<Teardown>>;

pub type Behaviors = HashMap<String, Behavior>;

#[derive(Clone, Default)]
pub struct BinderOptions {
	pub formatters: Formatters,
	pub behaviors: Behaviors,
}

impl BinderOptions {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn with_formatter(mut self, name: impl Into<String>, formatter: impl Fn(&Value) -> Vec<VNode> + 'static) -> Self {
		self.formatters.insert(name.into(), Rc::new(formatter));
		self
	}

	#[must_use]
	pub fn with_behavior(mut self, name: impl Into<String>, behavior: impl Fn(&mut Document, NodeId, &Value) -> Option<Teardown> + 'static) -> Self {
		self.behaviors.insert(name.into(), Rc::new(behavior));
		self
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinderEvent {
	/// A root node of a new template instance was inserted.
	Appended(NodeId),
	/// A node was detached after its removal (and any requested delay). The node is destroyed right after.
	Removed(NodeId),
}

/// Passed to `before_remove` hooks while a node is being removed.
#[derive(Debug, Default)]
pub struct Removal {
	delay: Option<Duration>,
}

impl Removal {
	/// Keeps the node in place for `delay` before it is detached, for example to let an exit animation play.
	///
	/// The longest requested delay wins.
	pub fn delay(&mut self, delay: Duration) {
		self.delay = Some(self.delay.map_or(delay, |requested| requested.max(delay)));
	}

	#[must_use]
	pub fn requested_delay(&self) -> Option<Duration> {
		self.delay
	}
}

type Listener = Box<dyn FnMut(&Document, &BinderEvent)>;
type RemovalHook = Box<dyn FnMut(&Document, NodeId, &mut Removal)>;

pub struct Binder<D: Datasource = PathDatasource> {
	document: Document,
	views: ViewSet,
	datasource: D,
	options: BinderOptions,
	index: Index,
	root: NodeId,
	clock: Duration,
	/// Removed nodes that are still in place, by deadline.
	pending_removals: IndexMap<NodeId, Duration>,
	listeners: Vec<Listener>,
	removal_hooks: Vec<RemovalHook>,
	visited: TempSet<EntityId>,
}

impl<D: Datasource> Binder<D> {
	/// Renders the main view into a fresh document with a `body` root.
	///
	/// # Errors
	///
	/// Iff a query fails.
	pub fn new(views: ViewSet, datasource: D, options: BinderOptions) -> Result<Self> {
		let document = Document::new("body");
		let root = document.root();
		Self::mount(document, root, views, datasource, options)
	}

	/// Renders the main view with all current collection members, appends it to `root` and binds the result.
	///
	/// Existing children of `root` are left in place and ignored.
	///
	/// # Errors
	///
	/// Iff `root` isn't part of `document` or a query fails.
	pub fn mount(document: Document, root: NodeId, views: ViewSet, datasource: D, options: BinderOptions) -> Result<Self> {
		let span = trace_span!("Mounting view", view = %views.main().name(), ?root);
		let _enter = span.enter();

		if !document.contains(root) {
			return Err(Error::InvalidRoot(root));
		}

		let mut binder = Self {
			document,
			views,
			datasource,
			options,
			index: Index::new(),
			root,
			clock: Duration::ZERO,
			pending_removals: IndexMap::new(),
			listeners: Vec::new(),
			removal_hooks: Vec::new(),
			visited: TempSet::new(),
		};

		let context = Rc::new(RefCell::new(root_context(binder.env())?));
		let nodes = render_template(binder.env(), &context.borrow(), RenderOptions::initial())?;
		materialize_into(&mut binder.document, root, &nodes, &mut Patch::default());

		binder.bind_instance(root, &context, true, None);
		binder.bind_tree(root, &context)?;
		trace!(bound = binder.index.len(), "Mounted.");
		Ok(binder)
	}

	fn env(&self) -> RenderEnv<'_> {
		RenderEnv {
			views: &self.views,
			datasource: &self.datasource,
			formatters: &self.options.formatters,
		}
	}

	#[must_use]
	pub fn document(&self) -> &Document {
		&self.document
	}

	/// For host-side changes to the live tree. Nodes without markers are ignored by reconciliation.
	pub fn document_mut(&mut self) -> &mut Document {
		&mut self.document
	}

	#[must_use]
	pub fn root(&self) -> NodeId {
		self.root
	}

	#[must_use]
	pub fn views(&self) -> &ViewSet {
		&self.views
	}

	#[must_use]
	pub fn datasource(&self) -> &D {
		&self.datasource
	}

	#[must_use]
	pub fn index(&self) -> &Index {
		&self.index
	}

	/// Region roots that depend on `entity` (an object or collection).
	#[must_use]
	pub fn bound_nodes(&self, entity: &Value) -> Vec<NodeId> {
		entity.key_in(None, None).map(|key| self.index.elements(key)).unwrap_or_default()
	}

	/// The context `node` is bound to, if it is a region root.
	#[must_use]
	pub fn context(&self, node: NodeId) -> Option<Ref<'_, BindingContext>> {
		self.index.instance(node).map(|instance| instance.context.borrow())
	}

	/// Markup of the mounted region.
	#[must_use]
	pub fn html(&self, metadata: Metadata) -> String {
		load::inner_html(&self.document, self.root, metadata)
	}

	pub fn on_event(&mut self, listener: impl FnMut(&Document, &BinderEvent) + 'static) {
		self.listeners.push(Box::new(listener));
	}

	/// Registers a hook that runs whenever a node is about to be removed, and can delay the removal.
	pub fn on_before_remove(&mut self, hook: impl FnMut(&Document, NodeId, &mut Removal) + 'static) {
		self.removal_hooks.push(Box::new(hook));
	}

	fn emit(&mut self, event: BinderEvent) {
		for listener in &mut self.listeners {
			listener(&self.document, &event);
		}
	}

	/// Brings the live tree up to date with a mutation of the data graph.
	///
	/// # Errors
	///
	/// Iff an append or remove change has no collection, or a query fails. Changes made before the failure stay.
	#[instrument(skip(self, change), fields(action = %change.action))]
	pub fn apply(&mut self, change: &Change) -> Result<()> {
		match change.action {
			Action::Append => self.apply_append(change),
			Action::Update => self.apply_update(change),
			Action::Remove => self.apply_remove(change),
		}
	}

	fn apply_append(&mut self, change: &Change) -> Result<()> {
		let collection = change.collection.as_ref().ok_or(Error::MissingCollection { action: change.action })?;

		let nodes = self.index.elements(EntityKey::Direct(collection.id()));
		self.refresh_nodes(nodes, &[Membership::new(collection.clone(), change.object.clone())])?;
		self.append_item(collection, &change.object)?;
		self.correct_order(change);
		Ok(())
	}

	fn apply_update(&mut self, change: &Change) -> Result<()> {
		if let Some(collection) = &change.collection {
			let nodes = self.index.elements(EntityKey::Direct(collection.id()));
			self.refresh_nodes(nodes, &change.added_items)?;
			if let Some(original) = &change.original_collection {
				self.move_membership(&change.object, original, collection)?;
			}
			self.correct_order(change);
		}

		let nodes = self.affected_nodes(&change.object);
		self.refresh_nodes(nodes, &change.added_items)?;

		for membership in &change.removed_items {
			self.remove_item(&membership.collection, &membership.item)?;
		}
		for membership in &change.added_items {
			self.append_item(&membership.collection, &membership.item)?;
		}
		Ok(())
	}

	fn apply_remove(&mut self, change: &Change) -> Result<()> {
		let collection = change.collection.as_ref().ok_or(Error::MissingCollection { action: change.action })?;
		self.remove_item(collection, &change.object)
	}

	/// Region roots bound to anything reachable from `object`, including primitive collection slots.
	fn affected_nodes(&mut self, object: &Value) -> Vec<NodeId> {
		let mut nodes = IndexSet::new();
		let visited = self.visited.temp();
		let mut pending = vec![object.clone()];
		while let Some(value) = pending.pop() {
			let id = match value.entity_id() {
				Some(id) => id,
				None => continue,
			};
			if !visited.insert(id) {
				continue;
			}
			nodes.extend(self.index.elements(EntityKey::Direct(id)));
			match &value {
				Value::Object(object) => pending.extend(object.fields().values().cloned()),
				Value::Collection(collection) => {
					for (index, item) in collection.items().into_iter().enumerate() {
						if item.entity_id().is_some() {
							pending.push(item);
						} else {
							nodes.extend(self.index.elements(EntityKey::Primitive { collection: id, index }));
						}
					}
				}
				_ => (),
			}
		}

		trace!(entities = visited.len(), nodes = nodes.len(), "Collected affected nodes.");
		if STATIC_MAX_LEVEL >= Level::WARN && self.visited.capacity() >= 10_000 {
			warn!("The visited entity scratch set is large ({}). Updates near the data root are expensive.", self.visited.capacity());
		}
		nodes.into_iter().collect()
	}

	/// Region roots of the instances of `collection` whose source is `object`.
	fn member_nodes(&self, object: &Value, collection: &CollectionRef) -> Vec<NodeId> {
		self.index
			.elements(EntityKey::Direct(collection.id()))
			.into_iter()
			.filter(|&node| {
				self.index.instance(node).map_or(false, |instance| {
					let context = instance.context.borrow();
					!instance.view_root && context.source() == object && context.collection() == Some(collection)
				})
			})
			.collect()
	}

	/// Refreshes each affected context once, then reconciles every root bound to it.
	///
	/// Placeholders that were created along the way are filled afterwards, except with the items in `ignore`.
	fn refresh_nodes(&mut self, nodes: impl IntoIterator<Item = NodeId>, ignore: &[Membership]) -> Result<()> {
		let mut groups: IndexMap<*const RefCell<BindingContext>, (SharedContext, Vec<NodeId>)> = IndexMap::new();
		for node in nodes {
			if let Some(instance) = self.index.instance(node) {
				groups.entry(Rc::as_ptr(&instance.context)).or_insert_with(|| (instance.context.clone(), Vec::new())).1.push(node);
			}
		}

		let mut fills = Vec::new();
		for (context, nodes) in groups.into_values() {
			let span = trace_span!("Refreshing instance", template = %context.borrow().template_ref(), roots = nodes.len());
			let _enter = span.enter();

			{
				let mut context = context.borrow_mut();
				context.renumber();
				context.refresh(&self.views, &self.datasource)?;
			}
			let rendered = render_template(self.env(), &context.borrow(), RenderOptions::bound())?;

			let (view_roots, roots): (Vec<NodeId>, Vec<NodeId>) = nodes
				.into_iter()
				.filter(|&node| matches!(self.index.instance(node), Some(instance) if Rc::ptr_eq(&instance.context, &context)))
				.partition(|&node| self.index.instance(node).map_or(false, |instance| instance.view_root));

			for node in view_roots {
				let patch = reconcile_children(&mut self.document, node, &rendered);
				trace!(generated = patch.generated.len(), discarded = patch.discarded.len(), text_updates = patch.text_updates, attribute_updates = patch.attribute_updates, "Reconciled view.");
				self.follow_up(patch, &context, &mut fills)?;
				if self.index.instance(node).is_some() {
					self.bind_instance(node, &context, true, None);
				}
			}

			if !roots.is_empty() {
				let anchor = roots.iter().find_map(|&root| self.index.instance(root)).and_then(|instance| instance.anchor);
				let patch = reconcile_instance(&mut self.document, &roots, &rendered);
				trace!(generated = patch.generated.len(), discarded = patch.discarded.len(), text_updates = patch.text_updates, attribute_updates = patch.attribute_updates, "Reconciled instance.");
				let roots = patch.roots.clone();
				self.follow_up(patch, &context, &mut fills)?;
				for root in roots {
					self.bind_instance(root, &context, false, anchor);
				}
			}
		}

		for placeholder in fills {
			self.fill_placeholder(placeholder, ignore)?;
		}
		Ok(())
	}

	/// Binds what a reconciliation or materialization created within the instance bound to `context`.
	fn follow_up(&mut self, patch: Patch, context: &SharedContext, fills: &mut Vec<NodeId>) -> Result<()> {
		for node in patch.discarded {
			self.discard(node);
		}
		for placeholder in patch.placeholders {
			self.bind_placeholder(placeholder.node, context)?;
			if placeholder.generated {
				fills.push(placeholder.node);
			}
		}
		let source = context.borrow().source().clone();
		for node in patch.behaviors {
			self.run_behavior(node, &source);
		}
		Ok(())
	}

	/// Binds the subtree below `root`, as created by an initial render with inline members.
	fn bind_tree(&mut self, root: NodeId, context: &SharedContext) -> Result<()> {
		let mut members: HashMap<(*const RefCell<BindingContext>, InstanceId), SharedContext> = HashMap::new();
		let mut walker = Walker::new(root, context.clone());
		walker.next(&self.document);
		while let Some((node, parent)) = walker.next(&self.document) {
			let markers = match self.document.markers(node) {
				Some(markers) => markers.clone(),
				None => continue,
			};

			let mut current = parent.clone();
			if let Some(instance) = &markers.instance {
				let key = (Rc::as_ptr(&parent), instance.clone());
				let member = match members.get(&key) {
					Some(member) => Some(member.clone()),
					None => {
						let member = self.member_context(&parent, instance)?;
						if let Some(member) = &member {
							members.insert(key, member.clone());
						}
						member
					}
				};
				if let Some(member) = member {
					let anchor = owning_placeholder(&self.document, node, &instance.template);
					self.bind_instance(node, &member, false, anchor);
					walker.set(member.clone());
					current = member;
				}
			}

			if markers.placeholder.is_some() {
				self.bind_placeholder(node, &current)?;
			}
			if self.document.attribute(node, BEHAVIOR_ATTRIBUTE).is_some() {
				let source = current.borrow().source().clone();
				self.run_behavior(node, &source);
			}
		}
		Ok(())
	}

	fn member_context(&self, parent: &SharedContext, instance: &InstanceId) -> Result<Option<SharedContext>> {
		let template = match self.views.template(&instance.template) {
			Some(template) => template,
			None => {
				warn!(template = %instance.template, "Rendered instance of an unknown template.");
				return Ok(None);
			}
		};
		let collection = match self.collection_of(parent, &template)? {
			Some(collection) => collection,
			None => return Ok(None),
		};
		let source = match collection.get(instance.index) {
			Some(source) => source,
			None => {
				warn!(%instance, "Rendered instance is out of range of its collection.");
				return Ok(None);
			}
		};
		let parent_source = parent.borrow().source().clone();
		let context = BindingContext::new(&self.views, &self.datasource, instance.template.clone(), template, source, Some(parent_source), Some(collection), Some(instance.index))?;
		Ok(Some(Rc::new(RefCell::new(context))))
	}

	/// The collection a repeated template draws its members from, within `context`. Created if missing.
	fn collection_of(&self, context: &SharedContext, template: &Template) -> Result<Option<CollectionRef>> {
		let query = match template.query.as_deref() {
			Some(query) => query,
			None => return Ok(None),
		};
		let context = context.borrow();
		let value = match context.get(query) {
			Some(value) => value,
			None => self.datasource.get(query, &context.scope().forced())?,
		};
		Ok(value.as_collection().cloned())
	}

	fn bind_instance(&mut self, node: NodeId, context: &SharedContext, view_root: bool, anchor: Option<NodeId>) {
		let (source_key, keys) = {
			let context = context.borrow();
			let source_key = context.source().key_in(context.collection(), context.index());
			let mut keys: Vec<EntityKey> = source_key.into_iter().collect();
			keys.extend(context.collection().map(|collection| EntityKey::Direct(collection.id())));
			keys.extend(context.references().filter_map(|reference| reference.key_in(None, None)));
			(source_key, keys)
		};
		self.index.bind_instance(
			node,
			InstanceBinding {
				context: context.clone(),
				source_key,
				view_root,
				anchor,
			},
			keys,
		);
	}

	fn bind_placeholder(&mut self, node: NodeId, context: &SharedContext) -> Result<()> {
		let template_ref = match self.document.markers(node).and_then(|markers| markers.placeholder.clone()) {
			Some(template_ref) => template_ref,
			None => {
				error!(?node, "Expected a placeholder.");
				return Ok(());
			}
		};
		let template = match self.views.template(&template_ref) {
			Some(template) => template,
			None => {
				warn!(template = %template_ref, "Placeholder of an unknown template.");
				return Ok(());
			}
		};
		match self.collection_of(context, &template)? {
			Some(collection) => self.index.bind_placeholder(
				node,
				PlaceholderBinding {
					template: template_ref,
					collection,
					parent: context.clone(),
				},
			),
			None => warn!(template = %template_ref, "Placeholder query doesn't yield a collection."),
		}
		Ok(())
	}

	fn run_behavior(&mut self, node: NodeId, source: &Value) {
		let name = match self.document.attribute(node, BEHAVIOR_ATTRIBUTE) {
			Some(name) if !name.is_empty() => name.to_owned(),
			_ => return,
		};
		let behavior = match self.options.behaviors.get(&name) {
			Some(behavior) => behavior.clone(),
			None => return warn!(behavior = %name, "Unknown behavior."),
		};
		trace!(behavior = %name, ?node, "Running behavior.");
		if let Some(teardown) = behavior(&mut self.document, node, source) {
			if let Some(previous) = self.index.set_teardown(node, teardown) {
				previous();
			}
		}
	}

	/// Instantiates every current member of the collection bound to `placeholder`, except those in `ignore`.
	fn fill_placeholder(&mut self, placeholder: NodeId, ignore: &[Membership]) -> Result<()> {
		let collection = match self.index.placeholder(placeholder) {
			Some(binding) => binding.collection.clone(),
			None => return Ok(()),
		};
		for (index, item) in collection.items().into_iter().enumerate() {
			if ignore.iter().any(|membership| membership.collection == collection && membership.item == item) {
				continue;
			}
			self.append_at(placeholder, item, index)?;
		}
		Ok(())
	}

	/// Instantiates `item` at every placeholder of `collection`.
	fn append_item(&mut self, collection: &CollectionRef, item: &Value) -> Result<()> {
		let index = collection.items().iter().rposition(|candidate| candidate == item).unwrap_or_else(|| collection.len());
		for placeholder in self.index.placeholders(EntityKey::Direct(collection.id())) {
			self.append_at(placeholder, item.clone(), index)?;
		}
		Ok(())
	}

	/// Renders a new instance for `item` and inserts it directly before `placeholder`.
	fn append_at(&mut self, placeholder: NodeId, item: Value, index: usize) -> Result<()> {
		let binding = match self.index.placeholder(placeholder) {
			Some(binding) => binding.clone(),
			None => return Ok(()),
		};
		let parent_node = match self.document.parent(placeholder) {
			Some(parent_node) => parent_node,
			None => {
				error!(?placeholder, "Placeholder is detached.");
				return Ok(());
			}
		};
		let span = trace_span!("Appending instance", template = %binding.template, index);
		let _enter = span.enter();

		let context = match self.instance_context(&binding, item, index)? {
			Some(context) => context,
			None => return Ok(()),
		};
		let nodes = render_template(self.env(), &context.borrow(), RenderOptions::bound())?;

		let mut patch = Patch::default();
		let mut roots = Vec::with_capacity(nodes.len());
		for node in &nodes {
			let root = materialize(&mut self.document, node, &mut patch);
			self.document.insert_before(parent_node, root, Some(placeholder));
			roots.push(root);
		}
		for &root in &roots {
			self.bind_instance(root, &context, false, Some(placeholder));
		}

		let mut fills = Vec::new();
		self.follow_up(patch, &context, &mut fills)?;
		for root in roots {
			self.emit(BinderEvent::Appended(root));
		}
		for placeholder in fills {
			self.fill_placeholder(placeholder, &[])?;
		}
		Ok(())
	}

	/// A fresh context for an instance of `binding`'s template, or [`None`] if the template is unknown.
	fn instance_context(&self, binding: &PlaceholderBinding, item: Value, index: usize) -> Result<Option<SharedContext>> {
		let template = match self.views.template(&binding.template) {
			Some(template) => template,
			None => return Ok(None),
		};
		let parent_source = binding.parent.borrow().source().clone();
		let context = BindingContext::new(&self.views, &self.datasource, binding.template.clone(), template, item, Some(parent_source), Some(binding.collection.clone()), Some(index))?;
		Ok(Some(Rc::new(RefCell::new(context))))
	}

	/// Moves the instances of `object` from `original` to `collection`.
	///
	/// Instances still sitting at a placeholder of `original` are removed. Others are assumed to have been moved by
	/// the host and are rebound in place, adopting the template of a destination placeholder they were moved next to.
	/// Placeholders of `collection` without an instance get a new one.
	fn move_membership(&mut self, object: &Value, original: &CollectionRef, collection: &CollectionRef) -> Result<()> {
		let span = trace_span!("Moving membership");
		let _enter = span.enter();

		let targets = self.index.placeholders(EntityKey::Direct(collection.id()));
		let mut unhandled = targets.clone();
		let origins = self.index.placeholders(EntityKey::Direct(original.id()));
		let index = collection.position(object).unwrap_or_else(|| collection.len());
		let mut adopted: HashMap<*const RefCell<BindingContext>, SharedContext> = HashMap::new();

		for node in self.member_nodes(object, original) {
			let context = match self.index.instance(node) {
				Some(instance) => instance.context.clone(),
				None => continue,
			};
			let template = context.borrow().template_ref().clone();
			let parent = self.document.parent(node);

			if origins.iter().any(|&origin| self.document.parent(origin) == parent && self.index.placeholder(origin).map_or(false, |binding| binding.template == template)) {
				self.remove(node);
				continue;
			}

			let anchor = targets.iter().copied().find(|&target| self.document.parent(target) == parent);
			if let Some(anchor) = anchor {
				unhandled.retain(|&placeholder| placeholder != anchor);
			}
			let destination = anchor.and_then(|anchor| self.index.placeholder(anchor)).filter(|binding| binding.template != template).cloned();
			let context = match destination {
				Some(binding) => match adopted.get(&Rc::as_ptr(&context)) {
					Some(adopted) => adopted.clone(),
					None => match self.instance_context(&binding, object.clone(), index)? {
						Some(new) => {
							trace!(from = %template, to = %binding.template, "Moved instance adopts the destination template.");
							adopted.insert(Rc::as_ptr(&context), new.clone());
							new
						}
						None => context,
					},
				},
				None => {
					{
						let mut context = context.borrow_mut();
						if context.collection() != Some(collection) {
							context.relocate(Some(collection.clone()), collection.position(object));
						}
					}
					context
				}
			};
			self.bind_instance(node, &context, false, anchor);
			trace!(?node, "Rebound moved instance.");
		}

		for placeholder in unhandled {
			self.append_at(placeholder, object.clone(), index)?;
		}
		Ok(())
	}

	fn remove_item(&mut self, collection: &CollectionRef, object: &Value) -> Result<()> {
		let mut nodes = self.member_nodes(object, collection);
		if object.entity_id().is_none() {
			nodes = self.stale_primitive_instances(nodes, collection, object);
		}
		trace!(roots = nodes.len(), "Removing instances.");
		for node in nodes {
			self.remove(node);
		}

		let nodes = self.index.elements(EntityKey::Direct(collection.id()));
		self.refresh_nodes(nodes, &[])
	}

	/// Equal primitives can't be told apart. Per placeholder, picks the instance whose slot no longer holds its value.
	fn stale_primitive_instances(&self, nodes: Vec<NodeId>, collection: &CollectionRef, object: &Value) -> Vec<NodeId> {
		let mut chosen: IndexMap<Option<NodeId>, *const RefCell<BindingContext>> = IndexMap::new();
		for &node in &nodes {
			if let Some(instance) = self.index.instance(node) {
				let stale = instance.context.borrow().index().map_or(true, |index| collection.get(index).as_ref() != Some(object));
				let pointer = Rc::as_ptr(&instance.context);
				match chosen.get(&instance.anchor) {
					None => {
						chosen.insert(instance.anchor, pointer);
					}
					Some(_) if stale => {
						chosen.insert(instance.anchor, pointer);
					}
					Some(_) => (),
				}
			}
		}
		nodes
			.into_iter()
			.filter(|&node| {
				self.index
					.instance(node)
					.map_or(false, |instance| chosen.get(&instance.anchor) == Some(&Rc::as_ptr(&instance.context)))
			})
			.collect()
	}

	/// Applies the change's `before` or `after` hint to the nodes of its object.
	fn correct_order(&mut self, change: &Change) {
		let collection = match &change.collection {
			Some(collection) => collection,
			None => return,
		};
		let nodes = self.member_nodes(&change.object, collection);
		if nodes.is_empty() {
			return;
		}

		if let Some(before) = &change.before {
			let targets = match before {
				Before::Item(item) => self.member_nodes(item, collection),
				Before::End => self.index.placeholders(EntityKey::Direct(collection.id())),
			};
			self.move_before_targets(&nodes, &targets);
		} else if let Some(after) = &change.after {
			match after {
				After::Item(item) => {
					let targets = self.member_nodes(item, collection);
					for &node in nodes.iter().rev() {
						if let Some(target) = targets.iter().copied().rev().find(|&target| self.same_slot(node, target)) {
							self.move_after(node, target);
						}
					}
				}
				After::Start => {
					let first = collection.items().into_iter().find(|item| item != &change.object);
					if let Some(first) = first {
						let targets = self.member_nodes(&first, collection);
						self.move_before_targets(&nodes, &targets);
					}
				}
			}
		}
	}

	fn move_before_targets(&mut self, nodes: &[NodeId], targets: &[NodeId]) {
		for &node in nodes {
			if let Some(target) = targets.iter().copied().find(|&target| self.same_slot(node, target)) {
				self.move_before(node, target);
			}
		}
	}

	fn template_of(&self, node: NodeId) -> Option<TemplateRef> {
		match self.index.instance(node) {
			Some(instance) => Some(instance.context.borrow().template_ref().clone()),
			None => self.index.placeholder(node).map(|binding| binding.template.clone()),
		}
	}

	/// Whether `node` and `target` are rendered from the same template under the same parent.
	fn same_slot(&self, node: NodeId, target: NodeId) -> bool {
		node != target && self.document.parent(node) == self.document.parent(target) && self.template_of(node).is_some() && self.template_of(node) == self.template_of(target)
	}

	/// `node` together with the instances anchored at it, in document order.
	fn group(&self, node: NodeId) -> Vec<NodeId> {
		match (self.index.anchored(node), self.document.parent(node)) {
			(Some(members), Some(parent)) => self.document.children(parent).into_iter().filter(|child| *child == node || members.contains(child)).collect(),
			_ => vec![node],
		}
	}

	fn move_before(&mut self, node: NodeId, target: NodeId) {
		let group = self.group(node);
		let parent = match self.document.parent(target) {
			Some(parent) => parent,
			None => return,
		};
		if group.last().and_then(|&last| self.document.next_sibling(last)) == Some(target) {
			return;
		}
		trace!(?node, ?target, "Moving instance before.");
		for member in group {
			self.document.insert_before(parent, member, Some(target));
		}
	}

	fn move_after(&mut self, node: NodeId, target: NodeId) {
		let group = self.group(node);
		let parent = match self.document.parent(target) {
			Some(parent) => parent,
			None => return,
		};
		if group.first().and_then(|&first| self.document.previous_sibling(first)) == Some(target) {
			return;
		}
		trace!(?node, ?target, "Moving instance after.");
		let reference = self.document.next_sibling(target);
		for member in group {
			self.document.insert_before(parent, member, reference);
		}
	}

	/// Removes a node that was bound by this binder, respecting delays requested by `before_remove` hooks.
	///
	/// The node is unbound and loses its markers immediately, so that later reconciliation passes over it. It stays
	/// in place until the delay elapses on the [`Binder::advance`] clock, then it is detached and
	/// [`BinderEvent::Removed`] is emitted. Requesting removal of a pending node again restarts its delay.
	pub fn remove(&mut self, node: NodeId) {
		if !self.document.contains(node) || node == self.root {
			return;
		}
		let span = trace_span!("Removing node", ?node);
		let _enter = span.enter();

		self.unbind_subtree(node);
		if let Some(markers) = self.document.markers_mut(node) {
			markers.clear();
		}

		let mut removal = Removal::default();
		for hook in &mut self.removal_hooks {
			hook(&self.document, node, &mut removal);
		}
		match removal.delay {
			Some(delay) => {
				self.pending_removals.shift_remove(&node);
				self.pending_removals.insert(node, self.clock + delay);
				trace!(?delay, "Removal delayed.");
			}
			None => self.finish_removal(node),
		}
	}

	fn finish_removal(&mut self, node: NodeId) {
		self.pending_removals.shift_remove(&node);
		if !self.document.contains(node) {
			return trace!(?node, "Pending node was destroyed with an ancestor.");
		}
		self.document.detach(node);
		self.emit(BinderEvent::Removed(node));
		self.document.destroy(node);
	}

	/// Advances the removal clock, detaching every node whose delay has elapsed, in deadline order.
	pub fn advance(&mut self, elapsed: Duration) {
		self.clock += elapsed;
		let clock = self.clock;
		let mut due: Vec<(NodeId, Duration)> = self.pending_removals.iter().filter(|(_, &deadline)| deadline <= clock).map(|(&node, &deadline)| (node, deadline)).collect();
		due.sort_by_key(|&(_, deadline)| deadline);
		for (node, _) in due {
			self.finish_removal(node);
		}
		trace!(pending = self.pending_removals.len(), "Advanced removal clock.");
	}

	/// Detaches every pending node now.
	pub fn flush_removals(&mut self) {
		let pending: Vec<NodeId> = self.pending_removals.keys().copied().collect();
		for node in pending {
			self.finish_removal(node);
		}
	}

	#[must_use]
	pub fn pending_removals(&self) -> usize {
		self.pending_removals.len()
	}

	#[must_use]
	pub fn clock(&self) -> Duration {
		self.clock
	}

	/// Removes a node the reconciler dropped: unbound, torn down and destroyed right away, without events.
	fn discard(&mut self, node: NodeId) {
		self.unbind_subtree(node);
		self.pending_removals.shift_remove(&node);
		self.document.destroy(node);
	}

	/// Unbinds `node` and its descendants, running teardowns. Instances anchored at placeholders in the subtree
	/// are discarded with them.
	fn unbind_subtree(&mut self, node: NodeId) {
		let mut pending = vec![node];
		while let Some(id) = pending.pop() {
			pending.extend(self.document.children(id));
			if let Some(binding) = self.index.unbind(id) {
				if let Some(teardown) = binding.teardown {
					teardown();
				}
			}
			for member in self.index.take_anchored(id) {
				if self.document.contains(member) {
					self.discard(member);
				}
			}
		}
	}
}
