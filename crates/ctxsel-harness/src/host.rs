#![forbid(unsafe_code)]

//! In-memory component tree.
//!
//! # Design
//!
//! [`TreeHost`] stands in for a rendering runtime. It keeps an arena of
//! nodes addressed by [`NodeId`]: one root, plain groups, Provider nodes that
//! drive a [`ProviderBinding`], and consumer nodes that own a [`Consumer`]
//! plus a render counter. A node's scope is the chain of its ancestors; the
//! nearest Provider node whose record matches a context's key wins.
//!
//! The host plays by the consumer lifecycle contract: a consumer is read at
//! its render position, mounted once it is attached, and unmounted before
//! its node is destroyed. Re-rendering a consumer node only bumps its
//! counter and journals a [`HostEvent::Rerender`].
//!
//! # Invariants
//!
//! 1. The root always exists and cannot be unmounted.
//! 2. Unmounting a node tears its subtree down children-first.
//! 3. Node ids are never reused.

use std::any::{Any, type_name};
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use ctxsel_core::Topic;
use ctxsel_runtime::{
    Consumer, Context, Contexts, Provided, ProviderBinding, RenderOutcome, Scope,
};
use serde::Serialize;

use crate::error::{HarnessError, Result};
use crate::journal::{HostEvent, Journal};

/// Address of a node in a [`TreeHost`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NodeId(usize);

impl NodeId {
    pub const ROOT: Self = Self(0);

    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

// ─── Type-erased node payloads ───────────────────────────────────────────────

trait ProviderSlot {
    fn provided(&self) -> Provided;
    fn topic(&self) -> Topic;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: 'static> ProviderSlot for ProviderBinding<T> {
    fn provided(&self) -> Provided {
        ProviderBinding::provided(self)
    }

    fn topic(&self) -> Topic {
        self.context().topic()
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

trait ConsumerSlot {
    fn unmount(&mut self) -> bool;
    fn is_mounted(&self) -> bool;
    fn notifications(&self) -> u64;
    fn transitions(&self) -> u64;
    fn as_any(&self) -> &dyn Any;
}

impl<T: 'static, S: 'static> ConsumerSlot for Consumer<T, S> {
    fn unmount(&mut self) -> bool {
        Consumer::unmount(self)
    }

    fn is_mounted(&self) -> bool {
        Consumer::is_mounted(self)
    }

    fn notifications(&self) -> u64 {
        Consumer::notifications(self)
    }

    fn transitions(&self) -> u64 {
        Consumer::transitions(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

enum NodeKind {
    Root,
    Group,
    Provider(Box<dyn ProviderSlot>),
    Consumer {
        slot: Box<dyn ConsumerSlot>,
        renders: Rc<Cell<u64>>,
    },
}

impl NodeKind {
    fn name(&self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Group => "group",
            Self::Provider(_) => "provider",
            Self::Consumer { .. } => "consumer",
        }
    }
}

struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    kind: NodeKind,
}

// ─── TreeHost ────────────────────────────────────────────────────────────────

/// Reference host for one [`Contexts`] registry.
pub struct TreeHost {
    contexts: Contexts,
    nodes: Vec<Option<Node>>,
    journal: Journal,
}

impl fmt::Debug for TreeHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeHost")
            .field("nodes", &self.node_count())
            .field("consumers", &self.mounted_consumers())
            .field("journal", &self.journal.len())
            .finish()
    }
}

impl TreeHost {
    /// Empty tree (just the root) reading through `contexts`.
    #[must_use]
    pub fn new(contexts: Contexts) -> Self {
        Self {
            contexts,
            nodes: vec![Some(Node {
                parent: None,
                children: Vec::new(),
                kind: NodeKind::Root,
            })],
            journal: Journal::default(),
        }
    }

    #[must_use]
    pub fn contexts(&self) -> &Contexts {
        &self.contexts
    }

    #[must_use]
    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Live nodes, root included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.iter().flatten().count()
    }

    /// Consumer nodes currently holding a subscription.
    #[must_use]
    pub fn mounted_consumers(&self) -> usize {
        self.nodes
            .iter()
            .flatten()
            .filter(|n| matches!(&n.kind, NodeKind::Consumer { slot, .. } if slot.is_mounted()))
            .count()
    }

    #[must_use]
    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.get(node.0).is_some_and(Option::is_some)
    }

    pub fn parent(&self, node: NodeId) -> Result<Option<NodeId>> {
        Ok(self.node(node)?.parent)
    }

    pub fn children(&self, node: NodeId) -> Result<&[NodeId]> {
        Ok(&self.node(node)?.children)
    }

    /// Kind name of a live node (`root`, `group`, `provider` or `consumer`).
    pub fn kind(&self, node: NodeId) -> Result<&'static str> {
        Ok(self.node(node)?.kind.name())
    }

    /// Render position of `node` for context lookups.
    pub fn scope(&self, node: NodeId) -> Result<NodeScope<'_>> {
        self.node(node)?;
        Ok(NodeScope { host: self, node })
    }

    // ── mounting ────────────────────────────────────────────────────────

    pub fn mount_group(&mut self, parent: NodeId) -> Result<NodeId> {
        self.node(parent)?;
        let node = self.attach(parent, NodeKind::Group);
        self.journal.push(HostEvent::MountGroup { node, parent });
        Ok(node)
    }

    /// Mount a Provider of `context` under `parent` with its first value.
    pub fn mount_provider<T: 'static>(
        &mut self,
        parent: NodeId,
        context: &Context<T>,
        value: Rc<T>,
    ) -> Result<NodeId> {
        self.node(parent)?;
        let binding = context.provide(value);
        let provider = binding.id().raw();
        let node = self.attach(parent, NodeKind::Provider(Box::new(binding)));
        self.journal.push(HostEvent::MountProvider {
            node,
            parent,
            topic: context.topic().raw(),
            provider,
        });
        Ok(node)
    }

    /// Mount a consumer reading `context` without a selector.
    pub fn mount_consumer<T: 'static>(
        &mut self,
        parent: NodeId,
        context: &Context<T>,
    ) -> Result<NodeId> {
        let consumer = self.contexts.try_read(context, &self.scope(parent)?)?;
        Ok(self.attach_consumer(parent, context.topic(), consumer, false))
    }

    /// Mount a consumer reading `selector(value)` of `context`.
    pub fn mount_consumer_with<T, S>(
        &mut self,
        parent: NodeId,
        context: &Context<T>,
        selector: impl Fn(&T) -> S + 'static,
    ) -> Result<NodeId>
    where
        T: 'static,
        S: PartialEq + 'static,
    {
        let consumer = self
            .contexts
            .try_read_with(context, &self.scope(parent)?, selector)?;
        Ok(self.attach_consumer(parent, context.topic(), consumer, true))
    }

    fn attach_consumer<T: 'static, S: 'static>(
        &mut self,
        parent: NodeId,
        topic: Topic,
        consumer: Consumer<T, S>,
        selector: bool,
    ) -> NodeId {
        let node = NodeId(self.nodes.len());
        let renders = Rc::new(Cell::new(1));
        let mut consumer = {
            let renders = Rc::clone(&renders);
            let journal = self.journal.clone();
            consumer.on_rerender(move || {
                renders.set(renders.get() + 1);
                journal.push(HostEvent::Rerender { node });
            })
        };
        // Journaled before `mount`, which re-renders if it catches up on a
        // newer value; that re-render must follow its mount event.
        self.journal.push(HostEvent::MountConsumer {
            node,
            parent,
            topic: topic.raw(),
            selector,
        });
        // The scope of a consumer's own node is its parent's: consumers
        // never provide.
        consumer.mount(&NodeScope { host: self, node: parent });
        let attached = self.attach(
            parent,
            NodeKind::Consumer {
                slot: Box::new(consumer),
                renders,
            },
        );
        debug_assert_eq!(attached, node);
        node
    }

    fn attach(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let node = NodeId(self.nodes.len());
        self.nodes.push(Some(Node {
            parent: Some(parent),
            children: Vec::new(),
            kind,
        }));
        if let Some(Some(p)) = self.nodes.get_mut(parent.0) {
            p.children.push(node);
        }
        node
    }

    // ── updates ─────────────────────────────────────────────────────────

    /// Re-render a Provider node with `value`.
    pub fn set_value<T: 'static>(&mut self, node: NodeId, value: Rc<T>) -> Result<RenderOutcome> {
        let slot = self.provider_mut(node)?;
        let topic = slot.topic();
        let binding = slot
            .as_any_mut()
            .downcast_mut::<ProviderBinding<T>>()
            .ok_or(HarnessError::TypeMismatch {
                node,
                expected: type_name::<T>(),
            })?;
        let outcome = binding.render(value);
        let (delivered, panicked) = outcome
            .report
            .map_or((0, 0), |r| (r.delivered, r.panicked));
        self.journal.push(HostEvent::SetValue {
            node,
            topic: topic.raw(),
            changed: outcome.changed,
            delivered,
            panicked,
        });
        Ok(outcome)
    }

    /// Current value of a Provider node.
    pub fn provider_value<T: 'static>(&mut self, node: NodeId) -> Result<Rc<T>> {
        let binding = self
            .provider_mut(node)?
            .as_any_mut()
            .downcast_mut::<ProviderBinding<T>>()
            .ok_or(HarnessError::TypeMismatch {
                node,
                expected: type_name::<T>(),
            })?;
        Ok(Rc::clone(binding.current()))
    }

    /// Unmount `node` and its whole subtree, children first.
    ///
    /// Returns the number of nodes removed.
    pub fn unmount(&mut self, node: NodeId) -> Result<usize> {
        if node == NodeId::ROOT {
            return Err(HarnessError::RootUnmount);
        }
        let parent = self.node(node)?.parent;

        let mut order = Vec::new();
        self.post_order(node, &mut order);
        for &id in &order {
            let Some(mut removed) = self.nodes.get_mut(id.0).and_then(Option::take) else {
                continue;
            };
            if let NodeKind::Consumer { slot, .. } = &mut removed.kind {
                slot.unmount();
            }
            self.journal.push(HostEvent::Unmount {
                node: id,
                kind: removed.kind.name(),
            });
        }
        if let Some(Some(p)) = parent.and_then(|p| self.nodes.get_mut(p.0)) {
            p.children.retain(|c| *c != node);
        }
        tracing::debug!(message = "host.unmount", node = node.0, removed = order.len());
        Ok(order.len())
    }

    fn post_order(&self, node: NodeId, out: &mut Vec<NodeId>) {
        if let Some(Some(n)) = self.nodes.get(node.0) {
            for &child in &n.children {
                self.post_order(child, out);
            }
        }
        out.push(node);
    }

    // ── consumer inspection ─────────────────────────────────────────────

    /// Times the consumer at `node` has rendered, counting its mount.
    pub fn render_count(&self, node: NodeId) -> Result<u64> {
        match &self.node(node)?.kind {
            NodeKind::Consumer { renders, .. } => Ok(renders.get()),
            _ => Err(wrong_kind(node, "consumer")),
        }
    }

    pub fn notifications(&self, node: NodeId) -> Result<u64> {
        Ok(self.consumer(node)?.notifications())
    }

    pub fn transitions(&self, node: NodeId) -> Result<u64> {
        Ok(self.consumer(node)?.transitions())
    }

    /// Stored state of a consumer node mounted with state type `S`.
    pub fn state<T: 'static, S: Clone + 'static>(&self, node: NodeId) -> Result<S> {
        self.consumer(node)?
            .as_any()
            .downcast_ref::<Consumer<T, S>>()
            .map(Consumer::get)
            .ok_or(HarnessError::TypeMismatch {
                node,
                expected: type_name::<Consumer<T, S>>(),
            })
    }

    /// Stored value of a consumer node mounted without a selector.
    pub fn value<T: 'static>(&self, node: NodeId) -> Result<Rc<T>> {
        self.state::<T, Rc<T>>(node)
    }

    // ── lookup helpers ──────────────────────────────────────────────────

    fn node(&self, node: NodeId) -> Result<&Node> {
        self.nodes
            .get(node.0)
            .and_then(Option::as_ref)
            .ok_or(HarnessError::UnknownNode { node })
    }

    fn provider_mut(&mut self, node: NodeId) -> Result<&mut dyn ProviderSlot> {
        match self.nodes.get_mut(node.0).and_then(Option::as_mut) {
            Some(Node {
                kind: NodeKind::Provider(slot),
                ..
            }) => Ok(&mut **slot),
            Some(_) => Err(wrong_kind(node, "provider")),
            None => Err(HarnessError::UnknownNode { node }),
        }
    }

    fn consumer(&self, node: NodeId) -> Result<&dyn ConsumerSlot> {
        match &self.node(node)?.kind {
            NodeKind::Consumer { slot, .. } => Ok(&**slot),
            _ => Err(wrong_kind(node, "consumer")),
        }
    }
}

fn wrong_kind(node: NodeId, expected: &'static str) -> HarnessError {
    HarnessError::WrongKind { node, expected }
}

// ─── Scope ───────────────────────────────────────────────────────────────────

/// Render position inside a [`TreeHost`]: `node` and its ancestors.
#[derive(Clone, Copy)]
pub struct NodeScope<'a> {
    host: &'a TreeHost,
    node: NodeId,
}

impl Scope for NodeScope<'_> {
    fn lookup(&self, key: ctxsel_core::ScopeKey) -> Option<Provided> {
        let mut cursor = Some(self.node);
        while let Some(id) = cursor {
            let node = self.host.nodes.get(id.0)?.as_ref()?;
            if let NodeKind::Provider(slot) = &node.kind {
                let provided = slot.provided();
                if provided.key() == key {
                    return Some(provided);
                }
            }
            cursor = node.parent;
        }
        None
    }
}

impl fmt::Debug for NodeScope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NodeScope").field(&self.node).finish()
    }
}
