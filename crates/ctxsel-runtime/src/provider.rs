#![forbid(unsafe_code)]

//! Provider binding: expose a value to a subtree and publish its changes.
//!
//! A [`ProviderBinding`] is created once per Provider instance by
//! [`Context::provide`] and then driven by the host on every render.
//! The first value is exposed but never published. Each later render whose
//! value is not the same allocation as the previous render's updates the
//! exposure first and then emits one [`Notification`] on the context topic.

use std::fmt;
use std::rc::Rc;

use ctxsel_core::EmitReport;

use crate::config::ValueSource;
use crate::registry::Context;
use crate::scope::{AnyValue, Notification, Provided, ProviderId};

/// What a single [`ProviderBinding::render`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOutcome {
    /// The value differed from the previous render's value.
    pub changed: bool,
    /// Delivery report, present when a notification was emitted.
    pub report: Option<EmitReport>,
}

/// One mounted Provider of a context.
pub struct ProviderBinding<T> {
    id: ProviderId,
    context: Context<T>,
    provided: Provided,
    current: Rc<T>,
    renders: u64,
    emits: u64,
}

impl<T: 'static> ProviderBinding<T> {
    pub(crate) fn mount(context: Context<T>, value: Rc<T>) -> Self {
        let id = ProviderId::mint();
        let erased: AnyValue = value.clone();
        let provided = Provided::new(context.scope_key(), id, Rc::clone(&erased));
        if let Ok(registry) = context.registry()
            && registry.value_source() == ValueSource::SideCache
        {
            registry.write_cache(context.topic(), erased);
        }
        Self {
            id,
            context,
            provided,
            current: value,
            renders: 1,
            emits: 0,
        }
    }

    /// Re-render with `value`.
    ///
    /// A reference-identical value is a no-op. Otherwise the exposed value is
    /// replaced and, if the registry is still alive, every subscribed
    /// consumer is notified before this returns.
    ///
    /// # Panics
    ///
    /// Propagates a listener panic when the bus does not isolate panics.
    pub fn render(&mut self, value: Rc<T>) -> RenderOutcome {
        self.renders += 1;
        if Rc::ptr_eq(&self.current, &value) {
            return RenderOutcome {
                changed: false,
                report: None,
            };
        }
        let erased: AnyValue = value.clone();
        self.current = value;
        self.provided.replace(Rc::clone(&erased));

        let Ok(registry) = self.context.registry() else {
            return RenderOutcome {
                changed: true,
                report: None,
            };
        };
        let topic = self.context.topic();
        if registry.value_source() == ValueSource::SideCache {
            registry.write_cache(topic, Rc::clone(&erased));
        }
        tracing::debug!(
            message = "provider.change",
            topic = topic.raw(),
            provider = self.id.raw(),
            renders = self.renders
        );
        self.emits += 1;
        let report = registry.bus().emit(
            topic,
            &Notification {
                origin: self.id,
                value: erased,
            },
        );
        RenderOutcome {
            changed: true,
            report: Some(report),
        }
    }
}

impl<T> ProviderBinding<T> {
    /// Record the host attaches to this Provider's node.
    #[must_use]
    pub fn provided(&self) -> Provided {
        self.provided.clone()
    }

    /// Identity of this Provider instance.
    #[must_use]
    pub fn id(&self) -> ProviderId {
        self.id
    }

    /// Context this Provider serves.
    #[must_use]
    pub fn context(&self) -> &Context<T> {
        &self.context
    }

    /// Value of the most recent render.
    #[must_use]
    pub fn current(&self) -> &Rc<T> {
        &self.current
    }

    /// Renders so far, including the mounting one.
    #[must_use]
    pub fn renders(&self) -> u64 {
        self.renders
    }

    /// Notifications published so far.
    #[must_use]
    pub fn emits(&self) -> u64 {
        self.emits
    }
}

impl<T: fmt::Debug> fmt::Debug for ProviderBinding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderBinding")
            .field("id", &self.id)
            .field("topic", &self.context.topic())
            .field("current", &self.current)
            .field("renders", &self.renders)
            .field("emits", &self.emits)
            .finish()
    }
}
