#![forbid(unsafe_code)]

//! Context registry, Provider bindings and selector-filtered consumers.
//!
//! The flow is: a [`Contexts`] registry creates a [`Context<T>`]; the host
//! mounts a [`ProviderBinding`] for each Provider instance and exposes its
//! [`Provided`] record through its [`Scope`]; every call site that reads the
//! context holds a [`Consumer`] that subscribes on mount, re-applies its
//! selector to each accepted change, and asks the host to re-render only
//! when its stored state transitions.
//!
//! ```
//! use std::rc::Rc;
//! use ctxsel_runtime::Contexts;
//!
//! let contexts = Contexts::new();
//! let count = contexts.create_context(0);
//! let mut provider = count.provide(Rc::new(1));
//! let scope = vec![provider.provided()];
//!
//! let mut parity = count.read_with(&scope, |v| v % 2).unwrap();
//! parity.mount(&scope);
//! let _ = provider.render(Rc::new(3));
//! assert_eq!(parity.get(), 1);
//! assert_eq!(parity.transitions(), 0);
//! ```

pub mod config;
pub mod consumer;
pub mod error;
pub mod provider;
pub mod registry;
pub mod scope;

pub use config::{ContextsConfig, ValueSource};
pub use consumer::Consumer;
pub use error::{ContextError, Result};
pub use provider::{ProviderBinding, RenderOutcome};
pub use registry::{Context, Contexts};
pub use scope::{AnyValue, Detached, Notification, Provided, ProviderId, Rerender, Scope};

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::layer::SubscriberExt;

    /// Collects the `message` field of every event.
    struct Messages(Arc<Mutex<Vec<String>>>);

    struct MessageVisitor<'a>(&'a mut Option<String>);

    impl tracing::field::Visit for MessageVisitor<'_> {
        fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
            if field.name() == "message" {
                *self.0 = Some(value.to_owned());
            }
        }

        fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
            if field.name() == "message" {
                *self.0 = Some(format!("{value:?}").trim_matches('"').to_owned());
            }
        }
    }

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for Messages {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            let mut message = None;
            event.record(&mut MessageVisitor(&mut message));
            if let Some(message) = message
                && let Ok(mut log) = self.0.lock()
            {
                log.push(message);
            }
        }
    }

    #[test]
    fn lifecycle_emits_structured_events() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::registry().with(Messages(Arc::clone(&log)));

        tracing::subscriber::with_default(subscriber, || {
            let reg = Contexts::new();
            let ctx = reg.create_context(0);
            let mut provider = ctx.provide(Rc::new(1));
            let scope = vec![provider.provided()];
            let mut c = ctx.read(&scope).expect("live registry");
            c.mount(&scope);
            let _ = provider.render(Rc::new(2));
            c.unmount();
        });

        let log = log.lock().expect("log lock");
        for expected in [
            "registry.create",
            "consumer.subscribe",
            "provider.change",
            "consumer.unsubscribe",
        ] {
            assert!(
                log.iter().any(|m| m == expected),
                "missing {expected} in {log:?}"
            );
        }
    }

    #[test]
    fn bad_config_is_logged() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::registry().with(Messages(Arc::clone(&log)));

        let cfg = tracing::subscriber::with_default(subscriber, || {
            ContextsConfig::default().apply_vars(|name| {
                (name == "CTXSEL_VALUE_SOURCE").then(|| "elsewhere".to_owned())
            })
        });
        assert_eq!(cfg, ContextsConfig::default());
        let log = log.lock().expect("log lock");
        assert!(log.iter().any(|m| m == "config.ignored"));
    }
}
