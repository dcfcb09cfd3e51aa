#![forbid(unsafe_code)]

//! Registry configuration.

use std::env;

use ctxsel_core::BusConfig;

/// Where a consumer finds the current value when it mounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueSource {
    /// The host's native scoping resolves the nearest enclosing Provider.
    /// Consumers only accept notifications from the Provider they resolved.
    #[default]
    NativeScope,
    /// One cache slot per context, written by every Provider of that context.
    /// Consumers accept notifications from any Provider of the context.
    SideCache,
}

impl ValueSource {
    /// Parse `scope`/`native` or `cache`/`side-cache` (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scope" | "native" | "native-scope" => Some(Self::NativeScope),
            "cache" | "side-cache" => Some(Self::SideCache),
            _ => None,
        }
    }
}

/// Configuration for a [`Contexts`](crate::Contexts) registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContextsConfig {
    /// Source of truth for the current value. Default: native scope.
    pub value_source: ValueSource,
    /// Configuration for the registry-owned bus. Ignored when a bus is
    /// injected with [`Contexts::with_bus`](crate::Contexts::with_bus).
    pub bus: BusConfig,
}

impl ContextsConfig {
    /// Set the value source.
    #[must_use]
    pub fn value_source(mut self, source: ValueSource) -> Self {
        self.value_source = source;
        self
    }

    /// Set whether listener panics are isolated on the owned bus.
    #[must_use]
    pub fn isolate_panics(mut self, isolate: bool) -> Self {
        self.bus = self.bus.isolate_panics(isolate);
        self
    }

    /// Defaults overridden by `CTXSEL_VALUE_SOURCE` and
    /// `CTXSEL_ISOLATE_PANICS`.
    ///
    /// Unparseable values are ignored and logged at WARN.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().apply_vars(|name| env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    #[must_use]
    pub fn apply_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(val) = var("CTXSEL_VALUE_SOURCE") {
            match ValueSource::parse(&val) {
                Some(source) => self.value_source = source,
                None => tracing::warn!(
                    message = "config.ignored",
                    var = "CTXSEL_VALUE_SOURCE",
                    value = %val
                ),
            }
        }
        if let Some(val) = var("CTXSEL_ISOLATE_PANICS") {
            match parse_flag(&val) {
                Some(flag) => self.bus.isolate_panics = flag,
                None => tracing::warn!(
                    message = "config.ignored",
                    var = "CTXSEL_ISOLATE_PANICS",
                    value = %val
                ),
            }
        }
        self
    }
}

fn parse_flag(val: &str) -> Option<bool> {
    if val == "1" || val.eq_ignore_ascii_case("true") {
        Some(true)
    } else if val == "0" || val.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |name| {
            pairs
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| (*v).to_string())
        }
    }

    #[test]
    fn defaults() {
        let cfg = ContextsConfig::default();
        assert_eq!(cfg.value_source, ValueSource::NativeScope);
        assert!(cfg.bus.isolate_panics);
    }

    #[test]
    fn builder_methods() {
        let cfg = ContextsConfig::default()
            .value_source(ValueSource::SideCache)
            .isolate_panics(false);
        assert_eq!(cfg.value_source, ValueSource::SideCache);
        assert!(!cfg.bus.isolate_panics);
    }

    #[test]
    fn vars_override_defaults() {
        let cfg = ContextsConfig::default().apply_vars(vars(&[
            ("CTXSEL_VALUE_SOURCE", "Cache"),
            ("CTXSEL_ISOLATE_PANICS", "false"),
        ]));
        assert_eq!(cfg.value_source, ValueSource::SideCache);
        assert!(!cfg.bus.isolate_panics);
    }

    #[test]
    fn bad_vars_are_ignored() {
        let cfg = ContextsConfig::default().apply_vars(vars(&[
            ("CTXSEL_VALUE_SOURCE", "somewhere"),
            ("CTXSEL_ISOLATE_PANICS", "maybe"),
        ]));
        assert_eq!(cfg, ContextsConfig::default());
    }

    #[test]
    fn value_source_aliases() {
        assert_eq!(ValueSource::parse(" native "), Some(ValueSource::NativeScope));
        assert_eq!(ValueSource::parse("side-cache"), Some(ValueSource::SideCache));
        assert_eq!(ValueSource::parse(""), None);
    }
}
