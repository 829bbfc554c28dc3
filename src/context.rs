//! The per-request sanitization context.

use std::fmt;

use crate::audit::{AuditEvent, AuditTrail};
use crate::config::TaintConfig;
use crate::error::Result;
use crate::html::{ContextClassifier, MarkupClassifier};
use crate::sanitizer::{Sanitizer, SanitizerRegistry};

/// Explicit execution context for sanitization.
///
/// `Ctx` bundles everything a sanitizing call needs: the sanitizer registry
/// that policy references resolve against, the HTML context classifier, the
/// runtime configuration and the audit trail. It is passed explicitly to
/// every operation that sanitizes, so there is no ambient state to set up or
/// tear down.
///
/// `Ctx` is not `Sync`: its audit trail records through a `RefCell`.
///
/// # Examples
///
/// ```
/// use policy_taint::{Ctx, TaintedString, SQL};
///
/// let ctx = Ctx::builder()
///     .sanitizer("redact", |s: &str| "#".repeat(s.chars().count()))
///     .build()
///     .expect("valid configuration");
///
/// assert!(ctx.registry().contains("redact"));
/// assert!(ctx.registry().contains("no_html"));
///
/// let out = TaintedString::default_tainted("it's").transform(SQL, None, &ctx).unwrap();
/// assert_eq!(out, "it''s");
/// ```
pub struct Ctx {
    registry: SanitizerRegistry,
    classifier: Box<dyn ContextClassifier>,
    config: TaintConfig,
    audit: AuditTrail,
}

impl Ctx {
    /// Creates a context with the built-in sanitizers, the markup
    /// classifier and the default configuration.
    pub fn new() -> Self {
        Self {
            registry: SanitizerRegistry::with_builtins(),
            classifier: Box::new(MarkupClassifier),
            config: TaintConfig::default(),
            audit: AuditTrail::new(),
        }
    }

    /// Starts building a customized context.
    pub fn builder() -> CtxBuilder {
        CtxBuilder::new()
    }

    /// Returns the sanitizer registry.
    pub fn registry(&self) -> &SanitizerRegistry {
        &self.registry
    }

    /// Returns the HTML context classifier.
    pub fn classifier(&self) -> &dyn ContextClassifier {
        self.classifier.as_ref()
    }

    /// Returns the runtime configuration.
    pub fn config(&self) -> &TaintConfig {
        &self.config
    }

    /// Returns the audit trail.
    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    /// Records an audit event unless auditing is disabled.
    pub(crate) fn record(&self, event: AuditEvent) {
        if self.config.audit {
            self.audit.record(event);
        }
    }
}

impl Default for Ctx {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Ctx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ctx")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field("audit_events", &self.audit.len())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Ctx`].
///
/// Starts from the built-in sanitizers, the markup classifier and the
/// default configuration.
pub struct CtxBuilder {
    registry: SanitizerRegistry,
    classifier: Box<dyn ContextClassifier>,
    config: TaintConfig,
}

impl CtxBuilder {
    fn new() -> Self {
        Self {
            registry: SanitizerRegistry::with_builtins(),
            classifier: Box::new(MarkupClassifier),
            config: TaintConfig::default(),
        }
    }

    /// Registers an additional sanitizer, replacing any entry of the same
    /// name.
    pub fn sanitizer(
        mut self,
        name: impl Into<String>,
        sanitizer: impl Sanitizer + 'static,
    ) -> Self {
        self.registry.register(name, sanitizer);
        self
    }

    /// Replaces the whole registry.
    pub fn registry(mut self, registry: SanitizerRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Replaces the HTML context classifier.
    pub fn classifier(mut self, classifier: impl ContextClassifier + 'static) -> Self {
        self.classifier = Box::new(classifier);
        self
    }

    /// Replaces the configuration.
    pub fn config(mut self, config: TaintConfig) -> Self {
        self.config = config;
        self
    }

    /// Validates the configuration and builds the context.
    ///
    /// # Errors
    ///
    /// Returns [`TaintError::Config`](crate::TaintError::Config) if the
    /// configuration is out of range.
    pub fn build(self) -> Result<Ctx> {
        self.config.validate()?;
        tracing::debug!(
            sanitizers = self.registry.len(),
            max_composed = self.config.max_composed,
            "sanitization context built"
        );
        Ok(Ctx {
            registry: self.registry,
            classifier: self.classifier,
            config: self.config,
            audit: AuditTrail::new(),
        })
    }
}
