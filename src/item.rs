//! Config items: declarative, pre-instantiation records.
//!
//! An item is created once by the configuration compiler and is immutable
//! afterwards except for three things: the registration stamp applied by
//! the registry, the attached object once commit succeeds, and the
//! expression reference, which is dropped after committing a single-use
//! item.

use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};

use crate::context::ActivationContext;
use crate::debuginfo::DebugInfo;
use crate::error::{ConfigError, Result};
use crate::expression::Expression;
use crate::object::ConfigObject;
use crate::Dictionary;

/// How an object came to exist. Consulted by the reload rollback policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreationKind {
    #[default]
    Object,
    Template,
    Apply,
}

impl CreationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Object => "object",
            Self::Template => "template",
            Self::Apply => "apply",
        }
    }
}

impl std::fmt::Display for CreationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Registration {
    pub context: ActivationContext,
    pub sequence: u64,
}

/// A declarative description of one to-be-instantiated config object.
pub struct ConfigItem {
    type_name: String,
    name: String,
    abstract_item: bool,
    expression: RwLock<Option<Arc<dyn Expression>>>,
    filter: Option<Arc<dyn Expression>>,
    default_template: bool,
    ignore_on_error: bool,
    debug_info: DebugInfo,
    scope: Dictionary,
    zone: String,
    package: String,
    creation: CreationKind,
    registration: Mutex<Option<Registration>>,
    object: RwLock<Option<Arc<dyn ConfigObject>>>,
}

impl ConfigItem {
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Abstract items contribute fields by inheritance but never produce
    /// an object of their own.
    pub fn is_abstract(&self) -> bool {
        self.abstract_item
    }

    pub fn is_default_template(&self) -> bool {
        self.default_template
    }

    pub fn is_ignore_on_error(&self) -> bool {
        self.ignore_on_error
    }

    pub fn debug_info(&self) -> &DebugInfo {
        &self.debug_info
    }

    pub fn scope(&self) -> &Dictionary {
        &self.scope
    }

    pub fn zone(&self) -> &str {
        &self.zone
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn creation_kind(&self) -> CreationKind {
        self.creation
    }

    /// The item's expression; `None` once a single-use expression has been
    /// discarded by commit.
    pub fn expression(&self) -> Option<Arc<dyn Expression>> {
        self.expression.read().unwrap().clone()
    }

    /// The object filter for apply-style items, if any.
    pub fn filter(&self) -> Option<Arc<dyn Expression>> {
        self.filter.clone()
    }

    /// The instantiated object; `None` until commit succeeds and after
    /// unregistration.
    pub fn object(&self) -> Option<Arc<dyn ConfigObject>> {
        self.object.read().unwrap().clone()
    }

    /// The batch this item was registered under.
    pub fn activation_context(&self) -> Option<ActivationContext> {
        self.registration
            .lock()
            .unwrap()
            .as_ref()
            .map(|r| r.context.clone())
    }

    pub(crate) fn set_registration(&self, registration: Registration) {
        *self.registration.lock().unwrap() = Some(registration);
    }

    pub(crate) fn registration_sequence(&self) -> Option<u64> {
        self.registration.lock().unwrap().as_ref().map(|r| r.sequence)
    }

    pub(crate) fn attach_object(&self, object: Arc<dyn ConfigObject>) {
        *self.object.write().unwrap() = Some(object);
    }

    pub(crate) fn detach_object(&self) -> Option<Arc<dyn ConfigObject>> {
        self.object.write().unwrap().take()
    }

    pub(crate) fn discard_expression(&self) {
        *self.expression.write().unwrap() = None;
    }
}

impl std::fmt::Debug for ConfigItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigItem")
            .field("type_name", &self.type_name)
            .field("name", &self.name)
            .field("abstract", &self.abstract_item)
            .field("creation", &self.creation)
            .field("debug_info", &self.debug_info)
            .finish_non_exhaustive()
    }
}

/// Fluent builder for [`ConfigItem`], used by the configuration compiler
/// and by the engine when synthesizing ephemeral reload items.
#[derive(Default)]
pub struct ConfigItemBuilder {
    type_name: String,
    name: String,
    abstract_item: bool,
    expression: Option<Arc<dyn Expression>>,
    filter: Option<Arc<dyn Expression>>,
    default_template: bool,
    ignore_on_error: bool,
    debug_info: DebugInfo,
    scope: Dictionary,
    zone: String,
    package: String,
    creation: CreationKind,
}

impl ConfigItemBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object_type(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = type_name.into();
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn abstract_item(mut self, abstract_item: bool) -> Self {
        self.abstract_item = abstract_item;
        self
    }

    pub fn expression(mut self, expression: Arc<dyn Expression>) -> Self {
        self.expression = Some(expression);
        self
    }

    pub fn filter(mut self, filter: Arc<dyn Expression>) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn default_template(mut self, default_template: bool) -> Self {
        self.default_template = default_template;
        self
    }

    pub fn ignore_on_error(mut self, ignore_on_error: bool) -> Self {
        self.ignore_on_error = ignore_on_error;
        self
    }

    pub fn debug_info(mut self, debug_info: DebugInfo) -> Self {
        self.debug_info = debug_info;
        self
    }

    pub fn scope(mut self, scope: Dictionary) -> Self {
        self.scope = scope;
        self
    }

    pub fn zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = zone.into();
        self
    }

    pub fn package(mut self, package: impl Into<String>) -> Self {
        self.package = package.into();
        self
    }

    pub fn creation(mut self, creation: CreationKind) -> Self {
        self.creation = creation;
        self
    }

    pub fn compile(self) -> Result<Arc<ConfigItem>> {
        if self.type_name.is_empty() {
            return Err(ConfigError::InvalidItem("type must be specified".into()));
        }

        if self.name.is_empty() {
            return Err(ConfigError::InvalidItem("name must be specified".into()));
        }

        let expression = self
            .expression
            .ok_or_else(|| ConfigError::InvalidItem("expression must be specified".into()))?;

        Ok(Arc::new(ConfigItem {
            type_name: self.type_name,
            name: self.name,
            abstract_item: self.abstract_item,
            expression: RwLock::new(Some(expression)),
            filter: self.filter,
            default_template: self.default_template,
            ignore_on_error: self.ignore_on_error,
            debug_info: self.debug_info,
            scope: self.scope,
            zone: self.zone,
            package: self.package,
            creation: self.creation,
            registration: Mutex::new(None),
            object: RwLock::new(None),
        }))
    }
}
