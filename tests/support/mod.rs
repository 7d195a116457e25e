//! Shared test fixtures: a scriptable type system, an event recorder, an
//! in-memory snapshot sink and a map-backed dependency graph.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use serde_json::Value;

use vigil_config::{
    ActivationContext, ConfigError, ConfigItem, ConfigItemBuilder, ConfigObject, CreationKind,
    DebugHints, DebugInfo, DependencyGraph, Dictionary, Expression, FieldAttributes, FieldInfo,
    ItemRegistry, LifecycleEngine, NameComposer, ObjectType, PersistedItem, ScriptFrame,
    SnapshotSink, TypeRegistry, ValidationUtils,
};

pub type EventLog = Arc<Mutex<Vec<String>>>;

// ---------------------------------------------------------------------------
// TestWorld
// ---------------------------------------------------------------------------

/// One self-contained registry universe per test.
pub struct TestWorld {
    pub types: Arc<TypeRegistry>,
    pub items: Arc<ItemRegistry>,
    pub events: EventLog,
    pub snapshots: Arc<MemorySnapshotSink>,
}

impl TestWorld {
    pub fn new() -> Self {
        let types = Arc::new(TypeRegistry::new());
        Self {
            items: Arc::new(ItemRegistry::new(Arc::clone(&types))),
            types,
            events: Arc::new(Mutex::new(Vec::new())),
            snapshots: Arc::new(MemorySnapshotSink::default()),
        }
    }

    pub fn engine(&self) -> LifecycleEngine {
        LifecycleEngine::new(Arc::clone(&self.types), Arc::clone(&self.items))
            .with_snapshot_sink(Arc::clone(&self.snapshots) as Arc<dyn SnapshotSink>)
    }

    pub fn add_type(&self, name: &str) -> Arc<TestType> {
        self.add_type_with(name, Vec::new(), &[], None)
    }

    pub fn add_type_with(
        &self,
        name: &str,
        fields: Vec<FieldInfo>,
        deps: &[&str],
        composer: Option<Box<dyn NameComposer>>,
    ) -> Arc<TestType> {
        let ty = TestType::new(name, fields, deps, composer, Arc::clone(&self.events));
        self.types.register(Arc::clone(&ty) as Arc<dyn ObjectType>);
        ty
    }

    /// Build an item with a conventional debug path of
    /// `/etc/vigil/conf.d/<name>.conf`.
    pub fn item(
        &self,
        type_name: &str,
        name: &str,
        expression: Arc<dyn Expression>,
    ) -> Arc<ConfigItem> {
        ConfigItemBuilder::new()
            .object_type(type_name)
            .name(name)
            .expression(expression)
            .debug_info(DebugInfo::new(
                format!("/etc/vigil/conf.d/{name}.conf"),
                1,
                1,
                3,
                2,
            ))
            .compile()
            .expect("test item must compile")
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    /// Index of the first recorded event containing `needle`.
    pub fn event_index(&self, needle: &str) -> Option<usize> {
        self.events().iter().position(|e| e.contains(needle))
    }
}

// ---------------------------------------------------------------------------
// TestType
// ---------------------------------------------------------------------------

pub type ChildHook =
    Box<dyn Fn(&Arc<dyn ObjectType>, &ActivationContext) -> vigil_config::Result<()> + Send + Sync>;

pub struct TestType {
    name: String,
    pub fields: Vec<FieldInfo>,
    deps: Vec<String>,
    composer: Option<Box<dyn NameComposer>>,
    events: EventLog,
    objects: RwLock<HashMap<String, Arc<dyn ConfigObject>>>,
    me: Weak<TestType>,

    /// Failure injection for lifecycle hooks of objects of this type.
    pub fail_on_config_loaded: AtomicBool,
    pub fail_on_all_config_loaded: AtomicBool,
    pub fail_activate: AtomicBool,

    /// Invoked when `create_child_objects` fires on objects of this type.
    pub on_create_children: RwLock<Option<ChildHook>>,

    /// (field name, referenced type): `validate` checks that the string in
    /// the field names a registered, non-abstract item of that type.
    pub validate_reference: RwLock<Option<(String, String)>>,
}

impl TestType {
    pub fn new(
        name: &str,
        fields: Vec<FieldInfo>,
        deps: &[&str],
        composer: Option<Box<dyn NameComposer>>,
        events: EventLog,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            name: name.to_string(),
            fields,
            deps: deps.iter().map(|d| d.to_string()).collect(),
            composer,
            events,
            objects: RwLock::new(HashMap::new()),
            me: me.clone(),
            fail_on_config_loaded: AtomicBool::new(false),
            fail_on_all_config_loaded: AtomicBool::new(false),
            fail_activate: AtomicBool::new(false),
            on_create_children: RwLock::new(None),
            validate_reference: RwLock::new(None),
        })
    }

    pub fn object_count(&self) -> usize {
        self.objects.read().unwrap().len()
    }
}

impl ObjectType for TestType {
    fn name(&self) -> &str {
        &self.name
    }

    fn instantiate(&self) -> Arc<dyn ConfigObject> {
        TestObject::new(self.me.upgrade().expect("type outlives its objects"))
    }

    fn fields(&self) -> Vec<FieldInfo> {
        self.fields.clone()
    }

    fn load_dependencies(&self) -> Vec<String> {
        self.deps.clone()
    }

    fn name_composer(&self) -> Option<&dyn NameComposer> {
        self.composer.as_deref()
    }

    fn get_object(&self, name: &str) -> Option<Arc<dyn ConfigObject>> {
        self.objects.read().unwrap().get(name).cloned()
    }
}

// ---------------------------------------------------------------------------
// TestObject
// ---------------------------------------------------------------------------

struct ObjectState {
    name: String,
    short_name: String,
    zone: String,
    package: String,
    creation: CreationKind,
    fields: Vec<Value>,
    active: bool,
    extensions: Dictionary,
}

pub struct TestObject {
    ty: Arc<TestType>,
    me: Weak<TestObject>,
    state: Mutex<ObjectState>,
}

impl TestObject {
    fn new(ty: Arc<TestType>) -> Arc<Self> {
        let field_count = ty.fields.len();
        Arc::new_cyclic(|me| Self {
            ty,
            me: me.clone(),
            state: Mutex::new(ObjectState {
                name: String::new(),
                short_name: String::new(),
                zone: String::new(),
                package: String::new(),
                creation: CreationKind::Object,
                fields: vec![Value::Null; field_count],
                active: false,
                extensions: Dictionary::new(),
            }),
        })
    }

    fn record(&self, hook: &str) {
        let name = self.state.lock().unwrap().name.clone();
        self.ty
            .events
            .lock()
            .unwrap()
            .push(format!("{hook}:{}:{name}", self.ty.name));
    }
}

impl ConfigObject for TestObject {
    fn object_type(&self) -> Arc<dyn ObjectType> {
        Arc::clone(&self.ty) as Arc<dyn ObjectType>
    }

    fn name(&self) -> String {
        self.state.lock().unwrap().name.clone()
    }

    fn set_name(&self, name: &str) {
        self.state.lock().unwrap().name = name.to_string();
    }

    fn short_name(&self) -> String {
        self.state.lock().unwrap().short_name.clone()
    }

    fn set_short_name(&self, name: &str) {
        self.state.lock().unwrap().short_name = name.to_string();
    }

    fn set_zone_name(&self, zone: &str) {
        self.state.lock().unwrap().zone = zone.to_string();
    }

    fn set_package(&self, package: &str) {
        self.state.lock().unwrap().package = package.to_string();
    }

    fn creation_kind(&self) -> CreationKind {
        self.state.lock().unwrap().creation
    }

    fn set_creation_kind(&self, kind: CreationKind) {
        self.state.lock().unwrap().creation = kind;
    }

    fn get_field(&self, id: usize) -> Value {
        self.state
            .lock()
            .unwrap()
            .fields
            .get(id)
            .cloned()
            .unwrap_or(Value::Null)
    }

    fn set_field(&self, id: usize, value: Value) {
        let mut state = self.state.lock().unwrap();
        if id >= state.fields.len() {
            state.fields.resize(id + 1, Value::Null);
        }
        state.fields[id] = value;
    }

    fn validate(&self, mask: FieldAttributes, utils: &dyn ValidationUtils) -> vigil_config::Result<()> {
        if !mask.contains(FieldAttributes::CONFIG) {
            return Ok(());
        }

        let reference = self.ty.validate_reference.read().unwrap().clone();
        if let Some((field_name, ref_type)) = reference {
            let id = self
                .ty
                .fields
                .iter()
                .position(|f| f.name == field_name)
                .expect("validated field exists");

            if let Some(target) = self.get_field(id).as_str() {
                if !utils.validate_name(&ref_type, target) {
                    return Err(ConfigError::Validation {
                        message: format!(
                            "attribute '{field_name}' references unknown object '{target}'"
                        ),
                        debug_hints: None,
                    });
                }
            }
        }

        Ok(())
    }

    fn on_config_loaded(&self) -> vigil_config::Result<()> {
        self.record("on_config_loaded");
        if self.ty.fail_on_config_loaded.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("on_config_loaded failure injected").into());
        }
        Ok(())
    }

    fn on_all_config_loaded(&self) -> vigil_config::Result<()> {
        self.record("on_all_config_loaded");
        if self.ty.fail_on_all_config_loaded.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("on_all_config_loaded failure injected").into());
        }
        Ok(())
    }

    fn create_child_objects(
        &self,
        child_type: &Arc<dyn ObjectType>,
        ctx: &ActivationContext,
    ) -> vigil_config::Result<()> {
        self.record(&format!("create_child_objects[{}]", child_type.name()));

        let hook = self.ty.on_create_children.read().unwrap();
        if let Some(hook) = hook.as_ref() {
            hook(child_type, ctx)?;
        }

        Ok(())
    }

    fn pre_activate(&self) -> vigil_config::Result<()> {
        self.record("pre_activate");
        Ok(())
    }

    fn activate(&self, _runtime_created: bool) -> vigil_config::Result<()> {
        self.record("activate");
        if self.ty.fail_activate.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("activate failure injected").into());
        }
        self.state.lock().unwrap().active = true;
        Ok(())
    }

    fn deactivate(&self, _expected: bool) {
        self.record("deactivate");
        self.state.lock().unwrap().active = false;
    }

    fn is_active(&self) -> bool {
        self.state.lock().unwrap().active
    }

    fn register(&self) {
        let this = self.me.upgrade().expect("object alive during register");
        let name = self.name();
        self.ty
            .objects
            .write()
            .unwrap()
            .insert(name, this as Arc<dyn ConfigObject>);
    }

    fn unregister(&self) {
        let name = self.name();
        self.ty.objects.write().unwrap().remove(&name);
    }

    fn set_extension(&self, key: &str, value: Value) {
        self.state
            .lock()
            .unwrap()
            .extensions
            .insert(key.to_string(), value);
    }

    fn extension(&self, key: &str) -> Option<Value> {
        self.state.lock().unwrap().extensions.get(key).cloned()
    }
}

// ---------------------------------------------------------------------------
// Composer, sink, dependency graph
// ---------------------------------------------------------------------------

/// Composes `<host>!<short>` from the object's host field, the way
/// service-like types derive their canonical names.
pub struct HostAwareComposer {
    pub host_field: String,
}

impl NameComposer for HostAwareComposer {
    fn make_name(&self, short_name: &str, object: &Arc<dyn ConfigObject>) -> String {
        let id = object
            .object_type()
            .fields()
            .iter()
            .position(|f| f.name == self.host_field);

        let host = id
            .map(|id| object.get_field(id))
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();

        if host.is_empty() {
            return String::new();
        }

        format!("{host}!{short_name}")
    }
}

#[derive(Default)]
pub struct MemorySnapshotSink {
    records: Mutex<Vec<PersistedItem>>,
}

impl MemorySnapshotSink {
    pub fn records(&self) -> Vec<PersistedItem> {
        self.records.lock().unwrap().clone()
    }
}

impl SnapshotSink for MemorySnapshotSink {
    fn write_object(&self, record: &PersistedItem) -> vigil_config::Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Dependency graph over explicit (child, parent) edges compared by
/// object identity.
#[derive(Default)]
pub struct MapDependencyGraph {
    edges: Mutex<Vec<(Arc<dyn ConfigObject>, Arc<dyn ConfigObject>)>>,
}

impl MapDependencyGraph {
    pub fn add_parent(&self, object: &Arc<dyn ConfigObject>, parent: &Arc<dyn ConfigObject>) {
        self.edges
            .lock()
            .unwrap()
            .push((Arc::clone(object), Arc::clone(parent)));
    }
}

impl DependencyGraph for MapDependencyGraph {
    fn parents(&self, object: &Arc<dyn ConfigObject>) -> Vec<Arc<dyn ConfigObject>> {
        self.edges
            .lock()
            .unwrap()
            .iter()
            .filter(|(child, _)| Arc::ptr_eq(child, object))
            .map(|(_, parent)| Arc::clone(parent))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Expression helpers
// ---------------------------------------------------------------------------

pub fn field_index(object: &Arc<dyn ConfigObject>, name: &str) -> usize {
    object
        .object_type()
        .fields()
        .iter()
        .position(|f| f.name == name)
        .unwrap_or_else(|| panic!("unknown field '{name}'"))
}

pub fn get_named_field(object: &Arc<dyn ConfigObject>, name: &str) -> Value {
    object.get_field(field_index(object, name))
}

pub fn set_named_field(object: &Arc<dyn ConfigObject>, name: &str, value: Value) {
    object.set_field(field_index(object, name), value);
}

pub fn set_this_field(frame: &ScriptFrame, name: &str, value: Value) -> vigil_config::Result<()> {
    let this = frame
        .this
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("expression requires a receiver object"))?;
    set_named_field(this, name, value);
    Ok(())
}

/// Expression assigning the given fields on the receiver.
pub fn assign_expr(pairs: &[(&str, Value)]) -> Arc<dyn Expression> {
    let pairs: Vec<(String, Value)> = pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect();

    Arc::new(
        move |frame: &mut ScriptFrame, _: &mut DebugHints| -> vigil_config::Result<Value> {
            for (name, value) in &pairs {
                set_this_field(frame, name, value.clone())?;
            }
            Ok(Value::Null)
        },
    )
}

/// Expression that always fails evaluation.
pub fn failing_expr(message: &'static str) -> Arc<dyn Expression> {
    Arc::new(
        move |_: &mut ScriptFrame, _: &mut DebugHints| -> vigil_config::Result<Value> {
            Err(anyhow::anyhow!(message).into())
        },
    )
}

/// Wrap a closure as an expression.
pub fn expr<F>(f: F) -> Arc<dyn Expression>
where
    F: Fn(&mut ScriptFrame, &mut DebugHints) -> vigil_config::Result<Value>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}
