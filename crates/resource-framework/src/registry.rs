//! # Resource Registry
//!
//! The registry holds one [`ResourceClass`] per resource id, keyed by name.
//! It is built once at startup from a [`SchemaDocument`], has factories bound
//! to it, and is then shared read-only by every runtime.
//!
//! ## Parent chains
//!
//! A class named `a.b.c` implies that `a` and `a.b` exist, that `a` has a
//! field `b` of type `a.b`, and that `a.b` has a field `c` of type `a.b.c`.
//! Missing ancestors are created as private stub classes. A public class
//! makes every ancestor (and the connecting fields) public. Closing the
//! chain is idempotent, so the final registry does not depend on the order
//! classes were added in.
//!
//! ## Copy-on-write
//!
//! Classes are stored behind `Arc`. Cloning a registry copies the map but
//! shares the classes; a clone that is modified only copies the classes it
//! touches, so the shared base registry never changes underneath a runtime.

use crate::error::{FrameworkError, Result};
use crate::resource::Resource;
use crate::runtime::Runtime;
use crate::schema::{FieldInfo, ResourceInfo, SchemaDocument};
use crate::value::{Args, FieldType};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Constructor bound to a class. Receives the runtime the instance is being
/// created in and the keyword arguments of the call.
pub type Factory = Arc<dyn Fn(&Runtime, Args) -> Result<Box<dyn Resource>> + Send + Sync>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
    pub mandatory: bool,
    /// Created by parent-chain closure rather than declared.
    pub implicit_resource: bool,
    pub private: bool,
}

impl FieldDef {
    fn implicit(name: &str, child: &str) -> Self {
        Self {
            name: name.to_owned(),
            field_type: FieldType::Resource(child.to_owned()),
            mandatory: false,
            implicit_resource: true,
            private: true,
        }
    }
}

impl From<FieldInfo> for FieldDef {
    fn from(info: FieldInfo) -> Self {
        Self {
            name: info.name,
            field_type: info.field_type,
            mandatory: info.mandatory,
            implicit_resource: info.implicit_resource,
            private: info.private,
        }
    }
}

impl From<&FieldDef> for FieldInfo {
    fn from(def: &FieldDef) -> Self {
        Self {
            name: def.name.clone(),
            field_type: def.field_type.clone(),
            mandatory: def.mandatory,
            private: def.private,
            implicit_resource: def.implicit_resource,
        }
    }
}

#[derive(Clone)]
pub struct ResourceClass {
    pub id: String,
    /// Display name. Differs from `id` for aliases.
    pub name: String,
    pub title: String,
    pub desc: String,
    pub min_version: String,
    /// Effective visibility after parent-chain closure.
    pub private: bool,
    /// Visibility as declared in the schema.
    pub declared_private: bool,
    /// Stub created by parent-chain closure, not declared yet.
    pub implicit: bool,
    pub list_type: bool,
    pub fields: BTreeMap<String, FieldDef>,
    pub factory: Option<Factory>,
}

impl ResourceClass {
    fn stub(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            name: id.to_owned(),
            title: String::new(),
            desc: String::new(),
            min_version: String::new(),
            private: true,
            declared_private: true,
            implicit: true,
            list_type: false,
            fields: BTreeMap::new(),
            factory: None,
        }
    }

    fn from_info(info: ResourceInfo) -> Self {
        Self {
            name: if info.name.is_empty() {
                info.id.clone()
            } else {
                info.name
            },
            id: info.id,
            title: info.title,
            desc: info.desc,
            min_version: info.min_version,
            private: info.private,
            declared_private: info.private,
            implicit: false,
            list_type: info.list_type,
            fields: info
                .fields
                .into_values()
                .map(|f| (f.name.clone(), FieldDef::from(f)))
                .collect(),
            factory: None,
        }
    }

    pub fn is_alias(&self) -> bool {
        self.name != self.id
    }

    pub fn has_factory(&self) -> bool {
        self.factory.is_some()
    }

    fn info(&self) -> ResourceInfo {
        ResourceInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            title: self.title.clone(),
            desc: self.desc.clone(),
            min_version: self.min_version.clone(),
            private: self.private,
            list_type: self.list_type,
            fields: self
                .fields
                .iter()
                .map(|(name, def)| (name.clone(), FieldInfo::from(def)))
                .collect(),
        }
    }

    /// Merges a later declaration of the same id into this class.
    fn merge(&mut self, info: ResourceInfo) -> Result<()> {
        let name = if info.name.is_empty() { info.id.clone() } else { info.name };

        if self.implicit {
            self.name = name;
            self.list_type = info.list_type;
            self.declared_private = info.private;
            self.private = info.private && self.private;
            self.implicit = false;
        } else {
            let conflict = |reason: String| FrameworkError::MergeConflict {
                id: self.id.clone(),
                reason,
            };
            if self.name != name {
                return Err(conflict(format!("name '{}' != '{}'", self.name, name)));
            }
            if self.list_type != info.list_type {
                return Err(conflict(format!(
                    "list type {} != {}",
                    self.list_type, info.list_type
                )));
            }
            if self.declared_private != info.private {
                return Err(conflict(format!(
                    "private {} != {}",
                    self.declared_private, info.private
                )));
            }
        }

        if self.title.is_empty() {
            self.title = info.title;
        }
        if self.desc.is_empty() {
            self.desc = info.desc;
        }
        if self.min_version.is_empty() {
            self.min_version = info.min_version;
        }

        for incoming in info.fields.into_values() {
            let incoming = FieldDef::from(incoming);
            match self.fields.get_mut(&incoming.name) {
                None => {
                    self.fields.insert(incoming.name.clone(), incoming);
                }
                Some(existing) if existing.implicit_resource && !incoming.implicit_resource => {
                    let private = existing.private && incoming.private;
                    *existing = FieldDef { private, ..incoming };
                }
                Some(existing) => existing.private = existing.private && incoming.private,
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceClass")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("private", &self.private)
            .field("implicit", &self.implicit)
            .field("list_type", &self.list_type)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .field("factory", &self.factory.is_some())
            .finish()
    }
}

#[derive(Clone, Debug, Default)]
pub struct Registry {
    classes: HashMap<String, Arc<ResourceClass>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from a schema document.
    pub fn from_schema(doc: &SchemaDocument) -> Result<Self> {
        let mut registry = Self::new();
        registry.load_schema(doc)?;
        Ok(registry)
    }

    /// Adds every class of `doc`, in id order. Stops at the first conflict.
    pub fn load_schema(&mut self, doc: &SchemaDocument) -> Result<()> {
        for info in doc.resources.values() {
            self.add_resource_info(info.clone())?;
        }
        debug!(resources = doc.resources.len(), classes = self.classes.len(), "Schema loaded");
        Ok(())
    }

    /// Inserts a class, or merges it into an existing class of the same id.
    pub fn add_resource_info(&mut self, mut info: ResourceInfo) -> Result<()> {
        if info.id.is_empty() {
            return Err(FrameworkError::Schema("resource info without an id".into()));
        }
        if info.name.is_empty() {
            info.name = info.id.clone();
        }
        let id = info.id.clone();
        let target = info.name.clone();
        let private = info.private;
        let is_alias = info.is_alias();

        match self.classes.get_mut(&id) {
            Some(existing) => Arc::make_mut(existing).merge(info)?,
            None => {
                self.classes
                    .insert(id.clone(), Arc::new(ResourceClass::from_info(info)));
            }
        }

        self.ensure_resource_chain(&id, private, false);
        if is_alias {
            self.ensure_resource_chain(&target, private, true);
        }
        Ok(())
    }

    /// Makes sure every dotted prefix of `name` exists and links to the next
    /// segment. A public `name` turns its whole chain public.
    pub fn ensure_resource_chain(&mut self, name: &str, private: bool, is_alias: bool) {
        if is_alias {
            let target = self.ensure_stub(name);
            if !private {
                target.private = false;
            }
        }

        let segments: Vec<&str> = name.split('.').collect();
        for i in 1..segments.len() {
            let parent_id = segments[..i].join(".");
            let child_id = segments[..=i].join(".");
            let segment = segments[i];

            let parent = self.ensure_stub(&parent_id);
            let field = parent
                .fields
                .entry(segment.to_owned())
                .or_insert_with(|| FieldDef::implicit(segment, &child_id));
            if !private {
                field.private = false;
                parent.private = false;
            }
        }
    }

    fn ensure_stub(&mut self, id: &str) -> &mut ResourceClass {
        let class = self
            .classes
            .entry(id.to_owned())
            .or_insert_with(|| Arc::new(ResourceClass::stub(id)));
        Arc::make_mut(class)
    }

    /// Binds a constructor to an already declared class.
    pub fn add_factory<F>(&mut self, name: &str, factory: F) -> Result<()>
    where
        F: Fn(&Runtime, Args) -> Result<Box<dyn Resource>> + Send + Sync + 'static,
    {
        let class = self
            .classes
            .get_mut(name)
            .ok_or_else(|| FrameworkError::UnknownFactoryBinding(name.to_owned()))?;
        Arc::make_mut(class).factory = Some(Arc::new(factory));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ResourceClass>> {
        self.classes.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<ResourceClass>> {
        self.classes.remove(name)
    }

    /// Follows aliases until a class that is not an alias.
    pub fn canonical(&self, name: &str) -> Result<&Arc<ResourceClass>> {
        let mut visited = HashSet::new();
        let mut key = name;
        loop {
            let class = self
                .classes
                .get(key)
                .ok_or_else(|| FrameworkError::ResourceNotFound(key.to_owned()))?;
            if class.name == key || !visited.insert(key) {
                return Ok(class);
            }
            key = &class.name;
        }
    }

    /// Finds the class to instantiate for `name`: follows aliases until a
    /// class with a factory. A non-alias class without a factory is returned
    /// as is and gets instantiated as a mock.
    pub fn resolve(&self, name: &str) -> Result<Arc<ResourceClass>> {
        let mut visited = HashSet::new();
        let mut key = name;
        loop {
            let class = self
                .classes
                .get(key)
                .ok_or_else(|| FrameworkError::ResourceNotFound(key.to_owned()))?;
            if class.factory.is_some() || class.name == key {
                return Ok(class.clone());
            }
            if !visited.insert(key) {
                return Err(FrameworkError::FactoryNotFound(name.to_owned()));
            }
            key = &class.name;
        }
    }

    pub fn fields(&self, name: &str) -> Result<&BTreeMap<String, FieldDef>> {
        Ok(&self.canonical(name)?.fields)
    }

    pub fn field(&self, name: &str, field: &str) -> Result<&FieldDef> {
        self.fields(name)?
            .get(field)
            .ok_or_else(|| FrameworkError::FieldNotFound {
                resource: name.to_owned(),
                field: field.to_owned(),
            })
    }

    /// All class ids, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.classes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Exports the registry as a schema document.
    pub fn schema(&self) -> SchemaDocument {
        SchemaDocument {
            resources: self
                .classes
                .iter()
                .map(|(id, class)| (id.clone(), class.info()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotted_names_create_private_parent_stubs() {
        let mut registry = Registry::new();
        registry
            .add_resource_info(ResourceInfo::new("a.b.c").private())
            .unwrap();

        let a = registry.get("a").unwrap();
        assert!(a.implicit && a.private);
        assert_eq!(
            a.fields["b"].field_type,
            FieldType::Resource("a.b".into())
        );
        assert!(a.fields["b"].implicit_resource);

        let ab = registry.get("a.b").unwrap();
        assert_eq!(ab.fields["c"].field_type, FieldType::Resource("a.b.c".into()));
        assert_eq!(registry.names(), vec!["a", "a.b", "a.b.c"]);
    }

    #[test]
    fn public_alias_flips_the_chain_public() {
        let mut registry = Registry::new();
        registry
            .add_resource_info(ResourceInfo::new("a.b.c").private())
            .unwrap();
        assert!(registry.get("a").unwrap().private);

        registry
            .add_resource_info(ResourceInfo::alias("abc", "a.b.c"))
            .unwrap();

        assert!(!registry.get("a").unwrap().private);
        assert!(!registry.get("a").unwrap().fields["b"].private);
        assert!(!registry.get("a.b").unwrap().private);
        assert!(!registry.get("a.b.c").unwrap().private);
        // declared privacy is untouched
        assert!(registry.get("a.b.c").unwrap().declared_private);
    }

    #[test]
    fn merge_conflicts_on_list_type() {
        let mut registry = Registry::new();
        registry.add_resource_info(ResourceInfo::new("users")).unwrap();
        let err = registry
            .add_resource_info(ResourceInfo::new("users").list_type())
            .unwrap_err();
        assert!(matches!(err, FrameworkError::MergeConflict { .. }));
    }

    #[test]
    fn merge_conflicts_on_alias_target() {
        let mut registry = Registry::new();
        registry
            .add_resource_info(ResourceInfo::alias("pkgs", "os.packages"))
            .unwrap();
        let err = registry
            .add_resource_info(ResourceInfo::alias("pkgs", "rpm.packages"))
            .unwrap_err();
        match err {
            FrameworkError::MergeConflict { id, reason } => {
                assert_eq!(id, "pkgs");
                assert!(reason.contains("rpm.packages"));
            }
            other => panic!("expected a merge conflict, got {other:?}"),
        }
        assert_eq!(registry.get("pkgs").unwrap().name, "os.packages");
    }

    #[test]
    fn merge_conflicts_on_declared_privacy() {
        let mut registry = Registry::new();
        registry.add_resource_info(ResourceInfo::new("file")).unwrap();
        let err = registry
            .add_resource_info(ResourceInfo::new("file").private())
            .unwrap_err();
        assert!(matches!(err, FrameworkError::MergeConflict { .. }));
        assert!(!registry.get("file").unwrap().private);

        // an implicit stub takes whatever the first explicit entry declares
        let mut stubbed = Registry::new();
        stubbed.add_resource_info(ResourceInfo::new("os.packages")).unwrap();
        stubbed.add_resource_info(ResourceInfo::new("os").private()).unwrap();
        let os = stubbed.get("os").unwrap();
        assert!(os.declared_private && !os.implicit);
    }

    #[test]
    fn merge_keeps_non_empty_title() {
        let mut registry = Registry::new();
        registry
            .add_resource_info(ResourceInfo::new("users").title("Users"))
            .unwrap();
        registry.add_resource_info(ResourceInfo::new("users")).unwrap();
        assert_eq!(registry.get("users").unwrap().title, "Users");

        let mut later = Registry::new();
        later.add_resource_info(ResourceInfo::new("users")).unwrap();
        later
            .add_resource_info(ResourceInfo::new("users").title("Users"))
            .unwrap();
        assert_eq!(later.get("users").unwrap().title, "Users");
    }

    #[test]
    fn explicit_declaration_replaces_implicit_stub() {
        let mut registry = Registry::new();
        registry.add_resource_info(ResourceInfo::new("os.packages")).unwrap();
        registry
            .add_resource_info(
                ResourceInfo::new("os")
                    .private()
                    .field(FieldInfo::new("hostname", "string")),
            )
            .unwrap();

        let os = registry.get("os").unwrap();
        assert!(!os.implicit);
        // a public child keeps the parent public
        assert!(!os.private);
        assert!(os.fields.contains_key("hostname"));
        assert!(os.fields.contains_key("packages"));
    }

    #[test]
    fn factories_bind_only_to_declared_classes() {
        let mut registry = Registry::new();
        let err = registry
            .add_factory("nope", |_, _| Err(FrameworkError::computation("unused")))
            .unwrap_err();
        assert_eq!(err, FrameworkError::UnknownFactoryBinding("nope".into()));
    }

    #[test]
    fn resolve_follows_aliases_and_detects_cycles() {
        let mut registry = Registry::new();
        registry.add_resource_info(ResourceInfo::new("os.packages")).unwrap();
        registry
            .add_resource_info(ResourceInfo::alias("packages", "os.packages"))
            .unwrap();

        // no factory: the target is handed out for mocking
        assert_eq!(registry.resolve("packages").unwrap().id, "os.packages");
        assert_eq!(registry.fields("packages").unwrap().len(), 0);

        registry.add_resource_info(ResourceInfo::alias("x", "y")).unwrap();
        registry.add_resource_info(ResourceInfo::alias("y", "x")).unwrap();
        assert_eq!(
            registry.resolve("x").unwrap_err(),
            FrameworkError::FactoryNotFound("x".into())
        );
        assert!(matches!(
            registry.resolve("missing"),
            Err(FrameworkError::ResourceNotFound(_))
        ));
    }

    #[test]
    fn clones_do_not_leak_into_the_base() {
        let mut base = Registry::new();
        base.add_resource_info(ResourceInfo::new("file")).unwrap();

        let mut local = base.clone();
        local
            .add_factory("file", |_, _| Err(FrameworkError::computation("unused")))
            .unwrap();
        local.remove("file");
        local.add_resource_info(ResourceInfo::new("mount")).unwrap();

        assert!(!base.get("file").unwrap().has_factory());
        assert!(base.get("mount").is_none());
        assert!(local.get("file").is_none());
    }
}
