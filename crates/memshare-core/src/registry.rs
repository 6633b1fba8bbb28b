//! Per-process table of owned and viewed shared variables

use crate::container::LazyContainer;
use crate::meta::Metadata;
use crate::object::SharedObject;
use crate::platform;
use crate::value::Shareable;
use crate::{Error, Result};
use log::{info, warn};
use std::collections::BTreeMap;
use std::rc::Rc;

/// OS names of one variable's two regions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedName {
    /// `{namespace}.{name}`, the registry key
    pub key: String,
    /// Scope prefix plus key
    pub data: String,
    /// Scope prefix plus `{namespace}.metadata.{name}`
    pub meta: String,
}

impl QualifiedName {
    /// Derive the key and both OS names of `namespace.name` under `scope`.
    pub fn new(scope: &str, namespace: &str, name: &str) -> Result<Self> {
        check_part("namespace", namespace)?;
        check_part("variable name", name)?;
        Ok(Self {
            key: format!("{}.{}", namespace, name),
            data: format!("{}{}.{}", scope, namespace, name),
            meta: format!("{}{}.metadata.{}", scope, namespace, name),
        })
    }
}

fn check_part(what: &str, part: &str) -> Result<()> {
    if part.is_empty() {
        return Err(Error::InvalidName(format!("{} is empty", what)));
    }
    if part.contains(['/', '\\', '\0']) {
        return Err(Error::InvalidName(format!(
            "{} {:?} contains a path separator or NUL",
            what, part
        )));
    }
    Ok(())
}

/// Owned and viewed shared variables of this process.
///
/// At most one owner exists per name; views are cached so that repeated
/// lookups of the same name share one attachment. Dropping the registry
/// releases every view first and then every owned variable.
///
/// Viewers must not attach before the owner's `register` has returned.
/// Nothing here signals that a region is completely filled; that ordering
/// has to come from whatever coordinates the processes.
pub struct Registry {
    scope: String,
    owned: BTreeMap<String, SharedObject>,
    viewed: BTreeMap<String, Rc<SharedObject>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create a registry using the platform's default name scope
    pub fn new() -> Self {
        Self::with_scope(platform::SCOPE_PREFIX)
    }

    /// Create a registry with a custom prefix in front of every OS name
    pub fn with_scope(scope: &str) -> Self {
        Self {
            scope: scope.to_string(),
            owned: BTreeMap::new(),
            viewed: BTreeMap::new(),
        }
    }

    /// Prefix put in front of every OS name
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Names this registry would use for `namespace.name`
    pub fn qualify(&self, namespace: &str, name: &str) -> Result<QualifiedName> {
        QualifiedName::new(&self.scope, namespace, name)
    }

    /// Copy `value` into new shared memory owned by this registry.
    pub fn register<V>(&mut self, namespace: &str, name: &str, value: &V) -> Result<()>
    where
        V: Shareable + ?Sized,
    {
        let qualified = self.qualify(namespace, name)?;
        if self.owned.contains_key(&qualified.key) {
            return Err(Error::AlreadyRegistered(qualified.key));
        }

        let object = SharedObject::alloc(&qualified.data, &qualified.meta, value)?;
        info!(
            "registered {} as shared {}",
            qualified.key,
            object.metadata().kind()
        );
        self.owned.insert(qualified.key, object);
        Ok(())
    }

    /// Register several variables, stopping at the first failure.
    pub fn register_all<'v, I, V>(&mut self, namespace: &str, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'v str, &'v V)>,
        V: Shareable + ?Sized + 'v,
    {
        vars.into_iter()
            .try_for_each(|(name, value)| self.register(namespace, name, value))
    }

    /// Drop ownership of a variable and remove its regions.
    pub fn release(&mut self, namespace: &str, name: &str) -> Result<()> {
        let qualified = self.qualify(namespace, name)?;
        let object = self
            .owned
            .remove(&qualified.key)
            .ok_or(Error::ReleaseOfUnowned(qualified.key))?;
        object.dispose();
        info!("released {}", object.name());
        Ok(())
    }

    /// Release several owned variables, stopping at the first failure.
    pub fn release_all(&mut self, namespace: &str, names: &[&str]) -> Result<()> {
        names
            .iter()
            .try_for_each(|name| self.release(namespace, name))
    }

    /// Shared object for a variable, attaching on first use.
    pub fn view_object(&mut self, namespace: &str, name: &str) -> Result<Rc<SharedObject>> {
        let qualified = self.qualify(namespace, name)?;
        if let Some(object) = self.viewed.get(&qualified.key) {
            return Ok(Rc::clone(object));
        }

        let object = Rc::new(SharedObject::view(&qualified.data, &qualified.meta)?);
        info!(
            "viewing {} as shared {}",
            qualified.key,
            object.metadata().kind()
        );
        self.viewed.insert(qualified.key, Rc::clone(&object));
        Ok(object)
    }

    /// Lazy containers over each named variable, in the order given.
    pub fn view(&mut self, namespace: &str, names: &[&str]) -> Result<Vec<(String, LazyContainer)>> {
        names
            .iter()
            .map(|name| -> Result<(String, LazyContainer)> {
                let object = self.view_object(namespace, name)?;
                Ok((name.to_string(), LazyContainer::for_object(&object)?))
            })
            .collect()
    }

    /// Shape of a variable, read through the view cache.
    pub fn metadata(&mut self, namespace: &str, name: &str) -> Result<Metadata> {
        self.view_object(namespace, name)
            .map(|object| object.metadata())
    }

    /// Detach cached views, stopping at the first name not viewed.
    ///
    /// Containers built from a released view report [`Error::Disposed`].
    pub fn release_view(&mut self, namespace: &str, names: &[&str]) -> Result<()> {
        for name in names {
            let qualified = self.qualify(namespace, name)?;
            let object = self
                .viewed
                .remove(&qualified.key)
                .ok_or(Error::NotRegistered(qualified.key))?;
            object.dispose();
            info!("released view of {}", object.name());
        }
        Ok(())
    }

    /// Keys of variables owned by this registry
    pub fn list_owned(&self) -> Vec<String> {
        self.owned.keys().cloned().collect()
    }

    /// Keys of variables currently viewed
    pub fn list_viewed(&self) -> Vec<String> {
        self.viewed.keys().cloned().collect()
    }

    pub fn is_owned(&self, namespace: &str, name: &str) -> bool {
        self.qualify(namespace, name)
            .map_or(false, |q| self.owned.contains_key(&q.key))
    }

    pub fn is_viewed(&self, namespace: &str, name: &str) -> bool {
        self.qualify(namespace, name)
            .map_or(false, |q| self.viewed.contains_key(&q.key))
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        if !self.owned.is_empty() || !self.viewed.is_empty() {
            warn!(
                "registry dropped with {} owned and {} viewed variables; releasing them",
                self.owned.len(),
                self.viewed.len()
            );
        }
        for (_, object) in std::mem::take(&mut self.viewed) {
            object.dispose();
        }
        for (_, object) in std::mem::take(&mut self.owned) {
            object.dispose();
        }
    }
}
