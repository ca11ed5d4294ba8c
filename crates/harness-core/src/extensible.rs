//! Runtime capability attachment for long-lived handles.
//!
//! A [`Features`] registry stores at most one feature per concrete type.
//! Capabilities the owner provides natively are declared up front and can be
//! looked up like features, but never replaced or removed.
//!
//! Each operation is individually atomic. Compound sequences such as
//! check-then-add are not, and lifecycle hooks run outside the lock so they
//! may consult the owner's registry.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtensibleError {
    /// The type is a native capability of the owner.
    #[error("{0} is implemented directly by the owner and cannot be added or removed")]
    DirectlyImplemented(&'static str),
}

/// A value that can be attached to an [`Extensible`] owner.
pub trait Feature: Any + Send + Sync {
    /// Called before the feature becomes visible on `owner`.
    fn on_adding_to(&self, _owner: &dyn Extensible) {}

    /// Called after the feature was detached from `owner`.
    fn on_removing_from(&self, _owner: &dyn Extensible) {}
}

/// An object carrying a feature registry.
pub trait Extensible: Send + Sync {
    fn features(&self) -> &Features;

    fn has_feature<T: Any + Send + Sync>(&self) -> bool
    where
        Self: Sized,
    {
        self.features().has::<T>()
    }

    fn feature<T: Any + Send + Sync>(&self) -> Option<Arc<T>>
    where
        Self: Sized,
    {
        self.features().get::<T>()
    }

    fn add_feature<T: Feature>(&self, feature: T) -> Result<Option<Arc<T>>, ExtensibleError>
    where
        Self: Sized,
    {
        self.features().add(self, feature)
    }

    fn remove_feature<T: Feature>(&self) -> Result<Option<Arc<T>>, ExtensibleError>
    where
        Self: Sized,
    {
        self.features().remove::<T>(self)
    }
}

struct Attached {
    value: Arc<dyn Any + Send + Sync>,
    hooks: Arc<dyn Feature>,
}

/// A concurrent, type-keyed feature store.
#[derive(Default)]
pub struct Features {
    native: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    attached: RwLock<HashMap<TypeId, Attached>>,
}

impl Features {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a capability the owner implements itself.
    #[must_use]
    pub fn with_native<T: Any + Send + Sync>(mut self, capability: Arc<T>) -> Self {
        self.native.insert(TypeId::of::<T>(), capability);
        self
    }

    pub fn is_native<T: Any>(&self) -> bool {
        self.native.contains_key(&TypeId::of::<T>())
    }

    /// Whether `T` is a native capability or an attached feature.
    pub fn has<T: Any>(&self) -> bool {
        self.is_native::<T>()
            || self
                .attached
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .contains_key(&TypeId::of::<T>())
    }

    /// The native capability or attached feature of type `T`.
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        if let Some(native) = self.native.get(&TypeId::of::<T>()) {
            return Arc::clone(native).downcast::<T>().ok();
        }
        let attached = self.attached.read().unwrap_or_else(PoisonError::into_inner);
        attached
            .get(&TypeId::of::<T>())
            .and_then(|entry| Arc::clone(&entry.value).downcast::<T>().ok())
    }

    /// Attach `feature`, returning the feature of the same type it displaced.
    ///
    /// # Errors
    ///
    /// Returns [`ExtensibleError::DirectlyImplemented`] without touching the
    /// registry when `T` is a native capability.
    pub fn add<T: Feature>(
        &self,
        owner: &dyn Extensible,
        feature: T,
    ) -> Result<Option<Arc<T>>, ExtensibleError> {
        if self.is_native::<T>() {
            return Err(ExtensibleError::DirectlyImplemented(type_name::<T>()));
        }

        let feature = Arc::new(feature);
        feature.on_adding_to(owner);

        let previous = self
            .attached
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                TypeId::of::<T>(),
                Attached {
                    value: Arc::clone(&feature) as Arc<dyn Any + Send + Sync>,
                    hooks: feature as Arc<dyn Feature>,
                },
            );

        debug!(target: "harness.core.extensible", feature = type_name::<T>(), "Feature attached");

        Ok(previous.and_then(|entry| {
            entry.hooks.on_removing_from(owner);
            entry.value.downcast::<T>().ok()
        }))
    }

    /// Detach the feature of type `T`.
    ///
    /// # Errors
    ///
    /// Returns [`ExtensibleError::DirectlyImplemented`] when `T` is a native
    /// capability.
    pub fn remove<T: Feature>(
        &self,
        owner: &dyn Extensible,
    ) -> Result<Option<Arc<T>>, ExtensibleError> {
        if self.is_native::<T>() {
            return Err(ExtensibleError::DirectlyImplemented(type_name::<T>()));
        }

        let removed = self
            .attached
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&TypeId::of::<T>());

        Ok(removed.and_then(|entry| {
            entry.hooks.on_removing_from(owner);
            entry.value.downcast::<T>().ok()
        }))
    }

    /// Detach every feature, notifying each one.
    pub fn remove_all(&self, owner: &dyn Extensible) {
        let drained: Vec<Attached> = self
            .attached
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, entry)| entry)
            .collect();

        for entry in drained {
            entry.hooks.on_removing_from(owner);
        }
    }

    /// Number of attached features. Native capabilities are not counted.
    pub fn len(&self) -> usize {
        self.attached
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Features {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Features")
            .field("native", &self.native.len())
            .field("attached", &self.len())
            .finish()
    }
}
