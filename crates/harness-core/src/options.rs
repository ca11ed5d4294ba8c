//! Typed option registry.
//!
//! An [`OptionsByType`] holds at most one value per concrete option type.
//! Adding a second value of a type replaces the first in place, keeping the
//! position where the type was first added. Types that are [`Collectable`]
//! are folded into their [`Collector`] instead, so many contributions merge
//! into one immutable aggregate.
//!
//! Defaults are declared by each type through [`Opt::default_option`] rather
//! than discovered at runtime.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Option traits
// ============================================================================

/// Type-erasure helpers available on every option.
pub trait AsAny: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// An immutable configuration value keyed by its concrete type.
pub trait Opt: AsAny + fmt::Debug {
    /// The value [`OptionsByType::get`] materializes when none was added.
    fn default_option() -> Option<Self>
    where
        Self: Sized,
    {
        None
    }

    /// How this value enters a registry. Collectables override this to fold
    /// themselves into their collector.
    fn add_into(self, options: &mut OptionsByType)
    where
        Self: Sized,
    {
        options.insert(self);
    }

    /// Combine with an earlier value of the same type, or `None` to replace it.
    fn compose(&self, _earlier: &dyn Opt) -> Option<Arc<dyn Opt>> {
        None
    }

    /// The individual values held by a collector.
    fn collected(&self) -> Vec<Arc<dyn Opt>> {
        Vec::new()
    }
}

/// An option that is gathered into a [`Collector`] rather than stored alone.
///
/// Implementations also override [`Opt::add_into`] with
/// `options.collect(self)`.
pub trait Collectable: Opt + Sized {
    type Collector: Collector<Self>;
}

/// An immutable aggregate of [`Collectable`] values.
pub trait Collector<C: Collectable>: Opt + Default + Clone {
    /// A new collector holding every current value plus `item`.
    #[must_use]
    fn with(&self, item: C) -> Self;

    /// A new collector holding every current value except `item`.
    #[must_use]
    fn without(&self, item: &C) -> Self;
}

/// Downcast a type-erased option reference.
pub fn downcast_ref<T: Opt>(option: &dyn Opt) -> Option<&T> {
    option.as_any().downcast_ref::<T>()
}

fn downcast_arc<T: Opt>(option: &Arc<dyn Opt>) -> Option<Arc<T>> {
    Arc::clone(option).into_any().downcast::<T>().ok()
}

/// Helper for [`Opt::compose`]: when `earlier` is also a `K`, merge the two.
pub fn compose_same<K: Opt>(
    later: &K,
    earlier: &dyn Opt,
    merge: impl FnOnce(&K, &K) -> K,
) -> Option<Arc<dyn Opt>> {
    let earlier = downcast_ref::<K>(earlier)?;
    Some(Arc::new(merge(earlier, later)))
}

// ============================================================================
// OptionsByType
// ============================================================================

#[derive(Clone)]
struct Entry {
    type_id: TypeId,
    option: Arc<dyn Opt>,
}

/// An insertion-ordered registry of options, one per concrete type.
///
/// Cloning produces an independent overlay; the option values themselves are
/// immutable and shared.
#[derive(Clone, Default)]
pub struct OptionsByType {
    entries: Vec<Entry>,
}

impl OptionsByType {
    /// An empty registry.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Merge several registries in order; later sources override earlier ones
    /// and collectors are combined.
    #[must_use]
    pub fn merged<'a>(sources: impl IntoIterator<Item = &'a OptionsByType>) -> Self {
        let mut options = Self::empty();
        for source in sources {
            options.add_all(source);
        }
        options
    }

    /// Builder form of [`add`](Self::add).
    #[must_use]
    pub fn with<T: Opt>(mut self, option: T) -> Self {
        self.add(option);
        self
    }

    /// Add an option, replacing any value of the same type, or folding it into
    /// its collector when it is collectable.
    pub fn add<T: Opt>(&mut self, option: T) -> &mut Self {
        option.add_into(self);
        self
    }

    /// Add an option only when no value of its type is present.
    ///
    /// For collectables this means no value of that type has been collected.
    pub fn add_if_absent<T: Opt>(&mut self, option: T) -> &mut Self {
        if self.instances_of::<T>().is_empty() {
            self.add(option);
        }
        self
    }

    /// Add every option of `other`, in its order.
    pub fn add_all(&mut self, other: &OptionsByType) -> &mut Self {
        for entry in &other.entries {
            self.insert_arc(entry.type_id, Arc::clone(&entry.option));
        }
        self
    }

    /// Store an option under its own type, composing with or replacing an
    /// existing value. Never folds into a collector.
    pub fn insert<T: Opt>(&mut self, option: T) {
        self.insert_arc(TypeId::of::<T>(), Arc::new(option));
    }

    /// Fold a collectable value into its collector, default-constructing the
    /// collector when absent.
    pub fn collect<C: Collectable>(&mut self, item: C) {
        let current = self
            .find::<C::Collector>()
            .map(|collector| collector.as_ref().clone())
            .or_else(<C::Collector as Opt>::default_option)
            .unwrap_or_default();

        self.replace_arc(
            TypeId::of::<C::Collector>(),
            Arc::new(current.with(item)),
        );
    }

    /// The stored value of type `T`, materializing and caching its declared
    /// default when absent.
    pub fn get<T: Opt>(&mut self) -> Option<Arc<T>> {
        if let Some(found) = self.find::<T>() {
            return Some(found);
        }
        let default = Arc::new(T::default_option()?);
        self.replace_arc(TypeId::of::<T>(), Arc::clone(&default) as Arc<dyn Opt>);
        Some(default)
    }

    /// The stored value of type `T`, or a freshly built declared default.
    /// Nothing is cached.
    pub fn resolve<T: Opt>(&self) -> Option<Arc<T>> {
        self.find::<T>()
            .or_else(|| T::default_option().map(Arc::new))
    }

    /// The stored value of type `T`, ignoring declared defaults.
    pub fn find<T: Opt>(&self) -> Option<Arc<T>> {
        self.entry(TypeId::of::<T>())
            .and_then(|entry| downcast_arc::<T>(&entry.option))
    }

    /// The stored value of type `T`, or `default`. Nothing is cached.
    pub fn get_or_default<T: Opt>(&self, default: T) -> Arc<T> {
        self.find::<T>().unwrap_or_else(|| Arc::new(default))
    }

    /// The stored value of type `T`, or `default` which is then stored.
    pub fn get_or_set_default<T: Opt>(&mut self, default: T) -> Arc<T> {
        if let Some(found) = self.find::<T>() {
            return found;
        }
        let default = Arc::new(default);
        self.replace_arc(TypeId::of::<T>(), Arc::clone(&default) as Arc<dyn Opt>);
        default
    }

    /// Whether a value of type `T` is stored.
    pub fn contains<T: Opt>(&self) -> bool {
        self.entry(TypeId::of::<T>()).is_some()
    }

    /// Whether `value` is stored, either directly or inside a collector.
    pub fn contains_value<T: Opt + PartialEq>(&self, value: &T) -> bool {
        self.instances_of::<T>().iter().any(|found| found.as_ref() == value)
    }

    /// Every value of type `T`, whether stored directly or inside a collector.
    pub fn instances_of<T: Opt>(&self) -> Vec<Arc<T>> {
        let mut found = Vec::new();
        for entry in &self.entries {
            if let Some(value) = downcast_arc::<T>(&entry.option) {
                found.push(value);
            }
            for item in entry.option.collected() {
                if let Some(value) = downcast_arc::<T>(&item) {
                    found.push(value);
                }
            }
        }
        found
    }

    /// Remove the stored value of type `T`.
    pub fn remove<T: Opt>(&mut self) -> Option<Arc<T>> {
        let type_id = TypeId::of::<T>();
        let position = self.entries.iter().position(|e| e.type_id == type_id)?;
        let removed = self.entries.remove(position);
        downcast_arc::<T>(&removed.option)
    }

    /// Remove a collected value from its collector. Returns whether a
    /// collector was present.
    pub fn remove_collected<C: Collectable>(&mut self, item: &C) -> bool {
        let Some(current) = self.find::<C::Collector>() else {
            return false;
        };
        self.replace_arc(
            TypeId::of::<C::Collector>(),
            Arc::new(current.without(item)),
        );
        true
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stored values in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Opt>> {
        self.entries.iter().map(|entry| &entry.option)
    }

    fn entry(&self, type_id: TypeId) -> Option<&Entry> {
        self.entries.iter().find(|e| e.type_id == type_id)
    }

    fn insert_arc(&mut self, type_id: TypeId, option: Arc<dyn Opt>) {
        let option = match self.entry(type_id) {
            Some(existing) => option.compose(existing.option.as_ref()).unwrap_or(option),
            None => option,
        };
        self.replace_arc(type_id, option);
    }

    fn replace_arc(&mut self, type_id: TypeId, option: Arc<dyn Opt>) {
        match self.entries.iter_mut().find(|e| e.type_id == type_id) {
            Some(existing) => existing.option = option,
            None => self.entries.push(Entry { type_id, option }),
        }
    }
}

impl fmt::Debug for OptionsByType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl fmt::Display for OptionsByType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Options{")?;
        for (index, option) in self.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{option:?}")?;
        }
        f.write_str("}")
    }
}

/// Build an [`OptionsByType`] from a list of options, added in order.
#[macro_export]
macro_rules! options {
    () => {
        $crate::options::OptionsByType::empty()
    };
    ($($option:expr),+ $(,)?) => {{
        let mut options = $crate::options::OptionsByType::empty();
        $( options.add($option); )+
        options
    }};
}
