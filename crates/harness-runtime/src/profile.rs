//! Profiles: lifecycle hooks carried in the launch options.
//!
//! Profiles run in the order they were added to the options. Adding a second
//! profile of the same type replaces the first in place.

use async_trait::async_trait;
use harness_core::options::{compose_same, downcast_ref, Collectable, Collector, Opt, OptionsByType};
use std::any::{type_name, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::application::ApplicationCore;
use crate::platform::Platform;

/// A set of hooks around the launch and close of an application.
///
/// Implementations are [`Collectable`] into [`Profiles`]:
///
/// ```ignore
/// impl Opt for MyProfile {
///     fn add_into(self, options: &mut OptionsByType) {
///         options.collect(self);
///     }
/// }
///
/// impl Collectable for MyProfile {
///     type Collector = Profiles;
/// }
/// ```
#[async_trait]
pub trait Profile: Opt {
    fn name(&self) -> &'static str {
        type_name::<Self>()
    }

    /// Runs before the process is realized; may still change the options.
    ///
    /// # Errors
    ///
    /// An error aborts the launch.
    fn on_launching(
        &self,
        _platform: &dyn Platform,
        _options: &mut OptionsByType,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs once the application is running.
    ///
    /// # Errors
    ///
    /// An error closes the application and aborts the launch.
    async fn on_launched(
        &self,
        _application: &ApplicationCore,
        _options: &OptionsByType,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs when the application starts closing, before the process is
    /// terminated. Bounded by the application's timeout.
    ///
    /// # Errors
    ///
    /// Errors are logged; closing continues regardless.
    async fn on_closing(
        &self,
        _application: &ApplicationCore,
        _options: &OptionsByType,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Clone)]
struct ProfileEntry {
    type_id: TypeId,
    profile: Arc<dyn Profile>,
    option: Arc<dyn Opt>,
}

/// The ordered profiles of a launch.
#[derive(Clone, Default)]
pub struct Profiles {
    entries: Vec<ProfileEntry>,
}

impl Profiles {
    pub fn of<P: Profile>(profile: P) -> Self {
        Self::default().with_profile(profile)
    }

    /// A copy holding `profile`, replacing any profile of the same type in
    /// place.
    #[must_use]
    pub fn with_profile<P: Profile>(&self, profile: P) -> Self {
        let shared = Arc::new(profile);
        let entry = ProfileEntry {
            type_id: TypeId::of::<P>(),
            profile: Arc::clone(&shared) as Arc<dyn Profile>,
            option: shared as Arc<dyn Opt>,
        };
        self.with_entry(entry)
    }

    fn with_entry(&self, entry: ProfileEntry) -> Self {
        let mut entries = self.entries.clone();
        match entries.iter_mut().find(|e| e.type_id == entry.type_id) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
        Self { entries }
    }

    /// The profile of type `P`, if present.
    pub fn get<P: Profile>(&self) -> Option<&P> {
        self.entries
            .iter()
            .find(|e| e.type_id == TypeId::of::<P>())
            .and_then(|e| downcast_ref::<P>(e.option.as_ref()))
    }

    /// Profiles in the order they were added.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Profile>> {
        self.entries.iter().map(|e| &e.profile)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn merged(&self, later: &Profiles) -> Profiles {
        later
            .entries
            .iter()
            .fold(self.clone(), |acc, entry| acc.with_entry(entry.clone()))
    }
}

impl fmt::Debug for Profiles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| &e.option))
            .finish()
    }
}

impl Opt for Profiles {
    fn compose(&self, earlier: &dyn Opt) -> Option<Arc<dyn Opt>> {
        compose_same(self, earlier, Profiles::merged)
    }

    fn collected(&self) -> Vec<Arc<dyn Opt>> {
        self.entries.iter().map(|e| Arc::clone(&e.option)).collect()
    }
}

impl<P> Collector<P> for Profiles
where
    P: Profile + Collectable<Collector = Profiles>,
{
    fn with(&self, item: P) -> Self {
        self.with_profile(item)
    }

    fn without(&self, _item: &P) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|e| e.type_id != TypeId::of::<P>())
                .cloned()
                .collect(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use harness_core::options;

    #[derive(Debug, Clone, PartialEq)]
    struct First(u8);

    #[derive(Debug, Clone, PartialEq)]
    struct Second;

    macro_rules! collectable_profile {
        ($profile:ty) => {
            impl Opt for $profile {
                fn add_into(self, options: &mut OptionsByType) {
                    options.collect(self);
                }
            }

            impl Collectable for $profile {
                type Collector = Profiles;
            }

            impl Profile for $profile {}
        };
    }

    collectable_profile!(First);
    collectable_profile!(Second);

    #[test]
    fn test_profiles_keep_insertion_order_and_replace_in_place() {
        let options = options![First(1), Second, First(2)];

        let profiles = options.find::<Profiles>().unwrap();
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles.get::<First>(), Some(&First(2)));

        let names: Vec<&str> = profiles.iter().map(|p| p.name()).collect();
        assert!(names.first().unwrap().ends_with("First"));
        assert!(names.get(1).unwrap().ends_with("Second"));
    }

    #[test]
    fn test_profiles_are_visible_as_instances() {
        let mut options = options![Second];

        assert!(options.contains_value(&Second));
        assert!(options.remove_collected(&Second));
        assert!(options.find::<Profiles>().unwrap().is_empty());
    }

    #[test]
    fn test_merged_profiles_combine() {
        let platform = options![First(1)];
        let caller = options![Second];

        let merged = OptionsByType::merged([&platform, &caller]);

        assert_eq!(merged.find::<Profiles>().unwrap().len(), 2);
    }
}
