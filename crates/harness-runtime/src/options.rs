//! Options describing the process to launch.

use harness_core::options::{compose_same, Collectable, Collector, Opt, OptionsByType};
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ============================================================================
// Executable and arguments
// ============================================================================

/// The program to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Executable(String);

impl Executable {
    pub fn named(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// The file name without directories or extension, used as the default
    /// display name.
    pub fn short_name(&self) -> &str {
        Path::new(&self.0)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(&self.0)
    }
}

impl Opt for Executable {}

/// One command line argument, collected into [`Arguments`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument(String);

impl Argument {
    pub fn of(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn value(&self) -> &str {
        &self.0
    }
}

impl Opt for Argument {
    fn add_into(self, options: &mut OptionsByType) {
        options.collect(self);
    }
}

impl Collectable for Argument {
    type Collector = Arguments;
}

/// The ordered command line arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Arguments(Vec<Argument>);

impl Arguments {
    pub fn of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(values.into_iter().map(Argument::of).collect())
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(Argument::value)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn merged(&self, later: &Arguments) -> Arguments {
        Arguments(self.0.iter().chain(later.0.iter()).cloned().collect())
    }
}

impl Opt for Arguments {
    fn compose(&self, earlier: &dyn Opt) -> Option<Arc<dyn Opt>> {
        compose_same(self, earlier, Arguments::merged)
    }

    fn collected(&self) -> Vec<Arc<dyn Opt>> {
        self.0
            .iter()
            .map(|argument| Arc::new(argument.clone()) as Arc<dyn Opt>)
            .collect()
    }
}

impl Collector<Argument> for Arguments {
    fn with(&self, item: Argument) -> Self {
        let mut arguments = self.0.clone();
        arguments.push(item);
        Self(arguments)
    }

    fn without(&self, item: &Argument) -> Self {
        Self(self.0.iter().filter(|a| *a != item).cloned().collect())
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Where a launched process gets its base environment from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EnvironmentSource {
    /// Start from an empty environment.
    Custom,
    /// Inherit the environment of the launching process.
    #[default]
    ThisApplication,
    /// Start from the platform's own default environment.
    TargetPlatform,
}

/// One environment variable to set, or to remove when it has no value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentVariable {
    name: String,
    value: Option<String>,
}

impl EnvironmentVariable {
    pub fn of(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    pub fn removed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }
}

impl Opt for EnvironmentVariable {
    fn add_into(self, options: &mut OptionsByType) {
        options.collect(self);
    }
}

impl Collectable for EnvironmentVariable {
    type Collector = EnvironmentVariables;
}

/// The base environment source plus the variables set on top of it. A later
/// variable with the same name replaces an earlier one.
///
/// A collector built only from individual variables has no explicit source.
/// Merging keeps the earlier explicit source unless the later collector
/// names one of its own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentVariables {
    source: Option<EnvironmentSource>,
    variables: Vec<EnvironmentVariable>,
}

impl EnvironmentVariables {
    pub fn custom() -> Self {
        Self::from_source(EnvironmentSource::Custom)
    }

    pub fn inherited() -> Self {
        Self::from_source(EnvironmentSource::ThisApplication)
    }

    pub fn of_platform() -> Self {
        Self::from_source(EnvironmentSource::TargetPlatform)
    }

    pub fn from_source(source: EnvironmentSource) -> Self {
        Self {
            source: Some(source),
            variables: Vec::new(),
        }
    }

    #[must_use]
    pub fn set(&self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.with(EnvironmentVariable::of(name, value))
    }

    pub fn source(&self) -> EnvironmentSource {
        self.source.unwrap_or_default()
    }

    pub fn has_explicit_source(&self) -> bool {
        self.source.is_some()
    }

    pub fn variables(&self) -> &[EnvironmentVariable] {
        &self.variables
    }

    pub fn get(&self, name: &str) -> Option<&EnvironmentVariable> {
        self.variables.iter().find(|v| v.name == name)
    }

    fn merged(&self, later: &EnvironmentVariables) -> EnvironmentVariables {
        let base = Self {
            source: later.source.or(self.source),
            variables: self.variables.clone(),
        };
        later
            .variables
            .iter()
            .fold(base, |acc, variable| acc.with(variable.clone()))
    }
}

impl Opt for EnvironmentVariables {
    fn compose(&self, earlier: &dyn Opt) -> Option<Arc<dyn Opt>> {
        compose_same(self, earlier, EnvironmentVariables::merged)
    }

    fn collected(&self) -> Vec<Arc<dyn Opt>> {
        self.variables
            .iter()
            .map(|variable| Arc::new(variable.clone()) as Arc<dyn Opt>)
            .collect()
    }
}

impl Collector<EnvironmentVariable> for EnvironmentVariables {
    fn with(&self, item: EnvironmentVariable) -> Self {
        let mut variables: Vec<EnvironmentVariable> = self
            .variables
            .iter()
            .filter(|v| v.name != item.name)
            .cloned()
            .collect();
        variables.push(item);
        Self {
            source: self.source,
            variables,
        }
    }

    fn without(&self, item: &EnvironmentVariable) -> Self {
        Self {
            source: self.source,
            variables: self
                .variables
                .iter()
                .filter(|v| v.name != item.name)
                .cloned()
                .collect(),
        }
    }
}

// ============================================================================
// Presentation and placement
// ============================================================================

/// Directory the process starts in. Defaults to the current directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingDirectory(PathBuf);

impl WorkingDirectory {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl Opt for WorkingDirectory {
    fn default_option() -> Option<Self> {
        std::env::current_dir().ok().map(Self)
    }
}

/// Name used for the application in logs and console output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayName(String);

impl DisplayName {
    pub fn of(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Opt for DisplayName {}

/// Whether the launcher logs a summary of every launch. Enabled by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchLogging(pub bool);

impl LaunchLogging {
    pub fn enabled() -> Self {
        Self(true)
    }

    pub fn disabled() -> Self {
        Self(false)
    }

    pub fn is_enabled(&self) -> bool {
        self.0
    }
}

impl Opt for LaunchLogging {
    fn default_option() -> Option<Self> {
        Some(Self::enabled())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use harness_core::options;

    #[test]
    fn test_arguments_collect_in_order() {
        let options = options![Argument::of("-v"), Executable::named("sh"), Argument::of("-c")];

        let arguments = options.find::<Arguments>().unwrap();
        assert_eq!(arguments.values().collect::<Vec<_>>(), vec!["-v", "-c"]);
        assert!(options.contains_value(&Argument::of("-c")));
    }

    #[test]
    fn test_arguments_from_merged_sources_are_appended() {
        let platform = options![Argument::of("--platform")];
        let caller = options![Arguments::of(["a", "b"])];

        let merged = OptionsByType::merged([&platform, &caller]);

        let values: Vec<String> = merged
            .find::<Arguments>()
            .unwrap()
            .values()
            .map(str::to_string)
            .collect();
        assert_eq!(values, vec!["--platform", "a", "b"]);
    }

    #[test]
    fn test_environment_variables_replace_by_name() {
        let options = options![
            EnvironmentVariable::of("MODE", "fast"),
            EnvironmentVariable::of("USER", "test"),
            EnvironmentVariable::of("MODE", "slow"),
        ];

        let environment = options.find::<EnvironmentVariables>().unwrap();
        assert_eq!(environment.source(), EnvironmentSource::ThisApplication);
        assert_eq!(environment.variables().len(), 2);
        assert_eq!(environment.get("MODE").unwrap().value(), Some("slow"));
    }

    #[test]
    fn test_environment_source_from_later_options_wins() {
        let base = options![EnvironmentVariable::of("A", "1")];
        let custom = options![EnvironmentVariables::custom().set("B", "2")];

        let merged = OptionsByType::merged([&base, &custom]);

        let environment = merged.find::<EnvironmentVariables>().unwrap();
        assert_eq!(environment.source(), EnvironmentSource::Custom);
        assert!(environment.get("A").is_some());
        assert!(environment.get("B").is_some());
    }

    #[test]
    fn test_platform_source_survives_caller_variables() {
        let platform = options![EnvironmentVariables::custom()];
        let caller = options![EnvironmentVariable::of("A", "1")];

        let merged = OptionsByType::merged([&platform, &caller]);

        let environment = merged.find::<EnvironmentVariables>().unwrap();
        assert_eq!(environment.source(), EnvironmentSource::Custom);
        assert_eq!(environment.get("A").unwrap().value(), Some("1"));

        let platform = options![EnvironmentVariables::of_platform().set("B", "2")];
        let merged = OptionsByType::merged([&platform, &caller]);

        let environment = merged.find::<EnvironmentVariables>().unwrap();
        assert_eq!(environment.source(), EnvironmentSource::TargetPlatform);
        assert_eq!(environment.variables().len(), 2);
    }

    #[test]
    fn test_explicit_inherit_overrides_earlier_source() {
        let platform = options![EnvironmentVariables::custom()];
        let caller = options![EnvironmentVariables::inherited()];

        let merged = OptionsByType::merged([&platform, &caller]);

        let environment = merged.find::<EnvironmentVariables>().unwrap();
        assert_eq!(environment.source(), EnvironmentSource::ThisApplication);
        assert!(environment.has_explicit_source());
    }

    #[test]
    fn test_defaults() {
        let mut options = OptionsByType::empty();

        assert!(options.get::<LaunchLogging>().unwrap().is_enabled());
        assert!(options.get::<WorkingDirectory>().is_some());
        assert!(options.get::<DisplayName>().is_none());
        assert_eq!(Executable::named("/usr/bin/java").short_name(), "java");
    }
}
