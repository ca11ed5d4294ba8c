//! Java applications: JVM options, class path and remote debugging.
//!
//! [`JavaMetaClass`] turns the options of this module into the command line
//!
//! ```text
//! java [heap] [-Dname=value ...] [jvm options ...] [-cp <class path>] <class> [arguments ...]
//! ```

use async_trait::async_trait;
use harness_core::options::{compose_same, Collectable, Collector, Opt, OptionsByType};
use std::net::{Ipv4Addr, SocketAddr, TcpListener};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::application::{Application, ApplicationCore, MetaClass};
use crate::error::LaunchError;
use crate::options::{Argument, Arguments, Executable};
use crate::platform::Platform;
use crate::profile::{Profile, Profiles};

/// Executable used when no [`Executable`] is given.
pub const DEFAULT_JAVA_EXECUTABLE: &str = "java";

/// Separator between class path entries on this platform.
pub const CLASS_PATH_SEPARATOR: &str = if cfg!(windows) { ";" } else { ":" };

// ============================================================================
// Options
// ============================================================================

/// Fully qualified name of the class whose `main` is run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassName(String);

impl ClassName {
    pub fn of(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Opt for ClassName {}

/// Class path entries, in order. Class paths from merged options are
/// concatenated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassPath(Vec<PathBuf>);

impl ClassPath {
    pub fn of<I, P>(entries: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self(entries.into_iter().map(Into::into).collect())
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn merged(&self, later: &ClassPath) -> ClassPath {
        Self(self.0.iter().chain(later.0.iter()).cloned().collect())
    }
}

impl std::fmt::Display for ClassPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let joined: Vec<String> = self.0.iter().map(|p| p.display().to_string()).collect();
        f.write_str(&joined.join(CLASS_PATH_SEPARATOR))
    }
}

impl Opt for ClassPath {
    fn compose(&self, earlier: &dyn Opt) -> Option<Arc<dyn Opt>> {
        compose_same(self, earlier, ClassPath::merged)
    }
}

/// Initial and maximum heap size in megabytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapSize {
    initial_mb: Option<u32>,
    maximum_mb: Option<u32>,
}

impl HeapSize {
    pub fn of(initial_mb: u32, maximum_mb: u32) -> Self {
        Self {
            initial_mb: Some(initial_mb),
            maximum_mb: Some(maximum_mb),
        }
    }

    pub fn initial(megabytes: u32) -> Self {
        Self {
            initial_mb: Some(megabytes),
            maximum_mb: None,
        }
    }

    pub fn maximum(megabytes: u32) -> Self {
        Self {
            initial_mb: None,
            maximum_mb: Some(megabytes),
        }
    }

    pub fn jvm_arguments(&self) -> Vec<String> {
        let mut arguments = Vec::new();
        if let Some(initial) = self.initial_mb {
            arguments.push(format!("-Xms{initial}m"));
        }
        if let Some(maximum) = self.maximum_mb {
            arguments.push(format!("-Xmx{maximum}m"));
        }
        arguments
    }
}

impl Opt for HeapSize {}

/// A `-Dname=value` system property, collected into [`SystemProperties`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemProperty {
    name: String,
    value: String,
}

impl SystemProperty {
    pub fn of(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl Opt for SystemProperty {
    fn add_into(self, options: &mut OptionsByType) {
        options.collect(self);
    }
}

impl Collectable for SystemProperty {
    type Collector = SystemProperties;
}

/// System properties by name; a later property replaces an earlier one of
/// the same name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemProperties(Vec<SystemProperty>);

impl SystemProperties {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|p| p.name == name).map(SystemProperty::value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SystemProperty> {
        self.0.iter()
    }

    pub fn jvm_arguments(&self) -> Vec<String> {
        self.0
            .iter()
            .map(|p| format!("-D{}={}", p.name, p.value))
            .collect()
    }

    fn merged(&self, later: &SystemProperties) -> SystemProperties {
        later.0.iter().fold(self.clone(), |acc, p| acc.with(p.clone()))
    }
}

impl Opt for SystemProperties {
    fn compose(&self, earlier: &dyn Opt) -> Option<Arc<dyn Opt>> {
        compose_same(self, earlier, SystemProperties::merged)
    }

    fn collected(&self) -> Vec<Arc<dyn Opt>> {
        self.0.iter().map(|p| Arc::new(p.clone()) as Arc<dyn Opt>).collect()
    }
}

impl Collector<SystemProperty> for SystemProperties {
    fn with(&self, item: SystemProperty) -> Self {
        let mut properties: Vec<SystemProperty> =
            self.0.iter().filter(|p| p.name != item.name).cloned().collect();
        properties.push(item);
        Self(properties)
    }

    fn without(&self, item: &SystemProperty) -> Self {
        Self(self.0.iter().filter(|p| p.name != item.name).cloned().collect())
    }
}

/// A raw JVM option such as `-XX:+UseG1GC`, collected into [`JvmOptions`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JvmOption(String);

impl JvmOption {
    pub fn of(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn value(&self) -> &str {
        &self.0
    }
}

impl Opt for JvmOption {
    fn add_into(self, options: &mut OptionsByType) {
        options.collect(self);
    }
}

impl Collectable for JvmOption {
    type Collector = JvmOptions;
}

/// Raw JVM options, in order, without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JvmOptions(Vec<JvmOption>);

impl JvmOptions {
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(JvmOption::value)
    }

    fn merged(&self, later: &JvmOptions) -> JvmOptions {
        later.0.iter().fold(self.clone(), |acc, o| acc.with(o.clone()))
    }
}

impl Opt for JvmOptions {
    fn compose(&self, earlier: &dyn Opt) -> Option<Arc<dyn Opt>> {
        compose_same(self, earlier, JvmOptions::merged)
    }

    fn collected(&self) -> Vec<Arc<dyn Opt>> {
        self.0.iter().map(|o| Arc::new(o.clone()) as Arc<dyn Opt>).collect()
    }
}

impl Collector<JvmOption> for JvmOptions {
    fn with(&self, item: JvmOption) -> Self {
        if self.0.contains(&item) {
            return self.clone();
        }
        let mut options = self.0.clone();
        options.push(item);
        Self(options)
    }

    fn without(&self, item: &JvmOption) -> Self {
        Self(self.0.iter().filter(|o| *o != item).cloned().collect())
    }
}

// ============================================================================
// Application and meta-class
// ============================================================================

/// A running Java virtual machine.
#[derive(Debug)]
pub struct JavaApplication {
    core: ApplicationCore,
}

impl JavaApplication {
    pub fn class_name(&self) -> Option<String> {
        self.core
            .options()
            .find::<ClassName>()
            .map(|c| c.name().to_string())
    }

    /// A system property the application was launched with.
    pub fn system_property(&self, name: &str) -> Option<String> {
        self.core
            .options()
            .find::<SystemProperties>()
            .and_then(|p| p.get(name).map(str::to_string))
    }
}

impl Application for JavaApplication {
    fn core(&self) -> &ApplicationCore {
        &self.core
    }
}

/// Meta-class assembling the `java` command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct JavaMetaClass;

impl JavaMetaClass {
    /// The full argument list for `options`: JVM settings, class path, main
    /// class, then the application's own arguments.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::MissingOption`] without a [`ClassName`].
    pub fn command_line(options: &OptionsByType) -> Result<Vec<String>, LaunchError> {
        let class_name = options
            .find::<ClassName>()
            .ok_or(LaunchError::MissingOption("ClassName"))?;

        let mut arguments = Vec::new();
        if let Some(heap) = options.find::<HeapSize>() {
            arguments.extend(heap.jvm_arguments());
        }
        if let Some(properties) = options.find::<SystemProperties>() {
            arguments.extend(properties.jvm_arguments());
        }
        if let Some(jvm_options) = options.find::<JvmOptions>() {
            arguments.extend(jvm_options.values().map(str::to_string));
        }
        if let Some(class_path) = options.find::<ClassPath>().filter(|c| !c.is_empty()) {
            arguments.push("-cp".to_string());
            arguments.push(class_path.to_string());
        }
        arguments.push(class_name.name().to_string());
        if let Some(application_arguments) = options.find::<Arguments>() {
            arguments.extend(application_arguments.values().map(str::to_string));
        }
        Ok(arguments)
    }
}

impl MetaClass<JavaApplication> for JavaMetaClass {
    fn on_launch(
        &self,
        _platform: &dyn Platform,
        options: &mut OptionsByType,
    ) -> Result<(), LaunchError> {
        let command_line = Self::command_line(options)?;
        options.add_if_absent(Executable::named(DEFAULT_JAVA_EXECUTABLE));
        options.remove::<Arguments>();
        for argument in command_line {
            options.add(Argument::of(argument));
        }
        Ok(())
    }

    fn create(&self, core: ApplicationCore) -> Result<JavaApplication, LaunchError> {
        Ok(JavaApplication { core })
    }
}

// ============================================================================
// Remote debugging
// ============================================================================

/// Whether the debugger attaches to the JVM or the JVM to the debugger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugMode {
    /// The JVM listens for a debugger.
    #[default]
    Listen,
    /// The JVM connects to a listening debugger.
    Attach,
}

/// Profile enabling the JDWP agent on a launched JVM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteDebugging {
    enabled: bool,
    start_suspended: bool,
    mode: DebugMode,
    address: Option<SocketAddr>,
}

impl RemoteDebugging {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            start_suspended: false,
            mode: DebugMode::Listen,
            address: None,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::enabled()
        }
    }

    #[must_use]
    pub fn start_suspended(mut self, suspended: bool) -> Self {
        self.start_suspended = suspended;
        self
    }

    #[must_use]
    pub fn attach_to(mut self, address: SocketAddr) -> Self {
        self.mode = DebugMode::Attach;
        self.address = Some(address);
        self
    }

    #[must_use]
    pub fn listen_at(mut self, address: SocketAddr) -> Self {
        self.mode = DebugMode::Listen;
        self.address = Some(address);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The `-agentlib:jdwp` option for `address`.
    pub fn agent_option(&self, address: SocketAddr) -> String {
        let server = if self.mode == DebugMode::Listen { "y" } else { "n" };
        let suspend = if self.start_suspended { "y" } else { "n" };
        format!("-agentlib:jdwp=transport=dt_socket,server={server},suspend={suspend},address={address}")
    }
}

/// A free local port, found by binding to port zero.
fn available_address() -> std::io::Result<SocketAddr> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
    listener.local_addr()
}

impl Opt for RemoteDebugging {
    fn add_into(self, options: &mut OptionsByType) {
        options.collect(self);
    }
}

impl Collectable for RemoteDebugging {
    type Collector = Profiles;
}

#[async_trait]
impl Profile for RemoteDebugging {
    fn on_launching(
        &self,
        platform: &dyn Platform,
        options: &mut OptionsByType,
    ) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let address = match self.address {
            Some(address) => address,
            None => available_address()?,
        };
        options.add(JvmOption::of(self.agent_option(address)));
        info!(
            target: "harness.runtime.java",
            platform = platform.name(),
            address = %address,
            mode = ?self.mode,
            suspended = self.start_suspended,
            "Remote debugging enabled"
        );
        Ok(())
    }
}
