//! Launch orchestration shared by every platform.

use chrono::Utc;
use harness_core::options::{AsAny, OptionsByType};
use std::any::TypeId;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::{Application, ApplicationCore, ApplicationListeners, ApplicationState, MetaClass};
use crate::console::Console;
use crate::error::LaunchError;
use crate::options::{Arguments, DisplayName, EnvironmentVariables, Executable, LaunchLogging, WorkingDirectory};
use crate::platform::Platform;
use crate::profile::{Profile, Profiles};

/// Display name used when neither a [`DisplayName`] nor an [`Executable`] is
/// given.
pub const DEFAULT_DISPLAY_NAME: &str = "application";

/// Launch an application of type `A` on `platform`.
///
/// The platform's options are overridden by `options`. The meta-class and
/// every profile then see the options before the process is realized.
/// Profiles added by another hook run their `on_launching` too, so every
/// profile in the final options has had it before `on_launched`.
///
/// # Errors
///
/// Returns the [`LaunchError`] of the first failing step. A process that was
/// already started is closed before the error is returned.
pub async fn launch<A, M>(
    platform: Arc<dyn Platform>,
    meta_class: &M,
    options: OptionsByType,
) -> Result<A, LaunchError>
where
    A: Application,
    M: MetaClass<A> + ?Sized,
{
    let mut options = OptionsByType::merged([&platform.options(), &options]);

    meta_class.on_launching(platform.as_ref(), &mut options)?;

    let mut prepared = Vec::new();
    prepare_profiles(platform.as_ref(), &mut options, &mut prepared)?;

    meta_class.on_launch(platform.as_ref(), &mut options)?;
    prepare_profiles(platform.as_ref(), &mut options, &mut prepared)?;

    if !options.contains::<DisplayName>() {
        let name = options
            .find::<Executable>()
            .map_or_else(|| DEFAULT_DISPLAY_NAME.to_string(), |e| e.short_name().to_string());
        options.add(DisplayName::of(name));
    }
    let name = options
        .find::<DisplayName>()
        .map_or_else(|| DEFAULT_DISPLAY_NAME.to_string(), |n| n.name().to_string());

    if options.resolve::<LaunchLogging>().is_some_and(|l| l.is_enabled()) {
        log_launch(platform.as_ref(), &name, &options);
    }

    let process = platform.realize(&options).await?;

    let core = ApplicationCore::new(
        name.clone(),
        Arc::clone(&platform),
        Arc::clone(&process),
        options.clone(),
    );
    core.set_state(ApplicationState::Launching);
    let application = match meta_class.create(core) {
        Ok(application) => application,
        Err(error) => {
            if let Err(close_error) = process.close().await {
                warn!(
                    target: "harness.runtime.launcher",
                    application = %name,
                    error = %close_error,
                    "Failed to close process after creation failure"
                );
            }
            return Err(error);
        }
    };

    application.core().set_state(ApplicationState::Running);

    if let Err(error) = on_launched(meta_class, &application, &options).await {
        if let Err(close_error) = application.close().await {
            warn!(
                target: "harness.runtime.launcher",
                application = %name,
                error = %close_error,
                "Failed to close application after launch failure"
            );
        }
        return Err(error);
    }

    debug!(
        target: "harness.runtime.launcher",
        application = %name,
        id = %application.id(),
        pid = process.id(),
        "Application launched"
    );
    Ok(application)
}

/// Run `on_launching` for every profile type not yet in `prepared`, in
/// order, re-reading the profiles after each hook since it may add more.
fn prepare_profiles(
    platform: &dyn Platform,
    options: &mut OptionsByType,
    prepared: &mut Vec<TypeId>,
) -> Result<(), LaunchError> {
    loop {
        let pending = options.find::<Profiles>().and_then(|profiles| {
            profiles
                .iter()
                .find(|profile| !prepared.contains(&profile_type(profile)))
                .map(Arc::clone)
        });
        let Some(profile) = pending else {
            return Ok(());
        };

        prepared.push(profile_type(&profile));
        profile
            .on_launching(platform, options)
            .map_err(|error| LaunchError::Profile {
                profile: profile.name().to_string(),
                source: error.into(),
            })?;
    }
}

fn profile_type(profile: &Arc<dyn Profile>) -> TypeId {
    profile.as_ref().as_any().type_id()
}

async fn on_launched<A, M>(meta_class: &M, application: &A, options: &OptionsByType) -> Result<(), LaunchError>
where
    A: Application,
    M: MetaClass<A> + ?Sized,
{
    meta_class.on_launched(application, options).await?;

    if let Some(profiles) = options.find::<Profiles>() {
        for profile in profiles.iter() {
            profile
                .on_launched(application.core(), options)
                .await
                .map_err(|error| LaunchError::Profile {
                    profile: profile.name().to_string(),
                    source: error.into(),
                })?;
        }
    }

    if let Some(listeners) = options.find::<ApplicationListeners>() {
        for listener in listeners.iter() {
            listener.on_launched(application.core()).await;
        }
    }
    Ok(())
}

fn log_launch(platform: &dyn Platform, name: &str, options: &OptionsByType) {
    let executable = options
        .find::<Executable>()
        .map(|e| e.name().to_string())
        .unwrap_or_default();
    let arguments = options
        .find::<Arguments>()
        .map(|a| a.values().collect::<Vec<_>>().join(" "))
        .unwrap_or_default();
    let working_directory = options
        .resolve::<WorkingDirectory>()
        .map(|d| d.path().display().to_string())
        .unwrap_or_default();
    let environment = options
        .find::<EnvironmentVariables>()
        .map(|e| format!("{:?} +{} variable(s)", e.source(), e.variables().len()))
        .unwrap_or_else(|| "inherited".to_string());
    let console = options
        .resolve::<Console>()
        .map(|c| format!("{c:?}"))
        .unwrap_or_default();

    info!(
        target: "harness.runtime.launcher",
        platform = platform.name(),
        address = %platform.address(),
        application = name,
        executable = %executable,
        arguments = %arguments,
        working_directory = %working_directory,
        environment = %environment,
        console = %console,
        launched_at = %Utc::now().to_rfc3339(),
        "Launching application"
    );
}
