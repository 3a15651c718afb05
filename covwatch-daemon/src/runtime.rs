use std::ops::{Deref, DerefMut};

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::broadcast;

use covwatch_core::Settings;

use crate::backend::NotifyBackend;
use crate::command::{CommandRunner, SystemCommandRunner};
use crate::dispatcher::Dispatcher;
use crate::error::{io_err, DaemonError};
use crate::patcher::Patcher;
use crate::pidfile::Pidfile;
use crate::watch_set::{WatchBackend, WatchSet};

/// Start the daemon and block the current thread until a termination signal
/// (SIGTERM, SIGINT or SIGHUP) has been handled and teardown finished.
pub fn start_blocking(settings: Settings) -> Result<(), DaemonError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;

    runtime.block_on(async move {
        let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(4);

        // Register handlers before any watch or patch work starts so an early
        // signal still goes through teardown.
        let mut terminate = signal(SignalKind::terminate())
            .map_err(|err| DaemonError::Signal(err.to_string()))?;
        let mut interrupt = signal(SignalKind::interrupt())
            .map_err(|err| DaemonError::Signal(err.to_string()))?;
        let mut hangup = signal(SignalKind::hangup())
            .map_err(|err| DaemonError::Signal(err.to_string()))?;

        let signal_handle = tokio::spawn(async move {
            tokio::select! {
                _ = terminate.recv() => tracing::info!("received SIGTERM, shutting down"),
                _ = interrupt.recv() => tracing::info!("received SIGINT, shutting down"),
                _ = hangup.recv() => tracing::info!("received SIGHUP, shutting down"),
            }
            let _ = shutdown_tx.send(());
        });

        let result = run(settings, shutdown_rx).await;
        signal_handle.abort();
        result
    })
}

/// Run the watcher until `shutdown` fires (or its sender is dropped).
pub async fn run(
    settings: Settings,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let _pidfile = settings
        .pidfile
        .as_deref()
        .map(Pidfile::create)
        .transpose()?;

    let (backend, mut events) = NotifyBackend::new()?;
    let watches = WatchSet::new(settings.target.clone(), backend);
    let patcher = Patcher::from_settings(SystemCommandRunner, &settings);
    let mut dispatcher = Dispatcher::new(watches, patcher);

    tracing::info!(
        target_path = %settings.target,
        service = %settings.service_name,
        config = %settings.coverage_config,
        "covwatch starting",
    );

    let mut session = Teardown(&mut dispatcher);
    session.start();

    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            raw = events.recv() => {
                let Some(raw) = raw else {
                    tracing::warn!("notification channel closed");
                    break;
                };
                match raw {
                    Ok(raw) => {
                        let decoded = session.watches().backend().decode(raw);
                        for event in &decoded {
                            session.handle(event);
                        }
                    }
                    Err(err) => tracing::warn!(error = %err, "watcher event error"),
                }
            }
        }
    }

    drop(session);
    tracing::info!("covwatch stopped");
    Ok(())
}

/// Tears the dispatcher down when dropped, whether the loop ended normally
/// or by unwinding.
struct Teardown<'a, B: WatchBackend, R: CommandRunner>(&'a mut Dispatcher<B, R>);

impl<B: WatchBackend, R: CommandRunner> Deref for Teardown<'_, B, R> {
    type Target = Dispatcher<B, R>;

    fn deref(&self) -> &Self::Target {
        self.0
    }
}

impl<B: WatchBackend, R: CommandRunner> DerefMut for Teardown<'_, B, R> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0
    }
}

impl<B: WatchBackend, R: CommandRunner> Drop for Teardown<'_, B, R> {
    fn drop(&mut self) {
        self.0.shutdown();
    }
}
