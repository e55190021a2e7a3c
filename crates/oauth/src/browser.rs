use std::{io, process::ExitStatus};

use {
    async_trait::async_trait,
    tokio::process::Command,
    tracing::{debug, error, warn},
    url::Url,
};

use crate::error::BrowserLaunchError;

const XDG_OPEN: &str = "xdg-open";

/// Opens a URL in the user's browser.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn browse(&self, url: &Url) -> Result<(), BrowserLaunchError>;
}

/// Launches the platform's default browser.
///
/// On Linux `xdg-open` is required and waited for; elsewhere the platform's
/// native URL handler is used.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

#[async_trait]
impl BrowserLauncher for SystemBrowser {
    async fn browse(&self, url: &Url) -> Result<(), BrowserLaunchError> {
        debug!(%url, "opening browser");
        if cfg!(target_os = "linux") {
            open_with_xdg_open(url).await
        } else {
            open_natively(url).await
        }
    }
}

async fn open_with_xdg_open(url: &Url) -> Result<(), BrowserLaunchError> {
    if let Err(e) = which::which(XDG_OPEN) {
        warn!(error = %e, "{XDG_OPEN} not found, cannot open a browser");
        return Err(BrowserLaunchError::NotSupported);
    }

    let mut command = Command::new(XDG_OPEN);
    command.arg(url.as_str());
    run_launcher(command).await
}

async fn run_launcher(mut command: Command) -> Result<(), BrowserLaunchError> {
    let status = command.status().await.map_err(|e| classify_io_error(&e))?;
    check_exit_status(status)
}

/// `open` waits for the platform handler, so it runs off the async workers.
async fn open_natively(url: &Url) -> Result<(), BrowserLaunchError> {
    let target = url.to_string();
    tokio::task::spawn_blocking(move || open::that(target))
        .await
        .map_err(|e| {
            if e.is_cancelled() {
                BrowserLaunchError::Interrupted
            } else {
                error!(error = %e, "browser launch task failed");
                BrowserLaunchError::Generic
            }
        })?
        .map_err(|e| classify_io_error(&e))
}

fn check_exit_status(status: ExitStatus) -> Result<(), BrowserLaunchError> {
    if status.success() {
        Ok(())
    } else {
        warn!(code = ?status.code(), "browser launcher exited unsuccessfully");
        Err(BrowserLaunchError::NonZeroExitCode)
    }
}

fn classify_io_error(e: &io::Error) -> BrowserLaunchError {
    match e.kind() {
        io::ErrorKind::Interrupted => BrowserLaunchError::Interrupted,
        io::ErrorKind::NotFound | io::ErrorKind::Unsupported => BrowserLaunchError::NotSupported,
        _ => {
            error!(error = %e, "failed to launch browser");
            BrowserLaunchError::Generic
        },
    }
}
