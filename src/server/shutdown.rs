use std::io;
#[cfg(unix)]
use tracing::info;

use super::http_server::ServerHandle;

/// Block until SIGTERM or SIGINT arrives, returning the signal number
///
/// # Errors
///
/// The signal handlers cannot be installed.
#[cfg(unix)]
pub fn wait_for_shutdown_signal() -> io::Result<i32> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGTERM, SIGINT])?;
    let signal = signals.forever().next().unwrap_or(SIGTERM);
    info!(signal, "Shutdown signal received");
    Ok(signal)
}

/// Run until a shutdown signal arrives, then stop the server
///
/// # Errors
///
/// The signal handlers cannot be installed.
#[cfg(unix)]
pub fn serve_until_shutdown(handle: ServerHandle) -> io::Result<()> {
    wait_for_shutdown_signal()?;
    handle.stop();
    info!("Server stopped");
    Ok(())
}

/// Run until the server exits
///
/// # Errors
///
/// The server coroutine panicked.
#[cfg(not(unix))]
pub fn serve_until_shutdown(handle: ServerHandle) -> io::Result<()> {
    handle
        .join()
        .map_err(|e| io::Error::other(format!("server failed: {e:?}")))
}
