//! Signal flags and listeners
//!
//! Listeners never touch sensors, zones or configuration. They only flip
//! atomics on a shared [`SignalFlags`] and wake the control loop, which
//! observes the flags at the top of each iteration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Notify;

/// What a delivered signal asks the daemon to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// SIGTERM / SIGINT
    Terminate,
    /// SIGHUP
    Reload,
}

/// Flags shared between the signal listeners and the control loop
#[derive(Debug)]
pub struct SignalFlags {
    terminate: AtomicBool,
    reload: AtomicBool,
    platform_support: AtomicBool,
    wake: Notify,
}

impl SignalFlags {
    pub fn new(platform_support: bool) -> Self {
        Self {
            terminate: AtomicBool::new(false),
            reload: AtomicBool::new(false),
            platform_support: AtomicBool::new(platform_support),
            wake: Notify::new(),
        }
    }

    /// Record a request and wake the loop
    ///
    /// A reload is dropped while the platform is unsupported; termination
    /// is always honoured.
    pub fn raise(&self, request: Request) {
        match request {
            Request::Terminate => self.terminate.store(true, Ordering::SeqCst),
            Request::Reload => {
                if !self.platform_support.load(Ordering::SeqCst) {
                    return;
                }
                self.reload.store(true, Ordering::SeqCst);
            }
        }
        self.wake.notify_one();
    }

    pub fn terminate_requested(&self) -> bool {
        self.terminate.load(Ordering::SeqCst)
    }

    /// The raw stop flag handed to the scheduler
    pub fn terminate_flag(&self) -> &AtomicBool {
        &self.terminate
    }

    /// Consume a pending reload request
    pub fn take_reload(&self) -> bool {
        self.reload.swap(false, Ordering::SeqCst)
    }

    pub fn platform_support(&self) -> bool {
        self.platform_support.load(Ordering::SeqCst)
    }

    pub fn set_platform_support(&self, supported: bool) {
        self.platform_support.store(supported, Ordering::SeqCst);
    }

    /// Wait until a request is raised
    ///
    /// A request raised while nobody waits is remembered, so the next call
    /// returns at once.
    pub async fn woken(&self) {
        self.wake.notified().await;
    }
}

/// Spawn listeners for SIGTERM, SIGINT and SIGHUP
///
/// Must be called from within a tokio runtime.
pub fn install_listeners(flags: &Arc<SignalFlags>) -> anyhow::Result<()> {
    let routes = [
        (SignalKind::terminate(), Request::Terminate, "SIGTERM"),
        (SignalKind::interrupt(), Request::Terminate, "SIGINT"),
        (SignalKind::hangup(), Request::Reload, "SIGHUP"),
    ];

    for (kind, request, name) in routes {
        let mut stream =
            signal(kind).with_context(|| format!("Failed to install {} handler", name))?;
        let flags = Arc::clone(flags);
        tokio::spawn(async move {
            while stream.recv().await.is_some() {
                flags.raise(request);
            }
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_terminate_always_recorded() {
        let flags = SignalFlags::new(false);
        flags.raise(Request::Terminate);
        assert!(flags.terminate_requested());
        assert!(flags.terminate_flag().load(Ordering::SeqCst));
    }

    #[test]
    fn test_reload_ignored_without_platform_support() {
        let flags = SignalFlags::new(false);
        flags.raise(Request::Reload);
        assert!(!flags.take_reload());

        flags.set_platform_support(true);
        flags.raise(Request::Reload);
        assert!(flags.take_reload());
        // Consumed
        assert!(!flags.take_reload());
    }

    #[tokio::test]
    async fn test_raise_before_wait_is_not_lost() {
        let flags = SignalFlags::new(true);
        flags.raise(Request::Reload);
        tokio::time::timeout(Duration::from_secs(1), flags.woken())
            .await
            .expect("wake-up was lost");
    }

    #[tokio::test]
    async fn test_sighup_sets_reload_flag() {
        let flags = Arc::new(SignalFlags::new(true));
        install_listeners(&flags).unwrap();

        // SAFETY: raising a signal at our own process, with a handler installed above
        unsafe {
            libc::raise(libc::SIGHUP);
        }
        tokio::time::timeout(Duration::from_secs(5), flags.woken())
            .await
            .expect("SIGHUP not delivered");
        assert!(flags.take_reload());
        assert!(!flags.terminate_requested());
    }
}
