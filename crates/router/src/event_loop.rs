//! Process-wide event loop backend selection.
//!
//! The backend is chosen once per OS process, before any async work starts,
//! and never changes afterwards. Only one router runtime may be built per
//! process.

use std::fmt;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::runtime::Runtime;
use tracing::info;

static BACKEND: OnceLock<EventLoopBackend> = OnceLock::new();
static RUNTIME_BUILT: AtomicBool = AtomicBool::new(false);

/// I/O readiness backend driving the event loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventLoopBackend {
    /// epoll, the default path.
    Epoll,

    /// Windows I/O completion ports.
    Iocp,

    /// BSD/macOS kqueue.
    Kqueue,
}

impl fmt::Display for EventLoopBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Epoll => "epoll",
            Self::Iocp => "iocp",
            Self::Kqueue => "kqueue",
        })
    }
}

impl EventLoopBackend {
    const fn for_platform() -> Self {
        if cfg!(target_os = "macos") {
            Self::Kqueue
        } else if cfg!(windows) {
            Self::Iocp
        } else {
            Self::Epoll
        }
    }
}

/// Returns the backend for this process, selecting it on first use.
pub fn backend() -> EventLoopBackend {
    *BACKEND.get_or_init(|| {
        let backend = EventLoopBackend::for_platform();
        info!("selected {} event loop backend", backend);
        backend
    })
}

/// Builds the router's runtime on the selected backend.
///
/// # Errors
///
/// Returns an error if a runtime was already built in this process, or if the
/// runtime cannot be created.
pub fn build_runtime() -> std::io::Result<Runtime> {
    if RUNTIME_BUILT.swap(true, Ordering::SeqCst) {
        return Err(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            "router runtime already built in this process",
        ));
    }

    backend();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("keel-router")
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_is_stable() {
        let first = backend();
        for _ in 0..10 {
            assert_eq!(backend(), first);
        }

        #[cfg(target_os = "linux")]
        assert_eq!(first, EventLoopBackend::Epoll);
    }

    #[test]
    fn test_runtime_is_built_once() {
        let runtime = build_runtime().unwrap();
        runtime.block_on(async {});

        let again = build_runtime();
        assert_eq!(
            again.map(|_| ()).unwrap_err().kind(),
            std::io::ErrorKind::AlreadyExists
        );
    }
}
