//! Cooperative cancellation.
//!
//! A [`StopFlag`] is polled by the learner before every vector step and by
//! the evaluation harness at step boundaries. The binary arms it from a
//! Ctrl-C handler running on a helper thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// Shared, clonable stop request.
#[derive(Clone, Debug, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Arm `flag` on the first Ctrl-C.
///
/// A current-thread tokio runtime on a detached thread awaits the signal.
/// Failure to install the handler is logged and otherwise ignored.
pub fn install_ctrl_c_handler(flag: StopFlag) {
    let spawned = thread::Builder::new()
        .name("ctrl-c".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    log::warn!("cannot build signal runtime: {}", e);
                    return;
                }
            };
            runtime.block_on(async {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        log::warn!("interrupt received; finishing the current step");
                        flag.request_stop();
                    }
                    Err(e) => log::warn!("cannot listen for Ctrl-C: {}", e),
                }
            });
        });
    if let Err(e) = spawned {
        log::warn!("cannot spawn signal thread: {}", e);
    }
}
