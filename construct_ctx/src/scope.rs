use tokio::runtime::{Handle, RuntimeFlavor};

use crate::Uninterruptible;

/// Drive `fut` to completion from a synchronous scope exit (a `Drop`).
///
/// The current context is made uninterruptible for the duration. On a
/// current-thread runtime the worker cannot be handed off, so nothing is
/// awaited and `None` is returned.
pub(crate) fn block_on_scope_exit<F: std::future::Future>(fut: F) -> Option<F::Output> {
    let _ui = Uninterruptible::new();

    match Handle::try_current() {
        Err(_) => Some(futures::executor::block_on(fut)),
        Ok(handle) => match handle.runtime_flavor() {
            RuntimeFlavor::MultiThread => {
                Some(tokio::task::block_in_place(|| handle.block_on(fut)))
            }
            _ => {
                tracing::warn!("Cannot join on scope exit from a current-thread runtime");
                None
            }
        },
    }
}
