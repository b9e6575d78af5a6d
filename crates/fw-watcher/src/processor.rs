//! The consumer callback.

use crate::events::ChangeEvent;

/// Handles change events on a consumer pool's worker threads.
///
/// A processor is shared by every worker of its pool and may be called from
/// several threads at once. An `Err` is logged and counted; it never stops
/// the pool or affects other events. Panics are caught and treated the same
/// way.
///
/// Any `Fn(&ChangeEvent) -> anyhow::Result<()>` closure is a processor.
///
/// # Examples
///
/// ```
/// use fw_watcher::{ChangeEvent, EventProcessor};
///
/// struct Logger;
///
/// impl EventProcessor for Logger {
///     fn process(&self, event: &ChangeEvent) -> anyhow::Result<()> {
///         anyhow::ensure!(event.path.is_absolute(), "relative path {}", event.path);
///         Ok(())
///     }
/// }
/// ```
pub trait EventProcessor: Send + Sync + 'static {
    /// Handles one event.
    fn process(&self, event: &ChangeEvent) -> anyhow::Result<()>;
}

impl<F> EventProcessor for F
where
    F: Fn(&ChangeEvent) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn process(&self, event: &ChangeEvent) -> anyhow::Result<()> {
        self(event)
    }
}
