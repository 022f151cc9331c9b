use std::sync::Weak;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Handle to a background maintenance loop. The loop is aborted when the handle drops.
#[must_use = "Dropping the handle stops the maintenance loop"]
#[derive(Debug)]
pub struct MaintenanceTask {
    name: &'static str,
    handle: JoinHandle<()>,
}

impl MaintenanceTask {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for MaintenanceTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Runs `tick` every `period` against `target` for as long as it is alive.
///
/// Only a weak reference is held, so the loop never keeps its service alive; it exits on
/// the first tick after the last strong reference is gone.
pub(crate) fn spawn_periodic<T, F>(
    name: &'static str,
    target: Weak<T>,
    period: Duration,
    mut tick: F,
) -> MaintenanceTask
where
    T: Send + Sync + 'static,
    F: FnMut(&T) + Send + 'static,
{
    let period = period.max(MIN_PERIOD);
    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;

        loop {
            interval.tick().await;
            let Some(target) = target.upgrade() else {
                debug!(task = name, "Maintenance target dropped, stopping");
                break;
            };
            tick(&target);
        }
    });

    MaintenanceTask { name, handle }
}
