use std::sync::Arc;

use crate::worker::Worker;

/// Pick the worker with the strictly greatest free capacity.
///
/// Seeding the best-seen capacity at zero skips saturated workers, including
/// any whose `running` count overshoots `max`. Ties keep the earliest match,
/// so registry iteration order bounds starvation.
pub fn select_worker(workers: &[Arc<Worker>]) -> Option<Arc<Worker>> {
    let mut best: Option<&Arc<Worker>> = None;
    let mut free = 0;
    for worker in workers {
        let diff = worker.free_slots();
        if diff > free {
            best = Some(worker);
            free = diff;
        }
    }
    best.cloned()
}
