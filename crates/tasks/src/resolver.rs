use crate::schema::Task;

/// The single next actionable task: the pending task with the lowest
/// priority rank, earliest in document order on ties.  `None` when nothing is
/// pending.
pub fn next_task(tasks: &[Task]) -> Option<&Task> {
    // `min_by_key` keeps the first of equal minima.
    tasks
        .iter()
        .filter(|task| task.is_pending())
        .min_by_key(|task| task.priority)
}

/// Every pending task in the order `next_task` would hand them out.
pub fn queue(tasks: &[Task]) -> Vec<&Task> {
    let mut pending = tasks.iter().filter(|task| task.is_pending()).collect::<Vec<_>>();
    pending.sort_by_key(|task| task.priority);
    pending
}
