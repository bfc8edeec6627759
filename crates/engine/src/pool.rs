use std::{future::Future, sync::Arc};

use tokio::{sync::Semaphore, task::JoinSet};

/// Run `task` for every item with at most `max_in_flight` futures running at once.
///
/// All tasks are awaited before this returns and a failing task never cancels
/// its siblings. Results come back in input order; a task that panics is logged
/// and omitted.
pub async fn run_bounded<T, R, F, Fut>(items: Vec<T>, max_in_flight: usize, task: F) -> Vec<R>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = R> + Send + 'static,
    R: Send + 'static,
{
    let sem = Arc::new(Semaphore::new(max_in_flight.max(1)));
    let mut set = JoinSet::new();
    let len = items.len();
    for (index, item) in items.into_iter().enumerate() {
        let sem = sem.clone();
        let fut = task(item);
        set.spawn(async move {
            let _permit = sem.acquire_owned().await.expect("semaphore is never closed");
            (index, fut.await)
        });
    }
    let mut results = Vec::with_capacity(len);
    while let Some(join_result) = set.join_next().await {
        match join_result {
            Ok(result) => results.push(result),
            Err(e) => tracing::error!("Worker task failed: {:?}", e),
        }
    }
    results.sort_by_key(|(index, _)| *index);
    results.into_iter().map(|(_, result)| result).collect()
}
