use std::sync::Arc;

use tokio::{
    select,
    sync::{
        Semaphore,
        mpsc::{self, Receiver},
    },
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Runs `f` over `items` with at most `workers` calls in flight.
///
/// Results arrive on the returned receiver in completion order; the channel
/// closes once every dispatched call has finished. Cancelling the token stops
/// further dispatch but lets in-flight calls complete.
pub fn run_pool<I, T, F, Fut>(
    items: Vec<I>,
    workers: usize,
    cancel_token: CancellationToken,
    f: F,
) -> (JoinHandle<()>, Receiver<T>)
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(I) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = T> + Send + 'static,
{
    let workers = workers.max(1);
    let (tx_out, rx_out) = mpsc::channel(workers);

    let dispatcher = tokio::spawn(async move {
        let semaphore = Arc::new(Semaphore::new(workers));
        for item in items {
            let permit = select! {
                biased;
                _ = cancel_token.cancelled() => {
                    info!("Dispatcher cancelled");
                    break;
                }
                permit = semaphore.clone().acquire_owned() => permit
                    .expect("semaphore.acquired_owned failed despite never being closed"),
            };
            let tx = tx_out.clone();
            let f = f.clone();
            tokio::spawn(async move {
                let result = f(item).await;
                let _ = tx.send(result).await;
                drop(permit);
            });
        }
    });

    (dispatcher, rx_out)
}
