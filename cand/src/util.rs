use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::task::{JoinError, JoinHandle};

/// Runs a task body and logs instead of propagating its error.
pub async fn catch_error<Fut, E>(context: &str, future: Fut)
where
    Fut: Future<Output = Result<(), E>>,
    E: fmt::Display + fmt::Debug,
{
    if let Err(e) = future.await {
        log::error!("{}: {}", context, e);
        log::debug!("Details: {:?}", e);
    }
}

/// A join handle that aborts its task when dropped.
pub struct KillJoinHandle<T> {
    handle: JoinHandle<T>,
}

impl<T> Drop for KillJoinHandle<T> {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl<T> Future for KillJoinHandle<T> {
    type Output = Result<T, JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx)
    }
}

pub fn kill_task_on_drop<T>(handle: JoinHandle<T>) -> KillJoinHandle<T> {
    KillJoinHandle { handle }
}
