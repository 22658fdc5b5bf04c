use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Cancels a token once its deadline passes. Dropping the timer disarms it.
pub struct DeadlineTimer {
    handle: JoinHandle<()>,
}

impl DeadlineTimer {
    pub fn arm(after: Duration, token: CancellationToken) -> Self {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            token.cancel();
        });
        Self { handle }
    }
}

impl Drop for DeadlineTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[derive(Debug, PartialEq)]
pub enum Raced<T> {
    Finished(T),
    Cancelled,
}

/// Run `work` until it finishes or `token` is cancelled, by the deadline
/// timer or by anyone else holding the token.
pub async fn race_deadline<F>(deadline: Duration, token: &CancellationToken, work: F) -> Raced<F::Output>
where
    F: Future,
{
    let _timer = DeadlineTimer::arm(deadline, token.clone());
    tokio::select! {
        biased;
        _ = token.cancelled() => Raced::Cancelled,
        out = work => Raced::Finished(out),
    }
}
