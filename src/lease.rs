use futures_util::future::{AbortHandle, Abortable};
use std::future::Future;
use std::time::Duration;

use crate::data::RequestKind;

/// How a leased request ended.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome<T> {
    Completed(T),
    /// The lease was released (or dropped) before the request produced anything.
    Released,
}

/// Scopes one in-flight request. Releasing or dropping the lease abandons a
/// request that has not produced yet; a finished request releases its lease
/// itself. The linger is how long the holder keeps a finished lease around
/// before forgetting it, it never cuts a pending request short.
#[derive(Debug)]
pub struct Lease {
    linger: Duration,
    abort: AbortHandle,
}

impl Lease {
    pub fn acquire<F>(
        kind: RequestKind,
        linger: Duration,
        request: F,
    ) -> (Lease, impl Future<Output = Outcome<F::Output>>)
    where
        F: Future,
    {
        let (abort, registration) = AbortHandle::new_pair();
        let guarded = Abortable::new(request, registration);
        let finished = abort.clone();

        let leased = async move {
            let outcome = match guarded.await {
                Ok(value) => Outcome::Completed(value),
                Err(_aborted) => {
                    log::debug!("{:?} request released before completion", kind);
                    Outcome::Released
                }
            };
            finished.abort();
            outcome
        };

        (Lease { linger, abort }, leased)
    }

    pub fn linger(&self) -> Duration {
        self.linger
    }

    /// Idempotent.
    pub fn release(&self) {
        self.abort.abort();
    }

    pub fn is_released(&self) -> bool {
        self.abort.is_aborted()
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.abort.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn completes_and_releases_itself() {
        let (lease, request) = Lease::acquire(RequestKind::WorldTotal, Duration::from_millis(6000), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            42
        });

        assert!(!lease.is_released());
        assert_eq!(request.await, Outcome::Completed(42));
        assert!(lease.is_released());
    }

    #[tokio::test(start_paused = true)]
    async fn response_slower_than_linger_still_completes() {
        let (lease, request) = Lease::acquire(RequestKind::Countries, Duration::from_millis(6000), async {
            tokio::time::sleep(Duration::from_millis(7000)).await;
            vec![1u8]
        });

        let started = tokio::time::Instant::now();
        assert_eq!(request.await, Outcome::Completed(vec![1u8]));
        assert!(started.elapsed() >= Duration::from_millis(7000));
        assert!(lease.is_released());
        assert_eq!(lease.linger(), Duration::from_millis(6000));
    }

    #[tokio::test(start_paused = true)]
    async fn release_abandons_pending_request() {
        let (lease, request) = Lease::acquire(
            RequestKind::CountryDetail,
            Duration::from_millis(10000),
            std::future::pending::<()>(),
        );

        lease.release();
        lease.release();
        assert!(lease.is_released());
        assert_eq!(request.await, Outcome::Released);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_lease_releases_it() {
        let (lease, request) = Lease::acquire(
            RequestKind::CountryDetail,
            Duration::from_millis(10000),
            std::future::pending::<()>(),
        );

        drop(lease);
        assert_eq!(request.await, Outcome::Released);
    }
}
