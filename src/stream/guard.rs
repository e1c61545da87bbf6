use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use pin_project_lite::pin_project;

pin_project! {
    /// Owns the upstream body for as long as the downstream response needs it.
    ///
    /// Dropping the lease drops the inner stream, which aborts the upstream
    /// connection. Early drops (the client went away, or the adapter stopped
    /// reading after a terminal event) are logged with the request id.
    pub struct UpstreamLease<S> {
        #[pin]
        inner: S,
        request_id: String,
        exhausted: bool,
    }

    impl<S> PinnedDrop for UpstreamLease<S> {
        fn drop(this: Pin<&mut Self>) {
            let this = this.project();
            if !*this.exhausted {
                tracing::debug!(
                    request_id = %this.request_id,
                    "releasing upstream stream before it finished"
                );
            }
        }
    }
}

impl<S> UpstreamLease<S> {
    pub fn new(inner: S, request_id: impl Into<String>) -> Self {
        Self {
            inner,
            request_id: request_id.into(),
            exhausted: false,
        }
    }

    #[cfg(test)]
    fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

impl<S: Stream> Stream for UpstreamLease<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        if *this.exhausted {
            return Poll::Ready(None);
        }
        let polled = this.inner.poll_next(cx);
        if let Poll::Ready(None) = polled {
            *this.exhausted = true;
        }
        polled
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}
