//! Bounded-lifetime lazy sequences over backend cursors.
//!
//! A [`RecordStream`] wraps the [`DocumentStream`] returned by a backend and converts each
//! stored document on the fly. It is one-shot: the underlying cursor is released as soon
//! as the stream is exhausted, yields an error, is [closed](RecordStream::close) or is
//! dropped, whichever comes first. Dropping the future that polls it (e.g. on task
//! cancellation or a timeout) drops the stream as well.

use futures::{Stream, StreamExt, TryStreamExt};
use std::{
    fmt,
    marker::PhantomData,
    pin::Pin,
    task::{Context, Poll},
};

use crate::{
    backend::DocumentStream,
    document::FromStored,
    error::DocumentStoreResult,
};

/// A lazy, one-shot sequence of records pulled from a store cursor.
pub struct RecordStream<T> {
    inner: Option<DocumentStream>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: FromStored> RecordStream<T> {
    /// Wraps a backend stream.
    pub fn new(inner: DocumentStream) -> Self {
        Self { inner: Some(inner), _marker: PhantomData }
    }

    /// Returns `true` once the underlying cursor has been released.
    pub fn is_released(&self) -> bool {
        self.inner.is_none()
    }

    /// Releases the underlying cursor without consuming the remaining results.
    pub fn close(mut self) {
        self.release();
    }

    /// Drains the stream into a vector.
    pub async fn collect_all(self) -> DocumentStoreResult<Vec<T>> {
        self.try_collect().await
    }

    fn release(&mut self) {
        if self.inner.take().is_some() {
            tracing::trace!("record stream released its cursor");
        }
    }
}

impl<T: FromStored> Stream for RecordStream<T> {
    type Item = DocumentStoreResult<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };

        match inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(stored))) => Poll::Ready(Some(T::from_stored(stored))),
            Poll::Ready(Some(Err(err))) => {
                this.release();
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                this.release();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.inner {
            Some(inner) => inner.size_hint(),
            None => (0, Some(0)),
        }
    }
}

impl<T> fmt::Debug for RecordStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordStream")
            .field("released", &self.inner.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use futures::{executor::block_on, stream};
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use crate::{
        document::{PartialRecord, StoredDocument},
        error::DocumentStoreError,
    };

    struct Guard(Arc<AtomicUsize>);

    impl Drop for Guard {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn tracked(items: Vec<DocumentStoreResult<StoredDocument>>, open: &Arc<AtomicUsize>) -> DocumentStream {
        open.fetch_add(1, Ordering::SeqCst);
        let guard = Guard(open.clone());

        stream::iter(items)
            .map(move |item| {
                let _ = &guard;
                item
            })
            .boxed()
    }

    fn stored(id: &str) -> DocumentStoreResult<StoredDocument> {
        Ok(StoredDocument::new(id.into(), doc! { "name": id }))
    }

    #[test]
    fn exhaustion_releases_the_cursor() {
        let open = Arc::new(AtomicUsize::new(0));
        let stream = RecordStream::<PartialRecord>::new(tracked(vec![stored("a"), stored("b")], &open));

        let records = block_on(stream.collect_all()).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(open.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn early_close_releases_the_cursor() {
        let open = Arc::new(AtomicUsize::new(0));
        let mut stream = RecordStream::<PartialRecord>::new(tracked(vec![stored("a"), stored("b")], &open));

        let first = block_on(stream.next()).unwrap().unwrap();
        assert_eq!(first.id.as_str(), "a");
        assert_eq!(open.load(Ordering::SeqCst), 1);

        stream.close();
        assert_eq!(open.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn errors_end_the_sequence() {
        let open = Arc::new(AtomicUsize::new(0));
        let mut stream = RecordStream::<PartialRecord>::new(tracked(
            vec![Err(DocumentStoreError::Timeout("cursor".into())), stored("b")],
            &open,
        ));

        assert!(matches!(block_on(stream.next()), Some(Err(DocumentStoreError::Timeout(_)))));
        assert!(stream.is_released());
        assert_eq!(open.load(Ordering::SeqCst), 0);
        assert!(block_on(stream.next()).is_none());
    }
}
