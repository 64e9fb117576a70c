//! Feed lifecycle hook.
//!
//! A live feed ends exactly once, either by running to exhaustion or by being
//! dropped early. [`FeedSession`] owns the feed and a [`Finalize`]
//! implementation and guarantees `finalize` runs once on whichever path comes
//! first. Wrapping the feed's own finalizer in [`ReconcilingFinalize`] makes
//! the accumulated series land in the store before that finalizer sees the
//! feed.

use tracing::{error, info};

use crate::data::{SchemaError, StoreError};
use crate::domain::{Bar, Series};
use crate::reconcile::{Reconciliation, StoreWriter};

/// A source of bars whose accumulated content can be snapshotted.
pub trait LiveFeed {
    fn name(&self) -> &str;

    /// Everything the feed has produced so far.
    fn series(&self) -> Series;
}

/// End-of-life action for a feed.
pub trait Finalize<F: ?Sized> {
    fn finalize(&mut self, feed: &F);
}

/// Runs a plain callback.
pub struct PlainFinalize<C> {
    callback: C,
}

impl<C> PlainFinalize<C> {
    pub fn new(callback: C) -> Self {
        Self { callback }
    }
}

impl<F: ?Sized, C> Finalize<F> for PlainFinalize<C>
where
    C: FnMut(&F),
{
    fn finalize(&mut self, feed: &F) {
        (self.callback)(feed)
    }
}

/// Reconciles the feed's series into a store, then runs `inner`.
///
/// Both steps happen on the first call only. An I/O failure is logged and
/// kept in [`outcome`](Self::outcome); `inner` still runs.
pub struct ReconcilingFinalize<I> {
    writer: StoreWriter,
    inner: I,
    done: bool,
    outcome: Option<Result<Reconciliation, StoreError>>,
}

impl<I> ReconcilingFinalize<I> {
    pub fn new(writer: StoreWriter, inner: I) -> Self {
        Self {
            writer,
            inner,
            done: false,
            outcome: None,
        }
    }

    pub fn writer(&self) -> &StoreWriter {
        &self.writer
    }

    /// `None` until finalization has run.
    pub fn outcome(&self) -> Option<&Result<Reconciliation, StoreError>> {
        self.outcome.as_ref()
    }

    pub fn take_outcome(&mut self) -> Option<Result<Reconciliation, StoreError>> {
        self.outcome.take()
    }
}

impl<F, I> Finalize<F> for ReconcilingFinalize<I>
where
    F: LiveFeed + ?Sized,
    I: Finalize<F>,
{
    fn finalize(&mut self, feed: &F) {
        if self.done {
            return;
        }
        self.done = true;

        let series = feed.series();
        let outcome = self.writer.reconcile_and_store(&series);
        match &outcome {
            Ok(Reconciliation::Committed { commit, .. }) => info!(
                feed = feed.name(),
                store = %self.writer.store().path().display(),
                ?commit,
                "feed reconciled"
            ),
            Ok(Reconciliation::Quarantined { path, .. }) => info!(
                feed = feed.name(),
                quarantine = %path.display(),
                "feed quarantined"
            ),
            Err(e) => error!(feed = feed.name(), "feed reconciliation failed: {e}"),
        }
        self.outcome = Some(outcome);

        self.inner.finalize(feed);
    }
}

/// Owns a feed for its lifetime and finalizes it exactly once.
///
/// Call [`finish`](Self::finish) when the feed is exhausted. If the session is
/// dropped first, finalization runs from `Drop`.
pub struct FeedSession<F, Fin>
where
    F: LiveFeed,
    Fin: Finalize<F>,
{
    feed: F,
    finalizer: Fin,
    finalized: bool,
}

impl<F, Fin> FeedSession<F, Fin>
where
    F: LiveFeed,
    Fin: Finalize<F>,
{
    pub fn new(feed: F, finalizer: Fin) -> Self {
        Self {
            feed,
            finalizer,
            finalized: false,
        }
    }

    pub fn feed(&self) -> &F {
        &self.feed
    }

    /// Mutable access while the feed is live.
    pub fn feed_mut(&mut self) -> &mut F {
        &mut self.feed
    }

    pub fn finalizer(&self) -> &Fin {
        &self.finalizer
    }

    pub fn finalizer_mut(&mut self) -> &mut Fin {
        &mut self.finalizer
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Finalize now. Later calls, and the eventual drop, do nothing.
    pub fn finish(&mut self) {
        if self.finalized {
            return;
        }
        self.finalized = true;
        self.finalizer.finalize(&self.feed);
    }
}

impl<F, Fin> Drop for FeedSession<F, Fin>
where
    F: LiveFeed,
    Fin: Finalize<F>,
{
    fn drop(&mut self) {
        self.finish();
    }
}

/// In-memory feed that accumulates bars as they arrive.
#[derive(Debug, Clone, Default)]
pub struct BufferedFeed {
    name: String,
    series: Series,
}

impl BufferedFeed {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            series: Series::new(),
        }
    }

    /// Accept the next bar. Bars must arrive in ascending date order.
    pub fn push(&mut self, bar: Bar) -> Result<(), SchemaError> {
        self.series.push(bar)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

impl LiveFeed for BufferedFeed {
    fn name(&self) -> &str {
        &self.name
    }

    fn series(&self) -> Series {
        self.series.clone()
    }
}
