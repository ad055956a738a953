//! Lock-step folds over two logs.
//!
//! [`zip_foldl`] pulls one batch from each source per round and pairs them
//! up. When the batches differ in length, the shorter one is cycled against
//! the longer one rather than truncated:
//!
//! ```text
//! left:  a b c d e
//! right: 1 2
//! pairs: (a,1) (b,2) (c,1) (d,2) (e,1)
//! ```
//!
//! The fold stops when either source returns an empty batch, when the
//! combiner returns [`ControlFlow::Break`], or once `n` left messages (from
//! the left [`ReadOptions`]) have been read. The two sources may live on
//! different backends.
//!
//! Both groups commit once per completed round, after the round's output is
//! flushed. A round cut short by [`ControlFlow::Break`] or an error is not
//! committed. Both consumers are closed whatever the outcome.

use crate::consumer::{Consumer, Message, ReadOptions};
use crate::error::{ClientError, Result};
use crate::functional::Sink;
use crate::producer::OutMessage;
use crate::storage::Storage;
use std::ops::ControlFlow;

/// One side of a zip.
#[derive(Clone, Copy)]
pub struct ZipSource<'a> {
    pub storage: &'a Storage,
    pub topic: &'a str,
    pub options: &'a ReadOptions,
}

impl<'a> ZipSource<'a> {
    pub fn new(storage: &'a Storage, topic: &'a str, options: &'a ReadOptions) -> Self {
        Self {
            storage,
            topic,
            options,
        }
    }

    async fn open(&self) -> Result<Consumer> {
        self.storage.pipeline_consumer(self.topic, self.options).await
    }
}

/// Messages read from each side and written to the target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZipCounts {
    pub left: usize,
    pub right: usize,
    pub produced: usize,
}

struct Rounds {
    left: Consumer,
    right: Consumer,
    limit: usize,
    counts: ZipCounts,
}

impl Rounds {
    async fn open(left: ZipSource<'_>, right: ZipSource<'_>) -> Result<Self> {
        let mut left_consumer = left.open().await?;
        let right_consumer = match right.open().await {
            Ok(consumer) => consumer,
            Err(e) => return left_consumer.close_after(Err(e)).await,
        };
        Ok(Self {
            left: left_consumer,
            right: right_consumer,
            limit: left.options.n.unwrap_or(usize::MAX),
            counts: ZipCounts::default(),
        })
    }

    /// Next pair of batches, or `None` when the zip is done.
    async fn next(&mut self) -> Result<Option<(Vec<Message>, Vec<Message>)>> {
        if self.counts.left >= self.limit {
            return Ok(None);
        }
        let want = self.left.batch_size().min(self.limit - self.counts.left);
        let left = self.left.consume(want).await?;
        if left.is_empty() {
            return Ok(None);
        }
        let right = self.right.consume_batch().await?;
        if right.is_empty() {
            return Ok(None);
        }
        self.counts.left += left.len();
        self.counts.right += right.len();
        Ok(Some((left, right)))
    }

    async fn processed(&mut self) -> Result<()> {
        self.left.processed().await?;
        self.right.processed().await
    }

    /// Close both consumers, keeping `outcome`'s error if there is one.
    async fn close_after<T>(mut self, outcome: Result<T>) -> Result<(T, ZipCounts)> {
        let outcome = self.left.close_after(outcome).await;
        let value = self.right.close_after(outcome).await?;
        Ok((value, self.counts))
    }
}

/// Pair index `i` of two non-empty batches, cycling the shorter one.
fn pair<'m>(left: &'m [Message], right: &'m [Message], i: usize) -> (&'m Message, &'m Message) {
    (&left[i % left.len()], &right[i % right.len()])
}

pub async fn zip_foldl<A, F>(
    left: ZipSource<'_>,
    right: ZipSource<'_>,
    initial: A,
    mut f: F,
) -> Result<(A, ZipCounts)>
where
    F: FnMut(A, &Message, &Message) -> Result<ControlFlow<A, A>>,
{
    let mut rounds = Rounds::open(left, right).await?;
    let outcome = fold_rounds(&mut rounds, initial, &mut f).await;
    let (acc, counts) = rounds.close_after(outcome).await?;

    tracing::debug!(
        left = %left.topic,
        right = %right.topic,
        left_consumed = counts.left,
        right_consumed = counts.right,
        "Zip fold finished"
    );
    Ok((acc, counts))
}

async fn fold_rounds<A, F>(rounds: &mut Rounds, mut acc: A, f: &mut F) -> Result<A>
where
    F: FnMut(A, &Message, &Message) -> Result<ControlFlow<A, A>>,
{
    'rounds: while let Some((lefts, rights)) = rounds.next().await? {
        for i in 0..lefts.len().max(rights.len()) {
            let (l, r) = pair(&lefts, &rights, i);
            match f(acc, l, r).map_err(|e| e.at(&l.topic, l.partition, l.offset))? {
                ControlFlow::Continue(next) => acc = next,
                ControlFlow::Break(next) => {
                    acc = next;
                    break 'rounds;
                }
            }
        }
        rounds.processed().await?;
    }
    Ok(acc)
}

/// Like [`zip_foldl`], writing the messages the combiner returns to
/// `target_topic` on `target` in batches of `produce_batch_size`.
///
/// Output is encoded with the left source's key and value types.
pub async fn zip_foldl_to<A, F>(
    left: ZipSource<'_>,
    right: ZipSource<'_>,
    target: &Storage,
    target_topic: &str,
    initial: A,
    mut f: F,
) -> Result<(A, ZipCounts)>
where
    F: FnMut(A, &Message, &Message) -> Result<(ControlFlow<A, A>, Vec<OutMessage>)>,
{
    let mut rounds = Rounds::open(left, right).await?;
    let outcome = async {
        let producer = target
            .producer_with_types(
                target_topic,
                rounds.left.key_type(),
                rounds.left.value_type(),
            )
            .await?;
        let mut sink = Sink::new(producer, left.storage.config().produce_batch_size);
        let acc = fold_rounds_to(&mut rounds, initial, &mut sink, &mut f).await?;
        Ok::<_, ClientError>((acc, sink.produced()))
    }
    .await;
    let ((acc, produced), mut counts) = rounds.close_after(outcome).await?;
    counts.produced = produced;

    tracing::debug!(
        left = %left.topic,
        right = %right.topic,
        target_topic = %target_topic,
        produced = counts.produced,
        "Zip pipeline finished"
    );
    Ok((acc, counts))
}

async fn fold_rounds_to<A, F>(
    rounds: &mut Rounds,
    mut acc: A,
    sink: &mut Sink,
    f: &mut F,
) -> Result<A>
where
    F: FnMut(A, &Message, &Message) -> Result<(ControlFlow<A, A>, Vec<OutMessage>)>,
{
    'rounds: while let Some((lefts, rights)) = rounds.next().await? {
        for i in 0..lefts.len().max(rights.len()) {
            let (l, r) = pair(&lefts, &rights, i);
            let at = |e: ClientError| e.at(&l.topic, l.partition, l.offset);
            let (flow, out) = f(acc, l, r).map_err(at)?;
            sink.push(out).await.map_err(at)?;
            match flow {
                ControlFlow::Continue(next) => acc = next,
                ControlFlow::Break(next) => {
                    acc = next;
                    break 'rounds;
                }
            }
        }
        sink.flush().await?;
        rounds.processed().await?;
    }
    sink.flush().await?;
    Ok(acc)
}

/// Pairs of messages whose keys or values differ, compared in zip order.
pub async fn diff(left: ZipSource<'_>, right: ZipSource<'_>) -> Result<Vec<(Message, Message)>> {
    let (differences, _) = zip_foldl(left, right, Vec::new(), |mut out, l, r| {
        if l.key != r.key || l.value != r.value {
            out.push((l.clone(), r.clone()));
        }
        Ok(ControlFlow::Continue(out))
    })
    .await?;
    Ok(differences)
}
