//! Functional pipelines over a log.
//!
//! Everything here is a fold. [`foldl`] pulls batches from a [`Consumer`]
//! and threads an accumulator through them; `map`, `filter`, `flatmap`,
//! `foreach` and the text tools (`head`, `cat`, `grep`, `wc`) are folds with
//! a fixed reduction.
//!
//! [`foldl_to`] additionally collects output messages per input and writes
//! them to a target topic, possibly on another backend, whenever
//! `produce_batch_size` messages are buffered and at the end of every
//! consumed batch.
//! `map_to`, `filter_to`, `flatmap_to` and [`cp`] build on it.
//!
//! ## Failure semantics
//!
//! A failing function aborts the pipeline with the failing record's
//! position attached ([`ClientError::Pipeline`]). Output already written
//! stays written. Source reads never commit on their own: the group commits
//! after each batch once its output has been flushed, so the committed
//! offset only covers records whose output reached the target. The source
//! consumer is closed on success and on failure.
//!
//! [`Consumer`]: crate::Consumer

use crate::consumer::{Consumer, Message, ReadOptions};
use crate::error::{ClientError, Result};
use crate::producer::{OutMessage, Producer};
use crate::storage::Storage;

/// Fold over `topic`. Returns the accumulator and the number of messages
/// consumed.
pub async fn foldl<A, F>(
    storage: &Storage,
    topic: &str,
    options: &ReadOptions,
    initial: A,
    mut f: F,
) -> Result<(A, usize)>
where
    F: FnMut(A, Message) -> Result<A>,
{
    let mut consumer = storage.pipeline_consumer(topic, options).await?;
    let limit = options.n.unwrap_or(usize::MAX);
    let outcome = fold_source(&mut consumer, topic, limit, initial, &mut f).await;
    let (acc, consumed) = consumer.close_after(outcome).await?;

    tracing::debug!(topic = %topic, group = consumer.group(), consumed, "Fold finished");
    Ok((acc, consumed))
}

async fn fold_source<A, F>(
    consumer: &mut Consumer,
    topic: &str,
    limit: usize,
    mut acc: A,
    f: &mut F,
) -> Result<(A, usize)>
where
    F: FnMut(A, Message) -> Result<A>,
{
    let mut consumed = 0;
    while consumed < limit {
        let want = consumer.batch_size().min(limit - consumed);
        let batch = consumer.consume(want).await?;
        if batch.is_empty() {
            break;
        }
        for message in batch {
            let (partition, offset) = (message.partition, message.offset);
            acc = f(acc, message).map_err(|e| e.at(topic, partition, offset))?;
            consumed += 1;
        }
        consumer.processed().await?;
    }
    Ok((acc, consumed))
}

pub async fn map<T, F>(
    storage: &Storage,
    topic: &str,
    options: &ReadOptions,
    mut f: F,
) -> Result<Vec<T>>
where
    F: FnMut(Message) -> Result<T>,
{
    let (out, _) = foldl(storage, topic, options, Vec::new(), |mut out, message| {
        out.push(f(message)?);
        Ok(out)
    })
    .await?;
    Ok(out)
}

pub async fn filter<F>(
    storage: &Storage,
    topic: &str,
    options: &ReadOptions,
    mut predicate: F,
) -> Result<Vec<Message>>
where
    F: FnMut(&Message) -> Result<bool>,
{
    let (out, _) = foldl(storage, topic, options, Vec::new(), |mut out, message| {
        if predicate(&message)? {
            out.push(message);
        }
        Ok(out)
    })
    .await?;
    Ok(out)
}

pub async fn flatmap<T, F>(
    storage: &Storage,
    topic: &str,
    options: &ReadOptions,
    mut f: F,
) -> Result<Vec<T>>
where
    F: FnMut(Message) -> Result<Vec<T>>,
{
    let (out, _) = foldl(storage, topic, options, Vec::new(), |mut out, message| {
        out.extend(f(message)?);
        Ok(out)
    })
    .await?;
    Ok(out)
}

/// Call `f` on every message; returns how many were seen.
pub async fn foreach<F>(
    storage: &Storage,
    topic: &str,
    options: &ReadOptions,
    mut f: F,
) -> Result<usize>
where
    F: FnMut(Message) -> Result<()>,
{
    let (_, consumed) = foldl(storage, topic, options, (), |(), message| f(message)).await?;
    Ok(consumed)
}

/// The first `n` messages.
pub async fn head(
    storage: &Storage,
    topic: &str,
    options: &ReadOptions,
    n: usize,
) -> Result<Vec<Message>> {
    let options = options.clone().with_n(n);
    map(storage, topic, &options, Ok).await
}

/// Every message, up to `options.n`.
pub async fn cat(storage: &Storage, topic: &str, options: &ReadOptions) -> Result<Vec<Message>> {
    map(storage, topic, options, Ok).await
}

/// Messages whose key or value text contains `pattern`.
pub async fn grep(
    storage: &Storage,
    topic: &str,
    options: &ReadOptions,
    pattern: &str,
) -> Result<Vec<Message>> {
    filter(storage, topic, options, |message| {
        Ok(message.key_text().contains(pattern) || message.value_text().contains(pattern))
    })
    .await
}

/// Message, word and byte counts of the value texts.
pub async fn wc(storage: &Storage, topic: &str, options: &ReadOptions) -> Result<(usize, usize, usize)> {
    let ((words, bytes), messages) =
        foldl(storage, topic, options, (0, 0), |(words, bytes), message| {
            let text = message.value_text();
            Ok((words + text.split_whitespace().count(), bytes + text.len()))
        })
        .await?;
    Ok((messages, words, bytes))
}

/// Buffers pipeline output and writes it in batches.
pub(crate) struct Sink {
    producer: Producer,
    buffer: Vec<OutMessage>,
    batch_size: usize,
    produced: usize,
}

impl Sink {
    pub(crate) fn new(producer: Producer, batch_size: usize) -> Self {
        Self {
            producer,
            buffer: Vec::new(),
            batch_size: batch_size.max(1),
            produced: 0,
        }
    }

    pub(crate) async fn push(&mut self, messages: Vec<OutMessage>) -> Result<()> {
        for message in messages {
            self.buffer.push(message);
            if self.buffer.len() >= self.batch_size {
                self.flush().await?;
            }
        }
        Ok(())
    }

    pub(crate) async fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.buffer);
        let count = batch.len();
        self.producer.produce(batch).await?;
        self.produced += count;

        tracing::debug!(
            topic = %self.producer.topic(),
            messages = count,
            produced = self.produced,
            "Flushed pipeline output"
        );
        Ok(())
    }

    pub(crate) fn produced(&self) -> usize {
        self.produced
    }
}

/// Fold over `topic`, writing the messages `f` returns to `target_topic` on
/// `target`. Returns the accumulator, messages consumed and messages produced.
///
/// Output is encoded with the key and value types the source is read with.
pub async fn foldl_to<A, F>(
    source: &Storage,
    topic: &str,
    options: &ReadOptions,
    target: &Storage,
    target_topic: &str,
    initial: A,
    mut f: F,
) -> Result<(A, usize, usize)>
where
    F: FnMut(A, Message) -> Result<(A, Vec<OutMessage>)>,
{
    let mut consumer = source.pipeline_consumer(topic, options).await?;
    let limit = options.n.unwrap_or(usize::MAX);
    let outcome = async {
        let producer = target
            .producer_with_types(target_topic, consumer.key_type(), consumer.value_type())
            .await?;
        let mut sink = Sink::new(producer, source.config().produce_batch_size);
        let (acc, consumed) =
            fold_source_to(&mut consumer, topic, limit, initial, &mut sink, &mut f).await?;
        Ok::<_, ClientError>((acc, consumed, sink.produced()))
    }
    .await;
    let (acc, consumed, produced) = consumer.close_after(outcome).await?;

    tracing::debug!(
        topic = %topic,
        target_topic = %target_topic,
        consumed,
        produced,
        "Pipeline finished"
    );
    Ok((acc, consumed, produced))
}

async fn fold_source_to<A, F>(
    consumer: &mut Consumer,
    topic: &str,
    limit: usize,
    mut acc: A,
    sink: &mut Sink,
    f: &mut F,
) -> Result<(A, usize)>
where
    F: FnMut(A, Message) -> Result<(A, Vec<OutMessage>)>,
{
    let mut consumed = 0;
    while consumed < limit {
        let want = consumer.batch_size().min(limit - consumed);
        let batch = consumer.consume(want).await?;
        if batch.is_empty() {
            break;
        }
        for message in batch {
            let (partition, offset) = (message.partition, message.offset);
            let at = |e: ClientError| e.at(topic, partition, offset);
            let (next, out) = f(acc, message).map_err(at)?;
            acc = next;
            consumed += 1;
            sink.push(out).await.map_err(at)?;
        }
        // Commit only what reached the target.
        sink.flush().await?;
        consumer.processed().await?;
    }
    Ok((acc, consumed))
}

/// Write `f(message)` for every message. Returns consumed and produced counts.
pub async fn map_to<F>(
    source: &Storage,
    topic: &str,
    options: &ReadOptions,
    target: &Storage,
    target_topic: &str,
    mut f: F,
) -> Result<(usize, usize)>
where
    F: FnMut(Message) -> Result<OutMessage>,
{
    let (_, consumed, produced) = foldl_to(
        source,
        topic,
        options,
        target,
        target_topic,
        (),
        |(), message| Ok(((), vec![f(message)?])),
    )
    .await?;
    Ok((consumed, produced))
}

/// Copy the messages matching `predicate`.
pub async fn filter_to<F>(
    source: &Storage,
    topic: &str,
    options: &ReadOptions,
    target: &Storage,
    target_topic: &str,
    mut predicate: F,
) -> Result<(usize, usize)>
where
    F: FnMut(&Message) -> Result<bool>,
{
    let (_, consumed, produced) = foldl_to(
        source,
        topic,
        options,
        target,
        target_topic,
        (),
        |(), message| {
            let out = if predicate(&message)? {
                vec![OutMessage::from(message)]
            } else {
                Vec::new()
            };
            Ok(((), out))
        },
    )
    .await?;
    Ok((consumed, produced))
}

pub async fn flatmap_to<F>(
    source: &Storage,
    topic: &str,
    options: &ReadOptions,
    target: &Storage,
    target_topic: &str,
    mut f: F,
) -> Result<(usize, usize)>
where
    F: FnMut(Message) -> Result<Vec<OutMessage>>,
{
    let (_, consumed, produced) = foldl_to(
        source,
        topic,
        options,
        target,
        target_topic,
        (),
        |(), message| Ok(((), f(message)?)),
    )
    .await?;
    Ok((consumed, produced))
}

/// Copy `topic` to `target_topic`, keeping keys, values, headers and
/// timestamps. Returns consumed and produced counts.
pub async fn cp(
    source: &Storage,
    topic: &str,
    options: &ReadOptions,
    target: &Storage,
    target_topic: &str,
) -> Result<(usize, usize)> {
    map_to(source, topic, options, target, target_topic, |message| {
        Ok(OutMessage::from(message))
    })
    .await
}
