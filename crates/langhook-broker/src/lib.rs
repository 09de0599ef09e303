//! # LangHook Stream Client
//!
//! Thin typed wrapper over `async-nats` JetStream. Retention is
//! limits-based — this pipeline doesn't promise exactly-once or
//! multi-region delivery, so this crate never reaches for work-queue or
//! mirrored-stream semantics, only `publish`/durable `subscribe` with
//! explicit ack/nak.

#![deny(unsafe_code)]

pub mod error;

use std::time::Duration;

use async_nats::jetstream::consumer::{pull, AckPolicy};
use async_nats::jetstream::stream::{Config as StreamConfig, RetentionPolicy};
use async_nats::jetstream::{self, Context};
use async_nats::HeaderMap;
use bytes::Bytes;
use futures::StreamExt;

pub use error::BrokerError;

/// How long a stream retains messages before the broker reclaims space.
const DEFAULT_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// A connected handle to the JetStream broker.
#[derive(Clone)]
pub struct StreamClient {
    jetstream: Context,
}

impl StreamClient {
    pub async fn connect(url: &str) -> Result<Self, BrokerError> {
        let client = async_nats::connect(url).await?;
        Ok(Self {
            jetstream: jetstream::new(client),
        })
    }

    /// Idempotent: creates the stream if absent, otherwise returns the
    /// existing one unchanged.
    pub async fn ensure_stream(
        &self,
        name: &str,
        subjects: Vec<String>,
    ) -> Result<(), BrokerError> {
        self.jetstream
            .get_or_create_stream(StreamConfig {
                name: name.to_string(),
                subjects,
                retention: RetentionPolicy::Limits,
                max_age: DEFAULT_MAX_AGE,
                ..Default::default()
            })
            .await?;
        Ok(())
    }

    /// Publish one message and wait for the broker's ack: returns once the
    /// broker has durably stored the message.
    pub async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        let ack_future = self
            .jetstream
            .publish(subject.to_string(), Bytes::from(payload))
            .await?;
        ack_future
            .await
            .map_err(|e| BrokerError::Publish(e.to_string()))?;
        Ok(())
    }

    /// Publish with a correlation header (used by the ingest path to carry
    /// `request_id` through to downstream workers without encoding it into
    /// every payload shape).
    pub async fn publish_with_headers(
        &self,
        subject: &str,
        headers: HeaderMap,
        payload: Vec<u8>,
    ) -> Result<(), BrokerError> {
        let ack_future = self
            .jetstream
            .publish_with_headers(subject.to_string(), headers, Bytes::from(payload))
            .await?;
        ack_future
            .await
            .map_err(|e| BrokerError::Publish(e.to_string()))?;
        Ok(())
    }

    /// Bind (or rebind) a durable pull consumer scoped to `filter_subject`
    /// on `stream`, and return the subscription handle the map worker and
    /// matcher tasks drain from.
    ///
    /// Rebinding with the same `durable_name` against an unchanged
    /// `filter_subject` is a no-op; a changed `filter_subject` (e.g. a
    /// subscription's pattern was edited) recreates the consumer so the new
    /// pattern takes effect on the next poll.
    pub async fn subscribe(
        &self,
        stream: &str,
        filter_subject: &str,
        durable_name: &str,
    ) -> Result<Subscription, BrokerError> {
        let stream = self.jetstream.get_stream(stream).await?;
        let consumer = stream
            .get_or_create_consumer(
                durable_name,
                pull::Config {
                    durable_name: Some(durable_name.to_string()),
                    filter_subject: filter_subject.to_string(),
                    ack_policy: AckPolicy::Explicit,
                    ..Default::default()
                },
            )
            .await?;
        let messages = consumer.messages().await?;
        Ok(Subscription { messages })
    }

    /// Raw JetStream context, for the control plane to run broker-level
    /// health checks at startup without this crate needing a dedicated
    /// health method for every future check.
    pub fn context(&self) -> &Context {
        &self.jetstream
    }
}

/// A bound durable consumer, yielding [`Delivery`] values to ack or nak.
pub struct Subscription {
    messages: pull::Stream,
}

impl Subscription {
    /// Pull the next message, or `None` once the underlying stream closes
    /// (broker connection dropped — the caller should reconnect and
    /// resubscribe rather than treat this as end-of-data).
    pub async fn next(&mut self) -> Option<Result<Delivery, BrokerError>> {
        match self.messages.next().await {
            Some(Ok(message)) => Some(Ok(Delivery { message })),
            Some(Err(err)) => Some(Err(BrokerError::JetStream(err.to_string()))),
            None => None,
        }
    }
}

/// One delivered message, carrying its own ack handle so the caller never
/// has to thread a separate consumer reference through to acknowledge it.
pub struct Delivery {
    message: jetstream::Message,
}

impl Delivery {
    pub fn subject(&self) -> &str {
        self.message.subject.as_str()
    }

    pub fn payload(&self) -> &Bytes {
        &self.message.payload
    }

    pub fn headers(&self) -> Option<&HeaderMap> {
        self.message.headers.as_ref()
    }

    /// Acknowledge successful processing: only ack after the canonical
    /// event has been durably published / the webhook dispatched.
    pub async fn ack(&self) -> Result<(), BrokerError> {
        self.message
            .ack()
            .await
            .map_err(|e| BrokerError::Ack(e.to_string()))
    }

    /// Negative-acknowledge for redelivery: transient failures nak rather
    /// than drop to the DLQ.
    pub async fn nak(&self) -> Result<(), BrokerError> {
        self.message
            .ack_with(jetstream::AckKind::Nak)
            .await
            .map_err(|e| BrokerError::Ack(e.to_string()))
    }
}
