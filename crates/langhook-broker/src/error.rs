//! Broker error taxonomy: every failure this crate can produce collapses to
//! `langhook_core::error::Error::BrokerUnavailable`, since a
//! caller never needs to distinguish a connect failure from a publish
//! failure — both mean "retry later, don't ack".

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("nats connect failed: {0}")]
    Connect(#[from] async_nats::ConnectError),

    #[error("jetstream operation failed: {0}")]
    JetStream(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("ack failed: {0}")]
    Ack(String),

    #[error("consumer message stream ended unexpectedly")]
    StreamEnded,
}

impl From<BrokerError> for langhook_core::error::Error {
    fn from(err: BrokerError) -> Self {
        langhook_core::error::Error::BrokerUnavailable(err.to_string())
    }
}

impl From<async_nats::jetstream::context::CreateStreamError> for BrokerError {
    fn from(err: async_nats::jetstream::context::CreateStreamError) -> Self {
        BrokerError::JetStream(err.to_string())
    }
}

impl From<async_nats::jetstream::context::PublishError> for BrokerError {
    fn from(err: async_nats::jetstream::context::PublishError) -> Self {
        BrokerError::Publish(err.to_string())
    }
}

impl From<async_nats::jetstream::consumer::pull::MessagesError> for BrokerError {
    fn from(err: async_nats::jetstream::consumer::pull::MessagesError) -> Self {
        BrokerError::JetStream(err.to_string())
    }
}

impl From<async_nats::jetstream::stream::ConsumerError> for BrokerError {
    fn from(err: async_nats::jetstream::stream::ConsumerError) -> Self {
        BrokerError::JetStream(err.to_string())
    }
}

impl From<async_nats::Error> for BrokerError {
    fn from(err: async_nats::Error) -> Self {
        BrokerError::JetStream(err.to_string())
    }
}
