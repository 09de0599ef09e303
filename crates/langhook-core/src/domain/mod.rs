//! The canonical domain model.
//!
//! These types are passed between every component in the pipeline: the
//! ingest path and map worker produce and consume [`RawEvent`] and
//! [`CanonicalEvent`]; the store persists [`IngestMapping`],
//! [`SchemaTriple`], [`Subscription`], [`EventLog`] and
//! [`SubscriptionEventLog`] rows; the LLM broker tracks [`LlmBudget`].

mod canonical_event;
mod event_log;
mod mapping;
mod raw_event;
mod schema;
mod subscription;

pub use canonical_event::{CanonicalEvent, Resource, ResourceId};
pub use event_log::{EventLog, SubscriptionEventLog};
pub use mapping::IngestMapping;
pub use raw_event::RawEvent;
pub use schema::SchemaTriple;
pub use subscription::{ChannelConfig, FailoverPolicy, Gate, Subscription, SubscriptionStatus};
