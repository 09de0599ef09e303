//! Background workers: the map worker and the subscription matcher. Both
//! are plain loops over a durable broker consumer, spawned and supervised
//! by the control plane.

pub mod map_worker;
pub mod matcher;

use std::sync::Arc;

use uuid::Uuid;

use crate::state::{AppState, SubscriptionHandle};

/// Spawn a subscription's matcher task under a fresh cancellation token.
/// Shared by the control plane's startup bind loop and the subscription
/// API's create/rebind paths — consumers are replaced wholesale, never
/// mutated in place.
pub fn spawn_matcher(state: &AppState, subscription_id: Uuid) -> SubscriptionHandle {
    let cancel = Arc::new(tokio::sync::Notify::new());
    let task_state = state.clone();
    let task_cancel = cancel.clone();
    let task = tokio::spawn(async move {
        matcher::run(task_state, subscription_id, task_cancel).await;
    });
    SubscriptionHandle { cancel, task }
}
