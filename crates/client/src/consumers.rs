//! Default application consumers: cache invalidation and toasts.
//!
//! The router knows nothing about caches. These subscribers translate pushed
//! events into "refetch this query group" and "show this message" calls on
//! collaborators the application provides.

use std::sync::Arc;

use jobfair_shared::EventKind;

use crate::ws::{handler, ClientEvent, EventRouter, Handler};

/// Named groups of cached queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryGroup {
    Queues,
    Opportunities,
    Profile,
    Companies,
    Dashboard,
    AdminStats,
}

impl QueryGroup {
    /// Cache key of the group.
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryGroup::Queues => "queues",
            QueryGroup::Opportunities => "opportunities",
            QueryGroup::Profile => "profile",
            QueryGroup::Companies => "companies",
            QueryGroup::Dashboard => "dashboard",
            QueryGroup::AdminStats => "admin-stats",
        }
    }
}

impl std::fmt::Display for QueryGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait QueryInvalidator: Send + Sync {
    fn invalidate(&self, group: QueryGroup);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Info,
    Success,
}

pub trait Toaster: Send + Sync {
    fn show(&self, message: &str, level: ToastLevel);
}

const ON_NOTIFICATION: &[QueryGroup] = &[
    QueryGroup::Queues,
    QueryGroup::Opportunities,
    QueryGroup::Profile,
];

const ON_URGENT: &[QueryGroup] = &[
    QueryGroup::Opportunities,
    QueryGroup::Queues,
    QueryGroup::Profile,
];

const ON_QUEUE_CHANGE: &[QueryGroup] = &[
    QueryGroup::Queues,
    QueryGroup::Companies,
    QueryGroup::Dashboard,
    QueryGroup::Opportunities,
    QueryGroup::AdminStats,
];

const ON_STATUS_CHANGE: &[QueryGroup] = &[
    QueryGroup::Profile,
    QueryGroup::Opportunities,
    QueryGroup::AdminStats,
];

/// Handlers installed by [`install_default_consumers`]. Dropping the guard
/// unregisters all of them.
#[must_use = "dropping the guard unregisters the consumers"]
pub struct ConsumerGuard {
    router: EventRouter,
    registrations: Vec<(EventKind, Handler)>,
}

impl ConsumerGuard {
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}

impl Drop for ConsumerGuard {
    fn drop(&mut self) {
        for (kind, h) in &self.registrations {
            self.router.off(kind, h);
        }
    }
}

/// Subscribe the standard invalidation and toast reactions on `router`.
///
/// `can_start` frames reach the urgent bucket through the router, so the
/// urgent reaction is registered there only and fires once per frame.
pub fn install_default_consumers(
    router: &EventRouter,
    queries: Arc<dyn QueryInvalidator>,
    toasts: Arc<dyn Toaster>,
) -> ConsumerGuard {
    let toasting = |groups: &'static [QueryGroup], level: ToastLevel| {
        let queries = queries.clone();
        let toasts = toasts.clone();
        handler(move |event: &ClientEvent| {
            if let Some(message) = event.body().and_then(|b| b.message()) {
                toasts.show(message, level);
            }
            invalidate_all(queries.as_ref(), groups);
            Ok(())
        })
    };
    let invalidating = |groups: &'static [QueryGroup]| {
        let queries = queries.clone();
        handler(move |_: &ClientEvent| {
            invalidate_all(queries.as_ref(), groups);
            Ok(())
        })
    };

    let queue_change = invalidating(ON_QUEUE_CHANGE);
    let registrations = vec![
        (
            EventKind::Notification,
            toasting(ON_NOTIFICATION, ToastLevel::Info),
        ),
        (EventKind::Urgent, toasting(ON_URGENT, ToastLevel::Success)),
        (EventKind::QueueUpdate, queue_change.clone()),
        (EventKind::InterviewStarted, queue_change.clone()),
        (EventKind::InterviewCompleted, queue_change),
        (EventKind::StatusChange, invalidating(ON_STATUS_CHANGE)),
    ];

    for (kind, h) in &registrations {
        router.on(kind.clone(), h.clone());
    }
    crate::log_debug!("Installed {} default consumers", registrations.len());

    ConsumerGuard {
        router: router.clone(),
        registrations,
    }
}

fn invalidate_all(queries: &dyn QueryInvalidator, groups: &[QueryGroup]) {
    for group in groups {
        queries.invalidate(*group);
    }
}
