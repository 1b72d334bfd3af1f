// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{any::TypeId, marker::PhantomData, sync::Arc};

use crate::messenger::message::Message;

bitflags::bitflags! {
    /// Delivery flags attached to a subscription.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MsgFlags: u8 {
        /// The owning module is skipped for an event until this delegate has
        /// received at least one message.
        const REQUIRED = 0b0000_0001;
        /// Single-message subscriptions may be overwritten within an event.
        const ALLOW_OVERWRITE = 0b0000_0010;
        /// Accept messages regardless of their dispatch name.
        const IGNORE_NAME = 0b0000_0100;
        /// Delegate state survives the per-event reset.
        const NO_RESET = 0b0000_1000;
    }
}

/// Opaque identifier of a registered delegate. Ids increase in registration
/// order, which is also the delivery order within a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DelegateId(pub(crate) u64);

pub(crate) type MessageFilter =
    Box<dyn Fn(&Arc<dyn Message>, &str) -> bool + Send + Sync>;

/// Reception behavior of a delegate.
pub(crate) enum DelegateKind {
    /// At most one message per event.
    Single,
    /// Ordered container of all matching messages.
    Multi,
    /// As `Multi`, gated by a payload predicate.
    Filter(MessageFilter),
    /// As `Filter`, but matching any payload type.
    Listener(MessageFilter),
}

impl std::fmt::Debug for DelegateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single => write!(f, "Single"),
            Self::Multi => write!(f, "Multi"),
            Self::Filter(_) => write!(f, "Filter"),
            Self::Listener(_) => write!(f, "Listener"),
        }
    }
}

/// A registered subscription owned by a module instance.
#[derive(Debug)]
pub(crate) struct Delegate {
    pub(crate) id: DelegateId,
    /// Unique name of the owning module.
    pub(crate) module: String,
    /// Payload type; `None` for listeners.
    pub(crate) message_type: Option<TypeId>,
    /// Concrete payload type name, for diagnostics.
    pub(crate) type_name: &'static str,
    /// Subscribed message name; `"*"` when names are ignored.
    pub(crate) name: String,
    /// Source-detector filter; `None` accepts any source.
    pub(crate) detector: Option<String>,
    pub(crate) flags: MsgFlags,
    pub(crate) kind: DelegateKind,
}

impl Delegate {
    /// Source filter of step 4 of the routing algorithm: a delegate bound to
    /// a detector only accepts messages from that detector or broadcasts.
    pub(crate) fn accepts_source(&self, msg: &Arc<dyn Message>) -> bool {
        match (&self.detector, msg.detector()) {
            (Some(wanted), Some(source)) => wanted == source.name(),
            _ => true,
        }
    }

    /// Runs the payload predicate, if any.
    pub(crate) fn accepts_payload(&self, msg: &Arc<dyn Message>, name: &str) -> bool {
        match &self.kind {
            DelegateKind::Filter(filter) | DelegateKind::Listener(filter) => {
                filter(msg, name)
            },
            _ => true,
        }
    }
}

/// Typed handle to a registered subscription, used to fetch the messages
/// delivered during the current event.
pub struct Subscription<T: ?Sized> {
    pub(crate) id: DelegateId,
    _payload: PhantomData<fn() -> Box<T>>,
}

impl<T: ?Sized> Subscription<T> {
    pub(crate) fn new(id: DelegateId) -> Self {
        Self {
            id,
            _payload: PhantomData,
        }
    }

    pub fn id(&self) -> DelegateId {
        self.id
    }
}

impl<T: ?Sized> Clone for Subscription<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for Subscription<T> {}

impl<T: ?Sized> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Subscription").field(&self.id).finish()
    }
}

/// Subscription matching messages of any payload type.
pub type ListenerSubscription = Subscription<dyn Message>;
