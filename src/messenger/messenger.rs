// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Central publish–subscribe fabric.
//!
//! Modules register delegates during construction; dispatch routes a typed
//! payload to every delegate whose type, name and source-detector filters
//! match. Delivery happens synchronously on the dispatching thread and
//! writes into the per-event [`MessageStore`]; the delegate tables
//! themselves are guarded by a single mutex.

use std::{
    any::TypeId,
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use tracing::trace;

use crate::messenger::{
    delegates::{
        Delegate, DelegateId, DelegateKind, ListenerSubscription, MessageFilter, MsgFlags,
        Subscription,
    },
    error::MessengerError,
    message::{Message, downcast_message},
    store::MessageStore,
};

/// Name bucket for delegates that ignore the message name.
const ANY_NAME: &str = "*";

/// Identity of a dispatching module: its unique name and the value of its
/// `output` configuration key, used when a message is dispatched without an
/// explicit name.
#[derive(Debug, Clone, Copy)]
pub struct DispatchSource<'a> {
    pub module: &'a str,
    pub output_name: &'a str,
}

#[derive(Default)]
struct Tables {
    /// Delegates indexed by payload type, then by subscribed name.
    by_type: HashMap<TypeId, HashMap<String, Vec<Arc<Delegate>>>>,
    /// Delegates matching any payload type.
    listeners: Vec<Arc<Delegate>>,
    by_module: HashMap<String, Vec<Arc<Delegate>>>,
    by_id: HashMap<DelegateId, Arc<Delegate>>,
    /// State of `NO_RESET` delegates, surviving across events.
    persistent: HashMap<DelegateId, Vec<(Arc<dyn Message>, String)>>,
}

/// Registers typed subscriptions and dispatches messages between modules.
#[derive(Default)]
pub struct Messenger {
    tables: Mutex<Tables>,
    next_id: AtomicU64,
}

impl Messenger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `module` to at most one `T` per event.
    ///
    /// A second matching dispatch within an event replaces the message when
    /// `ALLOW_OVERWRITE` is set and is a [`MessengerError::MessageOverwrite`]
    /// otherwise.
    pub fn bind_single<T: Message>(
        &self,
        module: &str,
        detector: Option<&str>,
        name: &str,
        flags: MsgFlags,
    ) -> Subscription<T> {
        self.add_delegate::<T>(module, detector, name, flags, DelegateKind::Single)
    }

    /// Subscribes `module` to all matching `T` messages of an event, in
    /// dispatch order.
    pub fn bind_multi<T: Message>(
        &self,
        module: &str,
        detector: Option<&str>,
        name: &str,
        flags: MsgFlags,
    ) -> Subscription<T> {
        self.add_delegate::<T>(module, detector, name, flags, DelegateKind::Multi)
    }

    /// Subscribes `module` to `T` messages accepted by `filter`.
    ///
    /// The predicate runs on the dispatching thread while the delegate
    /// tables are locked; it must not call back into the messenger.
    pub fn register_filter<T: Message, F>(
        &self,
        module: &str,
        detector: Option<&str>,
        name: &str,
        flags: MsgFlags,
        filter: F,
    ) -> Subscription<T>
    where
        F: Fn(&Arc<T>, &str) -> bool + Send + Sync + 'static,
    {
        let erased: MessageFilter = Box::new(move |msg, name| {
            downcast_message::<T>(msg.clone()).is_some_and(|typed| filter(&typed, name))
        });
        self.add_delegate::<T>(module, detector, name, flags, DelegateKind::Filter(erased))
    }

    /// Subscribes `module` to messages of *any* payload type accepted by
    /// `filter`. Listeners ignore the message name unless the `IGNORE_NAME`
    /// flag is cleared explicitly.
    pub fn register_listener<F>(
        &self,
        module: &str,
        detector: Option<&str>,
        name: &str,
        flags: MsgFlags,
        filter: F,
    ) -> ListenerSubscription
    where
        F: Fn(&Arc<dyn Message>, &str) -> bool + Send + Sync + 'static,
    {
        let delegate = Arc::new(Delegate {
            id: DelegateId(self.next_id.fetch_add(1, Ordering::Relaxed)),
            module: module.to_string(),
            message_type: None,
            type_name: "<any>",
            name: if flags.contains(MsgFlags::IGNORE_NAME) {
                ANY_NAME.to_string()
            } else {
                name.to_string()
            },
            detector: detector.map(str::to_string),
            flags,
            kind: DelegateKind::Listener(Box::new(filter)),
        });

        let id = delegate.id;
        let mut tables = self.tables.lock().expect("messenger lock poisoned");
        tables.listeners.push(delegate.clone());
        tables
            .by_module
            .entry(delegate.module.clone())
            .or_default()
            .push(delegate.clone());
        tables.by_id.insert(id, delegate);
        Subscription::new(id)
    }

    fn add_delegate<T: Message>(
        &self,
        module: &str,
        detector: Option<&str>,
        name: &str,
        flags: MsgFlags,
        kind: DelegateKind,
    ) -> Subscription<T> {
        let subscribed_name = if flags.contains(MsgFlags::IGNORE_NAME) {
            ANY_NAME.to_string()
        } else {
            name.to_string()
        };
        let delegate = Arc::new(Delegate {
            id: DelegateId(self.next_id.fetch_add(1, Ordering::Relaxed)),
            module: module.to_string(),
            message_type: Some(TypeId::of::<T>()),
            type_name: std::any::type_name::<T>(),
            name: subscribed_name.clone(),
            detector: detector.map(str::to_string),
            flags,
            kind,
        });

        let id = delegate.id;
        let mut tables = self.tables.lock().expect("messenger lock poisoned");
        tables
            .by_type
            .entry(TypeId::of::<T>())
            .or_default()
            .entry(subscribed_name)
            .or_default()
            .push(delegate.clone());
        tables
            .by_module
            .entry(delegate.module.clone())
            .or_default()
            .push(delegate.clone());
        tables.by_id.insert(id, delegate);
        Subscription::new(id)
    }

    /// Removes every delegate registered by `module`, including persisted
    /// `NO_RESET` state. Called when the module instance is destroyed.
    pub fn unregister_module(&self, module: &str) {
        let mut tables = self.tables.lock().expect("messenger lock poisoned");
        let Some(delegates) = tables.by_module.remove(module) else {
            return;
        };
        for delegate in delegates {
            if let Some(type_id) = delegate.message_type
                && let Some(buckets) = tables.by_type.get_mut(&type_id)
            {
                if let Some(list) = buckets.get_mut(&delegate.name) {
                    list.retain(|d| d.id != delegate.id);
                }
            } else {
                tables.listeners.retain(|d| d.id != delegate.id);
            }
            tables.by_id.remove(&delegate.id);
            tables.persistent.remove(&delegate.id);
        }
    }

    /// Dispatches a message, routing it to all satisfied subscribers.
    ///
    /// With `name` absent or empty the source module's output name is used.
    /// Delivery follows registration order; the first overwrite violation
    /// aborts the dispatch and is fatal for the event.
    pub fn dispatch<T: Message>(
        &self,
        store: &mut MessageStore,
        source: &DispatchSource<'_>,
        payload: impl Into<Arc<T>>,
        name: Option<&str>,
    ) -> Result<(), MessengerError> {
        let payload: Arc<T> = payload.into();
        let msg: Arc<dyn Message> = payload;
        let effective_name = effective_name(source, name);

        let mut tables = self.tables.lock().expect("messenger lock poisoned");
        let candidates = collect_candidates(&tables, TypeId::of::<T>(), effective_name);

        let mut delivered = 0usize;
        for delegate in &candidates {
            if !delegate.accepts_source(&msg) || !delegate.accepts_payload(&msg, effective_name)
            {
                continue;
            }
            delivered += 1;
            if delegate.flags.contains(MsgFlags::NO_RESET) {
                deliver_persistent(&mut tables, delegate, msg.clone(), effective_name)?;
            } else {
                store.deliver(delegate, msg.clone(), effective_name)?;
            }
        }
        drop(tables);

        trace!(
            "Dispatched message '{effective_name}' from {} to {delivered} delegates",
            source.module
        );
        store.retain(msg);
        Ok(())
    }

    /// Whether at least one delegate would accept this message, without
    /// mutating any delivery state.
    pub fn has_receiver<T: Message>(
        &self,
        source: &DispatchSource<'_>,
        payload: &Arc<T>,
        name: Option<&str>,
    ) -> bool {
        let msg: Arc<dyn Message> = payload.clone();
        let effective_name = effective_name(source, name);

        let tables = self.tables.lock().expect("messenger lock poisoned");
        collect_candidates(&tables, TypeId::of::<T>(), effective_name)
            .iter()
            .any(|d| d.accepts_source(&msg) && d.accepts_payload(&msg, effective_name))
    }

    /// Single message received by the subscription during this event.
    ///
    /// For `NO_RESET` delegates the persisted state is consulted when the
    /// event itself holds no delivery.
    pub fn fetch_single<T: Message>(
        &self,
        store: &MessageStore,
        sub: &Subscription<T>,
    ) -> Result<Arc<T>, MessengerError> {
        let (msg, delegate) = {
            let tables = self.tables.lock().expect("messenger lock poisoned");
            let delegate = tables.by_id.get(&sub.id).cloned();
            let msg = store
                .messages(sub.id)
                .last()
                .map(|(m, _)| m.clone())
                .or_else(|| {
                    tables
                        .persistent
                        .get(&sub.id)
                        .and_then(|msgs| msgs.last())
                        .map(|(m, _)| m.clone())
                });
            (msg, delegate)
        };

        let missing = || MessengerError::MissingMessage {
            module: delegate
                .as_ref()
                .map(|d| d.module.clone())
                .unwrap_or_default(),
            type_name: std::any::type_name::<T>(),
        };
        let msg = msg.ok_or_else(&missing)?;
        downcast_message::<T>(msg).ok_or_else(&missing)
    }

    /// All messages received by the subscription during this event, in
    /// delivery order.
    pub fn fetch_multi<T: Message>(
        &self,
        store: &MessageStore,
        sub: &Subscription<T>,
    ) -> Vec<Arc<T>> {
        self.collect_slot(store, sub.id)
            .into_iter()
            .filter_map(|(msg, _)| downcast_message::<T>(msg))
            .collect()
    }

    /// Accepted messages and their names for a filter subscription.
    pub fn fetch_filtered<T: Message>(
        &self,
        store: &MessageStore,
        sub: &Subscription<T>,
    ) -> Vec<(Arc<T>, String)> {
        self.collect_slot(store, sub.id)
            .into_iter()
            .filter_map(|(msg, name)| downcast_message::<T>(msg).map(|m| (m, name)))
            .collect()
    }

    /// Accepted messages and their names for a listener subscription.
    pub fn fetch_listened(
        &self,
        store: &MessageStore,
        sub: &ListenerSubscription,
    ) -> Vec<(Arc<dyn Message>, String)> {
        self.collect_slot(store, sub.id)
    }

    fn collect_slot(
        &self,
        store: &MessageStore,
        id: DelegateId,
    ) -> Vec<(Arc<dyn Message>, String)> {
        let event_local = store.messages(id);
        if !event_local.is_empty() {
            return event_local.to_vec();
        }
        self.tables
            .lock()
            .expect("messenger lock poisoned")
            .persistent
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    /// Whether every `REQUIRED` delegate of `module` has received a message
    /// this event. Modules without delegates are always satisfied.
    pub fn is_satisfied(&self, module: &str, store: &MessageStore) -> bool {
        let tables = self.tables.lock().expect("messenger lock poisoned");
        let Some(delegates) = tables.by_module.get(module) else {
            return true;
        };
        delegates
            .iter()
            .filter(|d| d.flags.contains(MsgFlags::REQUIRED))
            .all(|d| {
                store.is_satisfied(d.id)
                    || (d.flags.contains(MsgFlags::NO_RESET)
                        && tables.persistent.get(&d.id).is_some_and(|m| !m.is_empty()))
            })
    }

    /// Clears the per-event state of all non-`NO_RESET` delegates of
    /// `module`: containers emptied, single slots cleared, satisfaction
    /// flags dropped.
    pub fn reset_module(&self, module: &str, store: &mut MessageStore) {
        let tables = self.tables.lock().expect("messenger lock poisoned");
        let Some(delegates) = tables.by_module.get(module) else {
            return;
        };
        for delegate in delegates {
            if !delegate.flags.contains(MsgFlags::NO_RESET) {
                store.clear(delegate.id);
            }
        }
    }
}

fn effective_name<'a>(source: &DispatchSource<'a>, name: Option<&'a str>) -> &'a str {
    match name {
        Some("") | None => source.output_name,
        Some(explicit) => explicit,
    }
}

/// Gathers the delegates indexed under `(type, name)`, `(type, "*")` and the
/// any-type listeners, in registration order.
fn collect_candidates(
    tables: &Tables,
    type_id: TypeId,
    name: &str,
) -> Vec<Arc<Delegate>> {
    let mut candidates: Vec<Arc<Delegate>> = Vec::new();

    if let Some(buckets) = tables.by_type.get(&type_id) {
        if let Some(exact) = buckets.get(name) {
            candidates.extend(exact.iter().cloned());
        }
        if name != ANY_NAME
            && let Some(ignoring) = buckets.get(ANY_NAME)
        {
            candidates.extend(ignoring.iter().cloned());
        }
    }
    candidates.extend(
        tables
            .listeners
            .iter()
            .filter(|d| d.name == ANY_NAME || d.name == name)
            .cloned(),
    );

    candidates.sort_by_key(|d| d.id);
    candidates
}

fn deliver_persistent(
    tables: &mut Tables,
    delegate: &Delegate,
    msg: Arc<dyn Message>,
    name: &str,
) -> Result<(), MessengerError> {
    let slot = tables.persistent.entry(delegate.id).or_default();
    if matches!(delegate.kind, DelegateKind::Single) && !slot.is_empty() {
        if !delegate.flags.contains(MsgFlags::ALLOW_OVERWRITE) {
            return Err(MessengerError::MessageOverwrite {
                module: delegate.module.clone(),
                type_name: delegate.type_name,
            });
        }
        slot.clear();
    }
    slot.push((msg, name.to_string()));
    Ok(())
}
