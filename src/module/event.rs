// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    messenger::{
        ListenerSubscription, Message, MessageStore, Messenger, MessengerError,
        Subscription,
    },
    module::module::ModuleInfo,
};

/// A deterministic stream of seeds, drawn behind a mutex so the draw order
/// is independent of worker interleaving.
pub struct Seeder(Mutex<StdRng>);

impl Seeder {
    pub fn new(seed: u64) -> Self {
        Self(Mutex::new(StdRng::seed_from_u64(seed)))
    }

    pub fn draw(&self) -> u64 {
        self.0.lock().expect("seeder lock poisoned").next_u64()
    }
}

/// One integer-indexed unit of work.
///
/// An event owns the transient message state of its index and the per-module
/// seeds drawn at submission time. Events are logically independent; no
/// message survives from one event into the next.
pub struct Event {
    number: u64,
    store: MessageStore,
    messenger: Arc<Messenger>,
    seeds: HashMap<String, u64>,
    terminate: Arc<AtomicBool>,
}

impl Event {
    pub(crate) fn new(
        number: u64,
        messenger: Arc<Messenger>,
        seeds: HashMap<String, u64>,
        terminate: Arc<AtomicBool>,
    ) -> Self {
        Self {
            number,
            store: MessageStore::new(),
            messenger,
            seeds,
            terminate,
        }
    }

    /// Event index, starting at 1.
    pub fn number(&self) -> u64 {
        self.number
    }

    /// Deterministic seed assigned to the given module for this event.
    pub fn seed_for(&self, info: &ModuleInfo) -> u64 {
        self.seeds
            .get(info.unique_name())
            .copied()
            .unwrap_or(self.number)
    }

    /// Dispatches a message to all satisfied subscribers, scoped to this
    /// event. `name` defaults to the source module's output name.
    pub fn dispatch<T: Message>(
        &mut self,
        source: &ModuleInfo,
        payload: impl Into<Arc<T>>,
        name: Option<&str>,
    ) -> Result<(), MessengerError> {
        self.messenger
            .dispatch(&mut self.store, &source.dispatch_source(), payload, name)
    }

    /// Whether dispatching this message would reach at least one subscriber;
    /// lets modules skip producing costly payloads nobody consumes.
    pub fn has_receiver<T: Message>(
        &self,
        source: &ModuleInfo,
        payload: &Arc<T>,
        name: Option<&str>,
    ) -> bool {
        self.messenger
            .has_receiver(&source.dispatch_source(), payload, name)
    }

    pub fn fetch_single<T: Message>(
        &self,
        sub: &Subscription<T>,
    ) -> Result<Arc<T>, MessengerError> {
        self.messenger.fetch_single(&self.store, sub)
    }

    pub fn fetch_multi<T: Message>(&self, sub: &Subscription<T>) -> Vec<Arc<T>> {
        self.messenger.fetch_multi(&self.store, sub)
    }

    pub fn fetch_filtered<T: Message>(
        &self,
        sub: &Subscription<T>,
    ) -> Vec<(Arc<T>, String)> {
        self.messenger.fetch_filtered(&self.store, sub)
    }

    pub fn fetch_listened(
        &self,
        sub: &ListenerSubscription,
    ) -> Vec<(Arc<dyn Message>, String)> {
        self.messenger.fetch_listened(&self.store, sub)
    }

    /// Whether a termination request has been recorded.
    pub fn terminated(&self) -> bool {
        self.terminate.load(Ordering::Relaxed)
    }

    pub(crate) fn store(&self) -> &MessageStore {
        &self.store
    }

    pub(crate) fn store_mut(&mut self) -> &mut MessageStore {
        &mut self.store
    }
}
