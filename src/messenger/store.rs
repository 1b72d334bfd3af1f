// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use crate::messenger::{
    delegates::{Delegate, DelegateId, DelegateKind, MsgFlags},
    error::MessengerError,
    message::Message,
};

/// Per-event delivery state.
///
/// Owned by the event, never shared across events. Holds the messages
/// received by each delegate during the event, the delegate satisfaction
/// set, and a reference to every dispatched message so shared payloads stay
/// alive for the duration of the event.
#[derive(Default)]
pub struct MessageStore {
    slots: HashMap<DelegateId, Vec<(Arc<dyn Message>, String)>>,
    satisfied: HashSet<DelegateId>,
    sent: Vec<Arc<dyn Message>>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes one message into the delegate's slot, enforcing the
    /// single-delivery contract.
    pub(crate) fn deliver(
        &mut self,
        delegate: &Delegate,
        msg: Arc<dyn Message>,
        name: &str,
    ) -> Result<(), MessengerError> {
        let slot = self.slots.entry(delegate.id).or_default();

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
        self.satisfied.insert(delegate.id);
        Ok(())
    }

    /// Messages received by a delegate this event, in delivery order.
    pub(crate) fn messages(&self, id: DelegateId) -> &[(Arc<dyn Message>, String)] {
        self.slots.get(&id).map_or(&[], Vec::as_slice)
    }

    pub(crate) fn is_satisfied(&self, id: DelegateId) -> bool {
        self.satisfied.contains(&id)
    }

    /// Clears the delegate's slot and satisfaction flag.
    pub(crate) fn clear(&mut self, id: DelegateId) {
        self.slots.remove(&id);
        self.satisfied.remove(&id);
    }

    /// Keeps a dispatched message alive for the rest of the event.
    pub(crate) fn retain(&mut self, msg: Arc<dyn Message>) {
        self.sent.push(msg);
    }

    /// Number of messages dispatched during this event.
    pub fn dispatched_count(&self) -> usize {
        self.sent.len()
    }
}
