// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Publish–subscribe fabric between modules: typed subscriptions, delivery
//! flags and per-event routing state.

pub mod delegates;
pub mod error;
pub mod message;
#[allow(clippy::module_inception)]
pub mod messenger;
pub mod store;

pub use delegates::{DelegateId, ListenerSubscription, MsgFlags, Subscription};
pub use error::MessengerError;
pub use message::{Message, StringMessage, downcast_message};
pub use messenger::{DispatchSource, Messenger};
pub use store::MessageStore;
