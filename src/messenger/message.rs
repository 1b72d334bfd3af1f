// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{any::Any, sync::Arc};

use crate::geometry::Detector;

/// A message payload exchanged between modules within one event.
///
/// Payloads are shared read-only: once dispatched, a message is handed to
/// every satisfied subscriber as the same `Arc`. The optional source detector
/// scopes delivery to subscribers interested in that detector; a `None`
/// detector makes the message a broadcast.
pub trait Message: Any + Send + Sync {
    /// Detector this message originates from; `None` for broadcasts.
    fn detector(&self) -> Option<&Arc<Detector>> {
        None
    }
}

/// Downcasts a shared message to its concrete payload type.
pub fn downcast_message<T: Message>(msg: Arc<dyn Message>) -> Option<Arc<T>> {
    let any: Arc<dyn Any + Send + Sync> = msg;
    any.downcast::<T>().ok()
}

/// Textual payload used by the bundled modules.
#[derive(Debug)]
pub struct StringMessage {
    text: String,
    detector: Option<Arc<Detector>>,
}

impl StringMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            detector: None,
        }
    }

    pub fn with_detector(text: impl Into<String>, detector: Arc<Detector>) -> Self {
        Self {
            text: text.into(),
            detector: Some(detector),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl Message for StringMessage {
    fn detector(&self) -> Option<&Arc<Detector>> {
        self.detector.as_ref()
    }
}
