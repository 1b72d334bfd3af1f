// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use pixsim_rs::{
    geometry::{Detector, EulerAngles, Vec3},
    messenger::{
        DispatchSource, Message, MessageStore, Messenger, MessengerError, MsgFlags,
        StringMessage,
    },
};

#[derive(Debug)]
struct PulseMessage {
    charge: f64,
}

impl Message for PulseMessage {}

const SOURCE: DispatchSource<'static> = DispatchSource {
    module: "EchoModule",
    output_name: "",
};

fn detector(name: &str) -> Arc<Detector> {
    Arc::new(Detector::new(
        name,
        "X",
        Vec3::default(),
        EulerAngles::default(),
    ))
}

#[test]
fn multi_subscription_receives_in_dispatch_order() {
    let messenger = Messenger::new();
    let sub = messenger.bind_multi::<StringMessage>("Sink", None, "", MsgFlags::empty());

    let mut store = MessageStore::new();
    for text in ["one", "two", "three"] {
        messenger
            .dispatch(&mut store, &SOURCE, StringMessage::new(text), None)
            .expect("dispatch succeeds");
    }

    let received = messenger.fetch_multi(&store, &sub);
    let texts: Vec<&str> = received.iter().map(|m| m.text()).collect();
    assert_eq!(texts, ["one", "two", "three"]);
    assert_eq!(store.dispatched_count(), 3);
}

#[test]
fn names_must_match_unless_ignored() {
    let messenger = Messenger::new();
    let default_name =
        messenger.bind_multi::<StringMessage>("Default", None, "", MsgFlags::empty());
    let named =
        messenger.bind_multi::<StringMessage>("Named", None, "hits", MsgFlags::empty());
    let ignoring =
        messenger.bind_multi::<StringMessage>("Any", None, "", MsgFlags::IGNORE_NAME);

    let mut store = MessageStore::new();
    messenger
        .dispatch(&mut store, &SOURCE, StringMessage::new("plain"), None)
        .expect("dispatch default name");
    messenger
        .dispatch(&mut store, &SOURCE, StringMessage::new("tagged"), Some("hits"))
        .expect("dispatch named");

    assert_eq!(messenger.fetch_multi(&store, &default_name).len(), 1);
    assert_eq!(messenger.fetch_multi(&store, &named).len(), 1);
    assert_eq!(messenger.fetch_multi(&store, &ignoring).len(), 2);
}

#[test]
fn empty_dispatch_name_uses_the_module_output_name() {
    let messenger = Messenger::new();
    let named =
        messenger.bind_multi::<StringMessage>("Named", None, "digits", MsgFlags::empty());

    let source = DispatchSource {
        module: "Digitizer",
        output_name: "digits",
    };
    let mut store = MessageStore::new();
    messenger
        .dispatch(&mut store, &source, StringMessage::new("payload"), Some(""))
        .expect("dispatch with empty name");

    assert_eq!(messenger.fetch_multi(&store, &named).len(), 1);
}

#[test]
fn single_subscription_enforces_overwrite_flag() {
    let messenger = Messenger::new();
    let strict =
        messenger.bind_single::<StringMessage>("Strict", None, "", MsgFlags::empty());

    let mut store = MessageStore::new();
    messenger
        .dispatch(&mut store, &SOURCE, StringMessage::new("first"), None)
        .expect("first dispatch");
    let err = messenger
        .dispatch(&mut store, &SOURCE, StringMessage::new("second"), None)
        .expect_err("second dispatch must overflow");
    assert!(matches!(err, MessengerError::MessageOverwrite { .. }));

    // With ALLOW_OVERWRITE the second message replaces the first.
    let messenger = Messenger::new();
    let relaxed = messenger.bind_single::<StringMessage>(
        "Relaxed",
        None,
        "",
        MsgFlags::ALLOW_OVERWRITE,
    );
    let mut store = MessageStore::new();
    for text in ["first", "second"] {
        messenger
            .dispatch(&mut store, &SOURCE, StringMessage::new(text), None)
            .expect("overwrite allowed");
    }
    let msg = messenger
        .fetch_single(&store, &relaxed)
        .expect("single message available");
    assert_eq!(msg.text(), "second");
}

#[test]
fn required_satisfaction_and_reset() {
    let messenger = Messenger::new();
    let _required =
        messenger.bind_multi::<StringMessage>("Sink", None, "", MsgFlags::REQUIRED);

    let mut store = MessageStore::new();
    assert!(!messenger.is_satisfied("Sink", &store));
    assert!(
        messenger.is_satisfied("Unsubscribed", &store),
        "modules without delegates are always satisfied"
    );

    messenger
        .dispatch(&mut store, &SOURCE, StringMessage::new("hit"), None)
        .expect("dispatch");
    assert!(messenger.is_satisfied("Sink", &store));

    messenger.reset_module("Sink", &mut store);
    assert!(!messenger.is_satisfied("Sink", &store));
}

#[test]
fn no_reset_state_survives_events() {
    let messenger = Messenger::new();
    let broadcast = messenger.bind_single::<StringMessage>(
        "StateHolder",
        None,
        "",
        MsgFlags::REQUIRED | MsgFlags::NO_RESET,
    );

    let mut first_event = MessageStore::new();
    messenger
        .dispatch(&mut first_event, &SOURCE, StringMessage::new("state"), None)
        .expect("dispatch");
    messenger.reset_module("StateHolder", &mut first_event);

    // A fresh event still sees the persisted message and satisfaction.
    let second_event = MessageStore::new();
    assert!(messenger.is_satisfied("StateHolder", &second_event));
    let msg = messenger
        .fetch_single(&second_event, &broadcast)
        .expect("persisted message");
    assert_eq!(msg.text(), "state");
}

#[test]
fn filters_accept_selectively() {
    let messenger = Messenger::new();
    let filtered = messenger.register_filter::<PulseMessage, _>(
        "Selective",
        None,
        "",
        MsgFlags::empty(),
        |msg, _name| msg.charge > 100.0,
    );

    let mut store = MessageStore::new();
    for charge in [50.0, 150.0, 250.0] {
        messenger
            .dispatch(&mut store, &SOURCE, PulseMessage { charge }, None)
            .expect("dispatch pulse");
    }

    let accepted = messenger.fetch_filtered(&store, &filtered);
    let charges: Vec<f64> = accepted.iter().map(|(m, _)| m.charge).collect();
    assert_eq!(charges, [150.0, 250.0]);
}

#[test]
fn listeners_match_any_payload_type() {
    let messenger = Messenger::new();
    let listener = messenger.register_listener(
        "Monitor",
        None,
        "",
        MsgFlags::IGNORE_NAME,
        |_msg, _name| true,
    );

    let mut store = MessageStore::new();
    messenger
        .dispatch(&mut store, &SOURCE, StringMessage::new("text"), None)
        .expect("dispatch string");
    messenger
        .dispatch(&mut store, &SOURCE, PulseMessage { charge: 1.0 }, Some("pulses"))
        .expect("dispatch pulse");

    assert_eq!(messenger.fetch_listened(&store, &listener).len(), 2);
}

#[test]
fn source_detector_filter_scopes_delivery() {
    let messenger = Messenger::new();
    let scoped = messenger.bind_multi::<StringMessage>(
        "Digitizer:A",
        Some("A"),
        "",
        MsgFlags::empty(),
    );

    let mut store = MessageStore::new();
    messenger
        .dispatch(
            &mut store,
            &SOURCE,
            StringMessage::with_detector("from A", detector("A")),
            None,
        )
        .expect("matching detector");
    messenger
        .dispatch(
            &mut store,
            &SOURCE,
            StringMessage::with_detector("from B", detector("B")),
            None,
        )
        .expect("other detector");
    messenger
        .dispatch(&mut store, &SOURCE, StringMessage::new("broadcast"), None)
        .expect("broadcast");

    let received = messenger.fetch_multi(&store, &scoped);
    let texts: Vec<&str> = received.iter().map(|m| m.text()).collect();
    assert_eq!(texts, ["from A", "broadcast"]);
}

#[test]
fn has_receiver_probes_without_mutation() {
    let messenger = Messenger::new();
    let sub = messenger.bind_multi::<StringMessage>("Sink", None, "", MsgFlags::empty());

    let store = MessageStore::new();
    let payload = Arc::new(StringMessage::new("probe"));
    assert!(messenger.has_receiver(&SOURCE, &payload, None));
    assert!(!messenger.has_receiver(
        &SOURCE,
        &Arc::new(PulseMessage { charge: 0.0 }),
        None
    ));

    // Probing must not deliver anything.
    assert!(messenger.fetch_multi(&store, &sub).is_empty());
}

#[test]
fn unregistering_a_module_removes_its_delegates() {
    let messenger = Messenger::new();
    let sub = messenger.bind_multi::<StringMessage>("Gone", None, "", MsgFlags::empty());
    messenger.unregister_module("Gone");

    let mut store = MessageStore::new();
    messenger
        .dispatch(&mut store, &SOURCE, StringMessage::new("orphaned"), None)
        .expect("dispatch after unregister");
    assert!(messenger.fetch_multi(&store, &sub).is_empty());
    assert!(messenger.is_satisfied("Gone", &store));
}
