#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use meshsync_client::{Session, SessionConfig};
use meshsync_shared::{Event, EventKind};
use meshsync_test::{Fabric, SignalingHub};

pub fn make_session(hub: &SignalingHub, fabric: &Fabric, id: &str) -> Session {
    make_session_with(hub, fabric, id, SessionConfig::default())
}

pub fn make_session_with(
    hub: &SignalingHub,
    fabric: &Fabric,
    id: &str,
    config: SessionConfig,
) -> Session {
    Session::new(
        config,
        Box::new(hub.adapter(id)),
        Box::new(fabric.connector()),
    )
}

pub type EventLog = Rc<RefCell<Vec<Event>>>;

/// Captures every event of `kind` the session publishes.
pub fn record(session: &mut Session, kind: EventKind) -> EventLog {
    let log: EventLog = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    session
        .on(kind, move |event| sink.borrow_mut().push(event.clone()))
        .expect("session is alive");
    log
}
