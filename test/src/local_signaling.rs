use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use log::debug;

use meshsync_client::signaling::{SignalingAdapter, SignalingError, SignalingEvent};
use meshsync_client::transport::{IceCandidate, SessionDescription};
use meshsync_shared::PlayerId;

/// An in-memory stand-in for the reference signaling relay: announce adds
/// the sender to the room roster and rebroadcasts it, targeted envelopes are
/// forwarded to their addressee only, and a disconnect evicts the peer and
/// republishes the roster.
#[derive(Clone, Default)]
pub struct SignalingHub {
    state: Rc<RefCell<HubState>>,
}

#[derive(Default)]
struct HubState {
    roster: Vec<PlayerId>,
    queues: HashMap<PlayerId, VecDeque<SignalingEvent>>,
}

impl HubState {
    fn broadcast_roster(&mut self) {
        let roster = self.roster.clone();
        for id in &roster {
            if let Some(queue) = self.queues.get_mut(id) {
                queue.push_back(SignalingEvent::Roster(roster.clone()));
            }
        }
    }

    fn deliver(&mut self, to: Option<&str>, from: &str, event_for: impl Fn(PlayerId) -> SignalingEvent) {
        match to {
            Some(target) => {
                if let Some(queue) = self.queues.get_mut(target) {
                    queue.push_back(event_for(from.to_string()));
                } else {
                    debug!("dropping signaling envelope for unknown target {target}");
                }
            }
            None => {
                let others: Vec<PlayerId> = self
                    .roster
                    .iter()
                    .filter(|id| *id != from)
                    .cloned()
                    .collect();
                for id in others {
                    if let Some(queue) = self.queues.get_mut(&id) {
                        queue.push_back(event_for(from.to_string()));
                    }
                }
            }
        }
    }
}

impl SignalingHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the adapter handle for one endpoint.
    pub fn adapter(&self, id: &str) -> HubAdapter {
        self.state
            .borrow_mut()
            .queues
            .entry(id.to_string())
            .or_default();
        HubAdapter {
            state: Rc::clone(&self.state),
            id: id.to_string(),
        }
    }

    pub fn roster(&self) -> Vec<PlayerId> {
        self.state.borrow().roster.clone()
    }
}

pub struct HubAdapter {
    state: Rc<RefCell<HubState>>,
    id: PlayerId,
}

impl SignalingAdapter for HubAdapter {
    fn local_id(&self) -> &str {
        &self.id
    }

    fn register(&mut self) -> Result<(), SignalingError> {
        let mut state = self.state.borrow_mut();
        if !state.roster.contains(&self.id) {
            state.roster.push(self.id.clone());
        }
        state.broadcast_roster();
        Ok(())
    }

    fn announce(
        &mut self,
        desc: &SessionDescription,
        to: Option<&str>,
    ) -> Result<(), SignalingError> {
        let desc = desc.clone();
        self.state
            .borrow_mut()
            .deliver(to, &self.id, move |from| SignalingEvent::RemoteDescription {
                desc: desc.clone(),
                from,
            });
        Ok(())
    }

    fn send_ice_candidate(
        &mut self,
        candidate: &IceCandidate,
        to: Option<&str>,
    ) -> Result<(), SignalingError> {
        let candidate = candidate.clone();
        self.state
            .borrow_mut()
            .deliver(to, &self.id, move |from| SignalingEvent::IceCandidate {
                candidate: candidate.clone(),
                from,
            });
        Ok(())
    }

    fn poll_event(&mut self) -> Option<SignalingEvent> {
        self.state
            .borrow_mut()
            .queues
            .get_mut(&self.id)
            .and_then(VecDeque::pop_front)
    }

    fn close(&mut self) {
        let mut state = self.state.borrow_mut();
        state.roster.retain(|id| id != &self.id);
        state.queues.remove(&self.id);
        state.broadcast_roster();
    }
}

#[cfg(test)]
mod hub_tests {
    use super::*;
    use meshsync_client::transport::SdpType;

    fn desc() -> SessionDescription {
        SessionDescription {
            sdp_type: SdpType::Offer,
            sdp: "v=0".to_string(),
        }
    }

    #[test]
    fn register_broadcasts_roster_to_everyone() {
        let hub = SignalingHub::new();
        let mut a = hub.adapter("a");
        let mut b = hub.adapter("b");

        a.register().unwrap();
        b.register().unwrap();

        // a's queue saw both roster revisions
        assert_eq!(
            a.poll_event(),
            Some(SignalingEvent::Roster(vec!["a".to_string()]))
        );
        assert_eq!(
            a.poll_event(),
            Some(SignalingEvent::Roster(vec![
                "a".to_string(),
                "b".to_string()
            ]))
        );
        assert_eq!(
            b.poll_event(),
            Some(SignalingEvent::Roster(vec![
                "a".to_string(),
                "b".to_string()
            ]))
        );
    }

    #[test]
    fn targeted_envelopes_reach_only_their_addressee() {
        let hub = SignalingHub::new();
        let mut a = hub.adapter("a");
        let mut b = hub.adapter("b");
        let mut c = hub.adapter("c");
        a.register().unwrap();
        b.register().unwrap();
        c.register().unwrap();
        while b.poll_event().is_some() {}
        while c.poll_event().is_some() {}

        a.announce(&desc(), Some("b")).unwrap();

        assert!(matches!(
            b.poll_event(),
            Some(SignalingEvent::RemoteDescription { from, .. }) if from == "a"
        ));
        assert!(c.poll_event().is_none());
    }

    #[test]
    fn close_evicts_and_rebroadcasts() {
        let hub = SignalingHub::new();
        let mut a = hub.adapter("a");
        let mut b = hub.adapter("b");
        a.register().unwrap();
        b.register().unwrap();
        while b.poll_event().is_some() {}

        a.close();

        assert_eq!(hub.roster(), vec!["b".to_string()]);
        assert_eq!(
            b.poll_event(),
            Some(SignalingEvent::Roster(vec!["b".to_string()]))
        );
    }
}
