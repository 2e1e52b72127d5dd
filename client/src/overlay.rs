use meshsync_shared::PlayerId;

/// The on-screen latency overlay is an external collaborator: it renders the
/// RTT samples the session hands it and can be toggled at runtime. The
/// session never depends on how (or whether) it draws.
pub trait PingOverlay {
    fn set_enabled(&mut self, enabled: bool);
    /// Called with every fresh RTT sample.
    fn record_ping(&mut self, peer: &PlayerId, rtt_ms: f64);
}
