use std::collections::HashSet;

use tracing::debug;

use super::session::Generation;
use crate::hw::{DiscoveredPeer, PeerId};

/// Substring an advertised name must contain to be considered an ANCS peer.
pub const DEFAULT_NAME_NEEDLE: &str = "ancs";

/// Returns whether a scanned peer is an acceptable connection candidate.
///
/// The name must be present and contain `ancs` in any case, and the peer must
/// not have been tried earlier in the same campaign.
///
/// ```
/// use std::collections::HashSet;
/// use ancs::{PeerId, accept};
///
/// let tried = HashSet::new();
/// assert!(accept(Some("My-ancs-Watch"), &PeerId::from("AA"), &tried));
/// assert!(!accept(None, &PeerId::from("AA"), &tried));
/// ```
#[must_use]
pub fn accept(name: Option<&str>, peer_id: &PeerId, tried_peers: &HashSet<PeerId>) -> bool {
    CandidatePolicy::default().accept(name, peer_id, tried_peers)
}

/// Configurable candidate filter applied to scan results.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CandidatePolicy {
    name_needle: String,
    require_apple_manufacturer: bool,
}

impl Default for CandidatePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_NAME_NEEDLE, false)
    }
}

impl CandidatePolicy {
    /// Creates a policy matching `name_needle` case-insensitively.
    #[must_use]
    pub fn new(name_needle: &str, require_apple_manufacturer: bool) -> Self {
        Self {
            name_needle: name_needle.to_lowercase(),
            require_apple_manufacturer,
        }
    }

    #[must_use]
    pub fn name_needle(&self) -> &str {
        &self.name_needle
    }

    #[must_use]
    pub fn require_apple_manufacturer(&self) -> bool {
        self.require_apple_manufacturer
    }

    /// Applies the name and tried-peer rules.
    #[must_use]
    pub fn accept(
        &self,
        name: Option<&str>,
        peer_id: &PeerId,
        tried_peers: &HashSet<PeerId>,
    ) -> bool {
        let Some(name) = name else {
            return false;
        };
        name.to_lowercase().contains(&self.name_needle) && !tried_peers.contains(peer_id)
    }

    /// Applies every rule, including the optional manufacturer requirement.
    #[must_use]
    pub fn accepts_advert(&self, advert: &DiscoveredPeer, tried_peers: &HashSet<PeerId>) -> bool {
        if self.require_apple_manufacturer && !advert.is_apple_device() {
            return false;
        }
        self.accept(advert.local_name(), advert.peer_id(), tried_peers)
    }
}

/// One scanning campaign: the scanning flag and the peers rejected during it.
///
/// A fresh campaign forgets every tried peer. Resuming after a failed session
/// keeps them, so a rejected peer is never retried within the campaign.
#[derive(Debug, Clone, Default)]
pub struct ScanCampaign {
    tried_peers: HashSet<PeerId>,
    scanning: bool,
    generation: Option<Generation>,
}

impl ScanCampaign {
    /// Starts a new campaign, clearing every tried peer.
    pub(crate) fn begin(&mut self, generation: Generation) {
        self.tried_peers.clear();
        self.scanning = true;
        self.generation = Some(generation);
    }

    /// Resumes scanning within the current campaign.
    pub(crate) fn resume(&mut self, generation: Generation) {
        self.scanning = true;
        self.generation = Some(generation);
    }

    pub(crate) fn stop(&mut self) {
        self.scanning = false;
    }

    /// Records a rejected peer. Returns `false` when it was already recorded.
    pub(crate) fn mark_tried(&mut self, peer_id: PeerId) -> bool {
        debug!(peer = %peer_id, "adding peer to tried set");
        self.tried_peers.insert(peer_id)
    }

    #[must_use]
    pub fn tried_peers(&self) -> &HashSet<PeerId> {
        &self.tried_peers
    }

    #[must_use]
    pub fn is_tried(&self, peer_id: &PeerId) -> bool {
        self.tried_peers.contains(peer_id)
    }

    #[must_use]
    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    /// Generation of the scan currently running, if any.
    #[must_use]
    pub fn scan_generation(&self) -> Option<Generation> {
        self.generation.filter(|_| self.scanning)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::protocol::APPLE_COMPANY_ID;

    fn tried(peers: &[&str]) -> HashSet<PeerId> {
        peers.iter().copied().map(PeerId::from).collect()
    }

    #[test]
    fn rejects_tried_peer_even_when_name_matches() {
        let peer = PeerId::from("AA:BB");
        assert!(!accept(Some("ANCS-Device"), &peer, &tried(&["AA:BB"])));
    }

    #[test]
    fn accepts_mixed_case_name_when_untried() {
        let peer = PeerId::from("CC:DD");
        assert!(accept(Some("My-ancs-Watch"), &peer, &tried(&["AA:BB"])));
    }

    #[rstest]
    #[case(None)]
    #[case(Some(""))]
    #[case(Some("Speaker"))]
    #[case(Some("anc-s"))]
    fn rejects_names_without_needle(#[case] name: Option<&str>) {
        assert!(!accept(name, &PeerId::from("AA"), &HashSet::new()));
    }

    #[test]
    fn custom_needle_is_case_insensitive() {
        let policy = CandidatePolicy::new("Watch", false);
        assert_eq!("watch", policy.name_needle());
        assert!(policy.accept(Some("MY WATCH"), &PeerId::from("AA"), &HashSet::new()));
    }

    #[test]
    fn apple_requirement_checks_manufacturer_data() {
        let policy = CandidatePolicy::new(DEFAULT_NAME_NEEDLE, true);
        let plain = DiscoveredPeer::new("AA".into(), Some("ancs-phone".into()), Some(-40));
        let apple = plain.clone().with_manufacturer_ids(vec![APPLE_COMPANY_ID]);

        assert!(!policy.accepts_advert(&plain, &HashSet::new()));
        assert!(policy.accepts_advert(&apple, &HashSet::new()));
    }

    #[test]
    fn fresh_campaign_clears_tried_peers_but_resume_keeps_them() {
        let mut campaign = ScanCampaign::default();
        campaign.begin(Generation::new(1));
        assert!(campaign.mark_tried(PeerId::from("AA")));
        assert!(!campaign.mark_tried(PeerId::from("AA")));

        campaign.stop();
        assert_eq!(None, campaign.scan_generation());
        campaign.resume(Generation::new(2));
        assert!(campaign.is_tried(&PeerId::from("AA")));
        assert_eq!(Some(Generation::new(2)), campaign.scan_generation());

        campaign.begin(Generation::new(3));
        assert!(campaign.tried_peers().is_empty());
    }
}
