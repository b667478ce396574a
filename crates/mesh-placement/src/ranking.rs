//! Peer ranking by XOR distance (spec §4.5).
//!
//! Grounded on `objectio_placement::crush::CrushMap::select_nodes`'s shape
//! (hash each candidate, `sort_by_key` for a deterministic order) with the
//! weighted-hash/failure-domain logic replaced by the spec-mandated XOR
//! distance metric, modeled the way `willief-communitas`'s `dht::Distance`
//! models Kademlia distance.

use mesh_common::types::PeerId;

/// Rank `connected_peers` by XOR distance to `chunk_key`'s raw bytes, then
/// append `self_id` enough times to fill `n` slots (spec §4.5: "if fewer
/// than n other peers are available, self fills the remaining slots").
/// Stable and deterministic for fixed inputs (spec §8 property 6).
#[must_use]
pub fn rank_peers(chunk_key: &[u8], connected_peers: &[PeerId], self_id: &PeerId, n: usize) -> Vec<PeerId> {
    let mut ranked: Vec<PeerId> = connected_peers
        .iter()
        .filter(|p| *p != self_id)
        .cloned()
        .collect();
    ranked.sort_by_key(|peer| peer.xor_distance(chunk_key));

    let mut out: Vec<PeerId> = ranked.into_iter().take(n).collect();
    while out.len() < n {
        out.push(self_id.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(bytes: &[u8]) -> PeerId {
        PeerId::from_bytes(bytes.to_vec())
    }

    #[test]
    fn ranking_is_deterministic() {
        let key = b"chunk-key-bytes";
        let peers = vec![peer(&[3, 3, 3]), peer(&[1, 1, 1]), peer(&[2, 2, 2])];
        let me = peer(&[0, 0, 0]);
        let a = rank_peers(key, &peers, &me, 3);
        let b = rank_peers(key, &peers, &me, 3);
        assert_eq!(a, b);
    }

    #[test]
    fn self_fills_remaining_slots() {
        let key = b"chunk-key-bytes";
        let peers = vec![peer(&[1, 1, 1])];
        let me = peer(&[0, 0, 0]);
        let ranked = rank_peers(key, &peers, &me, 5);
        assert_eq!(ranked.len(), 5);
        assert_eq!(ranked.iter().filter(|p| **p == me).count(), 4);
    }

    #[test]
    fn self_is_excluded_from_the_connected_peer_ranking() {
        let key = b"chunk-key-bytes";
        let me = peer(&[0, 0, 0]);
        let peers = vec![me.clone(), peer(&[1, 1, 1])];
        let ranked = rank_peers(key, &peers, &me, 1);
        assert_eq!(ranked, vec![peer(&[1, 1, 1])]);
    }

    #[test]
    fn one_peer_network_is_entirely_self() {
        let key = b"k";
        let me = peer(&[9]);
        let ranked = rank_peers(key, &[], &me, 15);
        assert!(ranked.iter().all(|p| *p == me));
        assert_eq!(ranked.len(), 15);
    }
}
