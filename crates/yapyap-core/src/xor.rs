//! Kademlia-style XOR distance between peer ids (§9: "treat peer ids as
//! byte strings and compare distances lexicographically on XOR").

use crate::peer_id::PeerId;

/// XOR distance between two ids, as the bytewise XOR of their canonical byte
/// forms. Shorter operands are zero-padded on the right before XOR-ing so
/// callers with differently-sized ids still get a well-defined distance.
pub fn xor_distance(a: &[u8], b: &[u8]) -> Vec<u8> {
    let len = a.len().max(b.len());
    let mut out = Vec::with_capacity(len);
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        out.push(x ^ y);
    }
    out
}

/// Compare two XOR distances as unsigned big-endian integers, tie-broken
/// lexicographically (which, for equal-length byte strings, is the same
/// comparison — spelled out because the spec calls both out explicitly).
pub fn cmp_distance(a: &[u8], b: &[u8]) -> std::cmp::Ordering {
    a.cmp(b)
}

/// Convenience: XOR distance between two peer ids, ordering candidates by
/// closeness to `target`.
pub fn peer_distance(target: &PeerId, candidate: &PeerId) -> Vec<u8> {
    xor_distance(&target.to_bytes(), &candidate.to_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_ids_have_zero_distance() {
        let id = PeerId::from_bytes(&[9u8; 32]);
        let d = peer_distance(&id, &id);
        assert!(d.iter().all(|b| *b == 0));
    }

    #[test]
    fn closer_id_sorts_first() {
        let target = PeerId::from_bytes(&[0u8; 32]);
        let near = PeerId::from_bytes(&{
            let mut b = [0u8; 32];
            b[31] = 1;
            b
        });
        let far = PeerId::from_bytes(&{
            let mut b = [0u8; 32];
            b[0] = 0x80;
            b
        });
        let d_near = peer_distance(&target, &near);
        let d_far = peer_distance(&target, &far);
        assert_eq!(cmp_distance(&d_near, &d_far), std::cmp::Ordering::Less);
    }
}
