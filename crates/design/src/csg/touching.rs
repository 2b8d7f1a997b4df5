//! Partition participants into sets connected by bounding-box contact.

use super::Participant;
use crate::geometry::Aabb;

/// Split `participants` into the connected components of the
/// "world AABBs intersect" graph.
///
/// Each set is seeded with the last unplaced participant and grows
/// breadth-first: every member is checked against every remaining
/// participant, so a set is O(n²) in the number of participants.
pub fn group_by_touching(participants: &[Participant]) -> Vec<Vec<Participant>> {
    let mut available: Vec<(Participant, Aabb)> = participants
        .iter()
        .map(|p| (p.clone(), p.aabb()))
        .collect();
    let mut sets = Vec::new();

    while let Some(seed) = available.pop() {
        let mut touching = vec![seed];
        let mut checking = 0;
        while checking < touching.len() && !available.is_empty() {
            let aabb = touching[checking].1;
            for i in (0..available.len()).rev() {
                if aabb.intersects(&available[i].1) {
                    touching.push(available.remove(i));
                }
            }
            checking += 1;
        }
        sets.push(touching.into_iter().map(|(p, _)| p).collect());
    }

    sets
}
