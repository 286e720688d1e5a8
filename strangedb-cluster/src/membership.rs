//! Per-peer liveness state: a map of `node_url -> Member`, seeded with the
//! local node and any configured seed urls.

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Alive,
    Suspect,
    Dead,
}

#[derive(Debug, Clone)]
pub struct Member {
    pub node_url: String,
    pub state: NodeState,
    pub heartbeat: i64,
    pub last_updated: Instant,
}

pub struct Membership {
    local_url: String,
    members: RwLock<HashMap<String, Member>>,
}

impl Membership {
    pub fn new(local_url: impl Into<String>) -> Self {
        let local_url = local_url.into();
        let mut members = HashMap::new();
        members.insert(
            local_url.clone(),
            Member {
                node_url: local_url.clone(),
                state: NodeState::Alive,
                heartbeat: 0,
                last_updated: Instant::now(),
            },
        );
        Self {
            local_url,
            members: RwLock::new(members),
        }
    }

    pub fn local_url(&self) -> &str {
        &self.local_url
    }

    /// If `heartbeat` is strictly greater than the stored value, marks the
    /// member Alive and refreshes `last_updated`; otherwise a no-op. Inserts
    /// a new entry (Alive) if the member is unknown. `Dead -> Alive` is
    /// reachable this way upon a strictly larger heartbeat.
    pub fn update(&self, node_url: &str, heartbeat: i64) {
        let mut members = self.members.write();
        match members.get_mut(node_url) {
            Some(member) => {
                if heartbeat > member.heartbeat {
                    member.heartbeat = heartbeat;
                    member.state = NodeState::Alive;
                    member.last_updated = Instant::now();
                }
            }
            None => {
                members.insert(
                    node_url.to_string(),
                    Member {
                        node_url: node_url.to_string(),
                        state: NodeState::Alive,
                        heartbeat,
                        last_updated: Instant::now(),
                    },
                );
            }
        }
    }

    pub fn mark_suspect(&self, node_url: &str) {
        let mut members = self.members.write();
        if let Some(member) = members.get_mut(node_url) {
            member.state = NodeState::Suspect;
            member.last_updated = Instant::now();
        }
    }

    pub fn mark_dead(&self, node_url: &str) {
        let mut members = self.members.write();
        if let Some(member) = members.get_mut(node_url) {
            member.state = NodeState::Dead;
            member.last_updated = Instant::now();
        }
    }

    pub fn increment_heartbeat(&self) -> i64 {
        let mut members = self.members.write();
        if let Some(local) = members.get_mut(&self.local_url) {
            local.heartbeat += 1;
            local.last_updated = Instant::now();
            local.heartbeat
        } else {
            0
        }
    }

    /// All members in state Alive (including local).
    pub fn alive_members(&self) -> Vec<String> {
        self.members
            .read()
            .values()
            .filter(|m| m.state == NodeState::Alive)
            .map(|m| m.node_url.clone())
            .collect()
    }

    pub fn all_members(&self) -> Vec<Member> {
        self.members.read().values().cloned().collect()
    }

    pub fn digest(&self) -> HashMap<String, i64> {
        self.members
            .read()
            .iter()
            .map(|(url, member)| (url.clone(), member.heartbeat))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_is_monotone_on_heartbeat() {
        let m = Membership::new("self");
        m.update("peer", 5);
        m.update("peer", 3);
        assert_eq!(m.digest()["peer"], 5);
        m.update("peer", 10);
        assert_eq!(m.digest()["peer"], 10);
    }

    #[test]
    fn dead_to_alive_on_larger_heartbeat() {
        let m = Membership::new("self");
        m.update("peer", 1);
        m.mark_dead("peer");
        m.update("peer", 2);
        let member = m
            .all_members()
            .into_iter()
            .find(|x| x.node_url == "peer")
            .unwrap();
        assert_eq!(member.state, NodeState::Alive);
    }

    #[test]
    fn increment_heartbeat_bumps_local_only() {
        let m = Membership::new("self");
        assert_eq!(m.increment_heartbeat(), 1);
        assert_eq!(m.increment_heartbeat(), 2);
        assert_eq!(m.digest()["self"], 2);
    }
}
