use shared::domain::Identity;

/// Users currently connected, in the order the server reported them.
///
/// The server owns the authoritative list; the client only ever swaps in the
/// latest copy.
#[derive(Debug, Clone, Default)]
pub struct PresenceRoster {
    users: Vec<Identity>,
}

impl PresenceRoster {
    pub fn replace(&mut self, users: Vec<Identity>) {
        self.users = users;
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.users.contains(identity)
    }

    pub fn all_except<'a>(&'a self, local: &'a Identity) -> impl Iterator<Item = &'a Identity> {
        self.users.iter().filter(move |user| *user != local)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Identity> {
        self.users.iter()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<Identity> {
        names
            .iter()
            .map(|name| Identity::parse(name).expect("identity"))
            .collect()
    }

    #[test]
    fn all_except_skips_local_and_keeps_server_order() {
        let mut roster = PresenceRoster::default();
        roster.replace(ids(&["carol", "alice", "bob", "dave"]));

        let bob = Identity::parse("bob").expect("identity");
        let others: Vec<_> = roster.all_except(&bob).cloned().collect();
        assert_eq!(others, ids(&["carol", "alice", "dave"]));
    }

    #[test]
    fn replace_discards_previous_users() {
        let mut roster = PresenceRoster::default();
        roster.replace(ids(&["alice", "bob", "carol"]));
        roster.replace(ids(&["dave"]));

        let alice = Identity::parse("alice").expect("identity");
        assert!(!roster.contains(&alice));
        assert_eq!(roster.len(), 1);
        assert_eq!(roster.all_except(&alice).count(), 1);
    }

    #[test]
    fn roster_update_scenario_as_bob() {
        let mut roster = PresenceRoster::default();
        roster.replace(ids(&["alice", "bob", "carol"]));
        let bob = Identity::parse("bob").expect("identity");
        assert_eq!(
            roster.all_except(&bob).cloned().collect::<Vec<_>>(),
            ids(&["alice", "carol"])
        );
    }
}
