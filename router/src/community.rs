//! Community directory: membership counts and leader identities.
//!
//! Built once from the `communitiesAttributes` configuration string and
//! immutable afterward. The directory value is shared by reference among
//! all router instances within one simulation run (single writer at setup,
//! read-only thereafter).

use indexmap::IndexMap;

use crate::{CommunityId, HostId, RouterConfig, RouterError, RouterResult};

/// Membership and leadership record for one community.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommunityRecord {
    /// Number of member hosts, leader included.
    pub member_count: usize,
    /// The designated leader host.
    pub leader: HostId,
}

/// Static mapping of community ids to member counts and leaders.
///
/// Host identifiers are numbered globally across communities in declaration
/// order, so with `"a:3,b:2"` the hosts are `a0 a1 a2 b3 b4` and the
/// leaders are `a0` and `b3` (the first host of each community).
#[derive(Debug, Clone)]
pub struct CommunityDirectory {
    records: IndexMap<CommunityId, CommunityRecord>,
    hosts: Vec<HostId>,
}

impl CommunityDirectory {
    /// Build the directory from a configuration bundle.
    ///
    /// Fatal at startup: an unparseable declaration, a duplicate community,
    /// or any community too small for the anonymity threshold
    /// (`member_count < k_value + 1` leaves no room for blinding).
    pub fn from_config(config: &RouterConfig) -> RouterResult<Self> {
        config.validate()?;
        let mut records = IndexMap::new();
        let mut hosts = Vec::new();
        let mut offset = 0usize;

        for declaration in config.communities_attributes.split(',') {
            let (prefix, count) = declaration.split_once(':').ok_or_else(|| {
                RouterError::Config(format!(
                    "malformed community declaration {declaration:?}, expected id:count"
                ))
            })?;
            if prefix.is_empty() || !prefix.chars().all(|c| c.is_alphabetic()) {
                return Err(RouterError::Config(format!(
                    "community id {prefix:?} must be a non-empty alphabetic prefix"
                )));
            }
            let member_count: usize = count.parse().map_err(|_| {
                RouterError::Config(format!("member count {count:?} is not a number"))
            })?;
            if member_count < config.k_value + 1 {
                return Err(RouterError::Config(format!(
                    "community {prefix:?} has {member_count} members but kValue {} \
                     requires at least {}",
                    config.k_value,
                    config.k_value + 1
                )));
            }

            let community = CommunityId::new(prefix);
            let leader = HostId::new(format!("{prefix}{offset}"));
            for index in offset..offset + member_count {
                hosts.push(HostId::new(format!("{prefix}{index}")));
            }
            offset += member_count;

            if records
                .insert(
                    community.clone(),
                    CommunityRecord {
                        member_count,
                        leader,
                    },
                )
                .is_some()
            {
                return Err(RouterError::Config(format!(
                    "community {community} declared twice"
                )));
            }
        }

        Ok(Self { records, hosts })
    }

    /// Member count of a community, 0 if unknown.
    pub fn member_count(&self, community: &CommunityId) -> usize {
        self.records
            .get(community)
            .map(|r| r.member_count)
            .unwrap_or(0)
    }

    /// Leader host of a community.
    pub fn leader_of(&self, community: &CommunityId) -> Option<&HostId> {
        self.records.get(community).map(|r| &r.leader)
    }

    /// Whether `host` is the designated leader of its community.
    pub fn is_leader(&self, host: &HostId) -> bool {
        self.records.values().any(|r| r.leader == *host)
    }

    /// The community a host belongs to.
    ///
    /// A host whose prefix matches no declared community is a protocol
    /// precondition violation: the simulation was wired with a node the
    /// configuration never declared.
    pub fn community_of(&self, host: &HostId) -> RouterResult<CommunityId> {
        let community = CommunityId::new(host.community_prefix());
        if self.records.contains_key(&community) {
            Ok(community)
        } else {
            Err(RouterError::ProtocolViolation(format!(
                "host {host} belongs to undeclared community {community}"
            )))
        }
    }

    /// The single cross-community relay target for a leader: the leader of
    /// the first declared community other than `own`.
    pub fn peer_leader_excluding(&self, own: &CommunityId) -> Option<&HostId> {
        self.records
            .iter()
            .find(|(community, _)| *community != own)
            .map(|(_, record)| &record.leader)
    }

    /// All declared communities in declaration order.
    pub fn communities(&self) -> impl Iterator<Item = &CommunityId> {
        self.records.keys()
    }

    /// The complete host universe in declaration order.
    pub fn hosts(&self) -> &[HostId] {
        &self.hosts
    }
}
