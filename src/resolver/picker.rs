//! RFC 2782 priority/weight selection over an SRV answer (spec §4.D).

use rand::Rng;

use crate::resolver::backend::SrvRecord;
use crate::resolver::{Candidate, Resolver};

struct PriorityGroup {
    entries: Vec<SrvRecord>,
    total_weight: u32,
}

impl PriorityGroup {
    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove and return one entry per the weighted-random rule (spec §4.D
    /// step 2): a uniform draw over the cumulative weight when any entry has
    /// positive weight, else a uniform draw over remaining entries.
    fn pick(&mut self) -> SrvRecord {
        let index = if self.total_weight > 0 {
            let r = rand::thread_rng().gen_range(1..=self.total_weight);
            let mut running = 0u32;
            let mut chosen = self.entries.len() - 1;
            for (i, e) in self.entries.iter().enumerate() {
                running += e.weight as u32;
                if running >= r {
                    chosen = i;
                    break;
                }
            }
            chosen
        } else {
            rand::thread_rng().gen_range(0..self.entries.len())
        };
        let entry = self.entries.remove(index);
        self.total_weight = self.total_weight.saturating_sub(entry.weight as u32);
        entry
    }
}

/// Builds [`PriorityGroup`]s from a raw SRV answer: sort by `(priority ASC,
/// weight ASC)`, then partition into consecutive-priority groups, each
/// caching `total_weight`.
fn group_by_priority(mut answer: Vec<SrvRecord>) -> Vec<PriorityGroup> {
    answer.sort_by_key(|r| (r.priority, r.weight));
    let mut groups: Vec<PriorityGroup> = Vec::new();
    for record in answer {
        match groups.last_mut() {
            Some(g) if g.entries.last().map(|e| e.priority) == Some(record.priority) => {
                g.total_weight += record.weight as u32;
                g.entries.push(record);
            }
            _ => {
                groups.push(PriorityGroup {
                    total_weight: record.weight as u32,
                    entries: vec![record],
                });
            }
        }
    }
    groups
}

/// An iterator-like cursor over SRV-derived candidates. Each `next()` call
/// may perform DNS resolution (to turn an SRV target into addresses), so
/// this is a hand-rolled async iterator rather than `std::iter::Iterator`.
pub struct ServerPicker<'r> {
    resolver: &'r Resolver,
    groups: std::collections::VecDeque<PriorityGroup>,
    current: Option<PriorityGroup>,
}

impl<'r> ServerPicker<'r> {
    pub(crate) fn new(resolver: &'r Resolver, answer: Vec<SrvRecord>, port: Option<u16>) -> Self {
        let _ = port; // SRV records carry their own port; see `next()`.
        Self {
            resolver,
            groups: group_by_priority(answer).into(),
            current: None,
        }
    }

    /// Produce the next candidate, or `None` once every group is exhausted.
    /// Bounded retry loop: a target that resolves to zero addresses is
    /// skipped and the next target tried, up to the number of remaining
    /// targets across all groups (spec §9: made iterative rather than the
    /// original's self-recursive retry, to bound stack depth).
    pub async fn next(&mut self) -> Option<Candidate> {
        loop {
            if self.current.as_ref().map(PriorityGroup::is_empty).unwrap_or(true) {
                self.current = self.groups.pop_front();
                if self.current.is_none() {
                    return None;
                }
            }
            let group = self.current.as_mut().unwrap();
            let entry = group.pick();
            let pairs = self.resolver.resolveaddrs(&entry.target).await;
            match pairs.first() {
                Some((ipv4, ipv6)) => return Some((*ipv4, *ipv6, entry.port)),
                None => continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::backend::{DnsOutcomeFixture, FixtureBackend};
    use crate::resolver::Resolver;
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    fn rec(target: &str, port: u16, priority: u16, weight: u16) -> SrvRecord {
        SrvRecord {
            target: target.to_string(),
            port,
            priority,
            weight,
        }
    }

    #[test]
    fn groups_sorted_ascending_by_priority_then_weight() {
        let answer = vec![
            rec("c", 5222, 20, 5),
            rec("a", 5222, 10, 0),
            rec("b", 5222, 10, 0),
        ];
        let groups = group_by_priority(answer);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].entries[0].priority, 10);
        assert_eq!(groups[1].entries[0].priority, 20);
    }

    #[tokio::test]
    async fn lower_priority_group_exhausted_before_higher_seen() {
        let backend = Arc::new(
            FixtureBackend::default()
                .with_a("a", DnsOutcomeFixture::Found(vec![Ipv4Addr::new(1, 1, 1, 1)]))
                .with_a("b", DnsOutcomeFixture::Found(vec![Ipv4Addr::new(1, 1, 1, 2)]))
                .with_a("c", DnsOutcomeFixture::Found(vec![Ipv4Addr::new(1, 1, 1, 3)]))
                .with_aaaa("a", DnsOutcomeFixture::Empty)
                .with_aaaa("b", DnsOutcomeFixture::Empty)
                .with_aaaa("c", DnsOutcomeFixture::Empty),
        );
        let resolver = Resolver::new("xmpp-client", "tcp", backend);
        let answer = vec![
            rec("a", 5222, 10, 0),
            rec("b", 5222, 10, 0),
            rec("c", 5222, 20, 5),
        ];
        let mut picker = ServerPicker::new(&resolver, answer, None);

        let mut seen = Vec::new();
        while let Some((ipv4, _ipv6, _port)) = picker.next().await {
            seen.push(ipv4.unwrap());
        }
        assert_eq!(seen.len(), 3);
        let c_pos = seen.iter().position(|a| *a == Ipv4Addr::new(1, 1, 1, 3)).unwrap();
        assert_eq!(c_pos, 2, "c (priority 20) must be seen only after a and b");
    }
}
