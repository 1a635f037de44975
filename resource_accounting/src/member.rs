use std::collections::BTreeMap;
use std::fmt::Display;

use log::debug;

use crate::config::*;
use crate::site::Site;

/// A funding agency, or a cluster of several of them reported under one name.
#[derive(PartialEq, Debug, Clone)]
pub struct Member {
    name: String,
    status: MembershipStatus,
    role: MemberRole,
    payers: u32,
    contribution_pct: f64,
    contribution_tape_pct: f64,
    required: ResourceQuantity,
    pledged: ResourceQuantity,
    sites: Vec<Site>,
    // Names of the agencies absorbed by this cluster.
    constituents: Vec<String>,
    used: BTreeMap<(UsageSource, Month), ResourceQuantity>,
}

impl Member {
    pub fn new(name: &str, status: MembershipStatus, payers: u32) -> Member {
        Member {
            name: name.to_string(),
            status,
            role: MemberRole::Active,
            payers,
            contribution_pct: 0.0,
            contribution_tape_pct: 0.0,
            required: ResourceQuantity::ZERO,
            pledged: ResourceQuantity::ZERO,
            sites: Vec::new(),
            constituents: Vec::new(),
            used: BTreeMap::new(),
        }
    }

    /// An empty cluster, to be filled with `absorb`.
    pub fn cluster(name: &str, status: MembershipStatus) -> Member {
        let mut m = Member::new(name, status, 0);
        m.role = MemberRole::ClusterContainer;
        m
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> MembershipStatus {
        self.status
    }

    pub fn role(&self) -> &MemberRole {
        &self.role
    }

    /// Absorbed members are hidden from listings, payer counts and lookups.
    pub fn is_hidden(&self) -> bool {
        matches!(self.role, MemberRole::AbsorbedInto(_))
    }

    pub fn is_cluster(&self) -> bool {
        self.role == MemberRole::ClusterContainer
    }

    pub fn payers(&self) -> u32 {
        self.payers
    }

    pub fn contribution_pct(&self) -> f64 {
        self.contribution_pct
    }

    pub fn contribution_tape_pct(&self) -> f64 {
        self.contribution_tape_pct
    }

    pub fn required(&self) -> ResourceQuantity {
        self.required
    }

    pub fn pledged(&self) -> ResourceQuantity {
        self.pledged
    }

    pub fn sites(&self) -> &[Site] {
        &self.sites
    }

    pub fn constituents(&self) -> &[String] {
        &self.constituents
    }

    /// The names under which this member may appear in the naming dictionary.
    pub fn lookup_names(&self) -> Vec<&str> {
        let mut names = vec![self.name.as_str()];
        names.extend(self.constituents.iter().map(|s| s.as_str()));
        names
    }

    pub fn has_sites(&self) -> bool {
        !self.sites.is_empty()
    }

    pub fn attach_site(&mut self, site: Site) {
        self.pledged += site.pledged();
        self.sites.push(site);
    }

    /// Takes over the payers, requirements and sites of `other`, which becomes hidden.
    pub fn absorb(&mut self, other: &mut Member) {
        debug!("Member {}: absorbing {}", self.name, other.name);
        self.payers += other.payers;
        self.required += other.required;
        for site in std::mem::take(&mut other.sites) {
            self.attach_site(site);
        }
        other.pledged = ResourceQuantity::ZERO;
        self.constituents.push(other.name.clone());
        self.constituents.extend(other.constituents.iter().cloned());
        other.role = MemberRole::AbsorbedInto(self.name.clone());
    }

    pub fn has_tier1_presence(&self) -> bool {
        self.sites.iter().any(|s| s.category() == TierCategory::T1)
    }

    pub fn set_contribution(&mut self, pct_total: f64) {
        self.contribution_pct = pct_total;
    }

    /// Members without a Tier-1 site never owe a tape share.
    pub fn set_contribution_tape_share(&mut self, pct_tape: f64) {
        self.contribution_tape_pct = if self.has_tier1_presence() {
            pct_tape
        } else {
            0.0
        };
    }

    pub fn set_required(&mut self, required: ResourceQuantity) {
        self.required = required;
    }

    /// Finds an owned site by its accounting name or one of its bound aliases.
    ///
    /// With `aliasing`, an unmatched name is bound to the first Tier-2 site
    /// that has no accounting alias yet.
    pub fn search_site(&mut self, name: &str, aliasing: bool) -> Option<&mut Site> {
        if let Some(idx) = self.sites.iter().position(|s| s.answers_to(name)) {
            return self.sites.get_mut(idx);
        }
        if !aliasing {
            return None;
        }
        let idx = self.sites.iter().position(|s| s.can_learn_alias())?;
        let site = self.sites.get_mut(idx)?;
        site.learn_alias(name);
        Some(site)
    }

    pub fn find_site(&self, name: &str) -> Option<&Site> {
        self.sites.iter().find(|s| s.answers_to(name))
    }

    pub fn site_with_compute_element(&mut self, ce: &str) -> Option<&mut Site> {
        self.sites.iter_mut().find(|s| s.find_compute_alias(ce))
    }

    pub fn site_with_storage_element(&mut self, se: &str) -> Option<&mut Site> {
        self.sites.iter_mut().find(|s| s.find_storage_alias(se))
    }

    /// Sums the usage of the owned sites and records it as this member's
    /// usage for `source` and `month`.
    pub fn compute_monthly_usage_total(&mut self, source: UsageSource, month: Month) -> ResourceQuantity {
        let total: ResourceQuantity = self.sites.iter().map(|s| s.used(source, month)).sum();
        self.used.insert((source, month), total);
        total
    }

    /// Usage recorded for `source` and `month` at the last computation.
    pub fn used(&self, source: UsageSource, month: Month) -> ResourceQuantity {
        self.used.get(&(source, month)).copied().unwrap_or_default()
    }

    pub fn clear_usage(&mut self, month: Month) {
        for s in self.sites.iter_mut() {
            s.clear_usage(month);
        }
        self.used.retain(|(_, m), _| *m != month);
    }
}

impl Display for Member {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "**** {} ({}, {:?}):", self.name, self.status.tag(), self.role)?;
        writeln!(f, "       -- M&O payers {:.>20}", self.payers)?;
        writeln!(f, "       -- Contribution {:.>20.2} %", self.contribution_pct)?;
        if self.sites.is_empty() {
            write!(f, "No site")
        } else {
            writeln!(f, "      -- Sites:")?;
            for s in self.sites.iter() {
                writeln!(f, "{}", s)?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(name: &str, cat: TierCategory, cpu: f64, disk: f64, tape: f64) -> Site {
        Site::new(name, cat, ResourceQuantity::new(cpu, disk, tape))
    }

    fn sum_of_sites(m: &Member) -> ResourceQuantity {
        m.sites().iter().map(|s| s.pledged()).sum()
    }

    #[test]
    fn pledged_follows_sites() {
        let mut m = Member::new("France", MembershipStatus::MemberState, 10);
        assert_eq!(m.pledged(), sum_of_sites(&m));
        m.attach_site(site("FR-A", TierCategory::T1, 10.0, 1.0, 2.0));
        assert_eq!(m.pledged(), sum_of_sites(&m));
        m.attach_site(site("FR-B", TierCategory::T2, 5.0, 0.5, 0.0));
        assert_eq!(m.pledged(), sum_of_sites(&m));
        assert_eq!(m.pledged(), ResourceQuantity::new(15.0, 1.5, 2.0));
    }

    #[test]
    fn absorb_hides_the_constituent() {
        let mut a = Member::new("France-CEA", MembershipStatus::MemberState, 3);
        a.attach_site(site("FR-SACLAY", TierCategory::T2, 2.0, 0.1, 0.0));
        a.set_required(ResourceQuantity::new(1.0, 1.0, 0.0));
        let mut b = Member::new("France-IN2P3/CNRS", MembershipStatus::MemberState, 7);
        b.attach_site(site("FR-CCIN2P3", TierCategory::T1, 20.0, 2.0, 3.0));

        let mut cluster = Member::cluster("France", MembershipStatus::MemberState);
        cluster.absorb(&mut a);
        cluster.absorb(&mut b);

        assert!(cluster.is_cluster());
        assert!(!cluster.is_hidden());
        assert_eq!(cluster.payers(), 10);
        assert_eq!(cluster.sites().len(), 2);
        assert_eq!(cluster.pledged(), sum_of_sites(&cluster));
        assert_eq!(cluster.required(), ResourceQuantity::new(1.0, 1.0, 0.0));
        assert!(cluster.has_tier1_presence());
        assert_eq!(cluster.lookup_names(), vec!["France", "France-CEA", "France-IN2P3/CNRS"]);

        assert!(a.is_hidden());
        assert_eq!(a.role(), &MemberRole::AbsorbedInto("France".to_string()));
        assert!(a.sites().is_empty());
        assert!(a.pledged().is_zero());
    }

    #[test]
    fn tape_share_needs_a_tier1() {
        let mut m = Member::new("Mexico", MembershipStatus::NonMemberState, 4);
        m.attach_site(site("MX-UNAM", TierCategory::T2, 1.0, 0.1, 0.0));
        m.set_contribution_tape_share(12.0);
        assert_eq!(m.contribution_tape_pct(), 0.0);
        m.attach_site(site("MX-T1", TierCategory::T1, 1.0, 0.1, 0.1));
        m.set_contribution_tape_share(12.0);
        assert_eq!(m.contribution_tape_pct(), 12.0);
    }

    #[test]
    fn search_with_alias_learning() {
        let mut m = Member::new("Italy", MembershipStatus::MemberState, 30);
        m.attach_site(site("IT-INFN-CNAF", TierCategory::T1, 1.0, 0.0, 0.0));
        m.attach_site(site("IT-INFN-T2", TierCategory::T2, 1.0, 0.0, 0.0));
        assert!(m.search_site("INFN-BARI", false).is_none());
        let learned = m.search_site("INFN-BARI", true).map(|s| s.name().to_string());
        assert_eq!(learned.as_deref(), Some("IT-INFN-T2"));
        // Second sight binds to the same site, no other site is eligible anymore.
        let again = m.search_site("INFN-BARI", true).map(|s| s.name().to_string());
        assert_eq!(again.as_deref(), Some("IT-INFN-T2"));
        assert!(m.search_site("INFN-CATANIA", true).is_none());
    }

    #[test]
    fn monthly_totals_are_a_straight_sum() {
        let month = Month::new(2017, 1).unwrap();
        let mut m = Member::new("Italy", MembershipStatus::MemberState, 30);
        m.attach_site(site("A", TierCategory::T1, 1.0, 0.0, 0.0));
        m.attach_site(site("B", TierCategory::T2, 1.0, 0.0, 0.0));
        m.search_site("A", false)
            .unwrap()
            .accumulate_usage(UsageSource::Accounting, month, ResourceQuantity::new(2.0, 0.0, 0.0));
        m.search_site("B", false)
            .unwrap()
            .accumulate_usage(UsageSource::Accounting, month, ResourceQuantity::new(3.0, 0.0, 0.0));
        assert_eq!(m.compute_monthly_usage_total(UsageSource::Accounting, month).cpu(), 5.0);
        // Recomputing does not double count.
        assert_eq!(m.compute_monthly_usage_total(UsageSource::Accounting, month).cpu(), 5.0);
        assert_eq!(m.used(UsageSource::Accounting, month).cpu(), 5.0);
        m.clear_usage(month);
        assert_eq!(m.compute_monthly_usage_total(UsageSource::Accounting, month).cpu(), 0.0);
    }
}
