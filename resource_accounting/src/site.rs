use std::collections::BTreeMap;
use std::fmt::Display;

use log::debug;

use crate::config::*;

/// One computing site, as pledged in the pledge sheets or synthesized for
/// funding agencies without any pledge.
#[derive(PartialEq, Debug, Clone)]
pub struct Site {
    name: String,
    category: TierCategory,
    pledged: ResourceQuantity,
    monitoring_aliases: Vec<String>,
    storage_elements: Vec<String>,
    accounting_aliases: Vec<String>,
    used: BTreeMap<(UsageSource, Month), ResourceQuantity>,
}

impl Site {
    pub fn new(name: &str, category: TierCategory, pledged: ResourceQuantity) -> Site {
        Site {
            name: name.to_string(),
            category,
            pledged,
            monitoring_aliases: Vec::new(),
            storage_elements: Vec::new(),
            accounting_aliases: Vec::new(),
            used: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> TierCategory {
        self.category
    }

    pub fn pledged(&self) -> ResourceQuantity {
        self.pledged
    }

    pub fn monitoring_aliases(&self) -> &[String] {
        &self.monitoring_aliases
    }

    pub fn storage_elements(&self) -> &[String] {
        &self.storage_elements
    }

    pub fn accounting_aliases(&self) -> &[String] {
        &self.accounting_aliases
    }

    pub fn add_monitoring_ce(&mut self, name: &str) {
        self.monitoring_aliases.push(name.to_string());
    }

    pub fn add_monitoring_ces(&mut self, names: &[String]) {
        self.monitoring_aliases.extend(names.iter().cloned());
    }

    pub fn add_storage_element(&mut self, name: &str) {
        self.storage_elements.push(name.to_string());
    }

    pub fn add_storage_elements(&mut self, names: &[String]) {
        self.storage_elements.extend(names.iter().cloned());
    }

    pub fn find_compute_alias(&self, name: &str) -> bool {
        self.monitoring_aliases.iter().any(|x| x == name)
    }

    pub fn find_storage_alias(&self, name: &str) -> bool {
        self.storage_elements.iter().any(|x| x == name)
    }

    /// True if this site is known under `name` in the accounting reports.
    pub fn answers_to(&self, name: &str) -> bool {
        self.name == name || self.accounting_aliases.iter().any(|x| x == name)
    }

    /// A Tier-2 site that never matched an accounting name may adopt one.
    pub fn can_learn_alias(&self) -> bool {
        self.category == TierCategory::T2 && self.accounting_aliases.is_empty()
    }

    /// Binds an accounting federation name to this site. Only the first binding
    /// is accepted.
    pub fn learn_alias(&mut self, name: &str) -> bool {
        if !self.can_learn_alias() {
            return false;
        }
        debug!("Site {}: now known as {}", self.name, name);
        self.accounting_aliases.push(name.to_string());
        true
    }

    pub fn accumulate_usage(&mut self, source: UsageSource, month: Month, quantity: ResourceQuantity) {
        *self.used.entry((source, month)).or_default() += quantity;
    }

    pub fn used(&self, source: UsageSource, month: Month) -> ResourceQuantity {
        self.used.get(&(source, month)).copied().unwrap_or_default()
    }

    pub fn clear_usage(&mut self, month: Month) {
        self.used.retain(|(_, m), _| *m != month);
    }
}

impl Display for Site {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "           > {} is a {:?} and has:", self.name, self.category)?;
        writeln!(f, "Pledged: {}", self.pledged)?;
        writeln!(f, "Monitoring CEs: {}", self.monitoring_aliases.join(", "))?;
        write!(f, "Monitoring SEs: {}", self.storage_elements.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feb() -> Month {
        Month::new(2017, 2).unwrap()
    }

    #[test]
    fn alias_binding_is_one_shot() {
        let mut s = Site::new("FR-GRIF", TierCategory::T2, ResourceQuantity::ZERO);
        assert!(s.answers_to("FR-GRIF"));
        assert!(!s.answers_to("GRIF"));
        assert!(s.learn_alias("GRIF"));
        assert!(s.answers_to("GRIF"));
        assert!(!s.learn_alias("GRIF-2"));
        assert!(!s.answers_to("GRIF-2"));
    }

    #[test]
    fn only_tier2_sites_learn() {
        let mut s = Site::new("FR-CCIN2P3", TierCategory::T1, ResourceQuantity::ZERO);
        assert!(!s.learn_alias("IN2P3-CC"));
    }

    #[test]
    fn usage_accumulates_per_source_and_month() {
        let mut s = Site::new("A", TierCategory::T2, ResourceQuantity::ZERO);
        s.accumulate_usage(UsageSource::Accounting, feb(), ResourceQuantity::new(1.0, 0.0, 0.0));
        s.accumulate_usage(UsageSource::Accounting, feb(), ResourceQuantity::new(0.5, 0.0, 0.0));
        s.accumulate_usage(UsageSource::Monitoring, feb(), ResourceQuantity::new(0.0, 2.0, 0.0));
        assert_eq!(s.used(UsageSource::Accounting, feb()).cpu(), 1.5);
        assert_eq!(s.used(UsageSource::Monitoring, feb()).disk(), 2.0);
        assert!(s.used(UsageSource::Accounting, feb().next()).is_zero());
        s.clear_usage(feb());
        assert!(s.used(UsageSource::Accounting, feb()).is_zero());
    }

    #[test]
    fn aliases() {
        let mut s = Site::new("A", TierCategory::T2, ResourceQuantity::ZERO);
        s.add_monitoring_ces(&["CE1".to_string()]);
        s.add_monitoring_ce("CE1");
        s.add_storage_element("ALICE::A::SE");
        assert!(s.find_compute_alias("CE1"));
        assert!(!s.find_compute_alias("CE2"));
        assert!(s.find_storage_alias("ALICE::A::SE"));
    }
}
