// Monthly usage: accounting federation reports and monitoring series.

use std::collections::BTreeMap;

use log::{debug, info, warn};
use snafu::prelude::*;

use crate::config::*;
use crate::shape::{clean_cell, parse_number, RecordShape, Table};
use crate::{fetch, AccountingResult, BadNumberSnafu, Collaboration, Extract, ExtractSource, Period};
use crate::{UnknownSiteSnafu, HOST_LAB};

// The accounting reports start with a free-form preamble.
const ACCOUNTING_PREAMBLE_LINES: usize = 4;
const ACCOUNTING_VO_TAG: &str = "alice";
const ACCOUNTING_TOTAL_LABEL: &str = "Total";

// Monitoring jobs report CPU in units of 10 HEPSPEC06 per 4.2 core.
const MONITORING_CPU_FACTOR: f64 = 4.2;
const MONITORING_CPU_DIVISOR: f64 = 10_000.0;

const TAPE_MARKERS: [&str; 3] = ["TAPE", "T0ALICE", "CASTOR2"];
const TIER1_STORAGE_MARKERS: [&str; 8] = [
    "CCIN2P3", "CNAF", "FZK", "KISTI", "NDGF", "RAL", "RRC", "SARA",
];

/// The four monthly extracts. Any of them may be missing.
#[derive(Debug, Clone, Default)]
pub struct MonthlyReports {
    pub tier01: Option<Table>,
    pub tier2: Option<Table>,
    pub cpu_monitoring: Option<Table>,
    pub storage_monitoring: Option<Table>,
}

impl MonthlyReports {
    pub fn fetch(src: &dyn ExtractSource, month: Month) -> AccountingResult<MonthlyReports> {
        let period = Period::Month(month);
        Ok(MonthlyReports {
            tier01: fetch(src, Extract::Tier01Usage, period)?,
            tier2: fetch(src, Extract::Tier2Usage, period)?,
            cpu_monitoring: fetch(src, Extract::CpuMonitoring, period)?,
            storage_monitoring: fetch(src, Extract::StorageMonitoring, period)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.tier01.is_none()
            && self.tier2.is_none()
            && self.cpu_monitoring.is_none()
            && self.storage_monitoring.is_none()
    }
}

/// Tier of a storage element, from its name.
pub fn storage_tier(se: &str, tape: bool) -> TierCategory {
    if se.contains(HOST_LAB) {
        TierCategory::T0
    } else if tape || TIER1_STORAGE_MARKERS.iter().any(|m| se.contains(m)) {
        TierCategory::T1
    } else {
        TierCategory::T2
    }
}

pub fn is_tape_element(se: &str) -> bool {
    TAPE_MARKERS.iter().any(|m| se.contains(m))
}

/// Column sums of a monitoring series ("Time" then one column per element),
/// with the number of data lines.
fn column_sums(extract: &str, table: &Table) -> AccountingResult<(BTreeMap<String, f64>, usize)> {
    let mut sums: BTreeMap<String, f64> = BTreeMap::new();
    let header: Vec<String> = match table.first() {
        Some(h) => h.iter().map(|c| clean_cell(c)).collect(),
        None => return Ok((sums, 0)),
    };
    let mut lines = 0;
    for (idx, row) in table.iter().enumerate().skip(1) {
        let lineno = idx + 1;
        if row.iter().all(|c| clean_cell(c).is_empty()) {
            continue;
        }
        lines += 1;
        for (name, cell) in header.iter().zip(row.iter()).skip(1) {
            let v = parse_number(cell).context(BadNumberSnafu {
                extract,
                lineno,
                content: cell.clone(),
            })?;
            *sums.entry(name.clone()).or_insert(0.0) += v;
        }
    }
    Ok((sums, lines))
}

impl Collaboration {
    /// Ingests the usage reports of `month`, replacing any previous usage of
    /// this month.
    ///
    /// Returns `Ok(false)` when none of the reports is available. On error,
    /// the usage of `month` is dropped and no month is considered loaded.
    pub fn ingest_monthly_usage(
        &mut self,
        month: Month,
        reports: &MonthlyReports,
    ) -> AccountingResult<bool> {
        info!("ingest_monthly_usage: {}", month);
        self.clear_month(month);
        self.current_month = Some((month, false));
        if reports.is_empty() {
            warn!("ingest_monthly_usage: no usage report for {}", month);
            return Ok(false);
        }
        if let Err(e) = self.read_month_reports(month, reports) {
            warn!("ingest_monthly_usage: {} discarded: {}", month, e);
            self.clear_month(month);
            self.current_month = None;
            return Err(e);
        }
        self.current_month = Some((month, true));
        Ok(true)
    }

    fn clear_month(&mut self, month: Month) {
        for m in self.members.iter_mut() {
            m.clear_usage(month);
        }
        self.used_by_tier.retain(|(_, m), _| *m != month);
    }

    fn read_month_reports(&mut self, month: Month, reports: &MonthlyReports) -> AccountingResult<()> {
        match &reports.tier01 {
            Some(t) => self.ingest_tier01_usage(month, t)?,
            None => warn!("ingest_monthly_usage: no {} for {}", Extract::Tier01Usage.label(), month),
        }
        match &reports.tier2 {
            Some(t) => self.ingest_tier2_usage(month, t)?,
            None => warn!("ingest_monthly_usage: no {} for {}", Extract::Tier2Usage.label(), month),
        }
        match &reports.cpu_monitoring {
            Some(t) => self.ingest_cpu_monitoring(month, t)?,
            None => warn!("ingest_monthly_usage: no {} for {}", Extract::CpuMonitoring.label(), month),
        }
        match &reports.storage_monitoring {
            Some(t) => self.ingest_storage_monitoring(month, t)?,
            None => warn!(
                "ingest_monthly_usage: no {} for {}",
                Extract::StorageMonitoring.label(),
                month
            ),
        }

        for m in self.members.iter_mut() {
            m.compute_monthly_usage_total(UsageSource::Accounting, month);
            m.compute_monthly_usage_total(UsageSource::Monitoring, month);
        }
        let total: ResourceQuantity = TierCategory::REAL
            .iter()
            .map(|t| self.used_by_tier(*t, month))
            .sum();
        self.used_by_tier.insert((TierCategory::Total, month), total);
        info!("ingest_monthly_usage: {}: total used {}", month, total);
        Ok(())
    }

    fn add_tier_usage(&mut self, tier: TierCategory, month: Month, q: ResourceQuantity) {
        *self.used_by_tier.entry((tier, month)).or_default() += q;
    }

    /// The Tier-0/1 report: one line per site, CPU time in HEPSPEC06 hours.
    ///
    /// Every site of this report must be a known pledged site.
    fn ingest_tier01_usage(&mut self, month: Month, table: &Table) -> AccountingResult<()> {
        let extract = Extract::Tier01Usage.label();
        let header = match table.get(ACCOUNTING_PREAMBLE_LINES) {
            Some(h) => h,
            None => {
                warn!("ingest_tier01_usage: {} has no header", extract);
                return Ok(());
            }
        };
        let shape = RecordShape::new(extract, header, usize::MAX);
        let vo_col = shape.column_containing(ACCOUNTING_VO_TAG)?;
        let hours = month.hours();

        for (idx, row) in table.iter().enumerate().skip(ACCOUNTING_PREAMBLE_LINES + 1) {
            let lineno = idx + 1;
            let site_name = match row.first() {
                Some(c) => clean_cell(c),
                None => continue,
            };
            if site_name == ACCOUNTING_TOTAL_LABEL {
                break;
            }
            let cell = match row.get(vo_col) {
                Some(c) if !clean_cell(c).is_empty() => clean_cell(c),
                _ => continue,
            };
            let value = parse_number(&cell).context(BadNumberSnafu {
                extract,
                lineno,
                content: cell.clone(),
            })?;
            let mut q = ResourceQuantity::ZERO;
            q.set_cpu(value / hours, CpuUnit::HepSpec06);

            let site = self
                .members
                .iter_mut()
                .filter(|m| !m.is_hidden())
                .find_map(|m| m.search_site(&site_name, false))
                .context(UnknownSiteSnafu {
                    extract,
                    site: site_name.clone(),
                })?;
            let tier = if site.category() == TierCategory::T0 {
                TierCategory::T0
            } else {
                TierCategory::T1
            };
            site.accumulate_usage(UsageSource::Accounting, month, q);
            debug!("ingest_tier01_usage: {}: {:.3} kHEPSPEC06", site_name, q.cpu());
            self.add_tier_usage(tier, month, q);
        }
        Ok(())
    }

    /// The Tier-2 report: one line per federation, grouped by country.
    ///
    /// A federation that is not a site name is bound to the first Tier-2 site
    /// of the country without an accounting name yet.
    fn ingest_tier2_usage(&mut self, month: Month, table: &Table) -> AccountingResult<()> {
        let extract = Extract::Tier2Usage.label();
        let header = match table.get(ACCOUNTING_PREAMBLE_LINES) {
            Some(h) => h,
            None => {
                warn!("ingest_tier2_usage: {} has no header", extract);
                return Ok(());
            }
        };
        let shape = RecordShape::new(extract, header, usize::MAX);
        let vo_col = shape.column_containing(ACCOUNTING_VO_TAG)?;
        let hours = month.hours();

        for (idx, row) in table.iter().enumerate().skip(ACCOUNTING_PREAMBLE_LINES + 1) {
            let lineno = idx + 1;
            let country = row.first().map(|c| clean_cell(c)).unwrap_or_default();
            if country.is_empty() {
                continue;
            }
            let federation = row.get(1).map(|c| clean_cell(c)).unwrap_or_default();
            if federation.contains(ACCOUNTING_TOTAL_LABEL) {
                break;
            }
            let cell = shape.get(row, vo_col, lineno)?;
            let value = parse_number(&cell).context(BadNumberSnafu {
                extract,
                lineno,
                content: cell.clone(),
            })?;
            if value == 0.0 {
                continue;
            }
            let mut q = ResourceQuantity::ZERO;
            q.set_cpu(value / hours, CpuUnit::HepSpec06);

            let member = match self.find_member_mut(&country) {
                Some(m) => m,
                None => {
                    warn!(
                        "ingest_tier2_usage: line {}: country {} is not a funding agency",
                        lineno, country
                    );
                    continue;
                }
            };
            let member_name = member.name().to_string();
            match member.search_site(&federation, true) {
                Some(site) => {
                    site.accumulate_usage(UsageSource::Accounting, month, q);
                    debug!(
                        "ingest_tier2_usage: {} ({}) -> {}: {:.3} kHEPSPEC06",
                        federation,
                        member_name,
                        site.name(),
                        q.cpu()
                    );
                }
                None => {
                    warn!(
                        "ingest_tier2_usage: line {}: no site of {} for federation {}",
                        lineno, member_name, federation
                    );
                    continue;
                }
            }
            self.add_tier_usage(TierCategory::T2, month, q);
        }
        Ok(())
    }

    /// Job CPU from the monitoring system, one column per compute element.
    fn ingest_cpu_monitoring(&mut self, month: Month, table: &Table) -> AccountingResult<()> {
        let extract = Extract::CpuMonitoring.label();
        let (sums, lines) = column_sums(extract, table)?;
        if lines == 0 {
            warn!("ingest_cpu_monitoring: {} has no data", extract);
            return Ok(());
        }
        let hours = month.hours();
        for (ce, sum) in sums.iter() {
            let value = sum * MONITORING_CPU_FACTOR / hours / lines as f64 / MONITORING_CPU_DIVISOR;
            let mut q = ResourceQuantity::ZERO;
            q.set_cpu(value, CpuUnit::KHepSpec06);
            let site = self
                .members
                .iter_mut()
                .filter(|m| !m.is_hidden())
                .find_map(|m| m.site_with_compute_element(ce));
            match site {
                Some(s) => {
                    debug!("ingest_cpu_monitoring: {} -> {}: {:.3}", ce, s.name(), value);
                    s.accumulate_usage(UsageSource::Monitoring, month, q);
                }
                None => debug!("ingest_cpu_monitoring: Ignore CE {}", ce),
            }
        }
        Ok(())
    }

    /// Storage element occupancy (GB) from the monitoring system, averaged
    /// over the month.
    fn ingest_storage_monitoring(&mut self, month: Month, table: &Table) -> AccountingResult<()> {
        let extract = Extract::StorageMonitoring.label();
        let (sums, lines) = column_sums(extract, table)?;
        if lines == 0 {
            warn!("ingest_storage_monitoring: {} has no data", extract);
            return Ok(());
        }
        for (se, sum) in sums.iter() {
            let average = sum / lines as f64;
            let tape = is_tape_element(se);
            let mut q = ResourceQuantity::ZERO;
            if tape {
                q.set_tape(average, StorageUnit::GB);
            } else {
                q.set_disk(average, StorageUnit::GB);
            }
            self.add_tier_usage(storage_tier(se, tape), month, q);

            let site = self
                .members
                .iter_mut()
                .filter(|m| !m.is_hidden())
                .find_map(|m| m.site_with_storage_element(se));
            match site {
                Some(s) => {
                    debug!("ingest_storage_monitoring: {} -> {}: {}", se, s.name(), q);
                    s.accumulate_usage(UsageSource::Monitoring, month, q);
                }
                None => warn!("ingest_storage_monitoring: storage element {} not found", se),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::*;
    use crate::{AccountingError, MemorySource, NameResolver};

    fn jan() -> Month {
        Month::new(2017, 1).unwrap()
    }

    fn preamble(mut lines: Vec<String>) -> Table {
        let mut all = vec![
            "Report".to_string(),
            "generated".to_string(),
            "".to_string(),
            "".to_string(),
        ];
        all.append(&mut lines);
        let refs: Vec<&str> = all.iter().map(|s| s.as_str()).collect();
        csv(&refs)
    }

    /// CERN (T0), Italy (T1 + T2 without any accounting name) and Mexico
    /// (monitoring elements only).
    fn collaboration() -> Collaboration {
        let naming = NameResolver::from_table(&ssv(&[
            "FA;SE;CE ML;CE WLCG",
            "CERN;ALICE::CERN::EOS;CERN-AURORA;CH-CERN",
            "CERN;ALICE::CERN::CASTOR2;;CH-CERN",
            "Italy;ALICE::CNAF::SE;CNAF;IT-INFN-CNAF",
            "Italy;ALICE::CNAF::TAPE;;IT-INFN-CNAF",
            "Mexico;ALICE::UNAM::SE;UNAM;",
        ]))
        .unwrap();
        let mut c = Collaboration::new(naming).with_clusters(vec![]);
        c.ingest_membership(2017, &roster(&[("MS-CERN", 10), ("MS-Italy", 5), ("NMS-Mexico", 2)]))
            .unwrap();
        c.ingest_pledges(
            2017,
            &pledges(&[
                pledge_lines("Tier 0", "Switzerland", "CH-CERN", 100_000.0, 10_000.0, 10_000.0),
                pledge_lines("Tier 1", "Italy", "IT-INFN-CNAF", 10_000.0, 1_000.0, 1_000.0),
                pledge_lines("Tier 2", "Italy", "IT-INFN-T2", 5_000.0, 500.0, 0.0),
            ]),
        )
        .unwrap();
        c
    }

    fn tier01(jan_hours: f64) -> Table {
        preamble(vec![
            "Site,atlas,alice,cms".to_string(),
            format!("CH-CERN,1,{},1", 50_000.0 * jan_hours),
            format!("IT-INFN-CNAF,1,{},1", 8_000.0 * jan_hours),
            "IT-INFN-OTHER,1,,1".to_string(),
            "Total,3,0,3".to_string(),
            "IT-AFTER-TOTAL,1,1,1".to_string(),
        ])
    }

    fn tier2(jan_hours: f64) -> Table {
        preamble(vec![
            "Country,Federation,atlas,alice".to_string(),
            format!("Italy,INFN-T2-FED,0,{}", 4_000.0 * jan_hours),
            format!("Italy,INFN-T2-FED,0,{}", 1_000.0 * jan_hours),
            format!("Italy,INFN-OTHER-FED,0,{}", 1_000.0 * jan_hours),
            "Italy,INFN-ZERO,0,0".to_string(),
            format!("Atlantis,XX,0,{}", 1_000.0 * jan_hours),
            ",,,".to_string(),
            "Total,Total,0,0".to_string(),
        ])
    }

    #[test]
    fn accounting_reports() {
        init_logs();
        let mut c = collaboration();
        let hours = jan().hours();
        let reports = MonthlyReports {
            tier01: Some(tier01(hours)),
            tier2: Some(tier2(hours)),
            ..Default::default()
        };
        assert!(c.ingest_monthly_usage(jan(), &reports).unwrap());

        assert!(close(c.used_by_tier(TierCategory::T0, jan()).cpu(), 50.0));
        assert!(close(c.used_by_tier(TierCategory::T1, jan()).cpu(), 8.0));
        // INFN-OTHER-FED finds no free Tier-2 and is skipped.
        assert!(close(c.used_by_tier(TierCategory::T2, jan()).cpu(), 5.0));
        assert!(close(c.used_by_tier(TierCategory::Total, jan()).cpu(), 63.0));

        let italy = c.find_member("Italy").unwrap();
        assert!(close(italy.used(UsageSource::Accounting, jan()).cpu(), 13.0));
        let t2 = italy.find_site("INFN-T2-FED").unwrap();
        assert_eq!(t2.name(), "IT-INFN-T2");
    }

    #[test]
    fn reingesting_a_month_does_not_double_count() {
        let mut c = collaboration();
        let hours = jan().hours();
        let reports = MonthlyReports {
            tier01: Some(tier01(hours)),
            tier2: Some(tier2(hours)),
            ..Default::default()
        };
        c.ingest_monthly_usage(jan(), &reports).unwrap();
        c.ingest_monthly_usage(jan(), &reports).unwrap();
        assert!(close(c.used_by_tier(TierCategory::Total, jan()).cpu(), 63.0));
        let italy = c.find_member("Italy").unwrap();
        assert!(close(italy.used(UsageSource::Accounting, jan()).cpu(), 13.0));
    }

    #[test]
    fn unknown_tier01_site_is_fatal() {
        let mut c = collaboration();
        let reports = MonthlyReports {
            tier01: Some(preamble(vec![
                "Site,alice".to_string(),
                "XX-NOWHERE,100".to_string(),
            ])),
            ..Default::default()
        };
        let err = c.ingest_monthly_usage(jan(), &reports).unwrap_err();
        assert!(matches!(err, AccountingError::UnknownSite { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn a_month_with_a_broken_report_is_never_cached() {
        init_logs();
        let mut src = MemorySource::new();
        src.insert(
            Extract::Membership,
            Period::Year(2017),
            roster(&[("MS-CERN", 10), ("MS-Italy", 5)]),
        );
        src.insert(
            Extract::Pledges,
            Period::Year(2017),
            pledges(&[pledge_lines("Tier 0", "Switzerland", "CH-CERN", 1.0, 1.0, 1.0)]),
        );
        // The first line is routed before the unknown site stops the ingestion.
        src.insert(
            Extract::Tier01Usage,
            Period::Month(jan()),
            preamble(vec![
                "Site,alice".to_string(),
                format!("CH-CERN,{}", 1000.0 * jan().hours()),
                "XX-NOWHERE,100".to_string(),
            ]),
        );
        let mut c = Collaboration::new(NameResolver::default()).with_clusters(vec![]);
        for _ in 0..2 {
            let err = c
                .get_used(&src, TierCategory::T0, ResourceType::Cpu, jan())
                .unwrap_err();
            assert!(matches!(err, AccountingError::UnknownSite { .. }));
            assert_eq!(c.current_month(), None);
            assert!(c.used_by_tier(TierCategory::T0, jan()).is_zero());
            let cern = c.find_member("CERN").unwrap();
            assert!(cern.used(UsageSource::Accounting, jan()).is_zero());
        }
        assert!(c.get_used_all_tiers(&src, jan()).is_err());
    }

    #[test]
    fn monitoring_series() {
        init_logs();
        let mut c = collaboration();
        let hours = jan().hours();
        // 2 lines, averaged.
        let line = |t: u32| format!("{},{},{},{},1", t, hours * 10_000.0, hours * 1_000.0, hours * 100.0);
        let (l1, l2) = (line(1), line(2));
        let cpu = csv(&["Time,CERN-AURORA,CNAF,UNAM,UNKNOWN-CE", l1.as_str(), l2.as_str()]);
        let storage = csv(&[
            "Time,ALICE::CERN::EOS,ALICE::CERN::CASTOR2,ALICE::CNAF::SE,ALICE::CNAF::TAPE,ALICE::UNAM::SE,ALICE::XX::SE",
            "1,2000000,3000000,1000000,500000,100000,100000",
            "2,2000000,3000000,1000000,500000,100000,100000",
        ]);
        let reports = MonthlyReports {
            cpu_monitoring: Some(cpu),
            storage_monitoring: Some(storage),
            ..Default::default()
        };
        assert!(c.ingest_monthly_usage(jan(), &reports).unwrap());

        let cern = c.find_member("CERN").unwrap();
        let used = cern.used(UsageSource::Monitoring, jan());
        assert!(close(used.cpu(), 4.2));
        assert!(close(used.disk(), 2.0));
        assert!(close(used.tape(), 3.0));

        let mexico = c.find_member("Mexico").unwrap();
        let used = mexico.used(UsageSource::Monitoring, jan());
        assert!(close(used.cpu(), 0.042));
        assert!(close(used.disk(), 0.1));

        assert!(close(c.used_by_tier(TierCategory::T0, jan()).disk(), 2.0));
        assert!(close(c.used_by_tier(TierCategory::T0, jan()).tape(), 3.0));
        assert!(close(c.used_by_tier(TierCategory::T1, jan()).disk(), 1.0));
        assert!(close(c.used_by_tier(TierCategory::T1, jan()).tape(), 0.5));
        // Unknown elements still count in the tier totals.
        assert!(close(c.used_by_tier(TierCategory::T2, jan()).disk(), 0.2));
        // Monitoring CPU is not a tier figure.
        assert_eq!(c.used_by_tier(TierCategory::Total, jan()).cpu(), 0.0);
    }

    #[test]
    fn storage_classification() {
        assert!(is_tape_element("ALICE::CERN::CASTOR2"));
        assert!(is_tape_element("ALICE::FZK::TAPE"));
        assert!(is_tape_element("ALICE::CERN::T0ALICE"));
        assert_eq!(storage_tier("ALICE::CERN::T0ALICE", true), TierCategory::T0);
        assert!(!is_tape_element("ALICE::FZK::SE"));
        assert_eq!(storage_tier("ALICE::CERN::EOS", false), TierCategory::T0);
        assert_eq!(storage_tier("ALICE::FZK::SE", false), TierCategory::T1);
        assert_eq!(storage_tier("ALICE::Catania::SE", false), TierCategory::T2);
        assert_eq!(storage_tier("ALICE::Catania::TAPE", true), TierCategory::T1);
    }

    #[test]
    fn months_are_cached_one_at_a_time() {
        let mut src = MemorySource::new();
        src.insert(
            Extract::Membership,
            Period::Year(2017),
            roster(&[("MS-CERN", 10), ("MS-Italy", 5)]),
        );
        src.insert(
            Extract::Pledges,
            Period::Year(2017),
            pledges(&[pledge_lines("Tier 0", "Switzerland", "CH-CERN", 1.0, 1.0, 1.0)]),
        );
        let hours = |m: Month| m.hours();
        let feb = jan().next();
        for (m, v) in [(jan(), 10.0), (feb, 20.0)] {
            src.insert(
                Extract::Tier01Usage,
                Period::Month(m),
                preamble(vec![
                    "Site,alice".to_string(),
                    format!("CH-CERN,{}", v * 1000.0 * hours(m)),
                ]),
            );
        }
        let mut c = Collaboration::new(NameResolver::default()).with_clusters(vec![]);
        let t0 = TierCategory::T0;
        let cpu = ResourceType::Cpu;
        assert!(close(c.get_used(&src, t0, cpu, jan()).unwrap(), 10.0));
        assert!(close(c.get_used(&src, t0, cpu, feb).unwrap(), 20.0));
        assert!(close(c.get_used(&src, t0, cpu, jan()).unwrap(), 10.0));
        assert_eq!(c.current_month(), Some(jan()));
        // The month has no report at all.
        let mar = feb.next();
        assert_eq!(c.get_used(&src, t0, cpu, mar).unwrap(), 0.0);
        assert!(c.get_used_all_tiers(&src, mar).unwrap().is_none());
        let all = c.get_used_all_tiers(&src, feb).unwrap().unwrap();
        assert!(close(all[&TierCategory::Total].cpu(), 20.0));
    }
}
