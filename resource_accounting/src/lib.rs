/*!
Reconciliation of the computing resources of a scientific collaboration.

The collaboration is made of funding agencies ([`Member`]) that own computing
sites ([`Site`]) organized in tiers. This crate ingests the tabular extracts
describing the collaboration (membership roster, pledge sheet, requirement
table, monthly accounting and monitoring reports), apportions the
collaboration-wide requirements between the members, and exposes the
aggregates used to compare pledged, required and used resources.

The crate never performs I/O: extracts are handed over as tables of strings,
either directly to the `ingest_*` functions or through an [`ExtractSource`].

See the [`manual`] for the expected shape of every extract.
*/

mod config;
pub mod manual;
mod member;
mod naming;
pub mod report;
mod shape;
mod site;
mod usage;

use log::{debug, info, warn};
use snafu::{prelude::*, Snafu};
use std::collections::{BTreeMap, HashMap};

pub use crate::config::*;
pub use crate::member::Member;
pub use crate::naming::{ElementField, NameResolver};
pub use crate::shape::{clean_cell, parse_number, RecordShape, Table};
pub use crate::site::Site;
pub use crate::usage::MonthlyReports;

/// Errors raised when an extract does not have the shape it is assumed to have.
///
/// Except for [`AccountingError::NoMembership`], they all mean that the format
/// of an extract changed upstream: any figure computed past this point would
/// be wrong, and the processing must stop.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AccountingError {
    #[snafu(display(
        "{extract}: line {lineno}: unit {found:?} where {expected:?} is expected, revise the extract format"
    ))]
    UnexpectedUnit {
        extract: String,
        lineno: usize,
        found: String,
        expected: String,
    },
    #[snafu(display("{extract}: no column {column:?} in the header"))]
    MissingColumn { extract: String, column: String },
    #[snafu(display("{extract}: line {lineno} has no column {column}"))]
    RowTooShort {
        extract: String,
        lineno: usize,
        column: usize,
    },
    #[snafu(display("{extract}: the record starting at line {lineno} is incomplete"))]
    TruncatedRecord { extract: String, lineno: usize },
    #[snafu(display("{extract}: line {lineno}: not a number: {content:?}"))]
    BadNumber {
        extract: String,
        lineno: usize,
        content: String,
    },
    #[snafu(display("{extract}: site {site} does not belong to any funding agency"))]
    UnknownSite { extract: String, site: String },
    #[snafu(display("naming dictionary: line {lineno} is malformed: {content}"))]
    MalformedDictionary { lineno: usize, content: String },
    #[snafu(display("{extract}: could not read the extract"))]
    ExtractUnreadable {
        extract: String,
        source: Box<dyn std::error::Error>,
    },
    #[snafu(display("{operation}: no membership roster has been ingested"))]
    NoMembership { operation: String },
}

impl AccountingError {
    pub fn is_fatal(&self) -> bool {
        !matches!(self, AccountingError::NoMembership { .. })
    }
}

pub type AccountingResult<T> = Result<T, AccountingError>;

// ******** Extract sources *********

/// The extracts consumed by the collaboration.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum Extract {
    Membership,
    Pledges,
    Requirements,
    Tier01Usage,
    Tier2Usage,
    CpuMonitoring,
    StorageMonitoring,
}

impl Extract {
    pub fn label(self) -> &'static str {
        match self {
            Extract::Membership => "membership roster",
            Extract::Pledges => "pledge sheet",
            Extract::Requirements => "requirements",
            Extract::Tier01Usage => "Tier-0/1 accounting report",
            Extract::Tier2Usage => "Tier-2 accounting report",
            Extract::CpuMonitoring => "monitoring CPU usage",
            Extract::StorageMonitoring => "monitoring storage usage",
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum Period {
    Year(i32),
    Month(Month),
}

/// Provides the extracts already fetched from the remote portals.
///
/// `Ok(None)` means that the extract is not available for this period.
pub trait ExtractSource {
    fn fetch(
        &self,
        extract: Extract,
        period: Period,
    ) -> Result<Option<Table>, Box<dyn std::error::Error>>;
}

/// An in-memory source, mostly useful for tests and for callers that already
/// hold every table.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    tables: HashMap<(Extract, Period), Table>,
}

impl MemorySource {
    pub fn new() -> MemorySource {
        MemorySource::default()
    }

    pub fn insert(&mut self, extract: Extract, period: Period, table: Table) {
        self.tables.insert((extract, period), table);
    }
}

impl ExtractSource for MemorySource {
    fn fetch(
        &self,
        extract: Extract,
        period: Period,
    ) -> Result<Option<Table>, Box<dyn std::error::Error>> {
        Ok(self.tables.get(&(extract, period)).cloned())
    }
}

pub(crate) fn fetch(
    src: &dyn ExtractSource,
    extract: Extract,
    period: Period,
) -> AccountingResult<Option<Table>> {
    src.fetch(extract, period).context(ExtractUnreadableSnafu {
        extract: extract.label(),
    })
}

// ******** Clusters *********

/// A hand-maintained grouping of agencies reported under a single name.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ClusterDefinition {
    pub name: String,
    pub status: MembershipStatus,
    pub constituents: Vec<String>,
}

impl ClusterDefinition {
    pub fn new(name: &str, status: MembershipStatus, constituents: &[&str]) -> ClusterDefinition {
        ClusterDefinition {
            name: name.to_string(),
            status,
            constituents: constituents.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// The country groupings in use by the collaboration.
pub fn default_clusters() -> Vec<ClusterDefinition> {
    use MembershipStatus::*;
    vec![
        ClusterDefinition::new("Brazil", NonMemberState, &["Brazil", "Brazil UFRGS"]),
        ClusterDefinition::new("France", MemberState, &["France-CEA", "France-IN2P3/CNRS"]),
        ClusterDefinition::new("Germany", MemberState, &["Germany-BMBF", "Germany-GSI"]),
        ClusterDefinition::new("Italy", MemberState, &["Italy-Centro Fermi", "Italy-INFN"]),
        ClusterDefinition::new(
            "Japan",
            NonMemberState,
            &["Japan Nagasaki", "Japan-MEXT", "Japan RIKEN"],
        ),
        ClusterDefinition::new("Nordic", MemberState, &["Denmark", "Finland", "Norway"]),
        ClusterDefinition::new(
            "Republic of Korea",
            MemberState,
            &["Rep. Korea-KISTI", "Rep. Korea-NRF"],
        ),
        ClusterDefinition::new("Romania", MemberState, &["Romania-ISS", "Romania-NIPNE"]),
        ClusterDefinition::new(
            "Thailand",
            NonMemberState,
            &["Thailand-KMUTT", "Thailand-SUT", "Thailand-TMEC"],
        ),
        ClusterDefinition::new("USA", NonMemberState, &["USA-DOENP", "USA-NSF"]),
    ]
}

// ******** Extract format constants *********

/// The host laboratory. It operates the Tier-0 and is not apportioned a share.
pub const HOST_LAB: &str = "CERN";

/// Country spellings of the external reports that differ from the roster names.
pub const COUNTRY_ALIASES: [(&str, &str); 4] = [
    ("Switzerland", HOST_LAB),
    ("Russian Federation", "Russia"),
    ("UK", "UnitedKingdom-STFC"),
    ("Latin America", "Brazil"),
];

const ROSTER_AGENCY_HEADER: &str = "Funding Agency";
const PLEDGE_VO_HEADER: &str = "ALICE";
const PLEDGE_TIER_COL: usize = 0;
const PLEDGE_COUNTRY_COL: usize = 1;
const PLEDGE_SITE_COL: usize = 2;
// Free text starts at this column in the pledge sheet.
const PLEDGE_DRIFT_COL: usize = 3;
const PLEDGE_UNIT_COL: usize = 4;
const PLEDGE_CPU_UNIT: &str = "HEP-SPEC06";
const PLEDGE_STORAGE_UNIT: &str = "Tbytes";

// ******** The collaboration *********

/// The whole collaboration for one year: members, their sites, and the
/// per-tier aggregates.
///
/// The member list is rebuilt from scratch for every roster. Queries taking
/// an [`ExtractSource`] reload the year or the month they need when it is not
/// the one currently loaded.
#[derive(Debug, Clone)]
pub struct Collaboration {
    naming: NameResolver,
    clusters: Vec<ClusterDefinition>,
    members: Vec<Member>,
    pledged_by_tier: BTreeMap<TierCategory, ResourceQuantity>,
    required_by_tier: BTreeMap<TierCategory, ResourceQuantity>,
    used_by_tier: BTreeMap<(TierCategory, Month), ResourceQuantity>,
    // The last year for which a roster was requested, and whether it existed.
    current_year: Option<(i32, bool)>,
    // The last month for which usage was requested, and whether any report existed.
    current_month: Option<(Month, bool)>,
}

impl Collaboration {
    pub fn new(naming: NameResolver) -> Collaboration {
        Collaboration {
            naming,
            clusters: default_clusters(),
            members: Vec::new(),
            pledged_by_tier: BTreeMap::new(),
            required_by_tier: BTreeMap::new(),
            used_by_tier: BTreeMap::new(),
            current_year: None,
            current_month: None,
        }
    }

    /// Replaces the country groupings applied by `organize_clusters`.
    pub fn with_clusters(mut self, clusters: Vec<ClusterDefinition>) -> Collaboration {
        self.clusters = clusters;
        self
    }

    pub fn naming(&self) -> &NameResolver {
        &self.naming
    }

    /// All the members, including the hidden ones.
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn visible_members(&self) -> impl Iterator<Item = &Member> {
        self.members.iter().filter(|m| !m.is_hidden())
    }

    pub fn current_year(&self) -> Option<i32> {
        self.current_year.map(|(y, _)| y)
    }

    pub fn current_month(&self) -> Option<Month> {
        self.current_month.map(|(m, _)| m)
    }

    /// Finds a visible member from a name found in an external report.
    ///
    /// Known country spellings are translated first. An exact match wins over
    /// a member whose name contains the searched name.
    pub fn find_member(&self, name: &str) -> Option<&Member> {
        self.find_member_index(name).map(|idx| &self.members[idx])
    }

    pub fn find_member_mut(&mut self, name: &str) -> Option<&mut Member> {
        let idx = self.find_member_index(name)?;
        self.members.get_mut(idx)
    }

    fn find_member_index(&self, name: &str) -> Option<usize> {
        let name = COUNTRY_ALIASES
            .iter()
            .find(|(from, _)| *from == name)
            .map(|(_, to)| *to)
            .unwrap_or(name);
        let visible = |m: &&Member| !m.is_hidden();
        let res = self
            .members
            .iter()
            .position(|m| visible(&m) && m.name() == name)
            .or_else(|| {
                self.members
                    .iter()
                    .position(|m| visible(&m) && m.name().contains(name))
            });
        if res.is_none() {
            debug!("find_member: {} not found", name);
        }
        res
    }

    /// Any member, hidden or not, with exactly this name.
    pub fn member_by_exact_name(&self, name: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.name() == name)
    }

    /// The site known under `name` (accounting name or bound alias) among the visible members.
    pub fn find_site(&self, name: &str) -> Option<&Site> {
        self.visible_members().find_map(|m| m.find_site(name))
    }

    /// The site monitored under the compute element `ce`.
    pub fn site_by_compute_element(&self, ce: &str) -> Option<&Site> {
        self.visible_members()
            .flat_map(|m| m.sites().iter())
            .find(|s| s.find_compute_alias(ce))
    }

    /// Total number of payers of the visible members, host lab included.
    pub fn count_payers(&self) -> u32 {
        self.visible_members().map(|m| m.payers()).sum()
    }

    /// Payers of the visible members operating a Tier-1.
    pub fn count_tier1_payers(&self) -> u32 {
        self.visible_members()
            .filter(|m| m.has_tier1_presence())
            .map(|m| m.payers())
            .sum()
    }

    pub fn pledged_by_tier(&self, tier: TierCategory) -> ResourceQuantity {
        self.pledged_by_tier.get(&tier).copied().unwrap_or_default()
    }

    pub fn required_by_tier(&self, tier: TierCategory) -> ResourceQuantity {
        self.required_by_tier.get(&tier).copied().unwrap_or_default()
    }

    pub fn used_by_tier(&self, tier: TierCategory, month: Month) -> ResourceQuantity {
        self.used_by_tier.get(&(tier, month)).copied().unwrap_or_default()
    }

    // ******** Roster *********

    /// Rebuilds the member list from the membership roster of `year`.
    ///
    /// Every data row is one payer. The agency cell reads `MS-<name>` or
    /// `NMS-<name>`. All previous members and aggregates are dropped.
    pub fn ingest_membership(&mut self, year: i32, table: &Table) -> AccountingResult<bool> {
        let extract = Extract::Membership.label();
        info!("ingest_membership: year {}", year);
        self.clear();
        self.current_year = Some((year, false));

        let header = match table.first() {
            Some(h) => h,
            None => {
                warn!("ingest_membership: {} is empty for {}", extract, year);
                return Ok(false);
            }
        };
        let agency_lookup = RecordShape::new(extract, header, 0);
        let fa_col = agency_lookup.column(ROSTER_AGENCY_HEADER)?;
        // The institute name, left of the agency, may hold unescaped commas.
        let shape = RecordShape::new(extract, header, fa_col);

        // Sorted by the encoded agency, as the roster tool lists them.
        let mut payers: BTreeMap<String, u32> = BTreeMap::new();
        for (idx, row) in table.iter().enumerate().skip(1) {
            let lineno = idx + 1;
            if row.iter().all(|c| clean_cell(c).is_empty()) {
                continue;
            }
            let agency = shape.get(row, fa_col, lineno)?;
            if agency.is_empty() {
                warn!("ingest_membership: line {}: no funding agency", lineno);
                continue;
            }
            *payers.entry(agency).or_insert(0) += 1;
        }

        for (agency, count) in payers.iter() {
            let (status, name) = match agency.split_once('-') {
                Some(("MS", name)) => (MembershipStatus::MemberState, name),
                Some((_, name)) => (MembershipStatus::NonMemberState, name),
                None => (MembershipStatus::NonMemberState, agency.as_str()),
            };
            debug!("ingest_membership: {} {:?} {} payers", name, status, count);
            self.members.push(Member::new(name, status, *count));
        }
        info!(
            "ingest_membership: {} funding agencies, {} payers",
            self.members.len(),
            self.count_payers()
        );
        self.current_year = Some((year, true));
        Ok(true)
    }

    fn clear(&mut self) {
        self.members.clear();
        self.pledged_by_tier.clear();
        self.required_by_tier.clear();
        self.used_by_tier.clear();
        self.current_month = None;
    }

    /// Groups the agencies of each cluster definition under one member.
    ///
    /// A constituent that cannot be found is reported and skipped.
    pub fn organize_clusters(&mut self) {
        let clusters = self.clusters.clone();
        for def in clusters.iter() {
            let mut cluster = Member::cluster(&def.name, def.status);
            for name in def.constituents.iter() {
                let found = self
                    .members
                    .iter_mut()
                    .find(|m| m.role() == &MemberRole::Active && m.name() == name);
                match found {
                    Some(m) => cluster.absorb(m),
                    None => warn!(
                        "organize_clusters: {}: funding agency {} not found",
                        def.name, name
                    ),
                }
            }
            if cluster.constituents().is_empty() {
                warn!("organize_clusters: {}: no constituent found, dropped", def.name);
                continue;
            }
            debug!(
                "organize_clusters: {} groups {:?}",
                def.name,
                cluster.constituents()
            );
            self.members.push(cluster);
        }
    }

    // ******** Pledges *********

    /// Attaches the pledged sites to the members and sums the per-tier pledges.
    ///
    /// A site occupies three physical lines (CPU, disk, and tape for
    /// Tier-0/1 only). Only the sites pledging to the collaboration are kept.
    pub fn ingest_pledges(&mut self, year: i32, table: &Table) -> AccountingResult<bool> {
        let extract = Extract::Pledges.label();
        info!("ingest_pledges: year {}", year);
        if self.members.is_empty() {
            return NoMembershipSnafu {
                operation: "ingest_pledges",
            }
            .fail();
        }
        self.pledged_by_tier.clear();

        let header = match table.first() {
            Some(h) => h,
            None => {
                warn!("ingest_pledges: {} is empty for {}", extract, year);
                return Ok(false);
            }
        };
        let shape = RecordShape::new(extract, header, PLEDGE_DRIFT_COL);
        let vo_col = shape.column(PLEDGE_VO_HEADER)?;

        let mut idx = 1;
        while idx < table.len() {
            let row = &table[idx];
            let lineno = idx + 1;
            idx += 1;
            if row.iter().all(|c| clean_cell(c).is_empty()) {
                continue;
            }
            let cpu_cell = shape.get(row, vo_col, lineno)?;
            let cpu = parse_number(&cpu_cell).context(BadNumberSnafu {
                extract,
                lineno,
                content: cpu_cell.clone(),
            })?;
            if cpu == 0.0 {
                continue;
            }
            let category = TierCategory::from_pledge_label(&shape.get(row, PLEDGE_TIER_COL, lineno)?);
            let country = shape.get(row, PLEDGE_COUNTRY_COL, lineno)?;
            let site_name = shape.get(row, PLEDGE_SITE_COL, lineno)?;
            check_unit(&shape, row, lineno, PLEDGE_CPU_UNIT)?;

            let mut pledged = ResourceQuantity::ZERO;
            pledged.set_cpu(cpu, CpuUnit::HepSpec06);

            let disk_row = table.get(idx).context(TruncatedRecordSnafu { extract, lineno })?;
            pledged.set_disk(
                read_pledge_value(&shape, disk_row, idx + 1, vo_col)?,
                StorageUnit::TB,
            );
            idx += 1;

            if category.pledges_tape() {
                let tape_row = table.get(idx).context(TruncatedRecordSnafu { extract, lineno })?;
                pledged.set_tape(
                    read_pledge_value(&shape, tape_row, idx + 1, vo_col)?,
                    StorageUnit::TB,
                );
                idx += 1;
            }

            if category == TierCategory::Unknown {
                warn!(
                    "ingest_pledges: line {}: tier category of {} not recognized, site skipped",
                    lineno, site_name
                );
                continue;
            }
            *self.pledged_by_tier.entry(category).or_default() += pledged;

            let member_idx = match self.find_member_index(&country) {
                Some(i) => i,
                None => {
                    warn!(
                        "ingest_pledges: line {}: funding agency {} of {} not found, site skipped",
                        lineno, country, site_name
                    );
                    continue;
                }
            };
            let mut site = Site::new(&site_name, category, pledged);
            {
                let names = self.members[member_idx].lookup_names();
                site.add_monitoring_ces(&self.naming.find(
                    &names,
                    Some(&site_name),
                    ElementField::MonitoringComputeElement,
                ));
                site.add_storage_elements(&self.naming.find(
                    &names,
                    Some(&site_name),
                    ElementField::StorageElement,
                ));
            }
            debug!(
                "ingest_pledges: {} -> {}: {}",
                site_name,
                self.members[member_idx].name(),
                pledged
            );
            self.members[member_idx].attach_site(site);
        }

        self.register_unpledged_sites();

        let total: ResourceQuantity = TierCategory::REAL
            .iter()
            .map(|t| self.pledged_by_tier(*t))
            .sum();
        self.pledged_by_tier.insert(TierCategory::Total, total);
        info!("ingest_pledges: total pledged {}", total);
        Ok(true)
    }

    /// Gives a home to every monitoring element of the members without any pledge.
    fn register_unpledged_sites(&mut self) {
        for m in self.members.iter_mut() {
            if m.is_hidden() || m.has_sites() {
                continue;
            }
            let names = m.lookup_names();
            let ces = self
                .naming
                .find(&names, None, ElementField::MonitoringComputeElement);
            let ses = self.naming.find(&names, None, ElementField::StorageElement);
            for ce in ces.iter() {
                let mut site = Site::new(ce, TierCategory::T2, ResourceQuantity::ZERO);
                site.add_monitoring_ce(ce);
                for se in ses.iter().filter(|se| se.contains(ce.as_str())) {
                    site.add_storage_element(se);
                }
                debug!("register_unpledged_sites: {} gets {}", m.name(), ce);
                m.attach_site(site);
            }
        }
    }

    // ******** Requirements *********

    /// Reads the per-tier requirements and apportions them between the members.
    ///
    /// Rows: `T0`, `T1`, `T2` and optionally `Total smooth`. Columns are found
    /// by the `CPU`, `Disk` and `Tape` headers. Values are already in
    /// kHEPSPEC06 and PB.
    pub fn ingest_requirements(&mut self, year: i32, table: &Table) -> AccountingResult<bool> {
        let extract = Extract::Requirements.label();
        info!("ingest_requirements: year {}", year);
        self.required_by_tier.clear();

        let header = match table.first() {
            Some(h) => h,
            None => {
                warn!("ingest_requirements: {} is empty for {}", extract, year);
                return Ok(false);
            }
        };
        let shape = RecordShape::new(extract, header, usize::MAX);
        let cpu_col = shape.column_containing("CPU")?;
        let disk_col = shape.column_containing("Disk")?;
        let tape_col = shape.column_containing("Tape")?;

        let mut smoothed: Option<ResourceQuantity> = None;
        for (idx, row) in table.iter().enumerate().skip(1) {
            let lineno = idx + 1;
            let label = match row.first() {
                Some(c) => clean_cell(c),
                None => continue,
            };
            let tier = match label.as_str() {
                "T0" => TierCategory::T0,
                "T1" => TierCategory::T1,
                "T2" => TierCategory::T2,
                "Total smooth" => TierCategory::Total,
                _ => continue,
            };
            let mut values = [0.0; 3];
            for (v, col) in values.iter_mut().zip([cpu_col, disk_col, tape_col]) {
                let cell = shape.get(row, col, lineno)?;
                *v = parse_number(&cell).context(BadNumberSnafu {
                    extract,
                    lineno,
                    content: cell.clone(),
                })?;
            }
            let q = ResourceQuantity::new(values[0], values[1], values[2]);
            debug!("ingest_requirements: {:?}: {}", tier, q);
            if tier == TierCategory::Total {
                smoothed = Some(q);
            } else {
                self.required_by_tier.insert(tier, q);
            }
        }
        let total = smoothed.unwrap_or_else(|| {
            TierCategory::REAL
                .iter()
                .map(|t| self.required_by_tier(*t))
                .sum()
        });
        self.required_by_tier.insert(TierCategory::Total, total);

        self.apportion();
        Ok(true)
    }

    /// Splits the Tier-1 + Tier-2 requirements between the members in
    /// proportion to their payers.
    ///
    /// The host lab owes the Tier-0 requirement and its payers are left out
    /// of the denominator. Absorbed members owe nothing. Tape is only shared
    /// between the members operating a Tier-1.
    pub fn apportion(&mut self) {
        let all_payers = self.count_payers();
        if all_payers == 0 {
            debug!("apportion: no payers, nothing to apportion");
            return;
        }
        let host_payers = self
            .members
            .iter()
            .find(|m| !m.is_hidden() && m.name() == HOST_LAB)
            .map(|m| m.payers())
            .unwrap_or(0);
        let norm = all_payers - host_payers;
        let norm_tape = self.count_tier1_payers();
        debug!("apportion: norm {} norm_tape {}", norm, norm_tape);

        let t0 = self.required_by_tier(TierCategory::T0);
        let t1 = self.required_by_tier(TierCategory::T1);
        let t2 = self.required_by_tier(TierCategory::T2);

        for m in self.members.iter_mut() {
            let required = if m.is_hidden() {
                ResourceQuantity::ZERO
            } else if m.name() == HOST_LAB {
                t0
            } else {
                let share = report::ratio(m.payers() as f64, norm as f64);
                let tape_share = if m.has_tier1_presence() {
                    report::ratio(m.payers() as f64, norm_tape as f64)
                } else {
                    0.0
                };
                m.set_contribution(share * 100.0);
                m.set_contribution_tape_share(tape_share * 100.0);
                ResourceQuantity::new(
                    (t1.cpu() + t2.cpu()) * share,
                    (t1.disk() + t2.disk()) * share,
                    (t1.tape() + t2.tape()) * tape_share,
                )
            };
            m.set_required(required);
        }
    }

    // ******** Cached loading *********

    /// Loads roster, clusters, pledges and requirements of `year` from `src`.
    ///
    /// Returns `Ok(false)` if there is no roster for this year. On error, the
    /// collaboration is left empty and no year is considered loaded.
    pub fn load_year(&mut self, src: &dyn ExtractSource, year: i32) -> AccountingResult<bool> {
        let res = self.read_year(src, year);
        if let Err(e) = &res {
            warn!("load_year: {} discarded: {}", year, e);
            self.clear();
            self.current_year = None;
        }
        res
    }

    fn read_year(&mut self, src: &dyn ExtractSource, year: i32) -> AccountingResult<bool> {
        let period = Period::Year(year);
        let roster = match fetch(src, Extract::Membership, period)? {
            Some(t) => t,
            None => {
                warn!("load_year: no membership roster for {}", year);
                self.clear();
                self.current_year = Some((year, false));
                return Ok(false);
            }
        };
        if !self.ingest_membership(year, &roster)? {
            return Ok(false);
        }
        self.organize_clusters();
        match fetch(src, Extract::Pledges, period)? {
            Some(t) => {
                self.ingest_pledges(year, &t)?;
            }
            None => warn!("load_year: no pledges for {}", year),
        }
        match fetch(src, Extract::Requirements, period)? {
            Some(t) => {
                self.ingest_requirements(year, &t)?;
            }
            None => warn!("load_year: no requirements for {}", year),
        }
        Ok(true)
    }

    /// Loads `year` unless it is the year currently loaded.
    pub fn ensure_year(&mut self, src: &dyn ExtractSource, year: i32) -> AccountingResult<bool> {
        match self.current_year {
            Some((y, available)) if y == year => Ok(available),
            _ => self.load_year(src, year),
        }
    }

    /// Loads the usage of `month` (and its year) unless it is already loaded.
    pub fn ensure_month(&mut self, src: &dyn ExtractSource, month: Month) -> AccountingResult<bool> {
        if let (Some((y, _)), Some((m, available))) = (self.current_year, self.current_month) {
            if y == month.year && m == month {
                return Ok(available);
            }
        }
        if !self.ensure_year(src, month.year)? {
            self.current_month = Some((month, false));
            return Ok(false);
        }
        let reports = MonthlyReports::fetch(src, month)?;
        self.ingest_monthly_usage(month, &reports)
    }

    // ******** Queries *********

    pub fn get_pledged(
        &mut self,
        src: &dyn ExtractSource,
        tier: TierCategory,
        rt: ResourceType,
        year: i32,
    ) -> AccountingResult<f64> {
        self.ensure_year(src, year)?;
        Ok(self.pledged_by_tier(tier).get(rt))
    }

    pub fn get_required(
        &mut self,
        src: &dyn ExtractSource,
        tier: TierCategory,
        rt: ResourceType,
        year: i32,
    ) -> AccountingResult<f64> {
        self.ensure_year(src, year)?;
        Ok(self.required_by_tier(tier).get(rt))
    }

    pub fn get_used(
        &mut self,
        src: &dyn ExtractSource,
        tier: TierCategory,
        rt: ResourceType,
        month: Month,
    ) -> AccountingResult<f64> {
        self.ensure_month(src, month)?;
        Ok(self.used_by_tier(tier, month).get(rt))
    }

    /// Usage of every tier for one month, loading the month once.
    pub fn get_used_all_tiers(
        &mut self,
        src: &dyn ExtractSource,
        month: Month,
    ) -> AccountingResult<Option<BTreeMap<TierCategory, ResourceQuantity>>> {
        if !self.ensure_month(src, month)? {
            return Ok(None);
        }
        let res = [
            TierCategory::T0,
            TierCategory::T1,
            TierCategory::T2,
            TierCategory::Total,
        ]
        .iter()
        .map(|t| (*t, self.used_by_tier(*t, month)))
        .collect();
        Ok(Some(res))
    }
}

fn check_unit(shape: &RecordShape, row: &[String], lineno: usize, expected: &str) -> AccountingResult<()> {
    let found = shape.get(row, PLEDGE_UNIT_COL, lineno)?;
    ensure!(
        found == expected,
        UnexpectedUnitSnafu {
            extract: Extract::Pledges.label(),
            lineno,
            found,
            expected,
        }
    );
    Ok(())
}

fn read_pledge_value(
    shape: &RecordShape,
    row: &[String],
    lineno: usize,
    vo_col: usize,
) -> AccountingResult<f64> {
    check_unit(shape, row, lineno, PLEDGE_STORAGE_UNIT)?;
    let cell = shape.get(row, vo_col, lineno)?;
    parse_number(&cell).context(BadNumberSnafu {
        extract: Extract::Pledges.label(),
        lineno,
        content: cell.clone(),
    })
}
