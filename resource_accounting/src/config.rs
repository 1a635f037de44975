// ********* Value types ***********

use std::fmt::Display;
use std::ops::{Add, AddAssign};

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

/// The units in which CPU capacities are reported by the extracts.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum CpuUnit {
    /// Raw benchmark units, as found in the pledge sheets.
    HepSpec06,
    /// The internal unit.
    KHepSpec06,
}

impl CpuUnit {
    fn divisor(self) -> f64 {
        match self {
            CpuUnit::HepSpec06 => 1e3,
            CpuUnit::KHepSpec06 => 1.0,
        }
    }
}

/// The units in which storage capacities are reported.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum StorageUnit {
    B,
    KB,
    MB,
    GB,
    TB,
    PB,
}

impl StorageUnit {
    pub const ALL: [StorageUnit; 6] = [
        StorageUnit::B,
        StorageUnit::KB,
        StorageUnit::MB,
        StorageUnit::GB,
        StorageUnit::TB,
        StorageUnit::PB,
    ];

    fn divisor(self) -> f64 {
        match self {
            StorageUnit::B => 1e15,
            StorageUnit::KB => 1e12,
            StorageUnit::MB => 1e9,
            StorageUnit::GB => 1e6,
            StorageUnit::TB => 1e3,
            StorageUnit::PB => 1.0,
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Serialize)]
pub enum ResourceType {
    Cpu,
    Disk,
    Tape,
}

impl ResourceType {
    pub const ALL: [ResourceType; 3] = [ResourceType::Cpu, ResourceType::Disk, ResourceType::Tape];
}

/// Role of a site in the grid hierarchy.
///
/// `Total` is only meaningful as a query key: it designates the sum over
/// the three real tiers (or the smoothed total for requirements).
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize)]
pub enum TierCategory {
    T0,
    T1,
    T2,
    Total,
    Unknown,
}

impl TierCategory {
    pub const REAL: [TierCategory; 3] = [TierCategory::T0, TierCategory::T1, TierCategory::T2];

    /// Parses the first cell of a pledge row ("Tier 0", "Tier 1", ...).
    pub fn from_pledge_label(label: &str) -> TierCategory {
        match label.trim().trim_matches('"') {
            "Tier 0" => TierCategory::T0,
            "Tier 1" => TierCategory::T1,
            "Tier 2" => TierCategory::T2,
            _ => TierCategory::Unknown,
        }
    }

    /// Tier-0 and Tier-1 sites pledge tape, Tier-2 sites do not.
    pub fn pledges_tape(self) -> bool {
        matches!(self, TierCategory::T0 | TierCategory::T1)
    }
}

/// The two independent systems reporting usage.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize)]
pub enum UsageSource {
    /// The accounting federation reports (Tier-0/1 and Tier-2 monthly reports).
    Accounting,
    /// The monitoring system (job CPU and storage element occupancy).
    Monitoring,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize)]
pub enum MembershipStatus {
    MemberState,
    NonMemberState,
}

impl MembershipStatus {
    pub fn tag(self) -> &'static str {
        match self {
            MembershipStatus::MemberState => "MS",
            MembershipStatus::NonMemberState => "NMS",
        }
    }
}

/// How a member participates in the reporting.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Serialize)]
pub enum MemberRole {
    /// A regular funding agency.
    Active,
    /// Absorbed by the named cluster. Hidden from payer counts, listings and lookups.
    AbsorbedInto(String),
    /// A synthetic grouping of several agencies.
    ClusterContainer,
}

/// A calendar month, the key of all usage data.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize)]
pub struct Month {
    pub year: i32,
    pub month: u32,
}

impl Month {
    pub fn new(year: i32, month: u32) -> Option<Month> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|_| Month { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Month {
        Month {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Parses `YYYY-MM`.
    pub fn parse(s: &str) -> Option<Month> {
        let (y, m) = s.trim().split_once('-')?;
        Month::new(y.parse().ok()?, m.parse().ok()?)
    }

    fn first_day(self) -> NaiveDate {
        // Constructed through `new`, always a valid date.
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn next(self) -> Month {
        if self.month == 12 {
            Month {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Month {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    pub fn days(self) -> u32 {
        let first = self.first_day();
        let next = self.next().first_day();
        next.signed_duration_since(first).num_days() as u32
    }

    pub fn hours(self) -> f64 {
        (self.days() * 24) as f64
    }

    /// The English month name, as used in report headers.
    pub fn name(self) -> String {
        self.first_day().format("%B").to_string()
    }
}

impl Display for Month {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// CPU, disk and tape magnitudes in the internal units (kHEPSPEC06, PB).
///
/// Unit conversion happens in the setters only; accumulation is done through
/// `accumulate` or `+=` on values that are already converted.
#[derive(PartialEq, Debug, Clone, Copy, Default, Serialize)]
pub struct ResourceQuantity {
    cpu: f64,
    disk: f64,
    tape: f64,
}

impl ResourceQuantity {
    pub const ZERO: ResourceQuantity = ResourceQuantity {
        cpu: 0.0,
        disk: 0.0,
        tape: 0.0,
    };

    /// Builds a quantity from values already in kHEPSPEC06 and PB.
    pub fn new(cpu: f64, disk: f64, tape: f64) -> ResourceQuantity {
        ResourceQuantity { cpu, disk, tape }
    }

    pub fn cpu(&self) -> f64 {
        self.cpu
    }

    pub fn disk(&self) -> f64 {
        self.disk
    }

    pub fn tape(&self) -> f64 {
        self.tape
    }

    pub fn get(&self, rt: ResourceType) -> f64 {
        match rt {
            ResourceType::Cpu => self.cpu,
            ResourceType::Disk => self.disk,
            ResourceType::Tape => self.tape,
        }
    }

    pub fn set_cpu(&mut self, value: f64, unit: CpuUnit) {
        self.cpu = value / unit.divisor();
    }

    pub fn set_disk(&mut self, value: f64, unit: StorageUnit) {
        self.disk = value / unit.divisor();
    }

    pub fn set_tape(&mut self, value: f64, unit: StorageUnit) {
        self.tape = value / unit.divisor();
    }

    /// Adds an already converted value to one dimension.
    pub fn accumulate(&mut self, rt: ResourceType, delta: f64) {
        match rt {
            ResourceType::Cpu => self.cpu += delta,
            ResourceType::Disk => self.disk += delta,
            ResourceType::Tape => self.tape += delta,
        }
    }

    pub fn clear(&mut self) {
        *self = ResourceQuantity::ZERO;
    }

    pub fn is_zero(&self) -> bool {
        self.cpu == 0.0 && self.disk == 0.0 && self.tape == 0.0
    }
}

impl AddAssign for ResourceQuantity {
    fn add_assign(&mut self, rhs: ResourceQuantity) {
        self.cpu += rhs.cpu;
        self.disk += rhs.disk;
        self.tape += rhs.tape;
    }
}

impl Add for ResourceQuantity {
    type Output = ResourceQuantity;
    fn add(self, rhs: ResourceQuantity) -> ResourceQuantity {
        ResourceQuantity {
            cpu: self.cpu + rhs.cpu,
            disk: self.disk + rhs.disk,
            tape: self.tape + rhs.tape,
        }
    }
}

impl std::iter::Sum for ResourceQuantity {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(ResourceQuantity::ZERO, |acc, q| acc + q)
    }
}

impl Display for ResourceQuantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CPU: {:5.2} kHEPSPEC06 - Disk: {:5.2} PB - Tape {:5.2} PB",
            self.cpu, self.disk, self.tape
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-9 * b.abs().max(1.0)
    }

    #[test]
    fn cpu_conversion() {
        let mut q = ResourceQuantity::ZERO;
        q.set_cpu(12_500.0, CpuUnit::HepSpec06);
        assert!(close(q.cpu(), 12.5));
        q.set_cpu(3.0, CpuUnit::KHepSpec06);
        assert_eq!(q.cpu(), 3.0);
    }

    #[test]
    fn storage_conversion_inverts() {
        for unit in StorageUnit::ALL {
            let mut q = ResourceQuantity::ZERO;
            q.set_disk(1234.5, unit);
            q.set_tape(1234.5, unit);
            assert!(close(q.disk() * unit.divisor(), 1234.5), "{:?}", unit);
            assert!(close(q.tape() * unit.divisor(), 1234.5), "{:?}", unit);
        }
        let mut q = ResourceQuantity::ZERO;
        q.set_disk(2500.0, StorageUnit::TB);
        assert!(close(q.disk(), 2.5));
    }

    #[test]
    fn setters_overwrite_and_accumulate_adds() {
        let mut q = ResourceQuantity::new(1.0, 2.0, 3.0);
        q.set_cpu(5.0, CpuUnit::KHepSpec06);
        assert_eq!(q.cpu(), 5.0);
        q.accumulate(ResourceType::Disk, 0.5);
        q += ResourceQuantity::new(1.0, 1.0, 1.0);
        assert_eq!(q, ResourceQuantity::new(6.0, 3.5, 4.0));
    }

    #[test]
    fn month_arithmetic() {
        let feb = Month::new(2016, 2).unwrap();
        assert_eq!(feb.days(), 29);
        assert_eq!(feb.hours(), 29.0 * 24.0);
        assert_eq!(Month::new(2017, 12).unwrap().next(), Month::new(2018, 1).unwrap());
        assert_eq!(Month::parse("2017-03"), Month::new(2017, 3));
        assert_eq!(Month::parse("2017-13"), None);
        assert_eq!(feb.name(), "February");
        assert_eq!(feb.to_string(), "2016-02");
        let d = NaiveDate::from_ymd_opt(2016, 2, 17).unwrap();
        assert_eq!(Month::from_date(d), feb);
    }
}
