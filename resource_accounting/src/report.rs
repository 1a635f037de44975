/*!
The figures shown to the collaboration: one row per visible member, a
totals row, optional monthly usage columns, and multi-month summaries.

Every percentage goes through [`ratio`], which yields 0 when the
denominator is 0.
*/

use log::debug;
use serde::Serialize;

use crate::config::*;
use crate::{AccountingResult, Collaboration, ExtractSource, HOST_LAB};

/// Variances below this value (in %) are shortfalls.
pub const SHORTFALL_THRESHOLD_PCT: f64 = -20.0;

/// `num / den`, or 0 if `den` is 0.
pub fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

/// `100 * (pledged - required) / required`, or 0 without requirement.
pub fn variance_pct(pledged: f64, required: f64) -> f64 {
    100.0 * ratio(pledged - required, required)
}

pub fn is_shortfall(variance_pct: f64) -> bool {
    variance_pct < SHORTFALL_THRESHOLD_PCT
}

/// Pledged vs. required, per dimension, in %.
#[derive(PartialEq, Debug, Clone, Copy, Default, Serialize)]
pub struct Variance {
    pub cpu: f64,
    pub disk: f64,
    pub tape: f64,
}

impl Variance {
    pub fn between(pledged: ResourceQuantity, required: ResourceQuantity) -> Variance {
        Variance {
            cpu: variance_pct(pledged.cpu(), required.cpu()),
            disk: variance_pct(pledged.disk(), required.disk()),
            tape: variance_pct(pledged.tape(), required.tape()),
        }
    }

    pub fn get(&self, rt: ResourceType) -> f64 {
        match rt {
            ResourceType::Cpu => self.cpu,
            ResourceType::Disk => self.disk,
            ResourceType::Tape => self.tape,
        }
    }

    pub fn shortfalls(&self) -> Vec<ResourceType> {
        ResourceType::ALL
            .iter()
            .copied()
            .filter(|rt| is_shortfall(self.get(*rt)))
            .collect()
    }
}

#[derive(PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberRow {
    pub name: String,
    pub status: String,
    pub payers: u32,
    /// None for the host lab, which is not apportioned.
    pub contribution_pct: Option<f64>,
    pub required: ResourceQuantity,
    pub pledged: ResourceQuantity,
    pub variance: Variance,
}

#[derive(PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalsRow {
    pub payers: u32,
    pub required: ResourceQuantity,
    pub pledged: ResourceQuantity,
    pub variance: Variance,
}

/// The usage of one member for one month, as seen by both systems.
#[derive(PartialEq, Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberUsage {
    pub accounting_cpu: f64,
    pub monitoring_cpu: f64,
    pub monitoring_disk: f64,
    pub monitoring_tape: f64,
}

impl std::ops::AddAssign for MemberUsage {
    fn add_assign(&mut self, other: MemberUsage) {
        self.accounting_cpu += other.accounting_cpu;
        self.monitoring_cpu += other.monitoring_cpu;
        self.monitoring_disk += other.monitoring_disk;
        self.monitoring_tape += other.monitoring_tape;
    }
}

/// Usage columns aligned with `list_members`.
#[derive(PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageColumns {
    pub month: Month,
    pub rows: Vec<MemberUsage>,
    pub total: MemberUsage,
}

#[derive(PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearSummary {
    pub year: i32,
    pub pledged: f64,
    pub required: f64,
    /// None if no month of the year had usage data.
    pub used: Option<f64>,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize)]
pub enum RatioBasis {
    Pledged,
    Required,
}

#[derive(PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayerProfile {
    pub year: i32,
    pub payers: u32,
    /// Tier-1 + Tier-2 CPU requirement per payer, in HEPSPEC06.
    pub cpu_per_payer: f64,
}

impl Collaboration {
    /// The visible members in roster order, clusters last.
    pub fn list_members(&self) -> Vec<MemberRow> {
        self.visible_members()
            .map(|m| MemberRow {
                name: m.name().to_string(),
                status: m.status().tag().to_string(),
                payers: m.payers(),
                contribution_pct: if m.name() == HOST_LAB {
                    None
                } else {
                    Some(m.contribution_pct())
                },
                required: m.required(),
                pledged: m.pledged(),
                variance: Variance::between(m.pledged(), m.required()),
            })
            .collect()
    }

    pub fn totals(&self) -> TotalsRow {
        let sum = |f: &dyn Fn(TierCategory) -> ResourceQuantity| -> ResourceQuantity {
            TierCategory::REAL.iter().map(|t| f(*t)).sum()
        };
        let required = sum(&|t| self.required_by_tier(t));
        let pledged = sum(&|t| self.pledged_by_tier(t));
        TotalsRow {
            payers: self.count_payers(),
            required,
            pledged,
            variance: Variance::between(pledged, required),
        }
    }

    /// The usage of `month` as currently loaded, aligned with `list_members`.
    pub fn usage_columns(&self, month: Month) -> UsageColumns {
        let rows: Vec<MemberUsage> = self
            .visible_members()
            .map(|m| {
                let acc = m.used(UsageSource::Accounting, month);
                let mon = m.used(UsageSource::Monitoring, month);
                MemberUsage {
                    accounting_cpu: acc.cpu(),
                    monitoring_cpu: mon.cpu(),
                    monitoring_disk: mon.disk(),
                    monitoring_tape: mon.tape(),
                }
            })
            .collect();
        let mut total = MemberUsage::default();
        for r in rows.iter() {
            total += *r;
        }
        UsageColumns { month, rows, total }
    }

    /// Pledged, required and used totals for every year between `from` and `to`.
    ///
    /// CPU usage is the mean over the months with data. Disk and tape usage
    /// is the peak month.
    pub fn usage_summary(
        &mut self,
        src: &dyn ExtractSource,
        from: Month,
        to: Month,
        rt: ResourceType,
    ) -> AccountingResult<Vec<YearSummary>> {
        let mut res = Vec::new();
        for year in from.year..=to.year {
            let pledged = self.get_pledged(src, TierCategory::Total, rt, year)?;
            let required = self.get_required(src, TierCategory::Total, rt, year)?;
            let mut samples: Vec<f64> = Vec::new();
            let mut month = if year == from.year {
                from
            } else {
                Month { year, month: 1 }
            };
            while month.year == year && month <= to {
                if self.ensure_month(src, month)? {
                    samples.push(self.used_by_tier(TierCategory::Total, month).get(rt));
                }
                month = month.next();
            }
            let used = if samples.is_empty() {
                None
            } else if rt == ResourceType::Cpu {
                Some(samples.iter().sum::<f64>() / samples.len() as f64)
            } else {
                samples.iter().copied().reduce(f64::max)
            };
            debug!(
                "usage_summary: {}: pledged {} required {} used {:?}",
                year, pledged, required, used
            );
            res.push(YearSummary {
                year,
                pledged,
                required,
                used,
            });
        }
        Ok(res)
    }

    /// Usage of `month` in % of the pledge or of the requirement of its year.
    pub fn usage_ratio(
        &mut self,
        src: &dyn ExtractSource,
        tier: TierCategory,
        rt: ResourceType,
        month: Month,
        basis: RatioBasis,
    ) -> AccountingResult<f64> {
        let used = self.get_used(src, tier, rt, month)?;
        let reference = match basis {
            RatioBasis::Pledged => self.get_pledged(src, tier, rt, month.year)?,
            RatioBasis::Required => self.get_required(src, tier, rt, month.year)?,
        };
        Ok(100.0 * ratio(used, reference))
    }

    pub fn payer_profile(&mut self, src: &dyn ExtractSource, year: i32) -> AccountingResult<PayerProfile> {
        self.ensure_year(src, year)?;
        let payers = self.count_payers();
        let cpu = self.required_by_tier(TierCategory::T1).cpu() + self.required_by_tier(TierCategory::T2).cpu();
        Ok(PayerProfile {
            year,
            payers,
            cpu_per_payer: ratio(cpu * 1000.0, payers as f64),
        })
    }
}
