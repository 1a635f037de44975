// The naming dictionary: compute and storage element names of each funding agency
// under the monitoring convention and the accounting federation convention.

use log::{debug, warn};

use crate::shape::{clean_cell, Table};
use crate::{AccountingResult, MalformedDictionarySnafu};

/// The element names that can be looked up in the dictionary.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum ElementField {
    StorageElement,
    MonitoringComputeElement,
    AccountingFederation,
}

#[derive(Eq, PartialEq, Debug, Clone)]
struct NamingEntry {
    member: String,
    storage_element: String,
    monitoring_ce: String,
    accounting_federation: String,
}

impl NamingEntry {
    fn field(&self, field: ElementField) -> &str {
        match field {
            ElementField::StorageElement => &self.storage_element,
            ElementField::MonitoringComputeElement => &self.monitoring_ce,
            ElementField::AccountingFederation => &self.accounting_federation,
        }
    }
}

/// Lookup table from a funding agency name to its element names.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct NameResolver {
    entries: Vec<NamingEntry>,
}

impl NameResolver {
    /// Loads the four-column dictionary. The first line is a header.
    ///
    /// Columns: member short name, storage element, monitoring compute element,
    /// accounting federation name.
    pub fn from_table(table: &Table) -> AccountingResult<NameResolver> {
        let mut entries: Vec<NamingEntry> = Vec::new();
        for (idx, row) in table.iter().enumerate().skip(1) {
            let lineno = idx + 1;
            if row.iter().all(|c| clean_cell(c).is_empty()) {
                continue;
            }
            if row.len() < 4 {
                return MalformedDictionarySnafu {
                    lineno,
                    content: format!("{:?}", row),
                }
                .fail();
            }
            let entry = NamingEntry {
                member: clean_cell(&row[0]),
                storage_element: clean_cell(&row[1]),
                monitoring_ce: clean_cell(&row[2]),
                accounting_federation: clean_cell(&row[3]),
            };
            if entry.member.is_empty() {
                warn!("NameResolver: line {}: no funding agency, skipped", lineno);
                continue;
            }
            entries.push(entry);
        }
        debug!("NameResolver: {} entries", entries.len());
        Ok(NameResolver { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All the non-empty `field` values of the rows of one of `members`.
    ///
    /// If `federation` is given, only the rows with this accounting federation
    /// name are considered. An empty result means that no alias is known yet.
    pub fn find(
        &self,
        members: &[&str],
        federation: Option<&str>,
        field: ElementField,
    ) -> Vec<String> {
        let mut res: Vec<String> = Vec::new();
        for e in self.entries.iter() {
            if !members.iter().any(|m| *m == e.member) {
                continue;
            }
            if let Some(fed) = federation {
                if e.accounting_federation != fed {
                    continue;
                }
            }
            let v = e.field(field);
            if !v.is_empty() && !res.iter().any(|x| x == v) {
                res.push(v.to_string());
            }
        }
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(lines: &[&str]) -> Table {
        lines
            .iter()
            .map(|l| l.split(';').map(|s| s.to_string()).collect())
            .collect()
    }

    fn resolver() -> NameResolver {
        NameResolver::from_table(&table(&[
            "FA;SE;CE ML;CE WLCG",
            "France;ALICE::CCIN2P3::SE;CCIN2P3;FR-CCIN2P3",
            "France;ALICE::GRIF_IPNO::SE;GRIF_IPNO;FR-GRIF",
            "France;;IPNL;FR-GRIF",
            "Italy;ALICE::Bari::SE;Bari;IT-INFN-T2\r\n",
        ]))
        .unwrap()
    }

    #[test]
    fn find_by_member_and_federation() {
        let r = resolver();
        assert_eq!(
            r.find(&["France"], Some("FR-GRIF"), ElementField::MonitoringComputeElement),
            vec!["GRIF_IPNO".to_string(), "IPNL".to_string()]
        );
        // Empty cells are skipped.
        assert_eq!(
            r.find(&["France"], Some("FR-GRIF"), ElementField::StorageElement),
            vec!["ALICE::GRIF_IPNO::SE".to_string()]
        );
        assert_eq!(
            r.find(&["Italy"], None, ElementField::AccountingFederation),
            vec!["IT-INFN-T2".to_string()]
        );
    }

    #[test]
    fn unknown_member_gives_nothing() {
        let r = resolver();
        assert!(r
            .find(&["Spain"], None, ElementField::StorageElement)
            .is_empty());
        assert!(r
            .find(&["France"], Some("FR-NONE"), ElementField::StorageElement)
            .is_empty());
    }

    #[test]
    fn short_rows_are_rejected() {
        let err = NameResolver::from_table(&table(&["h;h;h;h", "France;SE"])).unwrap_err();
        assert!(err.is_fatal());
    }
}
