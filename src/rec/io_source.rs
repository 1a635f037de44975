// The extracts, as laid out on the filesystem.

use crate::rec::io_common::read_table;
use crate::rec::*;

#[derive(Debug, Clone)]
pub struct FsSource {
    layout: Layout,
}

impl FsSource {
    pub fn new(layout: Layout) -> FsSource {
        FsSource { layout }
    }

    /// The naming dictionary. Without it, only the pledged sites can be matched
    /// by name, and the monitoring data is ignored.
    pub fn naming_dictionary(&self) -> BRecResult<NameResolver> {
        let path = &self.layout.naming_dictionary;
        if !path.exists() {
            warn!(
                "naming_dictionary: {} not found, monitoring data will not be attributed",
                path.display()
            );
            return Ok(NameResolver::default());
        }
        let table = read_table(path, self.layout.naming_delimiter()?)?;
        let naming = NameResolver::from_table(&table).context(AccountingSnafu {})?;
        Ok(naming)
    }
}

impl ExtractSource for FsSource {
    fn fetch(
        &self,
        extract: Extract,
        period: Period,
    ) -> Result<Option<Table>, Box<dyn std::error::Error>> {
        let path = match self.layout.path_for(extract, period) {
            Some(p) => p,
            None => return Ok(None),
        };
        if !path.exists() {
            info!("fetch: {}: {} not found", extract.label(), path.display());
            return Ok(None);
        }
        debug!("fetch: {}: reading {}", extract.label(), path.display());
        let delimiter = self.layout.delimiter(extract).map_err(|e| e as Box<dyn std::error::Error>)?;
        let table = read_table(&path, delimiter).map_err(|e| e as Box<dyn std::error::Error>)?;
        Ok(Some(table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rec::tests::{write_fixture, write_year};

    fn source(dir: &Path) -> FsSource {
        let layout = Layout::new(&RecConfig::default(), Some(&dir.to_string_lossy()), None).unwrap();
        FsSource::new(layout)
    }

    #[test]
    fn fetch_existing_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        write_year(dir.path());
        let src = source(dir.path());
        let roster = src
            .fetch(Extract::Membership, Period::Year(2017))
            .unwrap()
            .unwrap();
        assert_eq!(roster.len(), 7);
        assert_eq!(roster[1][1], "CERN, Geneva");
        let req = src
            .fetch(Extract::Requirements, Period::Year(2017))
            .unwrap()
            .unwrap();
        assert_eq!(req[1], vec!["T0", "200", "20", "30"]);
        assert!(src
            .fetch(Extract::Membership, Period::Year(2018))
            .unwrap()
            .is_none());
        assert!(src
            .fetch(Extract::Tier01Usage, Period::Year(2017))
            .unwrap()
            .is_none());
        assert!(!src.naming_dictionary().unwrap().is_empty());
    }

    #[test]
    fn month_usage_from_files() {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempfile::tempdir().unwrap();
        write_year(dir.path());
        let jan = Month::new(2017, 1).unwrap();
        let cern = 100.0 * 1000.0 * jan.hours();
        write_fixture(
            dir.path(),
            "2017/1/TIER1_TIER1_sum_normcpu_TIER1_VO.csv",
            &format!(
                "Tier-1 report\nJanuary 2017\n\n\nSite,alice,atlas\nCH-CERN,{},1\nFR-CCIN2P3,{},1\nTotal,0,0\n",
                cern,
                cern / 10.0
            ),
        );
        write_fixture(
            dir.path(),
            "2017/1/Disk_Tape_Usage.csv",
            "Time,ALICE::CERN::EOS,ALICE::UNAM::SE\n1,1000000,200000\n2,3000000,200000\n",
        );
        let src = source(dir.path());
        let mut c = Collaboration::new(src.naming_dictionary().unwrap());
        let all = c.get_used_all_tiers(&src, jan).unwrap().unwrap();
        assert!((all[&TierCategory::T0].cpu() - 100.0).abs() < 1e-9);
        assert!((all[&TierCategory::T1].cpu() - 10.0).abs() < 1e-9);
        assert!((all[&TierCategory::T0].disk() - 2.0).abs() < 1e-9);
        let mexico = c.find_member("Mexico").unwrap();
        assert!((mexico.used(UsageSource::Monitoring, jan).disk() - 0.2).abs() < 1e-9);
        // February has no file at all.
        assert!(c
            .get_used_all_tiers(&src, jan.next())
            .unwrap()
            .is_none());
    }
}
