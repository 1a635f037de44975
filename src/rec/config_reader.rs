use crate::rec::*;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// File name templates, relative to the data root.
///
/// `{year}` is replaced by the year, `{month}` by the month number and `{mm}`
/// by the two-digit month.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct Templates {
    pub membership: Option<String>,
    pub pledges: Option<String>,
    pub requirements: Option<String>,
    #[serde(rename = "tier01Usage")]
    pub tier01_usage: Option<String>,
    #[serde(rename = "tier2Usage")]
    pub tier2_usage: Option<String>,
    #[serde(rename = "cpuMonitoring")]
    pub cpu_monitoring: Option<String>,
    #[serde(rename = "storageMonitoring")]
    pub storage_monitoring: Option<String>,
}

/// Field delimiters, one character each.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct Delimiters {
    pub membership: Option<String>,
    pub pledges: Option<String>,
    pub requirements: Option<String>,
    #[serde(rename = "tier01Usage")]
    pub tier01_usage: Option<String>,
    #[serde(rename = "tier2Usage")]
    pub tier2_usage: Option<String>,
    #[serde(rename = "cpuMonitoring")]
    pub cpu_monitoring: Option<String>,
    #[serde(rename = "storageMonitoring")]
    pub storage_monitoring: Option<String>,
    #[serde(rename = "namingDictionary")]
    pub naming_dictionary: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub name: String,
    /// `MS` or `NMS`
    pub status: String,
    pub members: Vec<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecConfig {
    #[serde(rename = "dataRoot")]
    pub data_root: Option<String>,
    #[serde(rename = "namingDictionary")]
    pub naming_dictionary: Option<String>,
    pub templates: Option<Templates>,
    pub delimiters: Option<Delimiters>,
    pub clusters: Option<Vec<ClusterConfig>>,
    #[serde(rename = "outputPath")]
    pub output_path: Option<String>,
    #[serde(rename = "format")]
    pub output_format: Option<String>,
}

impl RecConfig {
    /// The configured clusters, or the default ones.
    pub fn cluster_definitions(&self) -> BRecResult<Vec<ClusterDefinition>> {
        let clusters = match &self.clusters {
            Some(c) => c,
            None => return Ok(default_clusters()),
        };
        let mut res = Vec::new();
        for c in clusters.iter() {
            let status = match c.status.as_str() {
                "MS" => MembershipStatus::MemberState,
                "NMS" => MembershipStatus::NonMemberState,
                _ => {
                    return Err(Box::new(RecError::UnknownStatus {
                        cluster: c.name.clone(),
                        value: c.status.clone(),
                    }))
                }
            };
            let members: Vec<&str> = c.members.iter().map(|s| s.as_str()).collect();
            res.push(ClusterDefinition::new(&c.name, status, &members));
        }
        Ok(res)
    }
}

pub fn read_config(path: &str) -> BRecResult<RecConfig> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let config: RecConfig =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    Ok(config)
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum OutputFormat {
    Csv,
    Json,
}

impl OutputFormat {
    pub fn parse(s: &str) -> BRecResult<OutputFormat> {
        match s {
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            _ => Err(Box::new(RecError::UnknownFormat {
                value: s.to_string(),
            })),
        }
    }
}

/// Where every extract lives on disk, and how to split its lines.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Layout {
    pub root: PathBuf,
    pub naming_dictionary: PathBuf,
    templates: Templates,
    delimiters: Delimiters,
}

impl Layout {
    /// `data_override` comes from the command line and is used as given. A
    /// relative `dataRoot` from the configuration is relative to the
    /// configuration file.
    pub fn new(
        config: &RecConfig,
        data_override: Option<&str>,
        config_dir: Option<&Path>,
    ) -> BRecResult<Layout> {
        let root = match (data_override, &config.data_root, config_dir) {
            (Some(d), _, _) => PathBuf::from(d),
            (None, Some(d), Some(dir)) => dir.join(d),
            (None, Some(d), None) => PathBuf::from(d),
            (None, None, Some(dir)) => dir.to_path_buf(),
            (None, None, None) => PathBuf::from("."),
        };
        let naming_dictionary = root.join(
            config
                .naming_dictionary
                .as_deref()
                .unwrap_or("NamingDictionary.csv"),
        );
        let layout = Layout {
            root,
            naming_dictionary,
            templates: config.templates.clone().unwrap_or_default(),
            delimiters: config.delimiters.clone().unwrap_or_default(),
        };
        // Fail early on a bad delimiter.
        for e in ALL_EXTRACTS.iter() {
            layout.delimiter(*e)?;
        }
        layout.naming_delimiter()?;
        Ok(layout)
    }

    fn template(&self, extract: Extract) -> String {
        let t = &self.templates;
        let (configured, default) = match extract {
            Extract::Membership => (&t.membership, "{year}/MandO.csv"),
            Extract::Pledges => (&t.pledges, "{year}/pledges.csv"),
            Extract::Requirements => (&t.requirements, "{year}/Requirements.csv"),
            Extract::Tier01Usage => (
                &t.tier01_usage,
                "{year}/{month}/TIER1_TIER1_sum_normcpu_TIER1_VO.csv",
            ),
            Extract::Tier2Usage => (&t.tier2_usage, "{year}/{month}/reptier2.csv"),
            Extract::CpuMonitoring => (&t.cpu_monitoring, "{year}/{month}/CPU_Usage.csv"),
            Extract::StorageMonitoring => (
                &t.storage_monitoring,
                "{year}/{month}/Disk_Tape_Usage.csv",
            ),
        };
        configured.clone().unwrap_or_else(|| default.to_string())
    }

    /// The file of `extract` for `period`. None if the template needs a
    /// month and only a year is given.
    pub fn path_for(&self, extract: Extract, period: Period) -> Option<PathBuf> {
        let template = self.template(extract);
        let lpath = match period {
            Period::Year(y) => {
                if template.contains("{month}") || template.contains("{mm}") {
                    return None;
                }
                template.replace("{year}", &y.to_string())
            }
            Period::Month(m) => template
                .replace("{year}", &m.year.to_string())
                .replace("{month}", &m.month.to_string())
                .replace("{mm}", &format!("{:02}", m.month)),
        };
        Some(self.root.join(lpath))
    }

    pub fn delimiter(&self, extract: Extract) -> BRecResult<u8> {
        let d = &self.delimiters;
        let (configured, default) = match extract {
            Extract::Membership => (&d.membership, b','),
            Extract::Pledges => (&d.pledges, b','),
            Extract::Requirements => (&d.requirements, b';'),
            Extract::Tier01Usage => (&d.tier01_usage, b','),
            Extract::Tier2Usage => (&d.tier2_usage, b','),
            Extract::CpuMonitoring => (&d.cpu_monitoring, b','),
            Extract::StorageMonitoring => (&d.storage_monitoring, b','),
        };
        parse_delimiter(configured.as_deref(), default)
    }

    pub fn naming_delimiter(&self) -> BRecResult<u8> {
        parse_delimiter(self.delimiters.naming_dictionary.as_deref(), b';')
    }
}

pub const ALL_EXTRACTS: [Extract; 7] = [
    Extract::Membership,
    Extract::Pledges,
    Extract::Requirements,
    Extract::Tier01Usage,
    Extract::Tier2Usage,
    Extract::CpuMonitoring,
    Extract::StorageMonitoring,
];

fn parse_delimiter(configured: Option<&str>, default: u8) -> BRecResult<u8> {
    match configured {
        None => Ok(default),
        Some(s) if s.len() == 1 => Ok(s.as_bytes()[0]),
        Some("\\t") => Ok(b'\t'),
        Some(s) => Err(Box::new(RecError::InvalidDelimiter {
            value: s.to_string(),
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> RecConfig {
        serde_json::from_str(s).unwrap()
    }

    #[test]
    fn default_layout() {
        let layout = Layout::new(&RecConfig::default(), Some("/data"), None).unwrap();
        let jan = Month::new(2017, 1).unwrap();
        assert_eq!(
            layout.path_for(Extract::Membership, Period::Year(2017)),
            Some(PathBuf::from("/data/2017/MandO.csv"))
        );
        assert_eq!(
            layout.path_for(Extract::Tier2Usage, Period::Month(jan)),
            Some(PathBuf::from("/data/2017/1/reptier2.csv"))
        );
        let mut config = RecConfig::default();
        config.templates = Some(Templates {
            tier2_usage: Some("{year}-{mm}/t2.csv".to_string()),
            ..Default::default()
        });
        let padded = Layout::new(&config, Some("/data"), None).unwrap();
        assert_eq!(
            padded.path_for(Extract::Tier2Usage, Period::Month(jan)),
            Some(PathBuf::from("/data/2017-01/t2.csv"))
        );
        assert_eq!(padded.path_for(Extract::Tier2Usage, Period::Year(2017)), None);
        assert_eq!(layout.path_for(Extract::Tier2Usage, Period::Year(2017)), None);
        assert_eq!(layout.naming_dictionary, PathBuf::from("/data/NamingDictionary.csv"));
        assert_eq!(layout.delimiter(Extract::Requirements).unwrap(), b';');
        assert_eq!(layout.delimiter(Extract::Pledges).unwrap(), b',');
    }

    #[test]
    fn configured_layout() {
        let config = parse(
            r#"{
                "dataRoot": "extracts",
                "namingDictionary": "names.csv",
                "templates": { "pledges": "pledges_{year}.xlsx" },
                "delimiters": { "membership": "\\t", "namingDictionary": "," },
                "clusters": [ { "name": "Nordic", "status": "MS", "members": ["Denmark", "Norway"] } ],
                "format": "json"
            }"#,
        );
        let layout = Layout::new(&config, None, Some(Path::new("/conf"))).unwrap();
        assert_eq!(layout.root, PathBuf::from("/conf/extracts"));
        assert_eq!(layout.naming_dictionary, PathBuf::from("/conf/extracts/names.csv"));
        assert_eq!(
            layout.path_for(Extract::Pledges, Period::Year(2018)),
            Some(PathBuf::from("/conf/extracts/pledges_2018.xlsx"))
        );
        assert_eq!(layout.delimiter(Extract::Membership).unwrap(), b'\t');
        assert_eq!(layout.naming_delimiter().unwrap(), b',');
        assert_eq!(config.output_format.as_deref(), Some("json"));

        let clusters = config.cluster_definitions().unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].constituents, vec!["Denmark".to_string(), "Norway".to_string()]);
        assert_eq!(RecConfig::default().cluster_definitions().unwrap(), default_clusters());
    }

    #[test]
    fn invalid_settings() {
        let config = parse(r#"{ "delimiters": { "pledges": ";;" } }"#);
        assert!(Layout::new(&config, None, None).is_err());
        let config = parse(r#"{ "clusters": [ { "name": "X", "status": "member", "members": [] } ] }"#);
        assert!(config.cluster_definitions().is_err());
        assert!(OutputFormat::parse("pdf").is_err());
    }
}
