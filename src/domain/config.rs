use std::{
    fmt,
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use nonempty::NonEmpty;
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{Error as _, MapAccess, Visitor},
    ser::SerializeMap,
};

use crate::domain::{
    Code, InvalidCodeError,
    builder::BuildOptions,
    closure::ExpanderOptions,
    cluster::{ClusterDefinition, ClusterName, InvalidClusterNameError},
    retirement::ResolverOptions,
};

/// Configuration for a cluster run.
///
/// This struct holds the options that control closure expansion and
/// retirement resolution, where the terminology tables live, where the
/// exports are written, and (optionally) the cluster definitions themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Versions", into = "Versions")]
pub struct Config {
    /// Whether a parent code belongs to its own closure expansion.
    ///
    /// Some closure tables are reflexive and some are not. This makes the
    /// behaviour explicit either way.
    pub include_self: bool,

    /// Whether the configured parent codes are members of their clusters.
    pub include_parents: bool,

    /// Whether a code with no retirement record is treated as active.
    ///
    /// When `false`, only codes that the terminology source positively knows
    /// about are kept.
    pub unknown_codes_active: bool,

    /// Whether to keep expanding newly found codes until no new codes appear.
    ///
    /// Only needed when the closure table records direct children rather
    /// than the full transitive closure.
    pub iterate_closure: bool,

    /// The maximum length of a replacement chain.
    ///
    /// Defaults to the size of the history table.
    pub max_hops: Option<NonZeroUsize>,

    /// How per-cluster text files are laid out.
    pub text_style: TextStyle,

    /// Locations of the terminology tables.
    pub sources: Sources,

    /// Locations of the exported artifacts.
    pub output: Output,

    /// A separate TOML or YAML file of cluster definitions.
    ///
    /// Used instead of the inline `[clusters]` table when set.
    pub clusters_file: Option<PathBuf>,

    clusters: ClusterEntries,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            include_self: false,
            include_parents: true,
            unknown_codes_active: true,
            iterate_closure: false,
            max_hops: None,
            text_style: TextStyle::default(),
            sources: Sources::default(),
            output: Output::default(),
            clusters_file: None,
            clusters: ClusterEntries::default(),
        }
    }
}

impl Config {
    /// Loads the configuration from a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the TOML content is
    /// invalid.
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {e}"))?;
        toml::from_str(&content).map_err(|e| format!("Failed to parse config file: {e}"))
    }

    /// Saves the configuration to a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be serialized to TOML or if
    /// the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content =
            toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize config: {e}"))?;
        std::fs::write(path, content).map_err(|e| format!("Failed to write config file: {e}"))
    }

    /// A starter configuration with example clusters.
    #[must_use]
    pub fn example() -> Self {
        let cluster = |name: &str, parents: &[u64]| {
            (
                name.to_string(),
                ClusterEntry::Parents(parents.iter().copied().map(CodeValue::Int).collect()),
            )
        };
        Self {
            clusters: ClusterEntries(vec![
                cluster("dm_cod", &[73_211_009]),
                cluster("fh_cvd_cod", &[266_894_000]),
                cluster("pain_cod", &[276_435_006]),
                cluster(
                    "msk_cod",
                    &[
                        106_028_002,
                        301_366_005,
                        421_060_004,
                        72_696_002,
                        106_030_000,
                        302_258_001,
                        302_293_008,
                        298_339_004,
                        298_325_004,
                        298_343_000,
                    ],
                ),
            ]),
            ..Self::default()
        }
    }

    /// The build options this configuration describes.
    #[must_use]
    pub const fn build_options(&self) -> BuildOptions {
        BuildOptions {
            include_parents: self.include_parents,
            expander: ExpanderOptions {
                include_self: self.include_self,
                iterate: self.iterate_closure,
            },
            resolver: ResolverOptions {
                max_hops: self.max_hops,
                unknown_codes_active: self.unknown_codes_active,
            },
        }
    }

    /// The inline cluster definitions, in the order they were written.
    ///
    /// # Errors
    ///
    /// Returns an error if a cluster name or code is invalid, or a cluster has
    /// no parents.
    pub fn clusters(&self) -> Result<Vec<ClusterDefinition>, ClusterConfigError> {
        self.clusters.definitions()
    }
}

/// Layout of the per-cluster text files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextStyle {
    /// One code per line.
    #[default]
    Lines,
    /// A single line of quoted, comma-separated codes (`'1','2','3'`), ready
    /// to paste into a SQL `IN` clause.
    QuotedList,
}

/// Locations of the terminology tables.
///
/// Relative paths are resolved against the project root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sources {
    /// The transitive closure table (`supertypeId`, `subtypeId`).
    #[serde(default = "default_closure")]
    pub closure: PathBuf,

    /// The retirement history table (`oldId`, `newId`).
    #[serde(default = "default_history")]
    pub history: PathBuf,

    /// The description table (`conceptId`, `term`), if available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descriptions: Option<PathBuf>,
}

impl Default for Sources {
    fn default() -> Self {
        Self {
            closure: default_closure(),
            history: default_history(),
            descriptions: None,
        }
    }
}

fn default_closure() -> PathBuf {
    PathBuf::from("closure.tsv")
}

fn default_history() -> PathBuf {
    PathBuf::from("history.tsv")
}

/// Locations of the exported artifacts.
///
/// Relative paths are resolved against the project root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    /// The tabular export of every cluster.
    #[serde(default = "default_csv")]
    pub csv: PathBuf,

    /// The spreadsheet export of every cluster.
    #[serde(default = "default_xlsx")]
    pub xlsx: PathBuf,

    /// The directory of per-cluster text files.
    #[serde(default = "default_clusters_dir")]
    pub clusters_dir: PathBuf,

    /// The JSON diagnostics report.
    #[serde(default = "default_report")]
    pub report: PathBuf,
}

impl Default for Output {
    fn default() -> Self {
        Self {
            csv: default_csv(),
            xlsx: default_xlsx(),
            clusters_dir: default_clusters_dir(),
            report: default_report(),
        }
    }
}

fn default_csv() -> PathBuf {
    PathBuf::from("snomed_hierarchical_clusters.csv")
}

fn default_xlsx() -> PathBuf {
    PathBuf::from("snomed_hierarchical_clusters.xlsx")
}

fn default_clusters_dir() -> PathBuf {
    PathBuf::from("clusters")
}

fn default_report() -> PathBuf {
    PathBuf::from("diagnostics.json")
}

const fn default_true() -> bool {
    true
}

/// Errors in a set of cluster definitions.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ClusterConfigError {
    /// A cluster name is not valid.
    #[error(transparent)]
    Name(#[from] InvalidClusterNameError),

    /// A cluster lists no parent codes.
    #[error("cluster '{0}' has no parent codes")]
    NoParents(String),

    /// A parent or excluded code is not valid.
    #[error("cluster '{cluster}': {error}")]
    Code {
        /// The cluster the code belongs to.
        cluster: String,
        /// The parse failure.
        error: InvalidCodeError,
    },
}

/// Cluster definitions as written by the operator, in document order.
///
/// Each entry is either a bare list of parent codes or a table with
/// `parents` and `exclude` lists. Codes may be strings or integers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterEntries(Vec<(String, ClusterEntry)>);

impl ClusterEntries {
    /// Whether no clusters are defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Validates the entries into cluster definitions.
    ///
    /// # Errors
    ///
    /// Returns an error if a cluster name or code is invalid, or a cluster has
    /// no parents.
    pub fn definitions(&self) -> Result<Vec<ClusterDefinition>, ClusterConfigError> {
        self.0
            .iter()
            .map(|(name, entry)| entry.to_definition(name))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
enum ClusterEntry {
    Parents(Vec<CodeValue>),
    Detailed {
        parents: Vec<CodeValue>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        exclude: Vec<CodeValue>,
    },
}

impl ClusterEntry {
    fn to_definition(&self, name: &str) -> Result<ClusterDefinition, ClusterConfigError> {
        let (parents, exclude) = match self {
            Self::Parents(parents) => (parents.as_slice(), &[] as &[CodeValue]),
            Self::Detailed { parents, exclude } => (parents.as_slice(), exclude.as_slice()),
        };

        let codes = |values: &[CodeValue]| {
            values
                .iter()
                .map(CodeValue::to_code)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|error| ClusterConfigError::Code {
                    cluster: name.to_string(),
                    error,
                })
        };

        let cluster_name = ClusterName::new(name.to_string())?;
        let parents = NonEmpty::from_vec(codes(parents)?)
            .ok_or_else(|| ClusterConfigError::NoParents(name.to_string()))?;

        Ok(ClusterDefinition::new(cluster_name, parents).excluding(codes(exclude)?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
enum CodeValue {
    Int(u64),
    Str(String),
}

impl CodeValue {
    fn to_code(&self) -> Result<Code, InvalidCodeError> {
        match self {
            Self::Int(n) => Code::new(n.to_string()),
            Self::Str(s) => s.parse(),
        }
    }
}

impl Serialize for ClusterEntries {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, entry) in &self.0 {
            map.serialize_entry(name, entry)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ClusterEntries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = ClusterEntries;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of cluster names to parent codes")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries: Vec<(String, ClusterEntry)> =
                    Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, entry)) = access.next_entry::<String, ClusterEntry>()? {
                    if entries.iter().any(|(seen, _)| *seen == name) {
                        return Err(A::Error::custom(format!("duplicate cluster '{name}'")));
                    }
                    entries.push((name, entry));
                }
                Ok(ClusterEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

/// The serialized versions of the configuration.
/// This allows for future changes to the configuration format and to the domain
/// type without breaking compatibility.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "_version")]
enum Versions {
    #[serde(rename = "1")]
    V1 {
        #[serde(default)]
        include_self: bool,

        #[serde(default = "default_true")]
        include_parents: bool,

        #[serde(default = "default_true")]
        unknown_codes_active: bool,

        #[serde(default)]
        iterate_closure: bool,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_hops: Option<NonZeroUsize>,

        #[serde(default)]
        text_style: TextStyle,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        clusters_file: Option<PathBuf>,

        #[serde(default)]
        sources: Sources,

        #[serde(default)]
        output: Output,

        #[serde(default, skip_serializing_if = "ClusterEntries::is_empty")]
        clusters: ClusterEntries,
    },
}

impl From<Versions> for super::Config {
    fn from(versions: Versions) -> Self {
        match versions {
            Versions::V1 {
                include_self,
                include_parents,
                unknown_codes_active,
                iterate_closure,
                max_hops,
                text_style,
                clusters_file,
                sources,
                output,
                clusters,
            } => Self {
                include_self,
                include_parents,
                unknown_codes_active,
                iterate_closure,
                max_hops,
                text_style,
                sources,
                output,
                clusters_file,
                clusters,
            },
        }
    }
}

impl From<super::Config> for Versions {
    fn from(config: super::Config) -> Self {
        Self::V1 {
            include_self: config.include_self,
            include_parents: config.include_parents,
            unknown_codes_active: config.unknown_codes_active,
            iterate_closure: config.iterate_closure,
            max_hops: config.max_hops,
            text_style: config.text_style,
            clusters_file: config.clusters_file,
            sources: config.sources,
            output: config.output,
            clusters: config.clusters,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn load_reads_valid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            br#"_version = "1"
include_self = true
include_parents = false
unknown_codes_active = false
iterate_closure = true
max_hops = 8
text_style = "quoted-list"

[sources]
closure = "tables/closure.tsv"
history = "tables/history.tsv"
descriptions = "tables/descriptions.tsv"

[output]
csv = "out/clusters.csv"

[clusters]
dm_cod = [73211009]
msk_cod = { parents = ["106028002", 301366005], exclude = ["72696002"] }
"#,
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();

        assert!(config.include_self);
        assert!(!config.include_parents);
        assert!(!config.unknown_codes_active);
        assert!(config.iterate_closure);
        assert_eq!(config.max_hops, NonZeroUsize::new(8));
        assert_eq!(config.text_style, TextStyle::QuotedList);
        assert_eq!(config.sources.closure, PathBuf::from("tables/closure.tsv"));
        assert_eq!(
            config.sources.descriptions,
            Some(PathBuf::from("tables/descriptions.tsv"))
        );
        assert_eq!(config.output.csv, PathBuf::from("out/clusters.csv"));
        assert_eq!(config.output.clusters_dir, PathBuf::from("clusters"));
        assert_eq!(
            config.output.xlsx,
            PathBuf::from("snomed_hierarchical_clusters.xlsx")
        );

        let clusters = config.clusters().unwrap();
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].name.as_str(), "dm_cod");
        assert_eq!(clusters[0].parents.head.as_str(), "73211009");
        assert_eq!(clusters[1].name.as_str(), "msk_cod");
        assert_eq!(clusters[1].parents.len(), 2);
        assert_eq!(clusters[1].exclude.len(), 1);
    }

    #[test]
    fn cluster_order_follows_the_document() {
        let config: Config = toml::from_str(
            r#"_version = "1"
[clusters]
zeta = [1]
alpha = [2]
mid = [3]
"#,
        )
        .unwrap();

        let names: Vec<_> = config
            .clusters()
            .unwrap()
            .into_iter()
            .map(|c| c.name.to_string())
            .collect();
        assert_eq!(names, ["zeta", "alpha", "mid"]);
    }

    #[test]
    fn load_missing_file_returns_error() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("missing.toml");

        let error = Config::load(&missing).unwrap_err();
        assert!(error.starts_with("Failed to read config file:"));
    }

    #[test]
    fn load_invalid_toml_returns_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"_version = \"1\"\ninclude_self = \"yes\"\n")
            .unwrap();

        let error = Config::load(file.path()).unwrap_err();
        assert!(error.starts_with("Failed to parse config file:"));
    }

    #[test]
    fn empty_file_returns_default() {
        let expected = Config::default();
        let actual: Config = toml::from_str(r#"_version = "1""#).unwrap();
        assert_eq!(actual, expected);
    }

    #[test]
    fn example_round_trips_through_toml() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("clusters.toml");

        let config = Config::example();
        config.save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();

        assert_eq!(loaded, config);
        assert_eq!(loaded.clusters().unwrap().len(), 4);
    }

    #[test]
    fn repeated_cluster_name_is_rejected() {
        let error = serde_json::from_str::<ClusterEntries>(r#"{"dm_cod": [1], "dm_cod": [2]}"#)
            .unwrap_err();
        assert!(error.to_string().starts_with("duplicate cluster 'dm_cod'"));
    }

    #[test]
    fn cluster_without_parents_is_rejected() {
        let config: Config = toml::from_str("_version = \"1\"\n[clusters]\nempty = []\n").unwrap();
        assert_eq!(
            config.clusters().unwrap_err(),
            ClusterConfigError::NoParents("empty".to_string())
        );
    }

    #[test]
    fn invalid_code_names_the_cluster() {
        let config: Config =
            toml::from_str("_version = \"1\"\n[clusters]\nbad = [\"12x\"]\n").unwrap();
        let error = config.clusters().unwrap_err();
        assert!(error.to_string().starts_with("cluster 'bad': Invalid code '12x'"));
    }

    #[test]
    fn build_options_mirror_config() {
        let config = Config {
            include_self: true,
            include_parents: false,
            max_hops: NonZeroUsize::new(3),
            ..Config::default()
        };
        let options = config.build_options();

        assert!(options.expander.include_self);
        assert!(!options.include_parents);
        assert_eq!(options.resolver.max_hops, NonZeroUsize::new(3));
        assert!(options.resolver.unknown_codes_active);
    }
}
