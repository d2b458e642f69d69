//! Data series identifiers and grouping

use serde::{Deserialize, Serialize};

/// One of the independently versioned dictionary partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSeries {
    Kanji,
    Radicals,
    Names,
    Words,
}

impl DataSeries {
    pub const ALL: [DataSeries; 4] = [
        DataSeries::Kanji,
        DataSeries::Radicals,
        DataSeries::Names,
        DataSeries::Words,
    ];

    /// Series name as it appears in remote URLs and the version file.
    pub fn name(self) -> &'static str {
        match self {
            DataSeries::Kanji => "kanji",
            DataSeries::Radicals => "radicals",
            DataSeries::Names => "names",
            DataSeries::Words => "words",
        }
    }

    /// Stable key of this series' row in the version table.
    pub fn version_key(self) -> u8 {
        match self {
            DataSeries::Kanji => 1,
            DataSeries::Radicals => 2,
            DataSeries::Names => 3,
            DataSeries::Words => 4,
        }
    }

    /// The major-version line this engine understands for the series.
    pub fn supported_major_version(self) -> u32 {
        match self {
            DataSeries::Kanji => 4,
            DataSeries::Radicals => 4,
            DataSeries::Names => 3,
            DataSeries::Words => 2,
        }
    }

    /// Group this series belongs to for update scheduling.
    pub fn major_series(self) -> MajorSeries {
        match self {
            DataSeries::Kanji | DataSeries::Radicals => MajorSeries::Kanji,
            DataSeries::Names => MajorSeries::Names,
            DataSeries::Words => MajorSeries::Words,
        }
    }
}

impl std::fmt::Display for DataSeries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Update scheduling group. Different groups may update in parallel;
/// series within a group update sequentially (kanji lookups cross-reference
/// radicals, so the pair moves together).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MajorSeries {
    Kanji,
    Names,
    Words,
}

impl MajorSeries {
    /// Member series in apply order.
    pub fn members(self) -> &'static [DataSeries] {
        match self {
            MajorSeries::Kanji => &[DataSeries::Kanji, DataSeries::Radicals],
            MajorSeries::Names => &[DataSeries::Names],
            MajorSeries::Words => &[DataSeries::Words],
        }
    }
}

/// A small copyable set of series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeriesSet {
    bits: u8,
}

impl SeriesSet {
    pub fn new() -> Self {
        SeriesSet::default()
    }

    /// The default update target: kanji plus its radical cross-references.
    pub fn kanji_group() -> Self {
        let mut set = SeriesSet::new();
        set.insert(DataSeries::Kanji);
        set.insert(DataSeries::Radicals);
        set
    }

    pub fn insert(&mut self, series: DataSeries) {
        self.bits |= 1 << series.version_key();
    }

    pub fn remove(&mut self, series: DataSeries) {
        self.bits &= !(1 << series.version_key());
    }

    pub fn contains(self, series: DataSeries) -> bool {
        self.bits & (1 << series.version_key()) != 0
    }

    pub fn is_empty(self) -> bool {
        self.bits == 0
    }

    pub fn iter(self) -> impl Iterator<Item = DataSeries> {
        DataSeries::ALL.into_iter().filter(move |s| self.contains(*s))
    }

    /// Kanji lookups need the radicals table, so requesting kanji always
    /// pulls radicals in as well.
    pub fn with_implied_series(mut self) -> Self {
        if self.contains(DataSeries::Kanji) {
            self.insert(DataSeries::Radicals);
        }
        self
    }

    pub fn union(mut self, other: SeriesSet) -> Self {
        self.bits |= other.bits;
        self
    }

    /// Major-series groups covered by this set, in stable order.
    pub fn major_series(self) -> Vec<MajorSeries> {
        let mut groups = Vec::new();
        for series in self.iter() {
            let group = series.major_series();
            if !groups.contains(&group) {
                groups.push(group);
            }
        }
        groups
    }
}

impl FromIterator<DataSeries> for SeriesSet {
    fn from_iter<T: IntoIterator<Item = DataSeries>>(iter: T) -> Self {
        let mut set = SeriesSet::new();
        for series in iter {
            set.insert(series);
        }
        set
    }
}
