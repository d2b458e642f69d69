//! Column family layout and schema versioning
//!
//! Each series gets one record family plus one family per secondary
//! index. Index keys are `value ++ 0x00 ++ primary_key`; an exact index
//! lookup is a prefix scan over `value ++ 0x00`. Two bookkeeping families
//! hold the per-series version rows and the schema-version cell.

use crate::core::series::DataSeries;

/// Column family names for record, index, and bookkeeping data.
pub mod cf {
    pub const KANJI: &str = "kanji";
    pub const KANJI_R_ON: &str = "kanji.r_on";
    pub const KANJI_R_KUN: &str = "kanji.r_kun";
    pub const KANJI_R_NA: &str = "kanji.r_na";

    pub const RADICALS: &str = "radicals";
    pub const RADICALS_R: &str = "radicals.r";
    pub const RADICALS_B: &str = "radicals.b";
    pub const RADICALS_K: &str = "radicals.k";

    pub const NAMES: &str = "names";
    pub const NAMES_K: &str = "names.k";
    pub const NAMES_R: &str = "names.r";
    pub const NAMES_H: &str = "names.h";

    pub const WORDS: &str = "words";
    pub const WORDS_K: &str = "words.k";
    pub const WORDS_R: &str = "words.r";
    pub const WORDS_H: &str = "words.h";
    pub const WORDS_KC: &str = "words.kc";
    pub const WORDS_GT: &str = "words.gt";

    pub const VERSIONS: &str = "versions";
    pub const META: &str = "meta";
}

/// Schema version the code understands.
pub const SCHEMA_VERSION: u32 = 2;

/// Key of the schema-version cell in the meta family.
pub const META_SCHEMA_KEY: &[u8] = b"schema_version";

/// Families introduced at each schema version. Migration steps are
/// additive only, so upgrading from any older version is the concatenation
/// of the later steps.
pub fn families_added_at(version: u32) -> &'static [&'static str] {
    match version {
        1 => &[
            cf::KANJI,
            cf::KANJI_R_ON,
            cf::KANJI_R_KUN,
            cf::KANJI_R_NA,
            cf::RADICALS,
            cf::RADICALS_R,
            cf::RADICALS_B,
            cf::RADICALS_K,
            cf::NAMES,
            cf::NAMES_K,
            cf::NAMES_R,
            cf::NAMES_H,
            cf::VERSIONS,
            cf::META,
        ],
        2 => &[
            cf::WORDS,
            cf::WORDS_K,
            cf::WORDS_R,
            cf::WORDS_H,
            cf::WORDS_KC,
            cf::WORDS_GT,
        ],
        _ => &[],
    }
}

/// All families present at a given schema version.
pub fn families_at(version: u32) -> Vec<&'static str> {
    let mut families = Vec::new();
    for v in 1..=version {
        families.extend_from_slice(families_added_at(v));
    }
    families
}

/// The record family of a series.
pub fn record_family(series: DataSeries) -> &'static str {
    match series {
        DataSeries::Kanji => cf::KANJI,
        DataSeries::Radicals => cf::RADICALS,
        DataSeries::Names => cf::NAMES,
        DataSeries::Words => cf::WORDS,
    }
}

/// The index families of a series.
pub fn index_families(series: DataSeries) -> &'static [&'static str] {
    match series {
        DataSeries::Kanji => &[cf::KANJI_R_ON, cf::KANJI_R_KUN, cf::KANJI_R_NA],
        DataSeries::Radicals => &[cf::RADICALS_R, cf::RADICALS_B, cf::RADICALS_K],
        DataSeries::Names => &[cf::NAMES_K, cf::NAMES_R, cf::NAMES_H],
        DataSeries::Words => &[
            cf::WORDS_K,
            cf::WORDS_R,
            cf::WORDS_H,
            cf::WORDS_KC,
            cf::WORDS_GT,
        ],
    }
}
