pub mod kanji;
pub mod names;

pub use kanji::{
    build_radical_caches, ComponentInfo, KanjiResult, RadicalCaches, RadicalGlyphs, RadicalInfo,
    RelatedKanji,
};
pub use names::{InsertionOrderRanker, WordRanker};
