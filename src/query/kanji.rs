//! Kanji lookup post-processing
//!
//! Raw kanji records reference the radicals table by number and variant
//! id; here they are expanded into self-contained results: the radical
//! block with glyphs and meanings, each component of the character
//! resolved to a radical, kanji, or katakana descriptor, and related
//! characters joined in.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::warn;

use crate::kana::{is_component_katakana, katakana_to_roman};
use crate::records::kanji::{KanjiMisc, KanjiReadings, KanjiRecord};
use crate::records::radicals::{base_radical_id, radical_id_number, RadicalRecord};

/// Languages the katakana component descriptions cover.
const KNOWN_COMPONENT_LANGS: [&str; 5] = ["en", "es", "pt", "fr", "ja"];

/// Variant id excluded from the character map: its glyph collides with
/// base radical 074, which must win there. Components matching it are
/// instead picked up through the variant list of the kanji being looked
/// up (see [`pop_matching_variant`]).
const MOON_COLLIDING_VARIANT: &str = "130-2";

/// Radical number whose components also accept [`MOON_COLLIDING_VARIANT`].
const MOON_RADICAL: u16 = 74;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KanjiResult {
    pub c: char,
    pub r: KanjiReadings,
    pub m: Vec<String>,
    pub m_lang: String,
    pub rad: RadicalInfo,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub refs: serde_json::Map<String, serde_json::Value>,
    pub misc: KanjiMisc,
    pub comp: Vec<ComponentInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cf: Vec<RelatedKanji>,
}

/// The expanded radical block of a kanji result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RadicalInfo {
    pub x: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nelson: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub b: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub k: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pua: Option<u32>,
    pub na: Vec<String>,
    pub m: Vec<String>,
    pub m_lang: String,
    /// Set iff a variant radical was selected; holds the base radical's
    /// glyphs for display alongside the variant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base: Option<RadicalGlyphs>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RadicalGlyphs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub b: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub k: Option<String>,
    pub na: Vec<String>,
    pub m: Vec<String>,
    pub m_lang: String,
}

/// One resolved component of a kanji.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentInfo {
    pub c: String,
    pub na: Vec<String>,
    pub m: Vec<String>,
    pub m_lang: String,
    /// Kanji glyph of the component's base radical, when it has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub k: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelatedKanji {
    pub c: char,
    pub r: KanjiReadings,
    pub m: Vec<String>,
    pub m_lang: String,
    pub misc: KanjiMisc,
}

/// Derived lookup structures over the radicals table, rebuilt whenever a
/// radicals update commits.
#[derive(Debug, Default)]
pub struct RadicalCaches {
    pub by_id: BTreeMap<String, RadicalRecord>,
    pub char_to_id: HashMap<char, String>,
}

/// Build the id map and the character map.
///
/// Iterating in id order, base radicals register both their glyphs;
/// variants register only glyphs that differ from their base. The
/// colliding moon variant is left out entirely.
pub fn build_radical_caches(records: Vec<RadicalRecord>) -> RadicalCaches {
    let mut by_id = BTreeMap::new();
    for record in records {
        by_id.insert(record.id.clone(), record);
    }

    let mut char_to_id: HashMap<char, String> = HashMap::new();
    for (id, record) in &by_id {
        if id == MOON_COLLIDING_VARIANT {
            continue;
        }
        let base_glyphs = if record.is_variant() {
            by_id
                .get(record.base_id())
                .map(|base| (base.b.clone(), base.k.clone()))
        } else {
            None
        };
        for glyph in [&record.b, &record.k].into_iter().flatten() {
            if let Some(c) = glyph.chars().next() {
                if let Some((base_b, base_k)) = &base_glyphs {
                    // Variants only claim glyphs their base doesn't.
                    if base_b.as_deref() == Some(glyph.as_str())
                        || base_k.as_deref() == Some(glyph.as_str())
                    {
                        continue;
                    }
                }
                char_to_id.entry(c).or_insert_with(|| id.clone());
            }
        }
    }

    RadicalCaches { by_id, char_to_id }
}

/// Expand raw kanji records into results. `extra` maps code points of
/// component and related characters to their records.
pub fn expand_kanji_records(
    records: Vec<KanjiRecord>,
    caches: &RadicalCaches,
    extra: &HashMap<u32, KanjiRecord>,
    lang: &str,
) -> Vec<KanjiResult> {
    records
        .into_iter()
        .filter_map(|record| expand_record(record, caches, extra, lang))
        .collect()
}

fn expand_record(
    record: KanjiRecord,
    caches: &RadicalCaches,
    extra: &HashMap<u32, KanjiRecord>,
    lang: &str,
) -> Option<KanjiResult> {
    let c = match record.character() {
        Some(c) => c,
        None => {
            warn!(code_point = record.c, "kanji record with invalid code point");
            return None;
        }
    };

    let mut var_ids = record.rad.var.clone().unwrap_or_default();
    let rad = expand_radical(&record, &mut var_ids, caches);

    let comp = record
        .comp
        .as_deref()
        .unwrap_or_default()
        .chars()
        .filter_map(|component| {
            expand_component(component, &mut var_ids, caches, extra, lang)
        })
        .collect();

    let cf = record
        .cf
        .as_deref()
        .unwrap_or_default()
        .chars()
        .filter_map(|related| {
            // Absent related characters are dropped without comment.
            let found = extra.get(&(related as u32))?;
            Some(RelatedKanji {
                c: related,
                r: found.r.clone(),
                m: found.m.clone(),
                m_lang: found.m_lang.clone().unwrap_or_else(|| "en".to_string()),
                misc: found.misc.clone(),
            })
        })
        .collect();

    Some(KanjiResult {
        c,
        r: record.r.clone(),
        m: record.m.clone(),
        m_lang: record.m_lang.clone().unwrap_or_else(|| "en".to_string()),
        rad,
        refs: record.refs.clone(),
        misc: record.misc.clone(),
        comp,
        cf,
    })
}

/// Resolve the radical block: prefer the variant whose radical number
/// matches the record's radical, falling back to the base radical.
fn expand_radical(
    record: &KanjiRecord,
    var_ids: &mut Vec<String>,
    caches: &RadicalCaches,
) -> RadicalInfo {
    let x = record.rad.x;
    let base = caches.by_id.get(&base_radical_id(x));

    let variant = var_ids
        .iter()
        .position(|id| radical_id_number(id) == Some(x))
        .map(|i| var_ids.remove(i))
        .and_then(|id| {
            let found = caches.by_id.get(&id);
            if found.is_none() {
                warn!(variant = %id, "kanji references an unknown radical variant");
            }
            found
        });

    match (variant, base) {
        (Some(variant), base) => RadicalInfo {
            x,
            nelson: record.rad.nelson,
            b: variant.b.clone(),
            k: variant.k.clone(),
            pua: variant.pua,
            na: variant.na.clone(),
            m: variant.m.clone(),
            m_lang: variant.m_lang.clone().unwrap_or_else(|| "en".to_string()),
            base: base.map(|base| RadicalGlyphs {
                b: base.b.clone(),
                k: base.k.clone(),
                na: base.na.clone(),
                m: base.m.clone(),
                m_lang: base.m_lang.clone().unwrap_or_else(|| "en".to_string()),
            }),
        },
        (None, Some(base)) => RadicalInfo {
            x,
            nelson: record.rad.nelson,
            b: base.b.clone(),
            k: base.k.clone(),
            pua: base.pua,
            na: base.na.clone(),
            m: base.m.clone(),
            m_lang: base.m_lang.clone().unwrap_or_else(|| "en".to_string()),
            base: None,
        },
        (None, None) => {
            warn!(radical = x, "no radical record for kanji radical number");
            RadicalInfo {
                x,
                nelson: record.rad.nelson,
                b: None,
                k: None,
                pua: None,
                na: Vec::new(),
                m: Vec::new(),
                m_lang: "en".to_string(),
                base: None,
            }
        }
    }
}

/// Take the variant id matching a component's radical number out of the
/// kanji's variant list, if present.
fn pop_matching_variant(var_ids: &mut Vec<String>, radical_number: u16) -> Option<String> {
    let position = var_ids.iter().position(|id| {
        radical_id_number(id) == Some(radical_number)
            || (radical_number == MOON_RADICAL && id == MOON_COLLIDING_VARIANT)
    })?;
    Some(var_ids.remove(position))
}

fn expand_component(
    component: char,
    var_ids: &mut Vec<String>,
    caches: &RadicalCaches,
    extra: &HashMap<u32, KanjiRecord>,
    lang: &str,
) -> Option<ComponentInfo> {
    // Radical component
    if let Some(id) = caches.char_to_id.get(&component) {
        let radical = caches.by_id.get(id)?;
        let chosen = pop_matching_variant(var_ids, radical.r)
            .and_then(|variant| caches.by_id.get(&variant))
            .unwrap_or(radical);
        let base = caches.by_id.get(&base_radical_id(chosen.r));
        return Some(ComponentInfo {
            c: component.to_string(),
            na: chosen.na.clone(),
            m: chosen.m.clone(),
            m_lang: chosen.m_lang.clone().unwrap_or_else(|| "en".to_string()),
            k: base.and_then(|base| base.k.clone()),
        });
    }

    // Kanji component
    if let Some(record) = extra.get(&(component as u32)) {
        let na = component_readings(record);
        if na.is_empty() || record.m.is_empty() {
            warn!(%component, "kanji component has no usable readings or meanings");
            return None;
        }
        return Some(ComponentInfo {
            c: component.to_string(),
            na,
            m: record.m.clone(),
            m_lang: record.m_lang.clone().unwrap_or_else(|| "en".to_string()),
            k: None,
        });
    }

    // Katakana component
    if is_component_katakana(component) {
        let roman = katakana_to_roman(component)?;
        let known = KNOWN_COMPONENT_LANGS.contains(&lang);
        if !known {
            warn!(%component, %lang, "no katakana description for language");
        }
        let (m, m_lang) = if lang == "ja" {
            (format!("片仮名の{}", roman), "ja".to_string())
        } else {
            (
                format!("katakana {}", roman),
                if known { lang.to_string() } else { "en".to_string() },
            )
        };
        return Some(ComponentInfo {
            c: component.to_string(),
            na: vec![component.to_string()],
            m: vec![m],
            m_lang,
            k: None,
        });
    }

    warn!(%component, "component is neither radical, kanji, nor katakana");
    None
}

/// Kun readings stripped of okurigana dots, or on readings when there are
/// no kun readings.
fn component_readings(record: &KanjiRecord) -> Vec<String> {
    let kun: Vec<String> = record
        .r
        .kun
        .as_deref()
        .unwrap_or_default()
        .iter()
        .map(|reading| reading.replace('.', ""))
        .collect();
    if !kun.is_empty() {
        return kun;
    }
    record.r.on.clone().unwrap_or_default()
}
