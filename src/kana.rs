//! Kana helpers: normalization and katakana naming tables
//!
//! Name and word readings are indexed twice: once verbatim and once
//! normalized to hiragana, so a katakana query and its hiragana spelling
//! find the same records. Kanji component lookup also falls back to a
//! katakana naming table for components that are katakana characters.

/// First/last code points of the katakana block covered by the naming
/// table (ァ..ヺ).
pub const KATAKANA_START: u32 = 0x30A1;
pub const KATAKANA_END: u32 = 0x30FA;

/// Roman spellings for U+30A1..=U+30FA, indexed by `cp - KATAKANA_START`.
const KATAKANA_ROMAN: [&str; 90] = [
    "a", "a", "i", "i", "u", "u", "e", "e", "o", "o", // ァアィイゥウェエォオ
    "ka", "ga", "ki", "gi", "ku", "gu", "ke", "ge", "ko", "go", // カガキギクグケゲコゴ
    "sa", "za", "shi", "ji", "su", "zu", "se", "ze", "so", "zo", // サザシジスズセゼソゾ
    "ta", "da", "chi", "di", "tsu", "tsu", "du", "te", "de", "to", // タダチヂッツヅテデト
    "do", "na", "ni", "nu", "ne", "no", "ha", "ba", "pa", "hi", // ドナニヌネノハバパヒ
    "bi", "pi", "fu", "bu", "pu", "he", "be", "pe", "ho", "bo", // ビピフブプヘベペホボ
    "po", "ma", "mi", "mu", "me", "mo", "ya", "ya", "yu", "yu", // ポマミムメモャヤュユ
    "yo", "yo", "ra", "ri", "ru", "re", "ro", "wa", "wa", "wi", // ョヨラリルレロヮワヰ
    "we", "wo", "n", "vu", "ka", "ke", "va", "vi", "ve", "vo", // ヱヲンヴヵヶヷヸヹヺ
];

/// Is this character in the katakana range the component fallback covers?
pub fn is_component_katakana(c: char) -> bool {
    (KATAKANA_START..=KATAKANA_END).contains(&(c as u32))
}

/// Roman spelling for a katakana character in the covered range.
pub fn katakana_to_roman(c: char) -> Option<&'static str> {
    let cp = c as u32;
    if (KATAKANA_START..=KATAKANA_END).contains(&cp) {
        Some(KATAKANA_ROMAN[(cp - KATAKANA_START) as usize])
    } else {
        None
    }
}

/// Convert katakana characters to their hiragana equivalents, leaving
/// everything else untouched.
///
/// Only the main block with direct hiragana counterparts (ァ..ヶ) shifts;
/// ヷ..ヺ and the halfwidth forms have no hiragana equivalent and pass
/// through.
pub fn to_hiragana(input: &str) -> String {
    input
        .chars()
        .map(|c| {
            let cp = c as u32;
            if (0x30A1..=0x30F6).contains(&cp) {
                // Katakana and hiragana blocks are offset by 0x60.
                char::from_u32(cp - 0x60).unwrap_or(c)
            } else {
                c
            }
        })
        .collect()
}

/// Does the string contain at least one hiragana character?
pub fn has_hiragana(input: &str) -> bool {
    input.chars().any(|c| {
        let cp = c as u32;
        (0x3041..=0x3096).contains(&cp) || (0x309D..=0x309E).contains(&cp)
    })
}

/// Is this a kanji (CJK ideograph) character?
pub fn is_kanji(c: char) -> bool {
    let cp = c as u32;
    (0x4E00..=0x9FFF).contains(&cp)         // CJK Unified Ideographs
        || (0x3400..=0x4DBF).contains(&cp)  // Extension A
        || (0xF900..=0xFAFF).contains(&cp) // Compatibility Ideographs
}

/// Compute the derived hiragana index keys for a set of readings.
///
/// A reading contributes its normalized form only when that form contains
/// at least one hiragana character; duplicates are removed while keeping
/// first-seen order.
pub fn hiragana_index_keys(readings: &[String]) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for reading in readings {
        let normalized = to_hiragana(reading);
        if !has_hiragana(&normalized) {
            continue;
        }
        if !keys.contains(&normalized) {
            keys.push(normalized);
        }
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_katakana_to_hiragana() {
        assert_eq!(to_hiragana("マツモト"), "まつもと");
        assert_eq!(to_hiragana("まつもと"), "まつもと");
        assert_eq!(to_hiragana("スミス・ジョン"), "すみす・じょん");
    }

    #[test]
    fn leaves_unconvertible_characters_alone() {
        // ヺ has no hiragana counterpart
        assert_eq!(to_hiragana("ヺ"), "ヺ");
        assert_eq!(to_hiragana("東京"), "東京");
    }

    #[test]
    fn detects_hiragana() {
        assert!(has_hiragana("まつもと"));
        assert!(has_hiragana("お茶"));
        assert!(!has_hiragana("マツモト"));
        assert!(!has_hiragana("東京"));
    }

    #[test]
    fn roman_spellings_cover_the_block() {
        assert_eq!(katakana_to_roman('ア'), Some("a"));
        assert_eq!(katakana_to_roman('ハ'), Some("ha"));
        assert_eq!(katakana_to_roman('ン'), Some("n"));
        assert_eq!(katakana_to_roman('ヺ'), Some("vo"));
        assert_eq!(katakana_to_roman('あ'), None);
        assert_eq!(katakana_to_roman('ー'), None);
    }

    #[test]
    fn hiragana_keys_skip_all_katakana_readings_without_hiragana_form() {
        // ヺー normalizes to itself (no hiragana), so contributes no key
        let keys = hiragana_index_keys(&["マツモト".to_string(), "ヺ".to_string()]);
        assert_eq!(keys, vec!["まつもと".to_string()]);
    }

    #[test]
    fn hiragana_keys_deduplicate() {
        let keys = hiragana_index_keys(&[
            "まつもと".to_string(),
            "マツモト".to_string(),
            "タナカ".to_string(),
        ]);
        assert_eq!(keys, vec!["まつもと".to_string(), "たなか".to_string()]);
    }

    #[test]
    fn kanji_detection() {
        assert!(is_kanji('引'));
        assert!(is_kanji('弓'));
        assert!(!is_kanji('ア'));
        assert!(!is_kanji('あ'));
        assert!(!is_kanji('a'));
    }
}
