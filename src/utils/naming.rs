//! Deterministic names for stored images.
//!
//! A derivative is named `{slug}-{template}-{id suffix}-{upload id}.{ext}` and
//! lives in a shard directory derived from the entity id, so every path can be
//! recomputed from its inputs and every file of one upload can be found again
//! through the upload id embedded at the end of the stem.

use rand::Rng;

const SLUG_MAX_LEN: usize = 50;
const SLUG_FALLBACK: &str = "image";
const ENTITY_ID_SUFFIX_LEN: usize = 8;
const TEMPLATE_NAME_MAX_LEN: usize = 64;

/// Reserved slot name for stored originals; never a valid template name.
pub const ORIGINALS_SLOT: &str = "originals";

fn transliterate(c: char) -> Option<&'static str> {
    let latin = match c {
        'а' => "a",
        'б' => "b",
        'в' => "v",
        'г' => "g",
        'ґ' => "g",
        'д' => "d",
        'е' => "e",
        'є' => "ye",
        'ё' => "yo",
        'ж' => "zh",
        'з' => "z",
        'и' => "i",
        'і' => "i",
        'ї' => "yi",
        'й' => "y",
        'к' => "k",
        'л' => "l",
        'м' => "m",
        'н' => "n",
        'о' => "o",
        'п' => "p",
        'р' => "r",
        'с' => "s",
        'т' => "t",
        'у' => "u",
        'ф' => "f",
        'х' => "h",
        'ц' => "ts",
        'ч' => "ch",
        'ш' => "sh",
        'щ' => "sht",
        'ъ' => "a",
        'ы' => "y",
        'ь' => "y",
        'э' => "e",
        'ю' => "yu",
        'я' => "ya",
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => "a",
        'æ' => "ae",
        'ç' | 'ć' | 'č' => "c",
        'ď' | 'đ' => "d",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ę' | 'ě' => "e",
        'ì' | 'í' | 'î' | 'ï' | 'ī' => "i",
        'ł' => "l",
        'ñ' | 'ń' | 'ň' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => "o",
        'œ' => "oe",
        'ř' => "r",
        'ś' | 'š' | 'ş' => "s",
        'ß' => "ss",
        'ť' | 'ţ' => "t",
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' => "u",
        'ý' | 'ÿ' => "y",
        'ź' | 'ż' | 'ž' => "z",
        _ => return None,
    };
    Some(latin)
}

/// URL- and path-safe rendering of a human readable name.
pub fn slug(name: &str) -> String {
    let mut latin = String::with_capacity(name.len());
    for c in name.chars().flat_map(char::to_lowercase) {
        match transliterate(c) {
            Some(s) => latin.push_str(s),
            None => latin.push(c),
        }
    }

    let mut slug = String::with_capacity(latin.len());
    for c in latin.chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            slug.push(c);
        } else if (c.is_whitespace() || c == '-') && !slug.ends_with('-') {
            slug.push('-');
        }
    }

    let mut slug = slug.trim_matches('-').to_string();
    if slug.len() > SLUG_MAX_LEN {
        // ASCII only at this point, byte truncation is safe.
        slug.truncate(SLUG_MAX_LEN);
        slug = slug.trim_end_matches('-').to_string();
    }

    if slug.is_empty() {
        SLUG_FALLBACK.to_string()
    } else {
        slug
    }
}

/// Three digit bucket (`000`..=`099`) from the last two digits of the id.
pub fn shard(entity_id: &str) -> String {
    let digits: Vec<u32> = entity_id.chars().filter_map(|c| c.to_digit(10)).collect();
    let bucket = digits[digits.len().saturating_sub(2)..]
        .iter()
        .fold(0, |acc, d| acc * 10 + d);
    format!("{:03}", bucket)
}

/// Fresh 12 hex character token shared by an original and its derivatives.
pub fn new_upload_id() -> String {
    let bytes: [u8; 6] = rand::thread_rng().gen();
    hex::encode(bytes)
}

fn entity_id_suffix(entity_id: &str) -> String {
    let chars: Vec<char> = entity_id.chars().collect();
    chars[chars.len().saturating_sub(ENTITY_ID_SUFFIX_LEN)..]
        .iter()
        .collect()
}

pub fn derivative_filename(
    entity_id: &str,
    entity_name: Option<&str>,
    slot: &str,
    upload_id: &str,
    ext: &str,
) -> String {
    match entity_name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => format!(
            "{}-{}-{}-{}.{}",
            slug(name),
            slot,
            entity_id_suffix(entity_id),
            upload_id,
            ext
        ),
        None => format!("{}-{}-{}.{}", entity_id, slot, upload_id, ext),
    }
}

/// Upload id embedded in a stored filename: the last hyphen-separated
/// segment of the stem.
pub fn upload_id_from_filename(filename: &str) -> Option<&str> {
    let stem = match filename.rsplit_once('.') {
        Some((stem, _)) => stem,
        None => filename,
    };
    let (_, upload_id) = stem.rsplit_once('-')?;
    (!upload_id.is_empty()).then_some(upload_id)
}

/// Template names double as directory names.
pub fn is_path_safe_template_name(name: &str) -> bool {
    let mut chars = name.chars();
    let starts_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric());

    starts_ok
        && name.len() <= TEMPLATE_NAME_MAX_LEN
        && name != ORIGINALS_SLOT
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_slug_shaped(s: &str) -> bool {
        s.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    }

    #[test]
    fn slug_transliterates_cyrillic() {
        assert_eq!(slug("Тест Плочки"), "test-plochki");
        assert_eq!(slug("Щастие и Юг"), "shtastie-i-yug");
    }

    #[test]
    fn slug_collapses_separators() {
        assert_eq!(slug("  Hello --  World  "), "hello-world");
        assert_eq!(slug("a_b c"), "ab-c");
        assert_eq!(slug("Crème Brûlée!"), "creme-brulee");
    }

    #[test]
    fn slug_falls_back_to_image() {
        assert_eq!(slug(""), "image");
        assert_eq!(slug("!!! ??? ..."), "image");
        assert_eq!(slug("---"), "image");
        assert_eq!(slug("漢字"), "image");
    }

    #[test]
    fn slug_is_capped_without_trailing_hyphen() {
        let name = format!("{} tail", "a".repeat(49));
        let s = slug(&name);
        assert_eq!(s, "a".repeat(49));

        let long = "word ".repeat(40);
        let s = slug(&long);
        assert!(s.len() <= 50);
        assert!(!s.ends_with('-'));
        assert!(!s.starts_with('-'));
    }

    #[test]
    fn slug_is_deterministic_and_well_formed() {
        for input in ["Тест Плочки", "Ñandú 2000", "  ", "UPPER lower", "x--y__z"] {
            let a = slug(input);
            let b = slug(input);
            assert_eq!(a, b);
            assert!(is_slug_shaped(&a), "{a}");
            assert!(a.len() <= 50);
            assert!(!a.starts_with('-') && !a.ends_with('-'));
        }
    }

    #[test]
    fn shard_uses_last_two_digits() {
        assert_eq!(shard("11111111-2222-3333-4444-555555555566"), "066");
        assert_eq!(shard("7"), "007");
        assert_eq!(shard("abc"), "000");
        assert_eq!(shard("item-1a0b"), "010");
        assert_eq!(shard("12345"), "045");
    }

    #[test]
    fn shard_stays_in_range() {
        for id in ["0", "99", "100", "999999", "a9b9", "uuid-f00d-42"] {
            let s = shard(id);
            assert_eq!(s.len(), 3);
            let n: u32 = s.parse().unwrap();
            assert!(n < 100);
        }
    }

    #[test]
    fn upload_ids_are_12_hex_chars() {
        let a = new_upload_id();
        let b = new_upload_id();
        assert_eq!(a.len(), 12);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(a, b);
    }

    #[test]
    fn filename_with_entity_name() {
        let name = derivative_filename(
            "11111111-2222-3333-4444-555555555566",
            Some("Тест Плочки"),
            "T",
            "0123456789ab",
            "webp",
        );
        assert_eq!(name, "test-plochki-T-55555566-0123456789ab.webp");
    }

    #[test]
    fn filename_without_entity_name() {
        let name = derivative_filename("42", None, "thumb", "0123456789ab", "jpg");
        assert_eq!(name, "42-thumb-0123456789ab.jpg");
        let blank = derivative_filename("42", Some("   "), "thumb", "0123456789ab", "jpg");
        assert_eq!(blank, name);
    }

    #[test]
    fn upload_id_round_trips_through_filename() {
        let name = derivative_filename("p-17", Some("Red Shoe"), "card", "a1b2c3d4e5f6", "png");
        assert_eq!(upload_id_from_filename(&name), Some("a1b2c3d4e5f6"));
        assert_eq!(upload_id_from_filename("noseparator.webp"), None);
        assert_eq!(upload_id_from_filename("trailing-.webp"), None);
    }

    #[test]
    fn template_names_must_be_path_safe() {
        assert!(is_path_safe_template_name("thumb"));
        assert!(is_path_safe_template_name("card_2x-wide"));
        assert!(!is_path_safe_template_name(""));
        assert!(!is_path_safe_template_name("../etc"));
        assert!(!is_path_safe_template_name("a/b"));
        assert!(is_path_safe_template_name("T"));
        assert!(is_path_safe_template_name("Thumb2X"));
        assert!(!is_path_safe_template_name("_lead"));
        assert!(!is_path_safe_template_name("thumb.webp"));
        assert!(!is_path_safe_template_name("-lead"));
        assert!(!is_path_safe_template_name("originals"));
        assert!(!is_path_safe_template_name(&"a".repeat(65)));
    }
}
