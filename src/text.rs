//! Stateless string/number primitives shared by the record and the resolver.

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use url::Url;

use crate::error::{NormalizeError, Result};

/// Builds a case-insensitive alternation that removes every listed token.
/// Tokens are sorted longest-first so a longer token wins at the same
/// position ("цена базовая" before "цена").
fn noise_regex(tokens: &[&str]) -> Regex {
    let mut parts: Vec<&str> = tokens.to_vec();
    parts.sort_by_key(|t| std::cmp::Reverse(t.chars().count()));
    let pattern = parts
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!("(?i){pattern}")).expect("static noise pattern")
}

pub(crate) static PRICE_NOISE: Lazy<Regex> = Lazy::new(|| {
    // "cтоимость" with a Latin "c" appears in the wild alongside the
    // Cyrillic spelling; both are listed.
    let tokens = [
        "cтоимость",
        "стоимость",
        "цена базовая",
        "выгода до",
        "квартиры",
        "рублей",
        "выгода",
        "руб.",
        "pуб.",
        "p уб.",
        "руб",
        "цена",
        "млн.",
        "млн",
        "rub",
        "от",
        "до",
        "₽",
        "р.",
        "р",
        "p",
        ">",
        ":",
        "’",
        "!",
        "*",
    ];
    let mut parts: Vec<String> = tokens.iter().map(|t| regex::escape(t)).collect();
    parts.sort_by_key(|t| std::cmp::Reverse(t.chars().count()));
    parts.push(r"\s".to_string());
    Regex::new(&format!("(?i){}", parts.join("|"))).expect("static noise pattern")
});

pub(crate) static BUILDING_NOISE: Lazy<Regex> = Lazy::new(|| {
    noise_regex(&[
        "многоэтажный паркинг",
        "подземный паркинг",
        "корпус",
        "корп.",
        "корп",
        "строение",
        "паркинг",
        "квартал",
        "дом",
        "№",
        ":",
        "\t",
        "\n",
    ])
});

pub(crate) static SECTION_NOISE: Lazy<Regex> = Lazy::new(|| {
    noise_regex(&[
        "секция", "парадная", "подъезд", "секц.", "блок", "№", ":", "\t",
    ])
});

pub(crate) static NUMBER_NOISE: Lazy<Regex> = Lazy::new(|| {
    noise_regex(&[
        "помещение свободного назначения",
        "коммерческое помещение",
        "нежилое помещение",
        "апартаменты",
        "апартамент",
        "машиноместо",
        "кладовая",
        "кладовка",
        "квартиры",
        "квартира",
        "помещение",
        "паркинг",
        "ком.пом.",
        "номер",
        "офис",
        "пом.",
        "лот",
        "кв.",
        "м/м",
        "мот/м",
        "м.м",
        "№",
    ])
});

pub(crate) static CEILING_NOISE: Lazy<Regex> = Lazy::new(|| {
    noise_regex(&[
        "высота", "потолков", "потолки", "потолка", "потолок", ":", "м.", "м",
    ])
});

pub(crate) static ARTICLE_NOISE: Lazy<Regex> = Lazy::new(|| {
    noise_regex(&["тип планировки", "артикул:", "типовая", "тип", "№"])
});

pub(crate) static STATUS_NOISE: Lazy<Regex> = Lazy::new(|| noise_regex(&["статус", ":"]));

pub(crate) static DISCOUNT_NOISE: Lazy<Regex> = Lazy::new(|| noise_regex(&["скидка", "%", "-"]));

pub(crate) static COMPLEX_NOISE: Lazy<Regex> =
    Lazy::new(|| noise_regex(&["(дом сдан)", "дом сдан", "\t", "\n", "\u{ad}"]));

pub(crate) static FEATURE_NOISE: Lazy<Regex> = Lazy::new(|| noise_regex(&["\t", "\n"]));

/// Unit tokens stripped from labels in exact-match resolution.
pub(crate) static LABEL_UNIT_NOISE: Lazy<Regex> =
    Lazy::new(|| noise_regex(&["кв.м.", "кв.м", "м²", "м2", ","]));

static DECIMAL_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[+-]?[0-9]*[.]?[0-9]+").expect("static pattern"));

static INT_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"-?\d+").expect("static pattern"));

static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("static pattern"));

/// Replaces the comma decimal delimiter with a dot. Idempotent.
pub fn fix_decimal_delimiter(value: &str) -> String {
    value.replace(',', ".")
}

/// Collapses whitespace runs (including NBSP and tabs) to single spaces.
pub fn normalize_ws(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Removes every match of the noise pattern and trims the remainder.
pub fn strip_tokens(value: &str, noise: &Regex) -> String {
    noise.replace_all(value, "").trim().to_string()
}

/// First signed/decimal numeric token, after delimiter normalization.
pub fn extract_decimal(value: &str) -> Option<Decimal> {
    let fixed = fix_decimal_delimiter(value);
    DECIMAL_TOKEN
        .find(&fixed)
        .and_then(|m| m.as_str().parse::<Decimal>().ok())
}

/// First (possibly negative) integer token.
pub fn extract_int(value: &str) -> Option<i32> {
    INT_TOKEN.find(value).and_then(|m| m.as_str().parse().ok())
}

/// First unsigned digit run.
pub fn extract_digits(value: &str) -> Option<u32> {
    DIGIT_RUN.find(value).and_then(|m| m.as_str().parse().ok())
}

fn parse_floor(part: &str) -> Result<i32> {
    part.trim()
        .parse::<i32>()
        .map_err(|_| NormalizeError::Format(format!("bad floor number `{part}`")))
}

/// Expands floor range/enumeration syntax into an explicit list.
/// "2-5" -> [2,3,4,5]; "2,4,7" -> [2,4,7]; both separators combine
/// ("1-3,7" -> [1,2,3,7]). Letters around the numbers are dropped.
pub fn split_floors(value: &str) -> Result<Vec<i32>> {
    let cleaned: String = value
        .trim()
        .chars()
        .filter(|c| !matches!(c, 'а'..='я' | 'А'..='Я' | 'ё' | 'Ё'))
        .collect();
    let cleaned = cleaned.replace(';', ",").replace('–', "-").trim().to_string();
    if cleaned.is_empty() {
        return Ok(Vec::new());
    }

    let mut floors = Vec::new();
    if cleaned.contains('-') && cleaned.contains(',') {
        for part in cleaned.split(',') {
            floors.extend(split_floors(part)?);
        }
    } else if cleaned.contains('-') {
        let (from, to) = cleaned
            .split_once('-')
            .ok_or_else(|| NormalizeError::Format(format!("bad floor range `{cleaned}`")))?;
        let (from, to) = (parse_floor(from)?, parse_floor(to)?);
        floors.extend(from..=to);
    } else if cleaned.contains(',') {
        for part in cleaned.split(',') {
            if !part.trim().is_empty() {
                floors.push(parse_floor(part)?);
            }
        }
    } else {
        floors.push(parse_floor(&cleaned)?);
    }
    Ok(floors)
}

/// Capitalizes the first letter of every word, lowercasing the rest.
pub fn title_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut at_word_start = true;
    for c in value.chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}

/// Scheme+host root of a URL, used to absolutize site-relative plan links.
pub fn domain_of(target: &str) -> Option<String> {
    let parsed = Url::parse(target).ok()?;
    let host = parsed.host_str()?;
    Some(format!("{}://{}/", parsed.scheme(), host))
}

/// Joins a possibly-relative link against a base URL. Falls back to the
/// raw link when the base itself does not parse.
pub fn join_url(base: &str, link: &str) -> String {
    match Url::parse(base).and_then(|b| b.join(link)) {
        Ok(joined) => joined.to_string(),
        Err(_) => link.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delimiter_fix_is_idempotent() {
        let once = fix_decimal_delimiter("1,5");
        assert_eq!(once, "1.5");
        assert_eq!(fix_decimal_delimiter(&once), "1.5");
    }

    #[test]
    fn price_noise_strips_currency_words() {
        assert_eq!(strip_tokens("4 500 000 руб.", &PRICE_NOISE), "4500000");
        assert_eq!(strip_tokens("от 7 200 000 ₽", &PRICE_NOISE), "7200000");
    }

    #[test]
    fn extract_decimal_takes_first_token() {
        assert_eq!(extract_decimal("1,5"), Some(Decimal::new(15, 1)));
        assert_eq!(extract_decimal("38.7 м²"), Some(Decimal::new(387, 1)));
        assert_eq!(extract_decimal("нет"), None);
    }

    #[test]
    fn split_floors_expands_ranges_and_enumerations() {
        assert_eq!(split_floors("2-5").unwrap(), vec![2, 3, 4, 5]);
        assert_eq!(split_floors("2,4,7").unwrap(), vec![2, 4, 7]);
        assert_eq!(split_floors("1-3,7").unwrap(), vec![1, 2, 3, 7]);
        assert_eq!(split_floors("этаж 3").unwrap(), vec![3]);
        assert!(split_floors("").unwrap().is_empty());
    }

    #[test]
    fn title_case_keeps_complex_names_tidy() {
        assert_eq!(title_case("жк мурино клаб"), "Жк Мурино Клаб");
    }

    #[test]
    fn join_url_absolutizes_relative_links() {
        assert_eq!(
            join_url("https://example.com/flats/", "/plans/1.png"),
            "https://example.com/plans/1.png"
        );
    }
}
