//! The canonical per-unit record: one setter per canonical field, each
//! decoding noisy source text into a typed value, plus record-level
//! validation and corrective rewrites in `finalize`.

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use tracing::{debug, warn};

use crate::config::RecordConfig;
use crate::error::{NormalizeError, Result};
use crate::text;
use crate::types::{FinalizeOutcome, RawValue, RejectReason};

/// Source values that mean "no value" rather than a real entry.
static EMPTY_VALUES: &[&str] = &["null", "-", "0", "–", "no", "—"];

fn is_empty_sentinel(value: &str) -> bool {
    let lowered = value.trim().to_lowercase();
    EMPTY_VALUES.contains(&lowered.as_str())
}

/// The canonical unit type. Anything else the sources publish is either a
/// synonym of one of these or lands in the skip bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    Flat,
    Apartment,
    Parking,
    Commercial,
    Storeroom,
    Townhouse,
}

impl ObjectType {
    pub fn parse_token(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "flat" => Some(ObjectType::Flat),
            "apartment" => Some(ObjectType::Apartment),
            "parking" => Some(ObjectType::Parking),
            "commercial" => Some(ObjectType::Commercial),
            "storeroom" => Some(ObjectType::Storeroom),
            "townhouse" => Some(ObjectType::Townhouse),
            _ => None,
        }
    }
}

/// Classification result of a type-synonym lookup. `Skip` covers unit kinds
/// the aggregator deliberately excludes (villas, land plots, hotels, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeClass {
    Keep(ObjectType),
    Skip,
}

/// (synonym, classification) pairs sorted by descending synonym length so a
/// longer synonym wins ties in substring matching.
static TYPE_SYNONYMS: Lazy<Vec<(&'static str, TypeClass)>> = Lazy::new(|| {
    use ObjectType::*;
    let groups: &[(TypeClass, &[&str])] = &[
        (
            TypeClass::Keep(Commercial),
            &[
                "нежилое помещение",
                "нежилое",
                "помещение",
                "ритейл",
                "псн",
                "коммерческое",
                "офис",
                "бизнес",
                "street retail",
            ],
        ),
        (
            TypeClass::Keep(Flat),
            &["жилое помещение", "квартира", "пентхаус", "лофт", "студия"],
        ),
        (
            TypeClass::Keep(Apartment),
            &["апартамент", "апаратамен", "сьют", "аппартамент"],
        ),
        (
            TypeClass::Keep(Storeroom),
            &["кладов", "келлер", "storage", "хоз. блок"],
        ),
        (
            TypeClass::Keep(Parking),
            &["машиноместо", "гараж", "место для мотоцикла", "парк"],
        ),
        (TypeClass::Keep(Townhouse), &["таунхаус", "дуплекс"]),
        (
            TypeClass::Skip,
            &[
                "инвестиционные проекты",
                "вилла",
                "участок",
                "шале",
                "дом",
                "особняк",
                "торговый центр",
                "арендный бизнес",
                "сapital markets",
                "гостиница",
            ],
        ),
    ];
    let mut pairs: Vec<(&'static str, TypeClass)> = Vec::new();
    for (class, synonyms) in groups {
        for synonym in *synonyms {
            pairs.push((synonym, *class));
        }
    }
    pairs.sort_by_key(|(synonym, _)| std::cmp::Reverse(synonym.chars().count()));
    pairs
});

/// Longest-match type lookup over lowercased free text.
fn find_type(value: &str) -> Option<TypeClass> {
    let lowered = value.to_lowercase();
    TYPE_SYNONYMS
        .iter()
        .find(|(synonym, _)| lowered.contains(synonym))
        .map(|(_, class)| *class)
}

/// Room count, with a studio sentinel for layouts without separately
/// countable rooms. Serializes as a number or the string "studio".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rooms {
    Count(u32),
    Studio,
}

impl Serialize for Rooms {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Rooms::Count(n) => serializer.serialize_u32(*n),
            Rooms::Studio => serializer.serialize_str("studio"),
        }
    }
}

/// Tri-state flag for finished/furniture fields. Serializes as 0, 1 or
/// "optional".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    No,
    Yes,
    Optional,
}

impl Flag {
    /// Parses the flag vocabulary; empty text means "absent".
    pub fn parse(value: &str) -> Result<Option<Flag>> {
        match value.trim().to_lowercase().as_str() {
            "" => Ok(None),
            "0" => Ok(Some(Flag::No)),
            "1" => Ok(Some(Flag::Yes)),
            "optional" => Ok(Some(Flag::Optional)),
            other => Err(NormalizeError::InvalidFlag(other.to_string())),
        }
    }
}

impl Serialize for Flag {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Flag::No => serializer.serialize_u8(0),
            Flag::Yes => serializer.serialize_u8(1),
            Flag::Optional => serializer.serialize_str("optional"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum RecordState {
    Open,
    Finalized,
    Rejected(RejectReason),
}

/// Normalized per-unit listing. Mutated only through named setters during
/// ingestion; transitions once through `finalize`.
#[derive(Debug, Clone)]
pub struct CanonicalRecord {
    config: RecordConfig,
    state: RecordState,
    need_save: bool,
    used_room_area: bool,

    complex: Option<String>,
    object_type: Option<ObjectType>,
    building: Option<String>,
    section: Option<String>,
    number: Option<String>,
    number_on_site: Option<String>,
    price_base: Option<Decimal>,
    price_sale: Option<Decimal>,
    price_finished: Option<Decimal>,
    price_finished_sale: Option<Decimal>,
    furniture_price: Option<Decimal>,
    discount: Option<Decimal>,
    discount_percent: Option<Decimal>,
    area: Option<Decimal>,
    living_area: Option<Decimal>,
    ceiling: Option<Decimal>,
    rooms: Option<Rooms>,
    floor: Option<i32>,
    floors: Option<Vec<i32>>,
    in_sale: Option<u8>,
    finished: Option<Flag>,
    furniture: Option<Flag>,
    sale_status: Option<String>,
    commissioning: Option<String>,
    article: Option<String>,
    finishing_name: Option<String>,
    features: Vec<String>,
    view: Vec<String>,
    plan: Option<String>,
    euro_planning: Option<u8>,
    currency: Option<String>,
    sale: Option<String>,
    flat_url: Option<String>,
}

impl CanonicalRecord {
    pub fn new(config: RecordConfig) -> Self {
        Self {
            config,
            state: RecordState::Open,
            need_save: true,
            used_room_area: false,
            complex: None,
            // Sources almost never label plain flats; the default matches
            // the dominant unit kind and is overridden on any type signal.
            object_type: Some(ObjectType::Flat),
            building: None,
            section: None,
            number: None,
            number_on_site: None,
            price_base: None,
            price_sale: None,
            price_finished: None,
            price_finished_sale: None,
            furniture_price: None,
            discount: None,
            discount_percent: None,
            area: None,
            living_area: None,
            ceiling: None,
            rooms: None,
            floor: None,
            floors: None,
            in_sale: Some(1),
            finished: None,
            furniture: None,
            sale_status: None,
            commissioning: None,
            article: None,
            finishing_name: None,
            features: Vec::new(),
            view: Vec::new(),
            plan: None,
            euro_planning: None,
            currency: None,
            sale: None,
            flat_url: None,
        }
    }

    // ----- classification ---------------------------------------------------

    /// Accepts a canonical type token directly, or free text resolved via
    /// longest-match synonym lookup. A skip-bucket match marks the record
    /// non-savable instead of raising.
    pub fn set_type(&mut self, value: &str) -> Result<()> {
        if let Some(object_type) = ObjectType::parse_token(value) {
            self.object_type = Some(object_type);
            return Ok(());
        }
        match find_type(value) {
            Some(TypeClass::Keep(object_type)) => {
                self.object_type = Some(object_type);
                if value.to_lowercase().contains("пентхаус") {
                    self.add_feature("Пентхаус");
                }
                Ok(())
            }
            Some(TypeClass::Skip) => {
                debug!(value, "type classified into skip bucket");
                self.need_save = false;
                Ok(())
            }
            None => Err(NormalizeError::Classification(format!(
                "unknown object type `{value}`"
            ))),
        }
    }

    /// Reclassifies (or rejects) when a type synonym is embedded in another
    /// field, e.g. "машиноместо №47" in the unit number.
    fn check_embedded_type(&mut self, value: &str) -> Result<()> {
        let Some(class) = find_type(value) else {
            return Ok(());
        };
        match class {
            TypeClass::Keep(found) if Some(found) != self.object_type => {
                if self.config.correct_type_dynamic {
                    self.object_type = Some(found);
                    Ok(())
                } else {
                    Err(NormalizeError::Classification(format!(
                        "found {found:?} synonym in `{value}` but record type is {:?}",
                        self.object_type
                    )))
                }
            }
            TypeClass::Skip => {
                if self.config.correct_type_dynamic {
                    self.need_save = false;
                    Ok(())
                } else {
                    Err(NormalizeError::Classification(format!(
                        "skip-bucket synonym in `{value}`"
                    )))
                }
            }
            _ => Ok(()),
        }
    }

    // ----- plain string fields ----------------------------------------------

    pub fn set_complex(&mut self, value: &str) {
        let cleaned = text::strip_tokens(value, &text::COMPLEX_NOISE);
        let titled = text::title_case(&cleaned).replace("Жк", "ЖК");
        self.complex = Some(titled);
    }

    pub fn set_building(&mut self, value: &str) {
        let cleaned = text::strip_tokens(value, &text::BUILDING_NOISE);
        if !cleaned.is_empty() && !is_empty_sentinel(&cleaned) {
            self.building = Some(cleaned);
        }
    }

    pub fn set_section(&mut self, value: &str) {
        let cleaned = text::strip_tokens(value, &text::SECTION_NOISE);
        if !cleaned.is_empty() && !is_empty_sentinel(&cleaned) {
            self.section = Some(cleaned);
        }
    }

    pub fn set_number(&mut self, value: &str) -> Result<()> {
        self.check_embedded_type(value)?;
        let cleaned = text::strip_tokens(value, &text::NUMBER_NOISE);
        self.number = Some(cleaned);
        Ok(())
    }

    pub fn set_number_on_site(&mut self, value: &str) {
        let cleaned = text::strip_tokens(value, &text::NUMBER_NOISE);
        self.number_on_site = Some(cleaned);
    }

    pub fn set_article(&mut self, value: &str) {
        let cleaned = text::strip_tokens(value, &text::ARTICLE_NOISE);
        self.article = Some(cleaned);
    }

    pub fn set_sale_status(&mut self, value: &str) {
        let cleaned = text::strip_tokens(value, &text::STATUS_NOISE);
        self.sale_status = Some(cleaned);
    }

    pub fn set_flat_url(&mut self, value: &str) {
        self.flat_url = Some(value.trim().to_string());
    }

    pub fn set_currency(&mut self, value: &str) {
        self.currency = Some(value.trim().to_string());
    }

    /// Accumulates promotional-offer text with "; " joins.
    pub fn add_sale(&mut self, value: &str) {
        match &mut self.sale {
            Some(existing) => {
                existing.push_str("; ");
                existing.push_str(value);
            }
            None => self.sale = Some(value.to_string()),
        }
    }

    // ----- prices -----------------------------------------------------------

    /// Decodes noisy price text. "Price on request" phrases and empty-value
    /// sentinels yield no value rather than an error.
    fn decode_price(&self, value: &str) -> Result<Option<Decimal>> {
        let lowered = value.to_lowercase();
        const ON_REQUEST: &[&str] = &[
            "запрос", "прода", "брон", "указ", "обсуждае", "уточн", "индивид",
        ];
        if ON_REQUEST.iter().any(|phrase| lowered.contains(phrase)) {
            return Ok(None);
        }
        if is_empty_sentinel(value) {
            return Ok(None);
        }

        let fixed = text::fix_decimal_delimiter(value);
        let stripped = text::strip_tokens(&fixed, &text::PRICE_NOISE);
        if stripped.is_empty() {
            return Ok(None);
        }

        let decoded = if self.config.auto_correct_price {
            self.correct_price(&stripped)?
        } else {
            parse_decimal(&stripped)?
        };
        let multiplier = self.config.price_multiplier.unwrap_or(Decimal::ONE);
        Ok(Some((decoded * multiplier).round_dp(0)))
    }

    /// Heuristic price repair: a range expression keeps its lower bound, and
    /// sub-1000 values are assumed quoted in millions and scaled up.
    fn correct_price(&self, value: &str) -> Result<Decimal> {
        let mut candidate = value;
        if candidate.chars().any(|c| c.is_ascii_digit()) {
            if let Some((head, _)) = candidate.split_once('-') {
                candidate = head;
            }
            if let Some((head, _)) = candidate.split_once('–') {
                candidate = head;
            }
        }
        let mut decoded = parse_decimal(candidate.trim())?;
        if decoded < Decimal::from(1000) {
            decoded *= Decimal::from(1_000_000);
        }
        Ok(decoded)
    }

    fn check_price(&self, price: Option<Decimal>) -> Result<()> {
        if self.config.ignore_small_prices {
            return Ok(());
        }
        if let Some(price) = price {
            let too_small = price > Decimal::ZERO && price < Decimal::from(10_000);
            let too_big = price > Decimal::from(100_000_000_000u64);
            if too_small || too_big {
                return Err(NormalizeError::Range(format!("price {price} out of bounds")));
            }
        }
        Ok(())
    }

    pub fn set_price_base(&mut self, value: &str) -> Result<()> {
        self.set_price_base_with_sale(value, None)
    }

    /// Sets the base price; a paired sale value is reordered so the larger
    /// of the two becomes the base and the smaller the sale price.
    pub fn set_price_base_with_sale(&mut self, value: &str, sale: Option<&str>) -> Result<()> {
        let mut value = value.to_string();
        if value.contains('$') {
            self.currency = Some("$".to_string());
            value = value.replace('$', "");
        }
        self.price_base = self.decode_price(&value)?;

        if let Some(sale_text) = sale {
            if let Some(price_sale) = self.decode_price(sale_text)? {
                match self.price_base {
                    Some(base) if price_sale < base => self.price_sale = Some(price_sale),
                    Some(base) if price_sale > base => {
                        self.price_sale = Some(base);
                        self.price_base = Some(price_sale);
                    }
                    Some(_) => {}
                    None => self.price_base = Some(price_sale),
                }
            }
        }
        self.check_price(self.price_base)
    }

    pub fn set_price_sale(&mut self, value: &str) -> Result<()> {
        self.price_sale = self.decode_price(value)?;
        self.check_price(self.price_sale)
    }

    pub fn set_price_finished(&mut self, value: &str) -> Result<()> {
        self.price_finished = self.decode_price(value)?;
        self.check_price(self.price_finished)
    }

    pub fn set_price_finished_sale(&mut self, value: &str) -> Result<()> {
        self.price_finished_sale = self.decode_price(value)?;
        self.check_price(self.price_finished_sale)
    }

    pub fn set_furniture_price(&mut self, value: &str) -> Result<()> {
        self.furniture_price = self.decode_price(value)?;
        self.check_price(self.furniture_price)
    }

    pub fn set_discount(&mut self, value: &str) -> Result<()> {
        self.discount = self.decode_price(value)?;
        Ok(())
    }

    pub fn set_discount_percent(&mut self, value: &str) -> Result<()> {
        let fixed = text::fix_decimal_delimiter(value);
        let stripped = text::strip_tokens(&fixed, &text::DISCOUNT_NOISE);
        self.discount_percent = Some(parse_decimal(&stripped)?);
        Ok(())
    }

    // ----- areas ------------------------------------------------------------

    fn clean_area(value: &str) -> Result<Decimal> {
        text::extract_decimal(value)
            .ok_or_else(|| NormalizeError::Format(format!("no numeric area in `{value}`")))
    }

    pub fn set_area(&mut self, value: &str) -> Result<()> {
        if value.trim().is_empty() || is_empty_sentinel(value) {
            return Ok(());
        }
        self.area = Some(Self::clean_area(value)?);
        Ok(())
    }

    /// Sets the living area directly. Conflicts with per-room accumulation.
    pub fn set_living_area(&mut self, value: &str) -> Result<()> {
        if value.trim().is_empty() || is_empty_sentinel(value) {
            return Ok(());
        }
        if self.used_room_area {
            return Err(NormalizeError::ConfigurationConflict(
                "living area already accumulated from per-room contributions".to_string(),
            ));
        }
        self.living_area = Some(Self::clean_area(value)?);
        Ok(())
    }

    /// Accumulates the living area from one room's area. Conflicts with the
    /// direct living-area setter.
    pub fn add_room_area(&mut self, value: &str) -> Result<()> {
        let contribution = Self::clean_area(value)?;
        if !self.used_room_area && self.living_area.is_some() {
            return Err(NormalizeError::ConfigurationConflict(
                "living area already set directly, cannot mix in per-room contributions".to_string(),
            ));
        }
        self.living_area = Some(self.living_area.unwrap_or(Decimal::ZERO) + contribution);
        self.used_room_area = true;
        Ok(())
    }

    pub fn set_ceiling(&mut self, value: &str) -> Result<()> {
        let fixed = text::fix_decimal_delimiter(value);
        let stripped = text::strip_tokens(&fixed, &text::CEILING_NOISE);
        self.ceiling = Some(parse_decimal(&stripped)?);
        Ok(())
    }

    // ----- rooms ------------------------------------------------------------

    /// Interprets room text through a priority ladder: penthouse/free-plan
    /// phrases become features, euro tokens set the euro-planning flag,
    /// spelled-out numerals and studio synonyms map to typed counts, and the
    /// first digit run is the fallback.
    pub fn set_rooms(&mut self, value: &str) -> Result<()> {
        let mut value = value.to_lowercase().trim().to_string();
        if value.contains("пентхаус") {
            self.add_feature("Пентхаус");
            return Ok(());
        }
        if value.contains("св. план") {
            self.add_feature("Свободная планировка");
            return Ok(());
        }
        value = value
            .replace("комнаты", "")
            .replace("комната", "")
            .trim()
            .to_string();
        if value.contains("евро") {
            self.euro_planning = Some(1);
        }

        // Type synonyms embedded in the room text: flat synonyms are noise
        // ("2-комн. квартира"), anything else reclassifies or rejects.
        for (synonym, class) in TYPE_SYNONYMS.iter() {
            if !value.contains(synonym) {
                continue;
            }
            match class {
                TypeClass::Keep(ObjectType::Flat) => continue,
                TypeClass::Keep(ObjectType::Apartment) => {
                    if !self.config.correct_type_dynamic {
                        return Err(NormalizeError::Classification(format!(
                            "apartment synonym in room text `{value}`"
                        )));
                    }
                    self.object_type = Some(ObjectType::Apartment);
                    continue;
                }
                TypeClass::Keep(other) => {
                    if !self.config.correct_type_dynamic {
                        return Err(NormalizeError::Classification(format!(
                            "{other:?} synonym in room text `{value}`"
                        )));
                    }
                    self.object_type = Some(*other);
                    return Ok(());
                }
                TypeClass::Skip => {
                    if !self.config.correct_type_dynamic {
                        return Err(NormalizeError::Classification(format!(
                            "skip-bucket synonym in room text `{value}`"
                        )));
                    }
                    self.need_save = false;
                    return Ok(());
                }
            }
        }

        let spelled = [
            (&["одно", "1-а", "однушка"][..], 1u32),
            (&["двух", "2-х", "двушка"][..], 2),
            (&["трех", "трёх", "3-х", "трешка", "трёшка"][..], 3),
            (&["четырех", "четырёх", "4-х"][..], 4),
            (&["пяти"][..], 5),
            (&["шести"][..], 6),
            (&["семи"][..], 7),
        ];
        let mut matched = false;
        for (tokens, count) in spelled {
            if tokens.iter().any(|token| value.contains(token)) {
                self.rooms = Some(Rooms::Count(count));
                matched = true;
                break;
            }
        }
        if !matched {
            if value.contains("многоком") {
                self.rooms = None;
            } else if Self::is_studio_token(&value) {
                self.rooms = Some(Rooms::Studio);
            } else if !value.contains("-1") {
                // Single-character euro detection is imprecise: a bare "е"
                // in short tokens is taken as euro-planning even though it
                // can collide with abbreviations.
                if value.contains('e') || (value.contains('е') && value.chars().count() < 4) {
                    self.euro_planning = Some(1);
                }
                if !is_empty_sentinel(&value) {
                    match text::extract_digits(&value) {
                        Some(count) => self.rooms = Some(Rooms::Count(count)),
                        None => {
                            if !self.config.ignore_empty_rooms {
                                return Err(NormalizeError::MissingRoomCount(value));
                            }
                        }
                    }
                }
            }
        }
        if self.rooms == Some(Rooms::Count(0)) {
            self.rooms = Some(Rooms::Studio);
        }
        Ok(())
    }

    fn is_studio_token(value: &str) -> bool {
        // "cтудия"/"cт" with a Latin "c" appear in source data too.
        const CONTAINS: &[&str] = &["студия", "студ", "studio", "cтудия"];
        const EXACT: &[&str] = &["с", "c", "s", "ст", "ст.", "0", "cт", "st"];
        CONTAINS.iter().any(|token| value.contains(token)) || EXACT.contains(&value)
    }

    // ----- floor ------------------------------------------------------------

    pub fn set_floor(&mut self, value: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Ok(());
        }
        let lowered = value.to_lowercase();
        if lowered.contains("цоколь") || lowered.contains("подвал") {
            self.floor = Some(-1);
            return Ok(());
        }
        if lowered.contains("первый") {
            self.floor = Some(1);
            return Ok(());
        }

        // "5 из 12" and "5/12" keep the numerator.
        let mut value = value;
        if let Some((head, _)) = value.split_once("из") {
            value = head;
        }
        if let Some((head, _)) = value.split_once('/') {
            value = head;
        }

        if self.config.split_floors {
            let floors = text::split_floors(value)?;
            if !floors.is_empty() {
                self.floors = Some(floors);
            }
            return Ok(());
        }

        let number = text::extract_int(value)
            .ok_or_else(|| NormalizeError::Format(format!("no floor number in `{value}`")))?;
        if !is_empty_sentinel(&number.to_string()) {
            self.floor = Some(number);
        }
        Ok(())
    }

    // ----- availability -----------------------------------------------------

    /// Maps free-text sale status to the in-sale flag, with side-effect
    /// sale-status assignment for reservation/booking/secondary/closed
    /// cases. Custom per-source vocabularies take priority over the
    /// free-text ladder.
    pub fn set_in_sale(&mut self, value: &str) -> Result<()> {
        let trimmed = value.trim();

        if self.config.in_sale_statuses.iter().any(|s| s == trimmed) {
            self.in_sale = Some(1);
            return Ok(());
        }
        if self.config.reserved_statuses.iter().any(|s| s == trimmed) {
            self.in_sale = Some(1);
            self.set_sale_status("Забронировано");
            return Ok(());
        }
        if self.config.not_in_sale_statuses.iter().any(|s| s == trimmed) {
            self.in_sale = Some(0);
            return Ok(());
        }

        let lowered = trimmed.to_lowercase();
        let resolved: Option<u8> = if lowered.contains("брон") {
            self.set_sale_status("Забронирована");
            Some(1)
        } else if lowered.contains("резерв")
            || lowered.contains("reserv")
            || lowered.contains("book")
        {
            self.set_sale_status("Зарезервирована");
            Some(1)
        } else if lowered.contains("вторичная продажа") {
            self.set_sale_status("Вторичная продажа");
            Some(1)
        } else if lowered.contains("закрытые продажи") {
            self.set_sale_status("Закрытые продажи");
            Some(1)
        } else if lowered.contains("акция") {
            self.add_sale("Акция");
            Some(1)
        } else if lowered.contains("свобод")
            || lowered.contains("выгодное предложение")
            || lowered.contains("free")
            || lowered.contains("в продаже")
        {
            Some(1)
        } else if lowered.contains("продан") || lowered.contains("sold") {
            Some(0)
        } else if lowered.contains("unavailable") {
            Some(0)
        } else if lowered.contains("avail") {
            Some(1)
        } else if lowered.contains("false") {
            Some(0)
        } else if lowered.contains("true") {
            Some(1)
        } else if lowered == "active" || lowered == "sale" {
            Some(1)
        } else {
            None
        };

        match resolved {
            Some(flag) => self.in_sale = Some(flag),
            None => match trimmed.parse::<i64>() {
                Ok(0) => self.in_sale = Some(0),
                Ok(1) => self.in_sale = Some(1),
                _ => return Err(NormalizeError::InvalidAvailability(trimmed.to_string())),
            },
        }
        Ok(())
    }

    // ----- flags ------------------------------------------------------------

    pub fn set_finished(&mut self, value: &str) -> Result<()> {
        self.finished = Flag::parse(value)?;
        Ok(())
    }

    pub fn set_furniture(&mut self, value: &str) -> Result<()> {
        self.furniture = Flag::parse(value)?;
        Ok(())
    }

    pub fn set_euro_planning(&mut self, value: &str) -> Result<()> {
        match value.trim() {
            "0" => self.euro_planning = Some(0),
            "1" => self.euro_planning = Some(1),
            other => return Err(NormalizeError::InvalidFlag(other.to_string())),
        }
        Ok(())
    }

    /// A named finishing package implies the unit is finished; plain
    /// yes/no words only toggle the flag.
    pub fn set_finishing_name(&mut self, value: &str) {
        let lowered = value.trim().to_lowercase();
        const NOT_FINISHED: &[&str] = &["без отделки", "без ремонта", "нет"];
        if NOT_FINISHED
            .iter()
            .chain(EMPTY_VALUES.iter())
            .any(|token| lowered.contains(token))
        {
            return;
        }
        if lowered.is_empty() {
            return;
        }
        self.finished = Some(Flag::Yes);
        const PLAIN_YES: &[&str] = &["да", "есть", "1", "с отделкой", "true"];
        if PLAIN_YES.iter().any(|token| *token == lowered) {
            return;
        }
        self.finishing_name = Some(value.trim().to_string());
    }

    // ----- commissioning ----------------------------------------------------

    /// Canonicalizes the building handover date to "<I|II|III|IV> кв <year>",
    /// a bare year, or the delivered sentinel "сдан".
    pub fn set_commissioning(&mut self, value: &str) -> Result<()> {
        self.set_commissioning_masked(value, None)
    }

    pub fn set_commissioning_masked(&mut self, value: &str, time_mask: Option<&str>) -> Result<()> {
        static DELIVERED: Lazy<Regex> =
            Lazy::new(|| Regex::new("(?i)заселен|сдан").expect("static pattern"));
        static BARE_YEAR: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"^\d{4}$").expect("static pattern"));
        static YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{4}").expect("static pattern"));
        static NOISE: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"(?i)срок сдачи|сдача|год|г\.|г|:").expect("static pattern"));
        static GLUED_QUARTER: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"(?i)([IV\d]+)кв").expect("static pattern"));
        static QUARTAL: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"(?i)квартал|кв\.").expect("static pattern"));

        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Ok(());
        }
        if DELIVERED.is_match(trimmed) {
            self.commissioning = Some("сдан".to_string());
            return Ok(());
        }
        if BARE_YEAR.is_match(trimmed) {
            self.commissioning = Some(trimmed.to_string());
            return Ok(());
        }

        // Month-name text converts straight to a quarter label.
        let lowered = trimmed.to_lowercase();
        const MONTHS: &[(&str, u32)] = &[
            ("январь", 1),
            ("февраль", 2),
            ("март", 3),
            ("апрель", 4),
            ("май", 5),
            ("июнь", 6),
            ("июль", 7),
            ("август", 8),
            ("сентябрь", 9),
            ("октябрь", 10),
            ("ноябрь", 11),
            ("декабрь", 12),
        ];
        if let Some((_, month)) = MONTHS.iter().find(|(name, _)| lowered.contains(name)) {
            let year = YEAR
                .find(trimmed)
                .map(|m| m.as_str().to_string())
                .ok_or_else(|| {
                    NormalizeError::Format(format!("no year in commissioning `{trimmed}`"))
                })?;
            let quarter = (month + 2) / 3;
            self.commissioning = Some(format!("{} кв {}", roman_quarter(quarter), year));
            return Ok(());
        }

        let mut cleaned = NOISE.replace_all(trimmed, "").trim().to_string();

        if let Some(mask) = time_mask {
            let parsed = parse_masked_date(&cleaned, mask)?;
            let quarter = (parsed.1 + 2) / 3;
            cleaned = format!("{} кв {}", quarter, parsed.0);
        }

        let mut canonical = GLUED_QUARTER.replace_all(&cleaned, "${1} кв").to_string();
        canonical = QUARTAL.replace_all(&canonical, "кв").to_string();
        canonical = canonical
            .replace("1 кв", "I кв")
            .replace("2 кв", "II кв")
            .replace("3 кв", "III кв")
            .replace("4 кв", "IV кв");
        self.commissioning = Some(canonical.trim().to_string());
        Ok(())
    }

    // ----- plan / features / view -------------------------------------------

    pub fn set_plan(&mut self, value: &RawValue) {
        self.set_plan_from(value, None);
    }

    /// Stores the plan-image link, absolutizing site-relative paths against
    /// the explicit base or the configured site URL.
    pub fn set_plan_from(&mut self, value: &RawValue, base_url: Option<&str>) {
        let raw = value.link().unwrap_or_else(|| value.text()).trim();
        if raw.is_empty() {
            return;
        }
        let mut link = raw.to_string();
        if let Some(base) = base_url {
            link = text::join_url(base, &link);
        }
        if !link.contains("http") {
            if let Some(domain) = self
                .config
                .site_url
                .as_deref()
                .and_then(text::domain_of)
            {
                link = text::join_url(&domain, &link);
            }
        }
        self.plan = Some(link);
    }

    /// Appends a feature, duplicate-free; the euro-planning phrase is
    /// diverted to its own flag instead of the list.
    pub fn add_feature(&mut self, value: &str) {
        let cleaned = text::strip_tokens(value, &text::FEATURE_NOISE);
        if cleaned.is_empty() {
            return;
        }
        if cleaned.to_lowercase().contains("евро") {
            self.euro_planning = Some(1);
            return;
        }
        if !self.features.contains(&cleaned) {
            self.features.push(cleaned);
        }
    }

    pub fn add_view(&mut self, value: &str) {
        let cleaned = text::strip_tokens(value, &text::FEATURE_NOISE);
        if !cleaned.is_empty() {
            self.view.push(cleaned);
        }
    }

    pub fn set_level(&mut self, value: &str) {
        if value.to_lowercase().contains("двухуровневая") || value.contains('2') {
            self.add_feature("Двухуровневая");
        }
    }

    /// Presence words, a "+" marker, or a parseable positive area set the
    /// named feature; a failed area parse is swallowed silently.
    fn set_presence_feature(&mut self, value: &str, feature: &str) {
        let lowered = value.to_lowercase();
        if lowered.contains("терраса") {
            self.add_feature("Терраса");
        }
        if lowered.contains("балкон") {
            self.add_feature(feature);
        } else if lowered.contains("лоджия") {
            self.add_feature("Лоджия");
        } else if lowered.contains("да") || lowered.contains("есть") || lowered.contains('+') {
            self.add_feature(feature);
        } else if let Some(area) = text::extract_decimal(value) {
            if area != Decimal::ZERO {
                self.add_feature(feature);
            }
        }
    }

    pub fn set_balcony(&mut self, value: &str) {
        self.set_presence_feature(value, "Балкон");
    }

    pub fn set_loggia(&mut self, value: &str) {
        self.set_presence_feature(value, "Лоджия");
    }

    pub fn set_storeroom_feature(&mut self, value: &str) {
        self.set_presence_feature(value, "Кладовая");
    }

    pub fn set_terrace(&mut self, value: &str) {
        let lowered = value.to_lowercase();
        if lowered.contains("да") || lowered.contains("есть") || lowered.contains("терраса") {
            self.add_feature("Терраса");
        } else if let Some(area) = text::extract_decimal(value) {
            if area != Decimal::ZERO {
                self.add_feature("Терраса");
            }
        }
    }

    // ----- finalize ---------------------------------------------------------

    /// Runs record-level validation and corrective rewrites. Under
    /// `skip_wrong`, validation failures become a rejection marker instead
    /// of an error so batch processing can continue. Idempotent once the
    /// record has transitioned.
    pub fn finalize(&mut self) -> Result<FinalizeOutcome> {
        match &self.state {
            RecordState::Finalized => return Ok(FinalizeOutcome::Accepted),
            RecordState::Rejected(reason) => return Ok(FinalizeOutcome::Rejected(reason.clone())),
            RecordState::Open => {}
        }

        if !self.need_save {
            return Ok(self.reject(RejectReason::SkippedType));
        }

        if self.config.validate_data {
            if let Err(error) = self.validate_data_rules() {
                if !self.config.skip_wrong {
                    return Err(error);
                }
                warn!(%error, "record failed data validation, skipping");
                return Ok(self.reject(RejectReason::InvalidData(error.to_string())));
            }
        }
        if self.config.validate_price {
            if let Err(error) = self.validate_price_rules() {
                if !self.config.skip_wrong {
                    return Err(error);
                }
                warn!(%error, "record failed price validation, skipping");
                return Ok(self.reject(RejectReason::InvalidPrice(error.to_string())));
            }
        }

        self.clear_rooms_for_non_living();
        self.clear_in_sale_without_price();
        self.move_prices_to_finished();
        self.clear_equal_sale_prices();

        if self.object_type.is_none() {
            return Err(NormalizeError::Classification(
                "record has no canonical type at finalize".to_string(),
            ));
        }

        self.state = RecordState::Finalized;
        Ok(FinalizeOutcome::Accepted)
    }

    fn reject(&mut self, reason: RejectReason) -> FinalizeOutcome {
        self.need_save = false;
        self.state = RecordState::Rejected(reason.clone());
        FinalizeOutcome::Rejected(reason)
    }

    fn validate_data_rules(&self) -> Result<()> {
        if let Some(Rooms::Count(rooms)) = self.rooms {
            if rooms > 10 {
                if let Some(area) = self.area {
                    if area < Decimal::from(100) {
                        return Err(NormalizeError::Range(format!(
                            "{rooms} rooms in {area} m2"
                        )));
                    }
                }
            }
            if rooms > 30 {
                return Err(NormalizeError::Range(format!("room count {rooms}")));
            }
        }
        if let Some(floor) = self.floor {
            if floor > 100 {
                return Err(NormalizeError::Range(format!("floor {floor}")));
            }
        }
        let is_living = matches!(
            self.object_type,
            Some(ObjectType::Flat) | Some(ObjectType::Apartment)
        );
        if is_living {
            if let Some(area) = self.area {
                if area < Decimal::from(10) {
                    return Err(NormalizeError::Range(format!("area {area} too small for flat")));
                }
                if area > Decimal::from(3000) {
                    return Err(NormalizeError::Range(format!("area {area} too big for flat")));
                }
            }
        }
        if let (Some(area), Some(living_area)) = (self.area, self.living_area) {
            if living_area > area {
                return Err(NormalizeError::Consistency(format!(
                    "living_area {living_area} bigger than area {area}"
                )));
            }
        }
        if self.object_type == Some(ObjectType::Parking) {
            if let Some(area) = self.area {
                if area > Decimal::from(50) {
                    return Err(NormalizeError::Range(format!(
                        "area {area} too big for parking"
                    )));
                }
            }
        }
        if let Some(area) = self.area {
            if area <= Decimal::ONE {
                return Err(NormalizeError::Range(format!("area {area} <= 1")));
            }
        }
        Ok(())
    }

    fn validate_price_rules(&mut self) -> Result<()> {
        if let (Some(base), Some(sale)) = (self.price_base, self.price_sale) {
            if base < sale {
                if self.config.swap_wrong_prices {
                    self.price_base = Some(sale);
                    self.price_sale = Some(base);
                } else {
                    return Err(NormalizeError::Consistency(format!(
                        "base price {base} below sale price {sale}"
                    )));
                }
            }
        }
        if let (Some(finished), Some(finished_sale)) =
            (self.price_finished, self.price_finished_sale)
        {
            if finished < finished_sale {
                if self.config.swap_wrong_prices {
                    self.price_finished = Some(finished_sale);
                    self.price_finished_sale = Some(finished);
                } else {
                    return Err(NormalizeError::Consistency(format!(
                        "finished price {finished} below finished sale price {finished_sale}"
                    )));
                }
            }
        }
        if let Some(percent) = self.discount_percent {
            if percent > Decimal::from(30) {
                return Err(NormalizeError::Consistency(format!(
                    "discount rate {percent}% too big"
                )));
            }
        }

        let priced_type = matches!(
            self.object_type,
            Some(ObjectType::Flat) | Some(ObjectType::Apartment) | Some(ObjectType::Commercial)
        );
        if priced_type {
            let floor = self.config.minimal_allowed_price;
            for (name, price) in [
                ("price_base", self.price_base),
                ("price_sale", self.price_sale),
                ("price_finished", self.price_finished),
                ("price_finished_sale", self.price_finished_sale),
            ] {
                if let Some(price) = price {
                    if price < floor {
                        return Err(NormalizeError::Range(format!("{name} {price} too small")));
                    }
                }
            }
        }
        Ok(())
    }

    fn clear_rooms_for_non_living(&mut self) {
        if matches!(
            self.object_type,
            Some(ObjectType::Parking) | Some(ObjectType::Storeroom)
        ) {
            self.rooms = None;
        }
    }

    fn clear_in_sale_without_price(&mut self) {
        let any_price = self.price_base.is_some()
            || self.price_sale.is_some()
            || self.price_finished.is_some()
            || self.price_finished_sale.is_some();
        if !any_price {
            self.in_sale = Some(0);
        }
    }

    fn move_prices_to_finished(&mut self) {
        if self.finished == Some(Flag::Yes) {
            if self.price_base.is_some() && self.price_finished.is_none() {
                self.price_finished = self.price_base.take();
            }
            if self.price_sale.is_some() && self.price_finished_sale.is_none() {
                self.price_finished_sale = self.price_sale.take();
            }
        }
    }

    fn clear_equal_sale_prices(&mut self) {
        if self.price_base.is_some() && self.price_base == self.price_sale {
            self.price_sale = None;
        }
        if self.price_finished.is_some() && self.price_finished == self.price_finished_sale {
            self.price_finished_sale = None;
        }
    }

    // ----- export -----------------------------------------------------------

    /// Canonical public fields as a flat JSON mapping; decimals serialize as
    /// plain numbers, internal configuration and bookkeeping are excluded.
    pub fn export(&self) -> serde_json::Value {
        #[derive(Serialize)]
        struct ExportView<'a> {
            complex: &'a Option<String>,
            #[serde(rename = "type")]
            object_type: &'a Option<ObjectType>,
            building: &'a Option<String>,
            section: &'a Option<String>,
            number: &'a Option<String>,
            number_on_site: &'a Option<String>,
            price_base: &'a Option<Decimal>,
            price_sale: &'a Option<Decimal>,
            price_finished: &'a Option<Decimal>,
            price_finished_sale: &'a Option<Decimal>,
            furniture_price: &'a Option<Decimal>,
            discount: &'a Option<Decimal>,
            discount_percent: &'a Option<Decimal>,
            area: &'a Option<Decimal>,
            living_area: &'a Option<Decimal>,
            ceiling: &'a Option<Decimal>,
            rooms: &'a Option<Rooms>,
            floor: &'a Option<i32>,
            #[serde(skip_serializing_if = "Option::is_none")]
            floors: Option<&'a Vec<i32>>,
            in_sale: &'a Option<u8>,
            finished: &'a Option<Flag>,
            furniture: &'a Option<Flag>,
            sale_status: &'a Option<String>,
            commissioning: &'a Option<String>,
            article: &'a Option<String>,
            finishing_name: &'a Option<String>,
            feature: Option<&'a [String]>,
            view: Option<&'a [String]>,
            plan: &'a Option<String>,
            euro_planning: &'a Option<u8>,
            currency: &'a Option<String>,
            sale: &'a Option<String>,
            flat_url: &'a Option<String>,
        }

        let view = ExportView {
            complex: &self.complex,
            object_type: &self.object_type,
            building: &self.building,
            section: &self.section,
            number: &self.number,
            number_on_site: &self.number_on_site,
            price_base: &self.price_base,
            price_sale: &self.price_sale,
            price_finished: &self.price_finished,
            price_finished_sale: &self.price_finished_sale,
            furniture_price: &self.furniture_price,
            discount: &self.discount,
            discount_percent: &self.discount_percent,
            area: &self.area,
            living_area: &self.living_area,
            ceiling: &self.ceiling,
            rooms: &self.rooms,
            floor: &self.floor,
            floors: self.floors.as_ref(),
            in_sale: &self.in_sale,
            finished: &self.finished,
            furniture: &self.furniture,
            sale_status: &self.sale_status,
            commissioning: &self.commissioning,
            article: &self.article,
            finishing_name: &self.finishing_name,
            feature: (!self.features.is_empty()).then_some(self.features.as_slice()),
            view: (!self.view.is_empty()).then_some(self.view.as_slice()),
            plan: &self.plan,
            euro_planning: &self.euro_planning,
            currency: &self.currency,
            sale: &self.sale,
            flat_url: &self.flat_url,
        };
        serde_json::to_value(view).expect("export view serializes")
    }

    // ----- accessors --------------------------------------------------------

    pub fn object_type(&self) -> Option<ObjectType> {
        self.object_type
    }

    pub fn rooms(&self) -> Option<Rooms> {
        self.rooms
    }

    pub fn floor(&self) -> Option<i32> {
        self.floor
    }

    pub fn floors(&self) -> Option<&[i32]> {
        self.floors.as_deref()
    }

    pub fn area(&self) -> Option<Decimal> {
        self.area
    }

    pub fn living_area(&self) -> Option<Decimal> {
        self.living_area
    }

    pub fn ceiling(&self) -> Option<Decimal> {
        self.ceiling
    }

    pub fn price_base(&self) -> Option<Decimal> {
        self.price_base
    }

    pub fn price_sale(&self) -> Option<Decimal> {
        self.price_sale
    }

    pub fn price_finished(&self) -> Option<Decimal> {
        self.price_finished
    }

    pub fn price_finished_sale(&self) -> Option<Decimal> {
        self.price_finished_sale
    }

    pub fn in_sale(&self) -> Option<u8> {
        self.in_sale
    }

    pub fn finished(&self) -> Option<Flag> {
        self.finished
    }

    pub fn euro_planning(&self) -> Option<u8> {
        self.euro_planning
    }

    pub fn features(&self) -> &[String] {
        &self.features
    }

    pub fn view(&self) -> &[String] {
        &self.view
    }

    pub fn plan(&self) -> Option<&str> {
        self.plan.as_deref()
    }

    pub fn commissioning(&self) -> Option<&str> {
        self.commissioning.as_deref()
    }

    pub fn sale_status(&self) -> Option<&str> {
        self.sale_status.as_deref()
    }

    pub fn complex(&self) -> Option<&str> {
        self.complex.as_deref()
    }

    pub fn building(&self) -> Option<&str> {
        self.building.as_deref()
    }

    pub fn section(&self) -> Option<&str> {
        self.section.as_deref()
    }

    pub fn number(&self) -> Option<&str> {
        self.number.as_deref()
    }

    /// Whether the record survived classification and validation so far.
    pub fn is_savable(&self) -> bool {
        self.need_save
    }
}

fn parse_decimal(value: &str) -> Result<Decimal> {
    value
        .parse::<Decimal>()
        .map_err(|_| NormalizeError::Format(format!("not a number: `{value}`")))
}

fn roman_quarter(quarter: u32) -> &'static str {
    match quarter {
        1 => "I",
        2 => "II",
        3 => "III",
        _ => "IV",
    }
}

fn parse_masked_date(value: &str, mask: &str) -> Result<(i32, u32)> {
    use chrono::Datelike;
    if let Ok(datetime) = chrono::NaiveDateTime::parse_from_str(value, mask) {
        return Ok((datetime.year(), datetime.month()));
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(value, mask) {
        return Ok((date.year(), date.month()));
    }
    Err(NormalizeError::Format(format!(
        "commissioning `{value}` does not match mask `{mask}`"
    )))
}
