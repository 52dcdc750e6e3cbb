//! Maps arbitrary source field labels onto canonical record operations by
//! synonym matching, and drives whole mappings, parallel sequences, and
//! tables through the record's setters.

use once_cell::sync::Lazy;
use tracing::debug;

use crate::error::{NormalizeError, Result};
use crate::record::CanonicalRecord;
use crate::text;
use crate::types::{RawValue, Table};

/// Canonical record operations reachable from a raw source label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    InSale,
    Rooms,
    Area,
    PriceBase,
    Building,
    Number,
    NumberOnSite,
    Section,
    LivingArea,
    Ceiling,
    Floor,
    FinishingName,
    PriceSale,
    Plan,
    Level,
    Balcony,
    Loggia,
    Terrace,
    View,
}

/// How labels are matched against the synonym table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    /// The synonym may appear anywhere inside the label; longer synonyms
    /// win ties.
    #[default]
    Substring,
    /// The cleaned label must equal the synonym, case-insensitively.
    Exact,
}

/// (label, operation) pairs flattened from per-operation synonym sets and
/// sorted by descending label length so more specific labels win ties.
/// Built once and shared by every resolver instance.
static SYNONYMS: Lazy<Vec<(&'static str, FieldOp)>> = Lazy::new(|| {
    let groups: &[(FieldOp, &[&str])] = &[
        (
            FieldOp::InSale,
            &[
                "статус",
                "available",
                "statusflat",
                "st",
                "crm_status",
                "salesstatustext",
                "status",
                "isavailable",
                "in_sale",
            ],
        ),
        (
            FieldOp::Rooms,
            &[
                "количество комнат",
                "rooms_count",
                "roomsquantity",
                "кол-во комнат",
                "тип квартиры",
                "число комнат",
                "комнат в квартире",
                "roomsnumber",
                "rc",
                "комнат",
                "room_count",
                "rooms",
                "roomtype",
                "sumrooms",
                "crm_rooms",
                "roomscount",
                "numberofrooms",
                "room",
                "room_type",
            ],
        ),
        (
            FieldOp::Area,
            &[
                "общая площадь",
                "area",
                "fullflat",
                "метраж",
                "s общ",
                "totalsquare",
                "square",
                "sq",
                "общая пл.",
                "общая s",
                "общая",
                "площадь",
                "square_total",
                "crm_area_value",
                "totalarea",
                "area_all",
                "stotal",
                "areatotal",
            ],
        ),
        (
            FieldOp::PriceBase,
            &[
                "price",
                "priceflat",
                "tc",
                "цены",
                "total_cost",
                "pricetotal",
                "цена",
                "стоимость",
                "totalcost",
                "crm_price_value",
                "cтоимость",
                "price_base",
            ],
        ),
        (
            FieldOp::Building,
            &[
                "housing",
                "building",
                "дом",
                "корпус",
                "b",
                "building_number",
                "house",
                "corpus_label",
                "corpus",
            ],
        ),
        (
            FieldOp::Number,
            &[
                "№ кв",
                "№ квартиры",
                "номер",
                "number",
                "nt",
                "n",
                "flat_number",
                "num",
                "№",
                "flatnumber",
                "crm_number",
                "apartmentnumber",
                "flat_num",
            ],
        ),
        (
            FieldOp::NumberOnSite,
            &[
                "numberonfloor",
                "number_on_floor",
                "№ на этаже",
                "flatonfloor",
                "number_on_site",
            ],
        ),
        (
            FieldOp::Section,
            &[
                "section",
                "секция",
                "парадная",
                "s",
                "section_number",
                "entrance",
                "подъезд",
            ],
        ),
        (
            FieldOp::LivingArea,
            &[
                "жилая площадь",
                "площадь комнат",
                "жилая",
                "s комнат",
                "livingsquare",
                "area-live",
                "жил. площадь",
                "area_live",
                "area_living",
                "жилая пл.",
                "square_living",
                "livingarea",
                "arealiving",
                "living_area",
            ],
        ),
        (
            FieldOp::Ceiling,
            &[
                "высота потолков",
                "ceilingheight",
                "потолки",
                "высота потолка",
                "потолок",
                "ceiling",
            ],
        ),
        (
            FieldOp::Floor,
            &["этаж", "floor", "f", "floor_number", "crm_floor", "floornumber"],
        ),
        (
            FieldOp::FinishingName,
            &["отделка", "decoration", "renovation", "finish", "has_interior"],
        ),
        (
            FieldOp::PriceSale,
            &["цена со скидкой", "discountprice", "price_sale"],
        ),
        (
            FieldOp::Plan,
            &[
                "imglink",
                "flatplanimageurl",
                "план",
                "img",
                "plan",
                "pic",
                "imageurl",
                "image",
            ],
        ),
        (FieldOp::Level, &["количество уровней", "level"]),
        (
            FieldOp::Balcony,
            &[
                "балкон",
                "balcony",
                "площадь балкона",
                "площадь лоджии",
                "balconsquare",
                "crm_balcony_count",
                "balconiescount",
            ],
        ),
        (FieldOp::Loggia, &["лоджия", "crm_loggia_count", "loggiascount"]),
        (FieldOp::Terrace, &["терраса", "площадь террасы"]),
        (
            FieldOp::View,
            &[
                "вид из окон",
                "окна",
                "вид",
                "view",
                "сторона света",
                "crm_window_view",
            ],
        ),
    ];
    let mut pairs: Vec<(&'static str, FieldOp)> = Vec::new();
    for (op, labels) in groups {
        for label in *labels {
            pairs.push((label, *op));
        }
    }
    pairs.sort_by_key(|(label, _)| std::cmp::Reverse(label.chars().count()));
    pairs
});

/// Raw labels that must never be resolved (per-square-meter prices, kitchen
/// areas and other derived fields that would corrupt canonical ones).
const DEFAULT_BLOCKED_LABELS: &[&str] = &[
    "цена за 1",
    "цена за кв.м",
    "площадь кухни",
    "datepriceincrease",
    "withpriceincrease",
    "meterprice",
    "цена руб/м 2",
];

/// Resolves (label, value) pairs onto canonical record operations.
///
/// The synonym table is a shared static; each instance owns its denylists,
/// so resolvers can be handed to parallel workers without sharing mutable
/// state.
#[derive(Debug, Clone)]
pub struct FieldResolver {
    mode: MatchMode,
    blocked_labels: Vec<String>,
    blocked_ops: Vec<FieldOp>,
    allowed_ops: Option<Vec<FieldOp>>,
}

impl Default for FieldResolver {
    fn default() -> Self {
        Self::new(MatchMode::Substring)
    }
}

impl FieldResolver {
    pub fn new(mode: MatchMode) -> Self {
        Self {
            mode,
            blocked_labels: DEFAULT_BLOCKED_LABELS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            blocked_ops: Vec::new(),
            allowed_ops: None,
        }
    }

    /// Adds source-specific labels to ignore before matching.
    pub fn block_labels<I: IntoIterator<Item = S>, S: Into<String>>(mut self, labels: I) -> Self {
        self.blocked_labels
            .extend(labels.into_iter().map(|l| l.into().to_lowercase()));
        self
    }

    /// Suppresses operations after matching.
    pub fn block_ops(mut self, ops: impl IntoIterator<Item = FieldOp>) -> Self {
        self.blocked_ops.extend(ops);
        self
    }

    /// Restricts resolution to the listed operations.
    pub fn allow_only(mut self, ops: impl IntoIterator<Item = FieldOp>) -> Self {
        self.allowed_ops = Some(ops.into_iter().collect());
        self
    }

    fn clean_label(&self, label: &str) -> String {
        let normalized = text::normalize_ws(label);
        match self.mode {
            MatchMode::Exact => text::strip_tokens(&normalized, &text::LABEL_UNIT_NOISE),
            MatchMode::Substring => normalized,
        }
    }

    /// Finds the operation for a cleaned label under the current policy.
    pub fn resolve_label(&self, label: &str) -> Option<FieldOp> {
        let cleaned = self.clean_label(label).to_lowercase();
        SYNONYMS
            .iter()
            .find(|(synonym, _)| match self.mode {
                MatchMode::Exact => cleaned == *synonym,
                MatchMode::Substring => cleaned.contains(synonym),
            })
            .map(|(_, op)| *op)
    }

    /// Resolves one (label, value) pair and invokes the matching record
    /// setter with the cleaned value. Returns the operation applied, if any.
    pub fn apply_one(
        &self,
        record: &mut CanonicalRecord,
        label: &str,
        value: &RawValue,
    ) -> Result<Option<FieldOp>> {
        let cleaned_label = self.clean_label(label);
        if cleaned_label.is_empty() {
            return Ok(None);
        }
        if self
            .blocked_labels
            .iter()
            .any(|blocked| blocked == &cleaned_label.to_lowercase())
        {
            debug!(label = %cleaned_label, "label is denylisted, skipping");
            return Ok(None);
        }

        let Some(op) = self.resolve_label(&cleaned_label) else {
            return Ok(None);
        };
        if let Some(allowed) = &self.allowed_ops {
            if !allowed.contains(&op) {
                return Ok(None);
            }
        }
        if self.blocked_ops.contains(&op) {
            debug!(?op, "operation is denylisted, skipping");
            return Ok(None);
        }

        let cleaned_value = text::normalize_ws(value.text());
        // The plan operation needs the structured value so it can pull a
        // link out of a node; everything else gets cleaned text, and empty
        // text means there is nothing to set.
        if op != FieldOp::Plan && cleaned_value.is_empty() {
            return Ok(None);
        }

        match op {
            FieldOp::InSale => record.set_in_sale(&cleaned_value)?,
            FieldOp::Rooms => record.set_rooms(&cleaned_value)?,
            FieldOp::Area => record.set_area(&cleaned_value)?,
            FieldOp::PriceBase => record.set_price_base(&cleaned_value)?,
            FieldOp::Building => record.set_building(&cleaned_value),
            FieldOp::Number => record.set_number(&cleaned_value)?,
            FieldOp::NumberOnSite => record.set_number_on_site(&cleaned_value),
            FieldOp::Section => record.set_section(&cleaned_value),
            FieldOp::LivingArea => record.set_living_area(&cleaned_value)?,
            FieldOp::Ceiling => record.set_ceiling(&cleaned_value)?,
            FieldOp::Floor => record.set_floor(&cleaned_value)?,
            FieldOp::FinishingName => record.set_finishing_name(&cleaned_value),
            FieldOp::PriceSale => record.set_price_sale(&cleaned_value)?,
            FieldOp::Plan => record.set_plan(value),
            FieldOp::Level => record.set_level(&cleaned_value),
            FieldOp::Balcony => record.set_balcony(&cleaned_value),
            FieldOp::Loggia => record.set_loggia(&cleaned_value),
            FieldOp::Terrace => record.set_terrace(&cleaned_value),
            FieldOp::View => record.add_view(&cleaned_value),
        }
        Ok(Some(op))
    }

    /// Resolves every pair of a label -> value mapping.
    pub fn apply_mapping<'a, I>(&self, record: &mut CanonicalRecord, mapping: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, &'a RawValue)>,
    {
        for (label, value) in mapping {
            self.apply_one(record, label, value)?;
        }
        Ok(())
    }

    /// Resolves parallel label/value sequences of equal length.
    pub fn apply_pairs(
        &self,
        record: &mut CanonicalRecord,
        labels: &[&str],
        values: &[RawValue],
    ) -> Result<()> {
        if labels.len() != values.len() {
            return Err(NormalizeError::LengthMismatch {
                labels: labels.len(),
                values: values.len(),
            });
        }
        for (label, value) in labels.iter().zip(values) {
            self.apply_one(record, label, value)?;
        }
        Ok(())
    }

    /// Resolves tabular input. Three physical shapes are supported: a header
    /// row followed by data rows, alternating label/value cell pairs per
    /// row, and one header cell per data row.
    pub fn apply_table(&self, record: &mut CanonicalRecord, table: &Table) -> Result<()> {
        let Some(first) = table.rows.first() else {
            return Ok(());
        };

        if first.headers.is_empty() {
            // Rows carry (label, value) cell pairs.
            for row in &table.rows {
                if row.cells.len() != 2 {
                    return Err(NormalizeError::Structural(format!(
                        "expected a label/value cell pair, got {} cells",
                        row.cells.len()
                    )));
                }
                self.apply_one(record, row.cells[0].text(), &row.cells[1])?;
            }
        } else if first.headers.len() == 1 {
            // Each row carries its own single header cell plus a data cell.
            for row in &table.rows {
                if row.headers.len() > 1 {
                    return Err(NormalizeError::Structural(format!(
                        "expected one header cell per row, got {}",
                        row.headers.len()
                    )));
                }
                if let (Some(header), Some(cell)) = (row.headers.first(), row.cells.first()) {
                    self.apply_one(record, header.text(), cell)?;
                }
            }
        } else {
            // A header row followed by data rows of the same width.
            for row in table.rows.iter().skip(1) {
                if row.cells.len() != first.headers.len() {
                    return Err(NormalizeError::Structural(format!(
                        "row has {} cells but the header has {}",
                        row.cells.len(),
                        first.headers.len()
                    )));
                }
                for (header, cell) in first.headers.iter().zip(&row.cells) {
                    self.apply_one(record, header.text(), cell)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecordConfig;
    use crate::record::Rooms;
    use crate::types::TableRow;
    use rust_decimal::Decimal;

    fn record() -> CanonicalRecord {
        CanonicalRecord::new(RecordConfig::default())
    }

    #[test]
    fn longest_synonym_wins_in_substring_mode() {
        let resolver = FieldResolver::default();
        // "жилая площадь" contains both the living-area synonym and the
        // bare "площадь" area synonym; the longer one must win.
        assert_eq!(
            resolver.resolve_label("Жилая площадь, м²"),
            Some(FieldOp::LivingArea)
        );
        assert_eq!(resolver.resolve_label("Площадь"), Some(FieldOp::Area));
    }

    #[test]
    fn exact_mode_requires_full_equality() {
        let resolver = FieldResolver::new(MatchMode::Exact);
        assert_eq!(resolver.resolve_label("этаж"), Some(FieldOp::Floor));
        assert_eq!(resolver.resolve_label("этажность дома"), None);
        // Unit noise is stripped before the comparison.
        assert_eq!(resolver.resolve_label("площадь, м²"), Some(FieldOp::Area));
    }

    #[test]
    fn canonical_field_names_round_trip() {
        let resolver = FieldResolver::default();
        let expected = [
            ("rooms", FieldOp::Rooms),
            ("area", FieldOp::Area),
            ("living_area", FieldOp::LivingArea),
            ("price_base", FieldOp::PriceBase),
            ("price_sale", FieldOp::PriceSale),
            ("floor", FieldOp::Floor),
            ("building", FieldOp::Building),
            ("section", FieldOp::Section),
            ("number", FieldOp::Number),
            ("number_on_site", FieldOp::NumberOnSite),
            ("plan", FieldOp::Plan),
            ("view", FieldOp::View),
            ("ceiling", FieldOp::Ceiling),
            ("in_sale", FieldOp::InSale),
        ];
        for (label, op) in expected {
            assert_eq!(resolver.resolve_label(label), Some(op), "label `{label}`");
        }
    }

    #[test]
    fn denylisted_label_is_ignored() {
        let resolver = FieldResolver::default();
        let mut rec = record();
        let applied = resolver
            .apply_one(&mut rec, "Цена за кв.м", &RawValue::from("250 000"))
            .unwrap();
        assert_eq!(applied, None);
        assert_eq!(rec.price_base(), None);
    }

    #[test]
    fn denylisted_op_is_suppressed_after_matching() {
        let resolver = FieldResolver::default().block_ops([FieldOp::View]);
        let mut rec = record();
        let applied = resolver
            .apply_one(&mut rec, "Вид из окон", &RawValue::from("во двор"))
            .unwrap();
        assert_eq!(applied, None);
        assert!(rec.view().is_empty());
    }

    #[test]
    fn empty_value_skips_everything_but_plan() {
        let resolver = FieldResolver::default();
        let mut rec = record();
        assert_eq!(
            resolver
                .apply_one(&mut rec, "Площадь", &RawValue::from(" "))
                .unwrap(),
            None
        );

        let node = RawValue::Node {
            text: String::new(),
            link: Some("/plans/17.png".to_string()),
        };
        let applied = resolver.apply_one(&mut rec, "план", &node).unwrap();
        assert_eq!(applied, Some(FieldOp::Plan));
        assert_eq!(rec.plan(), Some("/plans/17.png"));
    }

    #[test]
    fn mapping_fills_a_record() {
        let resolver = FieldResolver::default();
        let mut rec = record();
        let pairs = [
            ("Количество комнат", RawValue::from("2-х комнатная")),
            ("Общая площадь, м²", RawValue::from("54,3")),
            ("Этаж", RawValue::from("5/12")),
            ("Стоимость", RawValue::from("7 400 000 руб.")),
            ("Статус", RawValue::from("Свободна")),
        ];
        resolver
            .apply_mapping(&mut rec, pairs.iter().map(|(l, v)| (*l, v)))
            .unwrap();
        assert_eq!(rec.rooms(), Some(Rooms::Count(2)));
        assert_eq!(rec.area(), Some(Decimal::new(543, 1)));
        assert_eq!(rec.floor(), Some(5));
        assert_eq!(rec.price_base(), Some(Decimal::from(7_400_000)));
        assert_eq!(rec.in_sale(), Some(1));
    }

    #[test]
    fn pairs_of_unequal_length_error() {
        let resolver = FieldResolver::default();
        let mut rec = record();
        let err = resolver
            .apply_pairs(&mut rec, &["этаж", "площадь"], &[RawValue::from("3")])
            .unwrap_err();
        assert!(matches!(err, NormalizeError::LengthMismatch { .. }));
    }

    #[test]
    fn table_with_header_row() {
        let resolver = FieldResolver::default();
        let mut rec = record();
        let table = Table {
            rows: vec![
                TableRow {
                    headers: vec![RawValue::from("Этаж"), RawValue::from("Площадь")],
                    cells: vec![],
                },
                TableRow {
                    headers: vec![],
                    cells: vec![RawValue::from("8"), RawValue::from("41,2")],
                },
            ],
        };
        resolver.apply_table(&mut rec, &table).unwrap();
        assert_eq!(rec.floor(), Some(8));
        assert_eq!(rec.area(), Some(Decimal::new(412, 1)));
    }

    #[test]
    fn table_of_label_value_rows() {
        let resolver = FieldResolver::default();
        let mut rec = record();
        let table = Table {
            rows: vec![
                TableRow {
                    headers: vec![],
                    cells: vec![RawValue::from("Корпус"), RawValue::from("корп. 3")],
                },
                TableRow {
                    headers: vec![],
                    cells: vec![RawValue::from("Секция"), RawValue::from("секция №2")],
                },
            ],
        };
        resolver.apply_table(&mut rec, &table).unwrap();
        assert_eq!(rec.building(), Some("3"));
        assert_eq!(rec.section(), Some("2"));
    }

    #[test]
    fn malformed_table_row_errors() {
        let resolver = FieldResolver::default();
        let mut rec = record();
        let table = Table {
            rows: vec![TableRow {
                headers: vec![],
                cells: vec![RawValue::from("Корпус")],
            }],
        };
        let err = resolver.apply_table(&mut rec, &table).unwrap_err();
        assert!(matches!(err, NormalizeError::Structural(_)));
    }

    #[test]
    fn table_with_per_row_headers() {
        let resolver = FieldResolver::default();
        let mut rec = record();
        let table = Table {
            rows: vec![
                TableRow {
                    headers: vec![RawValue::from("Отделка")],
                    cells: vec![RawValue::from("Белая коробка")],
                },
                TableRow {
                    headers: vec![RawValue::from("Вид")],
                    cells: vec![RawValue::from("на парк")],
                },
            ],
        };
        resolver.apply_table(&mut rec, &table).unwrap();
        assert_eq!(rec.view(), ["на парк"]);
        let exported = rec.export();
        assert_eq!(exported["finishing_name"], serde_json::json!("Белая коробка"));
    }
}
