use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::Result;

/// Per-source normalization settings. Every toggle the record honors is an
/// explicit named field; sources override only what they need.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecordConfig {
    /// Base URL of the listing source, used to absolutize plan links.
    pub site_url: Option<String>,
    /// Run price validation during finalize.
    pub validate_price: bool,
    /// Run structural (type/area/room/floor) validation during finalize.
    pub validate_data: bool,
    /// Skip per-field price bound checks entirely.
    pub ignore_small_prices: bool,
    /// Minimum acceptable price for flats, apartments and commercial units.
    pub minimal_allowed_price: Decimal,
    /// Source-specific status strings meaning "in sale".
    pub in_sale_statuses: Vec<String>,
    /// Source-specific status strings meaning "reserved" (still in sale).
    pub reserved_statuses: Vec<String>,
    /// Source-specific status strings meaning "not in sale".
    pub not_in_sale_statuses: Vec<String>,
    /// Reclassify the record when a type synonym is embedded in other
    /// fields, instead of raising.
    pub correct_type_dynamic: bool,
    /// Silently reorder base/sale price pairs that arrive swapped.
    pub swap_wrong_prices: bool,
    /// Treat digit-free room text as "no value" instead of an error.
    pub ignore_empty_rooms: bool,
    /// Expand floor range/enumeration syntax into an explicit floor list.
    pub split_floors: bool,
    /// Multiplier applied to every decoded price (e.g. when a source
    /// publishes prices in thousands).
    pub price_multiplier: Option<Decimal>,
    /// Convert finalize validation failures into a rejection marker so
    /// batch processing can continue.
    pub skip_wrong: bool,
    /// Heuristic price repair: take the lower bound of range expressions
    /// and scale sub-1000 values assumed to be quoted in millions.
    pub auto_correct_price: bool,
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            site_url: None,
            validate_price: true,
            validate_data: true,
            ignore_small_prices: false,
            minimal_allowed_price: Decimal::from(500_000),
            in_sale_statuses: Vec::new(),
            reserved_statuses: Vec::new(),
            not_in_sale_statuses: Vec::new(),
            correct_type_dynamic: false,
            swap_wrong_prices: false,
            ignore_empty_rooms: false,
            split_floors: false,
            price_multiplier: None,
            skip_wrong: false,
            auto_correct_price: false,
        }
    }
}

impl RecordConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: RecordConfig = toml::from_str(&content)?;
        Ok(config)
    }
}
