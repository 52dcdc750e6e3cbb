//! End-to-end: raw source data through the resolver into a canonical
//! record, finalized and exported.

use rust_decimal::Decimal;
use serde_json::json;

use estate_normalizer::{
    CanonicalRecord, FieldResolver, FinalizeOutcome, RawValue, RecordConfig, RejectReason, Rooms,
};

fn resolve_mapping(config: RecordConfig, pairs: &[(&str, &str)]) -> CanonicalRecord {
    let resolver = FieldResolver::default();
    let mut record = CanonicalRecord::new(config);
    let values: Vec<(&str, RawValue)> = pairs
        .iter()
        .map(|(label, value)| (*label, RawValue::from(*value)))
        .collect();
    resolver
        .apply_mapping(&mut record, values.iter().map(|(l, v)| (*l, v)))
        .expect("mapping resolves");
    record
}

#[test]
fn noisy_listing_normalizes_into_canonical_record() {
    let mut record = resolve_mapping(
        RecordConfig::default(),
        &[
            ("Корпус", "корп. 2"),
            ("Секция", "секция №4"),
            ("№ квартиры", "кв. 17"),
            ("Количество комнат", "3-х комнатная"),
            ("Общая площадь, м²", "81,4"),
            ("Жилая площадь", "44,9"),
            ("Этаж", "5/12"),
            ("Стоимость", "12 750 000 руб."),
            ("Статус", "Свободна"),
            ("Отделка", "Комфорт"),
            ("Балкон", "6,1"),
            ("Вид из окон", "во двор"),
        ],
    );

    assert_eq!(record.finalize().unwrap(), FinalizeOutcome::Accepted);

    let exported = record.export();
    assert_eq!(exported["building"], json!("2"));
    assert_eq!(exported["section"], json!("4"));
    assert_eq!(exported["number"], json!("17"));
    assert_eq!(exported["rooms"], json!(3));
    assert_eq!(exported["area"], json!(81.4));
    assert_eq!(exported["living_area"], json!(44.9));
    assert_eq!(exported["floor"], json!(5));
    // finished=1 moves the base price into the finished slot
    assert_eq!(exported["price_base"], json!(null));
    assert_eq!(exported["price_finished"], json!(12_750_000.0));
    assert_eq!(exported["finished"], json!(1));
    assert_eq!(exported["finishing_name"], json!("Комфорт"));
    assert_eq!(exported["in_sale"], json!(1));
    assert_eq!(exported["feature"], json!(["Балкон"]));
    assert_eq!(exported["view"], json!(["во двор"]));
    assert_eq!(exported["type"], json!("flat"));
}

#[test]
fn studio_listing_with_basement_floor() {
    let mut record = resolve_mapping(
        RecordConfig::default(),
        &[
            ("rooms", "студия"),
            ("area", "24,8"),
            ("floor", "цоколь"),
            ("price", "4 500 000 руб."),
        ],
    );
    assert_eq!(record.rooms(), Some(Rooms::Studio));
    assert_eq!(record.floor(), Some(-1));
    assert_eq!(record.price_base(), Some(Decimal::from(4_500_000)));
    assert_eq!(record.finalize().unwrap(), FinalizeOutcome::Accepted);
}

#[test]
fn skip_type_record_is_rejected_without_error() {
    let mut record = CanonicalRecord::new(RecordConfig::default());
    record.set_type("вилла").unwrap();
    record.set_area("420").unwrap();
    assert_eq!(
        record.finalize().unwrap(),
        FinalizeOutcome::Rejected(RejectReason::SkippedType)
    );
    // A second finalize reports the same outcome without further mutation.
    assert_eq!(
        record.finalize().unwrap(),
        FinalizeOutcome::Rejected(RejectReason::SkippedType)
    );
}

#[test]
fn batch_continues_past_invalid_records_with_skip_wrong() {
    let config = RecordConfig {
        skip_wrong: true,
        ..RecordConfig::default()
    };

    // Living area above total area is a consistency failure.
    let mut bad = resolve_mapping(
        config.clone(),
        &[("area", "40"), ("living_area", "55"), ("price", "6 000 000")],
    );
    let outcome = bad.finalize().unwrap();
    assert!(matches!(
        outcome,
        FinalizeOutcome::Rejected(RejectReason::InvalidData(_))
    ));

    let mut good = resolve_mapping(
        config,
        &[("area", "40"), ("living_area", "22"), ("price", "6 000 000")],
    );
    assert_eq!(good.finalize().unwrap(), FinalizeOutcome::Accepted);
}

#[test]
fn plan_node_resolves_against_site_url() {
    let config = RecordConfig {
        site_url: Some("https://example.com/flats/search".to_string()),
        ..RecordConfig::default()
    };
    let resolver = FieldResolver::default();
    let mut record = CanonicalRecord::new(config);
    let node = RawValue::Node {
        text: String::new(),
        link: Some("/plans/a-17.png".to_string()),
    };
    resolver.apply_one(&mut record, "план", &node).unwrap();
    assert_eq!(record.plan(), Some("https://example.com/plans/a-17.png"));
}

#[test]
fn split_floors_expand_for_multi_floor_commercial_units() {
    let config = RecordConfig {
        split_floors: true,
        correct_type_dynamic: true,
        ..RecordConfig::default()
    };
    let mut record = resolve_mapping(
        config,
        &[
            ("тип квартиры", "псн"),
            ("этаж", "1-2"),
            ("цена", "21 000 000"),
            ("площадь", "160"),
        ],
    );
    assert_eq!(record.floors(), Some(&[1, 2][..]));
    assert_eq!(record.finalize().unwrap(), FinalizeOutcome::Accepted);
    let exported = record.export();
    assert_eq!(exported["floors"], json!([1, 2]));
    assert_eq!(exported["type"], json!("commercial"));
}
