use geo::{Geometry, polygon};
use parcel_etl::{
    columns::{ColumnMapping, OPTIONAL_COLUMNS, REQUIRED_COLUMNS, resolve_columns},
    data::{Row, Table, Value},
    dedup::{CompositeKey, dedupe, has_unique_key},
    geometry::wkb::fingerprint,
};
use proptest::prelude::*;

const COLUMNS: [&str; 5] = ["county", "parcel_id", "owner_name", "sbl", "muni_name"];

fn mapping() -> ColumnMapping {
    let raw: Vec<String> = ["county_name", "swis_sbl_id", "primary_owner", "sbl", "muni_name"]
        .iter()
        .map(|c| c.to_string())
        .collect();
    resolve_columns(&raw, REQUIRED_COLUMNS, OPTIONAL_COLUMNS).expect("resolve columns")
}

fn square(offset: u8) -> Geometry<f64> {
    let x = f64::from(offset);
    polygon![
        (x: x, y: 0.0),
        (x: x + 1.0, y: 0.0),
        (x: x + 1.0, y: 1.0),
        (x: x, y: 1.0),
    ]
    .into()
}

fn small_text(choices: &'static [&'static str]) -> impl Strategy<Value = Value> {
    prop_oneof![
        1 => Just(Value::Null),
        4 => proptest::sample::select(choices).prop_map(|s| Value::Text(s.to_string())),
    ]
}

/// Rows drawn from a deliberately small value pool so collisions are common.
fn row_strategy() -> impl Strategy<Value = Row> {
    (
        small_text(&["Albany", "Erie"]),
        small_text(&["1", "2", "3", "4"]),
        small_text(&["Ann", "Bob"]),
        small_text(&["10.-1-1", "10.-1-2"]),
        small_text(&["Colonie", "Amherst"]),
        0u8..4,
    )
        .prop_map(|(county, id, owner, sbl, muni, offset)| {
            Row::new(vec![county, id, owner, sbl, muni], Some(square(offset)))
        })
}

/// Without the survey column no composite key resolves and stage 2 falls
/// back to the geometry alone.
fn table_of(rows: Vec<Row>, with_survey_key: bool) -> Table {
    let table = Table::with_rows(COLUMNS.iter().map(|c| c.to_string()).collect(), rows, None);
    if with_survey_key {
        table
    } else {
        table.drop_columns(|column| column == "sbl")
    }
}

proptest! {
    #[test]
    fn cascade_is_idempotent(
        rows in proptest::collection::vec(row_strategy(), 0..40),
        with_survey_key in any::<bool>()
    ) {
        let mapping = mapping();
        let (once, _) = dedupe(table_of(rows, with_survey_key), &mapping);
        let snapshot: Vec<Row> = once.rows().to_vec();
        let (twice, report) = dedupe(once, &mapping);
        prop_assert_eq!(report.removed(), 0);
        prop_assert_eq!(twice.rows(), snapshot.as_slice());
    }

    #[test]
    fn survivors_are_an_ordered_subsequence_with_unique_ids(
        rows in proptest::collection::vec(row_strategy(), 0..40),
        with_survey_key in any::<bool>()
    ) {
        let table = table_of(rows, with_survey_key);
        let input: Vec<Row> = table.rows().to_vec();
        let (table, report) = dedupe(table, &mapping());
        prop_assert_eq!(input.len() - table.len(), report.removed());
        prop_assert!(has_unique_key(&table, |row| row.values[1].clone()));
        if !with_survey_key {
            prop_assert_eq!(&report.composite_key, &CompositeKey::GeometryOnly);
            prop_assert!(has_unique_key(&table, |row| fingerprint(row.geometry.as_ref())));
        }

        let mut remaining = input.iter();
        for survivor in table.rows() {
            prop_assert!(remaining.any(|row| row == survivor));
        }
    }
}
