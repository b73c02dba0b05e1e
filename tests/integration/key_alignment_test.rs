use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Int64Type, Schema};
use arrow::record_batch::RecordBatch;
use syracuse_pb::schema::{
    AdaptationStrategy, TypeCompatibility, cast_column, check_type_compatibility, convert_array,
};
use syracuse_pb::schema::adapt::determine_adaptation_strategy;
use syracuse_pb::{AnalysisError, inner_join};

fn table(key: ArrayRef, name: &str, values: Vec<f64>) -> RecordBatch {
    RecordBatch::try_new(
        Arc::new(Schema::new(vec![
            Field::new("TRACT", key.data_type().clone(), true),
            Field::new(name, DataType::Float64, true),
        ])),
        vec![key, Arc::new(Float64Array::from(values))],
    )
    .unwrap()
}

#[test]
fn key_type_compatibility() {
    assert_eq!(
        check_type_compatibility(&DataType::Int64, &DataType::Int64),
        TypeCompatibility::Exact
    );
    assert_eq!(
        check_type_compatibility(&DataType::Float64, &DataType::Int64),
        TypeCompatibility::Compatible
    );
    assert_eq!(
        check_type_compatibility(&DataType::Utf8, &DataType::Int64),
        TypeCompatibility::Compatible
    );
    assert_eq!(
        check_type_compatibility(&DataType::Boolean, &DataType::Int64),
        TypeCompatibility::Incompatible
    );
    assert_eq!(
        determine_adaptation_strategy(&DataType::Int64, &DataType::Utf8),
        Some(AdaptationStrategy::StringConversion)
    );
}

#[test]
fn zero_padded_tracts_parse_to_integers() {
    let keys: ArrayRef = Arc::new(StringArray::from(vec![Some("005400"), Some(" 5500 "), None]));
    let converted = convert_array(&keys, &DataType::Int64).unwrap();
    let converted = converted.as_primitive::<Int64Type>();
    assert_eq!(converted.value(0), 5400);
    assert_eq!(converted.value(1), 5500);
    assert!(converted.is_null(2));
}

#[test]
fn unparsable_keys_fail_instead_of_nulling() {
    let keys: ArrayRef = Arc::new(StringArray::from(vec!["005400", "not a tract"]));
    assert!(convert_array(&keys, &DataType::Int64).is_err());
}

#[test]
fn cast_keys_join_across_sources() {
    let tracts = table(
        Arc::new(StringArray::from(vec!["005400", "005500", "005600"])),
        "AREA",
        vec![1.0, 2.0, 3.0],
    );
    let metals = table(Arc::new(Int64Array::from(vec![5600, 5400])), "Pb", vec![210.0, 95.0]);

    let err = inner_join(&tracts, &metals, "TRACT", "TRACT").unwrap_err();
    assert!(matches!(err, AnalysisError::KeyTypeMismatch { .. }));

    let tracts = cast_column(&tracts, "TRACT", &DataType::Int64).unwrap();
    let joined = inner_join(&tracts, &metals, "TRACT", "TRACT").unwrap();
    assert_eq!(joined.num_rows(), 2);
    assert_eq!(joined.num_columns(), 3);
    let keys = joined.column_by_name("TRACT").unwrap().as_primitive::<Int64Type>();
    assert_eq!(keys.values().to_vec(), vec![5400, 5600]);
}

#[test]
fn cast_of_missing_column_is_reported() {
    let batch = table(Arc::new(BooleanArray::from(vec![true])), "AREA", vec![1.0]);
    assert!(matches!(
        cast_column(&batch, "BKG_KEY", &DataType::Int64),
        Err(AnalysisError::MissingColumn(_))
    ));
    assert!(cast_column(&batch, "TRACT", &DataType::Int64).is_err());
}
