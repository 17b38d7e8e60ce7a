use chrono::{Duration, TimeZone, Utc};
use formula_stream::{
    AutoEvaluate, ColumnConfig, ColumnId, Record, Schema, TableConfig, TableId, Value,
};
use pretty_assertions::assert_eq;

/// A table whose `Passes` column counts how many times each row has been computed.
fn counting_schema() -> (Schema, TableId, ColumnId) {
    let mut schema = Schema::new();
    let t = schema.create_table(&TableConfig::new("T")).unwrap();
    let passes = schema
        .create_column(&ColumnConfig::calc(
            "T",
            "Passes",
            "IF(ISNAN([out]), 0, [out] + 1)",
        ))
        .unwrap();
    (schema, t, passes)
}

#[test]
fn disabled_without_a_dwell() {
    let (mut schema, t, passes) = counting_schema();
    schema.append(t, &Record::new()).unwrap();

    let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    assert!(!schema.auto_evaluate(now));
    assert_eq!(schema.last_evaluated(), None);
    assert_eq!(schema.value(passes, 0).unwrap(), &Value::Blank);
}

#[test]
fn runs_a_full_pass_once_the_dwell_has_elapsed() {
    let (mut schema, t, passes) = counting_schema();
    schema.set_auto_evaluate(AutoEvaluate::every(Duration::seconds(10)));
    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();

    // Nothing appended yet.
    assert!(!schema.auto_evaluate(t0));

    schema.append(t, &Record::new()).unwrap();
    assert!(schema.auto_evaluate(t0));
    assert_eq!(schema.last_evaluated(), Some(t0));
    assert_eq!(schema.column_values(passes).unwrap(), vec![Value::Number(0.0)]);

    // No appends since the last cycle.
    assert!(!schema.auto_evaluate(t0 + Duration::seconds(30)));

    schema.append(t, &Record::new()).unwrap();
    assert!(!schema.auto_evaluate(t0 + Duration::seconds(5)));
    assert!(schema.auto_evaluate(t0 + Duration::seconds(10)));
    assert_eq!(schema.last_evaluated(), Some(t0 + Duration::seconds(10)));
    // Full pass: the old row is recomputed along with the new one.
    assert_eq!(
        schema.column_values(passes).unwrap(),
        vec![Value::Number(1.0), Value::Number(0.0)]
    );
}

#[test]
fn explicit_evaluation_resets_the_clock() {
    let (mut schema, t, _) = counting_schema();
    schema.set_auto_evaluate(AutoEvaluate::every(Duration::minutes(1)));
    let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 8, 30, 0).unwrap();

    schema.append(t, &Record::new()).unwrap();
    schema.evaluate_at(t0);
    assert_eq!(schema.last_evaluated(), Some(t0));

    schema.append(t, &Record::new()).unwrap();
    assert!(!schema.auto_evaluate(t0 + Duration::seconds(59)));
    assert!(schema.auto_evaluate(t0 + Duration::minutes(1)));
}
