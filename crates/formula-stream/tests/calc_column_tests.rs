use formula_stream::{ColumnConfig, Record, Schema, StreamError, TableConfig, Value};
use pretty_assertions::assert_eq;

fn number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => *n,
        other => panic!("expected a number, got {other:?}"),
    }
}

#[test]
fn calc_column_adds_constant() {
    let mut schema = Schema::new();
    let t = schema.create_table(&TableConfig::new("T")).unwrap();
    schema
        .create_column(&ColumnConfig::free("T", "A", "Double"))
        .unwrap();
    let b = schema
        .create_column(&ColumnConfig::calc("T", "B", "[A] + 2"))
        .unwrap();

    let row = schema.append(t, &Record::new().with("A", 5.0)).unwrap();
    let report = schema.evaluate();

    assert_eq!(report.evaluated, vec![b]);
    assert!(report.is_clean());
    assert_eq!(schema.value(b, row).unwrap(), &Value::Number(7.0));
}

#[test]
fn null_input_becomes_nan() {
    let mut schema = Schema::new();
    let t = schema.create_table(&TableConfig::new("T")).unwrap();
    schema
        .create_column(&ColumnConfig::free("T", "A", "Double"))
        .unwrap();
    let b = schema
        .create_column(&ColumnConfig::calc("T", "B", "[A] + 2"))
        .unwrap();

    let explicit = schema
        .append(t, &Record::new().with("A", Value::Blank))
        .unwrap();
    let missing = schema.append(t, &Record::new()).unwrap();
    schema.evaluate();

    assert!(number(schema.value(b, explicit).unwrap()).is_nan());
    assert!(number(schema.value(b, missing).unwrap()).is_nan());
    assert_eq!(schema.evaluate_error(b), None);
}

#[test]
fn empty_formula_writes_default_value() {
    let mut schema = Schema::new();
    let t = schema.create_table(&TableConfig::new("T")).unwrap();
    let d = schema
        .create_column(&ColumnConfig::calc("T", "D", "").with_default(42))
        .unwrap();

    schema.append(t, &Record::new()).unwrap();
    schema.append(t, &Record::new()).unwrap();
    schema.evaluate();

    assert_eq!(
        schema.column_values(d).unwrap(),
        vec![Value::Number(42.0), Value::Number(42.0)]
    );
}

#[test]
fn only_new_rows_are_rescanned() {
    let mut schema = Schema::new();
    let t = schema.create_table(&TableConfig::new("T")).unwrap();
    // Counts how many times each row has been computed.
    let passes = schema
        .create_column(&ColumnConfig::calc(
            "T",
            "Passes",
            "IF(ISNAN([out]), 0, [out] + 1)",
        ))
        .unwrap();

    schema.append(t, &Record::new()).unwrap();
    schema.evaluate();
    schema.append(t, &Record::new()).unwrap();
    schema.evaluate();
    schema.evaluate();
    assert_eq!(
        schema.column_values(passes).unwrap(),
        vec![Value::Number(0.0), Value::Number(0.0)]
    );

    schema.evaluate_full();
    assert_eq!(
        schema.column_values(passes).unwrap(),
        vec![Value::Number(1.0), Value::Number(1.0)]
    );
}

#[test]
fn lone_reference_passes_text_through() {
    let mut schema = Schema::new();
    let t = schema.create_table(&TableConfig::new("T")).unwrap();
    schema
        .create_column(&ColumnConfig::free("T", "Name", "String"))
        .unwrap();
    let alias = schema
        .create_column(&ColumnConfig::calc("T", "Alias", " [Name] ").with_output("String"))
        .unwrap();
    let greeting = schema
        .create_column(
            &ColumnConfig::calc("T", "Greeting", "\"hi \" & [Name]").with_output("String"),
        )
        .unwrap();

    let row = schema.append(t, &Record::new().with("name", "ada")).unwrap();
    schema.evaluate();

    assert_eq!(schema.value(alias, row).unwrap(), &Value::from("ada"));
    assert_eq!(schema.value(greeting, row).unwrap(), &Value::from("hi ada"));
}

#[test]
fn columns_defined_out_of_order_evaluate_in_dependency_order() {
    let mut schema = Schema::new();
    let t = schema.create_table(&TableConfig::new("T")).unwrap();
    schema
        .create_column(&ColumnConfig::free("T", "a", "Double"))
        .unwrap();
    let c = schema
        .create_column(&ColumnConfig::calc("T", "C", "[B] * 2"))
        .unwrap();
    let b = schema
        .create_column(&ColumnConfig::calc("T", "B", "[a] + 1"))
        .unwrap();

    let schedule = schema.schedule();
    assert_eq!(schedule.layer_of(b), Some(0));
    assert_eq!(schedule.layer_of(c), Some(1));

    schema.append(t, &Record::new().with("a", 1.0)).unwrap();
    schema.append(t, &Record::new().with("a", 10.0)).unwrap();
    schema.evaluate();

    assert_eq!(
        schema.column_values(c).unwrap(),
        vec![Value::Number(4.0), Value::Number(22.0)]
    );
}

#[test]
fn text_in_arithmetic_is_an_evaluate_error() {
    let mut schema = Schema::new();
    let t = schema.create_table(&TableConfig::new("T")).unwrap();
    schema
        .create_column(&ColumnConfig::free("T", "Name", "String"))
        .unwrap();
    let b = schema
        .create_column(&ColumnConfig::calc("T", "B", "[Name] + 1"))
        .unwrap();

    schema.append(t, &Record::new().with("Name", "x")).unwrap();
    let report = schema.evaluate();

    assert_eq!(report.failed, vec![b]);
    assert!(matches!(schema.evaluate_error(b), Some(StreamError::Evaluate(_))));
    assert_eq!(schema.translate_error(b), None);
}
