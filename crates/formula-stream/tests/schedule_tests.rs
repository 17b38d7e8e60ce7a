use formula_stream::{ColumnConfig, Record, Schema, StreamError, TableConfig, Value};
use pretty_assertions::assert_eq;

#[test]
fn unresolved_paths_short_circuit_dependents() {
    let mut schema = Schema::new();
    let t = schema.create_table(&TableConfig::new("T")).unwrap();
    schema
        .create_column(&ColumnConfig::free("T", "A", "Double"))
        .unwrap();
    let broken = schema
        .create_column(&ColumnConfig::calc("T", "Broken", "[Missing] + 1"))
        .unwrap();
    let downstream = schema
        .create_column(&ColumnConfig::calc("T", "Downstream", "[Broken] * 2"))
        .unwrap();
    let further = schema
        .create_column(&ColumnConfig::calc("T", "Further", "[Downstream] - 1"))
        .unwrap();
    let independent = schema
        .create_column(&ColumnConfig::calc("T", "Independent", "[A] + 1"))
        .unwrap();

    let schedule = schema.schedule();
    assert_eq!(schedule.layers(), &[vec![independent]]);
    assert_eq!(schedule.excluded(), &[broken, downstream, further]);

    let row = schema.append(t, &Record::new().with("A", 1.0)).unwrap();
    let report = schema.evaluate();

    assert_eq!(report.evaluated, vec![independent]);
    assert_eq!(report.skipped, vec![broken, downstream, further]);
    assert_eq!(schema.value(independent, row).unwrap(), &Value::Number(2.0));
    assert_eq!(schema.value(downstream, row).unwrap(), &Value::Blank);
    match schema.translate_error(broken) {
        Some(StreamError::Bind { path, .. }) => assert_eq!(path, "[Missing]"),
        other => panic!("expected a bind error, got {other:?}"),
    }
    assert_eq!(schema.translate_error(downstream), None);
}

#[test]
fn fixing_a_formula_recomputes_rows_missed_while_broken() {
    let mut schema = Schema::new();
    let t = schema.create_table(&TableConfig::new("T")).unwrap();
    schema
        .create_column(&ColumnConfig::free("T", "A", "Double"))
        .unwrap();
    let b = schema
        .create_column(&ColumnConfig::calc("T", "B", "[Missing] + 1"))
        .unwrap();
    let c = schema
        .create_column(&ColumnConfig::calc("T", "C", "[B] * 2"))
        .unwrap();

    schema.append(t, &Record::new().with("A", 1.0)).unwrap();
    schema.evaluate();
    schema.append(t, &Record::new().with("A", 2.0)).unwrap();
    schema.evaluate();

    schema
        .update_column(b, &ColumnConfig::calc("T", "B", "[A] + 1"))
        .unwrap();
    let report = schema.evaluate();

    assert!(report.is_clean());
    assert_eq!(schema.translate_error(b), None);
    assert_eq!(
        schema.column_values(c).unwrap(),
        vec![Value::Number(4.0), Value::Number(6.0)]
    );
}

#[test]
fn runtime_failures_skip_dependents_for_the_cycle() {
    let mut schema = Schema::new();
    let t = schema.create_table(&TableConfig::new("T")).unwrap();
    schema
        .create_column(&ColumnConfig::free("T", "Name", "String"))
        .unwrap();
    schema
        .create_column(&ColumnConfig::free("T", "A", "Double"))
        .unwrap();
    let failing = schema
        .create_column(&ColumnConfig::calc("T", "Failing", "[Name] * 2"))
        .unwrap();
    let downstream = schema
        .create_column(&ColumnConfig::calc("T", "Downstream", "[Failing] + 1"))
        .unwrap();
    let independent = schema
        .create_column(&ColumnConfig::calc("T", "Independent", "[A] * 3"))
        .unwrap();

    schema
        .append(t, &Record::new().with("Name", "x").with("A", 1.0))
        .unwrap();
    let report = schema.evaluate();

    assert_eq!(report.failed, vec![failing]);
    assert_eq!(report.skipped, vec![downstream]);
    assert_eq!(report.evaluated, vec![independent]);
    assert!(matches!(
        schema.evaluate_error(failing),
        Some(StreamError::Evaluate(_))
    ));
}

#[test]
fn cycles_never_schedule_and_evaluation_terminates() {
    let mut schema = Schema::new();
    let t = schema.create_table(&TableConfig::new("T")).unwrap();
    schema
        .create_column(&ColumnConfig::free("T", "A", "Double"))
        .unwrap();
    let b = schema
        .create_column(&ColumnConfig::calc("T", "B", "[C] + 1"))
        .unwrap();
    let c = schema
        .create_column(&ColumnConfig::calc("T", "C", "[B] + 1"))
        .unwrap();
    let behind = schema
        .create_column(&ColumnConfig::calc("T", "Behind", "[C]"))
        .unwrap();
    let d = schema
        .create_column(&ColumnConfig::calc("T", "D", "[A]"))
        .unwrap();

    let schedule = schema.schedule();
    assert_eq!(schedule.layers(), &[vec![d]]);
    assert_eq!(schedule.excluded(), &[b, c, behind]);

    schema.append(t, &Record::new().with("A", 1.0)).unwrap();
    let report = schema.evaluate();
    assert_eq!(report.evaluated, vec![d]);
    assert_eq!(schema.translate_error(b), None);
}

#[test]
fn dependencies_cover_every_path_column() {
    let mut schema = Schema::new();
    schema.create_table(&TableConfig::new("T")).unwrap();
    let a = schema
        .create_column(&ColumnConfig::free("T", "A", "Double"))
        .unwrap();
    let b = schema
        .create_column(&ColumnConfig::free("T", "B", "Double"))
        .unwrap();
    let own = schema
        .create_column(&ColumnConfig::calc("T", "Own", "[out] + [B] * [A] + [b]"))
        .unwrap();

    assert_eq!(schema.dependencies(own), vec![a, b]);
}
