use formula_stream::{
    ColumnConfig, ColumnId, Record, Schema, StreamError, TableConfig, TableId, Value,
};
use pretty_assertions::assert_eq;

struct Fixture {
    schema: Schema,
    groups: TableId,
    facts: TableId,
}

/// `Groups` rows are aggregated from `Facts` rows through the `Facts.Group` reference column.
fn fixture(facts_max_rows: Option<usize>) -> Fixture {
    let mut schema = Schema::new();
    let groups = schema.create_table(&TableConfig::new("Groups")).unwrap();
    let mut facts_config = TableConfig::new("Facts");
    if let Some(max) = facts_max_rows {
        facts_config = facts_config.with_max_rows(max);
    }
    let facts = schema.create_table(&facts_config).unwrap();
    schema
        .create_column(&ColumnConfig::free("Groups", "Key", "String"))
        .unwrap();
    schema
        .create_column(&ColumnConfig::free("Facts", "Group", "Groups"))
        .unwrap();
    schema
        .create_column(&ColumnConfig::free("Facts", "Amount", "Double"))
        .unwrap();
    Fixture {
        schema,
        groups,
        facts,
    }
}

fn add_total(schema: &mut Schema) -> ColumnId {
    schema
        .create_column(
            &ColumnConfig::accu("Groups", "Total", "Facts", "Group", "[out] + [Amount]")
                .with_default(0),
        )
        .unwrap()
}

fn fact(group: usize, amount: f64) -> Record {
    Record::new()
        .with("Group", Value::Row(group))
        .with("Amount", amount)
}

#[test]
fn accumulates_facts_into_their_group() {
    let Fixture {
        mut schema,
        groups,
        facts,
    } = fixture(None);
    let total = add_total(&mut schema);

    let g = schema.append(groups, &Record::new().with("Key", "a")).unwrap();
    for amount in [1.0, 2.0, 3.0] {
        schema.append(facts, &fact(g, amount)).unwrap();
    }
    schema.evaluate();

    assert_eq!(schema.value(total, g).unwrap(), &Value::Number(6.0));
}

#[test]
fn every_cycle_reaggregates_all_facts() {
    let Fixture {
        mut schema,
        groups,
        facts,
    } = fixture(None);
    let total = add_total(&mut schema);

    let a = schema.append(groups, &Record::new().with("Key", "a")).unwrap();
    let b = schema.append(groups, &Record::new().with("Key", "b")).unwrap();
    schema.append(facts, &fact(a, 1.0)).unwrap();
    schema.append(facts, &fact(b, 5.0)).unwrap();
    schema.evaluate();
    // No new rows: the result must not double.
    schema.evaluate();
    assert_eq!(
        schema.column_values(total).unwrap(),
        vec![Value::Number(1.0), Value::Number(5.0)]
    );

    schema.append(facts, &fact(a, 4.0)).unwrap();
    schema.evaluate();
    assert_eq!(
        schema.column_values(total).unwrap(),
        vec![Value::Number(5.0), Value::Number(5.0)]
    );
}

#[test]
fn facts_without_a_group_are_ignored() {
    let Fixture {
        mut schema,
        groups,
        facts,
    } = fixture(None);
    let total = add_total(&mut schema);

    let g = schema.append(groups, &Record::new()).unwrap();
    schema.append(facts, &fact(g, 2.0)).unwrap();
    schema
        .append(facts, &Record::new().with("Amount", 100.0))
        .unwrap();
    schema.append(facts, &fact(7, 100.0)).unwrap();
    let report = schema.evaluate();

    assert!(report.is_clean());
    assert_eq!(schema.value(total, g).unwrap(), &Value::Number(2.0));
}

#[test]
fn init_and_finalize_wrap_the_accumulation() {
    let Fixture {
        mut schema,
        groups,
        facts,
    } = fixture(None);
    schema
        .create_column(&ColumnConfig::free("Groups", "Base", "Double"))
        .unwrap();
    let total = schema
        .create_column(
            &ColumnConfig::accu("Groups", "Scaled", "Facts", "Group", "[out] + [Amount]")
                .with_init("[Base]")
                .with_finalize("[out] * 10"),
        )
        .unwrap();

    let g = schema.append(groups, &Record::new().with("Base", 100.0)).unwrap();
    schema.append(facts, &fact(g, 1.0)).unwrap();
    schema.append(facts, &fact(g, 2.0)).unwrap();
    schema.evaluate();

    assert_eq!(schema.value(total, g).unwrap(), &Value::Number(1030.0));
}

#[test]
fn evicted_facts_drop_out_of_the_aggregate() {
    let Fixture {
        mut schema,
        groups,
        facts,
    } = fixture(Some(2));
    let total = add_total(&mut schema);

    let g = schema.append(groups, &Record::new()).unwrap();
    for amount in [1.0, 2.0, 3.0] {
        schema.append(facts, &fact(g, amount)).unwrap();
    }
    schema.evaluate();

    assert_eq!(schema.value(total, g).unwrap(), &Value::Number(5.0));
}

#[test]
fn group_path_must_lead_to_the_column_table() {
    let Fixture { mut schema, .. } = fixture(None);
    let bad = schema
        .create_column(&ColumnConfig::accu(
            "Groups",
            "Bad",
            "Facts",
            "Amount",
            "[out] + [Amount]",
        ))
        .unwrap();

    let report = schema.evaluate();
    assert_eq!(report.skipped, vec![bad]);
    assert!(matches!(
        schema.translate_error(bad),
        Some(StreamError::Bind { .. })
    ));
}

#[test]
fn unknown_fact_table_fails_to_bind() {
    let Fixture { mut schema, .. } = fixture(None);
    let bad = schema
        .create_column(&ColumnConfig::accu(
            "Groups",
            "Bad",
            "NoSuchFacts",
            "Group",
            "[out] + 1",
        ))
        .unwrap();

    let report = schema.evaluate();
    assert_eq!(report.skipped, vec![bad]);
    let err = schema.translate_error(bad).unwrap();
    assert!(err.is_translate_error());
    assert_eq!(
        err,
        &StreamError::Bind {
            table: "Groups".into(),
            path: "NoSuchFacts".into(),
        }
    );
}

#[test]
fn accumulation_over_link_output_sees_appended_rows() {
    let mut schema = Schema::new();
    let groups = schema.create_table(&TableConfig::new("Groups")).unwrap();
    let orders = schema.create_table(&TableConfig::new("Orders")).unwrap();
    schema.create_table(&TableConfig::new("Entities")).unwrap();
    for table in ["Orders", "Entities"] {
        schema
            .create_column(&ColumnConfig::free(table, "G", "Groups"))
            .unwrap();
        schema
            .create_column(&ColumnConfig::free(table, "X", "Double"))
            .unwrap();
    }
    // Created before the link so that column order alone would schedule it first.
    let count = schema
        .create_column(
            &ColumnConfig::accu("Groups", "Count", "Entities", "G", "[out] + 1").with_default(0),
        )
        .unwrap();
    let link = schema
        .create_column(&ColumnConfig::link(
            "Orders",
            "E",
            "Entities",
            &[("G", "[G]"), ("X", "[X]")],
        ))
        .unwrap();

    assert!(schema.dependencies(count).contains(&link));
    let schedule = schema.schedule();
    assert_eq!(schedule.layer_of(link), Some(0));
    assert_eq!(schedule.layer_of(count), Some(1));

    let g = schema.append(groups, &Record::new()).unwrap();
    for x in [1.0, 2.0] {
        let order = Record::new().with("G", Value::Row(g)).with("X", x);
        schema.append(orders, &order).unwrap();
    }
    assert!(schema.evaluate().is_clean());
    assert_eq!(schema.value(count, g).unwrap(), &Value::Number(2.0));

    // A repeated tuple reuses its entity row and adds nothing to the count.
    let repeat = Record::new().with("G", Value::Row(g)).with("X", 1.0);
    schema.append(orders, &repeat).unwrap();
    schema.evaluate();
    assert_eq!(schema.value(count, g).unwrap(), &Value::Number(2.0));
}

#[test]
fn accumulation_dependencies_include_the_group_path() {
    let Fixture { mut schema, facts, .. } = fixture(None);
    let total = add_total(&mut schema);

    let group = schema.column_id(facts, "Group").unwrap();
    let amount = schema.column_id(facts, "Amount").unwrap();
    let mut expected = vec![group, amount];
    expected.sort();
    assert_eq!(schema.dependencies(total), expected);
}
