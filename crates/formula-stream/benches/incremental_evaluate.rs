use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use formula_stream::{ColumnConfig, Record, Schema, TableConfig, Value};

fn bench_rows() -> usize {
    std::env::var("FORMULA_STREAM_BENCH_ROWS")
        .ok()
        .and_then(|v| v.replace('_', "").parse::<usize>().ok())
        .filter(|&v| (1_000..=1_000_000).contains(&v))
        .unwrap_or(100_000)
}

/// Orders linked to customers, with a per-customer accumulation and a calc chain on orders.
fn build_schema() -> Schema {
    let mut schema = Schema::new();
    schema.create_table(&TableConfig::new("Orders")).unwrap();
    schema.create_table(&TableConfig::new("Customers")).unwrap();
    for (table, name, output) in [
        ("Orders", "Customer Id", "Double"),
        ("Orders", "Amount", "Double"),
        ("Customers", "Id", "Double"),
    ] {
        schema
            .create_column(&ColumnConfig::free(table, name, output))
            .unwrap();
    }
    schema
        .create_column(&ColumnConfig::link(
            "Orders",
            "Customer",
            "Customers",
            &[("Id", "[Customer Id]")],
        ))
        .unwrap();
    schema
        .create_column(&ColumnConfig::calc("Orders", "Net", "[Amount] * 0.8"))
        .unwrap();
    schema
        .create_column(&ColumnConfig::calc("Orders", "Rounded", "ROUND([Net], 2)"))
        .unwrap();
    schema
        .create_column(
            &ColumnConfig::accu("Customers", "Total", "Orders", "Customer", "[out] + [Net]")
                .with_default(0),
        )
        .unwrap();
    schema
}

fn order(i: usize) -> Record {
    Record::new()
        .with("Customer Id", Value::from((i % 1_000) as f64))
        .with("Amount", Value::from((i % 97) as f64))
}

fn bench_incremental_evaluate(c: &mut Criterion) {
    let rows = bench_rows();
    let mut group = c.benchmark_group("incremental_evaluate");
    group.sample_size(10);

    for batch in [100usize, 10_000] {
        group.bench_with_input(BenchmarkId::new("append_batch", batch), &batch, |b, &batch| {
            let mut schema = build_schema();
            let orders = schema.table_id("Orders").unwrap();
            for i in 0..rows {
                schema.append(orders, &order(i)).unwrap();
            }
            schema.evaluate();

            let mut next = rows;
            b.iter(|| {
                for _ in 0..batch {
                    schema.append(orders, &order(next)).unwrap();
                    next += 1;
                }
                black_box(schema.evaluate())
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_incremental_evaluate);
criterion_main!(benches);
