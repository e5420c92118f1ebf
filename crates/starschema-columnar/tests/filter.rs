use pretty_assertions::assert_eq;
use starschema_columnar::{
    apply, filter, filter_mask, BitVec, CmpOp, ColumnSchema, ColumnType, ColumnarError,
    ColumnarTable, ColumnarTableBuilder, FilterValue, TableOptions, Value,
};

fn options() -> TableOptions {
    TableOptions { page_size_rows: 4 }
}

fn build_table() -> ColumnarTable {
    let schema = vec![
        ColumnSchema::new("n", ColumnType::Float64),
        ColumnSchema::new("b", ColumnType::Boolean),
        ColumnSchema::new("s", ColumnType::String),
        ColumnSchema::new("q", ColumnType::Int64),
    ];

    let mut builder = ColumnarTableBuilder::new("facts", schema, options()).unwrap();
    let rows = vec![
        vec![1.0.into(), true.into(), "A".into(), 10.into()],
        vec![2.0.into(), false.into(), "B".into(), 20.into()],
        vec![3.0.into(), Value::Null, Value::Null, Value::Null],
        vec![Value::Null, true.into(), "A".into(), 5.into()],
        vec![2.0.into(), false.into(), "C".into(), 20.into()],
        vec![4.0.into(), true.into(), "a".into(), 40.into()],
    ];
    for row in rows {
        builder.append_row(&row).unwrap();
    }
    builder.finalize()
}

fn mask_to_bools(mask: &BitVec) -> Vec<bool> {
    (0..mask.len()).map(|i| mask.get(i)).collect()
}

#[test]
fn filter_numeric_comparisons() {
    let table = build_table();
    let n = table.column("n").unwrap();

    let eq = filter_mask(&n, CmpOp::Eq, &FilterValue::Number(2.0)).unwrap();
    assert_eq!(
        mask_to_bools(&eq),
        vec![false, true, false, false, true, false]
    );

    let ne = filter_mask(&n, CmpOp::Ne, &FilterValue::Number(2.0)).unwrap();
    assert_eq!(
        mask_to_bools(&ne),
        vec![true, false, true, false, false, true]
    );

    let lt = filter_mask(&n, CmpOp::Lt, &FilterValue::Number(3.0)).unwrap();
    assert_eq!(
        mask_to_bools(&lt),
        vec![true, true, false, false, true, false]
    );

    let gte = filter_mask(&n, CmpOp::Gte, &FilterValue::Int(2)).unwrap();
    assert_eq!(
        mask_to_bools(&gte),
        vec![false, true, true, false, true, true]
    );
}

#[test]
fn filter_int_column_against_int_and_float_thresholds() {
    let table = build_table();
    let q = table.column("q").unwrap();

    let gt = filter_mask(&q, CmpOp::Gt, &FilterValue::Int(10)).unwrap();
    assert_eq!(
        mask_to_bools(&gt),
        vec![false, true, false, false, true, true]
    );

    let lte = filter_mask(&q, CmpOp::Lte, &FilterValue::Number(10.5)).unwrap();
    assert_eq!(
        mask_to_bools(&lte),
        vec![true, false, false, true, false, false]
    );
}

#[test]
fn large_int_column_against_float_threshold_compares_exactly() {
    let big = 1_i64 << 53;
    let table = ColumnarTable::from_columns(
        "facts",
        vec![(
            ColumnSchema::new("id", ColumnType::Int64),
            vec![(big - 1).into(), big.into(), (big + 1).into(), Value::Null],
        )],
        options(),
    )
    .unwrap();
    let id = table.column("id").unwrap();

    let gt = filter_mask(&id, CmpOp::Gt, &FilterValue::Number(big as f64)).unwrap();
    assert_eq!(mask_to_bools(&gt), vec![false, false, true, false]);

    let eq = filter_mask(&id, CmpOp::Eq, &FilterValue::Number(big as f64)).unwrap();
    assert_eq!(mask_to_bools(&eq), vec![false, true, false, false]);

    let ne_nan = filter_mask(&id, CmpOp::Ne, &FilterValue::Number(f64::NAN)).unwrap();
    assert_eq!(mask_to_bools(&ne_nan), vec![true, true, true, false]);
}

#[test]
fn float_column_against_int_threshold() {
    let table = build_table();
    let n = table.column("n").unwrap();

    let lt = filter_mask(&n, CmpOp::Lt, &FilterValue::Int(2)).unwrap();
    assert_eq!(
        mask_to_bools(&lt),
        vec![true, false, false, false, false, false]
    );
}

#[test]
fn nulls_never_match_any_operator() {
    let table = build_table();
    let n = table.column("n").unwrap();

    for op in [CmpOp::Eq, CmpOp::Ne, CmpOp::Lt, CmpOp::Lte, CmpOp::Gt, CmpOp::Gte] {
        let mask = filter_mask(&n, op, &FilterValue::Number(999.0)).unwrap();
        assert!(!mask.get(3), "{op:?} matched a null");
    }
}

#[test]
fn filter_high_value_rows_compacts_in_order() {
    let table = build_table();
    let n = table.column("n").unwrap();

    let (mask, values) = filter(&n, CmpOp::Gt, &FilterValue::Number(1.5)).unwrap();
    assert_eq!(mask.count_ones(), 4);
    assert_eq!(
        values,
        vec![
            Value::Number(2.0),
            Value::Number(3.0),
            Value::Number(2.0),
            Value::Number(4.0),
        ]
    );

    // The same mask selects the matching rows of a sibling column.
    let s = table.column("s").unwrap();
    assert_eq!(
        apply(&mask, &s).unwrap(),
        vec![Value::from("B"), Value::Null, Value::from("C"), Value::from("a")]
    );
}

#[test]
fn filter_boolean_and_string_columns() {
    let table = build_table();

    let b = table.column("b").unwrap();
    let eq_true = filter_mask(&b, CmpOp::Eq, &FilterValue::Boolean(true)).unwrap();
    assert_eq!(
        mask_to_bools(&eq_true),
        vec![true, false, false, true, false, true]
    );

    let s = table.column("s").unwrap();
    let eq_a = filter_mask(&s, CmpOp::Eq, &"A".into()).unwrap();
    assert_eq!(
        mask_to_bools(&eq_a),
        vec![true, false, false, true, false, false]
    );

    // Case-sensitive, and nulls fail `Ne` too.
    let ne_a = filter_mask(&s, CmpOp::Ne, &"A".into()).unwrap();
    assert_eq!(
        mask_to_bools(&ne_a),
        vec![false, true, false, false, true, true]
    );

    let missing = filter_mask(&s, CmpOp::Eq, &"Z".into()).unwrap();
    assert_eq!(missing.count_ones(), 0);
}

#[test]
fn filter_rejects_mismatched_families() {
    let table = build_table();
    let s = table.column("s").unwrap();

    let err = filter_mask(&s, CmpOp::Gt, &FilterValue::Number(1.0)).unwrap_err();
    assert_eq!(
        err,
        ColumnarError::TypeMismatch {
            column: "s".to_string(),
            expected: "numeric",
            actual: ColumnType::String,
        }
    );
}

#[test]
fn apply_rejects_mask_of_wrong_length() {
    let table = build_table();
    let n = table.column("n").unwrap();
    let mask = BitVec::with_len_all_true(3);

    assert!(matches!(
        apply(&mask, &n),
        Err(ColumnarError::LengthMismatch {
            expected: 6,
            actual: 3,
            ..
        })
    ));
}
