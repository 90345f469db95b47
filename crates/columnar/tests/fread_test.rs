//! Integration tests for the delimited text reader.

use alopex_columnar::fread::{
    ColumnSelector, ColumnTypeOverride, Logger, ParseType, QuoteRule, ReadOptions,
};
use alopex_columnar::{fread, fread_file, Column, ColumnSet, ColumnarError, FwElement};
use std::fmt::Write as _;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

fn ints(frame: &ColumnSet, j: usize) -> Vec<i32> {
    match frame.column(j) {
        Some(Column::Int32(c)) => c.to_vec(),
        other => panic!("column {j} is not Int32: {other:?}"),
    }
}

fn floats(frame: &ColumnSet, j: usize) -> Vec<f64> {
    match frame.column(j) {
        Some(Column::Float64(c)) => c.to_vec(),
        other => panic!("column {j} is not Float64: {other:?}"),
    }
}

fn strs(frame: &ColumnSet, j: usize) -> Vec<Option<String>> {
    match frame.column(j) {
        Some(Column::Str(c)) => c.to_vec(),
        other => panic!("column {j} is not Str: {other:?}"),
    }
}

fn names(frame: &ColumnSet) -> Vec<&str> {
    frame.names().iter().map(String::as_str).collect()
}

/// Collects every message passed to the logger.
#[derive(Default)]
struct CollectingLogger {
    lines: Mutex<Vec<String>>,
}

impl Logger for CollectingLogger {
    fn log(&self, message: &str) {
        self.lines.lock().unwrap().push(message.to_string());
    }
}

/// Builds `rows` lines of `i,i,i` under an `a,b,c` header, replacing the
/// field of column `b` on row `float_row` and of column `c` on `text_row`.
fn generate_table(rows: usize, float_row: usize, text_row: usize) -> String {
    let mut out = String::from("a,b,c\n");
    for i in 0..rows {
        let b = if i == float_row { "1.5".to_string() } else { i.to_string() };
        let c = if i == text_row { "oops".to_string() } else { i.to_string() };
        writeln!(out, "{i},{b},{c}").unwrap();
    }
    out
}

#[test]
fn test_detects_separator_and_header() {
    let input = b"id|name|score\n1|alpha|0.5\n2|beta|1.25\n3|gamma|2\n";
    let out = fread(input, &ReadOptions::default()).unwrap();
    let frame = out.frame;

    assert_eq!(names(&frame), vec!["id", "name", "score"]);
    assert_eq!(frame.nrows(), 3);
    assert_eq!(ints(&frame, 0), vec![1, 2, 3]);
    assert_eq!(
        strs(&frame, 1),
        vec![
            Some("alpha".to_string()),
            Some("beta".to_string()),
            Some("gamma".to_string())
        ]
    );
    assert_eq!(floats(&frame, 2), vec![0.5, 1.25, 2.0]);
}

#[test]
fn test_headerless_input_gets_default_names() {
    let out = fread(b"1,2\n3,4\n", &ReadOptions::default()).unwrap();
    assert_eq!(names(&out.frame), vec!["V1", "V2"]);
    assert_eq!(ints(&out.frame, 0), vec![1, 3]);
    assert_eq!(ints(&out.frame, 1), vec![2, 4]);
}

#[test]
fn test_explicit_header_false_keeps_first_row() {
    let opts = ReadOptions::new(Some(b','), Some(false));
    let out = fread(b"x,y\n1,2\n", &opts).unwrap();
    assert_eq!(names(&out.frame), vec!["V1", "V2"]);
    assert_eq!(
        strs(&out.frame, 0),
        vec![Some("x".to_string()), Some("1".to_string())]
    );
}

#[test]
fn test_quoted_fields() {
    let input = b"name,desc\n\"Smith, J\",\"said \"\"hi\"\"\"\nDoe,plain\n";
    let out = fread(input, &ReadOptions::default()).unwrap();
    assert_eq!(names(&out.frame), vec!["name", "desc"]);
    assert_eq!(
        strs(&out.frame, 0),
        vec![Some("Smith, J".to_string()), Some("Doe".to_string())]
    );
    assert_eq!(
        strs(&out.frame, 1),
        vec![Some("said \"hi\"".to_string()), Some("plain".to_string())]
    );
}

#[test]
fn test_unterminated_quote_is_ambiguous() {
    let opts = ReadOptions {
        quote_rule: Some(QuoteRule::Doubled),
        ..ReadOptions::default()
    };
    match fread(b"a,b\n\"1,2\n3,4\n", &opts) {
        Err(ColumnarError::ParseAmbiguity(msg)) => assert!(msg.contains("<<a,b>>")),
        other => panic!("expected an ambiguity error, got {other:?}"),
    }
}

#[test]
fn test_detects_backslash_escaped_quotes() {
    let input = b"a,b\n\"x\\\"y\",1\n\"p\\\"q\",2\n\"r\",3\n";
    let out = fread(input, &ReadOptions::default()).unwrap();
    assert_eq!(names(&out.frame), vec!["a", "b"]);
    assert_eq!(
        strs(&out.frame, 0),
        vec![
            Some("x\"y".to_string()),
            Some("p\"q".to_string()),
            Some("r".to_string())
        ]
    );
    assert_eq!(ints(&out.frame, 1), vec![1, 2, 3]);
}

#[test]
fn test_detects_verbatim_quotes() {
    let input = b"a,b\n\"say \"hi\"\",1\n\"ok\",2\n\"x\",3\n";
    let out = fread(input, &ReadOptions::default()).unwrap();
    assert_eq!(
        strs(&out.frame, 0),
        vec![
            Some("say \"hi\"".to_string()),
            Some("ok".to_string()),
            Some("x".to_string())
        ]
    );
    assert_eq!(ints(&out.frame, 1), vec![1, 2, 3]);
}

#[test]
fn test_quote_rule_tie_prefers_doubled() {
    let logger = Arc::new(CollectingLogger::default());
    let opts = ReadOptions {
        verbose: true,
        logger: Some(logger.clone()),
        ..ReadOptions::default()
    };
    let out = fread(b"a,b\n\"x,y\",1\n\"p\",2\n\"q\",3\n", &opts).unwrap();
    assert_eq!(
        strs(&out.frame, 0),
        vec![
            Some("x,y".to_string()),
            Some("p".to_string()),
            Some("q".to_string())
        ]
    );

    let lines = logger.lines.lock().unwrap();
    assert!(lines
        .iter()
        .any(|l| l.contains("Detected 2 columns on line 1; quote rule 0")));
}

#[test]
fn test_na_and_empty_strings() {
    let input = b"k,v,s\n1,10,x\n2,,\"\"\n3,30,NA\n";
    let out = fread(input, &ReadOptions::default()).unwrap();
    assert_eq!(ints(&out.frame, 1), vec![10, i32::NA, 30]);
    assert_eq!(
        strs(&out.frame, 2),
        vec![Some("x".to_string()), Some(String::new()), None]
    );
}

#[test]
fn test_crlf_line_endings() {
    let out = fread(b"a,b\r\n1,x\r\n2,y\r\n", &ReadOptions::default()).unwrap();
    assert_eq!(ints(&out.frame, 0), vec![1, 2]);
    assert_eq!(
        strs(&out.frame, 1),
        vec![Some("x".to_string()), Some("y".to_string())]
    );
}

#[test]
fn test_single_column_input() {
    let out = fread(b"value\nalpha\nbeta\n", &ReadOptions::default()).unwrap();
    assert_eq!(names(&out.frame), vec!["value"]);
    assert_eq!(
        strs(&out.frame, 0),
        vec![Some("alpha".to_string()), Some("beta".to_string())]
    );
}

#[test]
fn test_out_of_sample_type_bumps() {
    let input = generate_table(5000, 150, 250);
    let opts = ReadOptions {
        chunk_size: Some(4096),
        nthreads: Some(4),
        ..ReadOptions::default()
    };
    let out = fread(input.as_bytes(), &opts).unwrap();
    let frame = out.frame;

    assert_eq!(frame.nrows(), 5000);
    assert_eq!(ints(&frame, 0), (0..5000).collect::<Vec<i32>>());

    let b = floats(&frame, 1);
    for (i, v) in b.iter().enumerate() {
        let expected = if i == 150 { 1.5 } else { i as f64 };
        assert_eq!(*v, expected, "Value mismatch in column b at row {i}");
    }

    let c = strs(&frame, 2);
    for (i, v) in c.iter().enumerate() {
        let expected = if i == 250 { "oops".to_string() } else { i.to_string() };
        assert_eq!(v.as_deref(), Some(expected.as_str()), "Value mismatch in column c at row {i}");
    }

    let bumps = &out.report.type_bumps;
    assert_eq!(bumps.len(), 2);
    assert_eq!(bumps[0].column, 1);
    assert_eq!(bumps[0].name, "b");
    assert_eq!(bumps[0].from, ParseType::Int32);
    assert_eq!(bumps[0].to, ParseType::Float64);
    assert_eq!(bumps[0].field, "1.5");
    assert_eq!(bumps[0].line, 152);
    assert_eq!(bumps[1].column, 2);
    assert_eq!(bumps[1].to, ParseType::Str);
    assert_eq!(bumps[1].line, 252);
    assert_eq!(out.report.reread_passes, 1);
    assert_eq!(out.report.reread_columns, 2);
}

#[test]
fn test_every_chunk_size_gives_same_result() {
    let input: &[u8] = b"k,v,s\n1,10,\"a\nb\"\n2,20,plain\n3,,\"c,d\"\n4,40,\"\"\n5,50,NA\n6,60,tail\n";
    let expected_s = vec![
        Some("a\nb".to_string()),
        Some("plain".to_string()),
        Some("c,d".to_string()),
        Some(String::new()),
        None,
        Some("tail".to_string()),
    ];
    for chunk_size in 1..input.len() {
        let opts = ReadOptions {
            chunk_size: Some(chunk_size),
            nthreads: Some(2),
            ..ReadOptions::default()
        };
        let out = fread(input, &opts).unwrap();
        let frame = out.frame;
        assert_eq!(frame.nrows(), 6, "chunk_size {chunk_size}");
        assert_eq!(ints(&frame, 0), vec![1, 2, 3, 4, 5, 6], "chunk_size {chunk_size}");
        assert_eq!(
            ints(&frame, 1),
            vec![10, 20, i32::NA, 40, 50, 60],
            "chunk_size {chunk_size}"
        );
        assert_eq!(strs(&frame, 2), expected_s, "chunk_size {chunk_size}");
    }
}

#[test]
fn test_max_nrows() {
    let input = b"a,b\n1,2\n3,4\n5,6\n7,8\n";
    for chunk_size in [None, Some(4)] {
        let opts = ReadOptions {
            max_nrows: Some(2),
            chunk_size,
            ..ReadOptions::default()
        };
        let out = fread(input, &opts).unwrap();
        assert_eq!(ints(&out.frame, 0), vec![1, 3]);
        assert_eq!(ints(&out.frame, 1), vec![2, 4]);
    }
}

#[test]
fn test_drop_and_widen_overrides() {
    let opts = ReadOptions {
        column_types: vec![
            ColumnTypeOverride::drop(ColumnSelector::Name("b".to_string())),
            ColumnTypeOverride::index(0, ParseType::Float64),
        ],
        ..ReadOptions::default()
    };
    let out = fread(b"a,b,c\n1,x,3\n2,y,4\n", &opts).unwrap();
    assert_eq!(names(&out.frame), vec!["a", "c"]);
    assert_eq!(floats(&out.frame, 0), vec![1.0, 2.0]);
    assert_eq!(ints(&out.frame, 1), vec![3, 4]);
}

#[test]
fn test_downward_override_rejected() {
    let opts = ReadOptions {
        column_types: vec![ColumnTypeOverride::index(0, ParseType::Int32)],
        ..ReadOptions::default()
    };
    match fread(b"a,b\nx,1\ny,2\n", &opts) {
        Err(ColumnarError::Parse { message, .. }) => {
            assert!(message.contains("Attempt to override column 1"), "{message}");
        }
        other => panic!("expected a parse error, got {other:?}"),
    }
}

#[test]
fn test_unknown_override_column() {
    let opts = ReadOptions {
        column_types: vec![ColumnTypeOverride::name("missing", ParseType::Str)],
        ..ReadOptions::default()
    };
    assert!(matches!(
        fread(b"a,b\nx,1\n", &opts),
        Err(ColumnarError::PreconditionViolation(_))
    ));
}

#[test]
fn test_fill_pads_short_lines() {
    let opts = ReadOptions {
        fill: true,
        ..ReadOptions::default()
    };
    let out = fread(b"a,b,c\n1,2,3\n4,5\n6\n", &opts).unwrap();
    assert_eq!(ints(&out.frame, 0), vec![1, 4, 6]);
    assert_eq!(ints(&out.frame, 1), vec![2, 5, i32::NA]);
    assert_eq!(ints(&out.frame, 2), vec![3, i32::NA, i32::NA]);
}

#[test]
fn test_skip_blank_lines() {
    let opts = ReadOptions {
        skip_blank_lines: true,
        ..ReadOptions::default()
    };
    let out = fread(b"a,b\n1,2\n\n3,4\n", &opts).unwrap();
    assert_eq!(ints(&out.frame, 0), vec![1, 3]);
    assert_eq!(ints(&out.frame, 1), vec![2, 4]);
}

#[test]
fn test_text_after_last_consistent_line_is_discarded() {
    let out = fread(b"a,b\n1,2\n3,4\n\nfooter\n", &ReadOptions::default()).unwrap();
    assert_eq!(out.frame.nrows(), 2);
    assert_eq!(ints(&out.frame, 1), vec![2, 4]);
    assert_eq!(out.report.warnings.len(), 1);
    assert!(out.report.warnings[0].contains("text exists afterwards"));
    assert!(out.report.warnings[0].contains("footer"));
}

#[test]
fn test_lines_before_data_are_skipped_with_warning() {
    let out = fread(b"x,y,z\na,b\n1,2\n3,4\n", &ReadOptions::default()).unwrap();
    assert_eq!(names(&out.frame), vec!["a", "b"]);
    assert_eq!(ints(&out.frame, 0), vec![1, 3]);
    assert_eq!(out.report.warnings.len(), 1);
    assert!(out.report.warnings[0].contains("discarding line 1"));
}

#[test]
fn test_too_few_fields_is_an_error() {
    match fread(b"a,b,c\n1,2,3\n4,5,6\n7,8\n", &ReadOptions::default()) {
        Err(ColumnarError::Parse { line, .. }) => assert_eq!(line, 4),
        other => panic!("expected a parse error, got {other:?}"),
    }
}

#[test]
fn test_cancelled_read() {
    let opts = ReadOptions {
        abort: Some(Arc::new(AtomicBool::new(true))),
        ..ReadOptions::default()
    };
    assert!(matches!(
        fread(b"a,b\n1,2\n", &opts),
        Err(ColumnarError::Cancelled)
    ));
}

#[test]
fn test_verbose_logger_receives_report() {
    let logger = Arc::new(CollectingLogger::default());
    let opts = ReadOptions {
        verbose: true,
        logger: Some(logger.clone()),
        ..ReadOptions::default()
    };
    let out = fread(b"a,b\n1,2\n3,4\n", &opts).unwrap();
    assert_eq!(out.report.rows_read, 2);
    assert_eq!(out.report.cols_read, 2);

    let lines = logger.lines.lock().unwrap();
    assert!(lines.iter().any(|l| l.contains("Read 2 rows x 2 columns")));
    assert!(lines.iter().any(|l| l.contains("Type codes")));
}

#[test]
fn test_fread_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("data.csv");
    std::fs::write(&path, "\u{feff}city;pop\nOslo;709000\nBergen;291000\n").unwrap();

    let out = fread_file(&path, &ReadOptions::default()).unwrap();
    assert_eq!(names(&out.frame), vec!["city", "pop"]);
    assert_eq!(ints(&out.frame, 1), vec![709000, 291000]);
    assert_eq!(out.report.input_size, std::fs::metadata(&path).unwrap().len() as usize);

    let missing = temp_dir.path().join("missing.csv");
    assert!(matches!(
        fread_file(&missing, &ReadOptions::default()),
        Err(ColumnarError::IoError(_))
    ));
}

#[test]
fn test_empty_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("empty.csv");
    std::fs::write(&path, "").unwrap();

    let out = fread_file(&path, &ReadOptions::default()).unwrap();
    assert_eq!(out.frame.ncols(), 0);
    assert_eq!(out.frame.nrows(), 0);
}
