// End-to-end tests for the parse → transform → merge → cache pipeline
use buslog_pipeline::{
    CanDefinitionTable, Dataset, Diagnostics, MemorySink, ParallelRowProcessor, Pipeline,
    PipelineConfig, PipelineError, Protocol, RowFilter, RuleSet,
};
use std::fs;
use std::path::Path;

const CAN_HEADER: &str = "Type,Source,Target,Name,Time,Buffer";

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn write(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).unwrap();
}

fn strings(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

fn can_rules(definitions: &[(&str, &str)]) -> RuleSet {
    RuleSet::new(RowFilter::default(), definitions.iter().copied().collect::<CanDefinitionTable>())
}

#[test]
fn scenario_a_can_meaning_and_data_length() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "a.csv",
        &format!(
            "{}\npublish,A,B,x,2024-01-01 10:00:00,string=2cf:8:[10 40 ff 37 48 c1 0a 00]\n",
            CAN_HEADER
        ),
    );

    let pipeline = Pipeline::new(PipelineConfig::new(dir.path())).with_rules(can_rules(&[("2cf", "EngineStatus")]));
    let dataset = pipeline.parse_single("a.csv", Protocol::Can, &Diagnostics::silent()).unwrap();

    assert_eq!(dataset.total, 1);
    let meaning = dataset.column_index("Meaning").unwrap();
    let length = dataset.column_index("DataLength").unwrap();
    assert_eq!(dataset.rows[0][meaning], "EngineStatus");
    assert_eq!(dataset.rows[0][length], "6");
    assert_eq!(dataset.rows[0][dataset.column_index("MessageId").unwrap()], "0x006");
    assert_eq!(dataset.rows[0][dataset.column_index("ProtocolType").unwrap()], "CAN");
}

#[test]
fn scenario_a_with_definitions_document() {
    let dir = tempfile::tempdir().unwrap();
    let config_dir = dir.path().join("config");
    fs::create_dir_all(config_dir.join("can")).unwrap();
    write(
        &config_dir.join("can"),
        "definitions.json",
        r#"{"2CF": {"hex": "2cf", "dec": "719", "description": "EngineStatus"}}"#,
    );
    write(
        dir.path(),
        "a.csv",
        &format!(
            "{}\npublish,A,B,x,2024-01-01 10:00:00,string=2cf:8:[10 40 ff 37 48 c1 0a 00]\n",
            CAN_HEADER
        ),
    );

    // No row_filter.json: built-in rules apply
    let pipeline = Pipeline::new(PipelineConfig::new(dir.path()).with_config_dir(&config_dir));
    let dataset = pipeline.parse_single("a.csv", Protocol::Can, &Diagnostics::silent()).unwrap();
    assert_eq!(dataset.rows[0].last().unwrap(), "EngineStatus");
}

#[test]
fn scenario_b_garbage_buffer_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "b.csv",
        &format!("{}\npublish,A,B,x,2024-01-01 10:00:00,garbage\n", CAN_HEADER),
    );

    let pipeline = Pipeline::new(PipelineConfig::new(dir.path()));
    let dataset = pipeline.parse_single("b.csv", Protocol::Can, &Diagnostics::silent()).unwrap();
    assert_eq!(dataset.total, 0);
    assert!(dataset.rows.is_empty());
    assert_eq!(dataset.headers.len(), 10);
}

#[test]
fn scenario_c_merge_sorts_by_time() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "s1.csv", "Time,V\n2024-01-01 10:00:01,a\n2024-01-01 10:00:03,c\n");
    write(dir.path(), "s2.csv", "Time,V\n2024-01-01 10:00:02,b\n");

    let pipeline = Pipeline::new(PipelineConfig::new(dir.path()));
    let (identity, group) = pipeline
        .merge_groups()
        .create(strings(&["s1.csv", "s2.csv"]), strings(&["one.csv", "two.csv"]), Protocol::Common)
        .unwrap();

    let expected = vec![
        strings(&["2024-01-01 10:00:01", "a"]),
        strings(&["2024-01-01 10:00:02", "b"]),
        strings(&["2024-01-01 10:00:03", "c"]),
    ];

    let direct = pipeline.parse_merged(&group, Protocol::Common, &Diagnostics::silent()).unwrap();
    assert_eq!(direct.headers, strings(&["Time", "V"]));
    assert_eq!(direct.rows, expected);

    // Routing through the merged identity gives the same result
    let routed = pipeline.parse(&identity, Protocol::Common, &Diagnostics::silent()).unwrap();
    assert_eq!(routed, direct);
}

#[test]
fn scenario_d_empty_file_is_empty_dataset() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "empty.csv", "");
    write(dir.path(), "blank.csv", "\n   \n\t\n");

    let pipeline = Pipeline::new(PipelineConfig::new(dir.path()));
    for protocol in Protocol::ALL {
        for name in ["empty.csv", "blank.csv"] {
            let dataset = pipeline.parse_single(name, protocol, &Diagnostics::silent()).unwrap();
            assert_eq!(dataset, Dataset::empty());
            assert_eq!(dataset.total, 0);
        }
    }
}

#[test]
fn valid_lines_yield_k_minus_one_rows() {
    let dir = tempfile::tempdir().unwrap();
    let mut content = String::from("a,b,c\n");
    for i in 0..1234 {
        content.push_str(&format!("{},{},x\n", i, i * 2));
    }
    write(dir.path(), "k.csv", &content);

    let pipeline = Pipeline::new(PipelineConfig::new(dir.path()));
    let dataset = pipeline.parse_single("k.csv", Protocol::Common, &Diagnostics::silent()).unwrap();
    assert_eq!(dataset.total, 1234);
    for (i, row) in dataset.rows.iter().enumerate() {
        assert_eq!(row[0], i.to_string());
    }
}

#[test]
fn default_protocol_preserves_input_order_across_pool_sizes() {
    let dir = tempfile::tempdir().unwrap();
    let mut content = String::from("n\n");
    for i in 0..2500 {
        content.push_str(&format!("{}\n", i));
    }
    write(dir.path(), "n.csv", &content);

    for workers in [1, 4, 13, 32] {
        let pipeline = Pipeline::new(PipelineConfig::new(dir.path()))
            .with_processor(ParallelRowProcessor::new().with_fixed_workers(workers));
        for protocol in [Protocol::Common, Protocol::CanOpen] {
            let dataset = pipeline.parse_single("n.csv", protocol, &Diagnostics::silent()).unwrap();
            assert_eq!(dataset.total, 2500);
            let last = dataset.headers.len() - 1;
            for (i, row) in dataset.rows.iter().enumerate() {
                assert_eq!(row[last], i.to_string());
            }
        }
    }
}

#[test]
fn malformed_and_empty_lines_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let mut bytes = b"h1,h2\n\nv1,v2\n".to_vec();
    bytes.extend_from_slice(b"\xff\xfe,bad\n");
    bytes.extend_from_slice(b"v3,v4,v5\r\n");
    fs::write(dir.path().join("m.csv"), bytes).unwrap();

    let sink = MemorySink::new();
    let pipeline = Pipeline::new(PipelineConfig::new(dir.path()));
    let dataset = pipeline.parse_single("m.csv", Protocol::Common, &Diagnostics::new(&sink)).unwrap();

    assert_eq!(dataset.rows, vec![strings(&["v1", "v2"]), strings(&["v3", "v4", "v5"])]);
    assert!(sink.contains(log::Level::Info, "1 empty, 1 malformed"));
}

#[test]
fn missing_source_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(PipelineConfig::new(dir.path()));
    let err = pipeline
        .parse_single("nope.csv", Protocol::Can, &Diagnostics::silent())
        .unwrap_err();
    assert!(matches!(err, PipelineError::SourceNotFound(_)));

    let err = pipeline
        .parse("merged_missing_CAN_2.csv", Protocol::Can, &Diagnostics::silent())
        .unwrap_err();
    assert!(matches!(err, PipelineError::SourceNotFound(_)));
}

#[test]
fn parsing_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let mut content = format!("{}\n", CAN_HEADER);
    for i in 0..800 {
        let kind = if i % 5 == 0 { "noise" } else { "receive" };
        content.push_str(&format!(
            "{},S{},T,n,2024-01-01 10:{:02}:00,string=2cf:8:[00]\n",
            kind,
            i,
            i % 60
        ));
    }
    write(dir.path(), "i.csv", &content);

    let pipeline = Pipeline::new(PipelineConfig::new(dir.path()).with_min_parallel_rows(10));
    let first = pipeline.parse_single("i.csv", Protocol::Can, &Diagnostics::silent()).unwrap();
    let second = pipeline.parse_single("i.csv", Protocol::Can, &Diagnostics::silent()).unwrap();

    assert_eq!(first.total, 640);
    assert_eq!(
        serde_json::to_vec(&first).unwrap(),
        serde_json::to_vec(&second).unwrap()
    );
}

#[test]
fn load_writes_through_and_serves_from_cache() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "c.csv", "h\n1\n2\n");
    let pipeline = Pipeline::new(PipelineConfig::new(dir.path()));

    let first = pipeline.load("c.csv", Protocol::Common, &Diagnostics::silent()).unwrap();
    assert!(!first.cached);
    assert_eq!(first.dataset.total, 2);

    let second = pipeline.load("c.csv", Protocol::Common, &Diagnostics::silent()).unwrap();
    assert!(second.cached);
    assert_eq!(second.dataset, first.dataset);

    // A different protocol is a different cache entry
    let other = pipeline.load("c.csv", Protocol::CanOpen, &Diagnostics::silent()).unwrap();
    assert!(!other.cached);

    pipeline.invalidate_cache("c.csv");
    assert_eq!(pipeline.get_cached("c.csv", Protocol::Common), None);
    assert_eq!(pipeline.get_cached("c.csv", Protocol::CanOpen), None);
}

#[test]
fn cache_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(PipelineConfig::new(dir.path()));
    let dataset = Dataset::new(strings(&["a", "b"]), vec![strings(&["1"]), strings(&["2", "3", "4"])]);

    pipeline.put_cached("f.csv", Protocol::Can, &dataset).unwrap();
    assert_eq!(pipeline.get_cached("f.csv", Protocol::Can), Some(dataset));
}

#[test]
fn cache_write_failure_still_returns_dataset() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "w.csv", "h\n1\n");
    // A plain file where the cache directory should be makes every write fail
    write(dir.path(), "cache", "not a directory");

    let sink = MemorySink::new();
    let pipeline = Pipeline::new(PipelineConfig::new(dir.path()));
    let outcome = pipeline.load("w.csv", Protocol::Common, &Diagnostics::new(&sink)).unwrap();

    assert!(!outcome.cached);
    assert_eq!(outcome.dataset.total, 1);
    assert!(sink.contains(log::Level::Warn, "Failed to cache"));
}

#[test]
fn merge_skips_failed_sources() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "ok.csv", "Time,V\n2,b\n1,a\n");

    let sink = MemorySink::new();
    let pipeline = Pipeline::new(PipelineConfig::new(dir.path()));
    let (_, group) = pipeline
        .merge_groups()
        .create(strings(&["gone.csv", "ok.csv"]), vec![], Protocol::Common)
        .unwrap();

    let dataset = pipeline.parse_merged(&group, Protocol::Common, &Diagnostics::new(&sink)).unwrap();
    assert_eq!(dataset.rows, vec![strings(&["1", "a"]), strings(&["2", "b"])]);
    assert!(sink.contains(log::Level::Warn, "gone.csv"));
}

#[test]
fn merge_fails_when_every_source_fails() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(PipelineConfig::new(dir.path()));
    let (identity, _) = pipeline
        .merge_groups()
        .create(strings(&["x.csv", "y.csv"]), vec![], Protocol::Can)
        .unwrap();

    let err = pipeline.load(&identity, Protocol::Can, &Diagnostics::silent()).unwrap_err();
    assert!(matches!(err, PipelineError::AllSourcesFailed(2)));
    // Nothing was cached for the failed merge
    assert_eq!(pipeline.get_cached(&identity, Protocol::Can), None);
}

#[test]
fn merged_can_rows_sort_by_time_after_annotation() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "p1.csv",
        &format!(
            "{}\nreceive,A,B,x,2024-01-01 10:00:05,string=2cf:8:[00]\nbogus,A,B,x,2024-01-01 10:00:00,string=2cf:8:[00]\n",
            CAN_HEADER
        ),
    );
    write(
        dir.path(),
        "p2.csv",
        &format!("{}\npublish,A,B,x,2024-01-01 10:00:01,string=ushort=1\n", CAN_HEADER),
    );

    let pipeline = Pipeline::new(PipelineConfig::new(dir.path())).with_rules(can_rules(&[("2cf", "EngineStatus")]));
    let group = buslog_pipeline::MergeGroup::new(strings(&["p1.csv", "p2.csv"]), vec![], Protocol::Can);
    let dataset = pipeline.parse_merged(&group, Protocol::Can, &Diagnostics::silent()).unwrap();

    assert_eq!(dataset.total, 2);
    let time = dataset.column_index("time").unwrap();
    assert_eq!(dataset.rows[0][time], "2024-01-01 10:00:01");
    assert_eq!(dataset.rows[1][time], "2024-01-01 10:00:05");
    assert_eq!(dataset.rows[1].last().unwrap(), "EngineStatus");
}

#[test]
fn delete_removes_file_and_cache() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "d.csv", "h\n1\n");
    let pipeline = Pipeline::new(PipelineConfig::new(dir.path()));
    pipeline.load("d.csv", Protocol::Common, &Diagnostics::silent()).unwrap();

    pipeline.delete_file("d.csv").unwrap();
    assert!(!dir.path().join("d.csv").exists());
    assert_eq!(pipeline.get_cached("d.csv", Protocol::Common), None);
    assert!(matches!(
        pipeline.delete_file("d.csv"),
        Err(PipelineError::SourceNotFound(_))
    ));
}

#[test]
fn delete_merge_group_removes_sources_and_record() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "g1.csv", "h\n1\n");
    write(dir.path(), "g2.csv", "h\n2\n");
    let pipeline = Pipeline::new(PipelineConfig::new(dir.path()));
    let (identity, _) = pipeline
        .merge_groups()
        .create(strings(&["g1.csv", "g2.csv", "already-gone.csv"]), vec![], Protocol::Common)
        .unwrap();
    pipeline.load(&identity, Protocol::Common, &Diagnostics::silent()).unwrap();

    pipeline.delete_file(&identity).unwrap();
    assert!(!dir.path().join("g1.csv").exists());
    assert!(!dir.path().join("g2.csv").exists());
    assert!(!pipeline.merge_groups().record_path(&identity).exists());
    assert_eq!(pipeline.get_cached(&identity, Protocol::Common), None);
}

#[test]
fn unknown_protocol_selector_passes_rows_through() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "u.csv", "a,b\n1,2\nonly-one\n");
    let pipeline = Pipeline::new(PipelineConfig::new(dir.path()));

    let dataset = pipeline
        .parse_single("u.csv", Protocol::from_selector("FLEXRAY"), &Diagnostics::silent())
        .unwrap();
    assert_eq!(dataset.headers, strings(&["a", "b"]));
    assert_eq!(dataset.rows, vec![strings(&["1", "2"]), strings(&["only-one"])]);
}
