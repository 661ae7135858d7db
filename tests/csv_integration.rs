pub mod common;

use std::{
    collections::BTreeMap,
    error::Error,
    fs::{self, read_to_string},
};

use common::{METHOD_HEADER, TestMethod, init_logger, sample_methods};
use flatcsv::{
    core::{
        config::{CsvConfig, IndexNotation, LineTerminator, NullRepresentation},
        driver::{DecodeSession, EncodeSession},
        item::{ItemReader, ItemWriter},
        schema::derive_header,
    },
    item::csv::{csv_reader::CsvItemReaderBuilder, csv_writer::CsvItemWriterBuilder},
};
use serde::{Deserialize, Serialize};

#[test]
fn methods_round_trip_through_a_file() -> Result<(), Box<dyn Error>> {
    init_logger();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("methods.csv");
    let methods = sample_methods();

    let writer = CsvItemWriterBuilder::new().from_path(&path)?;
    writer.write(methods.as_slice())?;
    assert_eq!(writer.header(), METHOD_HEADER);
    writer.into_inner()?;

    let reader = CsvItemReaderBuilder::new().from_path(&path)?;
    let mut read_back: Vec<TestMethod> = Vec::new();
    while let Some(method) = reader.read()? {
        read_back.push(method);
    }

    assert_eq!(read_back, methods);
    Ok(())
}

#[test]
fn output_is_valid_rfc4180_for_the_csv_crate() -> Result<(), Box<dyn Error>> {
    init_logger();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("methods.csv");

    let writer = CsvItemWriterBuilder::new().from_path(&path)?;
    writer.write(sample_methods().as_slice())?;
    writer.into_inner()?;

    let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_path(&path)?;
    let headers = rdr.headers()?.clone();
    assert_eq!(headers.iter().collect::<Vec<_>>(), METHOD_HEADER);

    let records = rdr.records().collect::<Result<Vec<_>, csv::Error>>()?;
    assert_eq!(records.len(), 3);
    assert_eq!(&records[0][4], "Gradle");
    assert_eq!(&records[1][0], "handles \"quoted\", text");
    assert_eq!(&records[1][6], "");
    assert_eq!(&records[2][0], "multi\nline");
    assert_eq!(&records[2][3], "");
    assert!(records.iter().all(|record| record.len() == METHOD_HEADER.len()));
    Ok(())
}

#[test]
fn files_written_by_the_csv_crate_are_read() -> Result<(), Box<dyn Error>> {
    #[derive(Debug, Deserialize, PartialEq)]
    struct City {
        city: String,
        country: String,
        pop: u32,
    }

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("cities.csv");
    {
        let mut wtr = csv::Writer::from_path(&path)?;
        wtr.write_record(["city", "country", "pop"])?;
        wtr.write_record(["Boston", "United \"States\"", "4628910"])?;
        wtr.write_record(["Concord, MA", "United States", "42695"])?;
        wtr.flush()?;
    }

    let reader = CsvItemReaderBuilder::new().from_path(&path)?;
    let first: City = reader.read()?.ok_or("missing first city")?;
    let second: City = reader.read()?.ok_or("missing second city")?;

    assert_eq!(first.country, "United \"States\"");
    assert_eq!(second.city, "Concord, MA");
    assert!(ItemReader::<City>::read(&reader)?.is_none());
    Ok(())
}

#[test]
fn declared_schema_keeps_columns_of_an_absent_first_project() -> Result<(), Box<dyn Error>> {
    use common::{BuildSystem, ClassInfo, ProjectInfo};

    let classes = vec![
        ClassInfo {
            name: "Orphan".to_string(),
            package: "org.example".to_string(),
            project: None,
        },
        ClassInfo {
            name: "ParserTest".to_string(),
            package: "org.example.parser".to_string(),
            project: Some(ProjectInfo {
                name: "core".to_string(),
                build_system: BuildSystem::Bazel,
            }),
        },
    ];

    let writer = CsvItemWriterBuilder::new()
        .terminator(LineTerminator::Lf)
        .schema_of::<ClassInfo>()
        .from_writer(Vec::<u8>::new())?;
    writer.write(classes.as_slice())?;
    let output = String::from_utf8(writer.into_inner()?)?;

    assert_eq!(
        output,
        "name,package,project.name,project.build_system\n\
         Orphan,org.example,,\n\
         ParserTest,org.example.parser,core,Bazel\n"
    );

    let decoded: Vec<ClassInfo> = flatcsv::from_str(&output, &CsvConfig::default())?;
    assert_eq!(decoded, classes);
    Ok(())
}

#[test]
fn without_a_schema_the_first_record_fixes_the_columns() {
    use common::{BuildSystem, ClassInfo, ProjectInfo};

    let orphan = ClassInfo {
        name: "Orphan".to_string(),
        package: "org.example".to_string(),
        project: None,
    };
    let owned = ClassInfo {
        project: Some(ProjectInfo {
            name: "core".to_string(),
            build_system: BuildSystem::Maven,
        }),
        ..orphan.clone()
    };

    let result = flatcsv::to_string(&[orphan, owned], &CsvConfig::default());
    assert!(matches!(result, Err(flatcsv::CsvError::SchemaMismatch(_))));
}

#[test]
fn json_configuration_drives_both_directions() -> Result<(), Box<dyn Error>> {
    let config = CsvConfig::from_json(
        r#"{
            "delimiter": ";",
            "line_terminator": "LF",
            "path_separator": "/",
            "index_notation": "flatten_by_count",
            "null_representation": { "sentinel": "\\N" },
            "quote_empty_strings": true
        }"#,
    )?;
    assert_eq!(config.null_representation, NullRepresentation::Sentinel("\\N".to_string()));
    assert_eq!(config.index_notation, IndexNotation::FlattenByCount);

    let methods = sample_methods();
    let output = flatcsv::to_string(&methods, &config)?;
    let mut lines = output.split('\n');
    assert_eq!(
        lines.next(),
        Some(
            "name;class_info/name;class_info/package;class_info/project/name;\
             class_info/project/build_system;annotations/1;annotations/2;position/1;position/2"
        )
    );
    assert_eq!(
        lines.next(),
        Some("parsesEmptyInput;ParserTest;org.example.parser;core;Gradle;Test;Slow;12;5")
    );
    assert!(output.contains(";\"\";\\N;\\N;\\N;\\N;1;1\n"));

    let decoded: Vec<TestMethod> = flatcsv::from_str(&output, &config)?;
    assert_eq!(decoded, methods);
    Ok(())
}

#[test]
fn sessions_stream_records_one_at_a_time() -> Result<(), Box<dyn Error>> {
    let config = CsvConfig::default();
    let methods = sample_methods();

    let mut encoder = EncodeSession::new(Vec::<u8>::new(), config.clone())?;
    for method in &methods {
        encoder.encode(method)?;
    }
    assert_eq!(encoder.records_written(), 3);
    let bytes = encoder.finish()?;

    let mut decoder = DecodeSession::new(bytes.as_slice(), config)?;
    let first: Option<TestMethod> = decoder.next()?;
    assert_eq!(first.as_ref(), methods.first());
    let rest = decoder.records::<TestMethod>().collect::<Result<Vec<_>, _>>()?;
    assert_eq!(rest, methods[1..]);
    assert!(decoder.skipped_rows().is_empty());
    Ok(())
}

#[test]
fn headerless_files_use_the_derived_header() -> Result<(), Box<dyn Error>> {
    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Reading {
        sensor: String,
        at: (u32, u32),
        value: Option<f64>,
    }

    let config = CsvConfig {
        include_header: false,
        ..CsvConfig::default()
    };
    let readings = vec![
        Reading {
            sensor: "north".to_string(),
            at: (10, 15),
            value: Some(21.5),
        },
        Reading {
            sensor: "south".to_string(),
            at: (10, 16),
            value: None,
        },
    ];

    let output = flatcsv::to_string(&readings, &config)?;
    assert_eq!(output, "north,10,15,21.5\r\nsouth,10,16,\r\n");
    assert_eq!(
        derive_header::<Reading>(&config)?.names(),
        ["sensor", "at[0]", "at[1]", "value"]
    );

    let decoded: Vec<Reading> = flatcsv::from_str(&output, &config)?;
    assert_eq!(decoded, readings);
    Ok(())
}

#[test]
fn maps_and_enums_round_trip() -> Result<(), Box<dyn Error>> {
    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    enum Outcome {
        Passed,
        Failed { message: String },
        Skipped(String),
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Run {
        id: u32,
        status: Outcome,
        durations: BTreeMap<String, u64>,
    }

    let runs = vec![
        Run {
            id: 1,
            status: Outcome::Failed {
                message: "expected 2, got 3".to_string(),
            },
            durations: BTreeMap::from([("compile".to_string(), 120), ("test".to_string(), 45)]),
        },
        Run {
            id: 2,
            status: Outcome::Failed {
                message: String::new(),
            },
            durations: BTreeMap::from([("compile".to_string(), 98), ("test".to_string(), 51)]),
        },
    ];

    let config = CsvConfig {
        quote_empty_strings: true,
        ..CsvConfig::default()
    };
    let output = flatcsv::to_string(&runs, &config)?;
    assert!(output.starts_with("id,status.Failed.message,durations.compile,durations.test\r\n"));
    assert!(output.ends_with("2,\"\",98,51\r\n"));

    let decoded: Vec<Run> = flatcsv::from_str(&output, &config)?;
    assert_eq!(decoded, runs);

    let skipped = vec![(1u8, Outcome::Skipped("flaky".to_string())), (2u8, Outcome::Skipped("slow".to_string()))];
    let output = flatcsv::to_string(&skipped, &config)?;
    assert_eq!(output, "[0],[1].Skipped\r\n1,flaky\r\n2,slow\r\n");
    let decoded: Vec<(u8, Outcome)> = flatcsv::from_str(&output, &config)?;
    assert_eq!(decoded, skipped);

    let passed = vec![(7u8, Outcome::Passed)];
    let output = flatcsv::to_string(&passed, &config)?;
    assert_eq!(output, "[0],[1]\r\n7,Passed\r\n");
    Ok(())
}

#[test]
fn untyped_rows_decode_into_json_values() -> Result<(), Box<dyn Error>> {
    let input = "id,meta.owner,meta.score,tags[0],tags[1]\n1,ana,0.5,a,\n2,\"42\",,b,c\n";
    let rows: Vec<serde_json::Value> = flatcsv::from_str(input, &CsvConfig::default())?;

    assert_eq!(
        rows,
        vec![
            serde_json::json!({ "id": 1, "meta": { "owner": "ana", "score": 0.5 }, "tags": ["a"] }),
            serde_json::json!({ "id": 2, "meta": { "owner": "42", "score": null }, "tags": ["b", "c"] }),
        ]
    );
    Ok(())
}

#[test]
fn writer_output_is_readable_as_plain_text() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("plain.csv");

    let writer = CsvItemWriterBuilder::new()
        .delimiter(b'\t')
        .terminator(LineTerminator::Lf)
        .from_path(&path)?;
    writer.write(&[("a\tb", 1), ("c", 2)])?;
    ItemWriter::<(&str, i32)>::close(&writer)?;
    drop(writer);

    assert_eq!(read_to_string(&path)?, "[0]\t[1]\n\"a\tb\"\t1\nc\t2\n");
    fs::remove_file(&path)?;
    Ok(())
}

#[test]
fn integer_keyed_maps_keep_their_keys() -> Result<(), Box<dyn Error>> {
    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Leaderboard {
        round: u32,
        scores: BTreeMap<u32, String>,
    }

    let boards = vec![Leaderboard {
        round: 3,
        scores: BTreeMap::from([(1, "ana".to_string()), (2, "bo".to_string())]),
    }];

    let output = flatcsv::to_string(&boards, &CsvConfig::default())?;
    assert_eq!(output, "round,scores.1,scores.2\r\n3,ana,bo\r\n");
    let decoded: Vec<Leaderboard> = flatcsv::from_str(&output, &CsvConfig::default())?;
    assert_eq!(decoded, boards);

    let by_count = CsvConfig {
        index_notation: IndexNotation::FlattenByCount,
        ..CsvConfig::default()
    };
    assert!(matches!(
        flatcsv::to_string(&boards, &by_count),
        Err(flatcsv::CsvError::Configuration(_))
    ));

    let decoded: Vec<Leaderboard> = flatcsv::from_str(&output, &by_count)?;
    assert_eq!(decoded, boards);
    Ok(())
}
