use std::fs;
use std::path::{Path, PathBuf};

use serde_json::json;

use datamask_core::RuleSpec;
use datamask_engine::{EngineOptions, SubstitutionEngine};
use datamask_sources::{
    CsvOptions, CsvSource, FieldLocation, FieldSpec, JsonSource, FileOptions, Namespaces, SourceAdapter,
    SourceError, SourceKind, XmlSource,
};

fn temp_out_dir(label: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "datamask_sources_{label}_{}",
        uuid::Uuid::new_v4()
    ));
    fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn engine() -> SubstitutionEngine {
    SubstitutionEngine::new(EngineOptions {
        seed: Some(17),
        ..EngineOptions::default()
    })
}

fn field(engine: &SubstitutionEngine, location: FieldLocation, rule: RuleSpec) -> FieldSpec {
    FieldSpec::new(location, engine.resolve_rule(&rule).expect("resolve rule"))
}

fn read_rows(path: &Path) -> Vec<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(b';')
        .from_path(path)
        .expect("open csv output");
    reader
        .records()
        .map(|record| {
            record
                .expect("csv record")
                .iter()
                .map(str::to_string)
                .collect()
        })
        .collect()
}

#[tokio::test]
async fn csv_rows_are_anonymized_consistently() {
    let dir = temp_out_dir("csv");
    let input = dir.join("people.csv");
    fs::write(
        &input,
        "first;last;email;id\n\
         Ann;Smith;ann@corp.test;ID-100\n\
         Bob;Smith;;ID-200\n\
         Ann;Jones;ann2@corp.test;ID-100\n",
    )
    .expect("write input");

    let engine = engine();
    let fields = vec![
        field(&engine, FieldLocation::column("first"), RuleSpec::generator("first_name")),
        field(&engine, FieldLocation::column("1"), RuleSpec::generator("last_name")),
        field(
            &engine,
            FieldLocation::column("email"),
            RuleSpec::template("{{ row.first | lower }}@example.com"),
        ),
        field(
            &engine,
            FieldLocation::column("id"),
            RuleSpec::generator_with_params("number", json!({"min": 1, "max": 9})),
        )
        .with_regexp(r"ID-(\d+)")
        .expect("regexp"),
    ];
    let source = CsvSource::new(
        &input,
        CsvOptions {
            header_lines: 1,
            ..CsvOptions::default()
        },
        FileOptions::default(),
    );
    assert_eq!(source.kind(), SourceKind::Csv);

    let report = source.anonymize(&engine, &fields).await.expect("anonymize csv");
    let output = dir.join("people.csv_anonymized");
    assert_eq!(report.output.as_deref(), Some(output.to_str().unwrap()));
    assert_eq!(report.values_anonymized, 11);

    let rows = read_rows(&output);
    assert_eq!(rows[0], vec!["first", "last", "email", "id"]);
    assert_eq!(rows.len(), 4);

    // Repeated originals map to the same substitute.
    assert_eq!(rows[1][0], rows[3][0]);
    assert_ne!(rows[1][0], "Ann");
    assert_eq!(rows[1][1], rows[2][1]);
    assert_eq!(rows[1][3], rows[3][3]);

    // Templates see the substituted first name; empty cells stay empty.
    assert_eq!(rows[1][2], format!("{}@example.com", rows[1][0].to_lowercase()));
    assert_eq!(rows[2][2], "");

    // Only the regexp group changes.
    assert!(rows[1][3].starts_with("ID-"));
    let digits: i64 = rows[1][3]["ID-".len()..].parse().expect("numeric id");
    assert!((1..=9).contains(&digits));

    // The input is untouched unless overwriting.
    assert!(fs::read_to_string(&input).unwrap().contains("Ann;Smith"));
}

#[tokio::test]
async fn csv_overwrite_and_unknown_column() {
    let dir = temp_out_dir("csv_overwrite");
    let input = dir.join("data.csv");
    fs::write(&input, "  Oslo  ;x\n\n;y\n").expect("write input");
    let engine = engine();

    let source = CsvSource::new(
        &input,
        CsvOptions::default(),
        FileOptions {
            overwrite: true,
            ..FileOptions::default()
        },
    );
    let fields = vec![field(&engine, FieldLocation::column("0"), RuleSpec::generator("city"))];
    let report = source.anonymize(&engine, &fields).await.expect("anonymize");
    assert_eq!(report.values_anonymized, 1);
    assert_eq!(report.output.as_deref(), Some(input.to_str().unwrap()));

    let rows = read_rows(&input);
    assert_ne!(rows[0][0].trim(), "Oslo");
    assert_eq!(rows[1], vec!["", "y"]);
    assert!(!dir.join("data.csv_anonymized").exists());

    let missing = vec![field(&engine, FieldLocation::column("nope"), RuleSpec::generator("city"))];
    let err = source.anonymize(&engine, &missing).await.unwrap_err();
    assert!(matches!(err, SourceError::InvalidLocation(_)));
}

#[tokio::test]
async fn latin_csv_is_decoded_and_written_back_in_its_encoding() {
    let dir = temp_out_dir("csv_latin");
    let input = dir.join("people.csv");
    fs::write(&input, b"name;town\nJos\xe9;Z\xfcrich\nJos\xe9;K\xf6ln\n").expect("write input");
    let engine = engine();
    let latin = encoding_rs::Encoding::for_label(b"ISO-8859-15").expect("known label");

    let source = CsvSource::new(
        &input,
        CsvOptions {
            header_lines: 1,
            ..CsvOptions::default()
        },
        FileOptions {
            encoding: latin,
            ..FileOptions::default()
        },
    );
    let fields = vec![field(
        &engine,
        FieldLocation::column("name"),
        RuleSpec::template("{{ value }}-{{ row.town }}"),
    )];
    let report = source.anonymize(&engine, &fields).await.expect("anonymize latin csv");
    assert_eq!(report.values_anonymized, 2);

    let bytes = fs::read(dir.join("people.csv_anonymized")).expect("read output");
    assert!(std::str::from_utf8(&bytes).is_err());
    let (text, _, malformed) = latin.decode(&bytes);
    assert!(!malformed);
    assert_eq!(text, "name;town\nJosé-Zürich;Zürich\nJosé-Köln;Köln\n");

    let strict = CsvSource::new(&input, CsvOptions::default(), FileOptions::default());
    let err = strict.anonymize(&engine, &fields).await.unwrap_err();
    assert!(matches!(err, SourceError::Encoding(_)));
}

#[tokio::test]
async fn json_document_is_rewritten_pretty() {
    let dir = temp_out_dir("json");
    let input = dir.join("people.json");
    fs::write(
        &input,
        r#"{"people":[
            {"name":"Ann","age":30,"note":null},
            {"name":"Ann","age":41,"note":"x"}
        ],"owner":{"name":"Bob"}}"#,
    )
    .expect("write input");

    let engine = engine();
    let fields = vec![
        field(
            &engine,
            FieldLocation::json_path("$.people[*].name").unwrap(),
            RuleSpec::generator("first_name"),
        ),
        field(
            &engine,
            FieldLocation::json_path("$..age").unwrap(),
            RuleSpec::generator_with_params("number", json!({"min": 18, "max": 99})),
        ),
        field(
            &engine,
            FieldLocation::json_path("$.people[*].note").unwrap(),
            RuleSpec::generator("word"),
        ),
    ];
    let report = JsonSource::new(&input, FileOptions::default())
        .anonymize(&engine, &fields)
        .await
        .expect("anonymize json");
    assert_eq!(report.values_anonymized, 5);

    let text = fs::read_to_string(dir.join("people.json_anonymized")).expect("read output");
    assert!(text.starts_with("{\n    \"people\": ["));
    let output: serde_json::Value = serde_json::from_str(&text).expect("parse output");
    let people = output["people"].as_array().unwrap();
    assert_eq!(people[0]["name"], people[1]["name"]);
    assert_ne!(people[0]["name"], json!("Ann"));
    assert!(people[0]["age"].as_i64().is_some_and(|age| (18..=99).contains(&age)));
    assert_eq!(people[0]["note"], serde_json::Value::Null);
    assert_eq!(output["owner"]["name"], json!("Bob"));
    assert_eq!(
        output.as_object().unwrap().keys().collect::<Vec<_>>(),
        vec!["people", "owner"]
    );
}

#[tokio::test]
async fn xml_text_and_attributes_are_rewritten() {
    let dir = temp_out_dir("xml");
    let input = dir.join("people.xml");
    fs::write(
        &input,
        r#"<?xml version="1.0" encoding="UTF-8"?>
<people>
  <person id="17"><lastname>Quaxley</lastname><city>Oslo</city></person>
  <person id="18"><lastname>Quaxley</lastname></person>
</people>
"#,
    )
    .expect("write input");

    let engine = engine();
    let fields = vec![
        field(
            &engine,
            FieldLocation::xpath("./person/lastname").unwrap(),
            RuleSpec::generator("last_name"),
        ),
        field(
            &engine,
            FieldLocation::xpath("/people/person/@id").unwrap(),
            RuleSpec::generator_with_params("number", json!({"min": 1000, "max": 1000})),
        ),
        field(
            &engine,
            FieldLocation::xpath("//city").unwrap(),
            RuleSpec::template("{{ row.lastname }}ville"),
        ),
    ];
    let report = XmlSource::new(&input, FileOptions::default())
        .anonymize(&engine, &fields)
        .await
        .expect("anonymize xml");
    assert_eq!(report.values_anonymized, 5);

    let text = fs::read_to_string(dir.join("people.xml_anonymized")).expect("read output");
    assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
    assert!(text.ends_with("</people>\n"));
    assert!(!text.contains("Quaxley"));
    assert!(!text.contains("Oslo"));
    assert_eq!(text.matches("id=\"1000\"").count(), 2);

    let document = datamask_sources::xml::parse_document(text.as_bytes()).expect("parse output");
    let first = document.root.element_at(&[0]).unwrap();
    let last_name = first.element_at(&[0]).unwrap().text().unwrap().to_string();
    let second = document.root.element_at(&[1, 0]).unwrap().text().unwrap();
    assert_eq!(last_name, second);
    assert_eq!(
        first.element_at(&[1]).unwrap().text(),
        Some(format!("{last_name}ville").as_str())
    );
}

#[tokio::test]
async fn xml_namespaces_bind_prefixes_and_markup_is_kept() {
    let dir = temp_out_dir("xml_ns");
    let input = dir.join("staff.xml");
    fs::write(
        &input,
        r#"<?xml version="1.0"?>
<!-- nightly export -->
<hr:staff xmlns:hr="urn:example:hr">
  <?sync source="ldap"?>
  <hr:member><hr:name>Quaxley</hr:name></hr:member>
  <member><name>Zebulon</name></member>
</hr:staff>
"#,
    )
    .expect("write input");

    let engine = engine();
    let fields = vec![field(
        &engine,
        FieldLocation::xpath("/s:staff/s:member/s:name").unwrap(),
        RuleSpec::generator("last_name"),
    )];
    let namespaces = Namespaces::from([("s".to_string(), "urn:example:hr".to_string())]);
    let report = XmlSource::new(&input, FileOptions::default())
        .with_namespaces(namespaces)
        .anonymize(&engine, &fields)
        .await
        .expect("anonymize namespaced xml");
    assert_eq!(report.values_anonymized, 1);

    let text = fs::read_to_string(dir.join("staff.xml_anonymized")).expect("read output");
    assert!(!text.contains("Quaxley"));
    assert!(text.contains("Zebulon"));
    assert!(text.contains("<!-- nightly export -->"));
    assert!(text.contains("<?sync source=\"ldap\"?>"));
    assert!(text.contains("xmlns:hr=\"urn:example:hr\""));

    let unbound = XmlSource::new(&input, FileOptions::default())
        .anonymize(&engine, &fields)
        .await
        .expect("anonymize without bindings");
    assert_eq!(unbound.values_anonymized, 0);
}

#[tokio::test]
async fn location_kind_mismatch_is_rejected() {
    let dir = temp_out_dir("mismatch");
    let input = dir.join("doc.json");
    fs::write(&input, "{}").expect("write input");
    let engine = engine();
    let fields = vec![field(&engine, FieldLocation::column("0"), RuleSpec::generator("city"))];
    let err = JsonSource::new(&input, FileOptions::default())
        .anonymize(&engine, &fields)
        .await
        .unwrap_err();
    assert!(matches!(err, SourceError::InvalidLocation(_)));
}
