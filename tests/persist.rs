use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use chrono::{Local, TimeZone};
use datahub_sheets::config::Settings;
use datahub_sheets::error::ValidationError;
use datahub_sheets::io::authored::parse_authored;
use datahub_sheets::io::{decode, encode};
use datahub_sheets::merge::{MergeRequest, MergeSpec};
use datahub_sheets::model::{Sheet, Workbook};
use datahub_sheets::persist::{WorkbookLocation, generated_path, persist};
use datahub_sheets::pipeline;
use datahub_sheets::SheetError;
use tempfile::tempdir;

fn sheet(name: &str, columns: &[&str], rows: &[&[&str]]) -> Sheet {
    let mut sheet = Sheet::new(name, columns.iter().copied());
    for row in rows {
        sheet.push_row(row.iter().map(|cell| cell.to_string()).collect());
    }
    sheet
}

fn touch(path: &Path, seconds_ago: u64) {
    let modified = SystemTime::now() - Duration::from_secs(seconds_ago);
    fs::File::options()
        .write(true)
        .open(path)
        .expect("file opened")
        .set_modified(modified)
        .expect("modification time set");
}

fn sales_document() -> serde_json::Value {
    serde_json::json!({
        "workbook_name": "sales",
        "sheets": [
            {
                "name": "Orders",
                "columns": [{ "name": "OrderId" }, { "name": "Customer" }],
                "rows": [{ "0": "1", "1": "Ana" }, { "0": "2", "1": "Ben" }]
            },
            {
                "name": "Shipping",
                "columns": [{ "name": "OrderId" }, { "name": "Status" }],
                "rows": [{ "0": "1", "1": "Shipped" }, { "0": "3", "1": "Pending" }]
            }
        ]
    })
}

fn status_request() -> MergeRequest {
    MergeRequest {
        target_table_name: "Orders".into(),
        source_table_names: vec!["Shipping".into()],
        match_columns: vec!["OrderId".into()],
        merge_columns: vec![MergeSpec::new("Shipping", ["Status"])],
        ..MergeRequest::default()
    }
}

fn saved_project(root: &Path) -> WorkbookLocation {
    let settings = Settings::new(root);
    let mut location = settings.location("demo").expect("project location");
    let authored = parse_authored(&sales_document()).expect("authored workbook parsed");
    pipeline::save_authored(&mut location, &authored).expect("workbook saved");
    location
}

#[test]
fn location_resolves_most_recent_workbook() {
    let temp_dir = tempdir().expect("temporary directory");
    let dir = temp_dir.path();
    let workbook = Workbook::new(vec![sheet("Data", &["A"], &[&["1"]])]);

    for name in ["old.xlsx", "new.xlsx", ".hidden.xlsx"] {
        encode(&workbook, &dir.join(name)).expect("Excel written");
    }
    fs::write(dir.join("notes.txt"), "newest but not a workbook").expect("notes written");
    touch(&dir.join("old.xlsx"), 300);
    touch(&dir.join("new.xlsx"), 100);
    touch(&dir.join(".hidden.xlsx"), 0);

    let location = WorkbookLocation::resolve(dir).expect("location resolved");

    assert_eq!(location.file(), Some(dir.join("new.xlsx").as_path()));
}

#[test]
fn empty_project_has_no_workbook() {
    let temp_dir = tempdir().expect("temporary directory");
    let location = WorkbookLocation::resolve(temp_dir.path()).expect("location resolved");

    assert_eq!(location.file(), None);
    assert!(matches!(
        location.require_file(),
        Err(SheetError::WorkbookNotFound(_))
    ));
    assert_eq!(pipeline::load_workbook(&location).expect("load ran"), None);
}

#[test]
fn generated_path_uses_timestamp_and_avoids_existing_files() {
    let temp_dir = tempdir().expect("temporary directory");
    let dir = temp_dir.path();
    let now = Local
        .with_ymd_and_hms(2024, 1, 5, 9, 30, 0)
        .single()
        .expect("unambiguous local time");

    let first = generated_path(dir, now);
    assert_eq!(first, dir.join("workbook_20240105_093000.xlsx"));

    fs::write(&first, b"taken").expect("placeholder written");
    assert_eq!(
        generated_path(dir, now),
        dir.join("workbook_20240105_093000_1.xlsx")
    );
}

#[test]
fn persist_creates_a_file_when_location_has_none() {
    let temp_dir = tempdir().expect("temporary directory");
    let mut location = WorkbookLocation::new(temp_dir.path().join("fresh"), None);
    let workbook = Workbook::new(vec![sheet("Data", &["A"], &[&["1"]])]);

    let written = persist(&workbook, &mut location).expect("workbook persisted");

    assert_eq!(location.file(), Some(written.as_path()));
    let file_name = written
        .file_name()
        .and_then(|name| name.to_str())
        .expect("file name");
    assert!(file_name.starts_with("workbook_"));
    assert_eq!(decode(&written).expect("Excel read"), workbook);

    let entries = fs::read_dir(temp_dir.path().join("fresh"))
        .expect("directory listed")
        .count();
    assert_eq!(entries, 1);
}

#[test]
fn merge_pipeline_persists_merged_workbook() {
    let temp_dir = tempdir().expect("temporary directory");
    let mut location = saved_project(temp_dir.path());
    let path = location.require_file().expect("saved file").to_path_buf();
    assert_eq!(path, temp_dir.path().join("demo").join("sales.xlsx"));

    let outcome =
        pipeline::merge_tables(&mut location, &status_request()).expect("merge persisted");
    assert_eq!(outcome.row_delta, 1);

    let reopened = WorkbookLocation::resolve(temp_dir.path().join("demo")).expect("resolved");
    assert_eq!(reopened.file(), Some(path.as_path()));
    let workbook = decode(&path).expect("Excel read");
    let orders = workbook.sheet("Orders").expect("orders sheet");
    assert_eq!(orders.rows().len(), 3);
    assert_eq!(orders.value(0, "Status"), Some("Shipped"));
    assert_eq!(orders.value(1, "Status"), Some(""));
    assert_eq!(orders.value(2, "Customer"), Some(""));
    assert_eq!(orders.value(2, "Status"), Some("Pending"));

    let loaded = pipeline::load_workbook(&reopened)
        .expect("workbook loaded")
        .expect("workbook present");
    assert_eq!(loaded.workbook_name, "sales");
    assert!(loaded.saved_at.is_some());
    assert_eq!(loaded.sheets[0].columns.len(), 3);
}

#[test]
fn rejected_merge_leaves_file_untouched() {
    let temp_dir = tempdir().expect("temporary directory");
    let mut location = saved_project(temp_dir.path());
    let path = location.require_file().expect("saved file").to_path_buf();
    let before = fs::read(&path).expect("file read");

    let request = MergeRequest {
        source_table_names: vec!["Shipping".into(), "Returns".into()],
        ..status_request()
    };
    let error = pipeline::merge_tables(&mut location, &request).expect_err("merge rejected");

    assert!(matches!(
        error,
        SheetError::Validation(ValidationError::MissingTable(ref tables)) if tables == &["Returns"]
    ));
    assert_eq!(fs::read(&path).expect("file read"), before);
}

#[test]
fn import_appends_sheets_with_unique_names() {
    let temp_dir = tempdir().expect("temporary directory");
    let mut location = saved_project(temp_dir.path());

    let upload = temp_dir.path().join("upload.xlsx");
    let incoming = Workbook::new(vec![
        sheet("Orders", &["OrderId"], &[&["7"]]),
        sheet("Extra", &["Note"], &[&["hello"]]),
    ]);
    encode(&incoming, &upload).expect("Excel written");

    let outcome = pipeline::import_sheets(&mut location, &upload).expect("sheets imported");
    assert_eq!(outcome.imported, vec!["Orders_1".to_string(), "Extra".to_string()]);

    let summaries = pipeline::list_sheets(&location).expect("sheets listed");
    let names: Vec<&str> = summaries.iter().map(|summary| summary.name.as_str()).collect();
    assert_eq!(names, vec!["Orders", "Shipping", "Orders_1", "Extra"]);
    assert_eq!(summaries[2].rows, 1);
    assert_eq!(summaries[3].columns, vec!["Note".to_string()]);
}

#[test]
fn import_renames_sheets_that_clash_once_stored() {
    let temp_dir = tempdir().expect("temporary directory");
    let mut location = saved_project(temp_dir.path());
    let long_name = format!("{}A", "x".repeat(31));
    let truncated = "x".repeat(31);

    let upload = temp_dir.path().join("upload.xlsx");
    let incoming = Workbook::new(vec![
        sheet("orders", &["OrderId"], &[&["7"]]),
        sheet(&truncated, &["Note"], &[&["first"]]),
    ]);
    encode(&incoming, &upload).expect("Excel written");
    pipeline::import_sheets(&mut location, &upload).expect("first import");

    let second = temp_dir.path().join("second.xlsx");
    encode(
        &Workbook::new(vec![sheet(&long_name, &["Note"], &[&["second"]])]),
        &second,
    )
    .expect("Excel written");
    let outcome = pipeline::import_sheets(&mut location, &second).expect("second import");

    let renamed = format!("{}_1", "x".repeat(29));
    assert_eq!(outcome.imported, vec![renamed.clone()]);
    let summaries = pipeline::list_sheets(&location).expect("sheets listed");
    let names: Vec<&str> = summaries.iter().map(|summary| summary.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["Orders", "Shipping", "orders_1", truncated.as_str(), renamed.as_str()]
    );
}

#[test]
fn import_requires_existing_upload() {
    let temp_dir = tempdir().expect("temporary directory");
    let mut location = saved_project(temp_dir.path());

    let error = pipeline::import_sheets(&mut location, &temp_dir.path().join("missing.xlsx"))
        .expect_err("missing upload rejected");

    assert!(matches!(error, SheetError::MissingInput(_)));
}

#[test]
fn project_identifier_must_name_a_single_directory() {
    let temp_dir = tempdir().expect("temporary directory");
    let settings = Settings::new(temp_dir.path());

    for project in ["", "..", "a/b", "../escape"] {
        assert!(matches!(
            settings.project_dir(project),
            Err(SheetError::InvalidProject(_))
        ));
    }
    let dir = settings.project_dir("demo").expect("project directory");
    assert!(dir.is_dir());
}

#[test]
fn workbook_name_must_be_a_plain_file_name() {
    let temp_dir = tempdir().expect("temporary directory");
    let mut location = WorkbookLocation::new(temp_dir.path(), None);
    let mut document = sales_document();
    document["workbook_name"] = serde_json::json!("../sales");
    let authored = parse_authored(&document).expect("authored workbook parsed");

    let error = pipeline::save_authored(&mut location, &authored).expect_err("name rejected");

    assert!(matches!(error, SheetError::InvalidWorkbook(_)));
    assert_eq!(location.file(), None);
}
