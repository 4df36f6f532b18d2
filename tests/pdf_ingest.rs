//! PDF loading from a data directory and ingestion through the shell.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use carebot::app::{App, Component};
use carebot::loader::load_documents;
use carebot::shell::{Input, ScriptedInput, Shell};
use carebot_core::engine::{EngineOptions, RagEngine};
use carebot_core::error::Error;
use carebot_core::index::{ensure_index, IndexControl, IndexTarget, VectorIndex};
use carebot_core::memory::{HashingEmbedder, MemoryIndexService, StaticChat};
use tempfile::TempDir;

/// Minimal single-page PDF showing `phrase` in Helvetica. Byte offsets in
/// the xref table are computed while writing the body.
fn minimal_pdf(phrase: &str) -> Vec<u8> {
    let content = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", phrase);
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(
        format!(
            "4 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
            content.len(),
            content
        )
        .as_bytes(),
    );
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

fn write(dir: &Path, relative: &str, bytes: &[u8]) {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, bytes).unwrap();
}

#[test]
fn test_loads_nested_pdfs_and_skips_others() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "plan.pdf", &minimal_pdf("annual deductible phrase"));
    write(tmp.path(), "2024/dental/Benefits.PDF", &minimal_pdf("dental cleaning phrase"));
    write(tmp.path(), "notes.txt", b"not a pdf");
    write(tmp.path(), "broken.pdf", b"not a pdf");

    let docs = load_documents(tmp.path()).unwrap();

    assert_eq!(docs.len(), 2);
    assert!(docs.iter().all(|d| d.is_whole_document()));
    assert!(docs
        .iter()
        .any(|d| d.content.contains("annual deductible phrase")));
    assert!(docs
        .iter()
        .any(|d| d.source().unwrap().ends_with("Benefits.PDF")));
}

#[test]
fn test_directory_without_pdfs() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "readme.md", b"# nothing here");

    let err = load_documents(tmp.path()).unwrap_err();
    assert!(matches!(err, Error::NoDocumentsFound(_)));
}

#[test]
fn test_empty_directory() {
    let tmp = TempDir::new().unwrap();
    assert!(matches!(
        load_documents(tmp.path()),
        Err(Error::NoDocumentsFound(_))
    ));
}

async fn app_with_index(data_dir: &Path) -> (App, Arc<dyn VectorIndex>) {
    let service = MemoryIndexService::new();
    let embedder = Arc::new(HashingEmbedder::new("hash", 64));
    let target = IndexTarget {
        name: "care".to_string(),
        region: "us-east-1".to_string(),
        allow_recreate: false,
    };
    let handle = ensure_index(&service, embedder.as_ref(), &target)
        .await
        .unwrap();
    let index = service.open(&handle.description).unwrap();
    let engine = RagEngine::new(
        embedder,
        index.clone(),
        Arc::new(StaticChat::new("unused")),
        None,
        EngineOptions::default(),
    );
    let app = App::new(
        Component::Ready(engine),
        Component::Unavailable("not configured".to_string()),
        data_dir.to_path_buf(),
    );
    (app, index)
}

#[tokio::test]
async fn test_menu_ingest_stores_every_pdf() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "a.pdf", &minimal_pdf("copay phrase"));
    write(tmp.path(), "b/b.pdf", &minimal_pdf("coinsurance phrase"));
    let (app, index) = app_with_index(tmp.path()).await;

    let mut shell = Shell::new(app, ScriptedInput::lines(&["1", "1", "5"]), Vec::new());
    shell.run().await.unwrap();
    let out = String::from_utf8(shell.into_output()).unwrap();

    assert_eq!(out.matches("Successfully ingested 2 document chunks.").count(), 2);
    // Re-ingesting the same files overwrites by source path.
    assert_eq!(index.vector_count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_interrupted_ingest_stores_nothing() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "a.pdf", &minimal_pdf("copay phrase"));
    let (app, index) = app_with_index(tmp.path()).await;

    let script = ScriptedInput::new(vec![
        Input::Line("1".to_string()),
        Input::Interrupt,
        Input::Line("5".to_string()),
    ]);
    let mut shell = Shell::new(app, script, Vec::new());
    shell.run().await.unwrap();
    let out = String::from_utf8(shell.into_output()).unwrap();

    assert!(out.contains("Processing 1 document chunks..."));
    assert!(out.contains("Operation cancelled."));
    assert!(!out.contains("Successfully ingested"));
    assert_eq!(index.vector_count().await.unwrap(), 0);
}
