use anyhow::Result;
use std::sync::Arc;

use codequal::analysis::PatternAnalyzer;
use codequal::config::BackendKind;
use codequal::retrieval::CorpusDocument;
use codequal::RetrievalIndex;

use crate::helpers::test_harness::TestHarness;

const PARSER: &str = r#"import json

def parse_config(path):
    """Load the configuration file and validate required keys."""
    with open(path) as handle:
        config = json.load(handle)
    if "name" not in config:
        raise ValueError("missing name")
    return config
"#;

const SERVER: &str = r#"const http = require('http');

function startServer(port) {
  const server = http.createServer((req, res) => {
    res.writeHead(200, { 'Content-Type': 'text/plain' });
    res.end('ok');
  });
  server.listen(port);
  return server;
}
"#;

fn document(path: &str, language: &str, content: &str, issue_count: usize) -> CorpusDocument {
    CorpusDocument {
        path: path.to_string(),
        language: language.to_string(),
        content: content.to_string(),
        issue_count,
    }
}

#[tokio::test]
async fn test_ingest_then_query_finds_matching_file() -> Result<()> {
    let harness = TestHarness::new()?;
    let index = harness.open_index().await?;
    assert_eq!(index.backend_name(), BackendKind::Flat);

    let added = index
        .ingest(&[
            document("config.py", "python", PARSER, 0),
            document("server.js", "javascript", SERVER, 2),
        ])
        .await?;
    assert!(added >= 2);

    let hits = index.query("http.createServer listen port", 3).await?;
    assert!(!hits.is_empty());
    assert_eq!(hits[0].entry.file_path, "server.js");
    assert_eq!(hits[0].entry.issue_count, 2);
    assert!(hits.windows(2).all(|pair| pair[0].score >= pair[1].score));

    let stats = index.stats().await;
    assert_eq!(stats.backend, "flat");
    assert_eq!(stats.total_files, 2);
    assert_eq!(stats.languages["python"] + stats.languages["javascript"], stats.total_fragments);
    assert!(stats.fragments_with_functions >= 2);
    Ok(())
}

#[tokio::test]
async fn test_reopened_index_answers_identically() -> Result<()> {
    let harness = TestHarness::new()?;
    let before = {
        let index = harness.open_index().await?;
        index
            .ingest(&[
                document("config.py", "python", PARSER, 1),
                document("server.js", "javascript", SERVER, 0),
            ])
            .await?;
        index.query("validate configuration keys", 5).await?
    };

    let reopened = harness.open_index().await?;
    let after = reopened.query("validate configuration keys", 5).await?;

    assert!(!before.is_empty());
    assert_eq!(before, after);
    Ok(())
}

#[tokio::test]
async fn test_clear_empties_results() -> Result<()> {
    let harness = TestHarness::new()?;
    let index = harness.open_index().await?;
    index.ingest(&[document("config.py", "python", PARSER, 0)]).await?;

    index.clear().await?;

    assert!(index.query("parse_config", 5).await?.is_empty());
    assert_eq!(index.stats().await.total_fragments, 0);

    let reopened = harness.open_index().await?;
    assert_eq!(reopened.stats().await.total_fragments, 0);
    Ok(())
}

#[cfg(not(feature = "vector-db"))]
#[tokio::test]
async fn test_unavailable_backend_falls_through_the_chain() -> Result<()> {
    let mut harness = TestHarness::new()?;
    harness.config.retrieval.backends = vec![BackendKind::VectorDb, BackendKind::Keyword];

    let index = harness.open_index().await?;
    assert_eq!(index.backend_name(), BackendKind::Keyword);

    index.ingest(&[document("server.js", "javascript", SERVER, 0)]).await?;
    let hits = index.query("createServer", 1).await?;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].entry.file_path, "server.js");
    Ok(())
}

#[tokio::test]
async fn test_pipeline_run_populates_index() -> Result<()> {
    let harness = TestHarness::new()?;
    harness.create_test_file("src/config.py", PARSER)?;
    harness.create_test_file("src/server.js", SERVER)?;

    let index = Arc::new(harness.open_index().await?);
    let report = harness
        .pipeline(vec![Arc::new(PatternAnalyzer::new())])
        .with_index(index.clone())
        .run(harness.path())
        .await?;
    assert_eq!(report.summary.total_files, 2);

    let hits = index.query("parse_config json.load", 2).await?;
    assert_eq!(hits[0].entry.file_path, "src/config.py");

    // a fresh handle sees what the pipeline persisted
    let reopened: RetrievalIndex = harness.open_index().await?;
    assert_eq!(reopened.stats().await.total_files, 2);
    Ok(())
}
