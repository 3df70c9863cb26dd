use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tantivy::collector::DocSetCollector;
use tantivy::query::{BooleanQuery, Occur, Query, RegexQuery};
use tantivy::schema::{
    Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, Value as _, INDEXED, STORED,
};
use tantivy::tokenizer::{LowerCaser, RegexTokenizer, StopWordFilter, TextAnalyzer, TokenStream};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use tracing::{debug, info};

use super::backend::{rank, BackendCandidate, RetrievalBackend};
use super::IndexEntry;
use crate::config::{BackendKind, RetrievalConfig};

/// Tantivy index directory inside the backend directory
const INDEX_DIR: &str = "keyword.index";

const FIELD_POSITION: &str = "position";
const FIELD_CONTENT: &str = "content";

/// Name the code analyzer is registered under
const CODE_TOKENIZER: &str = "code";

const WORD_PATTERN: &str = r"[A-Za-z_][A-Za-z0-9_]*";

const MIN_KEYWORD_LEN: usize = 3;

const WRITER_HEAP_BYTES: usize = 50_000_000;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "are", "was", "were", "have", "has",
    "not", "but", "you", "your", "all", "any", "can", "how", "what", "where", "which", "who",
    "why", "when", "does", "into", "about", "there", "their", "then", "than", "use", "used",
    "code", "file", "files", "show", "find",
];

/// Weight of the query-side coverage in a keyword score
const QUERY_WEIGHT: f32 = 0.7;

/// Identifier tokenizer: whole `snake_case` words, lowercased, stopwords removed.
pub fn code_analyzer() -> Result<TextAnalyzer> {
    let tokenizer = RegexTokenizer::new(WORD_PATTERN).context("Invalid word pattern")?;
    Ok(TextAnalyzer::builder(tokenizer)
        .filter(LowerCaser)
        .filter(StopWordFilter::remove(STOPWORDS.iter().map(|w| w.to_string())))
        .build())
}

/// Keywords of `text` as produced by `analyzer`, short words dropped.
pub fn keywords(analyzer: &mut TextAnalyzer, text: &str) -> BTreeSet<String> {
    let mut words = BTreeSet::new();
    let mut stream = analyzer.token_stream(text);
    while stream.advance() {
        let word = &stream.token().text;
        if word.len() >= MIN_KEYWORD_LEN {
            words.insert(word.clone());
        }
    }
    words
}

/// Share of query keywords found inside fragment keywords, blended with
/// the share of fragment keywords hit. Identical keyword sets score 1.0.
fn coverage(query: &BTreeSet<String>, fragment: &BTreeSet<String>) -> f32 {
    let matched = query
        .iter()
        .filter(|q| fragment.iter().any(|word| word.contains(q.as_str())))
        .count();
    let hit = fragment
        .iter()
        .filter(|word| query.iter().any(|q| word.contains(q.as_str())))
        .count();

    let query_share = matched as f32 / query.len().max(1) as f32;
    let fragment_share = hit as f32 / fragment.len().max(1) as f32;
    QUERY_WEIGHT * query_share + (1.0 - QUERY_WEIGHT) * fragment_share
}

fn keyword_schema() -> Schema {
    let mut builder = Schema::builder();
    builder.add_u64_field(FIELD_POSITION, INDEXED | STORED);
    let indexing = TextFieldIndexing::default()
        .set_tokenizer(CODE_TOKENIZER)
        .set_index_option(IndexRecordOption::WithFreqs);
    builder.add_text_field(
        FIELD_CONTENT,
        TextOptions::default().set_indexing_options(indexing).set_stored(),
    );
    builder.build()
}

/// Keyword and substring matching over a tantivy index.
///
/// A query keyword matches any indexed term containing it, so `auth`
/// finds `authenticate`. Matching fragments are scored by keyword
/// coverage rather than BM25 so that scores stay in `[0, 1]`.
pub struct KeywordBackend {
    position: Field,
    content: Field,
    writer: Mutex<IndexWriter>,
    reader: IndexReader,
    analyzer: TextAnalyzer,
}

impl KeywordBackend {
    /// Create or open the index under `dir`.
    pub fn open(dir: &Path) -> Result<Self> {
        let index_path = dir.join(INDEX_DIR);

        let index = if index_path.join("meta.json").exists() {
            debug!("Opening keyword index at {:?}", index_path);
            Index::open_in_dir(&index_path)
                .with_context(|| format!("Failed to open keyword index at {:?}", index_path))?
        } else {
            std::fs::create_dir_all(&index_path)
                .with_context(|| format!("Failed to create keyword index directory {:?}", index_path))?;
            Index::create_in_dir(&index_path, keyword_schema())
                .with_context(|| format!("Failed to create keyword index at {:?}", index_path))?
        };

        let analyzer = code_analyzer()?;
        index.tokenizers().register(CODE_TOKENIZER, analyzer.clone());

        let schema = index.schema();
        let position = schema
            .get_field(FIELD_POSITION)
            .context("Keyword index has no position field")?;
        let content = schema
            .get_field(FIELD_CONTENT)
            .context("Keyword index has no content field")?;

        let writer = index
            .writer(WRITER_HEAP_BYTES)
            .context("Failed to create keyword index writer")?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .context("Failed to create keyword index reader")?;

        Ok(Self {
            position,
            content,
            writer: Mutex::new(writer),
            reader,
            analyzer,
        })
    }

    fn writer(&self) -> MutexGuard<'_, IndexWriter> {
        self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn held(&self) -> usize {
        self.reader.searcher().num_docs() as usize
    }

    /// Commit pending operations and make them visible, or discard them.
    fn commit(&self, writer: &mut IndexWriter) -> Result<()> {
        if let Err(e) = writer.commit() {
            writer
                .rollback()
                .context("Failed to roll back keyword index after a failed commit")?;
            return Err(e).context("Failed to commit keyword index");
        }
        self.reader.reload().context("Failed to reload keyword index reader")
    }
}

#[async_trait]
impl RetrievalBackend for KeywordBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Keyword
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.held())
    }

    async fn append(&self, base: usize, entries: &[IndexEntry]) -> Result<()> {
        let mut writer = self.writer();
        let held = self.held();
        if held != base {
            bail!("Keyword index holds {} fragments, expected {}", held, base);
        }

        for (offset, entry) in entries.iter().enumerate() {
            let added = writer.add_document(doc!(
                self.position => (base + offset) as u64,
                self.content => entry.content.as_str(),
            ));
            if let Err(e) = added {
                writer.rollback().context("Failed to roll back keyword index")?;
                return Err(e).context("Failed to add fragment to keyword index");
            }
        }

        self.commit(&mut writer)?;
        debug!("Added {} fragments to keyword index", entries.len());
        Ok(())
    }

    async fn truncate(&self, len: usize) -> Result<()> {
        let mut writer = self.writer();
        let held = self.held();
        if held <= len {
            return Ok(());
        }

        for position in len..held {
            writer.delete_term(Term::from_field_u64(self.position, position as u64));
        }
        self.commit(&mut writer)
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<(usize, f32)>> {
        let mut analyzer = self.analyzer.clone();
        let query_words = keywords(&mut analyzer, query);
        if query_words.is_empty() {
            return Ok(Vec::new());
        }

        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::with_capacity(query_words.len());
        for word in &query_words {
            // analyzer output is [a-z0-9_] only, nothing to escape
            let pattern = format!(".*{}.*", word);
            let term_query = RegexQuery::from_pattern(&pattern, self.content)
                .with_context(|| format!("Invalid keyword pattern {}", pattern))?;
            clauses.push((Occur::Should, Box::new(term_query)));
        }

        let searcher = self.reader.searcher();
        let matched = searcher
            .search(&BooleanQuery::new(clauses), &DocSetCollector)
            .context("Failed to execute keyword search")?;

        let mut scored = Vec::with_capacity(matched.len());
        for address in matched {
            let fragment: TantivyDocument = searcher
                .doc(address)
                .context("Failed to retrieve keyword document")?;
            let Some(position) = fragment.get_first(self.position).and_then(|v| v.as_u64()) else {
                continue;
            };
            let content = fragment
                .get_first(self.content)
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            let fragment_words = keywords(&mut analyzer, content);
            scored.push((position as usize, coverage(&query_words, &fragment_words)));
        }

        Ok(rank(scored, k))
    }

    async fn clear(&self) -> Result<()> {
        let mut writer = self.writer();
        writer
            .delete_all_documents()
            .context("Failed to clear keyword index")?;
        self.commit(&mut writer)?;
        info!("Keyword index cleared");
        Ok(())
    }
}

/// Last resort; needs nothing beyond the filesystem
pub struct KeywordCandidate;

#[async_trait]
impl BackendCandidate for KeywordCandidate {
    fn kind(&self) -> BackendKind {
        BackendKind::Keyword
    }

    async fn probe(
        &self,
        _config: &RetrievalConfig,
        dir: &Path,
    ) -> Result<Arc<dyn RetrievalBackend>> {
        let dir = dir.to_path_buf();
        let backend = tokio::task::spawn_blocking(move || KeywordBackend::open(&dir))
            .await
            .context("Keyword index task failed")??;
        info!("Keyword index ready");
        Ok(Arc::new(backend))
    }
}
