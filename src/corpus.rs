//! Training corpus output
//!
//! Writes extracted articles into the model-training output formats: a JSONL
//! file with one document per line, a plain-text file with separator lines,
//! and a summary statistics file written when the corpus is finished.

use crate::error::{Error, Result};
use crate::extract::{ArticleText, Extractor};
use serde::{Deserialize, Serialize};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const TXT_SEPARATOR_WIDTH: usize = 40;

/// One training document as serialized to the JSONL output
#[derive(Debug, Serialize)]
struct TrainingDoc<'a> {
    pmcid: &'a str,
    title: &'a str,
    #[serde(rename = "abstract")]
    abstract_text: &'a str,
    keywords: &'a [String],
    journal: &'a str,
    text: &'a str,
}

/// Summary statistics for a finished corpus
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorpusStats {
    /// Articles written to the corpus
    pub total_articles: usize,
    /// Articles rejected during extraction (too short, malformed, unreadable)
    pub skipped_articles: usize,
    /// Total characters of training text
    pub total_characters: usize,
    /// Mean characters per written article
    pub avg_characters: usize,
    /// Rough token estimate (characters / 4)
    pub estimated_tokens: usize,
}

/// Incremental corpus writer
///
/// Streams each article to the enabled output files as it arrives, so memory
/// use stays flat no matter how large the corpus grows. Call
/// [`finish`](Self::finish) to flush the outputs and write the statistics
/// file.
///
/// # Examples
///
/// ```no_run
/// use pmc_corpus::CorpusWriter;
///
/// # fn example(articles: Vec<pmc_corpus::ArticleText>) -> pmc_corpus::Result<()> {
/// let mut writer = CorpusWriter::create("data/processed".as_ref(), true, true)?;
/// for article in &articles {
///     writer.write(article)?;
/// }
/// let stats = writer.finish()?;
/// println!("~{} tokens", stats.estimated_tokens);
/// # Ok(())
/// # }
/// ```
pub struct CorpusWriter {
    dir: PathBuf,
    jsonl: Option<BufWriter<std::fs::File>>,
    txt: Option<BufWriter<std::fs::File>>,
    stats: CorpusStats,
}

impl CorpusWriter {
    /// Create the output directory and open the enabled output files.
    ///
    /// Existing output files are truncated; a corpus is rebuilt whole, not
    /// appended to.
    ///
    /// # Errors
    ///
    /// Returns an error when the directory or the output files cannot be
    /// created.
    pub fn create(dir: &Path, jsonl: bool, txt: bool) -> Result<Self> {
        std::fs::create_dir_all(dir)?;

        let jsonl = if jsonl {
            let file = std::fs::File::create(dir.join("training_corpus.jsonl"))?;
            Some(BufWriter::new(file))
        } else {
            None
        };
        let txt = if txt {
            let file = std::fs::File::create(dir.join("training_corpus.txt"))?;
            Some(BufWriter::new(file))
        } else {
            None
        };

        Ok(Self {
            dir: dir.to_path_buf(),
            jsonl,
            txt,
            stats: CorpusStats::default(),
        })
    }

    /// Append one extracted article to the enabled outputs
    ///
    /// # Errors
    ///
    /// Returns an error when serialization or a file write fails.
    pub fn write(&mut self, article: &ArticleText) -> Result<()> {
        if let Some(out) = &mut self.jsonl {
            let doc = TrainingDoc {
                pmcid: &article.pmcid,
                title: &article.title,
                abstract_text: &article.abstract_text,
                keywords: &article.keywords,
                journal: &article.journal,
                text: &article.full_text,
            };
            serde_json::to_writer(&mut *out, &doc)?;
            out.write_all(b"\n")?;
        }

        if let Some(out) = &mut self.txt {
            out.write_all(article.full_text.as_bytes())?;
            write!(out, "\n\n{}\n\n", "=".repeat(TXT_SEPARATOR_WIDTH))?;
        }

        self.stats.total_articles += 1;
        self.stats.total_characters += article.text_length;
        Ok(())
    }

    /// Record an article that was rejected during extraction
    pub fn record_skip(&mut self) {
        self.stats.skipped_articles += 1;
    }

    /// Flush the outputs, write `corpus_stats.json`, and return the statistics
    ///
    /// # Errors
    ///
    /// Returns an error when flushing an output or writing the statistics
    /// file fails.
    pub fn finish(mut self) -> Result<CorpusStats> {
        if let Some(mut out) = self.jsonl.take() {
            out.flush()?;
        }
        if let Some(mut out) = self.txt.take() {
            out.flush()?;
        }

        self.stats.avg_characters = if self.stats.total_articles > 0 {
            self.stats.total_characters / self.stats.total_articles
        } else {
            0
        };
        self.stats.estimated_tokens = self.stats.total_characters / 4;

        let stats_json = serde_json::to_vec_pretty(&self.stats)?;
        std::fs::write(self.dir.join("corpus_stats.json"), stats_json)?;

        tracing::info!(
            articles = self.stats.total_articles,
            skipped = self.stats.skipped_articles,
            estimated_tokens = self.stats.estimated_tokens,
            "Corpus build complete"
        );
        Ok(self.stats)
    }
}

/// Build a corpus from every fetched artifact in `xml_dir`.
///
/// Walks the artifact directory, extracts each `PMC*.xml` file, and writes
/// the survivors to `out_dir`. Extraction failures are logged and counted as
/// skips rather than aborting the build; an unreadable directory is an error.
///
/// # Errors
///
/// Returns an error when the artifact directory cannot be read or an output
/// write fails.
pub fn build_corpus(
    extractor: &Extractor,
    xml_dir: &Path,
    out_dir: &Path,
) -> Result<CorpusStats> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(xml_dir)
        .map_err(Error::Io)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension().is_some_and(|ext| ext == "xml")
                && path
                    .file_stem()
                    .is_some_and(|stem| stem.to_string_lossy().starts_with("PMC"))
        })
        .collect();
    paths.sort();

    tracing::info!(
        count = paths.len(),
        dir = %xml_dir.display(),
        "Building corpus from fetched artifacts"
    );

    let mut writer = CorpusWriter::create(out_dir, true, true)?;
    for path in &paths {
        match extractor.extract_file(path) {
            Ok(article) => writer.write(&article)?,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Skipping artifact");
                writer.record_skip();
            }
        }
    }
    writer.finish()
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::Section;
    use tempfile::tempdir;

    fn article(pmcid: &str, text: &str) -> ArticleText {
        ArticleText {
            pmcid: pmcid.to_string(),
            title: format!("Title for {pmcid}"),
            abstract_text: "An abstract.".to_string(),
            keywords: vec!["food".to_string()],
            journal: "J Food Sci".to_string(),
            sections: vec![Section {
                title: "Introduction".to_string(),
                text: text.to_string(),
            }],
            figure_captions: Vec::new(),
            table_captions: Vec::new(),
            full_text: text.to_string(),
            text_length: text.chars().count(),
        }
    }

    #[test]
    fn jsonl_has_one_document_per_line() {
        let dir = tempdir().unwrap();
        let mut writer = CorpusWriter::create(dir.path(), true, false).unwrap();
        writer.write(&article("PMC1", "First body.")).unwrap();
        writer.write(&article("PMC2", "Second body.")).unwrap();
        writer.finish().unwrap();

        let jsonl = std::fs::read_to_string(dir.path().join("training_corpus.jsonl")).unwrap();
        let lines: Vec<&str> = jsonl.lines().collect();
        assert_eq!(lines.len(), 2);

        let doc: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(doc["pmcid"], "PMC1");
        assert_eq!(doc["abstract"], "An abstract.");
        assert_eq!(doc["text"], "First body.");

        // txt output was disabled
        assert!(!dir.path().join("training_corpus.txt").exists());
    }

    #[test]
    fn txt_documents_are_separated() {
        let dir = tempdir().unwrap();
        let mut writer = CorpusWriter::create(dir.path(), false, true).unwrap();
        writer.write(&article("PMC1", "Alpha.")).unwrap();
        writer.write(&article("PMC2", "Beta.")).unwrap();
        writer.finish().unwrap();

        let txt = std::fs::read_to_string(dir.path().join("training_corpus.txt")).unwrap();
        let separator = "=".repeat(40);
        assert_eq!(txt.matches(&separator).count(), 2);
        assert!(txt.contains("Alpha."));
        assert!(txt.contains("Beta."));
    }

    #[test]
    fn stats_cover_written_and_skipped() {
        let dir = tempdir().unwrap();
        let mut writer = CorpusWriter::create(dir.path(), true, true).unwrap();
        writer.write(&article("PMC1", "abcd")).unwrap();
        writer.write(&article("PMC2", "efghijkl")).unwrap();
        writer.record_skip();
        let stats = writer.finish().unwrap();

        assert_eq!(stats.total_articles, 2);
        assert_eq!(stats.skipped_articles, 1);
        assert_eq!(stats.total_characters, 12);
        assert_eq!(stats.avg_characters, 6);
        assert_eq!(stats.estimated_tokens, 3);

        let on_disk: CorpusStats = serde_json::from_slice(
            &std::fs::read(dir.path().join("corpus_stats.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(on_disk, stats);
    }

    #[test]
    fn empty_corpus_has_zero_average() {
        let dir = tempdir().unwrap();
        let writer = CorpusWriter::create(dir.path(), true, true).unwrap();
        let stats = writer.finish().unwrap();
        assert_eq!(stats.total_articles, 0);
        assert_eq!(stats.avg_characters, 0);
    }

    #[test]
    fn build_corpus_skips_rejects_and_non_artifacts() {
        let dir = tempdir().unwrap();
        let xml_dir = dir.path().join("xml");
        let out_dir = dir.path().join("processed");
        std::fs::create_dir_all(&xml_dir).unwrap();

        let body = "Fermented dairy products contribute beneficial microbes to the diet and \
            have been studied extensively for their role in gut health outcomes across many \
            populations and age groups over several decades of dedicated nutrition research. "
            .repeat(3);
        let good = format!(
            r#"<article><front><article-meta>
            <article-id pub-id-type="pmc">11</article-id>
            <title-group><article-title>Good</article-title></title-group>
            </article-meta></front>
            <body><sec><title>Intro</title><p>{body}</p></sec></body></article>"#
        );
        std::fs::write(xml_dir.join("PMC11.xml"), good).unwrap();
        // Too short to keep
        std::fs::write(
            xml_dir.join("PMC12.xml"),
            "<article><front><article-meta><title-group><article-title>T</article-title>\
             </title-group></article-meta></front><body><p>tiny</p></body></article>",
        )
        .unwrap();
        // Not an artifact, must be ignored entirely
        std::fs::write(xml_dir.join("notes.txt"), "not xml").unwrap();

        let extractor = Extractor::new(crate::config::ExtractConfig::default());
        let stats = build_corpus(&extractor, &xml_dir, &out_dir).unwrap();

        assert_eq!(stats.total_articles, 1);
        assert_eq!(stats.skipped_articles, 1);

        let jsonl = std::fs::read_to_string(out_dir.join("training_corpus.jsonl")).unwrap();
        assert_eq!(jsonl.lines().count(), 1);
        assert!(jsonl.contains("PMC11"));
    }
}
