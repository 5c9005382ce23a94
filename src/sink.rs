//! Append-only CSV output. One row per article, flushed as soon as it is written.

use crate::model::ArticleRecord;
use crate::scraper::ScraperError;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Column order of the output file.
pub const CSV_HEADER: [&str; 7] = [
    "title",
    "link",
    "content",
    "related",
    "author",
    "published",
    "updated",
];

/// CSV writer that writes the header only when it creates the destination.
pub struct CsvSink {
    path: PathBuf,
    writer: csv::Writer<File>,
    written: usize,
}

impl CsvSink {
    /// Open `path` for appending. A missing or zero-length file gets the header first.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ScraperError> {
        let path = path.into();
        let fresh = std::fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| ScraperError::Persistence {
                path: path.clone(),
                source: e.into(),
            })?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if fresh {
            writer
                .write_record(CSV_HEADER)
                .and_then(|_| writer.flush().map_err(csv::Error::from))
                .map_err(|e| ScraperError::Persistence {
                    path: path.clone(),
                    source: e,
                })?;
            info!(path = %path.display(), "created output file");
        }
        Ok(Self {
            path,
            writer,
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows appended through this sink (header excluded).
    pub fn written(&self) -> usize {
        self.written
    }

    /// Append one record and flush it to disk. Fields are written as given; normalize first.
    pub fn append(&mut self, record: &ArticleRecord) -> Result<(), ScraperError> {
        let related = record.related_flat();
        let row = [
            record.title.as_str(),
            record.link.as_str(),
            record.content.as_str(),
            related.as_str(),
            record.author.as_deref().unwrap_or(""),
            record.published.as_deref().unwrap_or(""),
            record.updated.as_deref().unwrap_or(""),
        ];
        self.writer
            .write_record(row)
            .and_then(|_| self.writer.flush().map_err(csv::Error::from))
            .map_err(|e| ScraperError::Persistence {
                path: self.path.clone(),
                source: e,
            })?;
        self.written += 1;
        debug!(path = %self.path.display(), link = %record.link, "appended row");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RelatedInstrument;
    use std::error::Error;

    fn record(n: usize) -> ArticleRecord {
        ArticleRecord {
            title: format!("Title {}, with comma", n),
            link: format!("https://www.investing.com/news/forex-news/a-{}", n),
            content: "Line one.\nLine \"two\".".to_string(),
            related: vec![RelatedInstrument {
                ticker: "EUR/USD".to_string(),
                url: "https://www.investing.com/currencies/eur-usd".to_string(),
            }],
            author: Some("Reuters".to_string()),
            published: None,
            updated: None,
        }
    }

    fn read_rows(path: &Path) -> Result<Vec<csv::StringRecord>, Box<dyn Error>> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(path)?;
        let mut rows = Vec::new();
        for r in rdr.records() {
            rows.push(r?);
        }
        Ok(rows)
    }

    #[test]
    fn fresh_destination_has_header_plus_one_row_per_record() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("articles.csv");
        let mut sink = CsvSink::open(&path)?;
        for n in 0..4 {
            sink.append(&record(n))?;
        }
        assert_eq!(sink.written(), 4);
        let rows = read_rows(&path)?;
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0].iter().collect::<Vec<_>>(), CSV_HEADER.to_vec());
        Ok(())
    }

    #[test]
    fn header_written_once_across_runs() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("articles.csv");
        for run in 0..3 {
            let mut sink = CsvSink::open(&path)?;
            sink.append(&record(run))?;
        }
        let rows = read_rows(&path)?;
        assert_eq!(rows.len(), 4);
        let headers = rows.iter().filter(|r| r.get(0) == Some("title")).count();
        assert_eq!(headers, 1);
        Ok(())
    }

    #[test]
    fn opening_without_appending_only_writes_header() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("articles.csv");
        drop(CsvSink::open(&path)?);
        drop(CsvSink::open(&path)?);
        assert_eq!(read_rows(&path)?.len(), 1);
        Ok(())
    }

    #[test]
    fn embedded_newlines_commas_and_quotes_round_trip() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("articles.csv");
        let mut sink = CsvSink::open(&path)?;
        let rec = record(7);
        sink.append(&rec)?;
        let rows = read_rows(&path)?;
        let row = &rows[1];
        assert_eq!(row.get(0), Some("Title 7, with comma"));
        assert_eq!(row.get(2), Some("Line one.\nLine \"two\"."));
        assert_eq!(
            row.get(3),
            Some("EUR/USD (https://www.investing.com/currencies/eur-usd)")
        );
        assert_eq!(row.get(4), Some("Reuters"));
        assert_eq!(row.get(5), Some(""));
        Ok(())
    }

    #[test]
    fn existing_rows_are_never_rewritten() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("articles.csv");
        {
            let mut sink = CsvSink::open(&path)?;
            sink.append(&record(1))?;
        }
        let before = std::fs::read_to_string(&path)?;
        {
            let mut sink = CsvSink::open(&path)?;
            sink.append(&record(2))?;
        }
        let after = std::fs::read_to_string(&path)?;
        assert!(after.starts_with(&before));
        Ok(())
    }

    #[test]
    fn unwritable_destination_is_persistence_error() {
        let path = PathBuf::from("/nonexistent_dir_fxscrape_xyz/articles.csv");
        match CsvSink::open(&path) {
            Err(ScraperError::Persistence { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected Persistence error, got {:?}", other.map(|_| ())),
        }
    }
}
