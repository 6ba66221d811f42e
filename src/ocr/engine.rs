//! Recognition engine abstraction and the Tesseract implementation

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::binaries::{Binaries, Tool};
use crate::error::Result;
use crate::pdf::types::normalize;

/// One recognized word with its normalized bounding box
/// (tenths of a percent of the page dimensions).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrWord {
    pub word: String,
    pub top: i64,
    pub left: i64,
    pub width: i64,
    pub height: i64,
}

/// Recognition result for a single page image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OcrPage {
    pub text: String,
    pub words: Vec<OcrWord>,
}

/// A recognition backend for single page images.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Check if the engine is usable on this host
    async fn is_available(&self) -> bool;

    /// Recognize one page image
    async fn recognize(&self, image: &Path, language: &str) -> Result<OcrPage>;
}

/// Tesseract CLI engine. Parses TSV output so one invocation yields both
/// the text and word-level geometry.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    binaries: Binaries,
}

impl TesseractEngine {
    pub fn new(binaries: Binaries) -> Self {
        Self { binaries }
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    async fn is_available(&self) -> bool {
        self.binaries.is_installed(Tool::Tesseract).await
    }

    async fn recognize(&self, image: &Path, language: &str) -> Result<OcrPage> {
        let tsv = self
            .binaries
            .run(
                Tool::Tesseract,
                [
                    image.as_os_str(),
                    "stdout".as_ref(),
                    "-l".as_ref(),
                    language.as_ref(),
                    "tsv".as_ref(),
                ],
            )
            .await?;
        Ok(parse_tsv(&tsv))
    }
}

/// Parse Tesseract TSV output. Level 1 rows carry the page dimensions,
/// level 5 rows the words; line boundaries come from the
/// (block, paragraph, line) triple.
pub(crate) fn parse_tsv(tsv: &str) -> OcrPage {
    let mut page_width = 0.0f64;
    let mut page_height = 0.0f64;
    let mut words = Vec::new();
    let mut text = String::new();
    let mut current_line: Option<(i64, i64, i64)> = None;

    for line in tsv.lines().skip(1) {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }
        let level: i64 = fields[0].parse().unwrap_or(0);
        let parse = |i: usize| fields[i].parse::<f64>().unwrap_or(0.0);

        match level {
            1 => {
                page_width = parse(8);
                page_height = parse(9);
            }
            5 => {
                let word = fields[11].trim();
                if word.is_empty() {
                    continue;
                }
                let line_key = (
                    fields[2].parse().unwrap_or(0),
                    fields[3].parse().unwrap_or(0),
                    fields[4].parse().unwrap_or(0),
                );
                match current_line {
                    Some(key) if key == line_key => text.push(' '),
                    Some(_) => text.push('\n'),
                    None => {}
                }
                current_line = Some(line_key);
                text.push_str(word);

                words.push(OcrWord {
                    word: word.to_string(),
                    top: normalize(parse(7), page_height),
                    left: normalize(parse(6), page_width),
                    width: normalize(parse(8), page_width),
                    height: normalize(parse(9), page_height),
                });
            }
            _ => {}
        }
    }

    OcrPage { text, words }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    fn row(
        level: i64,
        block: i64,
        par: i64,
        line: i64,
        word_num: i64,
        left: i64,
        top: i64,
        width: i64,
        height: i64,
        text: &str,
    ) -> String {
        format!(
            "{}\t1\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t95\t{}",
            level, block, par, line, word_num, left, top, width, height, text
        )
    }

    #[test]
    fn test_parse_tsv_words_and_lines() {
        let tsv = [
            HEADER.to_string(),
            row(1, 0, 0, 0, 0, 0, 0, 1000, 2000, ""),
            row(5, 1, 1, 1, 1, 100, 200, 100, 40, "Hello"),
            row(5, 1, 1, 1, 2, 250, 200, 120, 40, "world"),
            row(5, 1, 1, 2, 1, 100, 260, 80, 40, "Next"),
        ]
        .join("\n");

        let page = parse_tsv(&tsv);
        assert_eq!(page.text, "Hello world\nNext");
        assert_eq!(page.words.len(), 3);

        let first = &page.words[0];
        assert_eq!(first.left, 100); // 100 / 1000 = 10.0%
        assert_eq!(first.top, 100); // 200 / 2000 = 10.0%
        assert_eq!(first.width, 100);
        assert_eq!(first.height, 20);
    }

    #[test]
    fn test_parse_tsv_skips_empty_words() {
        let tsv = [
            HEADER.to_string(),
            row(1, 0, 0, 0, 0, 0, 0, 100, 100, ""),
            row(5, 1, 1, 1, 1, 0, 0, 10, 10, "  "),
            row(5, 1, 1, 1, 2, 0, 0, 10, 10, "kept"),
        ]
        .join("\n");

        let page = parse_tsv(&tsv);
        assert_eq!(page.text, "kept");
        assert_eq!(page.words.len(), 1);
    }

    #[test]
    fn test_parse_tsv_empty_input() {
        let page = parse_tsv("");
        assert!(page.text.is_empty());
        assert!(page.words.is_empty());
    }

    #[test]
    fn test_parse_tsv_malformed_rows_ignored() {
        let tsv = format!("{}\nnot\ta\tvalid\trow", HEADER);
        let page = parse_tsv(&tsv);
        assert!(page.words.is_empty());
    }
}
