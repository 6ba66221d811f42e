//! Lazy chunked search over indexed words
//!
//! Search walks the item's pages in ascending order, 50 pages at a time,
//! and yields one event per chunk that contains matches. Consumers that
//! stop polling after the first hit never pay for the rest of the
//! document. The final event is always `Close`.

use futures::stream::{self, Stream};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use sqlx::SqlitePool;

use crate::db::PageBoxRepository;
use crate::error::Result;
use crate::pdf::PageBox;

/// Pages scanned per chunk.
pub const SEARCH_CHUNK_PAGES: i64 = 50;

/// Words of context on each side of a match in its snippet.
const SNIPPET_CONTEXT: i64 = 5;

/// One non-empty batch of results.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchChunk {
    /// Boxes to draw match highlights from
    pub boxes: Vec<PageBox>,
    /// Human-readable context per match
    pub snippets: Vec<Snippet>,
}

/// Context text around one matched word.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snippet {
    pub page: i64,
    pub position: i64,
    pub text: String,
}

/// Stream item: result chunks, then a terminal close marker.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchEvent {
    Chunk(SearchChunk),
    Close,
}

// Chunks serialize as the chunk object, the terminator as the bare
// string "CLOSE" so stream consumers can tell them apart cheaply.
impl Serialize for SearchEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            SearchEvent::Chunk(chunk) => {
                let mut s = serializer.serialize_struct("SearchChunk", 2)?;
                s.serialize_field("boxes", &chunk.boxes)?;
                s.serialize_field("snippets", &chunk.snippets)?;
                s.end()
            }
            SearchEvent::Close => serializer.serialize_str("CLOSE"),
        }
    }
}

enum StreamState {
    Page(i64),
    Done,
}

/// Build the lazy search stream. Chunks without matches are skipped; the
/// stream always ends with exactly one `Close` (or an error).
pub fn search_stream(
    pool: SqlitePool,
    item_id: String,
    term: String,
    page_count: i64,
    from_page: i64,
) -> impl Stream<Item = Result<SearchEvent>> {
    stream::unfold(StreamState::Page(from_page), move |state| {
        let pool = pool.clone();
        let item_id = item_id.clone();
        let term = term.clone();
        async move {
            match state {
                StreamState::Done => None,
                StreamState::Page(mut next) => {
                    while next <= page_count {
                        let last = (next + SEARCH_CHUNK_PAGES - 1).min(page_count);
                        match scan_chunk(&pool, &item_id, &term, next, last).await {
                            Ok(Some(chunk)) => {
                                return Some((
                                    Ok(SearchEvent::Chunk(chunk)),
                                    StreamState::Page(last + 1),
                                ));
                            }
                            Ok(None) => next = last + 1,
                            Err(e) => return Some((Err(e), StreamState::Done)),
                        }
                    }
                    Some((Ok(SearchEvent::Close), StreamState::Done))
                }
            }
        }
    })
}

/// Scan one page window; `None` when it holds no matches.
async fn scan_chunk(
    pool: &SqlitePool,
    item_id: &str,
    term: &str,
    first_page: i64,
    last_page: i64,
) -> Result<Option<SearchChunk>> {
    let repo = PageBoxRepository::new(pool);
    let matches = repo.matching(item_id, first_page, last_page, term).await?;
    if matches.is_empty() {
        return Ok(None);
    }

    let mut snippets = Vec::with_capacity(matches.len());
    let mut page_words: Option<(i64, Vec<PageBox>)> = None;
    for m in &matches {
        // Matches arrive page-ordered, so one page fetch serves a run
        if page_words.as_ref().map(|(p, _)| *p) != Some(m.page) {
            page_words = Some((m.page, repo.for_page(item_id, m.page).await?));
        }
        let words = page_words
            .as_ref()
            .map(|(_, w)| w.as_slice())
            .unwrap_or(&[]);
        snippets.push(Snippet {
            page: m.page,
            position: m.position,
            text: snippet_text(words, m.position),
        });
    }

    Ok(Some(SearchChunk {
        boxes: matches,
        snippets,
    }))
}

/// Join the words around a match position into display text.
pub(crate) fn snippet_text(page_words: &[PageBox], position: i64) -> String {
    let first = (position - SNIPPET_CONTEXT).max(1);
    let last = position + SNIPPET_CONTEXT;
    let mut parts: Vec<&str> = Vec::new();
    for w in page_words {
        if w.position >= first && w.position <= last {
            parts.push(&w.word);
        }
    }
    parts.join(" ")
}
