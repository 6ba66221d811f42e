//! PDF extraction via external poppler binaries
//!
//! State machine per uploaded PDF: `Uploaded -> TextExtracted | OcrPending
//! -> Indexed`. Text comes from `pdftotext`, page counts from `pdfinfo`
//! (with a one-shot Ghostscript rewrite as repair fallback), page rasters
//! from `pdftoppm`, word boxes from `pdftotext -bbox`, links and the
//! bookmark outline from `pdftohtml -xml`.
//!
//! A failed invocation for a single page/artifact degrades to an explicit
//! placeholder instead of failing the request: PDF processing failures must
//! not break browsing of the item's metadata.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::binaries::{Binaries, Tool};
use crate::cache::{FileCache, Namespace};
use crate::error::{AppError, Result};

use super::types::{normalize, Bookmark, PageBox, PageLink, Zoom};

/// DPI used for item thumbnails in the icons namespace.
const ICON_DPI: u32 = 40;

/// US-letter aspect placeholder dimensions, per inch of DPI.
const PLACEHOLDER_INCHES: (f64, f64) = (8.5, 11.0);

/// Metadata parsed from `pdfinfo` output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PdfInfo {
    pub pages: i64,
    pub title: Option<String>,
    pub author: Option<String>,
    pub encrypted: bool,
}

/// Orchestrates the external extraction binaries and the artifact cache.
#[derive(Debug, Clone)]
pub struct PdfExtractor {
    binaries: Binaries,
    cache: FileCache,
}

impl PdfExtractor {
    pub fn new(binaries: Binaries, cache: FileCache) -> Self {
        Self { binaries, cache }
    }

    pub fn cache(&self) -> &FileCache {
        &self.cache
    }

    /// Extract the full plain text. An `Ok` with whitespace-only content
    /// signals a missing text layer (OCR fallback candidate).
    pub async fn extract_text(&self, pdf: &Path) -> Result<String> {
        self.binaries
            .run(
                Tool::Pdftotext,
                [
                    "-enc".as_ref(),
                    "UTF-8".as_ref(),
                    pdf.as_os_str(),
                    "-".as_ref(),
                ],
            )
            .await
    }

    /// Whether extracted text is usable (not empty/whitespace-only).
    pub fn has_text(text: &str) -> bool {
        !text.trim().is_empty()
    }

    /// Page count and document metadata from `pdfinfo`. If the file is
    /// unreadable, one Ghostscript repair pass is attempted before giving
    /// up; page count is required input to all per-page operations.
    pub async fn info(&self, pdf: &Path) -> Result<PdfInfo> {
        match self.raw_info(pdf).await {
            Ok(info) => Ok(info),
            Err(AppError::Command(first)) => {
                tracing::warn!(pdf = %pdf.display(), error = %first, "pdfinfo failed, attempting repair");
                let repaired = self.repair(pdf).await?;
                self.raw_info(&repaired).await
            }
            Err(e) => Err(e),
        }
    }

    async fn raw_info(&self, pdf: &Path) -> Result<PdfInfo> {
        let output = self
            .binaries
            .run(Tool::Pdfinfo, [pdf.as_os_str()])
            .await?;
        let info = parse_pdfinfo(&output);
        if info.pages == 0 {
            return Err(AppError::Command(
                "pdfinfo reported no pages".to_string(),
            ));
        }
        Ok(info)
    }

    /// Rewrite a damaged PDF through Ghostscript. The repaired copy lands
    /// in the temp namespace under a content-hash key.
    pub async fn repair(&self, pdf: &Path) -> Result<PathBuf> {
        let bytes = std::fs::read(pdf)?;
        let key = FileCache::content_key(&bytes, "pdf");
        let out_path = self.cache.path(Namespace::Temp, &key)?;

        let mut out_arg = std::ffi::OsString::from("-sOutputFile=");
        out_arg.push(&out_path);
        self.binaries
            .run_status(
                Tool::Ghostscript,
                [
                    "-q".as_ref(),
                    "-dNOPAUSE".as_ref(),
                    "-dBATCH".as_ref(),
                    "-sDEVICE=pdfwrite".as_ref(),
                    out_arg.as_os_str(),
                    pdf.as_os_str(),
                ],
            )
            .await?;

        if !out_path.is_file() {
            return Err(AppError::Command(
                "ghostscript produced no output file".to_string(),
            ));
        }
        Ok(out_path)
    }

    /// Render one page at a zoom tier, through the pages namespace of the
    /// file cache. On renderer failure the returned path is a cached white
    /// placeholder so the viewer stays usable.
    pub async fn render_page(
        &self,
        item_id: &str,
        pdf: &Path,
        page: i64,
        zoom: Zoom,
    ) -> Result<PathBuf> {
        if page < 1 {
            return Err(AppError::Validation(format!("page {} out of range", page)));
        }

        let key = FileCache::page_key(item_id, page, zoom);
        if let Some(path) = self.cache.get(Namespace::Pages, &key)? {
            return Ok(path);
        }

        match self.rasterize(pdf, page, zoom.dpi()).await {
            Ok(bytes) => self.cache.put(Namespace::Pages, &key, &bytes),
            Err(e) => {
                tracing::warn!(
                    item_id,
                    page,
                    zoom = zoom.dpi(),
                    error = %e,
                    "page render failed, serving placeholder"
                );
                self.placeholder(zoom.dpi())
            }
        }
    }

    /// Render the item thumbnail into the icons namespace.
    pub async fn thumbnail(&self, item_id: &str, pdf: &Path) -> Result<PathBuf> {
        let key = FileCache::icon_key(item_id);
        if let Some(path) = self.cache.get(Namespace::Icons, &key)? {
            return Ok(path);
        }
        match self.rasterize(pdf, 1, ICON_DPI).await {
            Ok(bytes) => self.cache.put(Namespace::Icons, &key, &bytes),
            Err(e) => {
                tracing::warn!(item_id, error = %e, "thumbnail render failed, serving placeholder");
                self.placeholder(ICON_DPI)
            }
        }
    }

    async fn rasterize(&self, pdf: &Path, page: i64, dpi: u32) -> Result<Vec<u8>> {
        let dir = tempfile::tempdir()?;
        let prefix = dir.path().join("page");
        let page_arg = page.to_string();
        let dpi_arg = dpi.to_string();

        self.binaries
            .run_status(
                Tool::Pdftoppm,
                [
                    "-png".as_ref(),
                    "-r".as_ref(),
                    dpi_arg.as_ref(),
                    "-f".as_ref(),
                    page_arg.as_ref(),
                    "-l".as_ref(),
                    page_arg.as_ref(),
                    "-singlefile".as_ref(),
                    pdf.as_os_str(),
                    prefix.as_os_str(),
                ],
            )
            .await?;

        let rendered = prefix.with_extension("png");
        if !rendered.is_file() {
            return Err(AppError::Command(
                "pdftoppm produced no output file".to_string(),
            ));
        }
        Ok(std::fs::read(rendered)?)
    }

    /// White US-letter placeholder for a failed render, cached per DPI in
    /// the temp namespace so repeated failures do not re-encode it. Not
    /// cached under the page key: the real render can still succeed later.
    fn placeholder(&self, dpi: u32) -> Result<PathBuf> {
        let key = format!("blank-{}.png", dpi);
        if let Some(path) = self.cache.get(Namespace::Temp, &key)? {
            return Ok(path);
        }
        let width = (PLACEHOLDER_INCHES.0 * dpi as f64) as u32;
        let height = (PLACEHOLDER_INCHES.1 * dpi as f64) as u32;
        let blank = image::RgbImage::from_pixel(width, height, image::Rgb([255, 255, 255]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(blank)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)?;
        self.cache.put(Namespace::Temp, &key, &bytes)
    }

    /// Per-word bounding boxes from the native text layer.
    pub async fn word_boxes(&self, item_id: &str, pdf: &Path) -> Result<Vec<PageBox>> {
        let xml = self
            .binaries
            .run(
                Tool::Pdftotext,
                ["-bbox".as_ref(), pdf.as_os_str(), "-".as_ref()],
            )
            .await?;
        parse_word_boxes(&xml, item_id)
    }

    /// Hyperlink regions, normalized to tenths-of-percent geometry.
    pub async fn links(&self, item_id: &str, pdf: &Path) -> Result<Vec<PageLink>> {
        let xml = self.page_xml(pdf).await?;
        parse_links(&xml, item_id)
    }

    /// Bookmark/outline structure.
    pub async fn bookmarks(&self, pdf: &Path) -> Result<Vec<Bookmark>> {
        let xml = self.page_xml(pdf).await?;
        parse_outline(&xml)
    }

    async fn page_xml(&self, pdf: &Path) -> Result<String> {
        self.binaries
            .run(
                Tool::Pdftohtml,
                [
                    "-xml".as_ref(),
                    "-i".as_ref(),
                    "-q".as_ref(),
                    "-stdout".as_ref(),
                    pdf.as_os_str(),
                ],
            )
            .await
    }
}

/// Parse `pdfinfo` key/value output.
pub(crate) fn parse_pdfinfo(output: &str) -> PdfInfo {
    let mut info = PdfInfo::default();
    for line in output.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "Pages" => info.pages = value.parse().unwrap_or(0),
            "Title" if !value.is_empty() => info.title = Some(value.to_string()),
            "Author" if !value.is_empty() => info.author = Some(value.to_string()),
            "Encrypted" => info.encrypted = value.starts_with("yes"),
            _ => {}
        }
    }
    info
}

fn attr(element: &BytesStart, name: &str) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|a| a.key.as_ref() == name.as_bytes())
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn attr_f64(element: &BytesStart, name: &str) -> Option<f64> {
    attr(element, name).and_then(|v| v.parse().ok())
}

/// Parse the XHTML emitted by `pdftotext -bbox`: `<page width= height=>`
/// containing `<word xMin= yMin= xMax= yMax=>text</word>` elements.
pub(crate) fn parse_word_boxes(xml: &str, item_id: &str) -> Result<Vec<PageBox>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut boxes = Vec::new();
    let mut page = 0i64;
    let mut position = 0i64;
    let mut page_width = 0.0f64;
    let mut page_height = 0.0f64;
    let mut pending: Option<(f64, f64, f64, f64)> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"page" => {
                    page += 1;
                    position = 0;
                    page_width = attr_f64(&e, "width").unwrap_or(0.0);
                    page_height = attr_f64(&e, "height").unwrap_or(0.0);
                }
                b"word" => {
                    let x_min = attr_f64(&e, "xMin").unwrap_or(0.0);
                    let y_min = attr_f64(&e, "yMin").unwrap_or(0.0);
                    let x_max = attr_f64(&e, "xMax").unwrap_or(x_min);
                    let y_max = attr_f64(&e, "yMax").unwrap_or(y_min);
                    pending = Some((x_min, y_min, x_max, y_max));
                }
                _ => {}
            },
            Event::Text(t) => {
                if let Some((x_min, y_min, x_max, y_max)) = pending.take() {
                    let word = t.unescape()?.into_owned();
                    if word.is_empty() {
                        continue;
                    }
                    position += 1;
                    boxes.push(PageBox {
                        item_id: item_id.to_string(),
                        page,
                        position,
                        top: normalize(y_min, page_height),
                        left: normalize(x_min, page_width),
                        width: normalize(x_max - x_min, page_width),
                        height: normalize(y_max - y_min, page_height),
                        word,
                    });
                }
            }
            Event::End(e) if e.name().as_ref() == b"word" => {
                pending = None;
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(boxes)
}

/// Parse hyperlink regions out of `pdftohtml -xml` output: `<text top=
/// left= width= height=><a href="...">...</a></text>` inside `<page
/// number= width= height=>`.
pub(crate) fn parse_links(xml: &str, item_id: &str) -> Result<Vec<PageLink>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut links = Vec::new();
    let mut page = 0i64;
    let mut page_width = 0.0f64;
    let mut page_height = 0.0f64;
    let mut region: Option<(f64, f64, f64, f64)> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"page" => {
                    page = attr_f64(&e, "number").unwrap_or((page + 1) as f64) as i64;
                    page_width = attr_f64(&e, "width").unwrap_or(0.0);
                    page_height = attr_f64(&e, "height").unwrap_or(0.0);
                }
                b"text" => {
                    region = Some((
                        attr_f64(&e, "top").unwrap_or(0.0),
                        attr_f64(&e, "left").unwrap_or(0.0),
                        attr_f64(&e, "width").unwrap_or(0.0),
                        attr_f64(&e, "height").unwrap_or(0.0),
                    ));
                }
                b"a" => {
                    if let (Some(href), Some((top, left, width, height))) =
                        (attr(&e, "href"), region)
                    {
                        links.push(PageLink {
                            item_id: item_id.to_string(),
                            page,
                            link: href,
                            top: normalize(top, page_height),
                            left: normalize(left, page_width),
                            width: normalize(width, page_width),
                            height: normalize(height, page_height),
                        });
                    }
                }
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"text" => {
                region = None;
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(links)
}

/// Parse the nested bookmark outline out of `pdftohtml -xml` output.
/// A nested `<outline>` element holds the children of the preceding
/// `<item>`.
pub(crate) fn parse_outline(xml: &str) -> Result<Vec<Bookmark>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    // Stack of sibling lists; the bottom entry is the root level.
    let mut stack: Vec<Vec<Bookmark>> = Vec::new();
    let mut in_outline = 0usize;
    let mut pending_page: Option<i64> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"outline" => {
                    in_outline += 1;
                    stack.push(Vec::new());
                }
                b"item" if in_outline > 0 => {
                    pending_page = attr_f64(&e, "page").map(|p| p as i64);
                }
                _ => {}
            },
            Event::Text(t) => {
                if let Some(page) = pending_page.take() {
                    if let Some(level) = stack.last_mut() {
                        level.push(Bookmark {
                            title: t.unescape()?.into_owned(),
                            page,
                            children: Vec::new(),
                        });
                    }
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"outline" => {
                    in_outline = in_outline.saturating_sub(1);
                    if stack.len() > 1 {
                        let children = stack.pop().unwrap_or_default();
                        if let Some(parent) = stack.last_mut().and_then(|l| l.last_mut()) {
                            parent.children = children;
                        }
                    }
                }
                b"item" => pending_page = None,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(stack.pop().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pdfinfo() {
        let output = "Title:          A Study of Things\n\
                      Author:         Jane Doe\n\
                      Pages:          12\n\
                      Encrypted:      no\n\
                      Page size:      612 x 792 pts (letter)\n";
        let info = parse_pdfinfo(output);
        assert_eq!(info.pages, 12);
        assert_eq!(info.title.as_deref(), Some("A Study of Things"));
        assert_eq!(info.author.as_deref(), Some("Jane Doe"));
        assert!(!info.encrypted);
    }

    #[test]
    fn test_parse_pdfinfo_missing_pages() {
        let info = parse_pdfinfo("Title: x\n");
        assert_eq!(info.pages, 0);
    }

    #[test]
    fn test_parse_word_boxes() {
        let xml = r#"<html><body><doc>
            <page width="612.0" height="792.0">
              <word xMin="61.2" yMin="79.2" xMax="122.4" yMax="95.04">Hello</word>
              <word xMin="130.0" yMin="79.2" xMax="180.0" yMax="95.04">world</word>
            </page>
            <page width="612.0" height="792.0">
              <word xMin="0.0" yMin="0.0" xMax="612.0" yMax="792.0">Big</word>
            </page>
        </doc></body></html>"#;

        let boxes = parse_word_boxes(xml, "item1").unwrap();
        assert_eq!(boxes.len(), 3);

        let first = &boxes[0];
        assert_eq!(first.page, 1);
        assert_eq!(first.position, 1);
        assert_eq!(first.word, "Hello");
        assert_eq!(first.left, 100); // 61.2 / 612 = 10.0%
        assert_eq!(first.top, 100);
        assert_eq!(first.width, 100);
        assert_eq!(first.height, 20);

        // Positions are per page ordinals
        assert_eq!(boxes[1].position, 2);
        assert_eq!(boxes[2].page, 2);
        assert_eq!(boxes[2].position, 1);
        assert_eq!(boxes[2].width, 1000);
    }

    #[test]
    fn test_parse_word_boxes_deterministic() {
        let xml = r#"<doc><page width="100" height="100">
            <word xMin="10" yMin="10" xMax="20" yMax="20">a</word>
        </page></doc>"#;
        let a = parse_word_boxes(xml, "x").unwrap();
        let b = parse_word_boxes(xml, "x").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_parse_links() {
        let xml = r#"<pdf2xml>
          <page number="1" width="918" height="1188">
            <text top="118.8" left="91.8" width="183.6" height="23.76" font="0"><a href="https://example.org/paper">see paper</a></text>
            <text top="200" left="100" width="50" height="20" font="0">plain text</text>
          </page>
        </pdf2xml>"#;

        let links = parse_links(xml, "item1").unwrap();
        assert_eq!(links.len(), 1);
        let link = &links[0];
        assert_eq!(link.page, 1);
        assert_eq!(link.link, "https://example.org/paper");
        assert_eq!(link.top, 100);
        assert_eq!(link.left, 100);
        assert_eq!(link.width, 200);
        assert_eq!(link.height, 20);
    }

    #[test]
    fn test_parse_outline_nesting() {
        let xml = r#"<pdf2xml>
          <outline>
            <item page="1">Introduction</item>
            <outline>
              <item page="2">Background</item>
              <item page="4">Prior Work</item>
            </outline>
            <item page="7">Results</item>
          </outline>
        </pdf2xml>"#;

        let outline = parse_outline(xml).unwrap();
        assert_eq!(outline.len(), 2);
        assert_eq!(outline[0].title, "Introduction");
        assert_eq!(outline[0].page, 1);
        assert_eq!(outline[0].children.len(), 2);
        assert_eq!(outline[0].children[1].title, "Prior Work");
        assert_eq!(outline[1].title, "Results");
        assert_eq!(outline[1].page, 7);
    }

    #[test]
    fn test_parse_outline_absent() {
        let outline = parse_outline("<pdf2xml><page number=\"1\"/></pdf2xml>").unwrap();
        assert!(outline.is_empty());
    }

    #[test]
    fn test_has_text() {
        assert!(PdfExtractor::has_text("some words"));
        assert!(!PdfExtractor::has_text(""));
        assert!(!PdfExtractor::has_text("  \n\t \u{000C} "));
    }
}
