//! JATS article XML to clean training text
//!
//! Converts a fetched PMC article artifact into a structured text record:
//! title, abstract, keywords, body sections, and figure/table captions
//! (captions often carry the experimental conclusions). Reference markers and
//! image elements are dropped; boilerplate sections (funding,
//! acknowledgements, conflicts of interest) are filtered out.
//!
//! Parsing is done with `quick-xml` into a small element tree, then the tree
//! is walked the same way for every field. Articles whose body text is
//! shorter than the configured minimum are rejected as not useful for
//! training.

use crate::config::ExtractConfig;
use crate::error::ExtractError;
use quick_xml::Reader;
use quick_xml::events::Event as XmlEvent;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// One body section with its heading
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Section heading (may be empty for unstructured bodies)
    pub title: String,
    /// Cleaned section text
    pub text: String,
}

/// Structured text record extracted from one article
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleText {
    /// Full PMC identifier
    pub pmcid: String,
    /// Article title
    pub title: String,
    /// Abstract text (structured abstracts are flattened to "Heading: text")
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    /// Author keywords
    pub keywords: Vec<String>,
    /// Journal title
    pub journal: String,
    /// Body sections in document order
    pub sections: Vec<Section>,
    /// Figure captions ("Label: caption")
    pub figure_captions: Vec<String>,
    /// Table captions ("Label: caption")
    pub table_captions: Vec<String>,
    /// The assembled training text
    pub full_text: String,
    /// Length of `full_text` in characters
    pub text_length: usize,
}

/// Minimal element tree built from the XML event stream
struct XmlNode {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<XmlChild>,
}

enum XmlChild {
    Element(XmlNode),
    Text(String),
}

impl XmlNode {
    fn new(name: String, attrs: Vec<(String, String)>) -> Self {
        Self {
            name,
            attrs,
            children: Vec::new(),
        }
    }

    fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn elements(&self) -> impl Iterator<Item = &XmlNode> {
        self.children.iter().filter_map(|c| match c {
            XmlChild::Element(el) => Some(el),
            XmlChild::Text(_) => None,
        })
    }

    /// First descendant with the given name, depth-first (like `.//name`)
    fn find(&self, name: &str) -> Option<&XmlNode> {
        for el in self.elements() {
            if el.name == name {
                return Some(el);
            }
            if let Some(found) = el.find(name) {
                return Some(found);
            }
        }
        None
    }

    /// First direct child with the given name
    fn find_child(&self, name: &str) -> Option<&XmlNode> {
        self.elements().find(|el| el.name == name)
    }

    /// All descendants with the given name, in document order
    fn find_all<'a>(&'a self, name: &str, out: &mut Vec<&'a XmlNode>) {
        for el in self.elements() {
            if el.name == name {
                out.push(el);
            }
            el.find_all(name, out);
        }
    }

    fn descendants(&self, name: &str) -> Vec<&XmlNode> {
        let mut out = Vec::new();
        self.find_all(name, &mut out);
        out
    }

    /// Text content with reference wrappers flattened and images dropped.
    ///
    /// `xref`/`ext-link`/`uri`/`sup`/`sub` contribute only their immediate
    /// text (the marker itself, not nested markup); `graphic`/`media`/
    /// `inline-graphic` contribute nothing. Tails are preserved naturally
    /// because text nodes live in the parent's child list.
    fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                XmlChild::Text(t) => out.push_str(t),
                XmlChild::Element(el) => match el.name.as_str() {
                    "graphic" | "media" | "inline-graphic" => {}
                    "xref" | "ext-link" | "uri" | "sup" | "sub" => {
                        for c in &el.children {
                            if let XmlChild::Text(t) = c {
                                out.push_str(t);
                            }
                        }
                    }
                    _ => el.collect_text(out),
                },
            }
        }
    }
}

/// Parse an XML document into an element tree rooted at a synthetic document node
fn parse_tree(xml: &[u8]) -> Result<XmlNode, quick_xml::Error> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut stack = vec![XmlNode::new(String::from("#document"), Vec::new())];

    loop {
        buf.clear();
        match reader.read_event_into(&mut buf)? {
            XmlEvent::Start(e) => {
                let node = XmlNode::new(local_name(e.local_name().as_ref()), attributes(&e));
                stack.push(node);
            }
            XmlEvent::Empty(e) => {
                let node = XmlNode::new(local_name(e.local_name().as_ref()), attributes(&e));
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(XmlChild::Element(node));
                }
            }
            XmlEvent::End(_) => {
                // quick-xml validates end-tag matching, so the stack can only
                // underflow on input it would have rejected already
                if stack.len() > 1
                    && let Some(node) = stack.pop()
                    && let Some(parent) = stack.last_mut()
                {
                    parent.children.push(XmlChild::Element(node));
                }
            }
            XmlEvent::Text(t) => {
                let text = match t.unescape() {
                    Ok(s) => s.into_owned(),
                    Err(_) => String::from_utf8_lossy(&t).into_owned(),
                };
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(XmlChild::Text(text));
                }
            }
            XmlEvent::CData(t) => {
                let text = String::from_utf8_lossy(&t).into_owned();
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(XmlChild::Text(text));
                }
            }
            XmlEvent::Eof => break,
            // Declarations, comments, processing instructions, doctypes
            _ => {}
        }
    }

    // Unclosed elements at EOF: fold them into their parents so truncated
    // documents still yield whatever structure was parsed
    while stack.len() > 1 {
        if let Some(node) = stack.pop()
            && let Some(parent) = stack.last_mut()
        {
            parent.children.push(XmlChild::Element(node));
        }
    }

    Ok(stack.pop().unwrap_or_else(|| {
        // The synthetic root is pushed before the loop and only popped here
        XmlNode::new(String::from("#document"), Vec::new())
    }))
}

fn local_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

fn attributes(e: &quick_xml::events::BytesStart<'_>) -> Vec<(String, String)> {
    e.attributes()
        .flatten()
        .map(|attr| {
            let key = local_name(attr.key.local_name().as_ref());
            let value = attr
                .unescape_value()
                .map(|v| v.into_owned())
                .unwrap_or_default();
            (key, value)
        })
        .collect()
}

/// JATS article extractor
///
/// Holds the compiled cleaning regexes and the extraction thresholds; build
/// one and reuse it across the whole corpus.
///
/// # Examples
///
/// ```no_run
/// use pmc_corpus::{Extractor, config::ExtractConfig};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let extractor = Extractor::new(ExtractConfig::default());
/// let article = extractor.extract_file("data/xml/PMC1234567.xml".as_ref())?;
/// println!("{} ({} chars)", article.title, article.text_length);
/// # Ok(())
/// # }
/// ```
pub struct Extractor {
    config: ExtractConfig,
    skip_titles: HashSet<String>,
    re_whitespace: Regex,
    re_citation: Regex,
    re_dots: Regex,
    re_punct: Regex,
}

impl Extractor {
    /// Build an extractor from the extraction configuration
    // Patterns are compile-time constants; a failed compile is a programming error
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn new(config: ExtractConfig) -> Self {
        let skip_titles = config
            .skip_section_titles
            .iter()
            .map(|t| t.to_lowercase())
            .collect();
        Self {
            skip_titles,
            config,
            re_whitespace: Regex::new(r"\s+").expect("static pattern"),
            re_citation: Regex::new(r"\[[\d,\s\-–]+\]").expect("static pattern"),
            re_dots: Regex::new(r"\.{2,}").expect("static pattern"),
            re_punct: Regex::new(r"\s+([.,;:!?])").expect("static pattern"),
        }
    }

    /// Clean extracted text: collapse whitespace, drop citation markers like
    /// `[1]`/`[1,2]`/`[1-3]`, collapse repeated periods, and remove spaces
    /// before punctuation.
    pub fn clean_text(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }
        let text = self.re_whitespace.replace_all(text, " ");
        let text = self.re_citation.replace_all(&text, "");
        let text = self.re_dots.replace_all(&text, ".");
        let text = self.re_punct.replace_all(&text, "$1");
        text.trim().to_string()
    }

    /// Extract the structured text record from an artifact file
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError`] when the file cannot be read, the XML is
    /// malformed, the document is not a JATS article, or the body text is
    /// shorter than the configured minimum.
    pub fn extract_file(&self, path: &Path) -> Result<ArticleText, ExtractError> {
        let xml = std::fs::read(path).map_err(|e| ExtractError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        self.extract_xml(&xml, path)
    }

    /// Extract from raw XML bytes; `origin` is used for error reporting and
    /// as the identifier fallback when the article carries no PMC id.
    pub fn extract_xml(&self, xml: &[u8], origin: &Path) -> Result<ArticleText, ExtractError> {
        let tree = parse_tree(xml).map_err(|e| ExtractError::MalformedXml {
            path: origin.to_path_buf(),
            reason: e.to_string(),
        })?;

        let article = tree.find("article").ok_or_else(|| ExtractError::NotAnArticle {
            path: origin.to_path_buf(),
        })?;
        let meta = article
            .find("article-meta")
            .ok_or_else(|| ExtractError::NotAnArticle {
                path: origin.to_path_buf(),
            })?;

        let title = self.clean_text(&extract_title(meta));
        let abstract_text = self.clean_text(&extract_abstract(meta));
        let keywords = extract_keywords(meta);
        let journal = extract_journal(&tree);
        let pmcid = extract_pmcid(meta).unwrap_or_else(|| {
            origin
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
        });

        let sections: Vec<Section> = self
            .extract_sections(article)
            .into_iter()
            .map(|s| Section {
                title: s.title,
                text: self.clean_text(&s.text),
            })
            .collect();
        let figure_captions = self.extract_captions(article, "fig");
        let table_captions = self.extract_captions(article, "table-wrap");

        let body_chars: usize = sections.iter().map(|s| s.text.len()).sum();
        if body_chars < self.config.min_body_chars {
            return Err(ExtractError::TooShort {
                path: origin.to_path_buf(),
                chars: body_chars,
            });
        }

        let full_text = assemble_full_text(
            &title,
            &abstract_text,
            &keywords,
            &sections,
            &figure_captions,
            &table_captions,
        );
        let text_length = full_text.chars().count();

        Ok(ArticleText {
            pmcid,
            title,
            abstract_text,
            keywords,
            journal,
            sections,
            figure_captions,
            table_captions,
            full_text,
            text_length,
        })
    }

    /// Body sections with boilerplate filtered and nested sections flattened
    fn extract_sections(&self, article: &XmlNode) -> Vec<Section> {
        let Some(body) = article.find("body") else {
            return Vec::new();
        };

        let mut sections = Vec::new();
        for sec in body.elements().filter(|el| el.name == "sec") {
            self.collect_section(sec, &mut sections);
        }

        // Bodies without <sec> structure: take the direct paragraphs
        if sections.is_empty() {
            let paragraphs: Vec<String> = body
                .elements()
                .filter(|el| el.name == "p")
                .map(|p| p.text_content().trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
            if !paragraphs.is_empty() {
                sections.push(Section {
                    title: String::new(),
                    text: paragraphs.join(" "),
                });
            }
        }

        sections
    }

    fn collect_section(&self, sec: &XmlNode, out: &mut Vec<Section>) {
        let title = sec
            .find_child("title")
            .map(|t| t.text_content().trim().to_string())
            .unwrap_or_default();

        if self.skip_titles.contains(&title.to_lowercase()) {
            return;
        }

        let mut paragraphs = Vec::new();
        for child in sec.elements() {
            match child.name.as_str() {
                "p" => {
                    let text = child.text_content().trim().to_string();
                    if !text.is_empty() {
                        paragraphs.push(text);
                    }
                }
                "sec" => self.collect_section(child, out),
                _ => {}
            }
        }

        if !paragraphs.is_empty() {
            out.push(Section {
                title,
                text: paragraphs.join(" "),
            });
        }
    }

    /// Figure or table captions as "Label: caption", short captions dropped
    fn extract_captions(&self, article: &XmlNode, element: &str) -> Vec<String> {
        let mut captions = Vec::new();
        for wrap in article.descendants(element) {
            let Some(caption) = wrap.find_child("caption") else {
                continue;
            };
            let caption_text = self.clean_text(&caption.text_content());
            if caption_text.len() <= self.config.min_caption_chars {
                continue;
            }

            let label = wrap
                .find_child("label")
                .map(|l| l.text_content().trim().to_string())
                .unwrap_or_default();
            if label.is_empty() {
                captions.push(caption_text);
            } else {
                captions.push(format!("{label}: {caption_text}"));
            }
        }
        captions
    }
}

fn extract_title(meta: &XmlNode) -> String {
    meta.find("article-title")
        .map(|t| t.text_content())
        .unwrap_or_default()
}

fn extract_abstract(meta: &XmlNode) -> String {
    let Some(abstract_node) = meta.find("abstract") else {
        return String::new();
    };

    // Structured abstracts: flatten each <sec> to "Heading: text"
    let secs = abstract_node.descendants("sec");
    if !secs.is_empty() {
        let mut parts = Vec::new();
        for sec in secs {
            let title = sec
                .find_child("title")
                .map(|t| t.text_content().trim().to_string())
                .unwrap_or_default();
            let body = sec
                .descendants("p")
                .iter()
                .map(|p| p.text_content().trim().to_string())
                .collect::<Vec<_>>()
                .join(" ");
            if !title.is_empty() && !body.is_empty() {
                parts.push(format!("{title}: {body}"));
            } else if !body.is_empty() {
                parts.push(body);
            }
        }
        return parts.join(" ");
    }

    let paragraphs = abstract_node.descendants("p");
    if paragraphs.is_empty() {
        abstract_node.text_content().trim().to_string()
    } else {
        paragraphs
            .iter()
            .map(|p| p.text_content().trim().to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn extract_keywords(meta: &XmlNode) -> Vec<String> {
    meta.descendants("kwd")
        .iter()
        .map(|k| k.text_content().trim().to_string())
        .filter(|k| !k.is_empty())
        .collect()
}

fn extract_journal(tree: &XmlNode) -> String {
    tree.find("journal-title")
        .map(|j| j.text_content().trim().to_string())
        .unwrap_or_default()
}

fn extract_pmcid(meta: &XmlNode) -> Option<String> {
    meta.descendants("article-id")
        .iter()
        .find(|id| id.attr("pub-id-type") == Some("pmc"))
        .map(|id| id.text_content().trim().to_string())
        .filter(|id| !id.is_empty())
        .map(|id| {
            if id.starts_with("PMC") {
                id
            } else {
                format!("PMC{id}")
            }
        })
}

fn assemble_full_text(
    title: &str,
    abstract_text: &str,
    keywords: &[String],
    sections: &[Section],
    figure_captions: &[String],
    table_captions: &[String],
) -> String {
    let mut parts = Vec::new();

    if !title.is_empty() {
        parts.push(format!("Title: {title}"));
    }
    if !abstract_text.is_empty() {
        parts.push(format!("\nAbstract: {abstract_text}"));
    }
    if !keywords.is_empty() {
        parts.push(format!("\nKeywords: {}", keywords.join(", ")));
    }
    for section in sections {
        if section.title.is_empty() {
            parts.push(format!("\n{}", section.text));
        } else {
            parts.push(format!("\n{}\n{}", section.title, section.text));
        }
    }
    if !figure_captions.is_empty() {
        parts.push("\nFigure Descriptions:".to_string());
        for caption in figure_captions {
            parts.push(format!("  {caption}"));
        }
    }
    if !table_captions.is_empty() {
        parts.push("\nTable Descriptions:".to_string());
        for caption in table_captions {
            parts.push(format!("  {caption}"));
        }
    }

    parts.join("\n")
}
