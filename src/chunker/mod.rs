
use anyhow::{Context, Result};
use fancy_regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::debug;

/// Matches `--- page N ---` annotations emitted by the extraction service.
static PAGE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)---\s*page\s*(\d+)\s*---").expect("page marker pattern is valid")
});

/// Sentence boundary: whitespace following `.`, `!` or `?`.
static SENTENCE_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?<=[.!?])\s+").expect("sentence boundary pattern is valid"));

const APPROX_CHARS_PER_WORD: usize = 5;

/// Characters per page assumed when the text carries no page markers at all.
const ESTIMATED_CHARS_PER_PAGE: usize = 3000;

/// Floor for the per-page character estimate used to assign page numbers in
/// estimate mode.
const MIN_CHARS_PER_PAGE: usize = 1000;

/// A bounded, page-tagged slice of document text used as the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChunk {
    pub content: String,
    pub page_number: u32,
    /// Dense 0-based sequence unique per document, in reading order.
    pub chunk_index: usize,
    pub char_start: usize,
    pub char_end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    /// Maximum chunk size in characters before a new chunk is started.
    pub max_chunk_size: usize,
    /// Target number of trailing characters carried into the next chunk.
    pub overlap_target: usize,
}

impl Default for ChunkerConfig {
    #[inline]
    fn default() -> Self {
        Self {
            max_chunk_size: 1000,
            overlap_target: 200,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum PageRule {
    /// Marker mode: the chunk belongs to the page announced by the last marker.
    Fixed(u32),
    /// Estimate mode: derive the page from the chunk's start offset.
    Estimated {
        avg_chars_per_page: usize,
        page_count: u32,
    },
}

struct Marker {
    start: usize,
    end: usize,
    page: u32,
}

/// Split extracted text into ordered, page-tagged, overlapping chunks.
///
/// Operates in marker mode when the text contains `--- page N ---`
/// annotations, otherwise in estimate mode where page numbers are derived
/// from character offsets and `known_page_count`. Sentences are never split
/// mid-way: a single sentence longer than `max_chunk_size` is emitted as its
/// own oversized chunk.
#[inline]
pub fn chunk(
    text: &str,
    known_page_count: Option<u32>,
    config: &ChunkerConfig,
) -> Result<Vec<DocumentChunk>> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let markers = find_page_markers(text)?;
    let mut chunks = Vec::new();
    let mut next_index = 0;

    if markers.is_empty() {
        let page_count = known_page_count.unwrap_or(1).max(1);
        let rule = PageRule::Estimated {
            avg_chars_per_page: (text.len() / page_count as usize).max(MIN_CHARS_PER_PAGE),
            page_count,
        };
        chunk_segment(text, 0, rule, config, &mut next_index, &mut chunks)?;
    } else {
        let mut current_page = 1;
        let mut cursor = 0;
        for marker in &markers {
            let segment = text.get(cursor..marker.start).unwrap_or_default();
            process_marked_segment(
                segment,
                cursor,
                &mut current_page,
                config,
                &mut next_index,
                &mut chunks,
            )?;
            current_page = marker.page;
            cursor = marker.end;
        }
        let tail = text.get(cursor..).unwrap_or_default();
        process_marked_segment(
            tail,
            cursor,
            &mut current_page,
            config,
            &mut next_index,
            &mut chunks,
        )?;
    }

    debug!(
        "Chunked {} characters into {} chunks ({} mode)",
        text.len(),
        chunks.len(),
        if markers.is_empty() {
            "estimate"
        } else {
            "marker"
        }
    );

    Ok(chunks)
}

/// Page count reported for a document: the number of page markers when the
/// extraction service annotated them, otherwise an estimate from text length.
#[inline]
pub fn estimate_page_count(text: &str) -> Result<u32> {
    let markers = find_page_markers(text)?;
    if !markers.is_empty() {
        return Ok(markers.len() as u32);
    }
    Ok((text.len().div_ceil(ESTIMATED_CHARS_PER_PAGE) as u32).max(1))
}

fn find_page_markers(text: &str) -> Result<Vec<Marker>> {
    let mut markers = Vec::new();
    for captures in PAGE_MARKER.captures_iter(text) {
        let captures = captures.context("page marker scan failed")?;
        let whole = captures.get(0).context("page marker without match")?;
        let digits = captures.get(1).context("page marker without page number")?;
        let page = digits
            .as_str()
            .parse()
            .with_context(|| format!("invalid page number in marker: {}", digits.as_str()))?;
        markers.push(Marker {
            start: whole.start(),
            end: whole.end(),
            page,
        });
    }
    Ok(markers)
}

fn process_marked_segment(
    segment: &str,
    base_offset: usize,
    current_page: &mut u32,
    config: &ChunkerConfig,
    next_index: &mut usize,
    out: &mut Vec<DocumentChunk>,
) -> Result<()> {
    let trimmed = segment.trim();
    if trimmed.is_empty() {
        return Ok(());
    }

    // A bare page number between markers is a page update, not content.
    if trimmed.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(page) = trimmed.parse() {
            *current_page = page;
        }
        return Ok(());
    }

    chunk_segment(
        segment,
        base_offset,
        PageRule::Fixed(*current_page),
        config,
        next_index,
        out,
    )
}

/// Greedily accumulate sentences into chunks, seeding each new chunk with the
/// trailing words of the one just closed.
fn chunk_segment(
    segment: &str,
    base_offset: usize,
    rule: PageRule,
    config: &ChunkerConfig,
    next_index: &mut usize,
    out: &mut Vec<DocumentChunk>,
) -> Result<()> {
    let sentences = split_sentences(segment, base_offset)?;
    if sentences.is_empty() {
        return Ok(());
    }

    let mut current = String::new();
    let mut current_start = sentences[0].0;

    for (offset, sentence) in sentences {
        if !current.is_empty() && current.len() + sentence.len() > config.max_chunk_size {
            push_chunk(&current, current_start, rule, next_index, out);

            let tail = overlap_tail(&current, config.overlap_target);
            if tail.is_empty() {
                current_start = offset;
                current = sentence.to_string();
            } else {
                current_start = offset.saturating_sub(tail.len() + 1).max(base_offset);
                current = format!("{tail} {sentence}");
            }
        } else if current.is_empty() {
            current_start = offset;
            current.push_str(sentence);
        } else {
            current.push(' ');
            current.push_str(sentence);
        }
    }

    push_chunk(&current, current_start, rule, next_index, out);
    Ok(())
}

/// Sentence slices with their absolute character offsets.
fn split_sentences(segment: &str, base_offset: usize) -> Result<Vec<(usize, &str)>> {
    let mut sentences = Vec::new();
    let mut last = 0;

    for found in SENTENCE_BOUNDARY.find_iter(segment) {
        let boundary = found.context("sentence boundary scan failed")?;
        push_sentence(segment, last, boundary.start(), base_offset, &mut sentences);
        last = boundary.end();
    }
    push_sentence(segment, last, segment.len(), base_offset, &mut sentences);

    Ok(sentences)
}

fn push_sentence<'a>(
    segment: &'a str,
    start: usize,
    end: usize,
    base_offset: usize,
    out: &mut Vec<(usize, &'a str)>,
) {
    let Some(raw) = segment.get(start..end) else {
        return;
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return;
    }
    let lead = raw.len() - raw.trim_start().len();
    out.push((base_offset + start + lead, trimmed));
}

fn push_chunk(
    content: &str,
    char_start: usize,
    rule: PageRule,
    next_index: &mut usize,
    out: &mut Vec<DocumentChunk>,
) {
    let content = content.trim();
    if content.is_empty() {
        return;
    }

    let page_number = match rule {
        PageRule::Fixed(page) => page,
        PageRule::Estimated {
            avg_chars_per_page,
            page_count,
        } => ((char_start / avg_chars_per_page) as u32 + 1).min(page_count),
    };

    out.push(DocumentChunk {
        content: content.to_string(),
        page_number,
        chunk_index: *next_index,
        char_start,
        char_end: char_start + content.len(),
    });
    *next_index += 1;
}

/// Trailing words of a closed chunk approximating `overlap_target` characters,
/// at five characters per word.
fn overlap_tail(content: &str, overlap_target: usize) -> String {
    let take = overlap_target.div_ceil(APPROX_CHARS_PER_WORD);
    let words: Vec<&str> = content.split_whitespace().collect();
    let skip = words.len().saturating_sub(take);
    words[skip..].join(" ")
}
