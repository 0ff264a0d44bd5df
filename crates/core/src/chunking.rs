use crate::error::IngestError;
use crate::models::{Chapter, Chunk, ChunkMetadata, ChunkingOptions, DocClass, ItemMetadata};
use crate::pages::{self, PageIndex, PAGE_MARKER};
use crate::token::Tokenizer;
use regex::Regex;
use tracing::debug;

pub const HEARING_SEPARATORS: &[&str] = &[
    r"\nSTATEMENT OF [A-Z]",
    r"\nThe CHAIRMAN\.",
    r"\nSenator [A-Z]+\.",
    r"\nSecretary [A-Z]+\.",
    r"\nMr\. [A-Z]+\.",
    r"\nCONCLUSION",
    r"\n[A-Z][A-Z ]{10,}\n",
];

pub const MINUTES_SEPARATORS: &[&str] = &[
    r"\n(?:AGENDA ITEM|Item|ITEM)\s*(?:#|[0-9])",
    r"\n(?:OLD BUSINESS|NEW BUSINESS|ROLL CALL|ADJOURNMENT)",
    r"\n[A-Z][A-Z ]{10,}\n",
];

pub const SECTION_SEPARATORS: &[&str] = &[
    r"\n(?:CHAPTER|Chapter)\s+[0-9]",
    r"\n(?:PART|Part)\s+(?:[0-9]|[IVX])",
    r"\n(?:SECTION|Section)\s+[0-9]",
    r"\n[A-Z][A-Z ]{10,}\n",
];

pub const BLANK_LINE_SEPARATOR: &str = r"\n\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Passage {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Copy)]
struct Segment {
    start: usize,
    end: usize,
}

fn trimmed_segment(base: &str, start: usize, end: usize) -> Option<Segment> {
    let slice = &base[start..end];
    let trimmed = slice.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lead = slice.len() - slice.trim_start().len();
    Some(Segment {
        start: start + lead,
        end: start + lead + trimmed.len(),
    })
}

pub fn classify_document(
    item_type: &str,
    token_count: usize,
    options: &ChunkingOptions,
) -> DocClass {
    if matches!(item_type, "hearing" | "book") {
        return DocClass::Long;
    }
    if matches!(item_type, "report" | "document")
        && token_count > options.short_doc_threshold_tokens
    {
        return DocClass::Medium;
    }
    if token_count <= options.short_doc_threshold_tokens {
        return DocClass::Short;
    }
    if token_count > options.chunk_size_tokens * 2 {
        return DocClass::Medium;
    }
    DocClass::Short
}

pub fn split_at_boundaries<T: Tokenizer>(
    tokenizer: &T,
    text: &str,
    separators: &[&str],
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<Passage>, IngestError> {
    let mut segments = match trimmed_segment(text, 0, text.len()) {
        Some(segment) => vec![segment],
        None => return Ok(Vec::new()),
    };

    // The first pattern that increases the segment count wins.
    for separator in separators {
        let regex = Regex::new(separator)?;
        let mut split = Vec::new();
        for segment in &segments {
            let slice = &text[segment.start..segment.end];
            let mut piece_start = segment.start;
            for found in regex.find_iter(slice) {
                // Every pattern begins with a newline; the cut drops that
                // newline and keeps the marker with the following segment.
                let cut = segment.start + found.start();
                split.extend(trimmed_segment(text, piece_start, cut));
                piece_start = cut + 1;
            }
            split.extend(trimmed_segment(text, piece_start, segment.end));
        }
        if split.len() > segments.len() {
            segments = split;
            break;
        }
    }

    let mut passages: Vec<Passage> = Vec::new();
    let mut current: Option<Passage> = None;

    for segment in segments {
        let segment_text = &text[segment.start..segment.end];
        let combined = match &current {
            Some(accumulated) => format!("{}\n\n{}", accumulated.text, segment_text),
            None => segment_text.to_string(),
        };
        if tokenizer.count(&combined) <= chunk_size {
            current = Some(match current.take() {
                Some(accumulated) => Passage {
                    text: combined,
                    start: accumulated.start,
                    end: segment.end,
                },
                None => Passage {
                    text: combined,
                    start: segment.start,
                    end: segment.end,
                },
            });
        } else {
            if let Some(accumulated) = current.take() {
                passages.push(accumulated);
            }
            if tokenizer.count(segment_text) > chunk_size {
                passages.extend(
                    split_by_tokens(tokenizer, segment_text, chunk_size, overlap)
                        .into_iter()
                        .map(|mut window| {
                            window.start += segment.start;
                            window.end += segment.start;
                            window
                        }),
                );
            } else {
                current = Some(Passage {
                    text: segment_text.to_string(),
                    start: segment.start,
                    end: segment.end,
                });
            }
        }
    }
    if let Some(accumulated) = current {
        passages.push(accumulated);
    }

    Ok(passages)
}

pub fn split_by_tokens<T: Tokenizer>(
    tokenizer: &T,
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Vec<Passage> {
    let tokens = tokenizer.encode(text);

    // Byte offset of each token boundary, from per-token decode lengths.
    let mut boundaries = Vec::with_capacity(tokens.len() + 1);
    boundaries.push(0usize);
    let mut cursor = 0usize;
    for &token in &tokens {
        cursor += tokenizer.decode(&[token]).len();
        boundaries.push(cursor);
    }

    let mut windows = Vec::new();
    let mut start = 0usize;
    while start < tokens.len() {
        let end = (start + chunk_size).min(tokens.len());
        let window = tokenizer.decode(&tokens[start..end]);
        let trimmed = window.trim();
        if !trimmed.is_empty() {
            windows.push(Passage {
                text: trimmed.to_string(),
                start: boundaries[start].min(text.len()),
                end: boundaries[end].min(text.len()),
            });
        }
        start += chunk_size - overlap;
    }
    windows
}

fn section_with_blank_line() -> Vec<&'static str> {
    SECTION_SEPARATORS
        .iter()
        .copied()
        .chain(std::iter::once(BLANK_LINE_SEPARATOR))
        .collect()
}

pub struct Chunker<T: Tokenizer> {
    tokenizer: T,
    options: ChunkingOptions,
}

impl<T: Tokenizer> Chunker<T> {
    pub fn new(tokenizer: T, options: ChunkingOptions) -> Result<Self, IngestError> {
        if options.chunk_size_tokens == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk size must be positive".to_string(),
            ));
        }
        if options.overlap_tokens >= options.chunk_size_tokens {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than chunk size {}",
                options.overlap_tokens, options.chunk_size_tokens
            )));
        }
        Ok(Self { tokenizer, options })
    }

    pub fn options(&self) -> &ChunkingOptions {
        &self.options
    }

    pub fn chunk_document(
        &self,
        text: &str,
        item_type: &str,
        metadata: &ItemMetadata,
    ) -> Result<Vec<Chunk>, IngestError> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let token_count = self.tokenizer.count(text);
        let class = classify_document(item_type, token_count, &self.options);

        let page_map = pages::build_page_map(text);
        let page_index = PageIndex::new(text);
        let stripped = text.replace(PAGE_MARKER, "");

        let passages = match class {
            DocClass::Short => match trimmed_segment(&stripped, 0, stripped.len()) {
                Some(segment) => vec![Passage {
                    text: stripped[segment.start..segment.end].to_string(),
                    start: segment.start,
                    end: segment.end,
                }],
                None => Vec::new(),
            },
            DocClass::Long => {
                let separators = if item_type == "hearing" {
                    HEARING_SEPARATORS
                } else {
                    SECTION_SEPARATORS
                };
                split_at_boundaries(
                    &self.tokenizer,
                    &stripped,
                    separators,
                    self.options.chunk_size_tokens,
                    self.options.overlap_tokens,
                )?
            }
            DocClass::Medium => split_at_boundaries(
                &self.tokenizer,
                &stripped,
                &section_with_blank_line(),
                self.options.chunk_size_tokens,
                self.options.overlap_tokens,
            )?,
        };

        let total = passages.len();
        let page_count = page_index.total_pages();
        debug!(item_type, tokens = token_count, chunks = total, "chunked document");

        Ok(passages
            .into_iter()
            .enumerate()
            .map(|(index, passage)| {
                let mut chunk_metadata = ChunkMetadata::for_item(metadata);
                let physical_start = page_index.page_at(passage.start);
                let physical_end = page_index.page_at(passage.end.saturating_sub(1));
                let (page_start, page_end) = match &page_map {
                    Some(map) => (
                        map.get(&physical_start).copied().unwrap_or(physical_start),
                        map.get(&physical_end).copied().unwrap_or(physical_end),
                    ),
                    None => (physical_start, physical_end),
                };
                chunk_metadata.page_start = Some(page_start);
                chunk_metadata.page_end = Some(page_end);
                chunk_metadata.pdf_page = Some(physical_start);
                chunk_metadata.page_count = Some(page_count);
                Chunk {
                    text: passage.text,
                    chunk_index: index,
                    total_chunks: total,
                    metadata: chunk_metadata,
                }
            })
            .collect())
    }

    pub fn chunk_chapters(
        &self,
        chapters: &[Chapter],
        metadata: &ItemMetadata,
    ) -> Result<Vec<Chunk>, IngestError> {
        let separators = section_with_blank_line();
        let mut chunks: Vec<Chunk> = Vec::new();

        for chapter in chapters {
            if chapter.text.trim().is_empty() {
                continue;
            }
            let mut chapter_metadata = ChunkMetadata::for_item(metadata);
            chapter_metadata.chapter = Some(chapter.title.clone());

            if self.tokenizer.count(&chapter.text) <= self.options.chunk_size_tokens {
                chunks.push(Chunk {
                    text: chapter.text.trim().to_string(),
                    chunk_index: chunks.len(),
                    total_chunks: 0,
                    metadata: chapter_metadata,
                });
            } else {
                for passage in split_at_boundaries(
                    &self.tokenizer,
                    &chapter.text,
                    &separators,
                    self.options.chunk_size_tokens,
                    self.options.overlap_tokens,
                )? {
                    chunks.push(Chunk {
                        text: passage.text,
                        chunk_index: chunks.len(),
                        total_chunks: 0,
                        metadata: chapter_metadata.clone(),
                    });
                }
            }
        }

        let total = chunks.len();
        for chunk in &mut chunks {
            chunk.total_chunks = total;
        }
        Ok(chunks)
    }

    pub fn chunk_note(
        &self,
        text: &str,
        metadata: &ItemMetadata,
        source_type: &str,
    ) -> Result<Vec<Chunk>, IngestError> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let mut note_metadata = ChunkMetadata::for_item(metadata);
        note_metadata.source_type = Some(source_type.to_string());

        if self.tokenizer.count(text) <= self.options.chunk_size_tokens {
            return Ok(vec![Chunk {
                text: text.trim().to_string(),
                chunk_index: 0,
                total_chunks: 1,
                metadata: note_metadata,
            }]);
        }

        let passages = split_at_boundaries(
            &self.tokenizer,
            text,
            &[BLANK_LINE_SEPARATOR],
            self.options.chunk_size_tokens,
            self.options.overlap_tokens,
        )?;
        let total = passages.len();
        Ok(passages
            .into_iter()
            .enumerate()
            .map(|(index, passage)| Chunk {
                text: passage.text,
                chunk_index: index,
                total_chunks: total,
                metadata: note_metadata.clone(),
            })
            .collect())
    }
}
