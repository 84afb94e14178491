//! Splits document text into chunks sized for the embedding model.
//!
//! Splitting is structure-first: paragraphs are kept whole when they fit,
//! oversized paragraphs fall back to sentence boundaries, and oversized
//! sentences fall back to a word window with character overlap. A final
//! pass merges small neighboring pieces so short paragraphs do not each
//! cost an embedding call.

/// Chunking parameters.
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Target upper bound on chunk size, in characters.
    pub max_chars: usize,
    /// Characters of context repeated between consecutive word-window
    /// chunks.
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_chars: 1000,
            overlap: 200,
        }
    }
}

/// Splits `content` into chunks of at most `config.max_chars` characters.
///
/// Returns an empty vector for blank input. A single unbroken token longer
/// than the budget is hard-split by characters, so every call terminates
/// with full coverage of the input.
pub fn chunk_text(content: &str, config: &ChunkConfig) -> Vec<String> {
    let text = content.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let mut pieces = Vec::new();
    for paragraph in text.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }
        if char_len(paragraph) <= config.max_chars {
            pieces.push(paragraph.to_string());
        } else {
            split_sentences_into(paragraph, config, &mut pieces);
        }
    }

    merge_small_neighbors(pieces, config)
}

fn split_sentences_into(paragraph: &str, config: &ChunkConfig, out: &mut Vec<String>) {
    for sentence in split_sentences(paragraph) {
        if char_len(&sentence) <= config.max_chars {
            out.push(sentence);
        } else {
            out.extend(word_window(&sentence, config));
        }
    }
}

/// Splits on `.`, `!`, `?` when followed by whitespace or end of text.
fn split_sentences(paragraph: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = paragraph.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') && chars.peek().map_or(true, |next| next.is_whitespace()) {
            push_trimmed(&mut sentences, &current);
            current.clear();
        }
    }
    push_trimmed(&mut sentences, &current);

    sentences
}

/// Packs words into chunks of at most `max_chars`, repeating roughly
/// `overlap` characters of trailing words at the start of the next chunk.
fn word_window(text: &str, config: &ChunkConfig) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < words.len() {
        let mut end = start;
        let mut len = 0;
        while end < words.len() {
            let added = char_len(words[end]) + usize::from(end > start);
            if len + added > config.max_chars {
                break;
            }
            len += added;
            end += 1;
        }

        if end == start {
            // Single word longer than the budget, hard-split by characters
            let cs: Vec<char> = words[start].chars().collect();
            let mut i = 0;
            while i < cs.len() {
                let stop = (i + config.max_chars).min(cs.len());
                chunks.push(cs[i..stop].iter().collect());
                i = stop;
            }
            start += 1;
            continue;
        }

        chunks.push(words[start..end].join(" "));
        if end >= words.len() {
            break;
        }

        // Step the next window back by whole words worth ~overlap chars,
        // always keeping forward progress
        let mut back = end;
        let mut overlap_len = 0;
        while back > start + 1 && overlap_len + char_len(words[back - 1]) + 1 <= config.overlap {
            overlap_len += char_len(words[back - 1]) + 1;
            back -= 1;
        }
        start = back;
    }

    chunks
}

/// Greedily merges adjacent pieces when either is shorter than a quarter
/// of the budget and the combination still fits.
fn merge_small_neighbors(pieces: Vec<String>, config: &ChunkConfig) -> Vec<String> {
    let min_chars = config.max_chars / 4;
    let mut merged: Vec<String> = Vec::new();

    for piece in pieces {
        match merged.last_mut() {
            Some(last)
                if (char_len(last) < min_chars || char_len(&piece) < min_chars)
                    && char_len(last) + char_len(&piece) + 2 <= config.max_chars =>
            {
                last.push_str("\n\n");
                last.push_str(&piece);
            }
            _ => merged.push(piece),
        }
    }

    merged
}

fn push_trimmed(out: &mut Vec<String>, piece: &str) {
    let trimmed = piece.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
