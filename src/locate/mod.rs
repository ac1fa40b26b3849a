//! Reference sentence alignment.
//!
//! A generated reference sentence rarely matches its source span exactly —
//! whitespace, punctuation, and Unicode noise creep in on both sides. The
//! locator normalizes candidate and chunk down to lowercase alphanumerics,
//! finds the candidate as a substring in that space, then walks the original
//! chunk text to recover the original-cased, original-punctuated span.
//!
//! This component never errors: a miss is a valid outcome, reported as
//! `is_exact_match = false` with the candidate text verbatim.

use crate::types::{LearningObjective, ReferenceSentence, SourceChunk};

/// Align a candidate sentence to an exact span in one of the given chunks.
///
/// On a hit, the returned `text` is a byte-for-byte substring of the matched
/// chunk's content (trailing sentence punctuation included) and
/// `is_exact_match` is true. On a miss across all chunks, the candidate is
/// returned verbatim, attributed to the objective's first known chunk.
pub fn locate_reference(
    candidate: &str,
    objective: &LearningObjective,
    chunks: &[SourceChunk],
) -> ReferenceSentence {
    let normalized_candidate = normalize(candidate);

    if !normalized_candidate.is_empty() {
        for chunk in chunks {
            if let Some(span) = find_span(&normalized_candidate, &chunk.content) {
                return ReferenceSentence {
                    text: span,
                    is_exact_match: true,
                    source_chunk_id: chunk.id.clone(),
                    source_document_id: chunk.document_id.clone(),
                };
            }
        }
    }

    // Miss: fall back to the candidate verbatim, attributed to the
    // objective's first known chunk (or the first candidate chunk).
    let fallback_id = objective
        .first_chunk_id()
        .cloned()
        .or_else(|| chunks.first().map(|c| c.id.clone()))
        .unwrap_or_default();
    let document_id = chunks
        .iter()
        .find(|c| c.id == fallback_id)
        .or_else(|| chunks.first())
        .map(|c| c.document_id.clone())
        .unwrap_or_default();

    ReferenceSentence {
        text: candidate.to_string(),
        is_exact_match: false,
        source_chunk_id: fallback_id,
        source_document_id: document_id,
    }
}

/// Lowercase and keep only alphanumerics.
fn normalize(text: &str) -> Vec<char> {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Find `normalized_candidate` in the normalization of `content` and recover
/// the original span, extended through trailing sentence punctuation.
fn find_span(normalized_candidate: &[char], content: &str) -> Option<String> {
    // Normalized chunk chars, each tagged with the byte range of the
    // original char that produced it (one original char can lowercase into
    // several normalized chars).
    let mut normalized: Vec<char> = Vec::new();
    let mut origin: Vec<(usize, usize)> = Vec::new();
    for (byte_pos, c) in content.char_indices() {
        if c.is_alphanumeric() {
            for lower in c.to_lowercase() {
                normalized.push(lower);
                origin.push((byte_pos, byte_pos + c.len_utf8()));
            }
        }
    }

    let start = substring_position(&normalized, normalized_candidate)?;
    let end = start + normalized_candidate.len() - 1;

    let span_start = origin[start].0;
    let mut span_end = origin[end].1;

    // Pull in trailing sentence punctuation from the original text.
    for c in content[span_end..].chars() {
        if matches!(c, '.' | '!' | '?') {
            span_end += c.len_utf8();
        } else {
            break;
        }
    }

    Some(content[span_start..span_end].to_string())
}

/// Naive substring search over char slices.
fn substring_position(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len()).find(|&i| &haystack[i..i + needle.len()] == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, content: &str) -> SourceChunk {
        SourceChunk::new(id, "doc-1", content)
    }

    fn objective(chunk_id: &str) -> LearningObjective {
        LearningObjective::atomic("Explain active transport", chunk_id)
    }

    // The contract to check first: an exact match is a literal substring of
    // the attributed chunk's content.
    #[test]
    fn exact_match_is_literal_substring() {
        let chunks = vec![chunk(
            "c1",
            "Cells move substances. Active transport requires energy in the form of ATP. More text.",
        )];
        let result = locate_reference(
            "active transport REQUIRES energy, in the form of A.T.P",
            &objective("c1"),
            &chunks,
        );
        assert!(result.is_exact_match);
        assert!(chunks[0].content.contains(&result.text));
        assert_eq!(result.source_chunk_id, "c1");
    }

    #[test]
    fn verbatim_candidate_found_exactly() {
        let sentence = "Active transport requires energy in the form of ATP.";
        let chunks = vec![chunk("c1", &format!("Intro text. {sentence} Outro text."))];
        let result = locate_reference(sentence, &objective("c1"), &chunks);
        assert!(result.is_exact_match);
        assert_eq!(result.text, sentence);
    }

    #[test]
    fn recovers_original_casing_and_punctuation() {
        let chunks = vec![chunk("c1", "The Krebs cycle, discovered in 1937, yields ATP!")];
        let result = locate_reference(
            "the krebs cycle discovered in 1937 yields atp",
            &objective("c1"),
            &chunks,
        );
        assert!(result.is_exact_match);
        assert_eq!(result.text, "The Krebs cycle, discovered in 1937, yields ATP!");
    }

    #[test]
    fn searches_across_multiple_chunks() {
        let chunks = vec![
            chunk("c1", "Nothing relevant here."),
            chunk("c2", "Osmosis is the diffusion of water across a membrane."),
        ];
        let result = locate_reference(
            "osmosis is the diffusion of water",
            &objective("c1"),
            &chunks,
        );
        assert!(result.is_exact_match);
        assert_eq!(result.source_chunk_id, "c2");
        assert!(chunks[1].content.contains(&result.text));
    }

    #[test]
    fn miss_falls_back_to_candidate_verbatim() {
        let chunks = vec![chunk("c1", "Completely unrelated content.")];
        let candidate = "Mitochondria are the powerhouse of the cell.";
        let result = locate_reference(candidate, &objective("c1"), &chunks);
        assert!(!result.is_exact_match);
        assert_eq!(result.text, candidate);
        assert_eq!(result.source_chunk_id, "c1");
        assert_eq!(result.source_document_id, "doc-1");
    }

    #[test]
    fn miss_with_no_chunks_still_returns() {
        let obj = LearningObjective {
            source_chunk_ids: Default::default(),
            ..objective("unused")
        };
        let result = locate_reference("some sentence", &obj, &[]);
        assert!(!result.is_exact_match);
        assert_eq!(result.text, "some sentence");
        assert!(result.source_chunk_id.is_empty());
    }

    #[test]
    fn unicode_noise_is_tolerated() {
        let chunks = vec![chunk("c1", "Le café — naturellement — contient de la caféine.")];
        let result = locate_reference("le cafe? no: café naturellement", &objective("c1"), &chunks);
        // Different words, must miss; but matching ones must still align
        assert!(!result.is_exact_match);

        let result = locate_reference("café, naturellement", &objective("c1"), &chunks);
        assert!(result.is_exact_match);
        assert!(chunks[0].content.contains(&result.text));
    }

    #[test]
    fn empty_candidate_is_a_miss() {
        let chunks = vec![chunk("c1", "Some content.")];
        let result = locate_reference("", &objective("c1"), &chunks);
        assert!(!result.is_exact_match);
    }

    #[test]
    fn trailing_punctuation_is_included() {
        let chunks = vec![chunk("c1", "Water boils at 100 degrees Celsius?! Yes.")];
        let result = locate_reference(
            "water boils at 100 degrees celsius",
            &objective("c1"),
            &chunks,
        );
        assert!(result.is_exact_match);
        assert_eq!(result.text, "Water boils at 100 degrees Celsius?!");
    }
}
