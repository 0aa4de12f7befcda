//! Sentence aggregation over streaming model output.
//!
//! A pure transducer: fragments go in, emit-ready segments come out. No
//! tasks, no channels; the streaming workflow drives it and synthesizes
//! audio for whatever it emits.
//!
//! Internally it keeps the rolling raw buffer of unsplit text, the pending
//! segment being grown until it clears the emit thresholds, and the set of
//! content hashes already emitted (duplicate suppression). Fragments join
//! the raw buffer with punctuation-aware spacing so that token streams
//! like `"main" ".py"` reassemble into `main.py` rather than `main .py`.

use std::collections::HashSet;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use loqui_core::config::StreamConfig;

use crate::text_filter::{TextFilter, END_PUNCTUATION};

/// Segments longer than this participate in duplicate suppression.
const DEDUP_MIN_CHARS: usize = 10;

/// One emit-ready segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// 1-based, strictly increasing.
    pub index: u32,
    /// Trimmed text, usually ending in sentence punctuation.
    pub text: String,
}

/// Grows sentences out of model fragments and decides when to emit.
pub struct SentenceAggregator {
    filter: TextFilter,
    config: StreamConfig,
    /// Rolling buffer of cleaned text with no complete sentence yet.
    raw: String,
    /// Aggregate of complete sentences still below the emit thresholds.
    pending: String,
    /// Hashes of cleaned fragments and emitted segments.
    seen: HashSet<u64>,
    emitted_any: bool,
    next_index: u32,
}

impl SentenceAggregator {
    /// Create an aggregator with the given thresholds.
    #[must_use]
    pub fn new(filter: TextFilter, config: StreamConfig) -> Self {
        Self {
            filter,
            config,
            raw: String::new(),
            pending: String::new(),
            seen: HashSet::new(),
            emitted_any: false,
            next_index: 0,
        }
    }

    /// Segments emitted so far.
    #[must_use]
    pub const fn emitted(&self) -> u32 {
        self.next_index
    }

    /// Feed one model fragment; returns zero or more emit-ready segments.
    pub fn push(&mut self, fragment: &str) -> Vec<Segment> {
        let cleaned = self.filter.clean(fragment);
        if cleaned.is_empty() {
            return Vec::new();
        }

        // Duplicate fragment suppression, long fragments only.
        if cleaned.len() > DEDUP_MIN_CHARS && !self.seen.insert(content_hash(&cleaned)) {
            tracing::debug!(fragment = %preview(&cleaned), "duplicate fragment skipped");
            return Vec::new();
        }

        self.raw = join_fragments(std::mem::take(&mut self.raw), &cleaned);

        let (sentences, remainder) =
            self.filter
                .split_sentences(&self.raw, self.config.punct_flush_strict, false);
        self.raw = remainder;

        let mut out = Vec::new();
        for sentence in sentences {
            self.offer(sentence, &mut out);
        }
        out
    }

    /// The model is done; flush in order.
    pub fn finish(&mut self) -> Vec<Segment> {
        let mut out = Vec::new();

        // Complete sentences still sitting in the raw buffer, now also
        // closing at end-of-text.
        let raw = std::mem::take(&mut self.raw);
        let (sentences, remainder) =
            self.filter
                .split_sentences(&raw, self.config.punct_flush_strict, true);
        for sentence in sentences {
            self.offer(sentence, &mut out);
        }

        // Whatever trails folds into the pending segment.
        if !remainder.is_empty() {
            self.pending = join_segments(std::mem::take(&mut self.pending), &remainder);
        }

        if self.pending.is_empty() {
            return out;
        }

        let pending = std::mem::take(&mut self.pending);
        let ends_sentence = pending.ends_with(END_PUNCTUATION);
        let force = self.config.force_flush_max_chars;

        // A complete final sentence is never thrown away; a dangling
        // remainder only survives when the force flush is configured and
        // it is long enough.
        if ends_sentence || (force > 0 && pending.len() >= force) {
            self.emit(pending, &mut out);
        } else {
            tracing::debug!(dropped = %preview(&pending), "dangling remainder below flush floor");
        }

        out
    }

    /// Grow the pending segment by one complete sentence and emit if the
    /// thresholds are met.
    fn offer(&mut self, sentence: String, out: &mut Vec<Segment>) {
        let candidate = join_segments(std::mem::take(&mut self.pending), &sentence);

        let words = self.filter.meaningful_words(&candidate);
        let word_floor = if self.emitted_any {
            self.config.min_words
        } else {
            self.config.first_sentence_min_words
        };

        if words >= word_floor || candidate.len() >= self.config.min_chars {
            self.emit(candidate, out);
        } else {
            self.pending = candidate;
        }
    }

    fn emit(&mut self, segment: String, out: &mut Vec<Segment>) {
        let text = segment.trim().to_string();

        // Duplicate segment suppression, long segments only.
        if text.len() > DEDUP_MIN_CHARS && !self.seen.insert(content_hash(&text)) {
            tracing::debug!(segment = %preview(&text), "duplicate segment skipped");
            return;
        }

        self.emitted_any = true;
        self.next_index += 1;
        out.push(Segment {
            index: self.next_index,
            text,
        });
    }
}

/// Join a fragment onto the raw buffer. A fragment that opens with
/// punctuation glues on directly; anything else gets one space.
fn join_fragments(buffer: String, fragment: &str) -> String {
    if buffer.is_empty() {
        return fragment.to_string();
    }
    let glue_on = fragment
        .chars()
        .next()
        .is_some_and(|c| matches!(c, '.' | ',' | '!' | '?' | ';' | ':' | ')' | ']' | '\''));
    if glue_on {
        format!("{buffer}{fragment}")
    } else {
        format!("{buffer} {fragment}")
    }
}

/// Join complete sentences/remainders with a single space.
fn join_segments(left: String, right: &str) -> String {
    if left.is_empty() {
        right.to_string()
    } else {
        format!("{left} {right}")
    }
}

fn content_hash(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

fn preview(text: &str) -> &str {
    &text[..text.len().min(50)]
}
