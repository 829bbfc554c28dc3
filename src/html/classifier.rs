//! Deciding which DOM context each chunk of a document lands in.

use std::ops::Range;

/// Sub-context key for the body of a `<style>` element.
pub const STYLE_PATH: &str = "//style";
/// Sub-context key for a quoted attribute value.
pub const ATTRIBUTE_VALUE: &str = "@value";
/// Sub-context key for tag markup outside attribute values.
pub const TAG: &str = "tag";

/// Classifies chunks of an HTML document by the context they occupy.
///
/// `chunks` are char ranges into `text`. The result has one entry per
/// chunk: the sub-context key to look up in a transformer's `HTML` policy,
/// or `None` for ordinary text content.
pub trait ContextClassifier {
    /// Returns the sub-context key of every chunk.
    fn classify(&self, text: &str, chunks: &[Range<usize>]) -> Vec<Option<String>>;
}

/// Classifies every chunk as text content.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullClassifier;

impl ContextClassifier for NullClassifier {
    fn classify(&self, _text: &str, chunks: &[Range<usize>]) -> Vec<Option<String>> {
        vec![None; chunks.len()]
    }
}

/// A small lexical classifier for well-formed markup.
///
/// A chunk is classified by the lexer state in force at its first
/// character: inside a `<script>` or `<style>` body, inside a quoted
/// attribute value, inside tag markup, or in text content. It does not
/// handle comments, CDATA or unquoted attribute values.
///
/// # Examples
///
/// ```
/// use policy_taint::{ContextClassifier, MarkupClassifier};
///
/// let doc = r#"<a title="x">y</a><script>z</script>"#;
/// let keys = MarkupClassifier.classify(doc, &[10..11, 13..14, 26..27]);
/// assert_eq!(keys, vec![Some("@value".into()), None, Some("//script".into())]);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkupClassifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Text,
    Tag,
    Value(char),
    Script,
    Style,
}

impl State {
    fn key(self) -> Option<&'static str> {
        match self {
            State::Text => None,
            State::Tag => Some(TAG),
            State::Value(_) => Some(ATTRIBUTE_VALUE),
            State::Script => Some(crate::transformer::SCRIPT_PATH),
            State::Style => Some(STYLE_PATH),
        }
    }
}

fn closes(chars: &[char], at: usize, name: &str) -> bool {
    let needle: Vec<char> = format!("</{name}").chars().collect();
    chars.len() >= at + needle.len()
        && chars[at..at + needle.len()]
            .iter()
            .zip(&needle)
            .all(|(a, b)| a.to_ascii_lowercase() == *b)
}

// The state before each character.
fn lex(chars: &[char]) -> Vec<State> {
    let mut states = Vec::with_capacity(chars.len());
    let mut state = State::Text;
    let mut name = String::new();
    let mut name_done = false;
    let mut closing = false;

    for (i, &c) in chars.iter().enumerate() {
        states.push(state);
        match state {
            State::Text => {
                let next = chars.get(i + 1).copied();
                let opens = next.is_some_and(|n| n.is_ascii_alphabetic() || n == '/' || n == '!');
                if c == '<' && opens {
                    state = State::Tag;
                    name.clear();
                    name_done = false;
                    closing = false;
                }
            }
            State::Tag => {
                if !name_done {
                    if c == '/' && name.is_empty() && !closing {
                        closing = true;
                        continue;
                    }
                    if c.is_ascii_alphanumeric() {
                        name.push(c.to_ascii_lowercase());
                        continue;
                    }
                    name_done = true;
                }
                match c {
                    '"' | '\'' => state = State::Value(c),
                    '>' => {
                        state = match (name.as_str(), closing) {
                            ("script", false) if !closes(chars, i + 1, "script") => State::Script,
                            ("style", false) if !closes(chars, i + 1, "style") => State::Style,
                            _ => State::Text,
                        };
                    }
                    _ => {}
                }
            }
            State::Value(quote) => {
                if c == quote {
                    state = State::Tag;
                }
            }
            State::Script | State::Style => {
                let element = if state == State::Script { "script" } else { "style" };
                let next = i + 1;
                if closes(chars, next, element) {
                    // The closing tag starts at the next character.
                    state = State::Text;
                }
            }
        }
    }
    states
}

impl ContextClassifier for MarkupClassifier {
    fn classify(&self, text: &str, chunks: &[Range<usize>]) -> Vec<Option<String>> {
        let chars: Vec<char> = text.chars().collect();
        let states = lex(&chars);
        chunks
            .iter()
            .map(|range| {
                states
                    .get(range.start)
                    .and_then(|s| s.key())
                    .map(str::to_string)
            })
            .collect()
    }
}
