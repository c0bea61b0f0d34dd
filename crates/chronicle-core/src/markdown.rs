//! Markdown tokenizer for the chat platform's message dialect.
//!
//! Message text may contain `<`, `>` and `&` that must be escaped, but code
//! spans, mentions and links must not go through the inline markdown pass.
//! Splitting the text into typed tokens first lets each kind be rendered on
//! its own terms.
//!
//! The scan is a single left-to-right pass. At each position the current
//! character selects a few candidate matchers, tried in a fixed priority
//! order; the first match wins and is never revisited. Characters that match
//! nothing accumulate into a text run that is flushed as a [`TokenKind::Text`]
//! token before the next non-text token and at end of input.

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;

static AT_USER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^<@!?\d+>").expect("at-user regex"));
static AT_ROLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^<@&\d+>").expect("at-role regex"));
static CHANNEL_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"^<#\d+>").expect("channel regex"));
static EMOJI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^<(?P<animated>a?):(?P<name>[A-Za-z0-9_\-]+):(?P<id>\d+)>").expect("emoji regex")
});
// The platform sometimes wraps links as `<https://...>` to suppress previews.
static ODD_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^<(?P<link>https?://[^>\s]+)>").expect("odd link regex"));
static LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)^https?://[^\s<>"]+"#).expect("link regex"));
static MASKED_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\[(?P<text>[^\]\n]+)\]\((?P<link>[^)\s]+)\)").expect("masked link regex")
});
static HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<level>#{1,3}) (?P<value>[^\n]+)\n?").expect("header regex"));
static MULTI_QUOTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^>>> (?P<value>.+)").expect("multi-line quote regex"));
static QUOTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^> (?P<value>[^\n]+)\n?").expect("quote regex"));
static LIST_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[*\-] (?P<value>[^\n]+)\n?").expect("list item regex"));

const CODE_BLOCK_FENCE: &str = "```";
const MULTI_QUOTE_MARKER: &str = ">>> ";
const CODE_TEXT_FENCE: char = '`';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Text,
    Header1,
    Header2,
    Header3,
    AtUser,
    AtRole,
    ChannelLink,
    Emoji,
    CodeBlock,
    CodeText,
    Link,
    MaskedLink,
    Blockquote,
    UnorderedListItem,
}

/// Which constructs the tokenizer recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Top-level message text: everything.
    Document,
    /// Body of a `>>>` quote: no nested quotes.
    Quoted,
    /// Header/list/quote lines and masked link text: no line-level constructs.
    Inline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Payload: text for runs and headers, code for code spans, the URL for
    /// links, and the raw source for mentions, emoji and masked links.
    pub value: String,
    /// Byte range of the source covered by this token, markers included.
    pub span: Range<usize>,
}

/// Parsed pieces of a custom emoji token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmojiParts<'a> {
    pub name: &'a str,
    pub id: u64,
    pub animated: bool,
}

impl Token {
    /// ID carried by a mention, channel link or emoji token.
    pub fn snowflake(&self) -> Option<u64> {
        match self.kind {
            TokenKind::AtUser | TokenKind::AtRole | TokenKind::ChannelLink | TokenKind::Emoji => {
                let inner = self.value.strip_suffix('>')?;
                let start = inner
                    .rfind(|c: char| !c.is_ascii_digit())
                    .map(|i| i + 1)
                    .unwrap_or(0);
                inner[start..].parse().ok()
            }
            _ => None,
        }
    }

    /// `(text, url)` of a masked link token.
    pub fn masked_parts(&self) -> Option<(&str, &str)> {
        if self.kind != TokenKind::MaskedLink {
            return None;
        }
        let caps = MASKED_LINK.captures(&self.value)?;
        Some((caps.name("text")?.as_str(), caps.name("link")?.as_str()))
    }

    /// Whether a blockquote came from `>>> ` (rest of the message) rather
    /// than a single `> ` line. The markers are not part of the value, so the
    /// form shows in the span: `>>> ` is four bytes, `> ` plus its newline at
    /// most three.
    pub fn is_multiline_quote(&self) -> bool {
        self.kind == TokenKind::Blockquote
            && self.span.len() == self.value.len() + MULTI_QUOTE_MARKER.len()
    }

    pub fn emoji_parts(&self) -> Option<EmojiParts<'_>> {
        if self.kind != TokenKind::Emoji {
            return None;
        }
        let caps = EMOJI.captures(&self.value)?;
        Some(EmojiParts {
            name: caps.name("name")?.as_str(),
            id: caps.name("id")?.as_str().parse().ok()?,
            animated: !caps.name("animated")?.as_str().is_empty(),
        })
    }
}

/// Tokenize top-level message text.
pub fn tokenize(text: &str) -> Vec<Token> {
    Tokenizer::new(text, Mode::Document).tokenize()
}

pub fn tokenize_with(text: &str, mode: Mode) -> Vec<Token> {
    Tokenizer::new(text, mode).tokenize()
}

struct Matched {
    kind: TokenKind,
    value: String,
    len: usize,
}

impl Matched {
    fn new(kind: TokenKind, value: impl Into<String>, len: usize) -> Self {
        Self {
            kind,
            value: value.into(),
            len,
        }
    }
}

pub struct Tokenizer<'a> {
    text: &'a str,
    mode: Mode,
    idx: usize,
    run_start: Option<usize>,
    tokens: Vec<Token>,
}

impl<'a> Tokenizer<'a> {
    pub fn new(text: &'a str, mode: Mode) -> Self {
        Self {
            text,
            mode,
            idx: 0,
            run_start: None,
            tokens: Vec::new(),
        }
    }

    pub fn tokenize(mut self) -> Vec<Token> {
        let text = self.text;
        while let Some(ch) = text[self.idx..].chars().next() {
            let rest = &text[self.idx..];
            let matched = match ch {
                '`' => self.code(rest),
                '<' => self.angle(rest),
                '#' => self.header(rest),
                '>' => self.blockquote(rest),
                '*' | '-' => self.list_item(rest),
                '[' => self.masked_link(rest),
                'h' | 'H' => self.bare_link(rest),
                _ => None,
            };

            match matched {
                Some(m) => {
                    self.flush_text();
                    let start = self.idx;
                    self.idx += m.len;
                    self.tokens.push(Token {
                        kind: m.kind,
                        value: m.value,
                        span: start..self.idx,
                    });
                }
                None => {
                    self.run_start.get_or_insert(self.idx);
                    self.idx += ch.len_utf8();
                }
            }
        }
        self.flush_text();
        self.tokens
    }

    fn flush_text(&mut self) {
        if let Some(start) = self.run_start.take() {
            self.tokens.push(Token {
                kind: TokenKind::Text,
                value: self.text[start..self.idx].to_string(),
                span: start..self.idx,
            });
        }
    }

    fn at_line_start(&self) -> bool {
        self.idx == 0 || self.text.as_bytes()[self.idx - 1] == b'\n'
    }

    fn at_word_boundary(&self) -> bool {
        self.text[..self.idx]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric())
    }

    fn code(&self, rest: &str) -> Option<Matched> {
        if let Some(body) = rest.strip_prefix(CODE_BLOCK_FENCE) {
            if let Some(end) = body.find(CODE_BLOCK_FENCE).filter(|&end| end > 0) {
                let code = &body[..end];
                let code = code.strip_prefix('\n').unwrap_or(code);
                let code = code.strip_suffix('\n').unwrap_or(code);
                return Some(Matched::new(
                    TokenKind::CodeBlock,
                    code,
                    end + 2 * CODE_BLOCK_FENCE.len(),
                ));
            }
        }

        let body = &rest[CODE_TEXT_FENCE.len_utf8()..];
        match body.find(CODE_TEXT_FENCE) {
            Some(end) if end > 0 => Some(Matched::new(
                TokenKind::CodeText,
                &body[..end],
                end + 2 * CODE_TEXT_FENCE.len_utf8(),
            )),
            _ => None,
        }
    }

    fn angle(&self, rest: &str) -> Option<Matched> {
        let after = &rest[1..];
        let mention = match after.chars().next()? {
            '@' if after[1..].starts_with('&') => Self::raw(&AT_ROLE, rest, TokenKind::AtRole),
            '@' => Self::raw(&AT_USER, rest, TokenKind::AtUser),
            '#' => Self::raw(&CHANNEL_LINK, rest, TokenKind::ChannelLink),
            ':' | 'a' => Self::raw(&EMOJI, rest, TokenKind::Emoji),
            _ => None,
        };

        mention.or_else(|| {
            let caps = ODD_LINK.captures(rest)?;
            let whole = caps.get(0)?;
            Some(Matched::new(TokenKind::Link, &caps["link"], whole.len()))
        })
    }

    fn raw(re: &Regex, rest: &str, kind: TokenKind) -> Option<Matched> {
        re.find(rest)
            .map(|m| Matched::new(kind, m.as_str(), m.len()))
    }

    fn header(&self, rest: &str) -> Option<Matched> {
        if self.mode == Mode::Inline || !self.at_line_start() {
            return None;
        }
        let caps = HEADER.captures(rest)?;
        let kind = match caps["level"].len() {
            1 => TokenKind::Header1,
            2 => TokenKind::Header2,
            _ => TokenKind::Header3,
        };
        Some(Matched::new(kind, &caps["value"], caps.get(0)?.len()))
    }

    fn blockquote(&self, rest: &str) -> Option<Matched> {
        if self.mode != Mode::Document || !self.at_line_start() {
            return None;
        }
        MULTI_QUOTE
            .captures(rest)
            .or_else(|| QUOTE.captures(rest))
            .and_then(|caps| {
                Some(Matched::new(
                    TokenKind::Blockquote,
                    &caps["value"],
                    caps.get(0)?.len(),
                ))
            })
    }

    fn list_item(&self, rest: &str) -> Option<Matched> {
        if self.mode == Mode::Inline || !self.at_line_start() {
            return None;
        }
        let caps = LIST_ITEM.captures(rest)?;
        Some(Matched::new(
            TokenKind::UnorderedListItem,
            &caps["value"],
            caps.get(0)?.len(),
        ))
    }

    fn masked_link(&self, rest: &str) -> Option<Matched> {
        Self::raw(&MASKED_LINK, rest, TokenKind::MaskedLink)
    }

    fn bare_link(&self, rest: &str) -> Option<Matched> {
        if !self.at_word_boundary() {
            return None;
        }
        Self::raw(&LINK, rest, TokenKind::Link)
    }
}
