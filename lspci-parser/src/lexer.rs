//! Splitting of a normalized report into device blocks and logical fields.
//!
//! A field opens on a `label: value` or `label:\tvalue` line and may continue over
//! several physical lines. Lines indented deeper than the field that precedes them are
//! its children, so every block turns into a small tree of [`TokenNode`]s.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, line_ending, not_line_ending},
    combinator::{all_consuming, eof, map, not, opt, value},
    multi::{many0, many0_count},
    sequence::{pair, preceded, terminated},
    Finish, IResult,
};
use nom_locate::LocatedSpan;

use crate::errors::Error;

type Span<'s> = LocatedSpan<&'s str>;

/// One logical field: its text in `label: value` form and the line it opened on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub line: u32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenNode {
    Leaf(Token),
    Group(Token, Vec<TokenNode>),
}

impl TokenNode {
    pub fn token(&self) -> &Token {
        match self {
            TokenNode::Leaf(token) | TokenNode::Group(token, _) => token,
        }
    }

    /// The text of this node and all of its descendants, joined with `, `.
    pub fn flatten(&self) -> String {
        match self {
            TokenNode::Leaf(token) => token.text.clone(),
            TokenNode::Group(token, children) => std::iter::once(token.text.clone())
                .chain(children.iter().map(TokenNode::flatten))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

/// The lines of a single device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub header: Token,
    pub body: Vec<TokenNode>,
}

/// Split a normalized report into device blocks.
pub fn tokenize(source: &str) -> Result<Vec<Block>, Error> {
    let mut blocks = Vec::new();
    let mut current: Option<(Token, Vec<Line>)> = None;

    for raw in physical_lines(source)? {
        if raw.body.trim().is_empty() {
            if let Some((header, lines)) = current.take() {
                blocks.push(Block {
                    header,
                    body: group(lines)?,
                });
            }
            continue;
        }

        match &mut current {
            None if raw.indent > 0 => {
                return Err(Error::format(raw.number, "header-less block", raw.body))
            }
            None => {
                current = Some((
                    Token {
                        line: raw.number,
                        text: raw.body.to_string(),
                    },
                    Vec::new(),
                ))
            }
            Some(_) if raw.indent == 0 => {
                return Err(Error::format(
                    raw.number,
                    "unindented continuation",
                    raw.body,
                ))
            }
            Some((_, lines)) => lines.push(Line {
                number: raw.number,
                indent: raw.indent - 1,
                text: raw.body.to_string(),
            }),
        }
    }

    if let Some((header, lines)) = current {
        blocks.push(Block {
            header,
            body: group(lines)?,
        });
    }

    Ok(blocks)
}

/// A physical line, split into its leading tabs and the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RawLine<'s> {
    number: u32,
    indent: usize,
    body: &'s str,
}

/// A line inside a block, with its indentation relative to the enclosing level.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Line {
    number: u32,
    indent: usize,
    text: String,
}

impl Line {
    fn append(&mut self, continuation: &str) {
        if !self.text.ends_with(": ") {
            self.text.push_str(", ");
        }
        self.text.push_str(continuation.trim());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Separator {
    /// `label: value`, continued by lines starting with a tab and a space.
    Space,
    /// `label:\tvalue`, continued by any more deeply indented line.
    Tab,
}

/// Merge continuation lines into the field they belong to, then nest deeper fields
/// under the field preceding them.
fn group(lines: Vec<Line>) -> Result<Vec<TokenNode>, Error> {
    let mut merged = merge(lines)?.into_iter().peekable();
    let mut nodes = Vec::new();

    while let Some(line) = merged.next() {
        if line.indent > 0 {
            return Err(Error::format(
                line.number,
                "indented field without a parent",
                line.text,
            ));
        }

        let mut nested = Vec::new();
        while let Some(child) = merged.next_if(|l| l.indent > 0) {
            nested.push(Line {
                indent: child.indent - 1,
                ..child
            });
        }

        let token = Token {
            line: line.number,
            text: line.text,
        };
        nodes.push(if nested.is_empty() {
            TokenNode::Leaf(token)
        } else {
            TokenNode::Group(token, group(nested)?)
        });
    }

    Ok(nodes)
}

fn merge(lines: Vec<Line>) -> Result<Vec<Line>, Error> {
    let mut merged: Vec<Line> = Vec::new();
    let mut mode = None;

    for line in lines {
        if mode == Some(Separator::Space) && line.indent > 0 && line.text.starts_with(' ') {
            if let Some(last) = merged.last_mut() {
                last.append(&line.text);
                continue;
            }
        }

        if let Some((label, separator, rest)) = field_opening(&line.text) {
            let text = format!("{label}: {rest}");
            merged.push(Line { text, ..line });
            mode = Some(separator);
            continue;
        }

        match (mode, merged.last_mut()) {
            (Some(Separator::Tab), Some(last)) if line.indent > 0 => last.append(&line.text),
            _ => return Err(Error::format(line.number, "malformed field", line.text)),
        }
    }

    Ok(merged)
}

/// Recognize the label and separator a field opens with.
fn field_opening(text: &str) -> Option<(&str, Separator, &str)> {
    let label = take_while1(|c: char| c.is_ascii_alphanumeric() || c == ' ' || c == '/');
    let separator = alt((
        value(Separator::Space, tag(": ")),
        value(Separator::Tab, tag(":\t")),
    ));

    let result: IResult<&str, _> = pair(label, separator)(text);
    result
        .ok()
        .map(|(rest, (label, separator))| (label, separator, rest))
}

/// Split the source into lines, counting the leading tabs of each.
fn physical_lines<'s>(source: &'s str) -> Result<Vec<RawLine<'s>>, Error> {
    let line = map(
        terminated(
            pair(many0_count(char('\t')), not_line_ending),
            opt(line_ending),
        ),
        |(indent, body): (usize, Span<'s>)| RawLine {
            number: body.location_line(),
            indent,
            body: *body.fragment(),
        },
    );

    all_consuming(many0(preceded(not(eof), line)))(Span::new(source))
        .finish()
        .map(|(_, lines)| lines)
        .map_err(|e: nom::error::Error<Span<'s>>| {
            Error::format(
                e.input.location_line(),
                "invalid line ending",
                e.input.fragment().lines().next().unwrap_or_default(),
            )
        })
}
