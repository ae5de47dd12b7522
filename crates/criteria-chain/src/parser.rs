//! Chained element id parser implementation using nom.
//!
//! Grammar:
//!
//! ```text
//! chain ::= "(" chain ")" ("." id)*
//!         | id
//! ```
//!
//! Tokenizing is done with nom; the token stream is then consumed by a small
//! recursive-descent parser that builds a [`ChainNode`] tree.

use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char, multispace0},
    combinator::{all_consuming, map},
    multi::many0,
    sequence::{preceded, terminated},
    IResult,
};

use crate::ast::{ChainNode, CompositeId};
use crate::error::{ChainError, ChainResult};
use crate::fhirpath::matching_close;

/// Parse a chained element id and flatten it into the resolver's token sequence.
///
/// Continuation ids lose their leading `.`.
///
/// # Examples
///
/// ```rust
/// use criteria_chain::parse;
///
/// let tokens = parse("(A.b:slice).c[x]").unwrap();
/// assert_eq!(tokens, vec!["A.b:slice", "c[x]"]);
///
/// assert_eq!(parse("Condition.code.coding").unwrap(), vec!["Condition.code.coding"]);
/// assert!(parse("(").is_err());
/// assert!(parse(")").is_err());
/// ```
pub fn parse(input: &str) -> ChainResult<Vec<String>> {
    parse_tree(input).map(|tree| tree.flatten())
}

/// Parse a chained element id into its nested tree form.
pub fn parse_tree(input: &str) -> ChainResult<ChainNode> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(ChainError::Empty);
    }

    let mut parser = Parser { tokens: &tokens, pos: 0 };
    let node = parser.chain()?;
    match parser.peek() {
        None => Ok(node),
        Some(token) => Err(parser.unexpected(token)),
    }
}

/// Split a composite attribute id `P.where(Q)<rest>` into its two sides.
///
/// Returns `Ok(None)` if the id has no `.where(...)` clause.
///
/// ```rust
/// use criteria_chain::parse_composite;
///
/// let composite = parse_composite(
///     "Observation.component.where(Observation.component:systolic.code):systolic.value[x]",
/// )
/// .unwrap()
/// .unwrap();
/// assert_eq!(composite.value, "Observation.component:systolic.value[x]");
/// assert_eq!(composite.qualifier, "Observation.component:systolic.code");
/// ```
pub fn parse_composite(id: &str) -> ChainResult<Option<CompositeId>> {
    let id = id.trim();
    let Some(start) = id.find(".where(") else {
        return Ok(None);
    };
    let open = start + ".where".len();
    let close = matching_close(id, open).ok_or(ChainError::UnclosedOpen { position: open })?;

    let qualifier = id[open + 1..close].trim();
    if qualifier.is_empty() {
        return Err(ChainError::EmptyGroup { position: open });
    }

    let base = &id[..start];
    let rest = &id[close + 1..];
    if !(rest.is_empty() || rest.starts_with(':') || rest.starts_with('.')) {
        return Err(ChainError::UnexpectedToken {
            position: close + 1,
            token: rest.to_string(),
        });
    }

    Ok(Some(CompositeId {
        value: format!("{base}{rest}"),
        qualifier: qualifier.to_string(),
    }))
}

// ============================================================================
// Tokenizer
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenKind<'a> {
    Open,
    Close,
    Id(&'a str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Token<'a> {
    kind: TokenKind<'a>,
    position: usize,
}

fn token(input: &str) -> IResult<&str, TokenKind<'_>> {
    alt((
        map(char('('), |_| TokenKind::Open),
        map(char(')'), |_| TokenKind::Close),
        map(
            take_while1(|c: char| !c.is_whitespace() && c != '(' && c != ')'),
            TokenKind::Id,
        ),
    ))(input)
}

fn spanned<'a>(input: &'a str) -> impl FnMut(&'a str) -> IResult<&'a str, Token<'a>> {
    move |rest: &'a str| {
        let position = input.len() - rest.len();
        let (rest, kind) = token(rest)?;
        Ok((rest, Token { kind, position }))
    }
}

fn tokenize(input: &str) -> ChainResult<Vec<Token<'_>>> {
    let result = all_consuming(preceded(
        multispace0,
        many0(terminated(spanned(input), multispace0)),
    ))(input);

    match result {
        Ok((_, tokens)) => Ok(tokens),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(ChainError::Tokenize {
            position: input.len() - e.input.len(),
            message: format!("unexpected input at: '{}'", e.input),
        }),
        Err(nom::Err::Incomplete(_)) => Err(ChainError::Tokenize {
            position: input.len(),
            message: "incomplete input".to_string(),
        }),
    }
}

// ============================================================================
// Recursive descent
// ============================================================================

struct Parser<'t, 'a> {
    tokens: &'t [Token<'a>],
    pos: usize,
}

impl<'a> Parser<'_, 'a> {
    fn peek(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&Token<'a>> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn unexpected(&self, token: &Token<'_>) -> ChainError {
        match token.kind {
            TokenKind::Close => ChainError::UnmatchedClose {
                position: token.position,
            },
            TokenKind::Open => ChainError::UnexpectedToken {
                position: token.position,
                token: "(".to_string(),
            },
            TokenKind::Id(text) => ChainError::UnexpectedToken {
                position: token.position,
                token: text.to_string(),
            },
        }
    }

    fn chain(&mut self) -> ChainResult<ChainNode> {
        let Some(token) = self.next().cloned() else {
            return Err(ChainError::Empty);
        };
        match token.kind {
            TokenKind::Id(text) if text.starts_with('.') => Err(self.unexpected(&token)),
            TokenKind::Id(text) => Ok(ChainNode::Id(text.to_string())),
            TokenKind::Close => Err(ChainError::UnmatchedClose {
                position: token.position,
            }),
            TokenKind::Open => self.group(token.position),
        }
    }

    fn group(&mut self, open: usize) -> ChainResult<ChainNode> {
        match self.peek() {
            None => return Err(ChainError::UnclosedOpen { position: open }),
            Some(Token {
                kind: TokenKind::Close,
                ..
            }) => return Err(ChainError::EmptyGroup { position: open }),
            Some(_) => {}
        }

        let inner = self.chain()?;
        match self.next().cloned() {
            Some(Token {
                kind: TokenKind::Close,
                ..
            }) => {}
            Some(other) => return Err(self.unexpected(&other)),
            None => return Err(ChainError::UnclosedOpen { position: open }),
        }

        let mut children = vec![inner];
        while let Some(token) = self.peek().cloned() {
            match token.kind {
                TokenKind::Id(text) => match text.strip_prefix('.') {
                    Some(id) if !id.is_empty() => {
                        self.pos += 1;
                        children.push(ChainNode::Id(id.to_string()));
                    }
                    _ => return Err(self.unexpected(&token)),
                },
                _ => break,
            }
        }
        Ok(ChainNode::Group(children))
    }
}
