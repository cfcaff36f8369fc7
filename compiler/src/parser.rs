// parser.rs — Parser for textual network descriptions (.nl)
//
// Grammar:
//
//   network    := 'network' IDENT '{' item* '}'
//   item       := instance | connection
//   instance   := 'instance' IDENT ':' IDENT ('(' (param (',' param)*)? ')')? ';'
//   param      := IDENT '=' literal
//   connection := IDENT '.' IDENT '->' IDENT '.' IDENT ('{' (param (',' param)*)? '}')? ';'
//   literal    := 'true' | 'false' | INT | STRING | '[' (literal (',' literal)*)? ']'
//
// Instances and connections may interleave; referential checks happen when
// the network is built, after the whole description is read.
//
// Preconditions: input is a valid token stream from `lexer::lex()`.
// Postconditions: returns a `NetworkDecl` plus any parse errors (non-fatal).
// Failure modes: syntax errors produce `Rich` diagnostics.
// Side effects: none.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;
use indexmap::IndexMap;

use crate::ast::*;
use crate::lexer::Token;

/// Result of parsing: network description plus any errors.
#[derive(Debug)]
pub struct ParseResult {
    pub network: Option<NetworkDecl>,
    pub errors: Vec<Rich<'static, Token, SimpleSpan>>,
}

/// Parse a network description. Lexes then parses.
pub fn parse(source: &str) -> ParseResult {
    let lex_result = crate::lexer::lex(source);
    let len = source.len();

    let token_iter = lex_result.tokens.into_iter().map(|(tok, span)| {
        let cspan: SimpleSpan = (span.start..span.end).into();
        (tok, cspan)
    });
    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(token_iter).map(eoi, |(t, s): (_, _)| (t, s));

    let parser = network_parser(source);
    let (network, parse_errors) = parser.parse(stream).into_output_errors();

    let mut all_errors: Vec<Rich<'static, Token, SimpleSpan>> = lex_result
        .errors
        .into_iter()
        .map(|e| {
            let span: SimpleSpan = (e.span.start..e.span.end).into();
            Rich::custom(span, e.message)
        })
        .collect();
    all_errors.extend(parse_errors.into_iter().map(|e| e.into_owned()));

    ParseResult {
        network,
        errors: all_errors,
    }
}

enum Item {
    Instance(InstanceDecl),
    Connection(ConnectionDecl),
}

// ── Parser builder ──
//
// All rules are built inside `network_parser` so that `source` is captured
// once and shared by every combinator.

fn network_parser<'tokens, 'src: 'tokens, I>(
    source: &'src str,
) -> impl Parser<'tokens, I, NetworkDecl, extra::Err<Rich<'tokens, Token, SimpleSpan>>> + 'src
where
    'tokens: 'src,
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    // ── Identifier ──

    let ident = just(Token::Ident).map_with(move |_, e| {
        let span: SimpleSpan = e.span();
        source[span.start()..span.end()].to_string()
    });

    // ── Literal ──

    let literal = recursive(|literal| {
        let list = literal
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LBracket), just(Token::RBracket))
            .map(Literal::List);

        select! {
            Token::True => Literal::Bool(true),
            Token::False => Literal::Bool(false),
            Token::Int(v) => Literal::Int(v),
            Token::StringLit(s) => Literal::Str(s),
        }
        .or(list)
    });

    // ── name = literal, ... ──

    let params = ident
        .clone()
        .then_ignore(just(Token::Equals))
        .then(literal)
        .separated_by(just(Token::Comma))
        .allow_trailing()
        .collect::<Vec<(String, Literal)>>()
        .map(|pairs| pairs.into_iter().collect::<IndexMap<_, _>>());

    // ── Instance ──

    let instance = just(Token::Instance)
        .ignore_then(ident.clone())
        .then_ignore(just(Token::Colon))
        .then(ident.clone())
        .then(
            params
                .clone()
                .delimited_by(just(Token::LParen), just(Token::RParen))
                .or_not(),
        )
        .then_ignore(just(Token::Semi))
        .map_with(|((id, class), params), e| {
            Item::Instance(InstanceDecl {
                id,
                class,
                params: params.unwrap_or_default(),
                span: Some(e.span()),
            })
        });

    // ── Connection ──

    let endpoint = ident
        .clone()
        .then_ignore(just(Token::Dot))
        .then(ident.clone());

    let connection = endpoint
        .clone()
        .then_ignore(just(Token::Arrow))
        .then(endpoint)
        .then(
            params
                .delimited_by(just(Token::LBrace), just(Token::RBrace))
                .or_not(),
        )
        .then_ignore(just(Token::Semi))
        .map_with(|(((src, src_port), (dst, dst_port)), attributes), e| {
            Item::Connection(ConnectionDecl {
                src,
                src_port,
                dst,
                dst_port,
                attributes: attributes.unwrap_or_default(),
                span: Some(e.span()),
            })
        });

    // ── Network ──

    just(Token::Network)
        .ignore_then(ident)
        .then(
            instance
                .or(connection)
                .repeated()
                .collect::<Vec<_>>()
                .delimited_by(just(Token::LBrace), just(Token::RBrace)),
        )
        .map_with(|(name, items), e| {
            let mut network = NetworkDecl::new(name);
            for item in items {
                match item {
                    Item::Instance(i) => network.instances.push(i),
                    Item::Connection(c) => network.connections.push(c),
                }
            }
            network.span = Some(e.span());
            network
        })
}

// ── Tests ──
