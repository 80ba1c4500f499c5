use std::iter::Enumerate;
use std::str::Lines;

use nom::{
    branch::alt,
    bytes::complete::{is_a, tag},
    character::{
        complete::{digit1, space1},
        is_digit,
    },
    combinator::{all_consuming, map, map_res, value, verify},
    sequence::tuple,
    IResult,
};

use crate::ast::{ArithmeticOp::*, Command::*, Segment::*, *};
use crate::error::{Error, Result};

fn integer(input: &str) -> IResult<&str, u16> {
    map_res(digit1, |c: &str| c.parse())(input)
}

fn segment(input: &str) -> IResult<&str, Segment> {
    alt((
        value(Constant, tag("constant")),
        value(Local, tag("local")),
        value(Static, tag("static")),
        value(Argument, tag("argument")),
        value(This, tag("this")),
        value(That, tag("that")),
        value(Pointer, tag("pointer")),
        value(Temp, tag("temp")),
    ))(input)
}

fn push(input: &str) -> IResult<&str, Command> {
    map(
        tuple((tag("push"), space1, segment, space1, integer)),
        |(_, _, segment, _, arg)| Push(segment, arg),
    )(input)
}

#[test]
fn test_push() {
    assert_eq!(push("push  pointer  32"), Ok(("", Push(Pointer, 32))));
}

// `pop constant` is well-formed here; the translator rejects it.
fn pop(input: &str) -> IResult<&str, Command> {
    map(
        tuple((tag("pop"), space1, segment, space1, integer)),
        |(_, _, segment, _, arg)| Pop(segment, arg),
    )(input)
}

fn prim(input: &str) -> IResult<&str, Command> {
    map(
        alt((
            value(Add, tag("add")),
            value(Sub, tag("sub")),
            value(Neg, tag("neg")),
            value(Eq, tag("eq")),
            value(Gt, tag("gt")),
            value(Lt, tag("lt")),
            value(And, tag("and")),
            value(Or, tag("or")),
            value(Not, tag("not")),
        )),
        Arithmetic,
    )(input)
}

#[test]
fn test_prim() {
    assert_eq!(prim("neg"), Ok(("", Arithmetic(Neg))));
}

fn symbol(input: &str) -> IResult<&str, String> {
    map(
        verify(
            is_a("abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ_.$:0123456789"),
            |c: &str| !is_digit(c.as_bytes()[0]),
        ),
        |sym: &str| sym.to_string(),
    )(input)
}

fn branching(input: &str) -> IResult<&str, Command> {
    alt((
        map(tuple((tag("label"), space1, symbol)), |(_, _, sym)| Label(sym)),
        map(tuple((tag("goto"), space1, symbol)), |(_, _, sym)| Goto(sym)),
        map(tuple((tag("if-goto"), space1, symbol)), |(_, _, sym)| {
            IfGoto(sym)
        }),
    ))(input)
}

#[test]
fn test_branching() {
    assert_eq!(
        branching("if-goto LOOP_START"),
        Ok(("", IfGoto("LOOP_START".to_string())))
    );
}

fn function(input: &str) -> IResult<&str, Command> {
    alt((
        map(
            tuple((tag("function"), space1, symbol, space1, integer)),
            |(_, _, name, _, locals)| Function(name, locals),
        ),
        map(
            tuple((tag("call"), space1, symbol, space1, integer)),
            |(_, _, name, _, args)| Call(name, args),
        ),
        value(Return, tag("return")),
    ))(input)
}

#[test]
fn test_function() {
    assert_eq!(
        function("function Main.fibonacci 0"),
        Ok(("", Function("Main.fibonacci".to_string(), 0)))
    );
    assert_eq!(
        function("call Sys.init\t0"),
        Ok(("", Call("Sys.init".to_string(), 0)))
    );
}

fn command(input: &str) -> IResult<&str, Command> {
    alt((push, pop, prim, branching, function))(input)
}

/// Expected shape of a line, keyed by its first token.
fn usage(keyword: &str) -> Option<&'static str> {
    Some(match keyword {
        "add" | "sub" | "neg" | "eq" | "gt" | "lt" | "and" | "or" | "not" | "return" => {
            "expected no arguments"
        }
        "push" => "expected `push <segment> <index>`",
        "pop" => "expected `pop <segment> <index>`",
        "label" => "expected `label <symbol>`",
        "goto" => "expected `goto <symbol>`",
        "if-goto" => "expected `if-goto <symbol>`",
        "function" => "expected `function <name> <locals>`",
        "call" => "expected `call <name> <args>`",
        _ => return None,
    })
}

/// Drops a trailing `//` comment and surrounding whitespace.
fn strip(line: &str) -> &str {
    line.split_once("//").map(|(s, _)| s).unwrap_or(line).trim()
}

fn parse_line(unit: &str, line: usize, text: &str) -> Result<SourceCommand> {
    let syntax_error = |reason: String| Error::Syntax {
        unit: unit.to_string(),
        line,
        text: text.to_string(),
        reason,
    };

    let keyword = text.split_whitespace().next().unwrap_or_default();
    let expected = usage(keyword)
        .ok_or_else(|| syntax_error(format!("unknown command `{}`", keyword)))?;

    match all_consuming(command)(text) {
        Ok((_, command)) => Ok(SourceCommand { line, command }),
        Err(_) => Err(syntax_error(expected.to_string())),
    }
}

/// Single-pass command reader over one translation unit.
///
/// Blank and comment-only lines are skipped; every other line yields one
/// command or a syntax error carrying the unit name and line number.
pub struct Parser<'a> {
    unit: &'a str,
    lines: Enumerate<Lines<'a>>,
}

impl<'a> Parser<'a> {
    pub fn new(unit: &'a str, input: &'a str) -> Self {
        Parser {
            unit,
            lines: input.lines().enumerate(),
        }
    }
}

impl<'a> Iterator for Parser<'a> {
    type Item = Result<SourceCommand>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (index, raw) = self.lines.next()?;
            let text = strip(raw);
            if text.is_empty() {
                continue;
            }
            return Some(parse_line(self.unit, index + 1, text));
        }
    }
}

/// Parses a whole unit, stopping at the first malformed line.
pub fn parse(unit: &str, input: &str) -> Result<Vec<SourceCommand>> {
    Parser::new(unit, input).collect()
}
