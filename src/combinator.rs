//! Backtracking parser combinators.
//!
//! A [`Parser<T>`] is a shared function from an [`Input`] position to a
//! three-valued [`Reply`]: success with the remaining input, a recoverable
//! failure, or a fatal error. Alternation only ever backtracks over failures;
//! [`Parser::commit`] turns a failure into an error once a prefix has been
//! recognized for certain.
//!
//! Every token-level primitive first skips ignorable text (whitespace and
//! `%` comments by default) using the rule held by the [`Context`]. The
//! context also owns the one piece of shared mutable state: the deepest
//! failure seen during the current top-level parse, which survives
//! backtracking and becomes the reported diagnostic.

use std::borrow::Cow;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use regex::Regex;

use crate::host::{Host, TextHandle};

/// Default ignorable text: whitespace and `%` line comments.
pub const DEFAULT_IGNORABLE: &str = r"(?:\s|%[^\n]*)*";

/// Deepest failure recorded during one top-level parse.
#[derive(Clone, Debug, PartialEq)]
pub struct Deepest {
    pub offset: usize,
    pub message: String,
}

/// Per-parse shared state: host callbacks, the ignorable rule and the
/// diagnostic accumulator.
pub struct Context<'a> {
    host: &'a dyn Host,
    ignorable: Option<Regex>,
    deepest: RefCell<Option<Deepest>>,
    texts: RefCell<HashMap<(usize, String), TextHandle>>,
}

impl<'a> Context<'a> {
    pub fn new(host: &'a dyn Host) -> Self {
        Self {
            host,
            ignorable: anchored(DEFAULT_IGNORABLE).ok(),
            deepest: RefCell::new(None),
            texts: RefCell::new(HashMap::new()),
        }
    }

    /// Replace the rule skipped before every token.
    pub fn with_ignorable(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.ignorable = Some(anchored(pattern)?);
        Ok(self)
    }

    pub fn host(&self) -> &'a dyn Host {
        self.host
    }

    /// Hand a text fragment found at `offset` to the host. Re-parsing the
    /// same fragment after backtracking reuses the first handle.
    pub fn create_text(&self, offset: usize, source: &str) -> TextHandle {
        *self
            .texts
            .borrow_mut()
            .entry((offset, source.to_string()))
            .or_insert_with(|| self.host.create_text(source))
    }

    /// The deepest failure recorded so far, if any.
    pub fn deepest(&self) -> Option<Deepest> {
        self.deepest.borrow().clone()
    }

    fn record(&self, offset: usize, message: &str) {
        let mut deepest = self.deepest.borrow_mut();
        // Ties keep the first message recorded at that offset.
        if deepest.as_ref().is_none_or(|d| offset > d.offset) {
            *deepest = Some(Deepest {
                offset,
                message: message.to_string(),
            });
        }
    }
}

impl fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("ignorable", &self.ignorable.as_ref().map(Regex::as_str))
            .field("deepest", &self.deepest.borrow())
            .finish()
    }
}

fn anchored(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{pattern})"))
}

/// An immutable position in the source text.
#[derive(Clone, Copy)]
pub struct Input<'a> {
    text: &'a str,
    offset: usize,
    ctx: &'a Context<'a>,
}

impl<'a> Input<'a> {
    pub fn new(text: &'a str, ctx: &'a Context<'a>) -> Self {
        Self {
            text,
            offset: 0,
            ctx,
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The full source text.
    pub fn text(&self) -> &'a str {
        self.text
    }

    /// Text from this position to the end.
    pub fn rest(&self) -> &'a str {
        &self.text[self.offset..]
    }

    pub fn context(&self) -> &'a Context<'a> {
        self.ctx
    }

    pub fn is_at_end(&self) -> bool {
        self.offset >= self.text.len()
    }

    /// Move forward by `bytes`, which must land on a char boundary.
    pub fn advance(self, bytes: usize) -> Input<'a> {
        Input {
            offset: (self.offset + bytes).min(self.text.len()),
            ..self
        }
    }

    /// Skip the context's ignorable text.
    pub fn skip_ignorable(self) -> Input<'a> {
        match self.ctx.ignorable.as_ref().and_then(|re| re.find(self.rest())) {
            Some(m) => self.advance(m.end()),
            None => self,
        }
    }

    /// 1-based line and column, computed on demand.
    pub fn line_column(&self) -> (usize, usize) {
        let before = &self.text[..self.offset];
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map_or(0, |i| i + 1);
        (line, before[line_start..].chars().count() + 1)
    }

    /// Fail softly here, recording the failure with the context.
    pub fn fail<T>(self, message: impl Into<Cow<'static, str>>) -> Reply<'a, T> {
        let failed = Failed::new(message, self);
        self.ctx.record(self.offset, &failed.message);
        Reply::Failure(failed)
    }
}

impl fmt::Debug for Input<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (line, column) = self.line_column();
        write!(f, "Input({line}.{column})")
    }
}

impl PartialEq for Input<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.offset == other.offset
    }
}

impl Eq for Input<'_> {}

impl PartialOrd for Input<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Input<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.offset.cmp(&other.offset)
    }
}

/// Why a parser did not succeed, and where.
#[derive(Clone, Debug)]
pub struct Failed<'a> {
    pub message: Cow<'static, str>,
    pub at: Input<'a>,
}

impl<'a> Failed<'a> {
    pub fn new(message: impl Into<Cow<'static, str>>, at: Input<'a>) -> Self {
        Self {
            message: message.into(),
            at,
        }
    }
}

/// Result of running a parser.
#[derive(Debug)]
pub enum Reply<'a, T> {
    Success(T, Input<'a>),
    /// Recoverable: alternation tries the next branch.
    Failure(Failed<'a>),
    /// Fatal: aborts every enclosing alternation.
    Error(Failed<'a>),
}

impl<'a, T> Reply<'a, T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Reply<'a, U> {
        match self {
            Reply::Success(v, rest) => Reply::Success(f(v), rest),
            Reply::Failure(e) => Reply::Failure(e),
            Reply::Error(e) => Reply::Error(e),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Reply::Success(..))
    }

    pub fn into_result(self) -> Result<(T, Input<'a>), Failed<'a>> {
        match self {
            Reply::Success(v, rest) => Ok((v, rest)),
            Reply::Failure(e) | Reply::Error(e) => Err(e),
        }
    }
}

type ParseFn<T> = dyn for<'a> Fn(Input<'a>) -> Reply<'a, T>;

/// A parser producing `T`. Cloning shares the underlying function.
pub struct Parser<T>(Rc<ParseFn<T>>);

impl<T> Clone for Parser<T> {
    fn clone(&self) -> Self {
        Parser(Rc::clone(&self.0))
    }
}

impl<T> fmt::Debug for Parser<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Parser")
    }
}

impl<T: 'static> Parser<T> {
    pub fn new<F>(f: F) -> Self
    where
        F: for<'a> Fn(Input<'a>) -> Reply<'a, T> + 'static,
    {
        Parser(Rc::new(f))
    }

    pub fn parse<'a>(&self, input: Input<'a>) -> Reply<'a, T> {
        (self.0)(input)
    }

    pub fn map<U: 'static>(self, f: impl Fn(T) -> U + 'static) -> Parser<U> {
        Parser::new(move |input| self.parse(input).map(&f))
    }

    /// Monadic bind: the next parser is chosen from the value just parsed.
    pub fn flat_map<U: 'static>(self, f: impl Fn(T) -> Parser<U> + 'static) -> Parser<U> {
        Parser::new(move |input| match self.parse(input) {
            Reply::Success(v, rest) => f(v).parse(rest),
            Reply::Failure(e) => Reply::Failure(e),
            Reply::Error(e) => Reply::Error(e),
        })
    }

    /// Run both in sequence, keeping both values.
    pub fn then<U: 'static>(self, next: Parser<U>) -> Parser<(T, U)> {
        Parser::new(move |input| match self.parse(input) {
            Reply::Success(a, rest) => next.parse(rest).map(|b| (a, b)),
            Reply::Failure(e) => Reply::Failure(e),
            Reply::Error(e) => Reply::Error(e),
        })
    }

    /// Run both in sequence, keeping the left value.
    pub fn then_ignore<U: 'static>(self, next: Parser<U>) -> Parser<T> {
        self.then(next).map(|(a, _)| a)
    }

    /// Run both in sequence, keeping the right value.
    pub fn ignore_then<U: 'static>(self, next: Parser<U>) -> Parser<U> {
        self.then(next).map(|(_, b)| b)
    }

    /// Ordered choice between two parsers.
    pub fn or(self, other: Parser<T>) -> Parser<T> {
        either(vec![self, other])
    }

    /// Zero or more repetitions. A success that consumes nothing ends the
    /// repetition without being kept.
    pub fn repeated(self) -> Parser<Vec<T>> {
        Parser::new(move |input| {
            let mut items = Vec::new();
            let mut cursor = input;
            loop {
                match self.parse(cursor) {
                    Reply::Success(v, rest) => {
                        if rest.offset() == cursor.offset() {
                            break;
                        }
                        items.push(v);
                        cursor = rest;
                    }
                    Reply::Failure(_) => break,
                    Reply::Error(e) => return Reply::Error(e),
                }
            }
            Reply::Success(items, cursor)
        })
    }

    /// One or more repetitions.
    pub fn repeated1(self) -> Parser<Vec<T>> {
        self.clone().then(self.repeated()).map(|(first, mut rest)| {
            rest.insert(0, first);
            rest
        })
    }

    /// Exactly `n` repetitions.
    pub fn times(self, n: usize) -> Parser<Vec<T>> {
        Parser::new(move |input| {
            let mut items = Vec::with_capacity(n);
            let mut cursor = input;
            for _ in 0..n {
                match self.parse(cursor) {
                    Reply::Success(v, rest) => {
                        items.push(v);
                        cursor = rest;
                    }
                    Reply::Failure(e) => return Reply::Failure(e),
                    Reply::Error(e) => return Reply::Error(e),
                }
            }
            Reply::Success(items, cursor)
        })
    }

    /// Succeed with `None` instead of failing. Errors still propagate.
    pub fn optional(self) -> Parser<Option<T>> {
        Parser::new(move |input| match self.parse(input) {
            Reply::Success(v, rest) => Reply::Success(Some(v), rest),
            Reply::Failure(_) => Reply::Success(None, input),
            Reply::Error(e) => Reply::Error(e),
        })
    }

    /// Promote failures of this parser to fatal errors.
    pub fn commit(self) -> Parser<T> {
        Parser::new(move |input| match self.parse(input) {
            Reply::Failure(e) => Reply::Error(e),
            other => other,
        })
    }

    /// Separated list of one or more items.
    pub fn separated_by<S: 'static>(self, sep: Parser<S>) -> Parser<Vec<T>> {
        self.clone()
            .then(sep.ignore_then(self).repeated())
            .map(|(first, mut rest)| {
                rest.insert(0, first);
                rest
            })
    }
}

// ============================================================================
// Primitives
// ============================================================================

/// Match `text` exactly after skipping ignorable text.
pub fn literal(text: &'static str) -> Parser<&'static str> {
    Parser::new(move |input: Input<'_>| {
        let at = input.skip_ignorable();
        if at.rest().starts_with(text) {
            Reply::Success(text, at.advance(text.len()))
        } else {
            at.fail(format!("expected `{text}`"))
        }
    })
}

/// Match a regular expression anchored at the current position.
pub fn pattern(re: &'static str) -> Parser<String> {
    named_pattern(re, re)
}

/// Like [`pattern`], reporting failures as "expected {what}".
pub fn named_pattern(re: &'static str, what: &'static str) -> Parser<String> {
    let compiled = anchored(re);
    Parser::new(move |input: Input<'_>| {
        let at = input.skip_ignorable();
        match &compiled {
            Ok(regex) => match regex.find(at.rest()) {
                Some(m) => Reply::Success(m.as_str().to_string(), at.advance(m.end())),
                None => at.fail(format!("expected {what}")),
            },
            Err(e) => Reply::Error(Failed::new(format!("invalid pattern {re}: {e}"), at)),
        }
    })
}

/// Succeed with `value` without consuming input.
pub fn success<T: Clone + 'static>(value: T) -> Parser<T> {
    Parser::new(move |input| Reply::Success(value.clone(), input))
}

/// Fail softly at the current position.
pub fn failure<T: 'static>(message: &'static str) -> Parser<T> {
    Parser::new(move |input: Input<'_>| input.fail(message))
}

/// Fail fatally at the current position.
pub fn error<T: 'static>(message: &'static str) -> Parser<T> {
    Parser::new(move |input: Input<'_>| {
        input.ctx.record(input.offset, message);
        Reply::Error(Failed::new(message, input))
    })
}

/// Succeed only at the end of input (after ignorable text).
pub fn end() -> Parser<()> {
    Parser::new(|input: Input<'_>| {
        let at = input.skip_ignorable();
        if at.is_at_end() {
            Reply::Success((), at)
        } else {
            at.fail("unexpected input")
        }
    })
}

// ============================================================================
// Composites
// ============================================================================

/// Ordered choice. The first success wins; an error aborts immediately; when
/// every branch fails the failure positioned furthest along is kept.
pub fn either<T: 'static>(alternatives: Vec<Parser<T>>) -> Parser<T> {
    Parser::new(move |input| {
        let mut furthest: Option<Failed<'_>> = None;
        for alternative in &alternatives {
            match alternative.parse(input) {
                Reply::Failure(f) => {
                    furthest = Some(match furthest {
                        Some(best) if best.at >= f.at => best,
                        _ => f,
                    });
                }
                other => return other,
            }
        }
        Reply::Failure(furthest.unwrap_or_else(|| Failed::new("no alternatives", input)))
    })
}

/// Run every parser in order, collecting their values.
pub fn sequence<T: 'static>(parsers: Vec<Parser<T>>) -> Parser<Vec<T>> {
    Parser::new(move |input| {
        let mut values = Vec::with_capacity(parsers.len());
        let mut cursor = input;
        for parser in &parsers {
            match parser.parse(cursor) {
                Reply::Success(v, rest) => {
                    values.push(v);
                    cursor = rest;
                }
                Reply::Failure(e) => return Reply::Failure(e),
                Reply::Error(e) => return Reply::Error(e),
            }
        }
        Reply::Success(values, cursor)
    })
}

/// Run both and keep whichever consumed more input; ties go to `first`.
pub fn longest_or<T: 'static>(first: Parser<T>, second: Parser<T>) -> Parser<T> {
    Parser::new(move |input| match (first.parse(input), second.parse(input)) {
        (Reply::Error(e), _) | (_, Reply::Error(e)) => Reply::Error(e),
        (Reply::Success(a, ra), Reply::Success(b, rb)) => {
            if rb > ra {
                Reply::Success(b, rb)
            } else {
                Reply::Success(a, ra)
            }
        }
        (ok @ Reply::Success(..), Reply::Failure(_)) => ok,
        (Reply::Failure(_), ok @ Reply::Success(..)) => ok,
        (Reply::Failure(a), Reply::Failure(b)) => Reply::Failure(if b.at > a.at { b } else { a }),
    })
}

/// Defer building a rule until it is first run, so rules can refer to each
/// other (and themselves) before they are defined.
pub fn lazy<T: 'static>(rule: fn() -> Parser<T>) -> Parser<T> {
    Parser::new(move |input| rule().parse(input))
}

/// Declare a grammar rule as a memoized zero-argument thunk.
///
/// The body runs once per thread. References to other rules inside a body
/// must go through [`lazy`] so that building one rule never re-enters the
/// initialization of another.
#[macro_export]
macro_rules! rule {
    ($(#[$meta:meta])* $vis:vis fn $name:ident() -> $ty:ty $body:block) => {
        $(#[$meta])*
        $vis fn $name() -> $crate::combinator::Parser<$ty> {
            ::std::thread_local! {
                static MEMO: ::std::cell::OnceCell<$crate::combinator::Parser<$ty>> =
                    const { ::std::cell::OnceCell::new() };
            }
            MEMO.with(|memo| memo.get_or_init(|| $body).clone())
        }
    };
}
