//! Shapes of string tables and of the functions reading them.
//!
//! A table is either declared directly, `var table = ["a", "b"];`, or returned by a function
//! that replaces itself with a getter on its first call:
//!
//! ```js
//! function table() {
//!   var strings = ["a", "b"];
//!   table = function () { return strings; };
//!   return table();
//! }
//! ```
//!
//! Wrappers of function tables are self-replacing as well. The inner function shifts the index
//! by a constant before reading the table and, unless the wrapper is a basic one, decodes the
//! entry and caches it:
//!
//! ```js
//! function wrapper(index, key) {
//!   var strings = table();
//!   wrapper = function (index, key) {
//!     index = index - 0x1a3;
//!     var value = strings[index];
//!     return value;
//!   };
//!   return wrapper(index, key);
//! }
//! ```

use std::sync::LazyLock;

use regex::Regex;
use swc_core::common::sync::Lrc;
use swc_core::common::SourceMap;
use swc_core::ecma::ast::*;

use crate::matchers::{
  any, binary, call, capture_expr, capture_id, computed_member, declaration_or_assignment,
  fn_expr, function_body, ident, is_if, numeric_value, return_, starts_with, stmts, string_table,
  Captures, Matcher,
};
use crate::string_revealer::decoder::{DecoderKind, StringDecoder};

static BASE64_WRAPPER: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(
    r#"['"]abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789\+/=['"]\.indexOf"#,
  )
  .expect("base64 wrapper regex should compile")
});

/// The key scheduled XOR of the RC4 decoder:
/// `out += String.fromCharCode(c.charCodeAt(i) ^ s[(s[x] + s[y]) % 256])`
static RC4_WRAPPER: LazyLock<Regex> = LazyLock::new(|| {
  let name = r"[a-zA-Z$_]?[a-zA-Z0-9$_]+";
  Regex::new(&format!(
    r"{name}\s?\+=\s?String\.fromCharCode\({name}\.charCodeAt\({name}\)\s?\^\s?{name}\[\({name}\[{name}\]\s?\+\s?{name}\[{name}\]\)\s?%\s?(?:256|0x100)\]\)"
  ))
  .expect("rc4 wrapper regex should compile")
});

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableSource {
  /// `var table = [...]`
  Array,
  /// `function table() { ... }`
  Function,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StringTable {
  pub id: Id,
  pub strings: Vec<String>,
  pub source: TableSource,
}

fn is_string_table() -> impl Matcher<Expr> {
  |expr: &Expr, _: &mut Captures| string_table(expr).is_some()
}

impl StringTable {
  pub fn from_declarator(declarator: &VarDeclarator) -> Option<StringTable> {
    let (Pat::Ident(binding), Some(init)) = (&declarator.name, &declarator.init) else {
      return None;
    };
    let Expr::Array(array) = &**init else {
      return None;
    };
    if array.elems.is_empty() {
      return None;
    }
    Some(StringTable {
      id: binding.id.to_id(),
      strings: string_table(init)?,
      source: TableSource::Array,
    })
  }

  pub fn from_function(function: &FnDecl) -> Option<StringTable> {
    let matcher = stmts(vec![
      declaration_or_assignment(
        capture_id("strings"),
        capture_expr("table", is_string_table()),
      )
      .boxed(),
      declaration_or_assignment(
        capture_id("function"),
        fn_expr(stmts(vec![return_(ident(capture_id("strings"))).boxed()])),
      )
      .boxed(),
      return_(call(ident(capture_id("function")), vec![])).boxed(),
    ]);

    let mut captures = Captures::default();
    captures.bind_id("function", function.ident.to_id());
    if !matcher.matches(function_body(&function.function)?, &mut captures) {
      return None;
    }

    Some(StringTable {
      id: function.ident.to_id(),
      strings: string_table(captures.expr("table")?)?,
      source: TableSource::Function,
    })
  }
}

/// `index = index - N` or `index = index + N`
fn index_shift() -> impl Matcher<Stmt> {
  declaration_or_assignment(
    capture_id("index"),
    capture_expr(
      "shift",
      binary(
        &[BinaryOp::Sub, BinaryOp::Add],
        ident(capture_id("index")),
        |expr: &Expr, _: &mut Captures| numeric_value(expr).is_some(),
      ),
    ),
  )
}

/// `value = strings[index]`
fn table_read() -> impl Matcher<Stmt> {
  declaration_or_assignment(
    capture_id("value"),
    computed_member(ident(capture_id("strings")), ident(capture_id("index"))),
  )
}

fn is_return() -> impl Matcher<Stmt> {
  |stmt: &Stmt, _: &mut Captures| matches!(stmt, Stmt::Return(_))
}

/// Read the signed offset from the `index - N` capture.
fn offset(captures: &Captures) -> Option<i64> {
  let Expr::Bin(shift) = captures.expr("shift")? else {
    return None;
  };
  let amount = numeric_value(&shift.right)?;
  if amount.fract() != 0.0 {
    return None;
  }
  let amount = amount as i64;
  Some(if shift.op == BinaryOp::Sub {
    -amount
  } else {
    amount
  })
}

/// The outer shape shared by the wrappers of function tables, with `inner` matching the
/// statements of the replacement function.
fn self_replacing_wrapper(
  wrapper: &FnDecl,
  table: &Id,
  inner: impl Matcher<[Stmt]> + 'static,
) -> Option<Captures> {
  let matcher = stmts(vec![
    declaration_or_assignment(capture_id("strings"), call(ident(capture_id("table")), vec![]))
      .boxed(),
    declaration_or_assignment(capture_id("wrapper"), fn_expr(inner)).boxed(),
    return_(call(
      ident(capture_id("wrapper")),
      vec![ident(any::<Ident>()).boxed(), ident(any::<Ident>()).boxed()],
    ))
    .boxed(),
  ]);

  let mut captures = Captures::default();
  captures.bind_id("table", table.clone());
  captures.bind_id("wrapper", wrapper.ident.to_id());
  matcher
    .matches(function_body(&wrapper.function)?, &mut captures)
    .then_some(captures)
}

/// Shift, read, return the value.
fn basic_body() -> impl Matcher<[Stmt]> {
  stmts(vec![
    index_shift().boxed(),
    table_read().boxed(),
    return_(ident(capture_id("value"))).boxed(),
  ])
}

/// Shift, read, initialise the decoder, look up the cache and return.
fn decoding_body() -> impl Matcher<[Stmt]> {
  let prefix = starts_with(4, vec![index_shift().boxed(), table_read().boxed(), is_if().boxed()]);
  move |body: &[Stmt], captures: &mut Captures| {
    prefix.matches(body, captures)
      && is_if().matches(&body[body.len() - 2], captures)
      && is_return().matches(&body[body.len() - 1], captures)
  }
}

/// Shift, read the table directly, initialise, declare, decode and return the value.
fn direct_body() -> impl Matcher<[Stmt]> {
  let prefix = starts_with(
    6,
    vec![
      index_shift().boxed(),
      table_read().boxed(),
      is_if().boxed(),
      (|stmt: &Stmt, _: &mut Captures| matches!(stmt, Stmt::Decl(Decl::Var(_)))).boxed(),
    ],
  );
  move |body: &[Stmt], captures: &mut Captures| {
    prefix.matches(body, captures)
      && is_if().matches(&body[body.len() - 2], captures)
      && return_(ident(capture_id("value"))).matches(&body[body.len() - 1], captures)
  }
}

/// Why a function reading a string table is not a wrapper the revealer understands.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum WrapperError {
  #[error("Unknown reference to string table")]
  UnknownShape,
  #[error("Unknown string table wrapper type")]
  UnknownDecoder,
}

/// Base64 or RC4, told apart by the text of the wrapper.
fn decoding_kind(
  source_map: &Lrc<SourceMap>,
  wrapper: &FnDecl,
) -> Result<DecoderKind, WrapperError> {
  let stmt = Stmt::Decl(Decl::Fn(wrapper.clone()));
  let source = deobfuscator_swc_runner::print_stmt(source_map, &stmt)
    .map_err(|_| WrapperError::UnknownDecoder)?;

  if !BASE64_WRAPPER.is_match(&source) {
    return Err(WrapperError::UnknownDecoder);
  }
  if RC4_WRAPPER.is_match(&source) {
    Ok(DecoderKind::Rc4)
  } else {
    Ok(DecoderKind::Base64)
  }
}

/// The decoder of `wrapper`, a function that calls the table function `table`.
pub fn function_table_decoder(
  source_map: &Lrc<SourceMap>,
  wrapper: &FnDecl,
  table: &Id,
) -> Result<StringDecoder, WrapperError> {
  if let Some(captures) = self_replacing_wrapper(wrapper, table, basic_body()) {
    let offset = offset(&captures).ok_or(WrapperError::UnknownShape)?;
    return Ok(StringDecoder::new(DecoderKind::Basic, offset));
  }

  let captures =
    self_replacing_wrapper(wrapper, table, decoding_body()).ok_or(WrapperError::UnknownShape)?;
  let offset = offset(&captures).ok_or(WrapperError::UnknownShape)?;
  Ok(StringDecoder::new(decoding_kind(source_map, wrapper)?, offset))
}

/// The decoder of `wrapper`, a function that indexes the table array `table`.
pub fn array_table_decoder(
  source_map: &Lrc<SourceMap>,
  wrapper: &FnDecl,
  table: &Id,
) -> Result<StringDecoder, WrapperError> {
  let mut captures = Captures::default();
  captures.bind_id("strings", table.clone());
  let body = function_body(&wrapper.function).ok_or(WrapperError::UnknownShape)?;
  if !direct_body().matches(body, &mut captures) {
    return Err(WrapperError::UnknownShape);
  }

  let offset = offset(&captures).ok_or(WrapperError::UnknownShape)?;
  Ok(StringDecoder::new(decoding_kind(source_map, wrapper)?, offset))
}
