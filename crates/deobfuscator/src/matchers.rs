//! Structural matchers with named captures.
//!
//! A matcher is anything implementing [`Matcher`], which every closure
//! `Fn(&N, &mut Captures) -> bool` does. The functions in this module build matchers for the
//! node shapes the passes recognise, e.g. a rotation call is matched with:
//!
//! ```skip
//! let rotation = call(
//!   fn_expr(any::<[Stmt]>()),
//!   vec![ident(capture_id("table")).boxed(), num(|_| true).boxed()],
//! );
//! ```
//!
//! Capturing the same name twice requires both identifiers to be the same binding.

use std::collections::HashMap;

use swc_core::ecma::ast::*;

#[derive(Clone, Debug, Default)]
pub struct Captures {
  ids: HashMap<&'static str, Id>,
  exprs: HashMap<&'static str, Expr>,
  numbers: HashMap<&'static str, f64>,
}

impl Captures {
  pub fn id(&self, name: &str) -> Option<&Id> {
    self.ids.get(name)
  }

  pub fn expr(&self, name: &str) -> Option<&Expr> {
    self.exprs.get(name)
  }

  pub fn number(&self, name: &str) -> Option<f64> {
    self.numbers.get(name).copied()
  }

  /// Bind `name` to `id`, or check it against an earlier binding of `name`.
  pub fn bind_id(&mut self, name: &'static str, id: Id) -> bool {
    match self.ids.get(name) {
      Some(existing) => *existing == id,
      None => {
        self.ids.insert(name, id);
        true
      }
    }
  }

  fn bind_expr(&mut self, name: &'static str, expr: &Expr) {
    self.exprs.insert(name, expr.clone());
  }
}

pub trait Matcher<N: ?Sized> {
  fn matches(&self, node: &N, captures: &mut Captures) -> bool;

  fn boxed(self) -> Box<dyn Matcher<N>>
  where
    Self: Sized + 'static,
  {
    Box::new(self)
  }
}

impl<N: ?Sized, F> Matcher<N> for F
where
  F: Fn(&N, &mut Captures) -> bool,
{
  fn matches(&self, node: &N, captures: &mut Captures) -> bool {
    self(node, captures)
  }
}

/// Run `matcher` against `node` with fresh captures.
pub fn match_node<N: ?Sized>(matcher: &impl Matcher<N>, node: &N) -> Option<Captures> {
  let mut captures = Captures::default();
  matcher.matches(node, &mut captures).then_some(captures)
}

fn all<N>(matchers: &[Box<dyn Matcher<N>>], nodes: &[N], captures: &mut Captures) -> bool {
  matchers.len() == nodes.len()
    && matchers
      .iter()
      .zip(nodes)
      .all(|(matcher, node)| matcher.matches(node, captures))
}

pub fn any<N: ?Sized>() -> impl Matcher<N> {
  |_: &N, _: &mut Captures| true
}

pub fn capture_id(name: &'static str) -> impl Matcher<Ident> {
  move |ident: &Ident, captures: &mut Captures| captures.bind_id(name, ident.to_id())
}

pub fn named(name: &'static str) -> impl Matcher<Ident> {
  move |ident: &Ident, _: &mut Captures| &*ident.sym == name
}

/// Match an expression and remember a copy of it.
pub fn capture_expr(name: &'static str, matcher: impl Matcher<Expr>) -> impl Matcher<Expr> {
  move |expr: &Expr, captures: &mut Captures| {
    if !matcher.matches(expr, captures) {
      return false;
    }
    captures.bind_expr(name, expr);
    true
  }
}

pub fn ident(matcher: impl Matcher<Ident>) -> impl Matcher<Expr> {
  move |expr: &Expr, captures: &mut Captures| match expr {
    Expr::Ident(ident) => matcher.matches(ident, captures),
    _ => false,
  }
}

/// A binding identifier in a pattern position
pub fn binding(matcher: impl Matcher<Ident>) -> impl Matcher<Pat> {
  move |pat: &Pat, captures: &mut Captures| match pat {
    Pat::Ident(binding) => matcher.matches(&binding.id, captures),
    _ => false,
  }
}

/// A numeric literal, including the negated form `-N`.
pub fn num(predicate: impl Fn(f64) -> bool) -> impl Matcher<Expr> {
  move |expr: &Expr, _: &mut Captures| numeric_value(expr).is_some_and(&predicate)
}

pub fn capture_num(name: &'static str) -> impl Matcher<Expr> {
  move |expr: &Expr, captures: &mut Captures| match numeric_value(expr) {
    Some(value) => {
      captures.numbers.insert(name, value);
      true
    }
    None => false,
  }
}

pub fn str_lit(predicate: impl Fn(&str) -> bool) -> impl Matcher<Expr> {
  move |expr: &Expr, _: &mut Captures| match expr {
    Expr::Lit(Lit::Str(string)) => predicate(&string.value),
    _ => false,
  }
}

pub fn str_eq(value: &'static str) -> impl Matcher<Expr> {
  str_lit(move |string| string == value)
}

pub fn this() -> impl Matcher<Expr> {
  |expr: &Expr, _: &mut Captures| expr.is_this()
}

pub fn call(callee: impl Matcher<Expr>, args: Vec<Box<dyn Matcher<Expr>>>) -> impl Matcher<Expr> {
  move |expr: &Expr, captures: &mut Captures| {
    let Expr::Call(CallExpr {
      callee: Callee::Expr(callee_expr),
      args: call_args,
      ..
    }) = expr
    else {
      return false;
    };
    args.len() == call_args.len()
      && callee.matches(callee_expr, captures)
      && args
        .iter()
        .zip(call_args)
        .all(|(matcher, arg)| arg.spread.is_none() && matcher.matches(&arg.expr, captures))
  }
}

pub fn new_(callee: impl Matcher<Expr>, args: Vec<Box<dyn Matcher<Expr>>>) -> impl Matcher<Expr> {
  move |expr: &Expr, captures: &mut Captures| {
    let Expr::New(new) = expr else {
      return false;
    };
    let new_args = new.args.as_deref().unwrap_or_default();
    args.len() == new_args.len()
      && callee.matches(&new.callee, captures)
      && args
        .iter()
        .zip(new_args)
        .all(|(matcher, arg)| arg.spread.is_none() && matcher.matches(&arg.expr, captures))
  }
}

/// `object.property` or `object["property"]`
pub fn member(object: impl Matcher<Expr>, property: Option<&'static str>) -> impl Matcher<Expr> {
  move |expr: &Expr, captures: &mut Captures| {
    let Expr::Member(member_expr) = expr else {
      return false;
    };
    let key_matches = match property {
      Some(property) => member_literal_key(member_expr).is_some_and(|key| key == property),
      None => true,
    };
    key_matches && object.matches(&member_expr.obj, captures)
  }
}

/// `object[property]` with a computed property
pub fn computed_member(
  object: impl Matcher<Expr>,
  property: impl Matcher<Expr>,
) -> impl Matcher<Expr> {
  move |expr: &Expr, captures: &mut Captures| {
    let Expr::Member(MemberExpr {
      obj,
      prop: MemberProp::Computed(computed),
      ..
    }) = expr
    else {
      return false;
    };
    object.matches(obj, captures) && property.matches(&computed.expr, captures)
  }
}

pub fn unary(op: UnaryOp, arg: impl Matcher<Expr>) -> impl Matcher<Expr> {
  move |expr: &Expr, captures: &mut Captures| match expr {
    Expr::Unary(unary) => unary.op == op && arg.matches(&unary.arg, captures),
    _ => false,
  }
}

pub fn update(arg: impl Matcher<Expr>) -> impl Matcher<Expr> {
  move |expr: &Expr, captures: &mut Captures| match expr {
    Expr::Update(update) => arg.matches(&update.arg, captures),
    _ => false,
  }
}

pub fn binary(
  ops: &'static [BinaryOp],
  left: impl Matcher<Expr>,
  right: impl Matcher<Expr>,
) -> impl Matcher<Expr> {
  move |expr: &Expr, captures: &mut Captures| match expr {
    Expr::Bin(bin) => {
      ops.contains(&bin.op)
        && left.matches(&bin.left, captures)
        && right.matches(&bin.right, captures)
    }
    _ => false,
  }
}

pub fn logical(left: impl Matcher<Expr>, right: impl Matcher<Expr>) -> impl Matcher<Expr> {
  binary(&[BinaryOp::LogicalAnd, BinaryOp::LogicalOr], left, right)
}

/// `target = value` with a plain identifier target
pub fn assign(target: impl Matcher<Ident>, value: impl Matcher<Expr>) -> impl Matcher<Expr> {
  move |expr: &Expr, captures: &mut Captures| {
    let Expr::Assign(AssignExpr {
      op: AssignOp::Assign,
      left: AssignTarget::Simple(SimpleAssignTarget::Ident(left)),
      right,
      ..
    }) = expr
    else {
      return false;
    };
    target.matches(&left.id, captures) && value.matches(right, captures)
  }
}

/// A function expression, named or not, whose body statements match `body`.
pub fn fn_expr(body: impl Matcher<[Stmt]>) -> impl Matcher<Expr> {
  move |expr: &Expr, captures: &mut Captures| match expr {
    Expr::Fn(FnExpr { function, .. }) => {
      function_body(function).is_some_and(|stmts| body.matches(stmts, captures))
    }
    _ => false,
  }
}

/// A function expression or arrow function whose statements match `body`.
pub fn function_like(body: impl Matcher<[Stmt]>) -> impl Matcher<Expr> {
  move |expr: &Expr, captures: &mut Captures| match expr {
    Expr::Fn(FnExpr { function, .. }) => {
      function_body(function).is_some_and(|stmts| body.matches(stmts, captures))
    }
    Expr::Arrow(ArrowExpr {
      body: block, ..
    }) => match &**block {
      BlockStmtOrExpr::BlockStmt(block) => body.matches(&block.stmts, captures),
      BlockStmtOrExpr::Expr(_) => false,
    },
    _ => false,
  }
}

pub fn array(elements: Vec<Box<dyn Matcher<Expr>>>) -> impl Matcher<Expr> {
  move |expr: &Expr, captures: &mut Captures| {
    let Expr::Array(array) = expr else {
      return false;
    };
    array.elems.len() == elements.len()
      && elements.iter().zip(&array.elems).all(|(matcher, element)| match element {
        Some(element) => element.spread.is_none() && matcher.matches(&element.expr, captures),
        None => false,
      })
  }
}

/// Exactly these statements, in order.
pub fn stmts(matchers: Vec<Box<dyn Matcher<Stmt>>>) -> impl Matcher<[Stmt]> {
  move |body: &[Stmt], captures: &mut Captures| all(&matchers, body, captures)
}

/// A statement list with at least `min` statements whose leading ones match `prefix`.
pub fn starts_with(min: usize, prefix: Vec<Box<dyn Matcher<Stmt>>>) -> impl Matcher<[Stmt]> {
  move |body: &[Stmt], captures: &mut Captures| {
    body.len() >= min.max(prefix.len()) && all(&prefix, &body[..prefix.len()], captures)
  }
}

pub fn expr_stmt(matcher: impl Matcher<Expr>) -> impl Matcher<Stmt> {
  move |stmt: &Stmt, captures: &mut Captures| match stmt {
    Stmt::Expr(expr_stmt) => matcher.matches(&expr_stmt.expr, captures),
    _ => false,
  }
}

pub fn return_(argument: impl Matcher<Expr>) -> impl Matcher<Stmt> {
  move |stmt: &Stmt, captures: &mut Captures| match stmt {
    Stmt::Return(ReturnStmt { arg: Some(arg), .. }) => argument.matches(arg, captures),
    _ => false,
  }
}

pub fn var_decl(declarators: Vec<Box<dyn Matcher<VarDeclarator>>>) -> impl Matcher<Stmt> {
  move |stmt: &Stmt, captures: &mut Captures| match stmt {
    Stmt::Decl(Decl::Var(var)) => all(&declarators, &var.decls, captures),
    _ => false,
  }
}

pub fn declarator(
  name: impl Matcher<Ident>,
  init: impl Matcher<Expr>,
) -> impl Matcher<VarDeclarator> {
  move |declarator: &VarDeclarator, captures: &mut Captures| {
    let (Pat::Ident(binding), Some(value)) = (&declarator.name, &declarator.init) else {
      return false;
    };
    name.matches(&binding.id, captures) && init.matches(value, captures)
  }
}

pub fn if_(test: impl Matcher<Expr>) -> impl Matcher<Stmt> {
  move |stmt: &Stmt, captures: &mut Captures| match stmt {
    Stmt::If(if_stmt) => test.matches(&if_stmt.test, captures),
    _ => false,
  }
}

pub fn is_if() -> impl Matcher<Stmt> {
  |stmt: &Stmt, _: &mut Captures| matches!(stmt, Stmt::If(_))
}

/// `var name = value;` with a single declarator, or `name = value;`
pub fn declaration_or_assignment(
  name: impl Matcher<Ident>,
  value: impl Matcher<Expr>,
) -> impl Matcher<Stmt> {
  move |stmt: &Stmt, captures: &mut Captures| match stmt {
    Stmt::Decl(Decl::Var(var)) => match var.decls.as_slice() {
      [VarDeclarator {
        name: Pat::Ident(binding),
        init: Some(init),
        ..
      }] => name.matches(&binding.id, captures) && value.matches(init, captures),
      _ => false,
    },
    Stmt::Expr(ExprStmt { expr, .. }) => match &**expr {
      Expr::Assign(AssignExpr {
        op: AssignOp::Assign,
        left: AssignTarget::Simple(SimpleAssignTarget::Ident(left)),
        right,
        ..
      }) => name.matches(&left.id, captures) && value.matches(right, captures),
      _ => false,
    },
    _ => false,
  }
}

pub fn function_body(function: &Function) -> Option<&[Stmt]> {
  function.body.as_ref().map(|body| body.stmts.as_slice())
}

/// The function a call expression invokes immediately, as in `(function () { ... })()`.
pub fn iife_callee(call: &CallExpr) -> Option<&Function> {
  match &**call.callee.as_expr()? {
    Expr::Fn(FnExpr { function, .. }) => Some(function),
    Expr::Paren(paren) => match &*paren.expr {
      Expr::Fn(FnExpr { function, .. }) => Some(function),
      _ => None,
    },
    _ => None,
  }
}

/// The value of `N` or `-N`.
pub fn numeric_value(expr: &Expr) -> Option<f64> {
  match expr {
    Expr::Lit(Lit::Num(number)) => Some(number.value),
    Expr::Unary(UnaryExpr {
      op: UnaryOp::Minus,
      arg,
      ..
    }) => match &**arg {
      Expr::Lit(Lit::Num(number)) => Some(-number.value),
      _ => None,
    },
    _ => None,
  }
}

/// The key of `object.key`, `object["key"]` or `object[0]`.
pub fn member_literal_key(member: &MemberExpr) -> Option<String> {
  match &member.prop {
    MemberProp::Ident(ident) => Some(ident.sym.to_string()),
    MemberProp::Computed(computed) => match &*computed.expr {
      Expr::Lit(Lit::Str(string)) => Some(string.value.to_string()),
      Expr::Lit(Lit::Num(number)) => Some(crate::utils::number_to_string(number.value)),
      _ => None,
    },
    MemberProp::PrivateName(_) => None,
  }
}

/// The elements of `["a", "b"]` when every element is a string literal.
pub fn string_array(expr: &Expr) -> Option<Vec<String>> {
  let Expr::Array(array) = expr else {
    return None;
  };
  array
    .elems
    .iter()
    .map(|element| match element {
      Some(ExprOrSpread { spread: None, expr }) => match &**expr {
        Expr::Lit(Lit::Str(string)) => Some(string.value.to_string()),
        _ => None,
      },
      _ => None,
    })
    .collect()
}

/// The parts of `"a|b|c".split("|")`.
pub fn split_call(expr: &Expr) -> Option<Vec<String>> {
  let Expr::Call(CallExpr {
    callee: Callee::Expr(callee),
    args,
    ..
  }) = expr
  else {
    return None;
  };
  let Expr::Member(member) = &**callee else {
    return None;
  };
  if member_literal_key(member).as_deref() != Some("split") {
    return None;
  }
  let (Expr::Lit(Lit::Str(subject)), [separator]) = (&*member.obj, args.as_slice()) else {
    return None;
  };
  let Expr::Lit(Lit::Str(separator)) = &*separator.expr else {
    return None;
  };
  if separator.value.is_empty() {
    return Some(subject.value.chars().map(String::from).collect());
  }

  Some(
    subject
      .value
      .split(&*separator.value)
      .map(String::from)
      .collect(),
  )
}

pub fn is_split_call(expr: &Expr) -> bool {
  split_call(expr).is_some()
}

/// A literal string table, either an array or a split string.
pub fn string_table(expr: &Expr) -> Option<Vec<String>> {
  string_array(expr).or_else(|| split_call(expr))
}

#[cfg(test)]
mod tests {
  use swc_core::common::sync::Lrc;
  use swc_core::common::{FileName, SourceMap};

  use super::*;

  fn parse_stmts(code: &str) -> Vec<Stmt> {
    let source_map = Lrc::new(SourceMap::default());
    let module = deobfuscator_swc_runner::parse_module(&source_map, FileName::Anon, code).unwrap();
    module
      .body
      .into_iter()
      .map(|item| item.stmt().unwrap())
      .collect()
  }

  fn parse_expr(code: &str) -> Expr {
    match parse_stmts(code).remove(0) {
      Stmt::Expr(expr_stmt) => match *expr_stmt.expr {
        Expr::Paren(paren) => *paren.expr,
        expr => expr,
      },
      _ => panic!("expected an expression statement"),
    }
  }

  #[test]
  fn test_call_captures_arguments() {
    let matcher = call(
      ident(capture_id("callee")),
      vec![capture_num("index").boxed(), capture_expr("key", str_lit(|_| true)).boxed()],
    );
    let captures = match_node(&matcher, &parse_expr("f(-3, 'k')")).unwrap();
    assert_eq!(&*captures.id("callee").unwrap().0, "f");
    assert_eq!(captures.number("index"), Some(-3.0));
    assert!(captures.expr("key").is_some());

    assert!(match_node(&matcher, &parse_expr("f(1)")).is_none());
  }

  #[test]
  fn test_repeated_capture_requires_same_binding() {
    let matcher = assign(capture_id("x"), ident(capture_id("x")));
    assert!(match_node(&matcher, &parse_expr("a = a")).is_some());
    assert!(match_node(&matcher, &parse_expr("a = b")).is_none());
  }

  #[test]
  fn test_declaration_or_assignment() {
    let matcher = declaration_or_assignment(named("x"), num(|value| value == 1.0));
    let statements = parse_stmts("var x = 1; x = 1; var x = 1, y = 2; x += 1;");
    let results: Vec<bool> = statements
      .iter()
      .map(|stmt| match_node(&matcher, stmt).is_some())
      .collect();
    assert_eq!(results, vec![true, true, false, false]);
  }

  #[test]
  fn test_function_body_shapes() {
    let matcher = fn_expr(starts_with(
      2,
      vec![expr_stmt(assign(any::<Ident>(), any::<Expr>())).boxed()],
    ));
    assert!(match_node(&matcher, &parse_expr("(function () { a = 1; return a; })")).is_some());
    assert!(match_node(&matcher, &parse_expr("(function () { a = 1; })")).is_none());
  }

  #[test]
  fn test_string_tables() {
    assert_eq!(
      string_table(&parse_expr("['a', 'b']")),
      Some(vec!["a".to_string(), "b".to_string()])
    );
    assert_eq!(
      string_table(&parse_expr("'a|b|c'.split('|')")),
      Some(vec!["a".to_string(), "b".to_string(), "c".to_string()])
    );
    assert_eq!(string_table(&parse_expr("['a', 1]")), None);
    assert!(!is_split_call(&parse_expr("'a|b'.join('|')")));
  }

  #[test]
  fn test_member_literal_key() {
    let Expr::Member(member) = parse_expr("a['push']") else {
      panic!("expected a member expression");
    };
    assert_eq!(member_literal_key(&member).as_deref(), Some("push"));
  }
}
