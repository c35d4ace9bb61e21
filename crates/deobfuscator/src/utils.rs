use swc_core::common::{SyntaxContext, DUMMY_SP};
use swc_core::ecma::ast::{
  ArrowExpr, Bool, Expr, Function, Ident, Lit, ModuleItem, Number, Prop,
  PropOrSpread, Stmt, Str, ThisExpr, UnaryExpr, UnaryOp,
};
use swc_core::ecma::visit::{Visit, VisitWith};

/// Statement list items: `Stmt` inside blocks and `ModuleItem` at the top level.
///
/// Passes that edit statement lists are written once against this trait and used for both.
pub trait StmtItem: Sized {
  fn as_stmt(&self) -> Option<&Stmt>;
  fn as_stmt_mut(&mut self) -> Option<&mut Stmt>;
  fn from_stmt(stmt: Stmt) -> Self;
}

impl StmtItem for Stmt {
  fn as_stmt(&self) -> Option<&Stmt> {
    Some(self)
  }

  fn as_stmt_mut(&mut self) -> Option<&mut Stmt> {
    Some(self)
  }

  fn from_stmt(stmt: Stmt) -> Self {
    stmt
  }
}

impl StmtItem for ModuleItem {
  fn as_stmt(&self) -> Option<&Stmt> {
    match self {
      ModuleItem::Stmt(stmt) => Some(stmt),
      ModuleItem::ModuleDecl(_) => None,
    }
  }

  fn as_stmt_mut(&mut self) -> Option<&mut Stmt> {
    match self {
      ModuleItem::Stmt(stmt) => Some(stmt),
      ModuleItem::ModuleDecl(_) => None,
    }
  }

  fn from_stmt(stmt: Stmt) -> Self {
    ModuleItem::Stmt(stmt)
  }
}

/// Drop `Stmt::Empty` placeholders left behind by removals.
pub fn retain_non_empty<T: StmtItem>(items: &mut Vec<T>) {
  items.retain(|item| !matches!(item.as_stmt(), Some(Stmt::Empty(_))));
}

/// A literal operand of a foldable expression.
#[derive(Clone, Debug, PartialEq)]
pub enum LiteralValue {
  Number(f64),
  String(String),
  Bool(bool),
}

impl LiteralValue {
  /// Read a literal operand. `-5` counts as the number -5 because it is the canonical spelling
  /// of a negative number.
  pub fn from_expr(expr: &Expr) -> Option<LiteralValue> {
    match expr {
      Expr::Lit(Lit::Num(number)) => Some(LiteralValue::Number(number.value)),
      Expr::Lit(Lit::Str(string)) => Some(LiteralValue::String(string.value.to_string())),
      Expr::Lit(Lit::Bool(boolean)) => Some(LiteralValue::Bool(boolean.value)),
      Expr::Unary(UnaryExpr {
        op: UnaryOp::Minus,
        arg,
        ..
      }) => match &**arg {
        Expr::Lit(Lit::Num(number)) => Some(LiteralValue::Number(-number.value)),
        _ => None,
      },
      _ => None,
    }
  }

  pub fn to_number(&self) -> f64 {
    match self {
      LiteralValue::Number(value) => *value,
      LiteralValue::Bool(value) => {
        if *value {
          1.0
        } else {
          0.0
        }
      }
      LiteralValue::String(value) => string_to_number(value),
    }
  }

  pub fn is_truthy(&self) -> bool {
    match self {
      LiteralValue::Number(value) => !(value.is_nan() || *value == 0.0),
      LiteralValue::Bool(value) => *value,
      LiteralValue::String(value) => !value.is_empty(),
    }
  }

  pub fn type_of(&self) -> &'static str {
    match self {
      LiteralValue::Number(_) => "number",
      LiteralValue::Bool(_) => "boolean",
      LiteralValue::String(_) => "string",
    }
  }

  /// `String(value)`
  pub fn to_js_string(&self) -> String {
    match self {
      LiteralValue::Number(value) => number_to_string(*value),
      LiteralValue::Bool(value) => value.to_string(),
      LiteralValue::String(value) => value.clone(),
    }
  }

  /// Build the canonical expression for this value. Returns `None` for non-finite numbers,
  /// which have no literal spelling.
  pub fn into_expr(self) -> Option<Expr> {
    match self {
      LiteralValue::Number(value) => number_expr(value),
      LiteralValue::String(value) => Some(str_expr(&value)),
      LiteralValue::Bool(value) => Some(bool_expr(value)),
    }
  }
}

pub fn number_expr(value: f64) -> Option<Expr> {
  if !value.is_finite() {
    return None;
  }

  let literal = |value: f64| {
    Expr::Lit(Lit::Num(Number {
      span: DUMMY_SP,
      value,
      raw: None,
    }))
  };

  if value < 0.0 || (value == 0.0 && value.is_sign_negative()) {
    Some(Expr::Unary(UnaryExpr {
      span: DUMMY_SP,
      op: UnaryOp::Minus,
      arg: Box::new(literal(-value)),
    }))
  } else {
    Some(literal(value))
  }
}

pub fn str_expr(value: &str) -> Expr {
  Expr::Lit(Lit::Str(Str {
    span: DUMMY_SP,
    value: value.into(),
    raw: None,
  }))
}

pub fn bool_expr(value: bool) -> Expr {
  Expr::Lit(Lit::Bool(Bool {
    span: DUMMY_SP,
    value,
  }))
}

pub fn undefined_expr(ctxt: SyntaxContext) -> Expr {
  Expr::Ident(Ident::new("undefined".into(), DUMMY_SP, ctxt))
}

/// `Number(value)` for string operands
pub fn string_to_number(value: &str) -> f64 {
  let trimmed = value.trim();
  if trimmed.is_empty() {
    return 0.0;
  }

  let radix_prefixed = [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)];
  for (prefix, radix) in radix_prefixed {
    if let Some(digits) = trimmed.strip_prefix(prefix) {
      return u64::from_str_radix(digits, radix)
        .map(|value| value as f64)
        .unwrap_or(f64::NAN);
    }
  }

  match trimmed {
    "Infinity" | "+Infinity" => return f64::INFINITY,
    "-Infinity" => return f64::NEG_INFINITY,
    _ => {}
  }

  // Rust also accepts spellings such as `inf` and `nan`
  if !trimmed
    .chars()
    .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
  {
    return f64::NAN;
  }

  trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

/// `parseInt(value)` with the default radix
pub fn parse_int(value: &str) -> f64 {
  let trimmed = value.trim_start();
  let (sign, rest) = match trimmed.as_bytes().first() {
    Some(b'-') => (-1.0, &trimmed[1..]),
    Some(b'+') => (1.0, &trimmed[1..]),
    _ => (1.0, trimmed),
  };

  let (radix, digits) = match rest.get(..2) {
    Some("0x") | Some("0X") => (16, &rest[2..]),
    _ => (10, rest),
  };

  let mut result = 0.0;
  let mut seen_digit = false;
  for c in digits.chars() {
    let Some(digit) = c.to_digit(radix) else {
      break;
    };
    seen_digit = true;
    result = result * radix as f64 + digit as f64;
  }

  if seen_digit {
    sign * result
  } else {
    f64::NAN
  }
}

/// `Number.prototype.toString()` for radix 10
pub fn number_to_string(value: f64) -> String {
  if value.is_nan() {
    return "NaN".into();
  }
  if value == 0.0 {
    return "0".into();
  }
  if value.is_infinite() {
    return if value > 0.0 { "Infinity" } else { "-Infinity" }.into();
  }
  if value < 0.0 {
    return format!("-{}", number_to_string(-value));
  }

  // Shortest round-tripping digits and the decimal exponent
  let scientific = format!("{:e}", value);
  let Some((mantissa, exponent)) = scientific.split_once('e') else {
    return scientific;
  };
  let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
  let Ok(exponent) = exponent.parse::<i32>() else {
    return scientific;
  };

  let k = digits.len() as i32;
  let n = exponent + 1;

  if k <= n && n <= 21 {
    format!("{}{}", digits, "0".repeat((n - k) as usize))
  } else if 0 < n && n <= 21 {
    format!("{}.{}", &digits[..n as usize], &digits[n as usize..])
  } else if -6 < n && n <= 0 {
    format!("0.{}{}", "0".repeat((-n) as usize), digits)
  } else {
    let sign = if n - 1 < 0 { '-' } else { '+' };
    let (first, rest) = digits.split_at(1);
    if rest.is_empty() {
      format!("{}e{}{}", first, sign, (n - 1).abs())
    } else {
      format!("{}.{}e{}{}", first, rest, sign, (n - 1).abs())
    }
  }
}

pub fn to_uint32(value: f64) -> u32 {
  if !value.is_finite() {
    return 0;
  }
  let modulo = value.trunc() % 4294967296.0;
  let positive = if modulo < 0.0 {
    modulo + 4294967296.0
  } else {
    modulo
  };
  positive as u64 as u32
}

pub fn to_int32(value: f64) -> i32 {
  to_uint32(value) as i32
}

/// Whether evaluating `expr` can neither throw nor have a side effect.
///
/// Identifier reads are excluded since an undeclared global throws.
pub fn is_pure(expr: &Expr) -> bool {
  match expr {
    Expr::Lit(_) | Expr::Fn(_) | Expr::Arrow(_) | Expr::This(_) => true,
    Expr::Paren(paren) => is_pure(&paren.expr),
    Expr::Unary(UnaryExpr {
      op: UnaryOp::Minus | UnaryOp::Bang | UnaryOp::Void | UnaryOp::Tilde | UnaryOp::Plus,
      arg,
      ..
    }) => is_pure(arg),
    Expr::Array(array) => array.elems.iter().all(|element| match element {
      Some(element) => element.spread.is_none() && is_pure(&element.expr),
      None => true,
    }),
    Expr::Object(object) => object.props.iter().all(|prop| match prop {
      PropOrSpread::Spread(_) => false,
      PropOrSpread::Prop(prop) => match &**prop {
        Prop::KeyValue(key_value) => !key_value.key.is_computed() && is_pure(&key_value.value),
        Prop::Method(method) => !method.key.is_computed(),
        _ => false,
      },
    }),
    Expr::Tpl(tpl) => tpl.exprs.iter().all(|expr| is_pure(expr)),
    _ => false,
  }
}

/// The truthiness of `expr` when it can be decided without running the program.
pub fn known_truthiness(expr: &Expr) -> Option<bool> {
  match expr {
    Expr::Lit(Lit::Null(_)) => Some(false),
    Expr::Lit(Lit::Regex(_)) => Some(true),
    Expr::Array(_) | Expr::Object(_) | Expr::Fn(_) | Expr::Arrow(_) if is_pure(expr) => Some(true),
    Expr::Unary(UnaryExpr {
      op: UnaryOp::Bang,
      arg,
      ..
    }) => known_truthiness(arg).map(|value| !value),
    _ => LiteralValue::from_expr(expr).map(|value| value.is_truthy()),
  }
}

/// Whether `name` can be written as `obj.name` or `{ name: v }`.
pub fn is_valid_identifier_name(name: &str) -> bool {
  let mut chars = name.chars();
  match chars.next() {
    Some(first) if Ident::is_valid_start(first) => chars.all(Ident::is_valid_continue),
    _ => false,
  }
}

/// Finds `this`, `arguments` or `super` that would bind to the function being inspected.
#[derive(Default)]
pub struct ContextUsage {
  found: bool,
}

impl Visit for ContextUsage {
  fn visit_this_expr(&mut self, _: &ThisExpr) {
    self.found = true;
  }

  fn visit_ident(&mut self, ident: &Ident) {
    if &*ident.sym == "arguments" {
      self.found = true;
    }
  }

  fn visit_super(&mut self, _: &swc_core::ecma::ast::Super) {
    self.found = true;
  }

  // Nested functions rebind `this` and `arguments`, arrows do not
  fn visit_function(&mut self, _: &Function) {}

  fn visit_arrow_expr(&mut self, arrow: &ArrowExpr) {
    arrow.visit_children_with(self);
  }
}

/// Whether `node` depends on the `this`, `arguments` or `super` of its function.
pub fn uses_function_context<N: VisitWith<ContextUsage>>(node: &N) -> bool {
  let mut usage = ContextUsage::default();
  node.visit_with(&mut usage);
  usage.found
}
