//! Trivial indirections inserted by the obfuscator: single-expression functions and objects
//! made of literals and such functions.

use std::collections::{HashMap, HashSet};

use swc_core::common::DUMMY_SP;
use swc_core::ecma::ast::*;
use swc_core::ecma::visit::{Visit, VisitMut, VisitMutWith, VisitWith};

use crate::matchers::{member_literal_key, numeric_value};
use crate::mutate::references_any;
use crate::utils::{is_pure, number_to_string, uses_function_context};

/// A function whose body is a single returned expression.
#[derive(Clone, Debug)]
pub struct ProxyFunction {
  params: Vec<Id>,
  body: Expr,
}

fn void_zero() -> Expr {
  Expr::Unary(UnaryExpr {
    span: DUMMY_SP,
    op: UnaryOp::Void,
    arg: Box::new(Expr::Lit(Lit::Num(Number {
      span: DUMMY_SP,
      value: 0.0,
      raw: None,
    }))),
  })
}

fn ident_params<'a>(params: impl IntoIterator<Item = &'a Pat>) -> Option<Vec<Id>> {
  params
    .into_iter()
    .map(|pat| match pat {
      Pat::Ident(binding) => Some(binding.id.to_id()),
      _ => None,
    })
    .collect()
}

fn single_return(block: &BlockStmt) -> Option<&Expr> {
  match block.stmts.as_slice() {
    [Stmt::Return(ReturnStmt { arg: Some(arg), .. })] => Some(arg),
    _ => None,
  }
}

impl ProxyFunction {
  pub fn from_function(function: &Function) -> Option<ProxyFunction> {
    if function.is_async || function.is_generator {
      return None;
    }
    let params = ident_params(function.params.iter().map(|param| &param.pat))?;
    let body = single_return(function.body.as_ref()?)?;
    if uses_function_context(body) {
      return None;
    }

    Some(ProxyFunction {
      params,
      body: body.clone(),
    })
  }

  pub fn from_arrow(arrow: &ArrowExpr) -> Option<ProxyFunction> {
    if arrow.is_async || arrow.is_generator {
      return None;
    }
    let params = ident_params(&arrow.params)?;
    let body = match &*arrow.body {
      BlockStmtOrExpr::Expr(expr) => &**expr,
      BlockStmtOrExpr::BlockStmt(block) => single_return(block)?,
    };
    if uses_function_context(body) {
      return None;
    }

    Some(ProxyFunction {
      params,
      body: body.clone(),
    })
  }

  /// A function or arrow expression. Named function expressions that refer to their own name
  /// are recursive and rejected.
  pub fn from_expr(expr: &Expr) -> Option<ProxyFunction> {
    match expr {
      Expr::Fn(FnExpr { ident, function }) => {
        let proxy = ProxyFunction::from_function(function)?;
        match ident {
          Some(ident) if proxy.references(&ident.to_id()) => None,
          _ => Some(proxy),
        }
      }
      Expr::Arrow(arrow) => ProxyFunction::from_arrow(arrow),
      _ => None,
    }
  }

  /// Whether the returned expression mentions `id`.
  pub fn references(&self, id: &Id) -> bool {
    references_any(&self.body, &HashSet::from([id.clone()]))
  }

  /// The returned expression with parameters replaced by `args`.
  ///
  /// Returns `None` when substituting would duplicate, drop, reorder or delay the evaluation
  /// of an argument with side effects.
  pub fn inline(&self, args: &[ExprOrSpread]) -> Option<Expr> {
    if args.iter().any(|arg| arg.spread.is_some()) {
      return None;
    }
    let is_copyable = |expr: &Expr| is_pure(expr) || expr.is_ident();

    // Extra arguments are still evaluated by the call
    if args
      .iter()
      .skip(self.params.len())
      .any(|arg| !is_copyable(&arg.expr))
    {
      return None;
    }

    let mut uses = ParamUses {
      params: &self.params,
      order: vec![],
      nested: HashSet::new(),
      after_effects: HashSet::new(),
      effects: 0,
      depth: 0,
    };
    self.body.visit_with(&mut uses);

    let effectful: Vec<usize> = args
      .iter()
      .take(self.params.len())
      .enumerate()
      .filter(|(_, arg)| !is_copyable(&arg.expr))
      .map(|(index, _)| index)
      .collect();
    for index in &effectful {
      let count = uses.order.iter().filter(|used| *used == index).count();
      if count != 1 || uses.nested.contains(index) || uses.after_effects.contains(index) {
        return None;
      }
    }
    let evaluation_order: Vec<usize> = uses
      .order
      .iter()
      .copied()
      .filter(|index| effectful.contains(index))
      .collect();
    if evaluation_order != effectful {
      return None;
    }

    let replacements: HashMap<Id, Expr> = self
      .params
      .iter()
      .enumerate()
      .map(|(index, param)| {
        let value = args
          .get(index)
          .map(|arg| (*arg.expr).clone())
          .unwrap_or_else(void_zero);
        (param.clone(), value)
      })
      .collect();

    let mut body = self.body.clone();
    body.visit_mut_with(&mut ParamSubstitution {
      replacements: &replacements,
    });
    Some(body)
  }
}

/// Records the order in which parameters are read, which are read inside nested functions and
/// which are read after a call or write in the body has run.
struct ParamUses<'a> {
  params: &'a [Id],
  order: Vec<usize>,
  nested: HashSet<usize>,
  after_effects: HashSet<usize>,
  effects: usize,
  depth: usize,
}

impl ParamUses<'_> {
  fn record_effect(&mut self) {
    if self.depth == 0 {
      self.effects += 1;
    }
  }
}

impl Visit for ParamUses<'_> {
  fn visit_ident(&mut self, ident: &Ident) {
    let id = ident.to_id();
    if let Some(index) = self.params.iter().position(|param| *param == id) {
      self.order.push(index);
      if self.depth > 0 {
        self.nested.insert(index);
      }
      if self.effects > 0 {
        self.after_effects.insert(index);
      }
    }
  }

  // Effects are counted once their operands have been evaluated

  fn visit_call_expr(&mut self, call: &CallExpr) {
    call.visit_children_with(self);
    self.record_effect();
  }

  fn visit_new_expr(&mut self, new: &NewExpr) {
    new.visit_children_with(self);
    self.record_effect();
  }

  fn visit_assign_expr(&mut self, assign: &AssignExpr) {
    assign.visit_children_with(self);
    self.record_effect();
  }

  fn visit_update_expr(&mut self, update: &UpdateExpr) {
    update.visit_children_with(self);
    self.record_effect();
  }

  fn visit_function(&mut self, function: &Function) {
    self.depth += 1;
    function.visit_children_with(self);
    self.depth -= 1;
  }

  fn visit_arrow_expr(&mut self, arrow: &ArrowExpr) {
    self.depth += 1;
    arrow.visit_children_with(self);
    self.depth -= 1;
  }
}

struct ParamSubstitution<'a> {
  replacements: &'a HashMap<Id, Expr>,
}

impl VisitMut for ParamSubstitution<'_> {
  fn visit_mut_expr(&mut self, expr: &mut Expr) {
    if let Expr::Ident(ident) = expr {
      if let Some(replacement) = self.replacements.get(&ident.to_id()) {
        *expr = replacement.clone();
      }
      return;
    }
    expr.visit_mut_children_with(self);
  }

  fn visit_mut_prop(&mut self, prop: &mut Prop) {
    if let Prop::Shorthand(ident) = prop {
      if let Some(replacement) = self.replacements.get(&ident.to_id()) {
        *prop = Prop::KeyValue(KeyValueProp {
          key: PropName::Ident(IdentName::new(ident.sym.clone(), ident.span)),
          value: Box::new(replacement.clone()),
        });
      }
      return;
    }
    prop.visit_mut_children_with(self);
  }
}

/// A value an object property can be replaced with.
#[derive(Clone, Debug)]
pub enum ProxyProperty {
  Literal(Expr),
  Function(ProxyFunction),
}

/// An object literal of literal values and proxy functions, keyed by literal names.
#[derive(Clone, Debug, Default)]
pub struct ProxyObject {
  properties: HashMap<String, ProxyProperty>,
}

fn is_inlinable_literal(expr: &Expr) -> bool {
  match expr {
    Expr::Lit(Lit::Regex(_)) | Expr::Lit(Lit::JSXText(_)) => false,
    Expr::Lit(_) => true,
    _ => numeric_value(expr).is_some(),
  }
}

fn literal_prop_name(name: &PropName) -> Option<String> {
  match name {
    PropName::Ident(ident) => Some(ident.sym.to_string()),
    PropName::Str(string) => Some(string.value.to_string()),
    PropName::Num(number) => Some(number_to_string(number.value)),
    PropName::Computed(computed) => match &*computed.expr {
      Expr::Lit(Lit::Str(string)) => Some(string.value.to_string()),
      Expr::Lit(Lit::Num(number)) => Some(number_to_string(number.value)),
      _ => None,
    },
    PropName::BigInt(_) => None,
  }
}

impl ProxyObject {
  /// Read the inlinable properties of an object literal. Other properties are kept on the
  /// object and never replaced.
  ///
  /// A later property overrides earlier ones with the same key, and a computed key that is not
  /// a literal may override any of them. Objects with spreads or accessors are rejected.
  pub fn from_object(object: &ObjectLit) -> Option<ProxyObject> {
    let mut properties = HashMap::new();
    for prop in &object.props {
      let PropOrSpread::Prop(prop) = prop else {
        return None;
      };
      let (key, property) = match &**prop {
        Prop::KeyValue(key_value) => {
          let property = if is_inlinable_literal(&key_value.value) {
            Some(ProxyProperty::Literal((*key_value.value).clone()))
          } else {
            ProxyFunction::from_expr(&key_value.value).map(ProxyProperty::Function)
          };
          (literal_prop_name(&key_value.key), property)
        }
        Prop::Method(method) => (
          literal_prop_name(&method.key),
          ProxyFunction::from_function(&method.function).map(ProxyProperty::Function),
        ),
        Prop::Shorthand(ident) => (Some(ident.sym.to_string()), None),
        Prop::Getter(_) | Prop::Setter(_) | Prop::Assign(_) => return None,
      };

      match (key, property) {
        (Some(key), Some(property)) => {
          properties.insert(key, property);
        }
        (Some(key), None) => {
          properties.remove(&key);
        }
        (None, _) => properties.clear(),
      }
    }

    (!properties.is_empty()).then_some(ProxyObject { properties })
  }

  pub fn get(&self, key: &str) -> Option<&ProxyProperty> {
    self.properties.get(key)
  }

  pub fn remove(&mut self, key: &str) {
    self.properties.remove(key);
  }

  pub fn is_empty(&self) -> bool {
    self.properties.is_empty()
  }

  /// The literal value of `object.key`.
  pub fn inline_member(&self, member: &MemberExpr) -> Option<Expr> {
    match self.get(&member_literal_key(member)?)? {
      ProxyProperty::Literal(value) => Some(value.clone()),
      ProxyProperty::Function(_) => None,
    }
  }

  /// The inlined body of `object.key(args)`.
  pub fn inline_call(&self, member: &MemberExpr, args: &[ExprOrSpread]) -> Option<Expr> {
    match self.get(&member_literal_key(member)?)? {
      ProxyProperty::Function(function) => function.inline(args),
      ProxyProperty::Literal(_) => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use deobfuscator_swc_runner::test_utils::run_test_visit;
  use swc_core::common::sync::Lrc;
  use swc_core::common::SourceMap;

  use super::*;

  /// Parses `var proxy = <function>; proxy(<args>);` and inlines the call.
  struct InlineFirstCall {
    result: Option<String>,
  }

  impl VisitMut for InlineFirstCall {
    fn visit_mut_module(&mut self, module: &mut Module) {
      let ModuleItem::Stmt(Stmt::Decl(Decl::Var(var))) = &module.body[0] else {
        return;
      };
      let Some(proxy) = var.decls[0].init.as_deref().and_then(ProxyFunction::from_expr) else {
        return;
      };
      let ModuleItem::Stmt(Stmt::Expr(call)) = &module.body[1] else {
        return;
      };
      let Expr::Call(call) = &*call.expr else {
        return;
      };

      let source_map = Lrc::new(SourceMap::default());
      self.result = proxy.inline(&call.args).map(|expr| {
        let stmt = Stmt::Expr(ExprStmt {
          span: DUMMY_SP,
          expr: Box::new(expr),
        });
        deobfuscator_swc_runner::print_stmt(&source_map, &stmt)
          .unwrap()
          .trim()
          .to_string()
      });
    }
  }

  struct ReadObject(Option<ProxyObject>);

  impl VisitMut for ReadObject {
    fn visit_mut_object_lit(&mut self, object: &mut ObjectLit) {
      self.0 = ProxyObject::from_object(object);
    }
  }

  fn read_object(code: &str) -> Option<ProxyObject> {
    run_test_visit(code, |_| ReadObject(None)).visitor.0
  }

  fn inline(code: &str) -> Option<String> {
    run_test_visit(code, |_| InlineFirstCall { result: None })
      .visitor
      .result
  }

  #[test]
  fn test_substitutes_parameters() {
    assert_eq!(
      inline("var p = function (a, b) { return a + b.c; }; p(x, y);").as_deref(),
      Some("x + y.c;")
    );
    assert_eq!(
      inline("var p = (a, b) => a(b); p(f, 1);").as_deref(),
      Some("f(1);")
    );
  }

  #[test]
  fn test_missing_arguments_are_undefined() {
    assert_eq!(
      inline("var p = function (a, b) { return a === b; }; p(1);").as_deref(),
      Some("1 === void 0;")
    );
  }

  #[test]
  fn test_effectful_arguments_must_keep_order_and_count() {
    assert_eq!(
      inline("var p = function (a, b) { return a(b); }; p(f(), g());").as_deref(),
      Some("f()(g());")
    );
    assert_eq!(inline("var p = function (a, b) { return b(a); }; p(f(), g());"), None);
    assert_eq!(inline("var p = function (a) { return a + a; }; p(f());"), None);
    assert_eq!(inline("var p = function (a) { return 1; }; p(f());"), None);
    assert_eq!(
      inline("var p = function (a) { return function () { return a; }; }; p(f());"),
      None
    );
  }

  #[test]
  fn test_effectful_arguments_must_precede_body_effects() {
    assert_eq!(inline("var p = function (a) { return g() + a; }; p(h());"), None);
    assert_eq!(inline("var p = function (a) { return (x = 1, a); }; p(h());"), None);
    assert_eq!(
      inline("var p = function (a) { return a + g(); }; p(h());").as_deref(),
      Some("h() + g();")
    );
    assert_eq!(
      inline("var p = function (a) { return g() + a; }; p(x);").as_deref(),
      Some("g() + x;")
    );
  }

  #[test]
  fn test_rejects_non_proxies() {
    assert_eq!(inline("var p = function () { return this.x; }; p();"), None);
    assert_eq!(inline("var p = function () { a(); return 1; }; p();"), None);
    assert_eq!(inline("var p = function r(n) { return r(n); }; p(1);"), None);
    assert_eq!(inline("var p = async function (a) { return a; }; p(1);"), None);
    assert_eq!(inline("var p = function ({ a }) { return a; }; p(1);"), None);
  }

  #[test]
  fn test_proxy_object_properties() {
    let object = read_object(
      "var o = { a: 'x', 'b': function (n) { return n * 2; }, c(n) { return -n; }, d: f(), ['e']: 1 };",
    )
    .unwrap();
    assert!(matches!(object.get("a"), Some(ProxyProperty::Literal(_))));
    assert!(matches!(object.get("b"), Some(ProxyProperty::Function(_))));
    assert!(matches!(object.get("c"), Some(ProxyProperty::Function(_))));
    assert!(object.get("d").is_none());
    assert!(matches!(object.get("e"), Some(ProxyProperty::Literal(_))));
  }

  #[test]
  fn test_proxy_object_later_properties_override() {
    assert!(read_object("var o = { a: 1, ...b };").is_none());
    assert!(read_object("var o = { a: 1, get b() { return 2; } };").is_none());
    assert!(read_object("var o = { c: 1, c: g() };").is_none());
    assert!(read_object("var o = {};").is_none());

    let object = read_object("var o = { a: 1, b: 2, [k]: 3, b: 4, a };").unwrap();
    assert!(object.get("a").is_none());
    assert!(matches!(
      object.get("b"),
      Some(ProxyProperty::Literal(Expr::Lit(Lit::Num(number)))) if number.value == 4.0
    ));
  }
}
