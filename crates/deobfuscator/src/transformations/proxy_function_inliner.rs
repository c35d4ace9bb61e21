use std::collections::HashMap;

use swc_core::ecma::ast::*;
use swc_core::ecma::visit::{Visit, VisitMut, VisitMutWith, VisitWith};

use crate::binding::{collect_constants, remove_all, Bindings, ConstantVariable};
use crate::config::TransformationKey;
use crate::proxy::ProxyFunction;
use crate::transformation::{
  Outcome, TransformContext, TransformError, Transformation, TransformationProperties,
};

/// Replaces calls of single-expression functions with the returned expression.
#[derive(Default)]
pub struct ProxyFunctionInliner;

/// Function declarations that are proxies.
struct ProxyDeclarations<'a> {
  bindings: &'a Bindings,
  found: Vec<ConstantVariable<ProxyFunction>>,
}

impl Visit for ProxyDeclarations<'_> {
  fn visit_fn_decl(&mut self, declaration: &FnDecl) {
    if let Some(variable) = ConstantVariable::resolve_function(declaration, self.bindings) {
      if let Some(proxy) = ProxyFunction::from_function(&variable.expression) {
        self.found.push(variable.map(|_| proxy));
      }
    }
    declaration.visit_children_with(self);
  }
}

struct CallInliner {
  proxies: HashMap<Id, ProxyFunction>,
  inlined: HashMap<Id, usize>,
}

impl VisitMut for CallInliner {
  fn visit_mut_expr(&mut self, expr: &mut Expr) {
    expr.visit_mut_children_with(self);

    let Expr::Call(CallExpr {
      callee: Callee::Expr(callee),
      args,
      ..
    }) = expr
    else {
      return;
    };
    let Expr::Ident(ident) = &**callee else {
      return;
    };
    let id = ident.to_id();
    let Some(replacement) = self.proxies.get(&id).and_then(|proxy| proxy.inline(args)) else {
      return;
    };

    *expr = replacement;
    *self.inlined.entry(id).or_default() += 1;
  }
}

impl Transformation for ProxyFunctionInliner {
  fn properties(&self) -> TransformationProperties {
    TransformationProperties {
      key: TransformationKey::ProxyFunctionInlining,
      rebuild_scope_tree: true,
    }
  }

  fn execute(
    &mut self,
    module: &mut Module,
    context: &mut TransformContext,
  ) -> Result<bool, TransformError> {
    let bindings = context.scope.bindings(module);

    let mut declarations = ProxyDeclarations {
      bindings,
      found: vec![],
    };
    module.visit_with(&mut declarations);
    let mut proxies = declarations.found;
    proxies.extend(collect_constants(module, bindings, ProxyFunction::from_expr));

    // Recursive proxies would never stop expanding
    proxies.retain(|proxy| !proxy.expression.references(&proxy.id));
    if proxies.is_empty() {
      return Ok(false);
    }

    let reads: HashMap<Id, usize> = proxies
      .iter()
      .filter_map(|proxy| Some((proxy.id.clone(), proxy.binding(bindings)?.reads.len())))
      .collect();

    let mut inliner = CallInliner {
      proxies: proxies
        .iter()
        .map(|proxy| (proxy.id.clone(), proxy.expression.clone()))
        .collect(),
      inlined: HashMap::new(),
    };
    module.visit_mut_with(&mut inliner);
    if inliner.inlined.is_empty() {
      return Ok(false);
    }

    // Drop proxies whose every use was a call that got inlined
    let unused: Vec<_> = proxies
      .into_iter()
      .filter(|proxy| inliner.inlined.get(&proxy.id) == reads.get(&proxy.id))
      .collect();
    for proxy in &unused {
      context.report(Outcome::Matched(format!("Inlined proxy function {}", proxy.name)));
    }
    remove_all(module, &unused);

    Ok(true)
  }
}

#[cfg(test)]
mod tests {
  use indoc::indoc;

  use super::*;
  use crate::transformation::test_utils::{assert_transforms, assert_unchanged};

  #[test]
  fn test_inlines_function_declarations() {
    assert_transforms(
      indoc! {r#"
        function add(a, b) {
          return a + b;
        }
        console.log(add(1, 2), add(x, 3));
      "#},
      ProxyFunctionInliner,
      "console.log(1 + 2, x + 3);",
    );
  }

  #[test]
  fn test_inlines_function_expressions_and_keeps_other_uses() {
    assert_transforms(
      indoc! {r#"
        var call = function (f, a) {
          return f(a);
        };
        call(g, 1);
        h(call);
      "#},
      ProxyFunctionInliner,
      indoc! {r#"
        var call = function (f, a) {
          return f(a);
        };
        g(1);
        h(call);
      "#},
    );
  }

  #[test]
  fn test_inlines_nested_calls() {
    assert_transforms(
      "var not = (a) => !a; f(not(not(x)));",
      ProxyFunctionInliner,
      "f(!!x);",
    );
  }

  #[test]
  fn test_skips_reassigned_and_recursive_functions() {
    assert_unchanged(
      "var p = function (a) { return a; }; p = null; p(1); function r(n) { return r(n); } r(1);",
      ProxyFunctionInliner,
    );
  }

  #[test]
  fn test_keeps_calls_with_reordered_side_effects() {
    assert_unchanged(
      "function swap(a, b) { return b - a; } swap(f(), g());",
      ProxyFunctionInliner,
    );
    assert_unchanged(
      "function p(a) { return g() + a; } f(p(h()));",
      ProxyFunctionInliner,
    );
  }
}
