use std::collections::HashSet;

use swc_core::ecma::ast::*;
use swc_core::ecma::visit::{Visit, VisitWith};

use crate::config::TransformationKey;
use crate::matchers::{
  any, assign, call, capture_id, declarator, expr_stmt, fn_expr, ident, match_node, named, num,
  return_, stmts, string_array, this, var_decl, Captures, Matcher,
};
use crate::mutate::{
  count_references, remove_declarations, remove_statements, remove_statements_referencing,
};
use crate::transformation::{
  Outcome, TransformContext, TransformError, Transformation, TransformationProperties,
};
use crate::utils::known_truthiness;

/// Removes self-defending code, debug protection and console output disabling.
///
/// All three are installed through a generic wrapper that runs a callback at most once:
///
/// ```js
/// var wrapper = (function () {
///   var first = true;
///   return function (context, fn) {
///     var result = first ? function () { ... } : function () {};
///     first = false;
///     return result;
///   };
/// })();
/// ```
#[derive(Default)]
pub struct AntiTamperRemover;

fn literal(value: bool) -> impl Matcher<Expr> {
  move |expr: &Expr, _: &mut Captures| known_truthiness(expr) == Some(value)
}

fn wrapper_declaration() -> impl Matcher<Stmt> {
  let choose = |expr: &Expr, captures: &mut Captures| match expr {
    Expr::Cond(cond) => {
      ident(capture_id("first")).matches(&cond.test, captures)
        && fn_expr(any::<[Stmt]>()).matches(&cond.cons, captures)
        && fn_expr(stmts(vec![])).matches(&cond.alt, captures)
    }
    _ => false,
  };

  var_decl(vec![declarator(
    capture_id("wrapper"),
    call(
      fn_expr(stmts(vec![
        var_decl(vec![declarator(capture_id("first"), literal(true)).boxed()]).boxed(),
        return_(fn_expr(stmts(vec![
          var_decl(vec![declarator(capture_id("result"), choose).boxed()]).boxed(),
          expr_stmt(assign(capture_id("first"), literal(false))).boxed(),
          return_(ident(capture_id("result"))).boxed(),
        ])))
        .boxed(),
      ])),
      vec![],
    ),
  )
  .boxed()])
}

/// `wrapper(this, function () { ... })`
fn wrapper_call(body: impl Matcher<[Stmt]> + 'static) -> impl Matcher<Expr> {
  call(
    ident(capture_id("wrapper")),
    vec![this().boxed(), fn_expr(body).boxed()],
  )
}

/// `var check = wrapper(this, function () { return check.toString().search(...); });`
fn self_defending() -> impl Matcher<Stmt> {
  let any_call = |expr: &Expr, _: &mut Captures| matches!(expr, Expr::Call(_));
  var_decl(vec![declarator(
    capture_id("construct"),
    wrapper_call(stmts(vec![return_(any_call).boxed()])),
  )
  .boxed()])
}

/// `wrapper(this, function () { ... })();` testing the source of functions against two regular
/// expressions and calling the protection function with `"init"`.
fn debug_protection_call() -> impl Matcher<Stmt> {
  let new_regexp = |expr: &Expr, _: &mut Captures| match expr {
    Expr::New(new) => matches!(&*new.callee, Expr::Ident(callee) if &*callee.sym == "RegExp"),
    _ => false,
  };
  let logical_test = |stmt: &Stmt, _: &mut Captures| match stmt {
    Stmt::If(if_stmt) => matches!(
      &*if_stmt.test,
      Expr::Bin(BinExpr {
        op: BinaryOp::LogicalOr | BinaryOp::LogicalAnd,
        ..
      })
    ),
    _ => false,
  };

  expr_stmt(call(
    wrapper_call(stmts(vec![
      var_decl(vec![declarator(any::<Ident>(), new_regexp).boxed()]).boxed(),
      var_decl(vec![declarator(any::<Ident>(), new_regexp).boxed()]).boxed(),
      var_decl(vec![declarator(
        any::<Ident>(),
        call(ident(capture_id("construct")), vec![any::<Expr>().boxed()]),
      )
      .boxed()])
      .boxed(),
      logical_test.boxed(),
    ])),
    vec![],
  ))
}

/// The debug protection call, possibly inside `(function () { ... })();`
fn debug_protection() -> impl Matcher<Stmt> {
  move |stmt: &Stmt, captures: &mut Captures| {
    let bare = debug_protection_call();
    let wrapped = expr_stmt(call(fn_expr(stmts(vec![debug_protection_call().boxed()])), vec![]));
    match match_node(&bare, stmt).or_else(|| match_node(&wrapped, stmt)) {
      Some(matched) => {
        *captures = matched;
        true
      }
      None => false,
    }
  }
}

/// `setInterval(function () { protection(); }, 4000);`
fn debug_protection_interval() -> impl Matcher<Stmt> {
  expr_stmt(call(
    ident(named("setInterval")),
    vec![
      fn_expr(stmts(vec![expr_stmt(call(ident(capture_id("construct")), vec![])).boxed()])).boxed(),
      num(|_| true).boxed(),
    ],
  ))
}

#[derive(Default)]
struct TryFinder {
  found: bool,
}

impl Visit for TryFinder {
  fn visit_try_stmt(&mut self, _: &TryStmt) {
    self.found = true;
  }
}

/// A body that finds the global object in a `try` and replaces the methods of its console.
fn replaces_console_methods(body: &[Stmt], _: &mut Captures) -> bool {
  let Some(Stmt::For(_)) = body.last() else {
    return false;
  };
  let lists_methods = body.iter().any(|stmt| match stmt {
    Stmt::Decl(Decl::Var(var)) => var.decls.iter().any(|declarator| {
      declarator
        .init
        .as_deref()
        .and_then(string_array)
        .is_some_and(|names| names.iter().any(|name| name == "log"))
    }),
    _ => false,
  });

  let mut finder = TryFinder::default();
  body.iter().for_each(|stmt| stmt.visit_with(&mut finder));
  lists_methods && finder.found
}

/// `var disable = wrapper(this, function () { ... console methods ... });`
fn console_output() -> impl Matcher<Stmt> {
  var_decl(vec![declarator(
    capture_id("construct"),
    wrapper_call(replaces_console_methods),
  )
  .boxed()])
}

struct WrapperFinder<M> {
  matcher: M,
  found: HashSet<Id>,
}

impl<M: Matcher<Stmt>> Visit for WrapperFinder<M> {
  fn visit_stmt(&mut self, stmt: &Stmt) {
    let wrapper =
      match_node(&self.matcher, stmt).and_then(|captures| captures.id("wrapper").cloned());
    if let Some(wrapper) = wrapper {
      self.found.insert(wrapper);
    }
    stmt.visit_children_with(self);
  }
}

#[derive(Clone, Copy)]
enum Construct {
  SelfDefending,
  DebugProtection,
  ConsoleOutput,
}

impl Construct {
  fn description(self) -> &'static str {
    match self {
      Construct::SelfDefending => "self defending code",
      Construct::DebugProtection => "debug protection",
      Construct::ConsoleOutput => "console output disabling",
    }
  }
}

impl Transformation for AntiTamperRemover {
  fn properties(&self) -> TransformationProperties {
    TransformationProperties {
      key: TransformationKey::AntiTamperRemoval,
      rebuild_scope_tree: true,
    }
  }

  fn execute(
    &mut self,
    module: &mut Module,
    context: &mut TransformContext,
  ) -> Result<bool, TransformError> {
    let mut finder = WrapperFinder {
      matcher: wrapper_declaration(),
      found: HashSet::new(),
    };
    module.visit_with(&mut finder);
    let wrappers = finder.found;
    if wrappers.is_empty() {
      return Ok(false);
    }

    let shapes = [
      (self_defending().boxed(), Construct::SelfDefending),
      (debug_protection().boxed(), Construct::DebugProtection),
      (console_output().boxed(), Construct::ConsoleOutput),
    ];
    // Functions that ran through a wrapper, which are called or referenced elsewhere
    let mut called = HashSet::new();
    let mut protections = HashSet::new();
    let mut outcomes = vec![];

    let mut removed = remove_statements(module, |stmt| {
      for (shape, construct) in &shapes {
        let mut captures = Captures::default();
        if !shape.matches(stmt, &mut captures) {
          continue;
        }
        let (Some(wrapper), Some(id)) = (captures.id("wrapper"), captures.id("construct")) else {
          continue;
        };
        if !wrappers.contains(wrapper) {
          continue;
        }

        match construct {
          Construct::DebugProtection => protections.insert(id.clone()),
          _ => called.insert(id.clone()),
        };
        outcomes.push(Outcome::Matched(format!("Removed {}", construct.description())));
        return true;
      }
      false
    });
    removed += remove_statements_referencing(module, &called);

    if !protections.is_empty() {
      let interval = debug_protection_interval();
      removed += remove_statements(module, |stmt| {
        match_node(&interval, stmt)
          .and_then(|captures| captures.id("construct").cloned())
          .is_some_and(|protection| protections.contains(&protection))
      });

      // The function declaration is the only occurrence left once nothing else uses it
      let unused: HashSet<Id> = protections
        .into_iter()
        .filter(|protection| count_references(module, &HashSet::from([protection.clone()])) <= 1)
        .collect();
      removed += remove_declarations(module, &unused);
    }

    let mut unused_wrappers = HashSet::new();
    for wrapper in wrappers {
      if count_references(module, &HashSet::from([wrapper.clone()])) > 1 {
        outcomes.push(Outcome::Skipped(format!(
          "Unknown reference to anti-tamper wrapper {}",
          wrapper.0
        )));
      } else {
        unused_wrappers.insert(wrapper);
      }
    }
    removed += remove_declarations(module, &unused_wrappers);

    for outcome in outcomes {
      context.report(outcome);
    }
    Ok(removed > 0)
  }
}

#[cfg(test)]
mod tests {
  use indoc::indoc;
  use pretty_assertions::assert_eq;

  use super::*;
  use crate::transformation::test_utils::{assert_transforms, run_test_transformation};
  use deobfuscator_swc_runner::test_utils::strip_code_whitespace;

  const WRAPPER: &str = indoc! {r#"
    var w = (function () {
      var first = !![];
      return function (context, fn) {
        var rfn = first ? function () {
          if (fn) {
            var res = fn.apply(context, arguments);
            fn = null;
            return res;
          }
        } : function () {};
        first = false;
        return rfn;
      };
    })();
  "#};

  const DEBUG_PROTECTION: &str = indoc! {r#"
    (function () {
      w(this, function () {
        var a = new RegExp("function *\\( *\\)");
        var b = new RegExp("\\+\\+ *(?:[a-zA-Z_$][0-9a-zA-Z_$]*)", "i");
        var c = protect("init");
        if (!a.test(c + "chain") || !b.test(c + "input")) {
          c("0");
        } else {
          protect();
        }
      })();
    })();
    setInterval(function () {
      protect();
    }, 4000);
    function protect(ret) {
      function debuggerProtection(counter) {
        debuggerProtection(++counter);
      }
      try {
        if (ret) {
          return debuggerProtection;
        } else {
          debuggerProtection(0);
        }
      } catch (y) {}
    }
  "#};

  #[test]
  fn test_removes_all_constructs() {
    let code = format!(
      "{}{}{}{}",
      WRAPPER,
      indoc! {r#"
        var s = w(this, function () {
          return s.toString().search("(((.+)+)+)+$").toString().constructor(s).search("(((.+)+)+)+$");
        });
        s();
      "#},
      DEBUG_PROTECTION,
      indoc! {r#"
        var o = w(this, function () {
          var g;
          try {
            g = Function("return (function() {}.constructor(\"return this\")( ));")();
          } catch (e) {
            g = window;
          }
          var con = g.console = g.console || {};
          var methods = ["log", "warn", "info", "error"];
          for (var i = 0; i < methods.length; i++) {
            con[methods[i]] = function () {};
          }
        });
        o();
        console.log("hi");
      "#},
    );

    let run = run_test_transformation(&code, AntiTamperRemover);
    assert!(run.changed);
    assert_eq!(run.output_code.trim(), r#"console.log("hi");"#);
    assert_eq!(
      run
        .diagnostics
        .into_iter()
        .map(|diagnostic| diagnostic.outcome)
        .collect::<Vec<_>>(),
      vec![
        Outcome::Matched("Removed self defending code".into()),
        Outcome::Matched("Removed debug protection".into()),
        Outcome::Matched("Removed console output disabling".into()),
      ]
    );
  }

  #[test]
  fn test_keeps_protection_function_with_other_references() {
    assert_transforms(
      &format!("{}{}keep(protect);", WRAPPER, DEBUG_PROTECTION),
      AntiTamperRemover,
      indoc! {r#"
        function protect(ret) {
          function debuggerProtection(counter) {
            debuggerProtection(++counter);
          }
          try {
            if (ret) {
              return debuggerProtection;
            } else {
              debuggerProtection(0);
            }
          } catch (y) {}
        }
        keep(protect);
      "#},
    );
  }

  #[test]
  fn test_keeps_wrapper_with_unknown_reference() {
    let code = format!("{}var x = w(this, other);", WRAPPER);
    let run = run_test_transformation(&code, AntiTamperRemover);
    assert!(!run.changed);
    // The printer drops the parentheses around the wrapper's IIFE
    assert_eq!(
      strip_code_whitespace(&run.output_code),
      strip_code_whitespace(&code)
        .replacen("varw=(function", "varw=function", 1)
        .replacen("})();", "}();", 1)
    );
    assert_eq!(
      run
        .diagnostics
        .into_iter()
        .map(|diagnostic| diagnostic.outcome)
        .collect::<Vec<_>>(),
      vec![Outcome::Skipped("Unknown reference to anti-tamper wrapper w".into())]
    );
  }
}
