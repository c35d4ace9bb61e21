use std::collections::{HashMap, HashSet};

use swc_core::ecma::ast::*;
use swc_core::ecma::visit::{Visit, VisitMut, VisitMutWith, VisitWith};

use crate::binding::{collect_bindings, collect_constants, ConstantVariable};
use crate::config::TransformationKey;
use crate::matchers::member_literal_key;
use crate::proxy::ProxyObject;
use crate::transformation::{
  Outcome, TransformContext, TransformError, Transformation, TransformationProperties,
};

/// Inlines the properties of objects made of literals and single-expression functions.
///
/// With the `unsafeSet` option an object whose properties are assigned elsewhere is still
/// simplified, except for the assigned properties.
#[derive(Default)]
pub struct ObjectSimplifier;

/// How the program uses a candidate object.
#[derive(Default)]
struct Usage {
  assigned: HashSet<String>,
  escapes: bool,
}

/// Classifies every occurrence of the candidate objects.
struct UsageCollector {
  usages: HashMap<Id, Usage>,
}

impl UsageCollector {
  /// `object.key` where `object` is a candidate, with its literal key
  fn candidate_member<'a>(
    &self,
    expr: &'a Expr,
  ) -> Option<(Id, Option<String>, &'a MemberExpr)> {
    let Expr::Member(member) = expr else {
      return None;
    };
    let Expr::Ident(object) = &*member.obj else {
      return None;
    };
    let id = object.to_id();
    self
      .usages
      .contains_key(&id)
      .then(|| (id, member_literal_key(member), member))
  }

  fn visit_member_prop(&mut self, member: &MemberExpr) {
    if let MemberProp::Computed(computed) = &member.prop {
      computed.visit_with(self);
    }
  }

  fn mark_assigned(&mut self, id: Id, key: Option<String>) {
    let Some(usage) = self.usages.get_mut(&id) else {
      return;
    };
    match key {
      Some(key) => {
        usage.assigned.insert(key);
      }
      None => usage.escapes = true,
    }
  }

  /// A write to `object.key`, through assignment, update or `delete`.
  fn visit_written(&mut self, target: &Expr) {
    match self.candidate_member(target) {
      Some((id, key, member)) => {
        self.mark_assigned(id, key);
        self.visit_member_prop(member);
      }
      None => target.visit_with(self),
    }
  }
}

impl Visit for UsageCollector {
  fn visit_expr(&mut self, expr: &Expr) {
    if let Expr::Ident(ident) = expr {
      if let Some(usage) = self.usages.get_mut(&ident.to_id()) {
        usage.escapes = true;
      }
      return;
    }

    match self.candidate_member(expr) {
      Some((id, None, _)) => {
        if let Some(usage) = self.usages.get_mut(&id) {
          usage.escapes = true;
        }
        expr.visit_children_with(self);
      }
      Some((_, Some(_), member)) => self.visit_member_prop(member),
      None => expr.visit_children_with(self),
    }
  }

  fn visit_prop(&mut self, prop: &Prop) {
    if let Prop::Shorthand(ident) = prop {
      if let Some(usage) = self.usages.get_mut(&ident.to_id()) {
        usage.escapes = true;
      }
    }
    prop.visit_children_with(self);
  }

  fn visit_assign_expr(&mut self, assign: &AssignExpr) {
    assign.right.visit_with(self);
    match &assign.left {
      AssignTarget::Simple(SimpleAssignTarget::Member(member)) => {
        self.visit_written(&Expr::Member(member.clone()))
      }
      left => left.visit_with(self),
    }
  }

  fn visit_update_expr(&mut self, update: &UpdateExpr) {
    self.visit_written(&update.arg);
  }

  fn visit_unary_expr(&mut self, unary: &UnaryExpr) {
    if unary.op == UnaryOp::Delete {
      self.visit_written(&unary.arg);
    } else {
      unary.arg.visit_with(self);
    }
  }
}

/// Replaces member reads and method calls of the proxy objects.
struct Inliner<'a> {
  objects: &'a HashMap<Id, ProxyObject>,
  inlined: usize,
}

impl Inliner<'_> {
  fn object_of(&self, member: &MemberExpr) -> Option<&ProxyObject> {
    let Expr::Ident(object) = &*member.obj else {
      return None;
    };
    self.objects.get(&object.to_id())
  }
}

impl VisitMut for Inliner<'_> {
  fn visit_mut_expr(&mut self, expr: &mut Expr) {
    expr.visit_mut_children_with(self);

    let replacement = match expr {
      Expr::Member(member) => self
        .object_of(member)
        .and_then(|object| object.inline_member(member)),
      Expr::Call(CallExpr {
        callee: Callee::Expr(callee),
        args,
        ..
      }) => match &**callee {
        Expr::Member(member) => self
          .object_of(member)
          .and_then(|object| object.inline_call(member, args)),
        _ => None,
      },
      _ => None,
    };

    if let Some(replacement) = replacement {
      *expr = replacement;
      self.inlined += 1;
    }
  }
}

impl Transformation for ObjectSimplifier {
  fn properties(&self) -> TransformationProperties {
    TransformationProperties {
      key: TransformationKey::ObjectSimplification,
      rebuild_scope_tree: true,
    }
  }

  fn execute(
    &mut self,
    module: &mut Module,
    context: &mut TransformContext,
  ) -> Result<bool, TransformError> {
    let unsafe_set = context.config.option("unsafeSet");
    let bindings = context.scope.bindings(module);
    let candidates: Vec<ConstantVariable<ProxyObject>> =
      collect_constants(module, bindings, |expr| match expr {
        Expr::Object(object) => ProxyObject::from_object(object),
        _ => None,
      });
    if candidates.is_empty() {
      return Ok(false);
    }

    let mut collector = UsageCollector {
      usages: candidates
        .iter()
        .map(|candidate| (candidate.id.clone(), Usage::default()))
        .collect(),
    };
    module.visit_with(&mut collector);

    let mut objects = HashMap::new();
    let mut proxies = vec![];
    for candidate in candidates {
      let Some(usage) = collector.usages.remove(&candidate.id) else {
        continue;
      };
      if usage.escapes {
        continue;
      }
      if !usage.assigned.is_empty() && !unsafe_set {
        context.report(Outcome::Skipped(format!(
          "Properties of {} are assigned",
          candidate.name
        )));
        continue;
      }

      let mut object = candidate.expression.clone();
      for key in &usage.assigned {
        object.remove(key);
      }
      if !object.is_empty() {
        objects.insert(candidate.id.clone(), object);
        proxies.push(candidate);
      }
    }
    if objects.is_empty() {
      return Ok(false);
    }

    let mut inliner = Inliner {
      objects: &objects,
      inlined: 0,
    };
    module.visit_mut_with(&mut inliner);
    if inliner.inlined == 0 {
      return Ok(false);
    }

    let bindings = collect_bindings(module);
    for proxy in &proxies {
      if !proxy.binding(&bindings).is_some_and(|binding| binding.is_referenced()) {
        proxy.remove(module);
        context.report(Outcome::Matched(format!("Inlined proxy object {}", proxy.name)));
      }
    }

    Ok(true)
  }
}

#[cfg(test)]
mod tests {
  use indoc::indoc;
  use pretty_assertions::assert_eq;

  use super::*;
  use crate::config::TransformationConfig;
  use crate::transformation::test_utils::{
    assert_transforms, assert_unchanged, run_test_transformation_with,
  };
  use deobfuscator_swc_runner::test_utils::strip_code_whitespace;

  #[test]
  fn test_inlines_literals_and_functions() {
    assert_transforms(
      indoc! {r#"
        var o = {
          "aBc": "log",
          xyz: function (a, b) {
            return a + b;
          },
          call(f, x) {
            return f(x);
          },
        };
        console[o.aBc](o["xyz"](1, 2), o.call(g, 3));
      "#},
      ObjectSimplifier,
      r#"console["log"](1 + 2, g(3));"#,
    );
  }

  #[test]
  fn test_keeps_object_with_other_properties_in_use() {
    assert_transforms(
      "var o = { a: 1, b: g() }; f(o.a, o.b);",
      ObjectSimplifier,
      "var o = { a: 1, b: g() }; f(1, o.b);",
    );
  }

  #[test]
  fn test_skips_escaping_objects() {
    assert_unchanged("var o = { a: 1 }; f(o.a, o);", ObjectSimplifier);
    assert_unchanged("var o = { a: 1 }; f(o.a, o[k]);", ObjectSimplifier);
  }

  #[test]
  fn test_later_properties_override_earlier_ones() {
    assert_unchanged(
      "var o = { a: 1, ...b }; var p = { c: 1, c: g() }; f(o.a, p.c);",
      ObjectSimplifier,
    );
    assert_transforms(
      "var o = { a: 1, a: 2, b: h() }; f(o.a, o.b);",
      ObjectSimplifier,
      "var o = { a: 1, a: 2, b: h() }; f(2, o.b);",
    );
  }

  #[test]
  fn test_skips_assigned_properties_by_default() {
    assert_unchanged("var o = { a: 1, b: 2 }; o.a = 3; f(o.a, o.b);", ObjectSimplifier);
  }

  #[test]
  fn test_unsafe_set_inlines_other_properties() {
    let mut config = TransformationConfig::enabled();
    config.options.insert("unsafeSet".into(), true);
    let run = run_test_transformation_with(
      "var o = { a: 1, b: 2 }; o.a = 3; f(o.a, o.b);",
      &mut ObjectSimplifier,
      config,
    );
    assert_eq!(
      strip_code_whitespace(&run.output_code),
      "varo={a:1,b:2};o.a=3;f(o.a,2);"
    );
  }
}
