use std::collections::HashSet;

use swc_core::ecma::ast::{Id, Module, VarDeclarator};
use swc_core::ecma::visit::{Visit, VisitWith};

use crate::binding::BindingKind;
use crate::config::TransformationKey;
use crate::mutate::remove_declarations;
use crate::transformation::{
  TransformContext, TransformError, Transformation, TransformationProperties,
};
use crate::utils::is_pure;

/// Removes variables and function declarations that are never used.
#[derive(Default)]
pub struct UnusedVariableRemover;

/// Names declared at least once with an initializer that may have side effects.
#[derive(Default)]
struct ImpureInitializers {
  ids: HashSet<Id>,
}

impl Visit for ImpureInitializers {
  fn visit_var_declarator(&mut self, declarator: &VarDeclarator) {
    if let (Some(binding), Some(init)) = (declarator.name.as_ident(), &declarator.init) {
      if !is_pure(init) {
        self.ids.insert(binding.id.to_id());
      }
    }
    declarator.visit_children_with(self);
  }
}

impl Transformation for UnusedVariableRemover {
  fn properties(&self) -> TransformationProperties {
    TransformationProperties {
      key: TransformationKey::UnusedVariableRemoval,
      rebuild_scope_tree: true,
    }
  }

  fn execute(
    &mut self,
    module: &mut Module,
    context: &mut TransformContext,
  ) -> Result<bool, TransformError> {
    let mut impure = ImpureInitializers::default();
    module.visit_with(&mut impure);

    let unused: HashSet<Id> = context
      .scope
      .bindings(module)
      .iter()
      .filter(|binding| {
        matches!(
          binding.kind,
          BindingKind::Var { .. } | BindingKind::Let | BindingKind::Const | BindingKind::Function
        ) && !binding.exported
          && binding.reads.is_empty()
          && binding.writes.is_empty()
          && !impure.ids.contains(&binding.id)
      })
      .map(|binding| binding.id.clone())
      .collect();

    Ok(remove_declarations(module, &unused) > 0)
  }
}

#[cfg(test)]
mod tests {
  use indoc::indoc;

  use super::*;
  use crate::transformation::test_utils::{assert_transforms, assert_unchanged};

  #[test]
  fn test_removes_unused_declarations() {
    assert_transforms(
      indoc! {r#"
        var a = 1, b = 2;
        let c = 'c';
        function unused() { return b; }
        console.log(a);
      "#},
      UnusedVariableRemover,
      "var a = 1, b = 2; console.log(a);",
    );
  }

  #[test]
  fn test_keeps_side_effects() {
    assert_unchanged("var a = f(); var b; b = 1;", UnusedVariableRemover);
  }

  #[test]
  fn test_keeps_exports_parameters_and_classes() {
    assert_unchanged(
      "export var a = 1; function g(p) {} g(); class C {}",
      UnusedVariableRemover,
    );
  }

  #[test]
  fn test_keeps_recursive_functions_referenced_only_by_themselves() {
    assert_unchanged("function f() { f(); }", UnusedVariableRemover);
  }
}
