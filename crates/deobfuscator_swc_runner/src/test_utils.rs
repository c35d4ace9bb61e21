use swc_core::ecma::visit::{Visit, VisitMut};

use crate::runner::{run_visit, run_visit_const};
pub use crate::runner::{RunContext, RunVisitResult};

/// Parse `code`, run the visitor built by `make_visit` over it and print the result.
///
/// Panics when `code` does not parse.
pub fn run_test_visit<V: VisitMut>(
  code: &str,
  make_visit: impl FnOnce(RunContext) -> V,
) -> RunVisitResult<V> {
  run_visit(code, make_visit).unwrap()
}

pub fn run_test_visit_const<V: Visit>(
  code: &str,
  make_visit: impl FnOnce(RunContext) -> V,
) -> RunVisitResult<V> {
  run_visit_const(code, make_visit).unwrap()
}

/// Remove every whitespace character, so that two programs printed with different line breaks
/// compare equal
pub fn strip_code_whitespace(code: &str) -> String {
  code.chars().filter(|c| !c.is_whitespace()).collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_strip_code_whitespace() {
    assert_eq!(strip_code_whitespace("var o = {\n    a: 1\n};"), "varo={a:1};");
  }
}
