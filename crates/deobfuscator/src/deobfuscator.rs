use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use deobfuscator_swc_runner::{run_with_transformation, RunContext, RunError, RunOptions};
use serde::Serialize;
use swc_core::ecma::ast::Module;

use crate::config::{Config, TransformationConfig};
use crate::transformation::{Diagnostic, TransformContext, Transformation};
use crate::transformations;

/// Upper bound on the number of sweeps over all enabled passes.
pub const MAX_ITERATIONS: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum DeobfuscateError {
  #[error(transparent)]
  Run(#[from] RunError),
  #[error("Source map is not valid utf-8")]
  InvalidSourceMap(#[from] std::string::FromUtf8Error),
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeobfuscateOutput {
  pub code: String,
  pub source_map: Option<String>,
  /// Number of sweeps that ran, including the final one that changed nothing
  pub iterations: usize,
  pub diagnostics: Vec<Diagnostic>,
}

/// Runs the enabled passes over a module until it stops changing.
pub struct Deobfuscator {
  config: Config,
}

impl Deobfuscator {
  pub fn new(config: Config) -> Self {
    Deobfuscator { config }
  }

  /// Rewrite `module` in place and return the number of sweeps and every reported outcome.
  pub fn run(&self, module: &mut Module, run_context: &RunContext) -> (usize, Vec<Diagnostic>) {
    let mut context =
      TransformContext::new(run_context.source_map.clone(), run_context.unresolved_mark);
    let keys = self.config.enabled_keys();

    let mut iterations = 0;
    while iterations < MAX_ITERATIONS {
      iterations += 1;
      let mut changed = false;

      for key in &keys {
        let mut transformation = transformations::create(*key);
        let config = self.config.get(*key).cloned().unwrap_or_default();
        changed |= run_contained(transformation.as_mut(), config, module, &mut context);
      }

      tracing::debug!(iteration = iterations, changed, "Finished sweep");
      if !changed {
        break;
      }
    }

    tracing::info!("Deobfuscation finished after {} iterations", iterations);
    (iterations, context.into_diagnostics())
  }
}

/// Run a single pass. A pass that fails or panics leaves `module` as it was before the pass
/// started and counts as no change.
pub(crate) fn run_contained(
  transformation: &mut dyn Transformation,
  config: TransformationConfig,
  module: &mut Module,
  context: &mut TransformContext,
) -> bool {
  let properties = transformation.properties();
  let key = properties.key;
  context.begin(key, config);

  let snapshot = module.clone();
  let result = panic::catch_unwind(AssertUnwindSafe(|| {
    transformation.execute(module, context)
  }));

  let changed = match result {
    Ok(Ok(changed)) => changed,
    Ok(Err(error)) => {
      tracing::warn!(transformation = %key, "Pass failed: {}", error);
      *module = snapshot;
      context.scope.invalidate();
      return false;
    }
    Err(payload) => {
      tracing::warn!(transformation = %key, "Pass panicked: {}", panic_message(&*payload));
      *module = snapshot;
      context.scope.invalidate();
      return false;
    }
  };

  tracing::debug!(transformation = %key, changed, "Executed pass");
  if properties.rebuild_scope_tree {
    context.scope.invalidate();
  }
  changed
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(message) = payload.downcast_ref::<&str>() {
    message.to_string()
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.clone()
  } else {
    "unknown panic".to_string()
  }
}

/// Parse `source`, deobfuscate it with the passes enabled in `config` and print the result.
pub fn deobfuscate(source: &str, config: &Config) -> Result<DeobfuscateOutput, DeobfuscateError> {
  deobfuscate_with_options(source, config, &RunOptions::default())
}

pub fn deobfuscate_with_options(
  source: &str,
  config: &Config,
  options: &RunOptions,
) -> Result<DeobfuscateOutput, DeobfuscateError> {
  let deobfuscator = Deobfuscator::new(config.clone());
  let (code, (iterations, diagnostics), source_map) =
    run_with_transformation(source, options, |context, module| {
      deobfuscator.run(module, &context)
    })?;

  Ok(DeobfuscateOutput {
    code,
    source_map: source_map.map(String::from_utf8).transpose()?,
    iterations,
    diagnostics,
  })
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;
  use swc_core::ecma::ast::Lit;
  use swc_core::ecma::visit::{VisitMut, VisitMutWith};
  use tracing_test::traced_test;

  use super::*;
  use crate::config::TransformationKey;
  use crate::transformation::{TransformError, TransformationProperties};
  use deobfuscator_swc_runner::test_utils::strip_code_whitespace;

  /// Replaces every numeric literal with `0`, then fails in the way it is told to.
  struct Vandal {
    panic: bool,
  }

  struct Zeroes;

  impl VisitMut for Zeroes {
    fn visit_mut_lit(&mut self, lit: &mut Lit) {
      if let Lit::Num(num) = lit {
        num.value = 0.0;
        num.raw = None;
      }
    }
  }

  impl Transformation for Vandal {
    fn properties(&self) -> TransformationProperties {
      TransformationProperties {
        key: TransformationKey::ExpressionSimplification,
        rebuild_scope_tree: false,
      }
    }

    fn execute(
      &mut self,
      module: &mut Module,
      _context: &mut TransformContext,
    ) -> Result<bool, TransformError> {
      module.visit_mut_with(&mut Zeroes);
      if self.panic {
        panic!("vandal panicked");
      }
      Err(TransformError::Structure("vandal failed".into()))
    }
  }

  fn run_vandal(panic: bool) -> (String, bool) {
    let (code, changed, _) =
      run_with_transformation("f(1, 2);", &RunOptions::default(), |run_context, module| {
        let mut context =
          TransformContext::new(run_context.source_map.clone(), run_context.unresolved_mark);
        run_contained(
          &mut Vandal { panic },
          TransformationConfig::enabled(),
          module,
          &mut context,
        )
      })
      .unwrap();
    (code, changed)
  }

  #[test]
  fn test_failing_pass_is_rolled_back() {
    let (code, changed) = run_vandal(false);
    assert!(!changed);
    assert_eq!(strip_code_whitespace(&code), "f(1,2);");
  }

  #[traced_test]
  #[test]
  fn test_panicking_pass_is_rolled_back() {
    let (code, changed) = run_vandal(true);
    assert!(!changed);
    assert_eq!(strip_code_whitespace(&code), "f(1,2);");
    assert!(logs_contain("Pass panicked: vandal panicked"));
  }

  #[test]
  fn test_runs_until_nothing_changes() {
    let output = deobfuscate("var a = 5; f(a); g(a);", &Config::default()).unwrap();
    assert_eq!(strip_code_whitespace(&output.code), "f(5);g(5);");
    assert!(output.iterations >= 2);
    assert!(output.iterations <= MAX_ITERATIONS);
  }

  #[test]
  fn test_nothing_enabled() {
    let config = Config::from_json("{}").unwrap();
    let output = deobfuscate("var a = 5; f(a);", &config).unwrap();
    assert_eq!(output.iterations, 1);
    assert_eq!(strip_code_whitespace(&output.code), "vara=5;f(a);");
  }

  #[test]
  fn test_source_map() {
    let options = RunOptions {
      file_name: Some("input.js".into()),
      source_map: true,
    };
    let output = deobfuscate_with_options("f(1 + 2);", &Config::default(), &options).unwrap();
    assert_eq!(strip_code_whitespace(&output.code), "f(3);");
    assert!(output.source_map.unwrap().contains("input.js"));
  }

  #[test]
  fn test_parse_error() {
    let result = deobfuscate("var = ;", &Config::default());
    assert!(matches!(
      result,
      Err(DeobfuscateError::Run(RunError::SwcParse(_)))
    ));
  }

  #[test]
  fn test_leaves_statements_it_does_not_understand() {
    let output = deobfuscate("while (x) { y(); }", &Config::default()).unwrap();
    assert_eq!(strip_code_whitespace(&output.code), "while(x){y();}");
    assert_eq!(output.iterations, 1);
  }
}
