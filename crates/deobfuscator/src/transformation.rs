use serde::Serialize;
use swc_core::common::sync::Lrc;
use swc_core::common::{Mark, SourceMap};
use swc_core::ecma::ast::Module;

use crate::binding::ScopeCache;
use crate::config::{TransformationConfig, TransformationKey};

pub struct TransformationProperties {
  pub key: TransformationKey,
  /// Declarations or scoping may have changed, so cached bindings must be rebuilt after the
  /// pass ran.
  pub rebuild_scope_tree: bool,
}

/// A single rewriting pass. A new instance is created for every sweep of the pipeline.
pub trait Transformation {
  fn properties(&self) -> TransformationProperties;

  /// Rewrite `module` in place and return whether anything changed.
  fn execute(
    &mut self,
    module: &mut Module,
    context: &mut TransformContext,
  ) -> Result<bool, TransformError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
  #[error("Cannot evaluate {0}")]
  Evaluation(String),
  #[error("Unexpected structure: {0}")]
  Structure(String),
}

/// What a pass did with one recognised construct.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "message", rename_all = "camelCase")]
pub enum Outcome {
  Matched(String),
  Skipped(String),
  Failed(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
  pub transformation: TransformationKey,
  #[serde(flatten)]
  pub outcome: Outcome,
}

/// State shared by the passes of one pipeline run.
pub struct TransformContext {
  pub scope: ScopeCache,
  pub source_map: Lrc<SourceMap>,
  pub unresolved_mark: Mark,
  pub config: TransformationConfig,
  current: Option<TransformationKey>,
  diagnostics: Vec<Diagnostic>,
}

impl TransformContext {
  pub fn new(source_map: Lrc<SourceMap>, unresolved_mark: Mark) -> Self {
    TransformContext {
      scope: ScopeCache::default(),
      source_map,
      unresolved_mark,
      config: TransformationConfig::default(),
      current: None,
      diagnostics: vec![],
    }
  }

  pub(crate) fn begin(&mut self, key: TransformationKey, config: TransformationConfig) {
    self.current = Some(key);
    self.config = config;
  }

  /// Record what happened to a construct. Only used for observation.
  pub fn report(&mut self, outcome: Outcome) {
    let Some(transformation) = self.current else {
      return;
    };

    match &outcome {
      Outcome::Matched(message) => tracing::debug!(%transformation, "{}", message),
      Outcome::Skipped(message) => tracing::warn!(%transformation, "Skipped: {}", message),
      Outcome::Failed(message) => tracing::warn!(%transformation, "Failed: {}", message),
    }

    self.diagnostics.push(Diagnostic {
      transformation,
      outcome,
    });
  }

  pub fn diagnostics(&self) -> &[Diagnostic] {
    &self.diagnostics
  }

  pub fn into_diagnostics(self) -> Vec<Diagnostic> {
    self.diagnostics
  }
}
