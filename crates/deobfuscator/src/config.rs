use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Every pass, in the order the pipeline runs them.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TransformationKey {
  UnusedVariableRemoval,
  ConstantPropagation,
  ReassignmentRemoval,
  DeadBranchRemoval,
  ObjectPacking,
  ProxyFunctionInlining,
  ExpressionSimplification,
  SequenceSplitting,
  ControlFlowRecovery,
  PropertySimplification,
  AntiTamperRemoval,
  ObjectSimplification,
  StringRevealing,
}

impl TransformationKey {
  pub const ALL: [TransformationKey; 13] = [
    TransformationKey::UnusedVariableRemoval,
    TransformationKey::ConstantPropagation,
    TransformationKey::ReassignmentRemoval,
    TransformationKey::DeadBranchRemoval,
    TransformationKey::ObjectPacking,
    TransformationKey::ProxyFunctionInlining,
    TransformationKey::ExpressionSimplification,
    TransformationKey::SequenceSplitting,
    TransformationKey::ControlFlowRecovery,
    TransformationKey::PropertySimplification,
    TransformationKey::AntiTamperRemoval,
    TransformationKey::ObjectSimplification,
    TransformationKey::StringRevealing,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      TransformationKey::UnusedVariableRemoval => "unusedVariableRemoval",
      TransformationKey::ConstantPropagation => "constantPropagation",
      TransformationKey::ReassignmentRemoval => "reassignmentRemoval",
      TransformationKey::DeadBranchRemoval => "deadBranchRemoval",
      TransformationKey::ObjectPacking => "objectPacking",
      TransformationKey::ProxyFunctionInlining => "proxyFunctionInlining",
      TransformationKey::ExpressionSimplification => "expressionSimplification",
      TransformationKey::SequenceSplitting => "sequenceSplitting",
      TransformationKey::ControlFlowRecovery => "controlFlowRecovery",
      TransformationKey::PropertySimplification => "propertySimplification",
      TransformationKey::AntiTamperRemoval => "antiTamperRemoval",
      TransformationKey::ObjectSimplification => "objectSimplification",
      TransformationKey::StringRevealing => "stringRevealing",
    }
  }
}

impl Display for TransformationKey {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown transformation '{0}'")]
pub struct UnknownTransformation(pub String);

impl FromStr for TransformationKey {
  type Err = UnknownTransformation;

  fn from_str(value: &str) -> Result<Self, Self::Err> {
    TransformationKey::ALL
      .into_iter()
      .find(|key| key.as_str() == value)
      .ok_or_else(|| UnknownTransformation(value.to_string()))
  }
}

/// Settings of a single pass
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformationConfig {
  pub is_enabled: bool,

  /// Pass specific switches, e.g. `unsafeSet` for object simplification
  #[serde(flatten)]
  pub options: BTreeMap<String, bool>,
}

impl TransformationConfig {
  pub fn enabled() -> Self {
    TransformationConfig {
      is_enabled: true,
      options: BTreeMap::new(),
    }
  }

  pub fn option(&self, name: &str) -> bool {
    self.options.get(name).copied().unwrap_or(false)
  }
}

/// Which passes run and how.
///
/// The transformation map is authoritative: a pass without an entry does not run.
///
/// ```json
/// { "silent": false, "stringRevealing": { "isEnabled": true } }
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
  /// Only report warnings
  #[serde(default)]
  pub silent: bool,

  #[serde(flatten)]
  pub transformations: BTreeMap<TransformationKey, TransformationConfig>,
}

impl Default for Config {
  fn default() -> Self {
    let mut transformations: BTreeMap<_, _> = TransformationKey::ALL
      .into_iter()
      .map(|key| (key, TransformationConfig::enabled()))
      .collect();

    if let Some(object_simplification) =
      transformations.get_mut(&TransformationKey::ObjectSimplification)
    {
      object_simplification
        .options
        .insert("unsafeSet".to_string(), false);
    }

    Config {
      silent: false,
      transformations,
    }
  }
}

impl Config {
  pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
    serde_json::from_str(json)
  }

  pub fn get(&self, key: TransformationKey) -> Option<&TransformationConfig> {
    self.transformations.get(&key)
  }

  pub fn is_enabled(&self, key: TransformationKey) -> bool {
    self.get(key).is_some_and(|config| config.is_enabled)
  }

  /// Enabled passes in pipeline order
  pub fn enabled_keys(&self) -> Vec<TransformationKey> {
    TransformationKey::ALL
      .into_iter()
      .filter(|key| self.is_enabled(*key))
      .collect()
  }

  pub fn disable(&mut self, key: TransformationKey) {
    if let Some(config) = self.transformations.get_mut(&key) {
      config.is_enabled = false;
    }
  }
}
