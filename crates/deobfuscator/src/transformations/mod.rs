mod anti_tamper_remover;
mod constant_propagator;
mod control_flow_recoverer;
mod dead_branch_remover;
mod expression_simplifier;
mod object_packer;
mod object_simplifier;
mod property_simplifier;
mod proxy_function_inliner;
mod reassignment_remover;
mod sequence_splitter;
mod unused_variable_remover;

pub use anti_tamper_remover::AntiTamperRemover;
pub use constant_propagator::ConstantPropagator;
pub use control_flow_recoverer::ControlFlowRecoverer;
pub use dead_branch_remover::DeadBranchRemover;
pub use expression_simplifier::ExpressionSimplifier;
pub use object_packer::ObjectPacker;
pub use object_simplifier::ObjectSimplifier;
pub use property_simplifier::PropertySimplifier;
pub use proxy_function_inliner::ProxyFunctionInliner;
pub use reassignment_remover::ReassignmentRemover;
pub use sequence_splitter::SequenceSplitter;
pub use unused_variable_remover::UnusedVariableRemover;

use crate::config::TransformationKey;
use crate::string_revealer::StringRevealer;
use crate::transformation::Transformation;

/// A fresh instance of the pass behind `key`.
pub fn create(key: TransformationKey) -> Box<dyn Transformation> {
  match key {
    TransformationKey::UnusedVariableRemoval => Box::new(UnusedVariableRemover),
    TransformationKey::ConstantPropagation => Box::new(ConstantPropagator),
    TransformationKey::ReassignmentRemoval => Box::new(ReassignmentRemover),
    TransformationKey::DeadBranchRemoval => Box::<DeadBranchRemover>::default(),
    TransformationKey::ObjectPacking => Box::new(ObjectPacker),
    TransformationKey::ProxyFunctionInlining => Box::new(ProxyFunctionInliner),
    TransformationKey::ExpressionSimplification => Box::new(ExpressionSimplifier),
    TransformationKey::SequenceSplitting => Box::<SequenceSplitter>::default(),
    TransformationKey::ControlFlowRecovery => Box::new(ControlFlowRecoverer),
    TransformationKey::PropertySimplification => Box::<PropertySimplifier>::default(),
    TransformationKey::AntiTamperRemoval => Box::new(AntiTamperRemover),
    TransformationKey::ObjectSimplification => Box::new(ObjectSimplifier),
    TransformationKey::StringRevealing => Box::<StringRevealer>::default(),
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  #[test]
  fn test_create_matches_keys() {
    for key in TransformationKey::ALL {
      assert_eq!(create(key).properties().key, key);
    }
  }
}
