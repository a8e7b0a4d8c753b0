use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error("bone '{bone}' has parent index {parent}, which does not precede it")]
    InvalidBoneParent { bone: String, parent: usize },

    #[error("unknown bone index {index} referenced by '{owner}'")]
    UnknownBone { owner: String, index: usize },

    #[error("unknown slot index {index} referenced by '{owner}'")]
    UnknownSlot { owner: String, index: usize },

    #[error("unknown {kind} constraint index {index} referenced by '{owner}'")]
    UnknownConstraint {
        owner: String,
        kind: &'static str,
        index: usize,
    },

    #[error("unknown event index {index} referenced by animation '{animation}'")]
    UnknownEvent { animation: String, index: usize },

    #[error("IK constraint '{name}' bones do not form a parent-to-child chain")]
    InvalidIkChain { name: String },

    #[error("keyframe times in animation '{animation}' are not strictly increasing")]
    UnsortedKeyframes { animation: String },

    #[error("unknown animation: {name}")]
    UnknownAnimation { name: String },

    #[error("unknown skin: {name}")]
    UnknownSkin { name: String },

    #[error("unknown attachment '{name}' for slot '{slot}'")]
    UnknownAttachment { slot: String, name: String },

    #[error("unknown slot: {name}")]
    UnknownSlotName { name: String },

    #[error("invalid value: {message}")]
    InvalidValue { message: String },
}
