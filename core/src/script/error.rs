//! Script evaluation error codes.

/// Mirrors the grouped structure of the original interpreter's error table:
/// success, then normal (non-fatal-to-the-node) failures, then the various
/// classes of consensus-fatal malformation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptError {
    Success,

    // normal unsuccess
    EvalFalse,
    OpReturn,

    // max size/ops/stack/pubkeys exceeded
    ScriptSize,
    PushSize,
    OpCount,
    StackSize,
    SigCount,
    PubkeyCount,

    // failed conversions
    InvalidOperandSize,
    InvalidNumberRange,
    ImpossibleEncoding,
    InvalidSplitRange,

    // failed verify
    Verify,
    EqualVerify,
    CheckMultisigVerify,
    CheckSigVerify,
    NumEqualVerify,

    // logical/format/canonical errors
    BadOpcode,
    DisabledOpcode,
    InvalidStackOperation,
    InvalidAltstackOperation,
    UnbalancedConditional,

    // CHECKLOCKTIMEVERIFY / CHECKSEQUENCEVERIFY
    NegativeLockTime,
    UnsatisfiedLockTime,

    // malleability
    SigHashType,
    SigDer,
    MinimalData,
    SigPushOnly,
    SigHighS,
    SigNullDummy,
    PubKeyType,
    CleanStack,
    MinimalIf,
    SigNullFail,

    // softfork safeness
    DiscourageUpgradableNops,
    DiscourageUpgradableWitnessProgram,

    // segregated witness
    WitnessProgramWrongLength,
    WitnessProgramWitnessEmpty,
    WitnessProgramMismatch,
    WitnessMalleated,
    WitnessMalleatedP2sh,
    WitnessUnexpected,
    WitnessPubkeytype,

    // constant scriptCode
    OpCodeSeparator,
    SigFindAndDelete,

    ErrorCount,
    NotExecuted,
    UnknownError,
}

impl std::fmt::Display for ScriptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for ScriptError {}
