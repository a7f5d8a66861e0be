//! Bitcoin-compatible Script: bytecode container, numeric/stack-item
//! encodings, the interpreter, and signature hash construction.

pub mod checker;
pub mod data;
pub mod error;
pub mod flags;
pub mod interpreter;
pub mod num;
pub mod opcode;
pub mod script;
pub mod stack;

pub use checker::{SignatureChecker, TransactionSignatureChecker};
pub use error::ScriptError;
pub use flags::ScriptVerifyFlags;
pub use interpreter::verify_script;
pub use opcode::OpCode;
pub use script::Script;
