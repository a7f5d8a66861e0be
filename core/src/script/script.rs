//! The raw bytecode container and its instruction decoder.

use crate::script::error::ScriptError;
use crate::script::opcode::OpCode;

#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct Script(pub Vec<u8>);

/// One decoded instruction: the opcode plus, for a push, its operand.
/// `pos` is the byte offset of the opcode itself, used to slice scriptCode
/// at an `OP_CODESEPARATOR` boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub op: OpCode,
    pub data: Option<Vec<u8>>,
    pub pos: usize,
}

impl Script {
    pub fn new(bytes: Vec<u8>) -> Self {
        Script(bytes)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decodes every instruction, failing on a truncated push.
    pub fn instructions(&self) -> Result<Vec<Instruction>, ScriptError> {
        let mut out = Vec::new();
        let mut pc = 0usize;
        let buf = &self.0;
        while pc < buf.len() {
            let start = pc;
            let op = OpCode::from_byte(buf[pc]);
            pc += 1;
            let data = match op {
                OpCode::PUSHBYTES(n) => {
                    let n = n as usize;
                    let slice = buf.get(pc..pc + n).ok_or(ScriptError::BadOpcode)?;
                    pc += n;
                    Some(slice.to_vec())
                }
                OpCode::OP_PUSHDATA1 => {
                    let n = *buf.get(pc).ok_or(ScriptError::BadOpcode)? as usize;
                    pc += 1;
                    let slice = buf.get(pc..pc + n).ok_or(ScriptError::BadOpcode)?;
                    pc += n;
                    Some(slice.to_vec())
                }
                OpCode::OP_PUSHDATA2 => {
                    let bytes = buf.get(pc..pc + 2).ok_or(ScriptError::BadOpcode)?;
                    let n = u16::from_le_bytes(bytes.try_into().unwrap()) as usize;
                    pc += 2;
                    let slice = buf.get(pc..pc + n).ok_or(ScriptError::BadOpcode)?;
                    pc += n;
                    Some(slice.to_vec())
                }
                OpCode::OP_PUSHDATA4 => {
                    let bytes = buf.get(pc..pc + 4).ok_or(ScriptError::BadOpcode)?;
                    let n = u32::from_le_bytes(bytes.try_into().unwrap()) as usize;
                    pc += 4;
                    let slice = buf.get(pc..pc + n).ok_or(ScriptError::BadOpcode)?;
                    pc += n;
                    Some(slice.to_vec())
                }
                _ => None,
            };
            out.push(Instruction { op, data, pos: start });
        }
        Ok(out)
    }

    /// True if every instruction is a data push (no opcodes above OP_16).
    pub fn is_push_only(&self) -> bool {
        match self.instructions() {
            Ok(ins) => ins.iter().all(|i| i.op.value() <= OpCode::OP_16.value()),
            Err(_) => false,
        }
    }

    /// Counts non-push opcodes, with `OP_CHECKMULTISIG`/`VERIFY` counted via
    /// `last_push_n` (the immediately preceding small-int push, if any) the
    /// way upstream counts them as that many sig-check operations.
    pub fn count_sigops(&self, accurate: bool) -> Result<usize, ScriptError> {
        let ins = self.instructions()?;
        let mut n = 0usize;
        let mut last_small_int: Option<u32> = None;
        for i in &ins {
            match i.op {
                OpCode::OP_CHECKSIG | OpCode::OP_CHECKSIGVERIFY => n += 1,
                OpCode::OP_CHECKMULTISIG | OpCode::OP_CHECKMULTISIGVERIFY => {
                    if accurate {
                        if let Some(k) = last_small_int {
                            n += k as usize;
                        } else {
                            n += 20;
                        }
                    } else {
                        n += 20;
                    }
                }
                _ => {}
            }
            last_small_int = small_int_value(i.op);
        }
        Ok(n)
    }

    /// Builder: appends a minimal-encoded data push.
    pub fn push_data(mut self, data: &[u8]) -> Self {
        match data.len() {
            0 => self.0.push(OpCode::OP_0.value()),
            1..=75 => {
                self.0.push(data.len() as u8);
                self.0.extend_from_slice(data);
            }
            76..=255 => {
                self.0.push(OpCode::OP_PUSHDATA1.value());
                self.0.push(data.len() as u8);
                self.0.extend_from_slice(data);
            }
            256..=65535 => {
                self.0.push(OpCode::OP_PUSHDATA2.value());
                self.0.extend_from_slice(&(data.len() as u16).to_le_bytes());
                self.0.extend_from_slice(data);
            }
            _ => {
                self.0.push(OpCode::OP_PUSHDATA4.value());
                self.0.extend_from_slice(&(data.len() as u32).to_le_bytes());
                self.0.extend_from_slice(data);
            }
        }
        self
    }

    pub fn push_op(mut self, op: OpCode) -> Self {
        self.0.push(op.value());
        self
    }
}

fn small_int_value(op: OpCode) -> Option<u32> {
    let v = op.value();
    if v == OpCode::OP_0.value() {
        Some(0)
    } else if (OpCode::OP_1.value()..=OpCode::OP_16.value()).contains(&v) {
        Some((v - OpCode::OP_1.value() + 1) as u32)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_then_equal_decodes() {
        let script = Script::new(Vec::new())
            .push_data(b"abc")
            .push_op(OpCode::OP_EQUAL);
        let ins = script.instructions().unwrap();
        assert_eq!(ins.len(), 2);
        assert_eq!(ins[0].data.as_deref(), Some(&b"abc"[..]));
        assert_eq!(ins[1].op, OpCode::OP_EQUAL);
    }

    #[test]
    fn truncated_push_is_an_error() {
        let script = Script::new(vec![5, 1, 2]);
        assert!(script.instructions().is_err());
    }

    #[test]
    fn pushdata1_roundtrips_for_medium_payload() {
        let data = vec![0xab; 100];
        let script = Script::new(Vec::new()).push_data(&data);
        let ins = script.instructions().unwrap();
        assert_eq!(ins[0].data.as_deref(), Some(&data[..]));
    }
}
